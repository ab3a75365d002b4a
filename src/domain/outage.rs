use serde_json::Value;

const POSTCODE_FIELD: &str = "STORING_GETROFFEN_POSTCODES";

/// Uppercased postcode stripped to letters, digits and spaces.
///
/// `None` when nothing usable is left or the postcode does not start with
/// its numeric area, since either would widen the outage query.
pub fn normalize_postcode(postcode: &str) -> Option<String> {
    let full = postcode
        .chars()
        .filter(|char| char.is_ascii_alphanumeric() || *char == ' ')
        .collect::<String>()
        .trim()
        .to_ascii_uppercase();

    full.starts_with(|char: char| char.is_ascii_digit())
        .then_some(full)
}

/// ArcGIS `where` clause selecting unresolved outages that affect a postcode.
///
/// Outages list affected postcodes either in full (`1741 JB`) or by their
/// four digit area (`1741`), separated by `;`.
pub fn outage_where_clause(postcode: &str) -> Option<String> {
    let full = normalize_postcode(postcode)?;
    let area: String = full.chars().take_while(char::is_ascii_digit).collect();

    Some(format!(
        "STORING_STATUS <> 'opgelost' AND ({POSTCODE_FIELD} LIKE '%{full}%' \
         OR {POSTCODE_FIELD} = '{area}' \
         OR {POSTCODE_FIELD} LIKE '{area};%' \
         OR {POSTCODE_FIELD} LIKE '%;{area}' \
         OR {POSTCODE_FIELD} LIKE '%;{area};%')"
    ))
}

pub fn active_outage_count(feed: &Value) -> usize {
    feed.get("features")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}
