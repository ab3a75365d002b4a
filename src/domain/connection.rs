use serde_json::{Map, Value};

/// Values that mark an electricity connection as in service.
pub const ACTIVE_STATUSES: &[&str] = &["In bedrijf", "Active"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKey {
    Address,
    ElectricityEan,
    ConnectionCapacity,
    Status,
    NetworkCosts,
    MaximumPower,
    NumberOfMeters,
    MeterNumber,
    NumberOfRegisters,
    NumberOfPhases,
}

impl SensorKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::ElectricityEan => "electricity_ean",
            Self::ConnectionCapacity => "connection_capacity",
            Self::Status => "status",
            Self::NetworkCosts => "network_costs",
            Self::MaximumPower => "maximum_power",
            Self::NumberOfMeters => "number_of_meters",
            Self::MeterNumber => "meter_number",
            Self::NumberOfRegisters => "number_of_registers",
            Self::NumberOfPhases => "number_of_phases",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKey {
    Contract,
    ReadPermission,
    SmartMeter,
    FeedInCapable,
    DualTariffCapable,
    FeedingIn,
}

impl BinaryKey {
    /// The remote field name, which doubles as the entity key.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contract => "contract",
            Self::ReadPermission => "toestemmingVoorUitlezen",
            Self::SmartMeter => "slimmeMeter",
            Self::FeedInCapable => "geschiktVoorTerugleveren",
            Self::DualTariffCapable => "geschiktVoorDubbeltarief",
            Self::FeedingIn => "levertTerug",
        }
    }

    fn read_from_meter(self) -> bool {
        matches!(
            self,
            Self::SmartMeter | Self::FeedInCapable | Self::DualTariffCapable
        )
    }
}

/// Resolves a sensor value from the connections payload.
///
/// Accounts are scanned in order; the first one that yields a value wins.
pub fn sensor_value(accounts: &Value, key: SensorKey) -> Option<Value> {
    accounts
        .as_array()?
        .iter()
        .filter_map(Value::as_object)
        .find_map(|account| account_sensor_value(account, key))
}

fn account_sensor_value(account: &Map<String, Value>, key: SensorKey) -> Option<Value> {
    if key == SensorKey::Address {
        return account
            .get("adres")
            .and_then(Value::as_object)
            .filter(|address| !address.is_empty())
            .map(|address| Value::String(format_address(address)));
    }

    let elektra = first_elektra(account)?;
    let meters = meters(elektra);

    let value = match key {
        SensorKey::Address => None,
        SensorKey::ElectricityEan => elektra.get("ean").cloned(),
        SensorKey::ConnectionCapacity => elektra.get("aansluitwaarde").cloned(),
        SensorKey::Status => elektra.get("status").cloned(),
        SensorKey::NetworkCosts => elektra.get("netwerkkosten").cloned(),
        SensorKey::MaximumPower => elektra.get("maximaalVermogen").cloned(),
        SensorKey::NumberOfMeters => meters
            .filter(|list| !list.is_empty())
            .map(|list| Value::from(list.len())),
        SensorKey::MeterNumber => {
            first_meter(meters).and_then(|meter| meter.get("meternummer").cloned())
        }
        SensorKey::NumberOfRegisters => {
            first_meter(meters).and_then(|meter| meter.get("aantalTelwerken").cloned())
        }
        SensorKey::NumberOfPhases => {
            first_meter(meters).and_then(|meter| meter.get("aantalFasen").cloned())
        }
    };

    value.filter(|value| !value.is_null())
}

/// Resolves a binary sensor state; anything missing reads as off.
pub fn binary_value(accounts: &Value, key: BinaryKey) -> bool {
    let Some(accounts) = accounts.as_array() else {
        return false;
    };

    for account in accounts.iter().filter_map(Value::as_object) {
        let Some(elektra) = first_elektra(account) else {
            continue;
        };

        if key.read_from_meter() {
            if let Some(meter) = first_meter(meters(elektra)) {
                return truthy(meter.get(key.as_str()));
            }
            continue;
        }

        return truthy(elektra.get(key.as_str()));
    }

    false
}

/// Every electricity connection across all accounts, in payload order.
pub fn all_elektra(accounts: &Value) -> Vec<Value> {
    accounts
        .as_array()
        .map(|accounts| {
            accounts
                .iter()
                .filter_map(|account| account.pointer("/aansluitingen/elektra"))
                .filter_map(Value::as_array)
                .flatten()
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// Postcode of the first account that has one, e.g. `"1000 AAB"`.
pub fn first_postcode(accounts: &Value) -> Option<String> {
    accounts
        .as_array()?
        .iter()
        .filter_map(|account| account.pointer("/adres/postcode"))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|postcode| !postcode.is_empty())
        .map(ToString::to_string)
}

pub fn is_active_status(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|status| ACTIVE_STATUSES.contains(&status))
}

fn format_address(address: &Map<String, Value>) -> String {
    let street = text(address, "straat");
    let house_number = text(address, "huisnummer");
    let addition = text(address, "toevoeging");
    let postal_code = text(address, "postcode");
    let city = text(address, "plaats");

    format!("{street} {house_number}{addition} {postal_code} {city}")
        .trim()
        .to_string()
}

fn text(object: &Map<String, Value>, key: &str) -> String {
    match object.get(key) {
        Some(Value::String(value)) => value.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn first_elektra(account: &Map<String, Value>) -> Option<&Map<String, Value>> {
    account
        .get("aansluitingen")?
        .get("elektra")?
        .as_array()?
        .first()?
        .as_object()
}

fn meters(elektra: &Map<String, Value>) -> Option<&Vec<Value>> {
    elektra.get("meters").and_then(Value::as_array)
}

fn first_meter(meters: Option<&Vec<Value>>) -> Option<&Map<String, Value>> {
    meters?.first()?.as_object()
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(fields)) => !fields.is_empty(),
        Some(Value::Null) | None => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::{
        BinaryKey, SensorKey, all_elektra, binary_value, first_postcode, is_active_status,
        sensor_value,
    };
    use crate::test_support::sample_connections;

    #[test]
    fn maps_fixture_address() {
        let data = sample_connections();

        assert_eq!(
            sensor_value(&data, SensorKey::Address),
            Some(json!("Mijnstraat 1 1000 AAB AMSTERDAM"))
        );
    }

    #[test]
    fn maps_fixture_electricity_fields() {
        let data = sample_connections();

        assert_eq!(
            sensor_value(&data, SensorKey::ElectricityEan),
            Some(json!("123456789012345678"))
        );
        assert_eq!(
            sensor_value(&data, SensorKey::ConnectionCapacity),
            Some(json!("3x25A"))
        );
        assert_eq!(
            sensor_value(&data, SensorKey::Status),
            Some(json!("In bedrijf"))
        );
        assert_eq!(
            sensor_value(&data, SensorKey::NetworkCosts),
            Some(json!("400.92"))
        );
        assert_eq!(
            sensor_value(&data, SensorKey::MaximumPower),
            Some(json!("17"))
        );
    }

    #[test]
    fn maps_fixture_meter_fields() {
        let data = sample_connections();

        assert_eq!(sensor_value(&data, SensorKey::NumberOfMeters), Some(json!(1)));
        assert_eq!(
            sensor_value(&data, SensorKey::MeterNumber),
            Some(json!("E0000000000000000"))
        );
        assert_eq!(
            sensor_value(&data, SensorKey::NumberOfRegisters),
            Some(json!(4))
        );
        assert_eq!(
            sensor_value(&data, SensorKey::NumberOfPhases),
            Some(json!("3"))
        );
    }

    #[test]
    fn address_addition_is_appended_to_house_number() {
        let data = json!([{
            "adres": {
                "postcode": "1741 JB",
                "straat": "Dorpsweg",
                "huisnummer": "12",
                "toevoeging": "A",
                "plaats": "SCHAGEN"
            }
        }]);

        assert_eq!(
            sensor_value(&data, SensorKey::Address),
            Some(json!("Dorpsweg 12A 1741 JB SCHAGEN"))
        );
    }

    #[test]
    fn falls_through_to_next_account_with_electricity() {
        let data = json!([
            {"adres": {"straat": "Eerste"}, "aansluitingen": {"elektra": [], "gas": []}},
            {"aansluitingen": {"elektra": [{"ean": "999", "meters": []}]}}
        ]);

        assert_eq!(
            sensor_value(&data, SensorKey::ElectricityEan),
            Some(json!("999"))
        );
        assert_eq!(sensor_value(&data, SensorKey::NumberOfMeters), None);
        assert_eq!(sensor_value(&data, SensorKey::MeterNumber), None);
        assert_eq!(sensor_value(&data, SensorKey::Address), Some(json!("Eerste")));
    }

    #[test]
    fn empty_or_unexpected_payloads_yield_nothing() {
        assert_eq!(sensor_value(&json!([]), SensorKey::Status), None);
        assert_eq!(sensor_value(&Value::Null, SensorKey::Address), None);
        assert_eq!(sensor_value(&json!({"adres": {}}), SensorKey::Address), None);
        assert!(!binary_value(&json!([]), BinaryKey::Contract));
    }

    #[test]
    fn binary_sensors_default_to_off_when_fields_missing() {
        let data = sample_connections();

        assert!(!binary_value(&data, BinaryKey::Contract));
        assert!(!binary_value(&data, BinaryKey::SmartMeter));
        assert!(!binary_value(&data, BinaryKey::FeedingIn));
    }

    #[test]
    fn binary_sensors_read_connection_and_meter_flags() {
        let data = json!([{
            "aansluitingen": {
                "elektra": [{
                    "contract": true,
                    "toestemmingVoorUitlezen": false,
                    "levertTerug": true,
                    "meters": [{
                        "slimmeMeter": true,
                        "geschiktVoorTerugleveren": true,
                        "geschiktVoorDubbeltarief": false
                    }]
                }]
            }
        }]);

        assert!(binary_value(&data, BinaryKey::Contract));
        assert!(!binary_value(&data, BinaryKey::ReadPermission));
        assert!(binary_value(&data, BinaryKey::FeedingIn));
        assert!(binary_value(&data, BinaryKey::SmartMeter));
        assert!(binary_value(&data, BinaryKey::FeedInCapable));
        assert!(!binary_value(&data, BinaryKey::DualTariffCapable));
    }

    #[test]
    fn flattens_electricity_connections_across_accounts() {
        let data = json!([
            {"aansluitingen": {"elektra": [{"ean": "1"}, {"ean": "2"}]}},
            {"aansluitingen": {"gas": [{"ean": "3"}]}},
            {"aansluitingen": {"elektra": [{"ean": "4"}]}}
        ]);

        let eans: Vec<Value> = all_elektra(&data)
            .into_iter()
            .map(|elektra| elektra["ean"].clone())
            .collect();

        assert_eq!(eans, vec![json!("1"), json!("2"), json!("4")]);
    }

    #[test]
    fn finds_first_postcode() {
        assert_eq!(
            first_postcode(&sample_connections()),
            Some("1000 AAB".to_string())
        );
        assert_eq!(first_postcode(&json!([{"adres": {}}])), None);
    }

    #[test]
    fn recognises_active_statuses() {
        assert!(is_active_status(Some(&json!("In bedrijf"))));
        assert!(is_active_status(Some(&json!("Active"))));
        assert!(!is_active_status(Some(&json!("Buiten bedrijf"))));
        assert!(!is_active_status(None));
    }
}
