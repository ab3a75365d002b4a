use chrono::{DateTime, SecondsFormat, Utc};

/// A configured Liander account as kept in the entry store.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub unique_id: String,
    pub title: String,
    pub username: String,
    pub password: String,
    pub timeout_secs: u32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewConfigEntry {
    pub unique_id: String,
    pub title: String,
    pub username: String,
    pub password: String,
    pub timeout_secs: u32,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CredentialsUpdate {
    pub username: String,
    pub password: String,
    pub timeout_secs: u32,
    pub updated_at: String,
}

/// Timestamps are stored and served as RFC 3339 UTC with millisecond precision.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
