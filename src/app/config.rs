use crate::adapters::liander_http::{DEFAULT_API_BASE_URL, DEFAULT_OUTAGE_URL, Endpoints};
use crate::app::AppError;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 6 * 60 * 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub http_bind: String,
    pub api_base_url: String,
    pub outage_url: String,
    pub poll_interval_secs: u64,
    pub bootstrap_account: Option<BootstrapAccount>,
}

/// Credentials supplied through the environment, imported as an entry at startup.
#[derive(Clone)]
pub struct BootstrapAccount {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAccount")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let poll_interval_secs =
            parse_or_default(&lookup, "POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        if poll_interval_secs == 0 {
            return Err(AppError::config("POLL_INTERVAL_SECS must be greater than zero"));
        }

        let bootstrap_account = match (
            non_empty(&lookup, "LIANDER_USERNAME"),
            non_empty(&lookup, "LIANDER_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(BootstrapAccount { username, password }),
            (None, None) => None,
            _ => {
                return Err(AppError::config(
                    "LIANDER_USERNAME and LIANDER_PASSWORD must be set together",
                ));
            }
        };

        Ok(Self {
            db_path: non_empty(&lookup, "LIANDER_DB_PATH")
                .unwrap_or_else(|| "/var/lib/mijn-liander/entries.db".to_string()),
            http_bind: non_empty(&lookup, "HTTP_BIND")
                .unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            api_base_url: non_empty(&lookup, "LIANDER_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            outage_url: non_empty(&lookup, "LIANDER_OUTAGE_URL")
                .unwrap_or_else(|| DEFAULT_OUTAGE_URL.to_string()),
            poll_interval_secs,
            bootstrap_account,
        })
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            api_base_url: self.api_base_url.clone(),
            outage_url: self.outage_url.clone(),
        }
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}
