use serde::Deserialize;
use serde_json::Value;

pub const DEFAULT_TIMEOUT_SECS: u32 = 5;
pub const MIN_TIMEOUT_SECS: u32 = 1;
pub const MAX_TIMEOUT_SECS: u32 = 30;

/// Raw form submission. Every field is optional so that a missing value shows
/// up as a form error rather than a rejected request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlowInput {
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedInput {
    pub username: String,
    pub password: String,
    pub timeout_secs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowErrorCode {
    InvalidInput,
    InvalidAuth,
    Forbidden,
    NotFound,
    TooManyRequests,
    ServiceUnavailable,
    NetworkError,
    InvalidTimeout,
    AlreadyConfigured,
    UnknownError,
}

impl FlowErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::InvalidAuth => "invalid_auth",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::TooManyRequests => "too_many_requests",
            Self::ServiceUnavailable => "service_unavailable",
            Self::NetworkError => "network_error",
            Self::InvalidTimeout => "invalid_timeout",
            Self::AlreadyConfigured => "already_configured",
            Self::UnknownError => "unknown_error",
        }
    }

    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 => Self::InvalidAuth,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::TooManyRequests,
            503 => Self::ServiceUnavailable,
            _ => Self::UnknownError,
        }
    }

    /// Text shown on the form. Codes without a message fall back to `"unknown_error"`.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::InvalidAuth => "Invalid username or password.",
            Self::ServiceUnavailable => {
                "The service is currently unavailable. Please try again later."
            }
            Self::NetworkError => "Network error. Check your internet connection.",
            Self::InvalidTimeout => {
                "The timeout value is invalid. Please provide a value between 1 and 30 seconds."
            }
            Self::AlreadyConfigured => {
                "This entry is already configured. Please use a different username or update the existing configuration."
            }
            Self::UnknownError => "An unknown error occurred. Please try again.",
            Self::InvalidInput | Self::Forbidden | Self::NotFound | Self::TooManyRequests => {
                "unknown_error"
            }
        }
    }
}

pub fn validate_input(input: &FlowInput) -> Result<ValidatedInput, FlowErrorCode> {
    let username = required_text(input.username.as_deref())?;
    let password = input
        .password
        .as_deref()
        .filter(|value| !value.is_empty())
        .ok_or(FlowErrorCode::InvalidInput)?
        .to_string();
    let timeout_secs = match &input.timeout {
        None | Some(Value::Null) => DEFAULT_TIMEOUT_SECS,
        Some(raw) => parse_timeout(raw)?,
    };

    Ok(ValidatedInput {
        username,
        password,
        timeout_secs,
    })
}

fn required_text(value: Option<&str>) -> Result<String, FlowErrorCode> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .ok_or(FlowErrorCode::InvalidInput)
}

fn parse_timeout(raw: &Value) -> Result<u32, FlowErrorCode> {
    let value = match raw {
        Value::Number(number) => number.as_i64().ok_or(FlowErrorCode::InvalidInput)?,
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| FlowErrorCode::InvalidInput)?,
        _ => return Err(FlowErrorCode::InvalidInput),
    };

    if value < i64::from(MIN_TIMEOUT_SECS) || value > i64::from(MAX_TIMEOUT_SECS) {
        return Err(FlowErrorCode::InvalidInput);
    }

    u32::try_from(value).map_err(|_| FlowErrorCode::InvalidInput)
}
