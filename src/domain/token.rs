use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use thiserror::Error;

/// Tokens are renewed once the clock is this close to the `exp` claim.
pub const EXPIRY_BUFFER_MINUTES: i64 = 5;
/// Tokens this close to the `exp` claim are still used but reported.
pub const EXPIRY_WARNING_MINUTES: i64 = 30;
/// Lifetime assumed for tokens that carry no `exp` claim.
pub const DEFAULT_TOKEN_LIFETIME_MINUTES: i64 = 60;

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Absent,
    Valid,
    Expiring,
    Expired,
}

impl TokenState {
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Valid | Self::Expiring)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TokenError {
    #[error("token is not a three-part JWT")]
    Malformed,
    #[error("token payload is not valid base64url: {0}")]
    Encoding(String),
    #[error("token payload is not a JSON object: {0}")]
    Payload(String),
    #[error("token exp claim is not a valid unix timestamp")]
    InvalidExpiry,
}

/// Reads the `exp` claim without verifying the signature.
///
/// Returns `Ok(None)` when the payload has no `exp` claim.
pub fn decode_expiry(token: &str) -> Result<Option<DateTime<Utc>>, TokenError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(TokenError::Malformed);
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|error| TokenError::Encoding(error.to_string()))?;
    let claims: Value =
        serde_json::from_slice(&bytes).map_err(|error| TokenError::Payload(error.to_string()))?;
    let claims = claims
        .as_object()
        .ok_or_else(|| TokenError::Payload("expected an object".to_string()))?;

    match claims.get("exp") {
        None | Some(Value::Null) => Ok(None),
        Some(exp) => {
            let seconds = exp
                .as_i64()
                .or_else(|| exp.as_f64().map(|value| value.floor() as i64))
                .ok_or(TokenError::InvalidExpiry)?;
            DateTime::<Utc>::from_timestamp(seconds, 0)
                .map(Some)
                .ok_or(TokenError::InvalidExpiry)
        }
    }
}

/// Bearer token plus its decoded expiry.
#[derive(Debug, Clone, Default)]
pub struct TokenLifecycle {
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    warned_for_current: bool,
}

impl TokenLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a freshly issued token. A token without `exp` is given the default lifetime.
    pub fn install(&mut self, token: String, now: DateTime<Utc>) -> Result<(), TokenError> {
        let expires_at = decode_expiry(&token)?
            .unwrap_or_else(|| {
                now.checked_add_signed(Duration::minutes(DEFAULT_TOKEN_LIFETIME_MINUTES))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            });

        self.token = Some(token);
        self.expires_at = Some(expires_at);
        self.warned_for_current = false;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.token = None;
        self.expires_at = None;
        self.warned_for_current = false;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> TokenState {
        let (Some(_), Some(expires_at)) = (&self.token, self.expires_at) else {
            return TokenState::Absent;
        };

        // Boundaries before the earliest representable instant are already behind us.
        let expired_from = expires_at.checked_sub_signed(Duration::minutes(EXPIRY_BUFFER_MINUTES));
        let expiring_from =
            expires_at.checked_sub_signed(Duration::minutes(EXPIRY_WARNING_MINUTES));

        match (expired_from, expiring_from) {
            (None, _) => TokenState::Expired,
            (Some(expired_from), _) if expired_from <= now => TokenState::Expired,
            (_, Some(expiring_from)) if expiring_from > now => TokenState::Valid,
            _ => TokenState::Expiring,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.state_at(now).is_usable()
    }

    /// True exactly once per installed token, the first time it is seen expiring.
    pub fn take_expiry_warning(&mut self, now: DateTime<Utc>) -> bool {
        if self.state_at(now) == TokenState::Expiring && !self.warned_for_current {
            self.warned_for_current = true;
            return true;
        }
        false
    }
}

#[cfg(test)]
pub(crate) fn encode_test_jwt(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}
