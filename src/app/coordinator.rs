use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::adapters::liander_http::{ClientError, LianderApi};
use crate::domain::connection::first_postcode;
use crate::domain::models::format_timestamp;
use crate::domain::outage::normalize_postcode;
use crate::domain::token::{Clock, TokenLifecycle, TokenState};

/// The one error the coordinator reports, whatever went wrong underneath.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct UpdateFailed(pub String);

impl UpdateFailed {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Point-in-time copy of what the coordinator knows, shared with the HTTP surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoordinatorSnapshot {
    pub data: Option<Value>,
    pub last_update_success: bool,
    pub last_error: Option<String>,
    pub last_updated: Option<String>,
    pub token_expires_at: Option<String>,
}

pub struct Coordinator<A, C> {
    api: A,
    clock: C,
    credentials: Credentials,
    token: TokenLifecycle,
    data: Option<Value>,
    last_update_success: bool,
    last_error: Option<String>,
    last_updated: Option<DateTime<Utc>>,
}

impl<A, C> Coordinator<A, C>
where
    A: LianderApi,
    C: Clock,
{
    pub fn new(api: A, clock: C, credentials: Credentials) -> Self {
        Self {
            api,
            clock,
            credentials,
            token: TokenLifecycle::new(),
            data: None,
            last_update_success: false,
            last_error: None,
            last_updated: None,
        }
    }

    /// Logs in with the stored credentials and installs the returned token.
    pub fn renew_token(&mut self) -> Result<(), UpdateFailed> {
        tracing::debug!(username = %self.credentials.username, "renewing Liander token");

        let token = self
            .api
            .login(&self.credentials.username, &self.credentials.password)
            .map_err(|error| {
                tracing::error!(error = %error, "token renewal failed");
                match error {
                    ClientError::MissingJwt => {
                        UpdateFailed::new("JWT token not found in login response.")
                    }
                    ClientError::Json(_) => {
                        UpdateFailed::new("Invalid JSON response during token renewal.")
                    }
                    ClientError::Status { status: 401 } => {
                        UpdateFailed::new("Unauthorized, token expired.")
                    }
                    other => UpdateFailed::new(format!("Error renewing token: {other}")),
                }
            })?;

        let now = self.clock.now();
        self.token.install(token, now).map_err(|error| {
            tracing::error!(error = %error, "failed to decode JWT token");
            self.token.clear();
            UpdateFailed::new(format!("JWT decode error: {error}"))
        })?;

        tracing::info!(
            expires_at = ?self.token.expires_at(),
            "Liander token renewed"
        );
        Ok(())
    }

    /// True when no usable token is held. Warns once per token when it is about to expire.
    pub fn is_token_expired(&mut self) -> bool {
        let now = self.clock.now();

        if self.token.take_expiry_warning(now) {
            tracing::warn!(
                expires_at = ?self.token.expires_at(),
                "token is about to expire in less than 30 minutes"
            );
        }

        self.token.is_expired(now)
    }

    pub fn token_state(&self) -> TokenState {
        self.token.state_at(self.clock.now())
    }

    /// Returns a token that is safe to use, renewing it first if needed.
    pub fn valid_token(&mut self) -> Result<String, UpdateFailed> {
        if self.is_token_expired() {
            self.renew_token()?;
        }

        self.token
            .token()
            .map(ToString::to_string)
            .ok_or_else(|| UpdateFailed::new("Token is not available after renewal."))
    }

    /// One polling tick. The previous payload is kept when the tick fails.
    pub fn refresh(&mut self) -> Result<(), UpdateFailed> {
        let result = self.authorized(|api, token| api.connections(token));

        match result {
            Ok(data) => {
                let accounts = data.as_array().map_or(0, Vec::len);
                self.data = Some(data);
                self.last_update_success = true;
                self.last_error = None;
                self.last_updated = Some(self.clock.now());
                tracing::debug!(accounts, "connection data refreshed");
                Ok(())
            }
            Err(error) => {
                self.last_update_success = false;
                self.last_error = Some(error.to_string());
                Err(error)
            }
        }
    }

    pub fn fetch_profile(&mut self) -> Result<Value, UpdateFailed> {
        self.authorized(|api, token| api.profile(token))
    }

    pub fn fetch_application_details(&mut self) -> Result<Value, UpdateFailed> {
        self.authorized(|api, token| api.application_details(token))
    }

    /// Outage feed for the postcode of the first account in the last payload.
    pub fn fetch_outages(&mut self) -> Result<Value, UpdateFailed> {
        let postcode = self
            .data
            .as_ref()
            .and_then(first_postcode)
            .and_then(|postcode| normalize_postcode(&postcode))
            .ok_or_else(|| UpdateFailed::new("No postcode available for outage lookup."))?;

        self.api.outages(&postcode).map_err(|error| {
            tracing::error!(error = %error, "error fetching outage feed");
            match error {
                ClientError::Json(_) => {
                    UpdateFailed::new("Invalid JSON response from outage feed.")
                }
                other => UpdateFailed::new(format!("Error fetching outage feed: {other}")),
            }
        })
    }

    /// Ends the remote session. Failures are logged and otherwise ignored.
    pub fn logout(&mut self) {
        if let Some(token) = self.token.token()
            && let Err(error) = self.api.logout(token)
        {
            tracing::warn!(error = %error, "logout request failed");
        }
        self.token.clear();
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            data: self.data.clone(),
            last_update_success: self.last_update_success,
            last_error: self.last_error.clone(),
            last_updated: self.last_updated.map(format_timestamp),
            token_expires_at: self.token.expires_at().map(format_timestamp),
        }
    }

    fn authorized<T>(
        &mut self,
        request: impl FnOnce(&A, &str) -> Result<T, ClientError>,
    ) -> Result<T, UpdateFailed> {
        let token = self.valid_token()?;

        request(&self.api, &token).map_err(|error| self.request_failed(error))
    }

    fn request_failed(&mut self, error: ClientError) -> UpdateFailed {
        match error {
            ClientError::Status { status: 401 } => {
                tracing::error!("token expired or unauthorized");
                self.token.clear();
                UpdateFailed::new("Unauthorized, token expired.")
            }
            ClientError::Status { status: 503 } => {
                tracing::error!("token expired or service unavailable");
                UpdateFailed::new("Service unavailable, token expired.")
            }
            ClientError::Json(_) => {
                tracing::error!("invalid JSON response received from Liander API");
                UpdateFailed::new("Invalid JSON response from Liander API.")
            }
            other => {
                tracing::error!(error = %other, "error fetching data from Liander API");
                UpdateFailed::new(format!("Error fetching data from Liander API: {other}"))
            }
        }
    }
}
