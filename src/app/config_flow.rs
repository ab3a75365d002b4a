use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::adapters::db::DbError;
use crate::adapters::liander_http::{ClientError, Endpoints, LianderApi, LianderHttpClient};
use crate::app::services::{EntryCommandHandler, EntryQueryHandler, ServiceError};
use crate::domain::config_flow::{FlowErrorCode, FlowInput, ValidatedInput, validate_input};
use crate::domain::models::{ConfigEntry, CredentialsUpdate, NewConfigEntry, format_timestamp};

pub const STEP_USER: &str = "user";
pub const STEP_REAUTH: &str = "reauth";
pub const ABORT_ALREADY_CONFIGURED: &str = "already_configured";
pub const ABORT_REAUTH_SUCCESSFUL: &str = "reauth_successful";

/// Verifies credentials against the remote login endpoint.
pub trait CredentialCheck: Send + Sync {
    fn check(&self, input: &ValidatedInput) -> Result<(), FlowErrorCode>;
}

#[derive(Debug, Clone)]
pub struct HttpCredentialCheck {
    endpoints: Endpoints,
}

impl HttpCredentialCheck {
    pub fn new(endpoints: Endpoints) -> Self {
        Self { endpoints }
    }
}

impl CredentialCheck for HttpCredentialCheck {
    fn check(&self, input: &ValidatedInput) -> Result<(), FlowErrorCode> {
        let client = LianderHttpClient::new(
            self.endpoints.clone(),
            Duration::from_secs(u64::from(input.timeout_secs)),
        )
        .map_err(|error| {
            tracing::error!(error = %error, "failed to build validation client");
            FlowErrorCode::UnknownError
        })?;

        client
            .login(&input.username, &input.password)
            .map(|_| ())
            .map_err(login_error_code)
    }
}

pub fn login_error_code(error: ClientError) -> FlowErrorCode {
    match error {
        ClientError::Status { status } => {
            let code = FlowErrorCode::from_http_status(status);
            if code == FlowErrorCode::UnknownError {
                tracing::error!(status, "unhandled HTTP error during validation");
            } else {
                tracing::debug!(status, code = code.as_str(), "mapped HTTP error");
            }
            code
        }
        ClientError::Transport(error) => {
            tracing::error!(error = %error, "network error validating credentials");
            FlowErrorCode::NetworkError
        }
        ClientError::MissingJwt => {
            tracing::warn!("JWT token not found in response");
            FlowErrorCode::InvalidAuth
        }
        ClientError::Json(error) => {
            tracing::error!(error = %error, "unexpected login response during validation");
            FlowErrorCode::UnknownError
        }
        ClientError::Build(error) => {
            tracing::error!(error = %error, "failed to build validation client");
            FlowErrorCode::UnknownError
        }
        ClientError::InvalidPostcode(_) => FlowErrorCode::UnknownError,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome {
    CreateEntry(ConfigEntry),
    /// Reauth succeeded; the entry carries the new credentials.
    Reauthenticated(ConfigEntry),
    Abort { reason: &'static str },
    ShowForm { step_id: &'static str, base_error: String },
}

/// Runs the user and reauth steps against the entry store.
pub struct ConfigFlow<'a, S, K: ?Sized> {
    store: &'a S,
    check: &'a K,
}

impl<'a, S, K> ConfigFlow<'a, S, K>
where
    S: EntryQueryHandler + EntryCommandHandler,
    K: CredentialCheck + ?Sized,
{
    pub fn new(store: &'a S, check: &'a K) -> Self {
        Self { store, check }
    }

    pub fn user_step(
        &self,
        input: &FlowInput,
        now: DateTime<Utc>,
    ) -> Result<FlowOutcome, ServiceError> {
        let validated = match validate_input(input) {
            Ok(validated) => validated,
            Err(code) => {
                tracing::error!(code = code.as_str(), "schema validation failed");
                return Ok(show_form(STEP_USER, code.as_str()));
            }
        };

        if let Err(code) = self.check.check(&validated) {
            tracing::error!(code = code.as_str(), "credential validation failed");
            return Ok(show_form(STEP_USER, code.user_message()));
        }

        let unique_id = validated.username.clone();
        if self.store.get_entry_by_unique_id(&unique_id)?.is_some() {
            tracing::debug!(unique_id = %unique_id, "unique id is already configured");
            return Ok(FlowOutcome::Abort {
                reason: ABORT_ALREADY_CONFIGURED,
            });
        }

        let new_entry = NewConfigEntry {
            unique_id: unique_id.clone(),
            title: validated.username.clone(),
            username: validated.username,
            password: validated.password,
            timeout_secs: validated.timeout_secs,
            created_at: format_timestamp(now),
        };

        match self.store.insert_entry(&new_entry) {
            Ok(entry) => {
                tracing::info!(
                    entry_id = %entry.entry_id,
                    unique_id = %unique_id,
                    "config entry created"
                );
                Ok(FlowOutcome::CreateEntry(entry))
            }
            Err(ServiceError::Database(DbError::DuplicateUniqueId(_))) => Ok(FlowOutcome::Abort {
                reason: ABORT_ALREADY_CONFIGURED,
            }),
            Err(error) => Err(error),
        }
    }

    /// Failures report the raw error code, unlike the user step.
    pub fn reauth_step(
        &self,
        entry: &ConfigEntry,
        input: &FlowInput,
        now: DateTime<Utc>,
    ) -> Result<FlowOutcome, ServiceError> {
        let validated = match validate_input(input) {
            Ok(validated) => validated,
            Err(code) => return Ok(show_form(STEP_REAUTH, code.as_str())),
        };

        if let Err(code) = self.check.check(&validated) {
            tracing::warn!(
                entry_id = %entry.entry_id,
                code = code.as_str(),
                "reauthentication failed"
            );
            return Ok(show_form(STEP_REAUTH, code.as_str()));
        }

        let updated = self.store.update_credentials(
            &entry.entry_id,
            &CredentialsUpdate {
                username: validated.username,
                password: validated.password,
                timeout_secs: validated.timeout_secs,
                updated_at: format_timestamp(now),
            },
        )?;

        tracing::info!(entry_id = %updated.entry_id, "config entry reauthenticated");
        Ok(FlowOutcome::Reauthenticated(updated))
    }
}

fn show_form(step_id: &'static str, base_error: &str) -> FlowOutcome {
    FlowOutcome::ShowForm {
        step_id,
        base_error: base_error.to_string(),
    }
}
