use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde_json::Value;
use thiserror::Error;

use crate::domain::outage::outage_where_clause;

pub const DEFAULT_API_BASE_URL: &str = "https://mijn-liander-gateway.web.liander.nl/api/v1";
pub const DEFAULT_OUTAGE_URL: &str = "https://services1.arcgis.com/v6W5HAVrpgSg3vts/ArcGIS/rest/services/IStoringen_Productie_V7/FeatureServer/0/query";

/// Timeout for every request the coordinator issues.
pub const REQUEST_TIMEOUT_SECONDS: u64 = 10;

pub trait LianderApi: Send + 'static {
    /// Exchanges credentials for a bearer token.
    fn login(&self, username: &str, password: &str) -> Result<String, ClientError>;
    fn connections(&self, token: &str) -> Result<Value, ClientError>;
    fn profile(&self, token: &str) -> Result<Value, ClientError>;
    fn application_details(&self, token: &str) -> Result<Value, ClientError>;
    fn outages(&self, postcode: &str) -> Result<Value, ClientError>;
    fn logout(&self, token: &str) -> Result<(), ClientError>;
}

impl<T: LianderApi + ?Sized> LianderApi for Box<T> {
    fn login(&self, username: &str, password: &str) -> Result<String, ClientError> {
        (**self).login(username, password)
    }

    fn connections(&self, token: &str) -> Result<Value, ClientError> {
        (**self).connections(token)
    }

    fn profile(&self, token: &str) -> Result<Value, ClientError> {
        (**self).profile(token)
    }

    fn application_details(&self, token: &str) -> Result<Value, ClientError> {
        (**self).application_details(token)
    }

    fn outages(&self, postcode: &str) -> Result<Value, ClientError> {
        (**self).outages(postcode)
    }

    fn logout(&self, token: &str) -> Result<(), ClientError> {
        (**self).logout(token)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("unexpected HTTP status {status}")]
    Status { status: u16 },
    #[error("invalid JSON response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("JWT token not found in login response")]
    MissingJwt,
    #[error("postcode {0:?} cannot be used for an outage lookup")]
    InvalidPostcode(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub api_base_url: String,
    pub outage_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            outage_url: DEFAULT_OUTAGE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LianderHttpClient {
    client: Client,
    endpoints: Endpoints,
}

impl LianderHttpClient {
    pub fn new(endpoints: Endpoints, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mijn-liander/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self { client, endpoints })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoints.api_base_url.trim_end_matches('/'))
    }

    fn get_authorized(&self, path: &str, token: &str) -> Result<Value, ClientError> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .map_err(ClientError::Transport)?;

        read_json(response)
    }
}

impl LianderApi for LianderHttpClient {
    fn login(&self, username: &str, password: &str) -> Result<String, ClientError> {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .map_err(ClientError::Transport)?;

        let body = read_json(response)?;
        body.get("jwt")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(ToString::to_string)
            .ok_or(ClientError::MissingJwt)
    }

    fn connections(&self, token: &str) -> Result<Value, ClientError> {
        self.get_authorized("/aansluitingen", token)
    }

    fn profile(&self, token: &str) -> Result<Value, ClientError> {
        self.get_authorized("/profielen/me", token)
    }

    fn application_details(&self, token: &str) -> Result<Value, ClientError> {
        self.get_authorized("/aanvraaggegevens", token)
    }

    fn outages(&self, postcode: &str) -> Result<Value, ClientError> {
        let where_clause = outage_where_clause(postcode)
            .ok_or_else(|| ClientError::InvalidPostcode(postcode.to_string()))?;
        let response = self
            .client
            .get(&self.endpoints.outage_url)
            .query(&[
                ("outFields", "*"),
                ("f", "json"),
                ("where", where_clause.as_str()),
            ])
            .send()
            .map_err(ClientError::Transport)?;

        read_json(response)
    }

    fn logout(&self, token: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url("/auth/logout"))
            .bearer_auth(token)
            .send()
            .map_err(ClientError::Transport)?;

        match response.status().as_u16() {
            200 | 204 => Ok(()),
            status => Err(ClientError::Status { status }),
        }
    }
}

fn read_json(response: Response) -> Result<Value, ClientError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::Status {
            status: status.as_u16(),
        });
    }

    let body = response.text().map_err(ClientError::Transport)?;
    serde_json::from_str(&body).map_err(ClientError::from)
}
