//! pencil-consul
//!
//! [`RegistrySink`] backed by the local Consul agent HTTP API:
//!
//! - `GET  /v1/agent/services`
//! - `PUT  /v1/agent/service/register`
//! - `PUT  /v1/agent/service/deregister/{id}`
//!
//! The ACL token is read from the environment by the caller and sent as
//! `X-Consul-Token`. It is never logged.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::Duration;

use pencil_config::ConsulSettings;
use pencil_reconcile::{AdapterError, RegistryEntry, RegistrySink};
use reqwest::Url;
use serde::Serialize;
use tracing::debug;

const TOKEN_HEADER: &str = "X-Consul-Token";

/// Registration payload, in the agent's field casing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl ServiceRegistration {
    pub fn from_entry(entry: &RegistryEntry, address: Option<&str>) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.service.clone(),
            tags: entry.tags.clone(),
            port: entry.port,
            address: address.map(str::to_string),
        }
    }
}

#[derive(Clone)]
pub struct ConsulRegistrySink {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
    ignore_ids: BTreeSet<String>,
    service_address: Option<String>,
}

impl fmt::Debug for ConsulRegistrySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsulRegistrySink")
            .field("base_url", &self.base_url())
            .field("token", &self.token.as_ref().map(|_| "REDACTED"))
            .field("ignore_ids", &self.ignore_ids)
            .field("service_address", &self.service_address)
            .finish()
    }
}

impl ConsulRegistrySink {
    /// No token, ignores the agent's own `consul` entry, 10s timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, AdapterError> {
        let defaults = ConsulSettings::default();
        Self::build(base_url.into(), None, &defaults)
    }

    /// `address` is the resolved agent URL (see `PencilConfig::consul_address`);
    /// `token` is the value of the env var named by `settings.token_env`.
    pub fn from_settings(
        address: &str,
        settings: &ConsulSettings,
        token: Option<String>,
    ) -> Result<Self, AdapterError> {
        Self::build(address.to_string(), token, settings)
    }

    fn build(
        base_url: String,
        token: Option<String>,
        settings: &ConsulSettings,
    ) -> Result<Self, AdapterError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AdapterError::Config(format!("consul http client: {e}")))?;
        let base = Url::parse(base_url.trim())
            .map_err(|e| AdapterError::Config(format!("consul address {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(AdapterError::Config(format!(
                "consul address {base_url} cannot carry a path"
            )));
        }
        Ok(Self {
            http,
            base,
            token: token.filter(|t| !t.trim().is_empty()),
            ignore_ids: settings.ignore_ids.iter().cloned().collect(),
            service_address: settings.service_address.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// Agent URL for `segments`, each one percent-encoded as a single path
    /// segment, so an id can never spill into the query, fragment or a
    /// neighbouring path.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn ignores(&self, id: &str) -> bool {
        self.ignore_ids.contains(id)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.header(TOKEN_HEADER, token),
            None => req,
        }
    }
}

#[async_trait::async_trait]
impl RegistrySink for ConsulRegistrySink {
    fn name(&self) -> &'static str {
        "consul"
    }

    async fn list_registered_ids(&self) -> Result<Vec<String>, AdapterError> {
        let url = self.endpoint(&["v1", "agent", "services"]);
        let resp = self
            .authed(self.http.get(url))
            .send()
            .await
            .map_err(transport)?;
        let resp = ensure_success(resp).await?;
        let services: HashMap<String, serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| AdapterError::Decode(format!("agent services: {e}")))?;

        let ids: BTreeSet<String> = services
            .into_keys()
            .filter(|id| !self.ignores(id))
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn register(&self, entry: &RegistryEntry) -> Result<(), AdapterError> {
        let body = ServiceRegistration::from_entry(entry, self.service_address.as_deref());
        let url = self.endpoint(&["v1", "agent", "service", "register"]);
        let resp = self
            .authed(self.http.put(url).json(&body))
            .send()
            .await
            .map_err(transport)?;
        ensure_success(resp).await?;
        debug!(id = %entry.id, service = %entry.service, port = entry.port, "consul register ok");
        Ok(())
    }

    async fn deregister(&self, id: &str) -> Result<(), AdapterError> {
        let url = self.endpoint(&["v1", "agent", "service", "deregister", id]);
        let resp = self
            .authed(self.http.put(url))
            .send()
            .await
            .map_err(transport)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AdapterError::NotFound { id: id.to_string() });
        }
        ensure_success(resp).await?;
        debug!(id = %id, "consul deregister ok");
        Ok(())
    }
}

fn transport(e: reqwest::Error) -> AdapterError {
    AdapterError::Transport(e.to_string())
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, AdapterError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(AdapterError::Api {
        status: status.as_u16(),
        message: message.trim().to_string(),
    })
}
