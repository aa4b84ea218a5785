//! pencil-docker
//!
//! [`InstanceSource`] backed by the Docker Engine API.
//!
//! Lists running containers, inspects each, and emits one
//! [`InstanceRecord`] per exposed TCP port. The engine is reached over its
//! local socket (`unix:///var/run/docker.sock` by default) or over TCP.

mod container;
mod transport;

use std::time::Duration;

use pencil_config::DockerSettings;
use pencil_reconcile::{AdapterError, InstanceRecord, InstanceSource};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

pub use container::{image_name, split_tags, ContainerInspect, NamingRules};

use container::ContainerSummary;
use transport::Transport;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct DockerInstanceSource {
    endpoint: String,
    transport: Transport,
    rules: NamingRules,
}

impl DockerInstanceSource {
    /// Default naming rules and timeout.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, AdapterError> {
        Self::with_rules(endpoint, NamingRules::default(), DEFAULT_TIMEOUT)
    }

    pub fn with_rules(
        endpoint: impl Into<String>,
        rules: NamingRules,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        let endpoint = endpoint.into().trim().trim_end_matches('/').to_string();
        let transport = Transport::from_endpoint(&endpoint, timeout)?;
        Ok(Self {
            endpoint,
            transport,
            rules,
        })
    }

    /// `endpoint` is the resolved value of `PencilConfig::docker_endpoint`.
    pub fn from_settings(endpoint: &str, settings: &DockerSettings) -> Result<Self, AdapterError> {
        Self::with_rules(
            endpoint,
            NamingRules {
                name_env: settings.name_env.clone(),
                tags_label: settings.tags_label.clone(),
            },
            Duration::from_secs(settings.timeout_secs),
        )
    }

    /// Endpoint as configured, without a trailing slash.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn list_container_ids(&self) -> Result<Vec<String>, AdapterError> {
        let body = self.transport.get(&["containers", "json"]).await?.into_success()?;
        let rows: Vec<ContainerSummary> = decode(&body, "container list")?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    /// `Ok(None)` when the container vanished between list and inspect.
    async fn inspect(&self, id: &str) -> Result<Option<ContainerInspect>, AdapterError> {
        let reply = self.transport.get(&["containers", id, "json"]).await?;
        if reply.is_not_found() {
            return Ok(None);
        }
        let body = reply.into_success()?;
        decode(&body, &format!("inspect {id}")).map(Some)
    }
}

fn decode<T: DeserializeOwned>(body: &[u8], what: &str) -> Result<T, AdapterError> {
    serde_json::from_slice(body).map_err(|e| AdapterError::Decode(format!("{what}: {e}")))
}

#[async_trait::async_trait]
impl InstanceSource for DockerInstanceSource {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn list_running(&self) -> Result<Vec<InstanceRecord>, AdapterError> {
        let ids = self.list_container_ids().await?;
        let mut inspected = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.inspect(id).await? {
                Some(c) => inspected.push(c),
                None => debug!(container = %id, "container gone before inspect; skipped"),
            }
        }
        debug!(
            endpoint = %self.endpoint,
            socket = self.transport.is_local_socket(),
            containers = inspected.len(),
            "engine listing done"
        );
        Ok(build_records(&inspected, &self.rules))
    }
}

/// Flatten inspected containers into records, dropping the ones that fail
/// validation. Output is sorted by `(id, port)`.
pub fn build_records(containers: &[ContainerInspect], rules: &NamingRules) -> Vec<InstanceRecord> {
    let mut out: Vec<InstanceRecord> = Vec::new();
    for c in containers {
        for record in c.to_records(rules) {
            match record.validate() {
                Ok(()) => out.push(record),
                Err(reason) => warn!(
                    container = %c.id,
                    name = %c.name.trim_start_matches('/'),
                    %reason,
                    "container skipped"
                ),
            }
        }
    }
    out.sort_by(|a, b| a.id.cmp(&b.id).then(a.port.cmp(&b.port)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inspect(json: serde_json::Value) -> ContainerInspect {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn build_records_sorts_and_drops_invalid() {
        let rules = NamingRules::default();
        let containers = vec![
            inspect(serde_json::json!({
                "Id": "bbb",
                "Config": {"Image": "web"},
                "NetworkSettings": {"Ports": {"80/tcp": null}}
            })),
            // No image and no override: empty name.
            inspect(serde_json::json!({
                "Id": "ccc",
                "Name": "/unnamed_1",
                "Config": {"Image": ""},
                "NetworkSettings": {"Ports": {"80/tcp": null}}
            })),
            inspect(serde_json::json!({
                "Id": "aaa",
                "Config": {"Image": "db"},
                "NetworkSettings": {"Ports": {"5432/tcp": null, "0/tcp": null}}
            })),
        ];
        let recs = build_records(&containers, &rules);
        let got: Vec<(&str, u16)> = recs.iter().map(|r| (r.id.as_str(), r.port)).collect();
        assert_eq!(got, vec![("aaa", 5432), ("bbb", 80)]);
        assert_eq!(containers[1].name, "/unnamed_1");
    }

    #[test]
    fn endpoint_trailing_slash_trimmed() {
        let src = DockerInstanceSource::new("http://127.0.0.1:2375/").unwrap();
        assert_eq!(src.endpoint(), "http://127.0.0.1:2375");
        assert_eq!(src.name(), "docker");
    }

    #[cfg(unix)]
    #[test]
    fn default_socket_endpoint_is_accepted() {
        let src = DockerInstanceSource::from_settings(
            pencil_config::DEFAULT_DOCKER_ENDPOINT,
            &DockerSettings::default(),
        )
        .unwrap();
        assert_eq!(src.endpoint(), "unix:///var/run/docker.sock");
    }

    #[test]
    fn garbage_endpoint_is_a_config_error() {
        let err = DockerInstanceSource::new("not an endpoint").unwrap_err();
        assert!(matches!(err, AdapterError::Config(_)), "got {err:?}");
    }

    #[test]
    fn settings_carry_naming_rules() {
        let settings = DockerSettings {
            name_env: "SERVICE".to_string(),
            tags_label: "consul.tags".to_string(),
            ..DockerSettings::default()
        };
        let src = DockerInstanceSource::from_settings("http://h:1", &settings).unwrap();
        assert_eq!(src.rules.name_env, "SERVICE");
        assert_eq!(src.rules.tags_label, "consul.tags");
    }
}
