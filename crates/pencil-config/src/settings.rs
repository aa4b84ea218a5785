//! Typed view of the merged configuration document.
//!
//! Every field has a default, so an empty document is a valid config. After
//! deserialization, [`PencilConfig::resolve`] applies environment overrides
//! and normalizes endpoints: HTTP ones into plain `http(s)://host:port` base
//! URLs, local Docker sockets (`unix://`, `npipe://`) kept as given.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_DOCKER_ENDPOINT: &str = "unix:///var/run/docker.sock";
pub const DEFAULT_CONSUL_ADDRESS: &str = "http://127.0.0.1:8500";
pub const DEFAULT_HTTP_LISTEN: &str = "127.0.0.1:9898";

/// Unknown top-level keys are tolerated here and surfaced by
/// [`crate::report_unused_keys`]; unknown keys inside a section are errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PencilConfig {
    pub sync: SyncSettings,
    pub docker: DockerSettings,
    pub consul: ConsulSettings,
    pub http: HttpSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    pub interval_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DockerSettings {
    /// Engine API endpoint: `unix://`, `npipe://`, `tcp://` or `http(s)://`.
    /// Falls back to `DOCKER_HOST`, then [`DEFAULT_DOCKER_ENDPOINT`].
    pub endpoint: Option<String>,
    /// Env var inside a container that overrides its service name.
    pub name_env: String,
    /// Container label holding comma-separated service tags.
    pub tags_label: String,
    pub timeout_secs: u64,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            name_env: "SRV_NAME".to_string(),
            tags_label: "tags".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsulSettings {
    /// Agent HTTP address. Falls back to `CONSUL_HTTP_ADDR`, then
    /// [`DEFAULT_CONSUL_ADDRESS`].
    pub address: Option<String>,
    /// Name of the env var holding the ACL token (the token itself never
    /// appears in config).
    pub token_env: String,
    /// Registered ids outside the namespace pencil owns.
    pub ignore_ids: Vec<String>,
    /// `Address` sent with every registration; the agent's own when unset.
    pub service_address: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ConsulSettings {
    fn default() -> Self {
        Self {
            address: None,
            token_env: "CONSUL_HTTP_TOKEN".to_string(),
            ignore_ids: vec!["consul".to_string()],
            service_address: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSettings {
    pub enabled: bool,
    pub listen: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: DEFAULT_HTTP_LISTEN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl PencilConfig {
    pub fn from_json(config_json: &Value) -> Result<Self> {
        serde_json::from_value(config_json.clone()).context("config does not match schema")
    }

    /// Apply overrides from the process environment, then validate.
    pub fn resolve_from_env(self) -> Result<Self> {
        self.resolve(|k| std::env::var(k).ok())
    }

    /// Apply overrides from `env`, normalize endpoints, validate.
    ///
    /// Overrides: `PENCIL_SYNC_INTERVAL_SECS`, `PENCIL_HTTP_LISTEN`; endpoint
    /// fallbacks `DOCKER_HOST`, `CONSUL_HTTP_ADDR`.
    pub fn resolve<F>(mut self, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = env("PENCIL_SYNC_INTERVAL_SECS") {
            self.sync.interval_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("PENCIL_SYNC_INTERVAL_SECS is not an integer: {raw}"))?;
        }
        if let Some(listen) = env("PENCIL_HTTP_LISTEN") {
            self.http.listen = listen;
        }

        let docker = self
            .docker
            .endpoint
            .take()
            .or_else(|| env("DOCKER_HOST"))
            .unwrap_or_else(|| DEFAULT_DOCKER_ENDPOINT.to_string());
        self.docker.endpoint = Some(normalize_docker_endpoint(&docker)?);

        let consul = self
            .consul
            .address
            .take()
            .or_else(|| env("CONSUL_HTTP_ADDR"))
            .unwrap_or_else(|| DEFAULT_CONSUL_ADDRESS.to_string());
        self.consul.address = Some(normalize_http_base(&consul));

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.interval_secs == 0 {
            bail!("sync.interval_secs must be > 0");
        }
        if self.docker.timeout_secs == 0 || self.consul.timeout_secs == 0 {
            bail!("adapter timeout_secs must be > 0");
        }
        if self.docker.name_env.trim().is_empty() {
            bail!("docker.name_env must not be empty");
        }
        if self.http.enabled {
            self.listen_addr()?;
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.http
            .listen
            .parse()
            .with_context(|| format!("http.listen is not a socket address: {}", self.http.listen))
    }

    /// Docker endpoint; only meaningful after [`PencilConfig::resolve`].
    pub fn docker_endpoint(&self) -> &str {
        self.docker
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_DOCKER_ENDPOINT)
    }

    /// Consul base URL; only meaningful after [`PencilConfig::resolve`].
    pub fn consul_address(&self) -> &str {
        self.consul
            .address
            .as_deref()
            .unwrap_or(DEFAULT_CONSUL_ADDRESS)
    }
}

/// `tcp://h:p` becomes `http://h:p`; socket endpoints pass through untouched.
fn normalize_docker_endpoint(raw: &str) -> Result<String> {
    let t = raw.trim();
    for scheme in ["unix://", "npipe://"] {
        if let Some(path) = t.strip_prefix(scheme) {
            if path.is_empty() {
                bail!("docker endpoint {t} names no socket path");
            }
            return Ok(t.to_string());
        }
    }
    if let Some(rest) = t.strip_prefix("tcp://") {
        return Ok(format!("http://{}", rest.trim_end_matches('/')));
    }
    Ok(normalize_http_base(t))
}

fn normalize_http_base(raw: &str) -> String {
    let t = raw.trim().trim_end_matches('/');
    if t.starts_with("http://") || t.starts_with("https://") {
        t.to_string()
    } else {
        format!("http://{t}")
    }
}
