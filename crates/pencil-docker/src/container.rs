//! Docker Engine wire types and the pure mapping from an inspected container
//! to instance records.

use std::collections::HashMap;

use pencil_reconcile::InstanceRecord;
use serde::Deserialize;
use serde_json::Value;

/// Row of `GET /containers/json`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ContainerSummary {
    #[serde(rename = "Id")]
    pub id: String,
}

/// Subset of `GET /containers/{id}/json` the mapping needs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: Option<ContainerConfig>,
    #[serde(default)]
    pub network_settings: Option<NetworkSettings>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub env: Option<Vec<String>>,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSettings {
    /// `"8080/tcp" -> [bindings] | null`
    #[serde(default)]
    pub ports: Option<HashMap<String, Value>>,
}

/// How service names and tags are read off a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingRules {
    pub name_env: String,
    pub tags_label: String,
}

impl Default for NamingRules {
    fn default() -> Self {
        Self {
            name_env: "SRV_NAME".to_string(),
            tags_label: "tags".to_string(),
        }
    }
}

impl ContainerInspect {
    /// Exposed TCP ports, ascending, without duplicates.
    pub fn exposed_tcp_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self
            .network_settings
            .as_ref()
            .and_then(|n| n.ports.as_ref())
            .map(|m| {
                m.keys()
                    .filter_map(|key| {
                        let (port, proto) = key.split_once('/')?;
                        if proto != "tcp" {
                            return None;
                        }
                        port.parse::<u16>().ok()
                    })
                    .collect()
            })
            .unwrap_or_default();
        ports.sort_unstable();
        ports.dedup();
        ports
    }

    pub fn env(&self) -> HashMap<&str, &str> {
        self.config
            .as_ref()
            .and_then(|c| c.env.as_ref())
            .map(|vars| vars.iter().filter_map(|kv| kv.split_once('=')).collect())
            .unwrap_or_default()
    }

    /// Override env var when set and non-empty, otherwise the image name.
    pub fn service_name(&self, rules: &NamingRules) -> String {
        if let Some(name) = self.env().get(rules.name_env.as_str()) {
            if !name.trim().is_empty() {
                return name.trim().to_string();
            }
        }
        let image = self.config.as_ref().map(|c| c.image.as_str()).unwrap_or("");
        image_name(image)
    }

    pub fn tags(&self, rules: &NamingRules) -> Vec<String> {
        self.config
            .as_ref()
            .and_then(|c| c.labels.as_ref())
            .and_then(|l| l.get(&rules.tags_label))
            .map(|raw| split_tags(raw))
            .unwrap_or_default()
    }

    /// One record per exposed TCP port.
    pub fn to_records(&self, rules: &NamingRules) -> Vec<InstanceRecord> {
        let name = self.service_name(rules);
        let tags = self.tags(rules);
        self.exposed_tcp_ports()
            .into_iter()
            .map(|port| InstanceRecord {
                id: self.id.clone(),
                name: name.clone(),
                port,
                tags: tags.clone(),
            })
            .collect()
    }
}

/// `registry:5000/team/web:1.2` -> `web`; digests are dropped too.
pub fn image_name(image: &str) -> String {
    let last = image.rsplit('/').next().unwrap_or(image);
    let last = last.split('@').next().unwrap_or(last);
    last.split(':').next().unwrap_or(last).to_string()
}

pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inspect(json: Value) -> ContainerInspect {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn image_name_strips_registry_path_tag_and_digest() {
        assert_eq!(image_name("redis"), "redis");
        assert_eq!(image_name("redis:7"), "redis");
        assert_eq!(image_name("alaa/pencil"), "pencil");
        assert_eq!(image_name("registry.local:5000/team/web:1.2"), "web");
        assert_eq!(image_name("team/web@sha256:abcd"), "web");
        assert_eq!(image_name(""), "");
    }

    #[test]
    fn only_tcp_ports_sorted() {
        let c = inspect(serde_json::json!({
            "Id": "c1",
            "NetworkSettings": {"Ports": {
                "8000/tcp": null,
                "53/udp": null,
                "22/tcp": [{"HostIp": "0.0.0.0", "HostPort": "2222"}],
                "bogus": null
            }}
        }));
        assert_eq!(c.exposed_tcp_ports(), vec![22, 8000]);
    }

    #[test]
    fn env_override_wins_over_image() {
        let c = inspect(serde_json::json!({
            "Id": "c1",
            "Config": {"Image": "org/api:2", "Env": ["PATH=/bin", "SRV_NAME=billing", "X=a=b"]}
        }));
        let rules = NamingRules::default();
        assert_eq!(c.service_name(&rules), "billing");
        assert_eq!(c.env().get("X"), Some(&"a=b"));

        let c = inspect(serde_json::json!({
            "Id": "c1",
            "Config": {"Image": "org/api:2", "Env": null}
        }));
        assert_eq!(c.service_name(&rules), "api");
    }

    #[test]
    fn tags_split_trimmed_without_empties() {
        let c = inspect(serde_json::json!({
            "Id": "c1",
            "Config": {"Image": "x", "Labels": {"tags": "tag1, tag2,,"}}
        }));
        assert_eq!(c.tags(&NamingRules::default()), vec!["tag1", "tag2"]);

        let no_label = inspect(serde_json::json!({"Id": "c1", "Config": {"Image": "x"}}));
        assert!(no_label.tags(&NamingRules::default()).is_empty());
    }

    #[test]
    fn one_record_per_port() {
        let c = inspect(serde_json::json!({
            "Id": "c1",
            "Name": "/elated_kirch",
            "Config": {"Image": "sshd", "Labels": {"tags": "a"}},
            "NetworkSettings": {"Ports": {"8000/tcp": null, "22/tcp": null}}
        }));
        let recs = c.to_records(&NamingRules::default());
        assert_eq!(
            recs,
            vec![
                InstanceRecord::new("c1", "sshd", 22).with_tags(["a"]),
                InstanceRecord::new("c1", "sshd", 8000).with_tags(["a"]),
            ]
        );
    }

    #[test]
    fn no_ports_no_records() {
        let c = inspect(serde_json::json!({"Id": "c1", "Config": {"Image": "batch"}}));
        assert!(c.to_records(&NamingRules::default()).is_empty());
    }
}
