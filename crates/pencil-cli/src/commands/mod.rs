//! Operator commands that talk to the live collaborators.

use anyhow::{Context, Result};
use pencil_config::{load_layered_yaml, LoadedConfig, PencilConfig};
use pencil_consul::ConsulRegistrySink;
use pencil_docker::DockerInstanceSource;
use pencil_reconcile::{Reconciler, SyncError, SyncReport};
use serde_json::{json, Value};

pub type LiveReconciler = Reconciler<DockerInstanceSource, ConsulRegistrySink>;

/// Load layers (defaults when none), apply env overrides, build collaborators.
pub fn reconciler_from_config(paths: &[String]) -> Result<LiveReconciler> {
    let loaded = if paths.is_empty() {
        LoadedConfig::defaults()?
    } else {
        load_layered_yaml(paths)?
    };
    let settings: PencilConfig = loaded.settings()?.resolve_from_env()?;
    tracing::debug!(config_hash = %loaded.config_hash, "config loaded");

    let source = DockerInstanceSource::from_settings(settings.docker_endpoint(), &settings.docker)
        .context("docker source")?;
    let token = std::env::var(&settings.consul.token_env).ok();
    let sink = ConsulRegistrySink::from_settings(settings.consul_address(), &settings.consul, token)
        .context("consul sink")?;
    Ok(Reconciler::new(source, sink))
}

/// Dry run: print the plan as JSON.
pub async fn plan(paths: &[String]) -> Result<()> {
    let reconciler = reconciler_from_config(paths)?;
    let plan = reconciler.plan().await?;
    tracing::info!(
        changes = plan.len(),
        to_register = plan.to_register.len(),
        to_deregister = plan.to_deregister.len(),
        "plan computed"
    );
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

/// One cycle. The report is printed even when some calls failed; the
/// command still exits non-zero in that case.
pub async fn sync(paths: &[String]) -> Result<()> {
    let reconciler = reconciler_from_config(paths)?;
    match reconciler.synchronize().await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
            Ok(())
        }
        Err(SyncError::Apply { report }) => {
            println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
            Err(SyncError::Apply { report }.into())
        }
        Err(err) => Err(err.into()),
    }
}

pub fn report_json(report: &SyncReport) -> Value {
    let failures: Vec<Value> = report
        .failures
        .iter()
        .map(|f| {
            json!({
                "op": f.op,
                "id": f.id,
                "port": f.port,
                "error": f.error.to_string(),
            })
        })
        .collect();
    json!({
        "registered": report.registered,
        "deregistered": report.deregistered,
        "already_absent": report.already_absent,
        "failures": failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pencil_reconcile::{AdapterError, ApplyFailure, ApplyOp, RegistryEntry};

    #[test]
    fn report_json_shape() {
        let report = SyncReport {
            registered: vec![RegistryEntry {
                id: "c1".to_string(),
                service: "web".to_string(),
                port: 80,
                tags: vec![],
            }],
            deregistered: vec!["old".to_string()],
            already_absent: vec![],
            failures: vec![ApplyFailure {
                op: ApplyOp::Deregister,
                id: "stuck".to_string(),
                port: None,
                error: AdapterError::Transport("timeout".to_string()),
            }],
        };
        let v = report_json(&report);
        assert_eq!(v["registered"][0]["service"], "web");
        assert_eq!(v["deregistered"][0], "old");
        assert_eq!(v["failures"][0]["op"], "deregister");
        assert!(v["failures"][0]["port"].is_null());
        assert_eq!(v["failures"][0]["error"], "transport error: timeout");
    }
}
