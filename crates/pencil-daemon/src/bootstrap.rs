//! Process bootstrap: arguments, configuration, tracing and collaborator
//! wiring. Everything here runs once, before the scheduler starts.

use std::future::Future;

use anyhow::{Context, Result};
use clap::Parser;
use pencil_config::{
    load_layered_yaml, report_unused_keys, LoadedConfig, PencilConfig, UnusedKeyPolicy,
};
use pencil_consul::ConsulRegistrySink;
use pencil_docker::DockerInstanceSource;
use pencil_reconcile::{Reconciler, Scheduler};
use tokio::sync::watch;

#[derive(Debug, Parser)]
#[command(name = "pencil-daemon")]
#[command(about = "Keeps the service registry in step with running containers")]
pub struct DaemonArgs {
    /// Layered config paths in merge order (repeatable)
    #[arg(long = "config")]
    pub config_paths: Vec<String>,
}

/// Loaded and resolved configuration plus what to log about it once tracing
/// is up.
#[derive(Debug)]
pub struct Boot {
    pub loaded: LoadedConfig,
    pub settings: PencilConfig,
    pub unused_keys: Vec<String>,
}

/// Load the config layers (defaults when none given), apply environment
/// overrides from `env`, and validate.
pub fn load_config<F>(paths: &[String], env: F) -> Result<Boot>
where
    F: Fn(&str) -> Option<String>,
{
    let loaded = if paths.is_empty() {
        LoadedConfig::defaults()?
    } else {
        load_layered_yaml(paths)?
    };
    let unused = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    let settings = loaded.settings()?.resolve(env)?;
    Ok(Boot {
        loaded,
        settings,
        unused_keys: unused.unused_leaf_pointers,
    })
}

/// `RUST_LOG` wins; otherwise the configured filter.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

pub type LiveScheduler = Scheduler<DockerInstanceSource, ConsulRegistrySink>;

/// Build the Docker source, the Consul sink and the scheduler driving them.
/// The Consul token is read from the env var the config names.
pub fn build_scheduler<F>(settings: &PencilConfig, env: F) -> Result<LiveScheduler>
where
    F: Fn(&str) -> Option<String>,
{
    let source = DockerInstanceSource::from_settings(settings.docker_endpoint(), &settings.docker)
        .context("docker source")?;
    let token = env(&settings.consul.token_env);
    let sink = ConsulRegistrySink::from_settings(settings.consul_address(), &settings.consul, token)
        .context("consul sink")?;
    Ok(Scheduler::new(
        Reconciler::new(source, sink),
        settings.interval(),
    ))
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Fan one shutdown future out to several waiters.
pub fn shutdown_channel<F>(signal: F) -> watch::Receiver<bool>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        signal.await;
        let _ = tx.send(true);
    });
    rx
}

/// Resolves once the channel carries `true` or its sender is gone.
pub async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    loop {
        let stop = *rx.borrow_and_update();
        if stop || rx.changed().await.is_err() {
            return;
        }
    }
}
