//! pencil-daemon entry point.
//!
//! Thin on purpose: loads config, sets up tracing, starts the scheduler and
//! the status server, and waits for Ctrl-C / SIGTERM. An in-flight cycle is
//! allowed to finish before the process exits.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use pencil_daemon::{bootstrap, routes, state};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    let args = bootstrap::DaemonArgs::parse();
    let env = |k: &str| std::env::var(k).ok();
    let boot = bootstrap::load_config(&args.config_paths, env)?;

    bootstrap::init_tracing(&boot.settings.log.filter);
    info!(
        config_hash = %boot.loaded.config_hash,
        layers = args.config_paths.len(),
        "config loaded"
    );
    for pointer in &boot.unused_keys {
        warn!(key = %pointer, "config key is not used");
    }

    let settings = boot.settings;
    let scheduler = bootstrap::build_scheduler(&settings, env)?;
    info!(
        docker = %settings.docker_endpoint(),
        consul = %settings.consul_address(),
        "collaborators ready"
    );

    let shared = Arc::new(state::AppState::new(scheduler.interval()));
    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let shutdown = bootstrap::shutdown_channel(bootstrap::shutdown_signal());

    let sched_task = tokio::spawn(scheduler.run(
        bootstrap::wait_for_shutdown(shutdown.clone()),
        Arc::clone(&shared),
    ));

    if settings.http.enabled {
        let addr = settings.listen_addr()?;
        let app = routes::with_middleware(routes::build_router(Arc::clone(&shared)));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind {addr}"))?;
        info!("pencil-daemon listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(bootstrap::wait_for_shutdown(shutdown.clone()))
            .await
            .context("server crashed")?;
    }

    let cycles = sched_task.await.context("scheduler task panicked")?;
    info!(cycles, "pencil-daemon stopped");
    Ok(())
}
