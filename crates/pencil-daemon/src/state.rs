//! Shared runtime state for pencil-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The scheduler reports
//! into the same state through its [`CycleObserver`] impl, which is the only
//! writer.

use std::sync::Arc;
use std::time::Duration;

use pencil_reconcile::{CycleObserver, CycleOutcome, SchedulerState};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use crate::api_types::CycleSummary;

// ---------------------------------------------------------------------------
// BusMsg — SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Cycle(CycleSummary),
}

impl BusMsg {
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::Cycle(_) => "cycle",
        }
    }
}

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Point-in-time snapshot returned by GET /v1/status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    /// "idle" | "running"
    pub state: String,
    pub interval_secs: u64,
    pub cycles: u64,
    pub last_cycle: Option<CycleSummary>,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub status: Arc<RwLock<StatusSnapshot>>,
}

impl AppState {
    pub fn new(interval: Duration) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);

        let initial_status = StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            state: SchedulerState::Idle.as_str().to_string(),
            interval_secs: interval.as_secs(),
            cycles: 0,
            last_cycle: None,
        };

        Self {
            bus,
            build: BuildInfo {
                service: "pencil-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            status: Arc::new(RwLock::new(initial_status)),
        }
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let mut snap = self.status.read().await.clone();
        snap.daemon_uptime_secs = uptime_secs();
        snap
    }
}

#[async_trait::async_trait]
impl CycleObserver for AppState {
    async fn on_state(&self, state: SchedulerState) {
        self.status.write().await.state = state.as_str().to_string();
    }

    async fn on_cycle(&self, outcome: &CycleOutcome) {
        let summary = CycleSummary::from(outcome);
        {
            let mut st = self.status.write().await;
            st.cycles = outcome.cycle;
            st.last_cycle = Some(summary.clone());
        }
        // No subscribers is fine.
        let _ = self.bus.send(BusMsg::Cycle(summary));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(
    bus: broadcast::Sender<BusMsg>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    })
}
