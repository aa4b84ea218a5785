//! Fixed-period driver for the [`Reconciler`].
//!
//! Two states: `Idle` (waiting for the next tick) and `Running` (one
//! `synchronize` in flight). At most one cycle runs at a time; a cycle that
//! overruns the period delays the next tick instead of overlapping it.
//! Shutdown is observed only while idle, so an in-flight cycle always runs to
//! completion.
//!
//! The scheduler owns all reporting: every outcome is logged here and handed
//! to a [`CycleObserver`]. No outcome is fatal.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{InstanceSource, Reconciler, RegistrySink, SyncError, SyncReport};

/// Period used when none (or zero) is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Running => "running",
        }
    }
}

/// Result of one tick.
#[derive(Debug)]
pub struct CycleOutcome {
    /// 1-based cycle counter for this scheduler.
    pub cycle: u64,
    /// Correlation id for log lines of this cycle.
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub result: Result<SyncReport, SyncError>,
}

impl CycleOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Receives scheduler state changes and cycle outcomes.
#[async_trait::async_trait]
pub trait CycleObserver: Send + Sync {
    async fn on_state(&self, _state: SchedulerState) {}

    async fn on_cycle(&self, outcome: &CycleOutcome);
}

/// Observer that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

#[async_trait::async_trait]
impl CycleObserver for NoopObserver {
    async fn on_cycle(&self, _outcome: &CycleOutcome) {}
}

#[async_trait::async_trait]
impl<T: CycleObserver + ?Sized> CycleObserver for Arc<T> {
    async fn on_state(&self, state: SchedulerState) {
        (**self).on_state(state).await
    }

    async fn on_cycle(&self, outcome: &CycleOutcome) {
        (**self).on_cycle(outcome).await
    }
}

pub struct Scheduler<S, R> {
    reconciler: Reconciler<S, R>,
    interval: Duration,
    cycles: u64,
}

impl<S, R> Scheduler<S, R>
where
    S: InstanceSource,
    R: RegistrySink,
{
    /// A zero `interval` falls back to [`DEFAULT_INTERVAL`].
    pub fn new(reconciler: Reconciler<S, R>, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_INTERVAL
        } else {
            interval
        };
        Self {
            reconciler,
            interval,
            cycles: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Cycles executed so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run exactly one cycle now.
    pub async fn run_once<O: CycleObserver>(&mut self, observer: &O) -> CycleOutcome {
        self.cycles += 1;
        let cycle = self.cycles;
        let cycle_id = Uuid::new_v4();

        observer.on_state(SchedulerState::Running).await;

        let started_at = Utc::now();
        let t0 = Instant::now();
        let result = self.reconciler.synchronize().await;
        let outcome = CycleOutcome {
            cycle,
            cycle_id,
            started_at,
            elapsed: t0.elapsed(),
            result,
        };

        log_outcome(&outcome);
        observer.on_cycle(&outcome).await;
        observer.on_state(SchedulerState::Idle).await;

        outcome
    }

    /// Tick until `shutdown` resolves. The first cycle runs immediately.
    ///
    /// Returns the number of cycles executed.
    pub async fn run<F, O>(mut self, shutdown: F, observer: O) -> u64
    where
        F: Future<Output = ()>,
        O: CycleObserver,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            interval_ms = self.interval.as_millis() as u64,
            source = self.reconciler.source().name(),
            sink = self.reconciler.sink().name(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }
            self.run_once(&observer).await;
        }

        info!(cycles = self.cycles, "scheduler stopped");
        self.cycles
    }
}

fn log_outcome(outcome: &CycleOutcome) {
    let cycle = outcome.cycle;
    let cycle_id = outcome.cycle_id;
    let elapsed_ms = outcome.elapsed.as_millis() as u64;

    match &outcome.result {
        Ok(report) if report.is_noop() => {
            debug!(cycle, %cycle_id, elapsed_ms, "registry in sync");
        }
        Ok(report) => {
            info!(
                cycle,
                %cycle_id,
                elapsed_ms,
                registered = report.registered.len(),
                deregistered = report.deregistered.len(),
                already_absent = report.already_absent.len(),
                "cycle applied"
            );
        }
        Err(SyncError::Apply { report }) => {
            for failure in &report.failures {
                warn!(
                    cycle,
                    %cycle_id,
                    op = %failure.op,
                    id = %failure.id,
                    port = failure.port,
                    error = %failure.error,
                    "registry call failed"
                );
            }
            warn!(
                cycle,
                %cycle_id,
                elapsed_ms,
                registered = report.registered.len(),
                deregistered = report.deregistered.len(),
                failed = report.failures.len(),
                "cycle completed with failures; retrying next tick"
            );
        }
        Err(err) => {
            warn!(cycle, %cycle_id, elapsed_ms, error = %err, "cycle aborted; registry untouched");
        }
    }
}
