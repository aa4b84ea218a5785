//! Response types for the pencil-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests.

use chrono::{DateTime, Utc};
use pencil_reconcile::{CycleOutcome, SyncError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// Cycle summary (status + SSE `cycle` events)
// ---------------------------------------------------------------------------

/// Flattened view of one scheduler cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle: u64,
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub ok: bool,
    pub registered: usize,
    pub deregistered: usize,
    pub already_absent: usize,
    pub failed: usize,
    pub error: Option<String>,
}

impl From<&CycleOutcome> for CycleSummary {
    fn from(outcome: &CycleOutcome) -> Self {
        let report = match &outcome.result {
            Ok(report) => Some(report),
            Err(SyncError::Apply { report }) => Some(report),
            Err(_) => None,
        };
        Self {
            cycle: outcome.cycle,
            cycle_id: outcome.cycle_id,
            started_at: outcome.started_at,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            ok: outcome.is_ok(),
            registered: report.map_or(0, |r| r.registered.len()),
            deregistered: report.map_or(0, |r| r.deregistered.len()),
            already_absent: report.map_or(0, |r| r.already_absent.len()),
            failed: report.map_or(0, |r| r.failures.len()),
            error: outcome.result.as_ref().err().map(|e| e.to_string()),
        }
    }
}
