use std::fmt;

use serde::Serialize;

use crate::reconciler::SyncReport;

/// Errors a collaborator (instance source or registry sink) may return.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// Network or transport failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The upstream API answered with a non-success status.
    #[error("api error status={status}: {message}")]
    Api { status: u16, message: String },
    /// A response payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// The referenced entry does not exist upstream.
    #[error("not found: {id}")]
    NotFound { id: String },
    /// The adapter was configured with an unusable value.
    #[error("config error: {0}")]
    Config(String),
}

/// Which sink mutation an [`ApplyFailure`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOp {
    Register,
    Deregister,
}

impl fmt::Display for ApplyOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyOp::Register => f.write_str("register"),
            ApplyOp::Deregister => f.write_str("deregister"),
        }
    }
}

/// A single sink call that failed while applying a plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyFailure {
    pub op: ApplyOp,
    pub id: String,
    /// Set for registrations only.
    pub port: Option<u16>,
    pub error: AdapterError,
}

impl fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{} {}:{}: {}", self.op, self.id, port, self.error),
            None => write!(f, "{} {}: {}", self.op, self.id, self.error),
        }
    }
}

/// Why a reconciliation cycle did not complete cleanly.
///
/// Fetch failures abort the cycle before any mutation. `Apply` means the plan
/// was applied in full but some calls failed; already-applied mutations are
/// never rolled back.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("listing registered service ids failed: {0}")]
    ListRegistered(#[source] AdapterError),

    #[error("listing running instances failed: {0}")]
    ListRunning(#[source] AdapterError),

    #[error("{}", apply_summary(.report))]
    Apply { report: SyncReport },
}

impl SyncError {
    /// `true` when the cycle aborted before touching the registry.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, SyncError::ListRegistered(_) | SyncError::ListRunning(_))
    }

    /// Partial-apply evidence, when there is any.
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncError::Apply { report } => Some(report),
            _ => None,
        }
    }
}

fn apply_summary(report: &SyncReport) -> String {
    let failed = report.failures.len();
    let attempted = report.attempted();
    match report.failures.first() {
        Some(first) => format!("{failed} of {attempted} registry call(s) failed; first: {first}"),
        None => format!("0 of {attempted} registry call(s) failed"),
    }
}
