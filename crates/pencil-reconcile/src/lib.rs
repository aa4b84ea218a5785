//! pencil-reconcile
//!
//! Keeps a service registry consistent with the workload instances running on
//! a host. Each cycle pulls two fresh snapshots (registered IDs, running
//! instances), computes the minimal edit between them by identifier, and
//! drives register/deregister calls through the [`RegistrySink`].
//!
//! - The diff itself ([`compute_plan`]) is pure: no IO, no clock.
//! - The [`Reconciler`] owns no state across cycles and never logs; every
//!   failure is returned as a structured [`SyncError`].
//! - The [`Scheduler`] invokes the reconciler on a fixed period, never
//!   overlapping cycles, and owns all logging of cycle outcomes.
//!
//! The reconciler assumes it owns the whole registry namespace it is pointed
//! at: any registered ID without a running instance is a deregistration
//! candidate. Sinks scope that namespace (e.g. by hiding the registry's own
//! self-registration) before IDs reach the reconciler.

mod adapter;
mod engine;
mod error;
mod reconciler;
mod scheduler;
mod types;

pub use adapter::{InstanceSource, RegistrySink};
pub use engine::compute_plan;
pub use error::{AdapterError, ApplyFailure, ApplyOp, SyncError};
pub use reconciler::{Reconciler, SyncReport};
pub use scheduler::{
    CycleObserver, CycleOutcome, NoopObserver, Scheduler, SchedulerState, DEFAULT_INTERVAL,
};
pub use types::{InstanceRecord, InvalidRecord, ReconcilePlan, RegistryEntry};
