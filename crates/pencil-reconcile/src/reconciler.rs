use crate::{
    compute_plan, AdapterError, ApplyFailure, ApplyOp, InstanceSource, ReconcilePlan,
    RegistryEntry, RegistrySink, SyncError,
};

/// What applying one plan actually did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries the sink accepted, in application order.
    pub registered: Vec<RegistryEntry>,
    /// Ids the sink removed.
    pub deregistered: Vec<String>,
    /// Ids the sink reported as already gone when asked to deregister them.
    pub already_absent: Vec<String>,
    /// Every call that failed. Non-empty means the cycle is reported as an
    /// error even though the rest of the plan was applied.
    pub failures: Vec<ApplyFailure>,
}

impl SyncReport {
    /// Sink mutations issued while applying the plan.
    pub fn attempted(&self) -> usize {
        self.registered.len()
            + self.deregistered.len()
            + self.already_absent.len()
            + self.failures.len()
    }

    /// `true` when the cycle issued no mutation at all.
    pub fn is_noop(&self) -> bool {
        self.attempted() == 0
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Computes and applies the minimal edit between "registered" and "running".
///
/// Holds no state between calls: every [`Reconciler::synchronize`] fetches
/// both snapshots from scratch. Collaborators are injected by the caller,
/// which owns their lifecycle.
pub struct Reconciler<S, R> {
    source: S,
    sink: R,
}

impl<S, R> Reconciler<S, R>
where
    S: InstanceSource,
    R: RegistrySink,
{
    pub fn new(source: S, sink: R) -> Self {
        Self { source, sink }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &R {
        &self.sink
    }

    /// Fetch both snapshots and compute the plan without mutating anything.
    ///
    /// Registered ids are fetched first. If either fetch fails the error is
    /// returned as-is; an unreadable registry is never treated as empty.
    pub async fn plan(&self) -> Result<ReconcilePlan, SyncError> {
        let registered_ids = self
            .sink
            .list_registered_ids()
            .await
            .map_err(SyncError::ListRegistered)?;
        let running = self
            .source
            .list_running()
            .await
            .map_err(SyncError::ListRunning)?;

        Ok(compute_plan(&registered_ids, &running))
    }

    /// One full reconciliation cycle: fetch, diff, apply.
    ///
    /// Registrations are applied before deregistrations. Each call is
    /// independent; a failure is recorded and the remaining entries are still
    /// attempted. Any failure turns the result into [`SyncError::Apply`]
    /// carrying the full report.
    pub async fn synchronize(&self) -> Result<SyncReport, SyncError> {
        let plan = self.plan().await?;
        let report = self.apply(plan).await;
        if report.is_clean() {
            Ok(report)
        } else {
            Err(SyncError::Apply { report })
        }
    }

    /// Apply a precomputed plan. Never short-circuits.
    pub async fn apply(&self, plan: ReconcilePlan) -> SyncReport {
        let mut report = SyncReport::default();

        for record in &plan.to_register {
            let entry = RegistryEntry::from_instance(record);
            match self.sink.register(&entry).await {
                Ok(()) => report.registered.push(entry),
                Err(error) => report.failures.push(ApplyFailure {
                    op: ApplyOp::Register,
                    id: entry.id,
                    port: Some(entry.port),
                    error,
                }),
            }
        }

        for id in plan.to_deregister {
            match self.sink.deregister(&id).await {
                Ok(()) => report.deregistered.push(id),
                Err(AdapterError::NotFound { .. }) => report.already_absent.push(id),
                Err(error) => report.failures.push(ApplyFailure {
                    op: ApplyOp::Deregister,
                    id,
                    port: None,
                    error,
                }),
            }
        }

        report
    }
}
