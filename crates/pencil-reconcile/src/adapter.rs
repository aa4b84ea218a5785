//! Collaborator boundary.
//!
//! The reconciler only sees these two capability sets, so it can be driven by
//! in-memory fakes as easily as by live container runtime / registry clients.
//! Implementations must be `Send + Sync` so the scheduler can hold them across
//! await points.

use std::sync::Arc;

use crate::{AdapterError, InstanceRecord, RegistryEntry};

/// Enumerates the workload instances currently running.
#[async_trait::async_trait]
pub trait InstanceSource: Send + Sync {
    /// Human-readable name for logs (e.g. `"docker"`).
    fn name(&self) -> &'static str;

    /// One record per (instance, exposed TCP port), in a deterministic order
    /// for a given call. No `(id, port)` pair appears twice. An empty vec
    /// means nothing is running.
    async fn list_running(&self) -> Result<Vec<InstanceRecord>, AdapterError>;
}

/// The external service registry the reconciler writes to.
#[async_trait::async_trait]
pub trait RegistrySink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Unique ids currently registered within the namespace this sink scopes.
    async fn list_registered_ids(&self) -> Result<Vec<String>, AdapterError>;

    async fn register(&self, entry: &RegistryEntry) -> Result<(), AdapterError>;

    /// Returning [`AdapterError::NotFound`] tells the reconciler the entry
    /// was already gone.
    async fn deregister(&self, id: &str) -> Result<(), AdapterError>;
}

#[async_trait::async_trait]
impl<T: InstanceSource + ?Sized> InstanceSource for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn list_running(&self) -> Result<Vec<InstanceRecord>, AdapterError> {
        (**self).list_running().await
    }
}

#[async_trait::async_trait]
impl<T: RegistrySink + ?Sized> RegistrySink for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn list_registered_ids(&self) -> Result<Vec<String>, AdapterError> {
        (**self).list_registered_ids().await
    }

    async fn register(&self, entry: &RegistryEntry) -> Result<(), AdapterError> {
        (**self).register(entry).await
    }

    async fn deregister(&self, id: &str) -> Result<(), AdapterError> {
        (**self).deregister(id).await
    }
}
