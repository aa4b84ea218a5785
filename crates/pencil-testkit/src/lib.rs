//! pencil-testkit
//!
//! In-memory collaborators for driving the reconciler without a container
//! runtime or a registry:
//! - [`FakeInstanceSource`]: returns a configurable running set (or error)
//! - [`FakeRegistrySink`]: keeps entries in memory, records every call, and
//!   fails selected ids on demand
//!
//! Both are cheap to clone behind an `Arc` and safe to share with a running
//! scheduler.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use pencil_reconcile::{AdapterError, InstanceRecord, InstanceSource, RegistryEntry, RegistrySink};

/// Shorthand for building running records in tests.
pub fn record(id: &str, name: &str, port: u16) -> InstanceRecord {
    InstanceRecord::new(id, name, port)
}

// ---------------------------------------------------------------------------
// FakeInstanceSource
// ---------------------------------------------------------------------------

pub struct FakeInstanceSource {
    running: Mutex<Result<Vec<InstanceRecord>, AdapterError>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for FakeInstanceSource {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl FakeInstanceSource {
    pub fn new(running: Vec<InstanceRecord>) -> Self {
        Self {
            running: Mutex::new(Ok(running)),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn set_running(&self, running: Vec<InstanceRecord>) {
        *self.running.lock().expect("fake source lock poisoned") = Ok(running);
    }

    /// Every subsequent `list_running` fails with `err`.
    pub fn fail_with(&self, err: AdapterError) {
        *self.running.lock().expect("fake source lock poisoned") = Err(err);
    }

    /// Make `list_running` take `delay` (tokio time) before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("fake source lock poisoned") = Some(delay);
    }

    pub fn list_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `list_running` calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl InstanceSource for FakeInstanceSource {
    fn name(&self) -> &'static str {
        "fake-source"
    }

    async fn list_running(&self) -> Result<Vec<InstanceRecord>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().expect("fake source lock poisoned");
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        let out = self
            .running
            .lock()
            .expect("fake source lock poisoned")
            .clone();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        out
    }
}

// ---------------------------------------------------------------------------
// FakeRegistrySink
// ---------------------------------------------------------------------------

/// A mutation observed by [`FakeRegistrySink`], in call order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkCall {
    Register(RegistryEntry),
    Deregister(String),
}

#[derive(Default)]
struct SinkInner {
    entries: Vec<RegistryEntry>,
    calls: Vec<SinkCall>,
    list_error: Option<AdapterError>,
    failing_ids: HashSet<String>,
}

/// Registry kept in memory. Registering an id that is already present
/// replaces nothing: each call appends an entry, matching a registry where
/// one id may carry several ports.
#[derive(Default)]
pub struct FakeRegistrySink {
    inner: Mutex<SinkInner>,
}

impl FakeRegistrySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink pre-populated with bare entries for `ids`.
    pub fn with_ids(ids: &[&str]) -> Self {
        let sink = Self::new();
        {
            let mut g = sink.inner.lock().expect("fake sink lock poisoned");
            for id in ids {
                g.entries.push(RegistryEntry {
                    id: id.to_string(),
                    service: id.to_string(),
                    port: 1,
                    tags: Vec::new(),
                });
            }
        }
        sink
    }

    /// Every subsequent `list_registered_ids` fails with `err`.
    pub fn fail_listing_with(&self, err: AdapterError) {
        self.inner.lock().expect("fake sink lock poisoned").list_error = Some(err);
    }

    /// Register and deregister calls for `id` fail with a transport error.
    pub fn fail_id(&self, id: &str) {
        self.inner
            .lock()
            .expect("fake sink lock poisoned")
            .failing_ids
            .insert(id.to_string());
    }

    pub fn heal(&self) {
        let mut g = self.inner.lock().expect("fake sink lock poisoned");
        g.failing_ids.clear();
        g.list_error = None;
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.inner.lock().expect("fake sink lock poisoned").calls.clone()
    }

    pub fn register_calls(&self) -> Vec<RegistryEntry> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Register(e) => Some(e),
                SinkCall::Deregister(_) => None,
            })
            .collect()
    }

    pub fn deregister_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Deregister(id) => Some(id),
                SinkCall::Register(_) => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().expect("fake sink lock poisoned").calls.clear();
    }

    pub fn entries(&self) -> Vec<RegistryEntry> {
        self.inner
            .lock()
            .expect("fake sink lock poisoned")
            .entries
            .clone()
    }

    /// Unique registered ids, first-registration order.
    pub fn ids(&self) -> Vec<String> {
        let g = self.inner.lock().expect("fake sink lock poisoned");
        unique_ids(&g.entries)
    }
}

fn unique_ids(entries: &[RegistryEntry]) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|e| seen.insert(e.id.clone()))
        .map(|e| e.id.clone())
        .collect()
}

#[async_trait::async_trait]
impl RegistrySink for FakeRegistrySink {
    fn name(&self) -> &'static str {
        "fake-sink"
    }

    async fn list_registered_ids(&self) -> Result<Vec<String>, AdapterError> {
        let g = self.inner.lock().expect("fake sink lock poisoned");
        if let Some(err) = &g.list_error {
            return Err(err.clone());
        }
        Ok(unique_ids(&g.entries))
    }

    async fn register(&self, entry: &RegistryEntry) -> Result<(), AdapterError> {
        let mut g = self.inner.lock().expect("fake sink lock poisoned");
        g.calls.push(SinkCall::Register(entry.clone()));
        if g.failing_ids.contains(&entry.id) {
            return Err(AdapterError::Transport(format!(
                "injected register failure for {}",
                entry.id
            )));
        }
        g.entries.push(entry.clone());
        Ok(())
    }

    async fn deregister(&self, id: &str) -> Result<(), AdapterError> {
        let mut g = self.inner.lock().expect("fake sink lock poisoned");
        g.calls.push(SinkCall::Deregister(id.to_string()));
        if g.failing_ids.contains(id) {
            return Err(AdapterError::Transport(format!(
                "injected deregister failure for {id}"
            )));
        }
        let before = g.entries.len();
        g.entries.retain(|e| e.id != id);
        if g.entries.len() == before {
            return Err(AdapterError::NotFound { id: id.to_string() });
        }
        Ok(())
    }
}
