use serde::{Deserialize, Serialize};

/// A running workload instance at a point in time.
///
/// Sources emit one record per (instance, exposed port) pair: an instance
/// exposing N ports yields N records sharing `id` and `name`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Opaque identifier assigned by the instance source; stable for the
    /// lifetime of the instance.
    pub id: String,
    /// Display/service name. Not unique across instances.
    pub name: String,
    pub port: u16,
    /// Order is not semantically significant.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl InstanceRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            port,
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Identity equality: every field matches, tags compared position by
    /// position. Agrees with the derived `Eq`/`Hash`, so records can be
    /// deduplicated through a `HashSet`.
    pub fn same_as(&self, other: &InstanceRecord) -> bool {
        self == other
    }

    /// Structural checks a source should apply before emitting a record.
    pub fn validate(&self) -> Result<(), InvalidRecord> {
        if self.id.trim().is_empty() {
            return Err(InvalidRecord::EmptyId);
        }
        if self.name.trim().is_empty() {
            return Err(InvalidRecord::EmptyName {
                id: self.id.clone(),
            });
        }
        if self.port == 0 {
            return Err(InvalidRecord::ZeroPort {
                id: self.id.clone(),
            });
        }
        Ok(())
    }
}

/// Why a record failed [`InstanceRecord::validate`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRecord {
    #[error("instance record has an empty id")]
    EmptyId,
    #[error("instance {id} has an empty name")]
    EmptyName { id: String },
    #[error("instance {id} exposes port 0")]
    ZeroPort { id: String },
}

/// An entry stored in the registry sink.
///
/// `id` equals the [`InstanceRecord::id`] that produced it; that is how the
/// reconciler matches registry entries back to running instances.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: String,
    pub service: String,
    pub port: u16,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RegistryEntry {
    pub fn from_instance(record: &InstanceRecord) -> Self {
        Self {
            id: record.id.clone(),
            service: record.name.clone(),
            port: record.port,
            tags: record.tags.clone(),
        }
    }
}

impl From<&InstanceRecord> for RegistryEntry {
    fn from(record: &InstanceRecord) -> Self {
        Self::from_instance(record)
    }
}

/// The edit computed for a single cycle. Created, applied and dropped within
/// one tick.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePlan {
    /// Running records whose id is not registered, in source order.
    pub to_register: Vec<InstanceRecord>,
    /// Registered ids with no running record, in sink order.
    pub to_deregister: Vec<String>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.to_register.is_empty() && self.to_deregister.is_empty()
    }

    /// Number of sink calls applying this plan will issue.
    pub fn len(&self) -> usize {
        self.to_register.len() + self.to_deregister.len()
    }
}
