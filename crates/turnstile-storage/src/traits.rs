use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::sync::Arc;

use turnstile_core::{EntityKind, Timestamp};

use crate::memory::{EntitlementStore, Keyspace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The key already holds a newer mutation; nothing changed.
    Stale { stored: Timestamp },
}

impl WriteOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied)
    }
}

/// A record type with its own keyspace in the entitlement store.
pub trait Entity: Debug + Send + Sync + Sized + 'static {
    type Key: Eq + Hash + Clone + Debug + Display + Send + Sync + 'static;

    const KIND: EntityKind;

    fn key(&self) -> Self::Key;

    fn keyspace(store: &EntitlementStore) -> &Keyspace<Self>;
}

pub trait EntitlementReader: Send + Sync {
    fn get<E: Entity>(&self, key: &E::Key) -> Option<Arc<E>>;
}

pub trait EntitlementWriter: Send + Sync {
    fn upsert<E: Entity>(&self, record: E, timestamp: Timestamp) -> WriteOutcome;

    fn remove<E: Entity>(&self, key: &E::Key, timestamp: Timestamp) -> WriteOutcome;
}

impl<T: EntitlementReader> EntitlementReader for Arc<T> {
    fn get<E: Entity>(&self, key: &E::Key) -> Option<Arc<E>> {
        (**self).get(key)
    }
}

impl<T: EntitlementWriter> EntitlementWriter for Arc<T> {
    fn upsert<E: Entity>(&self, record: E, timestamp: Timestamp) -> WriteOutcome {
        (**self).upsert(record, timestamp)
    }

    fn remove<E: Entity>(&self, key: &E::Key, timestamp: Timestamp) -> WriteOutcome {
        (**self).remove::<E>(key, timestamp)
    }
}
