use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use turnstile_core::{
    Api, ApiPolicy, Application, ApplicationKeyMapping, ApplicationPolicy, EntityKind,
    Subscription, SubscriptionPolicy, Timestamp,
};

use crate::traits::{EntitlementReader, EntitlementWriter, Entity, WriteOutcome};

#[derive(Debug)]
struct Slot<E> {
    timestamp: Timestamp,
    record: Option<Arc<E>>,
}

/// One kind's keyspace. Every key remembers the timestamp of its latest
/// mutation, including removals, so late or replayed events are rejected.
pub struct Keyspace<E: Entity> {
    slots: DashMap<E::Key, Slot<E>>,
}

impl<E: Entity> Keyspace<E> {
    fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    // The timestamp comparison and the slot replacement happen under the
    // shard write lock held by the entry guard.
    fn apply(&self, key: E::Key, record: Option<Arc<E>>, timestamp: Timestamp) -> WriteOutcome {
        match self.slots.entry(key) {
            Entry::Occupied(mut entry) => {
                let stored = entry.get().timestamp;
                if timestamp < stored {
                    return WriteOutcome::Stale { stored };
                }
                entry.insert(Slot { timestamp, record });
            }
            Entry::Vacant(entry) => {
                entry.insert(Slot { timestamp, record });
            }
        }
        WriteOutcome::Applied
    }

    fn get(&self, key: &E::Key) -> Option<Arc<E>> {
        self.slots.get(key).and_then(|slot| slot.record.clone())
    }

    fn stats(&self) -> KindStats {
        let mut stats = KindStats {
            kind: E::KIND,
            live: 0,
            removed: 0,
        };
        for slot in self.slots.iter() {
            if slot.record.is_some() {
                stats.live += 1;
            } else {
                stats.removed += 1;
            }
        }
        stats
    }

    fn purge_removed(&self, horizon: Timestamp) -> usize {
        let mut purged = 0;
        self.slots.retain(|_, slot| {
            let keep = slot.record.is_some() || slot.timestamp >= horizon;
            if !keep {
                purged += 1;
            }
            keep
        });
        purged
    }
}

impl<E: Entity> fmt::Debug for Keyspace<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyspace")
            .field("kind", &E::KIND)
            .field("len", &self.slots.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindStats {
    pub kind: EntityKind,
    pub live: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub kinds: Vec<KindStats>,
}

impl StoreStats {
    pub fn for_kind(&self, kind: EntityKind) -> Option<&KindStats> {
        self.kinds.iter().find(|k| k.kind == kind)
    }
}

/// In-memory mirror of applications, subscriptions, APIs, key mappings and
/// policies. Shared between the ingest worker and decision calls.
#[derive(Debug)]
pub struct EntitlementStore {
    pub(crate) applications: Keyspace<Application>,
    pub(crate) subscriptions: Keyspace<Subscription>,
    pub(crate) apis: Keyspace<Api>,
    pub(crate) key_mappings: Keyspace<ApplicationKeyMapping>,
    pub(crate) api_policies: Keyspace<ApiPolicy>,
    pub(crate) subscription_policies: Keyspace<SubscriptionPolicy>,
    pub(crate) application_policies: Keyspace<ApplicationPolicy>,
}

impl EntitlementStore {
    pub fn new() -> Self {
        Self {
            applications: Keyspace::new(),
            subscriptions: Keyspace::new(),
            apis: Keyspace::new(),
            key_mappings: Keyspace::new(),
            api_policies: Keyspace::new(),
            subscription_policies: Keyspace::new(),
            application_policies: Keyspace::new(),
        }
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            kinds: vec![
                self.applications.stats(),
                self.subscriptions.stats(),
                self.apis.stats(),
                self.key_mappings.stats(),
                self.api_policies.stats(),
                self.subscription_policies.stats(),
                self.application_policies.stats(),
            ],
        }
    }

    /// Drops removal markers older than `horizon`. Live records are never purged.
    pub fn purge_removed(&self, horizon: Timestamp) -> usize {
        self.applications.purge_removed(horizon)
            + self.subscriptions.purge_removed(horizon)
            + self.apis.purge_removed(horizon)
            + self.key_mappings.purge_removed(horizon)
            + self.api_policies.purge_removed(horizon)
            + self.subscription_policies.purge_removed(horizon)
            + self.application_policies.purge_removed(horizon)
    }
}

impl Default for EntitlementStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntitlementReader for EntitlementStore {
    fn get<E: Entity>(&self, key: &E::Key) -> Option<Arc<E>> {
        E::keyspace(self).get(key)
    }
}

impl EntitlementWriter for EntitlementStore {
    fn upsert<E: Entity>(&self, record: E, timestamp: Timestamp) -> WriteOutcome {
        let key = record.key();
        E::keyspace(self).apply(key, Some(Arc::new(record)), timestamp)
    }

    fn remove<E: Entity>(&self, key: &E::Key, timestamp: Timestamp) -> WriteOutcome {
        E::keyspace(self).apply(key.clone(), None, timestamp)
    }
}
