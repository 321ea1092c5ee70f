use turnstile_core::{
    Api, ApiPolicy, Application, ApplicationKeyMapping, ApplicationPolicy, EntityKind,
    Subscription, SubscriptionKey, SubscriptionPolicy,
};

use crate::memory::{EntitlementStore, Keyspace};
use crate::traits::Entity;

impl Entity for Application {
    type Key = String;
    const KIND: EntityKind = EntityKind::Application;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn keyspace(store: &EntitlementStore) -> &Keyspace<Self> {
        &store.applications
    }
}

impl Entity for Subscription {
    type Key = SubscriptionKey;
    const KIND: EntityKind = EntityKind::Subscription;

    fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(&self.application_id, &self.api_id)
    }

    fn keyspace(store: &EntitlementStore) -> &Keyspace<Self> {
        &store.subscriptions
    }
}

impl Entity for Api {
    type Key = String;
    const KIND: EntityKind = EntityKind::Api;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn keyspace(store: &EntitlementStore) -> &Keyspace<Self> {
        &store.apis
    }
}

impl Entity for ApplicationKeyMapping {
    type Key = String;
    const KIND: EntityKind = EntityKind::KeyMapping;

    fn key(&self) -> String {
        self.consumer_key.clone()
    }

    fn keyspace(store: &EntitlementStore) -> &Keyspace<Self> {
        &store.key_mappings
    }
}

impl Entity for ApiPolicy {
    type Key = String;
    const KIND: EntityKind = EntityKind::ApiPolicy;

    fn key(&self) -> String {
        self.name.clone()
    }

    fn keyspace(store: &EntitlementStore) -> &Keyspace<Self> {
        &store.api_policies
    }
}

impl Entity for SubscriptionPolicy {
    type Key = String;
    const KIND: EntityKind = EntityKind::SubscriptionPolicy;

    fn key(&self) -> String {
        self.name.clone()
    }

    fn keyspace(store: &EntitlementStore) -> &Keyspace<Self> {
        &store.subscription_policies
    }
}

impl Entity for ApplicationPolicy {
    type Key = String;
    const KIND: EntityKind = EntityKind::ApplicationPolicy;

    fn key(&self) -> String {
        self.name.clone()
    }

    fn keyspace(store: &EntitlementStore) -> &Keyspace<Self> {
        &store.application_policies
    }
}
