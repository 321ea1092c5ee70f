use std::sync::Arc;

use turnstile_core::{
    Api, ApiPolicy, Application, ApplicationKeyMapping, ApplicationPolicy, EntityKind,
    Subscription, SubscriptionKey, SubscriptionPolicy, Timestamp,
};
use turnstile_storage::{EntitlementWriter, Entity, WriteOutcome};

use crate::metrics::Metrics;

use super::envelope::{
    DecodeError, EventType, NotificationEnvelope, NotificationEvent, PolicyEvent, decode_event,
    read_event_type, read_payload, read_timestamp,
};

pub const DEFAULT_CHANNEL: &str = "notification";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    ForeignChannel(String),
    NotANotification,
    UnknownEventType(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    EmptyEnvelope,
    Decode(DecodeError),
}

impl From<DecodeError> for DropReason {
    fn from(err: DecodeError) -> Self {
        DropReason::Decode(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// One store call was made; `write` says whether it took effect.
    Stored {
        kind: EntityKind,
        key: String,
        write: WriteOutcome,
    },
    Ignored(IgnoreReason),
    Dropped(DropReason),
}

/// Translates notification envelopes into store mutations.
pub struct EventIngestor<W> {
    store: W,
    channel: String,
    metrics: Option<Arc<Metrics>>,
}

impl<W: EntitlementWriter> EventIngestor<W> {
    pub fn new(store: W, channel: impl Into<String>) -> Self {
        Self {
            store,
            channel: channel.into(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn ingest(&self, envelope: &NotificationEnvelope) -> IngestOutcome {
        let outcome = self.process(envelope);
        log_outcome(&envelope.destination, &outcome);
        if let Some(metrics) = &self.metrics {
            metrics.record_ingest(&outcome);
        }
        outcome
    }

    fn process(&self, envelope: &NotificationEnvelope) -> IngestOutcome {
        let Some(body) = &envelope.body else {
            return IngestOutcome::Dropped(DropReason::EmptyEnvelope);
        };

        if !envelope.destination.eq_ignore_ascii_case(&self.channel) {
            return IngestOutcome::Ignored(IgnoreReason::ForeignChannel(
                envelope.destination.clone(),
            ));
        }

        let event_type = match read_event_type(body) {
            Ok(Some(event_type)) => event_type,
            Ok(None) => return IngestOutcome::Ignored(IgnoreReason::NotANotification),
            Err(e) => return IngestOutcome::Dropped(e.into()),
        };

        if let EventType::Unknown(tag) = &event_type {
            return IngestOutcome::Ignored(IgnoreReason::UnknownEventType(tag.clone()));
        }

        let decoded = read_timestamp(body).and_then(|timestamp| {
            let payload = read_payload(body)?;
            let event = decode_event(&event_type, &payload)?;
            Ok((timestamp, event))
        });

        match decoded {
            Ok((timestamp, event)) => self.apply(event, timestamp),
            Err(e) => IngestOutcome::Dropped(e.into()),
        }
    }

    fn apply(&self, event: NotificationEvent, timestamp: Timestamp) -> IngestOutcome {
        match event {
            NotificationEvent::ApplicationUpsert(e) => {
                self.upsert(Application::from(e), timestamp)
            }
            NotificationEvent::ApplicationDelete(e) => {
                self.remove::<Application>(e.application_id, timestamp)
            }
            NotificationEvent::SubscriptionUpsert(e) => {
                self.upsert(Subscription::from(e), timestamp)
            }
            NotificationEvent::SubscriptionDelete(e) => self.remove::<Subscription>(
                SubscriptionKey::new(e.application_id, e.api_id),
                timestamp,
            ),
            NotificationEvent::ApiUpsert(e) => self.upsert(Api::from(e), timestamp),
            NotificationEvent::ApiLifecycleChange(e) => {
                if e.status().is_servable() {
                    self.upsert(Api::from(e), timestamp)
                } else {
                    self.remove::<Api>(e.api_id, timestamp)
                }
            }
            NotificationEvent::ApiDelete(e) => self.remove::<Api>(e.api_id, timestamp),
            NotificationEvent::KeyMappingCreate(e) => {
                self.upsert(ApplicationKeyMapping::from(e), timestamp)
            }
            NotificationEvent::PolicyUpsert(policy) => match policy {
                PolicyEvent::Api(p) => self.upsert(ApiPolicy::from(p), timestamp),
                PolicyEvent::Subscription(p) => {
                    self.upsert(SubscriptionPolicy::from(p), timestamp)
                }
                PolicyEvent::Application(p) => {
                    self.upsert(ApplicationPolicy::from(p), timestamp)
                }
            },
            NotificationEvent::PolicyDelete(policy) => match policy {
                PolicyEvent::Api(p) => self.remove::<ApiPolicy>(p.policy_name, timestamp),
                PolicyEvent::Subscription(p) => {
                    self.remove::<SubscriptionPolicy>(p.policy_name, timestamp)
                }
                PolicyEvent::Application(p) => {
                    self.remove::<ApplicationPolicy>(p.policy_name, timestamp)
                }
            },
        }
    }

    fn upsert<E: Entity>(&self, record: E, timestamp: Timestamp) -> IngestOutcome {
        let key = record.key().to_string();
        let write = self.store.upsert(record, timestamp);
        IngestOutcome::Stored {
            kind: E::KIND,
            key,
            write,
        }
    }

    fn remove<E: Entity>(&self, key: E::Key, timestamp: Timestamp) -> IngestOutcome {
        let write = self.store.remove::<E>(&key, timestamp);
        IngestOutcome::Stored {
            kind: E::KIND,
            key: key.to_string(),
            write,
        }
    }
}

fn log_outcome(destination: &str, outcome: &IngestOutcome) {
    match outcome {
        IngestOutcome::Stored {
            kind,
            key,
            write: WriteOutcome::Applied,
        } => {
            tracing::debug!(kind = %kind, key = %key, "notification applied");
        }
        IngestOutcome::Stored {
            kind,
            key,
            write: WriteOutcome::Stale { stored },
        } => {
            tracing::debug!(
                kind = %kind,
                key = %key,
                stored_timestamp = stored.value(),
                "notification superseded by a newer mutation"
            );
        }
        IngestOutcome::Ignored(IgnoreReason::UnknownEventType(tag)) => {
            tracing::warn!(event_type = %tag, "ignoring notification with unknown event type");
        }
        IngestOutcome::Ignored(reason) => {
            tracing::trace!(destination = %destination, reason = ?reason, "message ignored");
        }
        IngestOutcome::Dropped(DropReason::EmptyEnvelope) => {
            tracing::warn!(destination = %destination, "dropping message without a body");
        }
        IngestOutcome::Dropped(DropReason::Decode(e)) => {
            tracing::warn!(destination = %destination, error = %e, "dropping undecodable notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CountingStore;
    use serde_json::{Map, Value, json};
    use turnstile_core::ApiStatus;
    use turnstile_storage::EntitlementReader;

    fn ingestor() -> EventIngestor<Arc<CountingStore>> {
        EventIngestor::new(Arc::new(CountingStore::new()), DEFAULT_CHANNEL)
    }

    fn notify(event_type: &str, timestamp: i64, payload: Value) -> NotificationEnvelope {
        NotificationEnvelope::notification(DEFAULT_CHANNEL, event_type, timestamp, &payload)
    }

    fn published_api(id: &str) -> Value {
        json!({
            "apiId": id,
            "apiName": "PizzaShack",
            "apiVersion": "1.0.0",
            "apiContext": "/pizzashack/1.0.0",
            "apiStatus": "PUBLISHED",
        })
    }

    // 1. Application create lands in the application keyspace
    #[test]
    fn application_create_upserts_application() {
        let ingestor = ingestor();
        let outcome = ingestor.ingest(&notify(
            "APPLICATION_CREATE",
            100,
            json!({ "applicationId": 7, "applicationName": "App", "subscriber": "alice" }),
        ));

        assert_eq!(
            outcome,
            IngestOutcome::Stored {
                kind: EntityKind::Application,
                key: "7".to_string(),
                write: WriteOutcome::Applied,
            }
        );
        let app = ingestor.store.get::<Application>(&"7".to_string()).unwrap();
        assert_eq!(app.owner, "alice");
    }

    // 2. Delete removes, and an older re-create cannot resurrect it
    #[test]
    fn application_delete_wins_over_older_create() {
        let ingestor = ingestor();
        let payload = json!({ "applicationId": "a1", "applicationName": "App" });

        ingestor.ingest(&notify("APPLICATION_DELETE", 200, payload.clone()));
        let outcome = ingestor.ingest(&notify("APPLICATION_CREATE", 100, payload));

        assert!(matches!(
            outcome,
            IngestOutcome::Stored {
                write: WriteOutcome::Stale { .. },
                ..
            }
        ));
        assert!(
            ingestor
                .store
                .get::<Application>(&"a1".to_string())
                .is_none()
        );
    }

    // 3. Subscription delete addresses the (application, api) pair
    #[test]
    fn subscription_lifecycle_by_composite_key() {
        let ingestor = ingestor();
        let payload = json!({
            "subscriptionId": 1,
            "applicationId": 3,
            "apiId": "api-1",
            "policyId": "Gold",
            "subscriptionState": "UNBLOCKED",
        });
        ingestor.ingest(&notify("SUBSCRIPTIONS_CREATE", 10, payload));

        let key = SubscriptionKey::new("3", "api-1");
        assert_eq!(
            ingestor.store.get::<Subscription>(&key).unwrap().policy,
            "Gold"
        );

        ingestor.ingest(&notify(
            "SUBSCRIPTIONS_DELETE",
            11,
            json!({ "applicationId": "3", "apiId": "api-1" }),
        ));
        assert!(ingestor.store.get::<Subscription>(&key).is_none());
    }

    // 4. Lifecycle change to RETIRED removes the API
    #[test]
    fn lifecycle_change_to_retired_removes_api() {
        let ingestor = ingestor();
        ingestor.ingest(&notify("API_UPDATE", 1, published_api("api-1")));

        let mut retired = published_api("api-1");
        retired["apiStatus"] = json!("RETIRED");
        let outcome = ingestor.ingest(&notify("API_LIFECYCLE_CHANGE", 2, retired));

        assert_eq!(
            outcome,
            IngestOutcome::Stored {
                kind: EntityKind::Api,
                key: "api-1".to_string(),
                write: WriteOutcome::Applied,
            }
        );
        assert!(ingestor.store.get::<Api>(&"api-1".to_string()).is_none());
    }

    // 5. Lifecycle change to BLOCKED keeps the API with the new status
    #[test]
    fn lifecycle_change_to_blocked_updates_api() {
        let ingestor = ingestor();
        let mut blocked = published_api("api-1");
        blocked["apiStatus"] = json!("BLOCKED");
        ingestor.ingest(&notify("API_LIFECYCLE_CHANGE", 5, blocked));

        let api = ingestor.store.get::<Api>(&"api-1".to_string()).unwrap();
        assert_eq!(api.status, ApiStatus::Blocked);
    }

    // 6. Key registration maps consumer key to application
    #[test]
    fn registration_creates_key_mapping() {
        let ingestor = ingestor();
        ingestor.ingest(&notify(
            "APPLICATION_REGISTRATION_CREATE",
            1,
            json!({
                "applicationId": 9,
                "consumerKey": "ck-123",
                "keyType": "PRODUCTION",
                "keyManager": "Resident Key Manager",
            }),
        ));

        let mapping = ingestor
            .store
            .get::<ApplicationKeyMapping>(&"ck-123".to_string())
            .unwrap();
        assert_eq!(mapping.application_id, "9");
        assert_eq!(mapping.key_type, "PRODUCTION");
    }

    // 7. Policy events dispatch on the policyType discriminator
    #[test]
    fn policy_events_route_by_policy_type() {
        let ingestor = ingestor();
        let outcome = ingestor.ingest(&notify(
            "POLICY_CREATE",
            1,
            json!({
                "policyId": 3,
                "policyName": "Gold",
                "policyType": "SUBSCRIPTION",
                "rateLimitCount": 10,
            }),
        ));
        assert!(matches!(
            outcome,
            IngestOutcome::Stored {
                kind: EntityKind::SubscriptionPolicy,
                ..
            }
        ));
        assert!(
            ingestor
                .store
                .get::<SubscriptionPolicy>(&"Gold".to_string())
                .is_some()
        );
        assert!(
            ingestor
                .store
                .get::<ApplicationPolicy>(&"Gold".to_string())
                .is_none()
        );

        ingestor.ingest(&notify(
            "POLICY_DELETE",
            2,
            json!({ "policyName": "Gold", "policyType": "SUBSCRIPTION" }),
        ));
        assert!(
            ingestor
                .store
                .get::<SubscriptionPolicy>(&"Gold".to_string())
                .is_none()
        );
    }

    // 8. A different destination never touches the store
    #[test]
    fn foreign_channel_makes_no_store_calls() {
        let ingestor = ingestor();
        let envelope = NotificationEnvelope::notification(
            "throttleData",
            "API_UPDATE",
            1,
            &published_api("api-1"),
        );

        let outcome = ingestor.ingest(&envelope);

        assert_eq!(
            outcome,
            IngestOutcome::Ignored(IgnoreReason::ForeignChannel("throttleData".to_string()))
        );
        assert_eq!(ingestor.store.writes(), 0);
    }

    // 9. Channel names compare case-insensitively
    #[test]
    fn channel_match_ignores_ascii_case() {
        let ingestor = ingestor();
        let envelope = NotificationEnvelope::notification(
            "NOTIFICATION",
            "API_UPDATE",
            1,
            &published_api("api-1"),
        );

        assert!(matches!(
            ingestor.ingest(&envelope),
            IngestOutcome::Stored { .. }
        ));
    }

    // 10. Undecodable payloads are dropped without store calls
    #[test]
    fn undecodable_payload_makes_no_store_calls() {
        let ingestor = ingestor();
        let mut body = Map::new();
        body.insert("eventType".to_string(), json!("API_UPDATE"));
        body.insert("timestamp".to_string(), json!(1));
        body.insert("event".to_string(), json!("%%%not base64%%%"));

        let outcome = ingestor.ingest(&NotificationEnvelope::new(DEFAULT_CHANNEL, body));

        assert!(matches!(
            outcome,
            IngestOutcome::Dropped(DropReason::Decode(DecodeError::Base64(_)))
        ));
        assert_eq!(ingestor.store.writes(), 0);
    }

    // 11. Valid base64 that is not the expected JSON is dropped too
    #[test]
    fn payload_missing_required_field_is_dropped() {
        let ingestor = ingestor();
        let outcome = ingestor.ingest(&notify("SUBSCRIPTIONS_CREATE", 1, json!({ "apiId": 1 })));

        assert!(matches!(
            outcome,
            IngestOutcome::Dropped(DropReason::Decode(DecodeError::Payload { .. }))
        ));
        assert_eq!(ingestor.store.writes(), 0);
    }

    // 12. Unknown tags are ignored even when the payload looks like a policy
    #[test]
    fn unknown_event_type_is_ignored() {
        let ingestor = ingestor();
        let outcome = ingestor.ingest(&notify(
            "API_CREATE",
            1,
            json!({ "policyName": "Gold", "policyType": "API" }),
        ));

        assert_eq!(
            outcome,
            IngestOutcome::Ignored(IgnoreReason::UnknownEventType("API_CREATE".to_string()))
        );
        assert_eq!(ingestor.store.writes(), 0);
    }

    // 13. Bodies without eventType are not notifications
    #[test]
    fn body_without_event_type_is_ignored() {
        let ingestor = ingestor();
        let mut body = Map::new();
        body.insert("timestamp".to_string(), json!(1));

        let outcome = ingestor.ingest(&NotificationEnvelope::new(DEFAULT_CHANNEL, body));

        assert_eq!(outcome, IngestOutcome::Ignored(IgnoreReason::NotANotification));
    }

    // 14. Envelopes without a body are dropped
    #[test]
    fn envelope_without_body_is_dropped() {
        let ingestor = ingestor();
        let envelope = NotificationEnvelope {
            destination: DEFAULT_CHANNEL.to_string(),
            body: None,
        };

        assert_eq!(
            ingestor.ingest(&envelope),
            IngestOutcome::Dropped(DropReason::EmptyEnvelope)
        );
    }

    // 15. Missing timestamp is a decode failure
    #[test]
    fn missing_timestamp_is_dropped() {
        let ingestor = ingestor();
        let mut envelope = notify("API_DELETE", 1, json!({ "apiId": "api-1" }));
        if let Some(body) = envelope.body.as_mut() {
            body.remove("timestamp");
        }

        assert_eq!(
            ingestor.ingest(&envelope),
            IngestOutcome::Dropped(DropReason::Decode(DecodeError::MissingField("timestamp")))
        );
        assert_eq!(ingestor.store.writes(), 0);
    }

    // 16. Each decoded event makes exactly one store call
    #[test]
    fn decoded_event_makes_exactly_one_store_call() {
        let ingestor = ingestor();
        ingestor.ingest(&notify("API_UPDATE", 1, published_api("api-1")));
        ingestor.ingest(&notify("API_DELETE", 2, json!({ "apiId": "api-1" })));

        assert_eq!(ingestor.store.writes(), 2);
    }

    // 17. Outcomes are reflected in metrics
    #[test]
    fn ingest_records_metrics() {
        let metrics = Arc::new(Metrics::new());
        let ingestor = ingestor().with_metrics(Arc::clone(&metrics));

        ingestor.ingest(&notify("API_UPDATE", 2, published_api("api-1")));
        ingestor.ingest(&notify("API_UPDATE", 1, published_api("api-1")));
        ingestor.ingest(&notify("SOMETHING_ELSE", 3, json!({})));

        assert_eq!(metrics.events_applied(), 1);
        assert_eq!(metrics.events_stale(), 1);
        assert_eq!(metrics.events_ignored(), 1);
    }
}
