use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::Value;
use tracing_subscriber::layer::SubscriberExt;
use turnstile_core::{Timestamp, TokenValidator, VerificationKey};
use turnstile_storage::{EntitlementReader, EntitlementStore, EntitlementWriter, Entity, WriteOutcome};

pub const SIGNING_PEM: &str = include_str!("../../turnstile-core/testdata/signing_key.pem");
pub const VERIFICATION_PEM: &str =
    include_str!("../../turnstile-core/testdata/verification_key.pem");

/// Real store that counts every call made through the reader and writer seams.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: EntitlementStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl EntitlementReader for CountingStore {
    fn get<E: Entity>(&self, key: &E::Key) -> Option<Arc<E>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }
}

impl EntitlementWriter for CountingStore {
    fn upsert<E: Entity>(&self, record: E, timestamp: Timestamp) -> WriteOutcome {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(record, timestamp)
    }

    fn remove<E: Entity>(&self, key: &E::Key, timestamp: Timestamp) -> WriteOutcome {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove::<E>(key, timestamp)
    }
}

pub fn validator() -> TokenValidator {
    TokenValidator::new(VerificationKey::from_pem(VERIFICATION_PEM).unwrap())
}

pub fn sign(claims: &Value) -> String {
    let key = EncodingKey::from_rsa_pem(SIGNING_PEM.as_bytes()).unwrap();
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), claims, &key).unwrap()
}

#[derive(Debug)]
pub struct CapturedEvent {
    pub target: String,
    pub fields: Vec<(String, String)>,
}

struct TestLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for TestLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut fields = Vec::new();
        let mut visitor = FieldVisitor(&mut fields);
        event.record(&mut visitor);

        self.events.lock().unwrap().push(CapturedEvent {
            target: event.metadata().target().to_string(),
            fields,
        });
    }
}

struct FieldVisitor<'a>(&'a mut Vec<(String, String)>);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.push((field.name().to_string(), value.to_string()));
    }
}

/// Runs `f` with a thread-local subscriber and returns every event it saw.
pub fn with_test_subscriber<F: FnOnce()>(f: F) -> Vec<CapturedEvent> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let layer = TestLayer {
        events: Arc::clone(&events),
    };
    let subscriber = tracing_subscriber::registry().with(layer);
    tracing::subscriber::with_default(subscriber, f);
    std::mem::take(&mut *events.lock().unwrap())
}

pub fn has_field(event: &CapturedEvent, key: &str, value: &str) -> bool {
    event.fields.iter().any(|(k, v)| k == key && v == value)
}
