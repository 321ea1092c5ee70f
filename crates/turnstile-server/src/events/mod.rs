mod envelope;
mod ingest;
pub mod payload;
mod worker;

pub use envelope::{
    DecodeError, EventType, NotificationEnvelope, NotificationEvent, PolicyEvent, decode_event,
};
pub use ingest::{DEFAULT_CHANNEL, DropReason, EventIngestor, IgnoreReason, IngestOutcome};
pub use worker::{
    EnqueueError, NotificationReceiver, NotificationSender, notification_queue, spawn_ingest_worker,
};
