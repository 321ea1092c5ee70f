use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use turnstile_storage::EntitlementWriter;

use super::envelope::NotificationEnvelope;
use super::ingest::EventIngestor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("notification queue is full")]
    Full,

    #[error("notification queue is closed")]
    Closed,
}

/// Producer side of the ingest queue. Cloned into every HTTP handler.
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: mpsc::Sender<NotificationEnvelope>,
}

impl NotificationSender {
    /// Enqueues without waiting; a full queue drops the envelope.
    pub fn try_send(&self, envelope: NotificationEnvelope) -> Result<(), EnqueueError> {
        self.tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

/// Consumer side of the ingest queue, handed to [`spawn_ingest_worker`].
#[derive(Debug)]
pub struct NotificationReceiver {
    rx: mpsc::Receiver<NotificationEnvelope>,
}

pub fn notification_queue(capacity: usize) -> (NotificationSender, NotificationReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (NotificationSender { tx }, NotificationReceiver { rx })
}

/// Spawns the single task that applies notifications in arrival order.
///
/// The task ends once every [`NotificationSender`] is dropped and the queue is
/// drained; its result is the number of envelopes processed.
pub fn spawn_ingest_worker<W>(
    ingestor: EventIngestor<W>,
    receiver: NotificationReceiver,
) -> JoinHandle<u64>
where
    W: EntitlementWriter + 'static,
{
    let mut rx = receiver.rx;
    tokio::spawn(async move {
        let mut processed = 0u64;
        while let Some(envelope) = rx.recv().await {
            ingestor.ingest(&envelope);
            processed += 1;
        }
        tracing::info!(processed, "notification queue closed, ingest worker stopping");
        processed
    })
}
