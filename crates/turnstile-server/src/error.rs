use crate::events::EnqueueError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("notification rejected: {0}")]
    Enqueue(#[from] EnqueueError),
}
