use std::time::Duration;

use busview_api::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("window capacity must be positive")]
    ZeroCapacity,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("ingestion loop is already running")]
    AlreadyRunning,

    #[error("subscribe '{topic}': {source}")]
    Subscribe { topic: String, source: TransportError },

    /// The loop died on a poll error before it was stopped.
    #[error("transport: {0}")]
    Transport(TransportError),

    #[error("ingestion loop did not stop within {0:?}, aborted")]
    StopTimeout(Duration),

    #[error("ingestion task panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProduceError {
    #[error("missing 'value'")]
    EmptyValue,

    #[error("publish failed: {0}")]
    Failed(TransportError),

    #[error("publish not acknowledged within {0:?}")]
    Timeout(Duration),
}
