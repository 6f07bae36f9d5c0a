/// How a [`TransportError`] should be treated by whoever sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid client configuration, fails at startup.
    Config,
    /// Broker or connection failure. Ends ingestion.
    Io,
    /// One poll went wrong but the consumer is still usable
    /// (e.g. the topic does not exist yet). Ingestion keeps polling.
    Transient,
    /// Misuse: unknown topic, poll before subscribe.
    Logic,
}

/// Error returned by every [`RecordSource`](crate::RecordSource) and
/// [`RecordPublisher`](crate::RecordPublisher) method. Displays as the bare
/// message, which is what a failed produce shows the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    kind: ErrorKind,
    message: String,
}

impl TransportError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Logic, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Config, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Io, msg)
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Transient, msg)
    }

    fn with_kind(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}
