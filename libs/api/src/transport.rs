use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::{Delivery, Record, TransportError};

// ════════════════════════════════════════════════════════════════
//  Stream Transport traits
// ════════════════════════════════════════════════════════════════

/// Consumer side of the Stream Transport.
///
/// Owned by exactly one ingest task, hence `&mut self` and no `Sync`.
/// Implementations: `transport-memory`, `transport-kafka`.
pub trait RecordSource: Send {
    /// Subscribe to a single topic. Called once before the first poll.
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next batch of records.
    ///
    /// An empty batch means nothing arrived in time. Records are returned
    /// in arrival order. Any error is treated as fatal by the ingest loop.
    fn poll(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, TransportError>> + Send + '_>>;
}

/// Producer side of the Stream Transport.
///
/// Shared across request tasks. The returned future resolves once the
/// broker acknowledged the record (or refused it).
pub trait RecordPublisher: Send + Sync {
    /// Publish `value`, keyed if `key` is `Some`.
    fn publish<'a>(
        &'a self,
        key: Option<&'a str>,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Delivery, TransportError>> + Send + 'a>>;
}
