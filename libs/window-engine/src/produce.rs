use std::sync::Arc;
use std::time::Duration;

use busview_api::{Delivery, RecordPublisher};

use crate::error::ProduceError;

pub const DEFAULT_PRODUCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Publishes on behalf of a request task and waits for the broker's
/// acknowledgment, bounded by `timeout`.
///
/// No retries: a rejected or timed-out publish is returned as is.
/// Delivery guarantees (acks, idempotence) belong to the publisher's
/// own configuration.
#[derive(Clone)]
pub struct ProduceGateway {
    publisher: Arc<dyn RecordPublisher>,
    timeout: Duration,
}

impl ProduceGateway {
    pub fn new(publisher: Arc<dyn RecordPublisher>, timeout: Duration) -> Self {
        Self { publisher, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Publish `value`, keyed unless `key` is absent or empty.
    ///
    /// An empty value never reaches the transport.
    pub async fn send(&self, key: Option<&str>, value: &str) -> Result<Delivery, ProduceError> {
        if value.is_empty() {
            return Err(ProduceError::EmptyValue);
        }
        let key = key.filter(|k| !k.is_empty());

        match tokio::time::timeout(self.timeout, self.publisher.publish(key, value)).await {
            Ok(Ok(delivery)) => {
                tracing::debug!(
                    key = ?key,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "produced"
                );
                Ok(delivery)
            }
            Ok(Err(e)) => {
                tracing::warn!(key = ?key, error = ?e, "publish rejected");
                Err(ProduceError::Failed(e))
            }
            Err(_) => {
                tracing::warn!(key = ?key, timeout = ?self.timeout, "publish timed out");
                Err(ProduceError::Timeout(self.timeout))
            }
        }
    }
}
