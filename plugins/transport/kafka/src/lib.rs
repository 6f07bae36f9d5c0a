use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
#[cfg(test)]
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::message::BorrowedMessage;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::Message;

use busview_api::{Delivery, Record, RecordPublisher, RecordSource, TransportError, now_ms};

// ═══════════════════════════════════════════════════════════════
//  Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct KafkaTransportConfig {
    pub bootstrap: String,
    pub group_id: String,
    /// Upper bound of one poll batch.
    pub max_batch: usize,
    /// Extra librdkafka consumer properties, applied last.
    pub consumer: BTreeMap<String, String>,
    /// Extra librdkafka producer properties, applied last.
    pub producer: BTreeMap<String, String>,
}

impl KafkaTransportConfig {
    pub fn new(bootstrap: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            bootstrap: bootstrap.into(),
            group_id: group_id.into(),
            max_batch: 500,
            consumer: BTreeMap::new(),
            producer: BTreeMap::new(),
        }
    }

    fn consumer_client(&self) -> ClientConfig {
        let mut cfg = ClientConfig::new();
        cfg.set("bootstrap.servers", &self.bootstrap)
            .set("group.id", &self.group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "true")
            .set("enable.partition.eof", "false");
        for (k, v) in &self.consumer {
            cfg.set(k, v);
        }
        cfg
    }

    fn producer_client(&self) -> ClientConfig {
        let mut cfg = ClientConfig::new();
        cfg.set("bootstrap.servers", &self.bootstrap)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("linger.ms", "0")
            .set("client.id", format!("web-producer-{}", uuid::Uuid::new_v4()));
        for (k, v) in &self.producer {
            cfg.set(k, v);
        }
        cfg
    }
}

/// Per-message consume errors (`MessageConsumption`, e.g. the topic does
/// not exist yet) leave the consumer usable and map to `Transient`.
/// `MessageConsumptionFatal` and client failures do not.
fn kafka_err(e: KafkaError) -> TransportError {
    match e {
        KafkaError::ClientConfig(..) | KafkaError::ClientCreation(_) => {
            TransportError::config(e.to_string())
        }
        KafkaError::MessageConsumption(_) => TransportError::transient(e.to_string()),
        KafkaError::Subscription(_) => TransportError::new(e.to_string()),
        _ => TransportError::io(e.to_string()),
    }
}

// ═══════════════════════════════════════════════════════════════
//  KafkaSource
// ═══════════════════════════════════════════════════════════════

/// Consumer-group member reading one topic. Offsets are auto-committed.
pub struct KafkaSource {
    consumer: StreamConsumer,
    max_batch: usize,
}

impl KafkaSource {
    pub fn new(config: &KafkaTransportConfig) -> Result<Self, TransportError> {
        let consumer: StreamConsumer = config.consumer_client().create().map_err(kafka_err)?;
        tracing::info!(
            bootstrap = %config.bootstrap,
            group = %config.group_id,
            "kafka consumer created"
        );
        Ok(Self {
            consumer,
            max_batch: config.max_batch.max(1),
        })
    }
}

/// Tombstones (no payload) are skipped; key/value bytes decode lossily.
fn to_record(msg: &BorrowedMessage<'_>) -> Option<Record> {
    let payload = msg.payload()?;
    let value = String::from_utf8_lossy(payload).into_owned();
    let key = msg.key().map(|k| String::from_utf8_lossy(k).into_owned());
    let ts = msg.timestamp().to_millis().unwrap_or_else(now_ms);
    Some(Record::new(ts, msg.partition(), msg.offset(), key, value))
}

impl RecordSource for KafkaSource {
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.consumer.subscribe(&[topic]).map_err(kafka_err)?;
        tracing::info!(topic = %topic, "kafka consumer subscribed");
        Ok(())
    }

    fn poll(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, TransportError>> + Send + '_>> {
        Box::pin(async move {
            let mut batch = Vec::new();

            // A transient error here goes back to the ingest loop, which polls again.
            let first = match tokio::time::timeout(timeout, self.consumer.recv()).await {
                Err(_) => return Ok(batch),
                Ok(msg) => msg.map_err(kafka_err)?,
            };
            batch.extend(to_record(&first));
            drop(first);

            // Drain what is already buffered without waiting again.
            while batch.len() < self.max_batch {
                match tokio::time::timeout(Duration::ZERO, self.consumer.recv()).await {
                    Err(_) => break,
                    Ok(Ok(msg)) => batch.extend(to_record(&msg)),
                    Ok(Err(e)) => {
                        let e = kafka_err(e);
                        if !e.is_transient() {
                            return Err(e);
                        }
                        tracing::warn!(error = %e, "skipping consume error");
                    }
                }
            }
            Ok(batch)
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  KafkaPublisher
// ═══════════════════════════════════════════════════════════════

/// Idempotent, all-acks producer bound to one topic.
pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaTransportConfig, topic: impl Into<String>) -> Result<Self, TransportError> {
        let producer: FutureProducer = config.producer_client().create().map_err(kafka_err)?;
        let topic = topic.into();
        tracing::info!(bootstrap = %config.bootstrap, topic = %topic, "kafka producer created");
        Ok(Self { producer, topic })
    }

    /// Wait for outstanding deliveries.
    pub fn flush(&self, timeout: Duration) -> Result<(), TransportError> {
        self.producer.flush(timeout).map_err(kafka_err)
    }
}

impl RecordPublisher for KafkaPublisher {
    fn publish<'a>(
        &'a self,
        key: Option<&'a str>,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Delivery, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            let mut record = FutureRecord::<str, str>::to(&self.topic).payload(value);
            if let Some(k) = key {
                record = record.key(k);
            }
            match self.producer.send(record, Duration::ZERO).await {
                Ok((partition, offset)) => Ok(Delivery { partition, offset }),
                Err((e, _)) => Err(kafka_err(e)),
            }
        })
    }
}
