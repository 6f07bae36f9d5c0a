use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use busview_api::{Delivery, Record, RecordPublisher, RecordSource, TransportError, now_ms};

// ═══════════════════════════════════════════════════════════════
//  MemoryBusConfig
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct MemoryBusConfig {
    pub partitions: usize,
    /// Records kept across all partitions before the oldest are dropped.
    pub retention: usize,
    /// Upper bound of one poll batch.
    pub max_batch: usize,
}

impl Default for MemoryBusConfig {
    fn default() -> Self {
        Self {
            partitions: 3,
            retention: 100_000,
            max_batch: 500,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryBus
// ═══════════════════════════════════════════════════════════════

/// Arrival-ordered log shared by all partitions. `entries[0]` has
/// sequence number `base_seq`.
struct Log {
    entries: VecDeque<Record>,
    base_seq: u64,
    next_offsets: Vec<i64>,
}

struct Inner {
    topic: String,
    config: MemoryBusConfig,
    log: Mutex<Log>,
    round_robin: AtomicUsize,
    notify: Notify,
    closed: AtomicBool,
}

/// In-process partitioned bus with a single topic.
///
/// Keyed records land on `fnv1a(key) % partitions`, unkeyed ones are
/// spread round-robin. Offsets grow by one per partition from 0 and are
/// never reused, even after retention drops old records.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

impl MemoryBus {
    pub fn new(topic: impl Into<String>, config: MemoryBusConfig) -> Result<Self, TransportError> {
        if config.partitions == 0 {
            return Err(TransportError::config("memory bus needs at least one partition"));
        }
        if config.retention == 0 || config.max_batch == 0 {
            return Err(TransportError::config("memory bus retention and max_batch must be positive"));
        }
        let topic = topic.into();
        tracing::info!(
            topic = %topic,
            partitions = config.partitions,
            retention = config.retention,
            "memory bus created"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                topic,
                log: Mutex::new(Log {
                    entries: VecDeque::new(),
                    base_seq: 0,
                    next_offsets: vec![0; config.partitions],
                }),
                config,
                round_robin: AtomicUsize::new(0),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// New consumer positioned at the earliest retained record.
    pub fn source(&self) -> MemorySource {
        MemorySource {
            inner: self.inner.clone(),
            cursor: 0,
            subscribed: false,
        }
    }

    /// Fail every later poll and publish. Wakes pending polls.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
        tracing::info!(topic = %self.inner.topic, "memory bus closed");
    }

    fn append(&self, key: Option<&str>, value: &str) -> Result<Delivery, TransportError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(TransportError::io("memory bus closed"));
        }
        let partitions = self.inner.config.partitions;
        let partition = match key {
            Some(k) => (fnv1a(k.as_bytes()) % partitions as u64) as usize,
            None => self.inner.round_robin.fetch_add(1, Ordering::Relaxed) % partitions,
        };

        let offset = {
            let mut log = self.inner.log.lock();
            let offset = log.next_offsets[partition];
            log.next_offsets[partition] += 1;
            log.entries.push_back(Record::new(
                now_ms(),
                partition as i32,
                offset,
                key.map(str::to_string),
                value,
            ));
            while log.entries.len() > self.inner.config.retention {
                log.entries.pop_front();
                log.base_seq += 1;
            }
            offset
        };

        self.inner.notify.notify_waiters();
        Ok(Delivery {
            partition: partition as i32,
            offset,
        })
    }
}

impl RecordPublisher for MemoryBus {
    fn publish<'a>(
        &'a self,
        key: Option<&'a str>,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Delivery, TransportError>> + Send + 'a>> {
        Box::pin(async move { self.append(key, value) })
    }
}

/// 64-bit FNV-1a, stable across runs and platforms.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

// ═══════════════════════════════════════════════════════════════
//  MemorySource
// ═══════════════════════════════════════════════════════════════

/// Consumer over a [`MemoryBus`]. Each source has its own cursor.
pub struct MemorySource {
    inner: Arc<Inner>,
    /// Sequence number of the next record to hand out.
    cursor: u64,
    subscribed: bool,
}

impl MemorySource {
    fn take_pending(&mut self) -> Vec<Record> {
        let log = self.inner.log.lock();
        if self.cursor < log.base_seq {
            tracing::warn!(
                skipped = log.base_seq - self.cursor,
                "consumer fell behind retention"
            );
            self.cursor = log.base_seq;
        }
        let start = (self.cursor - log.base_seq) as usize;
        let batch: Vec<Record> = log
            .entries
            .iter()
            .skip(start)
            .take(self.inner.config.max_batch)
            .cloned()
            .collect();
        self.cursor += batch.len() as u64;
        batch
    }
}

impl RecordSource for MemorySource {
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if topic != self.inner.topic {
            return Err(TransportError::new(format!(
                "unknown topic '{topic}' (bus carries '{}')",
                self.inner.topic
            )));
        }
        self.subscribed = true;
        Ok(())
    }

    fn poll(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, TransportError>> + Send + '_>> {
        Box::pin(async move {
            if !self.subscribed {
                return Err(TransportError::new("poll before subscribe"));
            }
            let deadline = tokio::time::Instant::now() + timeout;
            let inner = self.inner.clone();
            loop {
                // Register for wakeups before looking, so a publish between
                // the check and the wait is not lost.
                let notified = inner.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if inner.closed.load(Ordering::Acquire) {
                    return Err(TransportError::io("memory bus closed"));
                }
                let batch = self.take_pending();
                if !batch.is_empty() {
                    return Ok(batch);
                }
                if tokio::time::timeout_at(deadline, notified).await.is_err() {
                    return Ok(Vec::new());
                }
            }
        })
    }
}
