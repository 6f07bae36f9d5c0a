use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════
//  Record
// ════════════════════════════════════════════════════════════════

/// One message ingested from the Stream Transport.
///
/// Immutable once built: fields are private and only exposed through
/// accessors. The serde shape is the wire shape served by `GET /messages`:
/// `{"ts":..,"partition":..,"offset":..,"key":..|null,"value":..}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Timestamp in milliseconds (Unix epoch).
    #[serde(rename = "ts")]
    timestamp: i64,
    partition: i32,
    offset: i64,
    key: Option<String>,
    value: String,
}

impl Record {
    pub fn new(
        timestamp: i64,
        partition: i32,
        offset: i64,
        key: Option<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            partition,
            offset,
            key,
            value: value.into(),
        }
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

// ════════════════════════════════════════════════════════════════
//  Delivery
// ════════════════════════════════════════════════════════════════

/// Publish acknowledgment: where the transport placed the record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

impl std::fmt::Display for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "partition {} offset {}", self.partition, self.offset)
    }
}
