//! Record model — items pulled from the upstream stream source and the
//! per-record header carried inside packets.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Delivery status stamped into pull-side record headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PullStatus {
    /// The batch sub-frame carries a record.
    Found = 0,
    /// Nothing was available; the response body is empty.
    NoNewMessage = 1,
}

impl PullStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Found),
            1 => Some(Self::NoNewMessage),
            _ => None,
        }
    }
}

/// One topic/partition/offset-addressed item from the upstream source.
///
/// Read-only once retrieved; ownership moves from the source queue into
/// whichever engine dequeues it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Bytes,
    pub value: Bytes,
}

impl Record {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Serialized metadata for one record, carried as packet header bytes or
/// as the header field of a batch sub-frame. JSON on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub msg_id: u64,
    /// Set on the pull side only; omitted from JSON when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PullStatus>,
}

impl RecordHeader {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, msg_id: u64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            msg_id,
            status: None,
        }
    }

    /// Header for a record framed into a pull batch.
    pub fn for_record(record: &Record, msg_id: u64, status: PullStatus) -> Self {
        Self {
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
            msg_id,
            status: Some(status),
        }
    }

    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
