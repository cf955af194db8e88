//! Messages of Loki's `logproto` push API.
//!
//! Only the fields this shipper writes are declared; tags match `pkg/push/push.proto`.

use chrono::{DateTime, Utc};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PushRequest {
    #[prost(message, repeated, tag = "1")]
    pub streams: Vec<StreamAdapter>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamAdapter {
    #[prost(string, tag = "1")]
    pub labels: String,
    #[prost(message, repeated, tag = "2")]
    pub entries: Vec<EntryAdapter>,
    // Computed by the distributor, always zero on the wire from clients
    #[prost(uint64, tag = "3")]
    pub hash: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EntryAdapter {
    #[prost(message, optional, tag = "1")]
    pub timestamp: Option<Timestamp>,
    #[prost(string, tag = "2")]
    pub line: String,
}

/// `google.protobuf.Timestamp`
#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
pub struct Timestamp {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(ts: DateTime<Utc>) -> Self {
        Timestamp {
            seconds: ts.timestamp(),
            // leap seconds are reported as nanos above one second
            nanos: ts.timestamp_subsec_nanos().min(999_999_999) as i32,
        }
    }
}

impl EntryAdapter {
    pub fn new(timestamp: DateTime<Utc>, line: String) -> Self {
        EntryAdapter {
            timestamp: Some(timestamp.into()),
            line,
        }
    }
}
