use std::collections::BTreeMap;
use std::mem;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use prost::Message;

use super::client::PushClient;
use super::proto::{EntryAdapter, PushRequest, StreamAdapter};
use crate::error::PushError;

/// Entries buffered before a push is sent.
pub const BATCH_SIZE: usize = 100;

/// Renders labels the way Loki expects a stream selector: `{a="1", b="2"}`, keys sorted.
pub fn format_labels(labels: &BTreeMap<String, String>) -> String {
    let mut out = String::from("{");
    for (i, (key, value)) in labels.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(key);
        out.push('=');
        crate::line::quote::push_quoted(&mut out, value);
    }
    out.push('}');
    out
}

/// Entries of one object waiting to be pushed under a single label set.
pub struct Batch<'a> {
    client: &'a PushClient,
    stream: StreamAdapter,
    shipped: usize,
    retries: u32,
}

impl<'a> Batch<'a> {
    pub fn new(labels: &BTreeMap<String, String>, client: &'a PushClient) -> Self {
        Self {
            client,
            stream: StreamAdapter {
                labels: format_labels(labels),
                entries: Vec::with_capacity(BATCH_SIZE),
                hash: 0,
            },
            shipped: 0,
            retries: 0,
        }
    }

    pub fn labels(&self) -> &str {
        &self.stream.labels
    }

    pub fn len(&self) -> usize {
        self.stream.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stream.entries.is_empty()
    }

    /// Lines accepted by Loki so far.
    pub fn shipped(&self) -> usize {
        self.shipped
    }

    /// Backoff waits spent across all pushes of this batch.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Buffers one entry, pushing the batch once it holds [`BATCH_SIZE`] entries.
    pub async fn add(&mut self, timestamp: DateTime<Utc>, line: String) -> Result<(), PushError> {
        self.stream.entries.push(EntryAdapter::new(timestamp, line));
        if self.stream.entries.len() >= BATCH_SIZE {
            return self.flush().await;
        }
        Ok(())
    }

    /// Pushes buffered entries. Entries are kept when the push fails.
    pub async fn flush(&mut self) -> Result<(), PushError> {
        if self.stream.entries.is_empty() {
            return Ok(());
        }

        let body = self.encode()?;
        self.retries += self.client.send(body).await?;

        let sent = self.stream.entries.len();
        self.stream.entries.clear();
        self.shipped += sent;
        metrics::counter!("alb_logs_shipper_lines_shipped_total").increment(sent as u64);
        Ok(())
    }

    /// Snappy compressed protobuf `PushRequest` holding the buffered entries.
    pub fn encode(&mut self) -> Result<Bytes, PushError> {
        let request = PushRequest {
            streams: vec![StreamAdapter {
                labels: self.stream.labels.clone(),
                entries: mem::take(&mut self.stream.entries),
                hash: 0,
            }],
        };

        let mut buf = Vec::with_capacity(request.encoded_len());
        let encoded = request.encode(&mut buf);
        if let Some(stream) = request.streams.into_iter().next() {
            self.stream.entries = stream.entries;
        }
        encoded?;

        let compressed = snap::raw::Encoder::new().compress_vec(&buf)?;
        Ok(Bytes::from(compressed))
    }
}
