use std::sync::Arc;
use std::time::Instant;

use async_compression::tokio::bufread::GzipDecoder;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::config::OutputFormat;
use crate::elb::MetadataCache;
use crate::error::{ObjectError, StorageError};
use crate::key::ObjectKey;
use crate::line::LineParser;
use crate::loki::{Batch, PushClient};
use crate::storage::ObjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectOutcome {
    Shipped(ShipSummary),
    /// Gone before it could be fetched, most likely handled by another replica.
    Missing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShipSummary {
    pub lines: usize,
    pub skipped: usize,
    pub retries: u32,
    pub deleted: bool,
}

/// Ships one object at a time: fetch, decompress, parse, push, delete.
///
/// The object is only deleted once every line made it to Loki. Any error before that leaves it
/// in the bucket for the next discovery cycle.
pub struct Processor {
    store: Arc<dyn ObjectStore>,
    cache: Arc<MetadataCache>,
    client: PushClient,
    parser: Arc<dyn LineParser>,
    format: OutputFormat,
    strict: bool,
}

impl Processor {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        cache: Arc<MetadataCache>,
        client: PushClient,
        parser: Arc<dyn LineParser>,
        format: OutputFormat,
        strict: bool,
    ) -> Self {
        Self {
            store,
            cache,
            client,
            parser,
            format,
            strict,
        }
    }

    pub async fn process(&self, key: &ObjectKey) -> Result<ObjectOutcome, ObjectError> {
        let start = Instant::now();

        let labels = self
            .cache
            .resolve(&key.account_id, &key.load_balancer)
            .await
            .map_err(|source| ObjectError::Lookup {
                account_id: key.account_id.clone(),
                load_balancer: key.load_balancer.clone(),
                source,
            })?;
        let mut batch = Batch::new(&labels, &self.client);

        let body = match self.store.get(&key.key).await {
            Ok(body) => body,
            Err(StorageError::NotFound(_)) => {
                debug!(key = %key, "skipping non-existent object");
                return Ok(ObjectOutcome::Missing);
            }
            Err(source) => {
                return Err(ObjectError::Fetch {
                    key: key.key.clone(),
                    source,
                })
            }
        };

        let mut decoder = GzipDecoder::new(body);
        decoder.multiple_members(true);
        let mut reader = BufReader::new(decoder);

        let mut summary = ShipSummary::default();
        let mut buf = Vec::with_capacity(4096);
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|source| ObjectError::Read {
                    key: key.key.clone(),
                    source,
                })?;
            if read == 0 {
                break;
            }

            let raw = trim_line_ending(&buf);
            if raw.is_empty() {
                continue;
            }
            let line = String::from_utf8_lossy(raw);

            match self.parser.parse(self.format, &line) {
                Ok(parsed) => batch.add(parsed.timestamp, parsed.line).await?,
                Err(err) if self.strict => return Err(err.into()),
                Err(err) => {
                    warn!(key = %key, "{err}");
                    metrics::counter!("alb_logs_shipper_lines_skipped_total").increment(1);
                    summary.skipped += 1;
                }
            }
        }
        batch.flush().await?;

        summary.lines = batch.shipped();
        summary.retries = batch.retries();
        summary.deleted = match self.store.delete(&key.key).await {
            Ok(()) => true,
            Err(err) => {
                // shipped already, the next cycle will ship it again
                error!(key = %key, "failed to delete object: {err}");
                false
            }
        };

        let elapsed = start.elapsed();
        info!(
            key = %key,
            labels = batch.labels(),
            lines = summary.lines,
            skipped = summary.skipped,
            retries = summary.retries,
            ?elapsed,
            lines_per_sec = %format!("{:.2}", summary.lines as f64 / elapsed.as_secs_f64()),
            "shipped object"
        );
        metrics::counter!("alb_logs_shipper_objects_shipped_total").increment(1);
        Ok(ObjectOutcome::Shipped(summary))
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
