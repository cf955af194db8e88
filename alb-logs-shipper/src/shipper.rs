use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{error_chain, ShipperError};
use crate::key::ObjectKey;
use crate::processor::{ObjectOutcome, Processor};
use crate::queue::{key_queue, KeyReceiver, KeySender, QueueDepth};
use crate::storage::{ObjectStore, MAX_KEYS};

/// Discovery loop plus worker pool.
///
/// Every `interval` the bucket is listed and matching keys are queued; `workers` tasks take keys
/// off the queue and ship them. Cancelling the token stops discovery, after which the workers
/// finish whatever is still queued. A failed object cancels the token too: the process is
/// expected to exit and be restarted rather than leave a half shipped object behind.
pub struct Shipper {
    store: Arc<dyn ObjectStore>,
    processor: Arc<Processor>,
    workers: usize,
    interval: Duration,
    token: CancellationToken,
    tx: KeySender,
    rx: KeyReceiver,
    depth: QueueDepth,
}

impl Shipper {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        processor: Arc<Processor>,
        workers: usize,
        interval: Duration,
        queue_capacity: usize,
        token: CancellationToken,
    ) -> Self {
        let (tx, rx, depth) = key_queue(queue_capacity.max(1));
        Self {
            store,
            processor,
            workers: workers.max(1),
            interval,
            token,
            tx,
            rx,
            depth,
        }
    }

    pub fn queue_depth(&self) -> QueueDepth {
        self.depth.clone()
    }

    /// Runs until the token is cancelled and the queue is drained, or until something fails.
    pub async fn run(self) -> Result<(), ShipperError> {
        let Shipper {
            store,
            processor,
            workers,
            interval,
            token,
            tx,
            rx,
            depth,
        } = self;

        // keys waiting in the queue or being shipped, so a slow object is not queued twice
        let pending = Arc::new(DashSet::new());

        let discovery = tokio::spawn(discover(
            store,
            tx,
            depth,
            pending.clone(),
            interval,
            token.clone(),
        ));

        let handles: Vec<_> = (0..workers)
            .map(|id| {
                tokio::spawn(work(
                    id,
                    rx.clone(),
                    processor.clone(),
                    pending.clone(),
                    token.clone(),
                ))
            })
            .collect();
        drop(rx);

        let mut result = discovery.await?;
        for handle in handles {
            let worker_result = handle.await?;
            if result.is_ok() {
                result = worker_result;
            }
        }
        result
    }
}

async fn discover(
    store: Arc<dyn ObjectStore>,
    tx: KeySender,
    depth: QueueDepth,
    pending: Arc<DashSet<String>>,
    interval: Duration,
    token: CancellationToken,
) -> Result<(), ShipperError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("discovery stopped");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        let start = Instant::now();
        let queued = match discover_once(store.as_ref(), &tx, &pending, &token).await {
            Ok(queued) => queued,
            Err(err) => {
                error!("{}", error_chain(&err));
                token.cancel();
                return Err(err);
            }
        };
        if queued > 0 {
            info!(
                found = queued,
                elapsed = ?start.elapsed(),
                queue = depth.get(),
                "new objects"
            );
        }
    }
}

/// Lists the bucket once and queues the keys that look like access logs.
pub async fn discover_once(
    store: &dyn ObjectStore,
    tx: &KeySender,
    pending: &DashSet<String>,
    token: &CancellationToken,
) -> Result<usize, ShipperError> {
    let keys = store.list(MAX_KEYS).await.map_err(ShipperError::List)?;

    let mut queued = 0;
    for raw in keys {
        let Some(key) = ObjectKey::parse(&raw) else {
            debug!(key = %raw, "skipping non-alb log object");
            continue;
        };
        if !pending.insert(key.key.clone()) {
            continue;
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                pending.remove(&raw);
                break;
            }
            sent = tx.send(key) => {
                if sent.is_err() {
                    pending.remove(&raw);
                    break;
                }
            }
        }
        queued += 1;
    }
    Ok(queued)
}

async fn work(
    id: usize,
    rx: KeyReceiver,
    processor: Arc<Processor>,
    pending: Arc<DashSet<String>>,
    token: CancellationToken,
) -> Result<(), ShipperError> {
    while let Some(key) = rx.recv().await {
        let result = processor.process(&key).await;
        pending.remove(&key.key);

        match result {
            Ok(ObjectOutcome::Shipped(_)) | Ok(ObjectOutcome::Missing) => {}
            Err(source) => {
                metrics::counter!("alb_logs_shipper_objects_failed_total").increment(1);
                error!(worker = id, key = %key, "failed to ship object: {}", error_chain(&source));
                token.cancel();
                return Err(ShipperError::Object {
                    key: key.key,
                    source,
                });
            }
        }
    }
    debug!(worker = id, "queue closed, worker exiting");
    Ok(())
}
