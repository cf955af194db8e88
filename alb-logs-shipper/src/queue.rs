//! Bounded queue of object keys between discovery and the workers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::key::ObjectKey;

/// Creates a queue holding at most `capacity` keys.
pub fn key_queue(capacity: usize) -> (KeySender, KeyReceiver, QueueDepth) {
    let (tx, rx) = mpsc::channel(capacity);
    let depth = QueueDepth::default();
    (
        KeySender {
            tx,
            depth: depth.clone(),
        },
        KeyReceiver {
            rx: Arc::new(Mutex::new(rx)),
            depth: depth.clone(),
        },
        depth,
    )
}

/// Number of keys waiting in the queue.
#[derive(Debug, Clone, Default)]
pub struct QueueDepth(Arc<AtomicUsize>);

impl QueueDepth {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Dropping the last sender closes the queue.
#[derive(Debug, Clone)]
pub struct KeySender {
    tx: mpsc::Sender<ObjectKey>,
    depth: QueueDepth,
}

impl KeySender {
    /// Waits for a free slot. Gives the key back once every receiver is gone.
    ///
    /// Cancel safe: a send dropped while waiting leaves neither the key nor the depth behind.
    pub async fn send(&self, key: ObjectKey) -> Result<(), ObjectKey> {
        match self.tx.reserve().await {
            Ok(permit) => {
                self.depth.0.fetch_add(1, Ordering::SeqCst);
                permit.send(key);
                Ok(())
            }
            Err(_) => Err(key),
        }
    }
}

/// Shared by all workers; each key is handed to exactly one of them.
#[derive(Debug, Clone)]
pub struct KeyReceiver {
    rx: Arc<Mutex<mpsc::Receiver<ObjectKey>>>,
    depth: QueueDepth,
}

impl KeyReceiver {
    /// `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<ObjectKey> {
        let key = self.rx.lock().await.recv().await?;
        self.depth.0.fetch_sub(1, Ordering::SeqCst);
        Some(key)
    }
}
