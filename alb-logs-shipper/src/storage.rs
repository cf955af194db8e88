use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use tokio::io::AsyncBufRead;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StorageError;

/// Listing page size. There is no pagination: tune the poll interval so a cycle stays below it.
pub const MAX_KEYS: i32 = 1000;

pub type ObjectBody = Box<dyn AsyncBufRead + Send + Unpin>;

/// The bucket access logs are delivered to.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// At most `max_keys` keys, in key order.
    async fn list(&self, max_keys: i32) -> Result<Vec<String>, StorageError>;

    /// Streams the stored (still compressed) bytes of `key`.
    async fn get(&self, key: &str) -> Result<ObjectBody, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list(&self, max_keys: i32) -> Result<Vec<String>, StorageError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(max_keys)
            .send()
            .await
            .map_err(|e| StorageError::OperationFailed(DisplayErrorContext(&e).to_string()))?;

        Ok(output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_owned))
            .collect())
    }

    async fn get(&self, key: &str) -> Result<ObjectBody, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    StorageError::NotFound(key.to_owned())
                } else {
                    StorageError::OperationFailed(DisplayErrorContext(&e).to_string())
                }
            })?;

        Ok(Box::new(Box::pin(output.body.into_async_read())))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::OperationFailed(DisplayErrorContext(&e).to_string()))?;
        debug!(bucket = %self.bucket, key, "deleted object");
        Ok(())
    }
}

/// Objects held in memory, for running the pipeline without a bucket.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
    fail_deletes: AtomicBool,
    fail_lists: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: &str, body: impl Into<Bytes>) {
        self.objects.lock().await.insert(key.to_owned(), body.into());
    }

    pub async fn remove(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().await.remove(key)
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.lock().await.contains_key(key)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }

    /// Makes every following delete fail, leaving the objects in place.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Makes every following listing fail.
    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, max_keys: i32) -> Result<Vec<String>, StorageError> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(StorageError::OperationFailed("listing disabled".to_owned()));
        }
        let limit = usize::try_from(max_keys).unwrap_or_default();
        Ok(self
            .objects
            .lock()
            .await
            .keys()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get(&self, key: &str) -> Result<ObjectBody, StorageError> {
        let body = self
            .objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_owned()))?;
        Ok(Box::new(Cursor::new(body)))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::OperationFailed(format!(
                "delete of {key} disabled"
            )));
        }
        self.objects.lock().await.remove(key);
        Ok(())
    }
}
