use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{BlobError, BlobStore, DataUri};

/// Keeps photos in process memory. `failing_uploads` makes the next N
/// uploads fail, for exercising the retry path.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, DataUri>>,
    failing_uploads: AtomicU32,
    pub upload_calls: AtomicU32,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(uploads: u32) -> Self {
        Self {
            failing_uploads: AtomicU32::new(uploads),
            ..Default::default()
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.blobs.lock().await.contains_key(key)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn upload(&self, photo: &DataUri, key: &str) -> Result<String, BlobError> {
        self.upload_calls.fetch_add(1, Ordering::Relaxed);

        let should_fail = self
            .failing_uploads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(BlobError::Backend("simulated upload failure".into()));
        }

        self.blobs
            .lock()
            .await
            .insert(key.to_string(), photo.clone());
        Ok(format!("memory://{}", key))
    }

    async fn fetch(&self, key: &str) -> Result<DataUri, BlobError> {
        self.blobs
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }
}
