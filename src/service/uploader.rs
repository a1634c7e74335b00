use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

use super::overlay::PendingOverlay;
use crate::blob::{BlobStore, DataUri, photo_key};
use crate::model::overtime::PhotoKind;
use crate::store::{RecordPatch, RecordStore, StoreError};

/// Failed uploads kept for operators; the oldest entries fall off first
/// once either bound is hit.
const FAILURE_QUEUE_CAPACITY: usize = 500;
const FAILURE_QUEUE_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadFailure {
    pub record_id: String,
    pub kind: PhotoKind,
    pub attempts: usize,
    pub error: String,
    #[schema(value_type = String, format = "date-time")]
    pub failed_at: DateTime<Utc>,
    #[serde(skip)]
    photo: DataUri,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Stored(String),
    /// Record deleted before the upload finished.
    Dropped,
    Failed,
}

/// Moves check-in/check-out photos to blob storage in the background and
/// writes the resulting URL back onto the record.
#[derive(Clone)]
pub struct PhotoUploader {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn RecordStore>,
    overlay: PendingOverlay,
    retry: RetryPolicy,
    failures: Arc<Mutex<VecDeque<UploadFailure>>>,
}

impl PhotoUploader {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn RecordStore>,
        overlay: PendingOverlay,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            blobs,
            records,
            overlay,
            retry,
            failures: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Spawns the upload. Dropping the handle detaches the task.
    pub fn enqueue(&self, record_id: String, kind: PhotoKind, photo: DataUri) -> JoinHandle<UploadOutcome> {
        let uploader = self.clone();
        tokio::spawn(async move { uploader.run(record_id, kind, photo).await })
    }

    #[instrument(name = "photo_upload", skip(self, kind, photo), fields(photo_kind = %kind))]
    async fn run(&self, record_id: String, kind: PhotoKind, photo: DataUri) -> UploadOutcome {
        let key = photo_key(&record_id, kind);
        let mut attempt = 0;

        let url = loop {
            attempt += 1;
            match self.blobs.upload(&photo, &key).await {
                Ok(url) => break url,
                Err(e) if attempt >= self.retry.max_attempts => {
                    error!(error = %e, attempts = attempt, key = %key, "Photo upload abandoned");
                    self.push_failure(UploadFailure {
                        record_id: record_id.clone(),
                        kind,
                        attempts: attempt,
                        error: e.to_string(),
                        failed_at: Utc::now(),
                        photo,
                    });
                    return UploadOutcome::Failed;
                }
                Err(e) => {
                    warn!(error = %e, attempt, key = %key, "Photo upload failed, retrying");
                }
            }
            tokio::time::sleep(Duration::from_millis(
                self.retry.base_backoff_ms.saturating_mul(attempt as u64),
            ))
            .await;
        };

        debug!(key = %key, "Photo uploaded");

        match self
            .records
            .update(&record_id, RecordPatch::photo(kind, url.clone()))
            .await
        {
            Ok(_) => {
                self.overlay.release_photo(&record_id, kind).await;
                info!(url = %url, "Photo attached to record");
                UploadOutcome::Stored(url)
            }
            Err(StoreError::NotFound) => {
                warn!("Record deleted before its photo was stored");
                self.overlay.release_photo(&record_id, kind).await;
                UploadOutcome::Dropped
            }
            Err(e) => {
                error!(error = %e, "Failed to attach uploaded photo to record");
                self.push_failure(UploadFailure {
                    record_id: record_id.clone(),
                    kind,
                    attempts: attempt,
                    error: e.to_string(),
                    failed_at: Utc::now(),
                    photo,
                });
                UploadOutcome::Failed
            }
        }
    }

    fn push_failure(&self, failure: UploadFailure) {
        let Ok(mut failures) = self.failures.lock() else {
            return;
        };
        admit_failure(
            &mut failures,
            failure,
            FAILURE_QUEUE_CAPACITY,
            FAILURE_QUEUE_BYTES,
        );
    }

    /// Drops queued failures for a deleted record. Returns how many went.
    pub fn forget(&self, record_id: &str) -> usize {
        let Ok(mut failures) = self.failures.lock() else {
            return 0;
        };
        let before = failures.len();
        failures.retain(|f| f.record_id != record_id);
        before - failures.len()
    }

    pub fn failures(&self) -> Vec<UploadFailure> {
        self.failures
            .lock()
            .map(|f| f.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Takes a failed upload off the queue and runs it again.
    pub fn retry_failed(&self, record_id: &str, kind: PhotoKind) -> Option<JoinHandle<UploadOutcome>> {
        let failure = {
            let mut failures = self.failures.lock().ok()?;
            let index = failures
                .iter()
                .position(|f| f.record_id == record_id && f.kind == kind)?;
            failures.remove(index)?
        };
        info!(record_id, kind = %kind, "Retrying failed photo upload");
        Some(self.enqueue(failure.record_id, failure.kind, failure.photo))
    }
}

fn admit_failure(
    queue: &mut VecDeque<UploadFailure>,
    failure: UploadFailure,
    max_entries: usize,
    max_bytes: usize,
) {
    // one entry per record photo
    queue.retain(|f| !(f.record_id == failure.record_id && f.kind == failure.kind));

    let mut held: usize = queue.iter().map(|f| f.photo.len()).sum();
    while !queue.is_empty() && (queue.len() >= max_entries || held + failure.photo.len() > max_bytes) {
        if let Some(evicted) = queue.pop_front() {
            warn!(record_id = %evicted.record_id, kind = %evicted.kind, "Failed upload evicted from queue");
            held -= evicted.photo.len();
        }
    }
    queue.push_back(failure);
}
