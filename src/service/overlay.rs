use std::time::Duration;

use moka::future::Cache;

use crate::model::overtime::{OvertimeRecord, PhotoKind};

/// Upper bound on raw photo data held across all pending uploads.
pub const PHOTO_CACHE_BYTES: u64 = 256 * 1024 * 1024;

/// Short-lived local layer read on top of the store.
///
/// Holds the employee's just-created record until the store view returns
/// it, and the raw photo data URIs until their uploads land, so callers can
/// show a photo while the stored URL is still null. Every entry expires
/// after the TTL whether or not it was cleared.
#[derive(Clone)]
pub struct PendingOverlay {
    active: Cache<String, OvertimeRecord>,
    photos: Cache<(String, PhotoKind), String>,
}

impl PendingOverlay {
    pub fn new(ttl: Duration) -> Self {
        Self::with_photo_budget(ttl, PHOTO_CACHE_BYTES)
    }

    /// Photos are weighed by data URI length, so `photo_bytes` caps memory
    /// rather than the number of entries.
    pub fn with_photo_budget(ttl: Duration, photo_bytes: u64) -> Self {
        Self {
            active: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
            photos: Cache::builder()
                .weigher(|_, data_uri: &String| u32::try_from(data_uri.len()).unwrap_or(u32::MAX))
                .max_capacity(photo_bytes)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn remember_active(&self, record: &OvertimeRecord) {
        self.active
            .insert(record.employee_id.clone(), record.clone())
            .await;
    }

    pub async fn active(&self, employee_id: &str) -> Option<OvertimeRecord> {
        self.active.get(employee_id).await
    }

    pub async fn clear_active(&self, employee_id: &str) {
        self.active.invalidate(employee_id).await;
    }

    pub async fn hold_photo(&self, record_id: &str, kind: PhotoKind, data_uri: String) {
        self.photos
            .insert((record_id.to_string(), kind), data_uri)
            .await;
    }

    pub async fn pending_photo(&self, record_id: &str, kind: PhotoKind) -> Option<String> {
        self.photos.get(&(record_id.to_string(), kind)).await
    }

    pub async fn release_photo(&self, record_id: &str, kind: PhotoKind) {
        self.photos.invalidate(&(record_id.to_string(), kind)).await;
    }

    /// Drops everything held for a deleted record.
    pub async fn forget(&self, record_id: &str, employee_id: &str) {
        if let Some(active) = self.active.get(employee_id).await {
            if active.id == record_id {
                self.active.invalidate(employee_id).await;
            }
        }
        self.release_photo(record_id, PhotoKind::CheckIn).await;
        self.release_photo(record_id, PhotoKind::CheckOut).await;
    }

    /// Fills photo fields the store has not received yet.
    pub async fn apply(&self, mut record: OvertimeRecord) -> OvertimeRecord {
        if record.check_in_photo.is_none() {
            record.check_in_photo = self.pending_photo(&record.id, PhotoKind::CheckIn).await;
        }
        if record.check_out_photo.is_none() {
            record.check_out_photo = self.pending_photo(&record.id, PhotoKind::CheckOut).await;
        }
        record
    }
}
