//! Administrator review: accept/reject, delete, photo re-validation.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::overlay::PendingOverlay;
use super::uploader::PhotoUploader;
use crate::blob::{BlobStore, photo_key};
use crate::classifier::{CLASSIFIER_FAILED, PhotoGate};
use crate::error::{AppError, AppResult};
use crate::model::overtime::{
    OvertimeRecord, PhotoKind, PhotoValidation, RecordStatus, VerificationStatus,
};
use crate::store::{RecordPatch, RecordStore, StoreError};

pub const RECORD_NOT_FOUND: &str = "Catatan lembur tidak ditemukan.";
pub const NOT_CHECKED_OUT: &str =
    "Lembur belum selesai. Verifikasi hanya dapat dilakukan setelah cek out.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accepted,
    Rejected,
}

impl From<Decision> for VerificationStatus {
    fn from(d: Decision) -> Self {
        match d {
            Decision::Accepted => VerificationStatus::Accepted,
            Decision::Rejected => VerificationStatus::Rejected,
        }
    }
}

#[derive(Clone)]
pub struct VerificationDesk {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    uploader: PhotoUploader,
    gate: PhotoGate,
    overlay: PendingOverlay,
}

impl VerificationDesk {
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        uploader: PhotoUploader,
        gate: PhotoGate,
        overlay: PendingOverlay,
    ) -> Self {
        Self {
            records,
            blobs,
            uploader,
            gate,
            overlay,
        }
    }

    async fn existing(&self, record_id: &str) -> AppResult<OvertimeRecord> {
        self.records
            .get(record_id)
            .await?
            .ok_or_else(|| AppError::not_found(RECORD_NOT_FOUND))
    }

    /// Sets the verification outcome. Omitted notes clear any earlier note.
    /// Decisions may be revised; only completed sessions can be reviewed.
    #[instrument(skip(self, notes))]
    pub async fn verify(
        &self,
        record_id: &str,
        decision: Decision,
        notes: Option<String>,
    ) -> AppResult<OvertimeRecord> {
        let record = self.existing(record_id).await?;
        if record.status != RecordStatus::CheckedOut {
            return Err(AppError::conflict(NOT_CHECKED_OUT));
        }

        let patch = RecordPatch {
            expected_status: Some(RecordStatus::CheckedOut),
            verification_status: Some(decision.into()),
            verification_notes: Some(notes.map(|n| n.trim().to_string()).unwrap_or_default()),
            ..Default::default()
        };
        let updated = self
            .records
            .update(record_id, patch)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AppError::not_found(RECORD_NOT_FOUND),
                StoreError::Conflict(_) => AppError::conflict(NOT_CHECKED_OUT),
                other => other.into(),
            })?;

        info!(status = %updated.verification_status, "Overtime verified");
        Ok(self.overlay.apply(updated).await)
    }

    /// Permanent. Photos already in blob storage are left in place.
    #[instrument(skip(self))]
    pub async fn delete(&self, record_id: &str) -> AppResult<()> {
        let record = self.existing(record_id).await?;
        if !self.records.delete(record_id).await? {
            return Err(AppError::not_found(RECORD_NOT_FOUND));
        }
        self.overlay.forget(record_id, &record.employee_id).await;
        let dropped_failures = self.uploader.forget(record_id);
        info!(employee_id = %record.employee_id, dropped_failures, "Overtime record deleted");
        Ok(())
    }

    /// Runs the classifier again on a stored photo and records the outcome.
    /// Classifier or fetch failures are stored as an error marker rather than
    /// failing the request.
    #[instrument(skip(self))]
    pub async fn revalidate_photo(
        &self,
        record_id: &str,
        kind: PhotoKind,
    ) -> AppResult<OvertimeRecord> {
        if !self.gate.is_enabled() {
            return Err(AppError::validation("Validasi foto AI tidak aktif."));
        }
        let record = self.existing(record_id).await?;
        if record.photo(kind).is_none() {
            return Err(AppError::conflict(
                "Foto belum tersedia. Silakan coba lagi nanti.",
            ));
        }

        let validation = match self.photo_data_uri(record_id, kind).await {
            Some(data_uri) => self.gate.assess(&data_uri).await.unwrap_or_else(|| {
                PhotoValidation::Failed {
                    error: CLASSIFIER_FAILED.to_string(),
                }
            }),
            None => PhotoValidation::Failed {
                error: CLASSIFIER_FAILED.to_string(),
            },
        };

        let updated = self
            .records
            .update(record_id, RecordPatch::validation(kind, validation))
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AppError::not_found(RECORD_NOT_FOUND),
                other => other.into(),
            })?;
        Ok(self.overlay.apply(updated).await)
    }

    /// The uploaded photo, or the raw one still held while its upload runs.
    async fn photo_data_uri(&self, record_id: &str, kind: PhotoKind) -> Option<String> {
        if let Some(pending) = self.overlay.pending_photo(record_id, kind).await {
            return Some(pending);
        }
        match self.blobs.fetch(&photo_key(record_id, kind)).await {
            Ok(photo) => Some(photo.encode()),
            Err(e) => {
                warn!(error = %e, "Could not load stored photo for re-validation");
                None
            }
        }
    }
}
