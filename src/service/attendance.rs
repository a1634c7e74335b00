//! Check-in / check-out lifecycle.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use super::overlay::PendingOverlay;
use super::uploader::{PhotoUploader, UploadOutcome};
use crate::blob::DataUri;
use crate::classifier::{GateRejection, PhotoGate};
use crate::error::{AppError, AppResult};
use crate::model::overtime::{
    GeoLocation, NewOvertimeRecord, OvertimeRecord, PhotoKind, PhotoValidation, RecordStatus,
};
use crate::model::user::UserProfile;
use crate::store::{RecordFilter, RecordPatch, RecordStore, StoreError};

pub const MISSING_PHOTO_OR_LOCATION: &str = "Foto dan lokasi dibutuhkan untuk melanjutkan.";
pub const MISSING_PURPOSE: &str = "Mohon isi keterangan lembur Anda.";
pub const ALREADY_CHECKED_IN: &str =
    "Anda masih memiliki sesi lembur yang aktif. Silakan cek out terlebih dahulu.";
pub const ALREADY_CHECKED_OUT: &str = "Sesi lembur ini sudah selesai.";

/// Photo and location captured on the device for one half of a session.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    pub photo: Option<String>,
    pub location: Option<GeoLocation>,
}

pub struct Submitted {
    pub record: OvertimeRecord,
    /// Background photo upload; drop to detach.
    pub upload: JoinHandle<UploadOutcome>,
}

#[derive(Clone)]
pub struct AttendanceService {
    records: Arc<dyn RecordStore>,
    uploader: PhotoUploader,
    gate: PhotoGate,
    overlay: PendingOverlay,
}

fn validate_capture(capture: Capture) -> AppResult<(DataUri, String, GeoLocation)> {
    let (Some(raw), Some(location)) = (capture.photo, capture.location) else {
        return Err(AppError::validation(MISSING_PHOTO_OR_LOCATION));
    };
    if raw.trim().is_empty() {
        return Err(AppError::validation(MISSING_PHOTO_OR_LOCATION));
    }
    if !location.is_valid() {
        return Err(AppError::validation("Lokasi tidak valid."));
    }
    let photo = DataUri::parse(&raw).map_err(|e| {
        info!(error = %e, "Rejected photo payload");
        AppError::validation("Format foto tidak valid. Silakan ambil ulang foto.")
    })?;
    Ok((photo, raw, location))
}

fn rejection_message(rejection: GateRejection) -> AppError {
    let message = match rejection {
        GateRejection::NotAPerson(_) | GateRejection::LowConfidence(_) => {
            "Foto tidak terdeteksi sebagai orang. Silakan ambil ulang foto."
        }
        GateRejection::Unavailable(_) => {
            "Foto tidak dapat divalidasi saat ini. Silakan ambil ulang foto."
        }
    };
    AppError::PhotoRejected(message.to_string())
}

impl AttendanceService {
    pub fn new(
        records: Arc<dyn RecordStore>,
        uploader: PhotoUploader,
        gate: PhotoGate,
        overlay: PendingOverlay,
    ) -> Self {
        Self {
            records,
            uploader,
            gate,
            overlay,
        }
    }

    async fn screen(&self, raw_photo: &str, employee_id: &str) -> AppResult<Option<PhotoValidation>> {
        self.gate.screen(raw_photo).await.map_err(|rejection| {
            info!(employee_id, ?rejection, "Photo turned away by gate");
            rejection_message(rejection)
        })
    }

    #[instrument(name = "overtime_check_in", skip_all, fields(employee_id = %employee.id))]
    pub async fn check_in(
        &self,
        employee: &UserProfile,
        purpose: &str,
        capture: Capture,
    ) -> AppResult<Submitted> {
        let (photo, raw_photo, location) = validate_capture(capture)?;
        let purpose = purpose.trim();
        if purpose.is_empty() {
            return Err(AppError::validation(MISSING_PURPOSE));
        }

        if self.active_record(&employee.id).await?.is_some() {
            return Err(AppError::conflict(ALREADY_CHECKED_IN));
        }

        let validation = self.screen(&raw_photo, &employee.id).await?;

        let now = Utc::now();
        let record = self
            .records
            .insert(NewOvertimeRecord {
                employee_id: employee.id.clone(),
                employee_name: employee.name.clone(),
                check_in_time: now,
                check_in_location: location,
                purpose: purpose.to_string(),
                check_in_validation: validation,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => AppError::conflict(ALREADY_CHECKED_IN),
                other => other.into(),
            })?;

        self.overlay.remember_active(&record).await;
        self.overlay
            .hold_photo(&record.id, PhotoKind::CheckIn, raw_photo)
            .await;
        let record = self.overlay.apply(record).await;
        let upload = self
            .uploader
            .enqueue(record.id.clone(), PhotoKind::CheckIn, photo);

        info!(record_id = %record.id, "Checked in");
        Ok(Submitted { record, upload })
    }

    #[instrument(name = "overtime_check_out", skip_all, fields(employee_id = %employee.id, record_id = %record_id))]
    pub async fn check_out(
        &self,
        employee: &UserProfile,
        record_id: &str,
        capture: Capture,
    ) -> AppResult<Submitted> {
        let (photo, raw_photo, location) = validate_capture(capture)?;

        let record = self
            .records
            .get(record_id)
            .await?
            .ok_or_else(|| AppError::not_found("Catatan lembur tidak ditemukan."))?;
        if record.employee_id != employee.id {
            return Err(AppError::Forbidden(
                "Anda tidak dapat mengubah catatan lembur pegawai lain.".to_string(),
            ));
        }
        if record.status != RecordStatus::CheckedIn {
            return Err(AppError::conflict(ALREADY_CHECKED_OUT));
        }

        let validation = self.screen(&raw_photo, &employee.id).await?;

        let patch = RecordPatch {
            expected_status: Some(RecordStatus::CheckedIn),
            status: Some(RecordStatus::CheckedOut),
            check_out_time: Some(Utc::now()),
            check_out_location: Some(location),
            check_out_validation: validation,
            ..Default::default()
        };
        let updated = self
            .records
            .update(record_id, patch)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => AppError::conflict(ALREADY_CHECKED_OUT),
                other => other.into(),
            })?;

        self.overlay.clear_active(&employee.id).await;
        self.overlay
            .hold_photo(&updated.id, PhotoKind::CheckOut, raw_photo)
            .await;
        let updated = self.overlay.apply(updated).await;
        let upload = self
            .uploader
            .enqueue(updated.id.clone(), PhotoKind::CheckOut, photo);

        info!("Checked out");
        Ok(Submitted {
            record: updated,
            upload,
        })
    }

    /// The local record wins until the store returns the same one; after
    /// that the store copy is used and the local entry dropped.
    pub async fn active_record(&self, employee_id: &str) -> AppResult<Option<OvertimeRecord>> {
        let local = self.overlay.active(employee_id).await;
        let filter = RecordFilter {
            limit: Some(1),
            ..RecordFilter::active_for(employee_id)
        };
        let stored = self.records.query(&filter).await?.into_iter().next();

        let active = match (local, stored) {
            (Some(local), Some(stored)) if local.id == stored.id => {
                self.overlay.clear_active(employee_id).await;
                Some(stored)
            }
            (Some(local), _) => Some(local),
            (None, stored) => stored,
        };

        match active {
            Some(record) => Ok(Some(self.overlay.apply(record).await)),
            None => Ok(None),
        }
    }

    /// Newest first.
    pub async fn history(&self, employee_id: &str) -> AppResult<Vec<OvertimeRecord>> {
        let records = self
            .records
            .query(&RecordFilter::for_employee(employee_id))
            .await?;
        let mut shown = Vec::with_capacity(records.len());
        for record in records {
            shown.push(self.overlay.apply(record).await);
        }
        Ok(shown)
    }
}
