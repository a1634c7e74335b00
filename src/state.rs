use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;

use crate::blob::BlobStore;
use crate::classifier::PhotoGate;
use crate::config::Config;
use crate::service::attendance::AttendanceService;
use crate::service::overlay::PendingOverlay;
use crate::service::report::local_offset;
use crate::service::uploader::{PhotoUploader, RetryPolicy};
use crate::service::verification::VerificationDesk;
use crate::store::{RecordStore, UserStore};

/// Shared handles passed to every handler through `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub records: Arc<dyn RecordStore>,
    pub users: Arc<dyn UserStore>,
    pub attendance: AttendanceService,
    pub desk: VerificationDesk,
    pub uploader: PhotoUploader,
    pub report_offset: FixedOffset,
}

impl AppState {
    pub fn new(
        config: &Config,
        records: Arc<dyn RecordStore>,
        users: Arc<dyn UserStore>,
        blobs: Arc<dyn BlobStore>,
        gate: PhotoGate,
    ) -> Self {
        let overlay = PendingOverlay::new(Duration::from_secs(config.overlay_ttl_secs));
        let uploader = PhotoUploader::new(
            blobs.clone(),
            records.clone(),
            overlay.clone(),
            RetryPolicy {
                max_attempts: config.upload_max_attempts,
                base_backoff_ms: config.upload_backoff_ms,
            },
        );
        let attendance =
            AttendanceService::new(records.clone(), uploader.clone(), gate.clone(), overlay.clone());
        let desk = VerificationDesk::new(records.clone(), blobs, uploader.clone(), gate, overlay);

        Self {
            records,
            users,
            attendance,
            desk,
            uploader,
            report_offset: local_offset(config.report_utc_offset_hours),
        }
    }
}
