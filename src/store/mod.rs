//! Persistence seams for overtime records and user profiles.
//!
//! Both stores are async traits so the lifecycle and verification services
//! can run against MySQL in production and an in-memory backend in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::model::overtime::{
    GeoLocation, NewOvertimeRecord, OvertimeRecord, PhotoKind, PhotoValidation, RecordStatus,
    VerificationStatus,
};
use crate::model::user::{NewUser, UserCredentials, UserPatch, UserProfile};

pub mod memory;
pub mod mysql;

/// Capacity of the change feed; slow subscribers skip ahead when lagging.
pub const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Display)]
pub enum StoreError {
    #[display(fmt = "not found")]
    NotFound,
    #[display(fmt = "conflict: {}", _0)]
    Conflict(String),
    #[display(fmt = "store backend error: {}", _0)]
    Backend(String),
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Partial field merge. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    /// Write only applies while the record is in this status.
    pub expected_status: Option<RecordStatus>,
    pub status: Option<RecordStatus>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub check_out_location: Option<GeoLocation>,
    pub check_in_photo: Option<String>,
    pub check_out_photo: Option<String>,
    pub check_in_validation: Option<PhotoValidation>,
    pub check_out_validation: Option<PhotoValidation>,
    pub verification_status: Option<VerificationStatus>,
    pub verification_notes: Option<String>,
}

impl RecordPatch {
    pub fn photo(kind: PhotoKind, url: String) -> Self {
        match kind {
            PhotoKind::CheckIn => RecordPatch {
                check_in_photo: Some(url),
                ..Default::default()
            },
            PhotoKind::CheckOut => RecordPatch {
                check_out_photo: Some(url),
                ..Default::default()
            },
        }
    }

    pub fn validation(kind: PhotoKind, validation: PhotoValidation) -> Self {
        match kind {
            PhotoKind::CheckIn => RecordPatch {
                check_in_validation: Some(validation),
                ..Default::default()
            },
            PhotoKind::CheckOut => RecordPatch {
                check_out_validation: Some(validation),
                ..Default::default()
            },
        }
    }

    pub fn apply(&self, record: &mut OvertimeRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(time) = self.check_out_time {
            record.check_out_time = Some(time);
        }
        if let Some(location) = self.check_out_location {
            record.check_out_location = Some(location);
        }
        if let Some(url) = &self.check_in_photo {
            record.check_in_photo = Some(url.clone());
        }
        if let Some(url) = &self.check_out_photo {
            record.check_out_photo = Some(url.clone());
        }
        if let Some(v) = &self.check_in_validation {
            record.check_in_validation = Some(v.clone());
        }
        if let Some(v) = &self.check_out_validation {
            record.check_out_validation = Some(v.clone());
        }
        if let Some(status) = self.verification_status {
            record.verification_status = status;
        }
        if let Some(notes) = &self.verification_notes {
            record.verification_notes = Some(notes.clone());
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub employee_id: Option<String>,
    pub status: Option<RecordStatus>,
    pub verification_status: Option<VerificationStatus>,
    /// Inclusive lower bound on check-in time.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on check-in time.
    pub until: Option<DateTime<Utc>>,
    /// Case-insensitive substring of the purpose.
    pub purpose_contains: Option<String>,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl RecordFilter {
    pub fn for_employee(employee_id: &str) -> Self {
        Self {
            employee_id: Some(employee_id.to_string()),
            ..Default::default()
        }
    }

    pub fn active_for(employee_id: &str) -> Self {
        Self {
            employee_id: Some(employee_id.to_string()),
            status: Some(RecordStatus::CheckedIn),
            ..Default::default()
        }
    }

    /// Same predicate the SQL backend compiles into its WHERE clause.
    pub fn matches(&self, record: &OvertimeRecord) -> bool {
        if let Some(employee_id) = &self.employee_id {
            if &record.employee_id != employee_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(status) = self.verification_status {
            if record.verification_status != status {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.check_in_time < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.check_in_time >= until {
                return false;
            }
        }
        if let Some(needle) = &self.purpose_contains {
            if !record
                .purpose
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecordEvent {
    Created { record: OvertimeRecord },
    Updated { record: OvertimeRecord },
    Deleted { id: String, employee_id: String },
}

impl RecordEvent {
    pub fn employee_id(&self) -> &str {
        match self {
            RecordEvent::Created { record } | RecordEvent::Updated { record } => &record.employee_id,
            RecordEvent::Deleted { employee_id, .. } => employee_id,
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persists a new `Checked In` record. Fails with `Conflict` when the
    /// employee already has one.
    async fn insert(&self, record: NewOvertimeRecord) -> Result<OvertimeRecord, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<OvertimeRecord>, StoreError>;

    /// `NotFound` when the record is gone, `Conflict` when
    /// `patch.expected_status` does not hold.
    async fn update(&self, id: &str, patch: RecordPatch) -> Result<OvertimeRecord, StoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Newest `created_at` first.
    async fn query(&self, filter: &RecordFilter) -> Result<Vec<OvertimeRecord>, StoreError>;

    /// Matching rows, ignoring limit/offset.
    async fn count(&self, filter: &RecordFilter) -> Result<u64, StoreError>;

    fn subscribe(&self) -> broadcast::Receiver<RecordEvent>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// `Conflict` on a duplicate email.
    async fn create(&self, user: NewUser) -> Result<UserProfile, StoreError>;

    async fn credentials_by_email(&self, email: &str)
    -> Result<Option<UserCredentials>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<UserProfile>, StoreError>;

    async fn list(&self) -> Result<Vec<UserProfile>, StoreError>;

    async fn update(&self, id: &str, patch: UserPatch) -> Result<UserProfile, StoreError>;

    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    async fn store_refresh_token(
        &self,
        user_id: &str,
        jti: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Revokes the token and reports whether it was still active.
    async fn revoke_refresh_token(&self, jti: &str) -> Result<bool, StoreError>;
}
