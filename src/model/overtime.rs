use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
pub enum RecordStatus {
    #[serde(rename = "Checked In")]
    #[strum(serialize = "Checked In")]
    CheckedIn,
    #[serde(rename = "Checked Out")]
    #[strum(serialize = "Checked Out")]
    CheckedOut,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum VerificationStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

/// Which half of a session a photo belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
pub enum PhotoKind {
    #[serde(rename = "checkIn")]
    #[strum(serialize = "checkIn")]
    CheckIn,
    #[serde(rename = "checkOut")]
    #[strum(serialize = "checkOut")]
    CheckOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "latitude": -6.2, "longitude": 106.816666 }))]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoLocation {
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersonVerdict {
    pub is_person: bool,
    /// 0..=1
    pub confidence: f64,
}

/// Classifier outcome attached to a record: a verdict, or the error that
/// prevented one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PhotoValidation {
    Verdict(PersonVerdict),
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "id": "6f1c3a52-6a3f-4a43-9d1e-4c1f0e1b2a11",
    "employeeId": "b0e7c8f2-1d2e-4f60-8c4b-2f1a9e0d7c55",
    "employeeName": "Budi Santoso",
    "checkInTime": "2026-10-17T10:00:00Z",
    "checkOutTime": "2026-10-17T13:00:00Z",
    "checkInPhoto": "https://photos.example.go.id/overtime_photos/6f1c3a52-6a3f-4a43-9d1e-4c1f0e1b2a11_checkIn.jpg",
    "checkOutPhoto": null,
    "checkInLocation": { "latitude": -6.2, "longitude": 106.816666 },
    "checkOutLocation": { "latitude": -6.2001, "longitude": 106.816766 },
    "status": "Checked Out",
    "purpose": "Menyelesaikan laporan",
    "verificationStatus": "Pending",
    "verificationNotes": null,
    "checkInValidation": { "isPerson": true, "confidence": 0.97 },
    "checkOutValidation": null,
    "createdAt": "2026-10-17T10:00:00Z"
}))]
pub struct OvertimeRecord {
    pub id: String,
    pub employee_id: String,
    pub employee_name: String,
    #[schema(value_type = String, format = "date-time")]
    pub check_in_time: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out_time: Option<DateTime<Utc>>,
    pub check_in_photo: Option<String>,
    pub check_out_photo: Option<String>,
    pub check_in_location: Option<GeoLocation>,
    pub check_out_location: Option<GeoLocation>,
    pub status: RecordStatus,
    pub purpose: String,
    pub verification_status: VerificationStatus,
    pub verification_notes: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub check_in_validation: Option<PhotoValidation>,
    #[schema(value_type = Option<Object>)]
    pub check_out_validation: Option<PhotoValidation>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl OvertimeRecord {
    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::CheckedIn
    }

    pub fn photo(&self, kind: PhotoKind) -> Option<&str> {
        match kind {
            PhotoKind::CheckIn => self.check_in_photo.as_deref(),
            PhotoKind::CheckOut => self.check_out_photo.as_deref(),
        }
    }
}

/// Fields supplied at check-in; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewOvertimeRecord {
    pub employee_id: String,
    pub employee_name: String,
    pub check_in_time: DateTime<Utc>,
    pub check_in_location: GeoLocation,
    pub purpose: String,
    pub check_in_validation: Option<PhotoValidation>,
}

impl NewOvertimeRecord {
    pub fn into_record(self, id: String) -> OvertimeRecord {
        OvertimeRecord {
            id,
            employee_id: self.employee_id,
            employee_name: self.employee_name,
            check_in_time: self.check_in_time,
            check_out_time: None,
            check_in_photo: None,
            check_out_photo: None,
            check_in_location: Some(self.check_in_location),
            check_out_location: None,
            status: RecordStatus::CheckedIn,
            purpose: self.purpose,
            verification_status: VerificationStatus::Pending,
            verification_notes: None,
            check_in_validation: self.check_in_validation,
            check_out_validation: None,
            created_at: self.check_in_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_serializes_with_wire_names() {
        let record = NewOvertimeRecord {
            employee_id: "u1".into(),
            employee_name: "Budi".into(),
            check_in_time: Utc::now(),
            check_in_location: GeoLocation {
                latitude: -6.2,
                longitude: 106.8,
            },
            purpose: "Finish report".into(),
            check_in_validation: None,
        }
        .into_record("r1".into());

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "Checked In");
        assert_eq!(value["verificationStatus"], "Pending");
        assert_eq!(value["checkOutTime"], serde_json::Value::Null);
        assert_eq!(value["checkInPhoto"], serde_json::Value::Null);
        assert_eq!(value["employeeName"], "Budi");
        assert_eq!(record.created_at, record.check_in_time);
    }

    #[test]
    fn validation_is_either_verdict_or_error() {
        let verdict: PhotoValidation =
            serde_json::from_value(json!({ "isPerson": false, "confidence": 0.9 })).unwrap();
        assert_eq!(
            verdict,
            PhotoValidation::Verdict(PersonVerdict {
                is_person: false,
                confidence: 0.9
            })
        );

        let failed: PhotoValidation =
            serde_json::from_value(json!({ "error": "Failed to validate photo with AI." })).unwrap();
        assert!(matches!(failed, PhotoValidation::Failed { .. }));
    }

    #[test]
    fn location_bounds() {
        assert!(GeoLocation { latitude: 3.59, longitude: 98.67 }.is_valid());
        assert!(!GeoLocation { latitude: 91.0, longitude: 0.0 }.is_valid());
        assert!(!GeoLocation { latitude: 0.0, longitude: f64::NAN }.is_valid());
    }
}
