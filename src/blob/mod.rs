//! Photo storage.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use derive_more::Display;

use crate::model::overtime::PhotoKind;

pub mod memory;
pub mod s3;

#[derive(Debug, Display)]
pub enum BlobError {
    #[display(fmt = "invalid photo payload: {}", _0)]
    InvalidPayload(String),
    #[display(fmt = "blob not found: {}", _0)]
    NotFound(String),
    #[display(fmt = "blob backend error: {}", _0)]
    Backend(String),
}

impl std::error::Error for BlobError {}

/// A decoded `data:<mime>;base64,<data>` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DataUri {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DataUri {
    /// Only base64-encoded images are accepted.
    pub fn parse(raw: &str) -> Result<Self, BlobError> {
        let rest = raw
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| BlobError::InvalidPayload("missing data: prefix".into()))?;
        let (meta, data) = rest
            .split_once(',')
            .ok_or_else(|| BlobError::InvalidPayload("missing payload separator".into()))?;
        let mime = meta
            .strip_suffix(";base64")
            .ok_or_else(|| BlobError::InvalidPayload("payload is not base64".into()))?;

        if !mime.starts_with("image/") {
            return Err(BlobError::InvalidPayload(format!(
                "unsupported media type {:?}",
                mime
            )));
        }

        let bytes = general_purpose::STANDARD
            .decode(data)
            .map_err(|e| BlobError::InvalidPayload(format!("invalid base64: {}", e)))?;
        if bytes.is_empty() {
            return Err(BlobError::InvalidPayload("empty image".into()));
        }

        Ok(Self {
            mime: mime.to_string(),
            bytes,
        })
    }

    pub fn from_bytes(mime: &str, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.to_string(),
            bytes,
        }
    }

    /// Size of the decoded image.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn encode(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// `overtime_photos/{recordId}_{checkIn|checkOut}.jpg`
pub fn photo_key(record_id: &str, kind: PhotoKind) -> String {
    format!("overtime_photos/{}_{}.jpg", record_id, kind.as_ref())
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores the photo under `key`, overwriting any previous upload, and
    /// returns its URL.
    async fn upload(&self, photo: &DataUri, key: &str) -> Result<String, BlobError>;

    /// Loads a stored photo along with the media type it was uploaded with.
    async fn fetch(&self, key: &str) -> Result<DataUri, BlobError>;
}
