use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, instrument};

use super::{BlobError, BlobStore, DataUri};

/// Used when an object carries no usable content type.
const FALLBACK_MIME: &str = "image/jpeg";

#[derive(Clone)]
pub struct S3BlobStore {
    s3_client: Client,
    bucket_name: String,
    public_base_url: String,
}

impl S3BlobStore {
    pub fn new(s3_client: Client, bucket_name: String, public_base_url: Option<String>) -> Self {
        let public_base_url = public_base_url
            .unwrap_or_else(|| format!("https://{}.s3.amazonaws.com", bucket_name))
            .trim_end_matches('/')
            .to_string();
        Self {
            s3_client,
            bucket_name,
            public_base_url,
        }
    }

    /// Loads credentials and region from the standard AWS environment.
    /// A custom endpoint (MinIO and friends) switches to path-style URLs.
    pub async fn from_env(
        bucket_name: String,
        endpoint: Option<String>,
        public_base_url: Option<String>,
    ) -> Self {
        let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self::new(
            Client::from_conf(builder.build()),
            bucket_name,
            public_base_url,
        )
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    #[instrument(name = "s3_put_photo", skip(self, photo), fields(bytes = photo.bytes.len()))]
    async fn upload(&self, photo: &DataUri, key: &str) -> Result<String, BlobError> {
        self.s3_client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(&photo.mime)
            .body(ByteStream::from(photo.bytes.clone()))
            .send()
            .await
            .map_err(|e| BlobError::Backend(format!("put_object failed: {}", e)))?;

        debug!(bucket = %self.bucket_name, key, "Photo stored");
        Ok(self.url_for(key))
    }

    #[instrument(name = "s3_get_photo", skip(self))]
    async fn fetch(&self, key: &str) -> Result<DataUri, BlobError> {
        let response = self
            .s3_client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    BlobError::NotFound(key.to_string())
                } else {
                    BlobError::Backend(format!("get_object failed: {}", service_error))
                }
            })?;

        let mime = response
            .content_type()
            .filter(|m| m.starts_with("image/"))
            .unwrap_or(FALLBACK_MIME)
            .to_string();
        let data = response
            .body
            .collect()
            .await
            .map_err(|e| BlobError::Backend(format!("read body failed: {}", e)))?;
        Ok(DataUri::from_bytes(&mime, data.into_bytes().to_vec()))
    }
}
