pub mod api;
pub mod auth;
pub mod blob;
pub mod classifier;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod model;
pub mod models;
pub mod routes;
pub mod service;
pub mod state;
pub mod store;
pub mod utils;

use std::sync::Arc;

use actix_web::web::{self, Data};
use anyhow::Context;
use tracing::info;

use crate::blob::BlobStore;
use crate::blob::memory::InMemoryBlobStore;
use crate::blob::s3::S3BlobStore;
use crate::classifier::build_gate;
use crate::config::Config;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::memory::{InMemoryRecordStore, InMemoryUserStore};
use crate::store::mysql::{MySqlRecordStore, MySqlUserStore};
use crate::store::{RecordStore, UserStore};

/// Photos arrive inline as base64 data URIs.
const JSON_LIMIT_BYTES: usize = 10 * 1024 * 1024;

/// Wires stores, blob storage and the photo gate from configuration.
pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let (records, users): (Arc<dyn RecordStore>, Arc<dyn UserStore>) = match &config.database_url
    {
        Some(url) => {
            let pool = db::init_db(url)
                .await
                .context("Failed to connect to database")?;
            info!("Using MySQL stores");
            (
                Arc::new(MySqlRecordStore::new(pool.clone())),
                Arc::new(MySqlUserStore::new(pool)),
            )
        }
        None => {
            info!("DATABASE_URL not set; using in-memory stores");
            (
                Arc::new(InMemoryRecordStore::new()),
                Arc::new(InMemoryUserStore::new()),
            )
        }
    };

    let blobs: Arc<dyn BlobStore> = match config.blob_backend.as_str() {
        "s3" => {
            let bucket = config
                .s3_bucket
                .clone()
                .context("BLOB_BACKEND=s3 requires S3_BUCKET")?;
            info!(bucket = %bucket, "Using S3 photo storage");
            Arc::new(
                S3BlobStore::from_env(
                    bucket,
                    config.s3_endpoint.clone(),
                    config.photo_public_base_url.clone(),
                )
                .await,
            )
        }
        _ => {
            info!("Using in-memory photo storage");
            Arc::new(InMemoryBlobStore::new())
        }
    };

    Ok(AppState::new(config, records, users, blobs, build_gate(config)))
}

/// Registers shared data and every route on an app or test service.
pub fn configure_app(cfg: &mut web::ServiceConfig, config: Config, state: AppState) {
    let json_config = web::JsonConfig::default()
        .limit(JSON_LIMIT_BYTES)
        .error_handler(|err, _| {
            AppError::validation(format!("Permintaan tidak valid: {}", err)).into()
        });

    cfg.app_data(json_config)
        .app_data(Data::new(config.clone()))
        .app_data(Data::new(state));
    routes::configure(cfg, config);
}
