//! Asset store adapter: normalizes product images and stores them in an
//! external object store.
//!
//! Every upload is re-encoded to a single target format (quality-85 JPEG)
//! and given a collision-resistant object name before it leaves the process.
//! Deletion is best-effort at every call site: failures go to the non-fatal
//! channel (`warn!` + `catalog_assets_delete_failed`) so operators can
//! reconcile orphaned objects out-of-band, and never abort a mutation.

use crate::config::AssetStoreConfig;
use crate::errors::ServiceError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use image::codecs::jpeg::JpegEncoder;
use metrics::counter;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// JPEG quality for normalized product images.
const JPEG_QUALITY: u8 = 85;

/// One binary image supplied by the caller.
#[derive(Clone, Debug)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub original_name: String,
}

impl ImageUpload {
    pub fn new(bytes: impl Into<Bytes>, original_name: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            original_name: original_name.into(),
        }
    }
}

/// Result of a successful upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredAsset {
    /// Publicly resolvable URL
    pub url: String,
    /// Stable path token used for later deletion
    pub path: String,
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Normalizes and uploads one image into the named folder. A single
    /// atomic call against the store; never partially uploads.
    async fn upload(&self, image: ImageUpload, folder: &str) -> Result<StoredAsset, ServiceError>;

    /// Uploads a batch, preserving input order in the output list.
    async fn upload_many(
        &self,
        images: Vec<ImageUpload>,
        folder: &str,
    ) -> Result<Vec<StoredAsset>, ServiceError> {
        let mut stored = Vec::with_capacity(images.len());
        for image in images {
            stored.push(self.upload(image, folder).await?);
        }
        Ok(stored)
    }

    /// Removes one object. Callers treat failures as non-fatal; use
    /// [`delete_best_effort`] unless the error itself is needed.
    async fn delete(&self, path: &str) -> Result<(), ServiceError>;
}

/// Best-effort delete: logs and counts failures instead of propagating them.
pub async fn delete_best_effort(store: &dyn AssetStore, path: &str) {
    if let Err(err) = store.delete(path).await {
        counter!("catalog_assets_delete_failed", 1);
        warn!(path = %path, error = %err, "asset delete failed; object left for reconciliation");
    }
}

/// Re-encodes the input to quality-85 JPEG and generates the object name
/// (`timestamp_random_random.jpg`). Fails with `ValidationError` when the
/// bytes are not a decodable image.
pub fn normalize_image(image: &ImageUpload) -> Result<(Vec<u8>, String), ServiceError> {
    let decoded = image::load_from_memory(&image.bytes).map_err(|e| {
        ServiceError::ValidationError(format!(
            "'{}' is not a valid image: {}",
            image.original_name, e
        ))
    })?;

    let mut buffer = Vec::new();
    {
        let mut cursor = Cursor::new(&mut buffer);
        let encoder = JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
        decoded.to_rgb8().write_with_encoder(encoder).map_err(|e| {
            ServiceError::InternalError(format!("failed to re-encode image: {}", e))
        })?;
    }

    Ok((buffer, generate_object_name()))
}

fn generate_object_name() -> String {
    let timestamp = Utc::now().timestamp_millis();
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(13)
        .map(char::from)
        .collect();
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();

    format!(
        "{}_{}_{}.jpg",
        timestamp,
        token.to_lowercase(),
        suffix.to_lowercase()
    )
}

/// Supabase storage backend, speaking the storage REST API over HTTP.
pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    access_key: String,
}

impl SupabaseStorage {
    pub fn from_config(cfg: &AssetStoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            bucket: cfg.bucket.clone(),
            access_key: cfg.access_key.clone(),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.bucket, path
        )
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }
}

#[async_trait]
impl AssetStore for SupabaseStorage {
    async fn upload(&self, image: ImageUpload, folder: &str) -> Result<StoredAsset, ServiceError> {
        let (bytes, filename) = normalize_image(&image)?;
        let path = format!("{}/{}", folder, filename);

        let response = self
            .client
            .post(self.object_url(&path))
            .bearer_auth(&self.access_key)
            .header(http::header::CONTENT_TYPE, "image/jpeg")
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(|e| ServiceError::AssetUploadFailed(format!("store unreachable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::AssetUploadFailed(format!(
                "store returned {} for '{}': {}",
                status, path, body
            )));
        }

        debug!(path = %path, "asset uploaded");

        Ok(StoredAsset {
            url: self.public_url(&path),
            path,
        })
    }

    async fn delete(&self, path: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .delete(self.object_url(path))
            .bearer_auth(&self.access_key)
            .send()
            .await
            .map_err(|e| ServiceError::InternalError(format!("store unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::InternalError(format!(
                "store returned {} deleting '{}'",
                response.status(),
                path
            )));
        }

        Ok(())
    }
}

/// Process-local store used by tests and local development. Uploads can be
/// forced to fail to exercise the abort-before-transaction path.
#[derive(Default)]
pub struct InMemoryAssetStore {
    objects: DashMap<String, Bytes>,
    fail_uploads: AtomicBool,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent upload fail with `AssetUploadFailed`.
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.contains_key(path)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn upload(&self, image: ImageUpload, folder: &str) -> Result<StoredAsset, ServiceError> {
        let (bytes, filename) = normalize_image(&image)?;

        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(ServiceError::AssetUploadFailed(
                "in-memory store configured to fail".to_string(),
            ));
        }

        let path = format!("{}/{}", folder, filename);
        self.objects.insert(path.clone(), Bytes::from(bytes));

        Ok(StoredAsset {
            url: format!("memory://{}", path),
            path,
        })
    }

    async fn delete(&self, path: &str) -> Result<(), ServiceError> {
        self.objects.remove(path);
        Ok(())
    }
}
