//! Attachment storage gateways
//!
//! Uploads chat attachments into a public Supabase Storage bucket and returns
//! file parts that reference them by public URL.

use crate::chat::models::FilePart;
use crate::gateway::{check_upload_sizes, GatewayError, UploadFile, UploadGateway};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

const SERVICE: &str = "Supabase Storage";
const SAFE_FILENAME_MAX_CHARS: usize = 120;

/// Fallback media type when the client did not report one
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Uploads into a public bucket of a Supabase project
pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    bucket: String,
    max_bytes: usize,
    bucket_ready: OnceCell<()>,
}

#[derive(Deserialize)]
struct BucketInfo {
    name: String,
}

impl SupabaseStorage {
    /// Create a storage gateway for `bucket`; files above `max_bytes` are refused
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: &str,
        bucket: &str,
        max_bytes: usize,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            bucket: bucket.to_string(),
            max_bytes,
            bucket_ready: OnceCell::new(),
        }
    }

    /// Public URL of a stored object
    pub fn public_url(&self, object_path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, object_path
        )
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// Create the bucket unless it already exists
    async fn ensure_bucket(&self) -> Result<(), GatewayError> {
        self.bucket_ready
            .get_or_try_init(|| async {
                let response = self
                    .authed(self.client.get(format!("{}/storage/v1/bucket", self.base_url)))
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(GatewayError::from_response(SERVICE, response).await);
                }
                let buckets: Vec<BucketInfo> = response.json().await?;
                if buckets.iter().any(|b| b.name == self.bucket) {
                    return Ok(());
                }

                let response = self
                    .authed(self.client.post(format!("{}/storage/v1/bucket", self.base_url)))
                    .json(&json!({
                        "id": self.bucket,
                        "name": self.bucket,
                        "public": true,
                        "file_size_limit": self.max_bytes,
                    }))
                    .send()
                    .await?;
                if !response.status().is_success() {
                    let err = GatewayError::from_response(SERVICE, response).await;
                    if !err.to_string().to_lowercase().contains("already exists") {
                        return Err(err);
                    }
                }
                info!(bucket = %self.bucket, "Created attachments bucket");
                Ok(())
            })
            .await
            .map(|_| ())
    }

    async fn upload_one(&self, session_id: &str, file: UploadFile) -> Result<FilePart, GatewayError> {
        let media_type = if file.media_type.is_empty() {
            DEFAULT_MEDIA_TYPE.to_string()
        } else {
            file.media_type
        };
        let object_path = object_path(session_id, &file.filename);

        let response = self
            .authed(self.client.post(format!(
                "{}/storage/v1/object/{}/{}",
                self.base_url, self.bucket, object_path
            )))
            .header(reqwest::header::CONTENT_TYPE, &media_type)
            .header("x-upsert", "false")
            .body(file.data)
            .send()
            .await?;
        if !response.status().is_success() {
            let err = GatewayError::from_response(SERVICE, response).await;
            error!(filename = %file.filename, error = %err, "Failed to upload attachment");
            return Err(err);
        }

        debug!(path = %object_path, "Uploaded attachment");
        Ok(FilePart {
            media_type,
            filename: Some(file.filename),
            url: self.public_url(&object_path),
        })
    }
}

#[async_trait]
impl UploadGateway for SupabaseStorage {
    async fn upload(
        &self,
        session_id: &str,
        files: Vec<UploadFile>,
    ) -> Result<Vec<FilePart>, GatewayError> {
        check_upload_sizes(&files, self.max_bytes)?;
        self.ensure_bucket().await?;
        try_join_all(files.into_iter().map(|file| self.upload_one(session_id, file))).await
    }
}

/// Upload gateway used when no storage backend is configured
pub struct UnconfiguredUploads;

#[async_trait]
impl UploadGateway for UnconfiguredUploads {
    async fn upload(
        &self,
        _session_id: &str,
        _files: Vec<UploadFile>,
    ) -> Result<Vec<FilePart>, GatewayError> {
        Err(GatewayError::Unavailable(
            "Attachment storage is not configured (set SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY)"
                .to_string(),
        ))
    }
}

/// Make a filename safe for an object key
///
/// Runs of characters outside `[A-Za-z0-9_.-]` collapse to `_`; only the last
/// 120 characters are kept; an empty result becomes `file`.
pub fn safe_filename(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
            cleaned.push(c);
            in_run = false;
        } else if !in_run {
            cleaned.push('_');
            in_run = true;
        }
    }

    let count = cleaned.chars().count();
    if count > SAFE_FILENAME_MAX_CHARS {
        cleaned.chars().skip(count - SAFE_FILENAME_MAX_CHARS).collect()
    } else if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// `sessions/<session>/<millis>-<uuid>-<safe name>`
pub fn object_path(session_id: &str, filename: &str) -> String {
    format!(
        "sessions/{}/{}-{}-{}",
        session_id,
        chrono::Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4(),
        safe_filename(filename)
    )
}
