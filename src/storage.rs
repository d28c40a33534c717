use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::primitives::ByteStream;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("upload of '{key}' failed: {reason}")]
    Upload { key: String, reason: String },
    #[error("delete of '{key}' failed: {reason}")]
    Delete { key: String, reason: String },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

// 1. StorageService Contract
/// StorageService
///
/// The abstract contract for the image store. Handlers only hold
/// `Arc<dyn StorageService>`, so the S3 client and the in-memory mock are interchangeable.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Used by the `Env::Local` setup to
    /// provision the bucket in MinIO.
    async fn ensure_bucket_exists(&self);

    /// Stores `bytes` under `key` and returns the public reference (URL) the
    /// listing keeps in its `images` array.
    async fn upload_image(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError>;

    /// Removes the object behind a reference previously returned by `upload_image`.
    async fn delete_image(&self, reference: &str) -> Result<(), StorageError>;
}

// 2. The Real Implementation (S3/MinIO)
/// S3StorageClient
///
/// Uses the AWS SDK for S3 against any S3-compatible endpoint. `force_path_style(true)`
/// is required for MinIO.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    public_base_url: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_base_url: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// The public URL an object key is served under.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    /// Maps a stored reference back to its object key. References that are not
    /// under the public base URL are treated as raw keys.
    pub fn object_key(&self, reference: &str) -> String {
        let raw = reference
            .strip_prefix(&self.public_base_url)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(reference);
        sanitize_key(raw)
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    /// CreateBucket is idempotent for the owner, so this is safe at every startup.
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(bucket = %self.bucket_name, error = %e, "create_bucket returned an error");
        }
    }

    async fn upload_image(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError> {
        let key = sanitize_key(key);

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                key: key.clone(),
                reason: e.to_string(),
            })?;

        Ok(self.public_url(&key))
    }

    async fn delete_image(&self, reference: &str) -> Result<(), StorageError> {
        let key = self.object_key(reference);

        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .send()
            .await
            .map_err(|e| StorageError::Delete {
                key: key.clone(),
                reason: e.to_string(),
            })?;

        Ok(())
    }
}

/// sanitize_key
///
/// Removes directory navigation components (`..`, `.`) and empty segments from
/// an object key to prevent path traversal.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// 3. The Mock Implementation (For Tests)
/// MockStorageService
///
/// Keeps uploaded keys in memory and records deletions so tests can assert on
/// the image pipeline without a network connection.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, every upload fails.
    pub fail_uploads: bool,
    /// When true, every delete fails.
    pub fail_deletes: bool,
    uploaded: Arc<Mutex<Vec<String>>>,
    deleted: Arc<Mutex<Vec<String>>>,
}

pub const MOCK_BASE_URL: &str = "http://localhost:9000/mock-bucket";

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            fail_uploads: true,
            fail_deletes: true,
            ..Self::default()
        }
    }

    pub fn new_failing_deletes() -> Self {
        Self {
            fail_deletes: true,
            ..Self::default()
        }
    }

    /// References of every object currently stored.
    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    /// References passed to `delete_image`, including failed attempts.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn upload_image(
        &self,
        key: &str,
        _content_type: &str,
        _bytes: Vec<u8>,
    ) -> Result<String, StorageError> {
        if self.fail_uploads {
            return Err(StorageError::Unavailable(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }

        let reference = format!("{}/{}", MOCK_BASE_URL, sanitize_key(key));
        if let Ok(mut list) = self.uploaded.lock() {
            list.push(reference.clone());
        }
        Ok(reference)
    }

    async fn delete_image(&self, reference: &str) -> Result<(), StorageError> {
        if let Ok(mut list) = self.deleted.lock() {
            list.push(reference.to_string());
        }
        if self.fail_deletes {
            return Err(StorageError::Delete {
                key: reference.to_string(),
                reason: "Mock Storage Error: Simulation requested".to_string(),
            });
        }
        if let Ok(mut list) = self.uploaded.lock() {
            list.retain(|stored| stored != reference);
        }
        Ok(())
    }
}

/// StorageState
///
/// The concrete type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;
