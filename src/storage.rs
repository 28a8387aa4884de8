use async_trait::async_trait;
use aws_sdk_s3 as s3;
use axum::body::Bytes;
use s3::primitives::ByteStream;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

/// Failures reported by the object-storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload of {file_name} failed: {reason}")]
    Upload { file_name: String, reason: String },

    #[error("delete of {keys:?} failed: {reason}")]
    Delete { keys: Vec<String>, reason: String },
}

/// A file received from a multipart request, not yet stored.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// What the backend hands back after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub url: String,
    pub key: String,
    pub file_name: String,
    pub size: i64,
    pub mimetype: String,
}

// 1. StorageService Contract
/// StorageService
///
/// Abstract contract for the object storage collaborator. Content images go
/// through `upload`; lifecycle deletion goes through `delete`/`delete_many`.
/// The real S3 client and the in-memory mock are interchangeable behind it.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Used in `Env::Local` to provision MinIO.
    async fn ensure_bucket_exists(&self);

    /// Stores `file` under `{category}/{owner_id}/...` and returns its public URL and key.
    async fn upload(
        &self,
        file: UploadedFile,
        category: &str,
        owner_id: Uuid,
    ) -> Result<StoredObject, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Deletes every key, attempting all of them even after a failure. The
    /// error lists the keys that could not be removed.
    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError> {
        let mut failed = Vec::new();
        let mut last_reason = String::new();
        for key in keys {
            if let Err(e) = self.delete(key).await {
                failed.push(key.clone());
                last_reason = e.to_string();
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(StorageError::Delete {
                keys: failed,
                reason: last_reason,
            })
        }
    }
}

// 2. The Real Implementation (S3/MinIO)
/// S3StorageClient
///
/// Concrete implementation on the AWS SDK. `force_path_style(true)` keeps it
/// compatible with MinIO and other S3 gateways.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    public_url: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_url: &str,
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
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    /// CreateBucket is idempotent, so this is safe to call at every startup.
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(error = %e, bucket = %self.bucket_name, "create_bucket skipped");
        }
    }

    async fn upload(
        &self,
        file: UploadedFile,
        category: &str,
        owner_id: Uuid,
    ) -> Result<StoredObject, StorageError> {
        let key = object_key(category, owner_id, &file.file_name);
        let size = file.bytes.len() as i64;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(&file.content_type)
            .body(ByteStream::from(file.bytes.to_vec()))
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                file_name: file.file_name.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!(key = %key, size, "object uploaded");

        Ok(StoredObject {
            url: format!("{}/{}", self.public_url, key),
            key,
            file_name: file.file_name,
            size,
            mimetype: file.content_type,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Delete {
                keys: vec![key.to_string()],
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

/// object_key
///
/// Builds `{category}/{owner_id}/{uuid}.{ext}`. Only the extension of the
/// client-supplied name survives, and only if it is short and alphanumeric.
pub fn object_key(category: &str, owner_id: Uuid, file_name: &str) -> String {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .filter(|ext| ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string());

    format!(
        "{}/{}/{}.{}",
        sanitize_key(category),
        owner_id,
        Uuid::new_v4(),
        extension
    )
}

/// sanitize_key
///
/// Removes directory navigation components (`..`, `.`) and empty segments from a key.
fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// 3. The Mock Implementation (For Tests)
/// MockStorageService
///
/// In-memory `StorageService` for tests and storage-less local runs. Records
/// every upload and every delete attempt so tests can assert on them.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
    uploads: Arc<Mutex<Vec<String>>>,
    delete_calls: Arc<Mutex<Vec<String>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Keys stored so far, in upload order.
    pub fn uploaded_keys(&self) -> Vec<String> {
        self.uploads.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Every key a delete was attempted for, including failed attempts.
    pub fn delete_calls(&self) -> Vec<String> {
        self.delete_calls.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn upload(
        &self,
        file: UploadedFile,
        category: &str,
        owner_id: Uuid,
    ) -> Result<StoredObject, StorageError> {
        if self.should_fail {
            return Err(StorageError::Upload {
                file_name: file.file_name,
                reason: "Mock Storage Error: Simulation requested".to_string(),
            });
        }

        let key = object_key(category, owner_id, &file.file_name);
        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.push(key.clone());
        }

        Ok(StoredObject {
            url: format!("http://localhost:9000/mock-bucket/{}", key),
            size: file.bytes.len() as i64,
            key,
            file_name: file.file_name,
            mimetype: file.content_type,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if let Ok(mut calls) = self.delete_calls.lock() {
            calls.push(key.to_string());
        }
        if self.should_fail {
            return Err(StorageError::Delete {
                keys: vec![key.to_string()],
                reason: "Mock Storage Error: Simulation requested".to_string(),
            });
        }
        Ok(())
    }
}

/// StorageState
///
/// The shared handle to the storage backend held in the application state.
pub type StorageState = Arc<dyn StorageService>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_keys_keep_only_a_safe_extension() {
        let owner = Uuid::new_v4();
        let key = object_key("guides", owner, "../../etc/passwd.JPG");
        assert!(key.starts_with(&format!("guides/{}/", owner)));
        assert!(key.ends_with(".jpg"));
        assert!(!key.contains(".."));

        let fallback = object_key("guides", owner, "photo.ph p");
        assert!(fallback.ends_with(".bin"));
    }

    #[test]
    fn sanitize_key_strips_navigation_segments() {
        assert_eq!(sanitize_key("../a/./b//c"), "a/b/c");
    }

    #[tokio::test]
    async fn delete_many_attempts_every_key_before_failing() {
        let mock = MockStorageService::new_failing();
        let keys = vec!["a".to_string(), "b".to_string()];

        let err = mock.delete_many(&keys).await.unwrap_err();

        assert_eq!(mock.delete_calls(), keys);
        match err {
            StorageError::Delete { keys: failed, .. } => assert_eq!(failed.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
