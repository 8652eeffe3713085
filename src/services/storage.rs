use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

/// Raw bytes for one imported file.
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub job_id: Uuid,
    pub file_name: &'a str,
    pub bytes: &'a [u8],
    pub content_type: &'a str,
}

/// Where an uploaded file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub storage_key: String,
    pub url: String,
    pub byte_size: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    Deleted,
    AlreadyAbsent,
}

/// Object storage that imported images are re-uploaded to.
#[async_trait]
pub trait AssetStorage: Send + Sync {
    async fn upload(&self, request: UploadRequest<'_>) -> Result<StoredObject, StorageError>;

    /// Remove a stored object. Removing an absent object is not an error.
    async fn destroy(&self, storage_key: &str) -> Result<DestroyOutcome, StorageError>;
}

/// Connection settings for [`S3Storage`].
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
    pub key_prefix: String,
    pub public_base_url: String,
    pub timeout: Duration,
}

/// Client for S3-compatible object storage (R2, MinIO, S3) fronted by a CDN.
pub struct S3Storage {
    bucket: Box<Bucket>,
    key_prefix: String,
    public_base_url: String,
    timeout: Duration,
}

impl S3Storage {
    pub fn new(settings: &S3Settings) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: settings.region.clone(),
            endpoint: settings.endpoint.clone(),
        };

        let credentials = Credentials::new(
            Some(settings.access_key.as_str()),
            Some(settings.secret_key.as_str()),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Config(e.to_string()))?;

        let mut bucket = Bucket::new(&settings.bucket, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;
        if settings.path_style {
            bucket = bucket.with_path_style();
        }

        Ok(Self {
            bucket,
            key_prefix: settings.key_prefix.trim_matches('/').to_string(),
            public_base_url: settings.public_base_url.trim_end_matches('/').to_string(),
            timeout: settings.timeout,
        })
    }

    async fn timed<T>(
        &self,
        operation: impl Future<Output = Result<T, s3::error::S3Error>>,
    ) -> Result<T, StorageError> {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_| StorageError::Timeout(self.timeout))?
            .map_err(StorageError::S3)
    }
}

#[async_trait]
impl AssetStorage for S3Storage {
    async fn upload(&self, request: UploadRequest<'_>) -> Result<StoredObject, StorageError> {
        let storage_key = object_key(&self.key_prefix, request.job_id, request.file_name);

        let response = self
            .timed(self.bucket.put_object_with_content_type(
                &storage_key,
                request.bytes,
                request.content_type,
            ))
            .await?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::Status(status));
        }

        Ok(StoredObject {
            url: public_url(&self.public_base_url, &storage_key),
            storage_key,
            byte_size: request.bytes.len() as i64,
        })
    }

    async fn destroy(&self, storage_key: &str) -> Result<DestroyOutcome, StorageError> {
        let response = self.timed(self.bucket.delete_object(storage_key)).await?;

        match response.status_code() {
            200..=299 => Ok(DestroyOutcome::Deleted),
            404 => Ok(DestroyOutcome::AlreadyAbsent),
            status => Err(StorageError::Status(status)),
        }
    }
}

/// `{prefix}/{job_id}/{random}-{sanitized file name}`; the random segment keeps
/// same-named files in one folder from overwriting each other.
pub fn object_key(prefix: &str, job_id: Uuid, file_name: &str) -> String {
    let sanitized: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let unique = Uuid::new_v4().simple();

    if prefix.is_empty() {
        format!("{job_id}/{unique}-{sanitized}")
    } else {
        format!("{prefix}/{job_id}/{unique}-{sanitized}")
    }
}

pub fn public_url(base_url: &str, storage_key: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), storage_key)
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("S3 returned HTTP {0}")]
    Status(u16),

    #[error("S3 operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Storage configuration error: {0}")]
    Config(String),
}
