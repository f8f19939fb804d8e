use std::io::Cursor;

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use serde::Deserialize;

use super::error::StorageError;
use super::hash::ContentHash;
use super::key::ObjectKey;
use super::traits::{BoxReader, ObjectStore, StoredObject};

/// Connection settings for an S3-compatible bucket (AWS, R2, MinIO).
#[derive(Debug, Clone, Deserialize)]
pub struct S3Options {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    /// Public origin objects are served from; URLs are `{public_url}/{bucket}/{key}`.
    pub public_url: String,
    #[serde(default = "default_path_style")]
    pub path_style: bool,
}

fn default_region() -> String {
    "auto".into()
}
fn default_path_style() -> bool {
    true
}

pub struct S3ObjectStore {
    bucket: Box<Bucket>,
    bucket_name: String,
    public_url: String,
    max_size: u64,
}

impl S3ObjectStore {
    pub fn new(options: &S3Options, max_size: u64) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: options.region.clone(),
            endpoint: options.endpoint.clone(),
        };
        let credentials = Credentials::new(
            Some(&options.access_key),
            Some(&options.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Backend(format!("invalid S3 credentials: {e}")))?;

        let mut bucket =
            Bucket::new(&options.bucket, region, credentials).map_err(backend_error)?;
        if options.path_style {
            bucket = bucket.with_path_style();
        }

        Ok(Self {
            bucket,
            bucket_name: options.bucket.clone(),
            public_url: options.public_url.trim_end_matches('/').to_string(),
            max_size,
        })
    }
}

fn backend_error(err: S3Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        key: &ObjectKey,
        data: &[u8],
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let size = data.len() as u64;
        if size > self.max_size {
            return Err(StorageError::SizeLimitExceeded {
                actual: size,
                limit: self.max_size,
            });
        }

        let response = self
            .bucket
            .put_object_with_content_type(key.as_str(), data, content_type)
            .await
            .map_err(backend_error)?;
        if !is_success(response.status_code()) {
            return Err(StorageError::Backend(format!(
                "put {key} returned status {}",
                response.status_code()
            )));
        }

        tracing::debug!(%key, size, "Stored object in bucket {}", self.bucket_name);
        Ok(StoredObject {
            key: key.to_string(),
            url: self.public_url(key),
            size,
            content_hash: ContentHash::compute(data),
        })
    }

    async fn get_stream(&self, key: &ObjectKey) -> Result<BoxReader, StorageError> {
        match self.bucket.get_object(key.as_str()).await {
            Ok(response) if response.status_code() == 404 => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Ok(response) if !is_success(response.status_code()) => Err(StorageError::Backend(
                format!("get {key} returned status {}", response.status_code()),
            )),
            Ok(response) => Ok(Box::new(Cursor::new(response.bytes().to_vec()))),
            Err(S3Error::HttpFailWithBody(404, _)) => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(backend_error(e)),
        }
    }

    async fn exists(&self, key: &ObjectKey) -> Result<bool, StorageError> {
        match self.bucket.head_object(key.as_str()).await {
            Ok((_, status)) if status == 404 => Ok(false),
            Ok((_, status)) => Ok(is_success(status)),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(false),
            Err(e) => Err(backend_error(e)),
        }
    }

    async fn delete(&self, key: &ObjectKey) -> Result<bool, StorageError> {
        let response = self
            .bucket
            .delete_object(key.as_str())
            .await
            .map_err(backend_error)?;
        match response.status_code() {
            404 => Ok(false),
            status if is_success(status) => Ok(true),
            status => Err(StorageError::Backend(format!(
                "delete {key} returned status {status}"
            ))),
        }
    }

    fn public_url(&self, key: &ObjectKey) -> String {
        format!("{}/{}/{}", self.public_url, self.bucket_name, key)
    }

    fn backend(&self) -> &'static str {
        "s3"
    }
}
