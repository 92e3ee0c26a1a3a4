//! Named cache buckets for intercepted responses
//!
//! A bucket maps absolute request URLs to stored responses. Buckets are
//! created on demand, never renamed, and deleted wholesale when a newer
//! worker version activates. Two backends are provided: [`MemoryStorage`]
//! for embedding and tests, and [`DiskStorage`], which persists one JSON
//! record per entry under an XDG cache directory.

mod disk;
mod memory;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::Response;

/// Errors raised by a cache storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing files failed
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored entry could not be encoded or decoded
    #[error("Corrupt cache entry: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Bucket names must be usable as a single path component
    #[error("Invalid bucket name: '{0}'")]
    InvalidBucketName(String),
}

/// A response as stored in a bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Request URL the entry is keyed by
    pub url: String,
    /// The stored response
    pub response: Response,
    /// When the entry was written
    pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(url: &str, response: &Response) -> Self {
        Self {
            url: url.to_string(),
            response: response.clone(),
            cached_at: Utc::now(),
        }
    }
}

/// Persistent storage of named buckets
///
/// Writes to a single entry replace it whole; a reader sees either the old or
/// the new response, never a mix of both.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Creates the bucket if it does not exist yet
    async fn open(&self, bucket: &str) -> Result<(), StorageError>;

    /// Whether a bucket with this name exists
    async fn has(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Names of all existing buckets, sorted
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Deletes a bucket and all of its entries, returning whether it existed
    async fn delete(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Stores `response` under `url`, creating the bucket if needed
    async fn put(&self, bucket: &str, url: &str, response: &Response)
        -> Result<(), StorageError>;

    /// Stores `response` under `url` only if the bucket still exists
    ///
    /// Returns whether the entry was written. A bucket deleted by a newer
    /// version is never brought back by this call.
    async fn put_existing(&self, bucket: &str, url: &str, response: &Response)
        -> Result<bool, StorageError>;

    /// Looks up `url` in a bucket; a missing bucket is a miss
    async fn lookup(&self, bucket: &str, url: &str)
        -> Result<Option<CachedResponse>, StorageError>;

    /// URLs stored in a bucket, sorted; a missing bucket has none
    async fn entries(&self, bucket: &str) -> Result<Vec<String>, StorageError>;
}

/// Rejects names that would escape or collide in a directory layout
pub(crate) fn validate_bucket_name(name: &str) -> Result<(), StorageError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StorageError::InvalidBucketName(name.to_string()));
    }
    Ok(())
}
