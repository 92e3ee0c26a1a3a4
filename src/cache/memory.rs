//! In-process bucket storage

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{validate_bucket_name, CacheStorage, CachedResponse, StorageError};
use crate::http::Response;

/// Buckets held in memory for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buckets: RwLock<HashMap<String, BTreeMap<String, CachedResponse>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, bucket: &str) -> Result<(), StorageError> {
        validate_bucket_name(bucket)?;
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }

    async fn has(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self.buckets.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(self.buckets.write().await.remove(bucket).is_some())
    }

    async fn put(
        &self,
        bucket: &str,
        url: &str,
        response: &Response,
    ) -> Result<(), StorageError> {
        validate_bucket_name(bucket)?;
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(url.to_string(), CachedResponse::new(url, response));
        Ok(())
    }

    async fn put_existing(
        &self,
        bucket: &str,
        url: &str,
        response: &Response,
    ) -> Result<bool, StorageError> {
        match self.buckets.write().await.get_mut(bucket) {
            Some(entries) => {
                entries.insert(url.to_string(), CachedResponse::new(url, response));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn lookup(
        &self,
        bucket: &str,
        url: &str,
    ) -> Result<Option<CachedResponse>, StorageError> {
        Ok(self
            .buckets
            .read()
            .await
            .get(bucket)
            .and_then(|entries| entries.get(url))
            .cloned())
    }

    async fn entries(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .buckets
            .read()
            .await
            .get(bucket)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }
}
