//! Bucket storage persisted to disk
//!
//! Each bucket is a directory under the cache root and each entry a JSON file
//! named by the SHA-256 of its URL, so arbitrary URLs map to safe file names.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use directories::ProjectDirs;
use sha2::{Digest, Sha256};
use tokio::fs;

use super::{validate_bucket_name, CacheStorage, CachedResponse, StorageError};
use crate::http::Response;

/// Extension of entry files; temporary files use a different one
const ENTRY_EXTENSION: &str = "json";

/// Makes temporary file names unique across concurrent writers in a process
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Stores buckets as directories of JSON entry files
///
/// The default location is XDG-compliant (`~/.cache/shellcache/` on Linux).
/// Entries are written to a temporary file and renamed into place, so a
/// concurrent reader never observes a partially written response.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    /// Directory holding one subdirectory per bucket
    root: PathBuf,
}

impl DiskStorage {
    /// Creates a DiskStorage rooted in the XDG cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "shellcache")?;
        Some(Self {
            root: project_dirs.cache_dir().to_path_buf(),
        })
    }

    /// Creates a DiskStorage rooted at a custom directory
    pub fn with_dir(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        validate_bucket_name(bucket)?;
        Ok(self.root.join(bucket))
    }

    fn entry_file_name(url: &str) -> String {
        let digest = Sha256::digest(url.as_bytes());
        format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION)
    }

    /// Writes an entry into an existing bucket directory
    ///
    /// Each write goes to its own temporary file, which is then renamed over
    /// the entry, so concurrent writers of one URL never share a file.
    async fn write_entry(dir: &Path, url: &str, response: &Response) -> Result<(), StorageError> {
        let json = serde_json::to_vec(&CachedResponse::new(url, response))?;
        let file_name = Self::entry_file_name(url);
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = dir.join(format!("{}.{}-{}.tmp", file_name, std::process::id(), seq));

        fs::write(&tmp, json).await?;
        if let Err(e) = fs::rename(&tmp, dir.join(file_name)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn read_entry(path: PathBuf) -> Result<Option<CachedResponse>, StorageError> {
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, bucket: &str) -> Result<(), StorageError> {
        fs::create_dir_all(self.bucket_path(bucket)?).await?;
        Ok(())
    }

    async fn has(&self, bucket: &str) -> Result<bool, StorageError> {
        let path = self.bucket_path(bucket)?;
        match fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, bucket: &str) -> Result<bool, StorageError> {
        match fs::remove_dir_all(self.bucket_path(bucket)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(
        &self,
        bucket: &str,
        url: &str,
        response: &Response,
    ) -> Result<(), StorageError> {
        let dir = self.bucket_path(bucket)?;
        fs::create_dir_all(&dir).await?;
        Self::write_entry(&dir, url, response).await
    }

    async fn put_existing(
        &self,
        bucket: &str,
        url: &str,
        response: &Response,
    ) -> Result<bool, StorageError> {
        let dir = self.bucket_path(bucket)?;
        // The bucket directory is never created here; a missing one means a
        // newer version deleted it
        match Self::write_entry(&dir, url, response).await {
            Ok(()) => Ok(true),
            Err(StorageError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn lookup(
        &self,
        bucket: &str,
        url: &str,
    ) -> Result<Option<CachedResponse>, StorageError> {
        let path = self.bucket_path(bucket)?.join(Self::entry_file_name(url));
        Self::read_entry(path).await
    }

    async fn entries(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        let mut dir = match fs::read_dir(self.bucket_path(bucket)?).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut urls = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            if let Some(cached) = Self::read_entry(path).await? {
                urls.push(cached.url);
            }
        }
        urls.sort();
        Ok(urls)
    }
}
