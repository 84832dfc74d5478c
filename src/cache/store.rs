//! Disk-backed response store.
//!
//! Each entry is two files sharing a key: the body and a JSON metadata record.
//! Writes go to temp files in the target directory, get fsynced, and are
//! renamed into place body first, metadata last. Lookup requires the metadata
//! file, so a hit is never declared while the body is still being written.
//! Entries are never expired or evicted.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::error::CacheError;
use super::key::CacheKey;
use super::meta::CacheMeta;
use super::reader::CacheBody;
use crate::host_codec::UpstreamOrigin;

/// Proof that both artifacts existed at lookup time
#[derive(Debug, Clone)]
pub struct CacheHandle {
    key: CacheKey,
    content_path: PathBuf,
    meta_path: PathBuf,
}

impl CacheHandle {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn content_path(&self) -> &Path {
        &self.content_path
    }
}

/// An opened cache entry
#[derive(Debug)]
pub struct CachedResponse {
    pub meta: CacheMeta,
    pub body: CacheBody,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    chunk_size: usize,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            root: root.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Derive the key for `(hostname, path)`, rejecting unsafe paths
    pub fn key(&self, hostname: &str, path: &str) -> Result<CacheKey, CacheError> {
        CacheKey::new(hostname, path)
    }

    /// Like `key`, but scheme and port of `origin` are part of the key
    pub fn key_for_origin(
        &self,
        origin: &UpstreamOrigin,
        path: &str,
    ) -> Result<CacheKey, CacheError> {
        CacheKey::for_origin(origin, path)
    }

    /// Return a handle if both metadata and body exist for `key`
    pub async fn lookup(&self, key: &CacheKey) -> Option<CacheHandle> {
        let content_path = key.content_path(&self.root);
        let meta_path = key.meta_path(&self.root);

        if !is_file(&meta_path).await || !is_file(&content_path).await {
            return None;
        }
        Some(CacheHandle {
            key: key.clone(),
            content_path,
            meta_path,
        })
    }

    /// Read the metadata and open the body for chunked reading
    pub async fn open(&self, handle: &CacheHandle) -> Result<CachedResponse, CacheError> {
        let raw = fs::read(&handle.meta_path).await?;
        let meta = CacheMeta::from_json(&raw)?;
        let file = File::open(&handle.content_path).await?;
        Ok(CachedResponse {
            meta,
            body: CacheBody::new(file, self.chunk_size),
        })
    }

    /// Persist an entry from a body stream, creating parent directories.
    ///
    /// Returns the number of body bytes written. `meta.content_length` is
    /// set from the bytes actually written. On failure no temp file is left
    /// behind and no new metadata is visible.
    pub async fn write<S, E>(
        &self,
        key: &CacheKey,
        mut meta: CacheMeta,
        body: S,
    ) -> Result<u64, CacheError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        let dir = key.dir_path(&self.root);
        fs::create_dir_all(&dir).await?;

        let stamp = Uuid::new_v4().simple().to_string();
        let content_tmp = dir.join(format!(".{}.{}.body.tmp", key.leaf(), stamp));
        let meta_tmp = dir.join(format!(".{}.{}.meta.tmp", key.leaf(), stamp));

        let result = self
            .write_staged(key, &mut meta, body, &content_tmp, &meta_tmp)
            .await;
        if result.is_err() {
            let _ = fs::remove_file(&content_tmp).await;
            let _ = fs::remove_file(&meta_tmp).await;
        }
        result
    }

    async fn write_staged<S, E>(
        &self,
        key: &CacheKey,
        meta: &mut CacheMeta,
        body: S,
        content_tmp: &Path,
        meta_tmp: &Path,
    ) -> Result<u64, CacheError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        let mut body = std::pin::pin!(body);
        let mut file = File::create(content_tmp).await?;
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| CacheError::Body(e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        meta.content_length = written;
        let mut meta_file = File::create(meta_tmp).await?;
        meta_file.write_all(&meta.to_json()?).await?;
        meta_file.flush().await?;
        meta_file.sync_all().await?;
        drop(meta_file);

        fs::rename(content_tmp, key.content_path(&self.root)).await?;
        fs::rename(meta_tmp, key.meta_path(&self.root)).await?;

        tracing::debug!(
            key = %key,
            bytes = written,
            status_code = meta.status_code,
            "Cache entry written"
        );
        Ok(written)
    }
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
