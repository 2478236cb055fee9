//! Fingerprint-indexed cache of transcoded point-cloud artifacts.
//!
//! ASCII-encoded sources are expensive to parse on every open, so the
//! first open transcodes them to binary and later opens reuse the cached
//! artifact for as long as the source's fingerprint (path, size,
//! modification time) is unchanged. Binary sources pass through untouched.
//! The index survives sessions as `index.json` in the cache directory;
//! index I/O failures degrade to cache misses, never to a failed open.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use splatpipe_ply::{PlyEncoding, PlyError};

const INDEX_FILE: &str = "index.json";

/// Errors that abort an `ensure` call.
///
/// Index read/write problems are deliberately absent: they are logged and
/// treated as misses.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Ply(#[from] PlyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One persisted cache record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub fingerprint: String,
    pub artifact_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// The artifact cache. Share it as `Arc<PlyCache>`.
pub struct PlyCache {
    cache_dir: PathBuf,
    index: Mutex<HashMap<String, CacheEntry>>,
    /// Per-source locks so concurrent `ensure` calls on one path
    /// transcode at most once; the second caller waits and reuses.
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PlyCache {
    /// Opens (creating if needed) the cache rooted at `cache_dir` and
    /// loads the persisted index.
    pub async fn open(cache_dir: &Path) -> Result<Self, CacheError> {
        tokio::fs::create_dir_all(cache_dir).await?;
        let index = load_index(&cache_dir.join(INDEX_FILE)).await;
        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
            index: Mutex::new(index),
            inflight: Mutex::new(HashMap::new()),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns a binary artifact for `source`, transcoding at most once.
    ///
    /// - Fingerprint match with a live artifact: cache hit, a stat is the
    ///   only I/O on the source.
    /// - Source already binary: the source path itself, no cache entry.
    /// - ASCII source: transcode into the cache directory, record and
    ///   persist an entry, return the artifact.
    pub async fn ensure(&self, source: &Path) -> Result<PathBuf, CacheError> {
        let key = source.to_string_lossy().into_owned();
        let fingerprint = fingerprint_of(source).await?;

        if let Some(artifact) = self.lookup(&key, &fingerprint).await {
            tracing::debug!(source = %source.display(), "cache hit");
            return Ok(artifact);
        }

        // Serialize transcoding per source path.
        let gate = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(inflight.entry(key.clone()).or_default())
        };
        let _guard = gate.lock().await;

        // The first holder may have finished the work while we waited.
        if let Some(artifact) = self.lookup(&key, &fingerprint).await {
            return Ok(artifact);
        }

        let header = {
            let source = source.to_path_buf();
            tokio::task::spawn_blocking(move || splatpipe_ply::inspect_file(&source))
                .await
                .map_err(|e| CacheError::Io(std::io::Error::other(e)))??
        };

        if header.encoding != PlyEncoding::Ascii {
            tracing::debug!(source = %source.display(), "already binary; no transcoding");
            return Ok(source.to_path_buf());
        }

        let artifact = self.artifact_path(source, &fingerprint);
        tracing::info!(
            source = %source.display(),
            artifact = %artifact.display(),
            records = header.vertex_count,
            "transcoding ASCII source"
        );
        {
            let source = source.to_path_buf();
            let dest = artifact.clone();
            tokio::task::spawn_blocking(move || {
                splatpipe_ply::transcode_file(&source, &header, &dest)
            })
            .await
            .map_err(|e| CacheError::Io(std::io::Error::other(e)))??;
        }

        let entry = CacheEntry {
            fingerprint,
            artifact_path: artifact.clone(),
            created_at: Utc::now(),
        };
        let snapshot = {
            let mut index = self.index.lock().await;
            index.insert(key, entry);
            index.clone()
        };
        persist_index(&self.cache_dir.join(INDEX_FILE), &snapshot).await;

        Ok(artifact)
    }

    /// Removes the cache directory and the in-memory index.
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.index.lock().await.clear();
        tokio::fs::remove_dir_all(&self.cache_dir).await?;
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        tracing::info!(dir = %self.cache_dir.display(), "cache cleared");
        Ok(())
    }

    async fn lookup(&self, key: &str, fingerprint: &str) -> Option<PathBuf> {
        let index = self.index.lock().await;
        let entry = index.get(key)?;
        if entry.fingerprint != fingerprint {
            return None;
        }
        let artifact = entry.artifact_path.clone();
        drop(index);
        // An entry is only valid while its artifact still exists.
        if tokio::fs::try_exists(&artifact).await.unwrap_or(false) {
            Some(artifact)
        } else {
            None
        }
    }

    fn artifact_path(&self, source: &Path, fingerprint: &str) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".into());
        self.cache_dir
            .join(format!("{stem}_{}.ply", &fingerprint[..12]))
    }
}

/// Derived identity of a source file, used to detect staleness.
async fn fingerprint_of(source: &Path) -> Result<String, CacheError> {
    let meta = tokio::fs::metadata(source).await?;
    let mtime_millis = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(source.to_string_lossy().as_bytes());
    hasher.update(meta.len().to_le_bytes());
    hasher.update(mtime_millis.to_le_bytes());
    Ok(hex::encode(hasher.finalize()))
}

async fn load_index(path: &Path) -> HashMap<String, CacheEntry> {
    match tokio::fs::read(path).await {
        Ok(data) => match serde_json::from_slice(&data) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!("failed to parse cache index, starting empty: {e}");
                HashMap::new()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
        Err(e) => {
            tracing::warn!("failed to read cache index, starting empty: {e}");
            HashMap::new()
        }
    }
}

async fn persist_index(path: &Path, index: &HashMap<String, CacheEntry>) {
    let json = match serde_json::to_vec_pretty(index) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!("failed to encode cache index: {e}");
            return;
        }
    };
    if let Err(e) = tokio::fs::write(path, json).await {
        tracing::warn!("failed to persist cache index: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASCII_SAMPLE: &str = "ply\nformat ascii 1.0\nelement vertex 2\n\
        property float x\nproperty float y\nproperty float z\n\
        end_header\n1 2 3\n4 5 6\n";

    const BINARY_SAMPLE: &[u8] =
        b"ply\nformat binary_little_endian 1.0\nelement vertex 0\nend_header\n";

    fn write_source(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn artifacts_in(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.file_name().is_some_and(|n| n != INDEX_FILE))
            .collect()
    }

    #[tokio::test]
    async fn ascii_source_is_transcoded_into_cache_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = write_source(dir.path(), "scan.ply", ASCII_SAMPLE.as_bytes());
        let cache = PlyCache::open(&dir.path().join("cache")).await.unwrap();

        let artifact = cache.ensure(&src).await.unwrap();
        assert_ne!(artifact, src);
        assert!(artifact.starts_with(cache.cache_dir()));

        let header = splatpipe_ply::inspect_file(&artifact).unwrap();
        assert_eq!(header.encoding, PlyEncoding::BinaryLittleEndian);
        assert_eq!(header.vertex_count, 2);
    }

    #[tokio::test]
    async fn second_ensure_is_a_hit() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = write_source(dir.path(), "scan.ply", ASCII_SAMPLE.as_bytes());
        let cache = PlyCache::open(&dir.path().join("cache")).await.unwrap();

        let first = cache.ensure(&src).await.unwrap();
        // Overwrite the artifact with a sentinel: a hit must return it
        // untouched, proving no re-transcoding happened.
        std::fs::write(&first, b"sentinel").unwrap();
        let second = cache.ensure(&src).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), b"sentinel");
    }

    #[tokio::test]
    async fn touching_mtime_forces_one_retranscode() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = write_source(dir.path(), "scan.ply", ASCII_SAMPLE.as_bytes());
        let cache = PlyCache::open(&dir.path().join("cache")).await.unwrap();

        let first = cache.ensure(&src).await.unwrap();

        let file = std::fs::File::options().write(true).open(&src).unwrap();
        file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(5))
            .unwrap();
        drop(file);

        let second = cache.ensure(&src).await.unwrap();
        assert_ne!(first, second, "stale fingerprint must produce a new artifact");
        let header = splatpipe_ply::inspect_file(&second).unwrap();
        assert_eq!(header.encoding, PlyEncoding::BinaryLittleEndian);
    }

    #[tokio::test]
    async fn binary_source_passes_through() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = write_source(dir.path(), "scan.ply", BINARY_SAMPLE);
        let cache_dir = dir.path().join("cache");
        let cache = PlyCache::open(&cache_dir).await.unwrap();

        let artifact = cache.ensure(&src).await.unwrap();
        assert_eq!(artifact, src);
        assert!(artifacts_in(&cache_dir).is_empty());
    }

    #[tokio::test]
    async fn concurrent_ensure_transcodes_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = write_source(dir.path(), "scan.ply", ASCII_SAMPLE.as_bytes());
        let cache_dir = dir.path().join("cache");
        let cache = Arc::new(PlyCache::open(&cache_dir).await.unwrap());

        let (a, b, c) = tokio::join!(
            cache.ensure(&src),
            cache.ensure(&src),
            cache.ensure(&src)
        );
        let a = a.unwrap();
        assert_eq!(a, b.unwrap());
        assert_eq!(a, c.unwrap());
        assert_eq!(artifacts_in(&cache_dir).len(), 1);
    }

    #[tokio::test]
    async fn corrupt_index_degrades_to_miss() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache_dir = dir.path().join("cache");
        std::fs::create_dir_all(&cache_dir).unwrap();
        std::fs::write(cache_dir.join(INDEX_FILE), b"{{{ not json").unwrap();

        let src = write_source(dir.path(), "scan.ply", ASCII_SAMPLE.as_bytes());
        let cache = PlyCache::open(&cache_dir).await.unwrap();
        let artifact = cache.ensure(&src).await.unwrap();
        assert!(artifact.exists());
    }

    #[tokio::test]
    async fn index_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = write_source(dir.path(), "scan.ply", ASCII_SAMPLE.as_bytes());
        let cache_dir = dir.path().join("cache");

        let first = {
            let cache = PlyCache::open(&cache_dir).await.unwrap();
            cache.ensure(&src).await.unwrap()
        };
        std::fs::write(&first, b"sentinel").unwrap();

        let cache = PlyCache::open(&cache_dir).await.unwrap();
        let second = cache.ensure(&src).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), b"sentinel");
    }

    #[tokio::test]
    async fn deleted_artifact_is_a_miss() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = write_source(dir.path(), "scan.ply", ASCII_SAMPLE.as_bytes());
        let cache = PlyCache::open(&dir.path().join("cache")).await.unwrap();

        let first = cache.ensure(&src).await.unwrap();
        std::fs::remove_file(&first).unwrap();

        let second = cache.ensure(&src).await.unwrap();
        assert_eq!(first, second, "same fingerprint, same artifact name");
        assert!(second.exists(), "artifact must be rebuilt");
    }

    #[tokio::test]
    async fn clear_removes_artifacts_and_index() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = write_source(dir.path(), "scan.ply", ASCII_SAMPLE.as_bytes());
        let cache_dir = dir.path().join("cache");
        let cache = PlyCache::open(&cache_dir).await.unwrap();

        let artifact = cache.ensure(&src).await.unwrap();
        cache.clear().await.unwrap();
        assert!(!artifact.exists());
        assert!(cache_dir.exists());

        // A post-clear ensure re-transcodes from scratch.
        let rebuilt = cache.ensure(&src).await.unwrap();
        assert!(rebuilt.exists());
    }

    #[tokio::test]
    async fn malformed_source_surfaces_ply_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = write_source(dir.path(), "scan.ply", b"not a point cloud");
        let cache = PlyCache::open(&dir.path().join("cache")).await.unwrap();
        let err = cache.ensure(&src).await.unwrap_err();
        assert!(matches!(err, CacheError::Ply(_)));
    }
}
