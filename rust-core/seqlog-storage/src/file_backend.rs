// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Flat-file storage backend for seqlog.
//
// Every key is stored as its own file below a base directory. File names are
// the hex encoding of the key; long names are split into a five-character
// shard directory plus the remainder so no single directory grows unbounded.
// Writes go to a temporary file that is fsynced and renamed over the target,
// so a single put is atomic. `put_multiple` writes entries one at a time, in
// order: it is not atomic across keys, but a trailing marker entry is never
// durable before the entries ahead of it.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::backend::StorageBackend;
use crate::error::StorageError;

/// Hex names longer than this are sharded into a sub-directory.
const SHARD_THRESHOLD: usize = 10;

/// Length of the shard directory name.
const SHARD_LEN: usize = 5;

/// Suffix of in-flight temporary files, skipped by `list`.
const TMP_SUFFIX: &str = ".tmp";

/// A storage backend that keeps one file per key.
#[derive(Debug, Clone)]
pub struct FileBackend {
    base: PathBuf,
    closed: Arc<AtomicBool>,
}

impl FileBackend {
    /// Open (and create if needed) a file store rooted at `base`.
    pub fn open(base: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base = base.as_ref().to_path_buf();
        fs::create_dir_all(&base)?;
        debug!(dir = %base.display(), "opened flat-file backend");
        Ok(Self {
            base,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Return the base directory of the store.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn check_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed("flat-file"));
        }
        Ok(())
    }
}

/// Map a key to its file path below `base`.
fn path_for_key(base: &Path, key: &[u8]) -> PathBuf {
    let name = hex::encode(key);
    if name.len() > SHARD_THRESHOLD {
        base.join(&name[..SHARD_LEN]).join(&name[SHARD_LEN..])
    } else {
        base.join(name)
    }
}

/// Recover the key from a path relative to `base`, or `None` for foreign files.
fn key_for_path(base: &Path, path: &Path) -> Option<Vec<u8>> {
    let rel = path.strip_prefix(base).ok()?;
    let name: String = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if name.ends_with(TMP_SUFFIX) {
        return None;
    }
    hex::decode(name).ok()
}

fn write_file(base: &Path, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
    let path = path_for_key(base, key);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.clone().into_os_string();
    tmp_name.push(TMP_SUFFIX);
    let tmp = PathBuf::from(tmp_name);

    let mut file = fs::File::create(&tmp)?;
    file.write_all(value)?;
    file.sync_all()?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

fn remove_file(base: &Path, key: &[u8]) -> Result<bool, StorageError> {
    match fs::remove_file(path_for_key(base, key)) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn walk(base: &Path, dir: &Path, keys: &mut Vec<Vec<u8>>) -> Result<(), StorageError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk(base, &path, keys)?;
            continue;
        }
        match key_for_path(base, &path) {
            Some(key) => keys.push(key),
            None => warn!(path = %path.display(), "ignoring foreign file in store"),
        }
    }
    Ok(())
}

fn join_error(e: tokio::task::JoinError) -> StorageError {
    StorageError::BackendUnavailable(format!("task join: {e}"))
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.check_open()?;
        let path = path_for_key(&self.base, key);
        tokio::task::spawn_blocking(move || match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        })
        .await
        .map_err(join_error)?
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.put_multiple(&[(key, value)]).await
    }

    async fn put_multiple(&self, entries: &[(&[u8], &[u8])]) -> Result<(), StorageError> {
        self.check_open()?;
        let base = self.base.clone();
        let owned: Vec<(Vec<u8>, Vec<u8>)> = entries
            .iter()
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            for (key, value) in &owned {
                write_file(&base, key, value)?;
            }
            Ok(())
        })
        .await
        .map_err(join_error)?
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.delete_multiple(&[key]).await? == 1)
    }

    async fn delete_multiple(&self, keys: &[&[u8]]) -> Result<usize, StorageError> {
        self.check_open()?;
        let base = self.base.clone();
        let owned: Vec<Vec<u8>> = keys.iter().map(|k| k.to_vec()).collect();
        tokio::task::spawn_blocking(move || -> Result<usize, StorageError> {
            let mut removed = 0;
            for key in &owned {
                if remove_file(&base, key)? {
                    removed += 1;
                }
            }
            Ok(removed)
        })
        .await
        .map_err(join_error)?
    }

    async fn list(&self) -> Result<Vec<Vec<u8>>, StorageError> {
        self.check_open()?;
        let base = self.base.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Vec<u8>>, StorageError> {
            let mut keys = Vec::new();
            walk(&base, &base, &mut keys)?;
            keys.sort();
            Ok(keys)
        })
        .await
        .map_err(join_error)?
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let keys = self.list().await?;
        let mut results = Vec::new();
        for key in keys.into_iter().filter(|k| k.starts_with(prefix)).take(limit) {
            // A concurrent delete may race the listing; skip vanished keys.
            if let Some(value) = self.get(&key).await? {
                results.push((key, value));
            }
        }
        Ok(results)
    }

    async fn last_key_with_prefix(&self, prefix: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let keys = self.list().await?;
        Ok(keys.into_iter().filter(|k| k.starts_with(prefix)).next_back())
    }

    async fn flush(&self) -> Result<(), StorageError> {
        // Every put is fsynced before it returns.
        self.check_open()
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn name(&self) -> &str {
        "flat-file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_path_sharding() {
        let base = Path::new("/store");
        assert_eq!(path_for_key(base, b"ab"), PathBuf::from("/store/6162"));
        assert_eq!(
            path_for_key(base, b"abcdef"),
            PathBuf::from("/store/61626/3646566")
        );
        let sharded = path_for_key(base, b"abcdef");
        assert_eq!(key_for_path(base, &sharded), Some(b"abcdef".to_vec()));
    }

    #[tokio::test]
    async fn test_roundtrip_and_list() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        assert_eq!(backend.get(b"missing").await.unwrap(), None);

        backend.put(b"short", b"1").await.unwrap();
        backend.put(b"a-much-longer-key", b"2").await.unwrap();
        assert_eq!(backend.get(b"short").await.unwrap(), Some(b"1".to_vec()));

        let keys = backend.list().await.unwrap();
        assert_eq!(keys, vec![b"a-much-longer-key".to_vec(), b"short".to_vec()]);

        assert!(backend.delete(b"short").await.unwrap());
        assert!(!backend.delete(b"short").await.unwrap());
        assert_eq!(backend.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_prefix_queries() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend
            .put_multiple(&[(b"p\x01" as &[u8], b"a" as &[u8]), (b"p\x02", b"b"), (b"q", b"c")])
            .await
            .unwrap();

        let scanned = backend.scan_prefix(b"p", 10).await.unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(
            backend.last_key_with_prefix(b"p").await.unwrap(),
            Some(b"p\x02".to_vec())
        );
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let backend = FileBackend::open(dir.path()).unwrap();
            backend.put(b"k", b"v").await.unwrap();
            backend.close().await.unwrap();
            assert!(backend.get(b"k").await.is_err());
        }
        let backend = FileBackend::open(dir.path()).unwrap();
        assert_eq!(backend.get(b"k").await.unwrap(), Some(b"v".to_vec()));
    }
}
