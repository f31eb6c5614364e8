// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Flat-file log of fixed-size frames.
//
// Entry `seq` lives at byte offset `seq * frame_size`, so the head is
// recovered on open as `file_len / frame_size - 1` and a point read is one
// seek. A trailing partial frame left by a crash mid-append is truncated on
// open. Entries can be nulled or replaced in place because every slot has
// the same size.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::codec::Codec;
use crate::error::LogError;
use crate::framing::{Frame, Framing, Mirrored};
use crate::log::{check_bounds, Alterer, Log};
use crate::observable::Observable;
use crate::query::{Entry, EntrySource, Query, QuerySpec};
use crate::seq::Seq;

// ---------------------------------------------------------------------------
// File access
// ---------------------------------------------------------------------------

struct FrameFile {
    file: Mutex<File>,
    frame_size: u64,
}

impl FrameFile {
    fn offset(&self, seq: Seq) -> u64 {
        // Callers pass bounds-checked, non-negative sequences.
        seq as u64 * self.frame_size
    }

    fn read_frame(&self, seq: Seq) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; self.frame_size as usize];
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.seek(SeekFrom::Start(self.offset(seq)))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_frame(&self, seq: Seq, frame: &[u8]) -> std::io::Result<()> {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.seek(SeekFrom::Start(self.offset(seq)))?;
        file.write_all(frame)?;
        file.flush()
    }

    fn sync(&self) -> std::io::Result<()> {
        self.file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sync_all()
    }
}

fn join_error(e: tokio::task::JoinError) -> LogError {
    LogError::Io(std::io::Error::other(e))
}

// ---------------------------------------------------------------------------
// OffsetLog
// ---------------------------------------------------------------------------

struct OffsetInner<T> {
    path: PathBuf,
    file: Arc<FrameFile>,
    framing: Box<dyn Framing>,
    codec: Box<dyn Codec<T>>,
    write: tokio::sync::Mutex<()>,
    head: Observable<Seq>,
    closed: AtomicBool,
}

/// A durable log in a single file of fixed-size frames.
pub struct OffsetLog<T> {
    inner: Arc<OffsetInner<T>>,
}

impl<T> Clone for OffsetLog<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> OffsetLog<T> {
    /// Open the log at `path` with 4096-byte mirrored frames.
    pub fn open(path: impl AsRef<Path>, codec: impl Codec<T> + 'static) -> Result<Self, LogError> {
        Self::open_with(path, Mirrored::default(), codec)
    }

    /// Open the log at `path` with the given framing.
    ///
    /// The file and its parent directories are created if missing. A trailing
    /// partial frame is truncated.
    pub fn open_with(
        path: impl AsRef<Path>,
        framing: impl Framing + 'static,
        codec: impl Codec<T> + 'static,
    ) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let frame_size = framing.frame_size() as u64;
        let len = file.metadata()?.len();
        let whole = len / frame_size;
        if len % frame_size != 0 {
            warn!(
                path = %path.display(),
                len,
                kept = whole * frame_size,
                "truncating partial frame at end of log"
            );
            file.set_len(whole * frame_size)?;
        }
        let head = whole as Seq - 1;
        info!(path = %path.display(), head, frame_size, "opened offset log");

        Ok(Self {
            inner: Arc::new(OffsetInner {
                path,
                file: Arc::new(FrameFile {
                    file: Mutex::new(file),
                    frame_size,
                }),
                framing: Box::new(framing),
                codec: Box::new(codec),
                write: tokio::sync::Mutex::new(()),
                head: Observable::new(head),
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Encode and frame a value for storage.
    fn frame_value(&self, value: &T) -> Result<Vec<u8>, LogError> {
        let payload = self.inner.codec.encode(value)?;
        Ok(self.inner.framing.encode_frame(&payload)?)
    }

    async fn write_at(&self, seq: Seq, frame: Vec<u8>) -> Result<(), LogError> {
        let file = Arc::clone(&self.inner.file);
        tokio::task::spawn_blocking(move || file.write_frame(seq, &frame))
            .await
            .map_err(join_error)??;
        Ok(())
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> EntrySource<T> for OffsetInner<T> {
    async fn read_entry(&self, seq: Seq) -> Result<Entry<T>, LogError> {
        check_bounds(seq, self.head.value())?;
        let file = Arc::clone(&self.file);
        let raw = tokio::task::spawn_blocking(move || file.read_frame(seq))
            .await
            .map_err(join_error)??;
        match self.framing.decode_frame(&raw)? {
            Frame::Nulled => Ok(Entry::Nulled),
            Frame::Data(payload) => Ok(Entry::Value(self.codec.decode(payload)?)),
        }
    }

    fn head(&self) -> &Observable<Seq> {
        &self.head
    }

    fn check_usable(&self) -> Result<(), LogError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LogError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Log<T> for OffsetLog<T> {
    fn seq(&self) -> Observable<Seq> {
        self.inner.head.clone()
    }

    async fn get(&self, seq: Seq) -> Result<T, LogError> {
        self.inner.check_usable()?;
        match self.inner.read_entry(seq).await? {
            Entry::Value(v) => Ok(v),
            Entry::Nulled => Err(LogError::Nulled(seq)),
        }
    }

    async fn append(&self, value: T) -> Result<Seq, LogError> {
        let frame = self.frame_value(&value)?;
        let _write = self.inner.write.lock().await;
        self.inner.check_usable()?;
        let seq = self.inner.head.value() + 1;
        self.write_at(seq, frame).await?;
        self.inner.head.set(seq)?;
        debug!(seq, "appended to offset log");
        Ok(seq)
    }

    fn query(&self, specs: &[QuerySpec]) -> Result<Query<T>, LogError> {
        self.inner.check_usable()?;
        let source: Arc<dyn EntrySource<T>> = self.inner.clone();
        Query::from_specs(source, specs)
    }

    async fn close(&self) -> Result<(), LogError> {
        let _write = self.inner.write.lock().await;
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let file = Arc::clone(&self.inner.file);
        tokio::task::spawn_blocking(move || file.sync())
            .await
            .map_err(join_error)??;
        self.inner.head.close();
        info!(path = %self.inner.path.display(), "closed offset log");
        Ok(())
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Alterer<T> for OffsetLog<T> {
    async fn null(&self, seq: Seq) -> Result<(), LogError> {
        let _write = self.inner.write.lock().await;
        self.inner.check_usable()?;
        check_bounds(seq, self.inner.head.value())?;
        self.write_at(seq, self.inner.framing.null_frame()).await?;
        debug!(seq, "nulled entry");
        Ok(())
    }

    async fn replace(&self, seq: Seq, value: T) -> Result<(), LogError> {
        let frame = self.frame_value(&value)?;
        let _write = self.inner.write.lock().await;
        self.inner.check_usable()?;
        check_bounds(seq, self.inner.head.value())?;
        self.write_at(seq, frame).await?;
        debug!(seq, "replaced entry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::error::FrameError;
    use crate::framing::LengthPrefixed;
    use crate::query::Item;
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_reopen_recovers_head() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log").join("offset");
        {
            let log = OffsetLog::<String>::open(&path, JsonCodec).unwrap();
            for word in ["a", "b", "c"] {
                log.append(word.to_string()).await.unwrap();
            }
            log.close().await.unwrap();
        }

        let log = OffsetLog::<String>::open(&path, JsonCodec).unwrap();
        assert_eq!(log.current_seq(), 2);
        assert_eq!(log.get(0).await.unwrap(), "a");
        assert_eq!(log.get(2).await.unwrap(), "c");
        assert_eq!(log.append("d".into()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_torn_tail_is_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offset");
        let framing = LengthPrefixed::new(64).unwrap();
        {
            let log = OffsetLog::<i64>::open_with(&path, framing, JsonCodec).unwrap();
            log.append(1).await.unwrap();
            log.append(2).await.unwrap();
            log.close().await.unwrap();
        }
        // Simulate a crash halfway through a third frame.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0u8; 10]).unwrap();
        drop(file);

        let log = OffsetLog::<i64>::open_with(&path, framing, JsonCodec).unwrap();
        assert_eq!(log.current_seq(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), 128);
        assert_eq!(log.append(3).await.unwrap(), 2);
        assert_eq!(log.get(2).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_null_and_replace() {
        let dir = tempdir().unwrap();
        let log = OffsetLog::<String>::open(dir.path().join("offset"), JsonCodec).unwrap();
        for word in ["keep", "secret", "typo"] {
            log.append(word.to_string()).await.unwrap();
        }

        log.null(1).await.unwrap();
        log.null(1).await.unwrap();
        assert!(log.get(1).await.unwrap_err().is_nulled());

        log.replace(2, "fixed".into()).await.unwrap();
        assert_eq!(log.get(2).await.unwrap(), "fixed");
        assert_eq!(log.current_seq(), 2);

        assert!(log.null(5).await.unwrap_err().is_out_of_bounds());

        let items = log
            .query(&[QuerySpec::SeqWrap(true)])
            .unwrap()
            .collect(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1], Item::Nulled(1));
        assert_eq!(items[2].clone().into_value(), Some("fixed".to_string()));
    }

    #[tokio::test]
    async fn test_oversized_value_rejected() {
        let dir = tempdir().unwrap();
        let framing = LengthPrefixed::new(16).unwrap();
        let log = OffsetLog::<String>::open_with(dir.path().join("o"), framing, JsonCodec).unwrap();
        let err = log.append("x".repeat(64)).await.unwrap_err();
        assert!(matches!(err, LogError::Frame(FrameError::TooLarge { .. })));
        assert_eq!(log.current_seq(), -1);
    }
}
