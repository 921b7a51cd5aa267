// This file is part of guacplay, a Guacamole session recording player.
// Copyright (C) 2026 The guacplay Authors.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Random-access byte sources backing a recording blob.

use async_trait::async_trait;
use base::{bail, err, Error};
use bytes::Bytes;
use std::ops::Range;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Random-access view of a recording blob.
///
/// Reads are suspension points for the playback engine: ingest, seek
/// replay, and command processing all interleave across them.
/// Implementations must tolerate concurrent reads and must not hold a
/// lock across I/O.
#[async_trait]
pub trait Source: Send + Sync + 'static {
    /// Current size of the blob in bytes. May grow while the recording is
    /// still being captured; bytes already written never change.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads `range`, which must lie within `len()`.
    async fn read(&self, range: Range<u64>) -> Result<Bytes, Error>;
}

/// An in-memory blob: cheaply cloneable, and appendable so a still-growing
/// capture can be modeled.
#[derive(Clone, Default)]
pub struct BufferSource(Arc<Mutex<Vec<u8>>>);

impl BufferSource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        BufferSource(Arc::new(Mutex::new(data.into())))
    }

    pub fn append(&self, data: &[u8]) {
        self.0.lock().unwrap().extend_from_slice(data);
    }
}

#[async_trait]
impl Source for BufferSource {
    fn len(&self) -> u64 {
        self.0.lock().unwrap().len() as u64
    }

    async fn read(&self, range: Range<u64>) -> Result<Bytes, Error> {
        // A memory read completes immediately; yield anyway so reads stay
        // suspension points and the engine's activities interleave.
        tokio::task::yield_now().await;
        let data = self.0.lock().unwrap();
        if range.start > range.end || range.end > data.len() as u64 {
            bail!(
                OutOfRange,
                msg(
                    "range {}..{} outside blob of {} bytes",
                    range.start,
                    range.end,
                    data.len()
                )
            );
        }
        Ok(Bytes::copy_from_slice(
            &data[range.start as usize..range.end as usize],
        ))
    }
}

/// A file-backed blob. The size is taken at open; reads run on the
/// blocking thread pool.
#[derive(Debug)]
pub struct FileSource {
    file: Arc<std::fs::File>,
    len: u64,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = std::fs::File::open(path)
            .map_err(|e| err!(NotFound, msg("unable to open {}", path.display()), source(e)))?;
        let len = file
            .metadata()
            .map_err(|e| err!(Unavailable, msg("unable to stat {}", path.display()), source(e)))?
            .len();
        Ok(FileSource {
            file: Arc::new(file),
            len,
        })
    }
}

#[async_trait]
impl Source for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    async fn read(&self, range: Range<u64>) -> Result<Bytes, Error> {
        if range.start > range.end || range.end > self.len {
            bail!(
                OutOfRange,
                msg(
                    "range {}..{} outside file of {} bytes",
                    range.start,
                    range.end,
                    self.len
                )
            );
        }
        let file = self.file.clone();
        tokio::task::spawn_blocking(move || {
            use std::os::unix::fs::FileExt;
            let mut buf = vec![0u8; (range.end - range.start) as usize];
            file.read_exact_at(&mut buf, range.start).map_err(|e| {
                err!(
                    Unavailable,
                    msg("read of {}..{} failed", range.start, range.end),
                    source(e)
                )
            })?;
            Ok(Bytes::from(buf))
        })
        .await
        .map_err(|e| err!(Internal, msg("read task failed"), source(e)))?
    }
}
