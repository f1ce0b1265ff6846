// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Local log file with size-based rotation.
//!
//! Every worker appends to the same file, so append and the rotation check that follows it
//! run under one lock. A rotated file is renamed to `<stem>-<timestamp>.<ext>` next to the
//! live file and, when compression is on, replaced by a `.zst` copy.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Local;
use tracing::debug;

use crate::errors::FileWriteError;

const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";
const COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Rotate once the file reaches this many bytes; 0 never rotates
    pub max_bytes: u64,
    pub compress: bool,
}

#[derive(Debug)]
pub struct FileWriter {
    path: PathBuf,
    policy: RotationPolicy,
    lock: Mutex<()>,
}

impl FileWriter {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, policy: RotationPolicy) -> Self {
        FileWriter {
            path: path.into(),
            policy,
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `bytes`, syncs, then rotates if the file reached the threshold.
    pub fn append(&self, bytes: &[u8]) -> Result<(), FileWriteError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| FileWriteError::new("open", &self.path, e))?;
        file.write_all(bytes)
            .map_err(|e| FileWriteError::new("write", &self.path, e))?;
        file.sync_all()
            .map_err(|e| FileWriteError::new("sync", &self.path, e))?;
        drop(file);

        self.rotate_locked()?;
        Ok(())
    }

    /// Runs [`FileWriter::append`] on the blocking thread pool and waits for it.
    pub async fn append_on_blocking_pool(
        self: Arc<Self>,
        bytes: Vec<u8>,
    ) -> Result<(), FileWriteError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || self.append(&bytes))
            .await
            .map_err(|e| FileWriteError::new("write", path, io::Error::other(e)))?
    }

    #[cfg(test)]
    pub(crate) fn hold_lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rotates the file if it reached the threshold. Returns whether it rotated.
    pub fn rotate_if_oversize(&self) -> Result<bool, FileWriteError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.rotate_locked()
    }

    fn rotate_locked(&self) -> Result<bool, FileWriteError> {
        if self.policy.max_bytes == 0 {
            return Ok(false);
        }
        let size = match fs::metadata(&self.path) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(FileWriteError::new("stat", &self.path, e)),
        };
        if size < self.policy.max_bytes {
            return Ok(false);
        }

        let backup = self.backup_path();
        fs::rename(&self.path, &backup)
            .map_err(|e| FileWriteError::new("rotate", &self.path, e))?;
        let archived = if self.policy.compress {
            compress(&backup)?
        } else {
            backup
        };
        File::create(&self.path).map_err(|e| FileWriteError::new("create", &self.path, e))?;

        debug!(
            "FILE | Rotated {} ({} bytes) to {}",
            self.path.display(),
            size,
            archived.display()
        );
        Ok(true)
    }

    /// `<stem>-<timestamp>.<ext>`, with a `-<n>` suffix on the stem part when a rotation in
    /// the same millisecond already took that name.
    fn backup_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = self
            .path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let timestamp = Local::now().format(BACKUP_TIME_FORMAT).to_string();

        let mut candidate = self.path.with_file_name(format!("{stem}-{timestamp}{ext}"));
        let mut n = 1;
        while taken(&candidate) {
            candidate = self
                .path
                .with_file_name(format!("{stem}-{timestamp}-{n}{ext}"));
            n += 1;
        }
        candidate
    }
}

fn taken(path: &Path) -> bool {
    if path.exists() {
        return true;
    }
    let mut compressed = path.as_os_str().to_owned();
    compressed.push(".zst");
    Path::new(&compressed).exists()
}

/// Replaces `path` with a zstd-compressed `<path>.zst`.
fn compress(path: &Path) -> Result<PathBuf, FileWriteError> {
    let mut target = path.as_os_str().to_owned();
    target.push(".zst");
    let target = PathBuf::from(target);

    let source = File::open(path).map_err(|e| FileWriteError::new("open", path, e))?;
    let output = File::create(&target).map_err(|e| FileWriteError::new("create", &target, e))?;
    let mut writer = BufWriter::new(output);
    zstd::stream::copy_encode(BufReader::new(source), &mut writer, COMPRESSION_LEVEL)
        .map_err(|e| FileWriteError::new("compress", path, e))?;
    writer
        .flush()
        .map_err(|e| FileWriteError::new("write", &target, e))?;
    fs::remove_file(path).map_err(|e| FileWriteError::new("remove", path, e))?;
    Ok(target)
}
