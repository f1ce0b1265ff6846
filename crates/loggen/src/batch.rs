// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bulk batch assembly.
//!
//! Records are accumulated until one of three conditions closes the batch:
//! 1. **Quota**: the worker has synthesized its last record for the window
//! 2. **Count limit**: `max_count` records
//! 3. **Size limit**: `max_bytes` of encoded records
//!
//! The size limit is only checked every `size_check_interval` records, so a batch may
//! overshoot it by up to `size_check_interval - 1` records.

use std::mem;

/// Encoded records bound for one sink request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    records: Vec<Vec<u8>>,
    size_bytes: usize,
}

impl Batch {
    fn push(&mut self, encoded: Vec<u8>) {
        self.size_bytes += encoded.len();
        self.records.push(encoded);
    }

    #[must_use]
    pub fn records(&self) -> &[Vec<u8>] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of the encoded record lengths.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}

impl FromIterator<Vec<u8>> for Batch {
    fn from_iter<I: IntoIterator<Item = Vec<u8>>>(iter: I) -> Self {
        let mut batch = Batch::default();
        for encoded in iter {
            batch.push(encoded);
        }
        batch
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_count: Option<usize>,
    pub max_bytes: Option<usize>,
    pub size_check_interval: u64,
}

impl Default for BatchLimits {
    fn default() -> Self {
        BatchLimits {
            max_count: None,
            max_bytes: None,
            size_check_interval: crate::constants::DEFAULT_SIZE_CHECK_INTERVAL,
        }
    }
}

/// Accumulates records for one worker. Never shared.
#[derive(Debug)]
pub struct BatchAssembler {
    limits: BatchLimits,
    open: Batch,
}

impl BatchAssembler {
    #[must_use]
    pub fn new(limits: BatchLimits) -> Self {
        BatchAssembler {
            limits,
            open: Batch::default(),
        }
    }

    /// Adds a record and returns the batch if it closed.
    pub fn offer(&mut self, encoded: Vec<u8>, quota_exhausted: bool) -> Option<Batch> {
        self.open.push(encoded);
        if quota_exhausted || self.count_reached() || self.size_reached() {
            return self.flush();
        }
        None
    }

    /// Closes the open batch, if it holds anything.
    pub fn flush(&mut self) -> Option<Batch> {
        if self.open.is_empty() {
            return None;
        }
        Some(mem::take(&mut self.open))
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.open.len()
    }

    fn count_reached(&self) -> bool {
        self.limits
            .max_count
            .is_some_and(|max| self.open.len() >= max)
    }

    fn size_reached(&self) -> bool {
        let Some(max_bytes) = self.limits.max_bytes else {
            return false;
        };
        let every = self.limits.size_check_interval.max(1);
        self.open.len() as u64 % every == 0 && self.open.size_bytes() >= max_bytes
    }
}
