// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};

use derive_more::Display;

/// Run-wide delivery counters, shared by workers and dispatch tasks.
///
/// Once every dispatch has completed, `sent + dropped == synthesized` holds for runs with
/// sink sending enabled.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    synthesized: AtomicU64,
    sent: AtomicU64,
    dropped: AtomicU64,
    failed_batches: AtomicU64,
    file_write_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[display(
    "synthesized={synthesized} sent={sent} dropped={dropped} failed_batches={failed_batches} file_write_errors={file_write_errors}"
)]
pub struct DeliverySnapshot {
    pub synthesized: u64,
    pub sent: u64,
    pub dropped: u64,
    pub failed_batches: u64,
    pub file_write_errors: u64,
}

impl DeliveryStats {
    pub fn record_synthesized(&self, count: u64) {
        self.synthesized.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_sent(&self, count: u64) {
        self.sent.fetch_add(count, Ordering::Relaxed);
    }

    /// Records that were synthesized but will never reach the sink.
    pub fn record_dropped(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_failed_batch(&self, records: u64) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
        self.record_dropped(records);
    }

    pub fn record_file_write_error(&self) {
        self.file_write_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> DeliverySnapshot {
        DeliverySnapshot {
            synthesized: self.synthesized.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            file_write_errors: self.file_write_errors.load(Ordering::Relaxed),
        }
    }
}
