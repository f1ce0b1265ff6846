// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Bytes in one mebibyte, the unit used by `bulk_size` and `file_size_rotate`.
pub const MIB: u64 = 1024 * 1024;

/// Search-engine runs rotate once the file holds at least this much, even with a zero
/// threshold.
pub const MIN_ROTATE_BYTES: u64 = 1024;

/// The batch byte size is only re-checked every Nth offered record.
pub const DEFAULT_SIZE_CHECK_INTERVAL: u64 = 10;

/// Length of the random string substituted for `$STRING`.
pub const DEFAULT_RANDOM_STRING_LENGTH: usize = 10;

/// Length of random padding values when an extra tag has an empty literal.
pub const DEFAULT_EXTRA_TAG_LENGTH: usize = 7;

/// Extra tag key that receives the run-wide increasing counter.
pub const DEFAULT_INDEX_TAG_KEY: &str = "log_index";

pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_TIME_FORMAT: &str = "2006-01-02 15:04:05";

pub const DEFAULT_LOG_FILE_NAME: &str = "loggen.log";

/// AES-128 key used for `es_key` blobs unless `decryption_key` overrides it.
pub const DEFAULT_DECRYPTION_KEY: &str = "SnappyFlow123456";

/// The broker variant re-arms its per-topic loops on this period.
pub const BROKER_WINDOW: Duration = Duration::from_secs(60);

/// How long shutdown waits for in-flight dispatches.
pub const DRAIN_GRACE_PERIOD: Duration = Duration::from_secs(30);
