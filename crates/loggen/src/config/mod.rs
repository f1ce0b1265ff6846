// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Run configuration.
//!
//! A run is described by a single JSON object. Field names follow the two historical
//! generator configs (search-engine and broker), so both styles load through the aliases
//! below. Booleans may be given as strings (`"true"`), which the broker configs used.
//!
//! Loading is two steps: [`Config::from_json_str`] parses, [`Config::validate`] enforces the
//! cross-field rules. [`load_config`] does both and is what the binary calls.

pub mod time_format;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_aux::prelude::deserialize_bool_from_anything;
use tracing::debug;

use crate::batch::BatchLimits;
use crate::config::time_format::TimeFormat;
use crate::constants::{
    DEFAULT_DECRYPTION_KEY, DEFAULT_FLUSH_INTERVAL_SECS, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_INDEX_TAG_KEY, DEFAULT_LOG_FILE_NAME, DEFAULT_RANDOM_STRING_LENGTH,
    DEFAULT_SIZE_CHECK_INTERVAL, DEFAULT_TIME_FORMAT, MIB, MIN_ROTATE_BYTES,
};
use crate::errors::ConfigError;
use crate::file_writer::RotationPolicy;
use crate::sink::SinkKind;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sink: SinkKind,

    /// Target rate in records per minute
    pub logs_per_min: u64,
    /// Round length (search engine, any positive length, fractions allowed) or tick period
    /// (broker, whole seconds dividing one minute)
    #[serde(default = "default_flush_interval", alias = "log_interval")]
    pub flush_interval: f64,

    #[serde(default)]
    pub max_bulk_count: Option<u64>,
    /// Advisory batch byte cap
    #[serde(default)]
    pub max_bulk_size: Option<u64>,
    /// Batch cap in MiB, used when `max_bulk_size` is absent
    #[serde(default)]
    pub bulk_size: Option<f64>,
    #[serde(default = "default_size_check_interval")]
    pub size_check_interval: u64,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default, alias = "extraJson")]
    pub extra_tags: BTreeMap<String, String>,
    #[serde(
        default,
        alias = "send_json_logs_kafka",
        deserialize_with = "deserialize_bool_from_anything"
    )]
    pub send_large_json_logs: bool,
    #[serde(default = "default_index_tag_key")]
    pub index_tag_key: String,
    #[serde(default = "default_random_string_length")]
    pub random_string_length: usize,

    #[serde(default = "default_time_format")]
    pub time_format: String,

    #[serde(
        default,
        alias = "save_logs_onto_file",
        deserialize_with = "deserialize_bool_from_anything"
    )]
    pub file_write: bool,
    #[serde(default = "default_file_path")]
    pub file_path: String,
    #[serde(default = "default_file_name")]
    pub file_name: String,
    /// Rotation threshold in MiB. For the search-engine sink, 0 rotates as soon as the file
    /// holds a full KiB; for the broker sink, 0 never rotates.
    #[serde(default)]
    pub file_size_rotate: u64,
    #[serde(
        default,
        alias = "compress_old_logs",
        deserialize_with = "deserialize_bool_from_anything"
    )]
    pub compress: bool,

    #[serde(
        default = "default_true",
        alias = "es_send",
        deserialize_with = "deserialize_bool_from_anything"
    )]
    pub sink_send: bool,
    #[serde(default)]
    pub es_key: Option<String>,
    #[serde(default)]
    pub decryption_key: Option<String>,
    #[serde(default)]
    pub project_name: String,

    #[serde(default, alias = "ip")]
    pub kafka_rest_url: Option<String>,
    #[serde(default)]
    pub kafka_topics: Vec<String>,
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Number of rounds (or broker minutes) to run; unset runs forever
    #[serde(default)]
    pub rounds: Option<u64>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default, deserialize_with = "deserialize_bool_from_anything")]
    pub tls_skip_verify: bool,
}

#[allow(clippy::cast_precision_loss)]
fn default_flush_interval() -> f64 {
    DEFAULT_FLUSH_INTERVAL_SECS as f64
}

fn default_size_check_interval() -> u64 {
    DEFAULT_SIZE_CHECK_INTERVAL
}

fn default_index_tag_key() -> String {
    DEFAULT_INDEX_TAG_KEY.to_string()
}

fn default_random_string_length() -> usize {
    DEFAULT_RANDOM_STRING_LENGTH
}

fn default_time_format() -> String {
    DEFAULT_TIME_FORMAT.to_string()
}

fn default_file_path() -> String {
    ".".to_string()
}

fn default_file_name() -> String {
    DEFAULT_LOG_FILE_NAME.to_string()
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

/// Reads, parses and validates the config at `path`.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = Config::from_json_str(&data)?;
    config.validate()?;
    debug!("Loaded {} config from {}", config.sink, path.display());
    Ok(config)
}

impl Config {
    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.time_layout()?;

        if self.logs_per_min == 0 {
            return Err(ConfigError::Invalid(
                "logs_per_min must be greater than 0".to_string(),
            ));
        }
        if !self.flush_interval.is_finite()
            || self.flush_interval <= 0.0
            || Duration::try_from_secs_f64(self.flush_interval).is_err()
        {
            return Err(ConfigError::Invalid(format!(
                "flush_interval must be a positive number of seconds, got {}",
                self.flush_interval
            )));
        }
        if self.size_check_interval == 0 {
            return Err(ConfigError::Invalid(
                "size_check_interval must be greater than 0".to_string(),
            ));
        }
        if let Some(key) = &self.decryption_key {
            if key.len() != 16 {
                return Err(ConfigError::Invalid(format!(
                    "decryption_key must be 16 bytes, got {}",
                    key.len()
                )));
            }
        }

        match self.sink {
            SinkKind::Elasticsearch => {
                let has_key = self.es_key.as_deref().is_some_and(|k| !k.trim().is_empty());
                if self.sink_send && !has_key {
                    return Err(ConfigError::Invalid(
                        "es_key is required when sink_send is enabled".to_string(),
                    ));
                }
            }
            SinkKind::Kafka => {
                let whole = self.flush_interval.fract() == 0.0;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let secs = self.flush_interval as u64;
                if !whole || secs > 60 || 60 % secs != 0 {
                    return Err(ConfigError::Invalid(format!(
                        "flush_interval must evenly divide 60 seconds, got {}",
                        self.flush_interval
                    )));
                }
                if self.kafka_topics.is_empty() {
                    return Err(ConfigError::Invalid("kafka_topics is empty".to_string()));
                }
                if self.sink_send && self.kafka_rest_url.as_deref().map_or(true, str::is_empty) {
                    return Err(ConfigError::Invalid(
                        "kafka_rest_url is required when sink_send is enabled".to_string(),
                    ));
                }
                if self.max_bulk_count.is_some_and(|count| count > self.logs_per_min) {
                    return Err(ConfigError::Invalid(
                        "max_bulk_count is greater than logs_per_min".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn time_layout(&self) -> Result<TimeFormat, ConfigError> {
        TimeFormat::parse(&self.time_format)
    }

    /// `flush_interval` as a `Duration`. Values validation would reject fall back to the
    /// default interval.
    #[must_use]
    pub fn flush_interval_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.flush_interval)
            .ok()
            .filter(|interval| !interval.is_zero())
            .unwrap_or(Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS))
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Batch byte cap: `max_bulk_size` wins over `bulk_size`; zero means no cap.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn max_bulk_bytes(&self) -> Option<usize> {
        match (self.max_bulk_size, self.bulk_size) {
            (Some(bytes), _) if bytes > 0 => Some(bytes as usize),
            (None, Some(mib)) if mib > 0.0 => Some((mib * MIB as f64) as usize),
            _ => None,
        }
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn batch_limits(&self) -> BatchLimits {
        BatchLimits {
            max_count: self
                .max_bulk_count
                .filter(|count| *count > 0)
                .map(|count| count as usize),
            max_bytes: self.max_bulk_bytes(),
            size_check_interval: self.size_check_interval,
        }
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        Path::new(&self.file_path).join(&self.file_name)
    }

    #[must_use]
    pub fn rotation_policy(&self) -> RotationPolicy {
        let max_bytes = self.file_size_rotate.saturating_mul(MIB);
        let max_bytes = match self.sink {
            SinkKind::Elasticsearch => max_bytes.max(MIN_ROTATE_BYTES),
            SinkKind::Kafka => max_bytes,
        };
        RotationPolicy {
            max_bytes,
            compress: self.compress,
        }
    }

    #[must_use]
    pub fn decryption_key(&self) -> &str {
        self.decryption_key
            .as_deref()
            .unwrap_or(DEFAULT_DECRYPTION_KEY)
    }
}
