// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for every stage of a run.
//!
//! Startup errors ([`ConfigError`], [`TemplateError`], [`CredentialsError`]) abort the run
//! before any worker starts and are folded into [`StartupError`]. Per-batch and per-write
//! errors ([`DispatchError`], [`FileWriteError`]) are logged by the worker that hit them and
//! never escalate.

use std::io;
use std::path::PathBuf;

use reqwest::StatusCode;

/// Errors raised while loading or validating the JSON configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid time format '{0}', supported formats are: {1}")]
    UnsupportedTimeFormat(String, String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised while loading template files
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to read template file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no usable log templates found in {0} file(s)")]
    Empty(usize),
}

/// Errors raised while decrypting the sink credential blob
#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("credential blob is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("decryption key must be 16 bytes, got {0}")]
    KeyLength(usize),

    #[error("ciphertext too short")]
    TooShort,

    #[error("ciphertext is not a multiple of the block size")]
    NotBlockAligned,

    #[error("invalid padding in decrypted credentials")]
    Padding,

    #[error("decrypted credentials are not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("unable to unmarshal key data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid sink endpoint: {0}")]
    Endpoint(String),
}

/// Errors raised while delivering one batch to the sink
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("refusing to send an empty batch")]
    EmptyBatch,

    #[error("invalid value for header {0}")]
    Header(&'static str),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("sink responded with {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Errors raised while appending to or rotating the local log file
#[derive(Debug, thiserror::Error)]
#[error("failed to {op} {path}: {source}")]
pub struct FileWriteError {
    pub op: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl FileWriteError {
    pub(crate) fn new(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Any error that stops a run before the pipeline starts
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Templates(#[from] TemplateError),

    #[error("decryption failed: {0}")]
    Credentials(#[from] CredentialsError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
