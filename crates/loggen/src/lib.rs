// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # loggen
//!
//! Synthetic log traffic for load-testing and demoing log-ingestion pipelines.
//!
//! Records are synthesized from textual templates, paced to a per-minute rate, assembled
//! into bulk batches and delivered to one of two sinks:
//! - a search-engine bulk endpoint (`POST <index>_write/doc/_bulk`)
//! - a message-broker REST proxy (`POST <base>/<topic>`)
//!
//! Records can additionally be appended to a local, size-rotated file.
//!
//! ## Modules
//!
//! - [`config`]: JSON run configuration and validation
//! - [`templates`]: template file loading
//! - [`credentials`]: decryption of the sink credential blob
//! - [`synthesizer`]: template to record
//! - [`pacer`]: per-tick and per-round record budgets
//! - [`batch`]: count/size/quota bounded batch assembly
//! - [`sink`]: wire formats and the HTTP dispatcher
//! - [`file_writer`]: local file append and rotation
//! - [`driver`]: run orchestration and shutdown

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batch;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod driver;
pub mod endpoint;
pub mod errors;
pub mod file_writer;
pub mod pacer;
pub mod sink;
pub mod stats;
pub mod synthesizer;
pub mod templates;
pub mod worker;

pub use config::{load_config, Config};
pub use driver::{DriverState, PipelineDriver};
pub use errors::StartupError;
pub use stats::{DeliverySnapshot, DeliveryStats};
