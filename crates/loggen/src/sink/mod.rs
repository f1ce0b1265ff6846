// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod dispatcher;
pub mod elasticsearch;
pub mod kafka;

use std::time::Duration;

use derive_more::Display;
use serde::Deserialize;

use crate::batch::Batch;
use crate::endpoint::SinkEndpoint;
use crate::errors::DispatchError;

/// The downstream system batches are delivered to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Bulk-indexing endpoint of a search engine
    #[default]
    #[serde(alias = "es")]
    #[display("elasticsearch")]
    Elasticsearch,
    /// REST proxy in front of a message broker
    #[display("kafka")]
    Kafka,
}

impl SinkKind {
    /// Request body for one batch.
    #[must_use]
    pub fn encode(self, batch: &Batch) -> Vec<u8> {
        match self {
            SinkKind::Elasticsearch => elasticsearch::encode_bulk(batch),
            SinkKind::Kafka => kafka::encode_envelope(batch),
        }
    }

    #[must_use]
    pub fn url(self, endpoint: &SinkEndpoint) -> String {
        match self {
            SinkKind::Elasticsearch => elasticsearch::bulk_url(endpoint),
            SinkKind::Kafka => kafka::topic_url(endpoint),
        }
    }
}

/// One client per run; connections are pooled across every dispatch.
pub fn build_client(timeout: Duration, skip_verify: bool) -> Result<reqwest::Client, DispatchError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(skip_verify)
        .build()
        .map_err(DispatchError::Client)
}
