// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::batch::Batch;
use crate::endpoint::SinkEndpoint;

pub const CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";
pub const ACCEPT: &str = "application/vnd.kafka.v2+json,application/json";

/// `{"records":[{"value":<record>},...]}`, built from the already encoded records.
#[must_use]
pub fn encode_envelope(batch: &Batch) -> Vec<u8> {
    const HEAD: &[u8] = b"{\"records\":[";
    const VALUE: &[u8] = b"{\"value\":";

    let mut body = Vec::with_capacity(
        HEAD.len() + batch.size_bytes() + batch.len() * (VALUE.len() + 2) + 2,
    );
    body.extend_from_slice(HEAD);
    for (i, record) in batch.records().iter().enumerate() {
        if i > 0 {
            body.push(b',');
        }
        body.extend_from_slice(VALUE);
        body.extend_from_slice(record);
        body.push(b'}');
    }
    body.extend_from_slice(b"]}");
    body
}

/// `<base>/<topic>`
#[must_use]
pub fn topic_url(endpoint: &SinkEndpoint) -> String {
    format!("{}/{}", endpoint.base_url(), endpoint.target)
}
