// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bulk API wire format: one action line and one document line per record, and a trailing
//! newline after the last document.

use crate::batch::Batch;
use crate::endpoint::SinkEndpoint;

pub const CONTENT_TYPE: &str = "application/json";

const INDEX_ACTION: &[u8] = b"{\"index\":{}}\n";

#[must_use]
pub fn encode_bulk(batch: &Batch) -> Vec<u8> {
    let mut body =
        Vec::with_capacity(batch.size_bytes() + batch.len() * (INDEX_ACTION.len() + 1) + 1);
    for record in batch.records() {
        body.extend_from_slice(INDEX_ACTION);
        body.extend_from_slice(record);
        body.push(b'\n');
    }
    body.push(b'\n');
    body
}

/// `<proto>://<host>:<port>/<index>_write/doc/_bulk`
#[must_use]
pub fn bulk_url(endpoint: &SinkEndpoint) -> String {
    format!("{}/{}_write/doc/_bulk", endpoint.base_url(), endpoint.target)
}
