// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch delivery.
//!
//! A [`Dispatcher`] posts one closed batch per request to a fixed URL. Delivery is
//! at-most-once: a 200 counts the batch as sent, anything else (another status, a transport
//! error, a timeout) drops it. There is no retry.
//!
//! Workers call [`Dispatcher::spawn_dispatch`] and move on; the request runs on a task
//! tracked by the run's [`TaskTracker`], so shutdown can wait for in-flight requests.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use crate::batch::Batch;
use crate::endpoint::{Credentials, SinkEndpoint};
use crate::errors::DispatchError;
use crate::sink::{elasticsearch, kafka, SinkKind};
use crate::stats::DeliveryStats;

#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    kind: SinkKind,
    url: String,
    headers: HeaderMap,
    credentials: Credentials,
    stats: Arc<DeliveryStats>,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new(
        client: reqwest::Client,
        kind: SinkKind,
        endpoint: &SinkEndpoint,
        stats: Arc<DeliveryStats>,
        tracker: TaskTracker,
    ) -> Result<Self, DispatchError> {
        let mut headers = HeaderMap::new();
        match kind {
            SinkKind::Elasticsearch => {
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static(elasticsearch::CONTENT_TYPE),
                );
            }
            SinkKind::Kafka => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(kafka::CONTENT_TYPE));
                headers.insert(ACCEPT, HeaderValue::from_static(kafka::ACCEPT));
            }
        }
        if let Some(token) = endpoint.credentials.bearer_header() {
            let mut value =
                HeaderValue::from_str(&token).map_err(|_| DispatchError::Header("Authorization"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        Ok(Dispatcher {
            client,
            kind,
            url: kind.url(endpoint),
            headers,
            credentials: endpoint.credentials.clone(),
            stats,
            tracker,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Posts `batch` and waits for the response. Returns the number of records delivered.
    pub async fn dispatch(&self, batch: Batch) -> Result<usize, DispatchError> {
        if batch.is_empty() {
            return Err(DispatchError::EmptyBatch);
        }
        let count = batch.len();
        let body = self.kind.encode(&batch);
        drop(batch);

        let mut request = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .body(body);
        if let Credentials::Basic { username, password } = &self.credentials {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Status { status, body });
        }
        Ok(count)
    }

    /// Sends `batch` on a tracked background task. Failures are logged and counted, never
    /// returned to the caller.
    pub fn spawn_dispatch(&self, batch: Batch) {
        if batch.is_empty() {
            return;
        }
        let dispatcher = self.clone();
        self.tracker.spawn(async move {
            let count = batch.len();
            let bytes = batch.size_bytes();
            match dispatcher.dispatch(batch).await {
                Ok(sent) => {
                    dispatcher.stats.record_sent(sent as u64);
                    debug!(
                        "SINK | Sent {} records / {} bytes to {}",
                        sent, bytes, dispatcher.url
                    );
                }
                Err(e) => {
                    dispatcher.stats.record_failed_batch(count as u64);
                    error!(
                        "SINK | Dropped batch of {} records for {}: {}",
                        count, dispatcher.url, e
                    );
                }
            }
        });
    }
}
