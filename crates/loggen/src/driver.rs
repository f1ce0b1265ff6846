// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Run orchestration.
//!
//! The driver wires the collaborators together and runs one of two schedules:
//!
//! - **Rounds** (search-engine sink): every `flush_interval`, the lump quota for the interval
//!   is split across one worker per template group; the round ends when every worker is
//!   done and the driver sleeps for the rest of the interval.
//! - **Minutes** (broker sink): every minute, one ticked worker per topic spends
//!   `logs_per_min` records. A minute's workers are joined before the next minute starts.
//!
//! Either schedule stops after `rounds` iterations, or on cancellation. The driver then
//! waits (bounded) for in-flight dispatches before reporting the final counters.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use derive_more::Display;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::{load_config, Config};
use crate::constants::{BROKER_WINDOW, DRAIN_GRACE_PERIOD};
use crate::credentials::resolve_sink_credentials;
use crate::endpoint::{Credentials, SinkEndpoint};
use crate::errors::{CredentialsError, StartupError, TemplateError};
use crate::file_writer::FileWriter;
use crate::pacer::{split_quota, Pacer, PacingPlan};
use crate::sink::dispatcher::Dispatcher;
use crate::sink::{build_client, SinkKind};
use crate::stats::{DeliverySnapshot, DeliveryStats};
use crate::synthesizer::{IndexCounter, Synthesizer};
use crate::templates::{load_templates, TemplateGroup};
use crate::worker::{worker_rng, FileFormat, Worker, WorkerContext, WorkerReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DriverState {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// A delivery target: index (search engine) or topic (broker), and its dispatcher when the
/// sink is enabled.
#[derive(Debug, Clone)]
struct Target {
    name: String,
    dispatcher: Option<Dispatcher>,
}

#[derive(Debug)]
pub struct PipelineDriver {
    config: Config,
    groups: Vec<Arc<TemplateGroup>>,
    targets: Vec<Target>,
    context: Arc<WorkerContext>,
    stats: Arc<DeliveryStats>,
    tracker: TaskTracker,
    state: DriverState,
}

/// Resolves where batches go. `None` when sink sending is off.
pub fn resolve_endpoint(config: &Config) -> Result<Option<SinkEndpoint>, CredentialsError> {
    if !config.sink_send {
        return Ok(None);
    }
    let endpoint = match config.sink {
        SinkKind::Elasticsearch => resolve_sink_credentials(
            config.es_key.as_deref().unwrap_or_default(),
            config.decryption_key().as_bytes(),
            &config.project_name,
        )?,
        SinkKind::Kafka => SinkEndpoint::from_url(
            config.kafka_rest_url.as_deref().unwrap_or_default(),
            Credentials::bearer(config.auth_token.as_deref()),
            config.kafka_topics.first().cloned().unwrap_or_default(),
        )?,
    };
    Ok(Some(endpoint))
}

impl PipelineDriver {
    /// Loads config, templates and credentials. Any failure aborts before a worker starts.
    pub fn bootstrap<P: AsRef<Path>>(
        config_path: impl AsRef<Path>,
        template_paths: &[P],
    ) -> Result<Self, StartupError> {
        let config = load_config(config_path)?;
        let groups = load_templates(template_paths)?;
        let endpoint = resolve_endpoint(&config)?;
        Self::new(config, groups, endpoint)
    }

    /// Builds a driver from already loaded parts. `endpoint` is ignored when sink sending is
    /// off; for the broker sink its target is replaced by each configured topic.
    pub fn new(
        config: Config,
        groups: Vec<TemplateGroup>,
        endpoint: Option<SinkEndpoint>,
    ) -> Result<Self, StartupError> {
        if groups.is_empty() || groups.iter().all(TemplateGroup::is_empty) {
            return Err(TemplateError::Empty(groups.len()).into());
        }
        let time_format = config.time_layout()?;

        let stats = Arc::new(DeliveryStats::default());
        let tracker = TaskTracker::new();
        let endpoint = endpoint.filter(|_| config.sink_send);
        let client = match endpoint {
            Some(_) => Some(build_client(config.http_timeout(), config.tls_skip_verify)?),
            None => None,
        };
        let dispatcher_for = |endpoint: &SinkEndpoint| match &client {
            Some(client) => Dispatcher::new(
                client.clone(),
                config.sink,
                endpoint,
                Arc::clone(&stats),
                tracker.clone(),
            )
            .map(Some),
            None => Ok(None),
        };

        let (groups, targets) = match config.sink {
            SinkKind::Elasticsearch => {
                let target = match &endpoint {
                    Some(endpoint) => Target {
                        name: endpoint.target.clone(),
                        dispatcher: dispatcher_for(endpoint)?,
                    },
                    None => Target {
                        name: String::new(),
                        dispatcher: None,
                    },
                };
                let groups = groups
                    .into_iter()
                    .filter(|group| !group.is_empty())
                    .map(Arc::new)
                    .collect();
                (groups, vec![target])
            }
            SinkKind::Kafka => {
                let mut targets = Vec::with_capacity(config.kafka_topics.len());
                for topic in &config.kafka_topics {
                    let dispatcher = match &endpoint {
                        Some(endpoint) => dispatcher_for(&endpoint.with_target(topic))?,
                        None => None,
                    };
                    targets.push(Target {
                        name: topic.clone(),
                        dispatcher,
                    });
                }
                (vec![Arc::new(TemplateGroup::merge(&groups))], targets)
            }
        };

        let file = config.file_write.then(|| {
            (
                Arc::new(FileWriter::new(config.log_file(), config.rotation_policy())),
                FileFormat::for_sink(config.sink),
            )
        });
        let context = Arc::new(WorkerContext {
            synthesizer: Synthesizer::from_config(
                &config,
                time_format,
                Arc::new(IndexCounter::default()),
            ),
            limits: config.batch_limits(),
            file,
            stats: Arc::clone(&stats),
        });

        Ok(PipelineDriver {
            config,
            groups,
            targets,
            context,
            stats,
            tracker,
            state: DriverState::Idle,
        })
    }

    #[must_use]
    pub fn state(&self) -> DriverState {
        self.state
    }

    #[must_use]
    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }

    /// Runs until the configured rounds are spent or `cancel` fires, then drains.
    pub async fn run(&mut self, cancel: CancellationToken) -> DeliverySnapshot {
        self.state = DriverState::Running;
        info!(
            "Generating {} logs/min for {} with flush interval {}s across {} template group(s)",
            self.config.logs_per_min,
            self.config.sink,
            self.config.flush_interval,
            self.groups.len()
        );
        if !self.config.sink_send {
            info!("Sink sending is disabled");
        }

        match self.config.sink {
            SinkKind::Elasticsearch => self.run_rounds(&cancel).await,
            SinkKind::Kafka => self.run_minutes(&cancel).await,
        }

        self.state = DriverState::Draining;
        self.drain().await;
        self.state = DriverState::Stopped;

        let snapshot = self.stats.snapshot();
        info!("Run finished: {}", snapshot);
        snapshot
    }

    async fn run_rounds(&self, cancel: &CancellationToken) {
        let interval = self.config.flush_interval_duration();
        let pacer = Pacer::new(self.config.logs_per_min, interval);
        let dispatcher = self.targets.first().and_then(|t| t.dispatcher.clone());

        let mut round = 0u64;
        while !cancel.is_cancelled() && !self.rounds_done(round) {
            let started = Instant::now();
            let shares = split_quota(pacer.lump_plan().total(), self.groups.len());

            let mut workers = JoinSet::new();
            for (id, (group, share)) in self.groups.iter().zip(shares).enumerate() {
                let worker = Worker::new(
                    id,
                    group.source(),
                    Arc::clone(group),
                    dispatcher.clone(),
                    Arc::clone(&self.context),
                    worker_rng(self.config.seed, round, id),
                );
                workers.spawn(worker.run(PacingPlan::Lump { records: share }, cancel.clone()));
            }
            let generated = join_workers(workers).await;
            round += 1;

            let elapsed = started.elapsed();
            let remaining = interval.saturating_sub(elapsed);
            info!(
                "Round {}: generated {} logs in {:.3}s, sleeping for {:.3}s",
                round,
                generated,
                elapsed.as_secs_f64(),
                remaining.as_secs_f64()
            );
            if self.rounds_done(round) || !pause(remaining, cancel).await {
                break;
            }
        }
    }

    async fn run_minutes(&self, cancel: &CancellationToken) {
        let pacer = Pacer::new(
            self.config.logs_per_min,
            self.config.flush_interval_duration(),
        );
        let Some(group) = self.groups.first() else {
            return;
        };

        let mut minute = 0u64;
        while !cancel.is_cancelled() && !self.rounds_done(minute) {
            let started = Instant::now();

            let mut workers = JoinSet::new();
            for (id, target) in self.targets.iter().enumerate() {
                let worker = Worker::new(
                    id,
                    target.name.clone(),
                    Arc::clone(group),
                    target.dispatcher.clone(),
                    Arc::clone(&self.context),
                    worker_rng(self.config.seed, minute, id),
                );
                workers.spawn(worker.run(pacer.ticked_plan(), cancel.clone()));
            }
            let generated = join_workers(workers).await;
            minute += 1;

            let elapsed = started.elapsed();
            let remaining = BROKER_WINDOW.saturating_sub(elapsed);
            info!(
                "Minute {}: generated {} logs across {} topic(s) in {:.3}s",
                minute,
                generated,
                self.targets.len(),
                elapsed.as_secs_f64()
            );
            if self.rounds_done(minute) || !pause(remaining, cancel).await {
                break;
            }
        }
    }

    fn rounds_done(&self, completed: u64) -> bool {
        self.config.rounds.is_some_and(|rounds| completed >= rounds)
    }

    async fn drain(&self) {
        self.tracker.close();
        if self.tracker.is_empty() {
            return;
        }
        debug!("Waiting for {} in-flight dispatches", self.tracker.len());
        if timeout(DRAIN_GRACE_PERIOD, self.tracker.wait()).await.is_err() {
            warn!(
                "Gave up on {} in-flight dispatches after {}s",
                self.tracker.len(),
                DRAIN_GRACE_PERIOD.as_secs()
            );
        }
    }
}

async fn join_workers(mut workers: JoinSet<WorkerReport>) -> u64 {
    let mut generated = 0;
    while let Some(result) = workers.join_next().await {
        match result {
            Ok(report) => generated += report.synthesized,
            Err(e) => error!("Worker task failed: {}", e),
        }
    }
    generated
}

/// Sleeps for `duration` unless cancelled first. Returns `false` on cancellation.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = sleep(duration) => true,
    }
}
