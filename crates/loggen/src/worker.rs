// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One generation loop: pace, synthesize, assemble, hand off.
//!
//! A worker owns its RNG and its batch assembler. Everything else it touches (synthesizer,
//! log file, counters) is shared through [`WorkerContext`]. Closed batches are dispatched
//! on tracked tasks and never awaited here. File appends run on the blocking pool and are
//! awaited, so a worker never moves on before its line is on disk.

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::batch::{Batch, BatchAssembler, BatchLimits};
use crate::file_writer::FileWriter;
use crate::pacer::{ticker, PacingPlan, Quota};
use crate::sink::dispatcher::Dispatcher;
use crate::sink::SinkKind;
use crate::stats::DeliveryStats;
use crate::synthesizer::Synthesizer;
use crate::templates::TemplateGroup;

/// Lump workers yield to the runtime this often so dispatch tasks keep moving.
const YIELD_EVERY: u64 = 1_000;

/// What goes into the local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// `<time> <LEVEL> <message>` per record
    Lines,
    /// The sink envelope per closed batch
    Envelope(SinkKind),
}

impl FileFormat {
    #[must_use]
    pub fn for_sink(kind: SinkKind) -> Self {
        match kind {
            SinkKind::Elasticsearch => FileFormat::Lines,
            SinkKind::Kafka => FileFormat::Envelope(kind),
        }
    }
}

/// State shared by every worker of a run.
#[derive(Debug)]
pub struct WorkerContext {
    pub synthesizer: Synthesizer,
    pub limits: BatchLimits,
    pub file: Option<(Arc<FileWriter>, FileFormat)>,
    pub stats: Arc<DeliveryStats>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub synthesized: u64,
    pub batches: u64,
}

#[derive(Debug)]
pub struct Worker {
    id: usize,
    label: String,
    group: Arc<TemplateGroup>,
    dispatcher: Option<Dispatcher>,
    context: Arc<WorkerContext>,
    rng: SmallRng,
    assembler: BatchAssembler,
    report: WorkerReport,
}

impl Worker {
    #[must_use]
    pub fn new(
        id: usize,
        label: impl Into<String>,
        group: Arc<TemplateGroup>,
        dispatcher: Option<Dispatcher>,
        context: Arc<WorkerContext>,
        rng: SmallRng,
    ) -> Self {
        let assembler = BatchAssembler::new(context.limits);
        Worker {
            id,
            label: label.into(),
            group,
            dispatcher,
            context,
            rng,
            assembler,
            report: WorkerReport::default(),
        }
    }

    /// Spends the budget of `plan`, stopping early if `cancel` fires.
    pub async fn run(mut self, plan: PacingPlan, cancel: CancellationToken) -> WorkerReport {
        match plan {
            PacingPlan::Lump { records } => {
                let mut quota = Quota::new(records);
                while !cancel.is_cancelled() && self.produce(&mut quota).await {
                    if self.report.synthesized % YIELD_EVERY == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }
            PacingPlan::Ticked {
                per_tick,
                total,
                period,
            } => {
                let mut total = Quota::new(total);
                let mut ticker = ticker(period);
                while !total.is_exhausted() {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    let mut tick = Quota::new(per_tick.min(total.remaining()));
                    while self.produce(&mut tick).await {
                        total.take_one();
                    }
                }
            }
        }

        if let Some(batch) = self.assembler.flush() {
            self.deliver(batch).await;
        }
        debug!(
            "Worker {} ({}) synthesized {} records in {} batches",
            self.id, self.label, self.report.synthesized, self.report.batches
        );
        self.report
    }

    /// Synthesizes one record against `quota`. Returns `false` once the quota is spent.
    async fn produce(&mut self, quota: &mut Quota) -> bool {
        if !quota.take_one() {
            return false;
        }
        let Some(synthesized) = self
            .context
            .synthesizer
            .synthesize(&self.group, &mut self.rng)
        else {
            return false;
        };
        self.report.synthesized += 1;
        self.context.stats.record_synthesized(1);

        if let Some((writer, FileFormat::Lines)) = &self.context.file {
            write_file(
                writer,
                synthesized.file_line().into_bytes(),
                &self.context.stats,
            )
            .await;
        }

        match synthesized.record.encode() {
            Ok(encoded) => {
                if let Some(batch) = self.assembler.offer(encoded, quota.is_exhausted()) {
                    self.deliver(batch).await;
                }
            }
            Err(e) => {
                self.context.stats.record_dropped(1);
                error!("Failed to encode record from {}: {}", self.label, e);
                if quota.is_exhausted() {
                    if let Some(batch) = self.assembler.flush() {
                        self.deliver(batch).await;
                    }
                }
            }
        }
        true
    }

    async fn deliver(&mut self, batch: Batch) {
        self.report.batches += 1;
        if let Some((writer, FileFormat::Envelope(kind))) = &self.context.file {
            let mut body = kind.encode(&batch);
            body.push(b'\n');
            write_file(writer, body, &self.context.stats).await;
        }
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.spawn_dispatch(batch);
        }
    }
}

async fn write_file(writer: &Arc<FileWriter>, bytes: Vec<u8>, stats: &DeliveryStats) {
    if let Err(e) = Arc::clone(writer).append_on_blocking_pool(bytes).await {
        stats.record_file_write_error();
        error!("FILE | {}", e);
    }
}

/// Independent RNG per worker: derived from `seed` when configured, else from OS entropy.
#[must_use]
pub fn worker_rng(seed: Option<u64>, round: u64, id: usize) -> SmallRng {
    match seed {
        Some(seed) => SmallRng::seed_from_u64(
            seed.wrapping_add(round.wrapping_mul(0x9E37_79B9_7F4A_7C15))
                .wrapping_add(id as u64),
        ),
        None => SmallRng::from_entropy(),
    }
}
