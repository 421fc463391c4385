//! Pipeline executor: one synchronous tick at a time.
//!
//! Each tick:
//! 1. Demux raw bytes into the reused [`DemuxedBatch`].
//! 2. Validate the batch before any state is touched.
//! 3. Carry previous values over and count ingress lengths.
//! 4. Map every stage (BeforeMap seam, built-ins, AfterMap seam).
//! 5. AoS→SoA conversion into the columnar buffers.
//! 6. Execute every stage in the same order.
//! 7. Notify observers.
//!
//! A failure anywhere discards the tick in full: no partially written
//! output is visible and the next tick starts from the last good one.

use crate::config::{ExecutionSettings, PipelineConfig};
use crate::dataset::Dataset;
use crate::error::{Result, ResultExt};
use crate::pipeline::compiled_plan::CompiledPlan;
use crate::pipeline::compiler::PipelineCompiler;
use crate::pipeline::demux::{Demuxer, RecordDemuxer};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::StageId;
use crate::pipeline::sample::DemuxedBatch;
use crate::pipeline::stage::{AnyStage, PipelineStage, Seam, TickObserver};
use crate::scripting::ScriptEngine;
use std::time::Instant;

/// Per-tick counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub tick: u64,
    pub samples: usize,
    pub opaque_samples: usize,
    pub timestamps: usize,
    pub values: usize,
    pub opaque_bytes: usize,
    pub elapsed_us: u64,
}

/// Builder for [`IngressPipeline`].
pub struct IngressPipelineBuilder {
    config: PipelineConfig,
    demuxer: Option<Box<dyn Demuxer>>,
    before_map: Vec<Box<dyn PipelineStage>>,
    after_map: Vec<Box<dyn PipelineStage>>,
    observers: Vec<Box<dyn TickObserver>>,
}

impl IngressPipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            demuxer: None,
            before_map: Vec::new(),
            after_map: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Raw byte decoder. Defaults to [`RecordDemuxer`].
    pub fn demuxer(mut self, demuxer: Box<dyn Demuxer>) -> Self {
        self.demuxer = Some(demuxer);
        self
    }

    /// Add an external stage at `seam`. Stages at one seam run in the
    /// order they were added.
    pub fn stage(mut self, seam: Seam, stage: Box<dyn PipelineStage>) -> Self {
        match seam {
            Seam::BeforeMap => self.before_map.push(stage),
            Seam::AfterMap => self.after_map.push(stage),
        }
        self
    }

    pub fn observer(mut self, observer: Box<dyn TickObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Compile scripts and the stage plan, then allocate the dataset.
    pub fn build(self) -> Result<IngressPipeline> {
        let mut config = self.config;

        let engine = ScriptEngine::new();
        let scripts = config
            .stages
            .compile_scripts(&engine)
            .context("Failed to compile stage scripts")?;

        let plan = PipelineCompiler::compile(&config.axes, std::mem::take(&mut config.stages))
            .context("Invalid stage plan")?;
        let dataset =
            Dataset::new(&config.axes, &config.limits).context("Invalid axis layout")?;

        let mut stages = Vec::with_capacity(
            self.before_map.len() + plan.len() + self.after_map.len(),
        );
        stages.extend(self.before_map.into_iter().map(AnyStage::External));
        stages.extend(plan.stages.iter().cloned().map(AnyStage::Builtin));
        stages.extend(self.after_map.into_iter().map(AnyStage::External));

        tracing::info!(
            "Pipeline '{}' built: {} built-in stages ({} scripted), {} external, {} observers, compiled in {}us",
            config.name,
            plan.stats.total_stages,
            scripts,
            stages.len() - plan.stats.total_stages,
            self.observers.len(),
            plan.stats.compile_time_us
        );

        Ok(IngressPipeline {
            name: config.name,
            settings: config.execution,
            dataset,
            plan,
            stages,
            demuxer: self
                .demuxer
                .unwrap_or_else(|| Box::new(RecordDemuxer::new())),
            observers: self.observers,
            batch: DemuxedBatch::new(),
            tick: 0,
            output_valid: true,
        })
    }
}

/// The ingress dataflow engine.
pub struct IngressPipeline {
    name: String,
    settings: ExecutionSettings,
    dataset: Dataset,
    plan: CompiledPlan,
    /// External and built-in stages in Map/Execute order
    stages: Vec<AnyStage>,
    demuxer: Box<dyn Demuxer>,
    observers: Vec<Box<dyn TickObserver>>,
    /// Reused across ticks
    batch: DemuxedBatch,
    tick: u64,
    output_valid: bool,
}

impl std::fmt::Debug for IngressPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngressPipeline")
            .field("name", &self.name)
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}

impl IngressPipeline {
    /// Build with the default demuxer and no external stages.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        IngressPipelineBuilder::new(config).build()
    }

    /// Run one tick over raw device bytes.
    pub fn run_tick(&mut self, raw: &[u8]) -> PipelineResult<TickStats> {
        self.tick += 1;
        let started = Instant::now();

        let mut batch = std::mem::take(&mut self.batch);
        batch.clear();
        let result = match self.demuxer.demux(raw, &mut batch) {
            Ok(()) => self.process(&batch, started),
            Err(e) => Err(self.reject(e)),
        };
        self.batch = batch;
        result
    }

    /// Run one tick over an already demuxed batch.
    pub fn run_batch(&mut self, batch: &DemuxedBatch) -> PipelineResult<TickStats> {
        self.tick += 1;
        self.process(batch, Instant::now())
    }

    fn process(&mut self, batch: &DemuxedBatch, started: Instant) -> PipelineResult<TickStats> {
        if let Err(e) = self.try_process(batch) {
            return Err(self.reject(e));
        }
        self.dataset.commit_tick();
        self.output_valid = true;

        for observer in &mut self.observers {
            observer.on_tick(self.tick, &self.dataset);
        }

        let stats = TickStats {
            tick: self.tick,
            samples: batch.samples.len(),
            opaque_samples: batch.opaque.len(),
            timestamps: self.dataset.total_timestamps(),
            values: self.dataset.total_values(),
            opaque_bytes: self.dataset.total_opaque_bytes(),
            elapsed_us: started.elapsed().as_micros() as u64,
        };

        tracing::debug!(
            "Tick {}: {} samples, {} opaque, {} timestamps, {} values in {}us",
            stats.tick,
            stats.samples,
            stats.opaque_samples,
            stats.timestamps,
            stats.values,
            stats.elapsed_us
        );
        Ok(stats)
    }

    fn try_process(&mut self, batch: &DemuxedBatch) -> PipelineResult<()> {
        self.dataset
            .validate_batch(batch, self.settings.validate_timestamp_order)?;
        self.dataset.calculate_ingress_lengths(batch);

        {
            let mut proxy = self.dataset.proxy();
            for stage in &self.stages {
                stage.map(&mut proxy.reborrow());
            }
        }

        self.dataset.aos_to_soa(batch)?;

        let mut proxy = self.dataset.proxy();
        for (i, stage) in self.stages.iter().enumerate() {
            stage
                .execute(&mut proxy.reborrow(), &self.settings)
                .map_err(|e| PipelineError::Stage {
                    stage_id: StageId(i as u32),
                    name: stage.name().to_string(),
                    message: e.to_string(),
                })?;
            tracing::trace!("Tick {}: executed {} ({})", self.tick, i, stage.name());
        }
        Ok(())
    }

    fn reject(&mut self, err: PipelineError) -> PipelineError {
        self.dataset.discard_tick();
        self.output_valid = false;
        tracing::warn!("Pipeline '{}' rejected tick {}: {}", self.name, self.tick, err);
        err
    }

    /// Dataset of the last tick, or `TickRejected` if it was discarded.
    pub fn output(&self) -> PipelineResult<&Dataset> {
        if self.output_valid {
            Ok(&self.dataset)
        } else {
            Err(PipelineError::TickRejected(self.tick))
        }
    }

    /// Dataset regardless of the last tick's outcome.
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Number of ticks run so far, rejected ones included.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn plan(&self) -> &CompiledPlan {
        &self.plan
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages in execution order.
    pub fn stages(&self) -> &[AnyStage] {
        &self.stages
    }
}
