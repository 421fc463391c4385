//! Integration tests for tick execution: merge shapes, carry-over, failure
//! discard, capacity limits, build-time checks and external stages at the
//! seams.

mod common;

use common::builders::{BatchBuilder, LayoutBuilder};
use common::{previous, timestamps, values};
use inputflow::dataset::{
    DatasetProxy, StepFunction1D, StepFunction2D, StepFunction3D, StepFunctionOpaque,
};
use inputflow::pipeline::stages::{MaxValue1D, Processor1D, Two1DsTo2D};
use inputflow::pipeline::{
    IngressPipeline, IngressPipelineBuilder, PipelineError, PipelineResult, PipelineStage, Seam,
    ValueAxisId,
};
use inputflow::PipelineConfig;

/// A (ts0, 3 samples) and B (ts1, quiet, previous 5) merged into C (ts2).
struct MergeFixture {
    config: PipelineConfig,
    a: ValueAxisId,
    b: ValueAxisId,
    cx: ValueAxisId,
    cy: ValueAxisId,
}

fn merge_fixture() -> MergeFixture {
    let mut layout = LayoutBuilder::new();
    let t0 = layout.timestamp();
    let t1 = layout.timestamp();
    let t2 = layout.timestamp();
    let a = layout.ingress("a", t0);
    let b = layout.ingress("b", t1);
    layout.previous(b, 5.0);
    let cx = layout.derived("c.x", t2);
    let cy = layout.derived("c.y", t2);

    let mut config = PipelineConfig::new(layout.build());
    config.stages.two_1ds_to_2d.push(Two1DsTo2D::new(
        StepFunction1D::new(a),
        StepFunction1D::new(b),
        StepFunction2D::new(cx, cy),
    ));
    MergeFixture {
        config,
        a,
        b,
        cx,
        cy,
    }
}

#[test]
fn test_merge_with_quiet_source() {
    let f = merge_fixture();
    let mut pipeline = IngressPipeline::new(f.config).unwrap();

    let batch = BatchBuilder::new()
        .series(f.a, &[(10, 1.0), (20, 2.0), (30, 3.0)])
        .build();
    pipeline.run_batch(&batch).unwrap();
    let out = pipeline.output().unwrap();

    // 3 + 0 samples
    assert_eq!(timestamps(out, f.cx), vec![10, 20, 30]);
    assert_eq!(values(out, f.cx), vec![1.0, 2.0, 3.0]);
    // The quiet source stays available through its previous value.
    assert_eq!(values(out, f.cy), vec![5.0, 5.0, 5.0]);
    assert_eq!(previous(out, f.b), 5.0);
    assert!(values(out, f.b).is_empty());
}

#[test]
fn test_merge_lengths_add() {
    let f = merge_fixture();
    let mut pipeline = IngressPipeline::new(f.config).unwrap();

    let batch = BatchBuilder::new()
        .series(f.a, &[(10, 1.0), (30, 3.0)])
        .series(f.b, &[(20, -1.0)])
        .build();
    pipeline.run_batch(&batch).unwrap();
    let out = pipeline.output().unwrap();

    assert_eq!(timestamps(out, f.cx), vec![10, 20, 30]);
    assert_eq!(values(out, f.cx), vec![1.0, 1.0, 3.0]);
    assert_eq!(values(out, f.cy), vec![5.0, -1.0, -1.0]);
}

#[test]
fn test_previous_values_carry_across_ticks() {
    let f = merge_fixture();
    let mut pipeline = IngressPipeline::new(f.config).unwrap();

    pipeline
        .run_batch(&BatchBuilder::new().value(10, f.a, 4.0).build())
        .unwrap();
    for _ in 0..3 {
        pipeline.run_batch(&BatchBuilder::new().build()).unwrap();
        let out = pipeline.output().unwrap();
        assert_eq!(previous(out, f.a), 4.0);
        assert_eq!(previous(out, f.cx), 4.0);
        assert_eq!(previous(out, f.cy), 5.0);
    }

    // Only B moves: the output pairs it with A's carried value.
    pipeline
        .run_batch(&BatchBuilder::new().value(50, f.b, 2.0).build())
        .unwrap();
    let out = pipeline.output().unwrap();
    assert_eq!(values(out, f.cx), vec![4.0]);
    assert_eq!(values(out, f.cy), vec![2.0]);
}

#[test]
fn test_malformed_sample_discards_tick() {
    let f = merge_fixture();
    let mut pipeline = IngressPipeline::new(f.config).unwrap();

    pipeline
        .run_batch(&BatchBuilder::new().value(10, f.a, 1.0).build())
        .unwrap();

    // Derived axes cannot receive samples.
    let err = pipeline
        .run_batch(&BatchBuilder::new().value(20, f.a, 9.0).value(20, f.cx, 9.0).build())
        .unwrap_err();
    assert!(matches!(err, PipelineError::MalformedSample { index: 1, .. }));
    assert!(matches!(pipeline.output(), Err(PipelineError::TickRejected(2))));

    pipeline.run_batch(&BatchBuilder::new().build()).unwrap();
    let out = pipeline.output().unwrap();
    assert_eq!(previous(out, f.a), 1.0);
    assert_eq!(previous(out, f.cx), 1.0);
}

#[test]
fn test_out_of_order_timestamps_rejected() {
    let f = merge_fixture();
    let mut pipeline = IngressPipeline::new(f.config).unwrap();

    let err = pipeline
        .run_batch(&BatchBuilder::new().series(f.a, &[(20, 1.0), (10, 2.0)]).build())
        .unwrap_err();
    assert!(matches!(err, PipelineError::MalformedSample { .. }));
}

#[test]
fn test_out_of_order_allowed_when_unchecked() {
    let mut f = merge_fixture();
    f.config.execution.validate_timestamp_order = false;
    let mut pipeline = IngressPipeline::new(f.config).unwrap();

    pipeline
        .run_batch(&BatchBuilder::new().series(f.a, &[(20, 1.0), (10, 2.0)]).build())
        .unwrap();
    assert_eq!(timestamps(pipeline.output().unwrap(), f.a), vec![20, 10]);
}

#[test]
fn test_capacity_limit_rejects_without_truncating() {
    let mut layout = LayoutBuilder::new();
    let t0 = layout.timestamp();
    let raw = layout.ingress("raw", t0);
    let scaled = layout.derived("scaled", t0);
    let mut config = PipelineConfig::new(layout.build());
    config.stages.processor_1d.push(
        Processor1D::new(StepFunction1D::new(raw), StepFunction1D::new(scaled))
            .with_scale_offset(10.0, 0.0),
    );
    config.limits.max_values = 3;
    let mut pipeline = IngressPipeline::new(config).unwrap();

    // Two samples need four value slots.
    let err = pipeline
        .run_batch(&BatchBuilder::new().series(raw, &[(1, 1.0), (2, 2.0)]).build())
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Capacity {
            buffer: "values",
            requested: 4,
            limit: 3
        }
    ));
    assert!(pipeline.output().is_err());

    pipeline
        .run_batch(&BatchBuilder::new().value(3, raw, 0.5).build())
        .unwrap();
    assert_eq!(values(pipeline.output().unwrap(), scaled), vec![5.0]);
}

#[test]
fn test_max_value_picks_larger_latest() {
    let mut layout = LayoutBuilder::new();
    let t0 = layout.timestamp();
    let t1 = layout.timestamp();
    let t2 = layout.timestamp();
    let left = layout.ingress("left", t0);
    let right = layout.ingress("right", t1);
    let out = layout.derived("out", t2);
    let mut config = PipelineConfig::new(layout.build());
    config.stages.max_value_1d.push(MaxValue1D::new(
        StepFunction1D::new(left),
        StepFunction1D::new(right),
        StepFunction1D::new(out),
    ));
    let mut pipeline = IngressPipeline::new(config).unwrap();

    let batch = BatchBuilder::new()
        .series(left, &[(1, 0.2), (3, 0.9)])
        .series(right, &[(2, 0.5)])
        .build();
    pipeline.run_batch(&batch).unwrap();
    let dataset = pipeline.output().unwrap();
    assert_eq!(timestamps(dataset, out), vec![1, 2, 3]);
    assert_eq!(values(dataset, out), vec![0.2, 0.5, 0.9]);
}

#[test]
fn test_inverted_clamp_rejected_at_build() {
    let mut layout = LayoutBuilder::new();
    let t0 = layout.timestamp();
    let raw = layout.ingress("raw", t0);
    let out = layout.derived("out", t0);
    let mut config = PipelineConfig::new(layout.build());
    config.stages.processor_1d.push(
        Processor1D::new(StepFunction1D::new(raw), StepFunction1D::new(out)).with_clamp(1.0, -1.0),
    );

    let err = IngressPipeline::new(config).unwrap_err();
    match err.pipeline_error() {
        Some(PipelineError::Config(message)) => assert!(message.contains("clamp")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_nan_deadzone_rejected_at_build() {
    let mut layout = LayoutBuilder::new();
    let t0 = layout.timestamp();
    let raw = layout.ingress("raw", t0);
    let out = layout.derived("out", t0);
    let mut config = PipelineConfig::new(layout.build());
    config.stages.processor_1d.push(
        Processor1D::new(StepFunction1D::new(raw), StepFunction1D::new(out))
            .with_deadzone(f32::NAN, 1.0),
    );

    let err = IngressPipeline::new(config).unwrap_err();
    assert!(matches!(err.pipeline_error(), Some(PipelineError::Config(_))));
}

#[test]
fn test_unproduced_derived_axis_follows_ingress_length() {
    let mut layout = LayoutBuilder::new();
    let t0 = layout.timestamp();
    let raw = layout.ingress("raw", t0);
    let spare = layout.derived("spare", t0);
    let mut pipeline = IngressPipeline::new(PipelineConfig::new(layout.build())).unwrap();
    assert_eq!(pipeline.plan().stats.unproduced_axes, 1);

    pipeline
        .run_batch(&BatchBuilder::new().series(raw, &[(1, 0.5), (2, 0.75)]).build())
        .unwrap();
    let out = pipeline.output().unwrap();
    assert_eq!(out.length(StepFunction1D::new(spare)), 2);
    assert_eq!(timestamps(out, spare), vec![1, 2]);
}

// ==================== Seams ====================

/// External stage: `dst = src * factor`, same timeline.
struct Scale {
    src: StepFunction1D,
    dst: StepFunction1D,
    factor: f32,
}

impl PipelineStage for Scale {
    fn name(&self) -> &str {
        "Scale"
    }

    fn map(&self, proxy: &mut DatasetProxy<'_>) {
        proxy.map_n_to_n(self.src, self.dst);
    }

    fn execute(&self, proxy: &mut DatasetProxy<'_>) -> PipelineResult<()> {
        let [src, dst] = proxy.split_values([self.src.x, self.dst.x])?;
        for (d, s) in dst.iter_mut().zip(src.iter()) {
            *d = *s * self.factor;
        }
        Ok(())
    }
}

/// External stage that rejects any sample above a threshold.
struct Guard {
    src: StepFunction1D,
    limit: f32,
}

impl PipelineStage for Guard {
    fn name(&self) -> &str {
        "Guard"
    }

    fn map(&self, _proxy: &mut DatasetProxy<'_>) {}

    fn execute(&self, proxy: &mut DatasetProxy<'_>) -> PipelineResult<()> {
        let [src] = proxy.split_values([self.src.x])?;
        match src.iter().position(|v| *v > self.limit) {
            Some(index) => Err(PipelineError::MalformedSample {
                index,
                message: format!("{} exceeds {}", src[index], self.limit),
            }),
            None => Ok(()),
        }
    }
}

/// raw → (builtin ×2) → doubled → (AfterMap ×10) → scaled
fn seam_pipeline() -> (IngressPipelineBuilder, ValueAxisId, ValueAxisId, ValueAxisId) {
    let mut layout = LayoutBuilder::new();
    let t0 = layout.timestamp();
    let raw = layout.ingress("raw", t0);
    let doubled = layout.derived("doubled", t0);
    let scaled = layout.derived("scaled", t0);
    let mut config = PipelineConfig::new(layout.build());
    config.stages.processor_1d.push(
        Processor1D::new(StepFunction1D::new(raw), StepFunction1D::new(doubled))
            .with_scale_offset(2.0, 0.0),
    );

    let builder = IngressPipelineBuilder::new(config).stage(
        Seam::AfterMap,
        Box::new(Scale {
            src: StepFunction1D::new(doubled),
            dst: StepFunction1D::new(scaled),
            factor: 10.0,
        }),
    );
    (builder, raw, doubled, scaled)
}

#[test]
fn test_after_map_stage_reads_builtin_output() {
    let (builder, raw, doubled, scaled) = seam_pipeline();
    let mut pipeline = builder.build().unwrap();

    pipeline
        .run_batch(&BatchBuilder::new().series(raw, &[(1, 0.5), (2, 1.5)]).build())
        .unwrap();
    let out = pipeline.output().unwrap();
    assert_eq!(values(out, doubled), vec![1.0, 3.0]);
    assert_eq!(values(out, scaled), vec![10.0, 30.0]);
    assert_eq!(timestamps(out, scaled), vec![1, 2]);
}

#[test]
fn test_before_map_failure_discards_whole_tick() {
    let (builder, raw, doubled, scaled) = seam_pipeline();
    let mut pipeline = builder
        .stage(
            Seam::BeforeMap,
            Box::new(Guard {
                src: StepFunction1D::new(raw),
                limit: 100.0,
            }),
        )
        .build()
        .unwrap();

    pipeline
        .run_batch(&BatchBuilder::new().value(1, raw, 1.0).build())
        .unwrap();

    let err = pipeline
        .run_batch(&BatchBuilder::new().series(raw, &[(2, 2.0), (3, 500.0)]).build())
        .unwrap_err();
    match err {
        PipelineError::Stage {
            stage_id,
            name,
            message,
        } => {
            assert_eq!(stage_id.0, 0);
            assert_eq!(name, "Guard");
            assert!(message.contains("500"));
        }
        other => panic!("unexpected error {:?}", other),
    }

    // Nothing from the rejected tick leaks into the carry-over.
    pipeline.run_batch(&BatchBuilder::new().build()).unwrap();
    let out = pipeline.output().unwrap();
    assert_eq!(previous(out, raw), 1.0);
    assert_eq!(previous(out, doubled), 2.0);
    assert_eq!(previous(out, scaled), 20.0);
}

/// External stage lifting a scalar onto a 3D vector `(v, 0, -v)`.
struct Lift {
    src: StepFunction1D,
    dst: StepFunction3D,
}

impl PipelineStage for Lift {
    fn name(&self) -> &str {
        "Lift"
    }

    fn map(&self, proxy: &mut DatasetProxy<'_>) {
        proxy.map_n_to_n(self.src, self.dst);
    }

    fn execute(&self, proxy: &mut DatasetProxy<'_>) -> PipelineResult<()> {
        let src = proxy.values_x(self.src).to_vec();
        proxy.values_x_mut(self.dst).copy_from_slice(&src);
        proxy.values_y_mut(self.dst).fill(0.0);
        for (z, s) in proxy.values_z_mut(self.dst).iter_mut().zip(&src) {
            *z = -s;
        }
        Ok(())
    }
}

#[test]
fn test_after_map_stage_writes_three_channels() {
    let mut layout = LayoutBuilder::new();
    let t0 = layout.timestamp();
    let raw = layout.ingress("raw", t0);
    let lx = layout.derived("lift.x", t0);
    let ly = layout.derived("lift.y", t0);
    let lz = layout.derived("lift.z", t0);
    let lifted = StepFunction3D::new(lx, ly, lz);
    let mut pipeline = IngressPipelineBuilder::new(PipelineConfig::new(layout.build()))
        .stage(
            Seam::AfterMap,
            Box::new(Lift {
                src: StepFunction1D::new(raw),
                dst: lifted,
            }),
        )
        .build()
        .unwrap();

    pipeline
        .run_batch(&BatchBuilder::new().series(raw, &[(1, 0.5), (2, -0.25)]).build())
        .unwrap();
    let out = pipeline.output().unwrap();
    assert_eq!(out.values_x(lifted), &[0.5, -0.25]);
    assert_eq!(out.values_y(lifted), &[0.0, 0.0]);
    assert_eq!(out.values_z(lifted), &[-0.5, 0.25]);
    assert_eq!(out.previous_value_z(lifted), 0.25);
}

/// External stage overwriting every 2-byte opaque record with its index.
struct Stamp {
    blob: StepFunctionOpaque,
    base: u16,
}

impl PipelineStage for Stamp {
    fn name(&self) -> &str {
        "Stamp"
    }

    fn map(&self, _proxy: &mut DatasetProxy<'_>) {}

    fn execute(&self, proxy: &mut DatasetProxy<'_>) -> PipelineResult<()> {
        let records = proxy.length(self.blob);
        for i in 0..records {
            proxy.write_opaque_as(self.blob, i, &(self.base + i as u16));
        }
        Ok(())
    }
}

#[test]
fn test_before_map_stage_rewrites_opaque_records() {
    let mut layout = LayoutBuilder::new();
    let t0 = layout.timestamp();
    let blob = layout.opaque("blob", t0, 2);
    let blob = StepFunctionOpaque::new(blob, 2);
    let mut pipeline = IngressPipelineBuilder::new(PipelineConfig::new(layout.build()))
        .stage(Seam::BeforeMap, Box::new(Stamp { blob, base: 100 }))
        .build()
        .unwrap();

    let batch = BatchBuilder::new()
        .opaque(1, blob.axis, &[0xff, 0xff])
        .opaque(2, blob.axis, &[0xff, 0xff])
        .build();
    pipeline.run_batch(&batch).unwrap();
    let out = pipeline.output().unwrap();
    assert_eq!(out.values_opaque_as::<u16, _>(blob).collect::<Vec<_>>(), vec![100, 101]);
    assert_eq!(out.previous_value_opaque_as::<u16, _>(blob), 101);
}
