//! Benchmarks for one pipeline tick
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use inputflow::config::{AxisLayout, PipelineConfig};
use inputflow::dataset::{StepFunction1D, StepFunction2D};
use inputflow::pipeline::stages::{Accumulate1D, Processor1D, Two1DsTo2D, Vec2ToMagnitude};
use inputflow::pipeline::{encode_value_record, DemuxedBatch, IngressPipeline, ValueAxisId};

/// Stick composed from two controls, shaped, plus an accumulated wheel.
fn gamepad(script: bool) -> (PipelineConfig, [ValueAxisId; 3]) {
    let mut layout = AxisLayout::new();
    let tx = layout.add_timestamp_axis();
    let ty = layout.add_timestamp_axis();
    let tc = layout.add_timestamp_axis();
    let tw = layout.add_timestamp_axis();
    let tp = layout.add_timestamp_axis();

    let x = layout.add_ingress_value(tx);
    let y = layout.add_ingress_value(ty);
    let cx = layout.add_derived_value(tc);
    let cy = layout.add_derived_value(tc);
    let magnitude = layout.add_derived_value(tc);
    let shaped = layout.add_derived_value(tx);
    let wheel = layout.add_ingress_value(tw);
    let position = layout.add_derived_value(tp);

    let mut config = PipelineConfig::new(layout);
    let stages = &mut config.stages;
    stages.two_1ds_to_2d.push(Two1DsTo2D::new(
        StepFunction1D::new(x),
        StepFunction1D::new(y),
        StepFunction2D::new(cx, cy),
    ));
    stages.vec2_to_magnitude.push(Vec2ToMagnitude::new(
        StepFunction2D::new(cx, cy),
        StepFunction1D::new(magnitude),
    ));

    let mut shaper = Processor1D::new(StepFunction1D::new(x), StepFunction1D::new(shaped))
        .with_deadzone(0.05, 1.0)
        .with_clamp(-1.0, 1.0);
    if script {
        shaper = shaper.with_curve(inputflow::pipeline::stages::Curve::Script {
            source: "expo(value, 0.5)".to_string(),
        });
    }
    stages.processor_1d.push(shaper);
    stages.accumulate_1d.push(Accumulate1D::new(
        StepFunction1D::new(wheel),
        StepFunction1D::new(position),
    ));

    (config, [x, y, wheel])
}

fn tick_batch(axes: [ValueAxisId; 3], per_axis: usize) -> DemuxedBatch {
    let mut batch = DemuxedBatch::new();
    for (a, axis) in axes.iter().enumerate() {
        for i in 0..per_axis {
            let ts = (i * 3 + a) as u64 * 1_000;
            batch.push_value(ts, *axis, ((i % 200) as f32 / 100.0) - 1.0);
        }
    }
    batch
}

fn bench_run_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_batch");

    for per_axis in [8, 256, 8192].iter() {
        let (config, axes) = gamepad(false);
        let mut pipeline = IngressPipeline::new(config).expect("pipeline");
        let batch = tick_batch(axes, *per_axis);

        group.throughput(Throughput::Elements((per_axis * 3) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(per_axis), per_axis, |b, _| {
            b.iter(|| {
                pipeline.run_batch(black_box(&batch)).expect("tick");
            });
        });
    }

    group.finish();
}

fn bench_script_curve(c: &mut Criterion) {
    let mut group = c.benchmark_group("script_curve");

    for per_axis in [8, 256].iter() {
        let (config, axes) = gamepad(true);
        let mut pipeline = IngressPipeline::new(config).expect("pipeline");
        let batch = tick_batch(axes, *per_axis);

        group.throughput(Throughput::Elements(*per_axis as u64));
        group.bench_with_input(BenchmarkId::from_parameter(per_axis), per_axis, |b, _| {
            b.iter(|| {
                pipeline.run_batch(black_box(&batch)).expect("tick");
            });
        });
    }

    group.finish();
}

fn bench_demux(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_tick_with_demux");

    let (config, axes) = gamepad(false);
    let mut pipeline = IngressPipeline::new(config).expect("pipeline");
    let mut raw = Vec::new();
    for i in 0..256u64 {
        for (a, axis) in axes.iter().enumerate() {
            encode_value_record(&mut raw, *axis, i * 3 + a as u64, 0.25);
        }
    }

    group.throughput(Throughput::Bytes(raw.len() as u64));
    group.bench_function("256_per_axis", |b| {
        b.iter(|| {
            pipeline.run_tick(black_box(&raw)).expect("tick");
        });
    });

    group.finish();
}

criterion_group!(benches, bench_run_batch, bench_script_curve, bench_demux);
criterion_main!(benches);
