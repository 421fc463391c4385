//! inputflow trace replay
//!
//! Usage: `inputflow <config> <trace.json> [--axis NAME]... [--record OUT.json] [--log-dir DIR]`
//!
//! Builds the pipeline described by `<config>`, replays the trace tick by
//! tick through the record demuxer and prints the selected axes after every
//! tick. Rejected ticks are reported and replay continues.

use anyhow::{Context, Result};
use clap::Parser;
use inputflow::{
    config::PipelineConfig,
    dataset::{Dataset, StepFunction1D},
    pipeline::{IngressPipelineBuilder, ValueAxisId},
    session::{player::resolve_value_any, AxisRef, InputTrace, OutputRecorder, TracePlayer},
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "inputflow")]
#[command(about = "Replay an input trace through an ingress pipeline")]
struct Args {
    /// Pipeline configuration (.toml or .json)
    config: PathBuf,

    /// Input trace (.json)
    trace: PathBuf,

    /// Value axis to print, by name or index (repeatable; default: all)
    #[arg(long = "axis")]
    axes: Vec<String>,

    /// Write the per-tick output of the selected axes to this file
    #[arg(long = "record")]
    record: Option<PathBuf>,

    /// Also log to a daily rolling file in this directory
    #[arg(long = "log-dir")]
    log_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(args.log_dir.as_ref());

    let config = PipelineConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let trace = InputTrace::load_from_file(&args.trace)
        .with_context(|| format!("loading {}", args.trace.display()))?;

    let selection: Vec<AxisRef> = args.axes.iter().map(|a| parse_axis(a)).collect();
    let printed = if selection.is_empty() {
        (0..config.axes.values.len() as u32).map(ValueAxisId).collect()
    } else {
        selection
            .iter()
            .map(|a| resolve_value_any(a, &config.axes))
            .collect::<inputflow::Result<Vec<_>>>()?
    };
    let labels: Vec<String> = printed
        .iter()
        .map(|&id| config.axes.value_axis_label(id))
        .collect();

    let mut player = TracePlayer::new(&trace, &config.axes)?;
    let recorder = OutputRecorder::new(&config.name, &config.axes, &selection)?;
    let recording = recorder.handle();

    let mut builder = IngressPipelineBuilder::new(config);
    if args.record.is_some() {
        builder = builder.observer(Box::new(recorder));
    }
    let mut pipeline = builder.build().context("building pipeline")?;

    let mut rejected = 0usize;
    while let Some(result) = player.step(&mut pipeline) {
        let tick = pipeline.tick();
        match result {
            Ok(_) => {
                let dataset = pipeline.output()?;
                for (&axis, label) in printed.iter().zip(&labels) {
                    println!("tick {:>5}  {:<24} {}", tick, label, format_axis(dataset, axis));
                }
            }
            Err(e) => {
                rejected += 1;
                println!("tick {:>5}  rejected: {}", tick, e);
            }
        }
    }

    tracing::info!(
        "Replayed {} ticks of '{}' ({} rejected)",
        player.len(),
        player.name(),
        rejected
    );

    if let Some(path) = &args.record {
        let output = recording.take();
        output
            .save_to_file(path)
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!("Wrote {} recorded ticks to {}", output.frame_count(), path.display());
    }

    Ok(())
}

fn init_logging(
    log_dir: Option<&PathBuf>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "inputflow.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,inputflow=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn parse_axis(arg: &str) -> AxisRef {
    match arg.parse::<u32>() {
        Ok(index) => AxisRef::Index(index),
        Err(_) => AxisRef::Name(arg.to_string()),
    }
}

fn format_axis(dataset: &Dataset, axis: ValueAxisId) -> String {
    let sf = StepFunction1D::new(axis);
    let values = dataset.values_x(sf);
    if values.is_empty() {
        return format!("(previous {})", dataset.previous_value_x(sf));
    }
    dataset
        .timestamps(sf)
        .iter()
        .zip(values)
        .map(|(ts, v)| format!("{}@{}", v, ts))
        .collect::<Vec<_>>()
        .join(" ")
}
