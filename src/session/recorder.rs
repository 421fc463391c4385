//! Output recorder: captures selected value axes after every good tick.
//!
//! The recorder is boxed into the pipeline as a [`TickObserver`], so the
//! recording itself lives behind a shared [`RecordingHandle`] that the
//! caller keeps.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::AxisLayout;
use crate::dataset::{Dataset, StepFunction1D};
use crate::error::{InputFlowError, Result};
use crate::pipeline::id::ValueAxisId;
use crate::pipeline::stage::TickObserver;

use super::player::resolve_value_any;
use super::types::{AxisRef, OutputRecording, RecordedAxis, RecordedTick};

/// Shared access to a recording being filled by an [`OutputRecorder`]
#[derive(Debug, Clone, Default)]
pub struct RecordingHandle {
    inner: Arc<Mutex<OutputRecording>>,
}

impl RecordingHandle {
    fn lock(&self) -> MutexGuard<'_, OutputRecording> {
        // Ticks are pushed whole, so a poisoned lock still holds a usable recording.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of the recording so far
    pub fn snapshot(&self) -> OutputRecording {
        self.lock().clone()
    }

    /// Take the recording, leaving an empty one with the same pipeline name
    pub fn take(&self) -> OutputRecording {
        let mut guard = self.lock();
        let pipeline = guard.pipeline.clone();
        std::mem::replace(&mut *guard, OutputRecording::new(pipeline))
    }

    /// Number of ticks recorded so far
    pub fn frame_count(&self) -> usize {
        self.lock().frame_count()
    }
}

/// Records selected value axes into an [`OutputRecording`]
#[derive(Debug)]
pub struct OutputRecorder {
    axes: Vec<(ValueAxisId, String)>,
    /// Maximum number of ticks to keep (0 = unlimited)
    max_ticks: usize,
    handle: RecordingHandle,
}

impl OutputRecorder {
    /// Record `axes` (names or indices) of a pipeline built on `layout`.
    ///
    /// An empty selection records every value axis.
    pub fn new(pipeline: &str, layout: &AxisLayout, axes: &[AxisRef]) -> Result<Self> {
        let axes = if axes.is_empty() {
            (0..layout.values.len() as u32)
                .map(ValueAxisId)
                .map(|id| (id, layout.value_axis_label(id)))
                .collect()
        } else {
            axes.iter()
                .map(|a| {
                    let id = resolve_value_any(a, layout)?;
                    Ok((id, layout.value_axis_label(id)))
                })
                .collect::<Result<Vec<_>>>()?
        };

        if axes.is_empty() {
            return Err(InputFlowError::Trace(
                "nothing to record: layout has no value axes".to_string(),
            ));
        }

        tracing::debug!(
            "Recording {} axes of pipeline '{}': {:?}",
            axes.len(),
            pipeline,
            axes.iter().map(|(_, label)| label.as_str()).collect::<Vec<_>>()
        );

        Ok(Self {
            axes,
            max_ticks: 0,
            handle: RecordingHandle {
                inner: Arc::new(Mutex::new(OutputRecording::new(pipeline))),
            },
        })
    }

    /// Keep at most `max_ticks` ticks (0 = unlimited)
    pub fn with_max_ticks(mut self, max_ticks: usize) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Handle to the recording, valid after the recorder is moved into a
    /// pipeline
    pub fn handle(&self) -> RecordingHandle {
        self.handle.clone()
    }

    /// Axes being recorded
    pub fn axes(&self) -> impl Iterator<Item = ValueAxisId> + '_ {
        self.axes.iter().map(|(id, _)| *id)
    }
}

impl TickObserver for OutputRecorder {
    fn on_tick(&mut self, tick: u64, dataset: &Dataset) {
        let mut recording = self.handle.lock();
        if self.max_ticks > 0 && recording.ticks.len() >= self.max_ticks {
            tracing::trace!("Recording full, dropping tick {}", tick);
            return;
        }

        let axes = self
            .axes
            .iter()
            .map(|(id, label)| {
                let sf = StepFunction1D::new(*id);
                RecordedAxis {
                    axis: *id,
                    label: label.clone(),
                    timestamps: dataset.timestamps(sf).to_vec(),
                    values: dataset.values_x(sf).to_vec(),
                    previous: dataset.previous_value_x(sf),
                }
            })
            .collect();

        recording.ticks.push(RecordedTick { tick, axes });
    }
}
