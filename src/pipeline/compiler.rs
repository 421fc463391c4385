use super::compiled_plan::{CompiledPlan, PlanStats};
use crate::config::AxisLayout;
use crate::dataset::StepFunction;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::TimestampAxisId;
use crate::pipeline::stage::{BuiltinStage, Shape, StageGroup, StageWiring};
use crate::pipeline::stages::StageGroups;

/// Compiles configured stage groups into a validated execution plan
pub struct PipelineCompiler;

impl PipelineCompiler {
    /// Flatten `groups` into execution order and validate their wiring
    /// against `layout`.
    ///
    /// Every check here is static: a plan that compiles can only fail at
    /// tick time because of the sample stream, never because of wiring or
    /// stage parameters.
    pub fn compile(layout: &AxisLayout, groups: StageGroups) -> PipelineResult<CompiledPlan> {
        let start_time = std::time::Instant::now();

        let mut group_counts = [0usize; StageGroup::ORDER.len()];
        for group in StageGroup::ORDER {
            group_counts[group.rank()] = groups.group_len(group);
        }

        let stages = groups.into_ordered();
        let wirings: Vec<StageWiring> = stages.iter().map(BuiltinStage::wiring).collect();

        let ingress_ts = Self::ingress_timestamp_axes(layout);
        let mut producer: Vec<Option<usize>> = vec![None; layout.values.len()];
        let mut sized_by: Vec<Option<usize>> = vec![None; layout.timestamp_axes as usize];

        for (i, (stage, wiring)) in stages.iter().zip(&wirings).enumerate() {
            let describe = || format!("stage #{} ({})", i, stage.name());

            stage
                .validate()
                .map_err(|e| PipelineError::Config(format!("{}: {}", describe(), e)))?;

            for sf in wiring.reads.iter().chain(&wiring.writes) {
                Self::check_handle(layout, sf).map_err(|e| wiring_error(describe(), e))?;
            }
            Self::check_disjoint(wiring).map_err(|e| wiring_error(describe(), e))?;

            for sf in &wiring.writes {
                for &axis in sf.value_axes() {
                    if !layout.values[axis.index()].derived {
                        return Err(wiring_error(
                            describe(),
                            format!("writes ingress axis {}", axis),
                        ));
                    }
                    if let Some(other) = producer[axis.index()] {
                        return Err(wiring_error(
                            describe(),
                            format!("writes {} which stage #{} already produces", axis, other),
                        ));
                    }
                    producer[axis.index()] = Some(i);
                }
            }

            Self::check_shape(layout, wiring, &ingress_ts, &mut sized_by, i)
                .map_err(|e| wiring_error(describe(), e))?;
        }

        // Producers must run before their consumers.
        for (i, (stage, wiring)) in stages.iter().zip(&wirings).enumerate() {
            for sf in &wiring.reads {
                for &axis in sf.value_axes() {
                    if let Some(p) = producer[axis.index()] {
                        if p >= i {
                            return Err(wiring_error(
                                format!("stage #{} ({})", i, stage.name()),
                                format!(
                                    "reads {} before its producer stage #{} ({}) runs",
                                    axis,
                                    p,
                                    stages[p].name()
                                ),
                            ));
                        }
                    }
                }
            }
        }

        let mut produced_axes = 0;
        let mut unproduced_axes = 0;
        for (i, cfg) in layout.values.iter().enumerate() {
            if !cfg.derived {
                continue;
            }
            if producer[i].is_some() {
                produced_axes += 1;
            } else {
                unproduced_axes += 1;
                let name = cfg.name.as_deref().unwrap_or("unnamed");
                if ingress_ts[cfg.timestamp_axis.index()] {
                    tracing::warn!(
                        "Derived value axis {} ('{}') has no built-in producer; it takes the length of ingress timestamp axis {} and its values are unspecified unless an external stage writes them",
                        i,
                        name,
                        cfg.timestamp_axis
                    );
                } else {
                    tracing::warn!(
                        "Derived value axis {} ('{}') has no built-in producer; it stays empty unless an external stage sizes it",
                        i,
                        name
                    );
                }
            }
        }

        let stats = PlanStats {
            group_counts,
            total_stages: stages.len(),
            produced_axes,
            unproduced_axes,
            compile_time_us: start_time.elapsed().as_micros() as u64,
        };

        Ok(CompiledPlan { stages, stats })
    }

    /// Timestamp axes with at least one ingress member
    fn ingress_timestamp_axes(layout: &AxisLayout) -> Vec<bool> {
        let mut ingress = vec![false; layout.timestamp_axes as usize];
        let members = layout
            .values
            .iter()
            .filter(|v| !v.derived)
            .map(|v| v.timestamp_axis)
            .chain(layout.opaque.iter().filter(|o| !o.derived).map(|o| o.timestamp_axis));
        for ts in members {
            if let Some(slot) = ingress.get_mut(ts.index()) {
                *slot = true;
            }
        }
        ingress
    }

    /// Static form of the dataset's SanityCheck
    fn check_handle(layout: &AxisLayout, sf: &StepFunction) -> Result<(), String> {
        if sf.is_opaque() {
            let axis = layout
                .opaque
                .get(sf.opaque.index())
                .ok_or_else(|| format!("{} names a missing opaque axis", sf))?;
            if axis.stride != sf.stride {
                return Err(format!(
                    "{} expects stride {} but the axis has stride {}",
                    sf, sf.stride, axis.stride
                ));
            }
            return Ok(());
        }

        if sf.dimensions == 0 || sf.dimensions > 3 {
            return Err(format!("{} has {} dimensions", sf, sf.dimensions));
        }

        let mut ts: Option<TimestampAxisId> = None;
        for &axis in sf.value_axes() {
            let cfg = layout
                .values
                .get(axis.index())
                .ok_or_else(|| format!("{} names missing value axis {}", sf, axis))?;
            match ts {
                None => ts = Some(cfg.timestamp_axis),
                Some(first) if first != cfg.timestamp_axis => {
                    return Err(format!(
                        "{} mixes timestamp axes {} and {}",
                        sf, first, cfg.timestamp_axis
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn check_disjoint(wiring: &StageWiring) -> Result<(), String> {
        for w in &wiring.writes {
            for &axis in w.value_axes() {
                let read = wiring
                    .reads
                    .iter()
                    .any(|r| r.value_axes().contains(&axis));
                if read {
                    return Err(format!("reads and writes {}", axis));
                }
            }
        }
        Ok(())
    }

    fn check_shape(
        layout: &AxisLayout,
        wiring: &StageWiring,
        ingress_ts: &[bool],
        sized_by: &mut [Option<usize>],
        stage: usize,
    ) -> Result<(), String> {
        let ts_of = |sf: &StepFunction| layout.values[sf.x().index()].timestamp_axis;

        let Some(dst) = wiring.writes.first() else {
            return Ok(());
        };
        let dst_ts = ts_of(dst);
        let src_ts: Vec<TimestampAxisId> = wiring.reads.iter().map(ts_of).collect();

        match wiring.shape {
            Shape::NToN => {
                if let Some(&src) = src_ts.first() {
                    if src != dst_ts {
                        return Err(format!(
                            "N→N destination is on {} but its source is on {}",
                            dst_ts, src
                        ));
                    }
                }
                Ok(())
            }
            Shape::MaxNAndX { .. } | Shape::NPlusM => {
                if src_ts.contains(&dst_ts) {
                    return Err(format!(
                        "destination timestamp axis {} is also a source timestamp axis",
                        dst_ts
                    ));
                }
                if ingress_ts[dst_ts.index()] {
                    return Err(format!(
                        "destination timestamp axis {} receives demuxed samples",
                        dst_ts
                    ));
                }
                if let Some(other) = sized_by[dst_ts.index()] {
                    return Err(format!(
                        "destination timestamp axis {} is already sized by stage #{}",
                        dst_ts, other
                    ));
                }
                if wiring.shape == Shape::NPlusM && src_ts.len() == 2 && src_ts[0] == src_ts[1] {
                    return Err(format!(
                        "merge sources share timestamp axis {}",
                        src_ts[0]
                    ));
                }
                sized_by[dst_ts.index()] = Some(stage);
                Ok(())
            }
        }
    }
}

fn wiring_error(stage: String, message: String) -> PipelineError {
    PipelineError::Wiring(format!("{}: {}", stage, message))
}
