// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;

use laboneq_common::utils::lcm;
use laboneq_log::debug;
use laboneq_signatures::{PulseParameterSet, PulseParameterValue};

use crate::ParameterStore;
use crate::error::{Error, Result};
use crate::event::PlayInfo;
use crate::experiment::types::{
    Experiment, Operation, PlayPulse, PulseParameter, Section, SectionItem, SectionKind,
    SectionUid, SignalUid, SweepParameter, ValueOrParameter,
};
use crate::parameter_resolver::ParameterResolver;
use crate::schedule::{
    LoopIterationSchedule, LoopSchedule, OperationKind, OperationSchedule, Schedule,
    SectionSchedule,
};

mod match_case;
mod oscillators;
use match_case::lower_match;
use oscillators::resolve_oscillators;
pub(crate) use oscillators::SoftwareOscillators;

/// Result of lowering the real-time part of an experiment.
pub(crate) struct LoweredExperiment {
    /// Root of the schedule, timing not yet resolved
    pub schedule: Schedule,
    pub software_oscillators: SoftwareOscillators,
}

/// Lowering of the experiment section tree to an unresolved [`Schedule`].
///
/// Parameters are resolved against the real-time sweeps and the given
/// near-time parameters. Every near-time parameter that is read is recorded
/// by the store.
pub(crate) fn lower_experiment(
    experiment: &Experiment,
    nt_parameters: &ParameterStore,
) -> Result<LoweredExperiment> {
    let resolver = ParameterResolver::new(nt_parameters);
    let software_oscillators = resolve_oscillators(experiment, &resolver)?;
    let ctx = LoweringContext { experiment };
    let schedule = match &experiment.root.kind {
        SectionKind::Case { .. } => {
            return Err(Error::new(
                "Case sections must be direct children of a match section.",
            ));
        }
        _ => ctx.lower_section(&experiment.root, &resolver)?,
    };
    Ok(LoweredExperiment {
        schedule,
        software_oscillators,
    })
}

pub(super) struct LoweringContext<'a> {
    experiment: &'a Experiment,
}

impl LoweringContext<'_> {
    /// Timing grid of a set of signals: the smallest grid all their devices can play on.
    pub(super) fn signal_grid(&self, signals: &BTreeSet<SignalUid>) -> i64 {
        signals
            .iter()
            .filter_map(|uid| self.experiment.signal(uid))
            .fold(1, |grid, signal| {
                lcm(grid, signal.device_kind.traits().sample_multiple as i64)
            })
    }

    fn check_signal(&self, signal: &SignalUid) -> Result<()> {
        if self.experiment.signal(signal).is_none() {
            return Err(Error::new(format!("Unknown signal '{signal}'.")));
        }
        Ok(())
    }

    /// Build the generic part of a section schedule from its lowered children.
    pub(super) fn section_schedule(
        &self,
        section: &Section,
        children: Vec<Schedule>,
    ) -> Result<SectionSchedule> {
        let mut signals: BTreeSet<SignalUid> =
            children.iter().flat_map(|child| child.signals().cloned()).collect();
        for signal in section.reserved_signals.iter() {
            self.check_signal(signal)?;
            signals.insert(signal.clone());
        }
        let grid = self.signal_grid(&signals);
        let mut schedule = SectionSchedule::new(section.uid.clone(), signals, grid);
        schedule.alignment = section.alignment;
        schedule.fixed_length = section.length;
        for child in children {
            schedule.add_child(child);
        }
        Ok(schedule)
    }

    pub(super) fn lower_section(
        &self,
        section: &Section,
        resolver: &ParameterResolver,
    ) -> Result<Schedule> {
        match &section.kind {
            SectionKind::Section => {
                let children = self.lower_children(section, resolver)?;
                Ok(Schedule::Section(self.section_schedule(section, children)?))
            }
            SectionKind::Sweep { parameters, count } => {
                self.lower_loop(section, parameters, *count, resolver)
            }
            SectionKind::Averaging { count } => self.lower_loop(section, &[], *count, resolver),
            SectionKind::Match => lower_match(self, section, resolver),
            SectionKind::Case { .. } => Err(Error::new(format!(
                "Case section '{}' must be a direct child of a match section.",
                section.uid
            ))),
        }
    }

    pub(super) fn lower_children(
        &self,
        section: &Section,
        resolver: &ParameterResolver,
    ) -> Result<Vec<Schedule>> {
        section
            .children
            .iter()
            .map(|child| match child {
                SectionItem::Section(child) => self.lower_section(child, resolver),
                SectionItem::Operation(operation) => {
                    self.lower_operation(&section.uid, operation, resolver)
                }
            })
            .collect()
    }

    /// Lower a sweep or averaging loop.
    ///
    /// The loop is compressed when its first iteration does not depend on the
    /// loop's own sweep parameters, all iterations are then identical.
    fn lower_loop(
        &self,
        section: &Section,
        parameters: &[SweepParameter],
        count: usize,
        resolver: &ParameterResolver,
    ) -> Result<Schedule> {
        if count == 0 {
            return Err(Error::new(format!(
                "Loop '{}' must have at least one iteration.",
                section.uid
            )));
        }
        for parameter in parameters {
            if parameter.len() != count {
                return Err(Error::new(format!(
                    "Sweep parameter '{}' has {} values, but loop '{}' has {} iterations.",
                    parameter.uid,
                    parameter.len(),
                    section.uid,
                    count
                )));
            }
        }
        let lower_iteration = |iteration: usize| -> Result<LoopIterationSchedule> {
            let scope = resolver.child_scope(
                parameters
                    .iter()
                    .map(|p| (p.uid.clone(), p.values[iteration])),
            );
            let children = self.lower_children(section, &scope)?;
            let mut body = self.section_schedule(section, children)?;
            // The fixed length applies to the loop as a whole
            body.fixed_length = None;
            Ok(LoopIterationSchedule::from_section_schedule(
                body,
                iteration,
                count,
                false,
                parameters.to_vec(),
            ))
        };

        let first = lower_iteration(0)?;
        let compressed = !resolver.any_used(parameters.iter().map(|p| &p.uid));
        let mut iterations = vec![first];
        if !compressed {
            for iteration in 1..count {
                iterations.push(lower_iteration(iteration)?);
            }
        }
        debug!(
            "Loop '{}': {} iterations, compressed: {}",
            section.uid,
            count,
            compressed
        );

        let signals: BTreeSet<SignalUid> = iterations
            .iter()
            .flat_map(|it| it.section.signals.iter().cloned())
            .collect();
        let grid = self.signal_grid(&signals);
        let mut loop_section = SectionSchedule::new(section.uid.clone(), signals, grid);
        loop_section.alignment = section.alignment;
        loop_section.fixed_length = section.length;
        for mut iteration in iterations {
            iteration.section.grid = grid;
            loop_section.add_child(Schedule::LoopIteration(iteration));
        }
        Ok(Schedule::Loop(LoopSchedule {
            section: loop_section,
            iterations: count,
            compressed,
        }))
    }

    fn lower_operation(
        &self,
        section: &SectionUid,
        operation: &Operation,
        resolver: &ParameterResolver,
    ) -> Result<Schedule> {
        self.check_signal(operation.signal())?;
        let (length, kind) = match operation {
            Operation::PlayPulse(play) => (
                resolver.resolve_samples(&play.length)?,
                OperationKind::Play(resolve_play(play, resolver)?),
            ),
            Operation::Acquire(acquire) => (
                resolver.resolve_samples(&acquire.length)?,
                OperationKind::Acquire {
                    handle: acquire.handle.clone(),
                },
            ),
            Operation::Delay(delay) => (resolver.resolve_samples(&delay.length)?, OperationKind::Delay),
            Operation::ResetPrecompensation { .. } => (0, OperationKind::ResetPrecompensation),
        };
        Ok(Schedule::Operation(OperationSchedule::new(
            section.clone(),
            operation.signal().clone(),
            length,
            kind,
        )))
    }
}

fn resolve_play(play: &PlayPulse, resolver: &ParameterResolver) -> Result<PlayInfo> {
    let resolve_optional = |value: &Option<ValueOrParameter<f64>>| {
        value.as_ref().map(|v| resolver.resolve_f64(v)).transpose()
    };
    let mut pulse_parameters = PulseParameterSet::new();
    for (name, parameter) in play.pulse_parameters.iter() {
        let value = match parameter {
            PulseParameter::Value(value) => value.clone(),
            PulseParameter::Parameter(uid) => PulseParameterValue::from(resolver.get_value(uid)?),
        };
        pulse_parameters.insert(name.as_str(), value);
    }
    Ok(PlayInfo {
        pulse: play.pulse.clone(),
        amplitude: resolver.resolve_f64(&play.amplitude)?,
        phase: resolve_optional(&play.phase)?,
        set_oscillator_phase: resolve_optional(&play.set_oscillator_phase)?,
        increment_oscillator_phase: resolve_optional(&play.increment_oscillator_phase)?,
        pulse_parameters,
        markers: play.markers.clone(),
        precompensation_clear: play.precompensation_clear,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParameterStoreBuilder;
    use crate::experiment::builders::{
        ExperimentBuilder, PlayPulseBuilder, SectionBuilder, SignalBuilder,
    };
    use crate::experiment::types::{Delay, DeviceKind, NumericLiteral, ParameterUid};

    fn experiment(root: Section) -> Experiment {
        ExperimentBuilder::new(root)
            .signal(SignalBuilder::new("drive", "hdawg", DeviceKind::Hdawg).build())
            .signal(SignalBuilder::new("measure", "uhfqa", DeviceKind::Uhfqa).build())
            .build()
    }

    fn lower(experiment: &Experiment) -> Result<Schedule> {
        let store = ParameterStoreBuilder::new().build();
        Ok(lower_experiment(experiment, &store)?.schedule)
    }

    #[test]
    fn test_grid_is_lcm_of_sample_multiples() {
        let root = SectionBuilder::new("root")
            .operation(PlayPulseBuilder::new("drive", "x90", 32))
            .operation(Delay::new("measure", 16))
            .build();
        let schedule = lower(&experiment(root)).unwrap();
        assert_eq!(schedule.grid(), 16);
        assert_eq!(schedule.signal_set().len(), 2);
    }

    #[test]
    fn test_sweep_compression() {
        let amp = ParameterUid::from("amp");
        let length = ParameterUid::from("length");
        // Parameter not used in the body: compressed
        let unused = SectionBuilder::sweep(
            "sweep",
            vec![SweepParameter::new(amp.clone(), [0.1, 0.2, 0.3])],
            3,
        )
        .operation(PlayPulseBuilder::new("drive", "x90", 32))
        .build();
        let Schedule::Loop(lp) = lower(&experiment(unused)).unwrap() else {
            panic!("Expected loop");
        };
        assert!(lp.compressed);
        assert_eq!(lp.section.children.len(), 1);

        // Sweeping the pulse length changes the body
        let used = SectionBuilder::sweep(
            "sweep",
            vec![SweepParameter::new(length.clone(), [16_i64, 32, 48])],
            3,
        )
        .operation(PlayPulseBuilder::new("drive", "x90", 0).length(ValueOrParameter::Parameter(length)))
        .build();
        let Schedule::Loop(lp) = lower(&experiment(used)).unwrap() else {
            panic!("Expected loop");
        };
        assert!(!lp.compressed);
        let lengths: Vec<_> = lp
            .section
            .children
            .iter()
            .map(|it| it.schedule.children()[0].schedule.length())
            .collect();
        assert_eq!(lengths, vec![16, 32, 48]);
    }

    #[test]
    fn test_averaging_loop_is_compressed() {
        let root = SectionBuilder::averaging("avg", 1000)
            .operation(PlayPulseBuilder::new("drive", "x90", 32))
            .build();
        let Schedule::Loop(lp) = lower(&experiment(root)).unwrap() else {
            panic!("Expected loop");
        };
        assert!(lp.compressed);
        assert_eq!(lp.iterations, 1000);
    }

    #[test]
    fn test_sweep_parameter_length_mismatch() {
        let root = SectionBuilder::sweep(
            "sweep",
            vec![SweepParameter::new(ParameterUid::from("amp"), [0.1, 0.2])],
            3,
        )
        .build();
        assert!(lower(&experiment(root)).is_err());
    }

    #[test]
    fn test_unknown_signal() {
        let root = SectionBuilder::new("root")
            .operation(Delay::new("flux", 16))
            .build();
        assert!(lower(&experiment(root)).is_err());
        let root = SectionBuilder::new("root").reserve("flux").build();
        assert!(lower(&experiment(root)).is_err());
    }

    #[test]
    fn test_near_time_parameters_are_recorded() {
        let amp = ParameterUid::from("amp");
        let root = SectionBuilder::new("root")
            .operation(
                PlayPulseBuilder::new("drive", "x90", 32).amplitude(ValueOrParameter::Parameter(amp.clone())),
            )
            .build();
        let mut store = ParameterStoreBuilder::new()
            .with_parameter(amp.clone(), NumericLiteral::Float(0.5))
            .with_parameter(ParameterUid::from("unused"), NumericLiteral::Int(1))
            .build();
        let lowered = lower_experiment(&experiment(root), &store).unwrap();
        let Schedule::Operation(op) = lowered.schedule.children()[0].schedule.as_ref() else {
            panic!("Expected operation");
        };
        let OperationKind::Play(play) = &op.kind else {
            panic!("Expected play");
        };
        assert_eq!(play.amplitude, 0.5);
        assert_eq!(store.empty_queries(), BTreeSet::from([amp]));
    }

    #[test]
    fn test_case_outside_match() {
        let root = SectionBuilder::new("root")
            .section(SectionBuilder::case("case", 0).build())
            .build();
        assert!(lower(&experiment(root)).is_err());
    }
}
