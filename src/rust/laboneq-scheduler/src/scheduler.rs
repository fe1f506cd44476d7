// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use laboneq_log::diagnostic;

use crate::error::Result;
use crate::event::{Event, IdTracker};
use crate::experiment::types::{Experiment, SignalUid};
use crate::lower_experiment::lower_experiment;
use crate::parameter_store::ParameterStore;
use crate::schedule::Schedule;
use crate::settings::CompilerSettings;

/// The real-time part of an experiment with resolved timing.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledExperiment {
    pub schedule: Schedule,
    /// Frequency of the software oscillator driving each signal, in Hz
    pub software_oscillators: BTreeMap<SignalUid, f64>,
}

impl ScheduledExperiment {
    /// Length of the real-time part in samples.
    pub fn length(&self) -> i64 {
        self.schedule.length()
    }

    /// Generate the events of the experiment, starting at time 0.
    pub fn generate_event_list(
        &self,
        max_events: usize,
        id_tracker: &IdTracker,
        expand_loops: bool,
        settings: &CompilerSettings,
    ) -> Result<Vec<Event>> {
        self.schedule
            .generate_event_list(0, max_events, id_tracker, expand_loops, settings)
    }
}

/// Schedule the real-time part of an experiment.
///
/// References to near-time parameters are resolved from `nt_parameters`,
/// which records every parameter the schedule depends on.
pub fn schedule_experiment(
    experiment: &Experiment,
    nt_parameters: &ParameterStore,
) -> Result<ScheduledExperiment> {
    let lowered = lower_experiment(experiment, nt_parameters)?;
    let mut schedule = lowered.schedule;
    let end = schedule.calculate_timing(0)?;
    diagnostic!(
        "Scheduled section '{}': {} samples",
        experiment.root.uid,
        end
    );
    Ok(ScheduledExperiment {
        schedule,
        software_oscillators: lowered.software_oscillators,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParameterStoreBuilder;
    use crate::event::{EventKind, EventType};
    use crate::experiment::builders::{
        ExperimentBuilder, PlayPulseBuilder, SectionBuilder, SignalBuilder,
    };
    use crate::experiment::types::{
        Acquire, DeviceKind, NumericLiteral, ParameterUid, Section, SectionAlignment,
        SweepParameter, ValueOrParameter,
    };
    use crate::schedule::test_utils::{assert_events_paired, event_types};
    use crate::Error;
    use proptest::prelude::*;

    fn experiment(root: Section) -> Experiment {
        ExperimentBuilder::new(root)
            .signal(
                SignalBuilder::new("q0/drive", "hdawg", DeviceKind::Hdawg)
                    .channels(vec![0])
                    .build(),
            )
            .signal(
                SignalBuilder::new("q0/flux", "hdawg", DeviceKind::Hdawg)
                    .channels(vec![2])
                    .build(),
            )
            .signal(
                SignalBuilder::new("q0/measure", "uhfqa", DeviceKind::Uhfqa)
                    .channels(vec![0])
                    .build(),
            )
            .build()
    }

    fn schedule(root: Section) -> ScheduledExperiment {
        let store = ParameterStoreBuilder::new().build();
        schedule_experiment(&experiment(root), &store).unwrap()
    }

    fn events(scheduled: &ScheduledExperiment, max_events: usize, expand_loops: bool) -> Vec<Event> {
        scheduled
            .generate_event_list(
                max_events,
                &IdTracker::new(),
                expand_loops,
                &CompilerSettings::default(),
            )
            .unwrap()
    }

    fn count(events: &[Event], event_type: EventType) -> usize {
        events.iter().filter(|e| e.event_type() == event_type).count()
    }

    /// Averaging over a sweep of a pulse amplitude and a feedback branch.
    fn rabi_with_feedback() -> Section {
        let amplitude = ParameterUid::from("amplitude");
        let sweep = SectionBuilder::sweep(
            "sweep",
            vec![SweepParameter::new(amplitude.clone(), [0.1, 0.2, 0.3])],
            3,
        )
        .section(
            SectionBuilder::new("drive")
                .operation(
                    PlayPulseBuilder::new("q0/drive", "x180", 64)
                        .amplitude(ValueOrParameter::Parameter(amplitude)),
                )
                .build(),
        )
        .section(
            SectionBuilder::new("measure")
                .reserve("q0/drive")
                .operation(Acquire::new("q0/measure", "h0", 128))
                .build(),
        )
        .section(
            SectionBuilder::match_("feedback")
                .reserve("q0/measure")
                .section(
                    SectionBuilder::case("g", 0)
                        .operation(PlayPulseBuilder::new("q0/flux", "flux_pulse", 32))
                        .build(),
                )
                .section(SectionBuilder::case("e", 1).build())
                .build(),
        )
        .build();
        SectionBuilder::averaging("average", 8).section(sweep).build()
    }

    #[test]
    fn test_section_timing() {
        let scheduled = schedule(rabi_with_feedback());
        // drive (64) -> measure (128) -> feedback (32) per sweep step
        assert_eq!(scheduled.length(), 8 * 3 * 224);
        let events = events(&scheduled, usize::MAX, false);
        assert_events_paired(&events);
        let acquire_start = events
            .iter()
            .find(|e| e.event_type() == EventType::AcquireStart)
            .unwrap();
        assert_eq!(acquire_start.time, 64);
    }

    #[test]
    fn test_first_iteration_closes_loop_body_once() {
        let root = SectionBuilder::averaging("average", 4)
            .operation(PlayPulseBuilder::new("q0/drive", "x90", 32))
            .build();
        let scheduled = schedule(root);
        let expanded = events(&scheduled, usize::MAX, true);
        assert_events_paired(&expanded);
        assert_eq!(count(&expanded, EventType::LoopStepStart), 4);
        assert_eq!(count(&expanded, EventType::LoopIterationEnd), 1);
        assert_eq!(count(&expanded, EventType::LoopEnd), 1);

        let play_times: Vec<_> = expanded
            .iter()
            .filter(|e| e.event_type() == EventType::PlayStart)
            .map(|e| (e.time, e.shadow))
            .collect();
        assert_eq!(
            play_times,
            vec![(0, false), (32, true), (64, true), (96, true)]
        );
        // Everything but the loop brackets and the first iteration is shadow
        let first_shadow = expanded.iter().position(|e| e.shadow).unwrap();
        assert!(expanded[first_shadow..expanded.len() - 2]
            .iter()
            .all(|e| e.shadow));
        assert!(expanded[..first_shadow].iter().all(|e| !e.shadow));

        let compact = events(&scheduled, usize::MAX, false);
        assert_eq!(count(&compact, EventType::LoopStepStart), 1);
        assert_eq!(
            event_types(&compact),
            vec![
                EventType::SectionStart,
                EventType::LoopStepStart,
                EventType::PlayStart,
                EventType::PlayEnd,
                EventType::LoopStepEnd,
                EventType::LoopIterationEnd,
                EventType::LoopEnd,
                EventType::SectionEnd,
            ]
        );
    }

    #[test]
    fn test_shadow_iterations_carry_parameter_values() {
        // The frequency parameter is not consumed by the body, the loop is compressed
        let frequency = ParameterUid::from("frequency");
        let root = SectionBuilder::sweep(
            "sweep",
            vec![SweepParameter::new(frequency.clone(), [1e6, 2e6, 3e6])],
            3,
        )
        .operation(PlayPulseBuilder::new("q0/drive", "x90", 32))
        .build();
        let scheduled = schedule(root);
        let events = events(&scheduled, usize::MAX, true);
        let values: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::ParameterSet {
                    iteration, value, ..
                } => Some((*iteration, *value, e.shadow)),
                _ => None,
            })
            .collect();
        assert_eq!(
            values,
            vec![
                (0, NumericLiteral::Float(1e6), false),
                (1, NumericLiteral::Float(2e6), true),
                (2, NumericLiteral::Float(3e6), true),
            ]
        );
    }

    #[test]
    fn test_uncompressed_sweep_is_not_shadowed() {
        let scheduled = schedule(rabi_with_feedback());
        let events = events(&scheduled, usize::MAX, false);
        // The sweep changes the amplitude, all of its iterations are built
        let amplitudes: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::PlayStart { play, .. } if play.pulse.as_ref().unwrap().as_str() == "x180" => {
                    Some(play.amplitude)
                }
                _ => None,
            })
            .collect();
        assert_eq!(amplitudes, vec![0.1, 0.2, 0.3]);
        assert!(events.iter().all(|e| !e.shadow));
        assert_eq!(count(&events, EventType::LoopIterationEnd), 2);
    }

    #[test]
    fn test_case_state_on_section_start() {
        let scheduled = schedule(rabi_with_feedback());
        let events = events(&scheduled, usize::MAX, false);
        let states: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::SectionStart { section, state } if state.is_some() => {
                    Some((section.as_str().to_string(), *state))
                }
                _ => None,
            })
            .collect();
        // Once per sweep step
        assert_eq!(states.len(), 6);
        assert_eq!(states[0], ("g".to_string(), Some(0)));
        assert_eq!(states[1], ("e".to_string(), Some(1)));
    }

    #[test]
    fn test_empty_branch_event_budget() {
        let root = SectionBuilder::match_("feedback")
            .section(
                SectionBuilder::case("g", 0)
                    .operation(PlayPulseBuilder::new("q0/drive", "x180", 64))
                    .operation(PlayPulseBuilder::new("q0/flux", "flux_pulse", 32))
                    .build(),
            )
            .section(SectionBuilder::case("e", 1).build())
            .build();
        let scheduled = schedule(root);
        let empty_branch = scheduled.schedule.children()[1].schedule.as_ref();
        assert!(matches!(empty_branch, Schedule::EmptyBranch(_)));
        // Padded to the longest case
        assert_eq!(empty_branch.length(), 64);
        let settings = CompilerSettings::default();

        let events = empty_branch
            .generate_event_list(0, 4, &IdTracker::new(), false, &settings)
            .unwrap();
        assert_eq!(
            event_types(&events),
            vec![EventType::SectionStart, EventType::SectionEnd]
        );

        let events = empty_branch
            .generate_event_list(0, 6, &IdTracker::new(), false, &settings)
            .unwrap();
        assert_eq!(
            event_types(&events),
            vec![
                EventType::SectionStart,
                EventType::DelayStart,
                EventType::DelayEnd,
                EventType::SectionEnd
            ]
        );
        assert_eq!(events[2].time, 64);
        assert_events_paired(&events);

        let events = empty_branch
            .generate_event_list(0, 100, &IdTracker::new(), false, &settings)
            .unwrap();
        assert_eq!(count(&events, EventType::DelayStart), 2);
    }

    #[test]
    fn test_budget_below_minimum() {
        let scheduled = schedule(rabi_with_feedback());
        let result =
            scheduled.generate_event_list(2, &IdTracker::new(), false, &CompilerSettings::default());
        assert!(matches!(
            result,
            Err(Error::EventBudgetExceeded {
                max_events: 2,
                required: 3
            })
        ));
    }

    #[test]
    fn test_ids_unique_across_lists() {
        let scheduled = schedule(rabi_with_feedback());
        let tracker = IdTracker::new();
        let settings = CompilerSettings::default();
        let first = scheduled
            .generate_event_list(usize::MAX, &tracker, false, &settings)
            .unwrap();
        let second = scheduled
            .generate_event_list(usize::MAX, &tracker, false, &settings)
            .unwrap();
        let last_of_first = first.iter().map(|e| e.id).max().unwrap();
        assert!(second.iter().all(|e| e.id > last_of_first));
    }

    #[test]
    fn test_right_aligned_section_in_loop() {
        let root = SectionBuilder::new("root")
            .alignment(SectionAlignment::Right)
            .length(256)
            .operation(PlayPulseBuilder::new("q0/drive", "x90", 32))
            .operation(Acquire::new("q0/measure", "h0", 64))
            .build();
        let scheduled = schedule(root);
        let events = events(&scheduled, usize::MAX, false);
        let starts: Vec<_> = events
            .iter()
            .filter(|e| {
                matches!(e.event_type(), EventType::PlayStart | EventType::AcquireStart)
            })
            .map(|e| e.time)
            .collect();
        assert_eq!(starts, vec![224, 192]);
    }

    #[test]
    fn test_fixed_length_of_compressed_loop() {
        let averaging = |length| {
            SectionBuilder::averaging("avg", 4)
                .length(length)
                .operation(PlayPulseBuilder::new("q0/drive", "x90", 32))
                .build()
        };
        let root = SectionBuilder::new("root")
            .section(averaging(1024))
            .operation(PlayPulseBuilder::new("q0/drive", "x180", 32))
            .build();
        let scheduled = schedule(root);
        let Schedule::Loop(lp) = scheduled.schedule.children()[0].schedule.as_ref() else {
            panic!("Expected a loop");
        };
        assert!(lp.compressed);
        assert_eq!(lp.section.length(), 1024);
        assert_eq!(scheduled.length(), 1056);

        let events = events(&scheduled, usize::MAX, true);
        let play_starts: Vec<_> = events
            .iter()
            .filter(|e| e.event_type() == EventType::PlayStart)
            .map(|e| e.time)
            .collect();
        assert_eq!(play_starts, vec![0, 32, 64, 96, 1024]);
        let loop_end = events
            .iter()
            .find(|e| e.event_type() == EventType::LoopEnd)
            .unwrap();
        assert_eq!(loop_end.time, 1024);

        let root = SectionBuilder::new("root").section(averaging(64)).build();
        let store = ParameterStoreBuilder::new().build();
        assert!(schedule_experiment(&experiment(root), &store).is_err());
    }

    #[test]
    fn test_fixed_length_of_match_pads_cases() {
        let root = SectionBuilder::match_("feedback")
            .length(256)
            .section(
                SectionBuilder::case("g", 0)
                    .operation(PlayPulseBuilder::new("q0/drive", "x180", 64))
                    .build(),
            )
            .section(SectionBuilder::case("e", 1).build())
            .build();
        let scheduled = schedule(root);
        assert_eq!(scheduled.length(), 256);
        for child in scheduled.schedule.children() {
            assert_eq!(child.schedule.length(), 256);
        }
        let empty_branch = scheduled.schedule.children()[1].schedule.as_ref();
        let events = empty_branch
            .generate_event_list(0, 100, &IdTracker::new(), false, &CompilerSettings::default())
            .unwrap();
        let delay_end = events
            .iter()
            .find(|e| e.event_type() == EventType::DelayEnd)
            .unwrap();
        assert_eq!(delay_end.time, 256);
    }

    proptest! {
        #[test]
        fn test_truncated_event_lists_stay_paired(max_events in 3usize..400, expand_loops: bool) {
            let scheduled = schedule(rabi_with_feedback());
            let events = events(&scheduled, max_events, expand_loops);
            prop_assert!(events.len() <= max_events);
            assert_events_paired(&events);
            let mut ids: Vec<_> = events.iter().map(|e| e.id).collect();
            ids.sort_unstable();
            ids.dedup();
            prop_assert_eq!(ids.len(), events.len());
        }
    }
}
