// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use laboneq_common::utils::ceil_to_grid;

use super::{Schedule, SectionSchedule};
use crate::error::Result;
use crate::event::{Event, EventKind, IdTracker};
use crate::experiment::types::SweepParameter;
use crate::settings::CompilerSettings;

/// Schedule of a sweep or averaging loop.
///
/// The children are [`LoopIterationSchedule`]s. A compressed loop holds only
/// its first iteration, the remaining ones are identical to it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSchedule {
    pub section: SectionSchedule,
    pub iterations: usize,
    pub compressed: bool,
}

impl LoopSchedule {
    pub(super) fn calculate_timing(&mut self, start: i64) -> Result<i64> {
        let section = &mut self.section;
        section.absolute_start = Some(start);
        let grid = section.grid;
        if self.compressed {
            let child = section
                .children
                .first_mut()
                .expect("Internal error: Compressed loop without iteration");
            child.offset = 0;
            let iteration = child.schedule_mut();
            iteration.calculate_timing(start)?;
            let length = ceil_to_grid(iteration.length(), grid);
            iteration.adjust_length(length);
            let content_length = length * self.iterations as i64;
            section.length = Some(content_length);
            let length = section.resolve_fixed_length(content_length)?;
            section.adjust_length(length);
        } else {
            let mut offset = 0;
            for child in section.children.iter_mut() {
                child.offset = offset;
                let iteration = Arc::make_mut(&mut child.schedule);
                iteration.calculate_timing(start + offset)?;
                let length = ceil_to_grid(iteration.length(), grid);
                iteration.adjust_length(length);
                offset += length;
            }
            section.calculate_section_length()?;
        }
        Ok(start + section.length())
    }


    pub(super) fn generate_event_list(
        &self,
        start: i64,
        max_events: usize,
        id_tracker: &IdTracker,
        expand_loops: bool,
        settings: &CompilerSettings,
    ) -> Result<Vec<Event>> {
        let section = self.section.uid.clone();
        let mut events = vec![Event::new(
            id_tracker.next_id(),
            start,
            EventKind::SectionStart {
                section: section.clone(),
                state: None,
            },
        )];
        // Reserve LOOP_END and SECTION_END
        let mut remaining = max_events - 3;

        match (self.compressed, self.section.children.first()) {
            (true, Some(child)) => {
                let Schedule::LoopIteration(first) = child.schedule.as_ref() else {
                    unreachable!("Internal error: Loop child is not an iteration")
                };
                // Placement of the first iteration, the others follow back to back
                let first_start = start + child.offset;
                let iteration_length = child.schedule.length();
                let repeats = if expand_loops { self.iterations } else { 1 };
                for index in 0..repeats {
                    let iteration_start = first_start + index as i64 * iteration_length;
                    let iteration_events = if index == 0 {
                        if first.fixed_event_count() > remaining {
                            break;
                        }
                        first.generate_event_list(
                            iteration_start,
                            remaining,
                            id_tracker,
                            expand_loops,
                            settings,
                        )?
                    } else {
                        let shadow = first.compressed_iteration(index);
                        if shadow.fixed_event_count() > remaining {
                            break;
                        }
                        shadow.generate_event_list(
                            iteration_start,
                            remaining,
                            id_tracker,
                            expand_loops,
                            settings,
                        )?
                    };
                    remaining -= iteration_events.len();
                    events.extend(iteration_events);
                }
            }
            _ => {
                let children_events = self.section.children_events(
                    start,
                    remaining,
                    id_tracker,
                    expand_loops,
                    settings,
                )?;
                events.extend(children_events);
            }
        }

        let end = start + self.section.length();
        events.push(Event::new(
            id_tracker.next_id(),
            end,
            EventKind::LoopEnd {
                section: section.clone(),
            },
        ));
        events.push(Event::new(
            id_tracker.next_id(),
            end,
            EventKind::SectionEnd { section },
        ));
        Ok(events)
    }
}

/// Schedule of a single iteration of a loop (sweep or average).
#[derive(Debug, Clone, PartialEq)]
pub struct LoopIterationSchedule {
    pub section: SectionSchedule,
    pub iteration: usize,
    /// Parameters swept by the loop, set at the start of the iteration
    pub sweep_parameters: Vec<SweepParameter>,
    pub num_repeats: usize,
    /// The iteration replays the first iteration with substituted parameter values
    pub shadow: bool,
}

impl LoopIterationSchedule {
    /// Down-cast from a generic section schedule.
    pub fn from_section_schedule(
        schedule: SectionSchedule,
        iteration: usize,
        num_repeats: usize,
        shadow: bool,
        sweep_parameters: Vec<SweepParameter>,
    ) -> Self {
        Self {
            section: schedule,
            iteration,
            sweep_parameters,
            num_repeats,
            shadow,
        }
    }

    /// Copy of this iteration with `iteration` replaced and flagged as shadow.
    ///
    /// The children are shared with this iteration.
    pub fn compressed_iteration(&self, iteration: usize) -> Self {
        Self {
            iteration,
            shadow: true,
            ..self.clone()
        }
    }

    /// Events emitted by the iteration itself, besides those of its children.
    pub(super) fn fixed_event_count(&self) -> usize {
        let iteration_end = if self.iteration == 0 { 1 } else { 0 };
        2 + self.sweep_parameters.len() + iteration_end
    }

    pub(super) fn generate_event_list(
        &self,
        start: i64,
        max_events: usize,
        id_tracker: &IdTracker,
        expand_loops: bool,
        settings: &CompilerSettings,
    ) -> Result<Vec<Event>> {
        let section = &self.section.uid;
        let end = start + self.section.length();
        let step_start = Event::new(
            id_tracker.next_id(),
            start,
            EventKind::LoopStepStart {
                section: section.clone(),
                iteration: self.iteration,
                num_repeats: self.num_repeats,
            },
        );
        let mut events = vec![step_start];
        for parameter in self.sweep_parameters.iter() {
            events.push(Event::new(
                id_tracker.next_id(),
                start,
                EventKind::ParameterSet {
                    section: section.clone(),
                    parameter: parameter.uid.clone(),
                    iteration: self.iteration,
                    value: parameter.values[self.iteration],
                },
            ));
        }
        let children_events = self.section.children_events(
            start,
            max_events - self.fixed_event_count(),
            id_tracker,
            expand_loops,
            settings,
        )?;
        events.extend(children_events);
        events.push(Event::new(
            id_tracker.next_id(),
            end,
            EventKind::LoopStepEnd {
                section: section.clone(),
                iteration: self.iteration,
                num_repeats: self.num_repeats,
            },
        ));
        // The first iteration represents the loop body
        if self.iteration == 0 {
            events.push(Event::new(
                id_tracker.next_id(),
                end,
                EventKind::LoopIterationEnd {
                    section: section.clone(),
                    iteration: self.iteration,
                    num_repeats: self.num_repeats,
                },
            ));
        }
        if self.shadow {
            for event in events.iter_mut() {
                event.shadow = true;
            }
        }
        Ok(events)
    }
}
