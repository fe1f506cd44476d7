// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Scheduled experiment tree.
//!
//! A [`Schedule`] is created unresolved from the experiment, its timing is
//! resolved once by [`Schedule::calculate_timing`], after which any number of
//! event lists can be generated from it.

mod case;
mod loops;
mod operation;
mod section;

use std::collections::BTreeSet;
use std::sync::Arc;

use laboneq_common::types::SignalUid;

pub use case::CaseSchedule;
pub use loops::{LoopIterationSchedule, LoopSchedule};
pub use operation::{OperationKind, OperationSchedule};
pub use section::SectionSchedule;

use crate::error::{Error, Result};
use crate::event::{Event, IdTracker};
use crate::settings::CompilerSettings;

/// A child of a schedule node with its offset relative to the start of the parent.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleChild {
    pub offset: i64,
    pub schedule: Arc<Schedule>,
}

impl ScheduleChild {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            offset: 0,
            schedule: Arc::new(schedule),
        }
    }

    pub(crate) fn schedule_mut(&mut self) -> &mut Schedule {
        Arc::make_mut(&mut self.schedule)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Schedule {
    Section(SectionSchedule),
    Loop(LoopSchedule),
    LoopIteration(LoopIterationSchedule),
    Match(SectionSchedule),
    Case(CaseSchedule),
    /// A case without operations, played as a delay on all signals of its match
    EmptyBranch(CaseSchedule),
    Operation(OperationSchedule),
}

impl Schedule {
    pub fn section(&self) -> Option<&SectionSchedule> {
        match self {
            Schedule::Section(s) | Schedule::Match(s) => Some(s),
            Schedule::Loop(s) => Some(&s.section),
            Schedule::LoopIteration(s) => Some(&s.section),
            Schedule::Case(s) | Schedule::EmptyBranch(s) => Some(&s.section),
            Schedule::Operation(_) => None,
        }
    }

    pub(crate) fn section_mut(&mut self) -> Option<&mut SectionSchedule> {
        match self {
            Schedule::Section(s) | Schedule::Match(s) => Some(s),
            Schedule::Loop(s) => Some(&mut s.section),
            Schedule::LoopIteration(s) => Some(&mut s.section),
            Schedule::Case(s) | Schedule::EmptyBranch(s) => Some(&mut s.section),
            Schedule::Operation(_) => None,
        }
    }

    pub fn signals(&self) -> Box<dyn Iterator<Item = &SignalUid> + '_> {
        match self {
            Schedule::Operation(op) => Box::new(std::iter::once(&op.signal)),
            _ => Box::new(
                self.section()
                    .expect("Internal error: Schedule without section")
                    .signals
                    .iter(),
            ),
        }
    }

    pub fn signal_set(&self) -> BTreeSet<SignalUid> {
        self.signals().cloned().collect()
    }

    pub fn grid(&self) -> i64 {
        match self {
            Schedule::Operation(op) => op.grid,
            _ => self.section().map_or(1, |s| s.grid),
        }
    }

    pub fn try_length(&self) -> Option<i64> {
        match self {
            Schedule::Operation(op) => Some(op.length),
            _ => self.section().and_then(|s| s.length),
        }
    }

    pub fn length(&self) -> i64 {
        self.try_length()
            .expect("Internal error: Schedule length not resolved")
    }

    pub fn absolute_start(&self) -> Option<i64> {
        match self {
            Schedule::Operation(op) => op.absolute_start,
            _ => self.section().and_then(|s| s.absolute_start),
        }
    }

    pub fn children(&self) -> &[ScheduleChild] {
        self.section().map_or(&[], |s| s.children.as_slice())
    }

    /// Resolve the timing of this node and its descendants, starting at `start`.
    ///
    /// Returns the end of the node.
    pub fn calculate_timing(&mut self, start: i64) -> Result<i64> {
        match self {
            Schedule::Section(s) | Schedule::LoopIteration(LoopIterationSchedule { section: s, .. }) => {
                s.calculate_timing(start)
            }
            Schedule::Case(case) => case.section.calculate_timing(start),
            Schedule::EmptyBranch(case) => case.calculate_empty_timing(start),
            Schedule::Match(s) => s.calculate_match_timing(start),
            Schedule::Loop(lp) => lp.calculate_timing(start),
            Schedule::Operation(op) => {
                op.absolute_start = Some(start);
                Ok(start + op.length)
            }
        }
    }

    /// Move this node and its descendants by `delta` samples.
    pub(crate) fn shift(&mut self, delta: i64) {
        if delta == 0 {
            return;
        }
        match self {
            Schedule::Operation(op) => {
                op.absolute_start = op.absolute_start.map(|start| start + delta);
            }
            _ => {
                let section = self
                    .section_mut()
                    .expect("Internal error: Schedule without section");
                section.absolute_start = section.absolute_start.map(|start| start + delta);
                for child in section.children.iter_mut() {
                    child.schedule_mut().shift(delta);
                }
            }
        }
    }

    /// Extend the length of a section node to `length`, rounded to its grid.
    pub(crate) fn adjust_length(&mut self, length: i64) {
        if let Some(section) = self.section_mut() {
            section.adjust_length(length);
        }
    }

    /// The smallest number of events this node emits.
    pub fn min_events(&self) -> usize {
        match self {
            Schedule::Section(_) | Schedule::Match(_) | Schedule::Case(_) => 2,
            Schedule::EmptyBranch(_) => 2,
            Schedule::Loop(_) => 3,
            Schedule::LoopIteration(it) => it.fixed_event_count(),
            Schedule::Operation(op) => op.event_count(),
        }
    }

    /// Generate the events of this node, placed at `start`.
    ///
    /// The returned list never holds more than `max_events` events, and
    /// every start event is accompanied by its end event. Children that do not
    /// fit into the budget are omitted as a whole.
    pub fn generate_event_list(
        &self,
        start: i64,
        max_events: usize,
        id_tracker: &IdTracker,
        expand_loops: bool,
        settings: &CompilerSettings,
    ) -> Result<Vec<Event>> {
        if self.absolute_start().is_none() {
            return Err(Error::new(
                "Timing must be resolved before generating events.",
            ));
        }
        let required = self.min_events();
        if max_events < required {
            return Err(Error::EventBudgetExceeded {
                max_events,
                required,
            });
        }
        let events = match self {
            Schedule::Section(s) | Schedule::Match(s) => {
                s.generate_event_list(start, max_events, id_tracker, expand_loops, settings)?
            }
            Schedule::Loop(lp) => {
                lp.generate_event_list(start, max_events, id_tracker, expand_loops, settings)?
            }
            Schedule::LoopIteration(it) => {
                it.generate_event_list(start, max_events, id_tracker, expand_loops, settings)?
            }
            Schedule::Case(case) => {
                case.generate_event_list(start, max_events, id_tracker, expand_loops, settings)?
            }
            Schedule::EmptyBranch(case) => {
                case.generate_empty_event_list(start, max_events, id_tracker)
            }
            Schedule::Operation(op) => op.generate_event_list(start, id_tracker),
        };
        debug_assert!(events.len() <= max_events);
        Ok(events)
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use std::collections::HashMap;

    use crate::event::{Event, EventKind, EventType};

    /// Check that all start events have a matching, later end event.
    pub(crate) fn assert_events_paired(events: &[Event]) {
        let mut open_sections = vec![];
        let mut open_operations = HashMap::new();
        for (position, event) in events.iter().enumerate() {
            match &event.kind {
                EventKind::SectionStart { section, .. } => open_sections.push(section.clone()),
                EventKind::SectionEnd { section } => {
                    assert_eq!(open_sections.pop().as_ref(), Some(section));
                }
                EventKind::PlayStart { .. }
                | EventKind::AcquireStart { .. }
                | EventKind::DelayStart { .. } => {
                    assert_eq!(event.kind.chain_element_id(), Some(event.id));
                    open_operations.insert(event.id, (position, event.clone()));
                }
                EventKind::PlayEnd { .. }
                | EventKind::AcquireEnd { .. }
                | EventKind::DelayEnd { .. } => {
                    let start_id = event.kind.chain_element_id().unwrap();
                    let (_, start) = open_operations
                        .remove(&start_id)
                        .expect("End event without start event");
                    assert_eq!(start.kind.signal(), event.kind.signal());
                    assert!(start.time <= event.time);
                    assert!(start.id < event.id);
                }
                _ => {}
            }
        }
        assert!(open_sections.is_empty(), "Unclosed sections: {open_sections:?}");
        assert!(open_operations.is_empty(), "Unclosed operations");
        let loop_step_starts = events
            .iter()
            .filter(|e| e.event_type() == EventType::LoopStepStart)
            .count();
        let loop_step_ends = events
            .iter()
            .filter(|e| e.event_type() == EventType::LoopStepEnd)
            .count();
        assert_eq!(loop_step_starts, loop_step_ends);
    }

    pub(crate) fn event_types(events: &[Event]) -> Vec<EventType> {
        events.iter().map(Event::event_type).collect()
    }
}
