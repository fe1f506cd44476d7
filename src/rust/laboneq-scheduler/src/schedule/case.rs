// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use super::SectionSchedule;
use crate::error::Result;
use crate::event::{Event, EventKind, IdTracker};
use crate::settings::CompilerSettings;

/// Schedule of a branch of a match section, selected by `state`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseSchedule {
    pub section: SectionSchedule,
    pub state: u16,
}

impl CaseSchedule {
    /// Down-cast from a generic section schedule.
    pub fn from_section_schedule(schedule: SectionSchedule, state: u16) -> Self {
        Self {
            section: schedule,
            state,
        }
    }

    pub(super) fn generate_event_list(
        &self,
        start: i64,
        max_events: usize,
        id_tracker: &IdTracker,
        expand_loops: bool,
        settings: &CompilerSettings,
    ) -> Result<Vec<Event>> {
        let mut events =
            self.section
                .generate_event_list(start, max_events, id_tracker, expand_loops, settings)?;
        match events.first_mut().map(|event| &mut event.kind) {
            Some(EventKind::SectionStart { state, .. }) => *state = Some(self.state),
            _ => unreachable!("Internal error: Section events must begin with SECTION_START"),
        }
        Ok(events)
    }

    /// An empty branch has the length of a single grid step until padded by its match.
    pub(super) fn calculate_empty_timing(&mut self, start: i64) -> Result<i64> {
        self.section.absolute_start = Some(start);
        self.section.length = Some(self.section.grid);
        Ok(start + self.section.grid)
    }

    /// Events of an empty branch.
    ///
    /// Every signal of the branch receives a delay over the whole branch, as long
    /// as the budget allows for it. The section start and end are always emitted.
    pub(super) fn generate_empty_event_list(
        &self,
        start: i64,
        max_events: usize,
        id_tracker: &IdTracker,
    ) -> Vec<Event> {
        let section = &self.section.uid;
        let length = self.section.length();
        let section_start = Event::new(
            id_tracker.next_id(),
            start,
            EventKind::SectionStart {
                section: section.clone(),
                state: Some(self.state),
            },
        );
        let mut remaining = max_events - 2;
        let mut delay_events = vec![];
        for signal in self.section.signals.iter() {
            if remaining <= 2 {
                break;
            }
            remaining -= 2;
            let chain_element_id = id_tracker.next_id();
            delay_events.push(Event::new(
                chain_element_id,
                start,
                EventKind::DelayStart {
                    section: section.clone(),
                    signal: signal.clone(),
                    chain_element_id,
                },
            ));
            delay_events.push(Event::new(
                id_tracker.next_id(),
                start + length,
                EventKind::DelayEnd {
                    section: section.clone(),
                    signal: signal.clone(),
                    chain_element_id,
                },
            ));
        }
        let section_end = Event::new(
            id_tracker.next_id(),
            start + length,
            EventKind::SectionEnd {
                section: section.clone(),
            },
        );
        let mut events = Vec::with_capacity(delay_events.len() + 2);
        events.push(section_start);
        events.extend(delay_events);
        events.push(section_end);
        events
    }
}
