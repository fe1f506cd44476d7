// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use laboneq_common::types::{SectionUid, SignalUid};
use laboneq_common::utils::{ceil_to_grid, floor_to_grid};

use super::{Schedule, ScheduleChild};
use crate::error::{Error, Result};
use crate::event::{Event, EventKind, IdTracker};
use crate::experiment::types::SectionAlignment;
use crate::settings::CompilerSettings;

/// Schedule of a generic section.
///
/// Loops, loop iterations and branches are built on top of it.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionSchedule {
    pub uid: SectionUid,
    pub signals: BTreeSet<SignalUid>,
    /// Timing grid in samples, start and length are multiples of it
    pub grid: i64,
    pub alignment: SectionAlignment,
    /// Length requested by the user
    pub fixed_length: Option<i64>,
    pub length: Option<i64>,
    pub absolute_start: Option<i64>,
    pub children: Vec<ScheduleChild>,
}

impl SectionSchedule {
    pub fn new(uid: SectionUid, signals: BTreeSet<SignalUid>, grid: i64) -> Self {
        Self {
            uid,
            signals,
            grid,
            alignment: SectionAlignment::Left,
            fixed_length: None,
            length: None,
            absolute_start: None,
            children: Vec::new(),
        }
    }

    pub fn add_child(&mut self, child: Schedule) {
        self.children.push(ScheduleChild::new(child));
    }

    pub fn length(&self) -> i64 {
        self.length
            .expect("Internal error: Section length not resolved")
    }

    pub(super) fn calculate_timing(&mut self, start: i64) -> Result<i64> {
        self.absolute_start = Some(start);
        match self.alignment {
            SectionAlignment::Left => self.arrange_left_aligned(start)?,
            SectionAlignment::Right => self.arrange_right_aligned(start)?,
        }
        self.calculate_section_length()?;
        Ok(start + self.length())
    }

    /// Place each child after the end of the previous children it shares a signal with.
    fn arrange_left_aligned(&mut self, start: i64) -> Result<()> {
        let mut signal_start_constraints: HashMap<SignalUid, i64> = HashMap::new();
        for child in self.children.iter_mut() {
            let schedule = Arc::make_mut(&mut child.schedule);
            let mut offset = 0;
            for signal in schedule.signals() {
                if let Some(signal_start) = signal_start_constraints.get(signal) {
                    offset = offset.max(*signal_start);
                }
            }
            offset = ceil_to_grid(offset, schedule.grid());
            schedule.calculate_timing(start + offset)?;
            child.offset = offset;

            let end = offset + schedule.length();
            for signal in schedule.signals() {
                signal_start_constraints.insert(signal.clone(), end);
            }
        }
        Ok(())
    }

    /// Pack the children against the end of the section, last child first.
    fn arrange_right_aligned(&mut self, start: i64) -> Result<()> {
        let mut signal_end_constraints: HashMap<SignalUid, i64> = HashMap::new();
        let mut relative_start = 0;
        for child in self.children.iter_mut().rev() {
            let schedule = Arc::make_mut(&mut child.schedule);
            schedule.calculate_timing(start)?;
            let mut end = 0;
            for signal in schedule.signals() {
                if let Some(signal_end) = signal_end_constraints.get(signal) {
                    end = end.min(*signal_end);
                }
            }
            let offset = floor_to_grid(end - schedule.length(), schedule.grid());
            child.offset = offset;
            relative_start = relative_start.min(offset);
            for signal in schedule.signals() {
                signal_end_constraints.insert(signal.clone(), offset);
            }
        }

        // Make offsets relative to the section start
        let relative_start = floor_to_grid(relative_start, self.grid);
        for child in self.children.iter_mut() {
            child.offset -= relative_start;
            let offset = child.offset;
            child.schedule_mut().shift(offset);
        }
        Ok(())
    }

    /// Resolve the section length from its children and the requested fixed length.
    pub(super) fn calculate_section_length(&mut self) -> Result<()> {
        let children_length = self
            .children
            .iter()
            .map(|child| child.offset + child.schedule.length())
            .max()
            .unwrap_or(0);
        let children_length = ceil_to_grid(children_length, self.grid);
        self.length = Some(children_length);
        let length = self.resolve_fixed_length(children_length)?;
        self.adjust_length(length);
        Ok(())
    }

    /// The final length of the section given the length of its content.
    ///
    /// It is an error if the content does not fit into the requested fixed length.
    pub(super) fn resolve_fixed_length(&self, content_length: i64) -> Result<i64> {
        let Some(fixed_length) = self.fixed_length else {
            return Ok(content_length);
        };
        let fixed_length = ceil_to_grid(fixed_length, self.grid);
        if content_length > fixed_length {
            return Err(Error::new(format!(
                "Content of section '{}' ({} samples) does not fit into the requested fixed section length ({} samples).",
                self.uid, content_length, fixed_length
            )));
        }
        Ok(fixed_length)
    }

    /// Extend the section to `length`, moving the children of a right-aligned section along.
    pub(super) fn adjust_length(&mut self, length: i64) {
        let length = ceil_to_grid(length, self.grid);
        let current_length = self.length();
        if length <= current_length {
            return;
        }
        if self.alignment == SectionAlignment::Right {
            let delta = length - current_length;
            for child in self.children.iter_mut() {
                child.offset += delta;
                child.schedule_mut().shift(delta);
            }
        }
        self.length = Some(length);
    }

    /// Schedule the cases of a match section.
    ///
    /// All cases start with the match and are padded to the length of the match.
    pub(super) fn calculate_match_timing(&mut self, start: i64) -> Result<i64> {
        self.absolute_start = Some(start);
        let mut longest_case = 0;
        for child in self.children.iter_mut() {
            child.offset = 0;
            let case = child.schedule_mut();
            case.calculate_timing(start)?;
            longest_case = longest_case.max(ceil_to_grid(case.length(), self.grid));
        }
        // A fixed length of the match applies to every case
        let length = self.resolve_fixed_length(ceil_to_grid(longest_case, self.grid))?;
        self.length = Some(length);
        for child in self.children.iter_mut() {
            child.schedule_mut().adjust_length(length);
        }
        Ok(start + length)
    }

    /// Events of the children placed relative to `start`, within `max_events`.
    pub(super) fn children_events(
        &self,
        start: i64,
        max_events: usize,
        id_tracker: &IdTracker,
        expand_loops: bool,
        settings: &CompilerSettings,
    ) -> Result<Vec<Event>> {
        let mut remaining = max_events;
        let mut events = vec![];
        for child in self.children.iter() {
            if child.schedule.min_events() > remaining {
                break;
            }
            let child_events = child.schedule.generate_event_list(
                start + child.offset,
                remaining,
                id_tracker,
                expand_loops,
                settings,
            )?;
            remaining -= child_events.len();
            events.extend(child_events);
        }
        Ok(events)
    }

    pub(super) fn generate_event_list(
        &self,
        start: i64,
        max_events: usize,
        id_tracker: &IdTracker,
        expand_loops: bool,
        settings: &CompilerSettings,
    ) -> Result<Vec<Event>> {
        let start_event = Event::new(
            id_tracker.next_id(),
            start,
            EventKind::SectionStart {
                section: self.uid.clone(),
                state: None,
            },
        );
        let children_events =
            self.children_events(start, max_events - 2, id_tracker, expand_loops, settings)?;
        let end_event = Event::new(
            id_tracker.next_id(),
            start + self.length(),
            EventKind::SectionEnd {
                section: self.uid.clone(),
            },
        );
        let mut events = Vec::with_capacity(children_events.len() + 2);
        events.push(start_event);
        events.extend(children_events);
        events.push(end_event);
        Ok(events)
    }
}
