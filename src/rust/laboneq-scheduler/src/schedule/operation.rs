// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use laboneq_common::types::{HandleUid, SectionUid, SignalUid};

use crate::event::{Event, EventKind, IdTracker, PlayInfo};

#[derive(Debug, Clone, PartialEq)]
pub enum OperationKind {
    Play(PlayInfo),
    Acquire { handle: HandleUid },
    Delay,
    ResetPrecompensation,
}

/// Leaf of the schedule: a single operation on one signal.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSchedule {
    /// The section the operation belongs to
    pub section: SectionUid,
    pub signal: SignalUid,
    pub length: i64,
    pub grid: i64,
    pub absolute_start: Option<i64>,
    pub kind: OperationKind,
}

impl OperationSchedule {
    pub fn new(section: SectionUid, signal: SignalUid, length: i64, kind: OperationKind) -> Self {
        Self {
            section,
            signal,
            length,
            grid: 1,
            absolute_start: None,
            kind,
        }
    }

    pub(super) fn event_count(&self) -> usize {
        match self.kind {
            OperationKind::ResetPrecompensation => 1,
            _ => 2,
        }
    }

    pub(super) fn generate_event_list(&self, start: i64, id_tracker: &IdTracker) -> Vec<Event> {
        let section = self.section.clone();
        let signal = self.signal.clone();
        let end = start + self.length;
        if let OperationKind::ResetPrecompensation = self.kind {
            return vec![Event::new(
                id_tracker.next_id(),
                start,
                EventKind::ResetPrecompensationFilters { section, signal },
            )];
        }
        let start_id = id_tracker.next_id();
        let chain_element_id = start_id;
        let (start_kind, end_kind) = match &self.kind {
            OperationKind::Play(play) => (
                EventKind::PlayStart {
                    section: section.clone(),
                    signal: signal.clone(),
                    chain_element_id,
                    play: play.clone(),
                },
                EventKind::PlayEnd {
                    section,
                    signal,
                    chain_element_id,
                },
            ),
            OperationKind::Acquire { handle } => (
                EventKind::AcquireStart {
                    section: section.clone(),
                    signal: signal.clone(),
                    handle: handle.clone(),
                    chain_element_id,
                },
                EventKind::AcquireEnd {
                    section,
                    signal,
                    handle: handle.clone(),
                    chain_element_id,
                },
            ),
            OperationKind::Delay => (
                EventKind::DelayStart {
                    section: section.clone(),
                    signal: signal.clone(),
                    chain_element_id,
                },
                EventKind::DelayEnd {
                    section,
                    signal,
                    chain_element_id,
                },
            ),
            OperationKind::ResetPrecompensation => unreachable!(),
        };
        vec![
            Event::new(start_id, start, start_kind),
            Event::new(id_tracker.next_id(), end, end_kind),
        ]
    }
}
