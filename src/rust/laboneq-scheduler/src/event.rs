// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Events of the scheduled experiment, the interface towards the code generator.

use std::sync::atomic::{AtomicU64, Ordering};

use laboneq_common::NumericLiteral;
use laboneq_common::types::{HandleUid, ParameterUid, PulseUid, SectionUid, SignalUid};
use laboneq_signatures::{Marker, PulseParameterSet};
use serde::Serialize;

pub type EventId = u64;

/// Allocator of event IDs.
///
/// IDs are unique across all event lists created from the same tracker.
#[derive(Debug, Default)]
pub struct IdTracker {
    next: AtomicU64,
}

impl IdTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> EventId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// A resolved pulse playback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayInfo {
    pub pulse: Option<PulseUid>,
    pub amplitude: f64,
    pub phase: Option<f64>,
    pub set_oscillator_phase: Option<f64>,
    pub increment_oscillator_phase: Option<f64>,
    pub pulse_parameters: PulseParameterSet,
    pub markers: Vec<Marker>,
    pub precompensation_clear: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    SectionStart,
    SectionEnd,
    LoopStepStart,
    LoopStepEnd,
    LoopIterationEnd,
    LoopEnd,
    ParameterSet,
    PlayStart,
    PlayEnd,
    AcquireStart,
    AcquireEnd,
    DelayStart,
    DelayEnd,
    ResetPrecompensationFilters,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    SectionStart {
        section: SectionUid,
        /// Branch state of a case section
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<u16>,
    },
    SectionEnd {
        section: SectionUid,
    },
    LoopStepStart {
        section: SectionUid,
        iteration: usize,
        num_repeats: usize,
    },
    LoopStepEnd {
        section: SectionUid,
        iteration: usize,
        num_repeats: usize,
    },
    LoopIterationEnd {
        section: SectionUid,
        iteration: usize,
        num_repeats: usize,
    },
    LoopEnd {
        section: SectionUid,
    },
    ParameterSet {
        section: SectionUid,
        parameter: ParameterUid,
        iteration: usize,
        value: NumericLiteral,
    },
    PlayStart {
        section: SectionUid,
        signal: SignalUid,
        chain_element_id: EventId,
        play: PlayInfo,
    },
    PlayEnd {
        section: SectionUid,
        signal: SignalUid,
        chain_element_id: EventId,
    },
    AcquireStart {
        section: SectionUid,
        signal: SignalUid,
        handle: HandleUid,
        chain_element_id: EventId,
    },
    AcquireEnd {
        section: SectionUid,
        signal: SignalUid,
        handle: HandleUid,
        chain_element_id: EventId,
    },
    DelayStart {
        section: SectionUid,
        signal: SignalUid,
        chain_element_id: EventId,
    },
    DelayEnd {
        section: SectionUid,
        signal: SignalUid,
        chain_element_id: EventId,
    },
    ResetPrecompensationFilters {
        section: SectionUid,
        signal: SignalUid,
    },
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::SectionStart { .. } => EventType::SectionStart,
            EventKind::SectionEnd { .. } => EventType::SectionEnd,
            EventKind::LoopStepStart { .. } => EventType::LoopStepStart,
            EventKind::LoopStepEnd { .. } => EventType::LoopStepEnd,
            EventKind::LoopIterationEnd { .. } => EventType::LoopIterationEnd,
            EventKind::LoopEnd { .. } => EventType::LoopEnd,
            EventKind::ParameterSet { .. } => EventType::ParameterSet,
            EventKind::PlayStart { .. } => EventType::PlayStart,
            EventKind::PlayEnd { .. } => EventType::PlayEnd,
            EventKind::AcquireStart { .. } => EventType::AcquireStart,
            EventKind::AcquireEnd { .. } => EventType::AcquireEnd,
            EventKind::DelayStart { .. } => EventType::DelayStart,
            EventKind::DelayEnd { .. } => EventType::DelayEnd,
            EventKind::ResetPrecompensationFilters { .. } => {
                EventType::ResetPrecompensationFilters
            }
        }
    }

    pub fn section(&self) -> &SectionUid {
        match self {
            EventKind::SectionStart { section, .. }
            | EventKind::SectionEnd { section }
            | EventKind::LoopStepStart { section, .. }
            | EventKind::LoopStepEnd { section, .. }
            | EventKind::LoopIterationEnd { section, .. }
            | EventKind::LoopEnd { section }
            | EventKind::ParameterSet { section, .. }
            | EventKind::PlayStart { section, .. }
            | EventKind::PlayEnd { section, .. }
            | EventKind::AcquireStart { section, .. }
            | EventKind::AcquireEnd { section, .. }
            | EventKind::DelayStart { section, .. }
            | EventKind::DelayEnd { section, .. }
            | EventKind::ResetPrecompensationFilters { section, .. } => section,
        }
    }

    pub fn signal(&self) -> Option<&SignalUid> {
        match self {
            EventKind::PlayStart { signal, .. }
            | EventKind::PlayEnd { signal, .. }
            | EventKind::AcquireStart { signal, .. }
            | EventKind::AcquireEnd { signal, .. }
            | EventKind::DelayStart { signal, .. }
            | EventKind::DelayEnd { signal, .. }
            | EventKind::ResetPrecompensationFilters { signal, .. } => Some(signal),
            _ => None,
        }
    }

    /// ID of the start event an operation event belongs to.
    pub fn chain_element_id(&self) -> Option<EventId> {
        match self {
            EventKind::PlayStart {
                chain_element_id, ..
            }
            | EventKind::PlayEnd {
                chain_element_id, ..
            }
            | EventKind::AcquireStart {
                chain_element_id, ..
            }
            | EventKind::AcquireEnd {
                chain_element_id, ..
            }
            | EventKind::DelayStart {
                chain_element_id, ..
            }
            | EventKind::DelayEnd {
                chain_element_id, ..
            } => Some(*chain_element_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: EventId,
    /// Time in samples
    pub time: i64,
    #[serde(flatten)]
    pub kind: EventKind,
    /// Replay of the first iteration of a compressed loop
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub shadow: bool,
}

impl Event {
    pub fn new(id: EventId, time: i64, kind: EventKind) -> Self {
        Self {
            id,
            time,
            kind,
            shadow: false,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }
}
