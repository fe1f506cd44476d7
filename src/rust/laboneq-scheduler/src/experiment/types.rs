// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use laboneq_common::NumericLiteral;
pub use laboneq_common::types::{
    DeviceKind, DeviceUid, HandleUid, OscillatorUid, ParameterUid, PulseUid, SectionUid, SignalUid,
};
pub use laboneq_signatures::{Marker, PulseParameterValue};

/// A value given either directly or by reference to a sweep parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueOrParameter<T> {
    Value(T),
    Parameter(ParameterUid),
}

impl From<f64> for ValueOrParameter<f64> {
    fn from(value: f64) -> Self {
        ValueOrParameter::Value(value)
    }
}

impl From<i64> for ValueOrParameter<i64> {
    fn from(value: i64) -> Self {
        ValueOrParameter::Value(value)
    }
}

impl<T> From<ParameterUid> for ValueOrParameter<T> {
    fn from(value: ParameterUid) -> Self {
        ValueOrParameter::Parameter(value)
    }
}

#[derive(Debug, Clone, PartialEq, Copy)]
pub enum OscillatorKind {
    Hardware,
    Software,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Oscillator {
    pub uid: OscillatorUid,
    /// Frequency in Hz
    pub frequency: ValueOrParameter<f64>,
    pub kind: OscillatorKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExponentialCompensation {
    pub timeconstant: f64,
    pub amplitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighPassCompensation {
    pub timeconstant: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BounceCompensation {
    pub delay: f64,
    pub amplitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirCompensation {
    pub coefficients: Vec<f64>,
}

/// Filter chain applied by the device to compensate for signal distortions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Precompensation {
    #[serde(default)]
    pub exponential: Vec<ExponentialCompensation>,
    pub high_pass: Option<HighPassCompensation>,
    pub bounce: Option<BounceCompensation>,
    pub fir: Option<FirCompensation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentSignal {
    pub uid: SignalUid,
    pub device: DeviceUid,
    pub device_kind: DeviceKind,
    /// Output channels of the device driven by this signal
    pub channels: Vec<u16>,
    pub oscillator: Option<Oscillator>,
    pub precompensation: Option<Precompensation>,
}

impl ExperimentSignal {
    /// Index of the AWG core playing this signal.
    pub fn awg_index(&self) -> u16 {
        let channel = self.channels.first().copied().unwrap_or(0);
        channel / self.device_kind.traits().channels_per_awg
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Copy, Default)]
pub enum SectionAlignment {
    #[default]
    Left,
    Right,
}

/// A real-time sweep parameter, one value per loop iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepParameter {
    pub uid: ParameterUid,
    pub values: Vec<NumericLiteral>,
}

impl SweepParameter {
    pub fn new(uid: ParameterUid, values: impl IntoIterator<Item = impl Into<NumericLiteral>>) -> Self {
        Self {
            uid,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionKind {
    Section,
    Sweep {
        parameters: Vec<SweepParameter>,
        count: usize,
    },
    Averaging {
        count: usize,
    },
    /// Branch on a feedback result; the children are `Case` sections
    Match,
    Case {
        state: u16,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PulseParameter {
    Value(PulseParameterValue),
    Parameter(ParameterUid),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayPulse {
    pub signal: SignalUid,
    pub pulse: Option<PulseUid>,
    /// Length in samples
    pub length: ValueOrParameter<i64>,
    pub amplitude: ValueOrParameter<f64>,
    pub phase: Option<ValueOrParameter<f64>>,
    pub set_oscillator_phase: Option<ValueOrParameter<f64>>,
    pub increment_oscillator_phase: Option<ValueOrParameter<f64>>,
    pub pulse_parameters: Vec<(String, PulseParameter)>,
    pub markers: Vec<Marker>,
    pub precompensation_clear: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Acquire {
    pub signal: SignalUid,
    pub handle: HandleUid,
    /// Length in samples
    pub length: ValueOrParameter<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delay {
    pub signal: SignalUid,
    /// Length in samples
    pub length: ValueOrParameter<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    PlayPulse(PlayPulse),
    Acquire(Acquire),
    Delay(Delay),
    ResetPrecompensation { signal: SignalUid },
}

impl Operation {
    pub fn signal(&self) -> &SignalUid {
        match self {
            Operation::PlayPulse(op) => &op.signal,
            Operation::Acquire(op) => &op.signal,
            Operation::Delay(op) => &op.signal,
            Operation::ResetPrecompensation { signal } => signal,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionItem {
    Section(Section),
    Operation(Operation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub uid: SectionUid,
    pub kind: SectionKind,
    pub alignment: SectionAlignment,
    /// Fixed length in samples
    pub length: Option<i64>,
    /// Signals occupied by the section in addition to the ones of its operations
    pub reserved_signals: Vec<SignalUid>,
    pub children: Vec<SectionItem>,
}

impl Section {
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.children.iter().filter_map(|child| match child {
            SectionItem::Section(section) => Some(section),
            SectionItem::Operation(_) => None,
        })
    }
}

/// The real-time part of an experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    pub signals: IndexMap<SignalUid, ExperimentSignal>,
    pub root: Section,
    /// Sampling rate in Sa/s used to convert sample counts into time
    pub sampling_rate: f64,
}

impl Experiment {
    pub fn signal(&self, uid: &SignalUid) -> Option<&ExperimentSignal> {
        self.signals.get(uid)
    }
}
