// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use indexmap::IndexMap;

use crate::experiment::types::{
    Acquire, Delay, DeviceKind, DeviceUid, Experiment, ExperimentSignal, HandleUid, Marker,
    Operation, Oscillator, OscillatorKind, OscillatorUid, ParameterUid, PlayPulse, Precompensation,
    PulseParameter, PulseParameterValue, PulseUid, Section, SectionAlignment, SectionItem,
    SectionKind, SectionUid, SignalUid, SweepParameter, ValueOrParameter,
};

pub struct ExperimentBuilder {
    inner: Experiment,
}

impl ExperimentBuilder {
    pub fn new(root: Section) -> Self {
        Self {
            inner: Experiment {
                signals: IndexMap::new(),
                root,
                sampling_rate: DeviceKind::Hdawg.traits().sampling_rate,
            },
        }
    }

    pub fn signal(mut self, signal: ExperimentSignal) -> Self {
        self.inner.signals.insert(signal.uid.clone(), signal);
        self
    }

    pub fn sampling_rate(mut self, sampling_rate: f64) -> Self {
        self.inner.sampling_rate = sampling_rate;
        self
    }

    pub fn build(self) -> Experiment {
        self.inner
    }
}

pub struct SignalBuilder {
    inner: ExperimentSignal,
}

impl SignalBuilder {
    pub fn new(uid: impl Into<SignalUid>, device: impl Into<DeviceUid>, kind: DeviceKind) -> Self {
        Self {
            inner: ExperimentSignal {
                uid: uid.into(),
                device: device.into(),
                device_kind: kind,
                channels: vec![0],
                oscillator: None,
                precompensation: None,
            },
        }
    }

    pub fn channels(mut self, channels: Vec<u16>) -> Self {
        self.inner.channels = channels;
        self
    }

    pub fn oscillator(
        mut self,
        uid: impl Into<OscillatorUid>,
        frequency: ValueOrParameter<f64>,
        kind: OscillatorKind,
    ) -> Self {
        self.inner.oscillator = Some(Oscillator {
            uid: uid.into(),
            frequency,
            kind,
        });
        self
    }

    pub fn precompensation(mut self, precompensation: Precompensation) -> Self {
        self.inner.precompensation = Some(precompensation);
        self
    }

    pub fn build(self) -> ExperimentSignal {
        self.inner
    }
}

pub struct SectionBuilder {
    inner: Section,
}

impl SectionBuilder {
    pub fn new(uid: impl Into<SectionUid>) -> Self {
        Self {
            inner: Section {
                uid: uid.into(),
                kind: SectionKind::Section,
                alignment: SectionAlignment::Left,
                length: None,
                reserved_signals: vec![],
                children: vec![],
            },
        }
    }

    /// A real-time sweep over `parameters`, all of which must have `count` values.
    pub fn sweep(uid: impl Into<SectionUid>, parameters: Vec<SweepParameter>, count: usize) -> Self {
        Self::new(uid).kind(SectionKind::Sweep { parameters, count })
    }

    pub fn averaging(uid: impl Into<SectionUid>, count: usize) -> Self {
        Self::new(uid).kind(SectionKind::Averaging { count })
    }

    pub fn match_(uid: impl Into<SectionUid>) -> Self {
        Self::new(uid).kind(SectionKind::Match)
    }

    pub fn case(uid: impl Into<SectionUid>, state: u16) -> Self {
        Self::new(uid).kind(SectionKind::Case { state })
    }

    pub fn kind(mut self, kind: SectionKind) -> Self {
        self.inner.kind = kind;
        self
    }

    pub fn alignment(mut self, alignment: SectionAlignment) -> Self {
        self.inner.alignment = alignment;
        self
    }

    pub fn length(mut self, length: i64) -> Self {
        self.inner.length = Some(length);
        self
    }

    pub fn reserve(mut self, signal: impl Into<SignalUid>) -> Self {
        self.inner.reserved_signals.push(signal.into());
        self
    }

    pub fn section(mut self, section: Section) -> Self {
        self.inner.children.push(SectionItem::Section(section));
        self
    }

    pub fn operation(mut self, operation: impl Into<Operation>) -> Self {
        self.inner.children.push(SectionItem::Operation(operation.into()));
        self
    }

    pub fn build(self) -> Section {
        self.inner
    }
}

pub struct PlayPulseBuilder {
    inner: PlayPulse,
}

impl PlayPulseBuilder {
    pub fn new(signal: impl Into<SignalUid>, pulse: impl Into<PulseUid>, length: i64) -> Self {
        Self {
            inner: PlayPulse {
                signal: signal.into(),
                pulse: Some(pulse.into()),
                length: ValueOrParameter::Value(length),
                amplitude: ValueOrParameter::Value(1.0),
                phase: None,
                set_oscillator_phase: None,
                increment_oscillator_phase: None,
                pulse_parameters: vec![],
                markers: vec![],
                precompensation_clear: false,
            },
        }
    }

    /// A playback without a pulse function, e.g. a pure phase change.
    pub fn without_pulse(signal: impl Into<SignalUid>) -> Self {
        let mut builder = Self::new(signal, "", 0);
        builder.inner.amplitude = ValueOrParameter::Value(0.0);
        builder.inner.pulse = None;
        builder
    }

    pub fn length(mut self, value: ValueOrParameter<i64>) -> Self {
        self.inner.length = value;
        self
    }

    pub fn amplitude(mut self, value: ValueOrParameter<f64>) -> Self {
        self.inner.amplitude = value;
        self
    }

    pub fn phase(mut self, value: ValueOrParameter<f64>) -> Self {
        self.inner.phase = Some(value);
        self
    }

    pub fn set_oscillator_phase(mut self, value: ValueOrParameter<f64>) -> Self {
        self.inner.set_oscillator_phase = Some(value);
        self
    }

    pub fn increment_oscillator_phase(mut self, value: ValueOrParameter<f64>) -> Self {
        self.inner.increment_oscillator_phase = Some(value);
        self
    }

    pub fn pulse_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<PulseParameterValue>,
    ) -> Self {
        self.inner
            .pulse_parameters
            .push((name.into(), PulseParameter::Value(value.into())));
        self
    }

    pub fn swept_pulse_parameter(mut self, name: impl Into<String>, parameter: ParameterUid) -> Self {
        self.inner
            .pulse_parameters
            .push((name.into(), PulseParameter::Parameter(parameter)));
        self
    }

    pub fn marker(mut self, marker: Marker) -> Self {
        self.inner.markers.push(marker);
        self
    }

    pub fn precompensation_clear(mut self) -> Self {
        self.inner.precompensation_clear = true;
        self
    }

    pub fn build(self) -> PlayPulse {
        self.inner
    }
}

impl From<PlayPulse> for Operation {
    fn from(value: PlayPulse) -> Self {
        Operation::PlayPulse(value)
    }
}

impl From<PlayPulseBuilder> for Operation {
    fn from(value: PlayPulseBuilder) -> Self {
        Operation::PlayPulse(value.build())
    }
}

impl Acquire {
    pub fn new(signal: impl Into<SignalUid>, handle: impl Into<HandleUid>, length: i64) -> Self {
        Self {
            signal: signal.into(),
            handle: handle.into(),
            length: ValueOrParameter::Value(length),
        }
    }
}

impl From<Acquire> for Operation {
    fn from(value: Acquire) -> Self {
        Operation::Acquire(value)
    }
}

impl Delay {
    pub fn new(signal: impl Into<SignalUid>, length: i64) -> Self {
        Self {
            signal: signal.into(),
            length: ValueOrParameter::Value(length),
        }
    }

    /// A delay whose length is swept by `parameter`.
    pub fn swept(signal: impl Into<SignalUid>, parameter: ParameterUid) -> Self {
        Self {
            signal: signal.into(),
            length: ValueOrParameter::Parameter(parameter),
        }
    }
}

impl From<Delay> for Operation {
    fn from(value: Delay) -> Self {
        Operation::Delay(value)
    }
}
