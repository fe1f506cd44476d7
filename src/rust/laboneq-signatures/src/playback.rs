// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::f64::consts::TAU;
use std::hash::{Hash, Hasher};

use laboneq_common::types::OscillatorUid;
use laboneq_common::utils::{normalize_f64, normalize_phase};
use serde::Serialize;

use crate::pulse_parameters::PulseParameterSet;
use crate::signature::{StableHash, WaveformSignature, serialize_canonical};

/// Number of steps per turn for phases written to device registers.
const PHASE_RESOLUTION_CT: u64 = 1 << 48;

/// Quantize `value` to `steps` equidistant points on `[0, 2π)`.
///
/// Rounding happens on the step index, so a quantized phase maps back onto
/// exactly the same bits when quantized again.
fn quantize_to_steps(value: f64, steps: u64) -> f64 {
    let steps = steps as i64;
    let index = (value / TAU * steps as f64).round() as i64;
    index.rem_euclid(steps) as f64 / steps as f64 * TAU
}

/// Signature of the output produced by a single playback command.
///
/// When using the command table, a single waveform may be used by different table
/// entries (different playbacks). This structure captures the additional
/// information beyond the sampled waveform.
///
/// Of `set_phase` and `increment_phase` at most one is meaningful for a playback.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlaybackSignature {
    /// `None` for a playback that only changes device state
    pub waveform: Option<WaveformSignature>,
    pub hw_oscillator: Option<OscillatorUid>,
    /// User pulse parameters, one set per pulse slot
    pub pulse_parameters: Vec<PulseParameterSet>,
    /// Branch state of the enclosing match case
    pub state: Option<u16>,
    /// Absolute oscillator phase written to the phase register
    #[serde(serialize_with = "serialize_canonical")]
    pub set_phase: Option<f64>,
    /// Relative oscillator phase added to the phase register
    #[serde(serialize_with = "serialize_canonical")]
    pub increment_phase: Option<f64>,
    pub clear_precompensation: bool,
}

impl PartialEq for PlaybackSignature {
    fn eq(&self, other: &Self) -> bool {
        self.waveform == other.waveform
            && self.hw_oscillator == other.hw_oscillator
            && self.pulse_parameters == other.pulse_parameters
            && self.state == other.state
            && self.set_phase.map(normalize_f64) == other.set_phase.map(normalize_f64)
            && self.increment_phase.map(normalize_f64)
                == other.increment_phase.map(normalize_f64)
            && self.clear_precompensation == other.clear_precompensation
    }
}

impl Eq for PlaybackSignature {}

impl Hash for PlaybackSignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.waveform.hash(state);
        self.hw_oscillator.hash(state);
        self.pulse_parameters.hash(state);
        self.state.hash(state);
        self.set_phase.map(normalize_f64).hash(state);
        self.increment_phase.map(normalize_f64).hash(state);
        self.clear_precompensation.hash(state);
    }
}

impl PlaybackSignature {
    /// Hash over the complete playback, the deduplication key of command table entries.
    pub fn stable_hash(&self) -> StableHash {
        StableHash::of(self)
    }

    /// Quantize the phase of all pulses in the waveform.
    ///
    /// For the phase that is baked into the samples, we can quantize to the precision
    /// given by `phase_resolution_range`; a range of 0 disables this quantization.
    /// For the phase specified by registers on the device (e.g. command table) we
    /// quantize to a fixed precision of 48 bits. This serves to avoid rounding errors
    /// leading to multiple command table entries.
    ///
    /// All phases are normalized into `[0, 2π)`.
    pub fn quantize_phase(&mut self, phase_resolution_range: u64) {
        if let Some(waveform) = self.waveform.as_mut() {
            for pulse in waveform.pulses.iter_mut() {
                pulse.phase = pulse.phase.map(|phase| match phase_resolution_range {
                    0 => normalize_phase(phase),
                    steps => quantize_to_steps(phase, steps),
                });
            }
        }
        self.set_phase = self
            .set_phase
            .map(|phase| quantize_to_steps(phase, PHASE_RESOLUTION_CT));
        self.increment_phase = self
            .increment_phase
            .map(|phase| quantize_to_steps(phase, PHASE_RESOLUTION_CT));
    }
}

/// Express the phase of a playback relative to the hardware oscillator.
///
/// With `use_ct_phase`, the oscillator phase of the playback is taken from the
/// baseband phase of its last pulse. It is written to the phase register either as
/// an increment relative to `prev_hw_oscillator_phase`, or as an absolute value when
/// the previous phase is unknown. The pulses are then re-expressed relative to that
/// phase, so the waveform no longer depends on the phase history.
///
/// Remaining baseband and oscillator phases are folded into the phase baked into
/// each pulse; the returned waveform carries neither of them.
pub fn reduce_signature_phase(
    signature: &PlaybackSignature,
    use_ct_phase: bool,
    prev_hw_oscillator_phase: Option<f64>,
) -> PlaybackSignature {
    let mut signature = signature.clone();
    let Some(waveform) = signature.waveform.as_mut() else {
        return signature;
    };

    if use_ct_phase {
        let this_hw_oscillator_phase = waveform
            .pulses
            .last()
            .and_then(|pulse| pulse.baseband_phase)
            .unwrap_or(0.0);
        match prev_hw_oscillator_phase {
            Some(prev) => {
                let increment = (this_hw_oscillator_phase - prev).rem_euclid(TAU);
                if increment != 0.0 {
                    signature.increment_phase = Some(increment);
                }
            }
            // Phase of the oscillator unknown, set it directly instead of incrementing
            None => signature.set_phase = Some(this_hw_oscillator_phase),
        }
        for pulse in waveform.pulses.iter_mut() {
            pulse.baseband_phase = Some(
                (pulse.baseband_phase.unwrap_or(0.0) - this_hw_oscillator_phase).rem_euclid(TAU),
            );
        }
    }

    // Absorb the baseband and oscillator phase into the phase baked into the samples
    for pulse in waveform.pulses.iter_mut() {
        if pulse.baseband_phase.is_none() && pulse.oscillator_phase.is_none() {
            continue;
        }
        let mut phase = pulse.phase.unwrap_or(0.0);
        if let Some(baseband_phase) = pulse.baseband_phase.take() {
            phase += baseband_phase;
        }
        if let Some(oscillator_phase) = pulse.oscillator_phase.take() {
            phase += oscillator_phase;
        }
        pulse.phase = Some(normalize_phase(phase));
    }
    signature
}
