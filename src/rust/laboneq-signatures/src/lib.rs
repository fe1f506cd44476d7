// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Content-addressed signatures of waveforms and playbacks.
//!
//! A [`WaveformSignature`] identifies the samples stored in waveform memory, a
//! [`PlaybackSignature`] identifies one playback command (command table entry)
//! including the phase registers written along with it.

pub mod playback;
pub mod pulse_parameters;
pub mod signature;
mod utils;

pub use playback::{PlaybackSignature, reduce_signature_phase};
pub use pulse_parameters::{PulseParameterSet, PulseParameterValue};
pub use signature::{
    Marker, PulseSignature, StableHash, WaveformSignature, compute_waveform_signature,
};
pub use utils::string_sanitize;
