// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! This module provides the `WaveformSignature` and `PulseSignature` types,
//! which are used to represent the signature of a waveform and its pulses.
//!
//! The signatures are used to uniquely identify waveforms and their pulses,
//! and to generate a unique waveform declaration string for them.
//!
//! The underlying promise is that two waveforms with equal signatures resolve
//! to the same samples, so only one of them needs to be stored in waveform memory.
//! The [`StableHash`] of a signature is computed over its complete canonical
//! serialization and is identical across runs, processes and machines.
use crate::pulse_parameters::PulseParameterSet;
use crate::utils::string_sanitize;
use laboneq_common::types::PulseUid;
use laboneq_common::utils::normalize_f64;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use sha1::{Digest, Sha1};
use std::fmt::{self, Write};
use std::hash::{Hash, Hasher};

fn canonical(value: f64) -> f64 {
    f64::from_bits(normalize_f64(value))
}

pub(crate) fn serialize_canonical<S>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    value.map(canonical).serialize(serializer)
}

fn eq_f64(a: &Option<f64>, b: &Option<f64>) -> bool {
    a.map(normalize_f64) == b.map(normalize_f64)
}

/// Marker played along with a pulse.
#[derive(Debug, Clone)]
pub struct Marker {
    pub marker_selector: String,
    pub enable: bool,
    pub start: Option<f64>,
    pub length: Option<f64>,
    pub pulse_id: Option<String>,
}

impl PartialEq for Marker {
    fn eq(&self, other: &Self) -> bool {
        self.marker_selector == other.marker_selector
            && self.enable == other.enable
            && eq_f64(&self.start, &other.start)
            && eq_f64(&self.length, &other.length)
            && self.pulse_id == other.pulse_id
    }
}

impl Eq for Marker {}

impl Hash for Marker {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.marker_selector.hash(state);
        self.enable.hash(state);
        self.start.map(normalize_f64).hash(state);
        self.length.map(normalize_f64).hash(state);
        self.pulse_id.hash(state);
    }
}

impl Serialize for Marker {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (
            &self.marker_selector,
            self.enable,
            self.start.map(canonical),
            self.length.map(canonical),
            &self.pulse_id,
        )
            .serialize(serializer)
    }
}

/// Signature of a single pulse, part of a sampled waveform
#[derive(Debug, Clone, Default)]
pub struct PulseSignature {
    /// The samples offset of the pulse in the waveform
    pub start: i64,
    /// The pulse function, `None` for a pure oscillator or delay playback
    pub pulse: Option<PulseUid>,
    /// The length of the pulse in samples
    pub length: i64,
    pub amplitude: Option<f64>,
    /// The phase baked into the samples
    pub phase: Option<f64>,
    /// The oscillator phase of the pulse (for software oscillators)
    pub oscillator_phase: Option<f64>,
    /// The oscillator frequency of the pulse (for software oscillators)
    pub oscillator_frequency: Option<f64>,
    /// Phase offset accumulated from `set_oscillator_phase` and `increment_oscillator_phase`
    pub baseband_phase: Option<f64>,
    /// The channel of the pulse (for HDAWG)
    pub channel: Option<u16>,
    /// The sub-channel of the pulse (for SHFQA)
    pub sub_channel: Option<u8>,
    /// Additional user pulse parameters
    pub pulse_parameters: PulseParameterSet,
    /// Markers played during this pulse
    pub markers: Vec<Marker>,
}

impl PulseSignature {
    pub fn end(&self) -> i64 {
        self.start + self.length
    }
}

impl PartialEq for PulseSignature {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start
            && self.pulse == other.pulse
            && self.length == other.length
            && eq_f64(&self.amplitude, &other.amplitude)
            && eq_f64(&self.phase, &other.phase)
            && eq_f64(&self.oscillator_phase, &other.oscillator_phase)
            && eq_f64(&self.oscillator_frequency, &other.oscillator_frequency)
            && eq_f64(&self.baseband_phase, &other.baseband_phase)
            && self.channel == other.channel
            && self.sub_channel == other.sub_channel
            && self.pulse_parameters == other.pulse_parameters
            && self.markers == other.markers
    }
}

impl Eq for PulseSignature {}

impl Hash for PulseSignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.start.hash(state);
        self.pulse.hash(state);
        self.length.hash(state);
        self.amplitude.map(normalize_f64).hash(state);
        self.phase.map(normalize_f64).hash(state);
        self.oscillator_phase.map(normalize_f64).hash(state);
        self.oscillator_frequency.map(normalize_f64).hash(state);
        self.baseband_phase.map(normalize_f64).hash(state);
        self.channel.hash(state);
        self.sub_channel.hash(state);
        self.pulse_parameters.hash(state);
        self.markers.hash(state);
    }
}

impl Serialize for PulseSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("PulseSignature", 12)?;
        state.serialize_field("start", &self.start)?;
        state.serialize_field("pulse", &self.pulse)?;
        state.serialize_field("length", &self.length)?;
        state.serialize_field("amplitude", &self.amplitude.map(canonical))?;
        state.serialize_field("phase", &self.phase.map(canonical))?;
        state.serialize_field("oscillator_phase", &self.oscillator_phase.map(canonical))?;
        state.serialize_field(
            "oscillator_frequency",
            &self.oscillator_frequency.map(canonical),
        )?;
        state.serialize_field("baseband_phase", &self.baseband_phase.map(canonical))?;
        state.serialize_field("channel", &self.channel)?;
        state.serialize_field("sub_channel", &self.sub_channel)?;
        state.serialize_field("pulse_parameters", &self.pulse_parameters)?;
        state.serialize_field("markers", &self.markers)?;
        state.end()
    }
}

/// SHA-1 digest of the canonical serialization of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StableHash([u8; 20]);

impl StableHash {
    /// Hash the canonical JSON representation of `value`.
    ///
    /// The value is first converted into a `serde_json::Value`, whose object maps
    /// are ordered by key, so the resulting text does not depend on field order.
    pub(crate) fn of<T: Serialize>(value: &T) -> Self {
        let canonical = serde_json::to_value(value)
            .expect("Internal error: Signature serialization failed while hashing");
        let mut hasher = Sha1::new();
        hasher.update(canonical.to_string().as_bytes());
        StableHash(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// The first `len` characters of the hexadecimal digest.
    pub fn short(&self, len: usize) -> String {
        let mut hex = self.to_string();
        hex.truncate(len);
        hex
    }
}

impl fmt::Display for StableHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Serialize for StableHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Signature of a waveform as stored in waveform memory.
///
/// The underlying promise is that two waveforms with the same signature are
/// guaranteed to resolve to the same samples, so we need only store one of them and
/// can use them interchangeably.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WaveformSignature {
    /// The length of the waveform in samples
    pub length: i64,
    /// The pulses that make up the waveform, ordered by start
    pub pulses: Vec<PulseSignature>,
}

/// Create the signature of a waveform of `length` samples made of `pulses`.
///
/// The pulses must be supplied in order of their start.
pub fn compute_waveform_signature(
    pulses: impl IntoIterator<Item = PulseSignature>,
    length: i64,
) -> WaveformSignature {
    let pulses: Vec<_> = pulses.into_iter().collect();
    debug_assert!(
        pulses.windows(2).all(|w| w[0].start <= w[1].start),
        "Pulses of a waveform signature must be ordered by start"
    );
    WaveformSignature { length, pulses }
}

impl WaveformSignature {
    /// The number of characters of the property part of the signature string.
    const MAX_LEN_PROPERTY_PARTS: usize = 56;
    /// The number of hexadecimal hash characters appended to the signature string.
    const HASH_LEN: usize = 7;

    /// Hash over the entire structural content of the signature.
    ///
    /// This is the deduplication key of the waveform.
    pub fn stable_hash(&self) -> StableHash {
        StableHash::of(self)
    }

    pub fn is_playzero(&self) -> bool {
        self.pulses.iter().all(|pulse| pulse.pulse.is_none())
    }

    fn try_write_limited(buf: &mut String, args: fmt::Arguments) -> bool {
        let mut temp = String::new();
        temp.write_fmt(args)
            .expect("Internal error: Formatting into a string failed");
        if buf.len() + temp.len() <= WaveformSignature::MAX_LEN_PROPERTY_PARTS {
            buf.push_str(&temp);
            true
        } else {
            false
        }
    }

    /// Create a human readable name of the waveform.
    ///
    /// The leading properties of the waveform are encoded until the character budget
    /// is exhausted, stopping at the first field that does not fit. The string always
    /// ends with the first 7 hexadecimal characters of the stable hash, which keeps
    /// names of different waveforms apart even when the property part coincides.
    pub fn signature_string(&self) -> String {
        let mut retval = String::with_capacity(
            WaveformSignature::MAX_LEN_PROPERTY_PARTS + WaveformSignature::HASH_LEN + 1,
        );
        retval.push_str(&format!("p_{:04}", self.length));

        'pulse_loop: for pulse in &self.pulses {
            retval.push('_');
            if let Some(uid) = &pulse.pulse {
                retval.push_str(uid.as_str());
            }
            // (separator, value, scale, fill)
            let fields: [(&str, Option<f64>, f64, usize); 7] = [
                ("_", Some(pulse.start as f64), 1.0, 2),
                ("_a", pulse.amplitude, 1e9, 10),
                ("_l", Some(pulse.length as f64), 1.0, 3),
                ("_bb", pulse.baseband_phase, 1.0, 7),
                ("_c", pulse.channel.map(f64::from), 1.0, 0),
                ("_sc", pulse.sub_channel.map(f64::from), 1.0, 0),
                ("_ap", pulse.phase, 1.0, 0),
            ];
            for (sep, value, scale, fill) in fields {
                let Some(value) = value else {
                    continue;
                };
                let sign = if value < 0.0 { "m" } else { "" };
                let rounded = (value * scale).round().abs() as i64;
                if !WaveformSignature::try_write_limited(
                    &mut retval,
                    format_args!("{sep}{sign}{rounded:0fill$}"),
                ) {
                    break 'pulse_loop;
                }
            }
        }

        let retval = string_sanitize(&retval);
        format!(
            "{}_{}",
            retval,
            self.stable_hash().short(WaveformSignature::HASH_LEN)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse_parameters::PulseParameterValue;
    use std::hash::DefaultHasher;

    fn create_hash<T: Hash>(t: &T) -> u64 {
        let mut s = DefaultHasher::new();
        t.hash(&mut s);
        s.finish()
    }

    fn create_pulse_signature() -> PulseSignature {
        PulseSignature {
            start: 0,
            pulse: Some(PulseUid::from("gaussian")),
            length: 64,
            amplitude: Some(0.5),
            phase: Some(0.0),
            channel: Some(0),
            ..Default::default()
        }
    }

    #[test]
    fn test_identical_content_hashes_equal() {
        let wf0 = compute_waveform_signature([create_pulse_signature()], 64);
        let wf1 = compute_waveform_signature([create_pulse_signature()], 64);
        assert_eq!(wf0, wf1);
        assert_eq!(create_hash(&wf0), create_hash(&wf1));
        assert_eq!(wf0.stable_hash(), wf1.stable_hash());
        assert_eq!(wf0.signature_string(), wf1.signature_string());
    }

    #[test]
    fn test_stable_hash_is_fixed() {
        // The digest must not change between runs or machines.
        let wf = compute_waveform_signature([create_pulse_signature()], 64);
        let hash = wf.stable_hash();
        assert_eq!(
            hash.to_string(),
            "1f37ad55867b600f1a297d452b3f62b57d136486"
        );
        assert_eq!(hash.short(7), "1f37ad5");
        assert!(wf.signature_string().ends_with("_1f37ad5"));
    }

    #[test]
    fn test_parameter_order_does_not_matter() {
        let mut p0 = create_pulse_signature();
        p0.pulse_parameters.insert("beta", 0.2_f64);
        p0.pulse_parameters.insert("sigma", 0.3_f64);
        let mut p1 = create_pulse_signature();
        p1.pulse_parameters = [
            ("sigma", PulseParameterValue::from(0.3_f64)),
            ("beta", PulseParameterValue::from(0.2_f64)),
        ]
        .into_iter()
        .collect();
        let wf0 = compute_waveform_signature([p0], 64);
        let wf1 = compute_waveform_signature([p1], 64);
        assert_eq!(wf0.stable_hash(), wf1.stable_hash());
    }

    /// Test signature sensitivity for all relevant fields of `PulseSignature`.
    #[test]
    fn test_signature_pulse_sensitivity() {
        let p0 = create_pulse_signature();

        type PulseSignatureMutator = Box<dyn Fn(&mut PulseSignature)>;
        let cases: Vec<(&str, PulseSignatureMutator)> = vec![
            ("start", Box::new(|p: &mut PulseSignature| p.start += 1)),
            ("pulse", Box::new(|p: &mut PulseSignature| p.pulse = None)),
            ("length", Box::new(|p: &mut PulseSignature| p.length += 1)),
            ("amplitude", Box::new(|p: &mut PulseSignature| p.amplitude = Some(0.6))),
            ("phase", Box::new(|p: &mut PulseSignature| p.phase = Some(0.1))),
            ("oscillator_phase", Box::new(|p: &mut PulseSignature| p.oscillator_phase = Some(0.1))),
            (
                "oscillator_frequency",
                Box::new(|p: &mut PulseSignature| p.oscillator_frequency = Some(1e6)),
            ),
            ("baseband_phase", Box::new(|p: &mut PulseSignature| p.baseband_phase = Some(0.1))),
            ("channel", Box::new(|p: &mut PulseSignature| p.channel = Some(1))),
            ("sub_channel", Box::new(|p: &mut PulseSignature| p.sub_channel = Some(1))),
            (
                "pulse_parameters",
                Box::new(|p: &mut PulseSignature| p.pulse_parameters.insert("beta", 1_i64)),
            ),
            (
                "markers",
                Box::new(|p: &mut PulseSignature| {
                    p.markers.push(Marker {
                        marker_selector: "marker1".to_string(),
                        enable: true,
                        start: None,
                        length: None,
                        pulse_id: None,
                    })
                }),
            ),
        ];

        let waveform0 = compute_waveform_signature([p0.clone()], 64);
        for (desc, mutator) in cases.iter() {
            let mut p1 = p0.clone();
            mutator(&mut p1);
            let waveform1 = compute_waveform_signature([p1], 64);
            assert_ne!(waveform0, waveform1, "Equality failed on field: {desc}");
            assert_ne!(
                create_hash(&waveform0),
                create_hash(&waveform1),
                "Hash sensitivity failed on field: {desc}",
            );
            assert_ne!(
                waveform0.stable_hash(),
                waveform1.stable_hash(),
                "Stable hash sensitivity failed on field: {desc}",
            );
            assert_ne!(
                waveform0.signature_string(),
                waveform1.signature_string(),
                "Signature string sensitivity failed on field: {desc}"
            );
        }
    }

    #[test]
    fn test_signed_zero_compares_equal() {
        let mut p = create_pulse_signature();
        p.phase = Some(-0.0);
        let wf0 = compute_waveform_signature([p], 64);
        let wf1 = compute_waveform_signature([create_pulse_signature()], 64);
        assert_eq!(wf0, wf1);
        assert_eq!(create_hash(&wf0), create_hash(&wf1));
        assert_eq!(wf0.stable_hash(), wf1.stable_hash());
    }

    #[test]
    fn test_signature_string_format() {
        let wf = compute_waveform_signature([create_pulse_signature()], 64);
        let name = wf.signature_string();
        let hash = wf.stable_hash().short(7);
        assert_eq!(name, format!("p_0064_gaussian_00_a0500000000_l064_c0_ap0_{hash}"));
    }

    #[test]
    fn test_signature_string_truncates_at_budget() {
        let pulses = (0..8).map(|i| PulseSignature {
            start: i * 64,
            ..create_pulse_signature()
        });
        let wf = compute_waveform_signature(pulses, 512);
        let name = wf.signature_string();
        // Property part + '_' + 7 hash characters
        assert!(name.len() <= 56 + 1 + 7, "{name}");
        assert!(name.ends_with(&wf.stable_hash().short(7)));
    }

    #[test]
    fn test_truncated_names_keep_distinct_hash() {
        let make = |last_amplitude: f64| {
            let mut pulses: Vec<_> = (0..8)
                .map(|i| PulseSignature {
                    start: i * 64,
                    ..create_pulse_signature()
                })
                .collect();
            pulses[7].amplitude = Some(last_amplitude);
            compute_waveform_signature(pulses, 512)
        };
        let wf0 = make(0.5);
        let wf1 = make(0.25);
        let (name0, name1) = (wf0.signature_string(), wf1.signature_string());
        // The differing pulse does not fit the budget, only the hash tells them apart.
        assert_eq!(name0[..name0.len() - 7], name1[..name1.len() - 7]);
        assert_ne!(name0, name1);
    }

    #[test]
    fn test_negative_values_are_marked() {
        let mut p = create_pulse_signature();
        p.amplitude = Some(-0.5);
        let wf = compute_waveform_signature([p], 64);
        assert!(wf.signature_string().contains("_am0500000000"));
    }

    #[test]
    fn test_playzero() {
        let p = PulseSignature {
            length: 32,
            ..Default::default()
        };
        assert!(compute_waveform_signature([p], 32).is_playzero());
        assert!(!compute_waveform_signature([create_pulse_signature()], 64).is_playzero());
    }
}
