// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::experiment::types::{
    DeviceUid, Experiment, Oscillator, OscillatorKind, OscillatorUid, SignalUid,
};
use crate::parameter_resolver::ParameterResolver;

/// Frequency of the software oscillators per signal.
pub(crate) type SoftwareOscillators = BTreeMap<SignalUid, f64>;

/// Check that signals sharing an oscillator or an output channel agree on it.
///
/// Returns the resolved frequencies of the software oscillators.
///
/// Hardware oscillators swept by a parameter are set by the controller, their
/// frequency is not a dependency of the real-time program and thus not resolved.
pub(super) fn resolve_oscillators(
    experiment: &Experiment,
    resolver: &ParameterResolver,
) -> Result<SoftwareOscillators> {
    let mut oscillators: HashMap<&OscillatorUid, (&SignalUid, &Oscillator)> = HashMap::new();
    let mut channels: HashMap<(&DeviceUid, u16), (&SignalUid, Option<&OscillatorUid>)> =
        HashMap::new();
    let mut software_oscillators = SoftwareOscillators::new();

    for signal in experiment.signals.values() {
        let oscillator_uid = signal.oscillator.as_ref().map(|osc| &osc.uid);
        for channel in signal.channels.iter() {
            if let Some((other, other_oscillator)) =
                channels.insert((&signal.device, *channel), (&signal.uid, oscillator_uid))
                && other_oscillator != oscillator_uid
            {
                return Err(Error::configuration(format!(
                    "Signals '{other}' and '{}' share channel {channel} of device '{}' but use different oscillators.",
                    signal.uid, signal.device
                )));
            }
        }

        let Some(oscillator) = &signal.oscillator else {
            continue;
        };
        if let Some((other, other_oscillator)) =
            oscillators.insert(&oscillator.uid, (&signal.uid, oscillator))
        {
            if other_oscillator.kind != oscillator.kind {
                return Err(Error::configuration(format!(
                    "Oscillator '{}' is used as hardware and software oscillator by signals '{other}' and '{}'.",
                    oscillator.uid, signal.uid
                )));
            }
            if other_oscillator.frequency != oscillator.frequency {
                return Err(Error::configuration(format!(
                    "Oscillator '{}' is used by signals '{other}' and '{}' with different frequencies.",
                    oscillator.uid, signal.uid
                )));
            }
        }
        if oscillator.kind == OscillatorKind::Software {
            software_oscillators.insert(
                signal.uid.clone(),
                resolver.resolve_f64(&oscillator.frequency)?,
            );
        }
    }
    Ok(software_oscillators)
}
