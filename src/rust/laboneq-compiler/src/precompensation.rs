// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Precompensation filter chains and the delay they add to a signal.

use std::collections::BTreeMap;

use laboneq_common::types::{DeviceUid, SignalUid};
use laboneq_scheduler::experiment::types::{
    BounceCompensation, ExponentialCompensation, Experiment, FirCompensation, Precompensation,
};

use crate::error::{Error, Result};

const DELAY_BASE: i64 = 72;
const DELAY_PER_EXPONENTIAL: i64 = 88;
const DELAY_HIGH_PASS: i64 = 96;
const DELAY_BOUNCE: i64 = 32;
const DELAY_FIR: i64 = 136;

/// Precompensation of a signal after harmonization with the signals on the same AWG.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalPrecompensation {
    pub precompensation: Option<Precompensation>,
    /// Delay of the filter chain in samples
    pub computed_delay_samples: i64,
}

/// Whether the filter chain has any effect.
pub fn precompensation_is_nonzero(precompensation: Option<&Precompensation>) -> bool {
    precompensation.is_some_and(|p| {
        !p.exponential.is_empty() || p.high_pass.is_some() || p.bounce.is_some() || p.fir.is_some()
    })
}

/// Additional delay in samples caused by the filter chain.
pub fn precompensation_delay_samples(precompensation: Option<&Precompensation>) -> i64 {
    let Some(p) = precompensation.filter(|p| precompensation_is_nonzero(Some(p))) else {
        return 0;
    };
    let mut delay = DELAY_BASE + DELAY_PER_EXPONENTIAL * p.exponential.len() as i64;
    if p.high_pass.is_some() {
        delay += DELAY_HIGH_PASS;
    }
    if p.bounce.is_some() {
        delay += DELAY_BOUNCE;
    }
    if p.fir.is_some() {
        delay += DELAY_FIR;
    }
    delay
}

/// Give all signals of one AWG the same filter timing.
///
/// The high-pass filter must be enabled on all or none of the signals. The other
/// filters are added with zero effect where missing.
fn adapt_precompensations_of_awg(
    signals: &[&SignalUid],
    precompensations: &mut BTreeMap<SignalUid, Option<Precompensation>>,
) -> Result<()> {
    let mut number_of_exponentials = 0;
    let mut has_high_pass = None;
    let mut has_bounce = false;
    let mut has_fir = false;
    for &signal in signals {
        let precompensation = precompensations.get(signal).and_then(Option::as_ref);
        let high_pass = precompensation.is_some_and(|p| p.high_pass.is_some());
        match has_high_pass {
            None => has_high_pass = Some(high_pass),
            Some(other) if other != high_pass => {
                return Err(Error::configuration(format!(
                    "All precompensation settings for outputs of the same AWG must have the high pass filter enabled or disabled; see signal '{signal}'."
                )));
            }
            _ => {}
        }
        if let Some(p) = precompensation {
            number_of_exponentials = number_of_exponentials.max(p.exponential.len());
            has_bounce |= p.bounce.is_some();
            has_fir |= p.fir.is_some();
        }
    }
    if !(has_bounce || has_fir || number_of_exponentials > 0) {
        return Ok(());
    }
    for &signal in signals {
        let entry = precompensations.entry(signal.clone()).or_default();
        let p = entry.get_or_insert_with(Precompensation::default);
        p.exponential.resize(
            number_of_exponentials.max(p.exponential.len()),
            ExponentialCompensation {
                timeconstant: 10e-9,
                amplitude: 0.0,
            },
        );
        if has_bounce && p.bounce.is_none() {
            p.bounce = Some(BounceCompensation {
                delay: 10e-9,
                amplitude: 0.0,
            });
        }
        if has_fir && p.fir.is_none() {
            p.fir = Some(FirCompensation {
                coefficients: vec![1.0],
            });
        }
    }
    Ok(())
}

/// Harmonize the precompensations of signals sharing an AWG and compute their delays.
pub fn compute_precompensations_and_delays(
    experiment: &Experiment,
) -> Result<BTreeMap<SignalUid, SignalPrecompensation>> {
    let mut precompensations: BTreeMap<SignalUid, Option<Precompensation>> = experiment
        .signals
        .values()
        .map(|signal| (signal.uid.clone(), signal.precompensation.clone()))
        .collect();
    let mut signals_by_awg: BTreeMap<(&DeviceUid, u16), Vec<&SignalUid>> = BTreeMap::new();
    for signal in experiment.signals.values() {
        signals_by_awg
            .entry((&signal.device, signal.awg_index()))
            .or_default()
            .push(&signal.uid);
    }
    for signals in signals_by_awg.values() {
        if signals.len() > 1 {
            adapt_precompensations_of_awg(signals, &mut precompensations)?;
        }
    }
    Ok(precompensations
        .into_iter()
        .map(|(signal, precompensation)| {
            let computed_delay_samples = precompensation_delay_samples(precompensation.as_ref());
            (
                signal,
                SignalPrecompensation {
                    precompensation,
                    computed_delay_samples,
                },
            )
        })
        .collect())
}
