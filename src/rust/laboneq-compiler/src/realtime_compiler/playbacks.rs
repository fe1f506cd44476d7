// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, HashMap};
use std::f64::consts::TAU;

use indexmap::IndexMap;
use laboneq_common::types::SignalUid;
use laboneq_scheduler::experiment::types::{Experiment, OscillatorKind};
use laboneq_scheduler::{CompilerSettings, Event, EventId, EventKind, PlayInfo};
use laboneq_signatures::{
    PlaybackSignature, PulseSignature, StableHash, WaveformSignature, compute_waveform_signature,
    reduce_signature_phase,
};
use serde::Serialize;

use crate::error::{Error, Result};

/// A play event and the playback it resolved to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackEvent {
    pub event_id: EventId,
    pub signal: SignalUid,
    /// Start in samples
    pub time: i64,
    pub playback: StableHash,
    /// Name of the waveform in waveform memory, `None` for playbacks without samples
    pub waveform_name: Option<String>,
}

/// Deduplicated waveforms and playbacks of a real-time program.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignatureTables {
    pub waveforms: IndexMap<StableHash, WaveformSignature>,
    pub playbacks: IndexMap<StableHash, PlaybackSignature>,
    pub playback_events: Vec<PlaybackEvent>,
}

#[derive(Default)]
struct OscillatorState {
    /// Accumulated oscillator phase set or incremented by the plays
    phase: f64,
    /// Phase last written to the hardware oscillator register
    hw_phase: Option<f64>,
}

struct PlayRef<'a> {
    event: &'a Event,
    signal: &'a SignalUid,
    play: &'a PlayInfo,
    /// Branch state of the enclosing case, if any
    state: Option<u16>,
}

/// Resolve the play events to waveform and playback signatures.
///
/// The plays are visited in time order, tracking the oscillator phase of
/// each signal across plays.
pub(super) fn collect_playbacks(
    events: &[Event],
    experiment: &Experiment,
    software_oscillators: &BTreeMap<SignalUid, f64>,
    settings: &CompilerSettings,
) -> Result<SignatureTables> {
    let mut end_times: HashMap<EventId, i64> = HashMap::new();
    // Branch state of the innermost enclosing case, per open section
    let mut open_sections: Vec<Option<u16>> = vec![];
    let mut plays = vec![];
    for event in events {
        match &event.kind {
            EventKind::PlayStart { signal, play, .. } => plays.push(PlayRef {
                event,
                signal,
                play,
                state: open_sections.last().copied().flatten(),
            }),
            EventKind::PlayEnd {
                chain_element_id, ..
            } => {
                end_times.insert(*chain_element_id, event.time);
            }
            EventKind::SectionStart { state, .. } => {
                let enclosing = open_sections.last().copied().flatten();
                open_sections.push(state.or(enclosing));
            }
            EventKind::SectionEnd { .. } => {
                open_sections.pop();
            }
            _ => {}
        }
    }
    plays.sort_by_key(|p| (p.event.time, p.event.id));

    let mut oscillator_states: HashMap<&SignalUid, OscillatorState> = HashMap::new();
    let mut tables = SignatureTables::default();
    for PlayRef {
        event,
        signal,
        play,
        state: branch_state,
    } in plays
    {
        let signal_info = experiment
            .signal(signal)
            .ok_or_else(|| Error::new(format!("Unknown signal '{signal}'.")))?;
        let end = end_times
            .get(&event.id)
            .expect("Internal error: Play start without play end");
        let length = end - event.time;

        let state = oscillator_states.entry(signal).or_default();
        if let Some(phase) = play.set_oscillator_phase {
            state.phase = phase;
        }
        if let Some(increment) = play.increment_oscillator_phase {
            state.phase += increment;
        }

        let hw_oscillator = signal_info
            .oscillator
            .as_ref()
            .filter(|osc| osc.kind == OscillatorKind::Hardware);
        let use_ct_phase = settings.use_command_table_phase
            && signal_info.device_kind.traits().supports_command_table_phase
            && hw_oscillator.is_some();

        let waveform = play.pulse.as_ref().map(|pulse| {
            let software_frequency = software_oscillators.get(signal).copied();
            let pulse = PulseSignature {
                start: 0,
                pulse: Some(pulse.clone()),
                length,
                amplitude: Some(play.amplitude),
                phase: play.phase,
                oscillator_phase: software_frequency
                    .map(|f| TAU * f * event.time as f64 / experiment.sampling_rate),
                oscillator_frequency: software_frequency,
                baseband_phase: (state.phase != 0.0).then_some(state.phase),
                channel: signal_info.channels.first().copied(),
                sub_channel: None,
                pulse_parameters: play.pulse_parameters.clone(),
                markers: play.markers.clone(),
            };
            compute_waveform_signature([pulse], length)
        });
        let mut playback = PlaybackSignature {
            waveform,
            hw_oscillator: hw_oscillator.map(|osc| osc.uid.clone()),
            pulse_parameters: vec![play.pulse_parameters.clone()],
            state: branch_state,
            clear_precompensation: play.precompensation_clear,
            ..Default::default()
        };
        if playback.waveform.is_some() {
            playback = reduce_signature_phase(&playback, use_ct_phase, state.hw_phase);
        } else if use_ct_phase {
            // Pure phase change without samples
            if play.set_oscillator_phase.is_some() {
                playback.set_phase = Some(state.phase);
            } else if let Some(increment) = play.increment_oscillator_phase {
                playback.increment_phase = Some(increment);
            }
        }
        if use_ct_phase {
            state.hw_phase = Some(state.phase);
        }
        playback.quantize_phase(settings.phase_resolution_range());

        let waveform_name = playback.waveform.as_ref().map(|waveform| {
            tables
                .waveforms
                .entry(waveform.stable_hash())
                .or_insert_with(|| waveform.clone());
            waveform.signature_string()
        });
        let playback_hash = playback.stable_hash();
        tables.playbacks.entry(playback_hash).or_insert(playback);
        tables.playback_events.push(PlaybackEvent {
            event_id: event.id,
            signal: signal.clone(),
            time: event.time,
            playback: playback_hash,
            waveform_name,
        });
    }
    Ok(tables)
}
