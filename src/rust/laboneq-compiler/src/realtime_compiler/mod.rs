// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Compilation of the real-time part of an experiment for one set of
//! near-time parameter values.

mod playbacks;

use std::collections::BTreeMap;

use indexmap::IndexMap;
use laboneq_common::types::SignalUid;
use laboneq_log::{diagnostic, warn};
use laboneq_scheduler::experiment::types::Experiment;
use laboneq_scheduler::{CompilerSettings, Event, IdTracker, ParameterStore, schedule_experiment};
use laboneq_signatures::{PlaybackSignature, StableHash, WaveformSignature};

pub use playbacks::{PlaybackEvent, SignatureTables};

use crate::error::Result;
use crate::precompensation::{SignalPrecompensation, compute_precompensations_and_delays};

/// Output of a single real-time compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeCompilerOutput {
    /// Events published for inspection, limited to `max_events_to_publish`
    pub events: Vec<Event>,
    pub waveforms: IndexMap<StableHash, WaveformSignature>,
    pub playbacks: IndexMap<StableHash, PlaybackSignature>,
    pub playback_events: Vec<PlaybackEvent>,
    /// Precompensation delay of each signal in samples
    pub signal_delays: BTreeMap<SignalUid, i64>,
    /// Duration of one execution of the real-time program in seconds
    pub total_execution_time: f64,
}

/// A compiler of the real-time part of an experiment.
///
/// The near-time parameters read from `nt_parameters` are the dependencies
/// of the compiled program.
pub trait RealtimeCompiler {
    fn run(&mut self, nt_parameters: &ParameterStore) -> Result<RealtimeCompilerOutput>;
}

/// Real-time compiler: scheduling followed by signature resolution.
pub struct ExperimentRealtimeCompiler<'a> {
    experiment: &'a Experiment,
    settings: CompilerSettings,
    precompensations: BTreeMap<SignalUid, SignalPrecompensation>,
}

impl<'a> ExperimentRealtimeCompiler<'a> {
    pub fn new(experiment: &'a Experiment, mut settings: CompilerSettings) -> Result<Self> {
        laboneq_log::init_logging(settings.log_diagnostics);
        for change in settings.sanitize()? {
            warn!(
                "Compiler setting `{}` changed from {} to {}: {}",
                change.field,
                change.original,
                change.sanitized,
                change.reason
            );
        }
        let precompensations = compute_precompensations_and_delays(experiment)?;
        Ok(Self {
            experiment,
            settings,
            precompensations,
        })
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    pub fn precompensations(&self) -> &BTreeMap<SignalUid, SignalPrecompensation> {
        &self.precompensations
    }
}

impl RealtimeCompiler for ExperimentRealtimeCompiler<'_> {
    fn run(&mut self, nt_parameters: &ParameterStore) -> Result<RealtimeCompilerOutput> {
        let settings = &self.settings;
        let scheduled = schedule_experiment(self.experiment, nt_parameters)?;
        let id_tracker = IdTracker::new();

        // Compressed loops are represented by their first iteration only
        let events = scheduled.generate_event_list(usize::MAX, &id_tracker, false, settings)?;
        let tables = playbacks::collect_playbacks(
            &events,
            self.experiment,
            &scheduled.software_oscillators,
            settings,
        )?;

        let published_events = scheduled.generate_event_list(
            settings.max_events_to_publish,
            &id_tracker,
            settings.expand_loops_for_schedule,
            settings,
        )?;
        let total_execution_time = scheduled.length() as f64 / self.experiment.sampling_rate;
        diagnostic!(
            "Real-time compilation: {} events, {} waveforms, {} playbacks, {} s",
            events.len(),
            tables.waveforms.len(),
            tables.playbacks.len(),
            total_execution_time
        );
        Ok(RealtimeCompilerOutput {
            events: published_events,
            waveforms: tables.waveforms,
            playbacks: tables.playbacks,
            playback_events: tables.playback_events,
            signal_delays: self
                .precompensations
                .iter()
                .map(|(signal, p)| (signal.clone(), p.computed_delay_samples))
                .collect(),
            total_execution_time,
        })
    }
}
