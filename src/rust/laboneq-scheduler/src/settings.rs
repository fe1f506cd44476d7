// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Module for defining settings for the compiler.
use serde::Deserialize;

use crate::{Error, Result};

/// Upper bound of the phase resolution of samples.
const MAX_PHASE_RESOLUTION_BITS: u32 = 48;

#[derive(Debug, Clone)]
pub struct SanitizationChange {
    pub field: &'static str,
    pub original: String,
    pub sanitized: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerSettings {
    /// Resolution of the phase baked into waveform samples; 0 disables quantization
    pub phase_resolution_bits: u32,
    /// Track the oscillator phase in command table registers where the device supports it
    pub use_command_table_phase: bool,
    /// Number of events published along with the compiled output
    pub max_events_to_publish: usize,
    /// Replay compressed loop iterations as shadow iterations in the published events
    pub expand_loops_for_schedule: bool,
    pub log_diagnostics: bool,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            phase_resolution_bits: 0,
            use_command_table_phase: true,
            max_events_to_publish: 1000,
            expand_loops_for_schedule: true,
            log_diagnostics: false,
        }
    }
}

impl CompilerSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::new(format!("Invalid compiler settings: {e}")))
    }

    pub fn phase_resolution_range(&self) -> u64 {
        if self.phase_resolution_bits > 0 {
            1 << self.phase_resolution_bits
        } else {
            0
        }
    }

    pub fn sanitize(&mut self) -> Result<Vec<SanitizationChange>> {
        let mut changes = vec![];
        if self.phase_resolution_bits > MAX_PHASE_RESOLUTION_BITS {
            changes.push(SanitizationChange {
                field: "phase_resolution_bits",
                original: self.phase_resolution_bits.to_string(),
                sanitized: MAX_PHASE_RESOLUTION_BITS.to_string(),
                reason: format!("Exceeds the maximum of {MAX_PHASE_RESOLUTION_BITS} bits."),
            });
            self.phase_resolution_bits = MAX_PHASE_RESOLUTION_BITS;
        }
        if self.max_events_to_publish < 2 {
            return Err(Error::configuration(format!(
                "`max_events_to_publish` must allow at least the 2 events of the root section, got {}.",
                self.max_events_to_publish
            )));
        }
        Ok(changes)
    }
}
