// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Linking of the real-time programs compiled during a near-time sweep.

use std::rc::Rc;

use indexmap::IndexMap;
use laboneq_signatures::{StableHash, WaveformSignature};

use crate::realtime_compiler::RealtimeCompilerOutput;

/// A near-time step at which the active real-time program changes.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeStep {
    /// Index into [`CombinedRealtimeCompilerOutput::outputs`]
    pub program: usize,
    /// Indices of the enclosing near-time loops
    pub nt_step: Vec<usize>,
    /// Execution time of all previous steps in seconds
    pub time_offset: f64,
}

/// The distinct real-time programs of an experiment and when to use them.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedRealtimeCompilerOutput {
    pub outputs: Vec<Rc<RealtimeCompilerOutput>>,
    pub realtime_steps: Vec<RealtimeStep>,
    /// Union of the waveforms of all programs
    pub waveforms: IndexMap<StableHash, WaveformSignature>,
    /// Execution time of the whole near-time sweep in seconds
    pub total_execution_time: f64,
}

impl CombinedRealtimeCompilerOutput {
    /// Start linking with the first compiled program, used at `nt_step`.
    pub fn from_single_run(output: Rc<RealtimeCompilerOutput>, nt_step: Vec<usize>) -> Self {
        let mut combined = Self {
            outputs: vec![],
            realtime_steps: vec![],
            waveforms: IndexMap::new(),
            total_execution_time: 0.0,
        };
        let program = combined.add_program(output);
        combined.add_step(program, None, nt_step);
        combined
    }

    /// Add a newly compiled program. Returns its index.
    pub fn add_program(&mut self, output: Rc<RealtimeCompilerOutput>) -> usize {
        for (hash, waveform) in output.waveforms.iter() {
            self.waveforms
                .entry(*hash)
                .or_insert_with(|| waveform.clone());
        }
        self.outputs.push(output);
        self.outputs.len() - 1
    }

    /// Account for the execution of `program` at `nt_step`.
    ///
    /// A step is recorded only when the program differs from `previous`, the
    /// program that was active before.
    pub fn add_step(&mut self, program: usize, previous: Option<usize>, nt_step: Vec<usize>) {
        if previous != Some(program) {
            self.realtime_steps.push(RealtimeStep {
                program,
                nt_step,
                time_offset: self.total_execution_time,
            });
        }
        self.total_execution_time += self.outputs[program].total_execution_time;
    }

    /// The program executed at `nt_step`.
    pub fn program_at(&self, nt_step: &[usize]) -> Option<&RealtimeCompilerOutput> {
        self.realtime_steps
            .iter()
            .take_while(|step| step.nt_step.as_slice() <= nt_step)
            .last()
            .map(|step| self.outputs[step.program].as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn output(execution_time: f64) -> Rc<RealtimeCompilerOutput> {
        Rc::new(RealtimeCompilerOutput {
            events: vec![],
            waveforms: IndexMap::new(),
            playbacks: IndexMap::new(),
            playback_events: vec![],
            signal_delays: BTreeMap::new(),
            total_execution_time: execution_time,
        })
    }

    #[test]
    fn test_steps_record_program_changes() {
        let mut combined = CombinedRealtimeCompilerOutput::from_single_run(output(1.0), vec![0]);
        // Same program again
        combined.add_step(0, Some(0), vec![1]);
        let second = combined.add_program(output(2.0));
        combined.add_step(second, Some(0), vec![2]);
        // Back to the cached first program
        combined.add_step(0, Some(second), vec![3]);

        let steps: Vec<_> = combined
            .realtime_steps
            .iter()
            .map(|s| (s.program, s.nt_step.clone(), s.time_offset))
            .collect();
        assert_eq!(
            steps,
            vec![(0, vec![0], 0.0), (1, vec![2], 2.0), (0, vec![3], 4.0)]
        );
        assert_eq!(combined.total_execution_time, 5.0);
        assert_eq!(combined.program_at(&[1]).unwrap().total_execution_time, 1.0);
        assert_eq!(combined.program_at(&[2]).unwrap().total_execution_time, 2.0);
    }

    proptest! {
        #[test]
        fn test_execution_time_adds_up(programs in prop::collection::vec(0usize..3, 1..30)) {
            let times = [1.0, 2.0, 4.0];
            let mut combined = CombinedRealtimeCompilerOutput::from_single_run(output(times[0]), vec![0]);
            for time in &times[1..] {
                combined.add_program(output(*time));
            }
            let mut previous = Some(0);
            for (step, program) in programs.iter().enumerate() {
                combined.add_step(*program, previous, vec![step + 1]);
                previous = Some(*program);
            }
            let expected: f64 = times[0] + programs.iter().map(|p| times[*p]).sum::<f64>();
            prop_assert_eq!(combined.total_execution_time, expected);

            let switches = std::iter::once(&0)
                .chain(programs.iter())
                .collect::<Vec<_>>()
                .windows(2)
                .filter(|w| w[0] != w[1])
                .count();
            prop_assert_eq!(combined.realtime_steps.len(), switches + 1);
        }
    }
}
