// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Near-time execution of the compiler.
//!
//! The real-time program is compiled once per distinct combination of the
//! near-time parameters it depends on. Which parameters these are is only
//! known after the first compilation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use indexmap::IndexMap;
use laboneq_common::NumericLiteral;
use laboneq_common::types::{ParameterUid, SectionUid};
use laboneq_log::{debug, diagnostic};
use laboneq_scheduler::ParameterStoreBuilder;
use laboneq_scheduler::experiment::types::Experiment;
use laboneq_scheduler::settings::CompilerSettings;

use crate::error::{Error, Result};
use crate::executor::{NearTimeHandler, NtStatement, execute};
use crate::realtime_compiler::{
    ExperimentRealtimeCompiler, RealtimeCompiler, RealtimeCompilerOutput,
};
use crate::rt_linker::CombinedRealtimeCompilerOutput;

#[derive(Debug, Clone, PartialEq)]
pub struct IterationStep {
    /// The index of this iteration in its loop
    pub index: usize,
    /// Near-time parameters set in this iteration, not including those of the parent loops
    pub parameter_values: IndexMap<ParameterUid, NumericLiteral>,
}

/// The active near-time loops, outermost first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationStack {
    stack: Vec<IterationStep>,
}

impl IterationStack {
    pub fn push(&mut self, index: usize) {
        self.stack.push(IterationStep {
            index,
            parameter_values: IndexMap::new(),
        });
    }

    pub fn pop(&mut self) -> Option<IterationStep> {
        self.stack.pop()
    }

    pub fn nt_loop_indices(&self) -> Vec<usize> {
        self.stack.iter().map(|step| step.index).collect()
    }

    /// Values of all parameters set in the active loops.
    pub fn nt_parameter_values(&self) -> BTreeMap<ParameterUid, NumericLiteral> {
        self.stack
            .iter()
            .flat_map(|step| step.parameter_values.iter())
            .map(|(uid, value)| (uid.clone(), *value))
            .collect()
    }

    /// Set a parameter value in the innermost loop.
    pub fn set_parameter_value(&mut self, uid: ParameterUid, value: NumericLiteral) -> Result<()> {
        let step = self.stack.last_mut().ok_or_else(|| {
            Error::new(format!(
                "Near-time parameter '{uid}' can only be set inside a near-time loop."
            ))
        })?;
        step.parameter_values.insert(uid, value);
        Ok(())
    }
}

/// Values of the required parameters, the key of the compiled-output cache.
type Fingerprint = BTreeMap<ParameterUid, NumericLiteral>;

struct CachedProgram {
    /// Index of the program in the combined output
    program: usize,
    output: Rc<RealtimeCompilerOutput>,
}

/// Runs the real-time compiler for each execution of the real-time part,
/// reusing earlier outputs where the required parameters have the same values.
pub struct NtCompilerExecutor<C: RealtimeCompiler> {
    rt_compiler: C,
    iteration_stack: IterationStack,
    compiler_output_by_param_values: HashMap<Fingerprint, CachedProgram>,
    last_program: Option<usize>,
    /// Parameters the real-time program depends on, fixed by the first compilation
    required_parameters: Option<BTreeSet<ParameterUid>>,
    combined_compiler_output: Option<CombinedRealtimeCompilerOutput>,
    compile_count: usize,
}

impl<C: RealtimeCompiler> NtCompilerExecutor<C> {
    pub fn new(rt_compiler: C) -> Self {
        Self {
            rt_compiler,
            iteration_stack: IterationStack::default(),
            compiler_output_by_param_values: HashMap::new(),
            last_program: None,
            required_parameters: None,
            combined_compiler_output: None,
            compile_count: 0,
        }
    }

    pub fn run(&mut self, program: &NtStatement) -> Result<()> {
        execute(program, self)
    }

    /// Number of real-time compilations performed.
    pub fn compile_count(&self) -> usize {
        self.compile_count
    }

    pub fn required_parameters(&self) -> Option<&BTreeSet<ParameterUid>> {
        self.required_parameters.as_ref()
    }

    /// The linked output, `None` if the real-time part was never executed.
    pub fn combined_compiler_output(&self) -> Option<&CombinedRealtimeCompilerOutput> {
        self.combined_compiler_output.as_ref()
    }

    pub fn into_combined_compiler_output(self) -> Option<CombinedRealtimeCompilerOutput> {
        self.combined_compiler_output
    }

    fn frozen_required_parameters(&self, required: &BTreeSet<ParameterUid>) -> Fingerprint {
        self.iteration_stack
            .nt_parameter_values()
            .into_iter()
            .filter(|(uid, _)| required.contains(uid))
            .collect()
    }

    /// Reuse an earlier output for the current parameter values.
    ///
    /// Returns `false` if there is none.
    fn try_reuse(&mut self) -> bool {
        let Some(required) = &self.required_parameters else {
            return false;
        };
        let requested_values = self.frozen_required_parameters(required);
        let Some(cached) = self.compiler_output_by_param_values.get(&requested_values) else {
            return false;
        };
        let program = cached.program;
        diagnostic!(
            "Near-time step {:?}: reusing real-time program {}",
            self.iteration_stack.nt_loop_indices(),
            program
        );
        let combined = self
            .combined_compiler_output
            .as_mut()
            .expect("Internal error: Cached program without combined output");
        combined.add_step(
            program,
            self.last_program,
            self.iteration_stack.nt_loop_indices(),
        );
        self.last_program = Some(program);
        true
    }

    fn compile(&mut self) -> Result<()> {
        let mut parameter_store = ParameterStoreBuilder::new()
            .with_parameters(self.iteration_stack.nt_parameter_values())
            .build();
        let output = Rc::new(self.rt_compiler.run(&parameter_store)?);
        self.compile_count += 1;
        let queried = parameter_store.empty_queries();
        if self.required_parameters.is_none() {
            debug!(
                "Real-time program depends on near-time parameters {:?}",
                queried
            );
        }
        let required = self
            .required_parameters
            .get_or_insert_with(|| queried.clone());
        if *required != queried {
            return Err(Error::RequiredParametersChanged {
                expected: required.clone(),
                found: queried,
            });
        }
        let requested_values = self.frozen_required_parameters(&queried);

        let nt_step = self.iteration_stack.nt_loop_indices();
        diagnostic!("Near-time step {:?}: compiled real-time program", nt_step);
        let program = match self.combined_compiler_output.as_mut() {
            None => {
                self.combined_compiler_output = Some(
                    CombinedRealtimeCompilerOutput::from_single_run(Rc::clone(&output), nt_step),
                );
                0
            }
            Some(combined) => {
                let program = combined.add_program(Rc::clone(&output));
                combined.add_step(program, self.last_program, nt_step);
                program
            }
        };
        self.compiler_output_by_param_values
            .insert(requested_values, CachedProgram { program, output });
        self.last_program = Some(program);
        Ok(())
    }

    /// The cached output for the given parameter values, if any.
    pub fn cached_output(&self, values: &Fingerprint) -> Option<&RealtimeCompilerOutput> {
        self.compiler_output_by_param_values
            .get(values)
            .map(|cached| cached.output.as_ref())
    }
}

impl<C: RealtimeCompiler> NearTimeHandler for NtCompilerExecutor<C> {
    fn for_loop_enter(&mut self, _count: usize, index: usize) -> Result<()> {
        // The parameter values are set by `set_parameter`
        self.iteration_stack.push(index);
        Ok(())
    }

    fn for_loop_exit(&mut self) -> Result<()> {
        self.iteration_stack
            .pop()
            .ok_or_else(|| Error::new("Internal error: Near-time loop exit without loop"))?;
        Ok(())
    }

    fn set_parameter(&mut self, uid: &ParameterUid, value: NumericLiteral) -> Result<()> {
        self.iteration_stack.set_parameter_value(uid.clone(), value)
    }

    fn realtime(&mut self, _uid: &SectionUid) -> Result<()> {
        if self.try_reuse() {
            return Ok(());
        }
        self.compile()
    }
}

/// Compile an experiment for all steps of its near-time program.
pub fn compile_experiment(
    experiment: &Experiment,
    nt_program: &NtStatement,
    settings: CompilerSettings,
) -> Result<Option<CombinedRealtimeCompilerOutput>> {
    let rt_compiler = ExperimentRealtimeCompiler::new(experiment, settings)?;
    let mut executor = NtCompilerExecutor::new(rt_compiler);
    executor.run(nt_program)?;
    diagnostic!("Compiled {} real-time programs", executor.compile_count());
    Ok(executor.into_combined_compiler_output())
}
