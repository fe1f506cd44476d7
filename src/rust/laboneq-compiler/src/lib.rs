// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Compiler of experiments with near-time sweeps.
//!
//! The near-time program is executed with [`compile_experiment`], compiling the
//! real-time part of the experiment with [`ExperimentRealtimeCompiler`] whenever
//! the near-time parameters it depends on take new values. The compiled
//! programs are linked into a [`CombinedRealtimeCompilerOutput`].

pub mod error;
pub mod executor;
pub mod neartime_execution;
pub mod precompensation;
pub mod realtime_compiler;
pub mod rt_linker;

pub use crate::error::{Error, Result};
pub use crate::executor::{NearTimeHandler, NtStatement, NtSweepParameter, execute};
pub use crate::neartime_execution::{IterationStack, NtCompilerExecutor, compile_experiment};
pub use crate::realtime_compiler::{
    ExperimentRealtimeCompiler, PlaybackEvent, RealtimeCompiler, RealtimeCompilerOutput,
};
pub use crate::rt_linker::{CombinedRealtimeCompilerOutput, RealtimeStep};
