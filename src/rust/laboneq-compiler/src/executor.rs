// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Near-time program and its interpreter.

use laboneq_common::NumericLiteral;
use laboneq_common::types::{ParameterUid, SectionUid};

use crate::error::{Error, Result};

/// A near-time sweep parameter, one value per loop iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct NtSweepParameter {
    pub uid: ParameterUid,
    pub values: Vec<NumericLiteral>,
}

/// Statement of the near-time program.
#[derive(Debug, Clone, PartialEq)]
pub enum NtStatement {
    Sequence(Vec<NtStatement>),
    /// Loop over `count` iterations, setting each parameter at the start of an iteration
    ForLoop {
        count: usize,
        parameters: Vec<NtSweepParameter>,
        body: Box<NtStatement>,
    },
    SetParameter {
        uid: ParameterUid,
        value: NumericLiteral,
    },
    /// Execution of the real-time part of the experiment
    RealTime { uid: SectionUid },
    Nop,
}

/// Callbacks invoked while walking the near-time program.
pub trait NearTimeHandler {
    fn for_loop_enter(&mut self, count: usize, index: usize) -> Result<()>;
    fn for_loop_exit(&mut self) -> Result<()>;
    fn set_parameter(&mut self, uid: &ParameterUid, value: NumericLiteral) -> Result<()>;
    fn realtime(&mut self, uid: &SectionUid) -> Result<()>;
}

/// Walk `statement` in execution order.
pub fn execute(statement: &NtStatement, handler: &mut impl NearTimeHandler) -> Result<()> {
    match statement {
        NtStatement::Sequence(statements) => {
            for statement in statements {
                execute(statement, handler)?;
            }
        }
        NtStatement::ForLoop {
            count,
            parameters,
            body,
        } => {
            for parameter in parameters {
                if parameter.values.len() != *count {
                    return Err(Error::new(format!(
                        "Near-time sweep parameter '{}' has {} values, expected {}.",
                        parameter.uid,
                        parameter.values.len(),
                        count
                    )));
                }
            }
            for index in 0..*count {
                handler.for_loop_enter(*count, index)?;
                for parameter in parameters {
                    handler.set_parameter(&parameter.uid, parameter.values[index])?;
                }
                execute(body, handler)?;
                handler.for_loop_exit()?;
            }
        }
        NtStatement::SetParameter { uid, value } => handler.set_parameter(uid, *value)?,
        NtStatement::RealTime { uid } => handler.realtime(uid)?,
        NtStatement::Nop => {}
    }
    Ok(())
}
