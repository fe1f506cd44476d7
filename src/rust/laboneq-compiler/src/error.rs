// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::fmt::Display;

use laboneq_common::types::ParameterUid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The real-time program depends on other near-time parameters than it did
    /// in the first compilation of the run.
    #[error(
        "Internal error: Near-time parameters required by the real-time program changed from {expected:?} to {found:?}."
    )]
    RequiredParametersChanged {
        expected: BTreeSet<ParameterUid>,
        found: BTreeSet<ParameterUid>,
    },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Scheduler(#[from] laboneq_scheduler::Error),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    pub fn new<T>(msg: T) -> Self
    where
        T: Display,
    {
        Error::Anyhow(anyhow::anyhow!(msg.to_string()))
    }

    pub fn configuration<T>(msg: T) -> Self
    where
        T: Display,
    {
        Error::Configuration(msg.to_string())
    }
}
