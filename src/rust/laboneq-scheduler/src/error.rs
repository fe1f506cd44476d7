// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Display;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The event budget does not allow emitting a structurally complete event list.
    #[error("Event budget of {max_events} is too small, at least {required} events are required.")]
    EventBudgetExceeded { max_events: usize, required: usize },
    /// Signals sharing a physical resource disagree on its configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
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
