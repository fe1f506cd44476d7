// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

pub mod error;
pub mod event;
pub mod experiment;
pub mod parameter_store;
pub mod schedule;
pub mod settings;

mod lower_experiment;
mod parameter_resolver;
mod scheduler;

pub use crate::error::{Error, Result};
pub use crate::event::{Event, EventId, EventKind, EventType, IdTracker, PlayInfo};
pub use crate::parameter_store::{ParameterStore, ParameterStoreBuilder};
pub use crate::scheduler::{ScheduledExperiment, schedule_experiment};
pub use crate::settings::{CompilerSettings, SanitizationChange};
