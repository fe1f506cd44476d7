// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! The real-time experiment as seen by the scheduler.

pub mod builders;
pub mod types;
