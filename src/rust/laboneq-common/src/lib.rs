// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

pub mod device_traits;
pub mod numeric_literal;
pub mod types;
pub mod utils;

pub use numeric_literal::NumericLiteral;
