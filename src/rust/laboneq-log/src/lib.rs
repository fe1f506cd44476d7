// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::sync::{atomic::AtomicBool, atomic::Ordering};

#[doc(hidden)]
pub use log as _log;

#[macro_export]
macro_rules! info {
    ($msg:literal, $($arg:tt)+) => {
        laboneq_log::_log::info!(target: concat!("laboneq.rust::", module_path!()), $msg, $($arg)+);
    };
    ($msg:literal) => {
        laboneq_log::_log::info!(target: concat!("laboneq.rust::", module_path!()), $msg);
    };
}

#[macro_export]
macro_rules! warn {
    ($msg:literal, $($arg:tt)+) => {
        laboneq_log::_log::warn!(target: concat!("laboneq.rust::", module_path!()), $msg, $($arg)+);
    };
    ($msg:literal) => {
        laboneq_log::_log::warn!(target: concat!("laboneq.rust::", module_path!()), $msg);
    };
}

#[macro_export]
macro_rules! debug {
    ($msg:literal, $($arg:tt)+) => {
        laboneq_log::_log::debug!(target: concat!("laboneq.rust::", module_path!()), $msg, $($arg)+);
    };
    ($msg:literal) => {
        laboneq_log::_log::debug!(target: concat!("laboneq.rust::", module_path!()), $msg);
    };
}

/// Log a diagnostic message at info level if diagnostics logging is enabled.
#[macro_export]
macro_rules! diagnostic {
    ($msg:literal, $($arg:tt)+) => {
        if laboneq_log::is_diagnostics_enabled() {
             laboneq_log::_log::info!(target: concat!("laboneq.rust::", module_path!()), $msg, $($arg)+);
        }
    };
    ($msg:literal) => {
        if laboneq_log::is_diagnostics_enabled() {
            laboneq_log::_log::info!(target: concat!("laboneq.rust::", module_path!()), $msg);
        }
    };
}

static DIAGNOSTICS_ENABLED: AtomicBool = AtomicBool::new(false);

#[inline]
pub fn is_diagnostics_enabled() -> bool {
    DIAGNOSTICS_ENABLED.load(Ordering::Acquire)
}

/// Initialize the logging.
///
/// Meant to be called once before a compilation run. The library never installs
/// a logger of its own; the embedding application picks the `log` backend.
/// Diagnostics report per-compile statistics and near-time cache decisions.
pub fn init_logging(with_diagnostics: bool) {
    DIAGNOSTICS_ENABLED.store(with_diagnostics, Ordering::Release);
}
