// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use crate::types::DeviceKind;

/// Commonly used device traits
pub struct DeviceTraits {
    pub channels_per_awg: u16,
    pub sampling_rate: f64,
    pub sample_multiple: u16,
    /// The device tracks the oscillator phase in command table registers.
    pub supports_command_table_phase: bool,
}

impl DeviceTraits {
    pub fn from_device_kind(kind: &DeviceKind) -> &'static Self {
        match kind {
            DeviceKind::Hdawg => &HDAWG_TRAITS,
            DeviceKind::Uhfqa => &UHFQA_TRAITS,
            DeviceKind::Shfsg => &SHFSG_TRAITS,
            DeviceKind::Shfqa => &SHFQA_TRAITS,
        }
    }
}

impl DeviceKind {
    pub fn traits(&self) -> &'static DeviceTraits {
        DeviceTraits::from_device_kind(self)
    }
}

pub const HDAWG_TRAITS: DeviceTraits = DeviceTraits {
    sampling_rate: 2.4e9,
    channels_per_awg: 2,
    sample_multiple: 16,
    supports_command_table_phase: true,
};

pub const UHFQA_TRAITS: DeviceTraits = DeviceTraits {
    sampling_rate: 1.8e9,
    channels_per_awg: 2,
    sample_multiple: 8,
    supports_command_table_phase: false,
};

pub const SHFSG_TRAITS: DeviceTraits = DeviceTraits {
    sampling_rate: 2e9,
    channels_per_awg: 1,
    sample_multiple: 16,
    supports_command_table_phase: true,
};

pub const SHFQA_TRAITS: DeviceTraits = DeviceTraits {
    sampling_rate: 2e9,
    channels_per_awg: 1,
    sample_multiple: 16,
    supports_command_table_phase: false,
};
