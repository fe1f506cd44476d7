// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Defines a string based identifier.
///
/// Identifiers order and hash by their string content, which keeps every
/// collection keyed by them deterministic across runs.
macro_rules! define_uid {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(uid: impl Into<String>) -> Self {
                Self(uid.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

define_uid!(
    /// UID of a section, loop or branch.
    SectionUid
);
define_uid!(SignalUid);
define_uid!(
    /// UID of a sweep parameter, near-time or real-time.
    ParameterUid
);
define_uid!(
    /// UID of a pulse function.
    PulseUid
);
define_uid!(OscillatorUid);
define_uid!(DeviceUid);
define_uid!(HandleUid);

/// Identifies a single AWG core: device and AWG index on that device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct AwgKey {
    pub device: DeviceUid,
    pub index: u16,
}

#[derive(Debug, Clone, Eq, PartialEq, Copy, Hash, serde::Serialize, serde::Deserialize)]
pub enum DeviceKind {
    Hdawg,
    Shfqa,
    Shfsg,
    Uhfqa,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_ordering_follows_string() {
        let mut uids = vec![SignalUid::from("q1/drive"), SignalUid::from("q0/drive")];
        uids.sort();
        assert_eq!(uids[0].as_str(), "q0/drive");
        assert_eq!(uids[1].to_string(), "q1/drive");
    }
}
