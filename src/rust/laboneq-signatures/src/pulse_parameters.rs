// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use laboneq_common::NumericLiteral;
use serde::Serialize;

/// Value of a user pulse parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum PulseParameterValue {
    Numeric(NumericLiteral),
    Bool(bool),
    String(String),
}

impl From<f64> for PulseParameterValue {
    fn from(value: f64) -> Self {
        PulseParameterValue::Numeric(NumericLiteral::Float(value))
    }
}

impl From<i64> for PulseParameterValue {
    fn from(value: i64) -> Self {
        PulseParameterValue::Numeric(NumericLiteral::Int(value))
    }
}

impl From<NumericLiteral> for PulseParameterValue {
    fn from(value: NumericLiteral) -> Self {
        PulseParameterValue::Numeric(value)
    }
}

impl From<&str> for PulseParameterValue {
    fn from(value: &str) -> Self {
        PulseParameterValue::String(value.to_string())
    }
}

impl From<bool> for PulseParameterValue {
    fn from(value: bool) -> Self {
        PulseParameterValue::Bool(value)
    }
}

/// An unordered set of `(name, value)` user pulse parameters.
///
/// The entries are kept sorted and deduplicated, so two sets built from the
/// same pairs in different order are equal, hash equally and serialize equally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PulseParameterSet(Vec<(String, PulseParameterValue)>);

impl PulseParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<PulseParameterValue>) {
        let entry = (name.into(), value.into());
        if let Err(pos) = self.0.binary_search(&entry) {
            self.0.insert(pos, entry);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PulseParameterValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<PulseParameterValue>> FromIterator<(K, V)> for PulseParameterSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut entries: Vec<(String, PulseParameterValue)> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        entries.sort();
        entries.dedup();
        Self(entries)
    }
}
