// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use laboneq_common::NumericLiteral;
use laboneq_common::types::ParameterUid;

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

/// Store for the near-time parameter values seen by one real-time compilation.
///
/// The store keeps track of which parameters have been queried. The queried
/// parameters are what the compiled program depends on, and thus form the key
/// under which the near-time executor caches the compiled output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterStore {
    parameters: HashMap<ParameterUid, NumericLiteral>,
    queries: RefCell<BTreeSet<ParameterUid>>,
}

impl ParameterStore {
    /// Get a parameter value by its UID, marking it as queried.
    pub fn get(&self, uid: &ParameterUid) -> Option<&NumericLiteral> {
        self.queries.borrow_mut().insert(uid.clone());
        self.parameters.get(uid)
    }

    /// Empties and returns the set of queried parameters since the last call.
    ///
    /// Only parameters known to the store are reported.
    pub fn empty_queries(&mut self) -> BTreeSet<ParameterUid> {
        let queries = std::mem::take(self.queries.get_mut());
        queries
            .into_iter()
            .filter(|uid| self.parameters.contains_key(uid))
            .collect()
    }

    pub fn available_parameters(&self) -> BTreeSet<ParameterUid> {
        self.parameters.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

#[derive(Default)]
pub struct ParameterStoreBuilder {
    parameters: HashMap<ParameterUid, NumericLiteral>,
}

impl ParameterStoreBuilder {
    pub fn new() -> Self {
        Self {
            parameters: HashMap::new(),
        }
    }

    pub fn with_parameter(mut self, uid: ParameterUid, value: NumericLiteral) -> Self {
        self.parameters.insert(uid, value);
        self
    }

    pub fn with_parameters(
        mut self,
        parameters: impl IntoIterator<Item = (ParameterUid, NumericLiteral)>,
    ) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn build(self) -> ParameterStore {
        ParameterStore {
            parameters: self.parameters,
            queries: RefCell::new(BTreeSet::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queries_are_tracked() {
        let a = ParameterUid::from("a");
        let b = ParameterUid::from("b");
        let mut store = ParameterStoreBuilder::new()
            .with_parameter(a.clone(), NumericLiteral::Int(1))
            .with_parameter(b.clone(), NumericLiteral::Float(0.5))
            .build();

        assert_eq!(store.get(&a), Some(&NumericLiteral::Int(1)));
        assert_eq!(store.get(&ParameterUid::from("unknown")), None);
        assert_eq!(store.empty_queries(), BTreeSet::from([a.clone()]));
        // Queries are reset after being read
        assert!(store.empty_queries().is_empty());
        assert_eq!(store.available_parameters(), BTreeSet::from([a, b]));
    }
}
