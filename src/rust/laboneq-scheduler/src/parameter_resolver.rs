// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Borrow;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use crate::ParameterStore;
use crate::error::{Error, Result};
use crate::experiment::types::{NumericLiteral, ParameterUid, ValueOrParameter};

/// Resolves parameter references inside the real-time part of the experiment.
///
/// Real-time sweep parameters are bound per loop iteration by the enclosing
/// loops, all other parameters are looked up in the near-time parameter store.
pub struct ParameterResolver<'a> {
    bindings: HashMap<ParameterUid, NumericLiteral>,
    nt_parameters: &'a ParameterStore,
    /// Real-time sweep parameters that were read, shared by all scopes
    used_sweep_parameters: Rc<RefCell<BTreeSet<ParameterUid>>>,
}

impl<'a> ParameterResolver<'a> {
    pub fn new(nt_parameters: &'a ParameterStore) -> Self {
        Self {
            bindings: HashMap::new(),
            nt_parameters,
            used_sweep_parameters: Rc::default(),
        }
    }

    /// Scope of a loop iteration, binding each parameter to the given value.
    pub fn child_scope(&self, bindings: impl IntoIterator<Item = (ParameterUid, NumericLiteral)>) -> Self {
        let mut scope = Self {
            bindings: self.bindings.clone(),
            nt_parameters: self.nt_parameters,
            used_sweep_parameters: Rc::clone(&self.used_sweep_parameters),
        };
        scope.bindings.extend(bindings);
        scope
    }

    /// Whether any of `parameters` has been read as a real-time sweep parameter.
    pub fn any_used<I>(&self, parameters: I) -> bool
    where
        I: IntoIterator,
        I::Item: Borrow<ParameterUid>,
    {
        let used = RefCell::borrow(&self.used_sweep_parameters);
        parameters.into_iter().any(|uid| used.contains(uid.borrow()))
    }

    pub fn get_value(&self, uid: &ParameterUid) -> Result<NumericLiteral> {
        if let Some(value) = self.bindings.get(uid) {
            self.used_sweep_parameters.borrow_mut().insert(uid.clone());
            return Ok(*value);
        }
        if let Some(value) = self.nt_parameters.get(uid) {
            return Ok(*value);
        }
        Err(Error::new(format!("Undefined parameter '{uid}'.")))
    }

    pub fn resolve_f64(&self, value: &ValueOrParameter<f64>) -> Result<f64> {
        match value {
            ValueOrParameter::Value(v) => Ok(*v),
            ValueOrParameter::Parameter(uid) => self.get_value(uid)?.try_into().map_err(|e| {
                Error::new(format!("Invalid value of parameter '{uid}': {e}"))
            }),
        }
    }

    /// Resolve a length or time given in samples.
    pub fn resolve_samples(&self, value: &ValueOrParameter<i64>) -> Result<i64> {
        let samples = match value {
            ValueOrParameter::Value(v) => *v,
            ValueOrParameter::Parameter(uid) => match self.get_value(uid)? {
                NumericLiteral::Int(v) => v,
                NumericLiteral::Float(v) => v.round() as i64,
                NumericLiteral::Complex(_) => {
                    return Err(Error::new(format!(
                        "Parameter '{uid}' must be real to be used as a number of samples."
                    )));
                }
            },
        };
        if samples < 0 {
            return Err(Error::new(format!(
                "Lengths must not be negative, got {samples} samples."
            )));
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParameterStoreBuilder;

    #[test]
    fn test_sweep_bindings_shadow_near_time_values() {
        let uid = ParameterUid::from("amp");
        let mut store = ParameterStoreBuilder::new()
            .with_parameter(uid.clone(), NumericLiteral::Float(0.1))
            .build();
        {
            let resolver = ParameterResolver::new(&store);
            assert_eq!(resolver.get_value(&uid).unwrap(), NumericLiteral::Float(0.1));
            assert!(!resolver.any_used([&uid]));

            let scope = resolver.child_scope([(uid.clone(), NumericLiteral::Float(0.7))]);
            assert_eq!(scope.resolve_f64(&uid.clone().into()).unwrap(), 0.7);
            // Tracking is shared with the parent scope
            assert!(resolver.any_used([&uid]));
        }
        assert_eq!(store.empty_queries(), BTreeSet::from([uid]));
    }

    #[test]
    fn test_resolve_samples() {
        let length = ParameterUid::from("length");
        let store = ParameterStoreBuilder::new()
            .with_parameter(length.clone(), NumericLiteral::Float(31.6))
            .build();
        let resolver = ParameterResolver::new(&store);
        assert_eq!(resolver.resolve_samples(&length.into()).unwrap(), 32);
        assert_eq!(resolver.resolve_samples(&ValueOrParameter::Value(16)).unwrap(), 16);
        assert!(resolver.resolve_samples(&ValueOrParameter::Value(-1)).is_err());
        assert!(
            resolver
                .resolve_samples(&ParameterUid::from("missing").into())
                .is_err()
        );
    }
}
