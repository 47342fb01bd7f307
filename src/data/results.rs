// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::inputs::{Inputs, ValueOrError};
use crate::errors::NodeError;

/// Aggregated outcome of one dependency: one entry per fan-out sub-request, keyed by the
/// effective inputs the dependency ran with, in sub-request index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Results(Vec<(Inputs, ValueOrError)>);

impl Results {
    pub fn new(entries: Vec<(Inputs, ValueOrError)>) -> Self {
        Self(entries)
    }

    pub fn single(inputs: Inputs, value: ValueOrError) -> Self {
        Self(vec![(inputs, value)])
    }

    /// The whole-dependency failure form: a single error keyed by empty inputs.
    pub fn failure(error: NodeError) -> Self {
        Self::single(Inputs::empty(), ValueOrError::Error(error))
    }

    pub fn get(&self, inputs: &Inputs) -> Option<&ValueOrError> {
        self.0.iter().find(|(k, _)| k == inputs).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Inputs, ValueOrError)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Successful values in sub-request order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.iter().filter_map(|(_, v)| v.value())
    }

    pub fn first_value(&self) -> Option<&Value> {
        self.values().next()
    }

    pub fn first_error(&self) -> Option<&NodeError> {
        self.0.iter().find_map(|(_, v)| v.error())
    }

    pub fn has_value(&self) -> bool {
        self.values().next().is_some()
    }
}

/// Pair of effective direct inputs and the value-or-error the node produced for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResponse {
    pub inputs: Inputs,
    pub value: ValueOrError,
}

impl NodeResponse {
    pub fn new(inputs: Inputs, value: ValueOrError) -> Self {
        Self { inputs, value }
    }
}

/// Everything a resolver or a main logic sees for one request: the collected direct inputs
/// together with the aggregated results of every collected dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Facets {
    inputs: Inputs,
    dependencies: BTreeMap<String, Results>,
}

impl Facets {
    pub fn new(inputs: Inputs, dependencies: BTreeMap<String, Results>) -> Self {
        Self {
            inputs,
            dependencies,
        }
    }

    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    pub fn input(&self, name: &str) -> Option<&ValueOrError> {
        self.inputs.get(name)
    }

    /// Shorthand for the successful value of a direct input.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.inputs.value(name)
    }

    pub fn dependency(&self, name: &str) -> Option<&Results> {
        self.dependencies.get(name)
    }

    pub fn dependencies(&self) -> &BTreeMap<String, Results> {
        &self.dependencies
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inputs.contains(name) || self.dependencies.contains_key(name)
    }

    /// Names with a recorded state, direct inputs and dependencies alike.
    pub fn available_names(&self) -> BTreeSet<String> {
        let mut names = self.inputs.names();
        names.extend(self.dependencies.keys().cloned());
        names
    }

    /// The view a resolver bound from `names` is allowed to see.
    pub fn restrict(&self, names: &BTreeSet<String>) -> Facets {
        Facets {
            inputs: self.inputs.restrict(names),
            dependencies: self
                .dependencies
                .iter()
                .filter(|(name, _)| names.contains(*name))
                .map(|(name, results)| (name.clone(), results.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_results_lookup_by_effective_inputs() {
        let first = Inputs::from([("id", json!(1))]);
        let second = Inputs::from([("id", json!(2))]);
        let results = Results::new(vec![
            (first.clone(), ValueOrError::Value(json!("one"))),
            (second.clone(), ValueOrError::Error(NodeError::logic("two failed"))),
        ]);

        assert_eq!(results.get(&first), Some(&ValueOrError::Value(json!("one"))));
        assert_eq!(results.values().collect::<Vec<_>>(), vec![&json!("one")]);
        assert_eq!(results.first_error(), Some(&NodeError::logic("two failed")));
    }

    #[test]
    fn test_failure_is_single_error_keyed_by_empty_inputs() {
        let results = Results::failure(NodeError::skipped("no user"));
        assert_eq!(results.len(), 1);
        assert!(!results.has_value());
        assert_eq!(
            results.get(&Inputs::empty()),
            Some(&ValueOrError::Error(NodeError::skipped("no user")))
        );
    }

    #[test]
    fn test_facets_restrict_hides_unbound_names() {
        let mut deps = BTreeMap::new();
        deps.insert(
            "user_info".to_string(),
            Results::single(Inputs::empty(), ValueOrError::Value(json!({"name": "Bob"}))),
        );
        let facets = Facets::new(Inputs::from([("user_id", json!("u1")), ("x", json!(0))]), deps);

        let bound: BTreeSet<String> = ["user_id".to_string(), "user_info".to_string()].into();
        let view = facets.restrict(&bound);

        assert_eq!(view.available_names(), bound);
        assert!(view.value("x").is_none());
        assert!(view.dependency("user_info").is_some());
    }
}
