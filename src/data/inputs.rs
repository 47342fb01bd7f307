// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Immutable partial mappings of input name to value state.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use crate::errors::NodeError;

/// State of a single named input: a value, an error, or nothing at all.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ValueOrError {
    Value(Value),
    Error(NodeError),
    #[default]
    Absent,
}

impl ValueOrError {
    pub fn from_result(result: Result<Value, NodeError>) -> Self {
        match result {
            Ok(value) => ValueOrError::Value(value),
            Err(error) => ValueOrError::Error(error),
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            ValueOrError::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&NodeError> {
        match self {
            ValueOrError::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, ValueOrError::Value(_))
    }
}

impl Hash for ValueOrError {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ValueOrError::Value(value) => hash_value(value, state),
            ValueOrError::Error(error) => error.hash(state),
            ValueOrError::Absent => {}
        }
    }
}

/// Hashes consistently with `Value`'s equality: numbers compare within their representation
/// and `0.0 == -0.0`.
fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    std::mem::discriminant(value).hash(state);
    match value {
        Value::Null => {}
        Value::Bool(b) => b.hash(state),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                (0u8, u).hash(state);
            } else if let Some(i) = n.as_i64() {
                (1u8, i).hash(state);
            } else if let Some(f) = n.as_f64() {
                let f = if f == 0.0 { 0.0 } else { f };
                (2u8, f.to_bits()).hash(state);
            }
        }
        Value::String(s) => s.hash(state),
        Value::Array(items) => {
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(map) => {
            map.len().hash(state);
            for (key, item) in map {
                key.hash(state);
                hash_value(item, state);
            }
        }
    }
}

impl From<Value> for ValueOrError {
    fn from(value: Value) -> Self {
        ValueOrError::Value(value)
    }
}

/// Ordered, immutable mapping of input name to [`ValueOrError`].
///
/// Equality and hashing are structural so an `Inputs` can key the main-logic cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Inputs(BTreeMap<String, ValueOrError>);

impl Inputs {
    pub fn new(values: BTreeMap<String, ValueOrError>) -> Self {
        Self(values)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns a copy of these inputs with `name` set to `value`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ValueOrError>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&ValueOrError> {
        self.0.get(name)
    }

    /// The state recorded for `name`, or [`ValueOrError::Absent`] when the name is missing.
    pub fn get_or_absent(&self, name: &str) -> ValueOrError {
        self.0.get(name).cloned().unwrap_or_default()
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.0.get(name).and_then(ValueOrError::value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.0.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ValueOrError)> {
        self.0.iter()
    }

    /// Merges two partial mappings.
    ///
    /// Callers supply disjoint key sets; for a key present in both, `a`'s value is kept.
    pub fn union(a: &Inputs, b: &Inputs) -> Inputs {
        let mut merged = a.0.clone();
        for (name, value) in &b.0 {
            merged.entry(name.clone()).or_insert_with(|| value.clone());
        }
        Inputs(merged)
    }

    /// Restricts these inputs to `names`; names without a recorded state are left out.
    pub fn restrict<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> Inputs {
        names
            .into_iter()
            .filter_map(|name| self.0.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }
}

impl FromIterator<(String, ValueOrError)> for Inputs {
    fn from_iter<T: IntoIterator<Item = (String, ValueOrError)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(&str, Value); N]> for Inputs {
    fn from(values: [(&str, Value); N]) -> Self {
        values
            .into_iter()
            .map(|(name, value)| (name.to_string(), ValueOrError::Value(value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_union_of_disjoint_inputs_keeps_all_keys_and_values() {
        let a = Inputs::from([("user_id", json!("u1")), ("locale", json!("en"))]);
        let b = Inputs::empty()
            .with("limit", json!(10))
            .with("cursor", ValueOrError::Absent);

        let merged = Inputs::union(&a, &b);

        assert_eq!(merged.len(), 4);
        assert_eq!(merged.value("user_id"), Some(&json!("u1")));
        assert_eq!(merged.value("locale"), Some(&json!("en")));
        assert_eq!(merged.value("limit"), Some(&json!(10)));
        assert_eq!(merged.get("cursor"), Some(&ValueOrError::Absent));
    }

    #[test]
    fn test_union_keeps_first_value_on_conflict() {
        let a = Inputs::from([("k", json!(1))]);
        let b = Inputs::from([("k", json!(2))]);
        assert_eq!(Inputs::union(&a, &b).value("k"), Some(&json!(1)));
    }

    #[test]
    fn test_get_or_absent_for_missing_name() {
        let inputs = Inputs::from([("present", json!(true))]);
        assert_eq!(inputs.get_or_absent("missing"), ValueOrError::Absent);
        assert!(inputs.get_or_absent("present").is_value());
    }

    #[test]
    fn test_restrict_only_keeps_requested_names() {
        let inputs = Inputs::from([("a", json!(1)), ("b", json!(2)), ("c", json!(3))]);
        let names = vec!["a".to_string(), "c".to_string(), "zzz".to_string()];
        let restricted = inputs.restrict(&names);
        assert_eq!(restricted.names().into_iter().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn test_structurally_equal_inputs_hash_to_same_cache_slot() {
        let first = Inputs::from([("obj", json!({"b": 1, "a": [1, 2]}))]);
        let second = Inputs::empty().with("obj", json!({"a": [1, 2], "b": 1}));

        let mut cache = HashMap::new();
        cache.insert(first, "cached");
        assert_eq!(cache.get(&second), Some(&"cached"));
    }

    #[test]
    fn test_signed_zero_inputs_share_a_cache_slot() {
        let positive = Inputs::from([("x", json!(0.0))]);
        let negative = Inputs::from([("x", json!(-0.0))]);
        assert_eq!(positive, negative);

        let mut cache = HashMap::new();
        cache.insert(positive, "cached");
        assert_eq!(cache.get(&negative), Some(&"cached"));
    }

    #[test]
    fn test_errors_and_values_are_distinct_cache_keys() {
        let with_value = Inputs::from([("x", json!("boom"))]);
        let with_error = Inputs::empty().with("x", ValueOrError::Error(NodeError::logic("boom")));
        assert_ne!(with_value, with_error);
    }
}
