// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::ids::LogicId;
use crate::data::{Facets, Inputs};

/// What a resolver decided for its dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverCommand {
    /// Do not call the dependency; its pending sub-requests are skipped with `reason`.
    Skip { reason: String },
    /// Call the dependency once per entry. More than one entry is a fan-out.
    Provide(Vec<Inputs>),
}

impl ResolverCommand {
    pub fn skip(reason: impl Into<String>) -> Self {
        ResolverCommand::Skip {
            reason: reason.into(),
        }
    }

    pub fn single(inputs: Inputs) -> Self {
        ResolverCommand::Provide(vec![inputs])
    }

    pub fn fan_out(inputs: Vec<Inputs>) -> Self {
        ResolverCommand::Provide(inputs)
    }
}

pub type ResolverFn = Arc<dyn Fn(&Facets) -> ResolverCommand + Send + Sync>;

/// Computes the inputs of one dependency from a subset of the owning node's inputs.
///
/// A resolver runs at most once per request, as soon as every name in `bound_from` has a
/// recorded state. Names may be direct inputs or other dependencies of the same node, which
/// lets one resolver refine the fan-out of another.
#[derive(Clone)]
pub struct ResolverDefinition {
    resolver_id: LogicId,
    dependency_name: String,
    bound_from: BTreeSet<String>,
    resolve: ResolverFn,
}

impl ResolverDefinition {
    pub fn new<I, S, F>(
        resolver_id: impl Into<LogicId>,
        dependency_name: impl Into<String>,
        bound_from: I,
        resolve: F,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Facets) -> ResolverCommand + Send + Sync + 'static,
    {
        Self {
            resolver_id: resolver_id.into(),
            dependency_name: dependency_name.into(),
            bound_from: bound_from.into_iter().map(Into::into).collect(),
            resolve: Arc::new(resolve),
        }
    }

    pub fn resolver_id(&self) -> &LogicId {
        &self.resolver_id
    }

    pub fn dependency_name(&self) -> &str {
        &self.dependency_name
    }

    pub fn bound_from(&self) -> &BTreeSet<String> {
        &self.bound_from
    }

    /// Runs the resolver against the view restricted to its bound-from names.
    pub fn resolve(&self, facets: &Facets) -> ResolverCommand {
        (self.resolve)(&facets.restrict(&self.bound_from))
    }
}

impl fmt::Debug for ResolverDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverDefinition")
            .field("resolver_id", &self.resolver_id)
            .field("dependency_name", &self.dependency_name)
            .field("bound_from", &self.bound_from)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolver_only_sees_bound_from_names() {
        let resolver = ResolverDefinition::new("r", "dep", ["user_id"], |facets| {
            assert!(facets.value("secret").is_none());
            match facets.value("user_id") {
                Some(id) => ResolverCommand::single(Inputs::from([("id", id.clone())])),
                None => ResolverCommand::skip("no user"),
            }
        });

        let facets = Facets::new(
            Inputs::from([("user_id", json!("u1")), ("secret", json!("hidden"))]),
            Default::default(),
        );

        assert_eq!(
            resolver.resolve(&facets),
            ResolverCommand::single(Inputs::from([("id", json!("u1"))]))
        );
        assert_eq!(
            resolver.resolve(&Facets::default()),
            ResolverCommand::skip("no user")
        );
    }
}
