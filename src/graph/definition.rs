// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Static node and logic definitions, built once and immutable afterwards.

use futures::future::{self, BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::ids::{LogicId, NodeId};
use super::resolver::ResolverDefinition;
use crate::data::Facets;
use crate::decoration::{DecoratorConfig, LogicDecorator};
use crate::errors::NodeError;
use crate::traits::NodeLogic;

pub type LogicFuture = BoxFuture<'static, Result<Value, NodeError>>;

/// Callable form of a node's logic, and the unit decorators wrap.
pub type MainLogic = Arc<dyn Fn(Facets) -> LogicFuture + Send + Sync>;

/// Execution category of a logic. Decides inline versus out-of-band dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicKind {
    /// Never suspends; may run on the command queue itself.
    Compute,
    /// May suspend; always runs off the command queue.
    Io,
}

#[derive(Clone)]
pub struct LogicDefinition {
    logic_id: LogicId,
    input_names: BTreeSet<String>,
    kind: LogicKind,
    tags: BTreeMap<String, String>,
    session_decorators: Vec<Arc<dyn LogicDecorator>>,
    decorator_configs: Vec<DecoratorConfig>,
    logic: MainLogic,
}

impl LogicDefinition {
    fn with_logic<I, S>(logic_id: impl Into<LogicId>, input_names: I, kind: LogicKind, logic: MainLogic) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            logic_id: logic_id.into(),
            input_names: input_names.into_iter().map(Into::into).collect(),
            kind,
            tags: BTreeMap::new(),
            session_decorators: Vec::new(),
            decorator_configs: Vec::new(),
            logic,
        }
    }

    /// Synchronous logic. `input_names` covers direct inputs and dependency names alike.
    pub fn compute<I, S, F>(logic_id: impl Into<LogicId>, input_names: I, logic: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Facets) -> Result<Value, NodeError> + Send + Sync + 'static,
    {
        let logic: MainLogic = Arc::new(move |facets: Facets| future::ready(logic(&facets)).boxed());
        Self::with_logic(logic_id, input_names, LogicKind::Compute, logic)
    }

    /// Asynchronous logic, run off the command queue.
    pub fn io<I, S, F, Fut>(logic_id: impl Into<LogicId>, input_names: I, logic: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(Facets) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, NodeError>> + Send + 'static,
    {
        let logic: MainLogic = Arc::new(move |facets: Facets| logic(facets).boxed());
        Self::with_logic(logic_id, input_names, LogicKind::Io, logic)
    }

    /// Adapts a [`NodeLogic`] implementation into an `Io` logic.
    pub fn from_node_logic<I, S>(
        logic_id: impl Into<LogicId>,
        input_names: I,
        node_logic: Arc<dyn NodeLogic>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::io(logic_id, input_names, move |facets| {
            let node_logic = node_logic.clone();
            async move { node_logic.execute(facets).await }
        })
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Adds a decorator shared by every execution of this logic.
    pub fn with_session_decorator(mut self, decorator: Arc<dyn LogicDecorator>) -> Self {
        self.session_decorators.push(decorator);
        self
    }

    /// Adds a request-scoped decorator config that only applies to this logic.
    pub fn with_decorator_config(mut self, config: DecoratorConfig) -> Self {
        self.decorator_configs.push(config);
        self
    }

    pub fn logic_id(&self) -> &LogicId {
        &self.logic_id
    }

    pub fn input_names(&self) -> &BTreeSet<String> {
        &self.input_names
    }

    pub fn kind(&self) -> LogicKind {
        self.kind
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn session_decorators(&self) -> &[Arc<dyn LogicDecorator>] {
        &self.session_decorators
    }

    pub fn decorator_configs(&self) -> &[DecoratorConfig] {
        &self.decorator_configs
    }

    pub fn logic(&self) -> MainLogic {
        self.logic.clone()
    }
}

impl fmt::Debug for LogicDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicDefinition")
            .field("logic_id", &self.logic_id)
            .field("input_names", &self.input_names)
            .field("kind", &self.kind)
            .field("tags", &self.tags)
            .field("session_decorator_count", &self.session_decorators.len())
            .field("decorator_config_count", &self.decorator_configs.len())
            .finish()
    }
}

/// Edge from a node to one of its dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDefinition {
    pub node_id: NodeId,
    /// A mandatory dependency without any successful value fails the node before its logic runs.
    pub mandatory: bool,
}

#[derive(Debug, Clone)]
pub struct NodeDefinition {
    node_id: NodeId,
    logic: LogicDefinition,
    dependencies: BTreeMap<String, DependencyDefinition>,
    resolvers: Vec<ResolverDefinition>,
}

impl NodeDefinition {
    pub fn new(node_id: impl Into<NodeId>, logic: LogicDefinition) -> Self {
        Self {
            node_id: node_id.into(),
            logic,
            dependencies: BTreeMap::new(),
            resolvers: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, name: impl Into<String>, node_id: impl Into<NodeId>) -> Self {
        self.dependencies.insert(
            name.into(),
            DependencyDefinition {
                node_id: node_id.into(),
                mandatory: false,
            },
        );
        self
    }

    pub fn with_mandatory_dependency(mut self, name: impl Into<String>, node_id: impl Into<NodeId>) -> Self {
        self.dependencies.insert(
            name.into(),
            DependencyDefinition {
                node_id: node_id.into(),
                mandatory: true,
            },
        );
        self
    }

    pub fn with_resolver(mut self, resolver: ResolverDefinition) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn logic(&self) -> &LogicDefinition {
        &self.logic
    }

    pub fn dependencies(&self) -> &BTreeMap<String, DependencyDefinition> {
        &self.dependencies
    }

    pub fn dependency(&self, name: &str) -> Option<&DependencyDefinition> {
        self.dependencies.get(name)
    }

    pub fn resolvers(&self) -> &[ResolverDefinition] {
        &self.resolvers
    }

    pub fn resolvers_for<'a>(&'a self, dependency_name: &'a str) -> impl Iterator<Item = &'a ResolverDefinition> + 'a {
        self.resolvers
            .iter()
            .filter(move |r| r.dependency_name() == dependency_name)
    }

    /// Logic input names that are not satisfied by a dependency.
    pub fn direct_input_names(&self) -> BTreeSet<String> {
        self.logic
            .input_names()
            .iter()
            .filter(|name| !self.dependencies.contains_key(*name))
            .cloned()
            .collect()
    }

    /// The undecorated logic call, preceded by the mandatory-dependency check.
    pub fn bare_logic(&self) -> MainLogic {
        let logic = self.logic.logic();
        let mandatory: Vec<String> = self
            .dependencies
            .iter()
            .filter(|(_, dependency)| dependency.mandatory)
            .map(|(name, _)| name.clone())
            .collect();
        if mandatory.is_empty() {
            return logic;
        }
        let node_id = self.node_id.clone();
        Arc::new(move |facets: Facets| {
            for name in &mandatory {
                let results = facets.dependency(name);
                if results.map_or(false, |r| r.has_value()) {
                    continue;
                }
                let cause = results
                    .and_then(|r| r.first_error())
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no value".to_string());
                let error = NodeError::MandatoryDependencyFailed {
                    node_id: node_id.to_string(),
                    dependency: name.clone(),
                    cause,
                };
                return future::ready(Err(error)).boxed();
            }
            logic(facets)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Inputs, Results, ValueOrError};
    use serde_json::json;

    fn greeting() -> NodeDefinition {
        NodeDefinition::new(
            "greeting",
            LogicDefinition::compute("greeting:logic", ["user_id", "user_info"], |facets| {
                let name = facets
                    .dependency("user_info")
                    .and_then(|r| r.first_value())
                    .and_then(|v| v.get("name"))
                    .cloned()
                    .unwrap_or(Value::Null);
                Ok(json!(format!("Hello {}", name.as_str().unwrap_or("stranger"))))
            }),
        )
        .with_mandatory_dependency("user_info", "user_service")
    }

    #[test]
    fn test_direct_input_names_exclude_dependencies() {
        let node = greeting();
        assert_eq!(node.direct_input_names(), BTreeSet::from(["user_id".to_string()]));
    }

    #[tokio::test]
    async fn test_bare_logic_fails_on_missing_mandatory_dependency() {
        let node = greeting();
        let mut deps = BTreeMap::new();
        deps.insert(
            "user_info".to_string(),
            Results::failure(NodeError::skipped("no user")),
        );
        let result = (node.bare_logic())(Facets::new(Inputs::empty(), deps)).await;

        match result.unwrap_err() {
            NodeError::MandatoryDependencyFailed { dependency, cause, .. } => {
                assert_eq!(dependency, "user_info");
                assert!(cause.contains("no user"));
            }
            other => panic!("Expected MandatoryDependencyFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bare_logic_runs_when_mandatory_dependency_has_value() {
        let node = greeting();
        let mut deps = BTreeMap::new();
        deps.insert(
            "user_info".to_string(),
            Results::single(Inputs::empty(), ValueOrError::Value(json!({"name": "Bob"}))),
        );
        let result = (node.bare_logic())(Facets::new(Inputs::empty(), deps)).await;
        assert_eq!(result, Ok(json!("Hello Bob")));
    }
}
