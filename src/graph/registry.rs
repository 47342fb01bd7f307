// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::Arc;

use super::definition::NodeDefinition;
use super::ids::NodeId;
use super::validation::validate_node_graph;
use crate::errors::ValidationError;
use crate::observability::messages::validation::{GraphValidated, GraphValidationFailed};
use crate::observability::messages::StructuredLog;

/// Validated, immutable set of node definitions shared by executors.
#[derive(Debug, Clone, Default)]
pub struct NodeDefinitionRegistry {
    definitions: HashMap<NodeId, Arc<NodeDefinition>>,
}

impl NodeDefinitionRegistry {
    /// Validates `definitions` and builds a registry from them.
    pub fn new(definitions: Vec<NodeDefinition>) -> Result<Self, Vec<ValidationError>> {
        if let Err(errors) = validate_node_graph(&definitions) {
            for error in &errors {
                GraphValidationFailed { error }.log();
            }
            return Err(errors);
        }

        let registry = Self {
            definitions: definitions
                .into_iter()
                .map(|d| (d.node_id().clone(), Arc::new(d)))
                .collect(),
        };
        GraphValidated {
            node_count: registry.definitions.len(),
        }
        .log();
        Ok(registry)
    }

    pub fn get(&self, node_id: &NodeId) -> Option<&Arc<NodeDefinition>> {
        self.definitions.get(node_id)
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.definitions.contains_key(node_id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.definitions.keys()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
