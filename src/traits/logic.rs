// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::Value;

use crate::data::Facets;
use crate::errors::NodeError;

/// Asynchronous node logic implemented as a type.
///
/// Wrap it with [`crate::graph::LogicDefinition::from_node_logic`] to place it in a graph; it
/// always runs off the command queue.
#[async_trait]
pub trait NodeLogic: Send + Sync {
    async fn execute(&self, facets: Facets) -> Result<Value, NodeError>;

    fn name(&self) -> &'static str;
}
