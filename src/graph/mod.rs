// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Static graph model: identifiers, call paths, node/logic/resolver definitions and the
//! validated registry that holds them.

mod definition;
mod dependant_chain;
mod ids;
mod registry;
mod request_id;
mod resolver;
mod validation;

pub use definition::{
    DependencyDefinition, LogicDefinition, LogicFuture, LogicKind, MainLogic, NodeDefinition,
};
pub use dependant_chain::{DependantChain, Hop};
pub use ids::{LogicId, NodeId};
pub use registry::NodeDefinitionRegistry;
pub use request_id::RequestId;
pub use resolver::{ResolverCommand, ResolverDefinition, ResolverFn};
pub use validation::validate_node_graph;
