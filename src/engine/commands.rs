// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The closed set of commands exchanged between the executor and nodes.

use std::collections::BTreeSet;

use crate::data::{Inputs, Results};
use crate::graph::{DependantChain, NodeId, RequestId};

/// Who is waiting on a request's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Waiter {
    /// The caller of `execute_node`.
    Root(RequestId),
    /// Sub-request `index` issued by `node_id` for its dependency `dependency_name`.
    Dependant {
        node_id: NodeId,
        request_id: RequestId,
        dependency_name: String,
        index: usize,
    },
}

#[derive(Debug, Clone)]
pub(crate) enum NodeCommand {
    /// Supplies values for `input_names`. A name listed without a value is delivered as absent.
    ExecuteWithInputs {
        node_id: NodeId,
        request_id: RequestId,
        input_names: BTreeSet<String>,
        values: Inputs,
        dependant_chain: DependantChain,
        reply_to: Option<Waiter>,
    },
    /// Delivers the aggregated results of one dependency.
    ExecuteWithDependency {
        node_id: NodeId,
        request_id: RequestId,
        dependency_name: String,
        results: Results,
    },
    SkipNode {
        node_id: NodeId,
        request_id: RequestId,
        dependant_chain: DependantChain,
        reason: String,
        reply_to: Option<Waiter>,
    },
    Flush {
        node_id: NodeId,
        dependant_chain: DependantChain,
    },
    /// Several `ExecuteWithInputs` commands for the same node, handled together.
    InputBatch {
        node_id: NodeId,
        commands: Vec<NodeCommand>,
    },
}

impl NodeCommand {
    pub(crate) fn node_id(&self) -> &NodeId {
        match self {
            NodeCommand::ExecuteWithInputs { node_id, .. }
            | NodeCommand::ExecuteWithDependency { node_id, .. }
            | NodeCommand::SkipNode { node_id, .. }
            | NodeCommand::Flush { node_id, .. }
            | NodeCommand::InputBatch { node_id, .. } => node_id,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            NodeCommand::ExecuteWithInputs { .. } => "execute_with_inputs",
            NodeCommand::ExecuteWithDependency { .. } => "execute_with_dependency",
            NodeCommand::SkipNode { .. } => "skip_node",
            NodeCommand::Flush { .. } => "flush",
            NodeCommand::InputBatch { .. } => "input_batch",
        }
    }

    pub(crate) fn request_id(&self) -> Option<&RequestId> {
        match self {
            NodeCommand::ExecuteWithInputs { request_id, .. }
            | NodeCommand::ExecuteWithDependency { request_id, .. }
            | NodeCommand::SkipNode { request_id, .. } => Some(request_id),
            NodeCommand::Flush { .. } | NodeCommand::InputBatch { .. } => None,
        }
    }

    /// The chain a request command registers on. Dependency deliveries carry none.
    pub(crate) fn dependant_chain(&self) -> Option<&DependantChain> {
        match self {
            NodeCommand::ExecuteWithInputs { dependant_chain, .. }
            | NodeCommand::SkipNode { dependant_chain, .. }
            | NodeCommand::Flush { dependant_chain, .. } => Some(dependant_chain),
            NodeCommand::ExecuteWithDependency { .. } | NodeCommand::InputBatch { .. } => None,
        }
    }

    pub(crate) fn take_reply_to(&mut self) -> Option<Waiter> {
        match self {
            NodeCommand::ExecuteWithInputs { reply_to, .. }
            | NodeCommand::SkipNode { reply_to, .. } => reply_to.take(),
            _ => None,
        }
    }
}
