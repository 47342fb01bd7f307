// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised while executing a node graph.
//!
//! Two layers exist:
//! * [`NodeError`] travels *inside* the graph. It is stored in value-or-error results,
//!   shared between requests that hit the same cache entry, and compared when inputs are
//!   used as cache keys, so it is `Clone + Eq + Hash`.
//! * [`ExecutionError`] is what a caller of the executor sees at the call boundary.

use thiserror::Error;

/// Failure of a single node request.
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeError {
    /// Controlled early termination. Not a business failure.
    #[error("Node execution skipped: {reason}")]
    Skipped { reason: String },

    /// Node logic (or a resolver) reported a failure.
    #[error("{message}")]
    Logic { message: String },

    /// Node logic panicked; the panic was contained at the logic boundary.
    #[error("Logic of node '{node_id}' panicked")]
    LogicPanicked { node_id: String },

    /// A dependency declared mandatory produced no successful value.
    #[error("Mandatory dependency '{dependency}' of node '{node_id}' failed: {cause}")]
    MandatoryDependencyFailed {
        node_id: String,
        dependency: String,
        cause: String,
    },

    /// A value for the same input or dependency arrived twice for one request.
    #[error("Duplicate data for '{name}' of node '{node_id}' in request '{request_id}'")]
    DuplicateData {
        node_id: String,
        request_id: String,
        name: String,
    },

    /// A command targeted a dependant chain that is disabled for this execution.
    #[error("Dependant chain '{chain}' is disabled")]
    DisabledDependantChain { chain: String },

    /// A root request with the same id was already submitted.
    #[error("Received duplicate request '{request_id}'")]
    DuplicateRequest { request_id: String },

    /// The node id is not part of the definition registry.
    #[error("Unknown node '{node_id}'")]
    UnknownNode { node_id: String },
}

impl NodeError {
    /// Shorthand for a business failure raised by logic code.
    pub fn logic(message: impl Into<String>) -> Self {
        NodeError::Logic {
            message: message.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        NodeError::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, NodeError::Skipped { .. })
    }
}

/// Errors surfaced at the executor's public boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Work was submitted after `close()`. Rejected without touching the queue.
    #[error("Executor is already closed")]
    ExecutorClosed,

    /// The execution id of a root request was empty.
    #[error("Execution id can not be empty")]
    InvalidExecutionId,

    /// The request terminated with a node failure (including skips).
    #[error(transparent)]
    Node(#[from] NodeError),

    /// The command loop went away before the request settled.
    #[error("Command queue terminated before the request settled")]
    QueueTerminated,

    /// No tokio runtime was available to host the command loop.
    #[error("No runtime available for the command queue: {0}")]
    RuntimeUnavailable(String),
}
