// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for executor lifecycle and command-queue events.
//!
//! This module contains message types for logging events related to:
//! * Executor start-up and configuration
//! * Root request registration and rejection
//! * Flush and close cycles
//! * Command validation failures and queue lease release

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Executor started and its command loop is running.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_graphwood::observability::messages::engine::ExecutorStarted;
///
/// let msg = ExecutorStarted {
///     instance_id: "greeter",
///     command_order: "depth",
///     dispatch: "batch",
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ExecutorStarted<'a> {
    pub instance_id: &'a str,
    pub command_order: &'a str,
    pub dispatch: &'a str,
}

impl Display for ExecutorStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Node executor '{}' started: command_order={}, dispatch={}",
            self.instance_id, self.command_order, self.dispatch
        )
    }
}

impl StructuredLog for ExecutorStarted<'_> {
    fn log(&self) {
        tracing::info!(
            instance_id = self.instance_id,
            command_order = self.command_order,
            dispatch = self.dispatch,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "executor",
            span_name = name,
            instance_id = self.instance_id,
            command_order = self.command_order,
            dispatch = self.dispatch,
        )
    }
}

/// A root request was registered and waits for the next flush.
///
/// # Log Level
/// `debug!` - Per-request traffic
pub struct RootRequestRegistered<'a> {
    pub request_id: &'a str,
    pub node_id: &'a str,
}

impl Display for RootRequestRegistered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Registered root request '{}' for node '{}'",
            self.request_id, self.node_id
        )
    }
}

impl StructuredLog for RootRequestRegistered<'_> {
    fn log(&self) {
        tracing::debug!(
            request_id = self.request_id,
            node_id = self.node_id,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "root_request",
            span_name = name,
            request_id = self.request_id,
            node_id = self.node_id,
        )
    }
}

/// A root request was refused inside the command queue.
///
/// # Log Level
/// `warn!` - Caller error, the request's future fails
pub struct RootRequestRejected<'a> {
    pub request_id: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for RootRequestRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Rejected root request '{}': {}", self.request_id, self.error)
    }
}

impl StructuredLog for RootRequestRejected<'_> {
    fn log(&self) {
        tracing::warn!(
            request_id = self.request_id,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "root_request_rejected",
            span_name = name,
            request_id = self.request_id,
            error = %self.error,
        )
    }
}

/// Pending root requests were dispatched and flush issued to their nodes.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_graphwood::observability::messages::engine::ExecutorFlushed;
///
/// let msg = ExecutorFlushed {
///     instance_id: "greeter",
///     dispatched_requests: 3,
///     flushed_nodes: 1,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ExecutorFlushed<'a> {
    pub instance_id: &'a str,
    pub dispatched_requests: usize,
    pub flushed_nodes: usize,
}

impl Display for ExecutorFlushed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Executor '{}' flushed: dispatched {} root requests, flushed {} nodes",
            self.instance_id, self.dispatched_requests, self.flushed_nodes
        )
    }
}

impl StructuredLog for ExecutorFlushed<'_> {
    fn log(&self) {
        tracing::info!(
            instance_id = self.instance_id,
            dispatched_requests = self.dispatched_requests,
            flushed_nodes = self.flushed_nodes,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "flush",
            span_name = name,
            instance_id = self.instance_id,
            dispatched_requests = self.dispatched_requests,
            flushed_nodes = self.flushed_nodes,
        )
    }
}

/// Executor stopped accepting requests and waits for admitted ones to settle.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ExecutorClosing<'a> {
    pub instance_id: &'a str,
    pub outstanding_requests: usize,
}

impl Display for ExecutorClosing<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Executor '{}' closing with {} outstanding root requests",
            self.instance_id, self.outstanding_requests
        )
    }
}

impl StructuredLog for ExecutorClosing<'_> {
    fn log(&self) {
        tracing::info!(
            instance_id = self.instance_id,
            outstanding_requests = self.outstanding_requests,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "close",
            span_name = name,
            instance_id = self.instance_id,
            outstanding_requests = self.outstanding_requests,
        )
    }
}

/// Every admitted request settled; the command queue lease was returned.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ExecutorClosed<'a> {
    pub instance_id: &'a str,
    pub total_requests: usize,
    pub commands_queued: u64,
}

impl Display for ExecutorClosed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Executor '{}' closed after {} root requests ({} queued commands); lease released",
            self.instance_id, self.total_requests, self.commands_queued
        )
    }
}

impl StructuredLog for ExecutorClosed<'_> {
    fn log(&self) {
        tracing::info!(
            instance_id = self.instance_id,
            total_requests = self.total_requests,
            commands_queued = self.commands_queued,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "closed",
            span_name = name,
            instance_id = self.instance_id,
            total_requests = self.total_requests,
        )
    }
}

/// A command failed validation before reaching its node.
///
/// # Log Level
/// `warn!` - Protocol violation, the command's waiter fails
///
/// # Example
/// ```
/// use the_graphwood::observability::messages::engine::CommandRejected;
/// use the_graphwood::errors::NodeError;
///
/// let error = NodeError::DisabledDependantChain { chain: "[Start]>a:b".into() };
/// let msg = CommandRejected {
///     node_id: "b",
///     command: "ExecuteWithInputs",
///     error: &error,
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct CommandRejected<'a> {
    pub node_id: &'a str,
    pub command: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for CommandRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} for node '{}' rejected: {}",
            self.command, self.node_id, self.error
        )
    }
}

impl StructuredLog for CommandRejected<'_> {
    fn log(&self) {
        tracing::warn!(
            node_id = self.node_id,
            command = self.command,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "command_rejected",
            span_name = name,
            node_id = self.node_id,
            command = self.command,
        )
    }
}

/// A command-queue lease went back to its pool.
///
/// # Log Level
/// `info!` - Important operational event
pub struct QueueLeaseReleased {
    pub item_id: usize,
    pub remaining_leases: usize,
}

impl Display for QueueLeaseReleased {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Released lease on command queue {} ({} leases remaining)",
            self.item_id, self.remaining_leases
        )
    }
}

impl StructuredLog for QueueLeaseReleased {
    fn log(&self) {
        tracing::info!(
            item_id = self.item_id,
            remaining_leases = self.remaining_leases,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("queue_lease", span_name = name, item_id = self.item_id)
    }
}
