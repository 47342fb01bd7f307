// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for per-node request processing.
//!
//! This module contains message types for logging events related to:
//! * Resolver rounds and dependency fan-out
//! * Skip propagation
//! * Main logic invocation, caching and panics
//! * Decorator flush

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A resolver ran and dispatched (or skipped) sub-requests for its dependency.
///
/// # Log Level
/// `debug!` - Per-command traffic
///
/// # Example
/// ```
/// use the_graphwood::observability::messages::node::ResolverExecuted;
///
/// let msg = ResolverExecuted {
///     node_id: "greeting",
///     request_id: "greeter:1",
///     resolver_id: "greeting:user_info",
///     dependency: "user_info",
///     sub_requests: 2,
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct ResolverExecuted<'a> {
    pub node_id: &'a str,
    pub request_id: &'a str,
    pub resolver_id: &'a str,
    pub dependency: &'a str,
    pub sub_requests: usize,
}

impl Display for ResolverExecuted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Resolver '{}' of node '{}' ran for request '{}': {} sub-requests to '{}'",
            self.resolver_id, self.node_id, self.request_id, self.sub_requests, self.dependency
        )
    }
}

impl StructuredLog for ResolverExecuted<'_> {
    fn log(&self) {
        tracing::debug!(
            node_id = self.node_id,
            request_id = self.request_id,
            resolver_id = self.resolver_id,
            dependency = self.dependency,
            sub_requests = self.sub_requests,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "resolver",
            span_name = name,
            node_id = self.node_id,
            request_id = self.request_id,
            resolver_id = self.resolver_id,
        )
    }
}

/// A dependency of a request was skipped.
///
/// # Log Level
/// `debug!` - Skips are controlled termination, not failures
pub struct DependencySkipped<'a> {
    pub node_id: &'a str,
    pub request_id: &'a str,
    pub dependency: &'a str,
    pub reason: &'a str,
}

impl Display for DependencySkipped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dependency '{}' of node '{}' skipped for request '{}': {}",
            self.dependency, self.node_id, self.request_id, self.reason
        )
    }
}

impl StructuredLog for DependencySkipped<'_> {
    fn log(&self) {
        tracing::debug!(
            node_id = self.node_id,
            request_id = self.request_id,
            dependency = self.dependency,
            reason = self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "dependency_skipped",
            span_name = name,
            node_id = self.node_id,
            dependency = self.dependency,
        )
    }
}

/// A request was skipped.
///
/// # Log Level
/// `debug!` - Skips are controlled termination, not failures
pub struct RequestSkipped<'a> {
    pub node_id: &'a str,
    pub request_id: &'a str,
    pub reason: &'a str,
}

impl Display for RequestSkipped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Request '{}' of node '{}' skipped: {}",
            self.request_id, self.node_id, self.reason
        )
    }
}

impl StructuredLog for RequestSkipped<'_> {
    fn log(&self) {
        tracing::debug!(
            node_id = self.node_id,
            request_id = self.request_id,
            reason = self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "request_skipped",
            span_name = name,
            node_id = self.node_id,
            request_id = self.request_id,
        )
    }
}

/// Main logic of a node was invoked, or attached to an existing cache entry.
///
/// # Log Level
/// `debug!` - Per-command traffic
pub struct MainLogicInvoked<'a> {
    pub node_id: &'a str,
    pub request_id: &'a str,
    pub cache_hit: bool,
    pub decorator_count: usize,
}

impl Display for MainLogicInvoked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.cache_hit {
            write!(
                f,
                "Request '{}' of node '{}' attached to cached logic result",
                self.request_id, self.node_id
            )
        } else {
            write!(
                f,
                "Invoking logic of node '{}' for request '{}' with {} decorators",
                self.node_id, self.request_id, self.decorator_count
            )
        }
    }
}

impl StructuredLog for MainLogicInvoked<'_> {
    fn log(&self) {
        tracing::debug!(
            node_id = self.node_id,
            request_id = self.request_id,
            cache_hit = self.cache_hit,
            decorator_count = self.decorator_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "main_logic",
            span_name = name,
            node_id = self.node_id,
            request_id = self.request_id,
        )
    }
}

/// Node logic panicked. The panic was converted into an error value.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct LogicPanicked<'a> {
    pub node_id: &'a str,
}

impl Display for LogicPanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Logic of node '{}' panicked", self.node_id)
    }
}

impl StructuredLog for LogicPanicked<'_> {
    fn log(&self) {
        tracing::error!(node_id = self.node_id, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("logic_panicked", span_name = name, node_id = self.node_id)
    }
}

/// A value for an input or dependency arrived twice for the same request.
///
/// # Log Level
/// `warn!` - Protocol violation
pub struct DuplicateDataReceived<'a> {
    pub node_id: &'a str,
    pub request_id: &'a str,
    pub name: &'a str,
}

impl Display for DuplicateDataReceived<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Duplicate data for '{}' of node '{}' in request '{}'",
            self.name, self.node_id, self.request_id
        )
    }
}

impl StructuredLog for DuplicateDataReceived<'_> {
    fn log(&self) {
        tracing::warn!(
            node_id = self.node_id,
            request_id = self.request_id,
            name = self.name,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "duplicate_data",
            span_name = name,
            node_id = self.node_id,
            request_id = self.request_id,
        )
    }
}

/// Decorators of a node were flushed for a dependant chain.
///
/// # Log Level
/// `debug!` - Per-command traffic
pub struct DecoratorsFlushed<'a> {
    pub node_id: &'a str,
    pub dependant_chain: &'a str,
    pub decorator_count: usize,
}

impl Display for DecoratorsFlushed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Flushed {} decorators of node '{}' for chain {}",
            self.decorator_count, self.node_id, self.dependant_chain
        )
    }
}

impl StructuredLog for DecoratorsFlushed<'_> {
    fn log(&self) {
        tracing::debug!(
            node_id = self.node_id,
            dependant_chain = self.dependant_chain,
            decorator_count = self.decorator_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "decorator_flush",
            span_name = name,
            node_id = self.node_id,
            dependant_chain = self.dependant_chain,
        )
    }
}

/// The execution reporter's collected report is ready for external consumers.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ExecutionReportReady {
    pub executions: usize,
    pub completed: usize,
}

impl Display for ExecutionReportReady {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Execution report ready: {} logic executions recorded, {} completed",
            self.executions, self.completed
        )
    }
}

impl StructuredLog for ExecutionReportReady {
    fn log(&self) {
        tracing::info!(
            executions = self.executions,
            completed = self.completed,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "execution_report",
            span_name = name,
            executions = self.executions,
            completed = self.completed,
        )
    }
}
