// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for graph validation and configuration loading.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Node definitions passed validation and were registered.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_graphwood::observability::messages::validation::GraphValidated;
///
/// let msg = GraphValidated { node_count: 4 };
/// tracing::info!("{}", msg);
/// ```
pub struct GraphValidated {
    pub node_count: usize,
}

impl Display for GraphValidated {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Node graph validated: {} nodes registered", self.node_count)
    }
}

impl StructuredLog for GraphValidated {
    fn log(&self) {
        tracing::info!(node_count = self.node_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("graph_validated", span_name = name, node_count = self.node_count)
    }
}

/// A node graph failed validation.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct GraphValidationFailed<'a> {
    pub error: &'a dyn std::error::Error,
}

impl Display for GraphValidationFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Node graph validation failed: {}", self.error)
    }
}

impl StructuredLog for GraphValidationFailed<'_> {
    fn log(&self) {
        tracing::error!(error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("graph_validation_failed", span_name = name, error = %self.error)
    }
}

/// Executor configuration was loaded from a file.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ConfigLoaded<'a> {
    pub path: &'a str,
    pub format: &'a str,
}

impl Display for ConfigLoaded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Loaded {} executor config from '{}'", self.format, self.path)
    }
}

impl StructuredLog for ConfigLoaded<'_> {
    fn log(&self) {
        tracing::info!(path = self.path, format = self.format, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("config_loaded", span_name = name, path = self.path)
    }
}
