// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use thiserror::Error;

/// Errors that can occur during node graph validation
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A circular dependency was detected between node definitions
    CyclicDependency {
        /// The cycle path showing the circular dependency
        cycle: Vec<String>,
    },
    /// A dependency edge points at a node that is not registered
    UnresolvedDependency {
        /// The node that declares the dependency
        node_id: String,
        /// The dependency name on that node
        dependency_name: String,
        /// The node id that couldn't be resolved
        missing_node: String,
    },
    /// Two definitions share a node id
    DuplicateNodeId {
        /// The duplicate node ID
        node_id: String,
    },
    /// A resolver targets a dependency the node does not declare
    UnknownResolverDependency {
        node_id: String,
        resolver_id: String,
        dependency_name: String,
    },
    /// A resolver is bound from a name that is neither an input nor a dependency of the node
    UnknownBoundFromInput {
        node_id: String,
        resolver_id: String,
        input_name: String,
    },
    /// A declared dependency is not among the logic's input names
    DependencyNotAnInput {
        node_id: String,
        dependency_name: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::CyclicDependency { cycle } => {
                write!(f, "Cyclic dependency detected: {}", cycle.join(" -> "))
            }
            ValidationError::UnresolvedDependency {
                node_id,
                dependency_name,
                missing_node,
            } => {
                write!(
                    f,
                    "Node '{}' dependency '{}' points at '{}' which does not exist",
                    node_id, dependency_name, missing_node
                )
            }
            ValidationError::DuplicateNodeId { node_id } => {
                write!(f, "Duplicate node ID: '{}'", node_id)
            }
            ValidationError::UnknownResolverDependency {
                node_id,
                resolver_id,
                dependency_name,
            } => {
                write!(
                    f,
                    "Resolver '{}' of node '{}' resolves undeclared dependency '{}'",
                    resolver_id, node_id, dependency_name
                )
            }
            ValidationError::UnknownBoundFromInput {
                node_id,
                resolver_id,
                input_name,
            } => {
                write!(
                    f,
                    "Resolver '{}' of node '{}' is bound from unknown input '{}'",
                    resolver_id, node_id, input_name
                )
            }
            ValidationError::DependencyNotAnInput {
                node_id,
                dependency_name,
            } => {
                write!(
                    f,
                    "Dependency '{}' of node '{}' is not declared as a logic input",
                    dependency_name, node_id
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors raised while loading an executor configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Unsupported config file extension: '{0}' (expected yaml, yml or toml)")]
    UnsupportedExtension(String),
}
