// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Build-time validation of node definitions.
//!
//! # Validation Pipeline
//!
//! 1. **Uniqueness**: every node id appears once
//! 2. **References**: dependency edges point at registered nodes, dependency names are logic
//!    inputs, and resolvers only target declared dependencies and bind to known names
//! 3. **Cycle Detection**: DFS with a recursion stack over node-to-dependency edges
//!
//! Cycle detection needs a structurally valid graph, so it only runs when the first two
//! stages pass. Errors are accumulated so a caller sees every problem at once.

use std::collections::{BTreeMap, HashSet};

use super::definition::NodeDefinition;
use crate::errors::ValidationError;

/// Validates a set of node definitions for structural integrity and acyclicity.
///
/// # Returns
///
/// * `Ok(())` - Definitions can be executed
/// * `Err(Vec<ValidationError>)` - Every validation error found
pub fn validate_node_graph(definitions: &[NodeDefinition]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(duplicate_errors) = validate_unique_node_ids(definitions) {
        errors.extend(duplicate_errors);
    }

    if let Err(reference_errors) = validate_references(definitions) {
        errors.extend(reference_errors);
    }

    if errors.is_empty() {
        if let Err(cycle_errors) = validate_acyclic_graph(definitions) {
            errors.extend(cycle_errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_unique_node_ids(definitions: &[NodeDefinition]) -> Result<(), Vec<ValidationError>> {
    let mut seen_ids = HashSet::new();
    let mut errors = Vec::new();

    for definition in definitions {
        if !seen_ids.insert(definition.node_id()) {
            errors.push(ValidationError::DuplicateNodeId {
                node_id: definition.node_id().to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Checks every edge and resolver binding against the registered definitions.
///
/// **Time Complexity**: O(n + d + r) where n = nodes, d = dependencies, r = resolvers
fn validate_references(definitions: &[NodeDefinition]) -> Result<(), Vec<ValidationError>> {
    let node_ids: HashSet<&str> = definitions.iter().map(|d| d.node_id().as_str()).collect();
    let mut errors = Vec::new();

    for definition in definitions {
        let node_id = definition.node_id().to_string();
        let input_names = definition.logic().input_names();

        for (dependency_name, dependency) in definition.dependencies() {
            if !node_ids.contains(dependency.node_id.as_str()) {
                errors.push(ValidationError::UnresolvedDependency {
                    node_id: node_id.clone(),
                    dependency_name: dependency_name.clone(),
                    missing_node: dependency.node_id.to_string(),
                });
            }
            if !input_names.contains(dependency_name) {
                errors.push(ValidationError::DependencyNotAnInput {
                    node_id: node_id.clone(),
                    dependency_name: dependency_name.clone(),
                });
            }
        }

        for resolver in definition.resolvers() {
            if definition.dependency(resolver.dependency_name()).is_none() {
                errors.push(ValidationError::UnknownResolverDependency {
                    node_id: node_id.clone(),
                    resolver_id: resolver.resolver_id().to_string(),
                    dependency_name: resolver.dependency_name().to_string(),
                });
            }
            for bound in resolver.bound_from() {
                if !input_names.contains(bound) {
                    errors.push(ValidationError::UnknownBoundFromInput {
                        node_id: node_id.clone(),
                        resolver_id: resolver.resolver_id().to_string(),
                        input_name: bound.clone(),
                    });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Detects cycles with a "three colors" DFS and reports the first cycle path found.
///
/// Nodes are visited in id order so the reported cycle is deterministic.
fn validate_acyclic_graph(definitions: &[NodeDefinition]) -> Result<(), Vec<ValidationError>> {
    let mut graph: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for definition in definitions {
        let edges = definition
            .dependencies()
            .values()
            .map(|dependency| dependency.node_id.as_str())
            .collect();
        graph.insert(definition.node_id().as_str(), edges);
    }

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for node_id in graph.keys() {
        if !visited.contains(*node_id) {
            if let Some(cycle) =
                dfs_cycle_detection(node_id, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                return Err(vec![ValidationError::CyclicDependency { cycle }]);
            }
        }
    }

    Ok(())
}

/// DFS step. A neighbor still on the recursion stack closes a cycle; the cycle path is the
/// segment of `path` from that neighbor to the current node, plus the back edge.
fn dfs_cycle_detection(
    node: &str,
    graph: &BTreeMap<&str, Vec<&str>>,
    visited: &mut HashSet<String>,
    rec_stack: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    visited.insert(node.to_string());
    rec_stack.insert(node.to_string());
    path.push(node.to_string());

    if let Some(neighbors) = graph.get(node) {
        for &neighbor in neighbors {
            if !visited.contains(neighbor) {
                if let Some(cycle) = dfs_cycle_detection(neighbor, graph, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(neighbor) {
                let cycle_start = path.iter().position(|x| x == neighbor).unwrap_or(0);
                let mut cycle = path[cycle_start..].to_vec();
                cycle.push(neighbor.to_string());
                return Some(cycle);
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    None
}
