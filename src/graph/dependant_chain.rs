// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Call paths from a root request down to a node instance.
//!
//! A chain is an immutable, shared list of `(node, dependency)` hops, and the hop sequence is its
//! identity: two chains built independently from the same hops compare and hash equal. The
//! rendering looks like `[Start]>greeting:user_info>user_service:profile`; `\\`, `>` and `:`
//! inside ids are backslash-escaped so distinct chains never render alike.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::ids::NodeId;

const START: &str = "[Start]";

/// One `(node, dependency)` step of a chain, also the serialised form used in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hop {
    pub node: NodeId,
    pub dependency: String,
}

#[derive(Debug)]
struct Link {
    parent: DependantChain,
    hop: Hop,
}

#[derive(Debug, Clone)]
pub struct DependantChain {
    link: Option<Arc<Link>>,
    /// Root-to-leaf hops.
    hops: Arc<[Hop]>,
    rendering: Arc<str>,
}

impl DependantChain {
    /// The empty chain every root request starts from.
    pub fn start() -> Self {
        Self {
            link: None,
            hops: Arc::from(Vec::new()),
            rendering: Arc::from(START),
        }
    }

    /// Builds a chain from hops, in root-to-leaf order.
    pub fn from_hops<I>(hops: I) -> Self
    where
        I: IntoIterator<Item = Hop>,
    {
        hops.into_iter()
            .fold(Self::start(), |chain, hop| chain.extend(&hop.node, &hop.dependency))
    }

    pub fn extend(&self, node_id: &NodeId, dependency_name: &str) -> Self {
        let hop = Hop {
            node: node_id.clone(),
            dependency: dependency_name.to_string(),
        };
        let hops: Vec<Hop> = self.hops.iter().cloned().chain([hop.clone()]).collect();
        Self {
            rendering: Arc::from(format!(
                "{}>{}:{}",
                self.rendering,
                escape(node_id.as_str()),
                escape(dependency_name)
            )),
            hops: Arc::from(hops),
            link: Some(Arc::new(Link {
                parent: self.clone(),
                hop,
            })),
        }
    }

    pub fn is_start(&self) -> bool {
        self.link.is_none()
    }

    /// Whether `node_id` appears anywhere along this chain.
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.hops.iter().any(|hop| &hop.node == node_id)
    }

    pub fn parent(&self) -> Option<&DependantChain> {
        self.link.as_ref().map(|link| &link.parent)
    }

    pub fn last_hop(&self) -> Option<&Hop> {
        self.link.as_ref().map(|link| &link.hop)
    }

    /// Hops in root-to-leaf order.
    pub fn hops(&self) -> Vec<Hop> {
        self.hops.to_vec()
    }

    pub fn depth(&self) -> usize {
        self.hops.len()
    }

    /// Canonical rendering, usable as a decorator instance id.
    pub fn as_str(&self) -> &str {
        &self.rendering
    }
}

impl Default for DependantChain {
    fn default() -> Self {
        Self::start()
    }
}

impl PartialEq for DependantChain {
    fn eq(&self, other: &Self) -> bool {
        self.hops == other.hops
    }
}

impl Eq for DependantChain {}

impl Hash for DependantChain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hops.hash(state);
    }
}

impl PartialOrd for DependantChain {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DependantChain {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hops.cmp(&other.hops)
    }
}

fn escape(part: &str) -> String {
    let mut escaped = String::with_capacity(part.len());
    for c in part.chars() {
        if matches!(c, '\\' | '>' | ':') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl fmt::Display for DependantChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendering)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn node(id: &str) -> NodeId {
        NodeId::new(id)
    }

    #[test]
    fn test_independently_built_chains_are_equal() {
        let a = DependantChain::start()
            .extend(&node("greeting"), "user_info")
            .extend(&node("user_service"), "profile");
        let b = DependantChain::from_hops(vec![
            Hop {
                node: node("greeting"),
                dependency: "user_info".to_string(),
            },
            Hop {
                node: node("user_service"),
                dependency: "profile".to_string(),
            },
        ]);

        assert_eq!(a, b);
        let set: HashSet<_> = [a.clone()].into_iter().collect();
        assert!(set.contains(&b));
        assert_eq!(a.as_str(), "[Start]>greeting:user_info>user_service:profile");
    }

    #[test]
    fn test_different_hops_differ() {
        let start = DependantChain::start();
        let a = start.extend(&node("n"), "x");
        let b = start.extend(&node("n"), "y");
        assert_ne!(a, b);
        assert_ne!(a, start);
    }

    #[test]
    fn test_separators_inside_ids_do_not_merge_chains() {
        let a = DependantChain::start().extend(&node("a:b"), "c");
        let b = DependantChain::start().extend(&node("a"), "b:c");
        assert_ne!(a, b);
        assert_ne!(a.as_str(), b.as_str());

        let nested = DependantChain::start().extend(&node("x>y"), "z");
        let two_hops = DependantChain::from_hops(vec![
            Hop {
                node: node("x"),
                dependency: String::new(),
            },
            Hop {
                node: node("y"),
                dependency: "z".to_string(),
            },
        ]);
        assert_ne!(nested, two_hops);
        assert_ne!(nested.as_str(), two_hops.as_str());
        assert_eq!(a.as_str(), "[Start]>a\\:b:c");

        let set: HashSet<_> = [a.clone(), b.clone()].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_contains_checks_every_ancestor() {
        let chain = DependantChain::start()
            .extend(&node("a"), "to_b")
            .extend(&node("b"), "to_c");

        assert!(chain.contains(&node("a")));
        assert!(chain.contains(&node("b")));
        assert!(!chain.contains(&node("c")));
        assert!(!DependantChain::start().contains(&node("a")));
    }

    #[test]
    fn test_hops_and_parent() {
        let parent = DependantChain::start().extend(&node("a"), "d1");
        let chain = parent.extend(&node("b"), "d2");

        assert_eq!(chain.parent(), Some(&parent));
        assert_eq!(chain.depth(), 2);
        assert_eq!(chain.last_hop().map(|h| h.dependency.as_str()), Some("d2"));
        assert_eq!(DependantChain::from_hops(chain.hops()), chain);
    }
}
