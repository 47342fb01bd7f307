// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use std::sync::Arc;

/// Hierarchical identity of one logical invocation.
///
/// Root ids have the form `instance:execution`. Every fan-out sub-request appends
/// `.dependency[index]` to its parent, so the ids form a tree mirroring the fan-out.
/// Each id remembers the root it originated from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId {
    id: Arc<str>,
    root: Arc<str>,
}

impl RequestId {
    pub fn root(instance_id: &str, execution_id: &str) -> Self {
        let id: Arc<str> = Arc::from(format!("{}:{}", instance_id, execution_id));
        Self {
            root: id.clone(),
            id,
        }
    }

    /// Id of the `index`-th sub-request issued to `dependency_name` on behalf of this request.
    pub fn append_indexed(&self, dependency_name: &str, index: usize) -> Self {
        Self {
            id: Arc::from(format!("{}.{}[{}]", self.id, dependency_name, index)),
            root: self.root.clone(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// The root request id this id was derived from.
    pub fn originated_from(&self) -> RequestId {
        Self {
            id: self.root.clone(),
            root: self.root.clone(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.id == self.root
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
