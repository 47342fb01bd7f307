// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::BTreeSet;

use crate::graph::{DependantChain, Hop};

/// Per-root-request settings passed to `execute_node`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeExecutionConfig {
    /// Combined with the executor's instance id into the root request id. Must not be empty.
    pub execution_id: String,
    /// Chains that must not execute for this request, on top of the executor-level ones.
    pub disabled_dependant_chains: BTreeSet<DependantChain>,
}

impl NodeExecutionConfig {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            disabled_dependant_chains: BTreeSet::new(),
        }
    }

    pub fn with_disabled_chain<I>(mut self, hops: I) -> Self
    where
        I: IntoIterator<Item = Hop>,
    {
        self.disabled_dependant_chains
            .insert(DependantChain::from_hops(hops));
        self
    }
}
