// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::Value;

use crate::config::NodeExecutionConfig;
use crate::data::Inputs;
use crate::engine::RequestHandle;
use crate::errors::ExecutionError;
use crate::graph::NodeId;

/// Executes root requests against a node graph.
///
/// Work is accepted by [`GraphExecutor::execute_node`] but not started until the next
/// [`GraphExecutor::flush`] (or [`GraphExecutor::close`], which implies one).
#[async_trait]
pub trait GraphExecutor: Send + Sync {
    /// Registers a root request for `node_id` and returns a handle to its eventual result.
    ///
    /// Fails immediately with [`ExecutionError::ExecutorClosed`] after `close()`, and with
    /// [`ExecutionError::InvalidExecutionId`] for an empty execution id.
    fn execute_node(
        &self,
        node_id: &NodeId,
        inputs: Inputs,
        config: NodeExecutionConfig,
    ) -> Result<RequestHandle, ExecutionError>;

    /// Dispatches every root request registered since the previous flush.
    fn flush(&self);

    /// Rejects further work, flushes, and releases the executor's resources once every
    /// outstanding request has settled. Idempotent.
    fn close(&self);

    /// Submit, flush and await a single request.
    async fn execute(
        &self,
        node_id: &NodeId,
        inputs: Inputs,
        config: NodeExecutionConfig,
    ) -> Result<Value, ExecutionError> {
        let handle = self.execute_node(node_id, inputs, config)?;
        self.flush();
        handle.await
    }
}
