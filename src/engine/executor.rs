// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Single-threaded command-queue executor for node graphs.
//!
//! All node state is owned by one command loop running on a leased tokio runtime. Callers
//! interact with it only through messages, so nodes never need locks:
//!
//! ```text
//!  execute_node ──► Submit ──┐
//!  flush        ──► Flush  ──┤                ┌──► Node::handle ──► effects
//!  close        ──► Close  ──┼──► command loop┤
//!  spawned logic ─► LogicCompleted ──┘        └──► reply to RequestHandle
//! ```
//!
//! # Deferred dispatch
//!
//! `execute_node` only registers a root request and materialises the nodes reachable from it.
//! Nothing executes until [`NodeExecutor::flush`] (or [`NodeExecutor::close`]) dispatches every
//! request registered since the previous flush and then flushes each root node.
//!
//! # Ordering policies
//!
//! Commands produced while handling a command are scheduled by [`CommandOrder`]:
//! - **Breadth**: appended to the back of the queue, behind everything already submitted.
//! - **Depth**: run inline before anything else, so one root's sub-graph tends to finish
//!   before the next root starts.
//!
//! Dependency results produced by `Io` logic always re-enter through the queue. Logic itself is
//! polled once inline when it is `Compute`; anything that suspends is spawned and its result
//! comes back as a queue message.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use std::sync::Arc;
//! use the_graphwood::config::{ExecutorConfig, NodeExecutionConfig};
//! use the_graphwood::data::Inputs;
//! use the_graphwood::engine::NodeExecutor;
//! use the_graphwood::graph::{LogicDefinition, NodeDefinition, NodeDefinitionRegistry};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hello = NodeDefinition::new(
//!     "hello",
//!     LogicDefinition::compute("hello:logic", ["name"], |facets| {
//!         Ok(json!(format!("Hello {}", facets.value("name").and_then(|v| v.as_str()).unwrap_or("?"))))
//!     }),
//! );
//! let registry = NodeDefinitionRegistry::new(vec![hello]).map_err(|errors| format!("{:?}", errors))?;
//! let executor = NodeExecutor::with_current_runtime(Arc::new(registry), ExecutorConfig::new("docs"))?;
//!
//! let handle = executor.execute_node(
//!     &"hello".into(),
//!     Inputs::from([("name", json!("Ada"))]),
//!     NodeExecutionConfig::new("1"),
//! )?;
//! executor.close();
//!
//! assert_eq!(handle.await?, json!("Hello Ada"));
//! executor.terminated().await;
//! # Ok(())
//! # }
//! ```

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::commands::{NodeCommand, Waiter};
use super::metrics::{ExecutorMetrics, MetricsSnapshot};
use super::node::{Effect, Node, NodeEnv};
use crate::config::{CommandOrder, DispatchStrategy, ExecutorConfig, NodeExecutionConfig};
use crate::data::{Inputs, RequestOutcome, ValueOrError};
use crate::decoration::{DecoratorRegistry, LogicDecorator};
use crate::errors::{ExecutionError, NodeError};
use crate::graph::{DependantChain, LogicFuture, NodeDefinitionRegistry, NodeId, RequestId};
use crate::observability::messages::engine::{
    CommandRejected, ExecutorClosed, ExecutorClosing, ExecutorFlushed, ExecutorStarted,
    RootRequestRegistered, RootRequestRejected,
};
use crate::observability::messages::StructuredLog;
use crate::traits::GraphExecutor;
use crate::utils::{Lease, LeasePool};

/// A tokio runtime handle that command loops can be spawned on.
#[derive(Debug, Clone)]
pub struct QueueRuntime {
    handle: Handle,
}

impl QueueRuntime {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// The runtime the caller is currently running on.
    pub fn current() -> Result<Self, ExecutionError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| ExecutionError::RuntimeUnavailable(e.to_string()))
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

type RootReply = oneshot::Sender<Result<Value, ExecutionError>>;

pub(crate) enum QueueMessage {
    Submit {
        node_id: NodeId,
        inputs: Inputs,
        config: NodeExecutionConfig,
        reply: RootReply,
    },
    Command(NodeCommand),
    LogicCompleted {
        node_id: NodeId,
        key: Inputs,
        result: Result<Value, NodeError>,
    },
    Flush,
    Close,
}

/// Eventual result of a root request.
///
/// An absent value resolves to `Value::Null`; an error value or a failed request resolves to
/// [`ExecutionError::Node`].
#[derive(Debug)]
pub struct RequestHandle {
    receiver: oneshot::Receiver<Result<Value, ExecutionError>>,
}

impl Future for RequestHandle {
    type Output = Result<Value, ExecutionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(ExecutionError::QueueTerminated)))
    }
}

pub struct NodeExecutor {
    instance_id: String,
    sender: mpsc::UnboundedSender<QueueMessage>,
    closed: AtomicBool,
    metrics: Arc<ExecutorMetrics>,
    terminated: CancellationToken,
}

impl NodeExecutor {
    /// Starts a command loop on a runtime leased from `pool`.
    pub fn new(
        registry: Arc<NodeDefinitionRegistry>,
        config: ExecutorConfig,
        pool: &LeasePool<QueueRuntime>,
    ) -> Self {
        let lease = pool.lease();
        let handle = lease.get().handle().clone();
        let (sender, receiver) = mpsc::unbounded_channel();
        let metrics = Arc::new(ExecutorMetrics::default());
        let terminated = CancellationToken::new();

        ExecutorStarted {
            instance_id: &config.instance_id,
            command_order: config.command_order.as_str(),
            dispatch: config.dispatch.as_str(),
        }
        .log();

        let command_loop = CommandLoop::new(
            registry,
            &config,
            lease,
            sender.clone(),
            metrics.clone(),
            terminated.clone(),
        );
        handle.spawn(command_loop.run(receiver));

        Self {
            instance_id: config.instance_id,
            sender,
            closed: AtomicBool::new(false),
            metrics,
            terminated,
        }
    }

    /// Starts a command loop on the current tokio runtime.
    pub fn with_current_runtime(
        registry: Arc<NodeDefinitionRegistry>,
        config: ExecutorConfig,
    ) -> Result<Self, ExecutionError> {
        let runtime = QueueRuntime::current()?;
        let pool = LeasePool::new(config.queue_pool.max_leases_per_item, move || runtime.clone());
        Ok(Self::new(registry, config, &pool))
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn execute_node(
        &self,
        node_id: &NodeId,
        inputs: Inputs,
        config: NodeExecutionConfig,
    ) -> Result<RequestHandle, ExecutionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ExecutionError::ExecutorClosed);
        }
        if config.execution_id.is_empty() {
            return Err(ExecutionError::InvalidExecutionId);
        }
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(QueueMessage::Submit {
                node_id: node_id.clone(),
                inputs,
                config,
                reply,
            })
            .map_err(|_| ExecutionError::QueueTerminated)?;
        Ok(RequestHandle { receiver })
    }

    pub fn flush(&self) {
        let _ = self.sender.send(QueueMessage::Flush);
    }

    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.sender.send(QueueMessage::Flush);
        let _ = self.sender.send(QueueMessage::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once a closed executor has settled every request and released its queue.
    pub async fn terminated(&self) {
        self.terminated.cancelled().await
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Drop for NodeExecutor {
    fn drop(&mut self) {
        self.close();
    }
}

impl GraphExecutor for NodeExecutor {
    fn execute_node(
        &self,
        node_id: &NodeId,
        inputs: Inputs,
        config: NodeExecutionConfig,
    ) -> Result<RequestHandle, ExecutionError> {
        NodeExecutor::execute_node(self, node_id, inputs, config)
    }

    fn flush(&self) {
        NodeExecutor::flush(self)
    }

    fn close(&self) {
        NodeExecutor::close(self)
    }
}

struct RootRequest {
    node_id: NodeId,
    inputs: Inputs,
    disabled_chains: BTreeSet<DependantChain>,
    reply: Option<RootReply>,
}

struct CommandLoop {
    instance_id: String,
    registry: Arc<NodeDefinitionRegistry>,
    command_order: CommandOrder,
    dispatch: DispatchStrategy,
    disabled_chains: HashSet<DependantChain>,
    decorators: DecoratorRegistry,
    nodes: HashMap<NodeId, Node>,
    chains_per_node: HashMap<NodeId, BTreeSet<DependantChain>>,
    no_chains: BTreeSet<DependantChain>,
    root_requests: HashMap<RequestId, RootRequest>,
    /// Every root id ever accepted; outlives the settled requests pruned at quiescence.
    seen_requests: HashSet<RequestId>,
    unflushed: Vec<RequestId>,
    /// Depth-ordered commands; the last element runs next.
    inline: Vec<NodeCommand>,
    /// Queued commands plus spawned logic executions not yet received back.
    in_flight: usize,
    closing: bool,
    metrics: Arc<ExecutorMetrics>,
    sender: mpsc::UnboundedSender<QueueMessage>,
    runtime: Lease<QueueRuntime>,
    terminated: CancellationToken,
}

impl CommandLoop {
    fn new(
        registry: Arc<NodeDefinitionRegistry>,
        config: &ExecutorConfig,
        runtime: Lease<QueueRuntime>,
        sender: mpsc::UnboundedSender<QueueMessage>,
        metrics: Arc<ExecutorMetrics>,
        terminated: CancellationToken,
    ) -> Self {
        Self {
            instance_id: config.instance_id.clone(),
            registry,
            command_order: config.command_order,
            dispatch: config.dispatch,
            disabled_chains: config.disabled_chains(),
            decorators: DecoratorRegistry::new(
                config.decorator_configs().to_vec(),
                config.decoration_ordering().clone(),
            ),
            nodes: HashMap::new(),
            chains_per_node: HashMap::new(),
            no_chains: BTreeSet::new(),
            root_requests: HashMap::new(),
            seen_requests: HashSet::new(),
            unflushed: Vec::new(),
            inline: Vec::new(),
            in_flight: 0,
            closing: false,
            metrics,
            sender,
            runtime,
            terminated,
        }
    }

    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<QueueMessage>) {
        while let Some(message) = receiver.recv().await {
            self.receive(message);
            while let Some(command) = self.inline.pop() {
                self.process(command);
            }
            self.check_settled();
            if self.terminated.is_cancelled() {
                break;
            }
        }
    }

    fn receive(&mut self, message: QueueMessage) {
        match message {
            QueueMessage::Submit {
                node_id,
                inputs,
                config,
                reply,
            } => self.register_root(node_id, inputs, config, reply),
            QueueMessage::Command(command) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                self.metrics.command_queued();
                self.process(command);
            }
            QueueMessage::LogicCompleted {
                node_id,
                key,
                result,
            } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                if let Some(node) = self.nodes.get_mut(&node_id) {
                    let effects = node.complete_logic(key, result);
                    self.apply(effects);
                }
            }
            QueueMessage::Flush => self.flush(),
            QueueMessage::Close => self.begin_close(),
        }
    }

    fn register_root(
        &mut self,
        node_id: NodeId,
        inputs: Inputs,
        config: NodeExecutionConfig,
        reply: RootReply,
    ) {
        if self.closing {
            let _ = reply.send(Err(ExecutionError::ExecutorClosed));
            return;
        }
        let request_id = RequestId::root(&self.instance_id, &config.execution_id);
        let rejection = if self.seen_requests.contains(&request_id) {
            Some(NodeError::DuplicateRequest {
                request_id: request_id.to_string(),
            })
        } else if !self.registry.contains(&node_id) {
            Some(NodeError::UnknownNode {
                node_id: node_id.to_string(),
            })
        } else {
            None
        };
        if let Some(error) = rejection {
            RootRequestRejected {
                request_id: request_id.as_str(),
                error: &error,
            }
            .log();
            let _ = reply.send(Err(ExecutionError::Node(error)));
            return;
        }

        let disabled: HashSet<DependantChain> = self
            .disabled_chains
            .iter()
            .chain(config.disabled_dependant_chains.iter())
            .cloned()
            .collect();
        self.create_dependency_nodes(&node_id, DependantChain::start(), &disabled);

        RootRequestRegistered {
            request_id: request_id.as_str(),
            node_id: node_id.as_str(),
        }
        .log();
        self.seen_requests.insert(request_id.clone());
        self.root_requests.insert(
            request_id.clone(),
            RootRequest {
                node_id,
                inputs,
                disabled_chains: config.disabled_dependant_chains,
                reply: Some(reply),
            },
        );
        self.unflushed.push(request_id);
    }

    /// Materialises every node reachable from `node_id` along enabled chains and records the
    /// chains each node is reached through.
    fn create_dependency_nodes(
        &mut self,
        node_id: &NodeId,
        chain: DependantChain,
        disabled: &HashSet<DependantChain>,
    ) {
        if disabled.contains(&chain) {
            return;
        }
        let Some(definition) = self.registry.get(node_id).cloned() else {
            return;
        };
        self.nodes
            .entry(node_id.clone())
            .or_insert_with(|| Node::new(definition.clone()));
        for (name, dependency) in definition.dependencies() {
            self.create_dependency_nodes(&dependency.node_id, chain.extend(node_id, name), disabled);
        }
        self.chains_per_node
            .entry(node_id.clone())
            .or_default()
            .insert(chain);
    }

    fn flush(&mut self) {
        let pending = std::mem::take(&mut self.unflushed);
        let mut effects = Vec::new();
        let mut batches: BTreeMap<NodeId, Vec<NodeCommand>> = BTreeMap::new();
        let mut root_nodes: Vec<NodeId> = Vec::new();
        let mut dispatched = 0;

        for request_id in &pending {
            let Some(root) = self.root_requests.get(request_id) else {
                continue;
            };
            if !root_nodes.contains(&root.node_id) {
                root_nodes.push(root.node_id.clone());
            }
            if root.reply.is_none() {
                continue;
            }
            let Some(definition) = self.registry.get(&root.node_id) else {
                continue;
            };
            let command = NodeCommand::ExecuteWithInputs {
                node_id: root.node_id.clone(),
                request_id: request_id.clone(),
                input_names: definition.direct_input_names(),
                values: root.inputs.clone(),
                dependant_chain: DependantChain::start(),
                reply_to: Some(Waiter::Root(request_id.clone())),
            };
            dispatched += 1;
            match self.dispatch {
                DispatchStrategy::Granular => effects.push(Effect::Execute(command)),
                DispatchStrategy::Batch => batches.entry(root.node_id.clone()).or_default().push(command),
            }
        }
        for (node_id, commands) in batches {
            effects.push(Effect::Execute(NodeCommand::InputBatch { node_id, commands }));
        }
        for node_id in &root_nodes {
            effects.push(Effect::Execute(NodeCommand::Flush {
                node_id: node_id.clone(),
                dependant_chain: DependantChain::start(),
            }));
        }

        ExecutorFlushed {
            instance_id: &self.instance_id,
            dispatched_requests: dispatched,
            flushed_nodes: root_nodes.len(),
        }
        .log();
        self.apply(effects);
    }

    fn begin_close(&mut self) {
        if !self.closing {
            self.closing = true;
            ExecutorClosing {
                instance_id: &self.instance_id,
                outstanding_requests: self
                    .root_requests
                    .values()
                    .filter(|root| root.reply.is_some())
                    .count(),
            }
            .log();
        }
        if !self.unflushed.is_empty() {
            self.flush();
        }
    }

    fn process(&mut self, command: NodeCommand) {
        let command = match command {
            NodeCommand::InputBatch { node_id, commands } => {
                self.metrics.input_batch();
                let accepted: Vec<NodeCommand> = commands
                    .into_iter()
                    .filter_map(|command| self.admit(command))
                    .collect();
                if accepted.is_empty() {
                    return;
                }
                NodeCommand::InputBatch {
                    node_id,
                    commands: accepted,
                }
            }
            command => match self.admit(command) {
                Some(command) => command,
                None => return,
            },
        };
        let node_id = command.node_id().clone();
        if let Some(effects) = self.with_node(&node_id, |node, env| node.handle(command, env)) {
            self.apply(effects);
        }
    }

    /// Validates `command`; a rejected command fails its waiter, if any.
    fn admit(&mut self, mut command: NodeCommand) -> Option<NodeCommand> {
        let error = match self.validate(&command) {
            Ok(()) => return Some(command),
            Err(error) => error,
        };
        CommandRejected {
            node_id: command.node_id().as_str(),
            command: command.name(),
            error: &error,
        }
        .log();
        if let Some(waiter) = command.take_reply_to() {
            self.notify(waiter, Err(error));
        }
        None
    }

    fn validate(&self, command: &NodeCommand) -> Result<(), NodeError> {
        let disabled = |chain: &DependantChain| NodeError::DisabledDependantChain {
            chain: chain.to_string(),
        };
        match (command, command.dependant_chain()) {
            (NodeCommand::Flush { .. }, Some(chain)) => {
                let disabled_everywhere = !self.root_requests.is_empty()
                    && self
                        .root_requests
                        .values()
                        .all(|root| root.disabled_chains.contains(chain));
                if disabled_everywhere || self.disabled_chains.contains(chain) {
                    return Err(disabled(chain));
                }
            }
            (_, Some(chain)) => {
                let disabled_for_request = command
                    .request_id()
                    .and_then(|request_id| self.root_requests.get(&request_id.originated_from()))
                    .map_or(false, |root| root.disabled_chains.contains(chain));
                if disabled_for_request || self.disabled_chains.contains(chain) {
                    return Err(disabled(chain));
                }
            }
            (_, None) => {}
        }
        if !self.nodes.contains_key(command.node_id()) {
            return Err(NodeError::UnknownNode {
                node_id: command.node_id().to_string(),
            });
        }
        Ok(())
    }

    fn with_node<R>(
        &mut self,
        node_id: &NodeId,
        f: impl FnOnce(&mut Node, &mut NodeEnv<'_>) -> R,
    ) -> Option<R> {
        let node = self.nodes.get_mut(node_id)?;
        let mut env = NodeEnv {
            registry: &self.registry,
            decorators: &mut self.decorators,
            active_chains: self.chains_per_node.get(node_id).unwrap_or(&self.no_chains),
            metrics: &self.metrics,
        };
        Some(f(node, &mut env))
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        let mut inline = Vec::new();
        for effect in effects {
            match effect {
                Effect::Execute(command) => match self.command_order {
                    CommandOrder::Breadth => self.enqueue(command),
                    CommandOrder::Depth => {
                        self.metrics.queue_bypassed();
                        inline.push(command);
                    }
                },
                Effect::Enqueue(command) => self.enqueue(command),
                Effect::Notify(waiter, outcome) => self.notify(waiter, outcome),
                Effect::Spawn {
                    node_id,
                    key,
                    execution,
                } => self.spawn(node_id, key, execution),
            }
        }
        self.inline.extend(inline.into_iter().rev());
    }

    fn enqueue(&mut self, command: NodeCommand) {
        if self.sender.send(QueueMessage::Command(command)).is_ok() {
            self.in_flight += 1;
        }
    }

    fn spawn(&mut self, node_id: NodeId, key: Inputs, execution: LogicFuture) {
        self.in_flight += 1;
        let sender = self.sender.clone();
        self.runtime.get().handle().spawn(async move {
            let result = execution.await;
            let _ = sender.send(QueueMessage::LogicCompleted {
                node_id,
                key,
                result,
            });
        });
    }

    fn notify(&mut self, waiter: Waiter, outcome: RequestOutcome) {
        match waiter {
            Waiter::Root(request_id) => self.settle_root(&request_id, outcome),
            Waiter::Dependant {
                node_id,
                request_id,
                dependency_name,
                index,
            } => {
                let effects = self.with_node(&node_id, |node, env| {
                    node.on_sub_response(&request_id, &dependency_name, index, outcome, env)
                });
                if let Some(effects) = effects {
                    self.apply(effects);
                }
            }
        }
    }

    fn settle_root(&mut self, request_id: &RequestId, outcome: RequestOutcome) {
        let Some(reply) = self
            .root_requests
            .get_mut(request_id)
            .and_then(|root| root.reply.take())
        else {
            return;
        };
        let result = match outcome {
            Ok(response) => match response.value {
                ValueOrError::Value(value) => Ok(value),
                ValueOrError::Error(error) => Err(ExecutionError::Node(error)),
                ValueOrError::Absent => Ok(Value::Null),
            },
            Err(error) => Err(ExecutionError::Node(error)),
        };
        let _ = reply.send(result);
    }

    /// Once every registered root request has settled and no command or logic execution is
    /// in flight, releases the state of the finished cycle and completes a pending close.
    fn check_settled(&mut self) {
        let outstanding = self.root_requests.values().any(|root| root.reply.is_some());
        if outstanding || !self.unflushed.is_empty() || self.in_flight > 0 || !self.inline.is_empty() {
            return;
        }
        if !self.root_requests.is_empty() {
            self.root_requests.clear();
            self.chains_per_node.clear();
            for node in self.nodes.values_mut() {
                node.release_settled();
            }
        }
        if self.closing {
            self.finish_close();
        }
    }

    fn finish_close(&mut self) {
        if self.terminated.is_cancelled() {
            return;
        }
        let session_decorators = self
            .nodes
            .values()
            .flat_map(|node| node.definition().logic().session_decorators().iter().cloned())
            .collect::<Vec<_>>();
        let mut completed: Vec<Arc<dyn LogicDecorator>> = Vec::new();
        for decorator in self
            .decorators
            .request_scoped_instances()
            .cloned()
            .chain(session_decorators)
        {
            if completed.iter().any(|seen| Arc::ptr_eq(seen, &decorator)) {
                continue;
            }
            decorator.on_complete();
            completed.push(decorator);
        }

        self.runtime.release();
        ExecutorClosed {
            instance_id: &self.instance_id,
            total_requests: self.seen_requests.len(),
            commands_queued: self.metrics.snapshot().commands_queued,
        }
        .log();
        self.terminated.cancel();
    }
}
