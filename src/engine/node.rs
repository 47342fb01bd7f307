// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-node request state machine.
//!
//! A [`Node`] is only ever touched by the command loop. Handling a command mutates the node's
//! bookkeeping and returns [`Effect`]s (commands for other nodes, notifications for waiters,
//! logic executions to spawn) which the loop applies according to its ordering policy.
//!
//! A request moves through these phases:
//! 1. registration on its dependant chain (first command that carries a chain)
//! 2. collection of direct inputs and dependency results
//! 3. resolver rounds, each dispatching sub-requests to one dependency
//! 4. main logic, once every declared input name is available, deduplicated by a
//!    per-node cache keyed on the direct inputs
//!
//! A skip (or a protocol error) short-circuits the request: every pending resolver is forced
//! to skip its dependency so the whole sub-graph terminates.

use futures::future::{self, FutureExt};
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::commands::{NodeCommand, Waiter};
use super::metrics::ExecutorMetrics;
use crate::data::{Facets, Inputs, NodeResponse, RequestOutcome, Results, ValueOrError};
use crate::decoration::{DecoratorCommand, DecoratorRegistry};
use crate::errors::NodeError;
use crate::graph::{
    DependantChain, LogicFuture, LogicId, LogicKind, NodeDefinition, NodeDefinitionRegistry,
    NodeId, RequestId, ResolverCommand, ResolverDefinition,
};
use crate::observability::messages::node::{
    DecoratorsFlushed, DependencySkipped, DuplicateDataReceived, LogicPanicked, MainLogicInvoked,
    RequestSkipped, ResolverExecuted,
};
use crate::observability::messages::StructuredLog;

const NO_INPUTS_REASON: &str = "resolver produced no inputs";

pub(crate) enum Effect {
    /// Run through the executor's ordering policy.
    Execute(NodeCommand),
    /// Always re-enter through the queue.
    Enqueue(NodeCommand),
    Notify(Waiter, RequestOutcome),
    /// Drive a logic execution off the queue; its result comes back keyed by `key`.
    Spawn {
        node_id: NodeId,
        key: Inputs,
        execution: LogicFuture,
    },
}

/// Executor-owned state a node reads or updates while handling a command.
pub(crate) struct NodeEnv<'a> {
    pub(crate) registry: &'a NodeDefinitionRegistry,
    pub(crate) decorators: &'a mut DecoratorRegistry,
    /// Chains currently registered for this node.
    pub(crate) active_chains: &'a BTreeSet<DependantChain>,
    pub(crate) metrics: &'a ExecutorMetrics,
}

struct SubRequest {
    request_id: RequestId,
    inputs: Inputs,
    tracked: bool,
    outcome: Option<RequestOutcome>,
}

/// One request's interaction with one dependency.
#[derive(Default)]
struct DependencyExecution {
    /// Number of sub-requests issued so far; indices are dense in `0..counter`.
    counter: usize,
    resolved: usize,
    calls: BTreeMap<usize, SubRequest>,
    skipped: bool,
    /// All resolvers of the dependency ran; results can be delivered once every call settles.
    armed: bool,
    delivered: bool,
}

struct RequestState {
    chain: DependantChain,
    inputs: BTreeMap<String, ValueOrError>,
    dependency_values: BTreeMap<String, Results>,
    executed_resolvers: BTreeSet<LogicId>,
    dependencies: BTreeMap<String, DependencyExecution>,
    skip_reason: Option<String>,
    main_logic_executed: bool,
    outcome: Option<RequestOutcome>,
    waiters: Vec<Waiter>,
}

impl RequestState {
    fn new(chain: DependantChain) -> Self {
        Self {
            chain,
            inputs: BTreeMap::new(),
            dependency_values: BTreeMap::new(),
            executed_resolvers: BTreeSet::new(),
            dependencies: BTreeMap::new(),
            skip_reason: None,
            main_logic_executed: false,
            outcome: None,
            waiters: Vec::new(),
        }
    }

    fn available_names(&self) -> BTreeSet<String> {
        self.inputs
            .keys()
            .chain(self.dependency_values.keys())
            .cloned()
            .collect()
    }

    fn facets(&self) -> Facets {
        Facets::new(
            Inputs::new(self.inputs.clone()),
            self.dependency_values.clone(),
        )
    }

    /// Terminal for flush purposes: logic was invoked, or the request was skipped or failed.
    fn is_terminal(&self) -> bool {
        self.main_logic_executed || self.skip_reason.is_some()
    }
}

#[derive(Default)]
struct ChainState {
    requests: BTreeSet<RequestId>,
    flush_requested: bool,
    decorators_flushed: bool,
    flushed_dependencies: BTreeSet<String>,
}

enum CacheEntry {
    Pending(Vec<RequestId>),
    Done(ValueOrError),
}

pub(crate) struct Node {
    definition: Arc<NodeDefinition>,
    requests: HashMap<RequestId, RequestState>,
    results_cache: HashMap<Inputs, CacheEntry>,
    chains: HashMap<DependantChain, ChainState>,
}

impl Node {
    pub(crate) fn new(definition: Arc<NodeDefinition>) -> Self {
        Self {
            definition,
            requests: HashMap::new(),
            results_cache: HashMap::new(),
            chains: HashMap::new(),
        }
    }

    pub(crate) fn definition(&self) -> &Arc<NodeDefinition> {
        &self.definition
    }

    /// Drops settled requests, the chains left without requests and completed cache entries.
    /// Only called once nothing is in flight, so a pending cache entry survives only if its
    /// logic never reported back.
    pub(crate) fn release_settled(&mut self) {
        self.requests.retain(|_, state| state.outcome.is_none());
        let live = &self.requests;
        self.chains.retain(|_, chain| chain.requests.iter().any(|id| live.contains_key(id)));
        self.results_cache
            .retain(|_, entry| matches!(entry, CacheEntry::Pending(_)));
    }

    #[cfg(test)]
    fn retained(&self) -> (usize, usize, usize) {
        (self.requests.len(), self.chains.len(), self.results_cache.len())
    }

    pub(crate) fn handle(&mut self, command: NodeCommand, env: &mut NodeEnv<'_>) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.dispatch(command, env, &mut effects);
        effects
    }

    /// Records the outcome of sub-request `index` and delivers the dependency once all settled.
    pub(crate) fn on_sub_response(
        &mut self,
        request_id: &RequestId,
        dependency: &str,
        index: usize,
        outcome: RequestOutcome,
        env: &mut NodeEnv<'_>,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        let call = self
            .requests
            .get_mut(request_id)
            .and_then(|state| state.dependencies.get_mut(dependency))
            .and_then(|execution| execution.calls.get_mut(&index));
        if let Some(call) = call {
            if call.outcome.is_none() {
                call.outcome = Some(outcome);
            }
        }
        self.deliver_if_ready(request_id, dependency, env, &mut effects);
        effects
    }

    /// Completes a spawned logic execution and every request attached to its cache entry.
    pub(crate) fn complete_logic(&mut self, key: Inputs, result: Result<Value, NodeError>) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.settle_cache_entry(&key, result, &mut effects);
        effects
    }

    fn dispatch(&mut self, command: NodeCommand, env: &mut NodeEnv<'_>, effects: &mut Vec<Effect>) {
        match command {
            NodeCommand::ExecuteWithInputs {
                request_id,
                input_names,
                values,
                dependant_chain,
                reply_to,
                ..
            } => {
                if self.register(&request_id, &dependant_chain, reply_to, effects) {
                    self.receive_inputs(&request_id, &input_names, &values, env, effects);
                }
            }
            NodeCommand::ExecuteWithDependency {
                request_id,
                dependency_name,
                results,
                ..
            } => self.receive_dependency(&request_id, dependency_name, results, env, effects),
            NodeCommand::SkipNode {
                request_id,
                dependant_chain,
                reason,
                reply_to,
                ..
            } => {
                if self.register(&request_id, &dependant_chain, reply_to, effects) {
                    RequestSkipped {
                        node_id: self.definition.node_id().as_str(),
                        request_id: request_id.as_str(),
                        reason: &reason,
                    }
                    .log();
                    let error = NodeError::skipped(reason.clone());
                    self.terminate(&request_id, reason, error, env, effects);
                }
            }
            NodeCommand::Flush {
                dependant_chain, ..
            } => self.flush(&dependant_chain, env, effects),
            NodeCommand::InputBatch { commands, .. } => {
                for command in commands {
                    self.dispatch(command, env, effects);
                }
            }
        }
    }

    /// Registers `request_id` on `chain` if it is new and attaches `reply_to`.
    /// Returns whether the request is still open.
    fn register(
        &mut self,
        request_id: &RequestId,
        chain: &DependantChain,
        reply_to: Option<Waiter>,
        effects: &mut Vec<Effect>,
    ) -> bool {
        let state = match self.requests.entry(request_id.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let chain_state = self.chains.entry(chain.clone()).or_default();
                chain_state.requests.insert(request_id.clone());
                chain_state.decorators_flushed = false;
                chain_state.flushed_dependencies.clear();
                entry.insert(RequestState::new(chain.clone()))
            }
        };
        if let Some(waiter) = reply_to {
            match &state.outcome {
                Some(outcome) => effects.push(Effect::Notify(waiter, outcome.clone())),
                None => state.waiters.push(waiter),
            }
        }
        state.outcome.is_none()
    }

    fn receive_inputs(
        &mut self,
        request_id: &RequestId,
        input_names: &BTreeSet<String>,
        values: &Inputs,
        env: &mut NodeEnv<'_>,
        effects: &mut Vec<Effect>,
    ) {
        let Some(state) = self.requests.get_mut(request_id) else {
            return;
        };
        if let Some(name) = input_names.iter().find(|name| state.inputs.contains_key(*name)) {
            let error = self.duplicate_data(request_id, name);
            self.fail(request_id, error, env, effects);
            return;
        }
        for name in input_names {
            state.inputs.insert(name.clone(), values.get_or_absent(name));
        }
        self.advance(request_id, env, effects);
    }

    fn receive_dependency(
        &mut self,
        request_id: &RequestId,
        dependency: String,
        results: Results,
        env: &mut NodeEnv<'_>,
        effects: &mut Vec<Effect>,
    ) {
        let state = self
            .requests
            .entry(request_id.clone())
            .or_insert_with(|| RequestState::new(DependantChain::start()));
        if state.outcome.is_some() {
            return;
        }
        if state.dependency_values.contains_key(&dependency) {
            let error = self.duplicate_data(request_id, &dependency);
            self.fail(request_id, error, env, effects);
            return;
        }
        state.dependency_values.insert(dependency, results);
        self.advance(request_id, env, effects);
    }

    fn duplicate_data(&self, request_id: &RequestId, name: &str) -> NodeError {
        DuplicateDataReceived {
            node_id: self.definition.node_id().as_str(),
            request_id: request_id.as_str(),
            name,
        }
        .log();
        NodeError::DuplicateData {
            node_id: self.definition.node_id().to_string(),
            request_id: request_id.to_string(),
            name: name.to_string(),
        }
    }

    fn advance(&mut self, request_id: &RequestId, env: &mut NodeEnv<'_>, effects: &mut Vec<Effect>) {
        self.trigger_unresolved_dependencies(request_id, env, effects);
        self.run_pending_resolvers(request_id, env, effects);
        self.execute_main_logic_if_ready(request_id, env, effects);
    }

    /// Dependencies without resolvers get a single sub-request with no inputs, once.
    fn trigger_unresolved_dependencies(
        &mut self,
        request_id: &RequestId,
        env: &mut NodeEnv<'_>,
        effects: &mut Vec<Effect>,
    ) {
        let definition = self.definition.clone();
        for dependency in definition.dependencies().keys() {
            if definition.resolvers_for(dependency).next().is_some() {
                continue;
            }
            let Some(state) = self.requests.get_mut(request_id) else {
                return;
            };
            if state.dependencies.contains_key(dependency) {
                continue;
            }
            let skip_reason = state.skip_reason.clone();
            state.dependencies.insert(dependency.clone(), DependencyExecution::default());
            match skip_reason {
                Some(reason) => self.skip_dependency(request_id, dependency, &reason, effects),
                None => self.provide(request_id, dependency, vec![Inputs::empty()], effects),
            };
            self.arm_if_complete(request_id, dependency, env, effects);
        }
    }

    /// Runs every resolver whose bindings are available. A request being skipped forces all of
    /// its remaining resolvers regardless of bindings.
    fn run_pending_resolvers(
        &mut self,
        request_id: &RequestId,
        env: &mut NodeEnv<'_>,
        effects: &mut Vec<Effect>,
    ) {
        let definition = self.definition.clone();
        let Some(state) = self.requests.get(request_id) else {
            return;
        };
        let available = state.available_names();
        let forced = state.skip_reason.is_some();
        let pending: Vec<&ResolverDefinition> = definition
            .resolvers()
            .iter()
            .filter(|resolver| !state.executed_resolvers.contains(resolver.resolver_id()))
            .filter(|resolver| forced || resolver.bound_from().is_subset(&available))
            .collect();

        for resolver in pending {
            self.execute_resolver(request_id, resolver, env, effects);
        }
    }

    fn execute_resolver(
        &mut self,
        request_id: &RequestId,
        resolver: &ResolverDefinition,
        env: &mut NodeEnv<'_>,
        effects: &mut Vec<Effect>,
    ) {
        let dependency = resolver.dependency_name();
        let Some(state) = self.requests.get_mut(request_id) else {
            return;
        };
        state.executed_resolvers.insert(resolver.resolver_id().clone());
        let command = match &state.skip_reason {
            Some(reason) => ResolverCommand::skip(reason.clone()),
            None => {
                let facets = state.facets();
                panic::catch_unwind(AssertUnwindSafe(|| resolver.resolve(&facets))).unwrap_or_else(
                    |_| ResolverCommand::skip(format!("resolver '{}' panicked", resolver.resolver_id())),
                )
            }
        };
        state
            .dependencies
            .entry(dependency.to_string())
            .or_default()
            .resolved += 1;

        let sub_requests = match command {
            ResolverCommand::Skip { reason } => {
                self.skip_dependency(request_id, dependency, &reason, effects)
            }
            ResolverCommand::Provide(inputs) => self.provide(request_id, dependency, inputs, effects),
        };
        ResolverExecuted {
            node_id: self.definition.node_id().as_str(),
            request_id: request_id.as_str(),
            resolver_id: resolver.resolver_id().as_str(),
            dependency,
            sub_requests,
        }
        .log();
        self.arm_if_complete(request_id, dependency, env, effects);
    }

    /// Skips every sub-request of `dependency` issued so far, plus `[0]`.
    fn skip_dependency(
        &mut self,
        request_id: &RequestId,
        dependency: &str,
        reason: &str,
        effects: &mut Vec<Effect>,
    ) -> usize {
        let node_id = self.definition.node_id().clone();
        let Some(dependency_node) = self.definition.dependency(dependency).map(|d| d.node_id.clone()) else {
            return 0;
        };
        let Some(state) = self.requests.get_mut(request_id) else {
            return 0;
        };
        if state.dependency_values.contains_key(dependency) {
            return 0;
        }
        let chain = state.chain.extend(&node_id, dependency);
        let execution = state.dependencies.entry(dependency.to_string()).or_default();
        if execution.skipped {
            return 0;
        }
        execution.skipped = true;
        execution.calls.entry(0).or_insert_with(|| SubRequest {
            request_id: request_id.append_indexed(dependency, 0),
            inputs: Inputs::empty(),
            tracked: false,
            outcome: None,
        });
        execution.counter = execution.counter.max(1);

        for (index, call) in execution.calls.iter_mut() {
            let reply_to = (!call.tracked).then(|| Waiter::Dependant {
                node_id: node_id.clone(),
                request_id: request_id.clone(),
                dependency_name: dependency.to_string(),
                index: *index,
            });
            call.tracked = true;
            effects.push(Effect::Execute(NodeCommand::SkipNode {
                node_id: dependency_node.clone(),
                request_id: call.request_id.clone(),
                dependant_chain: chain.clone(),
                reason: reason.to_string(),
                reply_to,
            }));
        }

        DependencySkipped {
            node_id: node_id.as_str(),
            request_id: request_id.as_str(),
            dependency,
            reason,
        }
        .log();
        execution.calls.len()
    }

    /// One fan-out round. With `m` sub-requests already in flight and `l` new input sets, issues
    /// `l * max(m, 1)` commands: the first set refines the existing sub-requests, every further
    /// set starts `m` new ones merging the refined inputs of their counterparts.
    fn provide(
        &mut self,
        request_id: &RequestId,
        dependency: &str,
        fan_out: Vec<Inputs>,
        effects: &mut Vec<Effect>,
    ) -> usize {
        let node_id = self.definition.node_id().clone();
        let Some(dependency_node) = self.definition.dependency(dependency).map(|d| d.node_id.clone()) else {
            return 0;
        };
        let Some(state) = self.requests.get_mut(request_id) else {
            return 0;
        };
        let chain = state.chain.extend(&node_id, dependency);
        let execution = state.dependencies.entry(dependency.to_string()).or_default();
        if execution.skipped {
            return 0;
        }
        if fan_out.is_empty() {
            if execution.calls.is_empty() {
                return 0;
            }
            return self.skip_dependency(request_id, dependency, NO_INPUTS_REASON, effects);
        }

        let in_progress = execution.counter;
        let batch = in_progress.max(1);
        let previous: Vec<Inputs> = (0..in_progress)
            .map(|i| {
                execution
                    .calls
                    .get(&i)
                    .map(|call| call.inputs.clone())
                    .unwrap_or_else(Inputs::empty)
            })
            .collect();

        let mut dispatched = 0;
        for (j, inputs) in fan_out.iter().enumerate() {
            for i in 0..batch {
                let index = j * batch + i;
                let merged = match previous.get(i) {
                    Some(earlier) => Inputs::union(earlier, inputs),
                    None => inputs.clone(),
                };
                let sub_request_id = request_id.append_indexed(dependency, index);
                let (values, reply_to) = if index < in_progress {
                    (inputs.clone(), None)
                } else {
                    let waiter = Waiter::Dependant {
                        node_id: node_id.clone(),
                        request_id: request_id.clone(),
                        dependency_name: dependency.to_string(),
                        index,
                    };
                    (merged.clone(), Some(waiter))
                };

                let call = execution.calls.entry(index).or_insert_with(|| SubRequest {
                    request_id: sub_request_id.clone(),
                    inputs: Inputs::empty(),
                    tracked: false,
                    outcome: None,
                });
                call.inputs = merged;
                call.tracked |= reply_to.is_some();
                execution.counter = execution.counter.max(index + 1);

                effects.push(Effect::Execute(NodeCommand::ExecuteWithInputs {
                    node_id: dependency_node.clone(),
                    request_id: sub_request_id,
                    input_names: values.names(),
                    values,
                    dependant_chain: chain.clone(),
                    reply_to,
                }));
                dispatched += 1;
            }
        }
        dispatched
    }

    fn arm_if_complete(
        &mut self,
        request_id: &RequestId,
        dependency: &str,
        env: &mut NodeEnv<'_>,
        effects: &mut Vec<Effect>,
    ) {
        let total = self.definition.resolvers_for(dependency).count();
        let Some(state) = self.requests.get_mut(request_id) else {
            return;
        };
        let chain = state.chain.clone();
        let Some(execution) = state.dependencies.get_mut(dependency) else {
            return;
        };
        if execution.armed || execution.resolved < total {
            return;
        }
        execution.armed = true;
        self.deliver_if_ready(request_id, dependency, env, effects);
        self.flush_dependency_if_needed(dependency, &chain, effects);
    }

    /// Aggregates the sub-request outcomes of `dependency` into one delivery. Any failed
    /// sub-request fails the whole dependency.
    fn deliver_if_ready(
        &mut self,
        request_id: &RequestId,
        dependency: &str,
        env: &mut NodeEnv<'_>,
        effects: &mut Vec<Effect>,
    ) {
        let dependency_kind = self
            .definition
            .dependency(dependency)
            .and_then(|d| env.registry.get(&d.node_id))
            .map(|d| d.logic().kind())
            .unwrap_or(LogicKind::Compute);
        let node_id = self.definition.node_id().clone();
        let Some(execution) = self
            .requests
            .get_mut(request_id)
            .and_then(|state| state.dependencies.get_mut(dependency))
        else {
            return;
        };
        if !execution.armed || execution.delivered {
            return;
        }
        let mut outcomes = Vec::with_capacity(execution.calls.len());
        for call in execution.calls.values() {
            match &call.outcome {
                Some(outcome) => outcomes.push(outcome),
                None => return,
            }
        }
        let failure = outcomes.iter().find_map(|outcome| match outcome {
            Err(error) => Some(error.clone()),
            Ok(_) => None,
        });
        let results = match failure {
            Some(error) => Results::failure(error),
            None => Results::new(
                outcomes
                    .iter()
                    .filter_map(|outcome| match outcome {
                        Ok(response) => Some((response.inputs.clone(), response.value.clone())),
                        Err(_) => None,
                    })
                    .collect(),
            ),
        };
        execution.delivered = true;

        let command = NodeCommand::ExecuteWithDependency {
            node_id,
            request_id: request_id.clone(),
            dependency_name: dependency.to_string(),
            results,
        };
        effects.push(match dependency_kind {
            LogicKind::Io => Effect::Enqueue(command),
            LogicKind::Compute => Effect::Execute(command),
        });
    }

    fn execute_main_logic_if_ready(
        &mut self,
        request_id: &RequestId,
        env: &mut NodeEnv<'_>,
        effects: &mut Vec<Effect>,
    ) {
        let definition = self.definition.clone();
        let Some(state) = self.requests.get_mut(request_id) else {
            return;
        };
        if state.main_logic_executed || state.skip_reason.is_some() || state.outcome.is_some() {
            return;
        }
        if !definition.logic().input_names().is_subset(&state.available_names()) {
            return;
        }
        state.main_logic_executed = true;
        let chain = state.chain.clone();
        let key = Inputs::new(state.inputs.clone());
        let facets = Facets::new(key.clone(), state.dependency_values.clone());

        let cached = self.results_cache.get_mut(&key).map(|entry| match entry {
            CacheEntry::Done(value) => Some(value.clone()),
            CacheEntry::Pending(waiting) => {
                waiting.push(request_id.clone());
                None
            }
        });
        match cached {
            Some(value) => {
                env.metrics.cache_hit();
                MainLogicInvoked {
                    node_id: definition.node_id().as_str(),
                    request_id: request_id.as_str(),
                    cache_hit: true,
                    decorator_count: 0,
                }
                .log();
                if let Some(value) = value {
                    self.settle(request_id, Ok(NodeResponse::new(key, value)), effects);
                }
            }
            None => self.invoke_logic(request_id, key, facets, &chain, env, effects),
        }
        self.flush_decorators_if_needed(&chain, env);
    }

    fn invoke_logic(
        &mut self,
        request_id: &RequestId,
        key: Inputs,
        facets: Facets,
        chain: &DependantChain,
        env: &mut NodeEnv<'_>,
        effects: &mut Vec<Effect>,
    ) {
        let definition = self.definition.clone();
        let node_id = definition.node_id().clone();
        let decorators = env.decorators.resolve(&definition, chain, env.active_chains);
        let logic = decorators
            .iter()
            .fold(definition.bare_logic(), |logic, decorator| {
                decorator.decorate(logic, definition.logic())
            });

        env.metrics.main_logic_invoked();
        MainLogicInvoked {
            node_id: node_id.as_str(),
            request_id: request_id.as_str(),
            cache_hit: false,
            decorator_count: decorators.len(),
        }
        .log();

        self.results_cache
            .insert(key.clone(), CacheEntry::Pending(vec![request_id.clone()]));
        let mut execution = guard_panics(&node_id, || logic(facets));
        if definition.logic().kind() == LogicKind::Compute {
            if let Some(result) = (&mut execution).now_or_never() {
                self.settle_cache_entry(&key, result, effects);
                return;
            }
        }
        effects.push(Effect::Spawn {
            node_id,
            key,
            execution,
        });
    }

    fn settle_cache_entry(&mut self, key: &Inputs, result: Result<Value, NodeError>, effects: &mut Vec<Effect>) {
        let value = ValueOrError::from_result(result);
        let waiting = match self
            .results_cache
            .insert(key.clone(), CacheEntry::Done(value.clone()))
        {
            Some(CacheEntry::Pending(waiting)) => waiting,
            _ => Vec::new(),
        };
        for request_id in waiting {
            let response = NodeResponse::new(key.clone(), value.clone());
            self.settle(&request_id, Ok(response), effects);
        }
    }

    fn settle(&mut self, request_id: &RequestId, outcome: RequestOutcome, effects: &mut Vec<Effect>) {
        let Some(state) = self.requests.get_mut(request_id) else {
            return;
        };
        if state.outcome.is_some() {
            return;
        }
        for waiter in state.waiters.drain(..) {
            effects.push(Effect::Notify(waiter, outcome.clone()));
        }
        state.outcome = Some(outcome);
    }

    fn fail(&mut self, request_id: &RequestId, error: NodeError, env: &mut NodeEnv<'_>, effects: &mut Vec<Effect>) {
        self.terminate(request_id, error.to_string(), error, env, effects);
    }

    /// Settles the request with `error` and skips every dependency it has not resolved yet.
    fn terminate(
        &mut self,
        request_id: &RequestId,
        reason: String,
        error: NodeError,
        env: &mut NodeEnv<'_>,
        effects: &mut Vec<Effect>,
    ) {
        let Some(state) = self.requests.get_mut(request_id) else {
            return;
        };
        if state.skip_reason.is_some() {
            return;
        }
        state.skip_reason = Some(reason);
        let chain = state.chain.clone();

        self.trigger_unresolved_dependencies(request_id, env, effects);
        self.run_pending_resolvers(request_id, env, effects);
        self.settle(request_id, Err(error), effects);
        self.flush_decorators_if_needed(&chain, env);
    }

    fn flush(&mut self, chain: &DependantChain, env: &mut NodeEnv<'_>, effects: &mut Vec<Effect>) {
        self.chains.entry(chain.clone()).or_default().flush_requested = true;
        let definition = self.definition.clone();
        for dependency in definition.dependencies().keys() {
            self.flush_dependency_if_needed(dependency, chain, effects);
        }
        self.flush_decorators_if_needed(chain, env);
    }

    /// Propagates a flush of `chain` to `dependency` once every request on the chain has run
    /// all of that dependency's resolvers.
    fn flush_dependency_if_needed(&mut self, dependency: &str, chain: &DependantChain, effects: &mut Vec<Effect>) {
        let Some(chain_state) = self.chains.get(chain) else {
            return;
        };
        if !chain_state.flush_requested || chain_state.flushed_dependencies.contains(dependency) {
            return;
        }
        let all_armed = chain_state.requests.iter().all(|request_id| {
            self.requests
                .get(request_id)
                .and_then(|state| state.dependencies.get(dependency))
                .map_or(false, |execution| execution.armed)
        });
        if !all_armed {
            return;
        }
        let Some(dependency_node) = self.definition.dependency(dependency).map(|d| d.node_id.clone()) else {
            return;
        };
        if let Some(chain_state) = self.chains.get_mut(chain) {
            chain_state.flushed_dependencies.insert(dependency.to_string());
        }
        effects.push(Effect::Execute(NodeCommand::Flush {
            node_id: dependency_node,
            dependant_chain: chain.extend(self.definition.node_id(), dependency),
        }));
    }

    /// Flushes decorators for `chain`, in reverse application order, once a flush was requested
    /// and every request on the chain is terminal.
    fn flush_decorators_if_needed(&mut self, chain: &DependantChain, env: &mut NodeEnv<'_>) {
        let Some(chain_state) = self.chains.get(chain) else {
            return;
        };
        if !chain_state.flush_requested || chain_state.decorators_flushed {
            return;
        }
        let all_terminal = chain_state.requests.iter().all(|request_id| {
            self.requests
                .get(request_id)
                .map_or(true, RequestState::is_terminal)
        });
        if !all_terminal {
            return;
        }
        if let Some(chain_state) = self.chains.get_mut(chain) {
            chain_state.decorators_flushed = true;
        }

        let decorators = env.decorators.resolve(&self.definition, chain, env.active_chains);
        let command = DecoratorCommand::Flush {
            chain: chain.clone(),
        };
        for decorator in decorators.iter().rev() {
            decorator.handle(&command);
        }
        DecoratorsFlushed {
            node_id: self.definition.node_id().as_str(),
            dependant_chain: chain.as_str(),
            decorator_count: decorators.len(),
        }
        .log();
    }
}

fn panicked(node_id: &NodeId) -> NodeError {
    LogicPanicked {
        node_id: node_id.as_str(),
    }
    .log();
    NodeError::LogicPanicked {
        node_id: node_id.to_string(),
    }
}

/// Contains panics raised while building or polling the logic future.
fn guard_panics<F>(node_id: &NodeId, call: F) -> LogicFuture
where
    F: FnOnce() -> LogicFuture,
{
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(execution) => {
            let node_id = node_id.clone();
            AssertUnwindSafe(execution)
                .catch_unwind()
                .map(move |result| result.unwrap_or_else(|_| Err(panicked(&node_id))))
                .boxed()
        }
        Err(_) => future::ready(Err(panicked(node_id))).boxed(),
    }
}
