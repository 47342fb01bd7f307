// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Holds decorated logic invocations back and releases them together.
//!
//! Invocations are gated until either `max_batch_size` of them are pending or every
//! active chain this decorator applies to has been flushed. Both conditions release the
//! whole pending set at once.

use futures::future::FutureExt;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use super::{DecoratorCommand, DecoratorConfig, LogicDecorator};
use crate::data::Facets;
use crate::graph::{DependantChain, LogicDefinition, MainLogic};

pub const DECORATOR_TYPE: &str = "input_batching";

type ChainPredicate = Arc<dyn Fn(&DependantChain) -> bool + Send + Sync>;

#[derive(Default)]
struct BatchState {
    gates: Vec<oneshot::Sender<()>>,
    active_chains: BTreeSet<DependantChain>,
    flushed_chains: BTreeSet<DependantChain>,
    released_batches: Vec<usize>,
}

pub struct InputBatchingDecorator {
    instance_id: String,
    max_batch_size: usize,
    applies_to: ChainPredicate,
    state: Arc<Mutex<BatchState>>,
}

impl InputBatchingDecorator {
    pub fn new<P>(instance_id: impl Into<String>, max_batch_size: usize, applies_to: P) -> Self
    where
        P: Fn(&DependantChain) -> bool + Send + Sync + 'static,
    {
        Self {
            instance_id: instance_id.into(),
            max_batch_size: max_batch_size.max(1),
            applies_to: Arc::new(applies_to),
            state: Arc::new(Mutex::new(BatchState::default())),
        }
    }

    /// Request-scoped config with one batching instance per dependant chain.
    pub fn per_chain_config(max_batch_size: usize) -> DecoratorConfig {
        DecoratorConfig::per_dependant_chain(DECORATOR_TYPE, move |ctx| {
            let chain = ctx.execution.dependant_chain.clone();
            Arc::new(InputBatchingDecorator::new(
                ctx.instance_id.clone(),
                max_batch_size,
                move |c| c == &chain,
            )) as Arc<dyn LogicDecorator>
        })
    }

    /// Request-scoped config with one batching instance shared by `chains`.
    pub fn shared_config(
        instance_id: impl Into<String>,
        max_batch_size: usize,
        chains: BTreeSet<DependantChain>,
    ) -> DecoratorConfig {
        let applies: Arc<BTreeSet<DependantChain>> = Arc::new(chains.clone());
        DecoratorConfig::shared(DECORATOR_TYPE, instance_id, chains, move |ctx| {
            let applies = applies.clone();
            Arc::new(InputBatchingDecorator::new(
                ctx.instance_id.clone(),
                max_batch_size,
                move |c| applies.contains(c),
            )) as Arc<dyn LogicDecorator>
        })
    }

    /// Sizes of every batch released so far, in release order.
    pub fn released_batches(&self) -> Vec<usize> {
        self.state
            .lock()
            .map(|s| s.released_batches.clone())
            .unwrap_or_default()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().map(|s| s.gates.len()).unwrap_or(0)
    }

    fn release(state: &mut BatchState) {
        if state.gates.is_empty() {
            return;
        }
        state.released_batches.push(state.gates.len());
        for gate in state.gates.drain(..) {
            let _ = gate.send(());
        }
    }
}

impl LogicDecorator for InputBatchingDecorator {
    fn decorator_type(&self) -> &str {
        DECORATOR_TYPE
    }

    fn id(&self) -> &str {
        &self.instance_id
    }

    fn decorate(&self, logic: MainLogic, _definition: &LogicDefinition) -> MainLogic {
        let state = self.state.clone();
        let max_batch_size = self.max_batch_size;
        Arc::new(move |facets: Facets| {
            let (gate, released) = oneshot::channel();
            if let Ok(mut state) = state.lock() {
                state.gates.push(gate);
                if state.gates.len() >= max_batch_size {
                    Self::release(&mut state);
                }
            }
            let logic = logic.clone();
            async move {
                // A dropped gate means the decorator went away; run anyway.
                let _ = released.await;
                logic(facets).await
            }
            .boxed()
        })
    }

    fn handle(&self, command: &DecoratorCommand) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match command {
            DecoratorCommand::InitiateActiveChains { chains, .. } => {
                let applicable = chains.iter().filter(|c| (self.applies_to)(c)).cloned();
                state.active_chains.extend(applicable);
            }
            DecoratorCommand::Flush { chain } => {
                if !(self.applies_to)(chain) {
                    return;
                }
                state.flushed_chains.insert(chain.clone());
                if state.active_chains.is_subset(&state.flushed_chains) {
                    Self::release(&mut state);
                    state.flushed_chains.clear();
                }
            }
        }
    }

    fn on_complete(&self) {
        if let Ok(mut state) = self.state.lock() {
            Self::release(&mut state);
        }
    }
}
