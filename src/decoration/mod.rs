// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Decorators wrap node logic with cross-cutting behaviour.
//!
//! Two pools feed a node's decorator chain:
//! * session-scoped decorators attached to a [`LogicDefinition`], shared by every execution
//! * request-scoped [`DecoratorConfig`]s, instantiated lazily once per
//!   `(decorator type, instance id)` and registered with the chains they decorate
//!
//! The applicable decorators are sorted by a [`DecorationOrdering`] and applied in order, so
//! the last one wraps all the others. Flush is delivered in the reverse order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::graph::{DependantChain, LogicDefinition, MainLogic, NodeId};

pub mod batching;
pub mod exec_reporter;
mod registry;

pub use batching::InputBatchingDecorator;
pub use exec_reporter::{ExecutionReport, MainLogicExecReporter};
pub(crate) use registry::DecoratorRegistry;

/// Out-of-band lifecycle commands delivered to decorators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoratorCommand {
    /// Every request on `chain` reached a terminal state.
    Flush { chain: DependantChain },
    /// The chains currently registered for `node_id` in the owning executor.
    InitiateActiveChains {
        node_id: NodeId,
        chains: BTreeSet<DependantChain>,
    },
}

pub trait LogicDecorator: Send + Sync {
    /// Decorators of the same type replace each other; request scope wins over session scope.
    fn decorator_type(&self) -> &str;

    /// Stable id for bookkeeping and ordering ties.
    fn id(&self) -> &str;

    /// Wraps `logic`. Called once per main-logic execution.
    fn decorate(&self, logic: MainLogic, definition: &LogicDefinition) -> MainLogic;

    fn handle(&self, _command: &DecoratorCommand) {}

    /// Invoked once when the owning executor has fully closed.
    fn on_complete(&self) {}
}

/// What a request-scoped decorator config sees when deciding whether and how to decorate.
#[derive(Debug, Clone)]
pub struct LogicExecutionContext {
    pub node_id: NodeId,
    pub logic_tags: BTreeMap<String, String>,
    pub dependant_chain: DependantChain,
}

#[derive(Debug, Clone)]
pub struct DecoratorContext {
    pub instance_id: String,
    pub execution: LogicExecutionContext,
}

type ContextPredicate = Arc<dyn Fn(&LogicExecutionContext) -> bool + Send + Sync>;
type InstanceIdGenerator = Arc<dyn Fn(&LogicExecutionContext) -> String + Send + Sync>;
type DecoratorFactory = Arc<dyn Fn(&DecoratorContext) -> Arc<dyn LogicDecorator> + Send + Sync>;

/// Recipe for request-scoped decorator instances.
#[derive(Clone)]
pub struct DecoratorConfig {
    decorator_type: String,
    should_decorate: ContextPredicate,
    instance_id: InstanceIdGenerator,
    factory: DecoratorFactory,
}

impl DecoratorConfig {
    pub fn new<P, G, F>(decorator_type: impl Into<String>, should_decorate: P, instance_id: G, factory: F) -> Self
    where
        P: Fn(&LogicExecutionContext) -> bool + Send + Sync + 'static,
        G: Fn(&LogicExecutionContext) -> String + Send + Sync + 'static,
        F: Fn(&DecoratorContext) -> Arc<dyn LogicDecorator> + Send + Sync + 'static,
    {
        Self {
            decorator_type: decorator_type.into(),
            should_decorate: Arc::new(should_decorate),
            instance_id: Arc::new(instance_id),
            factory: Arc::new(factory),
        }
    }

    /// One decorator instance per dependant chain, keyed by the chain's rendering.
    pub fn per_dependant_chain<F>(decorator_type: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&DecoratorContext) -> Arc<dyn LogicDecorator> + Send + Sync + 'static,
    {
        Self::new(
            decorator_type,
            |_| true,
            |ctx| ctx.dependant_chain.to_string(),
            factory,
        )
    }

    /// A single instance, `instance_id`, shared by every chain in `chains`.
    pub fn shared<F>(
        decorator_type: impl Into<String>,
        instance_id: impl Into<String>,
        chains: BTreeSet<DependantChain>,
        factory: F,
    ) -> Self
    where
        F: Fn(&DecoratorContext) -> Arc<dyn LogicDecorator> + Send + Sync + 'static,
    {
        let instance_id = instance_id.into();
        Self::new(
            decorator_type,
            move |ctx| chains.contains(&ctx.dependant_chain),
            move |_| instance_id.clone(),
            factory,
        )
    }

    pub fn decorator_type(&self) -> &str {
        &self.decorator_type
    }

    pub(crate) fn should_decorate(&self, ctx: &LogicExecutionContext) -> bool {
        (self.should_decorate)(ctx)
    }

    pub(crate) fn instance_id(&self, ctx: &LogicExecutionContext) -> String {
        (self.instance_id)(ctx)
    }

    pub(crate) fn create(&self, ctx: &DecoratorContext) -> Arc<dyn LogicDecorator> {
        (self.factory)(ctx)
    }
}

impl fmt::Debug for DecoratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorConfig")
            .field("decorator_type", &self.decorator_type)
            .finish()
    }
}

type DecoratorComparator = Arc<dyn Fn(&dyn LogicDecorator, &dyn LogicDecorator) -> Ordering + Send + Sync>;

/// Total order over decorators; decorators earlier in the order are applied first.
#[derive(Clone)]
pub struct DecorationOrdering {
    compare: DecoratorComparator,
}

impl DecorationOrdering {
    pub fn new<F>(compare: F) -> Self
    where
        F: Fn(&dyn LogicDecorator, &dyn LogicDecorator) -> Ordering + Send + Sync + 'static,
    {
        Self {
            compare: Arc::new(compare),
        }
    }

    /// Orders by position of the decorator type in `types`, innermost first.
    /// Unlisted types come after listed ones, by type name.
    pub fn by_type_order<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let positions: BTreeMap<String, usize> = types
            .into_iter()
            .enumerate()
            .map(|(i, t)| (t.into(), i))
            .collect();
        Self::new(move |a, b| {
            let rank = |d: &dyn LogicDecorator| positions.get(d.decorator_type()).copied().unwrap_or(usize::MAX);
            rank(a)
                .cmp(&rank(b))
                .then_with(|| a.decorator_type().cmp(b.decorator_type()))
                .then_with(|| a.id().cmp(b.id()))
        })
    }

    pub fn compare(&self, a: &dyn LogicDecorator, b: &dyn LogicDecorator) -> Ordering {
        (self.compare)(a, b)
    }

    pub fn sort(&self, decorators: &mut [Arc<dyn LogicDecorator>]) {
        decorators.sort_by(|a, b| self.compare(a.as_ref(), b.as_ref()));
    }
}

impl Default for DecorationOrdering {
    fn default() -> Self {
        Self::new(|a, b| {
            a.decorator_type()
                .cmp(b.decorator_type())
                .then_with(|| a.id().cmp(b.id()))
        })
    }
}

impl fmt::Debug for DecorationOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DecorationOrdering")
    }
}
