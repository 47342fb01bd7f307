// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::{
    DecorationOrdering, DecoratorCommand, DecoratorConfig, DecoratorContext, LogicDecorator,
    LogicExecutionContext,
};
use crate::graph::{DependantChain, NodeDefinition};

/// Lazily created request-scoped decorator instances, keyed by type then instance id.
///
/// Owned by the command loop, so it is never shared across threads.
pub(crate) struct DecoratorRegistry {
    configs: Vec<DecoratorConfig>,
    ordering: DecorationOrdering,
    instances: BTreeMap<String, BTreeMap<String, Arc<dyn LogicDecorator>>>,
}

impl DecoratorRegistry {
    pub(crate) fn new(configs: Vec<DecoratorConfig>, ordering: DecorationOrdering) -> Self {
        Self {
            configs,
            ordering,
            instances: BTreeMap::new(),
        }
    }

    /// Decorators for one node along one chain, in application order.
    ///
    /// Request-scoped decorators replace session-scoped ones of the same type. Every
    /// request-scoped decorator that applies is told which chains are active for the node.
    pub(crate) fn resolve(
        &mut self,
        definition: &NodeDefinition,
        chain: &DependantChain,
        active_chains: &BTreeSet<DependantChain>,
    ) -> Vec<Arc<dyn LogicDecorator>> {
        let logic = definition.logic();
        let mut by_type: BTreeMap<String, Arc<dyn LogicDecorator>> = logic
            .session_decorators()
            .iter()
            .map(|d| (d.decorator_type().to_string(), d.clone()))
            .collect();

        let ctx = LogicExecutionContext {
            node_id: definition.node_id().clone(),
            logic_tags: logic.tags().clone(),
            dependant_chain: chain.clone(),
        };

        let mut request_scoped: BTreeMap<String, Arc<dyn LogicDecorator>> = BTreeMap::new();
        for config in logic.decorator_configs().iter().chain(self.configs.iter()) {
            if !config.should_decorate(&ctx) {
                continue;
            }
            let instance_id = config.instance_id(&ctx);
            let decorator = self
                .instances
                .entry(config.decorator_type().to_string())
                .or_default()
                .entry(instance_id.clone())
                .or_insert_with(|| {
                    config.create(&DecoratorContext {
                        instance_id,
                        execution: ctx.clone(),
                    })
                })
                .clone();
            decorator.handle(&DecoratorCommand::InitiateActiveChains {
                node_id: ctx.node_id.clone(),
                chains: active_chains.clone(),
            });
            request_scoped
                .entry(config.decorator_type().to_string())
                .or_insert(decorator);
        }
        by_type.extend(request_scoped);

        let mut decorators: Vec<_> = by_type.into_values().collect();
        self.ordering.sort(&mut decorators);
        decorators
    }

    pub(crate) fn request_scoped_instances(&self) -> impl Iterator<Item = &Arc<dyn LogicDecorator>> {
        self.instances.values().flat_map(|by_id| by_id.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{LogicDefinition, MainLogic};
    use serde_json::Value;
    use std::sync::Mutex;

    struct Named {
        decorator_type: &'static str,
        id: String,
        commands: Mutex<Vec<DecoratorCommand>>,
    }

    impl Named {
        fn new(decorator_type: &'static str, id: &str) -> Arc<Self> {
            Arc::new(Self {
                decorator_type,
                id: id.to_string(),
                commands: Mutex::new(Vec::new()),
            })
        }
    }

    impl LogicDecorator for Named {
        fn decorator_type(&self) -> &str {
            self.decorator_type
        }

        fn id(&self) -> &str {
            &self.id
        }

        fn decorate(&self, logic: MainLogic, _definition: &LogicDefinition) -> MainLogic {
            logic
        }

        fn handle(&self, command: &DecoratorCommand) {
            self.commands.lock().unwrap().push(command.clone());
        }
    }

    fn node_with_session(decorator: Arc<dyn LogicDecorator>) -> NodeDefinition {
        NodeDefinition::new(
            "n",
            LogicDefinition::compute("n:logic", Vec::<String>::new(), |_| Ok(Value::Null))
                .with_session_decorator(decorator),
        )
    }

    #[test]
    fn test_request_scope_overrides_session_scope_of_same_type() {
        let session = Named::new("reporter", "session");
        let node = node_with_session(session);
        let config = DecoratorConfig::per_dependant_chain("reporter", |ctx| {
            Named::new("reporter", &ctx.instance_id) as Arc<dyn LogicDecorator>
        });
        let mut registry = DecoratorRegistry::new(vec![config], DecorationOrdering::default());

        let chain = DependantChain::start();
        let decorators = registry.resolve(&node, &chain, &BTreeSet::from([chain.clone()]));

        assert_eq!(decorators.len(), 1);
        assert_eq!(decorators[0].id(), "[Start]");
    }

    #[test]
    fn test_instances_are_created_once_per_instance_id() {
        let node = node_with_session(Named::new("other", "s"));
        let config = DecoratorConfig::per_dependant_chain("batching", |ctx| {
            Named::new("batching", &ctx.instance_id) as Arc<dyn LogicDecorator>
        });
        let mut registry = DecoratorRegistry::new(vec![config], DecorationOrdering::default());

        let a = DependantChain::start().extend(&"p".into(), "x");
        let b = DependantChain::start().extend(&"p".into(), "y");
        let active = BTreeSet::from([a.clone(), b.clone()]);

        let first = registry.resolve(&node, &a, &active);
        let again = registry.resolve(&node, &a, &active);
        registry.resolve(&node, &b, &active);

        let batching = |ds: &[Arc<dyn LogicDecorator>]| {
            ds.iter().find(|d| d.decorator_type() == "batching").cloned()
        };
        assert!(Arc::ptr_eq(&batching(&first).unwrap(), &batching(&again).unwrap()));
        assert_eq!(registry.request_scoped_instances().count(), 2);
    }

    #[test]
    fn test_resolved_decorators_follow_the_ordering() {
        let node = node_with_session(Named::new("b_type", "s"));
        let config = DecoratorConfig::per_dependant_chain("a_type", |ctx| {
            Named::new("a_type", &ctx.instance_id) as Arc<dyn LogicDecorator>
        });
        let ordering = DecorationOrdering::by_type_order(["b_type", "a_type"]);
        let mut registry = DecoratorRegistry::new(vec![config], ordering);

        let chain = DependantChain::start();
        let types: Vec<String> = registry
            .resolve(&node, &chain, &BTreeSet::new())
            .iter()
            .map(|d| d.decorator_type().to_string())
            .collect();

        assert_eq!(types, vec!["b_type", "a_type"]);
    }

    #[test]
    fn test_shared_config_only_decorates_listed_chains() {
        let node = node_with_session(Named::new("other", "s"));
        let listed = DependantChain::start().extend(&"p".into(), "x");
        let config = DecoratorConfig::shared(
            "batching",
            "shared-1",
            BTreeSet::from([listed.clone()]),
            |ctx| Named::new("batching", &ctx.instance_id) as Arc<dyn LogicDecorator>,
        );
        let mut registry = DecoratorRegistry::new(vec![config], DecorationOrdering::default());

        let on_listed = registry.resolve(&node, &listed, &BTreeSet::from([listed.clone()]));
        let elsewhere = registry.resolve(&node, &DependantChain::start(), &BTreeSet::new());

        assert!(on_listed.iter().any(|d| d.id() == "shared-1"));
        assert!(elsewhere.iter().all(|d| d.decorator_type() != "batching"));
    }
}
