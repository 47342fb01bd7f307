// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{CommandOrder, DispatchStrategy, ExecutorConfig, NodeExecutionConfig};
use crate::data::{Facets, Inputs};
use crate::decoration::{
    DecoratorCommand, DecoratorConfig, InputBatchingDecorator, LogicDecorator, MainLogicExecReporter,
};
use crate::engine::{NodeExecutor, QueueRuntime};
use crate::errors::{ExecutionError, NodeError};
use crate::graph::{
    DependantChain, Hop, LogicDefinition, MainLogic, NodeDefinition, NodeDefinitionRegistry,
    ResolverCommand, ResolverDefinition,
};
use crate::logics::{ConstantLogic, CountingLogic, DelayedLogic, EchoLogic, PanickingLogic};
use crate::traits::GraphExecutor;
use crate::utils::LeasePool;

/// Integration tests driving whole graphs through the command-queue executor
#[cfg(test)]
mod tests {
    use super::*;

    type Journal = Arc<Mutex<Vec<String>>>;

    fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    fn user_id_resolver() -> ResolverDefinition {
        ResolverDefinition::new("greeting:user_info", "user_info", ["user_id"], |facets: &Facets| {
            ResolverCommand::single(Inputs::from([(
                "user_id",
                facets.value("user_id").cloned().unwrap_or(Value::Null),
            )]))
        })
    }

    fn user_service(logic: LogicDefinition) -> NodeDefinition {
        NodeDefinition::new("user_service", logic)
    }

    fn name_lookup() -> LogicDefinition {
        LogicDefinition::compute("user_service:lookup", ["user_id"], |facets: &Facets| {
            let id = facets.value("user_id").and_then(Value::as_u64).unwrap_or(0);
            Ok(json!({ "name": format!("user-{}", id) }))
        })
    }

    fn greeting(mandatory: bool) -> NodeDefinition {
        let logic = LogicDefinition::compute("greeting:logic", ["user_id", "user_info"], |facets: &Facets| {
            let name = facets
                .dependency("user_info")
                .and_then(|results| results.first_value())
                .and_then(|info| info.get("name"))
                .and_then(Value::as_str)
                .unwrap_or("stranger")
                .to_string();
            Ok(json!(format!("Hello {}", name)))
        });
        let node = NodeDefinition::new("greeting", logic);
        let node = if mandatory {
            node.with_mandatory_dependency("user_info", "user_service")
        } else {
            node.with_dependency("user_info", "user_service")
        };
        node.with_resolver(user_id_resolver())
    }

    fn registry(definitions: Vec<NodeDefinition>) -> Arc<NodeDefinitionRegistry> {
        Arc::new(NodeDefinitionRegistry::new(definitions).unwrap())
    }

    fn executor(definitions: Vec<NodeDefinition>, config: ExecutorConfig) -> NodeExecutor {
        NodeExecutor::with_current_runtime(registry(definitions), config).unwrap()
    }

    fn user(id: u64) -> Inputs {
        Inputs::from([("user_id", json!(id))])
    }

    fn user_info_chain() -> DependantChain {
        DependantChain::start().extend(&"greeting".into(), "user_info")
    }

    #[tokio::test]
    async fn test_greeting_graph_resolves_through_dependency() {
        let reporter = MainLogicExecReporter::new();
        let executor = executor(
            vec![greeting(false), user_service(name_lookup())],
            ExecutorConfig::new("svc").with_decorator_config(reporter.config()),
        );

        let handle = executor
            .execute_node(&"greeting".into(), user(7), NodeExecutionConfig::new("r1"))
            .unwrap();
        executor.flush();

        assert_eq!(handle.await.unwrap(), json!("Hello user-7"));

        let report = reporter.snapshot();
        assert_eq!(report.completed(), 2);
        let lookup = report
            .executions
            .iter()
            .find(|e| e.logic_id == "user_service:lookup")
            .unwrap();
        assert_eq!(lookup.inputs["inputs"], json!({ "user_id": 7 }));
    }

    #[tokio::test]
    async fn test_identical_roots_share_logic_invocations() {
        let counting = CountingLogic::new(Arc::new(EchoLogic::new("user_id")));
        let counter = counting.counter();
        let lookup = LogicDefinition::from_node_logic("user_service:echo", ["user_id"], Arc::new(counting));
        let executor = executor(vec![greeting(false), user_service(lookup)], ExecutorConfig::new("svc"));

        let first = executor
            .execute_node(&"greeting".into(), user(1), NodeExecutionConfig::new("a"))
            .unwrap();
        let second = executor
            .execute_node(&"greeting".into(), user(1), NodeExecutionConfig::new("b"))
            .unwrap();
        executor.flush();

        assert_eq!(first.await.unwrap(), json!("Hello stranger"));
        assert_eq!(second.await.unwrap(), json!("Hello stranger"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let metrics = executor.metrics();
        assert_eq!(metrics.main_logic_invocations, 2);
        assert_eq!(metrics.cache_hits, 2);
    }

    #[tokio::test]
    async fn test_skipped_mandatory_dependency_fails_the_root() {
        let skipping = NodeDefinition::new(
            "greeting",
            LogicDefinition::compute("greeting:logic", ["user_id", "user_info"], |_: &Facets| Ok(json!("unreachable"))),
        )
        .with_mandatory_dependency("user_info", "user_service")
        .with_resolver(ResolverDefinition::new(
            "greeting:user_info",
            "user_info",
            ["user_id"],
            |_: &Facets| ResolverCommand::skip("anonymous user"),
        ));
        let executor = executor(vec![skipping, user_service(name_lookup())], ExecutorConfig::new("svc"));

        let handle = executor
            .execute_node(&"greeting".into(), user(3), NodeExecutionConfig::new("r1"))
            .unwrap();
        executor.flush();

        match handle.await {
            Err(ExecutionError::Node(NodeError::MandatoryDependencyFailed { dependency, cause, .. })) => {
                assert_eq!(dependency, "user_info");
                assert!(cause.contains("anonymous user"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(executor.metrics().main_logic_invocations, 1);
    }

    #[tokio::test]
    async fn test_fan_out_results_are_aggregated_in_index_order() {
        let friends = NodeDefinition::new(
            "friends",
            LogicDefinition::compute("friends:logic", ["user_ids", "profiles"], |facets: &Facets| {
                let names: Vec<Value> = facets
                    .dependency("profiles")
                    .map(|results| results.values().filter_map(|v| v.get("name").cloned()).collect())
                    .unwrap_or_default();
                Ok(Value::Array(names))
            }),
        )
        .with_dependency("profiles", "user_service")
        .with_resolver(ResolverDefinition::new(
            "friends:profiles",
            "profiles",
            ["user_ids"],
            |facets: &Facets| {
                let ids = facets
                    .value("user_ids")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                ResolverCommand::fan_out(ids.into_iter().map(|id| Inputs::from([("user_id", id)])).collect())
            },
        ));
        let executor = executor(vec![friends, user_service(name_lookup())], ExecutorConfig::new("svc"));

        let result = executor
            .execute(
                &"friends".into(),
                Inputs::from([("user_ids", json!([4, 2]))]),
                NodeExecutionConfig::new("r1"),
            )
            .await;

        assert_eq!(result.unwrap(), json!(["user-4", "user-2"]));
    }

    #[tokio::test]
    async fn test_nothing_runs_before_flush() {
        let counting = CountingLogic::new(Arc::new(ConstantLogic::new(json!("done"))));
        let counter = counting.counter();
        let leaf = NodeDefinition::new(
            "leaf",
            LogicDefinition::from_node_logic("leaf:logic", Vec::<String>::new(), Arc::new(counting)),
        );
        let executor = executor(vec![leaf], ExecutorConfig::new("svc"));

        let handle = executor
            .execute_node(&"leaf".into(), Inputs::empty(), NodeExecutionConfig::new("r1"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        executor.flush();
        assert_eq!(handle.await.unwrap(), json!("done"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_flushes_pending_requests_and_rejects_new_ones() {
        let executor = executor(vec![greeting(false), user_service(name_lookup())], ExecutorConfig::new("svc"));

        let handle = executor
            .execute_node(&"greeting".into(), user(5), NodeExecutionConfig::new("r1"))
            .unwrap();
        executor.close();

        assert_eq!(handle.await.unwrap(), json!("Hello user-5"));
        let rejected = executor.execute_node(&"greeting".into(), user(6), NodeExecutionConfig::new("r2"));
        assert!(matches!(rejected, Err(ExecutionError::ExecutorClosed)));
        assert!(executor.is_closed());

        executor.terminated().await;
    }

    #[tokio::test]
    async fn test_invalid_root_requests_are_rejected() {
        let executor = executor(vec![greeting(false), user_service(name_lookup())], ExecutorConfig::new("svc"));

        let empty = executor.execute_node(&"greeting".into(), user(1), NodeExecutionConfig::new(""));
        assert!(matches!(empty, Err(ExecutionError::InvalidExecutionId)));

        let first = executor
            .execute_node(&"greeting".into(), user(1), NodeExecutionConfig::new("same"))
            .unwrap();
        let duplicate = executor
            .execute_node(&"greeting".into(), user(2), NodeExecutionConfig::new("same"))
            .unwrap();
        let unknown = executor
            .execute_node(&"nope".into(), Inputs::empty(), NodeExecutionConfig::new("other"))
            .unwrap();
        executor.flush();

        assert_eq!(first.await.unwrap(), json!("Hello user-1"));
        assert_eq!(
            duplicate.await,
            Err(ExecutionError::Node(NodeError::DuplicateRequest {
                request_id: "svc:same".to_string()
            }))
        );
        assert_eq!(
            unknown.await,
            Err(ExecutionError::Node(NodeError::UnknownNode {
                node_id: "nope".to_string()
            }))
        );
    }

    #[tokio::test]
    async fn test_disabled_chain_fails_only_that_dependency() {
        let executor = executor(vec![greeting(false), user_service(name_lookup())], ExecutorConfig::new("svc"));
        let disabled = NodeExecutionConfig::new("off").with_disabled_chain([Hop {
            node: "greeting".into(),
            dependency: "user_info".to_string(),
        }]);

        let with_chain = executor
            .execute_node(&"greeting".into(), user(1), NodeExecutionConfig::new("on"))
            .unwrap();
        let without_chain = executor.execute_node(&"greeting".into(), user(2), disabled).unwrap();
        executor.flush();

        assert_eq!(with_chain.await.unwrap(), json!("Hello user-1"));
        assert_eq!(without_chain.await.unwrap(), json!("Hello stranger"));
    }

    #[tokio::test]
    async fn test_executor_level_disabled_chain_with_mandatory_dependency() {
        let config = ExecutorConfig::new("svc").with_disabled_chain(user_info_chain().hops());
        let executor = executor(vec![greeting(true), user_service(name_lookup())], config);

        let result = executor
            .execute(&"greeting".into(), user(1), NodeExecutionConfig::new("r1"))
            .await;

        match result {
            Err(ExecutionError::Node(NodeError::MandatoryDependencyFailed { cause, .. })) => {
                assert!(cause.contains("disabled"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    fn ordered_graph(journal: &Journal) -> Vec<NodeDefinition> {
        let leaf_journal = journal.clone();
        let leaf = NodeDefinition::new(
            "leaf",
            LogicDefinition::compute("leaf:logic", ["n"], move |facets: &Facets| {
                let n = facets.value("n").cloned().unwrap_or(Value::Null);
                leaf_journal.lock().unwrap().push(format!("leaf{}", n));
                Ok(n)
            }),
        );
        let root_journal = journal.clone();
        let root = NodeDefinition::new(
            "root",
            LogicDefinition::compute("root:logic", ["n", "leaf"], move |facets: &Facets| {
                let n = facets.value("n").cloned().unwrap_or(Value::Null);
                root_journal.lock().unwrap().push(format!("root{}", n));
                Ok(n)
            }),
        )
        .with_dependency("leaf", "leaf")
        .with_resolver(ResolverDefinition::new("root:leaf", "leaf", ["n"], |facets: &Facets| {
            ResolverCommand::single(Inputs::from([("n", facets.value("n").cloned().unwrap_or(Value::Null))]))
        }));
        vec![root, leaf]
    }

    async fn run_two_roots(order: CommandOrder, journal: &Journal) -> NodeExecutor {
        let executor = executor(
            ordered_graph(journal),
            ExecutorConfig::new("svc").with_command_order(order),
        );
        let first = executor
            .execute_node(&"root".into(), Inputs::from([("n", json!(1))]), NodeExecutionConfig::new("1"))
            .unwrap();
        let second = executor
            .execute_node(&"root".into(), Inputs::from([("n", json!(2))]), NodeExecutionConfig::new("2"))
            .unwrap();
        executor.flush();
        assert_eq!(first.await.unwrap(), json!(1));
        assert_eq!(second.await.unwrap(), json!(2));
        executor
    }

    #[tokio::test]
    async fn test_breadth_order_runs_each_level_before_the_next() {
        let journal = journal();
        let executor = run_two_roots(CommandOrder::Breadth, &journal).await;

        assert_eq!(entries(&journal), vec!["leaf1", "leaf2", "root1", "root2"]);
        assert_eq!(executor.metrics().queue_bypassed, 0);
    }

    #[tokio::test]
    async fn test_depth_order_finishes_one_root_before_the_next() {
        let journal = journal();
        let executor = run_two_roots(CommandOrder::Depth, &journal).await;

        assert_eq!(entries(&journal), vec!["leaf1", "root1", "leaf2", "root2"]);
        assert!(executor.metrics().queue_bypassed > 0);
    }

    #[tokio::test]
    async fn test_batch_dispatch_groups_root_requests_per_node() {
        for (dispatch, expected_batches) in [(DispatchStrategy::Granular, 0), (DispatchStrategy::Batch, 1)] {
            let executor = executor(
                vec![greeting(false), user_service(name_lookup())],
                ExecutorConfig::new("svc").with_dispatch(dispatch),
            );
            let first = executor
                .execute_node(&"greeting".into(), user(1), NodeExecutionConfig::new("1"))
                .unwrap();
            let second = executor
                .execute_node(&"greeting".into(), user(2), NodeExecutionConfig::new("2"))
                .unwrap();
            executor.flush();

            assert_eq!(first.await.unwrap(), json!("Hello user-1"));
            assert_eq!(second.await.unwrap(), json!("Hello user-2"));
            assert_eq!(executor.metrics().input_batches, expected_batches);
        }
    }

    /// Passes logic through unchanged and journals lifecycle commands.
    struct RecordingDecorator {
        decorator_type: String,
        journal: Journal,
    }

    impl RecordingDecorator {
        fn new(decorator_type: &str, journal: &Journal) -> Arc<Self> {
            Arc::new(Self {
                decorator_type: decorator_type.to_string(),
                journal: journal.clone(),
            })
        }

        fn record(&self, event: &str) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.decorator_type, event));
        }
    }

    impl LogicDecorator for RecordingDecorator {
        fn decorator_type(&self) -> &str {
            &self.decorator_type
        }

        fn id(&self) -> &str {
            &self.decorator_type
        }

        fn decorate(&self, logic: MainLogic, _definition: &LogicDefinition) -> MainLogic {
            logic
        }

        fn handle(&self, command: &DecoratorCommand) {
            if let DecoratorCommand::Flush { .. } = command {
                self.record("flush");
            }
        }

        fn on_complete(&self) {
            self.record("complete");
        }
    }

    #[tokio::test]
    async fn test_decorators_flush_in_reverse_order_and_complete_once() {
        let journal = journal();
        let logic = LogicDefinition::compute("leaf:logic", Vec::<String>::new(), |_: &Facets| Ok(json!(1)))
            .with_session_decorator(RecordingDecorator::new("a", &journal))
            .with_session_decorator(RecordingDecorator::new("b", &journal));
        let executor = executor(vec![NodeDefinition::new("leaf", logic)], ExecutorConfig::new("svc"));

        let handle = executor
            .execute_node(&"leaf".into(), Inputs::empty(), NodeExecutionConfig::new("1"))
            .unwrap();
        executor.close();
        assert_eq!(handle.await.unwrap(), json!(1));
        executor.terminated().await;

        assert_eq!(
            entries(&journal),
            vec!["b:flush", "a:flush", "a:complete", "b:complete"]
        );
    }

    #[tokio::test]
    async fn test_input_batching_is_released_by_flush() {
        let batching = Arc::new(InputBatchingDecorator::new("users", 10, |_| true));
        let shared = batching.clone();
        let config = DecoratorConfig::shared(
            "input_batching",
            "users",
            BTreeSet::from([user_info_chain()]),
            move |_| shared.clone() as Arc<dyn LogicDecorator>,
        );
        let executor = executor(
            vec![greeting(false), user_service(name_lookup())],
            ExecutorConfig::new("svc").with_decorator_config(config),
        );

        let handles: Vec<_> = (1..=3)
            .map(|id| {
                executor
                    .execute_node(&"greeting".into(), user(id), NodeExecutionConfig::new(id.to_string()))
                    .unwrap()
            })
            .collect();
        executor.flush();

        for (id, handle) in (1..=3).zip(handles) {
            assert_eq!(handle.await.unwrap(), json!(format!("Hello user-{}", id)));
        }
        assert_eq!(batching.released_batches(), vec![3]);
        assert_eq!(batching.pending(), 0);
    }

    #[tokio::test]
    async fn test_panicking_logic_surfaces_as_an_error() {
        let logic = LogicDefinition::from_node_logic("boom:logic", Vec::<String>::new(), Arc::new(PanickingLogic));
        let executor = executor(vec![NodeDefinition::new("boom", logic)], ExecutorConfig::new("svc"));

        let result = executor
            .execute(&"boom".into(), Inputs::empty(), NodeExecutionConfig::new("1"))
            .await;

        assert_eq!(
            result,
            Err(ExecutionError::Node(NodeError::LogicPanicked {
                node_id: "boom".to_string()
            }))
        );
    }

    #[tokio::test]
    async fn test_decorator_flush_waits_for_in_flight_io_dependency() {
        let journal = journal();
        let slow = DelayedLogic::new(Arc::new(ConstantLogic::new(json!("ok"))), Duration::from_millis(100));
        let leaf = NodeDefinition::new(
            "leaf",
            LogicDefinition::from_node_logic("leaf:logic", Vec::<String>::new(), Arc::new(slow)),
        );
        let parent_logic = LogicDefinition::compute("parent:logic", ["leaf"], |facets: &Facets| {
            Ok(facets
                .dependency("leaf")
                .and_then(|results| results.first_value())
                .cloned()
                .unwrap_or(Value::Null))
        })
        .with_session_decorator(RecordingDecorator::new("rec", &journal));
        let parent = NodeDefinition::new("parent", parent_logic).with_dependency("leaf", "leaf");
        let executor = executor(vec![parent, leaf], ExecutorConfig::new("svc"));

        let handle = executor
            .execute_node(&"parent".into(), Inputs::empty(), NodeExecutionConfig::new("1"))
            .unwrap();
        executor.flush();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(entries(&journal).is_empty());

        assert_eq!(handle.await.unwrap(), json!("ok"));
        executor.close();
        executor.terminated().await;

        assert_eq!(entries(&journal), vec!["rec:flush", "rec:complete"]);
    }

    #[tokio::test]
    async fn test_settled_cycles_release_cached_results_but_remember_request_ids() {
        let counting = CountingLogic::new(Arc::new(ConstantLogic::new(json!("done"))));
        let counter = counting.counter();
        let logic = LogicDefinition::from_node_logic("leaf:logic", Vec::<String>::new(), Arc::new(counting));
        let executor = executor(vec![NodeDefinition::new("leaf", logic)], ExecutorConfig::new("svc"));

        for execution_id in ["first", "second"] {
            let handle = executor
                .execute_node(&"leaf".into(), Inputs::empty(), NodeExecutionConfig::new(execution_id))
                .unwrap();
            executor.flush();
            assert_eq!(handle.await.unwrap(), json!("done"));
            // let the cycle's flush commands drain
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        let reused = executor
            .execute_node(&"leaf".into(), Inputs::empty(), NodeExecutionConfig::new("first"))
            .unwrap();
        executor.flush();
        assert_eq!(
            reused.await,
            Err(ExecutionError::Node(NodeError::DuplicateRequest {
                request_id: "svc:first".to_string()
            }))
        );
    }

    #[tokio::test]
    async fn test_queue_lease_is_released_on_close() {
        let runtime = QueueRuntime::current().unwrap();
        let pool = LeasePool::new(2, move || runtime.clone());
        let executor = NodeExecutor::new(
            registry(vec![greeting(false), user_service(name_lookup())]),
            ExecutorConfig::new("svc"),
            &pool,
        );
        assert_eq!(pool.active_leases(), 1);

        let handle = executor
            .execute_node(&"greeting".into(), user(1), NodeExecutionConfig::new("1"))
            .unwrap();
        executor.close();
        executor.close();
        assert_eq!(handle.await.unwrap(), json!("Hello user-1"));
        executor.terminated().await;

        assert_eq!(pool.active_leases(), 0);
        assert_eq!(pool.item_count(), 1);
    }
}
