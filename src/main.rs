// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};
use the_graphwood::config::{load_config, ExecutorConfig, NodeExecutionConfig};
use the_graphwood::data::{Facets, Inputs};
use the_graphwood::decoration::MainLogicExecReporter;
use the_graphwood::engine::NodeExecutor;
use the_graphwood::errors::NodeError;
use the_graphwood::graph::{
    LogicDefinition, NodeDefinition, NodeDefinitionRegistry, ResolverCommand, ResolverDefinition,
};
use the_graphwood::logics::DelayedLogic;
use the_graphwood::traits::NodeLogic;

const USERS: [&str; 4] = ["ada", "grace", "edsger", "barbara"];

/// Looks a user up in a fixed directory.
struct UserDirectory;

#[async_trait]
impl NodeLogic for UserDirectory {
    async fn execute(&self, facets: Facets) -> Result<Value, NodeError> {
        let id = facets
            .value("user_id")
            .and_then(Value::as_u64)
            .ok_or_else(|| NodeError::logic("user_id must be a number"))?;
        let name = USERS
            .get(id as usize)
            .ok_or_else(|| NodeError::logic(format!("no user with id {}", id)))?;
        Ok(json!({ "id": id, "name": name }))
    }

    fn name(&self) -> &'static str {
        "user_directory"
    }
}

/// `greeting` resolves `user_info` from its `user_id` input; `user_service` is an io lookup.
fn greeting_graph() -> anyhow::Result<NodeDefinitionRegistry> {
    let lookup: Arc<dyn NodeLogic> = Arc::new(DelayedLogic::new(
        Arc::new(UserDirectory),
        Duration::from_millis(10),
    ));
    let user_service = NodeDefinition::new(
        "user_service",
        LogicDefinition::from_node_logic("user_service:lookup", ["user_id"], lookup)
            .with_tag("service", "users"),
    );

    let greeting = NodeDefinition::new(
        "greeting",
        LogicDefinition::compute("greeting:format", ["user_id", "user_info"], |facets: &Facets| {
            let user_info = facets
                .dependency("user_info")
                .ok_or_else(|| NodeError::logic("user_info missing"))?;
            if let Some(error) = user_info.first_error() {
                return Err(error.clone());
            }
            let name = user_info
                .first_value()
                .and_then(|info| info.get("name"))
                .and_then(Value::as_str)
                .unwrap_or("stranger");
            Ok(json!(format!("Hello {}!", name)))
        }),
    )
    .with_mandatory_dependency("user_info", "user_service")
    .with_resolver(ResolverDefinition::new(
        "greeting:user_info",
        "user_info",
        ["user_id"],
        |facets: &Facets| match facets.value("user_id") {
            Some(id) => ResolverCommand::single(Inputs::from([("user_id", id.clone())])),
            None => ResolverCommand::skip("no user id"),
        },
    ));

    NodeDefinitionRegistry::new(vec![greeting, user_service]).map_err(|errors| {
        let rendered: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        anyhow!("invalid graph: {}", rendered.join("; "))
    })
}

fn parse_args(args: &[String]) -> anyhow::Result<(Option<String>, Vec<u64>)> {
    let mut config_path = None;
    let mut user_ids = Vec::new();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("--config needs a path")?;
            config_path = Some(path.clone());
        } else {
            user_ids.push(arg.parse().with_context(|| format!("'{}' is not a user id", arg))?);
        }
    }
    if user_ids.is_empty() {
        user_ids = vec![0, 1, 1, 7];
    }
    Ok((config_path, user_ids))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("the_graphwood=info".parse()?),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let (config_path, user_ids) = parse_args(&args).with_context(|| {
        format!("Usage: {} [--config <executor.yaml|executor.toml>] [user_id ...]", args[0])
    })?;

    let config = match &config_path {
        Some(path) => load_config(path).with_context(|| format!("failed to load {}", path))?,
        None => ExecutorConfig::default(),
    };
    let reporter = MainLogicExecReporter::new();
    let config = config.with_decorator_config(reporter.config());

    println!("🌳 Graphwood Greeting Demo");
    println!("═══════════════════════════");
    println!("Instance:      {}", config.instance_id);
    println!("Command order: {}", config.command_order.as_str());
    println!("Dispatch:      {}", config.dispatch.as_str());
    println!("User ids:      {:?}", user_ids);
    println!();

    let executor = NodeExecutor::with_current_runtime(Arc::new(greeting_graph()?), config)?;
    let started = Instant::now();

    let mut handles = Vec::with_capacity(user_ids.len());
    for (i, user_id) in user_ids.iter().enumerate() {
        let handle = executor.execute_node(
            &"greeting".into(),
            Inputs::from([("user_id", json!(user_id))]),
            NodeExecutionConfig::new(format!("request-{}", i)),
        )?;
        handles.push((*user_id, handle));
    }
    executor.close();

    for (user_id, handle) in handles {
        match handle.await {
            Ok(value) => println!("✅ user {:>3}: {}", user_id, value),
            Err(e) => println!("❌ user {:>3}: {}", user_id, e),
        }
    }
    executor.terminated().await;

    let metrics = executor.metrics();
    println!();
    println!("{}", "─".repeat(60));
    println!("⏱️  Completed in {:?}", started.elapsed());
    println!("📊 Metrics: {}", serde_json::to_string(&metrics)?);
    println!("🧾 Execution report:\n{}", reporter.to_json()?);
    Ok(())
}
