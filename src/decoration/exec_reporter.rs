// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Instrumentation decorator recording the start and end of every main-logic execution.
//!
//! The collected [`ExecutionReport`] is a plain serde snapshot; persisting or rendering it
//! is left to whoever holds the reporter.

use futures::future::FutureExt;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::{LogicDecorator, DecoratorConfig};
use crate::data::{Facets, Inputs, ValueOrError};
use crate::errors::NodeError;
use crate::graph::{LogicDefinition, MainLogic};
use crate::observability::messages::node::ExecutionReportReady;
use crate::observability::messages::StructuredLog;

pub const DECORATOR_TYPE: &str = "main_logic_exec_reporter";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LogicExecution {
    pub logic_id: String,
    pub tags: BTreeMap<String, String>,
    pub inputs: Value,
    pub started_after_micros: u64,
    pub finished_after_micros: Option<u64>,
    pub outcome: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ExecutionReport {
    pub executions: Vec<LogicExecution>,
}

impl ExecutionReport {
    pub fn completed(&self) -> usize {
        self.executions
            .iter()
            .filter(|e| e.finished_after_micros.is_some())
            .count()
    }
}

#[derive(Clone)]
pub struct MainLogicExecReporter {
    report: Arc<Mutex<ExecutionReport>>,
    epoch: Instant,
}

impl MainLogicExecReporter {
    pub fn new() -> Self {
        Self {
            report: Arc::new(Mutex::new(ExecutionReport::default())),
            epoch: Instant::now(),
        }
    }

    /// Request-scoped config sharing this reporter across every chain.
    pub fn config(&self) -> DecoratorConfig {
        let reporter = self.clone();
        DecoratorConfig::new(
            DECORATOR_TYPE,
            |_| true,
            |_| DECORATOR_TYPE.to_string(),
            move |_| Arc::new(reporter.clone()) as Arc<dyn LogicDecorator>,
        )
    }

    pub fn snapshot(&self) -> ExecutionReport {
        self.report.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    fn elapsed_micros(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    fn report_start(&self, definition: &LogicDefinition, facets: &Facets) -> Option<usize> {
        let started = self.elapsed_micros();
        let mut report = self.report.lock().ok()?;
        report.executions.push(LogicExecution {
            logic_id: definition.logic_id().to_string(),
            tags: definition.tags().clone(),
            inputs: facets_to_json(facets),
            started_after_micros: started,
            finished_after_micros: None,
            outcome: None,
        });
        Some(report.executions.len() - 1)
    }

    fn report_end(&self, index: usize, result: &Result<Value, NodeError>) {
        let finished = self.elapsed_micros();
        if let Ok(mut report) = self.report.lock() {
            if let Some(execution) = report.executions.get_mut(index) {
                execution.finished_after_micros = Some(finished);
                execution.outcome = Some(match result {
                    Ok(value) => json!({ "value": value }),
                    Err(error) => json!({ "error": error.to_string() }),
                });
            }
        }
    }
}

impl Default for MainLogicExecReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl LogicDecorator for MainLogicExecReporter {
    fn decorator_type(&self) -> &str {
        DECORATOR_TYPE
    }

    fn id(&self) -> &str {
        DECORATOR_TYPE
    }

    fn decorate(&self, logic: MainLogic, definition: &LogicDefinition) -> MainLogic {
        let reporter = self.clone();
        let definition = definition.clone();
        Arc::new(move |facets: Facets| {
            let index = reporter.report_start(&definition, &facets);
            let execution = logic(facets);
            let reporter = reporter.clone();
            async move {
                let result = execution.await;
                if let Some(index) = index {
                    reporter.report_end(index, &result);
                }
                result
            }
            .boxed()
        })
    }

    fn on_complete(&self) {
        let report = self.snapshot();
        ExecutionReportReady {
            executions: report.executions.len(),
            completed: report.completed(),
        }
        .log();
    }
}

fn value_or_error_to_json(value: &ValueOrError) -> Value {
    match value {
        ValueOrError::Value(v) => v.clone(),
        ValueOrError::Error(e) => json!({ "error": e.to_string() }),
        ValueOrError::Absent => Value::Null,
    }
}

fn inputs_to_json(inputs: &Inputs) -> Value {
    let map: Map<String, Value> = inputs
        .iter()
        .map(|(name, value)| (name.clone(), value_or_error_to_json(value)))
        .collect();
    Value::Object(map)
}

fn facets_to_json(facets: &Facets) -> Value {
    let dependencies: Map<String, Value> = facets
        .dependencies()
        .iter()
        .map(|(name, results)| {
            let entries = results
                .iter()
                .map(|(inputs, value)| {
                    json!({ "inputs": inputs_to_json(inputs), "value": value_or_error_to_json(value) })
                })
                .collect();
            (name.clone(), Value::Array(entries))
        })
        .collect();
    json!({ "inputs": inputs_to_json(facets.inputs()), "dependencies": dependencies })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Results;

    #[tokio::test]
    async fn test_reports_start_and_end_of_each_execution() {
        let reporter = MainLogicExecReporter::new();
        let definition = LogicDefinition::compute("hello:logic", ["name"], |facets| {
            Ok(json!(format!("hello {}", facets.value("name").and_then(Value::as_str).unwrap_or("?"))))
        })
        .with_tag("owner", "tests");

        let decorated = reporter.decorate(definition.logic(), &definition);
        let mut deps = BTreeMap::new();
        deps.insert("friends".to_string(), Results::failure(NodeError::logic("down")));
        let result = decorated(Facets::new(Inputs::from([("name", json!("Bob"))]), deps)).await;
        assert_eq!(result, Ok(json!("hello Bob")));

        let report = reporter.snapshot();
        assert_eq!(report.executions.len(), 1);
        assert_eq!(report.completed(), 1);
        let execution = &report.executions[0];
        assert_eq!(execution.logic_id, "hello:logic");
        assert_eq!(execution.tags.get("owner").map(String::as_str), Some("tests"));
        assert_eq!(execution.inputs["inputs"]["name"], json!("Bob"));
        assert_eq!(execution.inputs["dependencies"]["friends"][0]["value"]["error"], json!("down"));
        assert_eq!(execution.outcome, Some(json!({ "value": "hello Bob" })));
    }

    #[tokio::test]
    async fn test_failed_logic_is_reported_as_error() {
        let reporter = MainLogicExecReporter::new();
        let definition =
            LogicDefinition::compute("boom", Vec::<String>::new(), |_| Err(NodeError::logic("boom")));
        let decorated = reporter.decorate(definition.logic(), &definition);

        assert!(decorated(Facets::default()).await.is_err());
        let json = reporter.to_json().unwrap();
        assert!(json.contains("\"error\": \"boom\""));
    }
}
