// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::data::Facets;
use crate::errors::NodeError;
use crate::traits::NodeLogic;

/// Returns the value of one input, or `null` when it has none.
pub struct EchoLogic {
    pub input: String,
}

impl EchoLogic {
    pub fn new(input: impl Into<String>) -> Self {
        Self { input: input.into() }
    }
}

#[async_trait]
impl NodeLogic for EchoLogic {
    async fn execute(&self, facets: Facets) -> Result<Value, NodeError> {
        Ok(facets.value(&self.input).cloned().unwrap_or(Value::Null))
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}

/// Always returns the same value.
pub struct ConstantLogic {
    pub value: Value,
}

impl ConstantLogic {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

#[async_trait]
impl NodeLogic for ConstantLogic {
    async fn execute(&self, _facets: Facets) -> Result<Value, NodeError> {
        Ok(self.value.clone())
    }

    fn name(&self) -> &'static str {
        "constant"
    }
}

/// A logic that always fails, for failure scenarios.
pub struct FailingLogic {
    pub message: String,
}

impl FailingLogic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl NodeLogic for FailingLogic {
    async fn execute(&self, _facets: Facets) -> Result<Value, NodeError> {
        Err(NodeError::logic(self.message.clone()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

pub struct PanickingLogic;

#[async_trait]
impl NodeLogic for PanickingLogic {
    async fn execute(&self, _facets: Facets) -> Result<Value, NodeError> {
        panic!("panicking logic invoked")
    }

    fn name(&self) -> &'static str {
        "panicking"
    }
}

/// Wraps another logic and counts how often it was invoked.
pub struct CountingLogic {
    inner: Arc<dyn NodeLogic>,
    invocations: Arc<AtomicUsize>,
}

impl CountingLogic {
    pub fn new(inner: Arc<dyn NodeLogic>) -> Self {
        Self {
            inner,
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A shared view of the counter, usable after the logic moved into a definition.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.invocations.clone()
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeLogic for CountingLogic {
    async fn execute(&self, facets: Facets) -> Result<Value, NodeError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(facets).await
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Sleeps before delegating, to keep a request in flight.
pub struct DelayedLogic {
    inner: Arc<dyn NodeLogic>,
    delay: Duration,
}

impl DelayedLogic {
    pub fn new(inner: Arc<dyn NodeLogic>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl NodeLogic for DelayedLogic {
    async fn execute(&self, facets: Facets) -> Result<Value, NodeError> {
        tokio::time::sleep(self.delay).await;
        self.inner.execute(facets).await
    }

    fn name(&self) -> &'static str {
        "delayed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Inputs;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn facets(inputs: Inputs) -> Facets {
        Facets::new(inputs, BTreeMap::new())
    }

    #[tokio::test]
    async fn test_echo_returns_input_or_null() {
        let echo = EchoLogic::new("name");
        let value = echo.execute(facets(Inputs::from([("name", json!("ada"))]))).await;
        assert_eq!(value, Ok(json!("ada")));

        let missing = echo.execute(facets(Inputs::empty())).await;
        assert_eq!(missing, Ok(Value::Null));
    }

    #[tokio::test]
    async fn test_failing_logic_reports_its_message() {
        let result = FailingLogic::new("boom").execute(facets(Inputs::empty())).await;
        assert_eq!(result, Err(NodeError::logic("boom")));
    }

    #[tokio::test]
    async fn test_counting_logic_counts_every_call() {
        let counting = CountingLogic::new(Arc::new(ConstantLogic::new(json!(1))));
        let counter = counting.counter();
        counting.execute(facets(Inputs::empty())).await.unwrap();
        counting.execute(facets(Inputs::empty())).await.unwrap();

        assert_eq!(counting.invocations(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_delayed_logic_waits_before_answering() {
        let delayed = DelayedLogic::new(Arc::new(ConstantLogic::new(json!("late"))), Duration::from_millis(20));
        let started = tokio::time::Instant::now();
        let value = delayed.execute(facets(Inputs::empty())).await;

        assert_eq!(value, Ok(json!("late")));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
