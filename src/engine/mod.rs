// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod commands;
mod node;
pub mod executor;
pub mod metrics;
#[cfg(test)]
mod integration_tests;

pub use executor::{NodeExecutor, QueueRuntime, RequestHandle};
pub use metrics::{ExecutorMetrics, MetricsSnapshot};
