// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod execution;
mod loader;

pub mod consts;

pub use execution::NodeExecutionConfig;
pub use loader::{load_config, CommandOrder, DispatchStrategy, ExecutorConfig, QueuePoolConfig};
