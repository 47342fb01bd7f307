// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod executor;
pub mod logic;

pub use executor::GraphExecutor;
pub use logic::NodeLogic;
