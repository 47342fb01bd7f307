// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod stub;

pub use stub::{ConstantLogic, CountingLogic, DelayedLogic, EchoLogic, FailingLogic, PanickingLogic};
