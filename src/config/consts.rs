// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Instance id used when a config does not name one. Prefixes every root request id.
pub const DEFAULT_INSTANCE_ID: &str = "graphwood";
/// How many executors may share one pooled command-queue runtime.
pub const DEFAULT_MAX_LEASES_PER_ITEM: usize = 8;
