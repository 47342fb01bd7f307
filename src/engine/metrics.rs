// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the command loop. Readable from any thread.
#[derive(Debug, Default)]
pub struct ExecutorMetrics {
    commands_queued: AtomicU64,
    queue_bypassed: AtomicU64,
    input_batches: AtomicU64,
    main_logic_invocations: AtomicU64,
    cache_hits: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Commands that went through the queue.
    pub commands_queued: u64,
    /// Commands run inline under depth ordering.
    pub queue_bypassed: u64,
    pub input_batches: u64,
    pub main_logic_invocations: u64,
    pub cache_hits: u64,
}

impl ExecutorMetrics {
    pub(crate) fn command_queued(&self) {
        self.commands_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn queue_bypassed(&self) {
        self.queue_bypassed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn input_batch(&self) {
        self.input_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn main_logic_invoked(&self) {
        self.main_logic_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            commands_queued: self.commands_queued.load(Ordering::Relaxed),
            queue_bypassed: self.queue_bypassed.load(Ordering::Relaxed),
            input_batches: self.input_batches.load(Ordering::Relaxed),
            main_logic_invocations: self.main_logic_invocations.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }
}
