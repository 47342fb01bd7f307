// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Pool of shareable items handed out as leases.
//!
//! Each pooled item may be leased up to `max_leases_per_item` times at once. A lease request
//! takes the least-leased item that still has room, creating a new item when none has. Leases
//! are released exactly once, either explicitly or when dropped.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::observability::messages::engine::QueueLeaseReleased;
use crate::observability::messages::StructuredLog;

type Factory<T> = Arc<dyn Fn() -> T + Send + Sync>;

struct PooledItem<T> {
    id: usize,
    item: Arc<T>,
    leases: usize,
}

struct PoolState<T> {
    items: Vec<PooledItem<T>>,
    next_id: usize,
}

fn lock<T>(state: &Mutex<PoolState<T>>) -> MutexGuard<'_, PoolState<T>> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct LeasePool<T> {
    state: Arc<Mutex<PoolState<T>>>,
    factory: Factory<T>,
    max_leases_per_item: usize,
}

impl<T> LeasePool<T> {
    pub fn new<F>(max_leases_per_item: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(PoolState {
                items: Vec::new(),
                next_id: 0,
            })),
            factory: Arc::new(factory),
            max_leases_per_item: max_leases_per_item.max(1),
        }
    }

    pub fn lease(&self) -> Lease<T> {
        let mut state = lock(&self.state);
        let max = self.max_leases_per_item;
        let reusable = state
            .items
            .iter()
            .enumerate()
            .filter(|(_, pooled)| pooled.leases < max)
            .min_by_key(|(_, pooled)| pooled.leases)
            .map(|(index, _)| index);

        let (item_id, item) = match reusable {
            Some(index) => {
                let pooled = &mut state.items[index];
                pooled.leases += 1;
                (pooled.id, pooled.item.clone())
            }
            None => {
                let id = state.next_id;
                state.next_id += 1;
                let item = Arc::new((self.factory)());
                state.items.push(PooledItem {
                    id,
                    item: item.clone(),
                    leases: 1,
                });
                (id, item)
            }
        };

        Lease {
            item,
            item_id,
            pool: Arc::downgrade(&self.state),
            released: false,
        }
    }

    /// Number of leases currently outstanding across all items.
    pub fn active_leases(&self) -> usize {
        lock(&self.state).items.iter().map(|pooled| pooled.leases).sum()
    }

    pub fn item_count(&self) -> usize {
        lock(&self.state).items.len()
    }
}

impl<T> Clone for LeasePool<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            factory: self.factory.clone(),
            max_leases_per_item: self.max_leases_per_item,
        }
    }
}

pub struct Lease<T> {
    item: Arc<T>,
    item_id: usize,
    pool: Weak<Mutex<PoolState<T>>>,
    released: bool,
}

impl<T> Lease<T> {
    pub fn get(&self) -> &T {
        &self.item
    }

    pub fn item_id(&self) -> usize {
        self.item_id
    }

    /// Returns the lease to its pool. Later calls, and the eventual drop, do nothing.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let Some(state) = self.pool.upgrade() else {
            return;
        };
        let mut state = lock(&state);
        if let Some(pooled) = state.items.iter_mut().find(|p| p.id == self.item_id) {
            pooled.leases = pooled.leases.saturating_sub(1);
            QueueLeaseReleased {
                item_id: self.item_id,
                remaining_leases: pooled.leases,
            }
            .log();
        }
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        self.release();
    }
}
