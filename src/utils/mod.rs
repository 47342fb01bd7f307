// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod lease_pool;

pub use lease_pool::{Lease, LeasePool};
