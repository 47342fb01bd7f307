// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod config;        // executor config + loader
pub mod data;          // inputs, results, facets
pub mod decoration;    // logic decorators
pub mod engine;        // command-queue executor
pub mod errors;        // error handling
pub mod graph;         // node definitions and identities
pub mod logics;        // stub logics
pub mod observability;
pub mod traits;        // unified abstractions
pub mod utils;
