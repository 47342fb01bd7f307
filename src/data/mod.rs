// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Value model shared by resolvers, node logic and the executor.

mod inputs;
mod results;

pub use inputs::{Inputs, ValueOrError};
pub use results::{Facets, NodeResponse, Results};

/// Terminal state of one request as seen by whoever waits on it.
///
/// `Ok` carries the node's response, which may itself hold a business failure.
/// `Err` is the exceptional path: skips and protocol violations.
pub type RequestOutcome = Result<NodeResponse, crate::errors::NodeError>;
