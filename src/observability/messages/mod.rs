// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for the human-readable line and
//! [`StructuredLog`] to emit the event with its fields at the right level.
//!
//! # Organization
//!
//! * `engine` - Executor lifecycle, flush/close and command-queue events
//! * `node` - Per-node request processing: resolvers, fan-out, skips, logic and decorator flush
//! * `validation` - Graph validation results
//!
//! # Usage Pattern
//!
//! ```rust
//! use the_graphwood::observability::messages::engine::ExecutorStarted;
//! use the_graphwood::observability::messages::StructuredLog;
//!
//! let msg = ExecutorStarted {
//!     instance_id: "greeter",
//!     command_order: "breadth",
//!     dispatch: "granular",
//! };
//!
//! msg.log();
//! ```

use tracing::Span;

pub mod engine;
pub mod node;
pub mod validation;

/// A log message that knows its own level and structured fields.
pub trait StructuredLog {
    /// Emits the message as a tracing event.
    fn log(&self);

    /// Creates a span carrying the message's fields.
    fn span(&self, name: &str) -> Span;
}
