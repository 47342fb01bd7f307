// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Message types follow a struct-based pattern with a `Display` implementation and the
//! [`messages::StructuredLog`] trait, so call sites never carry ad-hoc strings.
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::engine` - Executor lifecycle, flush/close and command validation
//! * `messages::node` - Resolver rounds, fan-out, skips, logic invocation, decorator flush
//! * `messages::validation` - Graph validation and configuration loading
//!
//! # Usage
//!
//! ```rust
//! use the_graphwood::observability::messages::node::RequestSkipped;
//! use the_graphwood::observability::messages::StructuredLog;
//!
//! RequestSkipped {
//!     node_id: "user_service",
//!     request_id: "greeter:1.user_info[0]",
//!     reason: "no user",
//! }
//! .log();
//! ```

pub mod messages;
