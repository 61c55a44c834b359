// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Diagnostics sinks for the laminate commit loop.
//!
//! This crate provides [`TraceSink`](laminate_core::trace::TraceSink)
//! implementations for development:
//!
//! - [`pretty::PrettyPrintSink`]: human-readable one-line-per-event output.
//! - [`tracing_sink::TracingSink`]: forwards events to the `tracing` log at
//!   `trace` level, with cycle summaries at `debug`.

pub mod pretty;
pub mod tracing_sink;
