// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Plane allocation and atomic-commit scheduling for hardware-composited
//! layers.
//!
//! `laminate_core` maps independently rendered surfaces onto dedicated
//! hardware scan-out planes and drives the per-frame atomic commit that puts
//! every layer's latest buffer on screen in one transaction. It is hardware
//! independent: everything that touches the display controller goes through
//! the [`Device`](device::Device) trait, which backend crates implement.
//!
//! # Architecture
//!
//! ```text
//!   Device (backend)
//!       │ discovered planes
//!       ▼
//!   PlaneRegistry::from_discovery() ──► apply_stacking_order()
//!       │
//!       ▼
//!   PlaneRegistry::allocate() ──► Surface ──► RenderWorker (one thread each)
//!       │                            │              │ acquire_back / present
//!       ▼                            ▼              ▼
//!   CommitScheduler::run_cycle() ◄── BufferChain ◄──┘
//!       │ lock_front ─► FramebufferCache ─► CommitBatch
//!       ▼
//!   test commit ─► commit (non-blocking) ─► wait for completion ─► release
//! ```
//!
//! **[`plane`]**: Plane discovery results, stacking order, and the first-fit
//! surface allocator.
//!
//! **[`chain`]**: Per-surface buffer chain shared by one render worker
//! (producer) and the scheduler (consumer).
//!
//! **[`framebuffer`]**: Memoized buffer to framebuffer registration with
//! explicit release.
//!
//! **[`scheduler`]**: The collect, resolve, stage, validate, submit, await,
//! release state machine.
//!
//! **[`worker`]**: The [`ContentProducer`](worker::ContentProducer)
//! capability and the render thread loop.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! commit-loop instrumentation, with a zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one
//!   branch per call site).
//! - `testing` (disabled by default): Exposes [`testing::FakeDevice`], an
//!   in-memory device for downstream test suites.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod cancel;
pub mod chain;
pub mod config;
pub mod device;
pub mod error;
pub mod framebuffer;
pub mod geometry;
pub mod id;
pub mod output;
pub mod plane;
pub mod scheduler;
pub mod surface;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod time;
pub mod timing;
pub mod trace;
pub mod worker;
