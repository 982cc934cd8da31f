//! Quicksilver Promise: Promise/A+ deferred values for embedders
//!
//! A [`Deferred`] represents a value that is not available yet. It settles
//! exactly once, to fulfilled or rejected, and notifies any number of
//! subscribers in subscription order, whether they subscribe before or after
//! settlement. Values returned by handlers go through the resolution
//! procedure, which adopts the outcome of deferred values and of foreign
//! thenables (any object with a callable `then` member).
//!
//! Handlers never run inside the call that registers or settles them. Every
//! handler is dispatched through a [`Schedule`] implementation; the bundled
//! [`EventLoop`] keeps a FIFO task queue that the embedder drains.
//!
//! # Quick Start
//!
//! ```
//! use quicksilver_promise::{all, Deferred, EventLoop, Value};
//!
//! let mut event_loop = EventLoop::new();
//! let scheduler = event_loop.scheduler();
//!
//! let combined = all(
//!     &scheduler,
//!     vec![Value::from(1), Value::Deferred(Deferred::resolve(&scheduler, 2)), Value::from(3)],
//! );
//! event_loop.run_to_completion();
//!
//! let values = combined.value().and_then(|v| v.as_array()).unwrap_or_default();
//! assert_eq!(values, vec![Value::from(1), Value::from(2), Value::from(3)]);
//! ```
//!
//! # Module Overview
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Core** | [`runtime::promise`], [`runtime::resolution`], [`runtime::combinators`] |
//! | **Values** | [`runtime::value`] |
//! | **Scheduling** | [`event_loop`] |
//! | **Errors** | [`Error`], [`ErrorKind`] |
// Clippy configuration for the Quicksilver promise runtime.
//
// - type_complexity: handler and continuation types are boxed closures over Value
// - new_without_default: some types have required initialization logic
#![allow(clippy::type_complexity)]
#![allow(clippy::new_without_default)]

pub mod event_loop;
pub mod prelude;
pub mod runtime;

mod error;

pub use error::{messages, Error, ErrorKind, Result};
pub use event_loop::{EventLoop, EventLoopConfig, RunResult, Schedule, Scheduler, Task, TaskQueue};
pub use runtime::{all, callback, finally_callback, Deferred, DeferredState, Value};

/// Quicksilver Promise version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
