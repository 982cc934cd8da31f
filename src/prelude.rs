//! Prelude module for convenient imports
//!
//! This module provides the most commonly used types and functions for working
//! with deferred values. Import everything from this module for quick access:
//!
//! ```
//! use quicksilver_promise::prelude::*;
//!
//! let mut event_loop = EventLoop::new();
//! let scheduler = event_loop.scheduler();
//! let doubled = Deferred::resolve(&scheduler, 21)
//!     .then(Some(callback(|v| Ok(Value::Number(v.as_number().unwrap_or(0.0) * 2.0)))), None);
//! event_loop.run_to_completion();
//! assert_eq!(doubled.value(), Some(Value::from(42)));
//! ```

// Deferred values
pub use crate::runtime::{
    all, callback, finally_callback, Callback, Deferred, DeferredState, FinallyCallback,
    RejectFn, ResolveFn,
};

// Values
pub use crate::runtime::{ObjectKind, Value};

// Scheduling
pub use crate::event_loop::{EventLoop, EventLoopConfig, Schedule, Scheduler};

// Error handling
pub use crate::error::{Error, ErrorKind, Result};
