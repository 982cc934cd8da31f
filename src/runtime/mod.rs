//! Runtime for Quicksilver deferred values
//!
//! This module provides the value model, the deferred value state machine,
//! the resolution procedure and the combinators built on top of them.

pub mod combinators;
pub mod promise;
pub mod resolution;
pub mod value;

pub use combinators::all;
pub use promise::{
    callback, finally_callback, Callback, Deferred, DeferredState, FinallyCallback, RejectFn,
    ResolveFn,
};
pub use resolution::resolve_promise;
pub use value::{Getter, NativeFn, Object, ObjectKind, Property, Value};
