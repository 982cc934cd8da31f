//! The resolution procedure
//!
//! Decides how a value produced by a handler (or passed to `resolve`) settles
//! a target deferred value: a deferred value of this runtime is adopted
//! directly, any other object-like value with a callable `then` member is
//! treated as a foreign thenable and adopted through that member, and
//! everything else fulfills the target as is.

use super::promise::Deferred;
use super::value::Value;
use crate::error::{Error, Result};
use std::cell::Cell;
use std::rc::Rc;
use tracing::{debug, trace};

/// Settle `target` from `x`, adopting `x`'s eventual outcome if it is thenable.
///
/// Adoption flattens nested thenables: whatever a thenable fulfills with is
/// fed back through this procedure.
pub fn resolve_promise(x: Value, target: &Deferred) {
    if let Value::Deferred(source) = &x {
        if source.ptr_eq(target) {
            debug!(deferred = target.id(), "chaining cycle detected");
            target.reject_with(Error::cycle_detected(target.id()).into_reason());
        } else {
            adopt_deferred(source, target);
        }
        return;
    }

    match read_then(&x) {
        Ok(Some(then)) => call_then(x, then, target),
        Ok(None) => target.fulfill(x),
        Err(err) => {
            debug!(deferred = target.id(), error = %err, "reading then raised");
            target.reject_with(err.into_reason());
        }
    }
}

/// Read the `then` member of an object-like value, exactly once.
///
/// Returns `None` when the value is not a thenable: it is not object-like or
/// its `then` member is not callable.
pub(crate) fn read_then(x: &Value) -> Result<Option<Value>> {
    if !x.is_object_like() {
        return Ok(None);
    }
    let then = x.get("then")?;
    Ok(then.is_callable().then_some(then))
}

/// Adopt the outcome of a deferred value of this runtime without going
/// through its dynamic `then` member.
fn adopt_deferred(source: &Deferred, target: &Deferred) {
    trace!(source = source.id(), target = target.id(), "adopting deferred");
    let fulfill_target = target.clone();
    let reject_target = target.clone();
    source.subscribe(
        Box::new(move |value: Value| resolve_promise(value, &fulfill_target)),
        Box::new(move |reason: Value| reject_target.reject_with(reason)),
    );
}

/// Invoke a foreign thenable's `then` with `x` as the receiver.
///
/// Only the first of the success callback, the failure callback, or an error
/// raised by the call itself has any effect.
pub(crate) fn call_then(x: Value, then: Value, target: &Deferred) {
    let called = Rc::new(Cell::new(false));

    let resolve_called = called.clone();
    let resolve_target = target.clone();
    let on_fulfilled = Value::new_function("resolvePromise", move |_, args| {
        if !resolve_called.replace(true) {
            let y = args.first().cloned().unwrap_or(Value::Undefined);
            resolve_promise(y, &resolve_target);
        }
        Ok(Value::Undefined)
    });

    let reject_called = called.clone();
    let reject_target = target.clone();
    let on_rejected = Value::new_function("rejectPromise", move |_, args| {
        if !reject_called.replace(true) {
            let r = args.first().cloned().unwrap_or(Value::Undefined);
            reject_target.reject_with(r);
        }
        Ok(Value::Undefined)
    });

    if let Err(err) = then.call(&x, &[on_fulfilled, on_rejected]) {
        if called.replace(true) {
            trace!(deferred = target.id(), error = %err, "ignoring error raised after thenable settled");
        } else {
            debug!(deferred = target.id(), error = %err, "thenable raised");
            target.reject_with(err.into_reason());
        }
    }
}
