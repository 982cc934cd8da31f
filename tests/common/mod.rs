//! Shared test helpers for integration tests

use quicksilver_promise::{Deferred, EventLoop, Result, Scheduler, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Install a log subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A fresh event loop and its scheduler
pub fn setup() -> (EventLoop, Scheduler) {
    init_tracing();
    let event_loop = EventLoop::new();
    let scheduler = event_loop.scheduler();
    (event_loop, scheduler)
}

/// Build a foreign thenable: a plain object whose `then` is the given function
#[allow(dead_code)]
pub fn thenable<F>(then: F) -> Value
where
    F: Fn(&Value, &[Value]) -> Result<Value> + 'static,
{
    let obj = Value::new_object();
    obj.set_property("then", Value::new_function("then", then));
    obj
}

/// Call the n-th callback a thenable received
#[allow(dead_code)]
pub fn invoke(args: &[Value], n: usize, value: Value) -> Result<Value> {
    args[n].call(&Value::Undefined, &[value])
}

/// A shared event log
#[allow(dead_code)]
pub fn event_log() -> Rc<RefCell<Vec<String>>> {
    Rc::new(RefCell::new(Vec::new()))
}

/// The fulfillment value of an array-valued deferred
#[allow(dead_code)]
pub fn array_value(deferred: &Deferred) -> Option<Vec<Value>> {
    deferred.value().and_then(|v| v.as_array())
}
