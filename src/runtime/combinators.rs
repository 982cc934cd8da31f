//! Promise combinators
//!
//! `all` aggregates an ordered sequence of plain values and thenables into a
//! single deferred value.

use super::promise::Deferred;
use super::resolution::{call_then, read_then};
use super::value::Value;
use crate::event_loop::Scheduler;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::trace;

/// Fulfill with every item's value, in input order, once all items have
/// fulfilled; reject with the first rejection observed.
///
/// Plain values are stored at their own position immediately. Foreign
/// thenables are adopted through the resolution procedure first, so a
/// thenable that calls back more than once is only counted once. An empty
/// input fulfills immediately with an empty array.
pub fn all(scheduler: &Scheduler, items: Vec<Value>) -> Deferred {
    let adopt_scheduler = scheduler.clone();
    Deferred::new(scheduler, move |resolve, reject| {
        let total = items.len();
        if total == 0 {
            resolve(Value::new_array(Vec::new()));
            return Ok(());
        }

        let results = Rc::new(RefCell::new(vec![Value::Undefined; total]));
        let fulfilled = Rc::new(Cell::new(0usize));
        let resolve_all = resolve.clone();
        let record: Rc<dyn Fn(usize, Value)> = Rc::new(move |index: usize, value: Value| {
            results.borrow_mut()[index] = value;
            fulfilled.set(fulfilled.get() + 1);
            if fulfilled.get() == total {
                let values = std::mem::take(&mut *results.borrow_mut());
                resolve_all(Value::new_array(values));
            }
        });

        for (index, item) in items.into_iter().enumerate() {
            let source = match item {
                Value::Deferred(deferred) => deferred,
                other => match read_then(&other)? {
                    Some(then) => {
                        let adopted = Deferred::pending(&adopt_scheduler);
                        call_then(other, then, &adopted);
                        adopted
                    }
                    None => {
                        record(index, other);
                        continue;
                    }
                },
            };

            trace!(index, source = source.id(), "all subscribed");
            let record = record.clone();
            let reject = reject.clone();
            source.subscribe(
                Box::new(move |value: Value| record(index, value)),
                Box::new(move |reason: Value| reject(reason)),
            );
        }
        Ok(())
    })
}
