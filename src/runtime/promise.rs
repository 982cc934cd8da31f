//! Promise Implementation
//!
//! This module provides the Promise/A+ settlement state machine, [`Deferred`].
//! A deferred value starts `Pending` and settles exactly once, to `Fulfilled`
//! with a value or `Rejected` with a reason. Subscriptions made with
//! [`Deferred::then`] are run through the [`Scheduler`] it was created with,
//! never inside the call that registers or settles them.

use super::resolution::resolve_promise;
use super::value::Value;
use crate::error::{Error, Result};
use crate::event_loop::Scheduler;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

thread_local! {
    /// ID counter for deferred value tracking; deferred values never leave their thread
    static NEXT_DEFERRED_ID: Cell<u64> = const { Cell::new(1) };
}

fn next_deferred_id() -> u64 {
    NEXT_DEFERRED_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    })
}

/// A fulfillment or rejection handler passed to [`Deferred::then`].
///
/// Returning `Err` rejects the derived deferred value with the error's reason.
pub type Callback = Rc<dyn Fn(Value) -> Result<Value>>;

/// The callback passed to [`Deferred::finally`]
pub type FinallyCallback = Rc<dyn Fn() -> Result<Value>>;

/// The `resolve` capability handed to an initializer
pub type ResolveFn = Rc<dyn Fn(Value)>;

/// The `reject` capability handed to an initializer
pub type RejectFn = Rc<dyn Fn(Value)>;

/// A queued reaction, invoked with the outcome at settlement
pub(crate) type Continuation = Box<dyn FnOnce(Value)>;

/// Wrap a closure as a [`Callback`]
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(Value) -> Result<Value> + 'static,
{
    Rc::new(f)
}

/// Wrap a closure as a [`FinallyCallback`]
pub fn finally_callback<F>(f: F) -> FinallyCallback
where
    F: Fn() -> Result<Value> + 'static,
{
    Rc::new(f)
}

/// Settlement state
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DeferredState {
    /// Not settled yet
    Pending,
    /// Settled with a value
    Fulfilled,
    /// Settled with a reason
    Rejected,
}

struct DeferredInner {
    id: u64,
    state: DeferredState,
    /// Set once, when fulfilled
    value: Option<Value>,
    /// Set once, when rejected
    reason: Option<Value>,
    /// Reactions waiting for fulfillment, in subscription order
    fulfill_reactions: Vec<Continuation>,
    /// Reactions waiting for rejection, in subscription order
    reject_reactions: Vec<Continuation>,
}

/// A deferred value.
///
/// `Deferred` is a cheap handle; clones refer to the same state machine and
/// compare equal with [`Deferred::ptr_eq`].
#[derive(Clone)]
pub struct Deferred {
    inner: Rc<RefCell<DeferredInner>>,
    scheduler: Scheduler,
}

impl Deferred {
    /// Create a deferred value and run `initializer` synchronously.
    ///
    /// The initializer receives the `resolve` and `reject` capabilities. The
    /// first call that settles the deferred value wins; an `Err` returned by
    /// the initializer rejects it unless it has already settled.
    pub fn new<F>(scheduler: &Scheduler, initializer: F) -> Self
    where
        F: FnOnce(&ResolveFn, &RejectFn) -> Result<()>,
    {
        let deferred = Self::pending(scheduler);
        let (resolve, reject) = deferred.resolving_functions();
        if let Err(err) = initializer(&resolve, &reject) {
            debug!(deferred = deferred.id(), error = %err, "initializer raised");
            reject(err.into_reason());
        }
        deferred
    }

    /// A deferred value settled through the resolution procedure with `value`.
    /// Thenables are adopted; anything else fulfills.
    pub fn resolve(scheduler: &Scheduler, value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::new(scheduler, move |resolve, _| {
            resolve(value);
            Ok(())
        })
    }

    /// A deferred value rejected with `reason`
    pub fn reject(scheduler: &Scheduler, reason: impl Into<Value>) -> Self {
        let reason = reason.into();
        Self::new(scheduler, move |_, reject| {
            reject(reason);
            Ok(())
        })
    }

    /// A pending deferred value together with its resolving functions
    pub fn with_resolvers(scheduler: &Scheduler) -> (Self, ResolveFn, RejectFn) {
        let deferred = Self::pending(scheduler);
        let (resolve, reject) = deferred.resolving_functions();
        (deferred, resolve, reject)
    }

    /// A pending deferred value with no resolving functions attached
    pub(crate) fn pending(scheduler: &Scheduler) -> Self {
        let id = next_deferred_id();
        trace!(deferred = id, "deferred created");
        Self {
            inner: Rc::new(RefCell::new(DeferredInner {
                id,
                state: DeferredState::Pending,
                value: None,
                reason: None,
                fulfill_reactions: Vec::new(),
                reject_reactions: Vec::new(),
            })),
            scheduler: scheduler.clone(),
        }
    }

    /// The `resolve`/`reject` capabilities. Both are no-ops once the deferred
    /// value has settled; while it is pending (including while it follows an
    /// adopted thenable) the first call that settles it wins.
    fn resolving_functions(&self) -> (ResolveFn, RejectFn) {
        let target = self.clone();
        let resolve: ResolveFn = Rc::new(move |value: Value| {
            if target.is_pending() {
                resolve_promise(value, &target);
            }
        });
        let target = self.clone();
        let reject: RejectFn = Rc::new(move |reason: Value| {
            target.reject_with(reason);
        });
        (resolve, reject)
    }

    /// Transition to `Fulfilled`; no-op unless pending
    pub(crate) fn fulfill(&self, value: Value) {
        self.settle(DeferredState::Fulfilled, value);
    }

    /// Transition to `Rejected`; no-op unless pending
    pub(crate) fn reject_with(&self, reason: Value) {
        self.settle(DeferredState::Rejected, reason);
    }

    fn settle(&self, state: DeferredState, outcome: Value) {
        let (id, reactions) = {
            let mut inner = self.inner.borrow_mut();
            if inner.state != DeferredState::Pending {
                return;
            }
            inner.state = state;
            let fulfill_reactions = std::mem::take(&mut inner.fulfill_reactions);
            let reject_reactions = std::mem::take(&mut inner.reject_reactions);
            let reactions = if state == DeferredState::Fulfilled {
                inner.value = Some(outcome.clone());
                fulfill_reactions
            } else {
                inner.reason = Some(outcome.clone());
                reject_reactions
            };
            (inner.id, reactions)
        };

        trace!(deferred = id, state = ?state, reactions = reactions.len(), "deferred settled");
        for reaction in reactions {
            reaction(outcome.clone());
        }
    }

    /// Register reactions. Each runs as its own scheduled task: immediately
    /// scheduled when already settled, scheduled at settlement otherwise.
    pub(crate) fn subscribe(&self, on_fulfilled: Continuation, on_rejected: Continuation) {
        let mut inner = self.inner.borrow_mut();
        match inner.state {
            DeferredState::Pending => {
                let scheduler = self.scheduler.clone();
                inner.fulfill_reactions.push(Box::new(move |value: Value| {
                    scheduler.schedule(Box::new(move || on_fulfilled(value)));
                }));
                let scheduler = self.scheduler.clone();
                inner.reject_reactions.push(Box::new(move |reason: Value| {
                    scheduler.schedule(Box::new(move || on_rejected(reason)));
                }));
            }
            DeferredState::Fulfilled => {
                let value = inner.value.clone().unwrap_or(Value::Undefined);
                drop(inner);
                self.scheduler.schedule(Box::new(move || on_fulfilled(value)));
            }
            DeferredState::Rejected => {
                let reason = inner.reason.clone().unwrap_or(Value::Undefined);
                drop(inner);
                self.scheduler.schedule(Box::new(move || on_rejected(reason)));
            }
        }
    }

    /// Subscribe to settlement and derive a new deferred value.
    ///
    /// A missing `on_fulfilled` passes the value through; a missing
    /// `on_rejected` rethrows the reason. The derived value is settled by
    /// running the handler's result through the resolution procedure.
    pub fn then(&self, on_fulfilled: Option<Callback>, on_rejected: Option<Callback>) -> Deferred {
        let on_fulfilled = on_fulfilled.unwrap_or_else(identity);
        let on_rejected = on_rejected.unwrap_or_else(thrower);
        let promise2 = Deferred::pending(&self.scheduler);
        trace!(source = self.id(), derived = promise2.id(), "then registered");

        let target = promise2.clone();
        let fulfilled: Continuation = Box::new(move |value: Value| {
            run_handler(&on_fulfilled, value, &target);
        });
        let target = promise2.clone();
        let rejected: Continuation = Box::new(move |reason: Value| {
            run_handler(&on_rejected, reason, &target);
        });
        self.subscribe(fulfilled, rejected);
        promise2
    }

    /// The dynamic form of [`Deferred::then`]: non-callable arguments are
    /// treated as missing handlers.
    pub fn then_value(&self, on_fulfilled: &Value, on_rejected: &Value) -> Deferred {
        self.then(value_callback(on_fulfilled), value_callback(on_rejected))
    }

    /// Shorthand for `then(None, Some(on_rejected))`
    pub fn catch(&self, on_rejected: Callback) -> Deferred {
        self.then(None, Some(on_rejected))
    }

    /// Run `on_finally` on either outcome, then settle like `self`.
    ///
    /// A thenable returned by the callback is waited for. If the callback
    /// raises, or returns a thenable that rejects, that rejection replaces the
    /// original outcome.
    pub fn finally(&self, on_finally: FinallyCallback) -> Deferred {
        let scheduler = self.scheduler.clone();
        let on_settled = on_finally.clone();
        let on_fulfilled = callback(move |value: Value| {
            let waited = Deferred::resolve(&scheduler, on_settled()?);
            Ok(Value::Deferred(waited.then(
                Some(callback(move |_| Ok(value.clone()))),
                None,
            )))
        });

        let scheduler = self.scheduler.clone();
        let on_rejected = callback(move |reason: Value| {
            let waited = Deferred::resolve(&scheduler, on_finally()?);
            Ok(Value::Deferred(waited.then(
                Some(callback(move |_| Err(Error::Thrown(reason.clone())))),
                None,
            )))
        });

        self.then(Some(on_fulfilled), Some(on_rejected))
    }

    /// Members exposed when a deferred value is read as a [`Value`], so that
    /// code speaking only the thenable protocol can subscribe to it.
    pub(crate) fn method(&self, name: &str) -> Option<Value> {
        let this = self.clone();
        match name {
            "then" => Some(Value::new_function("then", move |_, args| {
                let on_fulfilled = args.first().cloned().unwrap_or(Value::Undefined);
                let on_rejected = args.get(1).cloned().unwrap_or(Value::Undefined);
                Ok(Value::Deferred(this.then_value(&on_fulfilled, &on_rejected)))
            })),
            "catch" => Some(Value::new_function("catch", move |_, args| {
                let on_rejected = args.first().cloned().unwrap_or(Value::Undefined);
                Ok(Value::Deferred(this.then_value(&Value::Undefined, &on_rejected)))
            })),
            "finally" => Some(Value::new_function("finally", move |_, args| {
                let on_finally = args.first().cloned().unwrap_or(Value::Undefined);
                if !on_finally.is_callable() {
                    return Ok(Value::Deferred(this.then(None, None)));
                }
                Ok(Value::Deferred(this.finally(finally_callback(move || {
                    on_finally.call(&Value::Undefined, &[])
                }))))
            })),
            _ => None,
        }
    }

    /// Process-unique id, for diagnostics
    pub fn id(&self) -> u64 {
        self.inner.borrow().id
    }

    /// Current state
    pub fn state(&self) -> DeferredState {
        self.inner.borrow().state
    }

    /// Check if not settled yet
    pub fn is_pending(&self) -> bool {
        self.state() == DeferredState::Pending
    }

    /// Check if fulfilled or rejected
    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// The fulfillment value, once fulfilled
    pub fn value(&self) -> Option<Value> {
        self.inner.borrow().value.clone()
    }

    /// The rejection reason, once rejected
    pub fn reason(&self) -> Option<Value> {
        self.inner.borrow().reason.clone()
    }

    /// Check if two handles refer to the same deferred value
    pub fn ptr_eq(&self, other: &Deferred) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The scheduler handlers are dispatched through
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

impl PartialEq for Deferred {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => write!(f, "[Deferred #{} {:?}]", inner.id, inner.state),
            Err(_) => write!(f, "[Deferred]"),
        }
    }
}

fn identity() -> Callback {
    callback(Ok)
}

fn thrower() -> Callback {
    callback(|reason| Err(Error::Thrown(reason)))
}

fn value_callback(handler: &Value) -> Option<Callback> {
    if !handler.is_callable() {
        return None;
    }
    let handler = handler.clone();
    Some(callback(move |argument: Value| {
        handler.call(&Value::Undefined, &[argument])
    }))
}

/// Run a handler and settle `promise2` from its result
fn run_handler(handler: &Callback, argument: Value, promise2: &Deferred) {
    match handler(argument) {
        Ok(x) => resolve_promise(x, promise2),
        Err(err) => {
            trace!(deferred = promise2.id(), error = %err, "handler raised");
            promise2.reject_with(err.into_reason());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoop;
    use std::cell::Cell;

    #[test]
    fn test_initializer_runs_synchronously() {
        let el = EventLoop::new();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let d = Deferred::new(&el.scheduler(), move |_, _| {
            flag.set(true);
            Ok(())
        });
        assert!(ran.get());
        assert!(d.is_pending());
    }

    #[test]
    fn test_resolve_plain_value_settles_immediately() {
        let el = EventLoop::new();
        let d = Deferred::resolve(&el.scheduler(), 42);
        assert_eq!(d.state(), DeferredState::Fulfilled);
        assert_eq!(d.value(), Some(Value::from(42)));
        assert_eq!(d.reason(), None);
    }

    #[test]
    fn test_reject_factory() {
        let el = EventLoop::new();
        let d = Deferred::reject(&el.scheduler(), "nope");
        assert_eq!(d.state(), DeferredState::Rejected);
        assert_eq!(d.reason(), Some(Value::from("nope")));
        assert_eq!(d.value(), None);
    }

    #[test]
    fn test_first_settlement_wins() {
        let el = EventLoop::new();
        let d = Deferred::new(&el.scheduler(), |resolve, reject| {
            resolve(Value::from(1));
            reject(Value::from("late"));
            resolve(Value::from(2));
            Err(Error::thrown("ignored"))
        });
        assert_eq!(d.state(), DeferredState::Fulfilled);
        assert_eq!(d.value(), Some(Value::from(1)));
    }

    #[test]
    fn test_initializer_error_rejects() {
        let el = EventLoop::new();
        let d = Deferred::new(&el.scheduler(), |_, _| Err(Error::type_error("bad input")));
        assert_eq!(d.state(), DeferredState::Rejected);
        let reason = d.reason().unwrap();
        assert_eq!(reason.error_name().as_deref(), Some("TypeError"));
    }

    #[test]
    fn test_then_returns_new_instance() {
        let el = EventLoop::new();
        let d = Deferred::resolve(&el.scheduler(), 1);
        let derived = d.then(None, None);
        assert!(!derived.ptr_eq(&d));
        assert_ne!(derived.id(), d.id());
    }

    #[test]
    fn test_handlers_never_run_inline() {
        let mut el = EventLoop::new();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let d = Deferred::resolve(&el.scheduler(), 1);
        let derived = d.then(
            Some(callback(move |v| {
                counter.set(counter.get() + 1);
                Ok(v)
            })),
            None,
        );
        assert_eq!(calls.get(), 0);
        assert!(derived.is_pending());

        el.run_to_completion();
        assert_eq!(calls.get(), 1);
        assert_eq!(derived.value(), Some(Value::from(1)));
    }

    #[test]
    fn test_pending_reactions_fire_in_subscription_order() {
        let mut el = EventLoop::new();
        let (d, resolve, _) = Deferred::with_resolvers(&el.scheduler());
        let order = Rc::new(RefCell::new(Vec::new()));
        for n in 0..4 {
            let order = order.clone();
            d.then(
                Some(callback(move |v| {
                    order.borrow_mut().push(n);
                    Ok(v)
                })),
                None,
            );
        }
        el.run_to_completion();
        assert!(order.borrow().is_empty());

        resolve(Value::from("go"));
        assert!(order.borrow().is_empty());
        el.run_to_completion();
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_only_matching_queue_drains() {
        let mut el = EventLoop::new();
        let (d, _, reject) = Deferred::with_resolvers(&el.scheduler());
        let fulfilled_calls = Rc::new(Cell::new(0));
        let counter = fulfilled_calls.clone();
        let derived = d.then(
            Some(callback(move |v| {
                counter.set(counter.get() + 1);
                Ok(v)
            })),
            Some(callback(|r| Ok(Value::String(format!("handled {}", r))))),
        );
        reject(Value::from("err"));
        el.run_to_completion();
        assert_eq!(fulfilled_calls.get(), 0);
        assert_eq!(derived.value(), Some(Value::from("handled err")));
    }

    #[test]
    fn test_handler_error_rejects_derived() {
        let mut el = EventLoop::new();
        let d = Deferred::resolve(&el.scheduler(), 1);
        let derived = d.then(Some(callback(|_| Err(Error::thrown("handler failed")))), None);
        el.run_to_completion();
        assert_eq!(derived.state(), DeferredState::Rejected);
        assert_eq!(derived.reason(), Some(Value::from("handler failed")));
    }

    #[test]
    fn test_catch_recovers() {
        let mut el = EventLoop::new();
        let d = Deferred::reject(&el.scheduler(), "boom");
        let recovered = d.catch(callback(|r| Ok(r)));
        el.run_to_completion();
        assert_eq!(recovered.state(), DeferredState::Fulfilled);
        assert_eq!(recovered.value(), Some(Value::from("boom")));
    }

    #[test]
    fn test_reject_wins_while_adoption_pending() {
        let mut el = EventLoop::new();
        let scheduler = el.scheduler();
        let (inner, inner_resolve, _) = Deferred::with_resolvers(&scheduler);
        let (outer, resolve, reject) = Deferred::with_resolvers(&scheduler);

        resolve(Value::Deferred(inner.clone()));
        assert!(outer.is_pending());
        reject(Value::from("x"));
        assert_eq!(outer.reason(), Some(Value::from("x")));

        inner_resolve(Value::from("adopted"));
        el.run_to_completion();
        assert_eq!(outer.state(), DeferredState::Rejected);
        assert_eq!(outer.reason(), Some(Value::from("x")));
    }

    #[test]
    fn test_second_resolve_wins_while_adoption_pending() {
        let mut el = EventLoop::new();
        let scheduler = el.scheduler();
        let (inner, inner_resolve, _) = Deferred::with_resolvers(&scheduler);
        let (outer, resolve, reject) = Deferred::with_resolvers(&scheduler);

        resolve(Value::Deferred(inner.clone()));
        resolve(Value::from("second"));
        reject(Value::from("third"));
        inner_resolve(Value::from("adopted"));
        el.run_to_completion();
        assert_eq!(outer.value(), Some(Value::from("second")));
    }

    #[test]
    fn test_initializer_error_rejects_while_adoption_pending() {
        let mut el = EventLoop::new();
        let scheduler = el.scheduler();
        let (inner, inner_resolve, _) = Deferred::with_resolvers(&scheduler);
        let adopted = inner.clone();
        let d = Deferred::new(&scheduler, move |resolve, _| {
            resolve(Value::Deferred(adopted));
            Err(Error::thrown("boom"))
        });
        assert_eq!(d.reason(), Some(Value::from("boom")));

        inner_resolve(Value::from("adopted"));
        el.run_to_completion();
        assert_eq!(d.reason(), Some(Value::from("boom")));
    }

    #[test]
    fn test_dynamic_then_member() {
        let mut el = EventLoop::new();
        let d = Value::Deferred(Deferred::resolve(&el.scheduler(), 5));
        let then = d.get("then").unwrap();
        assert!(then.is_callable());

        let double = Value::new_function("double", |_, args| {
            Ok(Value::Number(args[0].as_number().unwrap_or(0.0) * 2.0))
        });
        let derived = then.call(&d, &[double]).unwrap();
        el.run_to_completion();
        assert_eq!(derived.as_deferred().unwrap().value(), Some(Value::from(10)));
    }

    #[test]
    fn test_ids_increase_per_thread() {
        let el = EventLoop::new();
        let first = Deferred::resolve(&el.scheduler(), 1);
        let second = Deferred::resolve(&el.scheduler(), 2);
        assert!(second.id() > first.id());
    }

    #[test]
    fn test_debug_format() {
        let el = EventLoop::new();
        let d = Deferred::resolve(&el.scheduler(), 1);
        assert_eq!(format!("{:?}", d), format!("[Deferred #{} Fulfilled]", d.id()));
    }
}
