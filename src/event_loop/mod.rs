//! Event Loop Implementation
//!
//! This module provides the deferred-task facility every [`Deferred`] schedules
//! its handlers through: a FIFO microtask queue behind the one-operation
//! [`Schedule`] trait, and an [`EventLoop`] that drains it once per tick with
//! a budget for starvation protection.
//!
//! Handlers are never run inside the call that registers or settles them;
//! they only run when the owner of the loop calls [`EventLoop::run_tick`] or
//! [`EventLoop::run_to_completion`].
//!
//! [`Deferred`]: crate::Deferred

mod config;

pub use config::EventLoopConfig;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, trace};

/// A unit of deferred work
pub type Task = Box<dyn FnOnce()>;

/// The deferred-task facility.
///
/// `schedule` must not run `task` before the current synchronous execution
/// completes, and tasks scheduled earlier must run before tasks scheduled
/// later.
pub trait Schedule {
    /// Enqueue a task to run on a later turn
    fn schedule(&self, task: Task);
}

/// Shared handle to a deferred-task facility
pub type Scheduler = Rc<dyn Schedule>;

/// A microtask waiting in the queue
struct Microtask {
    /// Sequence number, for tracing
    id: u64,
    /// The work to run
    callback: Task,
}

/// FIFO microtask queue
#[derive(Default)]
pub struct TaskQueue {
    tasks: RefCell<VecDeque<Microtask>>,
    next_task_id: Cell<u64>,
}

impl TaskQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to run
    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Check if no task is waiting
    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Dequeue the next task. The queue is not borrowed once this returns, so
    /// the task is free to schedule more work.
    fn pop(&self) -> Option<Microtask> {
        self.tasks.borrow_mut().pop_front()
    }

    /// Drop every waiting task
    fn clear(&self) {
        self.tasks.borrow_mut().clear();
    }
}

impl Schedule for TaskQueue {
    fn schedule(&self, task: Task) {
        let id = self.next_task_id.get() + 1;
        self.next_task_id.set(id);
        trace!(task = id, "microtask scheduled");
        self.tasks.borrow_mut().push_back(Microtask { id, callback: task });
    }
}

/// Result of running the event loop to completion via `run_to_completion()`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    /// Total number of tasks that were dequeued and run
    pub tasks_processed: usize,
    /// Number of ticks (each tick drains up to the task budget)
    pub ticks: usize,
    /// Whether the loop stopped at `max_ticks` with work still pending
    pub tick_limit_reached: bool,
}

/// Runtime statistics for the event loop
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventLoopStats {
    /// Total tasks run across all ticks
    pub total_tasks: u64,
    /// Total number of event loop ticks
    pub total_ticks: u64,
    /// Maximum tasks drained in a single tick
    pub max_tasks_per_tick: u64,
    /// Longest tick duration in milliseconds (wall-clock)
    pub longest_tick_ms: u64,
}

/// The event loop owns the task queue and decides when queued tasks run
pub struct EventLoop {
    /// Microtask queue shared with every deferred value created from `scheduler()`
    queue: Rc<TaskQueue>,
    /// Loop configuration
    config: EventLoopConfig,
    /// Runtime statistics
    stats: EventLoopStats,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Create a new event loop with the default configuration
    pub fn new() -> Self {
        Self {
            queue: Rc::new(TaskQueue::new()),
            config: EventLoopConfig::default(),
            stats: EventLoopStats::default(),
        }
    }

    /// Create a new event loop from a validated configuration
    pub fn with_config(config: EventLoopConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self {
            queue: Rc::new(TaskQueue::new()),
            config,
            stats: EventLoopStats::default(),
        })
    }

    /// The configuration in use
    pub fn config(&self) -> &EventLoopConfig {
        &self.config
    }

    /// Handle that deferred values schedule their handlers through
    pub fn scheduler(&self) -> Scheduler {
        self.queue.clone()
    }

    /// Enqueue a plain callback, with no associated settlement
    pub fn queue_microtask<F>(&self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        self.queue.schedule(Box::new(callback));
    }

    /// Check if there are pending tasks
    pub fn has_pending_work(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Number of tasks waiting to run
    pub fn pending_tasks(&self) -> usize {
        self.queue.len()
    }

    /// Drop all pending work
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Run queued tasks in FIFO order, up to the per-tick budget.
    ///
    /// Tasks scheduled while the tick runs are appended behind the current
    /// ones and may run in the same tick if budget remains. Returns the number
    /// of tasks run.
    pub fn run_tick(&mut self) -> usize {
        let tick_start = Instant::now();
        let mut count: usize = 0;

        while count < self.config.max_tasks_per_tick {
            let Some(task) = self.queue.pop() else {
                break;
            };
            trace!(task = task.id, "running microtask");
            (task.callback)();
            count += 1;
        }

        let remaining = self.queue.len();
        if remaining > 0 && count >= self.config.max_tasks_per_tick {
            debug!(
                budget = self.config.max_tasks_per_tick,
                remaining, "microtask budget exhausted, yielding"
            );
        }

        let tick_elapsed = tick_start.elapsed().as_millis() as u64;
        if tick_elapsed > self.stats.longest_tick_ms {
            self.stats.longest_tick_ms = tick_elapsed;
        }
        self.stats.total_ticks += 1;
        self.stats.total_tasks += count as u64;
        if (count as u64) > self.stats.max_tasks_per_tick {
            self.stats.max_tasks_per_tick = count as u64;
        }
        trace!(tasks = count, remaining, "tick complete");
        count
    }

    /// Run ticks until no task is pending, or until `max_ticks` ticks ran
    /// when the configuration sets a limit.
    pub fn run_to_completion(&mut self) -> RunResult {
        let mut result = RunResult::default();

        while self.has_pending_work() {
            if self.config.max_ticks != 0 && result.ticks as u64 >= self.config.max_ticks {
                debug!(
                    max_ticks = self.config.max_ticks,
                    pending = self.pending_tasks(),
                    "tick limit reached with work pending"
                );
                result.tick_limit_reached = true;
                break;
            }
            result.tasks_processed += self.run_tick();
            result.ticks += 1;
        }

        result
    }

    /// Set the maximum number of tasks to drain per tick (starvation protection).
    /// A limit of zero is raised to one so that ticks always make progress.
    pub fn set_task_budget(&mut self, limit: usize) {
        self.config.max_tasks_per_tick = limit.max(1);
    }

    /// Get the current task budget
    pub fn task_budget(&self) -> usize {
        self.config.max_tasks_per_tick
    }

    /// Get a snapshot of the current event loop statistics.
    pub fn stats(&self) -> EventLoopStats {
        self.stats.clone()
    }

    /// Reset all event loop statistics to zero.
    pub fn reset_stats(&mut self) {
        self.stats = EventLoopStats::default();
    }
}
