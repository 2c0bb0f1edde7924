//! Cooperative task scheduler.
//!
//! A bounded set of tasks, each re-polled once per [`Scheduler::run_once`]
//! round until it reports [`Step::Complete`]. There is no waker machinery:
//! suspension is expressed by returning [`Step::Pending`], and the caller
//! decides how often rounds run.

use thiserror::Error;

use crate::metrics;

/// Default task capacity used by callers that don't have a better number.
pub const DEFAULT_CAPACITY: usize = 64;

/// Outcome of a single poll of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The task made whatever progress it could and wants to be polled again.
    Pending,
    /// The task is finished; the scheduler removes it after this round.
    Complete,
}

/// A unit of work polled repeatedly until done.
///
/// Heterogeneous task sets are expressed as an enum implementing this trait
/// and dispatching by `match`.
pub trait Task {
    /// Drive the task one step. `age` is the number of times this task has
    /// been polled before this call.
    fn poll(&mut self, age: u32) -> Step;
}

/// Identifier of a submitted task. Monotonically increasing; never reused
/// while the scheduler is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u32);

impl TaskId {
    /// Raw numeric value, mainly for logging.
    pub fn value(self) -> u32 {
        self.0
    }
}

/// Returned by [`Scheduler::submit`] when the task table is full.
///
/// Capacity exhaustion is reported synchronously and never retried
/// internally; callers degrade (typically by failing the enclosing request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("scheduler at capacity ({0} tasks)")]
pub struct SchedulerFull(pub usize);

struct Slot<T> {
    id: TaskId,
    task: T,
    age: u32,
    done: bool,
}

/// Bounded collection of concurrently active tasks.
pub struct Scheduler<T> {
    slots: Vec<Slot<T>>,
    capacity: usize,
    next_id: u32,
}

impl<T: Task> Scheduler<T> {
    /// Create a scheduler that will hold at most `capacity` tasks.
    pub fn new(capacity: usize) -> Self {
        Scheduler {
            slots: Vec::with_capacity(capacity),
            capacity,
            next_id: 0,
        }
    }

    /// Take ownership of `task` and track it until it completes.
    ///
    /// Fails with [`SchedulerFull`] when at capacity, without side effects.
    /// The task is first polled in the next `run_once` round, never in one
    /// already underway.
    pub fn submit(&mut self, task: T) -> Result<TaskId, SchedulerFull> {
        if self.slots.len() >= self.capacity {
            return Err(SchedulerFull(self.capacity));
        }

        let id = TaskId(self.next_id);
        self.next_id += 1;

        self.slots.push(Slot {
            id,
            task,
            age: 0,
            done: false,
        });

        metrics::TASKS_SUBMITTED.increment();
        Ok(id)
    }

    /// Poll every active task exactly once, then remove the completed ones.
    ///
    /// Returns the number of tasks still active. Poll order within a round is
    /// slot order, which is not stable across rounds (removal swaps the last
    /// slot into the vacated position), so tasks may rely only on their own
    /// `age` counter.
    pub fn run_once(&mut self) -> usize {
        if self.slots.is_empty() {
            return 0;
        }

        // Pass 1: poll.
        for slot in &mut self.slots {
            slot.done = matches!(slot.task.poll(slot.age), Step::Complete);
            slot.age += 1;
        }

        // Pass 2: remove, back to front so swap_remove never disturbs an
        // index we have yet to visit.
        for i in (0..self.slots.len()).rev() {
            if self.slots[i].done {
                let slot = self.slots.swap_remove(i);
                log::trace!("task {} completed after {} polls", slot.id.value(), slot.age);
                metrics::TASKS_COMPLETED.increment();
            }
        }

        self.slots.len()
    }

    /// Number of active tasks.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no tasks are active.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The fixed capacity this scheduler was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
