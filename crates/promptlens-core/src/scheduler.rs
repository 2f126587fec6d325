//! Timer queue and clocks
//!
//! The engine never sleeps. It records deadlines here and the host wakes it
//! (a `setTimeout` in the browser, a [`ManualClock`] in tests) by calling
//! [`Scheduler::take_due`].

use crate::cooldown::Millis;
use std::cell::Cell;
use std::rc::Rc;

/// Source of the current time in milliseconds
pub trait Clock {
    fn now(&self) -> Millis;
}

/// Virtual clock advanced explicitly by tests. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Millis>>,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance(&self, by: Millis) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, to: Millis) {
        self.now.set(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        self.now.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone)]
struct Entry<T> {
    id: TimerId,
    due: Millis,
    task: T,
}

/// Ordered set of pending tasks keyed by deadline.
///
/// Tasks due at the same instant run in scheduling order.
#[derive(Debug, Clone)]
pub struct Scheduler<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    /// Run `task` once `delay` has elapsed after `now`
    pub fn schedule_after(&mut self, now: Millis, delay: Millis, task: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let due = now.saturating_add(delay);
        // Stable insert: after every entry due at or before `due`
        let pos = self.entries.partition_point(|e| e.due <= due);
        self.entries.insert(pos, Entry { id, due, task });
        id
    }

    /// Drop a pending task. Returns false if it already ran or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Drop every pending task matching `pred`
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !pred(&e.task));
        before - self.entries.len()
    }

    /// Remove and return every task due at or before `now`, in order
    pub fn take_due(&mut self, now: Millis) -> Vec<T> {
        let split = self.entries.partition_point(|e| e.due <= now);
        self.entries.drain(..split).map(|e| e.task).collect()
    }

    /// Earliest pending deadline, for arming the host timer
    pub fn next_deadline(&self) -> Option<Millis> {
        self.entries.first().map(|e| e.due)
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
