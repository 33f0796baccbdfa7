//! Tick-clock continuations.
//!
//! Delayed work (despawn after a death animation, lobby auto-assignment) is
//! queued here instead of being polled. Tasks fire in due-tick order, ties in
//! scheduling order, when the owner advances the clock.

use std::collections::BTreeMap;

/// Handle to a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle {
    due: u64,
    seq: u64,
}

impl TaskHandle {
    /// Tick the task is due on.
    #[must_use]
    pub const fn due(&self) -> u64 {
        self.due
    }
}

/// A queue of tasks keyed by due tick.
#[derive(Debug, Clone)]
pub struct Scheduler<T> {
    now: u64,
    next_seq: u64,
    pending: BTreeMap<TaskHandle, T>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    /// Creates an empty scheduler at tick 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: 0,
            next_seq: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Current tick.
    #[must_use]
    pub const fn now(&self) -> u64 {
        self.now
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Schedules `task` to fire `delay` ticks from now. A zero delay fires on
    /// the next advance.
    pub fn schedule_in(&mut self, delay: u64, task: T) -> TaskHandle {
        self.schedule_at(self.now.saturating_add(delay), task)
    }

    /// Schedules `task` for an absolute tick. Past ticks fire on the next
    /// advance.
    pub fn schedule_at(&mut self, due: u64, task: T) -> TaskHandle {
        let handle = TaskHandle {
            due,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.pending.insert(handle, task);
        handle
    }

    /// Cancels one task. Returns false if it already fired or was canceled.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        self.pending.remove(&handle).is_some()
    }

    /// Cancels every task matching `predicate`. Returns how many were removed.
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, task| !predicate(task));
        before - self.pending.len()
    }

    /// Iterates pending tasks in firing order.
    pub fn iter(&self) -> impl Iterator<Item = (TaskHandle, &T)> {
        self.pending.iter().map(|(h, t)| (*h, t))
    }

    /// Moves the clock to `tick` and returns every task now due, in order.
    pub fn advance_to(&mut self, tick: u64) -> Vec<T> {
        self.now = self.now.max(tick);
        let split = TaskHandle {
            due: self.now.saturating_add(1),
            seq: 0,
        };
        let later = self.pending.split_off(&split);
        let due = std::mem::replace(&mut self.pending, later);
        due.into_values().collect()
    }

    /// Advances the clock by one tick and returns the tasks now due.
    pub fn advance(&mut self) -> Vec<T> {
        self.advance_to(self.now.saturating_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_due_then_schedule_order() {
        let mut s = Scheduler::new();
        s.schedule_in(2, "b");
        s.schedule_in(1, "a");
        s.schedule_in(2, "c");

        assert_eq!(s.advance(), vec!["a"]);
        assert_eq!(s.advance(), vec!["b", "c"]);
        assert!(s.advance().is_empty());
        assert!(s.is_empty());
    }

    #[test]
    fn test_zero_delay_fires_next_advance() {
        let mut s = Scheduler::new();
        s.schedule_in(0, 1);
        assert_eq!(s.advance(), vec![1]);
    }

    #[test]
    fn test_cancel() {
        let mut s = Scheduler::new();
        let h = s.schedule_in(3, 'x');
        s.schedule_in(3, 'y');
        assert!(s.cancel(h));
        assert!(!s.cancel(h));
        assert_eq!(s.advance_to(10), vec!['y']);
        assert_eq!(s.now(), 10);
    }

    #[test]
    fn test_cancel_where() {
        let mut s = Scheduler::new();
        for i in 0..6 {
            s.schedule_in(i, i);
        }
        assert_eq!(s.cancel_where(|t| t % 2 == 0), 3);
        assert_eq!(s.advance_to(100), vec![1, 3, 5]);
    }

    #[test]
    fn test_clock_never_goes_back() {
        let mut s: Scheduler<u8> = Scheduler::new();
        s.advance_to(5);
        s.advance_to(2);
        assert_eq!(s.now(), 5);
        let h = s.schedule_in(1, 0);
        assert_eq!(h.due(), 6);
    }
}
