// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 nitro-core contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The event scheduler (§4.1).
//!
//! A monotonic `timestamp_now`, a min-heap of events keyed by absolute
//! timestamp, and tombstone-based cancellation. Every peripheral that needs
//! to observe time — timers, DMA, video line/frame timing, the GPU's
//! deferred SwapBuffers — registers a callback here instead of being
//! polled every cycle.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Opaque handle returned by [`Scheduler::add`], used to [`Scheduler::cancel`]
/// a pending event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(u64);

struct Event {
    timestamp: u64,
    /// Insertion sequence number, used to break ties in FIFO order.
    sequence: u64,
    handle: EventHandle,
    callback: Box<dyn FnOnce(&mut Scheduler, u64) + 'static>,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.sequence == other.sequence
    }
}
impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse both timestamp and sequence so
        // the earliest timestamp, and among equal timestamps the earliest
        // insertion, pops first.
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Monotonic event scheduler shared by both CPUs and every peripheral.
///
/// # Example
///
/// ```
/// use nitro_core::core::scheduler::Scheduler;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let mut sched = Scheduler::new();
/// let fired = Rc::new(RefCell::new(false));
/// let fired2 = fired.clone();
/// sched.add(10, move |_sched, late| {
///     assert_eq!(late, 0);
///     *fired2.borrow_mut() = true;
/// });
/// sched.add_cycles(10);
/// sched.step();
/// assert!(*fired.borrow());
/// ```
pub struct Scheduler {
    timestamp_now: u64,
    heap: BinaryHeap<Event>,
    cancelled: HashSet<u64>,
    next_sequence: u64,
    next_handle: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            timestamp_now: 0,
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_sequence: 0,
            next_handle: 0,
        }
    }

    pub fn now(&self) -> u64 {
        self.timestamp_now
    }

    /// Schedule `callback` to run `delay` cycles from now. Returns a handle
    /// that can later be passed to [`Scheduler::cancel`].
    pub fn add(
        &mut self,
        delay: u64,
        callback: impl FnOnce(&mut Scheduler, u64) + 'static,
    ) -> EventHandle {
        let handle = EventHandle(self.next_handle);
        self.next_handle += 1;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Event {
            timestamp: self.timestamp_now + delay,
            sequence,
            handle,
            callback: Box::new(callback),
        });
        handle
    }

    /// Mark a previously-scheduled event dead. A cancelled event is
    /// discarded, not fired, the next time it would be popped; cancelling
    /// an already-fired or unknown handle is a no-op.
    pub fn cancel(&mut self, handle: EventHandle) {
        // `BinaryHeap` doesn't support in-place lookup, so we keep a
        // tombstone list and check it lazily on pop, matching §4.1's
        // "Cancellation is tombstone-based" phrasing.
        self.cancelled.insert(handle.0);
    }

    /// Advance `timestamp_now` by `n` cycles without dispatching anything.
    /// Callers invoke [`Scheduler::step`] afterward to run due events.
    pub fn add_cycles(&mut self, n: u64) {
        self.timestamp_now += n;
    }

    /// Returns the timestamp of the earliest still-alive pending event, if
    /// any. Used by the main loop to bound how far a CPU quantum may run
    /// before the scheduler must be consulted again.
    pub fn next_event_at(&mut self) -> Option<u64> {
        self.purge_dead_head();
        self.heap.peek().map(|e| e.timestamp)
    }

    /// Pop and dispatch every event whose key is `<= now`, passing each
    /// callback the late amount `now - key`. Callbacks may enqueue further
    /// events; those are eligible for dispatch within the same `step` call
    /// if their timestamp is also `<= now`.
    pub fn step(&mut self) {
        loop {
            self.purge_dead_head();
            let Some(event) = self.heap.peek() else {
                break;
            };
            if event.timestamp > self.timestamp_now {
                break;
            }
            let event = self.heap.pop().unwrap();
            if self.cancelled.remove(&event.handle.0) {
                continue;
            }
            let late = self.timestamp_now - event.timestamp;
            (event.callback)(self, late);
        }
    }

    fn purge_dead_head(&mut self) {
        while let Some(top) = self.heap.peek() {
            if self.cancelled.contains(&top.handle.0) {
                self.heap.pop();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn fires_exactly_once_with_zero_late() {
        let mut sched = Scheduler::new();
        let count = Rc::new(RefCell::new(0u32));
        let count2 = count.clone();
        sched.add(5, move |_s, late| {
            assert_eq!(late, 0);
            *count2.borrow_mut() += 1;
        });
        sched.add_cycles(5);
        sched.step();
        sched.step();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn equal_timestamps_dispatch_in_insertion_order() {
        let mut sched = Scheduler::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..4 {
            let order = order.clone();
            sched.add(10, move |_s, _late| order.borrow_mut().push(i));
        }
        sched.add_cycles(10);
        sched.step();
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn cancelled_events_never_fire() {
        let mut sched = Scheduler::new();
        let fired = Rc::new(RefCell::new(false));
        let fired2 = fired.clone();
        let handle = sched.add(3, move |_s, _late| *fired2.borrow_mut() = true);
        sched.cancel(handle);
        sched.add_cycles(3);
        sched.step();
        assert!(!*fired.borrow());
    }

    #[test]
    fn late_amount_reflects_overrun() {
        let mut sched = Scheduler::new();
        let late_seen = Rc::new(RefCell::new(0u64));
        let late_seen2 = late_seen.clone();
        sched.add(5, move |_s, late| *late_seen2.borrow_mut() = late);
        sched.add_cycles(8);
        sched.step();
        assert_eq!(*late_seen.borrow(), 3);
    }

    #[test]
    fn callback_can_schedule_further_events() {
        let mut sched = Scheduler::new();
        let count = Rc::new(RefCell::new(0u32));
        let count2 = count.clone();
        sched.add(1, move |s, _late| {
            *count2.borrow_mut() += 1;
            let count3 = count2.clone();
            s.add(0, move |_s, _late| *count3.borrow_mut() += 1);
        });
        sched.add_cycles(1);
        sched.step();
        assert_eq!(*count.borrow(), 2);
    }
}
