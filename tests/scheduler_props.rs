// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 nitro-core contributors

//! §8: scheduler ordering and cancellation properties.

use nitro_core::core::scheduler::Scheduler;
use proptest::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn events_at_the_same_timestamp_fire_in_insertion_order() {
    let mut sched = Scheduler::new();
    let order = Rc::new(RefCell::new(Vec::new()));
    for i in 0..8 {
        let order = order.clone();
        sched.add(20, move |_s, _late| order.borrow_mut().push(i));
    }
    sched.add_cycles(20);
    sched.step();
    assert_eq!(*order.borrow(), (0..8).collect::<Vec<_>>());
}

#[test]
fn cancelling_an_event_before_it_fires_suppresses_it() {
    let mut sched = Scheduler::new();
    let fired = Rc::new(RefCell::new(false));
    let fired2 = fired.clone();
    let handle = sched.add(5, move |_s, _late| *fired2.borrow_mut() = true);
    sched.cancel(handle);
    sched.add_cycles(100);
    sched.step();
    assert!(!*fired.borrow());
}

#[test]
fn next_event_at_reflects_the_earliest_pending_timestamp() {
    let mut sched = Scheduler::new();
    sched.add(50, |_s, _late| {});
    sched.add(10, |_s, _late| {});
    sched.add(30, |_s, _late| {});
    assert_eq!(sched.next_event_at(), Some(10));
}

proptest! {
    /// Whatever order events with distinct timestamps are scheduled in,
    /// they always dispatch in non-decreasing timestamp order.
    #[test]
    fn events_always_dispatch_in_timestamp_order(mut delays in prop::collection::vec(1u64..1000, 1..30)) {
        let mut sched = Scheduler::new();
        let observed = Rc::new(RefCell::new(Vec::new()));
        let max_delay = *delays.iter().max().unwrap();
        for delay in delays.drain(..) {
            let observed = observed.clone();
            sched.add(delay, move |_s, _late| observed.borrow_mut().push(delay));
        }
        sched.add_cycles(max_delay);
        sched.step();

        let observed = observed.borrow();
        for pair in observed.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
    }

    /// `late` always equals `now - scheduled_timestamp` for an event that
    /// fires after `now` has overrun its timestamp.
    #[test]
    fn late_amount_matches_overrun(delay in 1u64..500, overrun in 0u64..500) {
        let mut sched = Scheduler::new();
        let late_seen = Rc::new(RefCell::new(None));
        let late_seen2 = late_seen.clone();
        sched.add(delay, move |_s, late| *late_seen2.borrow_mut() = Some(late));
        sched.add_cycles(delay + overrun);
        sched.step();
        prop_assert_eq!(*late_seen.borrow(), Some(overrun));
    }
}
