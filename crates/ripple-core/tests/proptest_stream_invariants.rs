//! Property-based invariant tests for streams and combinators.
//!
//! These tests verify invariants that must hold for any sequence of fires
//! and stops:
//!
//! 1. Stop is terminal: no handler observes a Fire after Stop.
//! 2. A second `stop()` dispatches nothing.
//! 3. `take(n)` forwards exactly `min(n, fires)` values, then stops.
//! 4. `zip` pairs each side's values in FIFO order.
//! 5. `map(identity)` reproduces its input.
//! 6. `group(k)` partitions the input without loss or reordering.
//! 7. Children of a stopped parent never dispatch.

use proptest::prelude::*;
use ripple_core::testing::Recorder;
use ripple_core::{Anchor, Event, Source};

// ── Helpers ─────────────────────────────────────────────────────────────

/// One step applied to a source.
#[derive(Debug, Clone)]
enum Op {
    Fire(i32),
    Stop,
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![
            8 => any::<i32>().prop_map(Op::Fire),
            1 => Just(Op::Stop),
        ],
        0..64,
    )
}

/// Apply `ops`, returning the values the source accepted.
fn apply(source: &Source<i32>, ops: &[Op]) -> Vec<i32> {
    let mut accepted = Vec::new();
    for op in ops {
        match op {
            Op::Fire(x) => {
                if source.fire(*x).is_ok() {
                    accepted.push(*x);
                }
            }
            Op::Stop => {
                source.stop();
            }
        }
    }
    accepted
}

fn assert_terminal<T: std::fmt::Debug>(events: &[Event<T>]) -> Result<(), TestCaseError> {
    let stops = events.iter().filter(|e| e.is_stop()).count();
    prop_assert!(stops <= 1, "observed {stops} Stop events: {events:?}");
    if stops == 1 {
        prop_assert!(events.last().is_some_and(Event::is_stop), "Stop not last: {events:?}");
    }
    Ok(())
}

// ═════════════════════════════════════════════════════════════════════════
// 1-2. Stop is terminal and idempotent
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn stop_is_terminal(ops in ops()) {
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        let rec = Recorder::attach(&source, &anchor);
        let mapped = Recorder::attach(&source.map(&anchor, |x| x.wrapping_add(1)), &anchor);

        let accepted = apply(&source, &ops);

        assert_terminal(&rec.events())?;
        assert_terminal(&mapped.events())?;
        prop_assert_eq!(rec.fired(), accepted);
        prop_assert_eq!(rec.stopped(), ops.iter().any(|op| matches!(op, Op::Stop)));
    }

    #[test]
    fn double_stop_dispatches_once(values in proptest::collection::vec(any::<i32>(), 0..16)) {
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        let rec = Recorder::attach(&source, &anchor);
        for x in &values {
            source.fire(*x).unwrap();
        }
        prop_assert!(source.stop());
        prop_assert!(!source.stop());
        prop_assert_eq!(rec.stop_count(), 1);
        prop_assert_eq!(rec.len(), values.len() + 1);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. take(n)
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn take_forwards_min_n_fires(n in 0usize..12, ops in ops()) {
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        let taken = source.take(&anchor, n);
        let rec = Recorder::attach(&taken, &anchor);

        let accepted = apply(&source, &ops);

        let expected: Vec<i32> = accepted.iter().copied().take(n).collect();
        prop_assert_eq!(rec.fired(), expected);
        assert_terminal(&rec.events())?;
        if accepted.len() >= n || source.is_stopped() {
            prop_assert!(taken.is_stopped());
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. zip FIFO pairing
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn zip_pairs_fifo(sides in proptest::collection::vec(any::<bool>(), 0..64)) {
        let anchor = Anchor::new();
        let left = Source::<u32>::new();
        let right = Source::<u32>::new();
        let pairs = left.zip(&anchor, &right);
        let rec = Recorder::attach(&pairs, &anchor);

        let (mut l, mut r) = (0u32, 0u32);
        for is_left in &sides {
            if *is_left {
                left.fire(l).unwrap();
                l += 1;
            } else {
                right.fire(r).unwrap();
                r += 1;
            }
        }

        let fired = rec.fired();
        prop_assert_eq!(fired.len() as u32, l.min(r));
        for (i, (a, b)) in fired.iter().enumerate() {
            prop_assert_eq!(*a, i as u32);
            prop_assert_eq!(*b, i as u32);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5-6. Identity and grouping
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn map_identity_reproduces_input(ops in ops()) {
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        let original = Recorder::attach(&source, &anchor);
        let same = Recorder::attach(&source.map(&anchor, |x| *x), &anchor);

        apply(&source, &ops);
        prop_assert_eq!(same.events(), original.events());
    }

    #[test]
    fn group_partitions_input(size in 1usize..6, values in proptest::collection::vec(any::<i32>(), 0..40)) {
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        let groups = Recorder::attach(&source.group(&anchor, size), &anchor);

        for x in &values {
            source.fire(*x).unwrap();
        }
        source.stop();

        let fired = groups.fired();
        prop_assert_eq!(fired.concat(), values.clone());
        let (last, full) = match fired.split_last() {
            Some((last, full)) => (last.len(), full),
            None => (0, &[][..]),
        };
        prop_assert!(full.iter().all(|g| g.len() == size));
        prop_assert!(last <= size);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 7. Stopped parents
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn children_of_stopped_parent_stay_silent(n in 0usize..5, k in 1usize..5) {
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        source.stop();

        let children = [
            Recorder::attach(&source.take(&anchor, n), &anchor),
            Recorder::attach(&source.skip(&anchor, n), &anchor),
            Recorder::attach(&source.filter(&anchor, |x| x % 2 == 0), &anchor),
        ];
        let grouped = Recorder::attach(&source.group(&anchor, k), &anchor);

        prop_assert!(source.fire(1).is_err());
        for child in &children {
            prop_assert!(child.is_empty());
        }
        prop_assert!(grouped.is_empty());
    }
}
