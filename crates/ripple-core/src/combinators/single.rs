#![forbid(unsafe_code)]

//! Single-parent combinators (pipes).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::anchor::Anchor;
use crate::clock::Clock;
use crate::event::{Event, Item};
use crate::registry::Handler;
use crate::source::Stream;
use crate::sync::lock;
use crate::transform::{Emitter, WeakEmitter};

/// Forward a parent `Stop` and detach.
fn finish<U: Item>(out: &Emitter<U>) -> bool {
    out.stop();
    false
}

/// Probe attached to each value of [`Stream::zip_with_staleness`].
///
/// Reports whether the stream has fired again since this value.
#[derive(Debug, Clone)]
pub struct Staleness {
    sequence: u64,
    latest: Arc<AtomicU64>,
}

impl Staleness {
    /// Whether a newer value has since been fired by the same stream.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.latest.load(Ordering::Acquire) != self.sequence
    }

    /// 1-based position of this value in the stream.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

#[derive(Debug, Default)]
struct FlatState {
    outer_stopped: bool,
    active: usize,
}

fn inner_forwarder<U: Item>(out: WeakEmitter<U>, state: Arc<Mutex<FlatState>>) -> Arc<Handler<U>> {
    Arc::new(move |event: &Event<U>| {
        let Some(out) = out.upgrade() else {
            return false;
        };
        match event {
            Event::Fire(value) => out.fire(value.clone()).is_ok(),
            Event::Stop => {
                let done = {
                    let mut state = lock(&state);
                    state.active = state.active.saturating_sub(1);
                    state.outer_stopped && state.active == 0
                };
                if done {
                    out.stop();
                }
                false
            }
        }
    })
}

impl<T: Item> Stream<T> {
    /// Fire `f(x)` for every fired `x`.
    pub fn map<U: Item>(&self, anchor: &Anchor, f: impl Fn(&T) -> U + Send + 'static) -> Stream<U> {
        self.pipe(anchor, move |out, event| match event {
            Event::Fire(value) => out.fire(f(value)).is_ok(),
            Event::Stop => finish(out),
        })
    }

    /// Forward only the values matching `predicate`. Stop is always forwarded.
    pub fn filter(
        &self,
        anchor: &Anchor,
        predicate: impl Fn(&T) -> bool + Send + 'static,
    ) -> Stream<T> {
        self.pipe(anchor, move |out, event| match event {
            Event::Fire(value) if predicate(value) => out.fire(value.clone()).is_ok(),
            Event::Fire(_) => true,
            Event::Stop => finish(out),
        })
    }

    /// Fire `f(x)` for every fired `x` where `f` is defined.
    pub fn filter_map<U: Item>(
        &self,
        anchor: &Anchor,
        f: impl Fn(&T) -> Option<U> + Send + 'static,
    ) -> Stream<U> {
        self.pipe(anchor, move |out, event| match event {
            Event::Fire(value) => match f(value) {
                Some(mapped) => out.fire(mapped).is_ok(),
                None => true,
            },
            Event::Stop => finish(out),
        })
    }

    /// Fire every value of every stream `f` returns.
    ///
    /// Each inner stream is kept alive by the result. The result stops once
    /// this stream and all inner streams created so far have stopped.
    pub fn flat_map<U: Item>(
        &self,
        anchor: &Anchor,
        f: impl Fn(&T) -> Stream<U> + Send + 'static,
    ) -> Stream<U> {
        let state = Arc::new(Mutex::new(FlatState::default()));
        self.pipe(anchor, move |out, event| match event {
            Event::Fire(value) => {
                let inner = f(value);
                lock(&state).active += 1;
                let handler = inner_forwarder(out.downgrade(), Arc::clone(&state));
                if !out.attach(&inner, handler) {
                    let mut state = lock(&state);
                    state.active = state.active.saturating_sub(1);
                }
                true
            }
            Event::Stop => {
                let done = {
                    let mut state = lock(&state);
                    state.outer_stopped = true;
                    state.active == 0
                };
                if done {
                    out.stop();
                }
                false
            }
        })
    }

    /// Fire the running accumulation `op(acc, x)`, starting from `init`.
    pub fn fold<U: Item>(
        &self,
        anchor: &Anchor,
        init: U,
        op: impl Fn(&U, &T) -> U + Send + 'static,
    ) -> Stream<U> {
        let mut acc = init;
        self.pipe(anchor, move |out, event| match event {
            Event::Fire(value) => {
                acc = op(&acc, value);
                out.fire(acc.clone()).is_ok()
            }
            Event::Stop => finish(out),
        })
    }

    /// Forward the first `n` values, then stop and detach regardless of the
    /// parent. `take(0)` is stopped at construction.
    pub fn take(&self, anchor: &Anchor, n: usize) -> Stream<T> {
        let mut remaining = n;
        let taken = self.pipe(anchor, move |out, event| match event {
            Event::Fire(value) => {
                if remaining == 0 {
                    return finish(out);
                }
                remaining -= 1;
                let delivered = out.fire(value.clone()).is_ok();
                if remaining == 0 {
                    return finish(out);
                }
                delivered
            }
            Event::Stop => finish(out),
        });
        if n == 0 {
            taken.node.stop();
        }
        taken
    }

    /// Forward values while `predicate` holds. The first failing value is
    /// not forwarded; the result stops and detaches instead.
    pub fn take_while(
        &self,
        anchor: &Anchor,
        predicate: impl Fn(&T) -> bool + Send + 'static,
    ) -> Stream<T> {
        self.pipe(anchor, move |out, event| match event {
            Event::Fire(value) if predicate(value) => out.fire(value.clone()).is_ok(),
            Event::Fire(_) | Event::Stop => finish(out),
        })
    }

    /// Suppress the first `n` values, forward the rest.
    pub fn skip(&self, anchor: &Anchor, n: usize) -> Stream<T> {
        let mut skipped = 0usize;
        self.pipe(anchor, move |out, event| match event {
            Event::Fire(_) if skipped < n => {
                skipped += 1;
                true
            }
            Event::Fire(value) => out.fire(value.clone()).is_ok(),
            Event::Stop => finish(out),
        })
    }

    /// Suppress values while `predicate` holds, forward everything from the
    /// first failing value on.
    pub fn skip_while(
        &self,
        anchor: &Anchor,
        predicate: impl Fn(&T) -> bool + Send + 'static,
    ) -> Stream<T> {
        let mut skipping = true;
        self.pipe(anchor, move |out, event| match event {
            Event::Fire(value) => {
                if skipping && predicate(value) {
                    return true;
                }
                skipping = false;
                out.fire(value.clone()).is_ok()
            }
            Event::Stop => finish(out),
        })
    }

    /// Pair every value with its 0-based position.
    pub fn zip_with_index(&self, anchor: &Anchor) -> Stream<(T, u64)> {
        let mut index = 0u64;
        self.pipe(anchor, move |out, event| match event {
            Event::Fire(value) => {
                let delivered = out.fire((value.clone(), index)).is_ok();
                index += 1;
                delivered
            }
            Event::Stop => finish(out),
        })
    }

    /// Pair every value with a probe that reports whether a newer value has
    /// since arrived.
    pub fn zip_with_staleness(&self, anchor: &Anchor) -> Stream<(T, Staleness)> {
        let latest = Arc::new(AtomicU64::new(0));
        let mut sequence = 0u64;
        self.pipe(anchor, move |out, event| match event {
            Event::Fire(value) => {
                sequence += 1;
                latest.store(sequence, Ordering::Release);
                let probe = Staleness {
                    sequence,
                    latest: Arc::clone(&latest),
                };
                out.fire((value.clone(), probe)).is_ok()
            }
            Event::Stop => finish(out),
        })
    }

    /// Pair every value with `clock.now()` at the time it was fired.
    pub fn zip_with_time<C: Clock>(&self, anchor: &Anchor, clock: C) -> Stream<(T, C::Time)> {
        self.pipe(anchor, move |out, event| match event {
            Event::Fire(value) => out.fire((value.clone(), clock.now())).is_ok(),
            Event::Stop => finish(out),
        })
    }

    /// Fire consecutive values in groups of `size`. A partial group is
    /// flushed when the parent stops.
    ///
    /// # Panics
    ///
    /// If `size` is zero.
    pub fn group(&self, anchor: &Anchor, size: usize) -> Stream<Vec<T>> {
        assert!(size > 0, "group size must be non-zero");
        let mut pending: Vec<T> = Vec::with_capacity(size);
        self.pipe(anchor, move |out, event| match event {
            Event::Fire(value) => {
                pending.push(value.clone());
                if pending.len() < size {
                    return true;
                }
                let full = std::mem::replace(&mut pending, Vec::with_capacity(size));
                out.fire(full).is_ok()
            }
            Event::Stop => {
                if !pending.is_empty() {
                    let _ = out.fire(std::mem::take(&mut pending));
                }
                finish(out)
            }
        })
    }
}
