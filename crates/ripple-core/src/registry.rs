#![forbid(unsafe_code)]

//! Weak handler registry owned by every event source.
//!
//! # Design
//!
//! The registry stores [`Weak`] references to handler callbacks; the strong
//! reference lives in an [`Anchor`](crate::Anchor) (or in a derived stream's
//! own upstream wiring). A handler therefore stops receiving events as soon as
//! whatever owns it is dropped, and a source never keeps its listeners alive.
//!
//! The slot list sits behind an [`ArcSwap`]: dispatch iterates a snapshot
//! while registration and purging publish a new list copy-on-write, so
//! handlers may register further handlers (or trigger a purge) mid-dispatch
//! without corrupting the iteration.
//!
//! # Invariants
//!
//! 1. A slot is dead once its weak reference no longer upgrades or its
//!    handler returned `false`; a dead slot is never invoked again.
//! 2. Dead slots are removed in one pass once a dispatch discovers at least
//!    `purge_threshold` of them.
//! 3. A handler registered during a dispatch does not see the event being
//!    dispatched.
//!
//! # Failure Modes
//!
//! - **Handler panics**: the panic unwinds out of `dispatch` to the caller of
//!   `fire`/`stop`. Handlers later in the snapshot miss that event. There is no
//!   fault isolation between listeners.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;

use crate::event::Event;

/// A handler callback. Returns whether it wants further events.
pub type Handler<T> = dyn Fn(&Event<T>) -> bool + Send + Sync;

struct Slot<T> {
    handler: Weak<Handler<T>>,
    detached: AtomicBool,
}

impl<T> Slot<T> {
    fn is_live(&self) -> bool {
        !self.detached.load(Ordering::Acquire) && self.handler.strong_count() > 0
    }
}

pub(crate) struct Registry<T> {
    slots: ArcSwap<Vec<Arc<Slot<T>>>>,
    purge_threshold: usize,
}

impl<T> Registry<T> {
    pub(crate) fn new(purge_threshold: usize) -> Self {
        Self {
            slots: ArcSwap::from_pointee(Vec::new()),
            purge_threshold: purge_threshold.max(1),
        }
    }

    /// Add a weak reference to `handler`.
    pub(crate) fn register(&self, handler: &Arc<Handler<T>>) {
        let slot = Arc::new(Slot {
            handler: Arc::downgrade(handler),
            detached: AtomicBool::new(false),
        });
        self.slots.rcu(|slots| {
            let mut next = Vec::with_capacity(slots.len() + 1);
            next.extend(slots.iter().cloned());
            next.push(Arc::clone(&slot));
            next
        });
    }

    /// Deliver `event` to every live handler of the current snapshot.
    pub(crate) fn dispatch(&self, event: &Event<T>) {
        let dead = deliver(&self.slots.load_full(), event);
        if dead >= self.purge_threshold {
            self.purge();
        }
    }

    /// Remove every dead slot in one pass.
    pub(crate) fn purge(&self) {
        let before = self.slots.load().len();
        self.slots.rcu(|slots| {
            slots
                .iter()
                .filter(|slot| slot.is_live())
                .cloned()
                .collect::<Vec<_>>()
        });
        let remaining = self.slots.load().len();
        tracing::debug!(
            removed = before.saturating_sub(remaining),
            remaining,
            "handler registry purged"
        );
    }

    /// Empty the registry, handing back the slots it held so the final
    /// event can be delivered to them without holding any lock.
    pub(crate) fn drain(&self) -> Drained<T> {
        Drained {
            slots: self.slots.swap(Arc::new(Vec::new())),
        }
    }

    /// Number of handlers that would currently receive an event.
    pub(crate) fn live_count(&self) -> usize {
        self.slots.load().iter().filter(|slot| slot.is_live()).count()
    }

    /// Number of stored slots, dead or alive.
    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.load().len()
    }
}

/// Slots removed from a registry by [`Registry::drain`].
pub(crate) struct Drained<T> {
    slots: Arc<Vec<Arc<Slot<T>>>>,
}

impl<T> Drained<T> {
    /// Deliver `event` to every slot that was live when drained.
    pub(crate) fn deliver(&self, event: &Event<T>) {
        deliver(&self.slots, event);
    }
}

/// Invoke every live slot, returning how many turned out to be dead.
fn deliver<T>(slots: &[Arc<Slot<T>>], event: &Event<T>) -> usize {
    let mut dead = 0usize;
    for slot in slots {
        if slot.detached.load(Ordering::Acquire) {
            dead += 1;
            continue;
        }
        let Some(handler) = slot.handler.upgrade() else {
            dead += 1;
            continue;
        };
        if !handler(event) {
            slot.detached.store(true, Ordering::Release);
            dead += 1;
        }
    }
    dead
}
