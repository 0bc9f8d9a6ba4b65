#![forbid(unsafe_code)]

//! Test helpers (enabled with the `test-helpers` feature).

use std::sync::{Arc, Mutex};

use crate::anchor::Anchor;
use crate::event::{Event, Item};
use crate::source::Stream;
use crate::sync::lock;

/// Thread-safe collector of every event a stream produces.
///
/// The recording handler is retained by the anchor passed to
/// [`attach`](Self::attach); the recorder itself only shares the log.
pub struct Recorder<T> {
    events: Arc<Mutex<Vec<Event<T>>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<T: Item> Recorder<T> {
    /// Start recording `stream`, anchored by `anchor`.
    pub fn attach(stream: &Stream<T>, anchor: &Anchor) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&events);
        stream.on_event(anchor, move |event| {
            lock(&log).push(event.clone());
            true
        });
        Self { events }
    }

    /// Every recorded event, in arrival order.
    #[must_use]
    pub fn events(&self) -> Vec<Event<T>> {
        lock(&self.events).clone()
    }

    /// Payloads of the recorded `Fire` events.
    #[must_use]
    pub fn fired(&self) -> Vec<T> {
        lock(&self.events)
            .iter()
            .filter_map(|event| event.fired().cloned())
            .collect()
    }

    /// Whether a `Stop` was recorded.
    #[must_use]
    pub fn stopped(&self) -> bool {
        self.stop_count() > 0
    }

    /// Number of recorded `Stop` events.
    #[must_use]
    pub fn stop_count(&self) -> usize {
        lock(&self.events).iter().filter(|e| e.is_stop()).count()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
