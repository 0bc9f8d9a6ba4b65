#![forbid(unsafe_code)]

//! Consumer attachment: callbacks and blocking waits on a stream.
//!
//! Every callback is owned by the [`Anchor`] passed in and registered weakly
//! with the stream; dropping the anchor detaches it.
//!
//! [`Pending`] is the exception: it owns its own handler, so the wait stays
//! subscribed for exactly as long as the `Pending` value lives.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use web_time::Duration;

use crate::anchor::Anchor;
use crate::error::{Result, StreamError};
use crate::event::{Event, Item};
use crate::registry::Handler;
use crate::source::Stream;
use crate::sync::lock;

impl<T: Item> Stream<T> {
    /// Attach a raw event handler. It is detached once it returns `false`.
    ///
    /// Returns `false` without attaching if the stream has already stopped.
    pub fn on_event(
        &self,
        anchor: &Anchor,
        handler: impl Fn(&Event<T>) -> bool + Send + Sync + 'static,
    ) -> bool {
        let handler: Arc<Handler<T>> = Arc::new(handler);
        let attached = self.node.subscribe(&handler);
        if attached {
            anchor.retain(handler);
        }
        attached
    }

    /// Run `f` for every fired value.
    pub fn on_each_fire(&self, anchor: &Anchor, f: impl Fn(&T) + Send + Sync + 'static) -> bool {
        self.on_event(anchor, move |event| match event {
            Event::Fire(value) => {
                f(value);
                true
            }
            Event::Stop => false,
        })
    }

    /// Run `f` on the first fired value only.
    pub fn on_first(&self, anchor: &Anchor, f: impl FnOnce(&T) + Send + 'static) -> bool {
        let slot = Mutex::new(Some(f));
        self.on_event(anchor, move |event| {
            if let Event::Fire(value) = event {
                let f = lock(&slot).take();
                if let Some(f) = f {
                    f(value);
                }
            }
            false
        })
    }

    /// Run `f` once the stream stops. On a stream that has already stopped,
    /// `f` runs immediately on the calling thread.
    pub fn on_stop(&self, anchor: &Anchor, f: impl FnOnce() + Send + 'static) {
        let slot = Arc::new(Mutex::new(Some(f)));
        let pending = Arc::clone(&slot);
        let attached = self.on_event(anchor, move |event| match event {
            Event::Fire(_) => true,
            Event::Stop => {
                let f = lock(&pending).take();
                if let Some(f) = f {
                    f();
                }
                false
            }
        });
        if !attached {
            let f = lock(&slot).take();
            if let Some(f) = f {
                f();
            }
        }
    }

    /// Wait for the next fired value.
    ///
    /// The returned [`Pending`] resolves to
    /// [`Exhausted`](StreamError::Exhausted) if the stream is already stopped
    /// or stops first.
    #[must_use]
    pub fn next_fire(&self) -> Pending<T> {
        Pending::subscribe(self, Mode::Next)
    }

    /// Wait for the value fired last before the stream stops.
    ///
    /// Resolves to [`Exhausted`](StreamError::Exhausted) if the stream stops
    /// without firing, or has already stopped.
    #[must_use]
    pub fn last_fire(&self) -> Pending<T> {
        Pending::subscribe(self, Mode::Last)
    }
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Next,
    Last,
}

enum Slot<T> {
    Waiting(Option<T>),
    Done(Option<T>),
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Shared<T> {
    fn complete(&self, value: Option<T>) {
        *lock(&self.slot) = Slot::Done(value);
        self.ready.notify_all();
    }
}

/// A value a stream has not produced yet.
///
/// Waiting blocks the calling thread. Waiting on the thread that is expected
/// to fire the stream never returns.
pub struct Pending<T> {
    stream_id: u64,
    shared: Arc<Shared<T>>,
    _handler: Arc<Handler<T>>,
}

impl<T: Item> Pending<T> {
    fn subscribe(stream: &Stream<T>, mode: Mode) -> Self {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::Waiting(None)),
            ready: Condvar::new(),
        });
        let sink = Arc::clone(&shared);
        let handler: Arc<Handler<T>> = Arc::new(move |event: &Event<T>| match (mode, event) {
            (Mode::Next, Event::Fire(value)) => {
                sink.complete(Some(value.clone()));
                false
            }
            (Mode::Last, Event::Fire(value)) => {
                if let Slot::Waiting(last) = &mut *lock(&sink.slot) {
                    *last = Some(value.clone());
                }
                true
            }
            (_, Event::Stop) => {
                let last = match &mut *lock(&sink.slot) {
                    Slot::Waiting(last) => last.take(),
                    Slot::Done(_) => return false,
                };
                sink.complete(last);
                false
            }
        });
        if !stream.node.subscribe(&handler) {
            shared.complete(None);
        }
        Self {
            stream_id: stream.id(),
            shared,
            _handler: handler,
        }
    }

    /// Whether the outcome is known (waiting would not block).
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(*lock(&self.shared.slot), Slot::Done(_))
    }

    /// Take the outcome without blocking, or `None` while still waiting.
    ///
    /// A value can be taken once; later calls report
    /// [`Exhausted`](StreamError::Exhausted).
    pub fn try_take(&self) -> Option<Result<T>> {
        match &mut *lock(&self.shared.slot) {
            Slot::Waiting(_) => None,
            Slot::Done(value) => Some(value.take().ok_or(StreamError::Exhausted {
                stream_id: self.stream_id,
            })),
        }
    }

    /// Block until the outcome is known.
    ///
    /// # Errors
    ///
    /// [`StreamError::Exhausted`] if the stream stopped first.
    pub fn wait(self) -> Result<T> {
        let mut slot = lock(&self.shared.slot);
        loop {
            if let Slot::Done(value) = &mut *slot {
                return value.take().ok_or(StreamError::Exhausted {
                    stream_id: self.stream_id,
                });
            }
            slot = self
                .shared
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block for at most `timeout`.
    ///
    /// # Errors
    ///
    /// [`StreamError::Exhausted`] if the stream stopped first,
    /// [`StreamError::WaitTimedOut`] if `timeout` elapsed.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T> {
        let slot = lock(&self.shared.slot);
        let (mut slot, _) = self
            .shared
            .ready
            .wait_timeout_while(slot, timeout, |slot| matches!(slot, Slot::Waiting(_)))
            .unwrap_or_else(PoisonError::into_inner);
        match &mut *slot {
            Slot::Done(value) => value.take().ok_or(StreamError::Exhausted {
                stream_id: self.stream_id,
            }),
            Slot::Waiting(_) => Err(StreamError::WaitTimedOut {
                stream_id: self.stream_id,
            }),
        }
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ready = matches!(*lock(&self.shared.slot), Slot::Done(_));
        f.debug_struct("Pending")
            .field("stream_id", &self.stream_id)
            .field("ready", &ready)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn on_each_fire_sees_every_value() {
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        let sum = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&sum);
        assert!(source.on_each_fire(&anchor, move |x| {
            s.fetch_add(*x as usize, Ordering::SeqCst);
        }));
        source.fire(1).unwrap();
        source.fire(2).unwrap();
        assert_eq!(sum.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn on_first_runs_once_and_detaches() {
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        source.on_first(&anchor, move |x| s.lock().unwrap().push(*x));
        source.fire(7).unwrap();
        source.fire(8).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![7]);
        assert_eq!(source.handler_count(), 0);
    }

    #[test]
    fn on_stop_runs_on_stop() {
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        source.on_stop(&anchor, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        source.fire(1).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        source.stop();
        source.stop();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn on_stop_on_stopped_stream_runs_immediately() {
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        source.stop();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        source.on_stop(&anchor, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn on_event_refused_after_stop() {
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        source.stop();
        assert!(!source.on_event(&anchor, |_| true));
        assert_eq!(anchor.retained_count(), 0);
    }

    #[test]
    fn next_fire_resolves_from_other_thread() {
        let source = Source::<i32>::new();
        let pending = source.next_fire();
        assert!(!pending.is_ready());
        let producer = source.clone();
        let handle = thread::spawn(move || {
            producer.fire(42).unwrap();
        });
        assert_eq!(pending.wait(), Ok(42));
        handle.join().unwrap();
    }

    #[test]
    fn next_fire_on_stopped_stream_is_exhausted() {
        let source = Source::<i32>::new();
        source.stop();
        let pending = source.next_fire();
        assert!(pending.is_ready());
        assert_eq!(
            pending.wait(),
            Err(StreamError::Exhausted {
                stream_id: source.id()
            })
        );
    }

    #[test]
    fn next_fire_exhausted_when_stopping_first() {
        let source = Source::<i32>::new();
        let pending = source.next_fire();
        source.stop();
        assert!(matches!(pending.wait(), Err(StreamError::Exhausted { .. })));
    }

    #[test]
    fn last_fire_returns_final_value() {
        let source = Source::<i32>::new();
        let pending = source.last_fire();
        source.fire(1).unwrap();
        source.fire(2).unwrap();
        assert!(!pending.is_ready());
        source.stop();
        assert_eq!(pending.wait(), Ok(2));
    }

    #[test]
    fn last_fire_without_fires_is_exhausted() {
        let source = Source::<i32>::new();
        let pending = source.last_fire();
        source.stop();
        assert!(matches!(pending.wait(), Err(StreamError::Exhausted { .. })));
    }

    #[test]
    fn try_take_does_not_block() {
        let source = Source::<i32>::new();
        let pending = source.next_fire();
        assert_eq!(pending.try_take(), None);
        source.fire(5).unwrap();
        assert_eq!(pending.try_take(), Some(Ok(5)));
        assert!(matches!(
            pending.try_take(),
            Some(Err(StreamError::Exhausted { .. }))
        ));
    }

    #[test]
    fn wait_timeout_elapses() {
        let source = Source::<i32>::new();
        let pending = source.next_fire();
        assert!(matches!(
            pending.wait_timeout(Duration::from_millis(10)),
            Err(StreamError::WaitTimedOut { .. })
        ));
    }

    #[test]
    fn dropped_pending_detaches() {
        let source = Source::<i32>::new();
        let pending = source.next_fire();
        assert_eq!(source.handler_count(), 1);
        drop(pending);
        assert_eq!(source.handler_count(), 0);
    }
}
