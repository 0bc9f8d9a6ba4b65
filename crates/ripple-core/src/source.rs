#![forbid(unsafe_code)]

//! Event sources (write side) and streams (read side).
//!
//! # Design
//!
//! Every stream is backed by a reference-counted node that owns a handler
//! [`Registry`], a stopped flag, and a re-entrant dispatch gate. A
//! [`Source<T>`] is the producer handle (`fire`/`stop`) and dereferences to
//! its read-only [`Stream<T>`] view. Derived streams (pipes and joins) are
//! nodes whose `fire`/`stop` are only reachable from their own transform.
//!
//! A derived node keeps its parents and its forwarding handlers alive through
//! its `upstream` list. Parents only hold forwarding handlers weakly, so
//! references always point from descendants to ancestors and the graph never
//! contains a strong cycle.
//!
//! # Invariants
//!
//! 1. `stopped` is monotonic: once set it is never cleared.
//! 2. Only the caller that flips `stopped` dispatches `Stop`, exactly once.
//! 3. `fire` after stop is an error at the call site, never a silent drop.
//! 4. Dispatch of one node is serialized across threads by its gate, so no
//!    handler observes a `Fire` after the node's `Stop`.
//! 5. After `Stop`, the registry and upstream wiring are released, and
//!    nothing retained later is kept.
//! 6. Subscribing never waits on a dispatch, and `Stop` is delivered outside
//!    the gate. Inside the kernel a thread holding one gate only ever waits
//!    on a descendant's, reached through that descendant's parent `Fire`.
//!
//! # Failure Modes
//!
//! - **Handler panics**: unwinds out of `fire`/`stop`. The gate is released
//!   during unwinding; the stopped flag keeps whatever value it had.

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::event::{Event, Item};
use crate::registry::{Handler, Registry};
use crate::sync::{DispatchGate, lock};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct Node<T> {
    id: u64,
    config: StreamConfig,
    stopped: AtomicBool,
    gate: DispatchGate,
    registry: Registry<T>,
    /// Parents and forwarding handlers this node depends on. The lock also
    /// orders subscription and retention against `stop`; no handler ever runs
    /// while it is held.
    upstream: Mutex<Vec<Box<dyn Any + Send + Sync>>>,
}

impl<T> Node<T> {
    pub(crate) fn new(config: StreamConfig) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            config,
            stopped: AtomicBool::new(false),
            gate: DispatchGate::default(),
            registry: Registry::new(config.purge_threshold),
            upstream: Mutex::new(Vec::new()),
        })
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub(crate) fn config(&self) -> StreamConfig {
        self.config
    }

    #[inline]
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn fire(&self, value: T) -> Result<()> {
        let _gate = self.gate.enter();
        if self.is_stopped() {
            return Err(StreamError::FireAfterStop { stream_id: self.id });
        }
        self.registry.dispatch(&Event::Fire(value));
        Ok(())
    }

    /// Stop the node. Returns `true` only for the call that stopped it.
    ///
    /// The gate is held only to wait out in-flight fires and flip the flag.
    /// `Stop` is delivered after it is released, so a `Stop` handler may
    /// subscribe to any other stream without ordering against its gate.
    pub(crate) fn stop(&self) -> bool {
        let (handlers, upstream) = {
            let _gate = self.gate.enter();
            let mut upstream = lock(&self.upstream);
            if self
                .stopped
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return false;
            }
            (self.registry.drain(), std::mem::take(&mut *upstream))
        };
        tracing::trace!(stream_id = self.id, "stream stopped");
        handlers.deliver(&Event::Stop);
        drop(upstream);
        true
    }

    /// Mark a node stopped without dispatching. Only valid before anything
    /// could have subscribed to it.
    pub(crate) fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Register `handler` unless the node has already stopped.
    ///
    /// Never waits on a dispatch in progress. A handler registered while a
    /// `Fire` is being dispatched first sees the next event; one registered
    /// before `stop` drains the registry is guaranteed to see `Stop`.
    pub(crate) fn subscribe(&self, handler: &Arc<Handler<T>>) -> bool {
        let _wiring = lock(&self.upstream);
        if self.is_stopped() {
            return false;
        }
        self.registry.register(handler);
        true
    }

    /// Keep `value` alive for as long as the node runs. Once the node has
    /// stopped the value is dropped immediately instead.
    pub(crate) fn retain_upstream<R: Send + Sync + 'static>(&self, value: R) {
        let mut upstream = lock(&self.upstream);
        if self.is_stopped() {
            drop(upstream);
            drop(value);
            return;
        }
        upstream.push(Box::new(value));
    }

    pub(crate) fn handler_count(&self) -> usize {
        self.registry.live_count()
    }

    #[cfg(test)]
    pub(crate) fn upstream_len(&self) -> usize {
        lock(&self.upstream).len()
    }
}

/// Read-only view of an event stream.
///
/// Cloning a `Stream` creates a new handle to the **same** stream. Holding a
/// handle keeps the stream (and everything it derives from) alive.
pub struct Stream<T> {
    pub(crate) node: Arc<Node<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.node.id())
            .field("stopped", &self.node.is_stopped())
            .field("handlers", &self.node.handler_count())
            .finish()
    }
}

impl<T: Item> Stream<T> {
    pub(crate) fn from_node(node: Arc<Node<T>>) -> Self {
        Self { node }
    }

    /// Whether the stream has stopped. Monotonic.
    #[inline]
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.node.is_stopped()
    }

    /// Process-unique identifier (used in log fields and errors).
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.node.id()
    }

    /// Number of live handlers currently attached.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.node.handler_count()
    }

    /// Registry configuration of this stream.
    #[must_use]
    pub fn config(&self) -> StreamConfig {
        self.node.config()
    }
}

/// Producer handle: a stream that can be fired and stopped.
///
/// # Example
///
/// ```
/// use ripple_core::{Source, StreamError};
///
/// let source = Source::new();
/// source.fire(1).unwrap();
/// assert!(source.stop());
/// assert!(!source.stop());
/// assert!(matches!(source.fire(2), Err(StreamError::FireAfterStop { .. })));
/// ```
pub struct Source<T> {
    stream: Stream<T>,
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
        }
    }
}

impl<T> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.stream.node.id())
            .field("stopped", &self.stream.node.is_stopped())
            .field("handlers", &self.stream.node.handler_count())
            .finish()
    }
}

impl<T: Item> Source<T> {
    /// Create an empty, running source with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StreamConfig::default())
    }

    /// Create an empty, running source with the given configuration.
    #[must_use]
    pub fn with_config(config: StreamConfig) -> Self {
        Self {
            stream: Stream::from_node(Node::new(config)),
        }
    }

    /// Dispatch `value` to every live handler on the calling thread.
    ///
    /// Dispatch cascades synchronously through every derived stream before
    /// this returns.
    ///
    /// # Errors
    ///
    /// [`StreamError::FireAfterStop`] if the source has stopped.
    pub fn fire(&self, value: T) -> Result<()> {
        self.stream.node.fire(value)
    }

    /// Stop the source. Only the first call dispatches `Stop` and returns
    /// `true`; later calls are no-ops.
    pub fn stop(&self) -> bool {
        self.stream.node.stop()
    }

    /// A read-only handle to this source's stream.
    #[must_use]
    pub fn stream(&self) -> Stream<T> {
        self.stream.clone()
    }
}

impl<T: Item> Default for Source<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deref for Source<T> {
    type Target = Stream<T>;

    fn deref(&self) -> &Stream<T> {
        &self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::Anchor;
    use crate::testing::Recorder;

    #[test]
    fn new_source_is_running_and_empty() {
        let source = Source::<i32>::new();
        assert!(!source.is_stopped());
        assert_eq!(source.handler_count(), 0);
    }

    #[test]
    fn fire_reaches_handlers_in_order() {
        let anchor = Anchor::new();
        let source = Source::new();
        let rec = Recorder::attach(&source, &anchor);

        source.fire(1).unwrap();
        source.fire(2).unwrap();
        source.fire(3).unwrap();

        assert_eq!(rec.fired(), vec![1, 2, 3]);
        assert!(!rec.stopped());
    }

    #[test]
    fn stop_dispatches_once() {
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        let rec = Recorder::attach(&source, &anchor);

        assert!(source.stop());
        assert!(!source.stop());
        assert!(source.is_stopped());
        assert_eq!(rec.stop_count(), 1);
    }

    #[test]
    fn fire_after_stop_is_error() {
        let source = Source::new();
        source.stop();
        let err = source.fire(5).unwrap_err();
        assert_eq!(
            err,
            StreamError::FireAfterStop {
                stream_id: source.id()
            }
        );
    }

    #[test]
    fn stop_releases_handlers() {
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        let _rec = Recorder::attach(&source, &anchor);
        assert_eq!(source.handler_count(), 1);
        source.stop();
        assert_eq!(source.handler_count(), 0);
    }

    #[test]
    fn clones_share_state() {
        let a = Source::<u8>::new();
        let b = a.clone();
        b.stop();
        assert!(a.is_stopped());
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn stream_view_tracks_source() {
        let source = Source::<u8>::new();
        let view = source.stream();
        assert!(!view.is_stopped());
        source.stop();
        assert!(view.is_stopped());
    }

    #[test]
    fn config_is_carried() {
        let source = Source::<u8>::with_config(StreamConfig::default().with_purge_threshold(2));
        assert_eq!(source.config().purge_threshold, 2);
    }

    #[test]
    fn handler_panic_propagates_to_fire() {
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        source.on_each_fire(&anchor, |x| {
            if *x == 2 {
                panic!("handler fault");
            }
        });
        source.fire(1).unwrap();
        let s = source.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _ = s.fire(2);
        }));
        assert!(result.is_err());
        // The gate was released during unwinding.
        source.fire(3).unwrap();
    }

    #[test]
    fn debug_format() {
        let source = Source::<i32>::new();
        let dbg = format!("{source:?}");
        assert!(dbg.contains("Source"));
        assert!(dbg.contains("stopped"));
    }
}
