#![forbid(unsafe_code)]

//! Pipe and join: the two wiring primitives every combinator is built on.
//!
//! # Design
//!
//! A transform is a derived node plus a *step function* that receives each
//! parent event together with an [`Emitter`] for the derived node, fires or
//! stops it as needed, and returns whether it wants further parent events.
//! Combinators are step functions; there is no per-combinator node type.
//!
//! The parent registry holds the forwarding handler weakly. The derived node
//! holds the forwarding handler and the parent strongly, and the forwarding
//! handler holds the derived node weakly, so neither direction keeps the
//! other alive through a cycle.
//!
//! # Invariants
//!
//! 1. A pipe over a stopped parent is stopped at construction and never
//!    subscribes or dispatches.
//! 2. A join over two stopped parents is stopped at construction. A join
//!    over one stopped parent receives a synthetic `Stop` for that side
//!    before subscribing to the other, so its policy sees a consistent view.
//!    If that `Stop` settles the join, the other parent is never subscribed
//!    to or retained.
//! 3. The step function is never invoked once the derived node has stopped.
//! 4. Step functions are serialized: a join's left and right events never run
//!    its step concurrently.
//!
//! # Failure Modes
//!
//! - **Feedback**: a handler downstream of a step that synchronously fires
//!   one of that step's ancestors re-enters the step while it is running and
//!   deadlocks. Feedback has to go through another thread or be deferred.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::anchor::Anchor;
use crate::error::Result;
use crate::event::{Event, Item, Joined};
use crate::registry::Handler;
use crate::source::{Node, Stream};
use crate::sync::lock;

/// Output half of a transform, handed to its step function.
pub struct Emitter<U> {
    node: Arc<Node<U>>,
}

impl<U> fmt::Debug for Emitter<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("stream_id", &self.node.id())
            .field("stopped", &self.node.is_stopped())
            .finish()
    }
}

impl<U: Item> Emitter<U> {
    /// Fire on the derived stream.
    ///
    /// # Errors
    ///
    /// [`FireAfterStop`](crate::StreamError::FireAfterStop) if the derived
    /// stream was stopped (for instance by a deadline on another thread).
    pub fn fire(&self, value: U) -> Result<()> {
        self.node.fire(value)
    }

    /// Stop the derived stream. Idempotent.
    pub fn stop(&self) -> bool {
        self.node.stop()
    }

    /// Whether the derived stream has stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.node.is_stopped()
    }

    /// Subscribe `handler` to another stream for as long as the derived
    /// stream lives. Returns `false` (and registers nothing) if `stream` has
    /// already stopped.
    pub fn attach<X: Item>(&self, stream: &Stream<X>, handler: Arc<Handler<X>>) -> bool {
        if !stream.node.subscribe(&handler) {
            return false;
        }
        self.node.retain_upstream(handler);
        self.node.retain_upstream(stream.clone());
        true
    }

    /// A non-owning handle to the derived stream.
    #[must_use]
    pub fn downgrade(&self) -> WeakEmitter<U> {
        WeakEmitter {
            node: Arc::downgrade(&self.node),
        }
    }
}

/// Non-owning counterpart of [`Emitter`], for handlers that the derived
/// stream itself keeps alive.
pub struct WeakEmitter<U> {
    node: Weak<Node<U>>,
}

impl<U> Clone for WeakEmitter<U> {
    fn clone(&self) -> Self {
        Self {
            node: Weak::clone(&self.node),
        }
    }
}

impl<U: Item> WeakEmitter<U> {
    /// The emitter, if the derived stream is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Emitter<U>> {
        self.node.upgrade().map(|node| Emitter { node })
    }
}

trait Terminate: Send + Sync {
    fn terminate(&self) -> bool;
}

impl<T: Send + 'static> Terminate for Node<T> {
    fn terminate(&self) -> bool {
        self.stop()
    }
}

/// Type-erased, non-owning stop handle for a stream created by
/// [`Stream::expiring`].
///
/// Expiring is safe at any time and from any thread: after the stream has
/// stopped for another reason, or has been dropped, it is a no-op.
#[derive(Clone)]
pub struct Expiry {
    target: Weak<dyn Terminate>,
}

impl Expiry {
    /// Stop the target stream. Returns `true` only if this call stopped it.
    pub fn expire(&self) -> bool {
        self.target
            .upgrade()
            .is_some_and(|target| target.terminate())
    }
}

impl fmt::Debug for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expiry")
            .field("alive", &(self.target.strong_count() > 0))
            .finish()
    }
}

fn forwarder<T, U, F>(out: &Arc<Node<U>>, step: F) -> Arc<Handler<T>>
where
    T: Item,
    U: Item,
    F: Fn(&Emitter<U>, &Event<T>) -> bool + Send + Sync + 'static,
{
    let weak = Arc::downgrade(out);
    Arc::new(move |event: &Event<T>| {
        let Some(node) = weak.upgrade() else {
            return false;
        };
        if node.is_stopped() {
            return false;
        }
        step(&Emitter { node }, event)
    })
}

impl<T: Item> Stream<T> {
    /// Derive a stream from this one through a step function.
    ///
    /// `step` runs for every event of this stream until it returns `false`
    /// or the derived stream stops. The derived stream is retained by
    /// `anchor`.
    ///
    /// # Example
    ///
    /// ```
    /// use ripple_core::{Anchor, Event, Source};
    ///
    /// let anchor = Anchor::new();
    /// let source = Source::<i32>::new();
    /// let positives = source.pipe(&anchor, |out, event| match event {
    ///     Event::Fire(x) if *x > 0 => out.fire(*x).is_ok(),
    ///     Event::Fire(_) => true,
    ///     Event::Stop => {
    ///         out.stop();
    ///         false
    ///     }
    /// });
    /// source.stop();
    /// assert!(positives.is_stopped());
    /// ```
    pub fn pipe<U, F>(&self, anchor: &Anchor, step: F) -> Stream<U>
    where
        U: Item,
        F: FnMut(&Emitter<U>, &Event<T>) -> bool + Send + 'static,
    {
        let out = Node::<U>::new(self.node.config());
        let step = Mutex::new(step);
        let forward = forwarder(&out, move |emitter, event| {
            let mut step = lock(&step);
            (*step)(emitter, event)
        });
        if self.node.subscribe(&forward) {
            out.retain_upstream(forward);
            out.retain_upstream(self.clone());
        } else {
            out.mark_stopped();
        }
        let stream = Stream::from_node(out);
        anchor.retain(stream.clone());
        stream
    }

    /// Derive a stream from this one and `other` through a step function
    /// that sees events tagged by origin.
    ///
    /// `step` returning `false` detaches only the side whose event it was
    /// handling. The derived stream is retained by `anchor`.
    pub fn join<B, U, F>(&self, other: &Stream<B>, anchor: &Anchor, step: F) -> Stream<U>
    where
        B: Item,
        U: Item,
        F: FnMut(&Emitter<U>, Joined<'_, T, B>) -> bool + Send + 'static,
    {
        let out = Node::<U>::new(self.node.config());
        if self.is_stopped() && other.is_stopped() {
            out.mark_stopped();
            let stream = Stream::from_node(out);
            anchor.retain(stream.clone());
            return stream;
        }

        let step = Arc::new(Mutex::new(step));
        let left = {
            let step = Arc::clone(&step);
            forwarder(&out, move |emitter, event: &Event<T>| {
                let mut step = lock(&step);
                (*step)(emitter, Joined::Left(event))
            })
        };
        let right = {
            let step = Arc::clone(&step);
            forwarder(&out, move |emitter, event: &Event<B>| {
                let mut step = lock(&step);
                (*step)(emitter, Joined::Right(event))
            })
        };

        if self.node.subscribe(&left) {
            out.retain_upstream(Arc::clone(&left));
            out.retain_upstream(self.clone());
        } else {
            left(&Event::Stop);
        }
        // A synthetic left `Stop` may already have settled the join.
        if !out.is_stopped() {
            if other.node.subscribe(&right) {
                out.retain_upstream(Arc::clone(&right));
                out.retain_upstream(other.clone());
            } else {
                right(&Event::Stop);
            }
        }

        let stream = Stream::from_node(out);
        anchor.retain(stream.clone());
        stream
    }

    /// A forwarding copy of this stream together with a handle that stops the
    /// copy (never this stream) on demand.
    ///
    /// This is the hook time-bounded combinators use to stop a stream from a
    /// timer thread.
    pub fn expiring(&self, anchor: &Anchor) -> (Stream<T>, Expiry) {
        let copy = self.pipe(anchor, |out, event| match event {
            Event::Fire(value) => out.fire(value.clone()).is_ok(),
            Event::Stop => {
                out.stop();
                false
            }
        });
        let target: Weak<dyn Terminate> = {
            let weak: Weak<Node<T>> = Arc::downgrade(&copy.node);
            weak
        };
        (copy, Expiry { target })
    }
}
