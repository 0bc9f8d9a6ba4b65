#![forbid(unsafe_code)]

//! Ownership anchors that govern listener lifetime.
//!
//! Sources only hold handlers weakly. Whatever must stay subscribed (handler
//! callbacks, derived streams and their wiring) is kept alive by an
//! [`Anchor`]. Dropping the last handle to an anchor releases all of it, and
//! the affected registry slots read as dead on their next dispatch.
//!
//! Cloning an `Anchor` creates a new handle to the **same** retained set.
//!
//! # Example
//!
//! ```
//! use ripple_core::{Anchor, Source};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let source = Source::<u32>::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//!
//! let anchor = Anchor::new();
//! let counter = Arc::clone(&seen);
//! source.on_each_fire(&anchor, move |_| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! source.fire(1).unwrap();
//! drop(anchor);
//! source.fire(2).unwrap();
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::sync::lock;

static NEXT_ANCHOR_ID: AtomicU64 = AtomicU64::new(1);

struct AnchorInner {
    id: u64,
    retained: Mutex<Vec<Box<dyn Any + Send + Sync>>>,
}

/// Owner of strong references to handlers and streams.
///
/// Retaining an anchor inside itself (directly or through something it
/// retains) forms a cycle and leaks everything it holds.
#[derive(Clone)]
pub struct Anchor {
    inner: Arc<AnchorInner>,
}

impl Anchor {
    /// Create an empty anchor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AnchorInner {
                id: NEXT_ANCHOR_ID.fetch_add(1, Ordering::Relaxed),
                retained: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Keep `value` alive for as long as this anchor lives.
    ///
    /// Retained values are never pruned individually. A handler that has
    /// detached (a finished `take`, an `on_first` or `on_stop` that ran)
    /// stays here until the anchor is dropped or released.
    pub fn retain<R: Send + Sync + 'static>(&self, value: R) {
        lock(&self.inner.retained).push(Box::new(value));
    }

    /// Create a child anchor retained by this one.
    ///
    /// The child lives at least as long as its parent, and can be dropped
    /// early as a group with [`release`](Self::release).
    #[must_use]
    pub fn nested(&self) -> Anchor {
        let child = Anchor::new();
        self.retain(child.clone());
        child
    }

    /// Drop everything retained so far. The anchor stays usable.
    ///
    /// Long-lived anchors that keep deriving short-lived streams should group
    /// them under a [`nested`](Self::nested) anchor and release that, since
    /// the anchor itself only grows.
    pub fn release(&self) {
        let released = std::mem::take(&mut *lock(&self.inner.retained));
        tracing::trace!(anchor_id = self.inner.id, released = released.len(), "anchor released");
        drop(released);
    }

    /// Number of values currently retained.
    #[must_use]
    pub fn retained_count(&self) -> usize {
        lock(&self.inner.retained).len()
    }

    /// Process-unique identifier (for logging).
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Anchor")
            .field("id", &self.inner.id)
            .field("retained", &self.retained_count())
            .finish()
    }
}
