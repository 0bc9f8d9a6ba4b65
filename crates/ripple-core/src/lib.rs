#![forbid(unsafe_code)]

//! Core: leak-safe event sources, streams, anchors, and combinators.
//!
//! A [`Source`] fires values into a [`Stream`]; consumers and derived streams
//! attach to it through an [`Anchor`] that owns them. Streams only hold their
//! handlers weakly, so dropping the anchor detaches everything it owns and no
//! subscription outlives the code that made it.
//!
//! ```
//! use ripple_core::{Anchor, Source};
//! use std::sync::{Arc, Mutex};
//!
//! let anchor = Anchor::new();
//! let source = Source::<i32>::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let sink = Arc::clone(&seen);
//! source
//!     .map(&anchor, |x| x * 2)
//!     .on_each_fire(&anchor, move |x| sink.lock().unwrap().push(*x));
//!
//! source.fire(1).unwrap();
//! drop(anchor);
//! source.fire(2).unwrap();
//! assert_eq!(*seen.lock().unwrap(), vec![2]);
//! ```

pub mod anchor;
pub mod clock;
pub mod combinators;
pub mod config;
mod consume;
pub mod error;
pub mod event;
mod registry;
mod source;
mod sync;
mod transform;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use anchor::Anchor;
pub use clock::{Clock, ManualClock, SystemClock};
pub use combinators::Staleness;
pub use config::StreamConfig;
pub use consume::Pending;
pub use error::{Result, StreamError};
pub use event::{Either, Event, Item, Joined};
pub use registry::Handler;
pub use source::{Source, Stream};
pub use transform::{Emitter, Expiry, WeakEmitter};
