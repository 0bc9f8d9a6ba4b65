#![forbid(unsafe_code)]

//! Stream combinators.
//!
//! Every combinator is a step function over [`Stream::pipe`] (one parent) or
//! [`Stream::join`] (two parents); none of them touches a registry directly.
//! All of them take the [`Anchor`](crate::Anchor) that retains the derived
//! stream.
//!
//! # Stop policies
//!
//! | Combinator | Stops when |
//! |---|---|
//! | `map`, `filter`, `filter_map`, `fold`, `skip*`, `zip_with_*`, `group` | parent stops |
//! | `take(n)` | n-th fire, or parent stops |
//! | `take_while(p)` | first fire failing `p` (not forwarded), or parent stops |
//! | `flat_map` | parent and every inner stream have stopped |
//! | `concat` | right stops, after left stopped |
//! | `union`, `either`, `zip` | both parents stopped |
//! | `until` | left stops, or right fires |
//!
//! [`Stream::pipe`]: crate::Stream::pipe
//! [`Stream::join`]: crate::Stream::join

mod dual;
mod single;

pub use single::Staleness;
