#![forbid(unsafe_code)]

//! Event values carried through streams.
//!
//! Every stream produces a sequence of [`Event::Fire`] values terminated by at
//! most one [`Event::Stop`]. Events are immutable once produced; handlers only
//! ever see them by reference.

/// Bound shared by every item type that flows through a stream.
///
/// Items are cloned when a combinator forwards them, and may be delivered on
/// whichever thread calls `fire` (including the deadline timer thread).
pub trait Item: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Item for T {}

/// A single event produced by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event<T> {
    /// An event carrying one payload value.
    Fire(T),
    /// The terminal event. No `Fire` follows it.
    Stop,
}

impl<T> Event<T> {
    /// Whether this is a `Fire` event.
    #[inline]
    #[must_use]
    pub const fn is_fire(&self) -> bool {
        matches!(self, Self::Fire(_))
    }

    /// Whether this is the terminal `Stop` event.
    #[inline]
    #[must_use]
    pub const fn is_stop(&self) -> bool {
        matches!(self, Self::Stop)
    }

    /// Borrow the payload of a `Fire` event.
    #[inline]
    #[must_use]
    pub const fn fired(&self) -> Option<&T> {
        match self {
            Self::Fire(value) => Some(value),
            Self::Stop => None,
        }
    }

    /// Convert the payload, keeping `Stop` as is.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Event<U> {
        match self {
            Self::Fire(value) => Event::Fire(f(value)),
            Self::Stop => Event::Stop,
        }
    }

    /// Borrowing view of this event.
    #[inline]
    #[must_use]
    pub const fn as_ref(&self) -> Event<&T> {
        match self {
            Self::Fire(value) => Event::Fire(value),
            Self::Stop => Event::Stop,
        }
    }
}

/// Output of [`Stream::either`](crate::Stream::either): a value tagged with
/// the side it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Either<L, R> {
    /// Value fired by the left parent.
    Left(L),
    /// Value fired by the right parent.
    Right(R),
}

impl<L, R> Either<L, R> {
    /// Whether the value came from the left parent.
    #[inline]
    #[must_use]
    pub const fn is_left(&self) -> bool {
        matches!(self, Self::Left(_))
    }

    /// Whether the value came from the right parent.
    #[inline]
    #[must_use]
    pub const fn is_right(&self) -> bool {
        matches!(self, Self::Right(_))
    }

    /// The left value, if any.
    pub fn left(self) -> Option<L> {
        match self {
            Self::Left(l) => Some(l),
            Self::Right(_) => None,
        }
    }

    /// The right value, if any.
    pub fn right(self) -> Option<R> {
        match self {
            Self::Left(_) => None,
            Self::Right(r) => Some(r),
        }
    }
}

/// An event observed by a two-parent transform, tagged by origin.
#[derive(Debug, PartialEq, Eq)]
pub enum Joined<'a, A, B> {
    /// Event produced by the left parent.
    Left(&'a Event<A>),
    /// Event produced by the right parent.
    Right(&'a Event<B>),
}

// Manual impls: only references are held, so no bounds on `A`/`B`.
impl<A, B> Clone for Joined<'_, A, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, B> Copy for Joined<'_, A, B> {}
