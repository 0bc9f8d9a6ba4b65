#![forbid(unsafe_code)]

//! Two-parent combinators (joins).

use std::collections::VecDeque;

use crate::anchor::Anchor;
use crate::event::{Either, Event, Item, Joined};
use crate::source::Stream;

impl<T: Item> Stream<T> {
    /// All of this stream's values, then all of `next`'s.
    ///
    /// Values `next` fires before this stream stops are buffered and flushed
    /// in order once it does. The result stops when `next` stops.
    pub fn concat(&self, anchor: &Anchor, next: &Stream<T>) -> Stream<T> {
        let mut first_done = false;
        let mut second_done = false;
        let mut held: VecDeque<T> = VecDeque::new();
        self.join(next, anchor, move |out, event| match event {
            Joined::Left(Event::Fire(value)) => out.fire(value.clone()).is_ok(),
            Joined::Left(Event::Stop) => {
                first_done = true;
                while let Some(value) = held.pop_front() {
                    if out.fire(value).is_err() {
                        return false;
                    }
                }
                if second_done {
                    out.stop();
                }
                false
            }
            Joined::Right(Event::Fire(value)) => {
                if first_done {
                    out.fire(value.clone()).is_ok()
                } else {
                    held.push_back(value.clone());
                    true
                }
            }
            Joined::Right(Event::Stop) => {
                if first_done {
                    out.stop();
                } else {
                    second_done = true;
                }
                false
            }
        })
    }

    /// Every value of either stream as it arrives. Stops once both have
    /// stopped.
    pub fn union(&self, anchor: &Anchor, other: &Stream<T>) -> Stream<T> {
        let mut stopped = [false; 2];
        self.join(other, anchor, move |out, event| {
            let (side, event) = match event {
                Joined::Left(event) => (0, event),
                Joined::Right(event) => (1, event),
            };
            match event {
                Event::Fire(value) => out.fire(value.clone()).is_ok(),
                Event::Stop => {
                    stopped[side] = true;
                    if stopped == [true, true] {
                        out.stop();
                    }
                    false
                }
            }
        })
    }

    /// Like [`union`](Self::union), with each value tagged by its origin.
    pub fn either<B: Item>(&self, anchor: &Anchor, other: &Stream<B>) -> Stream<Either<T, B>> {
        let mut left_done = false;
        let mut right_done = false;
        self.join(other, anchor, move |out, event| match event {
            Joined::Left(Event::Fire(value)) => out.fire(Either::Left(value.clone())).is_ok(),
            Joined::Right(Event::Fire(value)) => out.fire(Either::Right(value.clone())).is_ok(),
            Joined::Left(Event::Stop) => {
                left_done = true;
                if right_done {
                    out.stop();
                }
                false
            }
            Joined::Right(Event::Stop) => {
                right_done = true;
                if left_done {
                    out.stop();
                }
                false
            }
        })
    }

    /// This stream's values until `end` first fires, which stops the result
    /// immediately. `end` stopping without firing ends nothing.
    pub fn until<E: Item>(&self, anchor: &Anchor, end: &Stream<E>) -> Stream<T> {
        self.join(end, anchor, |out, event| match event {
            Joined::Left(Event::Fire(value)) => out.fire(value.clone()).is_ok(),
            Joined::Left(Event::Stop) | Joined::Right(Event::Fire(_)) => {
                out.stop();
                false
            }
            Joined::Right(Event::Stop) => false,
        })
    }

    /// Pair values FIFO across the two streams. Stops once both have stopped.
    ///
    /// Unpaired values are buffered without bound: if one side fires much
    /// faster than the other, its queue grows until the slow side catches up.
    pub fn zip<B: Item>(&self, anchor: &Anchor, other: &Stream<B>) -> Stream<(T, B)> {
        let mut lefts: VecDeque<T> = VecDeque::new();
        let mut rights: VecDeque<B> = VecDeque::new();
        let mut left_done = false;
        let mut right_done = false;
        self.join(other, anchor, move |out, event| {
            let side_stopped = matches!(event, Joined::Left(Event::Stop) | Joined::Right(Event::Stop));
            match event {
                Joined::Left(Event::Fire(value)) => lefts.push_back(value.clone()),
                Joined::Right(Event::Fire(value)) => rights.push_back(value.clone()),
                Joined::Left(Event::Stop) => left_done = true,
                Joined::Right(Event::Stop) => right_done = true,
            }
            while !lefts.is_empty() && !rights.is_empty() {
                let pair = match (lefts.pop_front(), rights.pop_front()) {
                    (Some(l), Some(r)) => (l, r),
                    _ => break,
                };
                if out.fire(pair).is_err() {
                    return false;
                }
            }
            if left_done && right_done {
                out.stop();
            }
            !side_stopped
        })
    }
}
