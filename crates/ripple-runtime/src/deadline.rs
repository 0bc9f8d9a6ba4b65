#![forbid(unsafe_code)]

//! Time-bounded combinators.
//!
//! `within` and `before` forward a stream until it stops or a deadline
//! elapses, whichever comes first. The deadline stop is issued from the
//! scheduler's timer thread through an [`Expiry`](ripple_core::Expiry), so it
//! is a no-op if the derived stream already stopped or was dropped.

use ripple_core::{Anchor, Item, Stream};
use web_time::{Duration, Instant};

use crate::error::{Result, ScheduleError};
use crate::scheduler::DeadlineScheduler;

/// Deadline-bound combinators for [`Stream`].
pub trait DeadlineExt<T: Item> {
    /// Forward this stream for at most `timeout`, using the global scheduler.
    ///
    /// # Errors
    ///
    /// See [`DeadlineScheduler::schedule_after`].
    fn within(&self, anchor: &Anchor, timeout: Duration) -> Result<Stream<T>> {
        self.within_on(DeadlineScheduler::global(), anchor, timeout)
    }

    /// Like [`within`](Self::within), with the timeout in seconds.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::NonFiniteDelay`] for an infinite or NaN timeout.
    fn within_secs(&self, anchor: &Anchor, secs: f64) -> Result<Stream<T>> {
        if !secs.is_finite() {
            return Err(ScheduleError::NonFiniteDelay { secs });
        }
        let timeout =
            Duration::try_from_secs_f64(secs.max(0.0)).map_err(|_| ScheduleError::Unrepresentable)?;
        self.within(anchor, timeout)
    }

    /// Forward this stream until `deadline`, using the global scheduler.
    ///
    /// # Errors
    ///
    /// See [`DeadlineScheduler::schedule_once`].
    fn before(&self, anchor: &Anchor, deadline: Instant) -> Result<Stream<T>> {
        self.before_on(DeadlineScheduler::global(), anchor, deadline)
    }

    /// [`within`](Self::within) on a specific scheduler.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::Unrepresentable`] if `now + timeout` overflows,
    /// otherwise as [`before_on`](Self::before_on).
    fn within_on(
        &self,
        scheduler: &DeadlineScheduler,
        anchor: &Anchor,
        timeout: Duration,
    ) -> Result<Stream<T>> {
        let deadline = Instant::now()
            .checked_add(timeout)
            .ok_or(ScheduleError::Unrepresentable)?;
        self.before_on(scheduler, anchor, deadline)
    }

    /// [`before`](Self::before) on a specific scheduler.
    ///
    /// # Errors
    ///
    /// Whatever [`DeadlineScheduler::schedule_once`] reports. The derived
    /// stream is stopped before the error is returned.
    fn before_on(
        &self,
        scheduler: &DeadlineScheduler,
        anchor: &Anchor,
        deadline: Instant,
    ) -> Result<Stream<T>>;
}

impl<T: Item> DeadlineExt<T> for Stream<T> {
    fn before_on(
        &self,
        scheduler: &DeadlineScheduler,
        anchor: &Anchor,
        deadline: Instant,
    ) -> Result<Stream<T>> {
        let (bounded, expiry) = self.expiring(anchor);
        if bounded.is_stopped() {
            return Ok(bounded);
        }
        let timer = expiry.clone();
        if let Err(err) = scheduler.schedule_once(deadline, move || {
            if timer.expire() {
                tracing::trace!("deadline elapsed");
            }
        }) {
            expiry.expire();
            return Err(err);
        }
        Ok(bounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use ripple_core::testing::Recorder;
    use ripple_core::{Event, Source};
    use std::sync::mpsc;

    fn private() -> DeadlineScheduler {
        DeadlineScheduler::new(SchedulerConfig::default().with_thread_name("ripple-test-deadline"))
    }

    fn stop_signal<T: Item>(stream: &Stream<T>, anchor: &Anchor) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel();
        stream.on_stop(anchor, move || {
            let _ = tx.send(());
        });
        rx
    }

    #[test]
    fn deadline_stops_idle_stream() {
        let sched = private();
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        let bounded = source
            .within_on(&sched, &anchor, Duration::from_millis(20))
            .unwrap();
        let rec = Recorder::attach(&bounded, &anchor);
        let stopped = stop_signal(&bounded, &anchor);

        source.fire(1).unwrap();
        stopped.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(bounded.is_stopped());
        assert!(!source.is_stopped());
        assert_eq!(rec.events(), vec![Event::Fire(1), Event::Stop]);
        source.fire(2).unwrap();
        assert_eq!(rec.fired(), vec![1]);
    }

    #[test]
    fn parent_stop_wins_and_late_deadline_is_harmless() {
        let sched = private();
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        let bounded = source
            .within_on(&sched, &anchor, Duration::from_millis(30))
            .unwrap();
        let rec = Recorder::attach(&bounded, &anchor);

        source.fire(1).unwrap();
        source.stop();
        assert!(bounded.is_stopped());

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(rec.stop_count(), 1);
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn before_past_deadline_stops_promptly() {
        let sched = private();
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        let bounded = source
            .before_on(&sched, &anchor, Instant::now())
            .unwrap();
        let stopped = stop_signal(&bounded, &anchor);
        stopped.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(bounded.is_stopped());
    }

    #[test]
    fn stopped_parent_needs_no_deadline() {
        let sched = private();
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        source.stop();
        let bounded = source
            .within_on(&sched, &anchor, Duration::from_secs(60))
            .unwrap();
        assert!(bounded.is_stopped());
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn schedule_failure_stops_derived_stream() {
        let sched = private();
        sched.shutdown();
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        let result = source.within_on(&sched, &anchor, Duration::from_millis(10));
        assert!(matches!(result, Err(ScheduleError::ShutDown)));
        assert_eq!(source.handler_count(), 0);
    }

    #[test]
    fn non_finite_timeout_rejected() {
        let anchor = Anchor::new();
        let source = Source::<i32>::new();
        assert!(matches!(
            source.within_secs(&anchor, f64::INFINITY),
            Err(ScheduleError::NonFiniteDelay { .. })
        ));
    }

    #[test]
    fn dropped_anchor_leaves_deadline_harmless() {
        let sched = private();
        let source = Source::<i32>::new();
        {
            let anchor = Anchor::new();
            let _bounded = source
                .within_on(&sched, &anchor, Duration::from_millis(10))
                .unwrap();
        }
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(sched.pending(), 0);
        source.fire(1).unwrap();
        assert_eq!(source.handler_count(), 0);
    }
}
