#![forbid(unsafe_code)]

//! Locking helpers shared by the kernel.
//!
//! Handler panics propagate through dispatch, so any mutex held across a
//! handler call may end up poisoned. The kernel's own state stays consistent
//! across such unwinds, so poisoning is recovered rather than re-raised.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// Lock a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-node re-entrant dispatch gate.
///
/// `fire` holds the gate for the whole dispatch, which serializes dispatch of
/// one node across threads. `stop` holds it only long enough to wait out a
/// fire in progress and flip the stopped flag. The owning thread may re-enter
/// (a handler stopping the stream it observes, or a diamond that reaches the
/// same node twice).
///
/// Subscription does not take the gate. While holding a gate the kernel only
/// waits on the gate of a descendant. A handler that fires an ancestor of its
/// own stream while another thread is dispatching that ancestor can still
/// deadlock; an acyclic stream graph never does that.
#[derive(Debug, Default)]
pub(crate) struct DispatchGate {
    state: Mutex<GateState>,
    released: Condvar,
}

#[derive(Debug, Default)]
struct GateState {
    owner: Option<ThreadId>,
    depth: usize,
}

impl DispatchGate {
    pub(crate) fn enter(&self) -> GateGuard<'_> {
        let me = thread::current().id();
        let mut state = lock(&self.state);
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    break;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    break;
                }
                Some(_) => {
                    state = self
                        .released
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
        GateGuard { gate: self }
    }
}

/// Releases one level of the gate on drop, including during unwinding.
pub(crate) struct GateGuard<'a> {
    gate: &'a DispatchGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.gate.state);
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.owner = None;
            self.gate.released.notify_one();
        }
    }
}
