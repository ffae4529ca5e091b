//! Coordination between the mining thread and the rest of the node.
//!
//! The controller owns the `can_mine` gate and the token of the attempt in
//! flight. Gate checks and token hand-out happen under one mutex, so a
//! `pause()` followed by `cancel_current()` always stops both the running
//! attempt and any attempt that was about to start.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Per-attempt cancellation flag. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug)]
struct Gate {
    can_mine: bool,
    shutdown: bool,
    current: Option<CancelToken>,
}

#[derive(Debug)]
pub struct MiningController {
    gate: Mutex<Gate>,
    wake: Condvar,
}

impl Default for MiningController {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MiningController {
    pub fn new(can_mine: bool) -> Self {
        Self {
            gate: Mutex::new(Gate {
                can_mine,
                shutdown: false,
                current: None,
            }),
            wake: Condvar::new(),
        }
    }

    pub fn pause(&self) {
        self.gate.lock().can_mine = false;
    }

    pub fn resume(&self) {
        let mut gate = self.gate.lock();
        gate.can_mine = true;
        self.wake.notify_all();
    }

    /// Cancels the attempt in flight, if any. Never blocks; a call while the
    /// miner is idle is a no-op and returns `false`.
    pub fn cancel_current(&self) -> bool {
        match self.gate.lock().current.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// `pause()` and `cancel_current()` as one step.
    pub fn preempt(&self) -> bool {
        let mut gate = self.gate.lock();
        gate.can_mine = false;
        match gate.current.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Stops the mining loop for good, waking it if idle.
    pub fn shutdown(&self) {
        let mut gate = self.gate.lock();
        gate.shutdown = true;
        if let Some(token) = gate.current.take() {
            token.cancel();
        }
        self.wake.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        !self.gate.lock().can_mine
    }

    pub fn is_shut_down(&self) -> bool {
        self.gate.lock().shutdown
    }

    pub fn is_mining(&self) -> bool {
        self.gate.lock().current.is_some()
    }

    /// Blocks while the gate is closed, then registers and returns a fresh
    /// token for the next attempt. `None` once the controller is shut down.
    pub fn next_attempt(&self) -> Option<CancelToken> {
        let mut gate = self.gate.lock();
        while !gate.can_mine && !gate.shutdown {
            self.wake.wait(&mut gate);
        }
        Self::issue(&mut gate)
    }

    /// Like `next_attempt`, but gives up after `timeout`.
    pub fn next_attempt_timeout(&self, timeout: Duration) -> Option<CancelToken> {
        let mut gate = self.gate.lock();
        while !gate.can_mine && !gate.shutdown {
            if self.wake.wait_for(&mut gate, timeout).timed_out() {
                break;
            }
        }
        if !gate.can_mine {
            return None;
        }
        Self::issue(&mut gate)
    }

    fn issue(gate: &mut Gate) -> Option<CancelToken> {
        if gate.shutdown {
            return None;
        }
        let token = CancelToken::new();
        gate.current = Some(token.clone());
        Some(token)
    }

    /// Called by the miner when its attempt found a nonce. Closes the gate and
    /// returns `true`, unless the attempt was cancelled in the meantime, in
    /// which case the block is stale and must be dropped.
    pub fn claim_success(&self, token: &CancelToken) -> bool {
        let mut gate = self.gate.lock();
        if gate.current.as_ref().is_some_and(|t| t.same_as(token)) {
            gate.current = None;
        }
        if token.is_cancelled() || gate.shutdown {
            debug!("mined block discarded, attempt was preempted");
            return false;
        }
        gate.can_mine = false;
        true
    }

    /// Forgets `token` if it is still the registered attempt.
    pub fn finish_attempt(&self, token: &CancelToken) {
        let mut gate = self.gate.lock();
        if gate.current.as_ref().is_some_and(|t| t.same_as(token)) {
            gate.current = None;
        }
    }
}
