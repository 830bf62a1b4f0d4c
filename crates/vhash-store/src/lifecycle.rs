//! Shutdown coordination between a [`Store`](crate::Store) and the
//! components running on top of it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A component that must stop accepting work when its store closes.
pub trait Subsystem: Send + Sync {
    fn name(&self) -> &str;

    /// Stop taking new work. Must not block on the store.
    fn stop(&self);
}

#[derive(Default)]
struct LatchState {
    released: Mutex<bool>,
    condvar: Condvar,
}

/// One-shot gate that [`Store::close`](crate::Store::close) waits on.
///
/// Clones share state: the component keeps one clone and releases it once
/// drained; the store waits on another.
#[derive(Clone, Default)]
pub struct ShutdownLatch {
    state: Arc<LatchState>,
}

impl ShutdownLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn release(&self) {
        let mut released = self.state.released.lock();
        *released = true;
        self.state.condvar.notify_all();
    }

    pub fn is_released(&self) -> bool {
        *self.state.released.lock()
    }

    /// Block until released.
    pub fn wait(&self) {
        let mut released = self.state.released.lock();
        while !*released {
            self.state.condvar.wait(&mut released);
        }
    }

    /// Block until released or `timeout` elapses. Returns `true` if released.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut released = self.state.released.lock();
        while !*released {
            if self.state.condvar.wait_until(&mut released, deadline).timed_out() {
                break;
            }
        }
        *released
    }
}

impl std::fmt::Debug for ShutdownLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownLatch")
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn release_wakes_waiter() {
        let latch = ShutdownLatch::new();
        let remote = latch.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.release();
        });
        latch.wait();
        assert!(latch.is_released());
        handle.join().unwrap();
    }

    #[test]
    fn wait_after_release_returns_immediately() {
        let latch = ShutdownLatch::new();
        latch.release();
        latch.wait();
        assert!(latch.wait_timeout(Duration::ZERO));
    }

    #[test]
    fn wait_timeout_expires() {
        let latch = ShutdownLatch::new();
        assert!(!latch.wait_timeout(Duration::from_millis(10)));
        assert!(!latch.is_released());
    }
}
