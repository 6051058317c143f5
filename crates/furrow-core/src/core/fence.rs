use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::signal::AutoResetSignal;

/// Cross-thread synchronization point signaled by the dispatch thread.
///
/// Producers queue `SignalFence` commands and later block on
/// [`wait`](Self::wait); a fence signaled with a value also publishes that
/// value for waiters that track dispatch progress via [`value`](Self::value).
/// Signals are counted, so a waiter consumes exactly one signal per wait and
/// never wakes spuriously.
#[derive(Debug, Default)]
pub struct Fence {
    signal: AutoResetSignal,
    value: AtomicU32,
}

impl Fence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wakes one waiter without changing the stored value.
    pub fn signal(&self) {
        self.signal.signal();
    }

    /// Stores `value`, then wakes one waiter.
    pub fn signal_value(&self, value: u32) {
        self.value.store(value, Ordering::Release);
        self.signal.signal();
    }

    /// Blocks until the fence has been signaled since the last wait.
    pub fn wait(&self) {
        self.signal.wait();
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`. Returns
    /// whether a signal was consumed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.signal.wait_timeout(timeout)
    }

    /// Last value stored by [`signal_value`](Self::signal_value).
    pub fn value(&self) -> u32 {
        self.value.load(Ordering::Acquire)
    }
}
