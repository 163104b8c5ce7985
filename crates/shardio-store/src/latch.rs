//! One-shot completion latch
//!
//! Lets a part submitter block until the merge pipeline has consumed its
//! delta. Counted down exactly once by the consumer; waiting after the
//! count-down returns immediately.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// A one-shot countdown latch (count of one)
#[derive(Debug, Default)]
pub struct CompletionLatch {
    done: Mutex<bool>,
    cond: Condvar,
}

impl CompletionLatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Release all current and future waiters. Idempotent.
    pub fn count_down(&self) {
        let mut done = self.done.lock();
        *done = true;
        self.cond.notify_all();
    }

    /// Block until the latch has been counted down
    pub fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.cond.wait(&mut done);
        }
    }

    /// Block until the latch has been counted down or the timeout elapses.
    /// Returns true if the latch was counted down.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut done = self.done.lock();
        while !*done {
            if self.cond.wait_until(&mut done, deadline).timed_out() {
                return *done;
            }
        }
        true
    }

    /// True if the latch has already been counted down
    pub fn is_done(&self) -> bool {
        *self.done.lock()
    }
}
