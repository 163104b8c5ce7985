//! Reference-counting resource-lifetime guard
//!
//! A non-blocking primitive that lets many readers use a resource while a
//! concurrent destroyer waits for them to drain. `acquire` increments a
//! reference count, runs the action and decrements; `destroy` marks the
//! guard and the actual teardown callback runs exactly once, when the
//! count reaches zero. An acquire that loses the race against a destroy
//! backs out with [`Error::TryAgain`] so the caller can re-resolve the
//! resource and retry.
//!
//! The count is striped across a fixed number of atomic slots, picked by
//! hashing the calling thread's id, to keep the hot read path from
//! contending on a single cache line.

use shardio_common::error::{Error, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

const STRIPE_COUNT: usize = 16;

/// Striped reference-counting guard with a destroy-once callback
pub struct Guard {
    stripes: [AtomicI64; STRIPE_COUNT],
    destroyed: AtomicBool,
    torn_down: AtomicBool,
    on_destroy: Box<dyn Fn() + Send + Sync>,
}

impl Guard {
    /// Create a guard whose `on_destroy` callback runs exactly once, after
    /// `destroy` has been called and the last in-flight `acquire` has
    /// released.
    pub fn new(on_destroy: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            stripes: std::array::from_fn(|_| AtomicI64::new(0)),
            destroyed: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            on_destroy: Box::new(on_destroy),
        }
    }

    /// Run `action` while holding a reference.
    ///
    /// Returns [`Error::TryAgain`] without running the action if the guard
    /// has been destroyed.
    pub fn acquire<R>(&self, action: impl FnOnce() -> Result<R>) -> Result<R> {
        let stripe = &self.stripes[Self::stripe_index()];
        stripe.fetch_add(1, Ordering::SeqCst);
        // Decrements and re-checks teardown even if the action panics
        let _hold = StripeHold {
            guard: self,
            stripe,
        };
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::TryAgain);
        }
        action()
    }

    /// Mark the guard destroyed. Idempotent; the callback runs once the
    /// reference count reaches zero (immediately if it already is).
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.try_teardown();
    }

    /// True if `destroy` has been called (teardown may still be pending)
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn try_teardown(&self) {
        if self.destroyed.load(Ordering::SeqCst)
            && self.total() == 0
            && !self.torn_down.swap(true, Ordering::SeqCst)
        {
            (self.on_destroy)();
        }
    }

    fn total(&self) -> i64 {
        self.stripes.iter().map(|s| s.load(Ordering::SeqCst)).sum()
    }

    fn stripe_index() -> usize {
        let mut hasher = DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        (hasher.finish() as usize) % STRIPE_COUNT
    }
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("refs", &self.total())
            .field("destroyed", &self.destroyed.load(Ordering::SeqCst))
            .finish()
    }
}

struct StripeHold<'a> {
    guard: &'a Guard,
    stripe: &'a AtomicI64,
}

impl Drop for StripeHold<'_> {
    fn drop(&mut self) {
        self.stripe.fetch_sub(1, Ordering::SeqCst);
        self.guard.try_teardown();
    }
}
