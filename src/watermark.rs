//! Peak occupancy of the transfer critical section.
//!
//! Workers call [`Watermark::enter`] once they hold both accounts and [`Watermark::exit`] before
//! releasing them. The highest occupancy ever seen is kept as `best`; each new best wakes the
//! reporter, which forwards it to a channel until [`Watermark::close`] is called.
//!
//! ```
//! use banksim::watermark::Watermark;
//!
//! let watermark = Watermark::new();
//! watermark.enter();
//! watermark.enter();
//! watermark.exit();
//! watermark.exit();
//!
//! assert_eq!(watermark.current(), 0);
//! assert_eq!(watermark.best(), 2);
//! assert_eq!(watermark.next_peak(0), Some(2));
//!
//! watermark.close();
//! assert_eq!(watermark.next_peak(2), None);
//! ```

use std::sync::{Arc, PoisonError};

use crossbeam::channel::{self, Receiver};

use crate::error::Result;
use crate::sync::{Condvar, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Level {
    current: usize,
    best: usize,
    closed: bool,
}

/// Live and historical-maximum count of threads inside the critical section.
///
/// Both counts only change under one lock, and readers take the same lock.
pub struct Watermark {
    level: Mutex<Level>,
    raised: Condvar,
}

impl Default for Watermark {
    fn default() -> Self {
        Watermark::new()
    }
}

impl Watermark {
    /// A tracker with nobody inside.
    pub fn new() -> Self {
        Watermark {
            level: Mutex::new(Level::default()),
            raised: Condvar::new(),
        }
    }

    fn level(&self) -> MutexGuard<'_, Level> {
        // Every update leaves `Level` consistent, so a poisoned lock is still usable.
        self.level.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a thread entering. Wakes the reporter if this sets a new best.
    pub fn enter(&self) {
        let mut level = self.level();
        level.current += 1;
        if level.current > level.best {
            level.best = level.current;
            self.raised.notify_one();
        }
    }

    /// Record a thread leaving. Never changes the best.
    pub fn exit(&self) {
        let mut level = self.level();
        debug_assert!(level.current > 0, "exit without matching enter");
        level.current = level.current.saturating_sub(1);
    }

    /// [`enter`](Self::enter) now and [`exit`](Self::exit) when the returned guard drops.
    pub fn occupy(&self) -> Occupancy<'_> {
        self.enter();
        Occupancy { watermark: self }
    }

    /// Threads inside right now.
    pub fn current(&self) -> usize {
        self.level().current
    }

    /// Highest occupancy seen so far.
    pub fn best(&self) -> usize {
        self.level().best
    }

    /// Block until the best differs from `last`, then return it. `None` once the tracker is
    /// closed and `last` is already the final best.
    ///
    /// Returns immediately if a new best was set since `last` was read, so no peak is lost
    /// between calls.
    pub fn next_peak(&self, last: usize) -> Option<usize> {
        let mut level = self.level();
        while level.best == last && !level.closed {
            level = self
                .raised
                .wait(level)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if level.best == last {
            None
        } else {
            Some(level.best)
        }
    }

    /// Stop tracking new peaks: wakes every [`next_peak`](Self::next_peak) waiter so the reporter
    /// can deliver the final best and exit.
    pub fn close(&self) {
        self.level().closed = true;
        self.raised.notify_all();
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.level().closed
    }

    /// Start the reporter thread and return the stream of new peaks it observes.
    ///
    /// Values are strictly increasing; peaks set in quick succession may be coalesced into the
    /// latest one. The reporter is never joined. It exits after [`close`](Self::close), which
    /// disconnects the stream, or once the receiver is dropped and it next wakes.
    pub fn subscribe(self: &Arc<Self>) -> Result<Receiver<usize>> {
        let (tx, rx) = channel::unbounded();
        let watermark = Arc::clone(self);

        std::thread::Builder::new()
            .name("watermark-reporter".into())
            .spawn(move || {
                let mut last = 0;
                while let Some(peak) = watermark.next_peak(last) {
                    tracing::trace!(peak, "new watermark");
                    if tx.send(peak).is_err() {
                        tracing::trace!("watermark subscriber gone, reporter exiting");
                        return;
                    }
                    last = peak;
                }
                tracing::trace!(best = last, "watermark closed, reporter exiting");
            })?;

        Ok(rx)
    }
}

impl core::fmt::Debug for Watermark {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let level = self.level();
        f.debug_struct("Watermark")
            .field("current", &level.current)
            .field("best", &level.best)
            .field("closed", &level.closed)
            .finish()
    }
}

/// Guard for one thread's stay inside the critical section. See [`Watermark::occupy`].
pub struct Occupancy<'w> {
    watermark: &'w Watermark,
}

impl<'w> Drop for Occupancy<'w> {
    fn drop(&mut self) {
        self.watermark.exit();
    }
}
