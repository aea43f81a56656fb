//! Strategies for acquiring the two accounts of a transfer.
//!
//! Every strategy implements [`Protocol::acquire_pair`]. A successful acquisition yields a
//! [`PairGuard`]; dropping it (or calling [`PairGuard::release`]) releases exactly what was
//! acquired. A strategy that gave up on a contended lock returns [`Retry`], and the caller should
//! start the acquisition over. [`retry_loop`] does that.

mod backoff;
mod ordered;
mod request_order;
mod unsync;

pub use backoff::Backoff;
pub use ordered::CanonicalOrder;
pub use request_order::RequestOrder;
pub use unsync::Unsynchronized;

use crate::account::{AccountGuard, Accounts};
use crate::config::LockingStrategy;
use crate::error::{Error, Result};
use crate::sync::thread;

/// A way of gaining exclusive access to two distinct accounts.
///
/// Every strategy rejects `from == to` with [`Error::SameAccount`] before touching a lock. None of
/// them acquire the same account twice, so the account locks need not be reentrant.
pub trait Protocol: Send + Sync + 'static {
    /// The strategy this protocol implements.
    const STRATEGY: LockingStrategy;

    /// Whether accounts need [`AccountLock::Exclusive`](crate::account::AccountLock) locks.
    const USES_LOCKS: bool = Self::STRATEGY.uses_locks();

    /// Acquire `from` and `to`.
    ///
    /// The outer `Result` reports an invalid index or a self-transfer. The inner `Err(Retry)` means nothing is held
    /// and the caller should try again.
    fn acquire_pair<'a>(
        &self,
        accounts: &'a Accounts,
        from: usize,
        to: usize,
    ) -> Result<Result<PairGuard<'a>, Retry>>;
}

/// Reject a pair that names one account twice. Taking a non-reentrant lock twice would hang.
fn distinct(from: usize, to: usize) -> Result<()> {
    if from == to {
        return Err(Error::SameAccount { index: from });
    }
    Ok(())
}

/// Both accounts of a transfer, held until dropped.
pub struct PairGuard<'a> {
    // Dropped in declaration order: `to` is released before `from`.
    to: AccountGuard<'a>,
    from: AccountGuard<'a>,
}

impl<'a> PairGuard<'a> {
    fn new(from: AccountGuard<'a>, to: AccountGuard<'a>) -> Self {
        debug_assert_ne!(from.index(), to.index());
        PairGuard { to, from }
    }

    /// Source account index.
    pub fn from(&self) -> usize {
        self.from.index()
    }

    /// Destination account index.
    pub fn to(&self) -> usize {
        self.to.index()
    }

    /// Release both accounts.
    pub fn release(self) {
        drop(self);
    }
}

/// Marker returned when a [`Protocol`] released everything it held after a contended lock.
///
/// Use [`retry_loop`] to get the correct behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retry {
    from: usize,
    to: usize,
}

impl Retry {
    fn new(from: usize, to: usize) -> Self {
        Retry { from, to }
    }

    /// The pair whose acquisition failed.
    pub fn pair(&self) -> (usize, usize) {
        (self.from, self.to)
    }

    /// Give up the rest of this scheduling turn before trying again.
    ///
    /// A yield, not a sleep: the contending holder is usually only a few instructions from
    /// releasing.
    fn wait(self) {
        thread::yield_now();
    }
}

/// Run `f` until it stops returning [`Retry`], yielding between attempts. Returns the successful
/// value and how many attempts were retried.
///
/// ```
/// use banksim::account::Accounts;
/// use banksim::protocol::{retry_loop, Backoff, Protocol};
///
/// let accounts = Accounts::new(2, 10, true);
/// let (moved, _retries) = retry_loop(|| {
///     Ok(Backoff.acquire_pair(&accounts, 0, 1)?.map(|pair| {
///         let moved = accounts.transfer(pair.from(), pair.to(), |_| 4);
///         pair.release();
///         moved
///     }))
/// })
/// .unwrap();
///
/// assert_eq!(moved.unwrap(), Some(4));
/// assert_eq!(accounts.balances(), vec![6, 14]);
/// ```
pub fn retry_loop<T, F>(mut f: F) -> Result<(T, u64)>
where
    F: FnMut() -> Result<Result<T, Retry>>,
{
    let mut retries = 0;
    loop {
        match f()? {
            Ok(t) => return Ok((t, retries)),
            Err(retry) => {
                retries += 1;
                retry.wait();
            }
        }
    }
}
