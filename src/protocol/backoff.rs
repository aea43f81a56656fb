use super::{distinct, PairGuard, Protocol, Retry};
use crate::account::Accounts;
use crate::config::LockingStrategy;
use crate::error::Result;

/// Lock `from`, then try `to` without blocking. On a miss, release `from` and return [`Retry`].
///
/// No thread ever blocks while holding an account another thread is waiting for, so this cannot
/// deadlock. Unlucky schedules can livelock; the yield in [`retry_loop`](super::retry_loop) makes
/// that unlikely but does not rule it out.
#[derive(Debug, Default, Clone, Copy)]
pub struct Backoff;

impl Protocol for Backoff {
    const STRATEGY: LockingStrategy = LockingStrategy::Backoff;

    fn acquire_pair<'a>(
        &self,
        accounts: &'a Accounts,
        from: usize,
        to: usize,
    ) -> Result<Result<PairGuard<'a>, Retry>> {
        distinct(from, to)?;
        let from_guard = accounts.lock(from)?;
        match accounts.try_lock(to)? {
            Some(to_guard) => Ok(Ok(PairGuard::new(from_guard, to_guard))),
            None => {
                drop(from_guard);
                Ok(Err(Retry::new(from, to)))
            }
        }
    }
}

#[cfg(all(test, not(feature = "loom-tests")))]
mod tests {
    use super::*;
    use crate::protocol::tests::stress;

    #[test]
    fn miss_releases_source() {
        let accounts = Accounts::new(2, 10, true);
        let held = accounts.lock(1).unwrap();

        let retry = Backoff.acquire_pair(&accounts, 0, 1).unwrap();
        assert_eq!(retry.err(), Some(Retry::new(0, 1)));
        assert!(accounts.try_lock(0).unwrap().is_some());

        drop(held);
        let pair = Backoff.acquire_pair(&accounts, 0, 1).unwrap().unwrap();
        assert_eq!((pair.from(), pair.to()), (0, 1));
    }

    #[test]
    fn swapped_pairs_do_not_deadlock() {
        stress::<Backoff>(2, 8, 2_000);
    }

    #[test]
    fn conserves_across_many_accounts() {
        stress::<Backoff>(10, 20, 2_000);
    }
}
