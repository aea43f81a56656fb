use super::{distinct, PairGuard, Protocol, Retry};
use crate::account::Accounts;
use crate::config::LockingStrategy;
use crate::error::Result;

/// Lock the pair in a consistent order regardless of request order.
///
/// The lower account index is always locked first. Locking in a known order makes deadlocks
/// impossible, as long as all locks are acquired through the order-preserving method: every
/// thread's acquisitions follow the same total order, so the wait-for graph has no cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct CanonicalOrder;

impl Protocol for CanonicalOrder {
    const STRATEGY: LockingStrategy = LockingStrategy::Ordered;

    fn acquire_pair<'a>(
        &self,
        accounts: &'a Accounts,
        from: usize,
        to: usize,
    ) -> Result<Result<PairGuard<'a>, Retry>> {
        distinct(from, to)?;
        let (first, second) = (from.min(to), from.max(to));
        let first = accounts.lock(first)?;
        let second = accounts.lock(second)?;

        Ok(Ok(if from < to {
            PairGuard::new(first, second)
        } else {
            PairGuard::new(second, first)
        }))
    }
}


#[cfg(all(test, feature = "loom-tests"))]
mod loom_tests {
    use super::*;

    use loom::{self, sync::Arc};

    #[test]
    fn loom_deadlock() {
        loom::model(|| {
            let accounts = Arc::new(Accounts::new(2, 5, true));

            let t1 = {
                let accounts = accounts.clone();
                loom::thread::spawn(move || {
                    let pair = CanonicalOrder.acquire_pair(&accounts, 0, 1).unwrap().unwrap();
                    accounts.transfer(pair.from(), pair.to(), |b| b).unwrap();
                })
            };

            let t2 = {
                let accounts = accounts.clone();
                loom::thread::spawn(move || {
                    let pair = CanonicalOrder.acquire_pair(&accounts, 1, 0).unwrap().unwrap();
                    accounts.transfer(pair.from(), pair.to(), |_| 1).unwrap();
                })
            };

            t1.join().unwrap();
            t2.join().unwrap();

            assert_eq!(accounts.total(), 10);
        });
    }
}
