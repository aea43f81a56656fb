use super::{distinct, PairGuard, Protocol, Retry};
use crate::account::Accounts;
use crate::config::LockingStrategy;
use crate::error::Result;

/// Lock `from`, then `to`, blocking on each.
///
/// # Deadlock
///
/// Two workers moving money in opposite directions between the same accounts can each take
/// their first lock and then wait on the other's forever. This strategy keeps that hazard so it
/// can be measured; [`Config::validate`](crate::Config::validate) only accepts it with a
/// watchdog.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestOrder;

impl Protocol for RequestOrder {
    const STRATEGY: LockingStrategy = LockingStrategy::Coarse;

    fn acquire_pair<'a>(
        &self,
        accounts: &'a Accounts,
        from: usize,
        to: usize,
    ) -> Result<Result<PairGuard<'a>, Retry>> {
        distinct(from, to)?;
        let from = accounts.lock(from)?;
        let to = accounts.lock(to)?;
        Ok(Ok(PairGuard::new(from, to)))
    }
}
