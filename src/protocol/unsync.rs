use super::{distinct, PairGuard, Protocol, Retry};
use crate::account::{AccountGuard, Accounts};
use crate::config::LockingStrategy;
use crate::error::{Error, Result};

/// Acquire nothing.
///
/// Concurrent transfers touching the same account interleave their reads and writes, so updates
/// get lost and the total drifts. Never use this where conservation matters.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unsynchronized;

impl Protocol for Unsynchronized {
    const STRATEGY: LockingStrategy = LockingStrategy::None;

    fn acquire_pair<'a>(
        &self,
        accounts: &'a Accounts,
        from: usize,
        to: usize,
    ) -> Result<Result<PairGuard<'a>, Retry>> {
        distinct(from, to)?;
        if let Some(&index) = [from, to].iter().find(|&&i| i >= accounts.len()) {
            return Err(Error::AccountOutOfRange {
                index,
                len: accounts.len(),
            });
        }
        Ok(Ok(PairGuard::new(
            AccountGuard::detached(from),
            AccountGuard::detached(to),
        )))
    }
}
