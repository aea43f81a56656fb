//! The fixed-size account table every worker shares.
//!
//! Accounts are created once, addressed only by index, and never resized. A balance may only be
//! changed while the account's lock is held, except in an unlocked store where writes race on
//! purpose.

use std::sync::PoisonError;
use std::sync::TryLockError;

use crate::error::{Error, Result};
use crate::sync::{AtomicU64, Mutex, MutexGuard, Ordering};

/// The lock attached to one account, chosen once when the store is built.
pub enum AccountLock {
    /// No lock. Used by the unsynchronized strategy.
    Unlocked,
    /// A non-reentrant exclusive lock.
    Exclusive(Mutex<()>),
}

/// A single account.
pub struct Account {
    balance: AtomicU64,
    lock: AccountLock,
}

impl Account {
    fn new(balance: u64, with_lock: bool) -> Self {
        Account {
            balance: AtomicU64::new(balance),
            lock: if with_lock {
                AccountLock::Exclusive(Mutex::new(()))
            } else {
                AccountLock::Unlocked
            },
        }
    }

    /// The lock guarding this account's balance.
    pub fn lock(&self) -> &AccountLock {
        &self.lock
    }

    /// Current balance. Only stable while the account's lock is held.
    pub fn balance(&self) -> u64 {
        self.balance.load(Ordering::Relaxed)
    }
}

/// Proof that the holder owns an account until the guard is dropped.
///
/// For an [`AccountLock::Unlocked`] account the guard owns nothing.
pub struct AccountGuard<'a> {
    index: usize,
    _native: Option<MutexGuard<'a, ()>>,
}

impl<'a> AccountGuard<'a> {
    pub(crate) fn detached(index: usize) -> Self {
        AccountGuard {
            index,
            _native: None,
        }
    }

    /// Index of the account this guard was taken for.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Arena of accounts indexed `0..len`.
pub struct Accounts {
    accounts: Box<[Account]>,
}

impl core::fmt::Debug for Accounts {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_list().entries(self.balances()).finish()
    }
}

impl Accounts {
    /// Create `count` accounts holding `initial_balance` each. `with_locks` picks between
    /// [`AccountLock::Exclusive`] and [`AccountLock::Unlocked`] for every account.
    pub fn new(count: usize, initial_balance: u64, with_locks: bool) -> Self {
        Accounts {
            accounts: (0..count)
                .map(|_| Account::new(initial_balance, with_locks))
                .collect(),
        }
    }

    /// Number of accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether the store has no accounts.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Account `index`.
    pub fn account(&self, index: usize) -> Result<&Account> {
        self.accounts.get(index).ok_or(Error::AccountOutOfRange {
            index,
            len: self.accounts.len(),
        })
    }

    /// Current balance of account `index`.
    pub fn get_balance(&self, index: usize) -> Result<u64> {
        Ok(self.account(index)?.balance())
    }

    /// Add `delta` to account `index` and return the new balance.
    ///
    /// This is a plain read followed by a write, not an atomic read-modify-write: the caller must
    /// hold the account's lock or accept lost updates.
    pub fn adjust_balance(&self, index: usize, delta: i64) -> Result<u64> {
        let account = self.account(index)?;
        let balance = account.balance.load(Ordering::Relaxed);
        let updated = if delta.is_negative() {
            balance
                .checked_sub(delta.unsigned_abs())
                .ok_or(Error::Overdrawn {
                    index,
                    balance,
                    delta,
                })?
        } else {
            balance
                .checked_add(delta.unsigned_abs())
                .ok_or(Error::Overflow {
                    index,
                    balance,
                    delta,
                })?
        };
        account.balance.store(updated, Ordering::Relaxed);
        Ok(updated)
    }

    /// Move money from `from` to `to`. `payment` picks the amount given the source balance and
    /// must return a value in `1..=balance`. Returns the amount moved, or `None` when `from` is
    /// empty.
    ///
    /// The source balance is read once, so a racing writer can lose updates but never drive it
    /// below zero.
    pub fn transfer(
        &self,
        from: usize,
        to: usize,
        payment: impl FnOnce(u64) -> u64,
    ) -> Result<Option<u64>> {
        let source = self.account(from)?;
        self.account(to)?;

        let balance = source.balance.load(Ordering::Relaxed);
        if balance == 0 {
            return Ok(None);
        }

        let amount = payment(balance);
        let remaining = balance.checked_sub(amount).ok_or(Error::Overdrawn {
            index: from,
            balance,
            delta: i64::try_from(amount).map_or(i64::MIN, |a| -a),
        })?;
        source.balance.store(remaining, Ordering::Relaxed);
        self.credit(to, amount)?;
        Ok(Some(amount))
    }

    fn credit(&self, index: usize, amount: u64) -> Result<()> {
        let account = self.account(index)?;
        let balance = account.balance.load(Ordering::Relaxed);
        let updated = balance.checked_add(amount).ok_or(Error::Overflow {
            index,
            balance,
            delta: i64::try_from(amount).unwrap_or(i64::MAX),
        })?;
        account.balance.store(updated, Ordering::Relaxed);
        Ok(())
    }

    /// Acquire account `index`, blocking until it is free.
    pub fn lock(&self, index: usize) -> Result<AccountGuard<'_>> {
        let native = match &self.account(index)?.lock {
            AccountLock::Unlocked => None,
            AccountLock::Exclusive(mutex) => {
                Some(mutex.lock().unwrap_or_else(PoisonError::into_inner))
            }
        };
        Ok(AccountGuard {
            index,
            _native: native,
        })
    }

    /// Acquire account `index` if it is free right now. `Ok(None)` means another thread holds it.
    pub fn try_lock(&self, index: usize) -> Result<Option<AccountGuard<'_>>> {
        let native = match &self.account(index)?.lock {
            AccountLock::Unlocked => None,
            AccountLock::Exclusive(mutex) => match mutex.try_lock() {
                Ok(g) => Some(g),
                Err(TryLockError::Poisoned(p)) => Some(p.into_inner()),
                Err(TryLockError::WouldBlock) => return Ok(None),
            },
        };
        Ok(Some(AccountGuard {
            index,
            _native: native,
        }))
    }

    /// Snapshot of every balance. Only consistent once no worker is running.
    pub fn balances(&self) -> Vec<u64> {
        self.accounts
            .iter()
            .map(Account::balance)
            .collect()
    }

    /// Sum of every balance. Only meaningful once no worker is running.
    pub fn total(&self) -> u64 {
        self.accounts
            .iter()
            .map(Account::balance)
            .fold(0, u64::saturating_add)
    }
}

#[cfg(all(test, not(feature = "loom-tests")))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn out_of_range_index_is_an_error() {
        let accounts = Accounts::new(3, 10, true);
        assert!(matches!(
            accounts.get_balance(3),
            Err(Error::AccountOutOfRange { index: 3, len: 3 })
        ));
        assert!(matches!(
            accounts.adjust_balance(7, 1),
            Err(Error::AccountOutOfRange { index: 7, len: 3 })
        ));
        assert!(accounts.lock(3).is_err());
        assert!(accounts.transfer(0, 3, |_| 1).is_err());
        assert_eq!(accounts.total(), 30);
    }

    #[test]
    fn adjust_balance_refuses_to_overdraw() {
        let accounts = Accounts::new(2, 10, true);
        assert_eq!(accounts.adjust_balance(0, -4).unwrap(), 6);
        assert_eq!(accounts.adjust_balance(1, 4).unwrap(), 14);
        assert!(matches!(
            accounts.adjust_balance(0, -7),
            Err(Error::Overdrawn {
                index: 0,
                balance: 6,
                delta: -7
            })
        ));
        assert_eq!(accounts.balances(), vec![6, 14]);
    }

    #[test]
    fn transfer_from_empty_account_is_a_no_op() {
        let accounts = Accounts::new(2, 0, true);
        let moved = accounts
            .transfer(0, 1, |_| unreachable!("no payment from an empty account"))
            .unwrap();
        assert_eq!(moved, None);
        assert_eq!(accounts.balances(), vec![0, 0]);
    }

    #[test]
    fn transfer_moves_the_chosen_amount() {
        let accounts = Accounts::new(2, 100, true);
        assert_eq!(accounts.transfer(1, 0, |b| b).unwrap(), Some(100));
        assert_eq!(accounts.balances(), vec![200, 0]);
        assert_eq!(accounts.total(), 200);
    }

    #[test]
    fn try_lock_misses_while_held() {
        let accounts = Accounts::new(2, 1, true);

        crossbeam::thread::scope(|s| {
            let held = accounts.lock(0).unwrap();
            assert_eq!(held.index(), 0);

            s.spawn(|_| {
                assert!(accounts.try_lock(0).unwrap().is_none());
                assert!(accounts.try_lock(1).unwrap().is_some());
            })
            .join()
            .unwrap();

            drop(held);
            assert!(accounts.try_lock(0).unwrap().is_some());
        })
        .unwrap();
    }

    #[test]
    fn lock_blocks_until_released() {
        let accounts = Accounts::new(2, 1, true);

        crossbeam::thread::scope(|s| {
            let held = accounts.lock(1).unwrap();

            s.spawn(|_| {
                let _g = accounts.lock(1).unwrap();
                accounts.adjust_balance(1, 1).unwrap();
            });

            std::thread::sleep(Duration::from_millis(50));
            assert_eq!(accounts.get_balance(1).unwrap(), 1);
            drop(held);
        })
        .unwrap();

        assert_eq!(accounts.get_balance(1).unwrap(), 2);
    }

    #[test]
    fn unlocked_store_never_blocks() {
        let accounts = Accounts::new(2, 1, false);
        assert!(matches!(
            accounts.account(0).unwrap().lock(),
            AccountLock::Unlocked
        ));

        let _a = accounts.lock(0).unwrap();
        let _b = accounts.lock(0).unwrap();
        assert!(accounts.try_lock(0).unwrap().is_some());
    }
}
