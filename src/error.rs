use std::time::Duration;

use thiserror::Error;

use crate::config::LockingStrategy;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A [`Config`](crate::Config) that cannot be run. Reported before any worker starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Transfers need two distinct accounts.
    #[error("at least 2 accounts are required to pick distinct transfer pairs, got {0}")]
    TooFewAccounts(usize),

    /// Zero worker threads.
    #[error("thread count must be positive")]
    NoThreads,

    /// Zero rounds per worker.
    #[error("rounds per thread must be positive")]
    NoRounds,

    /// `account_count * initial_balance` does not fit in a `u64`.
    #[error("{accounts} accounts of {initial_balance} overflow the total balance")]
    BalanceOverflow {
        /// Requested account count.
        accounts: usize,
        /// Requested starting balance per account.
        initial_balance: u64,
    },

    /// A benchmark asked for zero runs.
    #[error("benchmark repeat count must be positive")]
    NoRuns,

    /// The request-order strategy can deadlock and must run under a watchdog.
    #[error("strategy `{0}` can deadlock; set a watchdog to run it")]
    DeadlockProneWithoutWatchdog(LockingStrategy),

    /// Unrecognized strategy name.
    #[error("unknown locking strategy `{0}`, expected one of none, coarse, ordered, backoff")]
    UnknownStrategy(String),
}

/// Errors produced while running a simulation.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An account index outside the store.
    #[error("account index {index} out of range for {len} accounts")]
    AccountOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of accounts in the store.
        len: usize,
    },

    /// A transfer named the same account as source and destination.
    #[error("cannot transfer from account {index} to itself")]
    SameAccount {
        /// The repeated index.
        index: usize,
    },

    /// An adjustment would have driven a balance below zero.
    #[error("adjusting account {index} (balance {balance}) by {delta} would overdraw it")]
    Overdrawn {
        /// Account index.
        index: usize,
        /// Balance before the adjustment.
        balance: u64,
        /// Rejected adjustment.
        delta: i64,
    },

    /// An adjustment would have pushed a balance past `u64::MAX`.
    #[error("adjusting account {index} (balance {balance}) by {delta} overflows it")]
    Overflow {
        /// Account index.
        index: usize,
        /// Balance before the adjustment.
        balance: u64,
        /// Rejected adjustment.
        delta: i64,
    },

    /// The final total differs from the initial total under a strategy that claims correctness.
    #[error("{strategy} strategy lost conservation: expected {expected}, found {actual}")]
    ConservationViolated {
        /// Strategy that was running.
        strategy: LockingStrategy,
        /// `account_count * initial_balance`.
        expected: u64,
        /// Sum of final balances.
        actual: u64,
    },

    /// The watchdog expired before every worker finished.
    #[error("{finished} of {threads} workers finished before the {after:?} watchdog expired")]
    Stalled {
        /// Watchdog duration.
        after: Duration,
        /// Workers that completed in time.
        finished: usize,
        /// Workers started.
        threads: usize,
    },

    /// A worker thread panicked.
    #[error("a transfer worker panicked")]
    WorkerPanicked,

    /// The OS refused to spawn a thread.
    #[error("failed to spawn thread")]
    Spawn(#[from] std::io::Error),
}
