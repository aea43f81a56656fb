use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// How a worker gains exclusive access to the two accounts of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockingStrategy {
    /// No locking at all. Transfers race and the total is not conserved.
    None,
    /// Lock `from` then `to`. Can deadlock.
    Coarse,
    /// Lock the lower index first.
    #[default]
    Ordered,
    /// Lock `from`, try `to`, release and yield on a miss.
    Backoff,
}

impl LockingStrategy {
    /// Every strategy, in order of increasing correctness.
    pub const ALL: [LockingStrategy; 4] = [
        LockingStrategy::None,
        LockingStrategy::Coarse,
        LockingStrategy::Ordered,
        LockingStrategy::Backoff,
    ];

    /// Whether the strategy guarantees the total balance is conserved.
    pub fn conserves(self) -> bool {
        !matches!(self, LockingStrategy::None)
    }

    /// Whether accounts carry an exclusive lock under this strategy.
    pub const fn uses_locks(self) -> bool {
        !matches!(self, LockingStrategy::None)
    }

    /// Whether two workers with swapped pairs can block each other forever.
    pub fn deadlock_prone(self) -> bool {
        matches!(self, LockingStrategy::Coarse)
    }

    fn name(self) -> &'static str {
        match self {
            LockingStrategy::None => "none",
            LockingStrategy::Coarse => "coarse",
            LockingStrategy::Ordered => "ordered",
            LockingStrategy::Backoff => "backoff",
        }
    }
}

impl fmt::Display for LockingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LockingStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LockingStrategy::ALL
            .iter()
            .copied()
            .find(|strategy| strategy.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownStrategy(s.to_string()))
    }
}

/// Parameters of a single simulation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of accounts in the store.
    pub account_count: usize,
    /// Number of transfer workers.
    pub thread_count: usize,
    /// Transfer rounds each worker performs.
    pub rounds_per_thread: usize,
    /// Starting balance of every account.
    pub initial_balance: u64,
    /// Locking discipline for the transfer critical section.
    pub strategy: LockingStrategy,
    /// Base seed for the workers' random choices. Worker `k` uses `seed + k`.
    pub seed: Option<u64>,
    /// Track the peak number of workers inside the critical section.
    pub watermark: bool,
    /// Give up on workers that have not finished after this long.
    pub watchdog: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            account_count: 10,
            thread_count: 20,
            rounds_per_thread: 10_000,
            initial_balance: 100,
            strategy: LockingStrategy::default(),
            seed: None,
            watermark: false,
            watchdog: None,
        }
    }
}

impl Config {
    /// Total money in the system, constant for conserving strategies.
    ///
    /// Only meaningful after [`Config::validate`] succeeded; saturates otherwise.
    pub fn expected_total(&self) -> u64 {
        (self.account_count as u64).saturating_mul(self.initial_balance)
    }

    /// Reject configurations that cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.account_count < 2 {
            return Err(ConfigError::TooFewAccounts(self.account_count));
        }
        if self.thread_count == 0 {
            return Err(ConfigError::NoThreads);
        }
        if self.rounds_per_thread == 0 {
            return Err(ConfigError::NoRounds);
        }
        if (self.account_count as u64)
            .checked_mul(self.initial_balance)
            .is_none()
        {
            return Err(ConfigError::BalanceOverflow {
                accounts: self.account_count,
                initial_balance: self.initial_balance,
            });
        }
        if self.strategy.deadlock_prone() && self.watchdog.is_none() {
            return Err(ConfigError::DeadlockProneWithoutWatchdog(self.strategy));
        }
        Ok(())
    }
}

#[cfg(all(test, not(feature = "loom-tests")))]
mod tests {
    use super::*;

    #[test]
    fn strategy_names_round_trip() {
        for strategy in LockingStrategy::ALL {
            assert_eq!(strategy.to_string().parse::<LockingStrategy>(), Ok(strategy));
        }
        assert_eq!(" Backoff ".parse::<LockingStrategy>(), Ok(LockingStrategy::Backoff));
        assert_eq!(
            "mutex".parse::<LockingStrategy>(),
            Err(ConfigError::UnknownStrategy("mutex".into()))
        );
    }

    #[test]
    fn single_account_is_rejected() {
        let config = Config {
            account_count: 1,
            thread_count: 1,
            rounds_per_thread: 1,
            initial_balance: 100,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::TooFewAccounts(1)));
    }

    #[test]
    fn zero_counts_are_rejected() {
        let no_threads = Config {
            thread_count: 0,
            ..Config::default()
        };
        assert_eq!(no_threads.validate(), Err(ConfigError::NoThreads));

        let no_rounds = Config {
            rounds_per_thread: 0,
            ..Config::default()
        };
        assert_eq!(no_rounds.validate(), Err(ConfigError::NoRounds));
    }

    #[test]
    fn coarse_needs_a_watchdog() {
        let mut config = Config {
            strategy: LockingStrategy::Coarse,
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::DeadlockProneWithoutWatchdog(LockingStrategy::Coarse))
        );

        config.watchdog = Some(Duration::from_secs(1));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn overflowing_total_is_rejected() {
        let config = Config {
            initial_balance: u64::MAX,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BalanceOverflow { .. })
        ));
    }

    #[test]
    fn defaults_match_the_reference_run() {
        let config = Config::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.expected_total(), 1000);
        assert!(!config.strategy.deadlock_prone());
    }
}
