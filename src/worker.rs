//! Transfer workers and the counters they report.
//!
//! A [`Worker`] owns its random source and a [`Protocol`]. Each round it picks two distinct
//! accounts, acquires them with [`retry_loop`], moves a random amount from the first to the
//! second, and releases both. With a [`Watermark`] attached, the time between acquire and release
//! counts as occupancy of the critical section.

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::account::Accounts;
use crate::error::{ConfigError, Result};
use crate::protocol::{retry_loop, Protocol};
use crate::watermark::Watermark;

/// Counters one worker collects over its rounds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    /// Rounds completed.
    pub rounds: u64,
    /// Rounds that moved money.
    pub transfers: u64,
    /// Rounds skipped because the source account was empty.
    pub empty_rounds: u64,
    /// Pair acquisitions that had to start over.
    pub retries: u64,
    /// Total amount moved.
    pub moved: u64,
}

impl WorkerStats {
    /// Sum two workers' counters.
    pub fn merge(self, other: WorkerStats) -> WorkerStats {
        WorkerStats {
            rounds: self.rounds + other.rounds,
            transfers: self.transfers + other.transfers,
            empty_rounds: self.empty_rounds + other.empty_rounds,
            retries: self.retries + other.retries,
            moved: self.moved.saturating_add(other.moved),
        }
    }
}

/// One transfer worker: a fixed number of rounds of random pairwise transfers.
pub struct Worker<'a, P> {
    id: usize,
    accounts: &'a Accounts,
    protocol: P,
    watermark: Option<&'a Watermark>,
    rng: StdRng,
}

impl<'a, P: Protocol> Worker<'a, P> {
    /// A worker over `accounts`. With a `seed`, its choices are reproducible.
    pub fn new(id: usize, accounts: &'a Accounts, protocol: P, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
            None => StdRng::from_entropy(),
        };
        Worker {
            id,
            accounts,
            protocol,
            watermark: None,
            rng,
        }
    }

    /// Report entries to and exits from the critical section to `watermark`.
    pub fn with_watermark(mut self, watermark: &'a Watermark) -> Self {
        self.watermark = Some(watermark);
        self
    }

    /// Run `rounds` rounds.
    pub fn run(mut self, rounds: usize) -> Result<WorkerStats> {
        if self.accounts.len() < 2 {
            return Err(ConfigError::TooFewAccounts(self.accounts.len()).into());
        }

        tracing::debug!(worker = self.id, strategy = %P::STRATEGY, rounds, "worker starting");
        let mut stats = WorkerStats::default();
        for _ in 0..rounds {
            self.round(&mut stats)?;
        }
        tracing::debug!(worker = self.id, ?stats, "worker finished");
        Ok(stats)
    }

    fn round(&mut self, stats: &mut WorkerStats) -> Result<()> {
        let (from, to) = self.pick_pair();
        let accounts = self.accounts;
        let watermark = self.watermark;
        let protocol = &self.protocol;
        let rng = &mut self.rng;

        let (pair, retries) = retry_loop(|| protocol.acquire_pair(accounts, from, to))?;
        let inside = watermark.map(Watermark::occupy);
        let moved = accounts.transfer(from, to, |balance| 1 + rng.gen_range(0..balance));
        drop(inside);
        pair.release();

        stats.rounds += 1;
        stats.retries += retries;
        match moved? {
            Some(amount) => {
                stats.transfers += 1;
                stats.moved = stats.moved.saturating_add(amount);
            }
            None => stats.empty_rounds += 1,
        }
        Ok(())
    }

    fn pick_pair(&mut self) -> (usize, usize) {
        let n = self.accounts.len();
        let from = self.rng.gen_range(0..n);
        loop {
            let to = self.rng.gen_range(0..n);
            if to != from {
                return (from, to);
            }
        }
    }
}
