use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError};

use crate::account::Accounts;
use crate::config::{Config, LockingStrategy};
use crate::error::{Error, Result};
use crate::protocol::{Backoff, CanonicalOrder, Protocol, RequestOrder, Unsynchronized};
use crate::watermark::Watermark;
use crate::worker::{Worker, WorkerStats};

/// What a finished run observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Strategy that ran.
    pub strategy: LockingStrategy,
    /// Money in the system before any worker started.
    pub initial_total: u64,
    /// Money in the system after every worker finished.
    pub final_total: u64,
    /// Final balance of each account.
    pub balances: Vec<u64>,
    /// Counters summed over all workers.
    pub stats: WorkerStats,
    /// Highest number of workers inside the critical section at once, when tracked.
    pub peak: Option<usize>,
    /// Wall-clock time from first spawn to last worker finishing.
    pub elapsed: Duration,
}

impl Outcome {
    /// Whether the final total matches the initial total.
    pub fn conserved(&self) -> bool {
        self.initial_total == self.final_total
    }
}

/// Run one simulation described by `config`.
///
/// ```
/// use banksim::{run, Config, LockingStrategy};
///
/// let outcome = run(&Config {
///     account_count: 4,
///     thread_count: 4,
///     rounds_per_thread: 1_000,
///     strategy: LockingStrategy::Backoff,
///     ..Config::default()
/// })
/// .unwrap();
///
/// assert_eq!(outcome.final_total, 400);
/// ```
pub fn run(config: &Config) -> Result<Outcome> {
    Simulation::new(config.clone())?.run()
}

/// A configured, not yet started simulation.
///
/// Built in two steps so a caller can take the peak stream before workers start.
#[derive(Debug)]
pub struct Simulation {
    config: Config,
    accounts: Arc<Accounts>,
    watermark: Option<Arc<Watermark>>,
    peaks: Option<Receiver<usize>>,
}

impl Simulation {
    /// Validate `config`, allocate the accounts and, if requested, start the watermark reporter.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let accounts = Arc::new(Accounts::new(
            config.account_count,
            config.initial_balance,
            config.strategy.uses_locks(),
        ));

        let (watermark, peaks) = if config.watermark {
            let watermark = Arc::new(Watermark::new());
            let peaks = watermark.subscribe()?;
            (Some(watermark), Some(peaks))
        } else {
            (None, None)
        };

        Ok(Simulation {
            config,
            accounts,
            watermark,
            peaks,
        })
    }

    /// Take the stream of new watermark peaks. `None` when tracking is off or already taken.
    pub fn take_peaks(&mut self) -> Option<Receiver<usize>> {
        self.peaks.take()
    }

    /// The shared account store.
    pub fn accounts(&self) -> &Accounts {
        &self.accounts
    }

    /// Start every worker, wait for them, and verify the total.
    pub fn run(self) -> Result<Outcome> {
        match self.config.strategy {
            LockingStrategy::None => self.run_with::<Unsynchronized>(),
            LockingStrategy::Coarse => self.run_with::<RequestOrder>(),
            LockingStrategy::Ordered => self.run_with::<CanonicalOrder>(),
            LockingStrategy::Backoff => self.run_with::<Backoff>(),
        }
    }

    fn run_with<P: Protocol + Default>(self) -> Result<Outcome> {
        let config = &self.config;
        let initial_total = self.accounts.total();
        tracing::info!(
            strategy = %config.strategy,
            accounts = config.account_count,
            threads = config.thread_count,
            rounds = config.rounds_per_thread,
            initial_total,
            "starting simulation"
        );

        let start = Instant::now();
        let (done_tx, done_rx) = channel::unbounded();
        let handles = (0..config.thread_count)
            .map(|id| {
                let accounts = Arc::clone(&self.accounts);
                let watermark = self.watermark.clone();
                let done = done_tx.clone();
                let (seed, rounds) = (config.seed, config.rounds_per_thread);

                std::thread::Builder::new()
                    .name(format!("transfer-worker-{}", id))
                    .spawn(move || {
                        let mut worker = Worker::new(id, &accounts, P::default(), seed);
                        if let Some(watermark) = &watermark {
                            worker = worker.with_watermark(watermark);
                        }
                        let result = worker.run(rounds);
                        // The receiver is gone only if the harness gave up on us.
                        let _ = done.send(id);
                        result
                    })
            })
            .collect::<std::io::Result<Vec<_>>>()?;
        drop(done_tx);

        if let Some(limit) = config.watchdog {
            wait_for_workers(&done_rx, start + limit, config.thread_count).map_err(
                |finished| {
                    tracing::warn!(
                        strategy = %config.strategy,
                        finished,
                        threads = config.thread_count,
                        "watchdog expired, abandoning workers"
                    );
                    Error::Stalled {
                        after: limit,
                        finished,
                        threads: config.thread_count,
                    }
                },
            )?;
        }

        let stats = join_workers(handles)?;
        let elapsed = start.elapsed();
        if let Some(watermark) = &self.watermark {
            watermark.close();
        }

        let outcome = Outcome {
            strategy: config.strategy,
            initial_total,
            final_total: self.accounts.total(),
            balances: self.accounts.balances(),
            stats,
            peak: self.watermark.as_ref().map(|w| w.best()),
            elapsed,
        };
        tracing::info!(
            final_total = outcome.final_total,
            transfers = outcome.stats.transfers,
            retries = outcome.stats.retries,
            peak = ?outcome.peak,
            ?elapsed,
            "simulation finished"
        );

        if !outcome.conserved() {
            if config.strategy.conserves() {
                tracing::error!(
                    strategy = %config.strategy,
                    expected = initial_total,
                    actual = outcome.final_total,
                    "total balance not conserved"
                );
                return Err(Error::ConservationViolated {
                    strategy: config.strategy,
                    expected: initial_total,
                    actual: outcome.final_total,
                });
            }
            tracing::warn!(
                expected = initial_total,
                actual = outcome.final_total,
                "unsynchronized transfers lost updates"
            );
        }

        Ok(outcome)
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        // Releases the reporter even when the run was never started or gave up.
        if let Some(watermark) = &self.watermark {
            watermark.close();
        }
    }
}

/// Wait until `threads` completions arrive or `deadline` passes. On expiry returns how many
/// workers finished.
fn wait_for_workers(
    done: &Receiver<usize>,
    deadline: Instant,
    threads: usize,
) -> std::result::Result<(), usize> {
    let mut finished = 0;
    while finished < threads {
        match done.recv_deadline(deadline) {
            Ok(_) => finished += 1,
            Err(RecvTimeoutError::Timeout) => return Err(finished),
            // Every sender is gone: the rest panicked, which joining will report.
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}

fn join_workers(handles: Vec<JoinHandle<Result<WorkerStats>>>) -> Result<WorkerStats> {
    let mut total = WorkerStats::default();
    for handle in handles {
        let stats = handle.join().map_err(|_| Error::WorkerPanicked)??;
        total = total.merge(stats);
    }
    Ok(total)
}
