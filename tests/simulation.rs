use std::time::Duration;

use banksim::{run, Config, ConfigError, Error, LockingStrategy, Simulation};

fn config(
    accounts: usize,
    threads: usize,
    rounds: usize,
    strategy: LockingStrategy,
) -> Config {
    Config {
        account_count: accounts,
        thread_count: threads,
        rounds_per_thread: rounds,
        initial_balance: 100,
        strategy,
        seed: None,
        watermark: false,
        watchdog: Some(Duration::from_secs(120)),
    }
}

#[test]
fn single_account_fails_fast() {
    let result = run(&config(1, 1, 1, LockingStrategy::Ordered));
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::TooFewAccounts(1)))
    ));
}

#[test]
fn two_accounts_one_thread_ordered() {
    let outcome = run(&config(2, 1, 1000, LockingStrategy::Ordered)).unwrap();
    assert_eq!(outcome.final_total, 200);
    assert_eq!(outcome.balances.len(), 2);
}

#[test]
fn reference_run_with_backoff() {
    let outcome = run(&config(10, 20, 10_000, LockingStrategy::Backoff)).unwrap();
    assert_eq!(outcome.final_total, 1000);
    assert_eq!(outcome.stats.rounds, 20 * 10_000);
}

#[test]
fn deadlock_free_strategies_conserve_for_many_seeds() {
    for seed in 0..8 {
        for strategy in [LockingStrategy::Ordered, LockingStrategy::Backoff] {
            let outcome = run(&Config {
                seed: Some(seed),
                ..config(3, 12, 2_000, strategy)
            })
            .unwrap();
            assert_eq!(outcome.final_total, 300, "{} seed {}", strategy, seed);
        }
    }
}

#[test]
fn coarse_is_opt_in() {
    let result = run(&Config {
        watchdog: None,
        ..config(10, 20, 100, LockingStrategy::Coarse)
    });
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::DeadlockProneWithoutWatchdog(
            LockingStrategy::Coarse
        )))
    ));
}

#[test]
fn coarse_under_watchdog_never_hangs_the_suite() {
    let result = run(&Config {
        watchdog: Some(Duration::from_secs(5)),
        ..config(2, 8, 10_000, LockingStrategy::Coarse)
    });
    match result {
        Ok(outcome) => assert_eq!(outcome.final_total, 200),
        Err(Error::Stalled {
            after,
            finished,
            threads,
        }) => {
            assert_eq!(after, Duration::from_secs(5));
            assert!(finished < threads);
        }
        Err(e) => panic!("unexpected error: {}", e),
    }
}

#[test]
fn watermark_peaks_stay_within_thread_count() {
    let mut simulation = Simulation::new(Config {
        watermark: true,
        ..config(50, 16, 2_000, LockingStrategy::Ordered)
    })
    .unwrap();
    let peaks = simulation.take_peaks().unwrap();

    let outcome = simulation.run().unwrap();
    assert_eq!(outcome.final_total, 5000);

    let best = outcome.peak.unwrap();
    assert!(best >= 1 && best <= 16);

    let first = peaks.recv_timeout(Duration::from_secs(5)).unwrap();
    let reported: Vec<_> = std::iter::once(first).chain(peaks.try_iter()).collect();
    assert!(reported.windows(2).all(|w| w[0] < w[1]), "{:?}", reported);
    assert!(*reported.last().unwrap() <= best);
}
