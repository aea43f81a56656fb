//! Command line front end.
//!
//! ```bash
//! cargo run --release -- --strategy ordered
//! cargo run --release -- --strategy backoff --threads 100 --accounts 50 --watermark
//! cargo run --release -- --strategy coarse --watchdog-ms 5000
//! cargo run --release -- --strategy none --repeat 10
//! ```

use std::process::ExitCode;
use std::time::Duration;

use banksim::{bench, Config, LockingStrategy, Simulation};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Concurrent fund-transfer simulator
#[derive(Parser, Debug)]
#[command(name = "banksim", version)]
#[command(about = "Move money between accounts from many threads under a chosen locking strategy", long_about = None)]
struct Args {
    /// Number of accounts
    #[arg(long, default_value_t = 10)]
    accounts: usize,

    /// Number of transfer worker threads
    #[arg(long, default_value_t = 20)]
    threads: usize,

    /// Transfer rounds per thread
    #[arg(long, default_value_t = 10_000)]
    rounds: usize,

    /// Starting balance of every account
    #[arg(long, default_value_t = 100)]
    initial_balance: u64,

    /// Locking strategy: none, coarse, ordered or backoff
    #[arg(long, default_value_t = LockingStrategy::Ordered)]
    strategy: LockingStrategy,

    /// Seed for the workers' random choices (random if not provided)
    #[arg(long)]
    seed: Option<u64>,

    /// Print each new peak of threads inside the critical section
    #[arg(long)]
    watermark: bool,

    /// Abandon the run if workers have not finished after this many milliseconds.
    /// Required for the coarse strategy.
    #[arg(long)]
    watchdog_ms: Option<u64>,

    /// Run this many times and print timing statistics
    #[arg(long, default_value_t = 1)]
    repeat: usize,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            account_count: self.accounts,
            thread_count: self.threads,
            rounds_per_thread: self.rounds,
            initial_balance: self.initial_balance,
            strategy: self.strategy,
            seed: self.seed,
            watermark: self.watermark,
            watchdog: self.watchdog_ms.map(Duration::from_millis),
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    match execute(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute(args: &Args) -> banksim::Result<()> {
    let config = args.config();

    if args.repeat > 1 {
        config.validate()?;
        println!("Initial money in system: {}", config.expected_total());
        let timing = bench::measure(&config, args.repeat)?;
        println!("Final money in system: {}", timing.last.final_total);
        println!(
            "Total time for {} runs: {:.6} seconds",
            timing.runs,
            timing.total.as_secs_f64()
        );
        println!(
            "Average time per run: {:.6} seconds (min {:.6}, max {:.6})",
            timing.mean().as_secs_f64(),
            timing.min.as_secs_f64(),
            timing.max.as_secs_f64()
        );
        if let Some(peak) = timing.peak {
            println!("Peak threads in critical section: {}", peak);
        }
        return Ok(());
    }

    let mut simulation = Simulation::new(config)?;
    println!("Initial money in system: {}", simulation.accounts().total());

    let printer = simulation
        .take_peaks()
        .map(|peaks| {
            std::thread::Builder::new()
                .name("watermark-printer".into())
                .spawn(move || {
                    for peak in peaks {
                        println!("{}", peak);
                    }
                })
        })
        .transpose()?;

    let outcome = simulation.run()?;
    // The peak stream ends once the run closes the tracker.
    if let Some(printer) = printer {
        let _ = printer.join();
    }
    if let Some(peak) = outcome.peak {
        println!("Peak threads in critical section: {}", peak);
    }
    println!("Final money in system: {}", outcome.final_total);
    println!(
        "Time: {:.6} seconds, {} transfers, {} retries",
        outcome.elapsed.as_secs_f64(),
        outcome.stats.transfers,
        outcome.stats.retries
    );
    Ok(())
}
