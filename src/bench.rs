//! Repeated timed runs of one configuration.

use std::time::Duration;

use itertools::{Itertools, MinMaxResult};

use crate::config::Config;
use crate::error::{ConfigError, Result};
use crate::harness::{run, Outcome};

/// Wall-clock statistics over several runs of the same configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    /// Number of runs measured.
    pub runs: usize,
    /// Sum of all run times.
    pub total: Duration,
    /// Fastest run.
    pub min: Duration,
    /// Slowest run.
    pub max: Duration,
    /// Highest watermark peak over all runs, when tracking was on.
    pub peak: Option<usize>,
    /// Outcome of the last run.
    pub last: Outcome,
}

impl Timing {
    /// Average run time.
    pub fn mean(&self) -> Duration {
        self.total / u32::try_from(self.runs).unwrap_or(u32::MAX)
    }
}

/// Run `config` `repeats` times and time each run. Stops at the first failing run.
pub fn measure(config: &Config, repeats: usize) -> Result<Timing> {
    if repeats == 0 {
        return Err(ConfigError::NoRuns.into());
    }

    let mut last = run(config)?;
    let mut elapsed = Vec::with_capacity(repeats);
    let mut peak = last.peak;
    elapsed.push(last.elapsed);
    for attempt in 1..repeats {
        last = run(config)?;
        tracing::debug!(attempt, elapsed = ?last.elapsed, peak = ?last.peak, "timed run finished");
        elapsed.push(last.elapsed);
        peak = peak.max(last.peak);
    }

    let (min, max) = match elapsed.iter().copied().minmax() {
        MinMaxResult::NoElements => (Duration::ZERO, Duration::ZERO),
        MinMaxResult::OneElement(only) => (only, only),
        MinMaxResult::MinMax(min, max) => (min, max),
    };

    Ok(Timing {
        runs: repeats,
        total: elapsed.iter().sum(),
        min,
        max,
        peak,
        last,
    })
}

#[cfg(all(test, not(feature = "loom-tests")))]
mod tests {
    use super::*;
    use crate::config::LockingStrategy;
    use crate::error::Error;

    fn small() -> Config {
        Config {
            account_count: 4,
            thread_count: 2,
            rounds_per_thread: 200,
            strategy: LockingStrategy::Backoff,
            ..Config::default()
        }
    }

    #[test]
    fn summarizes_every_run() {
        let timing = measure(&small(), 3).unwrap();
        assert_eq!(timing.runs, 3);
        assert!(timing.min <= timing.mean() && timing.mean() <= timing.max);
        assert!(timing.total >= timing.max);
        assert_eq!(timing.last.final_total, 400);
        assert_eq!(timing.peak, None);
    }

    #[test]
    fn keeps_the_highest_peak_when_tracking() {
        let timing = measure(
            &Config {
                watermark: true,
                ..small()
            },
            3,
        )
        .unwrap();
        let peak = timing.peak.unwrap();
        assert!((1..=2).contains(&peak));
        assert!(timing.last.peak.unwrap() <= peak);
    }

    #[test]
    fn zero_repeats_is_a_config_error() {
        assert!(matches!(
            measure(&small(), 0),
            Err(Error::Config(ConfigError::NoRuns))
        ));
    }

    #[test]
    fn stops_on_first_failure() {
        let bad = Config {
            thread_count: 0,
            ..small()
        };
        assert!(matches!(
            measure(&bad, 5),
            Err(Error::Config(ConfigError::NoThreads))
        ));
    }
}
