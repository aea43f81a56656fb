#![warn(missing_docs)]

//! banksim runs many threads moving money between a fixed set of accounts, to compare ways of
//! locking two resources at once. The total balance never changes under a correct strategy, so
//! checking it after the run tells you whether the strategy was correct.
//!
//! ```
//! use banksim::{run, Config, LockingStrategy};
//!
//! let outcome = run(&Config {
//!     account_count: 10,
//!     thread_count: 20,
//!     rounds_per_thread: 1_000,
//!     initial_balance: 100,
//!     strategy: LockingStrategy::Ordered,
//!     ..Config::default()
//! })
//! .unwrap();
//!
//! assert_eq!(outcome.final_total, 1000);
//! ```
//!
//! # Strategies
//!
//! - [`LockingStrategy::None`] takes no locks. Transfers race, updates get lost, and the total
//! drifts. This is the failure being demonstrated.
//! - [`LockingStrategy::Coarse`] locks the source and then the destination. Two workers
//! transferring in opposite directions can deadlock. [`Config::validate`] rejects it unless a
//! [`Config::watchdog`] is set, in which case a hung run ends with [`Error::Stalled`].
//! - [`LockingStrategy::Ordered`] locks the lower account index first. Deadlock-free.
//! - [`LockingStrategy::Backoff`] locks the source, tries the destination, and on a miss releases
//! everything, yields and starts over. Deadlock-free, though it may livelock under pathological
//! scheduling.
//!
//! # Guarantees
//!
//! For `ordered` and `backoff`, and for `coarse` runs that finish, the final total equals
//! `account_count * initial_balance`. A run that breaks this returns
//! [`Error::ConservationViolated`]. Balances are unsigned and never go below zero.
//!
//! With [`Config::watermark`] set, the run tracks how many workers were inside the critical
//! section at once. [`Simulation::take_peaks`] streams each new peak, strictly increasing.
//!
//! ## Non-Guarantees
//!
//! - No fairness between workers.
//! - No ordering between rounds of different workers.
//! - Nothing is persisted.

pub mod account;
pub mod bench;
mod config;
mod error;
mod harness;
pub mod protocol;
mod sync;
pub mod watermark;
pub mod worker;

pub use config::{Config, LockingStrategy};
pub use error::{ConfigError, Error, Result};
pub use harness::{run, Outcome, Simulation};
