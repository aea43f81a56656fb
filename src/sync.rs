#[cfg(all(test, feature = "loom-tests"))]
pub use loom::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Condvar, Mutex, MutexGuard,
    },
    thread,
};

#[cfg(not(all(test, feature = "loom-tests")))]
pub use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Condvar, Mutex, MutexGuard,
    },
    thread,
};
