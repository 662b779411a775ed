//! Process-wide dataset generation counter.
//!
//! Caches that depend on dataset contents (selectivity ratios, heavy predicate
//! bitmaps) key themselves by generation. Every dataset build bumps the
//! counter, so swapping datasets invalidates those caches without any global
//! reset.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a dataset build
pub type Generation = u64;

static CURRENT: AtomicU64 = AtomicU64::new(0);

/// Bump the counter and return the new generation.
pub fn next_generation() -> Generation {
    CURRENT.fetch_add(1, Ordering::SeqCst) + 1
}

/// The most recently issued generation (0 before any dataset was built)
pub fn current_generation() -> Generation {
    CURRENT.load(Ordering::SeqCst)
}
