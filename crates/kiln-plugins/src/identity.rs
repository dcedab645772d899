//! Rewritten-identity generation.
//!
//! Every load attempt gets a fresh identity so neither the OS dynamic
//! loader's by-path cache nor the engine's loaded-unit arena can hand back
//! a stale copy of an unchanged-on-disk module.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Process-wide monotonic tick source.
///
/// Seeded from the wall clock at construction and strictly increasing from
/// there. Ticks are never reused within a process lifetime, so two load
/// attempts of the same module can never collide on identity.
#[derive(Debug)]
pub struct IdentityGenerator {
    ticks: AtomicU64,
}

impl IdentityGenerator {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1);
        Self {
            ticks: AtomicU64::new(seed),
        }
    }

    /// Returns the next tick value.
    pub fn next_ticks(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdentityGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the rewritten identity for one load attempt:
/// `<original-stem>-<ticks>`.
pub fn rewritten_identity(stem: &str, ticks: u64) -> String {
    format!("{stem}-{ticks}")
}
