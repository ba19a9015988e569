//! Shared fixtures for this crate's own unit tests. Not part of the public
//! API; not compiled outside `#[cfg(test)]`.

use std::sync::Once;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::callback::RandomSource;

/// A counting-up byte sequence, deterministic across test runs so fixture
/// assertions are stable.
pub struct FixedRandom;

impl RandomSource for FixedRandom {
    fn generate_random(&self, n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 256) as u8).collect()
    }
}

static INIT: Once = Once::new();

/// Initialise tracing for tests that want to see `debug!`/`warn!` output
/// on failure. Safe to call from every test; only the first call installs
/// the subscriber.
///
/// # Panics
///
/// Panics if a global subscriber is already set by something other than
/// this function.
pub fn init_tracer() {
    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
        tracing::subscriber::set_global_default(subscriber).expect("subscriber set");
    });
}
