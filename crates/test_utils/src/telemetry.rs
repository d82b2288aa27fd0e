//! Tracing setup for tests

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

/// Initialises a test-friendly tracing subscriber exactly once
///
/// Controlled with `RUST_LOG`; defaults to silence so test output stays
/// readable.
pub fn init_test_tracing() {
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
