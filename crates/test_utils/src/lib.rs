//! Shared test utilities for the microcredit back-office workspace
//!
//! Fixture builders over the in-memory store adapters, plus one-time tracing
//! initialisation for test output.

pub mod fixtures;
pub mod telemetry;

pub use fixtures::{TestDeployment, TestShareholder};
pub use telemetry::init_test_tracing;
