//! Database infrastructure for the microcredit back-office core
//!
//! PostgreSQL adapters for the domain store ports, plus pool configuration
//! and embedded schema migrations. Concurrency control follows one pattern
//! everywhere: versioned aggregates are updated with
//! `WHERE version = $expected`, and multi-record writes that must be atomic
//! run in a single transaction.

pub mod error;
pub mod pool;
pub mod repositories;

pub use error::DatabaseError;
pub use pool::{create_pool, create_pool_from_url, run_migrations, DatabaseConfig, DatabasePool};
pub use repositories::{InstallmentRepository, ShareholderRepository, TreasuryRepository};
