//! Treasury Domain - the pooled cash ledger
//!
//! This crate owns the single company-wide main balance: capital
//! contributions, withdrawals, product and maintenance costs, and
//! installment returns. Every mutation goes through [`TreasuryLedger`],
//! which commits the balance update and its history entry atomically.

pub mod balance;
pub mod entry;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod ports;

pub use balance::{BalanceSnapshot, MainBalance};
pub use entry::{EntryKind, EntryRefs, LedgerEntry};
pub use error::TreasuryError;
pub use ledger::TreasuryLedger;
pub use memory::InMemoryTreasuryStore;
pub use ports::{EntryFilter, TreasuryStore};
