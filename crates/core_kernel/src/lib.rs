//! Core Kernel - Foundational types and utilities for the microcredit system
//!
//! This crate provides the fundamental building blocks used across all domain modules:
//! - Money types with precise decimal arithmetic
//! - Temporal types for month-granular bookkeeping and clock abstraction
//! - Common identifiers and value objects

pub mod error;
pub mod identifiers;
pub mod money;
pub mod ports;
pub mod temporal;

pub use error::CoreError;
pub use identifiers::{
    AgentId, EarningId, InstallmentId, LedgerEntryId, MemberId, PaymentTransactionId,
    ProductId, ScheduleId, ShareTradeId, ShareholderId, WithdrawalRequestId,
};
pub use money::{Currency, Money, MoneyError, Rate};
pub use ports::{DomainPort, PortError};
pub use temporal::{Clock, FixedClock, SystemClock, TemporalError, YearMonth};
