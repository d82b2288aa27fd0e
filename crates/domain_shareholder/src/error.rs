//! Shareholder domain errors

use core_kernel::{Money, MoneyError, PortError, ShareholderId, YearMonth};
use thiserror::Error;

/// Errors that can occur in the shareholder domain
#[derive(Debug, Error)]
pub enum ShareholderError {
    /// Malformed input (negative profit, zero quantity, empty audit field)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation requires an active shareholder
    #[error("Shareholder {0} is inactive")]
    InactiveShareholder(ShareholderId),

    /// Spendable balance cannot cover the requested amount
    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: Money, requested: Money },

    /// Share count cannot cover the requested quantity
    #[error("Insufficient shares: available {available}, requested {requested}")]
    InsufficientShares { available: u32, requested: u32 },

    /// Distribution requires at least one share in the system
    #[error("No shares exist in the system")]
    NoShares,

    /// Batch distribution requires at least one active shareholder
    #[error("No active shareholders found")]
    NoActiveShareholders,

    /// Earnings cannot be recorded ahead of time
    #[error("Cannot record earnings for future month {0}")]
    FutureMonth(YearMonth),

    /// A (shareholder, month) earning already exists; recalculate instead
    #[error("Earning already exists for shareholder {shareholder_id} in {month}")]
    EarningExists {
        shareholder_id: ShareholderId,
        month: YearMonth,
    },

    /// Workflow transition not allowed from the current status
    #[error("Invalid workflow transition: {0}")]
    InvalidTransition(String),

    /// Money arithmetic failed (currency mismatch)
    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    /// Store-boundary failure
    #[error(transparent)]
    Store(#[from] PortError),
}

impl ShareholderError {
    /// True when the error is a concurrent-mutation conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, ShareholderError::Store(e) if e.is_retryable())
    }

    /// True when the referenced entity was absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, ShareholderError::Store(e) if e.is_not_found())
    }
}
