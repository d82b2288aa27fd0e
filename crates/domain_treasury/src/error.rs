//! Treasury domain errors

use core_kernel::{Money, MoneyError, PortError};
use thiserror::Error;

/// Errors that can occur in the treasury domain
#[derive(Debug, Error)]
pub enum TreasuryError {
    /// Entry amount was zero or negative
    #[error("Entry amount must be positive, got {0}")]
    NonPositiveAmount(Money),

    /// Outflow larger than the current balance
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: Money, requested: Money },

    /// Money arithmetic failed (currency mismatch)
    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    /// Store-boundary failure
    #[error(transparent)]
    Store(#[from] PortError),
}

impl TreasuryError {
    /// True when the error is a concurrent-mutation conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, TreasuryError::Store(e) if e.is_retryable())
    }
}

impl From<TreasuryError> for PortError {
    fn from(err: TreasuryError) -> Self {
        match err {
            TreasuryError::NonPositiveAmount(amount) => {
                PortError::invalid_argument(format!("entry amount must be positive, got {amount}"))
            }
            TreasuryError::InsufficientFunds {
                available,
                requested,
            } => PortError::invalid_state(format!(
                "insufficient funds: available {available}, requested {requested}"
            )),
            TreasuryError::Money(e) => PortError::invalid_argument(e.to_string()),
            TreasuryError::Store(e) => e,
        }
    }
}
