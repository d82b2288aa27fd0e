//! Installment domain errors

use core_kernel::{MoneyError, PortError, ScheduleId};
use thiserror::Error;

use crate::schedule::ScheduleStatus;

/// Errors that can occur in the installment domain
#[derive(Debug, Error)]
pub enum InstallmentError {
    /// Malformed installment terms (negative amount, month/rate out of range)
    #[error("Invalid installment terms: {0}")]
    InvalidTerms(String),

    /// Malformed payment input
    #[error("Invalid payment: {0}")]
    InvalidPayment(String),

    /// Payment attempted against a cancelled or adjusted schedule
    #[error("Schedule {0} is {1:?} and cannot accept payments")]
    TerminalSchedule(ScheduleId, ScheduleStatus),

    /// Money arithmetic failed (currency mismatch)
    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    /// Store-boundary failure
    #[error(transparent)]
    Store(#[from] PortError),
}

impl InstallmentError {
    /// True when the error is a concurrent-mutation conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, InstallmentError::Store(e) if e.is_retryable())
    }

    /// True when the referenced entity was absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, InstallmentError::Store(e) if e.is_not_found())
    }
}
