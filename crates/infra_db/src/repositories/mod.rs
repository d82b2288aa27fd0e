//! Store adapters backed by PostgreSQL
//!
//! One repository per domain store port. Multi-record commits run inside a
//! single database transaction; versioned aggregates are updated with
//! `WHERE version = $expected` so a lost race surfaces as
//! [`core_kernel::PortError::Conflict`].

pub mod installment;
pub mod shareholder;
pub mod treasury;

pub use installment::InstallmentRepository;
pub use shareholder::ShareholderRepository;
pub use treasury::TreasuryRepository;

use std::str::FromStr;

use rust_decimal::Decimal;

use core_kernel::{Currency, Money, PortError};

use crate::error::corrupted;

/// Reads a column, mapping decode failures to the port taxonomy
macro_rules! col {
    ($row:expr, $name:literal) => {
        $row.try_get($name)
            .map_err(|e| $crate::error::corrupted(format!(concat!($name, ": {}"), e)))?
    };
}

pub(crate) use col;

/// Parses a stored currency code
pub(crate) fn parse_currency(code: &str) -> Result<Currency, PortError> {
    Currency::from_str(code).map_err(|e| corrupted(e.to_string()))
}

/// Rehydrates a money value from its stored amount and currency code
pub(crate) fn to_money(amount: Decimal, code: &str) -> Result<Money, PortError> {
    Ok(Money::new(amount, parse_currency(code)?))
}
