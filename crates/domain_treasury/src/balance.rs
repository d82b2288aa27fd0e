//! The main balance aggregate
//!
//! A single mutable row tracks the pooled cash of the whole operation. The
//! expense and earnings figures are derived on read and never stored, so
//! they cannot drift out of sync with the underlying totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Currency, Money};

use crate::entry::EntryKind;
use crate::error::TreasuryError;

/// The company-wide cash aggregate (singleton per deployment)
///
/// # Invariants
///
/// - Every total is non-negative
/// - `total_balance` equals the running sum of all signed entries since
///   creation; [`MainBalance::apply`] refuses an outflow that would break this
/// - Mutated only through [`crate::TreasuryLedger`]; never deleted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainBalance {
    /// Optimistic concurrency version, bumped by the store on commit
    pub version: u64,
    /// Current spendable balance
    pub total_balance: Money,
    /// Cumulative shareholder investment
    pub total_investment: Money,
    /// Cumulative shareholder withdrawal
    pub total_withdrawal: Money,
    /// Cumulative product purchase cost
    pub total_product_cost: Money,
    /// Cumulative maintenance expense
    pub total_maintenance_cost: Money,
    /// Cumulative installment collection
    pub total_installment_return: Money,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl MainBalance {
    /// Creates a zeroed balance in the deployment currency
    pub fn new(currency: Currency, now: DateTime<Utc>) -> Self {
        let zero = Money::zero(currency);
        Self {
            version: 0,
            total_balance: zero,
            total_investment: zero,
            total_withdrawal: zero,
            total_product_cost: zero,
            total_maintenance_cost: zero,
            total_installment_return: zero,
            updated_at: now,
        }
    }

    /// The deployment currency
    pub fn currency(&self) -> Currency {
        self.total_balance.currency()
    }

    /// Applies one signed entry to the aggregate
    ///
    /// Validates before mutating: a non-positive amount or an outflow
    /// exceeding the current balance leaves the aggregate untouched.
    pub fn apply(
        &mut self,
        kind: EntryKind,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<(), TreasuryError> {
        if !amount.is_positive() {
            return Err(TreasuryError::NonPositiveAmount(amount));
        }
        if kind.is_outflow() && amount > self.total_balance {
            return Err(TreasuryError::InsufficientFunds {
                available: self.total_balance,
                requested: amount,
            });
        }

        match kind {
            EntryKind::Investment => {
                self.total_investment = self.total_investment.checked_add(&amount)?;
                self.total_balance = self.total_balance.checked_add(&amount)?;
            }
            EntryKind::Withdrawal => {
                self.total_withdrawal = self.total_withdrawal.checked_add(&amount)?;
                self.total_balance = self.total_balance.checked_sub(&amount)?;
            }
            EntryKind::ProductCost => {
                self.total_product_cost = self.total_product_cost.checked_add(&amount)?;
                self.total_balance = self.total_balance.checked_sub(&amount)?;
            }
            EntryKind::MaintenanceCost => {
                self.total_maintenance_cost = self.total_maintenance_cost.checked_add(&amount)?;
                self.total_balance = self.total_balance.checked_sub(&amount)?;
            }
            EntryKind::InstallmentReturn => {
                self.total_installment_return =
                    self.total_installment_return.checked_add(&amount)?;
                self.total_balance = self.total_balance.checked_add(&amount)?;
            }
        }

        self.updated_at = now;
        Ok(())
    }

    /// Total expenses: product cost + maintenance cost + withdrawal
    pub fn total_expenses(&self) -> Money {
        self.total_product_cost + self.total_maintenance_cost + self.total_withdrawal
    }

    /// Net earnings: (installment return + investment) − total expenses
    ///
    /// Can be negative early in a deployment's life.
    pub fn earnings(&self) -> Money {
        self.total_installment_return + self.total_investment - self.total_expenses()
    }

    /// A read-model snapshot with the derived figures computed
    pub fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            total_balance: self.total_balance,
            total_investment: self.total_investment,
            total_withdrawal: self.total_withdrawal,
            total_product_cost: self.total_product_cost,
            total_maintenance_cost: self.total_maintenance_cost,
            total_installment_return: self.total_installment_return,
            total_expenses: self.total_expenses(),
            earnings: self.earnings(),
            updated_at: self.updated_at,
        }
    }
}

/// Read model of the main balance with derived totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub total_balance: Money,
    pub total_investment: Money,
    pub total_withdrawal: Money,
    pub total_product_cost: Money,
    pub total_maintenance_cost: Money,
    pub total_installment_return: Money,
    /// Derived: product cost + maintenance cost + withdrawal
    pub total_expenses: Money,
    /// Derived: (installment return + investment) − total expenses
    pub earnings: Money,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bdt(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::BDT)
    }

    #[test]
    fn test_apply_investment_and_return() {
        let mut mb = MainBalance::new(Currency::BDT, Utc::now());

        mb.apply(EntryKind::Investment, bdt(dec!(10000)), Utc::now()).unwrap();
        mb.apply(EntryKind::InstallmentReturn, bdt(dec!(4416.67)), Utc::now()).unwrap();

        assert_eq!(mb.total_balance, bdt(dec!(14416.67)));
        assert_eq!(mb.total_investment, bdt(dec!(10000)));
        assert_eq!(mb.total_installment_return, bdt(dec!(4416.67)));
    }

    #[test]
    fn test_outflow_requires_funds() {
        let mut mb = MainBalance::new(Currency::BDT, Utc::now());
        mb.apply(EntryKind::Investment, bdt(dec!(10000)), Utc::now()).unwrap();

        let result = mb.apply(EntryKind::Withdrawal, bdt(dec!(15000)), Utc::now());
        assert!(matches!(result, Err(TreasuryError::InsufficientFunds { .. })));

        // The failed entry must not have touched anything
        assert_eq!(mb.total_balance, bdt(dec!(10000)));
        assert!(mb.total_withdrawal.is_zero());
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        let mut mb = MainBalance::new(Currency::BDT, Utc::now());

        let zero = mb.apply(EntryKind::Investment, bdt(dec!(0)), Utc::now());
        assert!(matches!(zero, Err(TreasuryError::NonPositiveAmount(_))));

        let negative = mb.apply(EntryKind::Investment, bdt(dec!(-5)), Utc::now());
        assert!(matches!(negative, Err(TreasuryError::NonPositiveAmount(_))));
    }

    #[test]
    fn test_derived_figures() {
        let mut mb = MainBalance::new(Currency::BDT, Utc::now());
        mb.apply(EntryKind::Investment, bdt(dec!(50000)), Utc::now()).unwrap();
        mb.apply(EntryKind::ProductCost, bdt(dec!(20000)), Utc::now()).unwrap();
        mb.apply(EntryKind::MaintenanceCost, bdt(dec!(1000)), Utc::now()).unwrap();
        mb.apply(EntryKind::InstallmentReturn, bdt(dec!(8000)), Utc::now()).unwrap();
        mb.apply(EntryKind::Withdrawal, bdt(dec!(5000)), Utc::now()).unwrap();

        let snapshot = mb.snapshot();
        assert_eq!(snapshot.total_expenses, bdt(dec!(26000)));
        assert_eq!(snapshot.earnings, bdt(dec!(32000)));
        assert_eq!(snapshot.total_balance, bdt(dec!(32000)));
    }

    #[test]
    fn test_balance_equals_signed_entry_sum() {
        let mut mb = MainBalance::new(Currency::BDT, Utc::now());
        let entries = [
            (EntryKind::Investment, dec!(30000)),
            (EntryKind::InstallmentReturn, dec!(4500)),
            (EntryKind::ProductCost, dec!(12000)),
            (EntryKind::Withdrawal, dec!(2500)),
            (EntryKind::MaintenanceCost, dec!(700)),
        ];

        let mut expected = dec!(0);
        for (kind, amount) in entries {
            mb.apply(kind, bdt(amount), Utc::now()).unwrap();
            expected += if kind.is_outflow() { -amount } else { amount };
        }

        assert_eq!(mb.total_balance.amount(), expected);
    }
}
