//! The installment aggregate
//!
//! An installment is a credit sale of one product to one member. The payable
//! amount and the even monthly split are derived from the terms at creation
//! and update time; the remaining total is maintained by the allocator as
//! the sum over the payment schedules.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::{AgentId, InstallmentId, MemberId, Money, ProductId, Rate};

use crate::error::InstallmentError;

/// Upper bound on the repayment period
pub const MAX_INSTALLMENT_MONTHS: u32 = 60;

/// Installment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallmentStatus {
    /// Repayment in progress
    Active,
    /// Fully repaid
    Completed,
    /// At least one schedule is past due and unpaid
    Overdue,
    /// Administratively cancelled; no further payments expected
    Cancelled,
}

/// The financial terms an installment is derived from
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InstallmentTerms {
    /// Price of the product
    pub total_amount: Money,
    /// Additional costs billed to the member (delivery, paperwork)
    pub other_cost: Money,
    /// Amount paid up front
    pub advance_paid: Money,
    /// Number of monthly installments
    pub months: u32,
    /// Annual interest rate applied to the product price
    pub interest_rate: Rate,
}

impl InstallmentTerms {
    /// Validates ranges before any derivation or write
    pub fn validate(&self) -> Result<(), InstallmentError> {
        if self.total_amount.is_negative() {
            return Err(InstallmentError::InvalidTerms(format!(
                "total amount must not be negative, got {}",
                self.total_amount
            )));
        }
        if self.other_cost.is_negative() {
            return Err(InstallmentError::InvalidTerms(format!(
                "other cost must not be negative, got {}",
                self.other_cost
            )));
        }
        if self.advance_paid.is_negative() {
            return Err(InstallmentError::InvalidTerms(format!(
                "advance payment must not be negative, got {}",
                self.advance_paid
            )));
        }
        if self.months == 0 || self.months > MAX_INSTALLMENT_MONTHS {
            return Err(InstallmentError::InvalidTerms(format!(
                "installment months must be between 1 and {}, got {}",
                MAX_INSTALLMENT_MONTHS, self.months
            )));
        }
        let percent = self.interest_rate.as_percentage();
        if percent < Decimal::ZERO || percent > dec!(100) {
            return Err(InstallmentError::InvalidTerms(format!(
                "interest rate must be between 0% and 100%, got {}",
                self.interest_rate
            )));
        }
        Ok(())
    }

    /// Product price with interest: `total × (1 + rate)`
    pub fn total_with_interest(&self) -> Money {
        self.total_amount + self.interest_rate.apply(&self.total_amount)
    }

    /// Amount the member still has to pay:
    /// `max(total_with_interest + other_cost − advance, 0)`
    pub fn payable_amount(&self) -> Result<Money, InstallmentError> {
        let gross = self.total_with_interest() + self.other_cost;
        Ok(gross.saturating_sub(&self.advance_paid)?)
    }

    /// Even monthly split of the payable amount
    ///
    /// The split is plain division; any sub-minor-unit residue stays in the
    /// 4-decimal representation rather than being pushed into a final
    /// catch-up month.
    pub fn monthly_amount(&self) -> Result<Money, InstallmentError> {
        Ok(self.payable_amount()?.divide(Decimal::from(self.months))?)
    }
}

/// A credit sale repaid via monthly schedules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installment {
    /// Unique identifier
    pub id: InstallmentId,
    /// Product sold
    pub product_id: ProductId,
    /// Member repaying
    pub member_id: MemberId,
    /// Agent who handed over the product; default collector for schedules
    pub agent_id: AgentId,
    /// Financial terms
    pub terms: InstallmentTerms,
    /// Derived: product price with interest
    pub total_with_interest: Money,
    /// Derived: total the member must pay across all months
    pub payable_amount: Money,
    /// Derived: even monthly split
    pub monthly_amount: Money,
    /// Sum of remaining amounts over all schedules; maintained by the
    /// allocator after every payment event
    pub total_remaining: Money,
    /// Lifecycle status
    pub status: InstallmentStatus,
    /// Optimistic concurrency version, bumped by the store on commit
    pub version: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Installment {
    /// Creates a new installment from validated terms
    pub fn new(
        product_id: ProductId,
        member_id: MemberId,
        agent_id: AgentId,
        terms: InstallmentTerms,
        now: DateTime<Utc>,
    ) -> Result<Self, InstallmentError> {
        terms.validate()?;
        let payable = terms.payable_amount()?;

        Ok(Self {
            id: InstallmentId::new_v7(),
            product_id,
            member_id,
            agent_id,
            terms,
            total_with_interest: terms.total_with_interest(),
            payable_amount: payable,
            monthly_amount: terms.monthly_amount()?,
            total_remaining: payable,
            status: InstallmentStatus::Active,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replaces the terms and re-runs the derivation
    ///
    /// Existing schedules are intentionally left untouched; month-count
    /// changes go through the explicit schedule-extension operation.
    pub fn apply_terms(
        &mut self,
        terms: InstallmentTerms,
        now: DateTime<Utc>,
    ) -> Result<(), InstallmentError> {
        terms.validate()?;
        self.terms = terms;
        self.total_with_interest = terms.total_with_interest();
        self.payable_amount = terms.payable_amount()?;
        self.monthly_amount = terms.monthly_amount()?;
        self.updated_at = now;
        Ok(())
    }

    /// Re-establishes the remaining total and the derived status
    ///
    /// Called by the allocator after every payment event with the freshly
    /// recomputed schedule sum. Cancellation is sticky.
    pub fn refresh(&mut self, schedule_sum: Money, any_overdue: bool, now: DateTime<Utc>) {
        self.total_remaining = schedule_sum;
        if self.status != InstallmentStatus::Cancelled {
            self.status = if schedule_sum.is_zero() {
                InstallmentStatus::Completed
            } else if any_overdue {
                InstallmentStatus::Overdue
            } else {
                InstallmentStatus::Active
            };
        }
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;

    fn bdt(amount: Decimal) -> Money {
        Money::new(amount, Currency::BDT)
    }

    fn terms() -> InstallmentTerms {
        InstallmentTerms {
            total_amount: bdt(dec!(50000)),
            other_cost: bdt(dec!(500)),
            advance_paid: bdt(dec!(5000)),
            months: 12,
            interest_rate: Rate::from_percentage(dec!(15)),
        }
    }

    #[test]
    fn test_derivation() {
        let terms = terms();
        assert_eq!(terms.total_with_interest(), bdt(dec!(57500)));
        assert_eq!(terms.payable_amount().unwrap(), bdt(dec!(53000)));
        assert_eq!(
            terms.monthly_amount().unwrap().amount().round_dp(2),
            dec!(4416.67)
        );
    }

    #[test]
    fn test_advance_larger_than_payable_floors_at_zero() {
        let mut t = terms();
        t.advance_paid = bdt(dec!(100000));
        assert!(t.payable_amount().unwrap().is_zero());
    }

    #[test]
    fn test_validation_bounds() {
        let mut t = terms();
        t.total_amount = bdt(dec!(-1));
        assert!(matches!(t.validate(), Err(InstallmentError::InvalidTerms(_))));

        let mut t = terms();
        t.months = 0;
        assert!(t.validate().is_err());

        let mut t = terms();
        t.months = 61;
        assert!(t.validate().is_err());

        let mut t = terms();
        t.interest_rate = Rate::from_percentage(dec!(101));
        assert!(t.validate().is_err());

        assert!(terms().validate().is_ok());
    }

    #[test]
    fn test_refresh_status_transitions() {
        let now = Utc::now();
        let mut installment = Installment::new(
            ProductId::new_v7(),
            MemberId::new_v7(),
            AgentId::new_v7(),
            terms(),
            now,
        )
        .unwrap();

        installment.refresh(bdt(dec!(10000)), false, now);
        assert_eq!(installment.status, InstallmentStatus::Active);

        installment.refresh(bdt(dec!(10000)), true, now);
        assert_eq!(installment.status, InstallmentStatus::Overdue);

        installment.refresh(Money::zero(Currency::BDT), false, now);
        assert_eq!(installment.status, InstallmentStatus::Completed);

        installment.status = InstallmentStatus::Cancelled;
        installment.refresh(bdt(dec!(10000)), false, now);
        assert_eq!(installment.status, InstallmentStatus::Cancelled);
    }
}
