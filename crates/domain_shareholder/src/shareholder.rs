//! The shareholder aggregate

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{Currency, Money, ShareholderId};

use crate::error::ShareholderError;

/// Whether a shareholder participates in distributions and workflows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShareholderStatus {
    Active,
    Inactive,
}

/// An owner of shares in the operation
///
/// `investment` is cumulative capital contribution; `current_balance` is the
/// spendable pool fed by distributed earnings and share sales;
/// `total_earning` is cumulative distributed profit. The balance is allowed
/// to dip below zero transiently by earning recalculation deltas; withdrawal
/// and approval are where non-negativity is enforced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shareholder {
    /// Unique identifier
    pub id: ShareholderId,
    /// Display name
    pub name: String,
    /// Cumulative capital contribution
    pub investment: Money,
    /// Number of shares held
    pub total_share: u32,
    /// Cumulative distributed profit
    pub total_earning: Money,
    /// Spendable balance
    pub current_balance: Money,
    /// Participation status
    pub status: ShareholderStatus,
    /// Date the shareholder joined
    pub join_date: NaiveDate,
    /// Optimistic concurrency version, bumped by the store on commit
    pub version: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Shareholder {
    /// Creates an active shareholder with zeroed balances
    pub fn new(
        name: impl Into<String>,
        currency: Currency,
        join_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        let zero = Money::zero(currency);
        Self {
            id: ShareholderId::new_v7(),
            name: name.into(),
            investment: zero,
            total_share: 0,
            total_earning: zero,
            current_balance: zero,
            status: ShareholderStatus::Active,
            join_date,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ShareholderStatus::Active
    }

    /// Records a capital contribution: raises investment and balance
    pub fn add_investment(
        &mut self,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<(), ShareholderError> {
        if !amount.is_positive() {
            return Err(ShareholderError::InvalidArgument(format!(
                "investment must be positive, got {amount}"
            )));
        }
        self.investment = self.investment.checked_add(&amount)?;
        self.current_balance = self.current_balance.checked_add(&amount)?;
        self.updated_at = now;
        Ok(())
    }

    /// Applies a signed earning delta to both cumulative earning and balance
    ///
    /// Negative deltas come from forced recalculation of an earlier, too-high
    /// earning; they are applied as-is.
    pub fn credit_earning(
        &mut self,
        delta: Money,
        now: DateTime<Utc>,
    ) -> Result<(), ShareholderError> {
        self.total_earning = self.total_earning.checked_add(&delta)?;
        self.current_balance = self.current_balance.checked_add(&delta)?;
        self.updated_at = now;
        Ok(())
    }

    /// Deducts from the spendable balance, refusing to overdraw
    pub fn deduct_balance(
        &mut self,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<(), ShareholderError> {
        if amount > self.current_balance {
            return Err(ShareholderError::InsufficientBalance {
                available: self.current_balance,
                requested: amount,
            });
        }
        self.current_balance = self.current_balance.checked_sub(&amount)?;
        self.updated_at = now;
        Ok(())
    }

    /// Applies a completed share purchase: shares and investment rise
    pub fn apply_share_purchase(
        &mut self,
        quantity: u32,
        total_amount: Money,
        now: DateTime<Utc>,
    ) -> Result<(), ShareholderError> {
        self.total_share += quantity;
        self.investment = self.investment.checked_add(&total_amount)?;
        self.updated_at = now;
        Ok(())
    }

    /// Applies a completed share sale
    ///
    /// Shares drop, the proceeds land on the spendable balance, and the
    /// recorded investment shrinks proportionally to the sold fraction.
    pub fn apply_share_sale(
        &mut self,
        quantity: u32,
        total_amount: Money,
        now: DateTime<Utc>,
    ) -> Result<(), ShareholderError> {
        if quantity > self.total_share {
            return Err(ShareholderError::InsufficientShares {
                available: self.total_share,
                requested: quantity,
            });
        }

        let sold_fraction = Decimal::from(quantity) / Decimal::from(self.total_share);
        let investment_reduction = self.investment.multiply(sold_fraction);

        self.total_share -= quantity;
        self.current_balance = self.current_balance.checked_add(&total_amount)?;
        self.investment = self.investment.checked_sub(&investment_reduction)?;
        self.updated_at = now;
        Ok(())
    }
}
