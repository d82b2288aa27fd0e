//! The monthly earnings distributor
//!
//! Distributes a pool of business profit across active shareholders,
//! proportional to share count: `earning = profit × (annual_rate / 12) ×
//! share_fraction`. Idempotent per (shareholder, month); forced
//! recalculation applies the signed delta to the shareholder's balances so
//! concurrent distributions for other shareholders stay consistent.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{error, info};

use core_kernel::{Clock, Money, Rate, ShareholderId, YearMonth};

use crate::earning::{EarningSummary, MonthlyEarningPoint, ShareholderEarning};
use crate::error::ShareholderError;
use crate::ports::ShareholderStore;
use crate::shareholder::{Shareholder, ShareholderStatus};

/// Bounded optimistic-concurrency retries before surfacing the conflict
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Per-shareholder failure inside a batch distribution
#[derive(Debug)]
pub struct DistributionFailure {
    pub shareholder_id: ShareholderId,
    pub reason: String,
}

/// Result of a batch distribution: successes plus collected failures
#[derive(Debug)]
pub struct DistributionOutcome {
    pub earnings: Vec<ShareholderEarning>,
    pub failures: Vec<DistributionFailure>,
}

/// Service distributing monthly profit shares
pub struct EarningsDistributor {
    store: Arc<dyn ShareholderStore>,
    clock: Arc<dyn Clock>,
    annual_rate: Rate,
}

impl EarningsDistributor {
    /// Creates a distributor with the standard 15% annual rate
    pub fn new(store: Arc<dyn ShareholderStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            annual_rate: Rate::from_percentage(dec!(15)),
        }
    }

    /// Overrides the annual profit rate
    pub fn with_annual_rate(mut self, rate: Rate) -> Self {
        self.annual_rate = rate;
        self
    }

    /// Calculates one shareholder's earning for the current month
    ///
    /// Returns the cached row when one already exists and `force` is false.
    /// With `force`, the row is replaced and the delta (new − old) applied to
    /// the shareholder's cumulative earning and balance.
    pub async fn calculate_monthly_earnings(
        &self,
        shareholder_id: ShareholderId,
        total_business_profit: Money,
        force_recalculate: bool,
    ) -> Result<ShareholderEarning, ShareholderError> {
        ensure_non_negative_profit(total_business_profit)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let month = self.clock.current_month();
            match self
                .try_calculate(shareholder_id, total_business_profit, month, force_recalculate)
                .await
            {
                Err(err) if err.is_conflict() && attempt < MAX_COMMIT_ATTEMPTS => continue,
                other => return other,
            }
        }
    }

    /// Distributes the pool across every active shareholder
    ///
    /// A single shareholder's failure is logged and collected; the batch
    /// continues with the rest.
    pub async fn calculate_all_shareholders_earnings(
        &self,
        total_business_profit: Money,
        force_recalculate: bool,
    ) -> Result<DistributionOutcome, ShareholderError> {
        ensure_non_negative_profit(total_business_profit)?;

        let shareholders = self
            .store
            .list_by_status(ShareholderStatus::Active)
            .await?;
        if shareholders.is_empty() {
            return Err(ShareholderError::NoActiveShareholders);
        }

        let mut outcome = DistributionOutcome {
            earnings: Vec::with_capacity(shareholders.len()),
            failures: Vec::new(),
        };

        for shareholder in shareholders {
            match self
                .calculate_monthly_earnings(
                    shareholder.id,
                    total_business_profit,
                    force_recalculate,
                )
                .await
            {
                Ok(earning) => outcome.earnings.push(earning),
                Err(err) => {
                    error!(
                        shareholder = %shareholder.id,
                        %err,
                        "earning calculation failed; continuing batch"
                    );
                    outcome.failures.push(DistributionFailure {
                        shareholder_id: shareholder.id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            succeeded = outcome.earnings.len(),
            failed = outcome.failures.len(),
            "batch distribution finished"
        );
        Ok(outcome)
    }

    /// Re-derives every active shareholder's earning for a past month
    ///
    /// Existing rows are replaced delta-wise; missing rows are created. The
    /// month must not lie in the future.
    pub async fn recalculate_month_earnings(
        &self,
        month: YearMonth,
        total_business_profit: Money,
    ) -> Result<Vec<ShareholderEarning>, ShareholderError> {
        ensure_non_negative_profit(total_business_profit)?;
        if month.is_after(&self.clock.current_month()) {
            return Err(ShareholderError::FutureMonth(month));
        }

        let shareholders = self
            .store
            .list_by_status(ShareholderStatus::Active)
            .await?;
        if shareholders.is_empty() {
            return Err(ShareholderError::NoActiveShareholders);
        }
        let total_shares = self.nonzero_total_shares().await?;

        let mut results = Vec::with_capacity(shareholders.len());
        for shareholder in shareholders {
            let earning = self
                .upsert_earning(shareholder, month, total_business_profit, total_shares, true)
                .await?;
            results.push(earning);
        }

        info!(%month, count = results.len(), "month earnings recalculated");
        Ok(results)
    }

    /// Records an earning imported from outside the system for a past month
    ///
    /// Fails when the (shareholder, month) pair already has a row.
    pub async fn add_historical_earning(
        &self,
        shareholder_id: ShareholderId,
        month: YearMonth,
        monthly_earning: Money,
        description: Option<String>,
    ) -> Result<ShareholderEarning, ShareholderError> {
        if monthly_earning.is_negative() {
            return Err(ShareholderError::InvalidArgument(format!(
                "monthly earning must not be negative, got {monthly_earning}"
            )));
        }
        if month.is_after(&self.clock.current_month()) {
            return Err(ShareholderError::FutureMonth(month));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut shareholder = self.store.get_shareholder(shareholder_id).await?;
            let expected_version = shareholder.version;

            if self.store.find_earning(shareholder_id, month).await?.is_some() {
                return Err(ShareholderError::EarningExists {
                    shareholder_id,
                    month,
                });
            }

            let earning = ShareholderEarning::new(
                shareholder_id,
                month,
                monthly_earning,
                description.clone().unwrap_or_else(|| "Historical earning".to_string()),
                self.clock.today(),
            );
            shareholder.credit_earning(monthly_earning, self.clock.now())?;

            match self
                .store
                .commit_earning(&earning, &shareholder, expected_version)
                .await
            {
                Ok(()) => {
                    info!(shareholder = %shareholder_id, %month, "historical earning recorded");
                    return Ok(earning);
                }
                Err(err) if err.is_retryable() && attempt < MAX_COMMIT_ATTEMPTS => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Lifetime earning summary for one shareholder
    pub async fn earning_summary(
        &self,
        shareholder_id: ShareholderId,
    ) -> Result<EarningSummary, ShareholderError> {
        let shareholder = self.store.get_shareholder(shareholder_id).await?;
        let earnings = self.store.earnings_for_shareholder(shareholder_id).await?;

        let currency = shareholder.current_balance.currency();
        let total = earnings
            .iter()
            .fold(Money::zero(currency), |acc, e| acc + e.monthly_earning);
        let average = if earnings.is_empty() {
            Money::zero(currency)
        } else {
            total.divide(Decimal::from(earnings.len() as u64))?
        };

        Ok(EarningSummary {
            total_earnings: total,
            average_monthly_earning: average,
            total_months: earnings.len() as u32,
            last_earning_month: earnings.first().map(|e| e.month),
        })
    }

    /// The trailing twelve months as a zero-filled series, oldest first
    pub async fn last_12_months_earnings(
        &self,
        shareholder_id: ShareholderId,
    ) -> Result<Vec<MonthlyEarningPoint>, ShareholderError> {
        let shareholder = self.store.get_shareholder(shareholder_id).await?;
        let currency = shareholder.current_balance.currency();
        let current = self.clock.current_month();

        let mut points = Vec::with_capacity(12);
        for back in (0..12).rev() {
            let month = current.minus_months(back);
            let earning = self.store.find_earning(shareholder_id, month).await?;
            points.push(MonthlyEarningPoint {
                month,
                earning: earning
                    .as_ref()
                    .map(|e| e.monthly_earning)
                    .unwrap_or_else(|| Money::zero(currency)),
                calculated: earning.is_some(),
            });
        }
        Ok(points)
    }

    /// All earnings recorded for one month
    pub async fn month_earnings(
        &self,
        month: YearMonth,
    ) -> Result<Vec<ShareholderEarning>, ShareholderError> {
        self.store.earnings_for_month(month).await.map_err(Into::into)
    }

    async fn try_calculate(
        &self,
        shareholder_id: ShareholderId,
        total_business_profit: Money,
        month: YearMonth,
        force_recalculate: bool,
    ) -> Result<ShareholderEarning, ShareholderError> {
        let shareholder = self.store.get_shareholder(shareholder_id).await?;
        if !shareholder.is_active() {
            return Err(ShareholderError::InactiveShareholder(shareholder_id));
        }

        if !force_recalculate {
            if let Some(existing) = self.store.find_earning(shareholder_id, month).await? {
                info!(
                    shareholder = %shareholder_id,
                    %month,
                    "earning already calculated; returning cached value"
                );
                return Ok(existing);
            }
        }

        let total_shares = self.nonzero_total_shares().await?;
        self.upsert_earning(
            shareholder,
            month,
            total_business_profit,
            total_shares,
            force_recalculate,
        )
        .await
    }

    /// Creates or delta-replaces the earning row for (shareholder, month)
    async fn upsert_earning(
        &self,
        mut shareholder: Shareholder,
        month: YearMonth,
        total_business_profit: Money,
        total_shares: u64,
        replace_existing: bool,
    ) -> Result<ShareholderEarning, ShareholderError> {
        let expected_version = shareholder.version;
        let fraction = Decimal::from(shareholder.total_share) / Decimal::from(total_shares);
        let share_percent = (fraction * dec!(100)).round_dp(2);
        let monthly_earning =
            total_business_profit.multiply(self.annual_rate.monthly().as_decimal() * fraction);

        let existing = if replace_existing {
            self.store.find_earning(shareholder.id, month).await?
        } else {
            None
        };

        let earning = match existing {
            Some(mut row) => {
                let delta = monthly_earning.checked_sub(&row.monthly_earning)?;
                row.monthly_earning = monthly_earning;
                row.description =
                    format!("Monthly profit share ({share_percent}%) - Recalculated");
                row.calculated_on = self.clock.today();
                shareholder.credit_earning(delta, self.clock.now())?;
                row
            }
            None => {
                let row = ShareholderEarning::new(
                    shareholder.id,
                    month,
                    monthly_earning,
                    format!("Monthly profit share ({share_percent}%)"),
                    self.clock.today(),
                );
                shareholder.credit_earning(monthly_earning, self.clock.now())?;
                row
            }
        };

        self.store
            .commit_earning(&earning, &shareholder, expected_version)
            .await?;

        info!(
            shareholder = %shareholder.id,
            %month,
            earning = %earning.monthly_earning,
            "monthly earning recorded"
        );
        Ok(earning)
    }

    async fn nonzero_total_shares(&self) -> Result<u64, ShareholderError> {
        let total = self.store.total_shares().await?;
        if total == 0 {
            return Err(ShareholderError::NoShares);
        }
        Ok(total)
    }
}

fn ensure_non_negative_profit(profit: Money) -> Result<(), ShareholderError> {
    if profit.is_negative() {
        return Err(ShareholderError::InvalidArgument(format!(
            "total business profit must not be negative, got {profit}"
        )));
    }
    Ok(())
}
