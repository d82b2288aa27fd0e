//! Monthly earning records and their read models

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use core_kernel::{EarningId, Money, ShareholderId, YearMonth};

/// One shareholder's distributed profit for one month
///
/// Unique per (shareholder, month). Recalculation replaces the value and
/// applies the signed delta to the shareholder's balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareholderEarning {
    /// Unique identifier
    pub id: EarningId,
    /// Owning shareholder
    pub shareholder_id: ShareholderId,
    /// Month the earning belongs to
    pub month: YearMonth,
    /// Distributed amount
    pub monthly_earning: Money,
    /// Human-readable description including the share percentage
    pub description: String,
    /// Date the value was (re)calculated
    pub calculated_on: NaiveDate,
}

impl ShareholderEarning {
    /// Creates a new earning row
    pub fn new(
        shareholder_id: ShareholderId,
        month: YearMonth,
        monthly_earning: Money,
        description: impl Into<String>,
        calculated_on: NaiveDate,
    ) -> Self {
        Self {
            id: EarningId::new_v7(),
            shareholder_id,
            month,
            monthly_earning,
            description: description.into(),
            calculated_on,
        }
    }
}

/// Lifetime earning summary for one shareholder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningSummary {
    /// Sum over all recorded months
    pub total_earnings: Money,
    /// Average per recorded month (zero when nothing recorded)
    pub average_monthly_earning: Money,
    /// Number of months with a recorded earning
    pub total_months: u32,
    /// Most recent recorded month
    pub last_earning_month: Option<YearMonth>,
}

/// One point of the trailing-12-months earning series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyEarningPoint {
    pub month: YearMonth,
    /// Recorded earning, zero when none was calculated
    pub earning: Money,
    /// Whether an earning row exists for the month
    pub calculated: bool,
}
