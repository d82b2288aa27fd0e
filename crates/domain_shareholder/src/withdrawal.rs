//! Withdrawal workflow
//!
//! Requests start PENDING and are gated twice: balance sufficiency
//! (including other still-pending requests) at request time, and again at
//! approval time since the balance may have moved in between. The deduction
//! itself happens only at approval.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use core_kernel::{Clock, Money, ShareholderId, WithdrawalRequestId};

use crate::error::ShareholderError;
use crate::ports::{ShareholderStore, WithdrawalQuery};

/// Bounded optimistic-concurrency retries before surfacing the conflict
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Lifecycle of a withdrawal request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawalStatus {
    /// Awaiting a decision
    Pending,
    /// Approved; balance already deducted
    Approved,
    /// Declined with a reason
    Rejected,
    /// Money handed over
    Processed,
    /// Withdrawn by the requester
    Cancelled,
}

/// A request to pay out part of a shareholder's spendable balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Unique identifier
    pub id: WithdrawalRequestId,
    /// Requesting shareholder
    pub shareholder_id: ShareholderId,
    /// Amount to pay out
    pub amount: Money,
    /// Stated reason
    pub reason: String,
    /// Current workflow status
    pub status: WithdrawalStatus,
    /// When the request was made
    pub requested_at: DateTime<Utc>,
    /// Admin who decided or processed the request
    pub processed_by: Option<String>,
    /// When the last transition happened
    pub processed_at: Option<DateTime<Utc>>,
    /// Reason given on rejection or cancellation
    pub rejection_reason: Option<String>,
}

/// Counts and amounts across a set of withdrawal requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalStats {
    pub total_requests: u32,
    /// Sum over approved and processed requests
    pub total_amount_withdrawn: Money,
    pub pending_count: u32,
    pub pending_amount: Money,
    pub approved_count: u32,
    pub processed_count: u32,
    pub rejected_count: u32,
    pub cancelled_count: u32,
}

/// Service gating shareholder payouts
pub struct WithdrawalWorkflow {
    store: Arc<dyn ShareholderStore>,
    clock: Arc<dyn Clock>,
}

impl WithdrawalWorkflow {
    /// Creates a new workflow service
    pub fn new(store: Arc<dyn ShareholderStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Files a withdrawal request
    ///
    /// The balance must cover this request plus every other still-pending
    /// request of the same shareholder. Nothing is deducted yet.
    pub async fn request_withdrawal(
        &self,
        shareholder_id: ShareholderId,
        amount: Money,
        reason: Option<String>,
    ) -> Result<WithdrawalRequest, ShareholderError> {
        if !amount.is_positive() {
            return Err(ShareholderError::InvalidArgument(format!(
                "withdrawal amount must be positive, got {amount}"
            )));
        }

        let shareholder = self.store.get_shareholder(shareholder_id).await?;
        if !shareholder.is_active() {
            return Err(ShareholderError::InactiveShareholder(shareholder_id));
        }
        if amount > shareholder.current_balance {
            return Err(ShareholderError::InsufficientBalance {
                available: shareholder.current_balance,
                requested: amount,
            });
        }

        let pending = self
            .store
            .list_withdrawals(
                WithdrawalQuery::by_shareholder(shareholder_id)
                    .with_status(WithdrawalStatus::Pending),
            )
            .await?;
        let pending_total = pending.iter().try_fold(
            Money::zero(amount.currency()),
            |acc, r| acc.checked_add(&r.amount),
        )?;
        let committed = amount.checked_add(&pending_total)?;
        if committed > shareholder.current_balance {
            return Err(ShareholderError::InsufficientBalance {
                available: shareholder.current_balance.checked_sub(&pending_total)?,
                requested: amount,
            });
        }

        let request = WithdrawalRequest {
            id: WithdrawalRequestId::new_v7(),
            shareholder_id,
            amount,
            reason: reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| "Withdrawal request".to_string()),
            status: WithdrawalStatus::Pending,
            requested_at: self.clock.now(),
            processed_by: None,
            processed_at: None,
            rejection_reason: None,
        };
        self.store.insert_withdrawal(&request).await?;

        info!(request = %request.id, shareholder = %shareholder_id, amount = %amount, "withdrawal requested");
        Ok(request)
    }

    /// Approves a pending request and deducts the balance
    ///
    /// Sufficiency and shareholder status are re-validated here; the balance
    /// may have changed since the request was filed.
    pub async fn approve(
        &self,
        request_id: WithdrawalRequestId,
        processed_by: &str,
    ) -> Result<WithdrawalRequest, ShareholderError> {
        ensure_audit_field(processed_by)?;

        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut request = self.store.get_withdrawal(request_id).await?;
            require_status(&request, WithdrawalStatus::Pending, "approve")?;

            let mut shareholder = self.store.get_shareholder(request.shareholder_id).await?;
            let expected_version = shareholder.version;
            if !shareholder.is_active() {
                return Err(ShareholderError::InactiveShareholder(shareholder.id));
            }
            shareholder.deduct_balance(request.amount, self.clock.now())?;

            request.status = WithdrawalStatus::Approved;
            request.processed_by = Some(processed_by.to_string());
            request.processed_at = Some(self.clock.now());

            match self
                .store
                .commit_withdrawal_approval(&request, &shareholder, expected_version)
                .await
            {
                Ok(()) => {
                    info!(request = %request_id, amount = %request.amount, "withdrawal approved");
                    return Ok(request);
                }
                Err(err) if err.is_retryable() && attempt < MAX_COMMIT_ATTEMPTS => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Rejects a pending request with a mandatory reason
    pub async fn reject(
        &self,
        request_id: WithdrawalRequestId,
        processed_by: &str,
        reason: &str,
    ) -> Result<WithdrawalRequest, ShareholderError> {
        ensure_audit_field(processed_by)?;
        if reason.trim().is_empty() {
            return Err(ShareholderError::InvalidArgument(
                "rejection reason is required".to_string(),
            ));
        }

        let mut request = self.store.get_withdrawal(request_id).await?;
        require_status(&request, WithdrawalStatus::Pending, "reject")?;

        request.status = WithdrawalStatus::Rejected;
        request.processed_by = Some(processed_by.to_string());
        request.processed_at = Some(self.clock.now());
        request.rejection_reason = Some(reason.to_string());
        self.store.save_withdrawal(&request).await?;

        info!(request = %request_id, "withdrawal rejected");
        Ok(request)
    }

    /// Marks an approved request as paid out
    pub async fn mark_processed(
        &self,
        request_id: WithdrawalRequestId,
        processed_by: &str,
    ) -> Result<WithdrawalRequest, ShareholderError> {
        ensure_audit_field(processed_by)?;

        let mut request = self.store.get_withdrawal(request_id).await?;
        require_status(&request, WithdrawalStatus::Approved, "process")?;

        request.status = WithdrawalStatus::Processed;
        request.processed_by = Some(processed_by.to_string());
        request.processed_at = Some(self.clock.now());
        self.store.save_withdrawal(&request).await?;

        info!(request = %request_id, "withdrawal processed");
        Ok(request)
    }

    /// Cancels a pending request
    pub async fn cancel(
        &self,
        request_id: WithdrawalRequestId,
        reason: Option<String>,
    ) -> Result<WithdrawalRequest, ShareholderError> {
        let mut request = self.store.get_withdrawal(request_id).await?;
        require_status(&request, WithdrawalStatus::Pending, "cancel")?;

        request.status = WithdrawalStatus::Cancelled;
        request.processed_at = Some(self.clock.now());
        request.rejection_reason = Some(
            reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| "Cancelled by requester".to_string()),
        );
        self.store.save_withdrawal(&request).await?;

        info!(request = %request_id, "withdrawal cancelled");
        Ok(request)
    }

    /// Lists requests matching the query, newest first
    pub async fn requests(
        &self,
        query: WithdrawalQuery,
    ) -> Result<Vec<WithdrawalRequest>, ShareholderError> {
        self.store.list_withdrawals(query).await.map_err(Into::into)
    }

    /// Counts and amounts, optionally restricted to one shareholder
    pub async fn statistics(
        &self,
        shareholder_id: Option<ShareholderId>,
    ) -> Result<WithdrawalStats, ShareholderError> {
        let query = match shareholder_id {
            Some(id) => WithdrawalQuery::by_shareholder(id),
            None => WithdrawalQuery::default(),
        };
        let requests = self.store.list_withdrawals(query).await?;

        let currency = requests
            .first()
            .map(|r| r.amount.currency())
            .unwrap_or(core_kernel::Currency::BDT);
        let mut stats = WithdrawalStats {
            total_requests: requests.len() as u32,
            total_amount_withdrawn: Money::zero(currency),
            pending_count: 0,
            pending_amount: Money::zero(currency),
            approved_count: 0,
            processed_count: 0,
            rejected_count: 0,
            cancelled_count: 0,
        };

        for request in &requests {
            match request.status {
                WithdrawalStatus::Pending => {
                    stats.pending_count += 1;
                    stats.pending_amount = stats.pending_amount.checked_add(&request.amount)?;
                }
                WithdrawalStatus::Approved => {
                    stats.approved_count += 1;
                    stats.total_amount_withdrawn =
                        stats.total_amount_withdrawn.checked_add(&request.amount)?;
                }
                WithdrawalStatus::Processed => {
                    stats.processed_count += 1;
                    stats.total_amount_withdrawn =
                        stats.total_amount_withdrawn.checked_add(&request.amount)?;
                }
                WithdrawalStatus::Rejected => stats.rejected_count += 1,
                WithdrawalStatus::Cancelled => stats.cancelled_count += 1,
            }
        }
        Ok(stats)
    }
}

fn ensure_audit_field(processed_by: &str) -> Result<(), ShareholderError> {
    if processed_by.trim().is_empty() {
        return Err(ShareholderError::InvalidArgument(
            "processed-by information is required".to_string(),
        ));
    }
    Ok(())
}

fn require_status(
    request: &WithdrawalRequest,
    expected: WithdrawalStatus,
    operation: &str,
) -> Result<(), ShareholderError> {
    if request.status != expected {
        return Err(ShareholderError::InvalidTransition(format!(
            "cannot {operation} withdrawal {} in status {:?}",
            request.id, request.status
        )));
    }
    Ok(())
}
