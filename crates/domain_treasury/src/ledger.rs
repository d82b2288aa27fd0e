//! The treasury ledger service
//!
//! Every main-balance mutation in the system funnels through
//! [`TreasuryLedger::apply_entry`]: validate, apply to the aggregate, commit
//! balance + history atomically, retrying a bounded number of times when a
//! concurrent writer bumps the row version first.

use std::sync::Arc;

use tracing::{info, warn};

use core_kernel::{Clock, Money};

use crate::balance::BalanceSnapshot;
use crate::entry::{EntryKind, EntryRefs, LedgerEntry};
use crate::error::TreasuryError;
use crate::ports::{EntryFilter, TreasuryStore};

/// Bounded optimistic-concurrency retries before surfacing the conflict
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Service owning all mutations of the main balance
pub struct TreasuryLedger {
    store: Arc<dyn TreasuryStore>,
    clock: Arc<dyn Clock>,
}

impl TreasuryLedger {
    /// Creates a new ledger service
    pub fn new(store: Arc<dyn TreasuryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Applies one signed entry to the main balance
    ///
    /// The amount must be positive; the kind carries the sign. Outflow kinds
    /// fail with [`TreasuryError::InsufficientFunds`] when the amount exceeds
    /// the current balance, leaving no trace in the history.
    ///
    /// On success exactly one balance row was updated and exactly one history
    /// entry appended, committed together.
    pub async fn apply_entry(
        &self,
        kind: EntryKind,
        amount: Money,
        description: impl Into<String>,
        refs: EntryRefs,
    ) -> Result<BalanceSnapshot, TreasuryError> {
        if !amount.is_positive() {
            return Err(TreasuryError::NonPositiveAmount(amount));
        }
        let description = description.into();

        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut balance = self.store.load_balance().await?;
            let expected_version = balance.version;
            let now = self.clock.now();

            balance.apply(kind, amount, now)?;
            let entry = LedgerEntry::new(kind, amount, description.clone(), refs, now);

            match self
                .store
                .commit_entry(&balance, &entry, expected_version)
                .await
            {
                Ok(()) => {
                    info!(
                        kind = %kind,
                        amount = %amount,
                        balance = %balance.total_balance,
                        "ledger entry applied"
                    );
                    return Ok(balance.snapshot());
                }
                Err(err) if err.is_retryable() && attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(kind = %kind, attempt, "concurrent balance write, retrying");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// The latest balance with derived totals recomputed on read
    pub async fn balance(&self) -> Result<BalanceSnapshot, TreasuryError> {
        Ok(self.store.load_balance().await?.snapshot())
    }

    /// History entries matching the filter, newest first
    pub async fn transactions(
        &self,
        filter: EntryFilter,
    ) -> Result<Vec<LedgerEntry>, TreasuryError> {
        self.store.list_entries(filter).await.map_err(Into::into)
    }
}
