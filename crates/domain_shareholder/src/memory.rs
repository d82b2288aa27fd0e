//! In-memory shareholder store
//!
//! Mock adapter for tests and for running the core without PostgreSQL. It
//! honours the same atomicity and version-check contracts as the database
//! adapter.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use core_kernel::{
    DomainPort, EarningId, PortError, ShareTradeId, ShareholderId, WithdrawalRequestId, YearMonth,
};

use crate::earning::ShareholderEarning;
use crate::ports::{ShareholderStore, TradeQuery, WithdrawalQuery};
use crate::share_trade::ShareTrade;
use crate::shareholder::{Shareholder, ShareholderStatus};
use crate::withdrawal::WithdrawalRequest;

#[derive(Default)]
struct State {
    shareholders: HashMap<ShareholderId, Shareholder>,
    earnings: HashMap<EarningId, ShareholderEarning>,
    withdrawals: HashMap<WithdrawalRequestId, WithdrawalRequest>,
    trades: HashMap<ShareTradeId, ShareTrade>,
}

/// Thread-safe in-memory implementation of [`ShareholderStore`]
#[derive(Default)]
pub struct InMemoryShareholderStore {
    state: Mutex<State>,
}

impl InMemoryShareholderStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl DomainPort for InMemoryShareholderStore {}

fn check_version(stored: &Shareholder, expected_version: u64) -> Result<(), PortError> {
    if stored.version != expected_version {
        return Err(PortError::conflict(format!(
            "shareholder {} version is {}, expected {}",
            stored.id, stored.version, expected_version
        )));
    }
    Ok(())
}

fn store_shareholder(state: &mut State, shareholder: &Shareholder, expected_version: u64) {
    let mut committed = shareholder.clone();
    committed.version = expected_version + 1;
    state.shareholders.insert(shareholder.id, committed);
}

#[async_trait]
impl ShareholderStore for InMemoryShareholderStore {
    async fn insert_shareholder(&self, shareholder: &Shareholder) -> Result<(), PortError> {
        let mut state = self.state.lock().expect("shareholder store lock poisoned");
        if state.shareholders.contains_key(&shareholder.id) {
            return Err(PortError::conflict(format!(
                "shareholder {} already exists",
                shareholder.id
            )));
        }
        state.shareholders.insert(shareholder.id, shareholder.clone());
        Ok(())
    }

    async fn get_shareholder(&self, id: ShareholderId) -> Result<Shareholder, PortError> {
        let state = self.state.lock().expect("shareholder store lock poisoned");
        state
            .shareholders
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Shareholder", id))
    }

    async fn update_shareholder(
        &self,
        shareholder: &Shareholder,
        expected_version: u64,
    ) -> Result<(), PortError> {
        let mut state = self.state.lock().expect("shareholder store lock poisoned");
        let stored = state
            .shareholders
            .get(&shareholder.id)
            .ok_or_else(|| PortError::not_found("Shareholder", shareholder.id))?;
        check_version(stored, expected_version)?;
        store_shareholder(&mut state, shareholder, expected_version);
        Ok(())
    }

    async fn list_by_status(
        &self,
        status: ShareholderStatus,
    ) -> Result<Vec<Shareholder>, PortError> {
        let state = self.state.lock().expect("shareholder store lock poisoned");
        let mut shareholders: Vec<Shareholder> = state
            .shareholders
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        shareholders.sort_by_key(|s| (s.join_date, *s.id.as_uuid()));
        Ok(shareholders)
    }

    async fn total_shares(&self) -> Result<u64, PortError> {
        let state = self.state.lock().expect("shareholder store lock poisoned");
        Ok(state
            .shareholders
            .values()
            .map(|s| u64::from(s.total_share))
            .sum())
    }

    async fn find_earning(
        &self,
        shareholder_id: ShareholderId,
        month: YearMonth,
    ) -> Result<Option<ShareholderEarning>, PortError> {
        let state = self.state.lock().expect("shareholder store lock poisoned");
        Ok(state
            .earnings
            .values()
            .find(|e| e.shareholder_id == shareholder_id && e.month == month)
            .cloned())
    }

    async fn earnings_for_shareholder(
        &self,
        shareholder_id: ShareholderId,
    ) -> Result<Vec<ShareholderEarning>, PortError> {
        let state = self.state.lock().expect("shareholder store lock poisoned");
        let mut earnings: Vec<ShareholderEarning> = state
            .earnings
            .values()
            .filter(|e| e.shareholder_id == shareholder_id)
            .cloned()
            .collect();
        earnings.sort_by_key(|e| std::cmp::Reverse(e.month));
        Ok(earnings)
    }

    async fn earnings_for_month(
        &self,
        month: YearMonth,
    ) -> Result<Vec<ShareholderEarning>, PortError> {
        let state = self.state.lock().expect("shareholder store lock poisoned");
        let mut earnings: Vec<ShareholderEarning> = state
            .earnings
            .values()
            .filter(|e| e.month == month)
            .cloned()
            .collect();
        earnings.sort_by_key(|e| *e.shareholder_id.as_uuid());
        Ok(earnings)
    }

    async fn commit_earning(
        &self,
        earning: &ShareholderEarning,
        shareholder: &Shareholder,
        expected_version: u64,
    ) -> Result<(), PortError> {
        let mut state = self.state.lock().expect("shareholder store lock poisoned");
        let stored = state
            .shareholders
            .get(&shareholder.id)
            .ok_or_else(|| PortError::not_found("Shareholder", shareholder.id))?;
        check_version(stored, expected_version)?;

        state.earnings.insert(earning.id, earning.clone());
        store_shareholder(&mut state, shareholder, expected_version);
        Ok(())
    }

    async fn insert_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), PortError> {
        let mut state = self.state.lock().expect("shareholder store lock poisoned");
        state.withdrawals.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_withdrawal(
        &self,
        id: WithdrawalRequestId,
    ) -> Result<WithdrawalRequest, PortError> {
        let state = self.state.lock().expect("shareholder store lock poisoned");
        state
            .withdrawals
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("WithdrawalRequest", id))
    }

    async fn save_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), PortError> {
        let mut state = self.state.lock().expect("shareholder store lock poisoned");
        if !state.withdrawals.contains_key(&request.id) {
            return Err(PortError::not_found("WithdrawalRequest", request.id));
        }
        state.withdrawals.insert(request.id, request.clone());
        Ok(())
    }

    async fn list_withdrawals(
        &self,
        query: WithdrawalQuery,
    ) -> Result<Vec<WithdrawalRequest>, PortError> {
        let state = self.state.lock().expect("shareholder store lock poisoned");
        let mut requests: Vec<WithdrawalRequest> = state
            .withdrawals
            .values()
            .filter(|r| query.shareholder_id.map_or(true, |id| r.shareholder_id == id))
            .filter(|r| query.status.map_or(true, |status| r.status == status))
            .cloned()
            .collect();
        requests.sort_by_key(|r| std::cmp::Reverse((r.requested_at, *r.id.as_uuid())));
        if let Some(limit) = query.limit {
            requests.truncate(limit as usize);
        }
        Ok(requests)
    }

    async fn commit_withdrawal_approval(
        &self,
        request: &WithdrawalRequest,
        shareholder: &Shareholder,
        expected_version: u64,
    ) -> Result<(), PortError> {
        let mut state = self.state.lock().expect("shareholder store lock poisoned");
        if !state.withdrawals.contains_key(&request.id) {
            return Err(PortError::not_found("WithdrawalRequest", request.id));
        }
        let stored = state
            .shareholders
            .get(&shareholder.id)
            .ok_or_else(|| PortError::not_found("Shareholder", shareholder.id))?;
        check_version(stored, expected_version)?;

        state.withdrawals.insert(request.id, request.clone());
        store_shareholder(&mut state, shareholder, expected_version);
        Ok(())
    }

    async fn insert_trade(&self, trade: &ShareTrade) -> Result<(), PortError> {
        let mut state = self.state.lock().expect("shareholder store lock poisoned");
        state.trades.insert(trade.id, trade.clone());
        Ok(())
    }

    async fn get_trade(&self, id: ShareTradeId) -> Result<ShareTrade, PortError> {
        let state = self.state.lock().expect("shareholder store lock poisoned");
        state
            .trades
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("ShareTrade", id))
    }

    async fn save_trade(&self, trade: &ShareTrade) -> Result<(), PortError> {
        let mut state = self.state.lock().expect("shareholder store lock poisoned");
        if !state.trades.contains_key(&trade.id) {
            return Err(PortError::not_found("ShareTrade", trade.id));
        }
        state.trades.insert(trade.id, trade.clone());
        Ok(())
    }

    async fn list_trades(&self, query: TradeQuery) -> Result<Vec<ShareTrade>, PortError> {
        let state = self.state.lock().expect("shareholder store lock poisoned");
        let mut trades: Vec<ShareTrade> = state
            .trades
            .values()
            .filter(|t| query.shareholder_id.map_or(true, |id| t.shareholder_id == id))
            .filter(|t| query.status.map_or(true, |status| t.status == status))
            .cloned()
            .collect();
        trades.sort_by_key(|t| std::cmp::Reverse((t.requested_at, *t.id.as_uuid())));
        if let Some(limit) = query.limit {
            trades.truncate(limit as usize);
        }
        Ok(trades)
    }

    async fn commit_trade_completion(
        &self,
        trade: &ShareTrade,
        shareholder: &Shareholder,
        expected_version: u64,
    ) -> Result<(), PortError> {
        let mut state = self.state.lock().expect("shareholder store lock poisoned");
        if !state.trades.contains_key(&trade.id) {
            return Err(PortError::not_found("ShareTrade", trade.id));
        }
        let stored = state
            .shareholders
            .get(&shareholder.id)
            .ok_or_else(|| PortError::not_found("Shareholder", shareholder.id))?;
        check_version(stored, expected_version)?;

        state.trades.insert(trade.id, trade.clone());
        store_shareholder(&mut state, shareholder, expected_version);
        Ok(())
    }
}
