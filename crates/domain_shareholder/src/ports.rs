//! Shareholder store port
//!
//! The `ShareholderStore` trait defines all operations the shareholder
//! domain needs from its data source. Adapters:
//!
//! - **Internal Adapter**: PostgreSQL (infra_db)
//! - **Memory Adapter**: [`crate::InMemoryShareholderStore`] for tests and demos
//!
//! The `commit_*` methods pair a dependent record (earning, approval,
//! completion) with the shareholder mutation it implies and must persist
//! both atomically, guarded by the shareholder's row version.

use async_trait::async_trait;

use core_kernel::{
    DomainPort, PortError, ShareTradeId, ShareholderId, WithdrawalRequestId, YearMonth,
};

use crate::earning::ShareholderEarning;
use crate::share_trade::{ShareTrade, TradeStatus};
use crate::shareholder::{Shareholder, ShareholderStatus};
use crate::withdrawal::{WithdrawalRequest, WithdrawalStatus};

/// Query parameters for listing withdrawal requests
#[derive(Debug, Clone, Copy, Default)]
pub struct WithdrawalQuery {
    pub shareholder_id: Option<ShareholderId>,
    pub status: Option<WithdrawalStatus>,
    pub limit: Option<u32>,
}

impl WithdrawalQuery {
    /// All requests of one shareholder
    pub fn by_shareholder(id: ShareholderId) -> Self {
        Self {
            shareholder_id: Some(id),
            ..Default::default()
        }
    }

    /// All requests in one status
    pub fn by_status(status: WithdrawalStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Restricts to one status
    pub fn with_status(mut self, status: WithdrawalStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Caps the result size
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Query parameters for listing share trades
#[derive(Debug, Clone, Copy, Default)]
pub struct TradeQuery {
    pub shareholder_id: Option<ShareholderId>,
    pub status: Option<TradeStatus>,
    pub limit: Option<u32>,
}

impl TradeQuery {
    /// All trades of one shareholder
    pub fn by_shareholder(id: ShareholderId) -> Self {
        Self {
            shareholder_id: Some(id),
            ..Default::default()
        }
    }

    /// All trades in one status
    pub fn by_status(status: TradeStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Caps the result size
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Store port for the shareholder domain
#[async_trait]
pub trait ShareholderStore: DomainPort {
    /// Persists a new shareholder
    async fn insert_shareholder(&self, shareholder: &Shareholder) -> Result<(), PortError>;

    /// Loads a shareholder by id
    async fn get_shareholder(&self, id: ShareholderId) -> Result<Shareholder, PortError>;

    /// Updates a shareholder row, guarded by its version
    async fn update_shareholder(
        &self,
        shareholder: &Shareholder,
        expected_version: u64,
    ) -> Result<(), PortError>;

    /// All shareholders in a status, stable order (join date, then id)
    async fn list_by_status(
        &self,
        status: ShareholderStatus,
    ) -> Result<Vec<Shareholder>, PortError>;

    /// Sum of shares across all shareholders regardless of status
    async fn total_shares(&self) -> Result<u64, PortError>;

    /// The earning of one shareholder for one month, if recorded
    async fn find_earning(
        &self,
        shareholder_id: ShareholderId,
        month: YearMonth,
    ) -> Result<Option<ShareholderEarning>, PortError>;

    /// All earnings of a shareholder, newest month first
    async fn earnings_for_shareholder(
        &self,
        shareholder_id: ShareholderId,
    ) -> Result<Vec<ShareholderEarning>, PortError>;

    /// All earnings recorded for a month
    async fn earnings_for_month(
        &self,
        month: YearMonth,
    ) -> Result<Vec<ShareholderEarning>, PortError>;

    /// Upserts an earning row and updates its shareholder atomically
    ///
    /// Fails with [`PortError::Conflict`] on a shareholder version mismatch;
    /// on success the stored version is `expected_version + 1`.
    async fn commit_earning(
        &self,
        earning: &ShareholderEarning,
        shareholder: &Shareholder,
        expected_version: u64,
    ) -> Result<(), PortError>;

    /// Persists a new withdrawal request
    async fn insert_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), PortError>;

    /// Loads a withdrawal request by id
    async fn get_withdrawal(
        &self,
        id: WithdrawalRequestId,
    ) -> Result<WithdrawalRequest, PortError>;

    /// Saves a status-only transition of a withdrawal request
    async fn save_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), PortError>;

    /// Lists withdrawal requests, newest first
    async fn list_withdrawals(
        &self,
        query: WithdrawalQuery,
    ) -> Result<Vec<WithdrawalRequest>, PortError>;

    /// Persists an approval: the request transition and the balance deduction
    /// commit atomically, guarded by the shareholder version
    async fn commit_withdrawal_approval(
        &self,
        request: &WithdrawalRequest,
        shareholder: &Shareholder,
        expected_version: u64,
    ) -> Result<(), PortError>;

    /// Persists a new share trade request
    async fn insert_trade(&self, trade: &ShareTrade) -> Result<(), PortError>;

    /// Loads a share trade by id
    async fn get_trade(&self, id: ShareTradeId) -> Result<ShareTrade, PortError>;

    /// Saves a status-only transition of a share trade
    async fn save_trade(&self, trade: &ShareTrade) -> Result<(), PortError>;

    /// Lists share trades, newest first
    async fn list_trades(&self, query: TradeQuery) -> Result<Vec<ShareTrade>, PortError>;

    /// Persists a completion: the trade transition and the share/balance
    /// effects commit atomically, guarded by the shareholder version
    async fn commit_trade_completion(
        &self,
        trade: &ShareTrade,
        shareholder: &Shareholder,
        expected_version: u64,
    ) -> Result<(), PortError>;
}
