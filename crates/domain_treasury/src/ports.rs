//! Treasury store port
//!
//! The `TreasuryStore` trait defines all operations the treasury domain
//! needs from its data source. Adapters:
//!
//! - **Internal Adapter**: PostgreSQL (infra_db)
//! - **Memory Adapter**: [`crate::InMemoryTreasuryStore`] for tests and demos

use async_trait::async_trait;

use core_kernel::{DomainPort, PortError, ShareholderId};

use crate::balance::MainBalance;
use crate::entry::{EntryKind, LedgerEntry};

/// Query parameters for listing history entries
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryFilter {
    /// Restrict to one entry kind
    pub kind: Option<EntryKind>,
    /// Restrict to entries referencing a shareholder
    pub shareholder_id: Option<ShareholderId>,
    /// Cap the number of rows returned
    pub limit: Option<u32>,
}

impl EntryFilter {
    /// Filter by entry kind
    pub fn by_kind(kind: EntryKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    /// Filter by shareholder reference
    pub fn by_shareholder(id: ShareholderId) -> Self {
        Self {
            shareholder_id: Some(id),
            ..Default::default()
        }
    }

    /// Caps the result size
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Store port for the treasury domain
#[async_trait]
pub trait TreasuryStore: DomainPort {
    /// Loads the current main balance, seeding a zeroed row on first use
    async fn load_balance(&self) -> Result<MainBalance, PortError>;

    /// Commits a mutated balance together with its history entry
    ///
    /// Both writes happen in one transaction. Fails with
    /// [`PortError::Conflict`] when the stored version differs from
    /// `expected_version`; on success the stored version is
    /// `expected_version + 1`.
    async fn commit_entry(
        &self,
        balance: &MainBalance,
        entry: &LedgerEntry,
        expected_version: u64,
    ) -> Result<(), PortError>;

    /// Lists history entries matching the filter, newest first
    async fn list_entries(&self, filter: EntryFilter) -> Result<Vec<LedgerEntry>, PortError>;
}
