//! Ledger entry types
//!
//! This module defines the signed entry kinds that can move the main balance
//! and the immutable history records written alongside every mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{LedgerEntryId, MemberId, Money, ShareholderId};

/// The kind of a ledger entry; the kind determines the sign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Shareholder capital contribution (inflow)
    Investment,
    /// Shareholder payout (outflow)
    Withdrawal,
    /// Cost of a product bought for installment resale (outflow)
    ProductCost,
    /// Operational expense (outflow)
    MaintenanceCost,
    /// Collected installment money (inflow)
    InstallmentReturn,
}

impl EntryKind {
    /// True if this kind reduces the main balance
    pub fn is_outflow(&self) -> bool {
        matches!(
            self,
            EntryKind::Withdrawal | EntryKind::ProductCost | EntryKind::MaintenanceCost
        )
    }

    /// Stable code used in persisted rows
    pub fn code(&self) -> &'static str {
        match self {
            EntryKind::Investment => "INVESTMENT",
            EntryKind::Withdrawal => "WITHDRAWAL",
            EntryKind::ProductCost => "PRODUCT_COST",
            EntryKind::MaintenanceCost => "MAINTENANCE_COST",
            EntryKind::InstallmentReturn => "INSTALLMENT_RETURN",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Optional party references attached to a history entry for audit queries
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EntryRefs {
    /// Shareholder the entry concerns, if any
    pub shareholder_id: Option<ShareholderId>,
    /// Member the entry concerns, if any
    pub member_id: Option<MemberId>,
}

impl EntryRefs {
    /// References a shareholder
    pub fn shareholder(id: ShareholderId) -> Self {
        Self {
            shareholder_id: Some(id),
            member_id: None,
        }
    }

    /// References a member
    pub fn member(id: MemberId) -> Self {
        Self {
            shareholder_id: None,
            member_id: Some(id),
        }
    }
}

/// An immutable, append-only history record
///
/// Exactly one entry is written per main-balance mutation; entries are never
/// updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique identifier
    pub id: LedgerEntryId,
    /// Entry kind
    pub kind: EntryKind,
    /// Amount moved (always positive; the kind carries the sign)
    pub amount: Money,
    /// Human-readable description
    pub description: String,
    /// Shareholder reference, if any
    pub shareholder_id: Option<ShareholderId>,
    /// Member reference, if any
    pub member_id: Option<MemberId>,
    /// When the entry was recorded
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Creates a new history entry
    pub fn new(
        kind: EntryKind,
        amount: Money,
        description: impl Into<String>,
        refs: EntryRefs,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LedgerEntryId::new_v7(),
            kind,
            amount,
            description: description.into(),
            shareholder_id: refs.shareholder_id,
            member_id: refs.member_id,
            recorded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outflow_kinds() {
        assert!(EntryKind::Withdrawal.is_outflow());
        assert!(EntryKind::ProductCost.is_outflow());
        assert!(EntryKind::MaintenanceCost.is_outflow());
        assert!(!EntryKind::Investment.is_outflow());
        assert!(!EntryKind::InstallmentReturn.is_outflow());
    }

    #[test]
    fn test_kind_codes_are_stable() {
        assert_eq!(EntryKind::Investment.code(), "INVESTMENT");
        assert_eq!(EntryKind::InstallmentReturn.code(), "INSTALLMENT_RETURN");
        assert_eq!(EntryKind::MaintenanceCost.to_string(), "MAINTENANCE_COST");
    }
}
