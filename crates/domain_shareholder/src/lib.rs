//! Shareholder Domain - ownership, profit distribution, and gated payouts
//!
//! Shareholders hold shares and a spendable balance. Each month a pool of
//! business profit is distributed across active shareholders proportional to
//! share count ([`EarningsDistributor`]); the calculation is idempotent per
//! (shareholder, month) and forced recalculation applies the signed delta
//! rather than re-deriving from scratch.
//!
//! Balance and share mutations are gated by request/approve workflows
//! ([`WithdrawalWorkflow`], [`ShareTradeWorkflow`]) that re-validate against
//! the live shareholder state at transition time, not only at request time.

pub mod distributor;
pub mod earning;
pub mod error;
pub mod memory;
pub mod ports;
pub mod share_trade;
pub mod shareholder;
pub mod withdrawal;

pub use distributor::{DistributionFailure, DistributionOutcome, EarningsDistributor};
pub use earning::{EarningSummary, MonthlyEarningPoint, ShareholderEarning};
pub use error::ShareholderError;
pub use memory::InMemoryShareholderStore;
pub use ports::{ShareholderStore, TradeQuery, WithdrawalQuery};
pub use share_trade::{ShareTrade, ShareTradeWorkflow, TradeKind, TradeStats, TradeStatus};
pub use shareholder::{Shareholder, ShareholderStatus};
pub use withdrawal::{
    WithdrawalRequest, WithdrawalStats, WithdrawalStatus, WithdrawalWorkflow,
};
