//! Share buy/sell workflow
//!
//! Trades start PENDING; share counts and money move only at completion,
//! with sell-side share availability re-checked at completion time since
//! holdings may have changed since the request.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use core_kernel::{Clock, Money, ShareTradeId, ShareholderId};

use crate::error::ShareholderError;
use crate::ports::{ShareholderStore, TradeQuery};

/// Bounded optimistic-concurrency retries before surfacing the conflict
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Direction of a share trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeKind {
    Buy,
    Sell,
}

/// Lifecycle of a share trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    /// Awaiting completion
    Pending,
    /// Shares and money moved
    Completed,
    /// Withdrawn before completion
    Cancelled,
}

/// A request to buy or sell shares
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareTrade {
    /// Unique identifier
    pub id: ShareTradeId,
    /// Trading shareholder
    pub shareholder_id: ShareholderId,
    /// Buy or sell
    pub kind: TradeKind,
    /// Number of shares
    pub quantity: u32,
    /// Price per share
    pub price_per_share: Money,
    /// Derived: quantity × price
    pub total_amount: Money,
    /// Free-form notes; cancellation appends its reason here
    pub notes: String,
    /// Current workflow status
    pub status: TradeStatus,
    /// When the trade was requested
    pub requested_at: DateTime<Utc>,
    /// Admin who completed the trade
    pub processed_by: Option<String>,
    /// When the last transition happened
    pub processed_at: Option<DateTime<Utc>>,
}

/// Counts and amounts across a set of trades
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeStats {
    pub total_trades: u32,
    pub pending_count: u32,
    pub completed_count: u32,
    pub cancelled_count: u32,
    /// Shares bought via completed trades
    pub shares_bought: u32,
    /// Shares sold via completed trades
    pub shares_sold: u32,
    /// Money spent on completed purchases
    pub amount_invested: Money,
    /// Money received from completed sales
    pub amount_received: Money,
}

/// Service gating share count mutations
pub struct ShareTradeWorkflow {
    store: Arc<dyn ShareholderStore>,
    clock: Arc<dyn Clock>,
}

impl ShareTradeWorkflow {
    /// Creates a new workflow service
    pub fn new(store: Arc<dyn ShareholderStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Files a buy request
    pub async fn request_buy(
        &self,
        shareholder_id: ShareholderId,
        quantity: u32,
        price_per_share: Money,
        notes: Option<String>,
    ) -> Result<ShareTrade, ShareholderError> {
        self.request(
            shareholder_id,
            TradeKind::Buy,
            quantity,
            price_per_share,
            notes.unwrap_or_else(|| "Share purchase request".to_string()),
        )
        .await
    }

    /// Files a sell request; holdings must cover the quantity now
    pub async fn request_sell(
        &self,
        shareholder_id: ShareholderId,
        quantity: u32,
        price_per_share: Money,
        notes: Option<String>,
    ) -> Result<ShareTrade, ShareholderError> {
        let shareholder = self.store.get_shareholder(shareholder_id).await?;
        if quantity > shareholder.total_share {
            return Err(ShareholderError::InsufficientShares {
                available: shareholder.total_share,
                requested: quantity,
            });
        }
        self.request(
            shareholder_id,
            TradeKind::Sell,
            quantity,
            price_per_share,
            notes.unwrap_or_else(|| "Share sale request".to_string()),
        )
        .await
    }

    /// Completes a pending trade, applying its share and money effects
    ///
    /// Sell-side share availability is checked again here; the holding may
    /// have shrunk since the request was filed.
    pub async fn complete(
        &self,
        trade_id: ShareTradeId,
        processed_by: &str,
    ) -> Result<ShareTrade, ShareholderError> {
        if processed_by.trim().is_empty() {
            return Err(ShareholderError::InvalidArgument(
                "processed-by information is required".to_string(),
            ));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut trade = self.store.get_trade(trade_id).await?;
            require_status(&trade, TradeStatus::Pending, "complete")?;

            let mut shareholder = self.store.get_shareholder(trade.shareholder_id).await?;
            let expected_version = shareholder.version;
            if !shareholder.is_active() {
                return Err(ShareholderError::InactiveShareholder(shareholder.id));
            }

            let now = self.clock.now();
            match trade.kind {
                TradeKind::Buy => {
                    shareholder.apply_share_purchase(trade.quantity, trade.total_amount, now)?;
                }
                TradeKind::Sell => {
                    shareholder.apply_share_sale(trade.quantity, trade.total_amount, now)?;
                }
            }

            trade.status = TradeStatus::Completed;
            trade.processed_by = Some(processed_by.to_string());
            trade.processed_at = Some(now);

            match self
                .store
                .commit_trade_completion(&trade, &shareholder, expected_version)
                .await
            {
                Ok(()) => {
                    info!(
                        trade = %trade_id,
                        kind = ?trade.kind,
                        quantity = trade.quantity,
                        "share trade completed"
                    );
                    return Ok(trade);
                }
                Err(err) if err.is_retryable() && attempt < MAX_COMMIT_ATTEMPTS => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Cancels a pending trade
    pub async fn cancel(
        &self,
        trade_id: ShareTradeId,
        reason: Option<String>,
    ) -> Result<ShareTrade, ShareholderError> {
        let mut trade = self.store.get_trade(trade_id).await?;
        require_status(&trade, TradeStatus::Pending, "cancel")?;

        trade.status = TradeStatus::Cancelled;
        trade.processed_at = Some(self.clock.now());
        let note = match reason.filter(|r| !r.trim().is_empty()) {
            Some(reason) => format!("Cancelled: {reason}"),
            None => "Cancelled".to_string(),
        };
        if trade.notes.is_empty() {
            trade.notes = note;
        } else {
            trade.notes = format!("{} | {}", trade.notes, note);
        }
        self.store.save_trade(&trade).await?;

        info!(trade = %trade_id, "share trade cancelled");
        Ok(trade)
    }

    /// Lists trades matching the query, newest first
    pub async fn trades(&self, query: TradeQuery) -> Result<Vec<ShareTrade>, ShareholderError> {
        self.store.list_trades(query).await.map_err(Into::into)
    }

    /// Counts and amounts, optionally restricted to one shareholder
    pub async fn statistics(
        &self,
        shareholder_id: Option<ShareholderId>,
    ) -> Result<TradeStats, ShareholderError> {
        let query = match shareholder_id {
            Some(id) => TradeQuery::by_shareholder(id),
            None => TradeQuery::default(),
        };
        let trades = self.store.list_trades(query).await?;

        let currency = trades
            .first()
            .map(|t| t.total_amount.currency())
            .unwrap_or(core_kernel::Currency::BDT);
        let mut stats = TradeStats {
            total_trades: trades.len() as u32,
            pending_count: 0,
            completed_count: 0,
            cancelled_count: 0,
            shares_bought: 0,
            shares_sold: 0,
            amount_invested: Money::zero(currency),
            amount_received: Money::zero(currency),
        };

        for trade in &trades {
            match trade.status {
                TradeStatus::Pending => stats.pending_count += 1,
                TradeStatus::Cancelled => stats.cancelled_count += 1,
                TradeStatus::Completed => {
                    stats.completed_count += 1;
                    match trade.kind {
                        TradeKind::Buy => {
                            stats.shares_bought += trade.quantity;
                            stats.amount_invested =
                                stats.amount_invested.checked_add(&trade.total_amount)?;
                        }
                        TradeKind::Sell => {
                            stats.shares_sold += trade.quantity;
                            stats.amount_received =
                                stats.amount_received.checked_add(&trade.total_amount)?;
                        }
                    }
                }
            }
        }
        Ok(stats)
    }

    async fn request(
        &self,
        shareholder_id: ShareholderId,
        kind: TradeKind,
        quantity: u32,
        price_per_share: Money,
        notes: String,
    ) -> Result<ShareTrade, ShareholderError> {
        if quantity == 0 {
            return Err(ShareholderError::InvalidArgument(
                "trade quantity must be positive".to_string(),
            ));
        }
        if !price_per_share.is_positive() {
            return Err(ShareholderError::InvalidArgument(format!(
                "price per share must be positive, got {price_per_share}"
            )));
        }

        let shareholder = self.store.get_shareholder(shareholder_id).await?;
        if !shareholder.is_active() {
            return Err(ShareholderError::InactiveShareholder(shareholder_id));
        }

        let trade = ShareTrade {
            id: ShareTradeId::new_v7(),
            shareholder_id,
            kind,
            quantity,
            price_per_share,
            total_amount: price_per_share.multiply(Decimal::from(quantity)),
            notes,
            status: TradeStatus::Pending,
            requested_at: self.clock.now(),
            processed_by: None,
            processed_at: None,
        };
        self.store.insert_trade(&trade).await?;

        info!(trade = %trade.id, ?kind, quantity, "share trade requested");
        Ok(trade)
    }
}

fn require_status(
    trade: &ShareTrade,
    expected: TradeStatus,
    operation: &str,
) -> Result<(), ShareholderError> {
    if trade.status != expected {
        return Err(ShareholderError::InvalidTransition(format!(
            "cannot {operation} trade {} in status {:?}",
            trade.id, trade.status
        )));
    }
    Ok(())
}
