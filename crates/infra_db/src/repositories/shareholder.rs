//! Shareholder repository
//!
//! Persists shareholders, their monthly earnings, and the withdrawal and
//! share-trade workflow records. The `commit_*` methods pair the dependent
//! record with the shareholder mutation in one transaction, guarded by the
//! shareholder's row version.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use core_kernel::{
    DomainPort, PortError, ShareTradeId, ShareholderId, WithdrawalRequestId, YearMonth,
};
use domain_shareholder::{
    ShareTrade, Shareholder, ShareholderEarning, ShareholderStatus, ShareholderStore,
    TradeKind, TradeQuery, TradeStatus, WithdrawalQuery, WithdrawalRequest, WithdrawalStatus,
};

use crate::error::{corrupted, query_error};
use crate::repositories::{col, to_money};

/// PostgreSQL adapter for [`ShareholderStore`]
#[derive(Debug, Clone)]
pub struct ShareholderRepository {
    pool: PgPool,
}

impl ShareholderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for ShareholderRepository {}

const SHAREHOLDER_COLUMNS: &str = "shareholder_id, name, currency, investment, total_share, \
     total_earning, current_balance, status, join_date, version, created_at, updated_at";

const EARNING_COLUMNS: &str =
    "earning_id, shareholder_id, month, currency, monthly_earning, description, calculated_on";

const WITHDRAWAL_COLUMNS: &str = "request_id, shareholder_id, currency, amount, reason, status, \
     requested_at, processed_by, processed_at, rejection_reason";

const TRADE_COLUMNS: &str = "trade_id, shareholder_id, kind, quantity, currency, \
     price_per_share, total_amount, notes, status, requested_at, processed_by, processed_at";

fn shareholder_status_code(status: ShareholderStatus) -> &'static str {
    match status {
        ShareholderStatus::Active => "ACTIVE",
        ShareholderStatus::Inactive => "INACTIVE",
    }
}

fn parse_shareholder_status(code: &str) -> Result<ShareholderStatus, PortError> {
    match code {
        "ACTIVE" => Ok(ShareholderStatus::Active),
        "INACTIVE" => Ok(ShareholderStatus::Inactive),
        other => Err(corrupted(format!("unknown shareholder status: {other}"))),
    }
}

fn withdrawal_status_code(status: WithdrawalStatus) -> &'static str {
    match status {
        WithdrawalStatus::Pending => "PENDING",
        WithdrawalStatus::Approved => "APPROVED",
        WithdrawalStatus::Rejected => "REJECTED",
        WithdrawalStatus::Processed => "PROCESSED",
        WithdrawalStatus::Cancelled => "CANCELLED",
    }
}

fn parse_withdrawal_status(code: &str) -> Result<WithdrawalStatus, PortError> {
    match code {
        "PENDING" => Ok(WithdrawalStatus::Pending),
        "APPROVED" => Ok(WithdrawalStatus::Approved),
        "REJECTED" => Ok(WithdrawalStatus::Rejected),
        "PROCESSED" => Ok(WithdrawalStatus::Processed),
        "CANCELLED" => Ok(WithdrawalStatus::Cancelled),
        other => Err(corrupted(format!("unknown withdrawal status: {other}"))),
    }
}

fn trade_kind_code(kind: TradeKind) -> &'static str {
    match kind {
        TradeKind::Buy => "BUY",
        TradeKind::Sell => "SELL",
    }
}

fn parse_trade_kind(code: &str) -> Result<TradeKind, PortError> {
    match code {
        "BUY" => Ok(TradeKind::Buy),
        "SELL" => Ok(TradeKind::Sell),
        other => Err(corrupted(format!("unknown trade kind: {other}"))),
    }
}

fn trade_status_code(status: TradeStatus) -> &'static str {
    match status {
        TradeStatus::Pending => "PENDING",
        TradeStatus::Completed => "COMPLETED",
        TradeStatus::Cancelled => "CANCELLED",
    }
}

fn parse_trade_status(code: &str) -> Result<TradeStatus, PortError> {
    match code {
        "PENDING" => Ok(TradeStatus::Pending),
        "COMPLETED" => Ok(TradeStatus::Completed),
        "CANCELLED" => Ok(TradeStatus::Cancelled),
        other => Err(corrupted(format!("unknown trade status: {other}"))),
    }
}

fn shareholder_from_row(row: &PgRow) -> Result<Shareholder, PortError> {
    let shareholder_id: Uuid = col!(row, "shareholder_id");
    let currency: String = col!(row, "currency");
    let investment: Decimal = col!(row, "investment");
    let total_share: i32 = col!(row, "total_share");
    let total_earning: Decimal = col!(row, "total_earning");
    let current_balance: Decimal = col!(row, "current_balance");
    let status: String = col!(row, "status");
    let version: i64 = col!(row, "version");

    Ok(Shareholder {
        id: shareholder_id.into(),
        name: col!(row, "name"),
        investment: to_money(investment, &currency)?,
        total_share: total_share as u32,
        total_earning: to_money(total_earning, &currency)?,
        current_balance: to_money(current_balance, &currency)?,
        status: parse_shareholder_status(&status)?,
        join_date: col!(row, "join_date"),
        version: version as u64,
        created_at: col!(row, "created_at"),
        updated_at: col!(row, "updated_at"),
    })
}

fn earning_from_row(row: &PgRow) -> Result<ShareholderEarning, PortError> {
    let earning_id: Uuid = col!(row, "earning_id");
    let shareholder_id: Uuid = col!(row, "shareholder_id");
    let month: String = col!(row, "month");
    let currency: String = col!(row, "currency");
    let monthly_earning: Decimal = col!(row, "monthly_earning");

    Ok(ShareholderEarning {
        id: earning_id.into(),
        shareholder_id: shareholder_id.into(),
        month: month
            .parse::<YearMonth>()
            .map_err(|e| corrupted(e.to_string()))?,
        monthly_earning: to_money(monthly_earning, &currency)?,
        description: col!(row, "description"),
        calculated_on: col!(row, "calculated_on"),
    })
}

fn withdrawal_from_row(row: &PgRow) -> Result<WithdrawalRequest, PortError> {
    let request_id: Uuid = col!(row, "request_id");
    let shareholder_id: Uuid = col!(row, "shareholder_id");
    let currency: String = col!(row, "currency");
    let amount: Decimal = col!(row, "amount");
    let status: String = col!(row, "status");

    Ok(WithdrawalRequest {
        id: request_id.into(),
        shareholder_id: shareholder_id.into(),
        amount: to_money(amount, &currency)?,
        reason: col!(row, "reason"),
        status: parse_withdrawal_status(&status)?,
        requested_at: col!(row, "requested_at"),
        processed_by: col!(row, "processed_by"),
        processed_at: col!(row, "processed_at"),
        rejection_reason: col!(row, "rejection_reason"),
    })
}

fn trade_from_row(row: &PgRow) -> Result<ShareTrade, PortError> {
    let trade_id: Uuid = col!(row, "trade_id");
    let shareholder_id: Uuid = col!(row, "shareholder_id");
    let kind: String = col!(row, "kind");
    let quantity: i32 = col!(row, "quantity");
    let currency: String = col!(row, "currency");
    let price_per_share: Decimal = col!(row, "price_per_share");
    let total_amount: Decimal = col!(row, "total_amount");
    let status: String = col!(row, "status");

    Ok(ShareTrade {
        id: trade_id.into(),
        shareholder_id: shareholder_id.into(),
        kind: parse_trade_kind(&kind)?,
        quantity: quantity as u32,
        price_per_share: to_money(price_per_share, &currency)?,
        total_amount: to_money(total_amount, &currency)?,
        notes: col!(row, "notes"),
        status: parse_trade_status(&status)?,
        requested_at: col!(row, "requested_at"),
        processed_by: col!(row, "processed_by"),
        processed_at: col!(row, "processed_at"),
    })
}

async fn update_shareholder_row(
    tx: &mut Transaction<'_, Postgres>,
    shareholder: &Shareholder,
    expected_version: u64,
) -> Result<(), PortError> {
    let updated = sqlx::query(
        "UPDATE shareholders SET name = $1, investment = $2, total_share = $3, \
         total_earning = $4, current_balance = $5, status = $6, version = $7, \
         updated_at = $8 WHERE shareholder_id = $9 AND version = $10",
    )
    .bind(&shareholder.name)
    .bind(shareholder.investment.amount())
    .bind(shareholder.total_share as i32)
    .bind(shareholder.total_earning.amount())
    .bind(shareholder.current_balance.amount())
    .bind(shareholder_status_code(shareholder.status))
    .bind((expected_version + 1) as i64)
    .bind(shareholder.updated_at)
    .bind(*shareholder.id.as_uuid())
    .bind(expected_version as i64)
    .execute(&mut **tx)
    .await
    .map_err(query_error)?;

    if updated.rows_affected() == 0 {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM shareholders WHERE shareholder_id = $1)",
        )
        .bind(*shareholder.id.as_uuid())
        .fetch_one(&mut **tx)
        .await
        .map_err(query_error)?;
        return Err(if exists {
            PortError::conflict(format!(
                "shareholder {} version moved past {expected_version}",
                shareholder.id
            ))
        } else {
            PortError::not_found("Shareholder", shareholder.id)
        });
    }
    Ok(())
}

async fn upsert_withdrawal(
    tx: &mut Transaction<'_, Postgres>,
    request: &WithdrawalRequest,
) -> Result<(), PortError> {
    sqlx::query(
        "INSERT INTO withdrawal_requests (request_id, shareholder_id, currency, amount, \
         reason, status, requested_at, processed_by, processed_at, rejection_reason) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (request_id) DO UPDATE SET \
         status = EXCLUDED.status, processed_by = EXCLUDED.processed_by, \
         processed_at = EXCLUDED.processed_at, rejection_reason = EXCLUDED.rejection_reason",
    )
    .bind(*request.id.as_uuid())
    .bind(*request.shareholder_id.as_uuid())
    .bind(request.amount.currency().code())
    .bind(request.amount.amount())
    .bind(&request.reason)
    .bind(withdrawal_status_code(request.status))
    .bind(request.requested_at)
    .bind(request.processed_by.as_deref())
    .bind(request.processed_at)
    .bind(request.rejection_reason.as_deref())
    .execute(&mut **tx)
    .await
    .map_err(query_error)?;
    Ok(())
}

async fn upsert_trade(
    tx: &mut Transaction<'_, Postgres>,
    trade: &ShareTrade,
) -> Result<(), PortError> {
    sqlx::query(
        "INSERT INTO share_trades (trade_id, shareholder_id, kind, quantity, currency, \
         price_per_share, total_amount, notes, status, requested_at, processed_by, processed_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         ON CONFLICT (trade_id) DO UPDATE SET \
         notes = EXCLUDED.notes, status = EXCLUDED.status, \
         processed_by = EXCLUDED.processed_by, processed_at = EXCLUDED.processed_at",
    )
    .bind(*trade.id.as_uuid())
    .bind(*trade.shareholder_id.as_uuid())
    .bind(trade_kind_code(trade.kind))
    .bind(trade.quantity as i32)
    .bind(trade.total_amount.currency().code())
    .bind(trade.price_per_share.amount())
    .bind(trade.total_amount.amount())
    .bind(&trade.notes)
    .bind(trade_status_code(trade.status))
    .bind(trade.requested_at)
    .bind(trade.processed_by.as_deref())
    .bind(trade.processed_at)
    .execute(&mut **tx)
    .await
    .map_err(query_error)?;
    Ok(())
}

#[async_trait]
impl ShareholderStore for ShareholderRepository {
    #[instrument(skip(self, shareholder), fields(shareholder_id = %shareholder.id))]
    async fn insert_shareholder(&self, shareholder: &Shareholder) -> Result<(), PortError> {
        sqlx::query(
            "INSERT INTO shareholders (shareholder_id, name, currency, investment, \
             total_share, total_earning, current_balance, status, join_date, version, \
             created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(*shareholder.id.as_uuid())
        .bind(&shareholder.name)
        .bind(shareholder.current_balance.currency().code())
        .bind(shareholder.investment.amount())
        .bind(shareholder.total_share as i32)
        .bind(shareholder.total_earning.amount())
        .bind(shareholder.current_balance.amount())
        .bind(shareholder_status_code(shareholder.status))
        .bind(shareholder.join_date)
        .bind(shareholder.version as i64)
        .bind(shareholder.created_at)
        .bind(shareholder.updated_at)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_shareholder(&self, id: ShareholderId) -> Result<Shareholder, PortError> {
        let query = format!("SELECT {SHAREHOLDER_COLUMNS} FROM shareholders WHERE shareholder_id = $1");
        let row = sqlx::query(&query)
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?
            .ok_or_else(|| PortError::not_found("Shareholder", id))?;
        shareholder_from_row(&row)
    }

    #[instrument(skip(self, shareholder), fields(shareholder_id = %shareholder.id))]
    async fn update_shareholder(
        &self,
        shareholder: &Shareholder,
        expected_version: u64,
    ) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;
        update_shareholder_row(&mut tx, shareholder, expected_version).await?;
        tx.commit().await.map_err(query_error)
    }

    #[instrument(skip(self))]
    async fn list_by_status(
        &self,
        status: ShareholderStatus,
    ) -> Result<Vec<Shareholder>, PortError> {
        let query = format!(
            "SELECT {SHAREHOLDER_COLUMNS} FROM shareholders WHERE status = $1 \
             ORDER BY join_date, shareholder_id"
        );
        let rows = sqlx::query(&query)
            .bind(shareholder_status_code(status))
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        rows.iter().map(shareholder_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn total_shares(&self) -> Result<u64, PortError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(total_share), 0)::BIGINT FROM shareholders")
                .fetch_one(&self.pool)
                .await
                .map_err(query_error)?;
        Ok(total as u64)
    }

    #[instrument(skip(self))]
    async fn find_earning(
        &self,
        shareholder_id: ShareholderId,
        month: YearMonth,
    ) -> Result<Option<ShareholderEarning>, PortError> {
        let query = format!(
            "SELECT {EARNING_COLUMNS} FROM shareholder_earnings \
             WHERE shareholder_id = $1 AND month = $2"
        );
        let row = sqlx::query(&query)
            .bind(*shareholder_id.as_uuid())
            .bind(month.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.as_ref().map(earning_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn earnings_for_shareholder(
        &self,
        shareholder_id: ShareholderId,
    ) -> Result<Vec<ShareholderEarning>, PortError> {
        let query = format!(
            "SELECT {EARNING_COLUMNS} FROM shareholder_earnings \
             WHERE shareholder_id = $1 ORDER BY month DESC"
        );
        let rows = sqlx::query(&query)
            .bind(*shareholder_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        rows.iter().map(earning_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn earnings_for_month(
        &self,
        month: YearMonth,
    ) -> Result<Vec<ShareholderEarning>, PortError> {
        let query = format!(
            "SELECT {EARNING_COLUMNS} FROM shareholder_earnings \
             WHERE month = $1 ORDER BY shareholder_id"
        );
        let rows = sqlx::query(&query)
            .bind(month.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        rows.iter().map(earning_from_row).collect()
    }

    #[instrument(skip(self, earning, shareholder), fields(shareholder_id = %shareholder.id))]
    async fn commit_earning(
        &self,
        earning: &ShareholderEarning,
        shareholder: &Shareholder,
        expected_version: u64,
    ) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        update_shareholder_row(&mut tx, shareholder, expected_version).await?;
        sqlx::query(
            "INSERT INTO shareholder_earnings (earning_id, shareholder_id, month, currency, \
             monthly_earning, description, calculated_on) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (earning_id) DO UPDATE SET \
             monthly_earning = EXCLUDED.monthly_earning, \
             description = EXCLUDED.description, calculated_on = EXCLUDED.calculated_on",
        )
        .bind(*earning.id.as_uuid())
        .bind(*earning.shareholder_id.as_uuid())
        .bind(earning.month.to_string())
        .bind(earning.monthly_earning.currency().code())
        .bind(earning.monthly_earning.amount())
        .bind(&earning.description)
        .bind(earning.calculated_on)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)
    }

    #[instrument(skip(self, request), fields(request_id = %request.id))]
    async fn insert_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;
        upsert_withdrawal(&mut tx, request).await?;
        tx.commit().await.map_err(query_error)
    }

    #[instrument(skip(self))]
    async fn get_withdrawal(
        &self,
        id: WithdrawalRequestId,
    ) -> Result<WithdrawalRequest, PortError> {
        let query = format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE request_id = $1");
        let row = sqlx::query(&query)
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?
            .ok_or_else(|| PortError::not_found("WithdrawalRequest", id))?;
        withdrawal_from_row(&row)
    }

    #[instrument(skip(self, request), fields(request_id = %request.id))]
    async fn save_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;
        upsert_withdrawal(&mut tx, request).await?;
        tx.commit().await.map_err(query_error)
    }

    #[instrument(skip(self))]
    async fn list_withdrawals(
        &self,
        query: WithdrawalQuery,
    ) -> Result<Vec<WithdrawalRequest>, PortError> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE 1 = 1"
        ));
        if let Some(shareholder_id) = query.shareholder_id {
            builder
                .push(" AND shareholder_id = ")
                .push_bind(*shareholder_id.as_uuid());
        }
        if let Some(status) = query.status {
            builder
                .push(" AND status = ")
                .push_bind(withdrawal_status_code(status));
        }
        builder.push(" ORDER BY requested_at DESC, request_id DESC");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        rows.iter().map(withdrawal_from_row).collect()
    }

    #[instrument(skip(self, request, shareholder), fields(request_id = %request.id))]
    async fn commit_withdrawal_approval(
        &self,
        request: &WithdrawalRequest,
        shareholder: &Shareholder,
        expected_version: u64,
    ) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;
        update_shareholder_row(&mut tx, shareholder, expected_version).await?;
        upsert_withdrawal(&mut tx, request).await?;
        tx.commit().await.map_err(query_error)
    }

    #[instrument(skip(self, trade), fields(trade_id = %trade.id))]
    async fn insert_trade(&self, trade: &ShareTrade) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;
        upsert_trade(&mut tx, trade).await?;
        tx.commit().await.map_err(query_error)
    }

    #[instrument(skip(self))]
    async fn get_trade(&self, id: ShareTradeId) -> Result<ShareTrade, PortError> {
        let query = format!("SELECT {TRADE_COLUMNS} FROM share_trades WHERE trade_id = $1");
        let row = sqlx::query(&query)
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?
            .ok_or_else(|| PortError::not_found("ShareTrade", id))?;
        trade_from_row(&row)
    }

    #[instrument(skip(self, trade), fields(trade_id = %trade.id))]
    async fn save_trade(&self, trade: &ShareTrade) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;
        upsert_trade(&mut tx, trade).await?;
        tx.commit().await.map_err(query_error)
    }

    #[instrument(skip(self))]
    async fn list_trades(&self, query: TradeQuery) -> Result<Vec<ShareTrade>, PortError> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {TRADE_COLUMNS} FROM share_trades WHERE 1 = 1"
        ));
        if let Some(shareholder_id) = query.shareholder_id {
            builder
                .push(" AND shareholder_id = ")
                .push_bind(*shareholder_id.as_uuid());
        }
        if let Some(status) = query.status {
            builder
                .push(" AND status = ")
                .push_bind(trade_status_code(status));
        }
        builder.push(" ORDER BY requested_at DESC, trade_id DESC");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        rows.iter().map(trade_from_row).collect()
    }

    #[instrument(skip(self, trade, shareholder), fields(trade_id = %trade.id))]
    async fn commit_trade_completion(
        &self,
        trade: &ShareTrade,
        shareholder: &Shareholder,
        expected_version: u64,
    ) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;
        update_shareholder_row(&mut tx, shareholder, expected_version).await?;
        upsert_trade(&mut tx, trade).await?;
        tx.commit().await.map_err(query_error)
    }
}
