//! Treasury repository
//!
//! Persists the single main-balance row and its append-only entry log. The
//! balance update and the history insert always commit in one transaction.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, QueryBuilder, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{Currency, DomainPort, PortError};
use domain_treasury::{EntryFilter, EntryKind, LedgerEntry, MainBalance, TreasuryStore};

use crate::error::{corrupted, query_error};
use crate::repositories::{col, to_money};

/// PostgreSQL adapter for [`TreasuryStore`]
#[derive(Debug, Clone)]
pub struct TreasuryRepository {
    pool: PgPool,
    currency: Currency,
}

impl TreasuryRepository {
    /// Creates a repository bound to the deployment currency
    pub fn new(pool: PgPool, currency: Currency) -> Self {
        Self { pool, currency }
    }
}

impl DomainPort for TreasuryRepository {}

const BALANCE_COLUMNS: &str = "version, currency, total_balance, total_investment, \
     total_withdrawal, total_product_cost, total_maintenance_cost, \
     total_installment_return, updated_at";

fn balance_from_row(row: &PgRow) -> Result<MainBalance, PortError> {
    let version: i64 = col!(row, "version");
    let currency: String = col!(row, "currency");
    let total_balance: Decimal = col!(row, "total_balance");
    let total_investment: Decimal = col!(row, "total_investment");
    let total_withdrawal: Decimal = col!(row, "total_withdrawal");
    let total_product_cost: Decimal = col!(row, "total_product_cost");
    let total_maintenance_cost: Decimal = col!(row, "total_maintenance_cost");
    let total_installment_return: Decimal = col!(row, "total_installment_return");

    Ok(MainBalance {
        version: version as u64,
        total_balance: to_money(total_balance, &currency)?,
        total_investment: to_money(total_investment, &currency)?,
        total_withdrawal: to_money(total_withdrawal, &currency)?,
        total_product_cost: to_money(total_product_cost, &currency)?,
        total_maintenance_cost: to_money(total_maintenance_cost, &currency)?,
        total_installment_return: to_money(total_installment_return, &currency)?,
        updated_at: col!(row, "updated_at"),
    })
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry, PortError> {
    let kind: String = col!(row, "kind");
    let currency: String = col!(row, "currency");
    let amount: Decimal = col!(row, "amount");
    let entry_id: Uuid = col!(row, "entry_id");
    let shareholder_id: Option<Uuid> = col!(row, "shareholder_id");
    let member_id: Option<Uuid> = col!(row, "member_id");

    Ok(LedgerEntry {
        id: entry_id.into(),
        kind: parse_kind(&kind)?,
        amount: to_money(amount, &currency)?,
        description: col!(row, "description"),
        shareholder_id: shareholder_id.map(Into::into),
        member_id: member_id.map(Into::into),
        recorded_at: col!(row, "recorded_at"),
    })
}

fn parse_kind(code: &str) -> Result<EntryKind, PortError> {
    match code {
        "INVESTMENT" => Ok(EntryKind::Investment),
        "WITHDRAWAL" => Ok(EntryKind::Withdrawal),
        "PRODUCT_COST" => Ok(EntryKind::ProductCost),
        "MAINTENANCE_COST" => Ok(EntryKind::MaintenanceCost),
        "INSTALLMENT_RETURN" => Ok(EntryKind::InstallmentReturn),
        other => Err(corrupted(format!("unknown entry kind: {other}"))),
    }
}

#[async_trait]
impl TreasuryStore for TreasuryRepository {
    #[instrument(skip(self))]
    async fn load_balance(&self) -> Result<MainBalance, PortError> {
        let select = format!("SELECT {BALANCE_COLUMNS} FROM main_balance WHERE id = 1");
        if let Some(row) = sqlx::query(&select)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?
        {
            return balance_from_row(&row);
        }

        // First use: seed the zero row, tolerating a concurrent seeder
        debug!("seeding zeroed main balance row");
        let zero = MainBalance::new(self.currency, Utc::now());
        sqlx::query(
            "INSERT INTO main_balance (id, version, currency, total_balance, \
             total_investment, total_withdrawal, total_product_cost, \
             total_maintenance_cost, total_installment_return, updated_at) \
             VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(zero.version as i64)
        .bind(self.currency.code())
        .bind(zero.total_balance.amount())
        .bind(zero.total_investment.amount())
        .bind(zero.total_withdrawal.amount())
        .bind(zero.total_product_cost.amount())
        .bind(zero.total_maintenance_cost.amount())
        .bind(zero.total_installment_return.amount())
        .bind(zero.updated_at)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        let row = sqlx::query(&select)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;
        balance_from_row(&row)
    }

    #[instrument(skip(self, balance, entry), fields(kind = %entry.kind))]
    async fn commit_entry(
        &self,
        balance: &MainBalance,
        entry: &LedgerEntry,
        expected_version: u64,
    ) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        let updated = sqlx::query(
            "UPDATE main_balance SET version = $1, total_balance = $2, \
             total_investment = $3, total_withdrawal = $4, total_product_cost = $5, \
             total_maintenance_cost = $6, total_installment_return = $7, \
             updated_at = $8 WHERE id = 1 AND version = $9",
        )
        .bind((expected_version + 1) as i64)
        .bind(balance.total_balance.amount())
        .bind(balance.total_investment.amount())
        .bind(balance.total_withdrawal.amount())
        .bind(balance.total_product_cost.amount())
        .bind(balance.total_maintenance_cost.amount())
        .bind(balance.total_installment_return.amount())
        .bind(balance.updated_at)
        .bind(expected_version as i64)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        if updated.rows_affected() == 0 {
            return Err(PortError::conflict(format!(
                "main balance version moved past {expected_version}"
            )));
        }

        sqlx::query(
            "INSERT INTO ledger_entries (entry_id, kind, currency, amount, \
             description, shareholder_id, member_id, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(*entry.id.as_uuid())
        .bind(entry.kind.code())
        .bind(entry.amount.currency().code())
        .bind(entry.amount.amount())
        .bind(&entry.description)
        .bind(entry.shareholder_id.map(|id| *id.as_uuid()))
        .bind(entry.member_id.map(|id| *id.as_uuid()))
        .bind(entry.recorded_at)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)
    }

    #[instrument(skip(self))]
    async fn list_entries(&self, filter: EntryFilter) -> Result<Vec<LedgerEntry>, PortError> {
        let mut query = QueryBuilder::new(
            "SELECT entry_id, kind, currency, amount, description, \
             shareholder_id, member_id, recorded_at FROM ledger_entries WHERE 1 = 1",
        );
        if let Some(kind) = filter.kind {
            query.push(" AND kind = ").push_bind(kind.code());
        }
        if let Some(shareholder_id) = filter.shareholder_id {
            query
                .push(" AND shareholder_id = ")
                .push_bind(*shareholder_id.as_uuid());
        }
        query.push(" ORDER BY recorded_at DESC, entry_id DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        rows.iter().map(entry_from_row).collect()
    }
}
