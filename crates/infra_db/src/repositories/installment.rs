//! Installment repository
//!
//! Persists installments, their payment schedules, and the transaction audit
//! trail. `commit_allocation` writes the whole outcome of one payment event
//! in a single transaction guarded by the installment's row version.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{
    DomainPort, InstallmentId, PaymentTransactionId, PortError, Rate, ScheduleId,
};
use domain_installment::{
    Installment, InstallmentStatus, InstallmentStore, InstallmentTerms, PaymentSchedule,
    PaymentTransaction, PaymentType, ScheduleStatus,
};

use crate::error::{corrupted, query_error};
use crate::repositories::{col, to_money};

/// PostgreSQL adapter for [`InstallmentStore`]
#[derive(Debug, Clone)]
pub struct InstallmentRepository {
    pool: PgPool,
}

impl InstallmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for InstallmentRepository {}

const INSTALLMENT_COLUMNS: &str = "installment_id, product_id, member_id, agent_id, currency, \
     total_amount, other_cost, advance_paid, months, interest_rate, total_with_interest, \
     payable_amount, monthly_amount, total_remaining, status, version, created_at, updated_at";

const SCHEDULE_COLUMNS: &str = "schedule_id, installment_id, due_date, currency, monthly_amount, \
     paid_amount, remaining_amount, status, collecting_agent, payment_date, notes, \
     created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "transaction_id, schedule_id, currency, amount, agent_id, \
     payment_date, payment_type, notes, created_at, updated_at";

fn installment_status_code(status: InstallmentStatus) -> &'static str {
    match status {
        InstallmentStatus::Active => "ACTIVE",
        InstallmentStatus::Completed => "COMPLETED",
        InstallmentStatus::Overdue => "OVERDUE",
        InstallmentStatus::Cancelled => "CANCELLED",
    }
}

fn parse_installment_status(code: &str) -> Result<InstallmentStatus, PortError> {
    match code {
        "ACTIVE" => Ok(InstallmentStatus::Active),
        "COMPLETED" => Ok(InstallmentStatus::Completed),
        "OVERDUE" => Ok(InstallmentStatus::Overdue),
        "CANCELLED" => Ok(InstallmentStatus::Cancelled),
        other => Err(corrupted(format!("unknown installment status: {other}"))),
    }
}

fn schedule_status_code(status: ScheduleStatus) -> &'static str {
    match status {
        ScheduleStatus::Pending => "PENDING",
        ScheduleStatus::PartiallyPaid => "PARTIALLY_PAID",
        ScheduleStatus::Paid => "PAID",
        ScheduleStatus::Overdue => "OVERDUE",
        ScheduleStatus::Cancelled => "CANCELLED",
        ScheduleStatus::Adjusted => "ADJUSTED",
    }
}

fn parse_schedule_status(code: &str) -> Result<ScheduleStatus, PortError> {
    match code {
        "PENDING" => Ok(ScheduleStatus::Pending),
        "PARTIALLY_PAID" => Ok(ScheduleStatus::PartiallyPaid),
        "PAID" => Ok(ScheduleStatus::Paid),
        "OVERDUE" => Ok(ScheduleStatus::Overdue),
        "CANCELLED" => Ok(ScheduleStatus::Cancelled),
        "ADJUSTED" => Ok(ScheduleStatus::Adjusted),
        other => Err(corrupted(format!("unknown schedule status: {other}"))),
    }
}

fn payment_type_code(payment_type: PaymentType) -> &'static str {
    match payment_type {
        PaymentType::Payment => "PAYMENT",
        PaymentType::PartialPayment => "PARTIAL_PAYMENT",
        PaymentType::AdvancePayment => "ADVANCE_PAYMENT",
        PaymentType::Refund => "REFUND",
        PaymentType::Adjustment => "ADJUSTMENT",
        PaymentType::Penalty => "PENALTY",
        PaymentType::Discount => "DISCOUNT",
    }
}

fn parse_payment_type(code: &str) -> Result<PaymentType, PortError> {
    match code {
        "PAYMENT" => Ok(PaymentType::Payment),
        "PARTIAL_PAYMENT" => Ok(PaymentType::PartialPayment),
        "ADVANCE_PAYMENT" => Ok(PaymentType::AdvancePayment),
        "REFUND" => Ok(PaymentType::Refund),
        "ADJUSTMENT" => Ok(PaymentType::Adjustment),
        "PENALTY" => Ok(PaymentType::Penalty),
        "DISCOUNT" => Ok(PaymentType::Discount),
        other => Err(corrupted(format!("unknown payment type: {other}"))),
    }
}

fn installment_from_row(row: &PgRow) -> Result<Installment, PortError> {
    let installment_id: Uuid = col!(row, "installment_id");
    let product_id: Uuid = col!(row, "product_id");
    let member_id: Uuid = col!(row, "member_id");
    let agent_id: Uuid = col!(row, "agent_id");
    let currency: String = col!(row, "currency");
    let total_amount: Decimal = col!(row, "total_amount");
    let other_cost: Decimal = col!(row, "other_cost");
    let advance_paid: Decimal = col!(row, "advance_paid");
    let months: i32 = col!(row, "months");
    let interest_rate: Decimal = col!(row, "interest_rate");
    let total_with_interest: Decimal = col!(row, "total_with_interest");
    let payable_amount: Decimal = col!(row, "payable_amount");
    let monthly_amount: Decimal = col!(row, "monthly_amount");
    let total_remaining: Decimal = col!(row, "total_remaining");
    let status: String = col!(row, "status");
    let version: i64 = col!(row, "version");

    Ok(Installment {
        id: installment_id.into(),
        product_id: product_id.into(),
        member_id: member_id.into(),
        agent_id: agent_id.into(),
        terms: InstallmentTerms {
            total_amount: to_money(total_amount, &currency)?,
            other_cost: to_money(other_cost, &currency)?,
            advance_paid: to_money(advance_paid, &currency)?,
            months: months as u32,
            interest_rate: Rate::from_percentage(interest_rate),
        },
        total_with_interest: to_money(total_with_interest, &currency)?,
        payable_amount: to_money(payable_amount, &currency)?,
        monthly_amount: to_money(monthly_amount, &currency)?,
        total_remaining: to_money(total_remaining, &currency)?,
        status: parse_installment_status(&status)?,
        version: version as u64,
        created_at: col!(row, "created_at"),
        updated_at: col!(row, "updated_at"),
    })
}

fn schedule_from_row(row: &PgRow) -> Result<PaymentSchedule, PortError> {
    let schedule_id: Uuid = col!(row, "schedule_id");
    let installment_id: Uuid = col!(row, "installment_id");
    let currency: String = col!(row, "currency");
    let monthly_amount: Decimal = col!(row, "monthly_amount");
    let paid_amount: Decimal = col!(row, "paid_amount");
    let remaining_amount: Decimal = col!(row, "remaining_amount");
    let status: String = col!(row, "status");
    let collecting_agent: Uuid = col!(row, "collecting_agent");

    Ok(PaymentSchedule {
        id: schedule_id.into(),
        installment_id: installment_id.into(),
        due_date: col!(row, "due_date"),
        monthly_amount: to_money(monthly_amount, &currency)?,
        paid_amount: to_money(paid_amount, &currency)?,
        remaining_amount: to_money(remaining_amount, &currency)?,
        status: parse_schedule_status(&status)?,
        collecting_agent: collecting_agent.into(),
        payment_date: col!(row, "payment_date"),
        notes: col!(row, "notes"),
        created_at: col!(row, "created_at"),
        updated_at: col!(row, "updated_at"),
    })
}

fn transaction_from_row(row: &PgRow) -> Result<PaymentTransaction, PortError> {
    let transaction_id: Uuid = col!(row, "transaction_id");
    let schedule_id: Uuid = col!(row, "schedule_id");
    let currency: String = col!(row, "currency");
    let amount: Decimal = col!(row, "amount");
    let agent_id: Uuid = col!(row, "agent_id");
    let payment_type: String = col!(row, "payment_type");

    Ok(PaymentTransaction {
        id: transaction_id.into(),
        schedule_id: schedule_id.into(),
        amount: to_money(amount, &currency)?,
        agent_id: agent_id.into(),
        payment_date: col!(row, "payment_date"),
        payment_type: parse_payment_type(&payment_type)?,
        notes: col!(row, "notes"),
        created_at: col!(row, "created_at"),
        updated_at: col!(row, "updated_at"),
    })
}

async fn upsert_schedule(
    tx: &mut Transaction<'_, Postgres>,
    schedule: &PaymentSchedule,
) -> Result<(), PortError> {
    sqlx::query(
        "INSERT INTO payment_schedules (schedule_id, installment_id, due_date, currency, \
         monthly_amount, paid_amount, remaining_amount, status, collecting_agent, \
         payment_date, notes, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         ON CONFLICT (schedule_id) DO UPDATE SET \
         monthly_amount = EXCLUDED.monthly_amount, paid_amount = EXCLUDED.paid_amount, \
         remaining_amount = EXCLUDED.remaining_amount, status = EXCLUDED.status, \
         collecting_agent = EXCLUDED.collecting_agent, payment_date = EXCLUDED.payment_date, \
         notes = EXCLUDED.notes, updated_at = EXCLUDED.updated_at",
    )
    .bind(*schedule.id.as_uuid())
    .bind(*schedule.installment_id.as_uuid())
    .bind(schedule.due_date)
    .bind(schedule.monthly_amount.currency().code())
    .bind(schedule.monthly_amount.amount())
    .bind(schedule.paid_amount.amount())
    .bind(schedule.remaining_amount.amount())
    .bind(schedule_status_code(schedule.status))
    .bind(*schedule.collecting_agent.as_uuid())
    .bind(schedule.payment_date)
    .bind(schedule.notes.as_deref())
    .bind(schedule.created_at)
    .bind(schedule.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(query_error)?;
    Ok(())
}

async fn upsert_transaction(
    tx: &mut Transaction<'_, Postgres>,
    transaction: &PaymentTransaction,
) -> Result<(), PortError> {
    sqlx::query(
        "INSERT INTO payment_transactions (transaction_id, schedule_id, currency, amount, \
         agent_id, payment_date, payment_type, notes, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (transaction_id) DO UPDATE SET \
         amount = EXCLUDED.amount, agent_id = EXCLUDED.agent_id, \
         notes = EXCLUDED.notes, updated_at = EXCLUDED.updated_at",
    )
    .bind(*transaction.id.as_uuid())
    .bind(*transaction.schedule_id.as_uuid())
    .bind(transaction.amount.currency().code())
    .bind(transaction.amount.amount())
    .bind(*transaction.agent_id.as_uuid())
    .bind(transaction.payment_date)
    .bind(payment_type_code(transaction.payment_type))
    .bind(transaction.notes.as_deref())
    .bind(transaction.created_at)
    .bind(transaction.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(query_error)?;
    Ok(())
}

async fn update_installment_row(
    tx: &mut Transaction<'_, Postgres>,
    installment: &Installment,
    expected_version: u64,
) -> Result<(), PortError> {
    let updated = sqlx::query(
        "UPDATE installments SET total_amount = $1, other_cost = $2, advance_paid = $3, \
         months = $4, interest_rate = $5, total_with_interest = $6, payable_amount = $7, \
         monthly_amount = $8, total_remaining = $9, status = $10, version = $11, \
         updated_at = $12 WHERE installment_id = $13 AND version = $14",
    )
    .bind(installment.terms.total_amount.amount())
    .bind(installment.terms.other_cost.amount())
    .bind(installment.terms.advance_paid.amount())
    .bind(installment.terms.months as i32)
    .bind(installment.terms.interest_rate.as_percentage())
    .bind(installment.total_with_interest.amount())
    .bind(installment.payable_amount.amount())
    .bind(installment.monthly_amount.amount())
    .bind(installment.total_remaining.amount())
    .bind(installment_status_code(installment.status))
    .bind((expected_version + 1) as i64)
    .bind(installment.updated_at)
    .bind(*installment.id.as_uuid())
    .bind(expected_version as i64)
    .execute(&mut **tx)
    .await
    .map_err(query_error)?;

    if updated.rows_affected() == 0 {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM installments WHERE installment_id = $1)")
                .bind(*installment.id.as_uuid())
                .fetch_one(&mut **tx)
                .await
                .map_err(query_error)?;
        return Err(if exists {
            PortError::conflict(format!(
                "installment {} version moved past {expected_version}",
                installment.id
            ))
        } else {
            PortError::not_found("Installment", installment.id)
        });
    }
    Ok(())
}

#[async_trait]
impl InstallmentStore for InstallmentRepository {
    #[instrument(skip(self, installment, schedules), fields(installment_id = %installment.id))]
    async fn create_installment(
        &self,
        installment: &Installment,
        schedules: &[PaymentSchedule],
    ) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        sqlx::query(
            "INSERT INTO installments (installment_id, product_id, member_id, agent_id, \
             currency, total_amount, other_cost, advance_paid, months, interest_rate, \
             total_with_interest, payable_amount, monthly_amount, total_remaining, status, \
             version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
        )
        .bind(*installment.id.as_uuid())
        .bind(*installment.product_id.as_uuid())
        .bind(*installment.member_id.as_uuid())
        .bind(*installment.agent_id.as_uuid())
        .bind(installment.payable_amount.currency().code())
        .bind(installment.terms.total_amount.amount())
        .bind(installment.terms.other_cost.amount())
        .bind(installment.terms.advance_paid.amount())
        .bind(installment.terms.months as i32)
        .bind(installment.terms.interest_rate.as_percentage())
        .bind(installment.total_with_interest.amount())
        .bind(installment.payable_amount.amount())
        .bind(installment.monthly_amount.amount())
        .bind(installment.total_remaining.amount())
        .bind(installment_status_code(installment.status))
        .bind(installment.version as i64)
        .bind(installment.created_at)
        .bind(installment.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        for schedule in schedules {
            upsert_schedule(&mut tx, schedule).await?;
        }

        debug!(schedules = schedules.len(), "installment persisted");
        tx.commit().await.map_err(query_error)
    }

    #[instrument(skip(self))]
    async fn get_installment(&self, id: InstallmentId) -> Result<Installment, PortError> {
        let query = format!("SELECT {INSTALLMENT_COLUMNS} FROM installments WHERE installment_id = $1");
        let row = sqlx::query(&query)
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?
            .ok_or_else(|| PortError::not_found("Installment", id))?;
        installment_from_row(&row)
    }

    #[instrument(skip(self, installment), fields(installment_id = %installment.id))]
    async fn update_installment(
        &self,
        installment: &Installment,
        expected_version: u64,
    ) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;
        update_installment_row(&mut tx, installment, expected_version).await?;
        tx.commit().await.map_err(query_error)
    }

    #[instrument(skip(self))]
    async fn delete_installment(&self, id: InstallmentId) -> Result<(), PortError> {
        let deleted = sqlx::query("DELETE FROM installments WHERE installment_id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        if deleted.rows_affected() == 0 {
            return Err(PortError::not_found("Installment", id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn schedules_for(
        &self,
        installment_id: InstallmentId,
    ) -> Result<Vec<PaymentSchedule>, PortError> {
        let query = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM payment_schedules \
             WHERE installment_id = $1 ORDER BY due_date, schedule_id"
        );
        let rows = sqlx::query(&query)
            .bind(*installment_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        rows.iter().map(schedule_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn get_schedule(&self, id: ScheduleId) -> Result<PaymentSchedule, PortError> {
        let query = format!("SELECT {SCHEDULE_COLUMNS} FROM payment_schedules WHERE schedule_id = $1");
        let row = sqlx::query(&query)
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?
            .ok_or_else(|| PortError::not_found("PaymentSchedule", id))?;
        schedule_from_row(&row)
    }

    #[instrument(skip(self))]
    async fn find_transaction(
        &self,
        schedule_id: ScheduleId,
        transaction_id: PaymentTransactionId,
    ) -> Result<PaymentTransaction, PortError> {
        let query = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions \
             WHERE transaction_id = $1 AND schedule_id = $2"
        );
        let row = sqlx::query(&query)
            .bind(*transaction_id.as_uuid())
            .bind(*schedule_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?
            .ok_or_else(|| PortError::not_found("PaymentTransaction", transaction_id))?;
        transaction_from_row(&row)
    }

    #[instrument(skip(self))]
    async fn transactions_for_schedule(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<Vec<PaymentTransaction>, PortError> {
        let query = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions \
             WHERE schedule_id = $1 ORDER BY created_at, transaction_id"
        );
        let rows = sqlx::query(&query)
            .bind(*schedule_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        rows.iter().map(transaction_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn list_overdue(&self, today: NaiveDate) -> Result<Vec<PaymentSchedule>, PortError> {
        let query = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM payment_schedules \
             WHERE due_date < $1 AND paid_amount < monthly_amount \
             AND status NOT IN ('CANCELLED', 'ADJUSTED') \
             ORDER BY due_date, schedule_id"
        );
        let rows = sqlx::query(&query)
            .bind(today)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        rows.iter().map(schedule_from_row).collect()
    }

    #[instrument(
        skip(self, installment, schedules, transactions),
        fields(installment_id = %installment.id)
    )]
    async fn commit_allocation(
        &self,
        installment: &Installment,
        schedules: &[PaymentSchedule],
        transactions: &[PaymentTransaction],
        expected_version: u64,
    ) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        update_installment_row(&mut tx, installment, expected_version).await?;
        for schedule in schedules {
            upsert_schedule(&mut tx, schedule).await?;
        }
        for transaction in transactions {
            upsert_transaction(&mut tx, transaction).await?;
        }

        debug!(
            schedules = schedules.len(),
            transactions = transactions.len(),
            "allocation committed"
        );
        tx.commit().await.map_err(query_error)
    }
}
