//! Installment store port
//!
//! The `InstallmentStore` trait defines all operations the installment
//! domain needs from its data source. Adapters:
//!
//! - **Internal Adapter**: PostgreSQL (infra_db)
//! - **Memory Adapter**: [`crate::InMemoryInstallmentStore`] for tests and demos
//!
//! `create_installment` and `commit_allocation` are multi-record writes and
//! must commit atomically. `commit_allocation` carries the expected
//! installment version so concurrent payments against the same installment
//! serialize through [`core_kernel::PortError::Conflict`].

use async_trait::async_trait;
use chrono::NaiveDate;

use core_kernel::{DomainPort, InstallmentId, PaymentTransactionId, PortError, ScheduleId};

use crate::installment::Installment;
use crate::schedule::PaymentSchedule;
use crate::transaction::PaymentTransaction;

/// Store port for the installment domain
#[async_trait]
pub trait InstallmentStore: DomainPort {
    /// Persists a new installment together with its generated schedules
    async fn create_installment(
        &self,
        installment: &Installment,
        schedules: &[PaymentSchedule],
    ) -> Result<(), PortError>;

    /// Loads an installment by id
    async fn get_installment(&self, id: InstallmentId) -> Result<Installment, PortError>;

    /// Updates an installment row alone (term changes, cancellation)
    ///
    /// Fails with [`PortError::Conflict`] when the stored version differs
    /// from `expected_version`.
    async fn update_installment(
        &self,
        installment: &Installment,
        expected_version: u64,
    ) -> Result<(), PortError>;

    /// Deletes an installment and cascades to its schedules and transactions
    async fn delete_installment(&self, id: InstallmentId) -> Result<(), PortError>;

    /// All schedules of an installment, ascending by due date then id
    ///
    /// This ordering is the contract the allocator's rollover and spillover
    /// logic depends on.
    async fn schedules_for(
        &self,
        installment_id: InstallmentId,
    ) -> Result<Vec<PaymentSchedule>, PortError>;

    /// Loads a schedule by id
    async fn get_schedule(&self, id: ScheduleId) -> Result<PaymentSchedule, PortError>;

    /// Loads a transaction that must belong to the given schedule
    async fn find_transaction(
        &self,
        schedule_id: ScheduleId,
        transaction_id: PaymentTransactionId,
    ) -> Result<PaymentTransaction, PortError>;

    /// All transactions recorded against a schedule, oldest first
    async fn transactions_for_schedule(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<Vec<PaymentTransaction>, PortError>;

    /// Schedules past their due date with money still owed, ascending by due date
    async fn list_overdue(&self, today: NaiveDate) -> Result<Vec<PaymentSchedule>, PortError>;

    /// Commits the outcome of one payment event atomically
    ///
    /// Upserts the given schedules and transactions and updates the
    /// installment, all in one transaction. Fails with
    /// [`PortError::Conflict`] on an installment version mismatch; on
    /// success the stored version is `expected_version + 1`.
    async fn commit_allocation(
        &self,
        installment: &Installment,
        schedules: &[PaymentSchedule],
        transactions: &[PaymentTransaction],
        expected_version: u64,
    ) -> Result<(), PortError>;
}
