//! In-memory installment store
//!
//! Mock adapter for tests and for running the core without PostgreSQL. It
//! honours the same atomicity and version-check contracts as the database
//! adapter.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use core_kernel::{
    DomainPort, InstallmentId, PaymentTransactionId, PortError, ScheduleId,
};

use crate::installment::Installment;
use crate::ports::InstallmentStore;
use crate::schedule::PaymentSchedule;
use crate::transaction::PaymentTransaction;

#[derive(Default)]
struct State {
    installments: HashMap<InstallmentId, Installment>,
    schedules: HashMap<ScheduleId, PaymentSchedule>,
    transactions: HashMap<PaymentTransactionId, PaymentTransaction>,
}

/// Thread-safe in-memory implementation of [`InstallmentStore`]
#[derive(Default)]
pub struct InMemoryInstallmentStore {
    state: Mutex<State>,
}

impl InMemoryInstallmentStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions recorded so far
    pub fn transaction_count(&self) -> usize {
        self.state
            .lock()
            .expect("installment store lock poisoned")
            .transactions
            .len()
    }
}

impl DomainPort for InMemoryInstallmentStore {}

fn sorted_schedules(state: &State, installment_id: InstallmentId) -> Vec<PaymentSchedule> {
    let mut schedules: Vec<PaymentSchedule> = state
        .schedules
        .values()
        .filter(|s| s.installment_id == installment_id)
        .cloned()
        .collect();
    schedules.sort_by_key(|s| (s.due_date, *s.id.as_uuid()));
    schedules
}

#[async_trait]
impl InstallmentStore for InMemoryInstallmentStore {
    async fn create_installment(
        &self,
        installment: &Installment,
        schedules: &[PaymentSchedule],
    ) -> Result<(), PortError> {
        let mut state = self.state.lock().expect("installment store lock poisoned");
        if state.installments.contains_key(&installment.id) {
            return Err(PortError::conflict(format!(
                "installment {} already exists",
                installment.id
            )));
        }
        state.installments.insert(installment.id, installment.clone());
        for schedule in schedules {
            state.schedules.insert(schedule.id, schedule.clone());
        }
        Ok(())
    }

    async fn get_installment(&self, id: InstallmentId) -> Result<Installment, PortError> {
        let state = self.state.lock().expect("installment store lock poisoned");
        state
            .installments
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Installment", id))
    }

    async fn update_installment(
        &self,
        installment: &Installment,
        expected_version: u64,
    ) -> Result<(), PortError> {
        let mut state = self.state.lock().expect("installment store lock poisoned");
        let stored = state
            .installments
            .get_mut(&installment.id)
            .ok_or_else(|| PortError::not_found("Installment", installment.id))?;
        if stored.version != expected_version {
            return Err(PortError::conflict(format!(
                "installment {} version is {}, expected {}",
                installment.id, stored.version, expected_version
            )));
        }
        let mut committed = installment.clone();
        committed.version = expected_version + 1;
        *stored = committed;
        Ok(())
    }

    async fn delete_installment(&self, id: InstallmentId) -> Result<(), PortError> {
        let mut state = self.state.lock().expect("installment store lock poisoned");
        state
            .installments
            .remove(&id)
            .ok_or_else(|| PortError::not_found("Installment", id))?;

        let schedule_ids: Vec<ScheduleId> = state
            .schedules
            .values()
            .filter(|s| s.installment_id == id)
            .map(|s| s.id)
            .collect();
        for schedule_id in &schedule_ids {
            state.schedules.remove(schedule_id);
        }
        state
            .transactions
            .retain(|_, t| !schedule_ids.contains(&t.schedule_id));
        Ok(())
    }

    async fn schedules_for(
        &self,
        installment_id: InstallmentId,
    ) -> Result<Vec<PaymentSchedule>, PortError> {
        let state = self.state.lock().expect("installment store lock poisoned");
        Ok(sorted_schedules(&state, installment_id))
    }

    async fn get_schedule(&self, id: ScheduleId) -> Result<PaymentSchedule, PortError> {
        let state = self.state.lock().expect("installment store lock poisoned");
        state
            .schedules
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("PaymentSchedule", id))
    }

    async fn find_transaction(
        &self,
        schedule_id: ScheduleId,
        transaction_id: PaymentTransactionId,
    ) -> Result<PaymentTransaction, PortError> {
        let state = self.state.lock().expect("installment store lock poisoned");
        state
            .transactions
            .get(&transaction_id)
            .filter(|t| t.schedule_id == schedule_id)
            .cloned()
            .ok_or_else(|| PortError::not_found("PaymentTransaction", transaction_id))
    }

    async fn transactions_for_schedule(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<Vec<PaymentTransaction>, PortError> {
        let state = self.state.lock().expect("installment store lock poisoned");
        let mut transactions: Vec<PaymentTransaction> = state
            .transactions
            .values()
            .filter(|t| t.schedule_id == schedule_id)
            .cloned()
            .collect();
        transactions.sort_by_key(|t| (t.created_at, *t.id.as_uuid()));
        Ok(transactions)
    }

    async fn list_overdue(&self, today: NaiveDate) -> Result<Vec<PaymentSchedule>, PortError> {
        let state = self.state.lock().expect("installment store lock poisoned");
        let mut overdue: Vec<PaymentSchedule> = state
            .schedules
            .values()
            .filter(|s| s.is_overdue(today))
            .cloned()
            .collect();
        overdue.sort_by_key(|s| (s.due_date, *s.id.as_uuid()));
        Ok(overdue)
    }

    async fn commit_allocation(
        &self,
        installment: &Installment,
        schedules: &[PaymentSchedule],
        transactions: &[PaymentTransaction],
        expected_version: u64,
    ) -> Result<(), PortError> {
        let mut state = self.state.lock().expect("installment store lock poisoned");
        let stored = state
            .installments
            .get(&installment.id)
            .ok_or_else(|| PortError::not_found("Installment", installment.id))?;
        if stored.version != expected_version {
            return Err(PortError::conflict(format!(
                "installment {} version is {}, expected {}",
                installment.id, stored.version, expected_version
            )));
        }

        let mut committed = installment.clone();
        committed.version = expected_version + 1;
        state.installments.insert(installment.id, committed);
        for schedule in schedules {
            state.schedules.insert(schedule.id, schedule.clone());
        }
        for transaction in transactions {
            state
                .transactions
                .insert(transaction.id, transaction.clone());
        }
        Ok(())
    }
}
