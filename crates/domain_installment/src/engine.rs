//! The installment engine
//!
//! Creates installments from raw terms, re-derives amounts on update, and
//! extends repayment schedules explicitly. Schedule generation happens in the
//! same atomic commit as the installment row.

use std::sync::Arc;

use rust_decimal_macros::dec;
use tracing::info;

use core_kernel::{AgentId, Clock, InstallmentId, MemberId, Money, ProductId, Rate};

use crate::error::InstallmentError;
use crate::installment::{Installment, InstallmentStatus, InstallmentTerms};
use crate::ports::InstallmentStore;
use crate::schedule::{generate_schedules, PaymentSchedule};

/// Bounded optimistic-concurrency retries before surfacing the conflict
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Default annual interest when the caller does not specify one
fn default_interest_rate() -> Rate {
    Rate::from_percentage(dec!(15))
}

/// Input for creating an installment
#[derive(Debug, Clone)]
pub struct NewInstallment {
    pub product_id: ProductId,
    pub member_id: MemberId,
    pub agent_id: AgentId,
    pub total_amount: Money,
    pub other_cost: Money,
    pub advance_paid: Money,
    pub months: u32,
    /// Annual interest rate; defaults to 15% when absent
    pub interest_rate: Option<Rate>,
}

/// Partial update of an installment's terms
///
/// A month-count change is rejected here; use
/// [`InstallmentEngine::extend_schedule`] so the schedules and the
/// derivation cannot drift apart silently.
#[derive(Debug, Clone, Default)]
pub struct InstallmentUpdate {
    pub total_amount: Option<Money>,
    pub other_cost: Option<Money>,
    pub advance_paid: Option<Money>,
    pub interest_rate: Option<Rate>,
    pub months: Option<u32>,
    pub status: Option<InstallmentStatus>,
}

/// A freshly created installment with its generated schedules
#[derive(Debug, Clone)]
pub struct CreatedInstallment {
    pub installment: Installment,
    pub schedules: Vec<PaymentSchedule>,
}

/// Service owning the installment lifecycle
pub struct InstallmentEngine {
    store: Arc<dyn InstallmentStore>,
    clock: Arc<dyn Clock>,
}

impl InstallmentEngine {
    /// Creates a new engine
    pub fn new(store: Arc<dyn InstallmentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Creates an installment and eagerly generates one schedule per month
    ///
    /// Due dates start one month from today. The installment's agent is the
    /// default collector on every schedule. The installment and its schedules
    /// are persisted in one atomic commit.
    pub async fn create_installment(
        &self,
        new: NewInstallment,
    ) -> Result<CreatedInstallment, InstallmentError> {
        let terms = InstallmentTerms {
            total_amount: new.total_amount,
            other_cost: new.other_cost,
            advance_paid: new.advance_paid,
            months: new.months,
            interest_rate: new.interest_rate.unwrap_or_else(default_interest_rate),
        };

        let now = self.clock.now();
        let mut installment =
            Installment::new(new.product_id, new.member_id, new.agent_id, terms, now)?;

        let schedules = generate_schedules(&installment, self.clock.today(), now);

        // The remaining total is defined as the sum over the schedules, which
        // can differ from the payable amount by the sub-unit division residue.
        let sum = schedule_sum(&schedules, &installment);
        installment.refresh(sum, false, now);

        self.store.create_installment(&installment, &schedules).await?;

        info!(
            installment = %installment.id,
            member = %installment.member_id,
            payable = %installment.payable_amount,
            months = installment.terms.months,
            "installment created"
        );

        Ok(CreatedInstallment {
            installment,
            schedules,
        })
    }

    /// Loads an installment by id
    pub async fn get_installment(&self, id: InstallmentId) -> Result<Installment, InstallmentError> {
        self.store.get_installment(id).await.map_err(Into::into)
    }

    /// Applies a partial terms update and re-runs the derivation
    ///
    /// Existing schedules are not regenerated.
    pub async fn update_installment(
        &self,
        id: InstallmentId,
        update: InstallmentUpdate,
    ) -> Result<Installment, InstallmentError> {
        if update.months.is_some() {
            return Err(InstallmentError::InvalidTerms(
                "month count cannot be changed in place; use extend_schedule".to_string(),
            ));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut installment = self.store.get_installment(id).await?;
            let expected_version = installment.version;

            let terms = InstallmentTerms {
                total_amount: update.total_amount.unwrap_or(installment.terms.total_amount),
                other_cost: update.other_cost.unwrap_or(installment.terms.other_cost),
                advance_paid: update.advance_paid.unwrap_or(installment.terms.advance_paid),
                months: installment.terms.months,
                interest_rate: update
                    .interest_rate
                    .unwrap_or(installment.terms.interest_rate),
            };
            installment.apply_terms(terms, self.clock.now())?;
            if let Some(status) = update.status {
                installment.status = status;
            }

            match self
                .store
                .update_installment(&installment, expected_version)
                .await
            {
                Ok(()) => {
                    info!(installment = %id, "installment updated");
                    return Ok(installment);
                }
                Err(err) if err.is_retryable() && attempt < MAX_COMMIT_ATTEMPTS => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Appends `additional_months` schedules after the current last due date
    ///
    /// Each new schedule carries the installment's monthly amount; the month
    /// count and remaining total are updated accordingly.
    pub async fn extend_schedule(
        &self,
        id: InstallmentId,
        additional_months: u32,
    ) -> Result<CreatedInstallment, InstallmentError> {
        if additional_months == 0 {
            return Err(InstallmentError::InvalidTerms(
                "schedule extension must add at least one month".to_string(),
            ));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut installment = self.store.get_installment(id).await?;
            let expected_version = installment.version;
            let schedules = self.store.schedules_for(id).await?;
            let now = self.clock.now();
            let today = self.clock.today();

            let last_due = schedules.last().map(|s| s.due_date).unwrap_or(today);
            let new_schedules: Vec<PaymentSchedule> = (1..=additional_months)
                .map(|offset| {
                    PaymentSchedule::new(
                        id,
                        core_kernel::temporal::add_months_clamped(last_due, offset),
                        installment.monthly_amount,
                        installment.agent_id,
                        now,
                    )
                })
                .collect();

            installment.terms.months += additional_months;

            let mut all = schedules.clone();
            all.extend(new_schedules.iter().cloned());
            let any_overdue = all.iter().any(|s| s.is_overdue(today));
            installment.refresh(schedule_sum(&all, &installment), any_overdue, now);

            match self
                .store
                .commit_allocation(&installment, &new_schedules, &[], expected_version)
                .await
            {
                Ok(()) => {
                    info!(
                        installment = %id,
                        additional_months,
                        "installment schedule extended"
                    );
                    return Ok(CreatedInstallment {
                        installment,
                        schedules: new_schedules,
                    });
                }
                Err(err) if err.is_retryable() && attempt < MAX_COMMIT_ATTEMPTS => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Deletes an installment, cascading to its schedules and transactions
    pub async fn delete_installment(&self, id: InstallmentId) -> Result<(), InstallmentError> {
        self.store.delete_installment(id).await?;
        info!(installment = %id, "installment deleted");
        Ok(())
    }
}

/// Sum of remaining amounts across schedules
pub(crate) fn schedule_sum(schedules: &[PaymentSchedule], installment: &Installment) -> Money {
    schedules.iter().fold(
        Money::zero(installment.payable_amount.currency()),
        |acc, s| acc + s.remaining_amount,
    )
}
