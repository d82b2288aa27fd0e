//! The payment schedule allocator
//!
//! Absorbs every payment event against a schedule and re-establishes the
//! core invariant afterwards: the installment's remaining total equals the
//! sum of its schedules' remaining amounts.
//!
//! Three payment modes:
//! - exact/over payment ([`ScheduleAllocator::add_payment`])
//! - partial payment with shortfall rollover onto the next schedule
//!   ([`ScheduleAllocator::partial_payment`])
//! - advance payment with spillover across subsequent schedules
//!   ([`ScheduleAllocator::advance_payment`])
//!
//! plus in-place transaction edits that reverse and reapply their delta
//! ([`ScheduleAllocator::edit_payment`]).
//!
//! "Next" and "subsequent" always mean ascending due date, ties broken by
//! ascending schedule id; the store port guarantees that ordering.

use std::sync::Arc;

use tracing::{debug, info};

use core_kernel::temporal::add_months_clamped;
use core_kernel::{AgentId, Clock, InstallmentId, Money, PaymentTransactionId, ScheduleId};

use crate::error::InstallmentError;
use crate::installment::Installment;
use crate::ports::InstallmentStore;
use crate::schedule::PaymentSchedule;
use crate::transaction::{PaymentTransaction, PaymentType};

/// Bounded optimistic-concurrency retries before surfacing the conflict
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Result of one payment event
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    /// The installment with its refreshed remaining total and status
    pub installment: Installment,
    /// The schedule the payment was aimed at, after the event
    pub schedule: PaymentSchedule,
    /// Every transaction recorded by this event (spillover creates several)
    pub transactions: Vec<PaymentTransaction>,
}

/// Service owning all payment mutations against schedules
pub struct ScheduleAllocator {
    store: Arc<dyn InstallmentStore>,
    clock: Arc<dyn Clock>,
}

impl ScheduleAllocator {
    /// Creates a new allocator
    pub fn new(store: Arc<dyn InstallmentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Records a plain payment against a schedule
    ///
    /// No upper bound is enforced: paid may exceed the monthly amount, with
    /// remaining floored at zero and no spillover. This asymmetry against
    /// [`Self::advance_payment`] is deliberate and documented.
    pub async fn add_payment(
        &self,
        schedule_id: ScheduleId,
        amount: Money,
        agent: AgentId,
        notes: Option<String>,
    ) -> Result<PaymentOutcome, InstallmentError> {
        ensure_positive(amount)?;
        self.with_retry(|| self.try_add_payment(schedule_id, amount, agent, notes.clone()))
            .await
    }

    /// Records a payment that may fall short of the schedule's remaining amount
    ///
    /// A shortfall rolls onto the next schedule in due-date order: the current
    /// schedule is re-based to what was actually paid (reaching Paid through
    /// the normal derivation) and the next schedule's monthly and remaining
    /// amounts rise by the shortfall. When no next schedule exists one is
    /// synthesized a month past the last due date and the installment's month
    /// count grows by one. Paying the full remaining amount (or more) behaves
    /// exactly like [`Self::add_payment`].
    pub async fn partial_payment(
        &self,
        schedule_id: ScheduleId,
        paid_amount: Money,
        agent: AgentId,
        notes: Option<String>,
    ) -> Result<PaymentOutcome, InstallmentError> {
        ensure_positive(paid_amount)?;
        self.with_retry(|| self.try_partial_payment(schedule_id, paid_amount, agent, notes.clone()))
            .await
    }

    /// Records a payment that may exceed the schedule's remaining amount
    ///
    /// The excess spills forward across subsequent schedules in due-date
    /// order, paying each fully or partially until exhausted; each spillover
    /// transaction references the originating schedule in its notes. An
    /// amount within the remaining behaves exactly like [`Self::add_payment`].
    pub async fn advance_payment(
        &self,
        schedule_id: ScheduleId,
        amount: Money,
        agent: AgentId,
        notes: Option<String>,
    ) -> Result<PaymentOutcome, InstallmentError> {
        ensure_positive(amount)?;
        self.with_retry(|| self.try_advance_payment(schedule_id, amount, agent, notes.clone()))
            .await
    }

    /// Overwrites a recorded transaction and reapplies its delta
    ///
    /// The difference between the new and old amount is applied to the
    /// schedule's paid amount; remaining and status are re-derived. Fails
    /// with `NotFound` when the transaction does not exist on that schedule.
    pub async fn edit_payment(
        &self,
        schedule_id: ScheduleId,
        transaction_id: PaymentTransactionId,
        new_amount: Money,
        agent: AgentId,
        notes: Option<String>,
    ) -> Result<PaymentOutcome, InstallmentError> {
        ensure_positive(new_amount)?;
        self.with_retry(|| {
            self.try_edit_payment(schedule_id, transaction_id, new_amount, agent, notes.clone())
        })
        .await
    }

    /// All schedules of an installment, ascending by due date then id
    pub async fn schedules_for_installment(
        &self,
        installment_id: InstallmentId,
    ) -> Result<Vec<PaymentSchedule>, InstallmentError> {
        self.store
            .schedules_for(installment_id)
            .await
            .map_err(Into::into)
    }

    /// Schedules past due with money still owed, across all installments
    pub async fn overdue_schedules(&self) -> Result<Vec<PaymentSchedule>, InstallmentError> {
        self.store
            .list_overdue(self.clock.today())
            .await
            .map_err(Into::into)
    }

    /// Audit trail of a schedule, oldest first
    pub async fn transactions_for_schedule(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<Vec<PaymentTransaction>, InstallmentError> {
        self.store
            .transactions_for_schedule(schedule_id)
            .await
            .map_err(Into::into)
    }

    async fn with_retry<F, Fut>(&self, mut op: F) -> Result<PaymentOutcome, InstallmentError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<PaymentOutcome, InstallmentError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Err(err) if err.is_conflict() && attempt < MAX_COMMIT_ATTEMPTS => {
                    debug!(attempt, "allocation conflict, retrying");
                    continue;
                }
                other => return other,
            }
        }
    }

    async fn try_add_payment(
        &self,
        schedule_id: ScheduleId,
        amount: Money,
        agent: AgentId,
        notes: Option<String>,
    ) -> Result<PaymentOutcome, InstallmentError> {
        let Context {
            mut installment,
            mut schedules,
            target,
            expected_version,
        } = self.load_context(schedule_id).await?;
        let today = self.clock.today();
        let now = self.clock.now();

        schedules[target].record_payment(amount, agent, today, now)?;
        let txn = PaymentTransaction::new(
            schedule_id,
            amount,
            agent,
            PaymentType::Payment,
            today,
            now,
        )
        .with_notes(notes);

        refresh_installment(&mut installment, &schedules, &[], today, now);
        self.store
            .commit_allocation(
                &installment,
                &[schedules[target].clone()],
                std::slice::from_ref(&txn),
                expected_version,
            )
            .await?;

        info!(
            schedule = %schedule_id,
            amount = %amount,
            remaining = %schedules[target].remaining_amount,
            "payment recorded"
        );

        Ok(PaymentOutcome {
            installment,
            schedule: schedules[target].clone(),
            transactions: vec![txn],
        })
    }

    async fn try_partial_payment(
        &self,
        schedule_id: ScheduleId,
        paid_amount: Money,
        agent: AgentId,
        notes: Option<String>,
    ) -> Result<PaymentOutcome, InstallmentError> {
        let Context {
            mut installment,
            mut schedules,
            target,
            expected_version,
        } = self.load_context(schedule_id).await?;
        let today = self.clock.today();
        let now = self.clock.now();

        let remaining_before = schedules[target].remaining_amount;
        if paid_amount >= remaining_before {
            // Full settlement; identical to add_payment by contract
            return self
                .try_add_payment(schedule_id, paid_amount, agent, notes)
                .await;
        }

        schedules[target].record_payment(paid_amount, agent, today, now)?;
        let shortfall = remaining_before.checked_sub(&paid_amount)?;
        // Re-base this month to what was paid; the shortfall is owed on the
        // next schedule, not on both.
        schedules[target].rebase_to_paid(today, now)?;

        let txn = PaymentTransaction::new(
            schedule_id,
            paid_amount,
            agent,
            PaymentType::PartialPayment,
            today,
            now,
        )
        .with_notes(notes);

        let mut touched = vec![target];
        let mut synthesized: Vec<PaymentSchedule> = Vec::new();

        let rollover_target = (target + 1..schedules.len())
            .find(|&i| !schedules[i].status.is_terminal());
        match rollover_target {
            Some(next) => {
                schedules[next].raise_obligation(shortfall, today, now)?;
                touched.push(next);
                debug!(
                    from = %schedule_id,
                    to = %schedules[next].id,
                    shortfall = %shortfall,
                    "shortfall rolled onto next schedule"
                );
            }
            None => {
                let last_due = schedules
                    .iter()
                    .map(|s| s.due_date)
                    .max()
                    .unwrap_or(today);
                let mut extra = PaymentSchedule::new(
                    installment.id,
                    add_months_clamped(last_due, 1),
                    shortfall,
                    installment.agent_id,
                    now,
                );
                extra.notes = Some(format!("Rolled over from schedule {schedule_id}"));
                installment.terms.months += 1;
                debug!(
                    from = %schedule_id,
                    new_schedule = %extra.id,
                    shortfall = %shortfall,
                    "no next schedule; synthesized an extra month"
                );
                synthesized.push(extra);
            }
        }

        refresh_installment(&mut installment, &schedules, &synthesized, today, now);

        let mut changed: Vec<PaymentSchedule> =
            touched.iter().map(|&i| schedules[i].clone()).collect();
        changed.extend(synthesized.iter().cloned());

        self.store
            .commit_allocation(
                &installment,
                &changed,
                std::slice::from_ref(&txn),
                expected_version,
            )
            .await?;

        info!(
            schedule = %schedule_id,
            paid = %paid_amount,
            shortfall = %shortfall,
            "partial payment recorded with rollover"
        );

        Ok(PaymentOutcome {
            installment,
            schedule: schedules[target].clone(),
            transactions: vec![txn],
        })
    }

    async fn try_advance_payment(
        &self,
        schedule_id: ScheduleId,
        amount: Money,
        agent: AgentId,
        notes: Option<String>,
    ) -> Result<PaymentOutcome, InstallmentError> {
        let Context {
            mut installment,
            mut schedules,
            target,
            expected_version,
        } = self.load_context(schedule_id).await?;
        let today = self.clock.today();
        let now = self.clock.now();

        let remaining = schedules[target].remaining_amount;
        if amount <= remaining {
            // Within this month's remaining; identical to add_payment
            return self.try_add_payment(schedule_id, amount, agent, notes).await;
        }
        if schedules[target].status.is_terminal() {
            return Err(InstallmentError::TerminalSchedule(
                schedule_id,
                schedules[target].status,
            ));
        }

        let mut transactions = Vec::new();
        let mut touched = vec![target];
        let mut spillover = amount;

        if remaining.is_positive() {
            schedules[target].record_payment(remaining, agent, today, now)?;
            transactions.push(
                PaymentTransaction::new(
                    schedule_id,
                    remaining,
                    agent,
                    PaymentType::AdvancePayment,
                    today,
                    now,
                )
                .with_notes(notes),
            );
            spillover = spillover.checked_sub(&remaining)?;
        }

        for i in target + 1..schedules.len() {
            if spillover.is_zero() {
                break;
            }
            if schedules[i].status.is_terminal() || schedules[i].is_settled() {
                continue;
            }
            let open = schedules[i].remaining_amount;
            let applied = if spillover <= open { spillover } else { open };
            schedules[i].record_payment(applied, agent, today, now)?;
            transactions.push(
                PaymentTransaction::new(
                    schedules[i].id,
                    applied,
                    agent,
                    PaymentType::AdvancePayment,
                    today,
                    now,
                )
                .with_notes(Some(format!("Advance payment from schedule {schedule_id}"))),
            );
            spillover = spillover.checked_sub(&applied)?;
            touched.push(i);
        }

        // Everything is settled and money is left: the last schedule absorbs
        // it as overpayment, matching the add_payment rule.
        if spillover.is_positive() {
            let last = (0..schedules.len())
                .rev()
                .find(|&i| !schedules[i].status.is_terminal())
                .unwrap_or(target);
            schedules[last].record_payment(spillover, agent, today, now)?;
            transactions.push(
                PaymentTransaction::new(
                    schedules[last].id,
                    spillover,
                    agent,
                    PaymentType::AdvancePayment,
                    today,
                    now,
                )
                .with_notes(Some(format!(
                    "Advance overpayment from schedule {schedule_id}"
                ))),
            );
            if !touched.contains(&last) {
                touched.push(last);
            }
        }

        refresh_installment(&mut installment, &schedules, &[], today, now);

        let changed: Vec<PaymentSchedule> =
            touched.iter().map(|&i| schedules[i].clone()).collect();
        self.store
            .commit_allocation(&installment, &changed, &transactions, expected_version)
            .await?;

        info!(
            schedule = %schedule_id,
            amount = %amount,
            schedules_touched = changed.len(),
            "advance payment distributed"
        );

        Ok(PaymentOutcome {
            installment,
            schedule: schedules[target].clone(),
            transactions,
        })
    }

    async fn try_edit_payment(
        &self,
        schedule_id: ScheduleId,
        transaction_id: PaymentTransactionId,
        new_amount: Money,
        agent: AgentId,
        notes: Option<String>,
    ) -> Result<PaymentOutcome, InstallmentError> {
        let Context {
            mut installment,
            mut schedules,
            target,
            expected_version,
        } = self.load_context(schedule_id).await?;
        let mut txn = self.store.find_transaction(schedule_id, transaction_id).await?;
        let today = self.clock.today();
        let now = self.clock.now();

        let delta = new_amount.checked_sub(&txn.amount)?;
        txn.revise(new_amount, agent, notes, now);
        schedules[target].adjust_paid(delta, agent, today, now)?;

        refresh_installment(&mut installment, &schedules, &[], today, now);
        self.store
            .commit_allocation(
                &installment,
                &[schedules[target].clone()],
                std::slice::from_ref(&txn),
                expected_version,
            )
            .await?;

        info!(
            schedule = %schedule_id,
            transaction = %transaction_id,
            delta = %delta,
            "payment edited"
        );

        Ok(PaymentOutcome {
            installment,
            schedule: schedules[target].clone(),
            transactions: vec![txn],
        })
    }

    async fn load_context(&self, schedule_id: ScheduleId) -> Result<Context, InstallmentError> {
        let schedule = self.store.get_schedule(schedule_id).await?;
        let installment = self.store.get_installment(schedule.installment_id).await?;
        let schedules = self.store.schedules_for(schedule.installment_id).await?;
        let target = schedules
            .iter()
            .position(|s| s.id == schedule_id)
            .ok_or_else(|| core_kernel::PortError::not_found("PaymentSchedule", schedule_id))?;
        let expected_version = installment.version;
        Ok(Context {
            installment,
            schedules,
            target,
            expected_version,
        })
    }
}

struct Context {
    installment: Installment,
    schedules: Vec<PaymentSchedule>,
    target: usize,
    expected_version: u64,
}

/// Recomputes the installment's remaining total and status from its schedules
fn refresh_installment(
    installment: &mut Installment,
    schedules: &[PaymentSchedule],
    synthesized: &[PaymentSchedule],
    today: chrono::NaiveDate,
    now: chrono::DateTime<chrono::Utc>,
) {
    let zero = Money::zero(installment.payable_amount.currency());
    let sum = schedules
        .iter()
        .chain(synthesized)
        .fold(zero, |acc, s| acc + s.remaining_amount);
    let any_overdue = schedules
        .iter()
        .chain(synthesized)
        .any(|s| s.is_overdue(today));
    installment.refresh(sum, any_overdue, now);
}

fn ensure_positive(amount: Money) -> Result<(), InstallmentError> {
    if !amount.is_positive() {
        return Err(InstallmentError::InvalidPayment(format!(
            "payment amount must be positive, got {amount}"
        )));
    }
    Ok(())
}
