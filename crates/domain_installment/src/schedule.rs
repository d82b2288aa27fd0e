//! Payment schedules - one month's obligation within an installment
//!
//! Status is a pure function of (paid, monthly, due date, today) and is
//! re-derived after every mutation. CANCELLED and ADJUSTED are administrative
//! states outside the normal flow and are never produced by the derivation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::temporal::add_months_clamped;
use core_kernel::{AgentId, InstallmentId, Money, ScheduleId};

use crate::error::InstallmentError;
use crate::installment::Installment;

/// Payment status of a single schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleStatus {
    /// Nothing paid, not yet due
    Pending,
    /// Something paid, less than the monthly amount
    PartiallyPaid,
    /// Monthly amount reached or exceeded
    Paid,
    /// Nothing paid and past the due date
    Overdue,
    /// Administratively cancelled; terminal
    Cancelled,
    /// Administratively adjusted; terminal
    Adjusted,
}

impl ScheduleStatus {
    /// Terminal administrative states refuse further payments
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScheduleStatus::Cancelled | ScheduleStatus::Adjusted)
    }
}

/// Derives the status of a schedule, in priority order:
///
/// 1. paid ≥ monthly → Paid
/// 2. 0 < paid < monthly → PartiallyPaid
/// 3. due date passed (and nothing paid) → Overdue
/// 4. otherwise → Pending
pub fn derive_status(
    paid: Money,
    monthly: Money,
    due_date: NaiveDate,
    today: NaiveDate,
) -> ScheduleStatus {
    if paid >= monthly {
        ScheduleStatus::Paid
    } else if paid.is_positive() {
        ScheduleStatus::PartiallyPaid
    } else if due_date < today {
        ScheduleStatus::Overdue
    } else {
        ScheduleStatus::Pending
    }
}

/// One month's payment obligation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSchedule {
    /// Unique identifier
    pub id: ScheduleId,
    /// Owning installment
    pub installment_id: InstallmentId,
    /// When this month's payment is due
    pub due_date: NaiveDate,
    /// Amount due this month; raised by rollover, re-based by partial payment
    pub monthly_amount: Money,
    /// Amount collected so far
    pub paid_amount: Money,
    /// Derived: `max(monthly − paid, 0)`
    pub remaining_amount: Money,
    /// Derived status
    pub status: ScheduleStatus,
    /// Agent responsible for collecting; overwritten by each payment
    pub collecting_agent: AgentId,
    /// Date the schedule reached Paid, if it has
    pub payment_date: Option<NaiveDate>,
    /// Free-form notes
    pub notes: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl PaymentSchedule {
    /// Creates a pending schedule
    pub fn new(
        installment_id: InstallmentId,
        due_date: NaiveDate,
        monthly_amount: Money,
        collecting_agent: AgentId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ScheduleId::new_v7(),
            installment_id,
            due_date,
            monthly_amount,
            paid_amount: Money::zero(monthly_amount.currency()),
            remaining_amount: monthly_amount,
            status: ScheduleStatus::Pending,
            collecting_agent,
            payment_date: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records a collection against this schedule
    ///
    /// Paid may exceed the monthly amount; remaining floors at zero.
    pub fn record_payment(
        &mut self,
        amount: Money,
        agent: AgentId,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<(), InstallmentError> {
        if self.status.is_terminal() {
            return Err(InstallmentError::TerminalSchedule(self.id, self.status));
        }
        self.paid_amount = self.paid_amount.checked_add(&amount)?;
        self.collecting_agent = agent;
        self.recompute(today, now)?;
        Ok(())
    }

    /// Re-bases the monthly amount to what was actually paid
    ///
    /// Used by the partial-payment rollover: the shortfall moves to the next
    /// schedule, so this one must stop owing it or the member would owe it
    /// twice.
    pub fn rebase_to_paid(
        &mut self,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<(), InstallmentError> {
        self.monthly_amount = self.paid_amount;
        self.recompute(today, now)
    }

    /// Raises this month's obligation by a rolled-over shortfall
    pub fn raise_obligation(
        &mut self,
        extra: Money,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<(), InstallmentError> {
        self.monthly_amount = self.monthly_amount.checked_add(&extra)?;
        self.recompute(today, now)
    }

    /// Applies a signed correction to the paid amount (payment edit)
    pub fn adjust_paid(
        &mut self,
        delta: Money,
        agent: AgentId,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<(), InstallmentError> {
        if self.status.is_terminal() {
            return Err(InstallmentError::TerminalSchedule(self.id, self.status));
        }
        let corrected = self.paid_amount.checked_add(&delta)?;
        if corrected.is_negative() {
            return Err(InstallmentError::InvalidPayment(format!(
                "edit would make paid amount negative ({corrected})"
            )));
        }
        self.paid_amount = corrected;
        self.collecting_agent = agent;
        self.recompute(today, now)
    }

    /// True when the schedule is past due with money still owed
    ///
    /// This is the overdue *view* predicate: unlike the stored status it also
    /// flags partially paid schedules whose due date has passed.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.status.is_terminal() && self.due_date < today && self.paid_amount < self.monthly_amount
    }

    /// True once nothing is owed on this schedule
    pub fn is_settled(&self) -> bool {
        self.remaining_amount.is_zero()
    }

    fn recompute(&mut self, today: NaiveDate, now: DateTime<Utc>) -> Result<(), InstallmentError> {
        self.remaining_amount = self.monthly_amount.saturating_sub(&self.paid_amount)?;
        let status = derive_status(self.paid_amount, self.monthly_amount, self.due_date, today);
        match status {
            ScheduleStatus::Paid if self.payment_date.is_none() => {
                self.payment_date = Some(today);
            }
            ScheduleStatus::Paid => {}
            // A downward edit can take a schedule back out of Paid
            _ => self.payment_date = None,
        }
        self.status = status;
        self.updated_at = now;
        Ok(())
    }
}

/// Generates one pending schedule per month for a new installment
///
/// Due dates run from one month after `start`, each a month apart, with
/// month-end days clamped. The installment's agent is the default collector
/// for every row.
pub fn generate_schedules(
    installment: &Installment,
    start: NaiveDate,
    now: DateTime<Utc>,
) -> Vec<PaymentSchedule> {
    (1..=installment.terms.months)
        .map(|offset| {
            PaymentSchedule::new(
                installment.id,
                add_months_clamped(start, offset),
                installment.monthly_amount,
                installment.agent_id,
                now,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    fn bdt(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::BDT)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_status_priority_order() {
        let monthly = bdt(dec!(4416.67));
        let today = date(2025, 7, 15);

        // Paid wins even when overdue
        assert_eq!(
            derive_status(bdt(dec!(4416.67)), monthly, date(2025, 7, 1), today),
            ScheduleStatus::Paid
        );
        // Partial wins over overdue
        assert_eq!(
            derive_status(bdt(dec!(2000)), monthly, date(2025, 7, 1), today),
            ScheduleStatus::PartiallyPaid
        );
        // Nothing paid, past due
        assert_eq!(
            derive_status(Money::zero(Currency::BDT), monthly, date(2025, 7, 1), today),
            ScheduleStatus::Overdue
        );
        // Nothing paid, due today is not overdue
        assert_eq!(
            derive_status(Money::zero(Currency::BDT), monthly, today, today),
            ScheduleStatus::Pending
        );
    }

    #[test]
    fn test_overpayment_floors_remaining() {
        let mut schedule = PaymentSchedule::new(
            InstallmentId::new_v7(),
            date(2025, 8, 1),
            bdt(dec!(4416.67)),
            AgentId::new_v7(),
            Utc::now(),
        );

        schedule
            .record_payment(bdt(dec!(5000)), AgentId::new_v7(), date(2025, 7, 15), Utc::now())
            .unwrap();

        assert_eq!(schedule.paid_amount, bdt(dec!(5000)));
        assert!(schedule.remaining_amount.is_zero());
        assert_eq!(schedule.status, ScheduleStatus::Paid);
        assert_eq!(schedule.payment_date, Some(date(2025, 7, 15)));
    }

    #[test]
    fn test_remaining_invariant_through_mutations() {
        let mut schedule = PaymentSchedule::new(
            InstallmentId::new_v7(),
            date(2025, 8, 1),
            bdt(dec!(4416.67)),
            AgentId::new_v7(),
            Utc::now(),
        );
        let today = date(2025, 7, 15);
        let agent = AgentId::new_v7();

        schedule.record_payment(bdt(dec!(2000)), agent, today, Utc::now()).unwrap();
        assert_eq!(schedule.remaining_amount, bdt(dec!(2416.67)));
        assert_eq!(schedule.status, ScheduleStatus::PartiallyPaid);

        schedule.raise_obligation(bdt(dec!(1000)), today, Utc::now()).unwrap();
        assert_eq!(schedule.monthly_amount, bdt(dec!(5416.67)));
        assert_eq!(schedule.remaining_amount, bdt(dec!(3416.67)));
    }

    #[test]
    fn test_terminal_schedule_refuses_payment() {
        let mut schedule = PaymentSchedule::new(
            InstallmentId::new_v7(),
            date(2025, 8, 1),
            bdt(dec!(1000)),
            AgentId::new_v7(),
            Utc::now(),
        );
        schedule.status = ScheduleStatus::Cancelled;

        let result = schedule.record_payment(
            bdt(dec!(100)),
            AgentId::new_v7(),
            date(2025, 7, 15),
            Utc::now(),
        );
        assert!(matches!(result, Err(InstallmentError::TerminalSchedule(_, _))));
    }

    #[test]
    fn test_edit_can_unset_paid() {
        let mut schedule = PaymentSchedule::new(
            InstallmentId::new_v7(),
            date(2025, 8, 1),
            bdt(dec!(1000)),
            AgentId::new_v7(),
            Utc::now(),
        );
        let agent = AgentId::new_v7();
        let today = date(2025, 7, 15);

        schedule.record_payment(bdt(dec!(1000)), agent, today, Utc::now()).unwrap();
        assert_eq!(schedule.status, ScheduleStatus::Paid);

        schedule.adjust_paid(bdt(dec!(-600)), agent, today, Utc::now()).unwrap();
        assert_eq!(schedule.status, ScheduleStatus::PartiallyPaid);
        assert!(schedule.payment_date.is_none());
        assert_eq!(schedule.remaining_amount, bdt(dec!(600)));

        let too_far = schedule.adjust_paid(bdt(dec!(-500)), agent, today, Utc::now());
        assert!(matches!(too_far, Err(InstallmentError::InvalidPayment(_))));
    }
}
