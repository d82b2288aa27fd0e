//! Payment transactions - the audit trail behind every schedule
//!
//! One row per money movement against a schedule. Rows are immutable except
//! through the explicit edit operation, which reverses and reapplies the
//! delta on the parent schedule.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{AgentId, Money, PaymentTransactionId, ScheduleId};

/// How a payment transaction came about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    /// Regular payment
    Payment,
    /// Partial payment whose shortfall rolled forward
    PartialPayment,
    /// Advance payment spilling into future schedules
    AdvancePayment,
    /// Money returned
    Refund,
    /// Amount adjustment
    Adjustment,
    /// Late payment penalty
    Penalty,
    /// Payment discount
    Discount,
}

/// A single money movement against a schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    /// Unique identifier
    pub id: PaymentTransactionId,
    /// Schedule the money was applied to
    pub schedule_id: ScheduleId,
    /// Amount applied
    pub amount: Money,
    /// Collecting agent
    pub agent_id: AgentId,
    /// Calendar date of the payment
    pub payment_date: NaiveDate,
    /// Transaction kind
    pub payment_type: PaymentType,
    /// Free-form notes; spillover rows reference their originating schedule
    pub notes: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last edit time
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    /// Creates a new transaction
    pub fn new(
        schedule_id: ScheduleId,
        amount: Money,
        agent_id: AgentId,
        payment_type: PaymentType,
        payment_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentTransactionId::new_v7(),
            schedule_id,
            amount,
            agent_id,
            payment_date,
            payment_type,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attaches notes
    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    /// Overwrites amount, agent, and notes in place (edit operation)
    pub fn revise(
        &mut self,
        amount: Money,
        agent_id: AgentId,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.amount = amount;
        self.agent_id = agent_id;
        if notes.is_some() {
            self.notes = notes;
        }
        self.updated_at = now;
    }
}
