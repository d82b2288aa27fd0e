//! Tests for the payment schedule allocator
//!
//! The load-bearing property throughout: after any payment operation the
//! installment's remaining total equals the sum of its schedules' remaining
//! amounts.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use core_kernel::{AgentId, Currency, FixedClock, InstallmentId, MemberId, Money, ProductId, Rate};
use domain_installment::{
    InMemoryInstallmentStore, InstallmentEngine, InstallmentError, InstallmentStatus,
    InstallmentStore, NewInstallment, PaymentType, ScheduleAllocator, ScheduleStatus,
};

fn bdt(amount: rust_decimal::Decimal) -> Money {
    Money::new(amount, Currency::BDT)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

struct Harness {
    engine: InstallmentEngine,
    allocator: ScheduleAllocator,
    store: Arc<InMemoryInstallmentStore>,
    clock: Arc<FixedClock>,
    agent: AgentId,
}

fn setup() -> Harness {
    let store = Arc::new(InMemoryInstallmentStore::new());
    let clock = Arc::new(FixedClock::new(date(2025, 7, 15)));
    Harness {
        engine: InstallmentEngine::new(store.clone(), clock.clone()),
        allocator: ScheduleAllocator::new(store.clone(), clock.clone()),
        store,
        clock,
        agent: AgentId::new_v7(),
    }
}

/// Creates an installment with a round monthly amount of 1000
async fn round_installment(h: &Harness, months: u32) -> domain_installment::CreatedInstallment {
    h.engine
        .create_installment(NewInstallment {
            product_id: ProductId::new_v7(),
            member_id: MemberId::new_v7(),
            agent_id: h.agent,
            total_amount: bdt(rust_decimal::Decimal::from(months) * dec!(1000)),
            other_cost: bdt(dec!(0)),
            advance_paid: bdt(dec!(0)),
            months,
            interest_rate: Some(Rate::from_percentage(dec!(0))),
        })
        .await
        .unwrap()
}

async fn assert_invariant(h: &Harness, installment_id: InstallmentId) {
    let installment = h.store.get_installment(installment_id).await.unwrap();
    let schedules = h.store.schedules_for(installment_id).await.unwrap();
    let sum = schedules
        .iter()
        .fold(Money::zero(Currency::BDT), |acc, s| acc + s.remaining_amount);
    assert_eq!(
        installment.total_remaining, sum,
        "remaining total must equal schedule sum"
    );
}

#[tokio::test]
async fn test_add_payment_partial_amount() {
    let h = setup();
    let created = h
        .engine
        .create_installment(NewInstallment {
            product_id: ProductId::new_v7(),
            member_id: MemberId::new_v7(),
            agent_id: h.agent,
            total_amount: bdt(dec!(50000)),
            other_cost: bdt(dec!(500)),
            advance_paid: bdt(dec!(5000)),
            months: 12,
            interest_rate: Some(Rate::from_percentage(dec!(15))),
        })
        .await
        .unwrap();
    let schedule_id = created.schedules[0].id;

    let outcome = h
        .allocator
        .add_payment(schedule_id, bdt(dec!(2000)), h.agent, None)
        .await
        .unwrap();

    assert_eq!(outcome.schedule.paid_amount, bdt(dec!(2000)));
    assert_eq!(
        outcome.schedule.remaining_amount.amount().round_dp(2),
        dec!(2416.67)
    );
    assert_eq!(outcome.schedule.status, ScheduleStatus::PartiallyPaid);
    assert_eq!(outcome.transactions.len(), 1);
    assert_eq!(outcome.transactions[0].payment_type, PaymentType::Payment);

    assert_invariant(&h, created.installment.id).await;
}

#[tokio::test]
async fn test_settling_remainder_reaches_paid_without_rollover() {
    let h = setup();
    let created = round_installment(&h, 12).await;
    let schedule_id = created.schedules[0].id;

    h.allocator
        .add_payment(schedule_id, bdt(dec!(400)), h.agent, None)
        .await
        .unwrap();

    // Paying exactly the remaining amount through the partial path settles
    // the month; nothing rolls over.
    let outcome = h
        .allocator
        .partial_payment(schedule_id, bdt(dec!(600)), h.agent, None)
        .await
        .unwrap();

    assert_eq!(outcome.schedule.status, ScheduleStatus::Paid);
    assert_eq!(outcome.schedule.payment_date, Some(date(2025, 7, 15)));
    assert!(outcome.schedule.remaining_amount.is_zero());

    let schedules = h.store.schedules_for(created.installment.id).await.unwrap();
    assert_eq!(schedules.len(), 12);
    assert_eq!(schedules[1].monthly_amount, bdt(dec!(1000)));
    assert_invariant(&h, created.installment.id).await;
}

#[tokio::test]
async fn test_partial_payment_rolls_shortfall_forward() {
    let h = setup();
    let created = round_installment(&h, 12).await;
    let first = created.schedules[0].id;

    let outcome = h
        .allocator
        .partial_payment(first, bdt(dec!(600)), h.agent, None)
        .await
        .unwrap();

    // Current month re-based to what was paid and settled
    assert_eq!(outcome.schedule.status, ScheduleStatus::Paid);
    assert_eq!(outcome.schedule.monthly_amount, bdt(dec!(600)));
    assert!(outcome.schedule.remaining_amount.is_zero());
    assert_eq!(outcome.transactions[0].payment_type, PaymentType::PartialPayment);

    // Next month owes the shortfall on top of its own amount
    let schedules = h.store.schedules_for(created.installment.id).await.unwrap();
    assert_eq!(schedules[1].monthly_amount, bdt(dec!(1400)));
    assert_eq!(schedules[1].remaining_amount, bdt(dec!(1400)));

    // Conservation: outstanding dropped by exactly the payment
    let installment = h.store.get_installment(created.installment.id).await.unwrap();
    assert_eq!(installment.total_remaining, bdt(dec!(11400)));
    assert_invariant(&h, created.installment.id).await;
}

#[tokio::test]
async fn test_partial_payment_on_last_schedule_synthesizes_a_month() {
    let h = setup();
    let created = round_installment(&h, 1).await;
    let only = created.schedules[0].id;

    h.allocator
        .partial_payment(only, bdt(dec!(400)), h.agent, None)
        .await
        .unwrap();

    let installment = h.store.get_installment(created.installment.id).await.unwrap();
    assert_eq!(installment.terms.months, 2);

    let schedules = h.store.schedules_for(created.installment.id).await.unwrap();
    assert_eq!(schedules.len(), 2);
    let extra = &schedules[1];
    assert_eq!(extra.due_date, date(2025, 9, 15));
    assert_eq!(extra.monthly_amount, bdt(dec!(600)));
    assert!(extra.notes.as_ref().unwrap().contains(&only.to_string()));

    assert_eq!(installment.total_remaining, bdt(dec!(600)));
    assert_invariant(&h, created.installment.id).await;
}

#[tokio::test]
async fn test_advance_payment_spills_over() {
    let h = setup();
    let created = round_installment(&h, 12).await;
    let first = created.schedules[0].id;

    let outcome = h
        .allocator
        .advance_payment(first, bdt(dec!(2500)), h.agent, None)
        .await
        .unwrap();

    let schedules = h.store.schedules_for(created.installment.id).await.unwrap();
    assert_eq!(schedules[0].status, ScheduleStatus::Paid);
    assert_eq!(schedules[1].status, ScheduleStatus::Paid);
    assert_eq!(schedules[2].status, ScheduleStatus::PartiallyPaid);
    assert_eq!(schedules[2].paid_amount, bdt(dec!(500)));
    assert_eq!(schedules[3].status, ScheduleStatus::Pending);

    // One transaction per schedule touched, spillovers referencing the origin
    assert_eq!(outcome.transactions.len(), 3);
    for txn in &outcome.transactions {
        assert_eq!(txn.payment_type, PaymentType::AdvancePayment);
    }
    assert!(outcome.transactions[1]
        .notes
        .as_ref()
        .unwrap()
        .contains(&first.to_string()));

    let installment = h.store.get_installment(created.installment.id).await.unwrap();
    assert_eq!(installment.total_remaining, bdt(dec!(9500)));
    assert_invariant(&h, created.installment.id).await;
}

#[tokio::test]
async fn test_advance_within_remaining_is_a_plain_payment() {
    let h = setup();
    let created = round_installment(&h, 12).await;
    let first = created.schedules[0].id;

    let outcome = h
        .allocator
        .advance_payment(first, bdt(dec!(700)), h.agent, None)
        .await
        .unwrap();

    assert_eq!(outcome.transactions.len(), 1);
    assert_eq!(outcome.transactions[0].payment_type, PaymentType::Payment);
    assert_eq!(outcome.schedule.status, ScheduleStatus::PartiallyPaid);
    assert_invariant(&h, created.installment.id).await;
}

#[tokio::test]
async fn test_advance_residual_absorbed_as_overpayment() {
    let h = setup();
    let created = round_installment(&h, 2).await;
    let first = created.schedules[0].id;

    h.allocator
        .advance_payment(first, bdt(dec!(2500)), h.agent, None)
        .await
        .unwrap();

    let schedules = h.store.schedules_for(created.installment.id).await.unwrap();
    assert_eq!(schedules[0].paid_amount, bdt(dec!(1000)));
    // Last schedule takes its own 1000 plus the 500 residual
    assert_eq!(schedules[1].paid_amount, bdt(dec!(1500)));
    assert!(schedules[1].remaining_amount.is_zero());

    let installment = h.store.get_installment(created.installment.id).await.unwrap();
    assert_eq!(installment.status, InstallmentStatus::Completed);
    assert!(installment.total_remaining.is_zero());
    assert_invariant(&h, created.installment.id).await;
}

#[tokio::test]
async fn test_full_repayment_completes_installment() {
    let h = setup();
    let created = round_installment(&h, 3).await;

    for schedule in &created.schedules {
        h.allocator
            .add_payment(schedule.id, bdt(dec!(1000)), h.agent, None)
            .await
            .unwrap();
    }

    let installment = h.store.get_installment(created.installment.id).await.unwrap();
    assert_eq!(installment.status, InstallmentStatus::Completed);
    assert!(installment.total_remaining.is_zero());
}

#[tokio::test]
async fn test_edit_payment_reapplies_delta() {
    let h = setup();
    let created = round_installment(&h, 12).await;
    let first = created.schedules[0].id;

    let outcome = h
        .allocator
        .add_payment(first, bdt(dec!(800)), h.agent, None)
        .await
        .unwrap();
    let txn_id = outcome.transactions[0].id;

    // Shrink the payment
    let edited = h
        .allocator
        .edit_payment(first, txn_id, bdt(dec!(500)), h.agent, Some("typo".into()))
        .await
        .unwrap();
    assert_eq!(edited.schedule.paid_amount, bdt(dec!(500)));
    assert_eq!(edited.schedule.remaining_amount, bdt(dec!(500)));
    assert_eq!(edited.transactions[0].amount, bdt(dec!(500)));
    assert_invariant(&h, created.installment.id).await;

    // Grow it past the monthly amount
    let edited = h
        .allocator
        .edit_payment(first, txn_id, bdt(dec!(1200)), h.agent, None)
        .await
        .unwrap();
    assert_eq!(edited.schedule.status, ScheduleStatus::Paid);
    assert!(edited.schedule.remaining_amount.is_zero());
    assert_invariant(&h, created.installment.id).await;
}

#[tokio::test]
async fn test_edit_payment_not_found() {
    let h = setup();
    let created = round_installment(&h, 2).await;
    let first = created.schedules[0].id;
    let second = created.schedules[1].id;

    let outcome = h
        .allocator
        .add_payment(first, bdt(dec!(100)), h.agent, None)
        .await
        .unwrap();
    let txn_id = outcome.transactions[0].id;

    // Unknown transaction
    let missing = h
        .allocator
        .edit_payment(
            first,
            core_kernel::PaymentTransactionId::new_v7(),
            bdt(dec!(50)),
            h.agent,
            None,
        )
        .await;
    assert!(missing.unwrap_err().is_not_found());

    // Transaction exists but on a different schedule
    let wrong_schedule = h
        .allocator
        .edit_payment(second, txn_id, bdt(dec!(50)), h.agent, None)
        .await;
    assert!(wrong_schedule.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_payment_against_unknown_schedule() {
    let h = setup();
    round_installment(&h, 2).await;

    let result = h
        .allocator
        .add_payment(core_kernel::ScheduleId::new_v7(), bdt(dec!(100)), h.agent, None)
        .await;
    assert!(result.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_non_positive_amounts_rejected() {
    let h = setup();
    let created = round_installment(&h, 2).await;
    let first = created.schedules[0].id;

    for amount in [dec!(0), dec!(-100)] {
        let result = h
            .allocator
            .add_payment(first, bdt(amount), h.agent, None)
            .await;
        assert!(matches!(result, Err(InstallmentError::InvalidPayment(_))));
    }
}

#[tokio::test]
async fn test_overdue_view() {
    let h = setup();
    let created = round_installment(&h, 12).await;

    // Nothing overdue yet
    assert!(h.allocator.overdue_schedules().await.unwrap().is_empty());

    // Jump past the third due date
    h.clock.set_today(date(2025, 11, 20));
    let overdue = h.allocator.overdue_schedules().await.unwrap();
    assert_eq!(overdue.len(), 4); // due 8/15, 9/15, 10/15, 11/15

    // A partially paid overdue schedule still shows up in the view
    h.allocator
        .add_payment(created.schedules[0].id, bdt(dec!(300)), h.agent, None)
        .await
        .unwrap();
    let overdue = h.allocator.overdue_schedules().await.unwrap();
    assert_eq!(overdue.len(), 4);
    assert_eq!(overdue[0].status, ScheduleStatus::PartiallyPaid);

    // Overdue does not block payment; the installment recovers
    h.allocator
        .advance_payment(created.schedules[0].id, bdt(dec!(11700)), h.agent, None)
        .await
        .unwrap();
    assert!(h.allocator.overdue_schedules().await.unwrap().is_empty());
    let installment = h.store.get_installment(created.installment.id).await.unwrap();
    assert_eq!(installment.status, InstallmentStatus::Completed);
}

#[tokio::test]
async fn test_partial_equals_add_for_exact_amount() {
    let h = setup();
    let a = round_installment(&h, 6).await;
    let b = round_installment(&h, 6).await;

    h.allocator
        .add_payment(a.schedules[0].id, bdt(dec!(1000)), h.agent, None)
        .await
        .unwrap();
    h.allocator
        .partial_payment(b.schedules[0].id, bdt(dec!(1000)), h.agent, None)
        .await
        .unwrap();

    let sa = h.store.get_schedule(a.schedules[0].id).await.unwrap();
    let sb = h.store.get_schedule(b.schedules[0].id).await.unwrap();
    assert_eq!(sa.status, sb.status);
    assert_eq!(sa.paid_amount, sb.paid_amount);
    assert_eq!(sa.remaining_amount, sb.remaining_amount);
    assert_eq!(sa.monthly_amount, sb.monthly_amount);

    let ia = h.store.get_installment(a.installment.id).await.unwrap();
    let ib = h.store.get_installment(b.installment.id).await.unwrap();
    assert_eq!(ia.total_remaining, ib.total_remaining);
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Random mixes of payment operations never break the remaining-sum
        /// invariant.
        #[test]
        fn invariant_survives_random_payments(amounts in prop::collection::vec((0u8..3, 1i64..300_000), 1..12)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let h = setup();
                let created = round_installment(&h, 6).await;

                for (op, minor) in amounts {
                    let schedules = h.store.schedules_for(created.installment.id).await.unwrap();
                    let target = schedules
                        .iter()
                        .find(|s| !s.is_settled())
                        .unwrap_or(&schedules[0])
                        .id;
                    let amount = Money::from_minor(minor, Currency::BDT);
                    let result = match op {
                        0 => h.allocator.add_payment(target, amount, h.agent, None).await,
                        1 => h.allocator.partial_payment(target, amount, h.agent, None).await,
                        _ => h.allocator.advance_payment(target, amount, h.agent, None).await,
                    };
                    result.unwrap();
                    assert_invariant(&h, created.installment.id).await;
                }
            });
        }
    }
}
