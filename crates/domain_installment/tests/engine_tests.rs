//! Tests for the installment engine

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use core_kernel::{AgentId, Currency, FixedClock, MemberId, Money, ProductId, Rate};
use domain_installment::{
    InMemoryInstallmentStore, InstallmentEngine, InstallmentError, InstallmentStatus,
    InstallmentUpdate, NewInstallment, ScheduleStatus,
};

fn bdt(amount: rust_decimal::Decimal) -> Money {
    Money::new(amount, Currency::BDT)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn setup() -> (InstallmentEngine, Arc<InMemoryInstallmentStore>, Arc<FixedClock>) {
    let store = Arc::new(InMemoryInstallmentStore::new());
    let clock = Arc::new(FixedClock::new(date(2025, 7, 15)));
    (
        InstallmentEngine::new(store.clone(), clock.clone()),
        store,
        clock,
    )
}

fn new_installment(total: rust_decimal::Decimal, months: u32) -> NewInstallment {
    NewInstallment {
        product_id: ProductId::new_v7(),
        member_id: MemberId::new_v7(),
        agent_id: AgentId::new_v7(),
        total_amount: bdt(total),
        other_cost: bdt(dec!(500)),
        advance_paid: bdt(dec!(5000)),
        months,
        interest_rate: Some(Rate::from_percentage(dec!(15))),
    }
}

#[tokio::test]
async fn test_creation_derives_amounts_and_generates_schedules() {
    let (engine, _, _) = setup();

    let created = engine
        .create_installment(new_installment(dec!(50000), 12))
        .await
        .unwrap();
    let installment = &created.installment;

    assert_eq!(installment.total_with_interest, bdt(dec!(57500)));
    assert_eq!(installment.payable_amount, bdt(dec!(53000)));
    assert_eq!(installment.monthly_amount.amount().round_dp(2), dec!(4416.67));
    assert_eq!(installment.status, InstallmentStatus::Active);

    // One pending schedule per month, ascending due dates starting next month
    assert_eq!(created.schedules.len(), 12);
    assert_eq!(created.schedules[0].due_date, date(2025, 8, 15));
    assert_eq!(created.schedules[11].due_date, date(2026, 7, 15));
    for window in created.schedules.windows(2) {
        assert!(window[0].due_date < window[1].due_date);
    }
    for schedule in &created.schedules {
        assert_eq!(schedule.status, ScheduleStatus::Pending);
        assert_eq!(schedule.monthly_amount, installment.monthly_amount);
        assert_eq!(schedule.collecting_agent, installment.agent_id);
    }

    // The remaining total is the schedule sum
    let sum = created
        .schedules
        .iter()
        .fold(Money::zero(Currency::BDT), |acc, s| acc + s.remaining_amount);
    assert_eq!(installment.total_remaining, sum);
}

#[tokio::test]
async fn test_interest_defaults_to_fifteen_percent() {
    let (engine, _, _) = setup();

    let mut new = new_installment(dec!(10000), 10);
    new.interest_rate = None;
    new.other_cost = bdt(dec!(0));
    new.advance_paid = bdt(dec!(0));

    let created = engine.create_installment(new).await.unwrap();
    assert_eq!(created.installment.total_with_interest, bdt(dec!(11500)));
}

#[tokio::test]
async fn test_creation_validation() {
    let (engine, _, _) = setup();

    let mut negative = new_installment(dec!(-1), 12);
    negative.advance_paid = bdt(dec!(0));
    assert!(matches!(
        engine.create_installment(negative).await,
        Err(InstallmentError::InvalidTerms(_))
    ));

    assert!(engine
        .create_installment(new_installment(dec!(50000), 0))
        .await
        .is_err());
    assert!(engine
        .create_installment(new_installment(dec!(50000), 61))
        .await
        .is_err());

    let mut bad_rate = new_installment(dec!(50000), 12);
    bad_rate.interest_rate = Some(Rate::from_percentage(dec!(101)));
    assert!(engine.create_installment(bad_rate).await.is_err());
}

#[tokio::test]
async fn test_update_rederives_but_leaves_schedules_alone() {
    let (engine, store, _) = setup();
    let created = engine
        .create_installment(new_installment(dec!(50000), 12))
        .await
        .unwrap();
    let id = created.installment.id;

    let updated = engine
        .update_installment(
            id,
            InstallmentUpdate {
                other_cost: Some(bdt(dec!(1500))),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.payable_amount, bdt(dec!(54000)));
    assert_eq!(updated.monthly_amount, bdt(dec!(4500)));

    // Schedules keep their original monthly amounts
    let schedules = store_schedules(&store, id).await;
    assert_eq!(schedules.len(), 12);
    assert_eq!(
        schedules[0].monthly_amount,
        created.schedules[0].monthly_amount
    );
}

#[tokio::test]
async fn test_update_rejects_month_changes() {
    let (engine, _, _) = setup();
    let created = engine
        .create_installment(new_installment(dec!(50000), 12))
        .await
        .unwrap();

    let result = engine
        .update_installment(
            created.installment.id,
            InstallmentUpdate {
                months: Some(18),
                ..Default::default()
            },
        )
        .await;

    assert!(matches!(result, Err(InstallmentError::InvalidTerms(_))));
}

#[tokio::test]
async fn test_extend_schedule_appends_months() {
    let (engine, store, _) = setup();
    let created = engine
        .create_installment(new_installment(dec!(50000), 12))
        .await
        .unwrap();
    let id = created.installment.id;

    let extended = engine.extend_schedule(id, 2).await.unwrap();

    assert_eq!(extended.installment.terms.months, 14);
    assert_eq!(extended.schedules.len(), 2);
    assert_eq!(extended.schedules[0].due_date, date(2026, 8, 15));
    assert_eq!(extended.schedules[1].due_date, date(2026, 9, 15));

    let schedules = store_schedules(&store, id).await;
    assert_eq!(schedules.len(), 14);

    let sum = schedules
        .iter()
        .fold(Money::zero(Currency::BDT), |acc, s| acc + s.remaining_amount);
    assert_eq!(extended.installment.total_remaining, sum);

    assert!(matches!(
        engine.extend_schedule(id, 0).await,
        Err(InstallmentError::InvalidTerms(_))
    ));
}

#[tokio::test]
async fn test_delete_cascades() {
    let (engine, store, _) = setup();
    let created = engine
        .create_installment(new_installment(dec!(50000), 12))
        .await
        .unwrap();
    let id = created.installment.id;

    engine.delete_installment(id).await.unwrap();

    assert!(engine.get_installment(id).await.unwrap_err().is_not_found());
    assert!(store_schedules(&store, id).await.is_empty());
}

async fn store_schedules(
    store: &Arc<InMemoryInstallmentStore>,
    id: core_kernel::InstallmentId,
) -> Vec<domain_installment::PaymentSchedule> {
    use domain_installment::InstallmentStore as _;
    store.schedules_for(id).await.unwrap()
}
