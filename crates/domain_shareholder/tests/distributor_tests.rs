//! Tests for the earnings distributor

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use core_kernel::{Currency, FixedClock, Money, ShareholderId, YearMonth};
use domain_shareholder::{
    EarningsDistributor, InMemoryShareholderStore, Shareholder, ShareholderError,
    ShareholderStatus, ShareholderStore,
};

fn bdt(amount: rust_decimal::Decimal) -> Money {
    Money::new(amount, Currency::BDT)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn ym(y: i32, m: u32) -> YearMonth {
    YearMonth::new(y, m).unwrap()
}

struct Harness {
    distributor: EarningsDistributor,
    store: Arc<InMemoryShareholderStore>,
    clock: Arc<FixedClock>,
}

fn setup() -> Harness {
    let store = Arc::new(InMemoryShareholderStore::new());
    let clock = Arc::new(FixedClock::new(date(2025, 7, 15)));
    Harness {
        distributor: EarningsDistributor::new(store.clone(), clock.clone()),
        store,
        clock,
    }
}

async fn add_shareholder(h: &Harness, name: &str, shares: u32) -> ShareholderId {
    let mut shareholder = Shareholder::new(
        name,
        Currency::BDT,
        date(2024, 1, 1),
        chrono::Utc::now(),
    );
    shareholder.total_share = shares;
    h.store.insert_shareholder(&shareholder).await.unwrap();
    shareholder.id
}

#[tokio::test]
async fn test_proportional_distribution() {
    let h = setup();
    let a = add_shareholder(&h, "Karim", 30).await;
    let b = add_shareholder(&h, "Rahim", 70).await;

    let outcome = h
        .distributor
        .calculate_all_shareholders_earnings(bdt(dec!(100000)), false)
        .await
        .unwrap();

    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.earnings.len(), 2);

    // Pool = 100000 × 15%/12 = 1250, split 30/70
    let earning_a = h.store.get_shareholder(a).await.unwrap();
    let earning_b = h.store.get_shareholder(b).await.unwrap();
    assert_eq!(earning_a.total_earning, bdt(dec!(375)));
    assert_eq!(earning_b.total_earning, bdt(dec!(875)));
    assert_eq!(earning_a.current_balance, bdt(dec!(375)));

    let total: Money = outcome
        .earnings
        .iter()
        .fold(Money::zero(Currency::BDT), |acc, e| acc + e.monthly_earning);
    assert_eq!(total, bdt(dec!(1250)));
}

#[tokio::test]
async fn test_conservation_bound() {
    let h = setup();
    add_shareholder(&h, "A", 13).await;
    add_shareholder(&h, "B", 29).await;
    add_shareholder(&h, "C", 58).await;

    let profit = bdt(dec!(77777));
    let outcome = h
        .distributor
        .calculate_all_shareholders_earnings(profit, false)
        .await
        .unwrap();

    let pool = profit.multiply(dec!(0.0125));
    let distributed = outcome
        .earnings
        .iter()
        .fold(Money::zero(Currency::BDT), |acc, e| acc + e.monthly_earning);
    assert!(distributed <= pool);
}

#[tokio::test]
async fn test_idempotent_within_a_month() {
    let h = setup();
    let id = add_shareholder(&h, "Karim", 100).await;

    let first = h
        .distributor
        .calculate_monthly_earnings(id, bdt(dec!(100000)), false)
        .await
        .unwrap();
    // Second call with different profit returns the cached row untouched
    let second = h
        .distributor
        .calculate_monthly_earnings(id, bdt(dec!(999999)), false)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.monthly_earning, second.monthly_earning);

    // Balances applied exactly once
    let shareholder = h.store.get_shareholder(id).await.unwrap();
    assert_eq!(shareholder.total_earning, bdt(dec!(1250)));
    assert_eq!(shareholder.current_balance, bdt(dec!(1250)));
}

#[tokio::test]
async fn test_forced_recalculation_applies_delta() {
    let h = setup();
    let id = add_shareholder(&h, "Karim", 100).await;

    h.distributor
        .calculate_monthly_earnings(id, bdt(dec!(100000)), false)
        .await
        .unwrap();
    let recalculated = h
        .distributor
        .calculate_monthly_earnings(id, bdt(dec!(200000)), true)
        .await
        .unwrap();

    assert_eq!(recalculated.monthly_earning, bdt(dec!(2500)));
    assert!(recalculated.description.contains("Recalculated"));

    // Delta (2500 − 1250), not a second full credit
    let shareholder = h.store.get_shareholder(id).await.unwrap();
    assert_eq!(shareholder.total_earning, bdt(dec!(2500)));
    assert_eq!(shareholder.current_balance, bdt(dec!(2500)));
}

#[tokio::test]
async fn test_preconditions() {
    let h = setup();
    let id = add_shareholder(&h, "Karim", 0).await;

    // Negative profit
    let negative = h
        .distributor
        .calculate_monthly_earnings(id, bdt(dec!(-1)), false)
        .await;
    assert!(matches!(negative, Err(ShareholderError::InvalidArgument(_))));

    // No shares anywhere in the system
    let no_shares = h
        .distributor
        .calculate_monthly_earnings(id, bdt(dec!(1000)), false)
        .await;
    assert!(matches!(no_shares, Err(ShareholderError::NoShares)));

    // Inactive shareholder
    let mut shareholder = h.store.get_shareholder(id).await.unwrap();
    let version = shareholder.version;
    shareholder.status = ShareholderStatus::Inactive;
    shareholder.total_share = 10;
    h.store.update_shareholder(&shareholder, version).await.unwrap();

    let inactive = h
        .distributor
        .calculate_monthly_earnings(id, bdt(dec!(1000)), false)
        .await;
    assert!(matches!(
        inactive,
        Err(ShareholderError::InactiveShareholder(_))
    ));

    // Unknown shareholder
    let missing = h
        .distributor
        .calculate_monthly_earnings(ShareholderId::new_v7(), bdt(dec!(1000)), false)
        .await;
    assert!(missing.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_batch_collects_partial_failures() {
    let h = setup();
    // Nobody holds shares, so every member of the batch fails individually
    add_shareholder(&h, "A", 0).await;
    add_shareholder(&h, "B", 0).await;

    let outcome = h
        .distributor
        .calculate_all_shareholders_earnings(bdt(dec!(100000)), false)
        .await
        .unwrap();

    assert!(outcome.earnings.is_empty());
    assert_eq!(outcome.failures.len(), 2);

    // An empty system is an error rather than an empty outcome
    let empty = EarningsDistributor::new(
        Arc::new(InMemoryShareholderStore::new()),
        h.clock.clone(),
    )
    .calculate_all_shareholders_earnings(bdt(dec!(100000)), false)
    .await;
    assert!(matches!(empty, Err(ShareholderError::NoActiveShareholders)));
}

#[tokio::test]
async fn test_recalculate_month() {
    let h = setup();
    let a = add_shareholder(&h, "A", 50).await;
    let b = add_shareholder(&h, "B", 50).await;

    // A has a stale value for June; B has nothing
    h.distributor
        .add_historical_earning(a, ym(2025, 6), bdt(dec!(100)), None)
        .await
        .unwrap();

    let rows = h
        .distributor
        .recalculate_month_earnings(ym(2025, 6), bdt(dec!(100000)))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);

    // Both end at 625; A's balance reflects the delta over the stale 100
    let sh_a = h.store.get_shareholder(a).await.unwrap();
    let sh_b = h.store.get_shareholder(b).await.unwrap();
    assert_eq!(sh_a.total_earning, bdt(dec!(625)));
    assert_eq!(sh_b.total_earning, bdt(dec!(625)));

    // Future months are refused
    let future = h
        .distributor
        .recalculate_month_earnings(ym(2025, 8), bdt(dec!(100000)))
        .await;
    assert!(matches!(future, Err(ShareholderError::FutureMonth(_))));
}

#[tokio::test]
async fn test_add_historical_earning() {
    let h = setup();
    let id = add_shareholder(&h, "Karim", 10).await;

    let earning = h
        .distributor
        .add_historical_earning(id, ym(2025, 3), bdt(dec!(420)), Some("ledger import".into()))
        .await
        .unwrap();
    assert_eq!(earning.description, "ledger import");

    let shareholder = h.store.get_shareholder(id).await.unwrap();
    assert_eq!(shareholder.current_balance, bdt(dec!(420)));

    // Duplicate month is refused
    let duplicate = h
        .distributor
        .add_historical_earning(id, ym(2025, 3), bdt(dec!(1)), None)
        .await;
    assert!(matches!(duplicate, Err(ShareholderError::EarningExists { .. })));

    // Future month is refused
    let future = h
        .distributor
        .add_historical_earning(id, ym(2026, 1), bdt(dec!(1)), None)
        .await;
    assert!(matches!(future, Err(ShareholderError::FutureMonth(_))));
}

#[tokio::test]
async fn test_summary_and_trailing_series() {
    let h = setup();
    let id = add_shareholder(&h, "Karim", 10).await;

    h.distributor
        .add_historical_earning(id, ym(2025, 5), bdt(dec!(100)), None)
        .await
        .unwrap();
    h.distributor
        .add_historical_earning(id, ym(2025, 6), bdt(dec!(200)), None)
        .await
        .unwrap();

    let summary = h.distributor.earning_summary(id).await.unwrap();
    assert_eq!(summary.total_earnings, bdt(dec!(300)));
    assert_eq!(summary.average_monthly_earning, bdt(dec!(150)));
    assert_eq!(summary.total_months, 2);
    assert_eq!(summary.last_earning_month, Some(ym(2025, 6)));

    let series = h.distributor.last_12_months_earnings(id).await.unwrap();
    assert_eq!(series.len(), 12);
    assert_eq!(series[0].month, ym(2024, 8));
    assert_eq!(series[11].month, ym(2025, 7));
    assert!(!series[11].calculated);
    let may = series.iter().find(|p| p.month == ym(2025, 5)).unwrap();
    assert!(may.calculated);
    assert_eq!(may.earning, bdt(dec!(100)));

    // A fresh shareholder has an all-zero summary
    let other = add_shareholder(&h, "Fresh", 1).await;
    let empty = h.distributor.earning_summary(other).await.unwrap();
    assert_eq!(empty.total_months, 0);
    assert!(empty.average_monthly_earning.is_zero());
    assert!(empty.last_earning_month.is_none());
}
