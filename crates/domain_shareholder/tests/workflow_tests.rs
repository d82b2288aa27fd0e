//! Tests for the withdrawal and share-trade workflows

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use core_kernel::{Currency, FixedClock, Money, ShareholderId};
use domain_shareholder::{
    InMemoryShareholderStore, ShareTradeWorkflow, Shareholder, ShareholderError,
    ShareholderStatus, ShareholderStore, TradeQuery, TradeStatus, WithdrawalQuery,
    WithdrawalStatus, WithdrawalWorkflow,
};

fn bdt(amount: rust_decimal::Decimal) -> Money {
    Money::new(amount, Currency::BDT)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

struct Harness {
    withdrawals: WithdrawalWorkflow,
    trades: ShareTradeWorkflow,
    store: Arc<InMemoryShareholderStore>,
}

fn setup() -> Harness {
    let store = Arc::new(InMemoryShareholderStore::new());
    let clock = Arc::new(FixedClock::new(date(2025, 7, 15)));
    Harness {
        withdrawals: WithdrawalWorkflow::new(store.clone(), clock.clone()),
        trades: ShareTradeWorkflow::new(store.clone(), clock),
        store,
    }
}

async fn add_shareholder(h: &Harness, balance: rust_decimal::Decimal, shares: u32) -> ShareholderId {
    let mut shareholder = Shareholder::new(
        "Karim Miah",
        Currency::BDT,
        date(2024, 1, 1),
        chrono::Utc::now(),
    );
    shareholder.current_balance = bdt(balance);
    shareholder.total_share = shares;
    h.store.insert_shareholder(&shareholder).await.unwrap();
    shareholder.id
}

// ============================================================================
// Withdrawal workflow
// ============================================================================

#[tokio::test]
async fn test_withdrawal_request_validation() {
    let h = setup();
    let id = add_shareholder(&h, dec!(1000), 10).await;

    // Non-positive amount
    let zero = h.withdrawals.request_withdrawal(id, bdt(dec!(0)), None).await;
    assert!(matches!(zero, Err(ShareholderError::InvalidArgument(_))));

    // More than the balance
    let too_much = h
        .withdrawals
        .request_withdrawal(id, bdt(dec!(1500)), None)
        .await;
    assert!(matches!(
        too_much,
        Err(ShareholderError::InsufficientBalance { .. })
    ));

    // Inactive shareholder
    let mut shareholder = h.store.get_shareholder(id).await.unwrap();
    let version = shareholder.version;
    shareholder.status = ShareholderStatus::Inactive;
    h.store.update_shareholder(&shareholder, version).await.unwrap();
    let inactive = h
        .withdrawals
        .request_withdrawal(id, bdt(dec!(100)), None)
        .await;
    assert!(matches!(
        inactive,
        Err(ShareholderError::InactiveShareholder(_))
    ));
}

#[tokio::test]
async fn test_pending_requests_count_against_balance() {
    let h = setup();
    let id = add_shareholder(&h, dec!(1000), 10).await;

    h.withdrawals
        .request_withdrawal(id, bdt(dec!(600)), None)
        .await
        .unwrap();

    // 600 pending + 500 requested > 1000 available
    let over = h
        .withdrawals
        .request_withdrawal(id, bdt(dec!(500)), None)
        .await;
    assert!(matches!(
        over,
        Err(ShareholderError::InsufficientBalance { .. })
    ));

    // 400 still fits
    h.withdrawals
        .request_withdrawal(id, bdt(dec!(400)), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_withdrawal_lifecycle() {
    let h = setup();
    let id = add_shareholder(&h, dec!(1000), 10).await;

    let request = h
        .withdrawals
        .request_withdrawal(id, bdt(dec!(600)), Some("school fees".into()))
        .await
        .unwrap();
    assert_eq!(request.status, WithdrawalStatus::Pending);

    // Nothing deducted at request time
    let shareholder = h.store.get_shareholder(id).await.unwrap();
    assert_eq!(shareholder.current_balance, bdt(dec!(1000)));

    let approved = h.withdrawals.approve(request.id, "admin").await.unwrap();
    assert_eq!(approved.status, WithdrawalStatus::Approved);
    assert_eq!(approved.processed_by.as_deref(), Some("admin"));

    // Deducted at approval
    let shareholder = h.store.get_shareholder(id).await.unwrap();
    assert_eq!(shareholder.current_balance, bdt(dec!(400)));

    // Approve is not repeatable
    let again = h.withdrawals.approve(request.id, "admin").await;
    assert!(matches!(again, Err(ShareholderError::InvalidTransition(_))));

    let processed = h
        .withdrawals
        .mark_processed(request.id, "cashier")
        .await
        .unwrap();
    assert_eq!(processed.status, WithdrawalStatus::Processed);
}

#[tokio::test]
async fn test_approval_revalidates_balance() {
    let h = setup();
    let id = add_shareholder(&h, dec!(1000), 10).await;

    let request = h
        .withdrawals
        .request_withdrawal(id, bdt(dec!(800)), None)
        .await
        .unwrap();

    // Balance drops between request and approval
    let mut shareholder = h.store.get_shareholder(id).await.unwrap();
    let version = shareholder.version;
    shareholder
        .deduct_balance(bdt(dec!(500)), chrono::Utc::now())
        .unwrap();
    h.store.update_shareholder(&shareholder, version).await.unwrap();

    let result = h.withdrawals.approve(request.id, "admin").await;
    assert!(matches!(
        result,
        Err(ShareholderError::InsufficientBalance { .. })
    ));

    // Request stays pending; nothing further deducted
    let request = h
        .withdrawals
        .requests(WithdrawalQuery::by_shareholder(id))
        .await
        .unwrap()
        .remove(0);
    assert_eq!(request.status, WithdrawalStatus::Pending);
    let shareholder = h.store.get_shareholder(id).await.unwrap();
    assert_eq!(shareholder.current_balance, bdt(dec!(500)));
}

#[tokio::test]
async fn test_reject_and_cancel() {
    let h = setup();
    let id = add_shareholder(&h, dec!(1000), 10).await;

    let request = h
        .withdrawals
        .request_withdrawal(id, bdt(dec!(100)), None)
        .await
        .unwrap();

    // Rejection requires a reason and an audit identity
    assert!(h.withdrawals.reject(request.id, "", "reason").await.is_err());
    assert!(h.withdrawals.reject(request.id, "admin", "  ").await.is_err());

    let rejected = h
        .withdrawals
        .reject(request.id, "admin", "documents missing")
        .await
        .unwrap();
    assert_eq!(rejected.status, WithdrawalStatus::Rejected);
    assert_eq!(
        rejected.rejection_reason.as_deref(),
        Some("documents missing")
    );

    // Only pending requests can be cancelled
    let cancel_rejected = h.withdrawals.cancel(request.id, None).await;
    assert!(matches!(
        cancel_rejected,
        Err(ShareholderError::InvalidTransition(_))
    ));

    let other = h
        .withdrawals
        .request_withdrawal(id, bdt(dec!(100)), None)
        .await
        .unwrap();
    let cancelled = h.withdrawals.cancel(other.id, None).await.unwrap();
    assert_eq!(cancelled.status, WithdrawalStatus::Cancelled);
}

#[tokio::test]
async fn test_withdrawal_statistics() {
    let h = setup();
    let id = add_shareholder(&h, dec!(10000), 10).await;

    let a = h.withdrawals.request_withdrawal(id, bdt(dec!(1000)), None).await.unwrap();
    let b = h.withdrawals.request_withdrawal(id, bdt(dec!(2000)), None).await.unwrap();
    let c = h.withdrawals.request_withdrawal(id, bdt(dec!(3000)), None).await.unwrap();
    h.withdrawals.approve(a.id, "admin").await.unwrap();
    let approved_b = h.withdrawals.approve(b.id, "admin").await.unwrap();
    h.withdrawals.mark_processed(approved_b.id, "admin").await.unwrap();
    h.withdrawals.cancel(c.id, None).await.unwrap();

    let stats = h.withdrawals.statistics(Some(id)).await.unwrap();
    assert_eq!(stats.total_requests, 3);
    assert_eq!(stats.total_amount_withdrawn, bdt(dec!(3000)));
    assert_eq!(stats.approved_count, 1);
    assert_eq!(stats.processed_count, 1);
    assert_eq!(stats.cancelled_count, 1);
    assert_eq!(stats.pending_count, 0);
}

// ============================================================================
// Share trade workflow
// ============================================================================

#[tokio::test]
async fn test_trade_request_validation() {
    let h = setup();
    let id = add_shareholder(&h, dec!(0), 50).await;

    let zero_quantity = h.trades.request_buy(id, 0, bdt(dec!(100)), None).await;
    assert!(matches!(
        zero_quantity,
        Err(ShareholderError::InvalidArgument(_))
    ));

    let zero_price = h.trades.request_buy(id, 10, bdt(dec!(0)), None).await;
    assert!(matches!(zero_price, Err(ShareholderError::InvalidArgument(_))));

    // Selling more than held fails at request time
    let oversell = h.trades.request_sell(id, 60, bdt(dec!(100)), None).await;
    assert!(matches!(
        oversell,
        Err(ShareholderError::InsufficientShares { .. })
    ));
}

#[tokio::test]
async fn test_buy_applies_at_completion_only() {
    let h = setup();
    let id = add_shareholder(&h, dec!(0), 0).await;

    let trade = h
        .trades
        .request_buy(id, 40, bdt(dec!(250)), None)
        .await
        .unwrap();
    assert_eq!(trade.total_amount, bdt(dec!(10000)));

    // Nothing applied while pending
    let shareholder = h.store.get_shareholder(id).await.unwrap();
    assert_eq!(shareholder.total_share, 0);

    let completed = h.trades.complete(trade.id, "admin").await.unwrap();
    assert_eq!(completed.status, TradeStatus::Completed);

    let shareholder = h.store.get_shareholder(id).await.unwrap();
    assert_eq!(shareholder.total_share, 40);
    assert_eq!(shareholder.investment, bdt(dec!(10000)));

    // Completion is not repeatable
    let again = h.trades.complete(trade.id, "admin").await;
    assert!(matches!(again, Err(ShareholderError::InvalidTransition(_))));
}

#[tokio::test]
async fn test_sell_rechecks_shares_at_completion() {
    let h = setup();
    let id = add_shareholder(&h, dec!(0), 100).await;

    // Two competing sales of the same holding
    let first = h.trades.request_sell(id, 70, bdt(dec!(100)), None).await.unwrap();
    let second = h.trades.request_sell(id, 70, bdt(dec!(100)), None).await.unwrap();

    h.trades.complete(first.id, "admin").await.unwrap();

    let conflict = h.trades.complete(second.id, "admin").await;
    assert!(matches!(
        conflict,
        Err(ShareholderError::InsufficientShares { .. })
    ));

    let shareholder = h.store.get_shareholder(id).await.unwrap();
    assert_eq!(shareholder.total_share, 30);
    assert_eq!(shareholder.current_balance, bdt(dec!(7000)));
}

#[tokio::test]
async fn test_sell_completion_effects() {
    let h = setup();
    let id = add_shareholder(&h, dec!(0), 0).await;

    let buy = h.trades.request_buy(id, 100, bdt(dec!(100)), None).await.unwrap();
    h.trades.complete(buy.id, "admin").await.unwrap();

    let sell = h.trades.request_sell(id, 25, bdt(dec!(120)), None).await.unwrap();
    h.trades.complete(sell.id, "admin").await.unwrap();

    let shareholder = h.store.get_shareholder(id).await.unwrap();
    assert_eq!(shareholder.total_share, 75);
    assert_eq!(shareholder.current_balance, bdt(dec!(3000)));
    // Investment reduced by the sold fraction of 10000
    assert_eq!(shareholder.investment, bdt(dec!(7500)));
}

#[tokio::test]
async fn test_trade_cancel_and_statistics() {
    let h = setup();
    let id = add_shareholder(&h, dec!(0), 50).await;

    let buy = h.trades.request_buy(id, 10, bdt(dec!(100)), Some("topping up".into())).await.unwrap();
    h.trades.complete(buy.id, "admin").await.unwrap();

    let sell = h.trades.request_sell(id, 5, bdt(dec!(150)), None).await.unwrap();
    h.trades.complete(sell.id, "admin").await.unwrap();

    let cancelled = h.trades.request_buy(id, 99, bdt(dec!(1)), None).await.unwrap();
    let cancelled = h.trades.cancel(cancelled.id, Some("fat finger".into())).await.unwrap();
    assert!(cancelled.notes.contains("Cancelled: fat finger"));

    let stats = h.trades.statistics(Some(id)).await.unwrap();
    assert_eq!(stats.total_trades, 3);
    assert_eq!(stats.completed_count, 2);
    assert_eq!(stats.cancelled_count, 1);
    assert_eq!(stats.shares_bought, 10);
    assert_eq!(stats.shares_sold, 5);
    assert_eq!(stats.amount_invested, bdt(dec!(1000)));
    assert_eq!(stats.amount_received, bdt(dec!(750)));

    let pending = h.trades.trades(TradeQuery::by_status(TradeStatus::Pending)).await.unwrap();
    assert!(pending.is_empty());
}
