//! Fixture builders over the in-memory store adapters
//!
//! `TestDeployment` wires every domain service against fresh in-memory
//! stores sharing one pinned clock, the way the application layer wires them
//! against PostgreSQL.

use std::sync::Arc;

use chrono::NaiveDate;
use fake::faker::name::en::Name;
use fake::Fake;
use rust_decimal::Decimal;

use core_kernel::{Clock, Currency, FixedClock, Money, ShareholderId};
use domain_installment::{
    InMemoryInstallmentStore, InstallmentEngine, ScheduleAllocator,
};
use domain_shareholder::{
    EarningsDistributor, InMemoryShareholderStore, ShareTradeWorkflow, Shareholder,
    ShareholderStore, WithdrawalWorkflow,
};
use domain_treasury::{InMemoryTreasuryStore, TreasuryLedger};

/// The deployment currency used across fixtures
pub const TEST_CURRENCY: Currency = Currency::BDT;

/// Convenience constructor for fixture money
pub fn money(amount: Decimal) -> Money {
    Money::new(amount, TEST_CURRENCY)
}

/// Builder for seeded shareholders
pub struct TestShareholder {
    pub name: String,
    pub shares: u32,
    pub balance: Money,
}

impl Default for TestShareholder {
    fn default() -> Self {
        Self {
            name: Name().fake(),
            shares: 0,
            balance: Money::zero(TEST_CURRENCY),
        }
    }
}

impl TestShareholder {
    pub fn with_shares(mut self, shares: u32) -> Self {
        self.shares = shares;
        self
    }

    pub fn with_balance(mut self, balance: Money) -> Self {
        self.balance = balance;
        self
    }
}

/// Every domain service wired against in-memory stores and one pinned clock
pub struct TestDeployment {
    pub clock: Arc<FixedClock>,
    pub treasury_store: Arc<InMemoryTreasuryStore>,
    pub installment_store: Arc<InMemoryInstallmentStore>,
    pub shareholder_store: Arc<InMemoryShareholderStore>,
    pub ledger: TreasuryLedger,
    pub engine: InstallmentEngine,
    pub allocator: ScheduleAllocator,
    pub distributor: EarningsDistributor,
    pub withdrawals: WithdrawalWorkflow,
    pub trades: ShareTradeWorkflow,
}

impl TestDeployment {
    /// Creates a deployment with the clock pinned to `today`
    pub fn new(today: NaiveDate) -> Self {
        let clock = Arc::new(FixedClock::new(today));
        let treasury_store = Arc::new(InMemoryTreasuryStore::new(TEST_CURRENCY));
        let installment_store = Arc::new(InMemoryInstallmentStore::new());
        let shareholder_store = Arc::new(InMemoryShareholderStore::new());

        Self {
            ledger: TreasuryLedger::new(treasury_store.clone(), clock.clone()),
            engine: InstallmentEngine::new(installment_store.clone(), clock.clone()),
            allocator: ScheduleAllocator::new(installment_store.clone(), clock.clone()),
            distributor: EarningsDistributor::new(shareholder_store.clone(), clock.clone()),
            withdrawals: WithdrawalWorkflow::new(shareholder_store.clone(), clock.clone()),
            trades: ShareTradeWorkflow::new(shareholder_store.clone(), clock.clone()),
            clock,
            treasury_store,
            installment_store,
            shareholder_store,
        }
    }

    /// Seeds a shareholder and returns its id
    pub async fn seed_shareholder(&self, fixture: TestShareholder) -> ShareholderId {
        let mut shareholder = Shareholder::new(
            fixture.name,
            TEST_CURRENCY,
            self.clock.today(),
            self.clock.now(),
        );
        shareholder.total_share = fixture.shares;
        shareholder.current_balance = fixture.balance;
        self.shareholder_store
            .insert_shareholder(&shareholder)
            .await
            .expect("fixture shareholder insert");
        shareholder.id
    }
}
