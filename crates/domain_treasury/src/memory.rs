//! In-memory treasury store
//!
//! Mock adapter for tests and for running the core without PostgreSQL. It
//! honours the same version-check contract as the database adapter.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use core_kernel::{Currency, DomainPort, PortError};

use crate::balance::MainBalance;
use crate::entry::LedgerEntry;
use crate::ports::{EntryFilter, TreasuryStore};

struct State {
    balance: MainBalance,
    entries: Vec<LedgerEntry>,
}

/// Thread-safe in-memory implementation of [`TreasuryStore`]
pub struct InMemoryTreasuryStore {
    state: Mutex<State>,
}

impl InMemoryTreasuryStore {
    /// Creates an empty store with a zeroed balance
    pub fn new(currency: Currency) -> Self {
        Self {
            state: Mutex::new(State {
                balance: MainBalance::new(currency, Utc::now()),
                entries: Vec::new(),
            }),
        }
    }

    /// Number of history entries recorded so far
    pub fn entry_count(&self) -> usize {
        self.state.lock().expect("treasury store lock poisoned").entries.len()
    }
}

impl DomainPort for InMemoryTreasuryStore {}

#[async_trait]
impl TreasuryStore for InMemoryTreasuryStore {
    async fn load_balance(&self) -> Result<MainBalance, PortError> {
        let state = self.state.lock().expect("treasury store lock poisoned");
        Ok(state.balance.clone())
    }

    async fn commit_entry(
        &self,
        balance: &MainBalance,
        entry: &LedgerEntry,
        expected_version: u64,
    ) -> Result<(), PortError> {
        let mut state = self.state.lock().expect("treasury store lock poisoned");
        if state.balance.version != expected_version {
            return Err(PortError::conflict(format!(
                "main balance version is {}, expected {}",
                state.balance.version, expected_version
            )));
        }

        let mut committed = balance.clone();
        committed.version = expected_version + 1;
        state.balance = committed;
        state.entries.push(entry.clone());
        Ok(())
    }

    async fn list_entries(&self, filter: EntryFilter) -> Result<Vec<LedgerEntry>, PortError> {
        let state = self.state.lock().expect("treasury store lock poisoned");
        let mut entries: Vec<LedgerEntry> = state
            .entries
            .iter()
            .rev()
            .filter(|e| filter.kind.map_or(true, |kind| e.kind == kind))
            .filter(|e| {
                filter
                    .shareholder_id
                    .map_or(true, |id| e.shareholder_id == Some(id))
            })
            .cloned()
            .collect();

        if let Some(limit) = filter.limit {
            entries.truncate(limit as usize);
        }
        Ok(entries)
    }
}
