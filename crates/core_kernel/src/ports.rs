//! Ports and Adapters Infrastructure
//!
//! This module provides the foundational types for implementing the hexagonal
//! architecture (ports and adapters) pattern across all domain modules.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Application Layer                        │
//! │        (controllers, schedulers — outside this repo)         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Domain Services                          │
//! │   (TreasuryLedger, InstallmentEngine, ScheduleAllocator,     │
//! │    EarningsDistributor, workflow services)                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Store Port Traits                       │
//! │   (TreasuryStore, InstallmentStore, ShareholderStore)        │
//! │   Defined in each domain, depend only on core_kernel         │
//! └─────────────────────────────────────────────────────────────┘
//!                    ▲                         ▲
//!                    │                         │
//!         ┌──────────┴────────┐     ┌─────────┴────────┐
//!         │  Internal Adapter │     │  Memory Adapter   │
//!         │   (PostgreSQL)    │     │   (tests, demos)  │
//!         └───────────────────┘     └───────────────────┘
//! ```
//!
//! Multi-record writes that must be atomic (balance + history, installment +
//! schedules + transactions, earning + shareholder) are exposed as single
//! commit-style port methods so an adapter can wrap them in one database
//! transaction. Commit methods take the expected row version of the mutable
//! aggregate and fail with [`PortError::Conflict`] when a concurrent writer
//! got there first.

use std::fmt;
use thiserror::Error;

/// Error type for store port operations
///
/// Provides a unified error type that all port implementations must use,
/// ensuring consistent error handling across adapters.
#[derive(Debug, Error)]
pub enum PortError {
    /// The requested entity was not found
    #[error("Not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    /// Malformed or out-of-range input; never retried
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Valid input that violates a business precondition; never retried
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// A concurrent mutation was detected via the row version
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// A store or infrastructure failure; no business detail leaked
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PortError {
    /// Creates a NotFound error
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Creates an InvalidArgument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        PortError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an InvalidState error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        PortError::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a Conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict {
            message: message.into(),
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an Internal error wrapping an underlying cause
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        PortError::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if retrying the operation may succeed
    ///
    /// Only concurrent-mutation conflicts qualify; validation and state
    /// errors are deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PortError::Conflict { .. })
    }

    /// Returns true if this error indicates the entity was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }
}

/// Marker trait for all domain store ports
///
/// All port traits should extend this marker to ensure they are
/// thread-safe and can be used in async contexts.
pub trait DomainPort: Send + Sync + 'static {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_error_not_found() {
        let error = PortError::not_found("Installment", "INS-123");
        assert!(error.is_not_found());
        assert!(!error.is_retryable());
        assert!(error.to_string().contains("Installment"));
        assert!(error.to_string().contains("INS-123"));
    }

    #[test]
    fn test_only_conflict_is_retryable() {
        assert!(PortError::conflict("version mismatch").is_retryable());
        assert!(!PortError::invalid_argument("negative amount").is_retryable());
        assert!(!PortError::invalid_state("inactive shareholder").is_retryable());
        assert!(!PortError::internal("connection reset").is_retryable());
    }
}
