//! Installment Domain - credit sales repaid month by month
//!
//! A member buys a product on credit; the engine derives the payable amount
//! (principal + interest + other cost − advance) and eagerly generates one
//! payment schedule per month. The allocator then absorbs payment events:
//! exact payments, partial payments that roll the shortfall forward, advance
//! payments that spill over into future months, and in-place edits that
//! reverse and reapply their delta.
//!
//! The allocator re-establishes one invariant after every mutation: the
//! installment's remaining total equals the sum of its schedules' remaining
//! amounts.

pub mod allocator;
pub mod engine;
pub mod error;
pub mod installment;
pub mod memory;
pub mod ports;
pub mod schedule;
pub mod transaction;

pub use allocator::{PaymentOutcome, ScheduleAllocator};
pub use engine::{CreatedInstallment, InstallmentEngine, InstallmentUpdate, NewInstallment};
pub use error::InstallmentError;
pub use installment::{Installment, InstallmentStatus, InstallmentTerms, MAX_INSTALLMENT_MONTHS};
pub use memory::InMemoryInstallmentStore;
pub use ports::InstallmentStore;
pub use schedule::{derive_status, PaymentSchedule, ScheduleStatus};
pub use transaction::{PaymentTransaction, PaymentType};
