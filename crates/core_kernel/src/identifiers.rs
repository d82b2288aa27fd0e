//! Strongly-typed identifiers for domain entities
//!
//! Using newtype wrappers around UUIDs provides type safety and prevents
//! accidental mixing of different identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates a new time-ordered identifier (v7)
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Strip prefix if present
                let uuid_str = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(uuid_str)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

// Party identifiers
define_id!(ShareholderId, "SHH");
define_id!(MemberId, "MBR");
define_id!(AgentId, "AGT");

// Credit identifiers
define_id!(ProductId, "PRD");
define_id!(InstallmentId, "INS");
define_id!(ScheduleId, "SCH");
define_id!(PaymentTransactionId, "PTX");

// Treasury and distribution identifiers
define_id!(LedgerEntryId, "LGR");
define_id!(EarningId, "ERN");
define_id!(WithdrawalRequestId, "WDR");
define_id!(ShareTradeId, "STR");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installment_id_display() {
        let id = InstallmentId::new();
        let display = id.to_string();
        assert!(display.starts_with("INS-"));
    }

    #[test]
    fn test_id_parsing() {
        let original = ScheduleId::new();
        let parsed: ScheduleId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_uuid_conversion() {
        let uuid = Uuid::new_v4();
        let shareholder_id = ShareholderId::from(uuid);
        let back: Uuid = shareholder_id.into();
        assert_eq!(uuid, back);
    }
}
