//! Strongly-typed identifiers used across the catalog.
//!
//! Catalog rows are keyed by storage-generated positive integers. In desired-state
//! payloads the value `0` is reserved for "not created yet", which is why every
//! row id defaults to zero and exposes [`is_new`](OptionId::is_new).

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a product (the aggregate root that scopes every catalog row).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(i64);

/// Identifier of an option (a configurable axis such as "Color").
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionId(i64);

/// Identifier of an option value (e.g. "Red").
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionValueId(i64);

/// Identifier of a variant (one purchasable SKU).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(i64);

/// Identifier of a variant → option value link row.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantOptionId(i64);

macro_rules! impl_row_id {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Placeholder used by payloads for rows that do not exist yet.
            pub const NEW: Self = Self(0);

            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> i64 {
                self.0
            }

            /// `true` when the id is the "create this" placeholder.
            pub const fn is_new(self) -> bool {
                self.0 == 0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                if raw < 0 {
                    return Err(DomainError::invalid_id(format!(
                        "{}: must not be negative (got {raw})",
                        $name
                    )));
                }
                Ok(Self(raw))
            }
        }
    };
}

impl_row_id!(ProductId, "ProductId");
impl_row_id!(OptionId, "OptionId");
impl_row_id!(OptionValueId, "OptionValueId");
impl_row_id!(VariantId, "VariantId");
impl_row_id!(VariantOptionId, "VariantOptionId");

/// Identifier of one reconciliation run (log/trace correlation only).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReconcileId(Uuid);

impl ReconcileId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered) so runs sort by start time in logs.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReconcileId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ReconcileId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_the_new_placeholder() {
        assert!(OptionId::default().is_new());
        assert!(VariantId::NEW.is_new());
        assert!(!OptionValueId::new(7).is_new());
    }

    #[test]
    fn parses_positive_ids_and_rejects_negative_ones() {
        assert_eq!("42".parse::<ProductId>().unwrap(), ProductId::new(42));
        assert_eq!(" 3 ".parse::<VariantId>().unwrap().get(), 3);

        let err = "-1".parse::<OptionId>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(_)));

        let err = "abc".parse::<OptionValueId>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(msg) if msg.starts_with("OptionValueId")));
    }

    #[test]
    fn ids_serialize_as_bare_integers() {
        let json = serde_json::to_string(&OptionId::new(10)).unwrap();
        assert_eq!(json, "10");
        let back: OptionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OptionId::new(10));
    }

    #[test]
    fn reconcile_ids_are_unique() {
        assert_ne!(ReconcileId::new(), ReconcileId::new());
    }

    #[test]
    fn reconcile_id_wraps_its_uuid() {
        let uuid = Uuid::now_v7();
        let id = ReconcileId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), &uuid);
        assert_eq!(id.to_string(), uuid.to_string());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: every non-negative id survives Display → FromStr.
            #[test]
            fn display_then_parse_is_identity(raw in 0i64..=i64::MAX) {
                let id = VariantOptionId::new(raw);
                prop_assert_eq!(id.to_string().parse::<VariantOptionId>().unwrap(), id);
                prop_assert_eq!(raw.to_string().parse::<ProductId>().unwrap().get(), raw);
            }

            /// Property: negative ids never parse.
            #[test]
            fn negative_ids_are_rejected(raw in i64::MIN..0i64) {
                prop_assert!(raw.to_string().parse::<OptionId>().is_err());
            }
        }
    }
}
