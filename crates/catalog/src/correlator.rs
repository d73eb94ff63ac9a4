//! Name/position → id index for one reconciliation.
//!
//! Rows created during a reconciliation only get ids when storage returns them,
//! yet later inserts (values of a new option, links of a new variant) must
//! reference those ids. The correlator bridges the gap: it is seeded with the ids
//! of surviving rows, filled with generated ids as inserts complete, and thrown
//! away when the reconciliation ends. It is an index, never a source of truth.

use std::collections::HashMap;

use forgecat_core::{DomainError, DomainResult, OptionId, OptionValueId, VariantId};

use crate::desired::{OptionRef, ValueRef};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correlator {
    options: HashMap<String, OptionId>,
    values: HashMap<(OptionId, String), OptionValueId>,
    variants: HashMap<i32, VariantId>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an option under its (desired) name.
    ///
    /// Registering a name twice with different ids is an integrity failure: the
    /// name would no longer identify a single option.
    pub fn register_option(&mut self, name: &str, id: OptionId) -> DomainResult<()> {
        match self.options.get(name) {
            Some(existing) if *existing != id => Err(DomainError::integrity(format!(
                "option name '{name}' maps to both #{existing} and #{id}"
            ))),
            _ => {
                self.options.insert(name.to_string(), id);
                Ok(())
            }
        }
    }

    pub fn register_value(&mut self, option_id: OptionId, name: &str, id: OptionValueId) -> DomainResult<()> {
        let key = (option_id, name.to_string());
        match self.values.get(&key) {
            Some(existing) if *existing != id => Err(DomainError::integrity(format!(
                "value name '{name}' of option #{option_id} maps to both #{existing} and #{id}"
            ))),
            _ => {
                self.values.insert(key, id);
                Ok(())
            }
        }
    }

    /// Register a variant created from the request entry at `position`.
    pub fn register_variant(&mut self, position: i32, id: VariantId) -> DomainResult<()> {
        match self.variants.get(&position) {
            Some(existing) if *existing != id => Err(DomainError::integrity(format!(
                "variant position {position} maps to both #{existing} and #{id}"
            ))),
            _ => {
                self.variants.insert(position, id);
                Ok(())
            }
        }
    }

    pub fn option_id(&self, name: &str) -> Option<OptionId> {
        self.options.get(name).copied()
    }

    pub fn value_id(&self, option_id: OptionId, name: &str) -> Option<OptionValueId> {
        self.values.get(&(option_id, name.to_string())).copied()
    }

    pub fn variant_id(&self, position: i32) -> Option<VariantId> {
        self.variants.get(&position).copied()
    }

    /// Resolve an option reference: ids pass through, names are looked up.
    pub fn resolve_option(&self, option: &OptionRef) -> DomainResult<OptionId> {
        match option {
            OptionRef::Id(id) => Ok(*id),
            OptionRef::Name(name) => self
                .option_id(name)
                .ok_or_else(|| DomainError::reference(format!("no option named '{name}'"))),
        }
    }

    /// Resolve a value reference within an already-resolved option.
    pub fn resolve_value(&self, option_id: OptionId, value: &ValueRef) -> DomainResult<OptionValueId> {
        match value {
            ValueRef::Id(id) => Ok(*id),
            ValueRef::Name(name) => self.value_id(option_id, name).ok_or_else(|| {
                DomainError::reference(format!("option #{option_id} has no value named '{name}'"))
            }),
        }
    }

    pub fn resolve_variant(&self, position: i32) -> DomainResult<VariantId> {
        self.variant_id(position).ok_or_else(|| {
            DomainError::reference(format!("no variant was created for position {position}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_names_registered_for_new_rows() {
        let mut c = Correlator::new();
        c.register_option("Color", OptionId::new(1)).unwrap();
        c.register_value(OptionId::new(1), "Red", OptionValueId::new(11)).unwrap();
        c.register_variant(0, VariantId::new(21)).unwrap();

        let option = c.resolve_option(&OptionRef::Name("Color".into())).unwrap();
        assert_eq!(option, OptionId::new(1));
        let value = c.resolve_value(option, &ValueRef::Name("Red".into())).unwrap();
        assert_eq!(value, OptionValueId::new(11));
        assert_eq!(c.resolve_variant(0).unwrap(), VariantId::new(21));
    }

    #[test]
    fn ids_pass_through_unchanged() {
        let c = Correlator::new();
        assert_eq!(c.resolve_option(&OptionRef::Id(OptionId::new(9))).unwrap(), OptionId::new(9));
        assert_eq!(
            c.resolve_value(OptionId::new(9), &ValueRef::Id(OptionValueId::new(90))).unwrap(),
            OptionValueId::new(90)
        );
    }

    #[test]
    fn value_names_are_scoped_by_option() {
        let mut c = Correlator::new();
        c.register_value(OptionId::new(1), "Other", OptionValueId::new(11)).unwrap();
        c.register_value(OptionId::new(2), "Other", OptionValueId::new(12)).unwrap();

        assert_eq!(c.value_id(OptionId::new(1), "Other"), Some(OptionValueId::new(11)));
        assert_eq!(c.value_id(OptionId::new(2), "Other"), Some(OptionValueId::new(12)));
        assert_eq!(c.value_id(OptionId::new(3), "Other"), None);
    }

    #[test]
    fn unknown_names_are_reference_errors() {
        let c = Correlator::new();
        let err = c.resolve_option(&OptionRef::Name("Material".into())).unwrap_err();
        assert!(matches!(err, DomainError::Reference(_)));
        assert!(matches!(c.resolve_variant(3), Err(DomainError::Reference(_))));
    }

    #[test]
    fn conflicting_registrations_are_rejected() {
        let mut c = Correlator::new();
        c.register_option("Color", OptionId::new(1)).unwrap();
        c.register_option("Color", OptionId::new(1)).unwrap();

        let err = c.register_option("Color", OptionId::new(2)).unwrap_err();
        assert!(matches!(err, DomainError::Integrity(_)));
        assert_eq!(c.option_id("Color"), Some(OptionId::new(1)));
    }
}
