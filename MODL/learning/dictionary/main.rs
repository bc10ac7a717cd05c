//! Class dictionaries: typed attributes, derivation rules and class domains.

/// Dictionary attributes and classes.
pub mod class;
/// Class domains and the current-domain registry.
pub mod domain;
/// Derivation rules.
pub mod rule;
/// Attribute values and types.
pub mod value;

pub use class::{Attribute, Class, MetaData, MetaValue, LEVEL_META_DATA_KEY};
pub use domain::{ClassDomain, DomainGuard, DomainRegistry};
pub use rule::{DerivationRule, Operand};
pub use value::{format_continuous, Value, ValueType, MISSING_VALUE, STAR_VALUE};
