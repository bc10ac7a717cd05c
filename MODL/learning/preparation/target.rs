use std::{fmt, sync::Arc};

use crate::{
    dictionary::{
        class::{Attribute, Class},
        rule::DerivationRule,
        value::ValueType,
    },
    errors::LearningError,
    stats::data_grid::DataGridStats,
};

/// Target attribute of a preparation, with the structure attribute holding its value
/// grid.
#[derive(Debug, Clone)]
pub struct DataPreparationTargetAttribute {
    native_attribute_name: String,
    native_type: ValueType,
    prepared_attribute_name: String,
    value_stats: Arc<DataGridStats>,
}

impl DataPreparationTargetAttribute {
    /// Adds the unused value grid attribute `V<target>` to `class`.
    pub fn init_from_attribute_value_stats(
        class: &mut Class,
        value_stats: &DataGridStats,
    ) -> Result<Self, LearningError> {
        if value_stats.attribute_number() != 1 {
            return Err(LearningError::InvalidArgument(format!(
                "target value grid must be univariate, got {} variables",
                value_stats.attribute_number()
            )));
        }
        let native_attribute_name = value_stats.attribute_at(0).attribute_name.clone();
        let native_type = class
            .lookup_attribute(&native_attribute_name)
            .map(|attribute| attribute.value_type)
            .ok_or_else(|| LearningError::UnknownAttribute(native_attribute_name.clone()))?;

        let value_stats = Arc::new(value_stats.clone());
        let mut prepared = Attribute::derived(
            class.build_attribute_name(&format!("V{native_attribute_name}")),
            DerivationRule::DataGrid(Arc::clone(&value_stats)),
        );
        prepared.used = false;
        let prepared_attribute_name = prepared.name.clone();
        class.insert_attribute(prepared)?;
        Ok(Self {
            native_attribute_name,
            native_type,
            prepared_attribute_name,
            value_stats,
        })
    }

    /// Target attribute.
    #[must_use]
    pub fn native_attribute_name(&self) -> &str {
        &self.native_attribute_name
    }

    /// Target type.
    #[must_use]
    pub const fn native_attribute_type(&self) -> ValueType {
        self.native_type
    }

    /// Structure attribute holding the value grid.
    #[must_use]
    pub fn prepared_attribute_name(&self) -> &str {
        &self.prepared_attribute_name
    }

    /// Grid of the target values and their frequencies.
    #[must_use]
    pub const fn attribute_value_stats(&self) -> &Arc<DataGridStats> {
        &self.value_stats
    }

    /// Checks the target and its value grid against the dictionary holding them.
    pub fn check(&self, class: &Class) -> Result<(), LearningError> {
        match class.lookup_attribute(&self.native_attribute_name) {
            Some(attribute) if attribute.value_type == self.native_type => {}
            Some(_) => {
                return Err(LearningError::Derivation(format!(
                    "native variable {} should be {}",
                    self.native_attribute_name, self.native_type
                )))
            }
            None => {
                return Err(LearningError::Derivation(format!(
                    "native variable {} unknown in dictionary {}",
                    self.native_attribute_name,
                    class.name()
                )))
            }
        }
        match class.lookup_attribute(&self.prepared_attribute_name) {
            Some(Attribute {
                rule: Some(DerivationRule::DataGrid(_)),
                ..
            }) => Ok(()),
            _ => Err(LearningError::Derivation(format!(
                "prepared variable {} unknown in dictionary {}",
                self.prepared_attribute_name,
                class.name()
            ))),
        }
    }

    /// Adds the one-based index of each target value in the value grid.
    pub fn add_prepared_indexing_attribute(&self, class: &mut Class) -> Result<String, LearningError> {
        self.check(class)?;
        let attribute = Attribute::derived(
            class.build_attribute_name(&format!("Index{}", self.prepared_attribute_name)),
            DerivationRule::ValueIndex {
                grid: self.prepared_attribute_name.clone(),
                operand: self.native_attribute_name.clone(),
            },
        );
        let name = attribute.name.clone();
        class.insert_attribute(attribute)?;
        Ok(name)
    }

    /// Text report: the target, its attribute and its value grid.
    pub fn write_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "Target variable\t{}\t{}",
            self.native_attribute_name, self.prepared_attribute_name
        )?;
        self.value_stats.write_report(out)?;
        writeln!(out)
    }
}
