use std::fmt;

use super::{attribute::DataPreparationAttribute, target::DataPreparationTargetAttribute};
use crate::{
    dictionary::{
        class::{Class, LEVEL_META_DATA_KEY},
        domain::ClassDomain,
    },
    error_manager::LearningErrorManager,
    errors::LearningError,
    stats::{class_stats::ClassStats, preparation::DataPreparationStats},
};

const ERROR_CATEGORY: &str = "Data preparation";

/// Copy of a class in its own domain, extended with one prepared grid attribute per
/// informative preparation of a [`ClassStats`].
#[derive(Debug, Clone)]
pub struct DataPreparationClass {
    class_name: String,
    target_attribute_name: String,
    domain: Option<ClassDomain>,
    target_attribute: Option<DataPreparationTargetAttribute>,
    attributes: Vec<DataPreparationAttribute>,
}

impl DataPreparationClass {
    /// Preparation of the class and target of `class_stats`, not computed yet.
    #[must_use]
    pub fn new(class_stats: &ClassStats) -> Self {
        let spec = class_stats.learning_spec();
        Self {
            class_name: spec.class().name().to_owned(),
            target_attribute_name: spec.target_attribute_name().to_owned(),
            domain: None,
            target_attribute: None,
            attributes: Vec::new(),
        }
    }

    /// Prepared class name.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Target attribute, empty when unsupervised.
    #[must_use]
    pub fn target_attribute_name(&self) -> &str {
        &self.target_attribute_name
    }

    /// Prepares every attribute and pair with a prepared grid, replacing any previous
    /// preparation.
    ///
    /// Native attributes of supervised univariate preparations receive their level as
    /// meta-data, informative or not.
    pub fn compute_data_preparation_from_class_stats(
        &mut self,
        class_stats: &ClassStats,
    ) -> Result<(), LearningError> {
        self.begin_preparation(class_stats)?;
        let supervised = class_stats.learning_spec().is_supervised();
        let all_stats = class_stats.all_preparation_stats();
        let class = self.prepared_class_mut()?;
        for stats in &all_stats {
            let names = stats.attribute_names();
            if supervised && names.len() == 1 {
                if let Some(native) = class.lookup_attribute_mut(&names[0]) {
                    native.meta_data.set_double(LEVEL_META_DATA_KEY, stats.level());
                }
            }
        }
        let mut attributes = Vec::new();
        for stats in all_stats {
            if stats.prepared_data_grid_stats().is_some() {
                attributes.push(DataPreparationAttribute::init_from_data_preparation_stats(
                    class, stats,
                )?);
            }
        }
        self.end_preparation(attributes)
    }

    /// Prepares a single attribute subset, kept when its grid is informative.
    pub fn compute_data_preparation_from_attribute_subset_stats(
        &mut self,
        class_stats: &ClassStats,
        subset_stats: &dyn DataPreparationStats,
    ) -> Result<(), LearningError> {
        self.begin_preparation(class_stats)?;
        let supervised = class_stats.learning_spec().is_supervised();
        let class = self.prepared_class_mut()?;
        let mut attributes = Vec::new();
        if let Some(grid) = subset_stats.prepared_data_grid_stats() {
            if !supervised || grid.source_attribute_number() > 0 {
                attributes.push(DataPreparationAttribute::init_from_data_preparation_stats(
                    class,
                    subset_stats,
                )?);
            }
        }
        self.end_preparation(attributes)
    }

    fn begin_preparation(&mut self, class_stats: &ClassStats) -> Result<(), LearningError> {
        if !class_stats.is_stats_computed() {
            return Err(LearningError::InvalidArgument(format!(
                "statistics of dictionary {} are not computed",
                self.class_name
            )));
        }
        let spec = class_stats.learning_spec();
        if spec.class().name() != self.class_name
            || spec.target_attribute_name() != self.target_attribute_name
        {
            return Err(LearningError::InvalidArgument(format!(
                "statistics of dictionary {} with target '{}' cannot prepare dictionary {} with target '{}'",
                spec.class().name(),
                spec.target_attribute_name(),
                self.class_name,
                self.target_attribute_name
            )));
        }
        self.delete_data_preparation();

        let mut class = spec.class().clone();
        class.remove_all_attributes_meta_data_key(LEVEL_META_DATA_KEY);
        if spec.is_supervised() {
            let value_stats = spec.target_value_stats().ok_or_else(|| {
                LearningError::InvalidArgument(format!(
                    "target variable {} has no value statistics",
                    self.target_attribute_name
                ))
            })?;
            self.target_attribute = Some(
                DataPreparationTargetAttribute::init_from_attribute_value_stats(&mut class, value_stats)?,
            );
        }
        let mut domain = ClassDomain::new(format!("{}Preparation", self.class_name));
        domain.insert_class(class)?;
        self.domain = Some(domain);
        Ok(())
    }

    fn end_preparation(
        &mut self,
        mut attributes: Vec<DataPreparationAttribute>,
    ) -> Result<(), LearningError> {
        for (index, attribute) in attributes.iter_mut().enumerate() {
            attribute.set_index(index);
        }
        self.attributes = attributes;
        let compiled = match self.domain.as_mut() {
            Some(domain) => domain.compile(),
            None => Ok(()),
        };
        if let Err(error) = compiled {
            self.delete_data_preparation();
            return Err(error);
        }
        Ok(())
    }

    fn prepared_class_mut(&mut self) -> Result<&mut Class, LearningError> {
        let class_name = self.class_name.clone();
        self.domain
            .as_mut()
            .and_then(|domain| domain.lookup_class_mut(&class_name))
            .ok_or(LearningError::UnknownClass(class_name))
    }

    /// Detaches the prepared domain and hands it to the caller.
    pub fn remove_data_preparation(&mut self) -> Option<ClassDomain> {
        self.target_attribute = None;
        self.attributes.clear();
        self.domain.take()
    }

    /// Drops the prepared domain and every preparation.
    pub fn delete_data_preparation(&mut self) {
        drop(self.remove_data_preparation());
    }

    /// Whether a preparation is computed.
    #[must_use]
    pub const fn is_prepared(&self) -> bool {
        self.domain.is_some()
    }

    /// Prepared class.
    #[must_use]
    pub fn data_preparation_class(&self) -> Option<&Class> {
        self.domain
            .as_ref()
            .and_then(|domain| domain.lookup_class(&self.class_name))
    }

    /// Domain holding the prepared class.
    #[must_use]
    pub const fn data_preparation_domain(&self) -> Option<&ClassDomain> {
        self.domain.as_ref()
    }

    /// Prepared target, `None` when unsupervised or not prepared.
    #[must_use]
    pub const fn data_preparation_target_attribute(&self) -> Option<&DataPreparationTargetAttribute> {
        self.target_attribute.as_ref()
    }

    /// Prepared attributes, in preparation order.
    #[must_use]
    pub fn data_preparation_attributes(&self) -> &[DataPreparationAttribute] {
        &self.attributes
    }

    /// Prepared attributes with the target splitting their sources.
    pub fn informative_data_preparation_attributes(
        &self,
    ) -> impl Iterator<Item = &DataPreparationAttribute> {
        self.attributes
            .iter()
            .filter(|attribute| attribute.is_informative_on_target())
    }

    /// Mutable prepared class together with the preparations deriving into it.
    pub fn class_and_attributes_mut(
        &mut self,
    ) -> Option<(
        &mut Class,
        &[DataPreparationAttribute],
        Option<&DataPreparationTargetAttribute>,
    )> {
        let class = self
            .domain
            .as_mut()
            .and_then(|domain| domain.lookup_class_mut(&self.class_name))?;
        Some((class, &self.attributes, self.target_attribute.as_ref()))
    }

    /// Checks the preparation against its dictionary, reporting each problem to `errors`.
    pub fn check_data_preparation(&self, errors: &LearningErrorManager) -> bool {
        let fail = |label: String| {
            errors.add_error(ERROR_CATEGORY, &self.class_name, &label);
            false
        };
        let Some(class) = self.data_preparation_class() else {
            return fail("Data not prepared".into());
        };
        if !self.target_attribute_name.is_empty() {
            let Some(target) = &self.target_attribute else {
                return fail(format!(
                    "Target variable {} is not prepared",
                    self.target_attribute_name
                ));
            };
            if let Err(error) = target.check(class) {
                return fail(error.to_string());
            }
            if class.lookup_attribute(&self.target_attribute_name).is_none() {
                return fail(format!(
                    "Target variable {} missing in the preparation dictionary",
                    self.target_attribute_name
                ));
            }
        }
        for (index, attribute) in self.attributes.iter().enumerate() {
            debug_assert_eq!(attribute.index(), index);
            for name in attribute.native_attribute_names() {
                if class.lookup_attribute(name).is_none() {
                    return fail(format!(
                        "Native variable {name} unknown in the preparation dictionary"
                    ));
                }
            }
            if class.lookup_attribute(attribute.prepared_attribute_name()).is_none() {
                return fail(format!(
                    "Prepared variable {} unknown in the preparation dictionary",
                    attribute.prepared_attribute_name()
                ));
            }
            if let Err(error) = attribute.check(class) {
                return fail(error.to_string());
            }
        }
        true
    }

    /// Text report: the prepared dictionary, then each preparation.
    pub fn write_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "Data preparation\t{}", self.class_name)?;
        let Some(class) = self.data_preparation_class() else {
            return writeln!(out, "Data not prepared");
        };
        writeln!(out, "{class}")?;
        if let Some(target) = &self.target_attribute {
            target.write_report(out)?;
        }
        for attribute in &self.attributes {
            attribute.write_report(out)?;
        }
        writeln!(out)
    }
}
