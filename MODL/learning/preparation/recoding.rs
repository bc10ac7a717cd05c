use std::{fs, io::Write, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::{attribute::DataPreparationAttribute, class::DataPreparationClass};
use crate::{
    database::Database,
    dictionary::{
        class::Class,
        value::{Value, ValueType},
    },
    errors::LearningError,
};

/// Prefix of recoding dictionaries.
pub const RECODING_PREFIX: &str = "R_";

/// Which attributes a recoding dictionary derives from a data preparation.
///
/// Numerical derivations only apply to preparations of a single numerical variable.
/// The distance study replaces every other recoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecodingSpec {
    /// Keep the native variables of the selected preparations.
    pub keep_initial_attributes: bool,
    /// Select informative preparations only.
    pub filter_attributes: bool,
    /// Maximum number of selected preparations, by decreasing level; 0 keeps them all.
    pub max_filtered_attribute_number: usize,
    /// Cell index.
    pub recode_index: bool,
    /// Cell identifier.
    pub recode_id: bool,
    /// Cell label.
    pub recode_label: bool,
    /// One 0/1 variable per cell.
    pub binarization: bool,
    /// One conditional information variable per target part.
    pub conditional_info: bool,
    /// Centered and reduced value.
    pub center_reduction: bool,
    /// Value normalized to `[0, 1]`.
    pub normalization: bool,
    /// Normalized rank of the value interval.
    pub rank_normalization: bool,
    /// Probabilistic distance variables, expert mode.
    pub distance_study: bool,
}

impl Default for RecodingSpec {
    fn default() -> Self {
        Self {
            keep_initial_attributes: false,
            filter_attributes: true,
            max_filtered_attribute_number: 0,
            recode_index: false,
            recode_id: true,
            recode_label: false,
            binarization: false,
            conditional_info: false,
            center_reduction: false,
            normalization: false,
            rank_normalization: false,
            distance_study: false,
        }
    }
}

impl RecodingSpec {
    /// Whether the preparation is kept by the attribute filter.
    fn keeps(&self, attribute: &DataPreparationAttribute) -> bool {
        if !self.filter_attributes {
            return true;
        }
        if attribute.target_attribute_type() == ValueType::None
            && attribute.native_attribute_number() == 1
        {
            attribute.prepared_data_grid_stats().compute_total_grid_size() > 1
        } else {
            attribute.level() > 0.0
        }
    }

    /// Mask of the preparations to recode, chosen by decreasing level then name.
    fn select(&self, attributes: &[DataPreparationAttribute]) -> Vec<bool> {
        let mut candidates: Vec<&DataPreparationAttribute> =
            attributes.iter().filter(|attribute| self.keeps(attribute)).collect();
        candidates.sort_by(|first, second| {
            second
                .level()
                .total_cmp(&first.level())
                .then_with(|| {
                    first
                        .compute_native_attribute_name()
                        .cmp(second.compute_native_attribute_name())
                })
        });
        if self.max_filtered_attribute_number > 0 {
            candidates.truncate(self.max_filtered_attribute_number);
        }
        let mut selected = vec![false; attributes.len()];
        for attribute in candidates {
            selected[attribute.index()] = true;
        }
        selected
    }

    fn recode(
        &self,
        class: &mut Class,
        attribute: &DataPreparationAttribute,
    ) -> Result<Vec<String>, LearningError> {
        if self.distance_study {
            return attribute.add_prepared_distance_study_attributes(class);
        }
        let mut added = Vec::new();
        if self.recode_index {
            added.push(attribute.add_prepared_indexing_attribute(class)?);
        }
        if self.recode_id {
            added.push(attribute.add_prepared_id_attribute(class)?);
        }
        if self.recode_label {
            added.push(attribute.add_prepared_label_attribute(class)?);
        }
        if self.binarization {
            added.extend(attribute.add_prepared_binarization_attributes(class)?);
        }
        if self.conditional_info && attribute.target_attribute_type() != ValueType::None {
            added.extend(attribute.add_prepared_source_conditional_info_attributes(class)?);
        }
        let numerical = attribute.native_attribute_number() == 1
            && attribute.native_attribute_type_at(0) == ValueType::Continuous;
        if numerical {
            if self.center_reduction {
                added.push(attribute.add_prepared_center_reduced_attribute(class)?);
            }
            if self.normalization {
                added.push(attribute.add_prepared_normalized_attribute(class)?);
            }
            if self.rank_normalization {
                added.push(attribute.add_prepared_rank_normalized_attribute(class)?);
            }
        }
        Ok(added)
    }
}

/// Builds the recoding dictionary `R_<class>` of a computed preparation, which is
/// consumed.
///
/// Selected preparations get the derived variables asked by `spec`. Native variables
/// of the preparations are used only when kept by `spec`, structures are never used,
/// and derived variables that no used variable needs are removed.
pub fn build_recoding_class(
    mut preparation: DataPreparationClass,
    spec: &RecodingSpec,
) -> Result<Class, LearningError> {
    let class_name = preparation.class_name().to_owned();
    let (class, attributes, _) = preparation
        .class_and_attributes_mut()
        .ok_or_else(|| LearningError::InvalidArgument(format!("dictionary {class_name} is not prepared")))?;

    let selected = spec.select(attributes);
    for attribute in attributes {
        for name in attribute.native_attribute_names() {
            if let Some(native) = class.lookup_attribute_mut(name) {
                native.used = false;
            }
        }
    }
    for (attribute, is_selected) in attributes.iter().zip(&selected) {
        if let Some(prepared) = class.lookup_attribute_mut(attribute.prepared_attribute_name()) {
            prepared.used = false;
        }
        if *is_selected {
            spec.recode(class, attribute)?;
        }
        for name in attribute.native_attribute_names() {
            if let Some(native) = class.lookup_attribute_mut(name) {
                native.used |= *is_selected && spec.keep_initial_attributes;
            }
        }
    }
    for attribute in class.attributes_mut() {
        if !attribute.value_type.is_simple() {
            attribute.used = false;
        }
    }

    class.compile()?;
    let unloaded: Vec<String> = class
        .attributes()
        .filter(|attribute| !attribute.is_native() && !attribute.loaded)
        .map(|attribute| attribute.name.clone())
        .collect();
    for name in &unloaded {
        class.remove_attribute(name);
    }
    let mut recoding = class.clone();
    recoding.set_name(format!("{RECODING_PREFIX}{class_name}"));
    recoding.compile()?;
    preparation.delete_data_preparation();
    Ok(recoding)
}

/// Used variables of a recoding dictionary, evaluated on the selected records of a
/// database.
#[derive(Debug, Clone, PartialEq)]
pub struct RecodedTable {
    attribute_names: Vec<String>,
    records: Vec<Vec<String>>,
}

impl RecodedTable {
    /// Used variable names, in dictionary order.
    #[must_use]
    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    /// Recoded records, as text fields.
    #[must_use]
    pub fn records(&self) -> &[Vec<String>] {
        &self.records
    }

    /// Number of recoded records.
    #[must_use]
    pub fn instance_number(&self) -> usize {
        self.records.len()
    }

    /// Column of one variable.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &str> + '_> {
        let position = self.attribute_names.iter().position(|candidate| candidate == name)?;
        Some(self.records.iter().map(move |record| record[position].as_str()))
    }

    /// Writes the table as tab-separated text with a header line.
    pub fn write_tsv(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let mut out = String::new();
        out.push_str(&self.attribute_names.join("\t"));
        out.push('\n');
        for record in &self.records {
            out.push_str(&record.join("\t"));
            out.push('\n');
        }
        let mut file = fs::File::create(path)
            .with_context(|| format!("failed to create recoded table {}", path.display()))?;
        file.write_all(out.as_bytes())
            .with_context(|| format!("failed to write recoded table {}", path.display()))?;
        Ok(())
    }
}

/// Evaluates a compiled recoding dictionary on the selected records of `database`.
pub fn deploy(recoding: &Class, database: &Database) -> Result<RecodedTable, LearningError> {
    let attribute_names: Vec<String> = recoding
        .attributes()
        .filter(|attribute| attribute.used && attribute.value_type.is_simple())
        .map(|attribute| attribute.name.clone())
        .collect();
    for attribute in recoding.native_attributes().filter(|attribute| attribute.loaded) {
        if attribute.value_type.is_simple() && database.column_index(&attribute.name).is_none() {
            return Err(LearningError::UnknownAttribute(attribute.name.clone()));
        }
    }
    let records = database
        .selected_records()
        .map(|record| -> Result<Vec<String>, LearningError> {
            let values = recoding.evaluate(database.attribute_names(), record)?;
            Ok(attribute_names
                .iter()
                .map(|name| values.get(name).map_or_else(String::new, Value::to_field))
                .collect())
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RecodedTable {
        attribute_names,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preparation::tests::{prepared_toy, toy_class_stats};
    use tempfile::tempdir;

    #[test]
    fn default_spec_recodes_informative_variables_by_part_id() {
        let stats = toy_class_stats(0);
        let recoding = build_recoding_class(prepared_toy(&stats), &RecodingSpec::default()).unwrap();
        assert_eq!(recoding.name(), "R_Toy");
        let used: Vec<&str> = recoding
            .attributes()
            .filter(|attribute| attribute.used)
            .map(|attribute| attribute.name.as_str())
            .collect();
        assert_eq!(used, ["label", "IdPage", "IdPcolor"]);
        assert!(recoding.lookup_attribute("Pnoise").is_none());
        assert!(!recoding.lookup_attribute("age").unwrap().used);
        assert!(!recoding.lookup_attribute("noise").unwrap().used);
        assert!(recoding.is_compiled());
    }

    #[test]
    fn max_number_keeps_the_best_variables() {
        let stats = toy_class_stats(0);
        let spec = RecodingSpec {
            keep_initial_attributes: true,
            max_filtered_attribute_number: 1,
            recode_id: false,
            center_reduction: true,
            normalization: true,
            ..RecodingSpec::default()
        };
        let recoding = build_recoding_class(prepared_toy(&stats), &spec).unwrap();
        assert!(recoding.lookup_attribute("age").unwrap().used);
        assert!(!recoding.lookup_attribute("color").unwrap().used);
        assert!(recoding.lookup_attribute("CRPage").is_some());
        assert!(recoding.lookup_attribute("N01Page").is_some());
    }

    #[test]
    fn deploys_binarization_on_the_database() {
        let stats = toy_class_stats(0);
        let spec = RecodingSpec {
            recode_id: false,
            binarization: true,
            ..RecodingSpec::default()
        };
        let recoding = build_recoding_class(prepared_toy(&stats), &spec).unwrap();
        let database = crate::preparation::tests::toy_database();
        let table = deploy(&recoding, &database).unwrap();
        assert_eq!(table.instance_number(), database.instance_number());

        let colors: Vec<&String> = table
            .attribute_names()
            .iter()
            .filter(|name| name.ends_with("Pcolor"))
            .collect();
        assert_eq!(colors.len(), 2);
        for row in 0..table.instance_number() {
            let ones = table
                .attribute_names()
                .iter()
                .enumerate()
                .filter(|(_, name)| name.ends_with("Pcolor"))
                .filter(|(column, _)| table.records()[row][*column] == "1")
                .count();
            assert_eq!(ones, 1);
        }

        let dir = tempdir().unwrap();
        let path = dir.path().join("recoded.txt");
        table.write_tsv(&path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), table.instance_number() + 1);
    }

    #[test]
    fn spec_reads_from_toml_with_defaults() {
        let spec: RecodingSpec = toml::from_str("binarization = true\nfilter_attributes = false").unwrap();
        assert!(spec.binarization);
        assert!(!spec.filter_attributes);
        assert!(spec.recode_id);
    }
}
