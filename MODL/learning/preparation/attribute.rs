use std::{fmt, sync::Arc};

use crate::{
    dictionary::{
        class::{Attribute, Class, LEVEL_META_DATA_KEY},
        rule::{DerivationRule, Operand},
        value::ValueType,
    },
    errors::LearningError,
    stats::{
        data_grid::{DataGridStats, SourceConditionalLogProbs},
        descriptive::DescriptiveContinuousStats,
        preparation::DataPreparationStats,
    },
};

/// A preparation materialized in a dictionary: the structure attribute holding the
/// prepared grid, plus the native attributes it reads.
///
/// The `add_prepared_*` helpers derive new attributes from the grid. They check the
/// preparation against the dictionary first and refuse to derive from an inconsistent
/// one.
#[derive(Debug, Clone)]
pub struct DataPreparationAttribute {
    index: usize,
    native_attributes: Vec<(String, ValueType)>,
    prepared_attribute_name: String,
    preparation_name: String,
    grid: Arc<DataGridStats>,
    level: f64,
    target_attribute_name: String,
    target_type: ValueType,
    continuous_stats: Option<DescriptiveContinuousStats>,
}

impl DataPreparationAttribute {
    /// Adds the prepared grid attribute of `stats` to `class`.
    ///
    /// Fails when the preparation has no grid or reads attributes unknown in `class`.
    pub fn init_from_data_preparation_stats(
        class: &mut Class,
        stats: &dyn DataPreparationStats,
    ) -> Result<Self, LearningError> {
        let grid = stats.prepared_data_grid_stats().cloned().ok_or_else(|| {
            LearningError::Derivation(format!("{} has no prepared data grid", stats.sort_name()))
        })?;
        let native_attributes = stats
            .attribute_names()
            .into_iter()
            .map(|name| {
                class
                    .lookup_attribute(&name)
                    .map(|attribute| (name.clone(), attribute.value_type))
                    .ok_or(LearningError::UnknownAttribute(name))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let supervised = stats.target_attribute_type() != ValueType::None;
        let mut prepared = Attribute::derived(
            class.build_attribute_name(&format!("P{}", stats.sort_name())),
            DerivationRule::DataGrid(Arc::clone(&grid)),
        );
        prepared.used = false;
        prepared.label = grid.export_variable_names().join(", ");
        if supervised {
            prepared.meta_data.set_double(LEVEL_META_DATA_KEY, stats.level());
        }
        let prepared_attribute_name = prepared.name.clone();
        class.insert_attribute(prepared)?;

        Ok(Self {
            index: 0,
            native_attributes,
            prepared_attribute_name,
            preparation_name: stats.sort_name().to_owned(),
            grid,
            level: stats.level(),
            target_attribute_name: stats.target_attribute_name().to_owned(),
            target_type: stats.target_attribute_type(),
            continuous_stats: stats.descriptive_continuous_stats().cloned(),
        })
    }

    /// Position among the prepared attributes of the class.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    /// Number of native attributes.
    #[must_use]
    pub fn native_attribute_number(&self) -> usize {
        self.native_attributes.len()
    }

    /// Native attribute names, in grid order.
    pub fn native_attribute_names(&self) -> impl Iterator<Item = &str> {
        self.native_attributes.iter().map(|(name, _)| name.as_str())
    }

    /// Name of the `index`-th native attribute.
    #[must_use]
    pub fn native_attribute_name_at(&self, index: usize) -> &str {
        &self.native_attributes[index].0
    }

    /// Type of the `index`-th native attribute.
    #[must_use]
    pub fn native_attribute_type_at(&self, index: usize) -> ValueType {
        self.native_attributes[index].1
    }

    /// Name of the preparation, the native names joined by a back quote.
    #[must_use]
    pub fn compute_native_attribute_name(&self) -> &str {
        &self.preparation_name
    }

    /// Structure attribute holding the prepared grid.
    #[must_use]
    pub fn prepared_attribute_name(&self) -> &str {
        &self.prepared_attribute_name
    }

    /// Prepared grid.
    #[must_use]
    pub const fn prepared_data_grid_stats(&self) -> &Arc<DataGridStats> {
        &self.grid
    }

    /// Level of the preparation.
    #[must_use]
    pub const fn level(&self) -> f64 {
        self.level
    }

    /// Target attribute, empty when unsupervised.
    #[must_use]
    pub fn target_attribute_name(&self) -> &str {
        &self.target_attribute_name
    }

    /// Target type, [`ValueType::None`] when unsupervised.
    #[must_use]
    pub const fn target_attribute_type(&self) -> ValueType {
        self.target_type
    }

    /// Descriptive stats of a single numerical native attribute.
    #[must_use]
    pub const fn descriptive_continuous_stats(&self) -> Option<&DescriptiveContinuousStats> {
        self.continuous_stats.as_ref()
    }

    /// Whether the grid splits the sources and the preparation has a positive level.
    #[must_use]
    pub fn is_informative_on_target(&self) -> bool {
        self.target_type != ValueType::None
            && self.grid.compute_source_grid_size() > 1
            && self.level > 0.0
    }

    /// Checks the preparation against the dictionary holding it.
    pub fn check(&self, class: &Class) -> Result<(), LearningError> {
        for (name, value_type) in &self.native_attributes {
            let attribute = class.lookup_attribute(name).ok_or_else(|| {
                LearningError::Derivation(format!(
                    "native variable {name} unknown in dictionary {}",
                    class.name()
                ))
            })?;
            if attribute.value_type != *value_type {
                return Err(LearningError::Derivation(format!(
                    "native variable {name} should be {value_type}"
                )));
            }
        }
        let prepared = class
            .lookup_attribute(&self.prepared_attribute_name)
            .ok_or_else(|| {
                LearningError::Derivation(format!(
                    "prepared variable {} unknown in dictionary {}",
                    self.prepared_attribute_name,
                    class.name()
                ))
            })?;
        if !matches!(prepared.rule, Some(DerivationRule::DataGrid(_))) {
            return Err(LearningError::Derivation(format!(
                "prepared variable {} should be computed by a DataGrid rule",
                self.prepared_attribute_name
            )));
        }
        let inputs = self.input_operands();
        let natives: Vec<&str> = self.native_attribute_names().collect();
        if inputs != natives {
            return Err(LearningError::Derivation(format!(
                "prepared grid of {} reads {} instead of {}",
                self.preparation_name,
                inputs.join(", "),
                natives.join(", ")
            )));
        }
        Ok(())
    }

    /// Adds the one-based index of the cell of each record.
    pub fn add_prepared_indexing_attribute(&self, class: &mut Class) -> Result<String, LearningError> {
        let rule = DerivationRule::CellIndex {
            grid: self.prepared_attribute_name.clone(),
            operands: self.owned_input_operands(),
        };
        self.add_data_preparation_rule_attribute(class, rule, "Index")
    }

    /// Adds the identifier of the cell of each record.
    pub fn add_prepared_id_attribute(&self, class: &mut Class) -> Result<String, LearningError> {
        let rule = DerivationRule::CellId {
            grid: self.prepared_attribute_name.clone(),
            operands: self.owned_input_operands(),
        };
        self.add_data_preparation_rule_attribute(class, rule, "Id")
    }

    /// Adds the label of the cell of each record.
    pub fn add_prepared_label_attribute(&self, class: &mut Class) -> Result<String, LearningError> {
        let rule = DerivationRule::CellLabel {
            grid: self.prepared_attribute_name.clone(),
            operands: self.owned_input_operands(),
        };
        self.add_data_preparation_rule_attribute(class, rule, "Label")
    }

    /// Adds one 0/1 attribute per input cell, over a shared unused index attribute.
    pub fn add_prepared_binarization_attributes(
        &self,
        class: &mut Class,
    ) -> Result<Vec<String>, LearningError> {
        let index_name = self.add_unused_indexing_attribute(class)?;
        (0..self.binarization_number())
            .map(|cell| {
                self.add_data_preparation_rule_attribute(
                    class,
                    equal_to_cell(&index_name, cell),
                    &format!("B{}", cell + 1),
                )
            })
            .collect()
    }

    /// Adds one `-ln P(source cell | target part)` attribute per target part, over a
    /// shared unused statistics attribute.
    pub fn add_prepared_source_conditional_info_attributes(
        &self,
        class: &mut Class,
    ) -> Result<Vec<String>, LearningError> {
        if self.target_type == ValueType::None {
            return Err(LearningError::Derivation(format!(
                "conditional info of {} requires a target variable",
                self.preparation_name
            )));
        }
        let stats_rule = DerivationRule::DataGridStats {
            grid: self.prepared_attribute_name.clone(),
            operands: self.owned_input_operands(),
            table: Arc::new(SourceConditionalLogProbs::from_grid(&self.grid)),
        };
        let stats_name = self.add_data_preparation_rule_attribute(class, stats_rule, "Stats")?;
        set_unused(class, &stats_name);
        (0..self.grid.compute_target_grid_size())
            .map(|target| {
                let rule = DerivationRule::SourceConditionalInfo {
                    stats: stats_name.clone(),
                    target_index: target + 1,
                };
                self.add_data_preparation_rule_attribute(class, rule, &format!("Info{}", target + 1))
            })
            .collect()
    }

    /// Adds `(x - mean) / standard deviation`, dividing by 1 when the deviation is not
    /// positive.
    pub fn add_prepared_center_reduced_attribute(
        &self,
        class: &mut Class,
    ) -> Result<String, LearningError> {
        let (name, stats) = self.single_continuous_native("center reduction")?;
        let deviation = stats.standard_deviation();
        let rule = DerivationRule::CenterReduce {
            operand: name.to_owned(),
            mean: stats.mean(),
            scale: if deviation > 0.0 { deviation } else { 1.0 },
        };
        self.add_data_preparation_rule_attribute(class, rule, "CR")
    }

    /// Adds `(x - min) / (max - min)`, dividing by 1 when the range is not positive.
    pub fn add_prepared_normalized_attribute(&self, class: &mut Class) -> Result<String, LearningError> {
        let (name, stats) = self.single_continuous_native("normalization")?;
        let range = stats.max() - stats.min();
        let rule = DerivationRule::Normalize {
            operand: name.to_owned(),
            min: stats.min(),
            scale: if range > 0.0 { range } else { 1.0 },
        };
        self.add_data_preparation_rule_attribute(class, rule, "N01")
    }

    /// Adds the normalised mid-rank of the interval of each value.
    pub fn add_prepared_rank_normalized_attribute(
        &self,
        class: &mut Class,
    ) -> Result<String, LearningError> {
        let (name, _) = self.single_continuous_native("rank normalization")?;
        let grid = self.add_univariate_grid_attribute(class)?;
        let rule = DerivationRule::ValueRank {
            grid,
            operand: name.to_owned(),
        };
        self.add_data_preparation_rule_attribute(class, rule, "NR")
    }

    /// Adds the attributes of probabilistic distance studies.
    ///
    /// A numerical attribute gets its rank normalization and the expected rank distance
    /// within its interval. A categorical attribute gets, for each value part of
    /// probability `p`, an unused indicator `B<i>` and two used attributes: the
    /// distance `D_B<i> = p/2 * B` and the self-distance
    /// `SD_B<i> = p(1-p)/3 * (1-B) + p^2/3 * B`, the sum of a different-part and a
    /// same-part product. Parts are the source cells of a supervised grid and the
    /// target cells otherwise. Preparations of several attributes get none.
    pub fn add_prepared_distance_study_attributes(
        &self,
        class: &mut Class,
    ) -> Result<Vec<String>, LearningError> {
        if self.native_attributes.len() != 1 {
            return Ok(Vec::new());
        }
        match self.native_attributes[0].1 {
            ValueType::Continuous => Ok(vec![
                self.add_prepared_rank_normalized_attribute(class)?,
                self.add_prepared_rank_normalized_self_distance_attribute(class)?,
            ]),
            ValueType::Symbol => self.add_prepared_categorical_distance_attributes(class),
            _ => Ok(Vec::new()),
        }
    }

    fn add_prepared_rank_normalized_self_distance_attribute(
        &self,
        class: &mut Class,
    ) -> Result<String, LearningError> {
        let (name, _) = self.single_continuous_native("rank self distance")?;
        let grid = self.add_univariate_grid_attribute(class)?;
        let rule = DerivationRule::RankSelfDistance {
            grid,
            operand: name.to_owned(),
        };
        self.add_data_preparation_rule_attribute(class, rule, "SD")
    }

    fn add_prepared_categorical_distance_attributes(
        &self,
        class: &mut Class,
    ) -> Result<Vec<String>, LearningError> {
        let index_name = self.add_unused_indexing_attribute(class)?;
        let total = self.grid.compute_grid_frequency().max(1) as f64;
        let mut added = Vec::new();
        for cell in 0..self.binarization_number() {
            let binary = self.add_data_preparation_rule_attribute(
                class,
                equal_to_cell(&index_name, cell),
                &format!("B{}", cell + 1),
            )?;
            set_unused(class, &binary);

            let p = self.grid.univariate_cell_frequency_at(cell) as f64 / total;
            let distance = DerivationRule::Product(vec![
                Operand::Constant(p / 2.0),
                Operand::Attribute(binary.clone()),
            ]);
            added.push(self.add_data_preparation_rule_attribute(
                class,
                distance,
                &format!("D_B{}", cell + 1),
            )?);

            let different = DerivationRule::Product(vec![
                Operand::Constant(p * ((1.0 - p) / 3.0)),
                Operand::Rule(Box::new(DerivationRule::Diff(vec![
                    Operand::Constant(1.0),
                    Operand::Attribute(binary.clone()),
                ]))),
            ]);
            let same = DerivationRule::Product(vec![
                Operand::Constant(p * (p / 3.0)),
                Operand::Attribute(binary),
            ]);
            let self_distance = DerivationRule::Sum(vec![
                Operand::Rule(Box::new(different)),
                Operand::Rule(Box::new(same)),
            ]);
            added.push(self.add_data_preparation_rule_attribute(
                class,
                self_distance,
                &format!("SD_B{}", cell + 1),
            )?);
        }
        Ok(added)
    }

    /// Text report: the preparation name, its attribute and its grid.
    pub fn write_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "Variable\t{}\t{}",
            self.preparation_name, self.prepared_attribute_name
        )?;
        self.grid.write_report(out)?;
        writeln!(out)
    }

    /// Cells enumerated by binarization: the input cells of the grid.
    fn binarization_number(&self) -> usize {
        if self.target_type == ValueType::None {
            self.grid.compute_target_grid_size()
        } else {
            self.grid.compute_source_grid_size()
        }
    }

    fn input_operands(&self) -> Vec<&str> {
        self.grid
            .attributes()
            .iter()
            .map(|partition| partition.attribute_name.as_str())
            .filter(|name| *name != self.target_attribute_name)
            .collect()
    }

    fn owned_input_operands(&self) -> Vec<String> {
        self.input_operands().into_iter().map(str::to_owned).collect()
    }

    fn single_continuous_native(
        &self,
        derivation: &str,
    ) -> Result<(&str, &DescriptiveContinuousStats), LearningError> {
        match (self.native_attributes.as_slice(), &self.continuous_stats) {
            ([(name, ValueType::Continuous)], Some(stats)) => Ok((name.as_str(), stats)),
            _ => Err(LearningError::Derivation(format!(
                "{derivation} requires a single numerical variable, got {}",
                self.preparation_name
            ))),
        }
    }

    fn add_unused_indexing_attribute(&self, class: &mut Class) -> Result<String, LearningError> {
        let name = self.add_prepared_indexing_attribute(class)?;
        set_unused(class, &name);
        Ok(name)
    }

    /// Unused structure attribute holding the univariate grid of the single native.
    fn add_univariate_grid_attribute(&self, class: &mut Class) -> Result<String, LearningError> {
        self.check(class)?;
        let grid = self.grid.export_attribute_data_grid_stats_at(0);
        let mut attribute = Attribute::derived(
            class.build_attribute_name(&format!("PU{}", self.native_attributes[0].0)),
            DerivationRule::DataGrid(Arc::new(grid)),
        );
        attribute.used = false;
        let name = attribute.name.clone();
        class.insert_attribute(attribute)?;
        Ok(name)
    }

    fn add_data_preparation_rule_attribute(
        &self,
        class: &mut Class,
        rule: DerivationRule,
        prefix: &str,
    ) -> Result<String, LearningError> {
        self.check(class)?;
        let mut attribute = Attribute::derived(
            class.build_attribute_name(&format!("{prefix}{}", self.prepared_attribute_name)),
            rule,
        );
        if self.target_type != ValueType::None {
            attribute.meta_data.set_double(LEVEL_META_DATA_KEY, self.level);
        }
        let name = attribute.name.clone();
        class.insert_attribute(attribute)?;
        Ok(name)
    }
}

fn equal_to_cell(index_name: &str, cell: usize) -> DerivationRule {
    DerivationRule::Equal {
        operand: index_name.to_owned(),
        value: (cell + 1) as f64,
    }
}

fn set_unused(class: &mut Class, name: &str) {
    if let Some(attribute) = class.lookup_attribute_mut(name) {
        attribute.used = false;
    }
}
