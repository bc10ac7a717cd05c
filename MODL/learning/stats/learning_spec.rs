use std::collections::HashMap;

use indexmap::IndexMap;

use super::{
    data_grid::{AttributePartition, DataGridStats, PartitionKind},
    descriptive::{DescriptiveContinuousStats, DescriptiveStats, DescriptiveSymbolStats},
    stat::{ln_binomial, ln_factorial},
    tuple_table::TupleTable,
};
use crate::{
    cancellation::CancellationToken,
    config::{NumericsConfig, PreparationConfig},
    database::Database,
    dictionary::{
        class::Class,
        value::{Value, ValueType},
    },
    errors::LearningError,
};

/// Values of one attribute over the selected instances.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Numerical values.
    Continuous(Vec<f64>),
    /// Categorical values.
    Symbol(Vec<String>),
}

impl Column {
    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Continuous(values) => values.len(),
            Self::Symbol(values) => values.len(),
        }
    }

    /// Whether the column is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attribute type.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Continuous(_) => ValueType::Continuous,
            Self::Symbol(_) => ValueType::Symbol,
        }
    }
}

/// Partition of the target values used by supervised preparation.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetPartition {
    partition: AttributePartition,
    part_indexes: Vec<usize>,
    part_frequencies: Vec<usize>,
}

impl TargetPartition {
    /// Target attribute partition.
    #[must_use]
    pub const fn partition(&self) -> &AttributePartition {
        &self.partition
    }

    /// Part of each instance.
    #[must_use]
    pub fn part_indexes(&self) -> &[usize] {
        &self.part_indexes
    }

    /// Frequency of each part.
    #[must_use]
    pub fn part_frequencies(&self) -> &[usize] {
        &self.part_frequencies
    }

    /// Number of parts.
    #[must_use]
    pub fn part_number(&self) -> usize {
        self.part_frequencies.len()
    }
}

/// Learning problem: a class, the selected instances of a database and a target.
///
/// The selected instances are materialised column by column when the spec is built, so
/// the spec stays valid when the database selection changes afterwards.
#[derive(Debug, Clone)]
pub struct LearningSpec {
    class: Class,
    database_name: String,
    target_attribute_name: String,
    target_type: ValueType,
    instance_number: usize,
    attribute_names: Vec<String>,
    columns: IndexMap<String, Column>,
    target_descriptive_stats: Option<DescriptiveStats>,
    target_value_stats: Option<DataGridStats>,
    target_partition: Option<TargetPartition>,
    null_construction_cost: f64,
    null_preparation_cost: f64,
    null_data_cost: f64,
    preparation: PreparationConfig,
    numerics: NumericsConfig,
}

impl LearningSpec {
    /// Builds the spec from the selected instances of a database.
    ///
    /// An empty target name means unsupervised learning.
    pub fn build(
        class: &Class,
        database: &Database,
        target_attribute_name: &str,
        preparation: PreparationConfig,
        numerics: NumericsConfig,
        cancel: &CancellationToken,
    ) -> Result<Self, LearningError> {
        let mut class = class.clone();
        if !class.is_compiled() {
            class.compile()?;
        }
        let target_type = if target_attribute_name.is_empty() {
            ValueType::None
        } else {
            let target = class
                .lookup_attribute(target_attribute_name)
                .ok_or_else(|| LearningError::UnknownAttribute(target_attribute_name.to_owned()))?;
            if !target.value_type.is_simple() {
                return Err(LearningError::InvalidArgument(format!(
                    "target variable {target_attribute_name} must be numerical or categorical"
                )));
            }
            target.value_type
        };

        let attribute_names: Vec<String> = class
            .attributes()
            .filter(|attribute| {
                attribute.used && attribute.value_type.is_simple() && attribute.name != target_attribute_name
            })
            .map(|attribute| attribute.name.clone())
            .collect();
        let mut wanted = attribute_names.clone();
        if target_type != ValueType::None {
            wanted.push(target_attribute_name.to_owned());
        }
        let columns = collect_columns(&class, database, &wanted, cancel)?;
        let instance_number = database.selected_instance_number();

        let mut spec = Self {
            class,
            database_name: database.name().to_owned(),
            target_attribute_name: target_attribute_name.to_owned(),
            target_type,
            instance_number,
            attribute_names,
            columns,
            target_descriptive_stats: None,
            target_value_stats: None,
            target_partition: None,
            null_construction_cost: 0.0,
            null_preparation_cost: 0.0,
            null_data_cost: 0.0,
            preparation,
            numerics,
        };
        if target_type != ValueType::None {
            spec.compute_target_stats(cancel)?;
        }
        Ok(spec)
    }

    fn compute_target_stats(&mut self, cancel: &CancellationToken) -> Result<(), LearningError> {
        let interrupted = || LearningError::Evaluation("target statistics interrupted".into());
        match self.columns.get(&self.target_attribute_name) {
            Some(Column::Symbol(values)) => {
                let table = TupleTable::from_keys(values.iter().cloned());
                let mut stats = DescriptiveSymbolStats::new(&self.target_attribute_name);
                if !stats.compute_stats(&table, cancel) {
                    return Err(interrupted());
                }
                self.target_descriptive_stats = Some(DescriptiveStats::Symbol(stats));

                let mut frequencies: Vec<(String, usize)> = table
                    .tuples()
                    .iter()
                    .map(|tuple| (tuple.key.clone(), tuple.frequency))
                    .collect();
                frequencies.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                let partition = AttributePartition::new(
                    self.target_attribute_name.clone(),
                    PartitionKind::SymbolValues {
                        values: frequencies.iter().map(|(value, _)| value.clone()).collect(),
                    },
                );
                let lookup: HashMap<&str, usize> = frequencies
                    .iter()
                    .enumerate()
                    .map(|(index, (value, _))| (value.as_str(), index))
                    .collect();
                let part_indexes = values.iter().map(|value| lookup[value.as_str()]).collect();
                let part_frequencies = frequencies.iter().map(|(_, frequency)| *frequency).collect();
                let target_partition = TargetPartition {
                    partition,
                    part_indexes,
                    part_frequencies,
                };
                self.target_value_stats = Some(univariate_grid(&target_partition));
                self.target_partition = Some(target_partition);
            }
            Some(Column::Continuous(values)) => {
                let table = TupleTable::from_keys(values.iter().copied());
                let mut stats = DescriptiveContinuousStats::new(&self.target_attribute_name);
                if !stats.compute_stats(&table, cancel) {
                    return Err(interrupted());
                }
                self.target_descriptive_stats = Some(DescriptiveStats::Continuous(stats));

                let mut value_grid = DataGridStats::new(
                    vec![AttributePartition::new(
                        self.target_attribute_name.clone(),
                        PartitionKind::ContinuousValues {
                            values: table.tuples().iter().map(|tuple| tuple.key).collect(),
                        },
                    )],
                    0,
                );
                for (index, tuple) in table.tuples().iter().enumerate() {
                    value_grid.set_cell_frequency_at(&[index], tuple.frequency);
                }
                self.target_value_stats = Some(value_grid);

                let bounds = equal_frequency_bounds(&table, self.preparation.max_target_intervals);
                let partition = AttributePartition::new(
                    self.target_attribute_name.clone(),
                    PartitionKind::Discretization { bounds },
                );
                let part_indexes: Vec<usize> = values
                    .iter()
                    .map(|value| partition.continuous_part_index(*value))
                    .collect();
                let mut part_frequencies = vec![0; partition.part_number()];
                for part in &part_indexes {
                    part_frequencies[*part] += 1;
                }
                self.target_partition = Some(TargetPartition {
                    partition,
                    part_indexes,
                    part_frequencies,
                });
            }
            None => return Err(LearningError::UnknownAttribute(self.target_attribute_name.clone())),
        }

        if let Some(target) = &self.target_partition {
            let n = self.instance_number;
            if n > 0 {
                let j = target.part_number().max(1);
                self.null_preparation_cost = (n as f64).ln() + ln_binomial(n + j - 1, j - 1);
                self.null_data_cost = ln_factorial(n)
                    - target
                        .part_frequencies
                        .iter()
                        .map(|frequency| ln_factorial(*frequency))
                        .sum::<f64>();
            }
        }
        Ok(())
    }

    /// Class of the instances.
    #[must_use]
    pub const fn class(&self) -> &Class {
        &self.class
    }

    /// Name of the source database.
    #[must_use]
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Target attribute name, empty when unsupervised.
    #[must_use]
    pub fn target_attribute_name(&self) -> &str {
        &self.target_attribute_name
    }

    /// Target type: symbol, continuous or none.
    #[must_use]
    pub const fn target_attribute_type(&self) -> ValueType {
        self.target_type
    }

    /// Whether a target is set.
    #[must_use]
    pub fn is_supervised(&self) -> bool {
        self.target_type != ValueType::None
    }

    /// Number of selected instances.
    #[must_use]
    pub const fn instance_number(&self) -> usize {
        self.instance_number
    }

    /// Explanatory attributes, in class order.
    #[must_use]
    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    /// Number of explanatory attributes.
    #[must_use]
    pub fn initial_attribute_number(&self) -> usize {
        self.attribute_names.len()
    }

    /// Values of an attribute.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Descriptive stats of the target.
    #[must_use]
    pub const fn target_descriptive_stats(&self) -> Option<&DescriptiveStats> {
        self.target_descriptive_stats.as_ref()
    }

    /// Univariate grid of the target values.
    #[must_use]
    pub const fn target_value_stats(&self) -> Option<&DataGridStats> {
        self.target_value_stats.as_ref()
    }

    /// Target partition used by supervised preparation.
    #[must_use]
    pub const fn target_partition(&self) -> Option<&TargetPartition> {
        self.target_partition.as_ref()
    }

    /// Construction cost of the null model.
    #[must_use]
    pub const fn null_construction_cost(&self) -> f64 {
        self.null_construction_cost
    }

    /// Preparation cost of the null model.
    #[must_use]
    pub const fn null_preparation_cost(&self) -> f64 {
        self.null_preparation_cost
    }

    /// Data cost of the null model.
    #[must_use]
    pub const fn null_data_cost(&self) -> f64 {
        self.null_data_cost
    }

    /// Total cost of the null model.
    #[must_use]
    pub fn null_cost(&self) -> f64 {
        self.null_construction_cost + self.null_preparation_cost + self.null_data_cost
    }

    /// Partitioning parameters.
    #[must_use]
    pub const fn preparation(&self) -> &PreparationConfig {
        &self.preparation
    }

    /// Numerical thresholds.
    #[must_use]
    pub const fn numerics(&self) -> &NumericsConfig {
        &self.numerics
    }
}

/// Univariate grid of the target parts with their frequencies.
fn univariate_grid(target: &TargetPartition) -> DataGridStats {
    let mut grid = DataGridStats::new(vec![target.partition.clone()], 0);
    for (index, frequency) in target.part_frequencies.iter().enumerate() {
        grid.set_cell_frequency_at(&[index], *frequency);
    }
    grid
}

/// Bounds of at most `interval_number` equal-frequency intervals, at mid-points
/// between distinct values; missing values get their own first interval.
pub(crate) fn equal_frequency_bounds(table: &TupleTable<f64>, interval_number: usize) -> Vec<f64> {
    let tuples = table.tuples();
    let mut bounds = Vec::new();
    let mut start = 0;
    if let Some(first) = tuples.first() {
        if first.key == crate::dictionary::value::MISSING_VALUE {
            start = 1;
            if tuples.len() > 1 {
                bounds.push(first.key);
            }
        }
    }
    let present = &tuples[start..];
    let total: usize = present.iter().map(|tuple| tuple.frequency).sum();
    if present.len() < 2 || interval_number < 2 || total == 0 {
        return bounds;
    }
    let mut cumulated = 0;
    let mut next_threshold = 1;
    for pair in present.windows(2) {
        cumulated += pair[0].frequency;
        if next_threshold >= interval_number {
            break;
        }
        if cumulated * interval_number >= next_threshold * total {
            bounds.push((pair[0].key + pair[1].key) / 2.0);
            while next_threshold < interval_number && cumulated * interval_number >= next_threshold * total {
                next_threshold += 1;
            }
        }
    }
    bounds
}

fn collect_columns(
    class: &Class,
    database: &Database,
    names: &[String],
    cancel: &CancellationToken,
) -> Result<IndexMap<String, Column>, LearningError> {
    let mut columns: IndexMap<String, Column> = names
        .iter()
        .map(|name| {
            let value_type = class
                .lookup_attribute(name)
                .map_or(ValueType::Symbol, |attribute| attribute.value_type);
            let column = if value_type == ValueType::Continuous {
                Column::Continuous(Vec::new())
            } else {
                Column::Symbol(Vec::new())
            };
            (name.clone(), column)
        })
        .collect();
    let direct: Option<Vec<usize>> = names.iter().map(|name| database.column_index(name)).collect();
    let database_names = database.attribute_names();

    for (index, record) in database.selected_records().enumerate() {
        if index % 1024 == 0 && cancel.is_cancelled() {
            return Err(LearningError::Evaluation("reading instances interrupted".into()));
        }
        if let Some(positions) = &direct {
            for (column, position) in columns.values_mut().zip(positions) {
                push_value(column, &record[*position]);
            }
        } else {
            let values = class.evaluate(database_names, record)?;
            for (name, column) in &mut columns {
                let value = values
                    .get(name)
                    .ok_or_else(|| LearningError::UnknownAttribute(name.clone()))?;
                push_value(column, value);
            }
        }
    }
    Ok(columns)
}

fn push_value(column: &mut Column, value: &Value) {
    match column {
        Column::Continuous(values) => values.push(value.as_continuous()),
        Column::Symbol(values) => values.push(value.as_symbol().to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::{
        class::Attribute,
        rule::{DerivationRule, Operand},
        value::MISSING_VALUE,
    };

    fn toy() -> (Class, Database) {
        let mut class = Class::new("Toy");
        class
            .insert_attribute(Attribute::new("x", ValueType::Continuous))
            .unwrap();
        class
            .insert_attribute(Attribute::new("y", ValueType::Symbol))
            .unwrap();
        class
            .insert_attribute(Attribute::derived(
                "x2",
                DerivationRule::Product(vec![Operand::Attribute("x".into()), Operand::Constant(2.0)]),
            ))
            .unwrap();
        class.compile().unwrap();
        let records = (0..8)
            .map(|index| {
                vec![
                    Value::Continuous(f64::from(index)),
                    Value::Symbol(if index < 6 { "a" } else { "b" }.into()),
                ]
            })
            .collect();
        let database = Database::from_records("toy", &class, records).unwrap();
        (class, database)
    }

    #[test]
    fn supervised_spec_computes_target_partition_and_null_costs() {
        let (class, database) = toy();
        let spec = LearningSpec::build(
            &class,
            &database,
            "y",
            PreparationConfig::default(),
            NumericsConfig::default(),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(spec.attribute_names(), &["x".to_owned(), "x2".to_owned()]);
        let target = spec.target_partition().unwrap();
        assert_eq!(target.part_frequencies(), &[6, 2]);
        assert_eq!(target.partition().part_label(0), "a");
        let expected_data = ln_factorial(8) - ln_factorial(6) - ln_factorial(2);
        assert!((spec.null_data_cost() - expected_data).abs() < 1e-9);
        assert!((spec.null_preparation_cost() - (8.0_f64.ln() + ln_binomial(9, 1))).abs() < 1e-9);
        match spec.column("x2").unwrap() {
            Column::Continuous(values) => assert!((values[3] - 6.0).abs() < 1e-12),
            Column::Symbol(_) => panic!("x2 is numerical"),
        }
    }

    #[test]
    fn unsupervised_spec_has_no_costs() {
        let (class, database) = toy();
        let spec = LearningSpec::build(
            &class,
            &database,
            "",
            PreparationConfig::default(),
            NumericsConfig::default(),
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(!spec.is_supervised());
        assert_eq!(spec.initial_attribute_number(), 3);
        assert!(spec.null_cost().abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_target_is_rejected() {
        let (class, database) = toy();
        let result = LearningSpec::build(
            &class,
            &database,
            "z",
            PreparationConfig::default(),
            NumericsConfig::default(),
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(LearningError::UnknownAttribute(_))));
    }

    #[test]
    fn equal_frequency_bounds_isolate_missing() {
        let table = TupleTable::from_keys([MISSING_VALUE, 1.0, 2.0, 3.0, 4.0]);
        let bounds = equal_frequency_bounds(&table, 2);
        assert_eq!(bounds[0], MISSING_VALUE);
        assert_eq!(bounds.len(), 2);
        assert!((bounds[1] - 2.5).abs() < 1e-12);
    }
}
