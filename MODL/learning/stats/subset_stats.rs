use std::fmt;

use super::{
    data_grid::{AttributePartition, DataGridStats, PartitionKind},
    learning_spec::{Column, LearningSpec},
    modl::{
        discretization_partition_cost, grouping_partition_cost, part_data_cost,
        part_indexes_of_continuous, part_indexes_of_symbols, part_preparation_cost,
        MAX_INITIAL_GROUPS,
    },
    preparation::{DataPreparationStats, PreparationState},
    report::LearningReport,
    stat::{ln_bell_partials, ln_binomial},
};
use crate::{
    cancellation::CancellationToken,
    dictionary::value::{format_continuous, ValueType},
    errors::LearningError,
    json_writer::JsonWriter,
};

/// Preparation of several attributes together: the cross product of their univariate
/// partitions against the target.
#[derive(Debug, Clone)]
pub struct AttributeSubsetStats {
    partitions: Vec<AttributePartition>,
    sort_name: String,
    identifier: String,
    target_attribute_name: String,
    target_type: ValueType,
    null_construction_cost: f64,
    null_preparation_cost: f64,
    null_data_cost: f64,
    state: PreparationState,
    stats_computed: bool,
}

impl AttributeSubsetStats {
    /// Subset of the attributes of the given partitions, in that order.
    #[must_use]
    pub fn new(partitions: Vec<AttributePartition>) -> Self {
        let sort_name = partitions
            .iter()
            .map(|partition| partition.attribute_name.as_str())
            .collect::<Vec<_>>()
            .join("`");
        Self {
            partitions,
            sort_name,
            identifier: String::new(),
            target_attribute_name: String::new(),
            target_type: ValueType::None,
            null_construction_cost: 0.0,
            null_preparation_cost: 0.0,
            null_data_cost: 0.0,
            state: PreparationState::default(),
            stats_computed: false,
        }
    }

    /// Computes the crossed grid and its costs; supervised specs only.
    ///
    /// Returns `Ok(false)` when interrupted.
    pub fn compute_stats(
        &mut self,
        spec: &LearningSpec,
        cancel: &CancellationToken,
    ) -> Result<bool, LearningError> {
        self.state = PreparationState::new(spec.numerics());
        self.stats_computed = false;
        self.target_attribute_name = spec.target_attribute_name().to_owned();
        self.target_type = spec.target_attribute_type();
        self.null_construction_cost = spec.null_construction_cost();
        self.null_preparation_cost = spec.null_preparation_cost();
        self.null_data_cost = spec.null_data_cost();
        let target = spec.target_partition().ok_or_else(|| {
            LearningError::InvalidArgument("variable subsets need a target variable".into())
        })?;

        let instance_number = spec.instance_number();
        let mut partition_cost = 0.0;
        let mut cell_parts: Vec<Vec<usize>> = Vec::with_capacity(self.partitions.len());
        for partition in &self.partitions {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            let column = spec
                .column(&partition.attribute_name)
                .ok_or_else(|| LearningError::UnknownAttribute(partition.attribute_name.clone()))?;
            let part_number = partition.part_number();
            match (column, &partition.kind) {
                (Column::Continuous(values), PartitionKind::Discretization { .. }) => {
                    partition_cost += discretization_partition_cost(instance_number, part_number);
                    cell_parts.push(part_indexes_of_continuous(partition, values));
                }
                (Column::Symbol(values), PartitionKind::Grouping { groups }) => {
                    let value_number = groups
                        .iter()
                        .map(Vec::len)
                        .sum::<usize>()
                        .clamp(1, MAX_INITIAL_GROUPS);
                    let bell = ln_bell_partials(value_number);
                    let part_number = part_number.min(value_number);
                    partition_cost +=
                        grouping_partition_cost(instance_number, value_number, part_number, &bell);
                    cell_parts.push(part_indexes_of_symbols(partition, values));
                }
                _ => {
                    return Err(LearningError::InvalidArgument(format!(
                        "partition of {} does not match its type",
                        partition.attribute_name
                    )))
                }
            }
        }

        let mut attributes = self.partitions.clone();
        attributes.push(target.partition().clone());
        let mut grid = DataGridStats::new(attributes, self.partitions.len());
        let mut part_indexes = vec![0; self.partitions.len() + 1];
        for (instance, target_part) in target.part_indexes().iter().enumerate() {
            for (slot, parts) in part_indexes.iter_mut().zip(&cell_parts) {
                *slot = parts[instance];
            }
            part_indexes[self.partitions.len()] = *target_part;
            grid.add_cell_frequency_at(&part_indexes, 1);
        }

        let target_size = grid.compute_target_grid_size();
        let mut preparation_cost = partition_cost;
        let mut data_cost = 0.0;
        for source in 0..grid.compute_source_grid_size() {
            let counts: Vec<usize> = (0..target_size)
                .map(|target_cell| grid.cell_frequency(source, target_cell))
                .collect();
            preparation_cost += part_preparation_cost(&counts);
            data_cost += part_data_cost(&counts);
        }
        let attribute_number = spec.initial_attribute_number();
        let construction_cost = spec.null_construction_cost()
            + ln_binomial(attribute_number, self.partitions.len()).max(0.0);

        self.state.set_grid(Some(grid));
        self.state.set_construction_cost(construction_cost)?;
        self.state.set_preparation_cost(preparation_cost)?;
        self.state.set_data_cost(data_cost)?;
        let null = self.null_costs();
        self.state.compute_compression_level(null);
        self.stats_computed = true;
        Ok(true)
    }

    /// Attribute names joined for display.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.partitions
            .iter()
            .map(|partition| partition.attribute_name.as_str())
            .collect::<Vec<_>>()
            .join(" x ")
    }

    fn grid_part_numbers(&self) -> Vec<usize> {
        self.state.grid().map_or_else(
            || vec![1; self.partitions.len()],
            |grid| {
                (0..self.partitions.len())
                    .map(|index| grid.attribute_at(index).part_number())
                    .collect()
            },
        )
    }
}

impl LearningReport for AttributeSubsetStats {
    fn is_stats_computed(&self) -> bool {
        self.stats_computed
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn set_identifier(&mut self, identifier: String) {
        self.identifier = identifier;
    }

    fn sort_name(&self) -> &str {
        &self.sort_name
    }

    fn sort_value(&self) -> f64 {
        self.state.level()
    }

    fn is_reported(&self) -> bool {
        self.stats_computed
            && self.state.level() > 0.0
            && self
                .state
                .grid()
                .is_some_and(|grid| grid.compute_informative_attribute_number() == self.partitions.len())
    }

    fn write_header_line_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, "Rank")?;
        for index in 1..=self.partitions.len() {
            write!(out, "\tName {index}")?;
        }
        write!(out, "\tLevel")?;
        for index in 1..=self.partitions.len() {
            write!(out, "\tParts {index}")?;
        }
        write!(out, "\tCells\tConstr. cost\tPrep. cost\tData cost")
    }

    fn write_line_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, "{}", self.identifier)?;
        for partition in &self.partitions {
            write!(out, "\t{}", partition.attribute_name)?;
        }
        write!(out, "\t{}", format_continuous(self.state.level()))?;
        let part_numbers = self.grid_part_numbers();
        for part_number in &part_numbers {
            write!(out, "\t{part_number}")?;
        }
        write!(
            out,
            "\t{}\t{}\t{}\t{}",
            part_numbers.iter().product::<usize>(),
            format_continuous(self.state.construction_cost()),
            format_continuous(self.state.preparation_cost()),
            format_continuous(self.state.data_cost())
        )
    }

    fn write_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "Rank\t{}", self.identifier)?;
        writeln!(out)?;
        match self.state.grid() {
            Some(grid) => grid.write_report(out),
            None => writeln!(out, "{}\tuninformative", self.display_name()),
        }
    }

    fn write_json_array_report_fields(&self, json: &mut JsonWriter, summary: bool) {
        json.write_key_string("rank", &self.identifier);
        for (index, partition) in self.partitions.iter().enumerate() {
            json.write_key_string(&format!("name{}", index + 1), &partition.attribute_name);
        }
        if summary {
            json.write_key_double("level", self.state.level());
            for (index, part_number) in self.grid_part_numbers().iter().enumerate() {
                json.write_key_count(&format!("parts{}", index + 1), *part_number);
            }
            self.state.write_json_cost_fields(json, false);
        } else if let Some(grid) = self.state.grid() {
            json.begin_key_object("dataGrid");
            grid.write_json_fields(json);
            json.end_object();
        }
    }
}

impl DataPreparationStats for AttributeSubsetStats {
    fn state(&self) -> &PreparationState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PreparationState {
        &mut self.state
    }

    fn attribute_names(&self) -> Vec<String> {
        self.partitions
            .iter()
            .map(|partition| partition.attribute_name.clone())
            .collect()
    }

    fn target_attribute_name(&self) -> &str {
        &self.target_attribute_name
    }

    fn target_attribute_type(&self) -> ValueType {
        self.target_type
    }

    fn null_construction_cost(&self) -> f64 {
        self.null_construction_cost
    }

    fn null_preparation_cost(&self) -> f64 {
        self.null_preparation_cost
    }

    fn null_data_cost(&self) -> f64 {
        self.null_data_cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{NumericsConfig, PreparationConfig},
        database::Database,
        dictionary::{
            class::{Attribute, Class},
            value::Value,
        },
    };

    /// `y` is the exclusive or of the signs of `a` and `b`.
    fn xor_spec() -> LearningSpec {
        let mut class = Class::new("Xor");
        for (name, value_type) in [
            ("a", ValueType::Continuous),
            ("b", ValueType::Continuous),
            ("y", ValueType::Symbol),
        ] {
            class.insert_attribute(Attribute::new(name, value_type)).unwrap();
        }
        class.compile().unwrap();
        let mut records = Vec::new();
        for index in 0..80 {
            let a = if index % 2 == 0 { -1.0 } else { 1.0 } * f64::from(index + 1);
            let b = if (index / 2) % 2 == 0 { -1.0 } else { 1.0 } * f64::from(index + 1);
            let label = if (a > 0.0) == (b > 0.0) { "same" } else { "different" };
            records.push(vec![
                Value::Continuous(a),
                Value::Continuous(b),
                Value::Symbol(label.into()),
            ]);
        }
        let database = Database::from_records("xor", &class, records).unwrap();
        LearningSpec::build(
            &class,
            &database,
            "y",
            PreparationConfig::default(),
            NumericsConfig::default(),
            &CancellationToken::new(),
        )
        .unwrap()
    }

    fn sign_partition(name: &str) -> AttributePartition {
        AttributePartition::new(name, PartitionKind::Discretization { bounds: vec![0.0] })
    }

    #[test]
    fn pair_captures_the_interaction() {
        let spec = xor_spec();
        let mut pair = AttributeSubsetStats::new(vec![sign_partition("a"), sign_partition("b")]);
        assert!(pair.compute_stats(&spec, &CancellationToken::new()).unwrap());
        assert!(pair.level() > 0.0);
        let grid = pair.prepared_data_grid_stats().unwrap();
        assert_eq!(grid.compute_source_grid_size(), 4);
        assert_eq!(grid.compute_grid_frequency(), 80);
        assert_eq!(pair.attribute_names(), vec!["a".to_owned(), "b".to_owned()]);
        assert!((pair.construction_cost() - 1.0_f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn single_part_partitions_are_uninformative() {
        let spec = xor_spec();
        let empty = |name: &str| AttributePartition::new(name, PartitionKind::Discretization { bounds: Vec::new() });
        let mut pair = AttributeSubsetStats::new(vec![empty("a"), empty("b")]);
        pair.compute_stats(&spec, &CancellationToken::new()).unwrap();
        assert_eq!(pair.level(), 0.0);
        assert!(!pair.is_reported());
        assert_eq!(
            pair.prepared_data_grid_stats().map(|grid| grid.compute_source_grid_size()),
            Some(1)
        );
        let mut line = String::new();
        pair.write_line_report(&mut line).unwrap();
        assert!(line.contains("\ta\tb\t0\t1\t1\t1\t"));
    }
}
