use std::fmt;

use super::{
    data_grid::{AttributePartition, PartitionKind},
    descriptive::{DescriptiveContinuousStats, DescriptiveStats, DescriptiveSymbolStats},
    grouper::Grouper,
    learning_spec::{Column, LearningSpec},
    modl::{discretize, unsupervised_discretize, OptimizedPartition},
    preparation::{DataPreparationStats, PreparationState},
    report::LearningReport,
    tuple_table::TupleTable,
};
use crate::{
    cancellation::CancellationToken,
    dictionary::value::{format_continuous, ValueType, STAR_VALUE},
    errors::LearningError,
    json_writer::JsonWriter,
    serializer::{Serializer, StreamSerializable},
};

/// Descriptive and preparation stats of one attribute.
#[derive(Debug, Clone)]
pub struct AttributeStats {
    attribute_name: String,
    value_type: ValueType,
    identifier: String,
    target_attribute_name: String,
    target_type: ValueType,
    null_construction_cost: f64,
    null_preparation_cost: f64,
    null_data_cost: f64,
    descriptive: DescriptiveStats,
    input_values: Vec<(String, usize)>,
    state: PreparationState,
    stats_computed: bool,
}

impl AttributeStats {
    /// Empty stats of an attribute.
    #[must_use]
    pub fn new(attribute_name: impl Into<String>, value_type: ValueType) -> Self {
        let attribute_name = attribute_name.into();
        Self {
            descriptive: DescriptiveStats::new(&attribute_name, value_type),
            attribute_name,
            value_type,
            identifier: String::new(),
            target_attribute_name: String::new(),
            target_type: ValueType::None,
            null_construction_cost: 0.0,
            null_preparation_cost: 0.0,
            null_data_cost: 0.0,
            input_values: Vec::new(),
            state: PreparationState::default(),
            stats_computed: false,
        }
    }

    /// Computes the descriptive stats and the preparation of the attribute.
    ///
    /// Returns `Ok(false)` when interrupted; the stats are then left uncomputed.
    pub fn compute_stats(
        &mut self,
        spec: &LearningSpec,
        cancel: &CancellationToken,
    ) -> Result<bool, LearningError> {
        self.compute_stats_with_grouper(spec, &Grouper::from_config(spec.preparation()), cancel)
    }

    /// Same as [`AttributeStats::compute_stats`], grouping categorical values with `grouper`.
    pub fn compute_stats_with_grouper(
        &mut self,
        spec: &LearningSpec,
        grouper: &Grouper,
        cancel: &CancellationToken,
    ) -> Result<bool, LearningError> {
        self.clean();
        self.target_attribute_name = spec.target_attribute_name().to_owned();
        self.target_type = spec.target_attribute_type();
        self.null_construction_cost = spec.null_construction_cost();
        self.null_preparation_cost = spec.null_preparation_cost();
        self.null_data_cost = spec.null_data_cost();
        self.state = PreparationState::new(spec.numerics());

        let column = spec
            .column(&self.attribute_name)
            .ok_or_else(|| LearningError::UnknownAttribute(self.attribute_name.clone()))?;
        if column.value_type() != self.value_type {
            return Err(LearningError::InvalidArgument(format!(
                "variable {} is {}, not {}",
                self.attribute_name,
                column.value_type(),
                self.value_type
            )));
        }

        let computed = match column {
            Column::Continuous(values) => {
                let table = TupleTable::from_keys(values.iter().copied());
                let mut stats = DescriptiveContinuousStats::new(&self.attribute_name);
                let computed = stats.compute_stats(&table, cancel);
                self.descriptive = DescriptiveStats::Continuous(stats);
                computed
            }
            Column::Symbol(values) => {
                let table = TupleTable::from_keys(values.iter().cloned());
                let mut stats = DescriptiveSymbolStats::new(&self.attribute_name);
                let computed = stats.compute_stats(&table, cancel);
                self.descriptive = DescriptiveStats::Symbol(stats);
                let mut input_values: Vec<(String, usize)> = table
                    .tuples()
                    .iter()
                    .map(|tuple| (tuple.key.clone(), tuple.frequency))
                    .collect();
                input_values.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                self.input_values = input_values;
                computed
            }
        };
        if !computed || cancel.is_cancelled() {
            self.clean();
            return Ok(false);
        }

        let optimized = self.optimize(column, spec, grouper);
        match spec.target_partition() {
            Some(target) => {
                let grid = optimized.to_data_grid(Some(target.partition()));
                self.state.set_grid(Some(grid));
                let attribute_number = spec.initial_attribute_number().max(1) as f64;
                self.state
                    .set_construction_cost(spec.null_construction_cost() + attribute_number.ln())?;
                self.state.set_preparation_cost(optimized.preparation_cost)?;
                self.state.set_data_cost(optimized.data_cost)?;
                let null = self.null_costs();
                self.state.compute_default_evaluation(null);
            }
            None => self.state.set_grid(Some(optimized.to_data_grid(None))),
        }
        self.stats_computed = true;
        Ok(true)
    }

    fn optimize(&self, column: &Column, spec: &LearningSpec, grouper: &Grouper) -> OptimizedPartition {
        let preparation = spec.preparation();
        let epsilon = spec.numerics().epsilon_cost;
        match (column, spec.target_partition()) {
            (Column::Continuous(values), Some(target)) => discretize(
                &self.attribute_name,
                values,
                target,
                preparation.min_interval_frequency,
                epsilon,
            ),
            (Column::Continuous(values), None) => unsupervised_discretize(
                &self.attribute_name,
                values,
                preparation.unsupervised_interval_number,
            ),
            (Column::Symbol(values), target) => {
                grouper.group(&self.attribute_name, values, target, epsilon)
            }
        }
    }

    /// Resets to the uncomputed state.
    pub fn clean(&mut self) {
        self.descriptive = DescriptiveStats::new(&self.attribute_name, self.value_type);
        self.input_values.clear();
        self.state.clean();
        self.stats_computed = false;
    }

    /// Attribute name.
    #[must_use]
    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    /// Attribute type.
    #[must_use]
    pub const fn attribute_type(&self) -> ValueType {
        self.value_type
    }

    /// Descriptive stats.
    #[must_use]
    pub const fn descriptive_stats(&self) -> &DescriptiveStats {
        &self.descriptive
    }

    /// Distinct categorical values by decreasing frequency.
    #[must_use]
    pub fn input_values(&self) -> &[(String, usize)] {
        &self.input_values
    }

    /// Parts of the prepared attribute, 1 when uninformative.
    #[must_use]
    pub fn part_number(&self) -> usize {
        self.state
            .grid()
            .map_or(1, |grid| grid.attribute_at(0).part_number())
    }

    fn target_part_number(&self) -> Option<usize> {
        if self.target_type != ValueType::Continuous {
            return None;
        }
        self.state.grid().map(|grid| grid.compute_target_grid_size())
    }

    fn is_supervised(&self) -> bool {
        self.target_type != ValueType::None
    }

    fn parts_header(&self) -> &'static str {
        if self.value_type == ValueType::Continuous {
            "Intervals"
        } else {
            "Groups"
        }
    }
}

impl LearningReport for AttributeStats {
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
        &self.attribute_name
    }

    fn sort_value(&self) -> f64 {
        self.state.level()
    }

    fn is_reported(&self) -> bool {
        if !self.stats_computed {
            return false;
        }
        if self.state.level() > 0.0 {
            return true;
        }
        !self.is_supervised()
            && self.state.grid().is_some_and(|grid| {
                grid.compute_total_grid_size() > 1
                    || (self.value_type == ValueType::Continuous
                        && self.descriptive.value_number() > 1)
            })
    }

    fn write_header_line_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, "Rank\tName")?;
        if self.is_supervised() {
            write!(out, "\tLevel")?;
        }
        if self.target_type == ValueType::Continuous {
            write!(out, "\tTarget intervals")?;
        }
        write!(out, "\t{}\t", self.parts_header())?;
        self.descriptive.write_header_line_report(out)?;
        if self.is_supervised() {
            write!(out, "\tConstr. cost\tPrep. cost\tData cost")?;
        }
        Ok(())
    }

    fn write_line_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, "{}\t{}", self.identifier, self.attribute_name)?;
        if self.is_supervised() {
            write!(out, "\t{}", format_continuous(self.state.level()))?;
        }
        if self.target_type == ValueType::Continuous {
            write!(out, "\t{}", self.target_part_number().unwrap_or(1))?;
        }
        write!(out, "\t{}\t", self.part_number())?;
        self.descriptive.write_line_report(out)?;
        if self.is_supervised() {
            write!(
                out,
                "\t{}\t{}\t{}",
                format_continuous(self.state.construction_cost()),
                format_continuous(self.state.preparation_cost()),
                format_continuous(self.state.data_cost())
            )?;
        }
        Ok(())
    }

    fn write_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "Rank\t{}", self.identifier)?;
        writeln!(out)?;
        if let Some(grid) = self.state.grid() {
            grid.write_report(out)?;
        }
        if !self.input_values.is_empty() {
            writeln!(out)?;
            writeln!(out, "Input values\t{}", self.input_values.len())?;
            writeln!(out, "Value\tFrequency\tCoverage")?;
            let total: usize = self.input_values.iter().map(|(_, frequency)| frequency).sum();
            let mut cumulated = 0;
            for (value, frequency) in &self.input_values {
                cumulated += frequency;
                writeln!(
                    out,
                    "{value}\t{frequency}\t{}",
                    format_continuous(cumulated as f64 / total.max(1) as f64)
                )?;
            }
        }
        Ok(())
    }

    fn write_json_array_report_fields(&self, json: &mut JsonWriter, summary: bool) {
        json.write_key_string("rank", &self.identifier);
        json.write_key_string("name", &self.attribute_name);
        json.write_key_string("type", self.value_type.label());
        if summary {
            if self.is_supervised() {
                json.write_key_double("level", self.state.level());
            }
            if let Some(target_parts) = self.target_part_number() {
                json.write_key_count("targetParts", target_parts);
            }
            json.write_key_count("parts", self.part_number());
            self.descriptive.write_json_fields(json);
            if self.is_supervised() {
                self.state.write_json_cost_fields(json, false);
            }
        } else {
            if let Some(grid) = self.state.grid() {
                json.begin_key_object("dataGrid");
                grid.write_json_fields(json);
                json.end_object();
            }
            if !self.input_values.is_empty() {
                json.begin_key_object("inputValues");
                json.begin_key_array("values");
                for (value, _) in &self.input_values {
                    json.write_string(value);
                }
                json.end_array();
                json.begin_key_array("frequencies");
                for (_, frequency) in &self.input_values {
                    json.write_count(*frequency);
                }
                json.end_array();
                json.end_object();
            }
        }
    }
}

impl DataPreparationStats for AttributeStats {
    fn state(&self) -> &PreparationState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PreparationState {
        &mut self.state
    }

    fn attribute_names(&self) -> Vec<String> {
        vec![self.attribute_name.clone()]
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

    fn descriptive_continuous_stats(&self) -> Option<&DescriptiveContinuousStats> {
        self.descriptive.as_continuous()
    }
}

impl StreamSerializable for AttributeStats {
    fn serialize(&self, stream: &mut Serializer) -> Result<(), LearningError> {
        stream.put_string(&self.attribute_name)?;
        stream.put_string(&self.identifier)?;
        stream.put_boolean(self.stats_computed)?;
        self.descriptive.serialize(stream)?;
        stream.put_count(self.input_values.len())?;
        for (value, frequency) in &self.input_values {
            stream.put_string(value)?;
            stream.put_count(*frequency)?;
        }
        self.state.serialize(stream)
    }

    fn deserialize(&mut self, stream: &mut Serializer) -> Result<(), LearningError> {
        self.attribute_name = stream.get_string()?;
        self.identifier = stream.get_string()?;
        self.stats_computed = stream.get_boolean()?;
        self.descriptive.deserialize(stream)?;
        let value_number = stream.get_count()?;
        self.input_values = (0..value_number)
            .map(|_| -> Result<(String, usize), LearningError> {
                Ok((stream.get_string()?, stream.get_count()?))
            })
            .collect::<Result<_, _>>()?;
        self.state.deserialize(stream)
    }
}

/// Prepared partition of an attribute, or a single part when the preparation was
/// uninformative.
#[must_use]
pub fn univariate_partition_of(stats: &AttributeStats) -> AttributePartition {
    if let Some(grid) = stats.state.grid() {
        return grid.attribute_at(0).clone();
    }
    let kind = if stats.value_type == ValueType::Continuous {
        PartitionKind::Discretization { bounds: Vec::new() }
    } else {
        PartitionKind::Grouping {
            groups: vec![vec![STAR_VALUE.to_owned()]],
        }
    };
    AttributePartition::new(stats.attribute_name.clone(), kind)
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

    fn spec(target: &str) -> LearningSpec {
        let mut class = Class::new("T");
        for (name, value_type) in [
            ("x", ValueType::Continuous),
            ("noise", ValueType::Continuous),
            ("color", ValueType::Symbol),
            ("y", ValueType::Symbol),
        ] {
            class.insert_attribute(Attribute::new(name, value_type)).unwrap();
        }
        class.compile().unwrap();
        let records = (0..60)
            .map(|index| {
                let positive = index >= 30;
                vec![
                    Value::Continuous(f64::from(index)),
                    Value::Continuous(f64::from((index * 7) % 13)),
                    Value::Symbol(if positive { "red" } else { "blue" }.into()),
                    Value::Symbol(if positive { "yes" } else { "no" }.into()),
                ]
            })
            .collect();
        let database = Database::from_records("t", &class, records).unwrap();
        LearningSpec::build(
            &class,
            &database,
            target,
            PreparationConfig::default(),
            NumericsConfig::default(),
            &CancellationToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn informative_attribute_gets_a_positive_level() {
        let spec = spec("y");
        let mut stats = AttributeStats::new("x", ValueType::Continuous);
        assert!(stats.compute_stats(&spec, &CancellationToken::new()).unwrap());
        assert!(stats.level() > 0.0 && stats.level() <= 1.0);
        assert_eq!(stats.part_number(), 2);
        assert!(stats.is_reported());
        assert!(stats.descriptive_continuous_stats().is_some());
        let expected_construction = (spec.initial_attribute_number() as f64).ln();
        assert!((stats.construction_cost() - expected_construction).abs() < 1e-9);
    }

    #[test]
    fn noise_attribute_keeps_a_single_part_grid() {
        let spec = spec("y");
        let mut stats = AttributeStats::new("noise", ValueType::Continuous);
        assert!(stats.compute_stats(&spec, &CancellationToken::new()).unwrap());
        assert_eq!(stats.level(), 0.0);
        assert!(stats.preparation_cost() > 0.0);
        let grid = stats.prepared_data_grid_stats().unwrap();
        assert_eq!(grid.compute_source_grid_size(), 1);
        assert_eq!(grid.compute_informative_attribute_number(), 0);
        assert_eq!(stats.part_number(), 1);
        assert!(!stats.is_reported());
    }

    #[test]
    fn categorical_report_lists_input_values() {
        let spec = spec("y");
        let mut stats = AttributeStats::new("color", ValueType::Symbol);
        stats.compute_stats(&spec, &CancellationToken::new()).unwrap();
        stats.set_identifier("R1".into());
        let mut header = String::new();
        stats.write_header_line_report(&mut header).unwrap();
        assert_eq!(
            header,
            "Rank\tName\tLevel\tGroups\tValues\tMode\tMode frequency\tConstr. cost\tPrep. cost\tData cost"
        );
        let mut report = String::new();
        stats.write_report(&mut report).unwrap();
        assert!(report.starts_with("Rank\tR1\n"));
        assert!(report.contains("Value\tFrequency\tCoverage\nblue\t30\t0.5\nred\t30\t1\n"));
    }

    #[test]
    fn unsupervised_attribute_keeps_its_partition() {
        let spec = spec("");
        let mut stats = AttributeStats::new("x", ValueType::Continuous);
        stats.compute_stats(&spec, &CancellationToken::new()).unwrap();
        assert_eq!(stats.part_number(), 10);
        assert_eq!(stats.level(), 0.0);
        let grid = stats.prepared_data_grid_stats().unwrap();
        assert!(!grid.is_supervised());
    }

    #[test]
    fn cancelled_computation_leaves_stats_uncomputed() {
        let spec = spec("y");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut stats = AttributeStats::new("x", ValueType::Continuous);
        assert!(!stats.compute_stats(&spec, &cancel).unwrap());
        assert!(!stats.is_stats_computed());
    }
}
