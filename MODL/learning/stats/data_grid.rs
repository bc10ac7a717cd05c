use std::fmt;

use crate::{
    dictionary::value::{format_continuous, Value, ValueType, MISSING_VALUE, STAR_VALUE},
    errors::LearningError,
    json_writer::JsonWriter,
    serializer::{Serializer, StreamSerializable},
};

/// Values shown in a group label before the ellipsis.
const GROUP_LABEL_VALUE_NUMBER: usize = 3;

/// Partition of one attribute of a grid.
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionKind {
    /// Intervals `]b[i-1], b[i]]`; a first bound equal to the missing value isolates
    /// missing values in the first interval.
    Discretization {
        /// Upper bounds of every interval but the last.
        bounds: Vec<f64>,
    },
    /// Groups of values; the group holding `*` receives unlisted values.
    Grouping {
        /// Values of each group.
        groups: Vec<Vec<String>>,
    },
    /// One part per numerical value.
    ContinuousValues {
        /// Distinct values.
        values: Vec<f64>,
    },
    /// One part per categorical value; `*` receives unlisted values.
    SymbolValues {
        /// Distinct values.
        values: Vec<String>,
    },
}

impl PartitionKind {
    const fn tag(&self) -> &'static str {
        match self {
            Self::Discretization { .. } => "Intervals",
            Self::Grouping { .. } => "Value groups",
            Self::ContinuousValues { .. } => "Numerical values",
            Self::SymbolValues { .. } => "Categorical values",
        }
    }
}

/// Partitioned attribute of a grid.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePartition {
    /// Partitioned attribute.
    pub attribute_name: String,
    /// Partition.
    pub kind: PartitionKind,
}

impl AttributePartition {
    /// Creates a partition.
    #[must_use]
    pub fn new(attribute_name: impl Into<String>, kind: PartitionKind) -> Self {
        Self {
            attribute_name: attribute_name.into(),
            kind,
        }
    }

    /// Type of the partitioned attribute.
    #[must_use]
    pub const fn attribute_type(&self) -> ValueType {
        match self.kind {
            PartitionKind::Discretization { .. } | PartitionKind::ContinuousValues { .. } => {
                ValueType::Continuous
            }
            PartitionKind::Grouping { .. } | PartitionKind::SymbolValues { .. } => ValueType::Symbol,
        }
    }

    /// Number of parts.
    #[must_use]
    pub fn part_number(&self) -> usize {
        match &self.kind {
            PartitionKind::Discretization { bounds } => bounds.len() + 1,
            PartitionKind::Grouping { groups } => groups.len(),
            PartitionKind::ContinuousValues { values } => values.len(),
            PartitionKind::SymbolValues { values } => values.len(),
        }
    }

    /// Part holding a value.
    #[must_use]
    pub fn part_index(&self, value: &Value) -> usize {
        match self.attribute_type() {
            ValueType::Continuous => self.continuous_part_index(value.as_continuous()),
            _ => self.symbol_part_index(value.as_symbol()),
        }
    }

    /// Part holding a numerical value.
    #[must_use]
    pub fn continuous_part_index(&self, value: f64) -> usize {
        match &self.kind {
            PartitionKind::Discretization { bounds } => bounds.partition_point(|bound| *bound < value),
            PartitionKind::ContinuousValues { values } => values
                .iter()
                .position(|candidate| candidate.total_cmp(&value).is_eq())
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Part holding a categorical value.
    #[must_use]
    pub fn symbol_part_index(&self, value: &str) -> usize {
        match &self.kind {
            PartitionKind::Grouping { groups } => {
                let find = |target: &str| {
                    groups
                        .iter()
                        .position(|group| group.iter().any(|candidate| candidate == target))
                };
                find(value).or_else(|| find(STAR_VALUE)).unwrap_or(0)
            }
            PartitionKind::SymbolValues { values } => {
                let find = |target: &str| values.iter().position(|candidate| candidate == target);
                find(value).or_else(|| find(STAR_VALUE)).unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Printable label of a part.
    #[must_use]
    pub fn part_label(&self, index: usize) -> String {
        match &self.kind {
            PartitionKind::Discretization { bounds } => interval_label(bounds, index),
            PartitionKind::Grouping { groups } => group_label(&groups[index]),
            PartitionKind::ContinuousValues { values } => format_continuous(values[index]),
            PartitionKind::SymbolValues { values } => values[index].clone(),
        }
    }

    fn write_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "{}\t{}\t{}",
            self.attribute_name,
            self.attribute_type(),
            self.kind.tag()
        )?;
        for index in 0..self.part_number() {
            writeln!(out, "\t{}", self.part_label(index))?;
        }
        Ok(())
    }

    fn write_json(&self, json: &mut JsonWriter) {
        json.begin_object();
        json.write_key_string("variable", &self.attribute_name);
        json.write_key_string("type", self.attribute_type().label());
        json.write_key_string("partitionType", self.kind.tag());
        json.begin_key_array("partition");
        match &self.kind {
            PartitionKind::Discretization { bounds } => {
                for index in 0..=bounds.len() {
                    json.write_string(&interval_label(bounds, index));
                }
            }
            PartitionKind::Grouping { groups } => {
                for group in groups {
                    json.begin_array();
                    for value in group {
                        json.write_string(value);
                    }
                    json.end_array();
                }
            }
            PartitionKind::ContinuousValues { values } => {
                for value in values {
                    json.write_double(*value);
                }
            }
            PartitionKind::SymbolValues { values } => {
                for value in values {
                    json.write_string(value);
                }
            }
        }
        json.end_array();
        json.end_object();
    }
}

fn interval_label(bounds: &[f64], index: usize) -> String {
    let missing_first = bounds.first() == Some(&MISSING_VALUE);
    if missing_first && index == 0 {
        return "Missing".into();
    }
    let lower = if index == 0 || (missing_first && index == 1) {
        "]-inf".to_owned()
    } else {
        format!("]{}", format_continuous(bounds[index - 1]))
    };
    let upper = bounds
        .get(index)
        .map_or_else(|| "+inf[".to_owned(), |bound| format!("{}]", format_continuous(*bound)));
    format!("{lower},{upper}")
}

fn group_label(group: &[String]) -> String {
    let listed: Vec<&str> = group
        .iter()
        .map(String::as_str)
        .filter(|value| *value != STAR_VALUE)
        .collect();
    if listed.is_empty() {
        return format!("{{{STAR_VALUE}}}");
    }
    let mut label = listed
        .iter()
        .take(GROUP_LABEL_VALUE_NUMBER)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    if listed.len() > GROUP_LABEL_VALUE_NUMBER {
        label.push_str(", ...");
    }
    format!("{{{label}}}")
}

/// Frequencies of the cells of a partitioned grid.
///
/// Attributes `0..source_attribute_number` are sources, the others targets. Cells are
/// stored flat with the first attribute varying fastest, so the flat index of a cell is
/// `source_cell + source_grid_size * target_cell`.
#[derive(Debug, Clone, PartialEq)]
pub struct DataGridStats {
    attributes: Vec<AttributePartition>,
    source_attribute_number: usize,
    frequencies: Vec<usize>,
}

impl DataGridStats {
    /// Creates a grid with zero frequencies.
    #[must_use]
    pub fn new(attributes: Vec<AttributePartition>, source_attribute_number: usize) -> Self {
        debug_assert!(source_attribute_number <= attributes.len());
        let size = attributes.iter().map(AttributePartition::part_number).product();
        Self {
            attributes,
            source_attribute_number,
            frequencies: vec![0; size],
        }
    }

    /// Number of attributes.
    #[must_use]
    pub fn attribute_number(&self) -> usize {
        self.attributes.len()
    }

    /// Attribute partition at an index.
    #[must_use]
    pub fn attribute_at(&self, index: usize) -> &AttributePartition {
        &self.attributes[index]
    }

    /// Attribute partitions.
    #[must_use]
    pub fn attributes(&self) -> &[AttributePartition] {
        &self.attributes
    }

    /// Number of source attributes; 0 for an unsupervised grid.
    #[must_use]
    pub const fn source_attribute_number(&self) -> usize {
        self.source_attribute_number
    }

    /// Number of target attributes.
    #[must_use]
    pub fn target_attribute_number(&self) -> usize {
        self.attributes.len() - self.source_attribute_number
    }

    /// Whether the grid has source attributes.
    #[must_use]
    pub const fn is_supervised(&self) -> bool {
        self.source_attribute_number > 0
    }

    /// Attribute names, in grid order.
    #[must_use]
    pub fn export_variable_names(&self) -> Vec<String> {
        self.attributes
            .iter()
            .map(|attribute| attribute.attribute_name.clone())
            .collect()
    }

    /// Product of the source part numbers, 1 without sources.
    #[must_use]
    pub fn compute_source_grid_size(&self) -> usize {
        self.attributes[..self.source_attribute_number]
            .iter()
            .map(AttributePartition::part_number)
            .product()
    }

    /// Product of the target part numbers, 1 without targets.
    #[must_use]
    pub fn compute_target_grid_size(&self) -> usize {
        self.attributes[self.source_attribute_number..]
            .iter()
            .map(AttributePartition::part_number)
            .product()
    }

    /// Number of cells.
    #[must_use]
    pub fn compute_total_grid_size(&self) -> usize {
        self.frequencies.len()
    }

    /// Sum of the cell frequencies.
    #[must_use]
    pub fn compute_grid_frequency(&self) -> usize {
        self.frequencies.iter().sum()
    }

    /// Number of cells located by the input attributes: the sources of a supervised
    /// grid, every attribute of an unsupervised one.
    #[must_use]
    pub fn compute_source_cell_number(&self) -> usize {
        if self.is_supervised() {
            self.compute_source_grid_size()
        } else {
            self.compute_total_grid_size()
        }
    }

    /// Number of source attributes with more than one part.
    #[must_use]
    pub fn compute_source_informative_attribute_number(&self) -> usize {
        self.attributes[..self.source_attribute_number]
            .iter()
            .filter(|attribute| attribute.part_number() > 1)
            .count()
    }

    /// Number of attributes with more than one part.
    #[must_use]
    pub fn compute_total_informative_attribute_number(&self) -> usize {
        self.attributes
            .iter()
            .filter(|attribute| attribute.part_number() > 1)
            .count()
    }

    /// Informative sources of a supervised grid, informative attributes otherwise.
    #[must_use]
    pub fn compute_informative_attribute_number(&self) -> usize {
        if self.source_attribute_number > 0 {
            self.compute_source_informative_attribute_number()
        } else {
            self.compute_total_informative_attribute_number()
        }
    }

    /// Entropy of the target marginal, in nats.
    #[must_use]
    pub fn compute_target_entropy(&self) -> f64 {
        let total = self.compute_grid_frequency() as f64;
        if total == 0.0 {
            return 0.0;
        }
        (0..self.compute_target_grid_size())
            .map(|target| self.target_cell_frequency_at(target) as f64 / total)
            .filter(|p| *p > 0.0)
            .map(|p| -p * p.ln())
            .sum()
    }

    /// Mutual information between the source and target cells, in nats.
    #[must_use]
    pub fn compute_mutual_entropy(&self) -> f64 {
        let total = self.compute_grid_frequency() as f64;
        if total == 0.0 {
            return 0.0;
        }
        let target_size = self.compute_target_grid_size();
        let target_frequencies: Vec<f64> = (0..target_size)
            .map(|target| self.target_cell_frequency_at(target) as f64)
            .collect();
        let mut mutual = 0.0;
        for source in 0..self.compute_source_grid_size() {
            let source_frequency = self.source_cell_frequency_at(source) as f64;
            for (target, target_frequency) in target_frequencies.iter().enumerate() {
                let frequency = self.cell_frequency(source, target) as f64;
                if frequency > 0.0 {
                    mutual += frequency / total
                        * (frequency * total / (source_frequency * target_frequency)).ln();
                }
            }
        }
        mutual
    }

    /// Flat index of a cell.
    #[must_use]
    pub fn cell_index(&self, part_indexes: &[usize]) -> usize {
        debug_assert_eq!(part_indexes.len(), self.attributes.len());
        let mut index = 0;
        let mut factor = 1;
        for (attribute, part) in self.attributes.iter().zip(part_indexes) {
            debug_assert!(*part < attribute.part_number());
            index += factor * part;
            factor *= attribute.part_number();
        }
        index
    }

    /// Frequency of a cell.
    #[must_use]
    pub fn cell_frequency_at(&self, part_indexes: &[usize]) -> usize {
        self.frequencies[self.cell_index(part_indexes)]
    }

    /// Sets the frequency of a cell.
    pub fn set_cell_frequency_at(&mut self, part_indexes: &[usize], frequency: usize) {
        let index = self.cell_index(part_indexes);
        self.frequencies[index] = frequency;
    }

    /// Adds to the frequency of a cell.
    pub fn add_cell_frequency_at(&mut self, part_indexes: &[usize], frequency: usize) {
        let index = self.cell_index(part_indexes);
        self.frequencies[index] += frequency;
    }

    /// Frequency of a (source cell, target cell) pair.
    #[must_use]
    pub fn cell_frequency(&self, source_cell: usize, target_cell: usize) -> usize {
        self.frequencies[source_cell + self.compute_source_grid_size() * target_cell]
    }

    /// Frequency of a source cell, summed over targets.
    #[must_use]
    pub fn source_cell_frequency_at(&self, source_cell: usize) -> usize {
        let source_size = self.compute_source_grid_size();
        (0..self.compute_target_grid_size())
            .map(|target| self.frequencies[source_cell + source_size * target])
            .sum()
    }

    /// Frequency of a target cell, summed over sources.
    #[must_use]
    pub fn target_cell_frequency_at(&self, target_cell: usize) -> usize {
        let source_size = self.compute_source_grid_size();
        self.frequencies[source_size * target_cell..source_size * (target_cell + 1)]
            .iter()
            .sum()
    }

    /// Frequency of an input cell (see [`compute_source_cell_number`](Self::compute_source_cell_number)).
    #[must_use]
    pub fn univariate_cell_frequency_at(&self, cell: usize) -> usize {
        if self.is_supervised() {
            self.source_cell_frequency_at(cell)
        } else {
            self.frequencies[cell]
        }
    }

    /// Input cell holding the given values of the input attributes.
    #[must_use]
    pub fn input_cell_index(&self, values: &[&Value]) -> usize {
        let mut index = 0;
        let mut factor = 1;
        for (attribute, value) in self.attributes.iter().zip(values) {
            index += factor * attribute.part_index(value);
            factor *= attribute.part_number();
        }
        index
    }

    /// Adds the frequencies of an identically partitioned grid.
    pub fn add_evaluated_data_grid_stats(&mut self, other: &Self) -> Result<(), LearningError> {
        if self.attributes != other.attributes
            || self.source_attribute_number != other.source_attribute_number
        {
            return Err(LearningError::InvalidArgument(
                "data grids with different partitions cannot be merged".into(),
            ));
        }
        for (frequency, added) in self.frequencies.iter_mut().zip(&other.frequencies) {
            *frequency += added;
        }
        Ok(())
    }

    /// Univariate grid of one attribute with its marginal frequencies.
    #[must_use]
    pub fn export_attribute_data_grid_stats_at(&self, attribute_index: usize) -> Self {
        let mut exported = Self::new(vec![self.attributes[attribute_index].clone()], 0);
        let mut stride = 1;
        for attribute in &self.attributes[..attribute_index] {
            stride *= attribute.part_number();
        }
        let part_number = self.attributes[attribute_index].part_number();
        for (index, frequency) in self.frequencies.iter().enumerate() {
            exported.frequencies[(index / stride) % part_number] += frequency;
        }
        exported
    }

    /// Decodes a flat index into part indexes.
    #[must_use]
    pub fn part_indexes_of(&self, mut cell: usize) -> Vec<usize> {
        self.attributes
            .iter()
            .map(|attribute| {
                let part = cell % attribute.part_number();
                cell /= attribute.part_number();
                part
            })
            .collect()
    }

    /// Text report: partitions, then the cell frequencies.
    pub fn write_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "Data grid\t{}",
            if self.is_supervised() { "Supervised" } else { "Unsupervised" }
        )?;
        writeln!(out, "Dimensions")?;
        for attribute in &self.attributes {
            attribute.write_report(out)?;
        }
        writeln!(out, "Cells")?;
        if self.is_supervised() {
            let target_size = self.compute_target_grid_size();
            write!(out, "Cell id")?;
            for target in 0..target_size {
                write!(out, "\t{}", self.target_cell_label(target))?;
            }
            writeln!(out, "\tTotal")?;
            for source in 0..self.compute_source_grid_size() {
                write!(out, "{}", self.source_cell_label(source))?;
                for target in 0..target_size {
                    write!(out, "\t{}", self.cell_frequency(source, target))?;
                }
                writeln!(out, "\t{}", self.source_cell_frequency_at(source))?;
            }
        } else {
            writeln!(out, "Cell id\tFrequency")?;
            for cell in 0..self.compute_total_grid_size() {
                writeln!(out, "{}\t{}", self.cell_label(cell), self.frequencies[cell])?;
            }
        }
        Ok(())
    }

    fn cell_label(&self, cell: usize) -> String {
        self.part_indexes_of(cell)
            .into_iter()
            .enumerate()
            .map(|(index, part)| self.attributes[index].part_label(part))
            .collect::<Vec<_>>()
            .join(" x ")
    }

    fn source_cell_label(&self, mut cell: usize) -> String {
        self.attributes[..self.source_attribute_number]
            .iter()
            .map(|attribute| {
                let label = attribute.part_label(cell % attribute.part_number());
                cell /= attribute.part_number();
                label
            })
            .collect::<Vec<_>>()
            .join(" x ")
    }

    fn target_cell_label(&self, mut cell: usize) -> String {
        self.attributes[self.source_attribute_number..]
            .iter()
            .map(|attribute| {
                let label = attribute.part_label(cell % attribute.part_number());
                cell /= attribute.part_number();
                label
            })
            .collect::<Vec<_>>()
            .join(" x ")
    }

    /// JSON fields: dimensions, then the non-empty cells.
    pub fn write_json_fields(&self, json: &mut JsonWriter) {
        json.write_key_boolean("isSupervised", self.is_supervised());
        json.begin_key_array("dimensions");
        for attribute in &self.attributes {
            attribute.write_json(json);
        }
        json.end_array();
        json.begin_key_array("cellPartIndexes");
        for (cell, frequency) in self.frequencies.iter().enumerate() {
            if *frequency > 0 {
                json.begin_array();
                for part in self.part_indexes_of(cell) {
                    json.write_count(part);
                }
                json.end_array();
            }
        }
        json.end_array();
        json.begin_key_array("cellFrequencies");
        for frequency in self.frequencies.iter().filter(|frequency| **frequency > 0) {
            json.write_count(*frequency);
        }
        json.end_array();
    }
}

impl StreamSerializable for DataGridStats {
    fn serialize(&self, stream: &mut Serializer) -> Result<(), LearningError> {
        stream.put_count(self.attributes.len())?;
        for attribute in &self.attributes {
            stream.put_string(&attribute.attribute_name)?;
            match &attribute.kind {
                PartitionKind::Discretization { bounds } => {
                    stream.put_int(0)?;
                    stream.put_count(bounds.len())?;
                    for bound in bounds {
                        stream.put_double(*bound)?;
                    }
                }
                PartitionKind::Grouping { groups } => {
                    stream.put_int(1)?;
                    stream.put_count(groups.len())?;
                    for group in groups {
                        stream.put_count(group.len())?;
                        for value in group {
                            stream.put_string(value)?;
                        }
                    }
                }
                PartitionKind::ContinuousValues { values } => {
                    stream.put_int(2)?;
                    stream.put_count(values.len())?;
                    for value in values {
                        stream.put_double(*value)?;
                    }
                }
                PartitionKind::SymbolValues { values } => {
                    stream.put_int(3)?;
                    stream.put_count(values.len())?;
                    for value in values {
                        stream.put_string(value)?;
                    }
                }
            }
        }
        stream.put_count(self.source_attribute_number)?;
        for frequency in &self.frequencies {
            stream.put_count(*frequency)?;
        }
        Ok(())
    }

    fn deserialize(&mut self, stream: &mut Serializer) -> Result<(), LearningError> {
        let attribute_number = stream.get_count()?;
        let mut attributes = Vec::with_capacity(attribute_number);
        for _ in 0..attribute_number {
            let name = stream.get_string()?;
            let tag = stream.get_int()?;
            let size = stream.get_count()?;
            let kind = match tag {
                0 => PartitionKind::Discretization {
                    bounds: (0..size).map(|_| stream.get_double()).collect::<Result<_, _>>()?,
                },
                1 => {
                    let mut groups = Vec::with_capacity(size);
                    for _ in 0..size {
                        let group_size = stream.get_count()?;
                        groups.push(
                            (0..group_size)
                                .map(|_| stream.get_string())
                                .collect::<Result<Vec<_>, _>>()?,
                        );
                    }
                    PartitionKind::Grouping { groups }
                }
                2 => PartitionKind::ContinuousValues {
                    values: (0..size).map(|_| stream.get_double()).collect::<Result<_, _>>()?,
                },
                3 => PartitionKind::SymbolValues {
                    values: (0..size).map(|_| stream.get_string()).collect::<Result<_, _>>()?,
                },
                other => {
                    return Err(LearningError::Stream(format!("unknown partition tag {other}")))
                }
            };
            attributes.push(AttributePartition::new(name, kind));
        }
        let source_attribute_number = stream.get_count()?;
        if source_attribute_number > attributes.len() {
            return Err(LearningError::Stream("source attribute number out of range".into()));
        }
        *self = Self::new(attributes, source_attribute_number);
        for frequency in &mut self.frequencies {
            *frequency = stream.get_count()?;
        }
        Ok(())
    }
}

/// Laplace-smoothed `ln P(source cell | target cell)` of a grid.
///
/// With `N` instances and `S` source cells, `eps = 1 / (N + 1)` and
/// `P(s | t) = (n(s, t) + eps) / (n(t) + S * eps)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConditionalLogProbs {
    source_size: usize,
    target_size: usize,
    log_probs: Vec<f64>,
}

impl SourceConditionalLogProbs {
    /// Computes the table of a grid.
    #[must_use]
    pub fn from_grid(grid: &DataGridStats) -> Self {
        let source_size = grid.compute_source_grid_size();
        let target_size = grid.compute_target_grid_size();
        let epsilon = 1.0 / (grid.compute_grid_frequency() as f64 + 1.0);
        let mut log_probs = Vec::with_capacity(source_size * target_size);
        for target in 0..target_size {
            let denominator =
                grid.target_cell_frequency_at(target) as f64 + source_size as f64 * epsilon;
            for source in 0..source_size {
                let numerator = grid.cell_frequency(source, target) as f64 + epsilon;
                log_probs.push((numerator / denominator).ln());
            }
        }
        Self {
            source_size,
            target_size,
            log_probs,
        }
    }

    /// Number of source cells.
    #[must_use]
    pub const fn source_size(&self) -> usize {
        self.source_size
    }

    /// Number of target cells.
    #[must_use]
    pub const fn target_size(&self) -> usize {
        self.target_size
    }

    /// `ln P(source | target)`.
    #[must_use]
    pub fn log_prob_at(&self, source: usize, target: usize) -> f64 {
        self.log_probs[source + self.source_size * target]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervised_grid() -> DataGridStats {
        let mut grid = DataGridStats::new(
            vec![
                AttributePartition::new(
                    "Age",
                    PartitionKind::Discretization {
                        bounds: vec![MISSING_VALUE, 30.0],
                    },
                ),
                AttributePartition::new(
                    "Class",
                    PartitionKind::SymbolValues {
                        values: vec!["yes".into(), "no".into()],
                    },
                ),
            ],
            1,
        );
        grid.set_cell_frequency_at(&[0, 0], 1);
        grid.set_cell_frequency_at(&[1, 0], 5);
        grid.set_cell_frequency_at(&[2, 1], 4);
        grid
    }

    #[test]
    fn pure_grid_shares_all_the_target_entropy() {
        let grid = supervised_grid();
        assert_eq!(grid.compute_informative_attribute_number(), 1);
        assert_eq!(grid.compute_total_informative_attribute_number(), 2);
        let expected = -(0.6_f64 * 0.6_f64.ln() + 0.4 * 0.4_f64.ln());
        assert!((grid.compute_target_entropy() - expected).abs() < 1e-12);
        assert!((grid.compute_mutual_entropy() - expected).abs() < 1e-12);

        let flat = grid.export_attribute_data_grid_stats_at(1);
        assert_eq!(flat.compute_informative_attribute_number(), 1);
    }

    #[test]
    fn sizes_and_marginals() {
        let grid = supervised_grid();
        assert_eq!(grid.compute_source_grid_size(), 3);
        assert_eq!(grid.compute_target_grid_size(), 2);
        assert_eq!(grid.compute_total_grid_size(), 6);
        assert_eq!(grid.compute_grid_frequency(), 10);
        assert_eq!(grid.univariate_cell_frequency_at(1), 5);
        assert_eq!(grid.target_cell_frequency_at(0), 6);
        assert_eq!(grid.compute_source_informative_attribute_number(), 1);
        let age = grid.export_attribute_data_grid_stats_at(0);
        assert_eq!(age.compute_grid_frequency(), 10);
        assert_eq!(age.univariate_cell_frequency_at(2), 4);
    }

    #[test]
    fn interval_labels_and_lookup() {
        let grid = supervised_grid();
        let age = grid.attribute_at(0);
        assert_eq!(age.part_label(0), "Missing");
        assert_eq!(age.part_label(1), "]-inf,30]");
        assert_eq!(age.part_label(2), "]30,+inf[");
        assert_eq!(age.continuous_part_index(MISSING_VALUE), 0);
        assert_eq!(age.continuous_part_index(30.0), 1);
        assert_eq!(age.continuous_part_index(30.5), 2);
    }

    #[test]
    fn group_labels_and_default_group() {
        let partition = AttributePartition::new(
            "Color",
            PartitionKind::Grouping {
                groups: vec![
                    vec!["red".into()],
                    vec!["blue".into(), "green".into(), "cyan".into(), "teal".into(), STAR_VALUE.into()],
                ],
            },
        );
        assert_eq!(partition.part_label(1), "{blue, green, cyan, ...}");
        assert_eq!(partition.symbol_part_index("red"), 0);
        assert_eq!(partition.symbol_part_index("purple"), 1);
    }

    #[test]
    fn merging_requires_same_partitions() {
        let mut grid = supervised_grid();
        let other = supervised_grid();
        grid.add_evaluated_data_grid_stats(&other).unwrap();
        assert_eq!(grid.compute_grid_frequency(), 20);
        let univariate = grid.export_attribute_data_grid_stats_at(0);
        assert!(grid.add_evaluated_data_grid_stats(&univariate).is_err());
    }

    #[test]
    fn serialization_round_trip() {
        let grid = supervised_grid();
        let mut stream = Serializer::new();
        stream.open_for_write();
        grid.serialize(&mut stream).unwrap();
        stream.close();
        let mut reader = Serializer::new();
        reader.open_for_read(stream.into_tokens());
        let mut copy = DataGridStats::new(Vec::new(), 0);
        copy.deserialize(&mut reader).unwrap();
        assert_eq!(copy, grid);
    }

    #[test]
    fn conditional_log_probs_are_normalised() {
        let grid = supervised_grid();
        let table = SourceConditionalLogProbs::from_grid(&grid);
        for target in 0..table.target_size() {
            let total: f64 = (0..table.source_size())
                .map(|source| table.log_prob_at(source, target).exp())
                .sum();
            assert!((total - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn report_lists_cells() {
        let grid = supervised_grid();
        let mut out = String::new();
        grid.write_report(&mut out).unwrap();
        assert!(out.contains("Cell id\tyes\tno\tTotal"));
        assert!(out.contains("]-inf,30]\t5\t0\t5"));
        let mut json = JsonWriter::new();
        json.begin_object();
        grid.write_json_fields(&mut json);
        json.end_object();
        let value = json.into_value();
        assert_eq!(value["cellFrequencies"].as_array().unwrap().len(), 3);
    }
}
