use std::fmt;

use crate::{
    cancellation::CancellationToken,
    dictionary::value::{format_continuous, ValueType, MISSING_VALUE},
    errors::LearningError,
    json_writer::JsonWriter,
    serializer::{Serializer, StreamSerializable},
};

use super::tuple_table::{TupleKey, TupleTable};

/// Entropies below this magnitude are reported as zero.
const ENTROPY_EPSILON: f64 = 1e-10;

/// Univariate summary of a numerical attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptiveContinuousStats {
    attribute_name: String,
    computed: bool,
    value_number: usize,
    min: f64,
    max: f64,
    mean: f64,
    standard_deviation: f64,
    missing_value_number: usize,
}

impl Default for DescriptiveContinuousStats {
    fn default() -> Self {
        Self {
            attribute_name: String::new(),
            computed: false,
            value_number: 0,
            min: MISSING_VALUE,
            max: MISSING_VALUE,
            mean: MISSING_VALUE,
            standard_deviation: MISSING_VALUE,
            missing_value_number: 0,
        }
    }
}

impl DescriptiveContinuousStats {
    /// Creates empty stats for an attribute.
    #[must_use]
    pub fn new(attribute_name: impl Into<String>) -> Self {
        Self {
            attribute_name: attribute_name.into(),
            ..Self::default()
        }
    }

    /// Computes the summary from a table sorted ascending, missing values first.
    ///
    /// Returns `false` and resets the summary when cancelled.
    pub fn compute_stats(&mut self, table: &TupleTable<f64>, cancel: &CancellationToken) -> bool {
        self.reset();
        let tuples = table.tuples();
        let first_filled = tuples
            .iter()
            .position(|tuple| !tuple.key.is_missing())
            .unwrap_or(tuples.len());
        self.missing_value_number = tuples[..first_filled].iter().map(|tuple| tuple.frequency).sum();
        let filled = &tuples[first_filled..];
        let missing_part = usize::from(self.missing_value_number > 0);

        if filled.is_empty() {
            self.value_number = missing_part;
            self.computed = true;
            return true;
        }

        self.min = filled[0].key;
        self.max = filled[filled.len() - 1].key;
        if self.min == self.max {
            self.mean = self.min;
            self.standard_deviation = 0.0;
            self.value_number = 1 + missing_part;
            self.computed = true;
            return true;
        }

        let mut filled_count = 0.0;
        let mut sum = 0.0;
        let mut square_sum = 0.0;
        let mut distinct = 0;
        let mut reference = MISSING_VALUE;
        for (index, tuple) in filled.iter().enumerate() {
            if index % 1024 == 0 && cancel.is_cancelled() {
                self.reset();
                return false;
            }
            let frequency = tuple.frequency as f64;
            filled_count += frequency;
            sum += tuple.key * frequency;
            square_sum += tuple.key * tuple.key * frequency;
            if tuple.key != reference {
                distinct += 1;
                reference = tuple.key;
            }
        }
        self.mean = sum / filled_count;
        self.standard_deviation = ((square_sum - sum * sum / filled_count).abs() / filled_count).sqrt();
        debug_assert!(self.min - 1e-9 <= self.mean && self.mean <= self.max + 1e-9);
        self.value_number = distinct + missing_part;
        self.computed = true;
        true
    }

    fn reset(&mut self) {
        *self = Self::new(std::mem::take(&mut self.attribute_name));
    }

    /// Attribute name.
    #[must_use]
    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    /// Renames the attribute.
    pub fn set_attribute_name(&mut self, name: impl Into<String>) {
        self.attribute_name = name.into();
    }

    /// Whether [`compute_stats`](Self::compute_stats) completed.
    #[must_use]
    pub const fn is_stats_computed(&self) -> bool {
        self.computed
    }

    /// Distinct values, missing counting as one.
    #[must_use]
    pub fn value_number(&self) -> usize {
        debug_assert!(self.computed);
        self.value_number
    }

    /// Smallest present value.
    #[must_use]
    pub fn min(&self) -> f64 {
        debug_assert!(self.computed);
        self.min
    }

    /// Largest present value.
    #[must_use]
    pub fn max(&self) -> f64 {
        debug_assert!(self.computed);
        self.max
    }

    /// Mean of the present values.
    #[must_use]
    pub fn mean(&self) -> f64 {
        debug_assert!(self.computed);
        self.mean
    }

    /// Population standard deviation of the present values.
    #[must_use]
    pub fn standard_deviation(&self) -> f64 {
        debug_assert!(self.computed);
        self.standard_deviation
    }

    /// Number of missing values.
    #[must_use]
    pub fn missing_value_number(&self) -> usize {
        debug_assert!(self.computed);
        self.missing_value_number
    }
}

/// Univariate summary of a categorical attribute.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DescriptiveSymbolStats {
    attribute_name: String,
    computed: bool,
    value_number: usize,
    entropy: f64,
    mode: String,
    mode_frequency: usize,
    total_frequency: usize,
}

impl DescriptiveSymbolStats {
    /// Creates empty stats for an attribute.
    #[must_use]
    pub fn new(attribute_name: impl Into<String>) -> Self {
        Self {
            attribute_name: attribute_name.into(),
            ..Self::default()
        }
    }

    /// Computes the summary from a table sorted ascending.
    ///
    /// The empty symbol counts as one more value but not in the entropy and mode,
    /// which are computed over present values.
    pub fn compute_stats(&mut self, table: &TupleTable<String>, cancel: &CancellationToken) -> bool {
        *self = Self::new(std::mem::take(&mut self.attribute_name));
        let missing: usize = table
            .tuples()
            .iter()
            .filter(|tuple| tuple.key.is_missing())
            .map(|tuple| tuple.frequency)
            .sum();
        let present = table.total_frequency() - missing;
        self.total_frequency = present;

        let mut entropy = 0.0;
        let mut distinct = 0;
        for (index, tuple) in table.tuples().iter().enumerate() {
            if index % 1024 == 0 && cancel.is_cancelled() {
                *self = Self::new(std::mem::take(&mut self.attribute_name));
                return false;
            }
            if tuple.key.is_missing() {
                continue;
            }
            distinct += 1;
            let p = tuple.frequency as f64 / present as f64;
            entropy += p * p.ln();
            if tuple.frequency > self.mode_frequency
                || (tuple.frequency == self.mode_frequency && tuple.key < self.mode)
            {
                self.mode_frequency = tuple.frequency;
                self.mode.clone_from(&tuple.key);
            }
        }
        entropy /= -std::f64::consts::LN_2;
        if entropy.abs() < ENTROPY_EPSILON {
            entropy = 0.0;
        }
        self.entropy = entropy;
        self.value_number = distinct + usize::from(missing > 0);
        self.computed = true;
        true
    }

    /// Attribute name.
    #[must_use]
    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    /// Renames the attribute.
    pub fn set_attribute_name(&mut self, name: impl Into<String>) {
        self.attribute_name = name.into();
    }

    /// Whether [`compute_stats`](Self::compute_stats) completed.
    #[must_use]
    pub const fn is_stats_computed(&self) -> bool {
        self.computed
    }

    /// Distinct values, missing counting as one.
    #[must_use]
    pub fn value_number(&self) -> usize {
        debug_assert!(self.computed);
        self.value_number
    }

    /// Entropy in bits.
    #[must_use]
    pub fn entropy(&self) -> f64 {
        debug_assert!(self.computed);
        self.entropy
    }

    /// Most frequent value, smallest on ties.
    #[must_use]
    pub fn mode(&self) -> &str {
        debug_assert!(self.computed);
        &self.mode
    }

    /// Frequency of the mode.
    #[must_use]
    pub fn mode_frequency(&self) -> usize {
        debug_assert!(self.computed);
        self.mode_frequency
    }

    /// Number of present values.
    #[must_use]
    pub fn total_frequency(&self) -> usize {
        debug_assert!(self.computed);
        self.total_frequency
    }
}

/// Descriptive stats of either attribute type.
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptiveStats {
    /// Numerical attribute.
    Continuous(DescriptiveContinuousStats),
    /// Categorical attribute.
    Symbol(DescriptiveSymbolStats),
}

impl DescriptiveStats {
    /// Empty stats for the attribute type.
    #[must_use]
    pub fn new(attribute_name: &str, value_type: ValueType) -> Self {
        if value_type == ValueType::Continuous {
            Self::Continuous(DescriptiveContinuousStats::new(attribute_name))
        } else {
            Self::Symbol(DescriptiveSymbolStats::new(attribute_name))
        }
    }

    /// Attribute type.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Continuous(_) => ValueType::Continuous,
            Self::Symbol(_) => ValueType::Symbol,
        }
    }

    /// Whether the stats are computed.
    #[must_use]
    pub const fn is_stats_computed(&self) -> bool {
        match self {
            Self::Continuous(stats) => stats.is_stats_computed(),
            Self::Symbol(stats) => stats.is_stats_computed(),
        }
    }

    /// Distinct values, missing counting as one.
    #[must_use]
    pub fn value_number(&self) -> usize {
        match self {
            Self::Continuous(stats) => stats.value_number(),
            Self::Symbol(stats) => stats.value_number(),
        }
    }

    /// Numerical variant, if any.
    #[must_use]
    pub const fn as_continuous(&self) -> Option<&DescriptiveContinuousStats> {
        match self {
            Self::Continuous(stats) => Some(stats),
            Self::Symbol(_) => None,
        }
    }

    /// Categorical variant, if any.
    #[must_use]
    pub const fn as_symbol(&self) -> Option<&DescriptiveSymbolStats> {
        match self {
            Self::Symbol(stats) => Some(stats),
            Self::Continuous(_) => None,
        }
    }

    /// Tab-separated header of [`write_line_report`](Self::write_line_report).
    pub fn write_header_line_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        match self {
            Self::Continuous(_) => write!(out, "Values\tMin\tMax\tMean\tStd dev\tMissing number"),
            Self::Symbol(_) => write!(out, "Values\tMode\tMode frequency"),
        }
    }

    /// Tab-separated fields.
    pub fn write_line_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        match self {
            Self::Continuous(stats) => write!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}",
                stats.value_number(),
                format_continuous(stats.min()),
                format_continuous(stats.max()),
                format_continuous(stats.mean()),
                format_continuous(stats.standard_deviation()),
                stats.missing_value_number()
            ),
            Self::Symbol(stats) => write!(
                out,
                "{}\t{}\t{}",
                stats.value_number(),
                stats.mode(),
                stats.mode_frequency()
            ),
        }
    }

    /// JSON fields in the current object.
    pub fn write_json_fields(&self, json: &mut JsonWriter) {
        match self {
            Self::Continuous(stats) => {
                json.write_key_count("values", stats.value_number());
                if stats.min() != MISSING_VALUE {
                    json.write_key_double("min", stats.min());
                    json.write_key_double("max", stats.max());
                    json.write_key_double("mean", stats.mean());
                    json.write_key_double("stdDev", stats.standard_deviation());
                }
                json.write_key_count("missingNumber", stats.missing_value_number());
            }
            Self::Symbol(stats) => {
                json.write_key_count("values", stats.value_number());
                json.write_key_string("mode", stats.mode());
                json.write_key_count("modeFrequency", stats.mode_frequency());
                json.write_key_double("entropy", stats.entropy());
            }
        }
    }
}

impl StreamSerializable for DescriptiveStats {
    fn serialize(&self, stream: &mut Serializer) -> Result<(), LearningError> {
        match self {
            Self::Continuous(stats) => {
                stream.put_string(&stats.attribute_name)?;
                stream.put_boolean(stats.computed)?;
                stream.put_count(stats.value_number)?;
                stream.put_double(stats.min)?;
                stream.put_double(stats.max)?;
                stream.put_double(stats.mean)?;
                stream.put_double(stats.standard_deviation)?;
                stream.put_count(stats.missing_value_number)
            }
            Self::Symbol(stats) => {
                stream.put_string(&stats.attribute_name)?;
                stream.put_boolean(stats.computed)?;
                stream.put_count(stats.value_number)?;
                stream.put_double(stats.entropy)?;
                stream.put_string(&stats.mode)?;
                stream.put_count(stats.mode_frequency)?;
                stream.put_count(stats.total_frequency)
            }
        }
    }

    fn deserialize(&mut self, stream: &mut Serializer) -> Result<(), LearningError> {
        match self {
            Self::Continuous(stats) => {
                stats.attribute_name = stream.get_string()?;
                stats.computed = stream.get_boolean()?;
                stats.value_number = stream.get_count()?;
                stats.min = stream.get_double()?;
                stats.max = stream.get_double()?;
                stats.mean = stream.get_double()?;
                stats.standard_deviation = stream.get_double()?;
                stats.missing_value_number = stream.get_count()?;
            }
            Self::Symbol(stats) => {
                stats.attribute_name = stream.get_string()?;
                stats.computed = stream.get_boolean()?;
                stats.value_number = stream.get_count()?;
                stats.entropy = stream.get_double()?;
                stats.mode = stream.get_string()?;
                stats.mode_frequency = stream.get_count()?;
                stats.total_frequency = stream.get_count()?;
            }
        }
        Ok(())
    }
}
