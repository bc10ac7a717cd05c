use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::stats::data_grid::{DataGridStats, SourceConditionalLogProbs};

/// Missing continuous value; sorts before every other value.
pub const MISSING_VALUE: f64 = f64::NEG_INFINITY;

/// Symbol standing for every value not listed in a grouping.
pub const STAR_VALUE: &str = "*";

/// Type of a dictionary attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Categorical value.
    Symbol,
    /// Numerical value.
    Continuous,
    /// Structured value computed by a rule (data grid, grid statistics).
    Structure,
    /// No type (unsupervised target).
    None,
}

impl ValueType {
    /// Whether the type holds a plain value loadable from a data file.
    #[must_use]
    pub const fn is_simple(self) -> bool {
        matches!(self, Self::Symbol | Self::Continuous)
    }

    /// Label used in reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Symbol => "Categorical",
            Self::Continuous => "Numerical",
            Self::Structure => "Structure",
            Self::None => "None",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Value of one attribute for one record.
#[derive(Debug, Clone)]
pub enum Value {
    /// Numerical value, [`MISSING_VALUE`] when absent.
    Continuous(f64),
    /// Categorical value, empty when absent.
    Symbol(String),
    /// Partition structure of a prepared grid.
    Grid(Arc<DataGridStats>),
    /// Conditional statistics of a grid, positioned on the record's source cell.
    CellStats {
        /// Conditional log probabilities of the grid.
        table: Arc<SourceConditionalLogProbs>,
        /// Source cell of the record.
        cell: usize,
    },
}

impl Value {
    /// Missing value of the given type.
    #[must_use]
    pub fn missing(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Continuous => Self::Continuous(MISSING_VALUE),
            _ => Self::Symbol(String::new()),
        }
    }

    /// Parses a data-file field; unparsable numbers become missing.
    #[must_use]
    pub fn parse(value_type: ValueType, field: &str) -> Self {
        let field = field.trim();
        match value_type {
            ValueType::Continuous if field.is_empty() => Self::Continuous(MISSING_VALUE),
            ValueType::Continuous => Self::Continuous(
                field
                    .parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .unwrap_or(MISSING_VALUE),
            ),
            _ => Self::Symbol(field.to_owned()),
        }
    }

    /// Numerical content, missing for non-numerical values.
    #[must_use]
    pub fn as_continuous(&self) -> f64 {
        match self {
            Self::Continuous(value) => *value,
            _ => MISSING_VALUE,
        }
    }

    /// Categorical content, empty for non-categorical values.
    #[must_use]
    pub fn as_symbol(&self) -> &str {
        match self {
            Self::Symbol(value) => value,
            _ => "",
        }
    }

    /// Whether the value is missing.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Continuous(value) => *value == MISSING_VALUE,
            Self::Symbol(value) => value.is_empty(),
            Self::Grid(_) | Self::CellStats { .. } => false,
        }
    }

    /// Data-file representation.
    #[must_use]
    pub fn to_field(&self) -> String {
        match self {
            Self::Continuous(value) => format_continuous(*value),
            Self::Symbol(value) => value.clone(),
            Self::Grid(_) | Self::CellStats { .. } => String::new(),
        }
    }
}

/// Formats a number for reports and data files: missing values print empty,
/// integers without decimals, other values with ten significant digits.
#[must_use]
pub fn format_continuous(value: f64) -> String {
    if value == MISSING_VALUE || value.is_nan() {
        return String::new();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+inf".into() } else { "-inf".into() };
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{value:.0}");
    }
    let rounded = format!("{value:.9e}").parse::<f64>().unwrap_or(value);
    format!("{rounded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_handles_missing_fields() {
        assert!(Value::parse(ValueType::Continuous, "").is_missing());
        assert!(Value::parse(ValueType::Continuous, "abc").is_missing());
        assert!((Value::parse(ValueType::Continuous, " 2.5 ").as_continuous() - 2.5).abs() < 1e-12);
        assert_eq!(Value::parse(ValueType::Symbol, "setosa").as_symbol(), "setosa");
        assert!(Value::parse(ValueType::Symbol, "").is_missing());
    }

    #[test]
    fn formatting_is_compact() {
        assert_eq!(format_continuous(3.0), "3");
        assert_eq!(format_continuous(MISSING_VALUE), "");
        assert_eq!(format_continuous(0.707_106_781_186_547_5), "0.7071067812");
        assert_eq!(format_continuous(-1.5), "-1.5");
    }

    #[test]
    fn missing_sorts_first() {
        assert!(MISSING_VALUE < -1e300);
        assert!(Value::missing(ValueType::Continuous).is_missing());
        assert!(Value::missing(ValueType::Symbol).is_missing());
    }
}
