use std::{fmt, sync::Arc};

use indexmap::IndexMap;

use super::value::{Value, ValueType, MISSING_VALUE};
use crate::{
    errors::LearningError,
    stats::data_grid::{DataGridStats, SourceConditionalLogProbs},
};

/// Operand of an arithmetic rule.
#[derive(Debug, Clone)]
pub enum Operand {
    /// Value of another attribute of the same class.
    Attribute(String),
    /// Numerical constant.
    Constant(f64),
    /// Value of a nested arithmetic rule.
    Rule(Box<DerivationRule>),
}

impl Operand {
    fn attributes(&self) -> Vec<&str> {
        match self {
            Self::Attribute(name) => vec![name.as_str()],
            Self::Constant(_) => Vec::new(),
            Self::Rule(rule) => rule.operand_attributes(),
        }
    }

    fn structures(&self) -> Vec<&str> {
        match self {
            Self::Rule(rule) => rule.structure_operands(),
            _ => Vec::new(),
        }
    }

    fn evaluate(&self, values: &IndexMap<String, Value>) -> Result<f64, LearningError> {
        match self {
            Self::Attribute(name) => Ok(operand(values, name)?.as_continuous()),
            Self::Constant(value) => Ok(*value),
            Self::Rule(rule) => Ok(rule.evaluate(values)?.as_continuous()),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attribute(name) => f.write_str(name),
            Self::Constant(value) => write!(f, "{value}"),
            Self::Rule(rule) => write!(f, "{rule}"),
        }
    }
}

/// Derivation rule computing an attribute from other attributes of its class.
///
/// Grid rules reference the structure attribute holding the grid by name, followed by
/// the attributes whose values locate a cell, in the grid's input order.
#[derive(Debug, Clone)]
pub enum DerivationRule {
    /// Constant data grid structure.
    DataGrid(Arc<DataGridStats>),
    /// Conditional statistics of a grid, positioned on the record's source cell.
    DataGridStats {
        /// Structure attribute holding the grid.
        grid: String,
        /// Input attributes.
        operands: Vec<String>,
        /// Conditional log probabilities of the grid.
        table: Arc<SourceConditionalLogProbs>,
    },
    /// One-based index of the input cell.
    CellIndex {
        /// Structure attribute holding the grid.
        grid: String,
        /// Input attributes.
        operands: Vec<String>,
    },
    /// Identifier of the input cell.
    CellId {
        /// Structure attribute holding the grid.
        grid: String,
        /// Input attributes.
        operands: Vec<String>,
    },
    /// Label of the input cell.
    CellLabel {
        /// Structure attribute holding the grid.
        grid: String,
        /// Input attributes.
        operands: Vec<String>,
    },
    /// One-based part index of a value in a univariate grid.
    ValueIndex {
        /// Structure attribute holding the univariate grid.
        grid: String,
        /// Located attribute.
        operand: String,
    },
    /// Normalised mid-rank of a value's part in a univariate grid.
    ValueRank {
        /// Structure attribute holding the univariate grid.
        grid: String,
        /// Located attribute.
        operand: String,
    },
    /// Expected rank distance between two values of the same part.
    RankSelfDistance {
        /// Structure attribute holding the univariate grid.
        grid: String,
        /// Located attribute.
        operand: String,
    },
    /// `-ln P(source cell | target part)` for a one-based target part.
    SourceConditionalInfo {
        /// Attribute computed by a [`DerivationRule::DataGridStats`] rule.
        stats: String,
        /// One-based target part index.
        target_index: usize,
    },
    /// 1 when the operand equals the constant, else 0.
    Equal {
        /// Compared attribute.
        operand: String,
        /// Compared constant.
        value: f64,
    },
    /// `(x - mean) / scale`.
    CenterReduce {
        /// Numerical attribute.
        operand: String,
        /// Subtracted mean.
        mean: f64,
        /// Divisor, never zero.
        scale: f64,
    },
    /// `(x - min) / scale`.
    Normalize {
        /// Numerical attribute.
        operand: String,
        /// Subtracted minimum.
        min: f64,
        /// Divisor, never zero.
        scale: f64,
    },
    /// Numerical constant.
    Constant(f64),
    /// Sum of the operands; missing if any operand is missing.
    Sum(Vec<Operand>),
    /// Product of the operands; missing if any operand is missing.
    Product(Vec<Operand>),
    /// First operand minus the others; missing if any operand is missing.
    Diff(Vec<Operand>),
}

impl DerivationRule {
    /// Rule name as printed in dictionaries.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DataGrid(_) => "DataGrid",
            Self::DataGridStats { .. } => "DataGridStats",
            Self::CellIndex { .. } => "CellIndex",
            Self::CellId { .. } => "CellId",
            Self::CellLabel { .. } => "CellLabel",
            Self::ValueIndex { .. } => "ValueIndex",
            Self::ValueRank { .. } => "ValueRank",
            Self::RankSelfDistance { .. } => "ValueRankSelfDistance",
            Self::SourceConditionalInfo { .. } => "SourceConditionalInfo",
            Self::Equal { .. } => "EQ",
            Self::CenterReduce { .. } => "CenterReduce",
            Self::Normalize { .. } => "Normalize",
            Self::Constant(_) => "Constant",
            Self::Sum(_) => "Sum",
            Self::Product(_) => "Product",
            Self::Diff(_) => "Diff",
        }
    }

    /// Type of the computed value.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::DataGrid(_) | Self::DataGridStats { .. } => ValueType::Structure,
            Self::CellId { .. } | Self::CellLabel { .. } => ValueType::Symbol,
            _ => ValueType::Continuous,
        }
    }

    /// Attributes read by the rule.
    #[must_use]
    pub fn operand_attributes(&self) -> Vec<&str> {
        match self {
            Self::DataGrid(_) | Self::Constant(_) => Vec::new(),
            Self::DataGridStats { grid, operands, .. }
            | Self::CellIndex { grid, operands }
            | Self::CellId { grid, operands }
            | Self::CellLabel { grid, operands } => std::iter::once(grid.as_str())
                .chain(operands.iter().map(String::as_str))
                .collect(),
            Self::ValueIndex { grid, operand }
            | Self::ValueRank { grid, operand }
            | Self::RankSelfDistance { grid, operand } => vec![grid.as_str(), operand.as_str()],
            Self::SourceConditionalInfo { stats, .. } => vec![stats.as_str()],
            Self::Equal { operand, .. }
            | Self::CenterReduce { operand, .. }
            | Self::Normalize { operand, .. } => vec![operand.as_str()],
            Self::Sum(operands) | Self::Product(operands) | Self::Diff(operands) => {
                operands.iter().flat_map(Operand::attributes).collect()
            }
        }
    }

    /// Operands that must be structure attributes.
    #[must_use]
    pub fn structure_operands(&self) -> Vec<&str> {
        match self {
            Self::DataGridStats { grid, .. }
            | Self::CellIndex { grid, .. }
            | Self::CellId { grid, .. }
            | Self::CellLabel { grid, .. }
            | Self::ValueIndex { grid, .. }
            | Self::ValueRank { grid, .. }
            | Self::RankSelfDistance { grid, .. } => vec![grid.as_str()],
            Self::SourceConditionalInfo { stats, .. } => vec![stats.as_str()],
            Self::Sum(operands) | Self::Product(operands) | Self::Diff(operands) => {
                operands.iter().flat_map(Operand::structures).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Computes the rule value from already evaluated attributes.
    pub fn evaluate(&self, values: &IndexMap<String, Value>) -> Result<Value, LearningError> {
        let value = match self {
            Self::DataGrid(grid) => Value::Grid(Arc::clone(grid)),
            Self::DataGridStats {
                grid,
                operands,
                table,
            } => {
                let grid = grid_operand(values, grid)?;
                let cell = input_cell_index(&grid, values, operands)?;
                Value::CellStats {
                    table: Arc::clone(table),
                    cell,
                }
            }
            Self::CellIndex { grid, operands } => {
                let grid = grid_operand(values, grid)?;
                Value::Continuous(cell_number(input_cell_index(&grid, values, operands)?))
            }
            Self::CellId { grid, operands } => {
                let grid = grid_operand(values, grid)?;
                Value::Symbol(cell_id(input_cell_index(&grid, values, operands)?))
            }
            Self::CellLabel { grid, operands } => {
                let grid = grid_operand(values, grid)?;
                let labels = operands
                    .iter()
                    .enumerate()
                    .map(|(index, name)| {
                        let partition = grid.attribute_at(index);
                        operand(values, name).map(|value| partition.part_label(partition.part_index(value)))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Value::Symbol(labels.join(" x "))
            }
            Self::ValueIndex { grid, operand: name } => {
                let grid = grid_operand(values, grid)?;
                let part = grid.attribute_at(0).part_index(operand(values, name)?);
                Value::Continuous(cell_number(part))
            }
            Self::ValueRank { grid, operand: name } => {
                let grid = grid_operand(values, grid)?;
                let part = grid.attribute_at(0).part_index(operand(values, name)?);
                Value::Continuous(value_rank(&grid, part))
            }
            Self::RankSelfDistance { grid, operand: name } => {
                let grid = grid_operand(values, grid)?;
                let part = grid.attribute_at(0).part_index(operand(values, name)?);
                Value::Continuous(rank_self_distance(&grid, part))
            }
            Self::SourceConditionalInfo {
                stats,
                target_index,
            } => match operand(values, stats)? {
                Value::CellStats { table, cell } => {
                    Value::Continuous(source_conditional_info(table, *cell, *target_index))
                }
                _ => {
                    return Err(LearningError::Derivation(format!(
                        "{stats} does not hold data grid statistics"
                    )))
                }
            },
            Self::Equal {
                operand: name,
                value,
            } => {
                let x = operand(values, name)?.as_continuous();
                Value::Continuous(if (x - value).abs() < f64::EPSILON { 1.0 } else { 0.0 })
            }
            Self::CenterReduce {
                operand: name,
                mean,
                scale,
            } => Value::Continuous(affine(operand(values, name)?.as_continuous(), *mean, *scale)),
            Self::Normalize {
                operand: name,
                min,
                scale,
            } => Value::Continuous(affine(operand(values, name)?.as_continuous(), *min, *scale)),
            Self::Constant(value) => Value::Continuous(*value),
            Self::Sum(operands) => {
                Value::Continuous(fold_operands(values, operands, 0.0, |acc, x| acc + x)?)
            }
            Self::Product(operands) => {
                Value::Continuous(fold_operands(values, operands, 1.0, |acc, x| acc * x)?)
            }
            Self::Diff(operands) => Value::Continuous(match operands.split_first() {
                Some((first, rest)) => {
                    let x = first.evaluate(values)?;
                    let subtracted = fold_operands(values, rest, 0.0, |acc, y| acc + y)?;
                    if x == MISSING_VALUE || subtracted == MISSING_VALUE {
                        MISSING_VALUE
                    } else {
                        x - subtracted
                    }
                }
                None => 0.0,
            }),
        };
        Ok(value)
    }
}

impl fmt::Display for DerivationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arguments = match self {
            Self::DataGrid(grid) => grid.export_variable_names().join(", "),
            Self::SourceConditionalInfo {
                stats,
                target_index,
            } => format!("{stats}, {target_index}"),
            Self::Equal { operand, value } => format!("{operand}, {value}"),
            Self::CenterReduce {
                operand,
                mean,
                scale,
            } => format!("{operand}, {mean}, {scale}"),
            Self::Normalize {
                operand,
                min,
                scale,
            } => format!("{operand}, {min}, {scale}"),
            Self::Constant(value) => value.to_string(),
            Self::Sum(operands) | Self::Product(operands) | Self::Diff(operands) => operands
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            _ => self.operand_attributes().join(", "),
        };
        write!(f, "{}({arguments})", self.name())
    }
}

/// Identifier of a zero-based cell index.
#[must_use]
pub fn cell_id(cell: usize) -> String {
    format!("C{}", cell + 1)
}

fn cell_number(index: usize) -> f64 {
    (index + 1) as f64
}

fn operand<'a>(values: &'a IndexMap<String, Value>, name: &str) -> Result<&'a Value, LearningError> {
    values
        .get(name)
        .ok_or_else(|| LearningError::Derivation(format!("variable {name} not evaluated")))
}

fn grid_operand(
    values: &IndexMap<String, Value>,
    name: &str,
) -> Result<Arc<DataGridStats>, LearningError> {
    match operand(values, name)? {
        Value::Grid(grid) => Ok(Arc::clone(grid)),
        _ => Err(LearningError::Derivation(format!("{name} does not hold a data grid"))),
    }
}

fn input_cell_index(
    grid: &DataGridStats,
    values: &IndexMap<String, Value>,
    operands: &[String],
) -> Result<usize, LearningError> {
    let located = operands
        .iter()
        .map(|name| operand(values, name))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(grid.input_cell_index(&located))
}

/// Mid-rank of a part: `(cumulated frequency before the part + frequency / 2) / total`.
fn value_rank(grid: &DataGridStats, part: usize) -> f64 {
    let total = grid.compute_grid_frequency();
    let cumulated: usize = (0..part).map(|index| grid.univariate_cell_frequency_at(index)).sum();
    let frequency = grid.univariate_cell_frequency_at(part) as f64;
    let total = if total == 0 { 1.0 } else { total as f64 };
    (cumulated as f64 + frequency / 2.0) / total
}

/// Expected absolute rank gap of two uniform draws in a part of relative width `w`: `w / 3`.
fn rank_self_distance(grid: &DataGridStats, part: usize) -> f64 {
    let total = grid.compute_grid_frequency();
    if total == 0 {
        return 0.0;
    }
    grid.univariate_cell_frequency_at(part) as f64 / total as f64 / 3.0
}

fn source_conditional_info(table: &SourceConditionalLogProbs, cell: usize, target_index: usize) -> f64 {
    if table.source_size() > 1 && (1..=table.target_size()).contains(&target_index) {
        -table.log_prob_at(cell, target_index - 1)
    } else {
        0.0
    }
}

fn affine(x: f64, offset: f64, scale: f64) -> f64 {
    if x == MISSING_VALUE {
        MISSING_VALUE
    } else {
        (x - offset) / scale
    }
}

fn fold_operands(
    values: &IndexMap<String, Value>,
    operands: &[Operand],
    init: f64,
    combine: impl Fn(f64, f64) -> f64,
) -> Result<f64, LearningError> {
    let mut acc = init;
    for item in operands {
        let x = item.evaluate(values)?;
        if x == MISSING_VALUE {
            return Ok(MISSING_VALUE);
        }
        acc = combine(acc, x);
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::data_grid::{AttributePartition, PartitionKind};

    fn univariate_grid() -> Arc<DataGridStats> {
        let mut grid = DataGridStats::new(
            vec![AttributePartition::new(
                "Age",
                PartitionKind::Discretization {
                    bounds: vec![30.0, 50.0],
                },
            )],
            0,
        );
        grid.set_cell_frequency_at(&[0], 2);
        grid.set_cell_frequency_at(&[1], 4);
        grid.set_cell_frequency_at(&[2], 2);
        Arc::new(grid)
    }

    fn record(age: f64) -> IndexMap<String, Value> {
        let mut values = IndexMap::new();
        values.insert("Age".to_owned(), Value::Continuous(age));
        values.insert("PAge".to_owned(), Value::Grid(univariate_grid()));
        values
    }

    #[test]
    fn cell_rules_locate_values() {
        let values = record(42.0);
        let index = DerivationRule::CellIndex {
            grid: "PAge".into(),
            operands: vec!["Age".into()],
        };
        assert!((index.evaluate(&values).unwrap().as_continuous() - 2.0).abs() < 1e-12);
        let label = DerivationRule::CellLabel {
            grid: "PAge".into(),
            operands: vec!["Age".into()],
        };
        assert_eq!(label.evaluate(&values).unwrap().as_symbol(), "]30,50]");
        let id = DerivationRule::CellId {
            grid: "PAge".into(),
            operands: vec!["Age".into()],
        };
        assert_eq!(id.evaluate(&values).unwrap().as_symbol(), "C2");
    }

    #[test]
    fn rank_rules_use_part_frequencies() {
        let values = record(60.0);
        let rank = DerivationRule::ValueRank {
            grid: "PAge".into(),
            operand: "Age".into(),
        };
        assert!((rank.evaluate(&values).unwrap().as_continuous() - 7.0 / 8.0).abs() < 1e-12);
        let distance = DerivationRule::RankSelfDistance {
            grid: "PAge".into(),
            operand: "Age".into(),
        };
        assert!((distance.evaluate(&values).unwrap().as_continuous() - 0.25 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn arithmetic_propagates_missing() {
        let values = record(MISSING_VALUE);
        let sum = DerivationRule::Sum(vec![Operand::Attribute("Age".into()), Operand::Constant(1.0)]);
        assert!(sum.evaluate(&values).unwrap().is_missing());
        let reduce = DerivationRule::CenterReduce {
            operand: "Age".into(),
            mean: 1.0,
            scale: 1.0,
        };
        assert!(reduce.evaluate(&values).unwrap().is_missing());
    }

    #[test]
    fn nested_rules_combine_operands() {
        let values = record(2.0);
        // 0.5 * (1 - Age) + 0.25 * Age
        let rule = DerivationRule::Sum(vec![
            Operand::Rule(Box::new(DerivationRule::Product(vec![
                Operand::Constant(0.5),
                Operand::Rule(Box::new(DerivationRule::Diff(vec![
                    Operand::Constant(1.0),
                    Operand::Attribute("Age".into()),
                ]))),
            ]))),
            Operand::Rule(Box::new(DerivationRule::Product(vec![
                Operand::Constant(0.25),
                Operand::Attribute("Age".into()),
            ]))),
        ]);
        assert_eq!(rule.operand_attributes(), vec!["Age", "Age"]);
        assert!((rule.evaluate(&values).unwrap().as_continuous() - 0.0).abs() < 1e-12);
        assert_eq!(
            rule.to_string(),
            "Sum(Product(0.5, Diff(1, Age)), Product(0.25, Age))"
        );
        let copy = Operand::Rule(Box::new(rule.clone()));
        assert_eq!(copy.attributes(), vec!["Age", "Age"]);
        assert!((copy.evaluate(&values).unwrap() - 0.0).abs() < 1e-12);
    }

    #[test]
    fn display_lists_operands() {
        let rule = DerivationRule::CellIndex {
            grid: "PAge".into(),
            operands: vec!["Age".into()],
        };
        assert_eq!(rule.to_string(), "CellIndex(PAge, Age)");
        assert_eq!(rule.value_type(), ValueType::Continuous);
    }
}
