//! MODL partitioning of one attribute.
//!
//! Supervised partitions minimise the MODL cost of the attribute against the target
//! partition by greedy bottom-up merges: adjacent intervals for numerical attributes,
//! any pair of groups for categorical ones. The whole merge path down to a single part
//! is explored and the cheapest step is kept, so the single-part model (the null model)
//! always competes. Unsupervised partitions are equal-frequency intervals or the most
//! frequent values plus a default group.

use std::collections::HashMap;

use super::{
    data_grid::{AttributePartition, DataGridStats, PartitionKind},
    learning_spec::{equal_frequency_bounds, TargetPartition},
    stat::{ln_bell_partials, ln_binomial, ln_factorial},
    tuple_table::TupleTable,
};
use crate::dictionary::value::{MISSING_VALUE, STAR_VALUE};

/// Values grouped one by one before the greedy merges; less frequent values are pooled.
pub const MAX_INITIAL_GROUPS: usize = 200;

/// Partition of one attribute with its per-part target frequencies and MODL costs.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedPartition {
    /// Attribute partition.
    pub partition: AttributePartition,
    /// Target frequencies of each part; a single column when unsupervised.
    pub frequencies: Vec<Vec<usize>>,
    /// Cost of the partition and of the target distribution in each part.
    pub preparation_cost: f64,
    /// Cost of the target values given the partition.
    pub data_cost: f64,
}

impl OptimizedPartition {
    /// Number of parts.
    #[must_use]
    pub fn part_number(&self) -> usize {
        self.frequencies.len()
    }

    /// Grid of the partition, crossed with the target partition when supervised.
    #[must_use]
    pub fn to_data_grid(&self, target: Option<&AttributePartition>) -> DataGridStats {
        match target {
            Some(target) => {
                let mut grid = DataGridStats::new(vec![self.partition.clone(), target.clone()], 1);
                for (part, counts) in self.frequencies.iter().enumerate() {
                    for (target_part, count) in counts.iter().enumerate() {
                        grid.set_cell_frequency_at(&[part, target_part], *count);
                    }
                }
                grid
            }
            None => {
                let mut grid = DataGridStats::new(vec![self.partition.clone()], 0);
                for (part, counts) in self.frequencies.iter().enumerate() {
                    grid.set_cell_frequency_at(&[part], counts.iter().sum());
                }
                grid
            }
        }
    }
}

/// `ln C(n + J - 1, J - 1)`: cost of the target distribution of a part of `n` instances.
#[must_use]
pub fn part_preparation_cost(counts: &[usize]) -> f64 {
    let n: usize = counts.iter().sum();
    let j = counts.len().max(1);
    ln_binomial(n + j - 1, j - 1)
}

/// `ln n! - sum ln n_j!`: multinomial cost of the target values of a part.
#[must_use]
pub fn part_data_cost(counts: &[usize]) -> f64 {
    let n: usize = counts.iter().sum();
    ln_factorial(n) - counts.iter().map(|count| ln_factorial(*count)).sum::<f64>()
}

fn part_cost(counts: &[usize]) -> f64 {
    part_preparation_cost(counts) + part_data_cost(counts)
}

/// Partition term of a discretization into `part_number` intervals.
#[must_use]
pub fn discretization_partition_cost(instance_number: usize, part_number: usize) -> f64 {
    if instance_number == 0 {
        return 0.0;
    }
    (instance_number as f64).ln() + ln_binomial(instance_number + part_number - 1, part_number - 1)
}

/// Partition term of a grouping of `value_number` values into `part_number` groups.
///
/// `bell` holds [`ln_bell_partials`] of the value number.
#[must_use]
pub fn grouping_partition_cost(
    instance_number: usize,
    value_number: usize,
    part_number: usize,
    bell: &[f64],
) -> f64 {
    if instance_number == 0 {
        return 0.0;
    }
    if part_number <= 1 {
        (instance_number as f64).ln()
    } else {
        (value_number as f64).ln() + bell[part_number - 1]
    }
}

fn total_costs(partition_cost: f64, frequencies: &[Vec<usize>]) -> (f64, f64) {
    let preparation = partition_cost
        + frequencies
            .iter()
            .map(|counts| part_preparation_cost(counts))
            .sum::<f64>();
    let data = frequencies.iter().map(|counts| part_data_cost(counts)).sum();
    (preparation, data)
}

/// Merge `(kept, removed)` applied to the part list, `kept < removed`.
type Merge = (usize, usize);

/// Best prefix of a greedy merge path.
#[derive(Debug, Default)]
struct MergePath {
    merges: Vec<Merge>,
    best_length: usize,
}

fn merge_counts(first: &[usize], second: &[usize]) -> Vec<usize> {
    first.iter().zip(second).map(|(a, b)| a + b).collect()
}

/// Greedy merges of adjacent parts, down to one part.
fn merge_adjacent(
    parts: &[Vec<usize>],
    partition_cost: impl Fn(usize) -> f64,
    epsilon: f64,
) -> MergePath {
    let mut parts = parts.to_vec();
    let mut costs: Vec<f64> = parts.iter().map(|counts| part_cost(counts)).collect();
    let delta_at = |parts: &[Vec<usize>], costs: &[f64], index: usize| {
        part_cost(&merge_counts(&parts[index], &parts[index + 1])) - costs[index] - costs[index + 1]
    };
    let mut deltas: Vec<f64> = (0..parts.len().saturating_sub(1))
        .map(|index| delta_at(&parts, &costs, index))
        .collect();
    let mut current = partition_cost(parts.len()) + costs.iter().sum::<f64>();
    let mut best = current;
    let mut path = MergePath::default();

    while parts.len() > 1 {
        let Some((index, delta)) = deltas
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))
        else {
            break;
        };
        current += delta + partition_cost(parts.len() - 1) - partition_cost(parts.len());
        let removed = parts.remove(index + 1);
        parts[index] = merge_counts(&parts[index], &removed);
        costs.remove(index + 1);
        costs[index] = part_cost(&parts[index]);
        deltas.remove(index);
        if index > 0 {
            deltas[index - 1] = delta_at(&parts, &costs, index - 1);
        }
        if index + 1 < parts.len() {
            deltas[index] = delta_at(&parts, &costs, index);
        }
        path.merges.push((index, index + 1));
        if current < best + epsilon {
            best = current.min(best);
            path.best_length = path.merges.len();
        }
    }
    path
}

/// Greedy merges of any pair of parts, down to one part.
fn merge_pairs(
    parts: &[Vec<usize>],
    partition_cost: impl Fn(usize) -> f64,
    epsilon: f64,
) -> MergePath {
    let mut parts = parts.to_vec();
    let mut costs: Vec<f64> = parts.iter().map(|counts| part_cost(counts)).collect();
    let delta_of = |parts: &[Vec<usize>], costs: &[f64], a: usize, b: usize| {
        part_cost(&merge_counts(&parts[a], &parts[b])) - costs[a] - costs[b]
    };
    // deltas[b][a] for a < b
    let mut deltas: Vec<Vec<f64>> = (0..parts.len())
        .map(|b| (0..b).map(|a| delta_of(&parts, &costs, a, b)).collect())
        .collect();
    let mut current = partition_cost(parts.len()) + costs.iter().sum::<f64>();
    let mut best = current;
    let mut path = MergePath::default();

    while parts.len() > 1 {
        let mut chosen = (0, 1, f64::INFINITY);
        for (b, row) in deltas.iter().enumerate() {
            for (a, delta) in row.iter().enumerate() {
                if *delta < chosen.2 {
                    chosen = (a, b, *delta);
                }
            }
        }
        let (a, b, delta) = chosen;
        current += delta + partition_cost(parts.len() - 1) - partition_cost(parts.len());
        let removed = parts.remove(b);
        parts[a] = merge_counts(&parts[a], &removed);
        costs.remove(b);
        costs[a] = part_cost(&parts[a]);
        deltas.remove(b);
        for row in deltas.iter_mut().skip(b) {
            row.remove(b);
        }
        for other in 0..parts.len() {
            if other < a {
                deltas[a][other] = delta_of(&parts, &costs, other, a);
            } else if other > a {
                deltas[other][a] = delta_of(&parts, &costs, a, other);
            }
        }
        path.merges.push((a, b));
        if current < best + epsilon {
            best = current.min(best);
            path.best_length = path.merges.len();
        }
    }
    path
}

/// Applies the best prefix of a merge path.
fn replay<T>(items: &mut Vec<T>, path: &MergePath, mut merge: impl FnMut(&mut T, T)) {
    for (kept, removed) in &path.merges[..path.best_length] {
        let removed = items.remove(*removed);
        merge(&mut items[*kept], removed);
    }
}

/// Target frequencies of each distinct value, values in ascending order.
fn value_counts<K>(values: &[K], target: &TargetPartition) -> (Vec<K>, Vec<Vec<usize>>)
where
    K: super::tuple_table::TupleKey + PartialEq,
{
    let table = TupleTable::from_keys(
        values
            .iter()
            .cloned()
            .zip(target.part_indexes().iter().copied()),
    );
    let mut keys: Vec<K> = Vec::new();
    let mut counts: Vec<Vec<usize>> = Vec::new();
    for tuple in table.tuples() {
        let (key, part) = &tuple.key;
        if keys.last() != Some(key) {
            keys.push(key.clone());
            counts.push(vec![0; target.part_number()]);
        }
        if let Some(last) = counts.last_mut() {
            last[*part] += tuple.frequency;
        }
    }
    (keys, counts)
}

/// Upper bound of an interval ending at `left`, followed by an interval starting at `right`.
fn interval_bound(left: f64, right: f64) -> f64 {
    if left == MISSING_VALUE {
        MISSING_VALUE
    } else {
        (left + right) / 2.0
    }
}

/// Supervised discretization of a numerical attribute.
#[must_use]
pub fn discretize(
    attribute_name: &str,
    values: &[f64],
    target: &TargetPartition,
    min_interval_frequency: usize,
    epsilon: f64,
) -> OptimizedPartition {
    let instance_number = values.len();
    let (keys, counts) = value_counts(values, target);
    // (target counts, first key index, last key index)
    let mut intervals: Vec<(Vec<usize>, usize, usize)> = counts
        .into_iter()
        .enumerate()
        .map(|(index, counts)| (counts, index, index))
        .collect();
    premerge_small_intervals(&mut intervals, min_interval_frequency);

    let parts: Vec<Vec<usize>> = intervals.iter().map(|(counts, _, _)| counts.clone()).collect();
    let path = merge_adjacent(
        &parts,
        |part_number| discretization_partition_cost(instance_number, part_number),
        epsilon,
    );
    replay(&mut intervals, &path, |kept, removed| {
        kept.0 = merge_counts(&kept.0, &removed.0);
        kept.2 = removed.2;
    });

    let bounds = intervals
        .windows(2)
        .map(|pair| interval_bound(keys[pair[0].2], keys[pair[1].1]))
        .collect();
    let frequencies: Vec<Vec<usize>> = if intervals.is_empty() {
        vec![vec![0; target.part_number()]]
    } else {
        intervals.into_iter().map(|(counts, _, _)| counts).collect()
    };
    let (preparation_cost, data_cost) = total_costs(
        discretization_partition_cost(instance_number, frequencies.len()),
        &frequencies,
    );
    OptimizedPartition {
        partition: AttributePartition::new(attribute_name, PartitionKind::Discretization { bounds }),
        frequencies,
        preparation_cost,
        data_cost,
    }
}

fn premerge_small_intervals(intervals: &mut Vec<(Vec<usize>, usize, usize)>, min_frequency: usize) {
    if min_frequency <= 1 {
        return;
    }
    let frequency = |counts: &[usize]| counts.iter().sum::<usize>();
    let mut merged: Vec<(Vec<usize>, usize, usize)> = Vec::with_capacity(intervals.len());
    for interval in intervals.drain(..) {
        match merged.last_mut() {
            Some(last) if frequency(&last.0) < min_frequency => {
                last.0 = merge_counts(&last.0, &interval.0);
                last.2 = interval.2;
            }
            _ => merged.push(interval),
        }
    }
    if merged.len() > 1 && merged.last().map_or(false, |last| frequency(&last.0) < min_frequency) {
        if let Some(last) = merged.pop() {
            if let Some(previous) = merged.last_mut() {
                previous.0 = merge_counts(&previous.0, &last.0);
                previous.2 = last.2;
            }
        }
    }
    *intervals = merged;
}

/// Supervised grouping of a categorical attribute.
#[must_use]
pub fn group(
    attribute_name: &str,
    values: &[String],
    target: &TargetPartition,
    min_group_frequency: usize,
    epsilon: f64,
) -> OptimizedPartition {
    let instance_number = values.len();
    let (keys, counts) = value_counts(values, target);
    let mut initial: Vec<(Vec<usize>, Vec<String>)> =
        counts.into_iter().zip(keys).map(|(counts, key)| (counts, vec![key])).collect();
    initial.sort_by(|a, b| group_frequency(&b.0).cmp(&group_frequency(&a.0)).then_with(|| a.1.cmp(&b.1)));

    let mut groups: Vec<(Vec<usize>, Vec<String>)> = Vec::new();
    let mut pooled: Option<(Vec<usize>, Vec<String>)> = None;
    for (counts, values) in initial {
        if groups.len() + 1 < MAX_INITIAL_GROUPS && group_frequency(&counts) >= min_group_frequency.max(1) {
            groups.push((counts, values));
        } else {
            match &mut pooled {
                Some(pool) => {
                    pool.0 = merge_counts(&pool.0, &counts);
                    pool.1.extend(values);
                }
                None => pooled = Some((counts, values)),
            }
        }
    }
    match pooled {
        Some(mut pool) => {
            pool.1.push(STAR_VALUE.to_owned());
            groups.push(pool);
        }
        None => match groups.last_mut() {
            Some(least_frequent) => least_frequent.1.push(STAR_VALUE.to_owned()),
            None => groups.push((vec![0; target.part_number()], vec![STAR_VALUE.to_owned()])),
        },
    }

    let value_number = groups.len();
    let bell = ln_bell_partials(value_number);
    let parts: Vec<Vec<usize>> = groups.iter().map(|(counts, _)| counts.clone()).collect();
    let path = merge_pairs(
        &parts,
        |part_number| grouping_partition_cost(instance_number, value_number, part_number, &bell),
        epsilon,
    );
    replay(&mut groups, &path, |kept, removed| {
        kept.0 = merge_counts(&kept.0, &removed.0);
        kept.1.extend(removed.1);
    });
    groups.sort_by(|a, b| group_frequency(&b.0).cmp(&group_frequency(&a.0)).then_with(|| a.1.cmp(&b.1)));

    let (frequencies, value_groups): (Vec<Vec<usize>>, Vec<Vec<String>>) = groups.into_iter().unzip();
    let (preparation_cost, data_cost) = total_costs(
        grouping_partition_cost(instance_number, value_number, frequencies.len(), &bell),
        &frequencies,
    );
    OptimizedPartition {
        partition: AttributePartition::new(
            attribute_name,
            PartitionKind::Grouping { groups: value_groups },
        ),
        frequencies,
        preparation_cost,
        data_cost,
    }
}

fn group_frequency(counts: &[usize]) -> usize {
    counts.iter().sum()
}

/// Equal-frequency discretization without target.
#[must_use]
pub fn unsupervised_discretize(
    attribute_name: &str,
    values: &[f64],
    interval_number: usize,
) -> OptimizedPartition {
    let table = TupleTable::from_keys(values.iter().copied());
    let bounds = equal_frequency_bounds(&table, interval_number);
    let partition = AttributePartition::new(attribute_name, PartitionKind::Discretization { bounds });
    let mut frequencies = vec![vec![0]; partition.part_number()];
    for value in values {
        frequencies[partition.continuous_part_index(*value)][0] += 1;
    }
    OptimizedPartition {
        partition,
        frequencies,
        preparation_cost: 0.0,
        data_cost: 0.0,
    }
}

/// The `max_groups - 1` most frequent values, each in its own group, plus a default
/// group holding the other values and `*`.
#[must_use]
pub fn unsupervised_group(attribute_name: &str, values: &[String], max_groups: usize) -> OptimizedPartition {
    let table = TupleTable::from_keys(values.iter().cloned());
    let mut distinct: Vec<(String, usize)> = table
        .tuples()
        .iter()
        .map(|tuple| (tuple.key.clone(), tuple.frequency))
        .collect();
    distinct.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let max_groups = max_groups.max(1);
    let mut groups: Vec<(Vec<String>, usize)> = Vec::new();
    if distinct.len() <= max_groups {
        groups.extend(distinct.into_iter().map(|(value, frequency)| (vec![value], frequency)));
        match groups.last_mut() {
            Some(least_frequent) => least_frequent.0.push(STAR_VALUE.to_owned()),
            None => groups.push((vec![STAR_VALUE.to_owned()], 0)),
        }
    } else {
        let mut rest = distinct.split_off(max_groups - 1);
        groups.extend(distinct.into_iter().map(|(value, frequency)| (vec![value], frequency)));
        rest.sort_by(|a, b| a.0.cmp(&b.0));
        let frequency = rest.iter().map(|(_, frequency)| frequency).sum();
        let mut default_group: Vec<String> = rest.into_iter().map(|(value, _)| value).collect();
        default_group.push(STAR_VALUE.to_owned());
        groups.push((default_group, frequency));
    }

    let frequencies = groups.iter().map(|(_, frequency)| vec![*frequency]).collect();
    OptimizedPartition {
        partition: AttributePartition::new(
            attribute_name,
            PartitionKind::Grouping {
                groups: groups.into_iter().map(|(values, _)| values).collect(),
            },
        ),
        frequencies,
        preparation_cost: 0.0,
        data_cost: 0.0,
    }
}

/// Part index of every value under a partition.
#[must_use]
pub fn part_indexes_of_symbols(partition: &AttributePartition, values: &[String]) -> Vec<usize> {
    let mut cache: HashMap<&str, usize> = HashMap::new();
    values
        .iter()
        .map(|value| {
            *cache
                .entry(value.as_str())
                .or_insert_with(|| partition.symbol_part_index(value))
        })
        .collect()
}

/// Part index of every numerical value under a partition.
#[must_use]
pub fn part_indexes_of_continuous(partition: &AttributePartition, values: &[f64]) -> Vec<usize> {
    values
        .iter()
        .map(|value| partition.continuous_part_index(*value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cancellation::CancellationToken,
        config::{NumericsConfig, PreparationConfig},
        database::Database,
        dictionary::{
            class::{Attribute, Class},
            value::{Value, ValueType},
        },
        stats::learning_spec::LearningSpec,
    };

    fn target_spec(labels: &[&str]) -> LearningSpec {
        let mut class = Class::new("T");
        class
            .insert_attribute(Attribute::new("y", ValueType::Symbol))
            .unwrap();
        class.compile().unwrap();
        let records = labels
            .iter()
            .map(|label| vec![Value::Symbol((*label).to_owned())])
            .collect();
        let database = Database::from_records("t", &class, records).unwrap();
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

    #[test]
    fn discretization_finds_the_class_boundary() {
        let labels: Vec<&str> = (0..40).map(|index| if index < 20 { "a" } else { "b" }).collect();
        let spec = target_spec(&labels);
        let values: Vec<f64> = (0..40).map(f64::from).collect();
        let result = discretize("x", &values, spec.target_partition().unwrap(), 0, 1e-10);
        match &result.partition.kind {
            PartitionKind::Discretization { bounds } => {
                assert_eq!(bounds.len(), 1);
                assert!((bounds[0] - 19.5).abs() < 1e-12);
            }
            other => panic!("unexpected partition {other:?}"),
        }
        assert_eq!(result.frequencies, vec![vec![20, 0], vec![0, 20]]);
        assert!(result.preparation_cost + result.data_cost < spec.null_preparation_cost() + spec.null_data_cost());
    }

    #[test]
    fn noise_collapses_to_the_null_model() {
        let labels: Vec<&str> = (0..30).map(|index| if index % 2 == 0 { "a" } else { "b" }).collect();
        let spec = target_spec(&labels);
        let values: Vec<f64> = (0..30).map(f64::from).collect();
        let result = discretize("x", &values, spec.target_partition().unwrap(), 0, 1e-10);
        assert_eq!(result.part_number(), 1);
        let total = result.preparation_cost + result.data_cost;
        assert!((total - spec.null_preparation_cost() - spec.null_data_cost()).abs() < 1e-9);
    }

    #[test]
    fn grouping_merges_values_with_the_same_distribution() {
        let mut labels = Vec::new();
        let mut values = Vec::new();
        for (value, label) in [("red", "a"), ("pink", "a"), ("blue", "b"), ("navy", "b")] {
            for _ in 0..15 {
                values.push(value.to_owned());
                labels.push(label);
            }
        }
        let spec = target_spec(&labels);
        let result = group("color", &values, spec.target_partition().unwrap(), 0, 1e-10);
        assert_eq!(result.part_number(), 2);
        let star_part = result.partition.symbol_part_index("unseen");
        assert!(star_part < 2);
        let red = result.partition.symbol_part_index("red");
        assert_eq!(red, result.partition.symbol_part_index("pink"));
        assert_ne!(red, result.partition.symbol_part_index("navy"));
    }

    #[test]
    fn unsupervised_group_keeps_the_most_frequent_values() {
        let values: Vec<String> = ["a", "a", "a", "b", "b", "c", "d"]
            .iter()
            .map(|value| (*value).to_owned())
            .collect();
        let result = unsupervised_group("v", &values, 3);
        assert_eq!(result.frequencies, vec![vec![3], vec![2], vec![2]]);
        assert_eq!(result.partition.part_label(2), "{c, d}");
        let grid = result.to_data_grid(None);
        assert_eq!(grid.compute_grid_frequency(), 7);
        assert!(!grid.is_supervised());
    }

    #[test]
    fn missing_values_keep_their_own_bound() {
        let values = [MISSING_VALUE, MISSING_VALUE, 1.0, 2.0, 3.0, 4.0];
        let result = unsupervised_discretize("x", &values, 2);
        assert_eq!(result.frequencies[0], vec![2]);
        assert_eq!(result.part_number(), 3);
    }
}
