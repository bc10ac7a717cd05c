use std::{fmt, ops::BitOr};

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::{
    dictionary::value::format_continuous,
    errors::LearningError,
    stats::stat,
};

/// Set of statistical measures written by the evaluation reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Measures(u8);

impl Measures {
    /// Arithmetic mean.
    pub const MEAN: Self = Self(1);
    /// Geometric mean, 0 when a value is not positive.
    pub const GEOMETRIC_MEAN: Self = Self(1 << 1);
    /// Population standard deviation.
    pub const STANDARD_DEVIATION: Self = Self(1 << 2);
    /// Minimum.
    pub const MIN: Self = Self(1 << 3);
    /// Maximum.
    pub const MAX: Self = Self(1 << 4);
    /// Significant wins, ties and losses against the first method.
    pub const SIGNIFICANT_TESTS: Self = Self(1 << 5);
    /// Method rank.
    pub const RANK: Self = Self(1 << 6);

    /// Synthetic report of one method.
    pub const STANDARD_SYNTHETIC: Self = Self(Self::MEAN.0 | Self::STANDARD_DEVIATION.0);
    /// Synthetic report comparing methods.
    pub const STANDARD_SYNTHETIC_COMPARATIVE: Self =
        Self(Self::MEAN.0 | Self::SIGNIFICANT_TESTS.0 | Self::RANK.0);
    /// Per-experiment report of one method.
    pub const STANDARD: Self = Self(Self::MEAN.0 | Self::STANDARD_DEVIATION.0);
    /// Per-experiment report comparing methods.
    pub const STANDARD_COMPARATIVE: Self =
        Self(Self::MEAN.0 | Self::SIGNIFICANT_TESTS.0 | Self::RANK.0);

    const NAMES: [(Self, &'static str); 7] = [
        (Self::MEAN, "Mean"),
        (Self::GEOMETRIC_MEAN, "GeometricMean"),
        (Self::STANDARD_DEVIATION, "StandardDeviation"),
        (Self::MIN, "Min"),
        (Self::MAX, "Max"),
        (Self::SIGNIFICANT_TESTS, "SignificantTests"),
        (Self::RANK, "Rank"),
    ];

    /// Whether every measure of `other` is in the set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Tab-separated names of the measures in the set.
    #[must_use]
    pub fn label(self) -> String {
        Self::NAMES
            .iter()
            .filter(|(measure, _)| self.contains(*measure))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join("\t")
    }

    /// Single-value measures in report order.
    fn values(self) -> impl Iterator<Item = Self> {
        [
            Self::MEAN,
            Self::GEOMETRIC_MEAN,
            Self::STANDARD_DEVIATION,
            Self::MIN,
            Self::MAX,
        ]
        .into_iter()
        .filter(move |measure| self.contains(*measure))
    }
}

impl BitOr for Measures {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Results of one method on one criterion, for every run of every experiment.
///
/// Comparative reports take a slice of evaluations of the same criterion; the first
/// one is the reference of the significance tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalEvaluation {
    criterion_name: String,
    method_name: String,
    experiment_name: String,
    maximization: bool,
    significance_level: f64,
    experiment_labels: Vec<String>,
    results: Array2<f64>,
}

impl Default for StatisticalEvaluation {
    fn default() -> Self {
        Self {
            criterion_name: String::new(),
            method_name: String::new(),
            experiment_name: String::new(),
            maximization: true,
            significance_level: 0.05,
            experiment_labels: Vec::new(),
            results: Array2::zeros((0, 0)),
        }
    }
}

impl StatisticalEvaluation {
    /// Empty evaluation, maximized, at the 5% significance level.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Criterion name.
    #[must_use]
    pub fn criterion_name(&self) -> &str {
        &self.criterion_name
    }

    /// Sets the criterion name.
    pub fn set_criterion_name(&mut self, name: impl Into<String>) {
        self.criterion_name = name.into();
    }

    /// Method name.
    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Sets the method name.
    pub fn set_method_name(&mut self, name: impl Into<String>) {
        self.method_name = name.into();
    }

    /// Header of the experiment labels; may span several tab-separated columns.
    #[must_use]
    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    /// Sets the experiment header.
    pub fn set_experiment_name(&mut self, name: impl Into<String>) {
        self.experiment_name = name.into();
    }

    /// Whether larger values are better.
    #[must_use]
    pub const fn maximization(&self) -> bool {
        self.maximization
    }

    /// Sets the optimisation direction.
    pub fn set_maximization(&mut self, maximization: bool) {
        self.maximization = maximization;
    }

    /// Significance level of the paired tests.
    #[must_use]
    pub const fn significance_level(&self) -> f64 {
        self.significance_level
    }

    /// Sets the significance level, which must lie in `]0, 1[`.
    pub fn set_significance_level(&mut self, level: f64) -> Result<(), LearningError> {
        if !(level > 0.0 && level < 1.0) {
            return Err(LearningError::InvalidArgument(format!(
                "significance level must lie in ]0, 1[, got {level}"
            )));
        }
        self.significance_level = level;
        Ok(())
    }

    /// Number of experiments.
    #[must_use]
    pub fn experiment_number(&self) -> usize {
        self.results.nrows()
    }

    /// Resizes the experiments; results are reset and labels kept where they exist.
    pub fn set_experiment_number(&mut self, number: usize) {
        self.results = Array2::zeros((number, self.run_number()));
        self.experiment_labels.resize(number, String::new());
    }

    /// Number of runs per experiment.
    #[must_use]
    pub fn run_number(&self) -> usize {
        self.results.ncols()
    }

    /// Resizes the runs; results are reset.
    pub fn set_run_number(&mut self, number: usize) {
        self.results = Array2::zeros((self.experiment_number(), number));
    }

    /// Sets every result to 0.
    pub fn reset_all_results(&mut self) {
        self.results.fill(0.0);
    }

    /// Stores one result.
    pub fn set_result_at(&mut self, experiment: usize, run: usize, value: f64) {
        self.results[[experiment, run]] = value;
    }

    /// One result.
    #[must_use]
    pub fn result_at(&self, experiment: usize, run: usize) -> f64 {
        self.results[[experiment, run]]
    }

    /// Result matrix, one row per experiment.
    #[must_use]
    pub const fn results(&self) -> &Array2<f64> {
        &self.results
    }

    /// Sets the label of an experiment.
    pub fn set_experiment_label_at(&mut self, experiment: usize, label: impl Into<String>) {
        self.experiment_labels[experiment] = label.into();
    }

    /// Label of an experiment.
    #[must_use]
    pub fn experiment_label_at(&self, experiment: usize) -> &str {
        &self.experiment_labels[experiment]
    }

    /// Clears every experiment label.
    pub fn reset_all_labels(&mut self) {
        for label in &mut self.experiment_labels {
            label.clear();
        }
    }

    fn row(&self, experiment: usize) -> Vec<f64> {
        to_vec(self.results.row(experiment))
    }

    fn all_results(&self) -> Vec<f64> {
        self.results.iter().copied().collect()
    }

    /// Mean of the runs of an experiment.
    #[must_use]
    pub fn mean_at(&self, experiment: usize) -> f64 {
        stat::mean(&self.row(experiment))
    }

    /// Geometric mean of the runs of an experiment.
    #[must_use]
    pub fn geometric_mean_at(&self, experiment: usize) -> f64 {
        stat::geometric_mean(&self.row(experiment))
    }

    /// Standard deviation of the runs of an experiment.
    #[must_use]
    pub fn standard_deviation_at(&self, experiment: usize) -> f64 {
        stat::standard_deviation(&self.row(experiment))
    }

    /// Minimum of the runs of an experiment.
    #[must_use]
    pub fn min_at(&self, experiment: usize) -> f64 {
        stat::min(&self.row(experiment))
    }

    /// Maximum of the runs of an experiment.
    #[must_use]
    pub fn max_at(&self, experiment: usize) -> f64 {
        stat::max(&self.row(experiment))
    }

    /// Mean of every result.
    #[must_use]
    pub fn mean(&self) -> f64 {
        stat::mean(&self.all_results())
    }

    /// Geometric mean of every result.
    #[must_use]
    pub fn geometric_mean(&self) -> f64 {
        stat::geometric_mean(&self.all_results())
    }

    /// Standard deviation of every result.
    #[must_use]
    pub fn standard_deviation(&self) -> f64 {
        stat::standard_deviation(&self.all_results())
    }

    /// Minimum of every result.
    #[must_use]
    pub fn min(&self) -> f64 {
        stat::min(&self.all_results())
    }

    /// Maximum of every result.
    #[must_use]
    pub fn max(&self) -> f64 {
        stat::max(&self.all_results())
    }

    fn measure_at(&self, measure: Measures, experiment: usize) -> f64 {
        match measure {
            Measures::GEOMETRIC_MEAN => self.geometric_mean_at(experiment),
            Measures::STANDARD_DEVIATION => self.standard_deviation_at(experiment),
            Measures::MIN => self.min_at(experiment),
            Measures::MAX => self.max_at(experiment),
            _ => self.mean_at(experiment),
        }
    }

    fn measure(&self, measure: Measures) -> f64 {
        match measure {
            Measures::GEOMETRIC_MEAN => self.geometric_mean(),
            Measures::STANDARD_DEVIATION => self.standard_deviation(),
            Measures::MIN => self.min(),
            Measures::MAX => self.max(),
            _ => self.mean(),
        }
    }

    /// Paired Student test of this method against `other` on one experiment.
    ///
    /// Returns 1 when this method is significantly better, -1 when significantly
    /// worse, 0 otherwise. Requires at least two runs.
    #[must_use]
    pub fn significant_difference_at(&self, other: &Self, experiment: usize) -> i32 {
        debug_assert!(self.is_comparable(other));
        debug_assert!(self.run_number() > 1);
        let threshold = stat::inv_student(self.significance_level, self.run_number() - 1);
        let t = stat::t_value(&self.row(experiment), &other.row(experiment));
        let sign = if self.maximization { 1 } else { -1 };
        if t >= threshold {
            sign
        } else if t <= -threshold {
            -sign
        } else {
            0
        }
    }

    fn count_differences(&self, other: &Self, wanted: i32) -> usize {
        (0..self.experiment_number())
            .filter(|experiment| self.significant_difference_at(other, *experiment) == wanted)
            .count()
    }

    /// Experiments where this method is significantly better than `other`.
    #[must_use]
    pub fn significant_win_number(&self, other: &Self) -> usize {
        self.count_differences(other, 1)
    }

    /// Experiments without significant difference with `other`.
    #[must_use]
    pub fn significant_tie_number(&self, other: &Self) -> usize {
        self.count_differences(other, 0)
    }

    /// Experiments where this method is significantly worse than `other`.
    #[must_use]
    pub fn significant_loss_number(&self, other: &Self) -> usize {
        self.count_differences(other, -1)
    }

    /// Whether results of `other` can be compared with these.
    ///
    /// Experiment labels are not compared.
    #[must_use]
    pub fn is_comparable(&self, other: &Self) -> bool {
        self.criterion_name == other.criterion_name
            && self.experiment_name == other.experiment_name
            && self.maximization == other.maximization
            && self.experiment_number() == other.experiment_number()
            && self.run_number() == other.run_number()
            && (self.significance_level - other.significance_level).abs() < f64::EPSILON
    }

    /// Copies every parameter, result and label of `source`.
    pub fn copy_from(&mut self, source: &Self) {
        self.clone_from(source);
    }

    /// `criterion(method)`.
    #[must_use]
    pub fn object_label(&self) -> String {
        format!("{}({})", self.criterion_name, self.method_name)
    }

    /// Report with the [`Measures::STANDARD_SYNTHETIC`] measures.
    pub fn write_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.write_specific_report(out, Measures::STANDARD_SYNTHETIC)
    }

    /// Global value of each requested measure.
    pub fn write_specific_report(&self, out: &mut dyn fmt::Write, measures: Measures) -> fmt::Result {
        writeln!(out, "{}\t{}", self.criterion_name, self.method_name)?;
        for measure in measures.values() {
            writeln!(out, "{}\t{}", measure.label(), format_continuous(self.measure(measure)))?;
        }
        Ok(())
    }

    /// Report with the [`Measures::STANDARD`] measures per experiment.
    pub fn write_experiment_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.write_experiment_specific_report(out, Measures::STANDARD)
    }

    /// One line per experiment with the requested measures.
    pub fn write_experiment_specific_report(
        &self,
        out: &mut dyn fmt::Write,
        measures: Measures,
    ) -> fmt::Result {
        writeln!(out, "{}", self.criterion_name)?;
        writeln!(out, "{}\t{}", self.experiment_name, self.method_name)?;
        writeln!(out, "{}\t{}", empty_label(&self.experiment_name), measures.label())?;
        for experiment in 0..self.experiment_number() {
            write!(out, "{}", self.experiment_labels[experiment])?;
            for measure in measures.values() {
                write!(out, "\t{}", format_continuous(self.measure_at(measure, experiment)))?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Every result, one line per run.
    pub fn write_value_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "{}", self.criterion_name)?;
        writeln!(out, "{}\tRun\t{}", self.experiment_name, self.method_name)?;
        for experiment in 0..self.experiment_number() {
            for run in 0..self.run_number() {
                writeln!(
                    out,
                    "{}\t{}\t{}",
                    self.experiment_labels[experiment],
                    run + 1,
                    format_continuous(self.result_at(experiment, run))
                )?;
            }
        }
        Ok(())
    }
}

/// Rank of a method on one experiment by mean result, 1 for the best; ties share the
/// best rank.
#[must_use]
pub fn method_rank_at(evaluations: &[StatisticalEvaluation], method: usize, experiment: usize) -> usize {
    let mut means: Vec<f64> = evaluations
        .iter()
        .map(|evaluation| evaluation.mean_at(experiment))
        .collect();
    let reference = means[method];
    means.sort_by(f64::total_cmp);
    if evaluations[0].maximization {
        means.reverse();
    }
    means
        .iter()
        .position(|mean| *mean == reference)
        .map_or(means.len(), |position| position + 1)
}

/// Mean rank of a method over the experiments.
#[must_use]
pub fn method_mean_rank(evaluations: &[StatisticalEvaluation], method: usize) -> f64 {
    let ranks: Vec<f64> = (0..evaluations[0].experiment_number())
        .map(|experiment| method_rank_at(evaluations, method, experiment) as f64)
        .collect();
    stat::mean(&ranks)
}

/// Synthetic comparison of methods with the
/// [`Measures::STANDARD_SYNTHETIC_COMPARATIVE`] measures.
pub fn write_comparative_report(
    out: &mut dyn fmt::Write,
    evaluations: &[StatisticalEvaluation],
) -> fmt::Result {
    write_comparative_specific_report(out, evaluations, Measures::STANDARD_SYNTHETIC_COMPARATIVE)
}

/// One column per method and one line per requested measure.
///
/// Significance tests need at least two runs and are skipped otherwise.
pub fn write_comparative_specific_report(
    out: &mut dyn fmt::Write,
    evaluations: &[StatisticalEvaluation],
    measures: Measures,
) -> fmt::Result {
    let Some(first) = evaluations.first() else {
        return Ok(());
    };
    write!(out, "{}", first.criterion_name)?;
    for evaluation in evaluations {
        write!(out, "\t{}", evaluation.method_name)?;
    }
    writeln!(out)?;

    for measure in measures.values() {
        write!(out, "{}", measure.label())?;
        for evaluation in evaluations {
            write!(out, "\t{}", format_continuous(evaluation.measure(measure)))?;
        }
        writeln!(out)?;
    }
    if measures.contains(Measures::SIGNIFICANT_TESTS) && first.run_number() > 1 {
        write!(out, "{}", Measures::SIGNIFICANT_TESTS.label())?;
        for evaluation in evaluations {
            // The blank keeps spreadsheets from reading the cell as a date.
            write!(
                out,
                "\t {}/{}/{}",
                first.significant_win_number(evaluation),
                first.significant_tie_number(evaluation),
                first.significant_loss_number(evaluation)
            )?;
        }
        writeln!(out)?;
    }
    if measures.contains(Measures::RANK) {
        write!(out, "{}", Measures::RANK.label())?;
        for method in 0..evaluations.len() {
            write!(out, "\t{}", format_continuous(method_mean_rank(evaluations, method)))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Per-experiment comparison with the [`Measures::STANDARD_COMPARATIVE`] measures.
pub fn write_experiment_comparative_report(
    out: &mut dyn fmt::Write,
    evaluations: &[StatisticalEvaluation],
) -> fmt::Result {
    write_experiment_comparative_specific_report(out, evaluations, Measures::STANDARD_COMPARATIVE)
}

/// One line per experiment, with a block of measure columns per method.
pub fn write_experiment_comparative_specific_report(
    out: &mut dyn fmt::Write,
    evaluations: &[StatisticalEvaluation],
    measures: Measures,
) -> fmt::Result {
    let Some(first) = evaluations.first() else {
        return Ok(());
    };
    let with_tests = measures.contains(Measures::SIGNIFICANT_TESTS) && first.run_number() > 1;
    let measures_label = measures.label();
    writeln!(out, "{}", first.criterion_name)?;
    write!(out, "{}", first.experiment_name)?;
    for evaluation in evaluations {
        write!(out, "\t{}{}", evaluation.method_name, empty_label(&measures_label))?;
    }
    writeln!(out)?;
    write!(out, "{}", empty_label(&first.experiment_name))?;
    for _ in evaluations {
        write!(out, "\t{measures_label}")?;
    }
    writeln!(out)?;

    for experiment in 0..first.experiment_number() {
        write!(out, "{}", first.experiment_labels[experiment])?;
        for (method, evaluation) in evaluations.iter().enumerate() {
            for measure in measures.values() {
                write!(out, "\t{}", format_continuous(evaluation.measure_at(measure, experiment)))?;
            }
            if with_tests {
                write!(out, "\t{}", first.significant_difference_at(evaluation, experiment))?;
            }
            if measures.contains(Measures::RANK) {
                write!(out, "\t{}", method_rank_at(evaluations, method, experiment))?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Every result of every method, one line per run.
pub fn write_value_comparative_report(
    out: &mut dyn fmt::Write,
    evaluations: &[StatisticalEvaluation],
) -> fmt::Result {
    let Some(first) = evaluations.first() else {
        return Ok(());
    };
    writeln!(out, "{}", first.criterion_name)?;
    write!(out, "{}\tRun", first.experiment_name)?;
    for evaluation in evaluations {
        write!(out, "\t{}", evaluation.method_name)?;
    }
    writeln!(out)?;
    for experiment in 0..first.experiment_number() {
        for run in 0..first.run_number() {
            write!(out, "{}\t{}", first.experiment_labels[experiment], run + 1)?;
            for evaluation in evaluations {
                write!(out, "\t{}", format_continuous(evaluation.result_at(experiment, run)))?;
            }
            writeln!(out)?;
        }
    }
    Ok(())
}

/// As many tabs as `label` holds, to skip its columns.
fn empty_label(label: &str) -> String {
    label.chars().filter(|c| *c == '\t').collect()
}

fn to_vec(view: ArrayView1<'_, f64>) -> Vec<f64> {
    view.iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluation(method: &str, rows: &[&[f64]]) -> StatisticalEvaluation {
        let mut evaluation = StatisticalEvaluation::new();
        evaluation.set_criterion_name("Test acc");
        evaluation.set_method_name(method);
        evaluation.set_experiment_name("Dataset");
        evaluation.set_experiment_number(rows.len());
        evaluation.set_run_number(rows[0].len());
        for (experiment, row) in rows.iter().enumerate() {
            evaluation.set_experiment_label_at(experiment, format!("D{}", experiment + 1));
            for (run, value) in row.iter().enumerate() {
                evaluation.set_result_at(experiment, run, *value);
            }
        }
        evaluation
    }

    #[test]
    fn measures_follow_the_results() {
        let evaluation = evaluation("NB", &[&[0.8, 0.9, 1.0], &[0.5, 0.5, 0.5]]);
        assert!((evaluation.mean_at(0) - 0.9).abs() < 1e-12);
        assert!((evaluation.mean() - 0.7).abs() < 1e-12);
        assert!((evaluation.min() - 0.5).abs() < 1e-12);
        assert!((evaluation.max() - 1.0).abs() < 1e-12);
        assert!(evaluation.standard_deviation_at(1).abs() < 1e-12);
        assert!((evaluation.geometric_mean_at(1) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn geometric_mean_is_zero_with_a_non_positive_value() {
        let evaluation = evaluation("NB", &[&[0.0, 2.0], &[-1.0, 3.0]]);
        assert_eq!(evaluation.geometric_mean_at(0), 0.0);
        assert_eq!(evaluation.geometric_mean_at(1), 0.0);
        assert_eq!(evaluation.geometric_mean(), 0.0);
    }

    #[test]
    fn resizing_resets_results_and_keeps_labels() {
        let mut evaluation = evaluation("NB", &[&[1.0, 2.0]]);
        evaluation.set_run_number(3);
        assert_eq!(evaluation.results().dim(), (1, 3));
        assert_eq!(evaluation.result_at(0, 0), 0.0);
        assert_eq!(evaluation.experiment_label_at(0), "D1");
        evaluation.set_experiment_number(2);
        assert_eq!(evaluation.experiment_label_at(1), "");
    }

    #[test]
    fn paired_test_is_oriented_by_the_optimisation_direction() {
        let better = evaluation("A", &[&[0.90, 0.91, 0.92, 0.93, 0.94]]);
        let worse = evaluation("B", &[&[0.60, 0.62, 0.61, 0.63, 0.60]]);
        assert_eq!(better.significant_difference_at(&worse, 0), 1);
        assert_eq!(worse.significant_difference_at(&better, 0), -1);
        assert_eq!(better.significant_difference_at(&better, 0), 0);

        let mut errors = better.clone();
        let mut other_errors = worse.clone();
        errors.set_maximization(false);
        other_errors.set_maximization(false);
        assert_eq!(errors.significant_difference_at(&other_errors, 0), -1);

        assert_eq!(better.significant_win_number(&worse), 1);
        assert_eq!(better.significant_tie_number(&worse), 0);
        assert_eq!(worse.significant_loss_number(&better), 1);
    }

    #[test]
    fn ranks_follow_the_means() {
        let methods = [
            evaluation("A", &[&[0.7, 0.7], &[0.9, 0.9]]),
            evaluation("B", &[&[0.8, 0.8], &[0.6, 0.6]]),
            evaluation("C", &[&[0.8, 0.8], &[0.5, 0.5]]),
        ];
        assert_eq!(method_rank_at(&methods, 0, 0), 3);
        assert_eq!(method_rank_at(&methods, 1, 0), 1);
        assert_eq!(method_rank_at(&methods, 2, 0), 1);
        assert!((method_mean_rank(&methods, 0) - 2.0).abs() < 1e-12);

        let mut minimized = methods.clone();
        for evaluation in &mut minimized {
            evaluation.set_maximization(false);
        }
        assert_eq!(method_rank_at(&minimized, 0, 0), 1);
    }

    #[test]
    fn comparability_ignores_method_and_labels() {
        let first = evaluation("A", &[&[1.0, 2.0]]);
        let mut second = evaluation("B", &[&[3.0, 4.0]]);
        second.set_experiment_label_at(0, "other");
        assert!(first.is_comparable(&second));
        second.set_run_number(3);
        assert!(!first.is_comparable(&second));

        let mut copy = StatisticalEvaluation::new();
        copy.copy_from(&first);
        assert_eq!(copy, first);
        assert_eq!(copy.object_label(), "Test acc(A)");
    }

    #[test]
    fn significance_level_is_validated() {
        let mut evaluation = StatisticalEvaluation::new();
        assert!(evaluation.set_significance_level(0.0).is_err());
        assert!(evaluation.set_significance_level(1.5).is_err());
        evaluation.set_significance_level(0.01).unwrap();
        assert!((evaluation.significance_level() - 0.01).abs() < f64::EPSILON);
    }

    #[test]
    fn measure_labels_join_the_selected_names() {
        assert_eq!(Measures::STANDARD_SYNTHETIC_COMPARATIVE.label(), "Mean\tSignificantTests\tRank");
        assert_eq!((Measures::MIN | Measures::MAX).label(), "Min\tMax");
        assert_eq!(Measures::default().label(), "");
    }

    #[test]
    fn comparative_report_lists_measures_tests_and_ranks() {
        let methods = [
            evaluation("A", &[&[0.90, 0.91, 0.92, 0.93, 0.94]]),
            evaluation("B", &[&[0.60, 0.62, 0.61, 0.63, 0.60]]),
        ];
        let mut out = String::new();
        write_comparative_report(&mut out, &methods).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Test acc\tA\tB");
        assert!(lines[1].starts_with("Mean\t0.92\t"));
        assert_eq!(lines[2], "SignificantTests\t 0/1/0\t 1/0/0");
        assert_eq!(lines[3], "Rank\t1\t2");
    }

    #[test]
    fn single_run_skips_significance_tests() {
        let methods = [evaluation("A", &[&[1.0]]), evaluation("B", &[&[2.0]])];
        let mut out = String::new();
        write_comparative_report(&mut out, &methods).unwrap();
        assert!(!out.contains("SignificantTests"));
        let mut details = String::new();
        write_experiment_comparative_report(&mut details, &methods).unwrap();
        let lines: Vec<&str> = details.lines().collect();
        assert_eq!(lines[1], "Dataset\tA\t\t\tB\t\t");
        assert_eq!(lines[2], "\tMean\tSignificantTests\tRank\tMean\tSignificantTests\tRank");
        assert_eq!(lines[3], "D1\t1\t2\t2\t1");
    }

    #[test]
    fn value_report_has_one_line_per_run() {
        let methods = [
            evaluation("A", &[&[1.0, 2.0], &[3.0, 4.0]]),
            evaluation("B", &[&[5.0, 6.0], &[7.0, 8.0]]),
        ];
        let mut out = String::new();
        write_value_comparative_report(&mut out, &methods).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[1], "Dataset\tRun\tA\tB");
        assert_eq!(lines[2], "D1\t1\t1\t5");
        assert_eq!(lines[5], "D2\t2\t4\t8");

        let mut single = String::new();
        methods[0].write_report(&mut single).unwrap();
        assert_eq!(single.lines().next(), Some("Test acc\tA"));
        assert!(single.contains("StandardDeviation\t"));
    }
}
