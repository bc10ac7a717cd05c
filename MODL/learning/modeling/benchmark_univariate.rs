use std::{fmt, path::Path, time::Duration};

use super::{
    benchmark::{BenchmarkVariant, LearningBenchmark, ResultCell},
    benchmark_spec::BenchmarkSpec,
    predictor::{Predictor, UNIVARIATE},
    statistical_evaluation::{write_comparative_report, StatisticalEvaluation},
};
use crate::{
    cancellation::CancellationToken, errors::LearningError,
    stats::preparation::DataPreparationStats,
};

#[derive(Debug, Clone, Default)]
pub(super) struct UnivariateState {
    pub evaluate_optimization_criterion: bool,
}

/// Benchmark where every explanatory attribute of every dataset is an experiment.
///
/// Only univariate predictors are allowed. On top of the benchmark criteria, the
/// number of cells of the trained grid is tracked, and optionally the optimisation
/// criterion of each attribute compared with the one of the first predictor.
#[derive(Debug)]
pub struct LearningBenchmarkUnivariate {
    benchmark: LearningBenchmark,
}

impl LearningBenchmarkUnivariate {
    /// Turns a benchmark without task into a univariate benchmark.
    #[must_use]
    pub fn new(mut benchmark: LearningBenchmark) -> Self {
        debug_assert_eq!(benchmark.criterion_number(), 0);
        benchmark.set_predictor_filter(UNIVARIATE);
        benchmark.variant = BenchmarkVariant::Univariate(UnivariateState::default());
        Self { benchmark }
    }

    /// Adds the optimisation criteria; must precede the task type.
    #[must_use]
    pub fn with_optimization_criterion(mut self) -> Self {
        debug_assert_eq!(self.benchmark.criterion_number(), 0);
        if let BenchmarkVariant::Univariate(state) = &mut self.benchmark.variant {
            state.evaluate_optimization_criterion = true;
        }
        self
    }

    /// Whether the optimisation criteria are evaluated.
    #[must_use]
    pub const fn is_optimization_criterion_evaluated(&self) -> bool {
        matches!(
            &self.benchmark.variant,
            BenchmarkVariant::Univariate(UnivariateState {
                evaluate_optimization_criterion: true
            })
        )
    }

    /// Underlying benchmark.
    #[must_use]
    pub const fn benchmark(&self) -> &LearningBenchmark {
        &self.benchmark
    }

    /// Mutable underlying benchmark, to set the task and add datasets and predictors.
    pub fn benchmark_mut(&mut self) -> &mut LearningBenchmark {
        &mut self.benchmark
    }

    /// Number of experiments of a dataset.
    #[must_use]
    pub fn explanatory_attribute_number(&self, benchmark: usize) -> usize {
        self.benchmark
            .benchmark_specs()
            .get(benchmark)
            .map_or(0, |spec| explanatory_attribute_names(spec).len())
    }

    /// Index of the first experiment of a dataset.
    #[must_use]
    pub fn experiment_start_index(&self, benchmark: usize) -> usize {
        self.benchmark.experiment_start_index(benchmark)
    }

    /// See [`LearningBenchmark::check`].
    pub fn check(&self) -> bool {
        self.benchmark.check()
    }

    /// See [`LearningBenchmark::evaluate`].
    pub fn evaluate(&mut self, cancel: &CancellationToken) -> Result<bool, LearningError> {
        self.benchmark.evaluate(cancel)
    }

    /// Report with a synthetic section per dataset before the whole benchmark.
    pub fn write_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.benchmark.write_report(out)
    }

    /// Writes [`Self::write_report`] to a file.
    pub fn write_report_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        self.benchmark.write_report_file(path)
    }

    /// Releases the underlying benchmark.
    #[must_use]
    pub fn into_inner(self) -> LearningBenchmark {
        self.benchmark
    }
}

/// Used simple attributes of a dataset, target excluded, in dictionary order.
fn explanatory_attribute_names(spec: &BenchmarkSpec) -> Vec<String> {
    spec.class()
        .attributes()
        .filter(|attribute| {
            attribute.used
                && attribute.value_type.is_simple()
                && attribute.name != spec.target_attribute_name()
        })
        .map(|attribute| attribute.name.clone())
        .collect()
}

impl LearningBenchmark {
    pub(super) fn create_univariate_criteria(&mut self, optimization: bool) -> Result<(), LearningError> {
        self.add_criterion("ClusterNumber", "Clusters", false)?;
        self.add_criterion("MonoCluster", "Mono", true)?;
        if optimization {
            self.add_criterion("OptimizationCriterion", "Criterion", false)?;
            self.add_criterion("DiffOptimizationCriterion", "Diff", false)?;
            self.add_criterion("IsEqualOptimizationCriterion", "Opt", true)?;
        }
        Ok(())
    }

    pub(super) fn experiment_start_index(&self, benchmark: usize) -> usize {
        self.benchmark_specs()
            .iter()
            .take(benchmark)
            .map(|spec| explanatory_attribute_names(spec).len())
            .sum()
    }

    pub(super) fn univariate_experiment_layout(&self) -> (String, Vec<String>) {
        let labels = self
            .benchmark_specs()
            .iter()
            .flat_map(|spec| {
                explanatory_attribute_names(spec)
                    .into_iter()
                    .map(move |name| format!("{}\t{name}", spec.class_name()))
            })
            .collect();
        ("Dataset\tAttribute".to_owned(), labels)
    }

    /// Trains and evaluates the predictor on each attribute of a fold, sharing one
    /// computation of the class stats.
    pub(super) fn evaluate_univariate_experiment(
        &mut self,
        benchmark: usize,
        predictor: usize,
        fold: usize,
        run: usize,
        folds: &[usize],
        cancel: &CancellationToken,
    ) -> Result<(), LearningError> {
        self.label("Train");
        let names = explanatory_attribute_names(&self.benchmark_specs()[benchmark]);
        let start_index = self.experiment_start_index(benchmark);
        let Some(class_stats) =
            self.compute_train_class_stats(benchmark, predictor, fold, folds, 0, cancel)?
        else {
            return Ok(());
        };
        let attribute_time = Duration::from_secs_f64(
            class_stats.total_compute_time().as_secs_f64() / names.len().max(1) as f64,
        );

        let predictor_name = self.predictor_specs()[predictor].predictor_name().to_owned();
        let mut model = self
            .registry()
            .create(&predictor_name)
            .ok_or_else(|| LearningError::Evaluation(format!("unknown predictor {predictor_name}")))?;
        let univariate = model.as_univariate_mut().ok_or_else(|| {
            LearningError::Evaluation(format!(
                "predictor {predictor_name} does not evaluate single variables"
            ))
        })?;

        for (index, name) in names.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            self.label(&format!("Evaluate variable {name}"));
            self.benchmark_spec_mut(benchmark)
                .compute_database_selected_instance(folds, fold, true);
            univariate.set_attribute_name(name.clone());
            if !univariate.train(&class_stats)? {
                continue;
            }
            let cell = ResultCell {
                predictor,
                experiment: start_index + index,
                run,
            };
            let train_evaluation = univariate.evaluate(self.benchmark_specs()[benchmark].database())?;
            self.collect_all_results(
                true,
                cell,
                &class_stats,
                univariate.used_attribute_number(),
                &train_evaluation,
            );
            self.set_time_results(cell, attribute_time, attribute_time);
            let clusters = univariate.train_source_cell_number();
            self.set_result("ClusterNumber", cell, clusters as f64);
            self.set_result("MonoCluster", cell, if clusters == 1 { 1.0 } else { 0.0 });
            if let Some(stats) = class_stats.lookup_attribute_stats(name) {
                self.set_result("OptimizationCriterion", cell, stats.level());
            }

            self.benchmark_spec_mut(benchmark)
                .compute_database_selected_instance(folds, fold, false);
            let test_evaluation = univariate.evaluate(self.benchmark_specs()[benchmark].database())?;
            self.collect_all_results(
                false,
                cell,
                &class_stats,
                univariate.used_attribute_number(),
                &test_evaluation,
            );
        }
        Ok(())
    }

    /// Compares the optimisation criterion of every predictor with the first one.
    pub(super) fn compute_optimization_differences(&mut self) {
        let BenchmarkVariant::Univariate(state) = &self.variant else {
            return;
        };
        if !state.evaluate_optimization_criterion {
            return;
        }
        let Some(criterion) = self.criterion_index_at("OptimizationCriterion") else {
            return;
        };
        let evaluations = self.all_evaluations_at(criterion).to_vec();
        let Some(reference) = evaluations.first() else {
            return;
        };
        let epsilon = self.numerics().optimization_equality_epsilon;
        for (predictor, evaluation) in evaluations.iter().enumerate() {
            for experiment in 0..evaluation.experiment_number() {
                for run in 0..evaluation.run_number() {
                    let reference_value = reference.result_at(experiment, run);
                    let difference = reference_value - evaluation.result_at(experiment, run);
                    let cell = ResultCell {
                        predictor,
                        experiment,
                        run,
                    };
                    self.set_result("DiffOptimizationCriterion", cell, difference);
                    let equal = difference.abs() <= epsilon * reference_value.abs();
                    self.set_result(
                        "IsEqualOptimizationCriterion",
                        cell,
                        if equal { 1.0 } else { 0.0 },
                    );
                }
            }
        }
    }

    /// Synthetic comparative reports restricted to the experiments of each dataset.
    pub(super) fn write_dataset_reports(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        for (benchmark, spec) in self.benchmark_specs().iter().enumerate() {
            let start = self.experiment_start_index(benchmark);
            let number = explanatory_attribute_names(spec).len();
            write!(out, "\n\nDataset\t{}\n\n", spec.class_name())?;
            for criterion in 0..self.criterion_number() {
                if criterion > 0 {
                    writeln!(out)?;
                }
                let slices: Vec<StatisticalEvaluation> = self
                    .all_evaluations_at(criterion)
                    .iter()
                    .map(|evaluation| experiment_slice(evaluation, start, number, spec.class_name()))
                    .collect();
                write_comparative_report(out, &slices)?;
            }
        }
        Ok(())
    }
}

fn experiment_slice(
    evaluation: &StatisticalEvaluation,
    start: usize,
    number: usize,
    experiment_name: &str,
) -> StatisticalEvaluation {
    let mut slice = evaluation.clone();
    slice.set_experiment_name(experiment_name);
    slice.set_experiment_number(number);
    for experiment in 0..number {
        slice.set_experiment_label_at(experiment, evaluation.experiment_label_at(start + experiment));
        for run in 0..evaluation.run_number() {
            slice.set_result_at(experiment, run, evaluation.result_at(start + experiment, run));
        }
    }
    slice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dictionary::value::ValueType,
        modeling::{
            benchmark::tests::silent_manager,
            predictor::{PredictorSpec, NAIVE_BAYES},
        },
        modules::PredictorRegistry,
        preparation::tests::{toy_class, toy_database},
        stats::grouper::GroupingMethod,
    };

    fn toy_univariate(optimization: bool) -> LearningBenchmarkUnivariate {
        let base = LearningBenchmark::new(PredictorRegistry::with_builtins(), silent_manager());
        let mut univariate = LearningBenchmarkUnivariate::new(base);
        if optimization {
            univariate = univariate.with_optimization_criterion();
        }
        let benchmark = univariate.benchmark_mut();
        benchmark.config_mut().fold_number = 2;
        benchmark.set_target_attribute_type(ValueType::Symbol).unwrap();
        benchmark.add_benchmark_spec(BenchmarkSpec::new(toy_class(), toy_database(), "label"));
        benchmark.add_predictor_spec(PredictorSpec::new(UNIVARIATE));
        univariate
    }

    #[test]
    fn experiments_are_dataset_attributes() {
        let mut univariate = toy_univariate(false);
        univariate
            .benchmark_mut()
            .add_benchmark_spec(BenchmarkSpec::new(toy_class(), toy_database(), "color"));
        assert_eq!(univariate.explanatory_attribute_number(0), 3);
        assert_eq!(univariate.experiment_start_index(1), 3);
        assert_eq!(univariate.benchmark().criterion_number(), 20);
        assert!(!univariate.is_optimization_criterion_evaluated());

        let benchmark = univariate.benchmark_mut();
        benchmark.init_evaluation_results().unwrap();
        let evaluation = benchmark.evaluation_at(0, 0).unwrap();
        assert_eq!(evaluation.experiment_name(), "Dataset\tAttribute");
        assert_eq!(evaluation.experiment_number(), 6);
        assert_eq!(evaluation.experiment_label_at(1), "Toy\tcolor");
        assert_eq!(evaluation.experiment_label_at(4), "Toy\tnoise");
        assert_eq!(evaluation.experiment_label_at(5), "Toy\tlabel");
    }

    #[test]
    fn only_univariate_predictors_are_allowed() {
        let mut univariate = toy_univariate(false);
        assert!(univariate.check());
        univariate
            .benchmark_mut()
            .add_predictor_spec(PredictorSpec::new(NAIVE_BAYES));
        assert!(!univariate.check());
        assert_eq!(
            univariate.benchmark().errors().records()[0].label,
            "The predictor does not belong to the list of allowed predictors (Univariate)"
        );
    }

    #[test]
    fn clusters_and_accuracy_follow_each_attribute() {
        let mut univariate = toy_univariate(false);
        assert!(univariate.evaluate(&CancellationToken::new()).unwrap());
        let benchmark = univariate.benchmark();
        let clusters = benchmark.criterion_index_at("ClusterNumber").unwrap();
        let mono = benchmark.criterion_index_at("MonoCluster").unwrap();
        let accuracy = benchmark.criterion_index_at("TestAccuracy").unwrap();
        let clusters = benchmark.evaluation_at(clusters, 0).unwrap();
        let mono = benchmark.evaluation_at(mono, 0).unwrap();
        let accuracy = benchmark.evaluation_at(accuracy, 0).unwrap();
        for run in 0..2 {
            assert!(clusters.result_at(0, run) >= 2.0);
            assert_eq!(mono.result_at(0, run), 0.0);
            assert_eq!(clusters.result_at(2, run), 1.0);
            assert_eq!(mono.result_at(2, run), 1.0);
            assert!(accuracy.result_at(0, run) > accuracy.result_at(2, run));
        }
    }

    #[test]
    fn optimization_criterion_is_compared_with_the_first_predictor() {
        let mut univariate = toy_univariate(true);
        assert!(univariate.is_optimization_criterion_evaluated());
        univariate.benchmark_mut().add_predictor_spec(
            PredictorSpec::new(UNIVARIATE)
                .with_label("Basic")
                .with_grouping_method(GroupingMethod::MostFrequent),
        );
        assert_eq!(univariate.benchmark().criterion_number(), 23);
        assert!(univariate.evaluate(&CancellationToken::new()).unwrap());

        let benchmark = univariate.benchmark();
        let level = benchmark.criterion_index_at("OptimizationCriterion").unwrap();
        let difference = benchmark.criterion_index_at("DiffOptimizationCriterion").unwrap();
        let equal = benchmark.criterion_index_at("IsEqualOptimizationCriterion").unwrap();
        for run in 0..2 {
            assert!(benchmark.evaluation_at(level, 0).unwrap().result_at(0, run) > 0.0);
            for experiment in 0..3 {
                assert_eq!(benchmark.evaluation_at(difference, 0).unwrap().result_at(experiment, run), 0.0);
                assert_eq!(benchmark.evaluation_at(equal, 0).unwrap().result_at(experiment, run), 1.0);
            }
            // Grouping methods only differ on categorical attributes.
            assert_eq!(benchmark.evaluation_at(equal, 1).unwrap().result_at(0, run), 1.0);
        }
    }

    #[test]
    fn report_has_a_section_per_dataset() {
        let mut univariate = toy_univariate(false);
        univariate.evaluate(&CancellationToken::new()).unwrap();
        let mut report = String::new();
        univariate.write_report(&mut report).unwrap();
        let dataset = report.find("\n\nDataset\tToy\n\n").unwrap();
        let all = report.find("\n\nAll datasets\n\n").unwrap();
        assert!(dataset < all);
        assert!(report[dataset..all].contains("Clusters\tUnivariate\n"));
        assert!(report.contains("Dataset\tAttribute\tUnivariate"));
    }
}
