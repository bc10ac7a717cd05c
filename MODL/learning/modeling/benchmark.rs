use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::Context;
use indexmap::IndexMap;
use serde_json::{json, Value};
use shared_logging::LogLevel;

use super::{
    benchmark_spec::BenchmarkSpec,
    benchmark_univariate::UnivariateState,
    evaluation::PredictorEvaluation,
    predictor::PredictorSpec,
    statistical_evaluation::{
        write_comparative_report, write_experiment_comparative_report,
        write_value_comparative_report, StatisticalEvaluation,
    },
};
use crate::{
    cancellation::CancellationToken,
    config::{BenchmarkConfig, LearningConfig, NumericsConfig, PreparationConfig},
    dictionary::{
        domain::{ClassDomain, DomainRegistry},
        value::{format_continuous, ValueType},
    },
    error_manager::LearningErrorManager,
    errors::LearningError,
    modules::{is_allowed, PredictorRegistry},
    stats::{class_stats::ClassStats, learning_spec::LearningSpec},
    telemetry::LearningTelemetry,
};

const ERROR_CATEGORY: &str = "Learning benchmark";

/// Name of the scratch domain installed while evaluating.
pub const EVALUATION_DOMAIN: &str = "Evaluation";

const CLASSIFICATION_MEASURES: [(&str, &str); 4] = [
    ("Accuracy", "acc"),
    ("BalancedAccuracy", "Bacc"),
    ("AUC", "AUC"),
    ("CompressionRate", "CompR"),
];

const REGRESSION_MEASURES: [&str; 6] = ["RMSE", "MAE", "NLPD", "RankRMSE", "RankMAE", "RankNLPD"];

/// Metric tracked for every predictor, dataset and run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkCriterion {
    name: String,
    label: String,
    maximization: bool,
}

impl BenchmarkCriterion {
    /// Identifier used to store results.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Label printed in reports.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether greater values are better.
    #[must_use]
    pub const fn is_maximization(&self) -> bool {
        self.maximization
    }
}

#[derive(Debug, Clone, Default)]
pub(super) enum BenchmarkVariant {
    #[default]
    Predictors,
    Univariate(UnivariateState),
}

/// Position of one train/test pass in the result matrices.
#[derive(Debug, Clone, Copy)]
pub(super) struct ResultCell {
    pub predictor: usize,
    pub experiment: usize,
    pub run: usize,
}

/// Cross-validation of predictors over a set of datasets.
///
/// Every dataset is split `fold_number` times into train and test parts, for
/// `cross_validation_number` seeds. Each predictor is trained on the train part and
/// evaluated on both parts; each criterion keeps one [`StatisticalEvaluation`] per
/// predictor, whose experiments are the datasets and whose runs are the folds of every
/// validation.
#[derive(Debug)]
pub struct LearningBenchmark {
    target_attribute_type: Option<ValueType>,
    config: BenchmarkConfig,
    preparation: PreparationConfig,
    numerics: NumericsConfig,
    predictor_filter: String,
    benchmark_specs: Vec<BenchmarkSpec>,
    predictor_specs: Vec<PredictorSpec>,
    registry: PredictorRegistry,
    criteria: IndexMap<String, BenchmarkCriterion>,
    evaluations: Vec<Vec<StatisticalEvaluation>>,
    output_directory: Option<PathBuf>,
    errors: LearningErrorManager,
    domains: DomainRegistry,
    telemetry: Option<LearningTelemetry>,
    pub(super) variant: BenchmarkVariant,
}

impl LearningBenchmark {
    /// Benchmark with default parameters and no task.
    #[must_use]
    pub fn new(registry: PredictorRegistry, errors: LearningErrorManager) -> Self {
        Self {
            target_attribute_type: None,
            config: BenchmarkConfig::default(),
            preparation: PreparationConfig::default(),
            numerics: NumericsConfig::default(),
            predictor_filter: String::new(),
            benchmark_specs: Vec::new(),
            predictor_specs: Vec::new(),
            registry,
            criteria: IndexMap::new(),
            evaluations: Vec::new(),
            output_directory: None,
            errors,
            domains: DomainRegistry::new(),
            telemetry: None,
            variant: BenchmarkVariant::Predictors,
        }
    }

    /// Takes the benchmark, preparation and numerics sections of a configuration.
    #[must_use]
    pub fn with_config(mut self, config: &LearningConfig) -> Self {
        self.config = config.benchmark.clone();
        self.preparation = config.preparation;
        self.numerics = config.numerics;
        self
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: LearningTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Shares the registry of the current class domain.
    #[must_use]
    pub fn with_domain_registry(mut self, domains: DomainRegistry) -> Self {
        self.domains = domains;
        self
    }

    /// Directory of the report file and of the exported databases.
    ///
    /// Intermediate reports are only written when a directory is set.
    #[must_use]
    pub fn with_output_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(directory.into());
        self
    }

    /// Cross-validation parameters.
    #[must_use]
    pub const fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Mutable cross-validation parameters; results must be initialized again.
    pub fn config_mut(&mut self) -> &mut BenchmarkConfig {
        &mut self.config
    }

    /// Registry resolving predictor names.
    #[must_use]
    pub const fn registry(&self) -> &PredictorRegistry {
        &self.registry
    }

    /// Error channel.
    #[must_use]
    pub const fn errors(&self) -> &LearningErrorManager {
        &self.errors
    }

    /// `;` separated names of the allowed predictors; empty allows all.
    #[must_use]
    pub fn predictor_filter(&self) -> &str {
        &self.predictor_filter
    }

    pub(super) fn set_predictor_filter(&mut self, filter: impl Into<String>) {
        self.predictor_filter = filter.into();
    }

    /// Task type: `Symbol` for classification, `Continuous` for regression, `None`
    /// for unsupervised learning.
    #[must_use]
    pub const fn target_attribute_type(&self) -> Option<ValueType> {
        self.target_attribute_type
    }

    /// Sets the task type once and creates its criteria.
    pub fn set_target_attribute_type(&mut self, target_type: ValueType) -> Result<(), LearningError> {
        if let Some(current) = self.target_attribute_type {
            return Err(LearningError::InvalidArgument(format!(
                "benchmark task already set to {}",
                task_label(current)
            )));
        }
        if target_type == ValueType::Structure {
            return Err(LearningError::InvalidArgument(
                "benchmark target type must be categorical, numerical or none".into(),
            ));
        }
        self.target_attribute_type = Some(target_type);
        self.create_criteria(target_type)
    }

    /// Adds a dataset.
    pub fn add_benchmark_spec(&mut self, spec: BenchmarkSpec) {
        self.benchmark_specs.push(spec);
    }

    /// Datasets.
    #[must_use]
    pub fn benchmark_specs(&self) -> &[BenchmarkSpec] {
        &self.benchmark_specs
    }

    /// Adds a predictor.
    pub fn add_predictor_spec(&mut self, spec: PredictorSpec) {
        self.predictor_specs.push(spec);
    }

    /// Predictors.
    #[must_use]
    pub fn predictor_specs(&self) -> &[PredictorSpec] {
        &self.predictor_specs
    }

    /// Registers a criterion; names must be unique and not empty.
    pub fn add_criterion(
        &mut self,
        name: &str,
        label: &str,
        maximization: bool,
    ) -> Result<(), LearningError> {
        if name.is_empty() {
            return Err(LearningError::InvalidArgument("empty criterion name".into()));
        }
        if self.criteria.contains_key(name) {
            return Err(LearningError::InvalidArgument(format!(
                "criterion {name} already registered"
            )));
        }
        self.criteria.insert(
            name.to_owned(),
            BenchmarkCriterion {
                name: name.to_owned(),
                label: label.to_owned(),
                maximization,
            },
        );
        Ok(())
    }

    /// Number of criteria.
    #[must_use]
    pub fn criterion_number(&self) -> usize {
        self.criteria.len()
    }

    /// Criterion by index.
    #[must_use]
    pub fn criterion_at(&self, index: usize) -> Option<&BenchmarkCriterion> {
        self.criteria.get_index(index).map(|(_, criterion)| criterion)
    }

    /// Index of a criterion.
    #[must_use]
    pub fn criterion_index_at(&self, name: &str) -> Option<usize> {
        self.criteria.get_index_of(name)
    }

    fn create_criteria(&mut self, target_type: ValueType) -> Result<(), LearningError> {
        debug_assert_eq!(self.criterion_number(), 0);
        match target_type {
            ValueType::Symbol => {
                for (measure, label) in CLASSIFICATION_MEASURES {
                    for prefix in ["Train", "Test", "Ratio"] {
                        self.add_criterion(
                            &format!("{prefix}{measure}"),
                            &format!("{prefix} {label}"),
                            true,
                        )?;
                    }
                }
            }
            ValueType::Continuous => {
                for measure in REGRESSION_MEASURES {
                    for (prefix, maximization) in [("Train", false), ("Test", false), ("Ratio", true)] {
                        self.add_criterion(
                            &format!("{prefix}{measure}"),
                            &format!("{prefix} {measure}"),
                            maximization,
                        )?;
                    }
                }
            }
            _ => {}
        }
        for (name, label, maximization) in [
            ("FeatureNumber", "Features", false),
            ("ConstructedFeatureNumber", "Constr. att.", true),
            ("InformativeFeatureNumber", "Inf. features", true),
            ("UsedAttributeNumber", "Used attributes", false),
            ("TotalComputingTime", "Total Time", false),
            ("PreprocessingComputingTime", "Pre Time", false),
        ] {
            self.add_criterion(name, label, maximization)?;
        }
        if let BenchmarkVariant::Univariate(state) = &self.variant {
            let optimization = state.evaluate_optimization_criterion;
            self.create_univariate_criteria(optimization)?;
        }
        Ok(())
    }

    /// Checks the task, the datasets and the predictors, reporting every problem.
    pub fn check(&self) -> bool {
        let Some(target_type) = self.target_attribute_type else {
            self.errors
                .add_error(ERROR_CATEGORY, "", "Prediction task not initialized");
            return false;
        };
        let task = task_label(target_type);
        let mut ok = true;

        if self.config.cross_validation_number == 0 {
            self.errors
                .add_error(ERROR_CATEGORY, "", "Cross-validation number must be at least 1");
            ok = false;
        }
        if self.config.fold_number < 2 {
            self.errors.add_error(
                ERROR_CATEGORY,
                "",
                &format!("Fold number must be at least 2, got {}", self.config.fold_number),
            );
            ok = false;
        }
        let significance = self.config.significance_level;
        if !(significance > 0.0 && significance < 1.0) {
            self.errors.add_error(
                ERROR_CATEGORY,
                "",
                &format!("Significance level must lie in ]0, 1[, got {significance}"),
            );
            ok = false;
        }

        for spec in &self.benchmark_specs {
            if !spec.check(&self.errors) {
                ok = false;
                continue;
            }
            let label = spec.object_label();
            if let Err(err) = LearningSpec::build(
                spec.class(),
                spec.database(),
                spec.target_attribute_name(),
                self.preparation,
                self.numerics,
                &CancellationToken::new(),
            ) {
                self.errors
                    .add_error(ERROR_CATEGORY, &label, &format!("Wrong benchmark spec ({err})"));
                ok = false;
                continue;
            }
            if spec.target_attribute_type() != Some(target_type) {
                self.errors.add_error(
                    ERROR_CATEGORY,
                    &label,
                    &format!("Type of target variable not consistent with a {task} task"),
                );
                ok = false;
            }
        }

        for spec in &self.predictor_specs {
            let label = spec.label();
            let Some(descriptor) = self.registry.lookup(spec.predictor_name()) else {
                self.errors.add_error(
                    ERROR_CATEGORY,
                    label,
                    &format!("Unknown predictor {}", spec.predictor_name()),
                );
                ok = false;
                continue;
            };
            if !is_allowed(spec.predictor_name(), &self.predictor_filter) {
                self.errors.add_error(
                    ERROR_CATEGORY,
                    label,
                    &format!(
                        "The predictor does not belong to the list of allowed predictors ({})",
                        self.predictor_filter
                    ),
                );
                ok = false;
            } else if !descriptor.is_target_type_managed(target_type) {
                self.errors.add_error(
                    ERROR_CATEGORY,
                    label,
                    &format!("Type of predictor not consistent with a {task} task"),
                );
                ok = false;
            }
        }
        ok
    }

    /// Sizes one result matrix per criterion and predictor.
    pub fn init_evaluation_results(&mut self) -> Result<(), LearningError> {
        let (experiment_name, labels) = match &self.variant {
            BenchmarkVariant::Predictors => (
                "Dataset".to_owned(),
                self.benchmark_specs
                    .iter()
                    .map(|spec| spec.class_name().to_owned())
                    .collect::<Vec<_>>(),
            ),
            BenchmarkVariant::Univariate(_) => self.univariate_experiment_layout(),
        };
        let mut template = StatisticalEvaluation::new();
        template.set_significance_level(self.config.significance_level)?;
        template.set_experiment_name(experiment_name);
        template.set_experiment_number(labels.len());
        template.set_run_number(self.config.cross_validation_number * self.config.fold_number);
        for (experiment, label) in labels.into_iter().enumerate() {
            template.set_experiment_label_at(experiment, label);
        }

        self.evaluations = self
            .criteria
            .values()
            .map(|criterion| {
                self.predictor_specs
                    .iter()
                    .enumerate()
                    .map(|(index, spec)| {
                        let mut evaluation = template.clone();
                        evaluation.set_criterion_name(criterion.label());
                        evaluation.set_maximization(criterion.is_maximization());
                        evaluation.set_method_name(spec.label());
                        if index > 0 {
                            evaluation.reset_all_labels();
                        }
                        evaluation
                    })
                    .collect()
            })
            .collect();
        Ok(())
    }

    /// Results of a predictor on a criterion.
    #[must_use]
    pub fn evaluation_at(&self, criterion: usize, predictor: usize) -> Option<&StatisticalEvaluation> {
        self.evaluations.get(criterion)?.get(predictor)
    }

    /// Results of every predictor on a criterion.
    #[must_use]
    pub fn all_evaluations_at(&self, criterion: usize) -> &[StatisticalEvaluation] {
        self.evaluations.get(criterion).map_or(&[], Vec::as_slice)
    }

    /// Runs the whole cross-validation.
    ///
    /// A scratch class domain is installed for the duration of the evaluation.
    /// Returns `Ok(false)` when interrupted; the results computed so far are kept.
    pub fn evaluate(&mut self, cancel: &CancellationToken) -> Result<bool, LearningError> {
        let _guard = self.domains.install(ClassDomain::new(EVALUATION_DOMAIN))?;
        self.init_evaluation_results()?;
        let start = Instant::now();
        let benchmark_number = self.benchmark_specs.len();
        let validation_number = self.config.cross_validation_number;
        let fold_number = self.config.fold_number;
        let univariate = matches!(self.variant, BenchmarkVariant::Univariate(_));
        self.log(
            LogLevel::Info,
            "benchmark_started",
            json!({
                "benchmarks": benchmark_number,
                "predictors": self.predictor_specs.len(),
                "criteria": self.criteria.len(),
                "validations": validation_number,
                "folds": fold_number,
            }),
        );

        'benchmarks: for benchmark in 0..benchmark_number {
            if cancel.is_cancelled() {
                break;
            }
            if let Err(err) =
                self.benchmark_specs[benchmark].build_learning_spec(self.preparation, self.numerics, cancel)
            {
                if cancel.is_cancelled() {
                    break;
                }
                let spec = &self.benchmark_specs[benchmark];
                self.errors.add_warning(
                    ERROR_CATEGORY,
                    &spec.object_label(),
                    &format!("Wrong benchmark spec ({err})"),
                );
                continue;
            }

            for validation in 0..validation_number {
                let folds = self.benchmark_specs[benchmark].compute_fold_indexes(
                    validation as u64,
                    fold_number,
                    self.config.stratified,
                )?;
                for predictor in 0..self.predictor_specs.len() {
                    for fold in 0..fold_number {
                        if cancel.is_cancelled() {
                            self.benchmark_specs[benchmark].delete_learning_spec();
                            break 'benchmarks;
                        }
                        if self.config.export_benchmark_databases && predictor == 0 {
                            self.export_benchmark_database(benchmark, validation, fold, &folds)?;
                        }
                        self.publish_experiment(benchmark, validation, predictor, fold);
                        let run = validation * fold_number + fold;
                        if univariate {
                            self.evaluate_univariate_experiment(
                                benchmark, predictor, fold, run, &folds, cancel,
                            )?;
                        } else {
                            self.evaluate_experiment(benchmark, predictor, fold, run, &folds, cancel)?;
                        }
                    }
                }
            }
            self.benchmark_specs[benchmark].delete_learning_spec();

            if let Some(path) = self.report_path() {
                if cancel.is_cancelled() {
                    break;
                }
                self.label(&format!(
                    "Write intermediate evaluation report ({}/{benchmark_number}) {}",
                    benchmark + 1,
                    path.display()
                ));
                self.write_report_to(&path)?;
            }
        }

        if univariate {
            self.compute_optimization_differences();
        }
        let completed = !cancel.is_cancelled();
        self.log(
            LogLevel::Info,
            "benchmark_finished",
            json!({
                "completed": completed,
                "elapsed_ms": start.elapsed().as_millis() as u64,
            }),
        );
        Ok(completed)
    }

    fn publish_experiment(&self, benchmark: usize, validation: usize, predictor: usize, fold: usize) {
        let validation_number = self.config.cross_validation_number;
        let fold_number = self.config.fold_number;
        let predictor_number = self.predictor_specs.len();
        let iteration = if validation_number > 1 {
            format!(" Iter {}", validation + 1)
        } else {
            String::new()
        };
        self.main_label(&format!(
            "{}{iteration} {} Fold {}",
            self.benchmark_specs[benchmark].class_name(),
            self.predictor_specs[predictor].label(),
            fold + 1
        ));
        let total = self.benchmark_specs.len() * validation_number * predictor_number * fold_number;
        let index = benchmark * validation_number * predictor_number * fold_number
            + validation * predictor_number * fold_number
            + predictor * fold_number
            + fold
            + 1;
        self.progression(index as f64 * 100.0 / total.max(1) as f64);
    }

    /// Builds the class stats of the train part of a fold.
    ///
    /// Returns `None` when interrupted.
    pub(super) fn compute_train_class_stats(
        &mut self,
        benchmark: usize,
        predictor: usize,
        fold: usize,
        folds: &[usize],
        max_attribute_pairs: usize,
        cancel: &CancellationToken,
    ) -> Result<Option<ClassStats>, LearningError> {
        let spec = &mut self.benchmark_specs[benchmark];
        spec.compute_database_selected_instance(folds, fold, true);
        let learning_spec = match LearningSpec::build(
            spec.class(),
            spec.database(),
            spec.target_attribute_name(),
            self.preparation,
            self.numerics,
            cancel,
        ) {
            Ok(learning_spec) => learning_spec,
            Err(_) if cancel.is_cancelled() => return Ok(None),
            Err(err) => return Err(err),
        };
        let mut class_stats = ClassStats::new(learning_spec);
        if let Some(telemetry) = &self.telemetry {
            class_stats = class_stats.with_telemetry(telemetry.clone());
        }
        class_stats.set_max_attribute_pairs(max_attribute_pairs);
        class_stats
            .grouper_spec_mut()
            .set_method(self.predictor_specs[predictor].grouping_method());
        if !class_stats.compute_stats(cancel)? {
            return Ok(None);
        }
        Ok(Some(class_stats))
    }

    fn evaluate_experiment(
        &mut self,
        benchmark: usize,
        predictor: usize,
        fold: usize,
        run: usize,
        folds: &[usize],
        cancel: &CancellationToken,
    ) -> Result<(), LearningError> {
        let predictor_spec = self.predictor_specs[predictor].clone();
        self.label("Train");
        let start = Instant::now();
        let Some(class_stats) = self.compute_train_class_stats(
            benchmark,
            predictor,
            fold,
            folds,
            predictor_spec.max_attribute_pairs(),
            cancel,
        )?
        else {
            return Ok(());
        };
        let preprocessing_time = start.elapsed();

        let mut model = self
            .registry
            .create(predictor_spec.predictor_name())
            .ok_or_else(|| {
                LearningError::Evaluation(format!(
                    "unknown predictor {}",
                    predictor_spec.predictor_name()
                ))
            })?;
        if !model.train(&class_stats)? || !model.is_trained() {
            return Ok(());
        }
        let total_time = start.elapsed();

        self.label("Evaluation");
        let cell = ResultCell {
            predictor,
            experiment: benchmark,
            run,
        };
        let train_evaluation = model.evaluate(self.benchmark_specs[benchmark].database())?;
        self.collect_all_results(true, cell, &class_stats, model.used_attribute_number(), &train_evaluation);
        self.set_time_results(cell, total_time, preprocessing_time);

        self.benchmark_specs[benchmark].compute_database_selected_instance(folds, fold, false);
        let test_evaluation = model.evaluate(self.benchmark_specs[benchmark].database())?;
        self.collect_all_results(false, cell, &class_stats, model.used_attribute_number(), &test_evaluation);
        Ok(())
    }

    /// Stores the measures of one pass; ratios are set on the test pass when the train
    /// value is not zero.
    pub(super) fn collect_all_results(
        &mut self,
        train: bool,
        cell: ResultCell,
        class_stats: &ClassStats,
        used_attribute_number: usize,
        evaluation: &PredictorEvaluation,
    ) {
        if train {
            self.set_result("FeatureNumber", cell, class_stats.attribute_stats().len() as f64);
            self.set_result("ConstructedFeatureNumber", cell, 0.0);
            self.set_result(
                "InformativeFeatureNumber",
                cell,
                class_stats.informative_attribute_number() as f64,
            );
            self.set_result("UsedAttributeNumber", cell, used_attribute_number as f64);
        }
        for (measure, value) in evaluation.measures() {
            if train {
                self.set_result(&format!("Train{measure}"), cell, value);
            } else {
                self.set_result(&format!("Test{measure}"), cell, value);
                let train_value = self.result(&format!("Train{measure}"), cell);
                if let Some(train_value) = train_value.filter(|train_value| *train_value != 0.0) {
                    self.set_result(&format!("Ratio{measure}"), cell, value / train_value);
                }
            }
        }
    }

    pub(super) fn set_time_results(&mut self, cell: ResultCell, total: Duration, preprocessing: Duration) {
        self.set_result("TotalComputingTime", cell, total.as_secs_f64());
        self.set_result("PreprocessingComputingTime", cell, preprocessing.as_secs_f64());
    }

    /// Stores a result; criteria absent from the task are ignored.
    pub(super) fn set_result(&mut self, criterion: &str, cell: ResultCell, value: f64) {
        if let Some(evaluation) = self
            .criteria
            .get_index_of(criterion)
            .and_then(|index| self.evaluations.get_mut(index))
            .and_then(|evaluations| evaluations.get_mut(cell.predictor))
        {
            evaluation.set_result_at(cell.experiment, cell.run, value);
        }
    }

    pub(super) fn result(&self, criterion: &str, cell: ResultCell) -> Option<f64> {
        let index = self.criteria.get_index_of(criterion)?;
        self.evaluation_at(index, cell.predictor)
            .map(|evaluation| evaluation.result_at(cell.experiment, cell.run))
    }

    pub(super) fn benchmark_spec_mut(&mut self, benchmark: usize) -> &mut BenchmarkSpec {
        &mut self.benchmark_specs[benchmark]
    }

    pub(super) const fn numerics(&self) -> &NumericsConfig {
        &self.numerics
    }

    /// Writes the train and test records of a fold, native simple attributes only.
    fn export_benchmark_database(
        &mut self,
        benchmark: usize,
        validation: usize,
        fold: usize,
        folds: &[usize],
    ) -> Result<(), LearningError> {
        let directory = self
            .output_directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let spec = &mut self.benchmark_specs[benchmark];
        let label = spec.object_label();
        let attributes: Vec<String> = spec
            .class()
            .native_attributes()
            .filter(|attribute| attribute.used && attribute.value_type.is_simple())
            .map(|attribute| attribute.name.clone())
            .collect();
        let database_name = spec.database_name().to_owned();
        let (stem, extension) = match database_name.rsplit_once('.') {
            Some((stem, extension)) if !stem.is_empty() => (stem.to_owned(), format!(".{extension}")),
            _ => (database_name.clone(), String::new()),
        };
        for (excluding, part) in [(true, "Train"), (false, "Test")] {
            spec.compute_database_selected_instance(folds, fold, excluding);
            let file_name = format!("{stem}_{part}_V{}_F{}{extension}", validation + 1, fold + 1);
            self.errors
                .add_message(ERROR_CATEGORY, &label, &format!("Export database {file_name}"));
            spec.database()
                .write_tsv(directory.join(&file_name), &attributes)
                .map_err(|err| LearningError::Evaluation(format!("export of {file_name} failed: {err}")))?;
        }
        spec.database_mut().clear_selection();
        Ok(())
    }

    fn report_path(&self) -> Option<PathBuf> {
        if self.config.report_file_name.is_empty() {
            return None;
        }
        self.output_directory
            .as_ref()
            .map(|directory| directory.join(&self.config.report_file_name))
    }

    /// Full text report: parameters, datasets, predictors, then results.
    pub fn write_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, "Predictor evaluation report\n\n\n")?;
        writeln!(out, "Cross validation")?;
        if self.config.cross_validation_number > 1 {
            write!(out, "{} * ", self.config.cross_validation_number)?;
        }
        if self.config.stratified {
            write!(out, "Stratified ")?;
        }
        writeln!(out, "{} fold cross-validation", self.config.fold_number)?;
        writeln!(
            out,
            "Test of significant differences at {}%",
            format_continuous(self.config.significance_level * 100.0)
        )?;

        if !self.benchmark_specs.is_empty() {
            write!(out, "\n\n\n")?;
            BenchmarkSpec::write_header_line_report(
                out,
                self.target_attribute_type.unwrap_or(ValueType::None),
            )?;
            writeln!(out)?;
            for spec in &self.benchmark_specs {
                spec.write_line_report(out)?;
                writeln!(out)?;
            }
        }

        if !self.predictor_specs.is_empty() {
            write!(out, "\n\n\nPredictor\tLabel\tGrouping\tPairs\n")?;
            for spec in &self.predictor_specs {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}",
                    spec.predictor_name(),
                    spec.label(),
                    spec.grouping_method().label(),
                    spec.max_attribute_pairs()
                )?;
            }
        }

        if !self.evaluations.is_empty() {
            write!(out, "\n\n")?;
            if matches!(self.variant, BenchmarkVariant::Univariate(_)) {
                self.write_dataset_reports(out)?;
                write!(out, "\n\nAll datasets\n\n")?;
            }
            self.write_evaluation_report(out)?;
        }
        Ok(())
    }

    /// Comparative reports of every criterion, at the enabled levels of detail.
    pub fn write_evaluation_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        if self.config.synthetic_report {
            for (index, evaluations) in self.evaluations.iter().enumerate() {
                if index > 0 {
                    writeln!(out)?;
                }
                write_comparative_report(out, evaluations)?;
            }
        }
        if self.config.experiment_report {
            write!(out, "\n\nExperiment details\n\n")?;
            for (index, evaluations) in self.evaluations.iter().enumerate() {
                if index > 0 {
                    writeln!(out)?;
                }
                write_experiment_comparative_report(out, evaluations)?;
            }
        }
        if self.config.run_report {
            write!(out, "\n\nRun details\n\n")?;
            for (index, evaluations) in self.evaluations.iter().enumerate() {
                if index > 0 {
                    writeln!(out)?;
                }
                write_value_comparative_report(out, evaluations)?;
            }
        }
        Ok(())
    }

    fn write_report_to(&self, path: &Path) -> Result<(), LearningError> {
        let mut report = String::new();
        self.write_report(&mut report)
            .map_err(|_| LearningError::Evaluation("report formatting failed".into()))?;
        fs::write(path, report)?;
        Ok(())
    }

    /// Writes [`Self::write_report`] to a file.
    pub fn write_report_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        self.write_report_to(path)
            .with_context(|| format!("writing benchmark report {}", path.display()))
    }

    pub(super) fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        if let Some(telemetry) = self.telemetry.as_ref() {
            let _ = telemetry.log(level, message, metadata);
        }
    }

    fn main_label(&self, label: &str) {
        if let Some(telemetry) = self.telemetry.as_ref() {
            let _ = telemetry.main_label(label);
        }
    }

    pub(super) fn label(&self, label: &str) {
        if let Some(telemetry) = self.telemetry.as_ref() {
            let _ = telemetry.label(label);
        }
    }

    fn progression(&self, percent: f64) {
        if let Some(telemetry) = self.telemetry.as_ref() {
            let _ = telemetry.progression(percent);
        }
    }
}

/// Name of the predictor family handling a task type.
#[must_use]
pub const fn task_label(target_type: ValueType) -> &'static str {
    match target_type {
        ValueType::Symbol => "Classifier",
        ValueType::Continuous => "Regressor",
        _ => "Clusterer",
    }
}
