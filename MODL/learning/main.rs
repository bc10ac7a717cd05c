//! Data preparation runtime tying configuration, telemetry, error channel and
//! cancellation to the preparation and benchmark pipelines.

use std::{path::Path, sync::Arc, time::Instant};

use anyhow::Context;
use serde_json::{json, Value};
use shared_event_bus::FileProgressPublisher;
use shared_logging::LogLevel;

use crate::{
    cancellation::CancellationToken,
    config::LearningConfig,
    database::Database,
    dictionary::{class::Class, domain::DomainRegistry},
    error_manager::LearningErrorManager,
    errors::LearningError,
    modeling::benchmark::LearningBenchmark,
    modules::{PredictorDescriptor, PredictorRegistry},
    preparation::{build_recoding_class, DataPreparationClass, RecodingSpec},
    stats::{class_stats::ClassStats, learning_spec::LearningSpec},
    telemetry::LearningTelemetry,
};

/// Module name of the runtime telemetry.
pub const TELEMETRY_MODULE: &str = "modl-learning";

/// Top-level runtime shared by every pipeline.
#[derive(Debug)]
pub struct DataPreparationRuntime {
    config: LearningConfig,
    registry: PredictorRegistry,
    errors: LearningErrorManager,
    domains: DomainRegistry,
    cancel: CancellationToken,
    telemetry: Option<LearningTelemetry>,
}

impl Default for DataPreparationRuntime {
    fn default() -> Self {
        Self::new(LearningConfig::default())
    }
}

impl DataPreparationRuntime {
    /// Creates a runtime with the built-in predictors.
    #[must_use]
    pub fn new(config: LearningConfig) -> Self {
        Self {
            config,
            registry: PredictorRegistry::with_builtins(),
            errors: LearningErrorManager::new(),
            domains: DomainRegistry::new(),
            cancel: CancellationToken::new(),
            telemetry: None,
        }
    }

    /// Loads a TOML configuration and opens the telemetry sinks it names.
    pub fn from_config_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config = LearningConfig::load(path)?;
        let mut builder = LearningTelemetry::builder(TELEMETRY_MODULE);
        if let Some(log_path) = &config.telemetry.log_path {
            builder = builder.log_path(config.resolve_path(log_path));
        }
        if let Some(progress_path) = &config.telemetry.progress_path {
            let progress_path = config.resolve_path(progress_path);
            let publisher = FileProgressPublisher::new(&progress_path)
                .with_context(|| format!("opening progress file {}", progress_path.display()))?;
            builder = builder.progress_publisher(Arc::new(publisher));
        }
        let telemetry = builder.build()?;
        Ok(Self::new(config).with_telemetry(telemetry))
    }

    /// Attaches telemetry sinks; warnings and errors are then logged through them.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: LearningTelemetry) -> Self {
        self.set_telemetry(telemetry);
        self
    }

    /// Sets telemetry after construction.
    pub fn set_telemetry(&mut self, telemetry: LearningTelemetry) {
        self.errors = LearningErrorManager::with_telemetry(telemetry.clone());
        self.telemetry = Some(telemetry);
    }

    /// Replaces the error channel.
    #[must_use]
    pub fn with_error_manager(mut self, errors: LearningErrorManager) -> Self {
        self.errors = errors;
        self
    }

    /// Configuration.
    #[must_use]
    pub const fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Error channel.
    #[must_use]
    pub const fn errors(&self) -> &LearningErrorManager {
        &self.errors
    }

    /// Holder of the current class domain.
    #[must_use]
    pub const fn domains(&self) -> &DomainRegistry {
        &self.domains
    }

    /// Token interrupting every running computation.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Registers an additional predictor.
    pub fn register_predictor(&self, descriptor: PredictorDescriptor) {
        self.log(
            LogLevel::Info,
            "predictor_registered",
            json!({ "name": descriptor.name, "id": descriptor.id.to_string() }),
        );
        self.registry.register(descriptor);
    }

    /// Predictors available to the benchmarks.
    #[must_use]
    pub const fn registry(&self) -> &PredictorRegistry {
        &self.registry
    }

    /// Builds the learning spec of the selected records of a database.
    pub fn build_learning_spec(
        &self,
        class: &Class,
        database: &Database,
        target_attribute_name: &str,
    ) -> Result<LearningSpec, LearningError> {
        LearningSpec::build(
            class,
            database,
            target_attribute_name,
            self.config.preparation,
            self.config.numerics,
            &self.cancel,
        )
    }

    /// Computes the stats of every attribute of a learning spec.
    ///
    /// The stats stay uncomputed when the runtime is interrupted.
    pub fn compute_class_stats(
        &self,
        spec: LearningSpec,
        max_attribute_pairs: usize,
    ) -> Result<ClassStats, LearningError> {
        let start = Instant::now();
        self.open_task("Data preparation");
        self.log(
            LogLevel::Info,
            "compute_class_stats_started",
            json!({
                "dictionary": spec.class().name(),
                "database": spec.database_name(),
                "target": spec.target_attribute_name(),
                "pairs": max_attribute_pairs,
            }),
        );
        let mut class_stats = ClassStats::new(spec);
        if let Some(telemetry) = &self.telemetry {
            class_stats = class_stats.with_telemetry(telemetry.clone());
        }
        class_stats.set_max_attribute_pairs(max_attribute_pairs);
        let computed = class_stats.compute_stats(&self.cancel)?;
        self.log(
            LogLevel::Info,
            "compute_class_stats_finished",
            json!({
                "computed": computed,
                "attributes": class_stats.attribute_stats().len(),
                "informative": if computed { class_stats.informative_attribute_number() } else { 0 },
                "elapsed_ms": start.elapsed().as_millis() as u64,
            }),
        );
        Ok(class_stats)
    }

    /// Prepares every attribute and pair of computed class stats.
    pub fn prepare(&self, class_stats: &ClassStats) -> Result<DataPreparationClass, LearningError> {
        if !class_stats.is_stats_computed() {
            return Err(LearningError::InvalidArgument(
                "class stats must be computed before data preparation".into(),
            ));
        }
        let mut preparation = DataPreparationClass::new(class_stats);
        preparation.compute_data_preparation_from_class_stats(class_stats)?;
        let checked = preparation.check_data_preparation(&self.errors);
        self.log(
            LogLevel::Info,
            "data_preparation_built",
            json!({
                "dictionary": preparation.class_name(),
                "attributes": preparation.data_preparation_attributes().len(),
                "checked": checked,
            }),
        );
        Ok(preparation)
    }

    /// Builds the recoding dictionary of a preparation.
    pub fn build_recoding_class(
        &self,
        preparation: DataPreparationClass,
        spec: &RecodingSpec,
    ) -> Result<Class, LearningError> {
        let class_name = preparation.class_name().to_owned();
        self.log(
            LogLevel::Info,
            "recoding_class_started",
            json!({ "dictionary": class_name }),
        );
        let recoding = build_recoding_class(preparation, spec)?;
        self.log(
            LogLevel::Info,
            "recoding_class_built",
            json!({
                "dictionary": recoding.name(),
                "used_attributes": recoding.used_attribute_number(),
            }),
        );
        Ok(recoding)
    }

    /// New benchmark sharing the runtime's configuration, registry, error channel,
    /// domains and telemetry.
    #[must_use]
    pub fn new_benchmark(&self) -> LearningBenchmark {
        let benchmark = LearningBenchmark::new(self.registry.clone(), self.errors.clone())
            .with_config(&self.config)
            .with_domain_registry(self.domains.clone());
        match &self.telemetry {
            Some(telemetry) => benchmark.with_telemetry(telemetry.clone()),
            None => benchmark,
        }
    }

    /// Checks then evaluates a benchmark.
    ///
    /// Returns `Ok(false)` when the check fails or the runtime is interrupted.
    pub fn run_benchmark(&self, benchmark: &mut LearningBenchmark) -> Result<bool, LearningError> {
        let start = Instant::now();
        self.open_task("Evaluate predictors");
        self.log(
            LogLevel::Info,
            "run_benchmark_started",
            json!({
                "benchmarks": benchmark.benchmark_specs().len(),
                "predictors": benchmark.predictor_specs().len(),
            }),
        );
        if !benchmark.check() {
            self.log(LogLevel::Warn, "run_benchmark_rejected", json!({}));
            return Ok(false);
        }
        let completed = benchmark.evaluate(&self.cancel)?;
        self.log(
            LogLevel::Info,
            "run_benchmark_finished",
            json!({
                "completed": completed,
                "elapsed_ms": start.elapsed().as_millis() as u64,
            }),
        );
        Ok(completed)
    }

    fn open_task(&self, title: &str) {
        if self.errors.is_error_collection_active() {
            self.errors.add_task(title);
        }
    }

    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        if let Some(telemetry) = self.telemetry.as_ref() {
            let _ = telemetry.log(level, message, metadata);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{
        dictionary::value::ValueType,
        modeling::{
            benchmark_spec::BenchmarkSpec,
            predictor::{PredictorSpec, BASELINE, NAIVE_BAYES},
        },
        preparation::tests::{toy_class, toy_database},
    };

    #[test]
    fn runtime_prepares_and_recodes_a_class() {
        let runtime = DataPreparationRuntime::default();
        let spec = runtime
            .build_learning_spec(&toy_class(), &toy_database(), "label")
            .unwrap();
        let class_stats = runtime.compute_class_stats(spec, 1).unwrap();
        assert!(class_stats.is_stats_computed());
        assert_eq!(class_stats.informative_attribute_number(), 2);

        let preparation = runtime.prepare(&class_stats).unwrap();
        assert!(!preparation.data_preparation_attributes().is_empty());
        let recoding = runtime
            .build_recoding_class(preparation, &RecodingSpec::default())
            .unwrap();
        assert_eq!(recoding.name(), "R_Toy");
        assert!(recoding.used_attribute_number() >= 2);
    }

    #[test]
    fn interrupted_runtime_leaves_stats_uncomputed() {
        let runtime = DataPreparationRuntime::default();
        let spec = runtime
            .build_learning_spec(&toy_class(), &toy_database(), "label")
            .unwrap();
        runtime.cancellation_token().cancel();
        let class_stats = runtime.compute_class_stats(spec, 0).unwrap();
        assert!(!class_stats.is_stats_computed());
        assert!(runtime.prepare(&class_stats).is_err());
    }

    #[test]
    fn runtime_runs_a_benchmark_with_its_config() {
        let config = LearningConfig::from_toml_str("[benchmark]\nfold_number = 2\n").unwrap();
        let runtime = DataPreparationRuntime::new(config);
        let mut benchmark = runtime.new_benchmark();
        assert_eq!(benchmark.config().fold_number, 2);
        benchmark.set_target_attribute_type(ValueType::Symbol).unwrap();
        benchmark.add_benchmark_spec(BenchmarkSpec::new(toy_class(), toy_database(), "label"));
        benchmark.add_predictor_spec(PredictorSpec::new(BASELINE));
        benchmark.add_predictor_spec(PredictorSpec::new(NAIVE_BAYES));
        assert!(runtime.run_benchmark(&mut benchmark).unwrap());
        assert!(!runtime.domains().is_scoped());
        let test_accuracy = benchmark.criterion_index_at("TestAccuracy").unwrap();
        assert_eq!(benchmark.evaluation_at(test_accuracy, 1).unwrap().run_number(), 2);

        let mut rejected = runtime.new_benchmark();
        assert!(!runtime.run_benchmark(&mut rejected).unwrap());
    }

    #[test]
    fn config_file_opens_telemetry_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("learning.toml");
        fs::write(
            &config_path,
            "[telemetry]\nlog_path = \"learning.log\"\nprogress_path = \"progress.jsonl\"\n",
        )
        .unwrap();
        let runtime = DataPreparationRuntime::from_config_file(&config_path).unwrap();
        let spec = runtime
            .build_learning_spec(&toy_class(), &toy_database(), "label")
            .unwrap();
        runtime.compute_class_stats(spec, 0).unwrap();
        let log = fs::read_to_string(dir.path().join("learning.log")).unwrap();
        assert!(log.contains("compute_class_stats_started"));
        assert!(log.contains("compute_class_stats_finished"));
        assert!(dir.path().join("progress.jsonl").exists());
    }
}
