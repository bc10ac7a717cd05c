use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Engine configuration loaded from TOML.
///
/// ```toml
/// [numerics]
/// epsilon_cost = 1e-10
///
/// [benchmark]
/// fold_number = 5
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Numerical thresholds.
    #[serde(default)]
    pub numerics: NumericsConfig,
    /// Data preparation parameters.
    #[serde(default)]
    pub preparation: PreparationConfig,
    /// Cross-validation benchmark parameters.
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
    /// Telemetry sinks.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(skip)]
    source_dir: Option<PathBuf>,
}

impl LearningConfig {
    /// Loads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading learning config {}", path.display()))?;
        let mut config = Self::from_toml_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.source_dir = Some(
            path.parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
        );
        Ok(config)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value domains.
    pub fn validate(&self) -> Result<()> {
        let numerics = &self.numerics;
        for (name, value) in [
            ("epsilon_cost", numerics.epsilon_cost),
            ("epsilon_level", numerics.epsilon_level),
            ("optimization_equality_epsilon", numerics.optimization_equality_epsilon),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                bail!("numerics.{name} must be a non-negative number, got {value}");
            }
        }
        if self.preparation.max_target_intervals < 2 {
            bail!("preparation.max_target_intervals must be at least 2");
        }
        if self.preparation.unsupervised_interval_number == 0 {
            bail!("preparation.unsupervised_interval_number must be positive");
        }
        if self.preparation.max_groups == 0 {
            bail!("preparation.max_groups must be positive");
        }
        let benchmark = &self.benchmark;
        if benchmark.cross_validation_number == 0 {
            bail!("benchmark.cross_validation_number must be positive");
        }
        if benchmark.fold_number < 2 {
            bail!("benchmark.fold_number must be at least 2");
        }
        if !(benchmark.significance_level > 0.0 && benchmark.significance_level < 1.0) {
            bail!(
                "benchmark.significance_level must lie in ]0, 1[, got {}",
                benchmark.significance_level
            );
        }
        Ok(())
    }

    /// Resolves a path relative to the configuration file.
    #[must_use]
    pub fn resolve_path(&self, candidate: impl AsRef<Path>) -> PathBuf {
        let candidate = candidate.as_ref();
        match &self.source_dir {
            Some(dir) if candidate.is_relative() => dir.join(candidate),
            _ => candidate.to_path_buf(),
        }
    }
}

/// Thresholds used to snap numerical noise.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NumericsConfig {
    /// Costs below this value are stored as zero.
    #[serde(default = "default_epsilon")]
    pub epsilon_cost: f64,
    /// Levels below this value are treated as uninformative.
    #[serde(default = "default_epsilon")]
    pub epsilon_level: f64,
    /// Relative tolerance when comparing optimisation criteria.
    #[serde(default = "default_optimization_equality_epsilon")]
    pub optimization_equality_epsilon: f64,
}

impl Default for NumericsConfig {
    fn default() -> Self {
        Self {
            epsilon_cost: default_epsilon(),
            epsilon_level: default_epsilon(),
            optimization_equality_epsilon: default_optimization_equality_epsilon(),
        }
    }
}

/// Partitioning parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PreparationConfig {
    /// Number of equal-frequency target intervals for regression.
    #[serde(default = "default_max_target_intervals")]
    pub max_target_intervals: usize,
    /// Number of equal-frequency intervals in unsupervised mode.
    #[serde(default = "default_unsupervised_interval_number")]
    pub unsupervised_interval_number: usize,
    /// Maximum kept values (plus the default group) in unsupervised mode.
    #[serde(default = "default_max_groups")]
    pub max_groups: usize,
    /// Minimum frequency per interval or group, 0 for none.
    #[serde(default)]
    pub min_interval_frequency: usize,
}

impl Default for PreparationConfig {
    fn default() -> Self {
        Self {
            max_target_intervals: default_max_target_intervals(),
            unsupervised_interval_number: default_unsupervised_interval_number(),
            max_groups: default_max_groups(),
            min_interval_frequency: 0,
        }
    }
}

/// Benchmark parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Number of repeated cross-validations.
    #[serde(default = "default_cross_validation_number")]
    pub cross_validation_number: usize,
    /// Number of folds.
    #[serde(default = "default_fold_number")]
    pub fold_number: usize,
    /// Stratified folds for classification.
    #[serde(default = "default_true")]
    pub stratified: bool,
    /// Significance level of the paired tests.
    #[serde(default = "default_significance_level")]
    pub significance_level: f64,
    /// Report file name.
    #[serde(default = "default_report_file_name")]
    pub report_file_name: String,
    /// Write the synthetic comparative report.
    #[serde(default = "default_true")]
    pub synthetic_report: bool,
    /// Write per-experiment details.
    #[serde(default = "default_true")]
    pub experiment_report: bool,
    /// Write per-run details.
    #[serde(default)]
    pub run_report: bool,
    /// Export the train and test databases of every fold.
    #[serde(default)]
    pub export_benchmark_databases: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            cross_validation_number: default_cross_validation_number(),
            fold_number: default_fold_number(),
            stratified: true,
            significance_level: default_significance_level(),
            report_file_name: default_report_file_name(),
            synthetic_report: true,
            experiment_report: true,
            run_report: false,
            export_benchmark_databases: false,
        }
    }
}

/// Optional telemetry sinks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// JSON-lines log file.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// JSON-lines progress file.
    #[serde(default)]
    pub progress_path: Option<PathBuf>,
}

const fn default_epsilon() -> f64 {
    1e-10
}

const fn default_optimization_equality_epsilon() -> f64 {
    1e-6
}

const fn default_max_target_intervals() -> usize {
    10
}

const fn default_unsupervised_interval_number() -> usize {
    10
}

const fn default_max_groups() -> usize {
    10
}

const fn default_cross_validation_number() -> usize {
    1
}

const fn default_fold_number() -> usize {
    10
}

const fn default_significance_level() -> f64 {
    0.05
}

fn default_report_file_name() -> String {
    "benchmark.xls".into()
}

const fn default_true() -> bool {
    true
}
