#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! MODL data preparation engine: descriptive statistics, supervised partitioning of
//! attributes, data preparation dictionaries, predictors and cross-validation
//! benchmarks.

/// Cooperative cancellation token.
#[path = "../cancellation.rs"]
pub mod cancellation;

/// Engine configuration loaded from TOML.
#[path = "../config.rs"]
pub mod config;

/// Error types of the engine.
#[path = "../errors.rs"]
pub mod errors;

/// User error channel with task sections.
#[path = "../error_manager.rs"]
pub mod error_manager;

/// Telemetry helpers for logging and progress events.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Incremental JSON report writer.
#[path = "../json_writer.rs"]
pub mod json_writer;

/// Positional serialization of computed stats.
#[path = "../serializer.rs"]
pub mod serializer;

/// Dictionaries, derivation rules and class domains.
#[path = "../dictionary/main.rs"]
pub mod dictionary;

/// In-memory tables of records.
#[path = "../database.rs"]
pub mod database;

/// Descriptive and preparation statistics.
#[path = "../stats/main.rs"]
pub mod stats;

/// Data preparation dictionaries and recoding.
#[path = "../preparation/main.rs"]
pub mod preparation;

/// Predictors, evaluations and benchmarks.
#[path = "../modeling/main.rs"]
pub mod modeling;

/// Registry of the predictors available to benchmarks.
#[path = "../modules.rs"]
pub mod modules;

/// High-level orchestration entry point.
#[path = "../main.rs"]
pub mod runtime;

pub use cancellation::CancellationToken;
pub use config::{BenchmarkConfig, LearningConfig, NumericsConfig, PreparationConfig, TelemetryConfig};
pub use database::{Database, DatabaseError};
pub use dictionary::{Attribute, Class, ClassDomain, DomainGuard, DomainRegistry, Value, ValueType};
pub use error_manager::LearningErrorManager;
pub use errors::LearningError;
pub use modeling::{
    BenchmarkSpec, LearningBenchmark, LearningBenchmarkUnivariate, Predictor, PredictorEvaluation,
    PredictorSpec, StatisticalEvaluation,
};
pub use modules::{PredictorDescriptor, PredictorRegistry};
pub use preparation::{DataPreparationClass, RecodingSpec};
pub use runtime::DataPreparationRuntime;
pub use stats::{ClassStats, DataPreparationStats, DescriptiveStats, LearningReport, LearningSpec};
pub use telemetry::{LearningTelemetry, LearningTelemetryBuilder};
