//! Predictors, their evaluation, and the cross-validation benchmarks comparing them.

/// Cross-validation harness.
pub mod benchmark;
/// Dataset of a benchmark.
pub mod benchmark_spec;
/// Benchmark of single attributes.
pub mod benchmark_univariate;
/// Evaluation measures of a trained predictor.
pub mod evaluation;
/// Predictor trait and built-in predictors.
pub mod predictor;
/// Result matrices and paired significance tests.
pub mod statistical_evaluation;

pub use benchmark::{task_label, BenchmarkCriterion, LearningBenchmark, EVALUATION_DOMAIN};
pub use benchmark_spec::{BenchmarkSpec, BenchmarkStats};
pub use benchmark_univariate::LearningBenchmarkUnivariate;
pub use evaluation::{
    ClassifierEvaluationBuilder, PredictorEvaluation, RegressionOutcome, RegressorEvaluationBuilder,
};
pub use predictor::{
    BaselinePredictor, NaiveBayesPredictor, Predictor, PredictorSpec, UnivariatePredictor,
    BASELINE, NAIVE_BAYES, UNIVARIATE,
};
pub use statistical_evaluation::{Measures, StatisticalEvaluation};
