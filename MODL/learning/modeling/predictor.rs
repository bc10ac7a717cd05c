use std::{collections::BTreeSet, fmt, sync::Arc};

use super::evaluation::{
    ClassifierEvaluationBuilder, PredictorEvaluation, RegressionOutcome, RegressorEvaluationBuilder,
};
use crate::{
    database::Database,
    dictionary::value::{Value, ValueType},
    errors::LearningError,
    preparation::DataPreparationClass,
    stats::{
        class_stats::ClassStats,
        data_grid::{AttributePartition, DataGridStats, PartitionKind, SourceConditionalLogProbs},
        grouper::GroupingMethod,
        learning_spec::{Column, LearningSpec},
        preparation::DataPreparationStats,
        stat,
    },
};

/// Majority class or target mean.
pub const BASELINE: &str = "Baseline";
/// Naive Bayes on the informative prepared attributes.
pub const NAIVE_BAYES: &str = "Naive Bayes";
/// Single prepared attribute.
pub const UNIVARIATE: &str = "Univariate";

/// Smallest standard deviation of the regression density.
const MIN_SIGMA: f64 = 1e-6;

/// Model trained on the statistics of a learning spec and evaluated on databases.
pub trait Predictor: fmt::Debug + Send {
    /// Registered name.
    fn name(&self) -> &str;

    /// Whether the predictor handles a target type; `ValueType::None` is unsupervised.
    fn is_target_type_managed(&self, target_type: ValueType) -> bool;

    /// Trains from computed class stats; `false` when they are not computed.
    fn train(&mut self, class_stats: &ClassStats) -> Result<bool, LearningError>;

    /// Whether a model is trained.
    fn is_trained(&self) -> bool;

    /// Number of distinct native attributes used by the model.
    fn used_attribute_number(&self) -> usize;

    /// Evaluates the model on the selected records of a database.
    fn evaluate(&self, database: &Database) -> Result<PredictorEvaluation, LearningError>;

    /// Univariate view, for the harness evaluating attributes one at a time.
    fn as_univariate_mut(&mut self) -> Option<&mut UnivariatePredictor> {
        None
    }
}

/// Predictor chosen for a benchmark, with its preprocessing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictorSpec {
    predictor_name: String,
    label: String,
    grouping_method: GroupingMethod,
    max_attribute_pairs: usize,
}

impl PredictorSpec {
    /// Spec of a registered predictor.
    #[must_use]
    pub fn new(predictor_name: impl Into<String>) -> Self {
        Self {
            predictor_name: predictor_name.into(),
            label: String::new(),
            grouping_method: GroupingMethod::default(),
            max_attribute_pairs: 0,
        }
    }

    /// Sets the report label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the grouping method of categorical attributes.
    #[must_use]
    pub const fn with_grouping_method(mut self, method: GroupingMethod) -> Self {
        self.grouping_method = method;
        self
    }

    /// Sets the number of attribute pairs to prepare.
    #[must_use]
    pub const fn with_max_attribute_pairs(mut self, max_attribute_pairs: usize) -> Self {
        self.max_attribute_pairs = max_attribute_pairs;
        self
    }

    /// Registered predictor name.
    #[must_use]
    pub fn predictor_name(&self) -> &str {
        &self.predictor_name
    }

    /// Report label, the predictor name when unset.
    #[must_use]
    pub fn label(&self) -> &str {
        if self.label.is_empty() {
            &self.predictor_name
        } else {
            &self.label
        }
    }

    /// Grouping method of categorical attributes.
    #[must_use]
    pub const fn grouping_method(&self) -> GroupingMethod {
        self.grouping_method
    }

    /// Number of attribute pairs to prepare.
    #[must_use]
    pub const fn max_attribute_pairs(&self) -> usize {
        self.max_attribute_pairs
    }
}

/// Prepared grid of the model with its conditional probabilities.
#[derive(Debug, Clone)]
struct PreparedTerm {
    native_names: Vec<String>,
    grid: Arc<DataGridStats>,
    log_probs: SourceConditionalLogProbs,
}

impl PreparedTerm {
    fn new(native_names: Vec<String>, grid: Arc<DataGridStats>) -> Self {
        let log_probs = SourceConditionalLogProbs::from_grid(&grid);
        Self {
            native_names,
            grid,
            log_probs,
        }
    }
}

/// Training distribution of the target.
#[derive(Debug, Clone)]
enum TargetModel {
    Symbol {
        values: Vec<String>,
        priors: Vec<f64>,
        floor: f64,
    },
    Continuous {
        partition: AttributePartition,
        priors: Vec<f64>,
        part_means: Vec<f64>,
        part_ranks: Vec<f64>,
        rank_widths: Vec<f64>,
        sorted_values: Vec<f64>,
        sigma: f64,
    },
    None,
}

/// Laplace-smoothed priors `(n_j + eps) / (N + J * eps)` with `eps = 1 / (N + 1)`.
fn smoothed_priors(frequencies: &[usize]) -> Vec<f64> {
    let total = frequencies.iter().sum::<usize>() as f64;
    let epsilon = 1.0 / (total + 1.0);
    let denominator = frequencies.len() as f64 * epsilon + total;
    frequencies
        .iter()
        .map(|frequency| (*frequency as f64 + epsilon) / denominator)
        .collect()
}

impl TargetModel {
    fn from_spec(spec: &LearningSpec) -> Result<Self, LearningError> {
        if !spec.is_supervised() {
            return Ok(Self::None);
        }
        let target = spec.target_partition().ok_or_else(|| {
            LearningError::Evaluation(format!(
                "target variable {} has no partition",
                spec.target_attribute_name()
            ))
        })?;
        let frequencies = target.part_frequencies();
        let priors = smoothed_priors(frequencies);
        let total = spec.instance_number() as f64;
        match (&target.partition().kind, spec.column(spec.target_attribute_name())) {
            (PartitionKind::SymbolValues { values }, _) => Ok(Self::Symbol {
                values: values.clone(),
                priors,
                floor: 1.0 / (total + 1.0),
            }),
            (PartitionKind::Discretization { .. }, Some(Column::Continuous(values))) => {
                let mut sums = vec![0.0; frequencies.len()];
                for (value, part) in values.iter().zip(target.part_indexes()) {
                    sums[*part] += value;
                }
                let part_means = sums
                    .iter()
                    .zip(frequencies)
                    .map(|(sum, frequency)| if *frequency > 0 { sum / *frequency as f64 } else { 0.0 })
                    .collect();
                let mut cumulated = 0.0;
                let mut part_ranks = Vec::with_capacity(frequencies.len());
                let mut rank_widths = Vec::with_capacity(frequencies.len());
                for frequency in frequencies {
                    let width = *frequency as f64 / total.max(1.0);
                    part_ranks.push(cumulated + width / 2.0);
                    rank_widths.push(width);
                    cumulated += width;
                }
                let mut sorted_values = values.clone();
                sorted_values.sort_by(f64::total_cmp);
                Ok(Self::Continuous {
                    partition: target.partition().clone(),
                    priors,
                    part_means,
                    part_ranks,
                    rank_widths,
                    sigma: stat::standard_deviation(values).max(MIN_SIGMA),
                    sorted_values,
                })
            }
            _ => Err(LearningError::Evaluation(format!(
                "unsupported partition of target variable {}",
                spec.target_attribute_name()
            ))),
        }
    }

    fn priors(&self) -> &[f64] {
        match self {
            Self::Symbol { priors, .. } | Self::Continuous { priors, .. } => priors,
            Self::None => &[],
        }
    }
}

/// Normalized mid-rank of a value among sorted values.
fn normalized_rank(sorted_values: &[f64], value: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.5;
    }
    let lower = sorted_values.partition_point(|candidate| *candidate < value);
    let upper = sorted_values.partition_point(|candidate| *candidate <= value);
    (lower + upper) as f64 / (2 * sorted_values.len()) as f64
}

/// Naive Bayes model over prepared grids; without grids it predicts the priors.
#[derive(Debug, Clone)]
struct TrainedModel {
    target_attribute_name: String,
    target: TargetModel,
    terms: Vec<PreparedTerm>,
}

impl TrainedModel {
    fn new(spec: &LearningSpec, terms: Vec<PreparedTerm>) -> Result<Self, LearningError> {
        Ok(Self {
            target_attribute_name: spec.target_attribute_name().to_owned(),
            target: TargetModel::from_spec(spec)?,
            terms,
        })
    }

    fn used_attribute_number(&self) -> usize {
        self.terms
            .iter()
            .flat_map(|term| term.native_names.iter())
            .collect::<BTreeSet<_>>()
            .len()
    }

    fn term_positions(&self, database: &Database) -> Result<Vec<Vec<usize>>, LearningError> {
        self.terms
            .iter()
            .map(|term| {
                term.native_names
                    .iter()
                    .map(|name| {
                        database
                            .column_index(name)
                            .ok_or_else(|| LearningError::UnknownAttribute(name.clone()))
                    })
                    .collect()
            })
            .collect()
    }

    fn posterior(&self, positions: &[Vec<usize>], record: &[Value]) -> Vec<f64> {
        let mut scores: Vec<f64> = self.target.priors().iter().map(|prior| prior.ln()).collect();
        for (term, term_positions) in self.terms.iter().zip(positions) {
            let values: Vec<&Value> = term_positions.iter().map(|position| &record[*position]).collect();
            let source = term.grid.input_cell_index(&values);
            for (target, score) in scores.iter_mut().enumerate() {
                *score += term.log_probs.log_prob_at(source, target);
            }
        }
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut total = 0.0;
        for score in &mut scores {
            *score = (*score - max).exp();
            total += *score;
        }
        for score in &mut scores {
            *score /= total;
        }
        scores
    }

    fn evaluate(&self, database: &Database) -> Result<PredictorEvaluation, LearningError> {
        if matches!(self.target, TargetModel::None) {
            return Ok(PredictorEvaluation::Clusterer {
                instance_number: database.selected_instance_number(),
            });
        }
        let positions = self.term_positions(database)?;
        let target_position = database
            .column_index(&self.target_attribute_name)
            .ok_or_else(|| LearningError::UnknownAttribute(self.target_attribute_name.clone()))?;
        match &self.target {
            TargetModel::Symbol { values, priors, floor } => {
                let mut builder = ClassifierEvaluationBuilder::new(priors.clone(), *floor);
                for record in database.selected_records() {
                    let actual_value = record[target_position].as_symbol();
                    let actual = values.iter().position(|value| value == actual_value);
                    builder.add(actual, self.posterior(&positions, record));
                }
                Ok(builder.build())
            }
            TargetModel::Continuous {
                partition,
                part_means,
                part_ranks,
                rank_widths,
                sorted_values,
                sigma,
                ..
            } => {
                let mut builder = RegressorEvaluationBuilder::new();
                for record in database.selected_records() {
                    let target_value = &record[target_position];
                    if target_value.is_missing() {
                        continue;
                    }
                    let actual = target_value.as_continuous();
                    let posterior = self.posterior(&positions, record);
                    let expect = |parts: &[f64]| {
                        posterior.iter().zip(parts).map(|(p, value)| p * value).sum::<f64>()
                    };
                    let predicted = expect(part_means.as_slice());
                    let part = partition.continuous_part_index(actual);
                    let rank_density = posterior[part] / rank_widths[part].max(f64::MIN_POSITIVE);
                    builder.add(RegressionOutcome {
                        actual,
                        predicted,
                        log_density: -0.5 * (2.0 * std::f64::consts::PI * sigma * sigma).ln()
                            - (actual - predicted).powi(2) / (2.0 * sigma * sigma),
                        actual_rank: normalized_rank(sorted_values, actual),
                        predicted_rank: expect(part_ranks.as_slice()),
                        log_rank_density: rank_density.ln(),
                    });
                }
                Ok(builder.build())
            }
            TargetModel::None => Ok(PredictorEvaluation::Clusterer {
                instance_number: database.selected_instance_number(),
            }),
        }
    }
}

fn untrained(name: &str) -> LearningError {
    LearningError::Evaluation(format!("predictor {name} is not trained"))
}

/// Predicts the training distribution of the target, whatever the record.
#[derive(Debug, Clone, Default)]
pub struct BaselinePredictor {
    model: Option<TrainedModel>,
}

impl BaselinePredictor {
    /// Untrained predictor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Predictor for BaselinePredictor {
    fn name(&self) -> &str {
        BASELINE
    }

    fn is_target_type_managed(&self, target_type: ValueType) -> bool {
        target_type.is_simple()
    }

    fn train(&mut self, class_stats: &ClassStats) -> Result<bool, LearningError> {
        self.model = None;
        if !class_stats.is_stats_computed() {
            return Ok(false);
        }
        self.model = Some(TrainedModel::new(class_stats.learning_spec(), Vec::new())?);
        Ok(true)
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    fn used_attribute_number(&self) -> usize {
        0
    }

    fn evaluate(&self, database: &Database) -> Result<PredictorEvaluation, LearningError> {
        self.model
            .as_ref()
            .ok_or_else(|| untrained(BASELINE))?
            .evaluate(database)
    }
}

/// Naive Bayes over every informative preparation of the class stats.
#[derive(Debug, Clone, Default)]
pub struct NaiveBayesPredictor {
    model: Option<TrainedModel>,
}

impl NaiveBayesPredictor {
    /// Untrained predictor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Predictor for NaiveBayesPredictor {
    fn name(&self) -> &str {
        NAIVE_BAYES
    }

    fn is_target_type_managed(&self, target_type: ValueType) -> bool {
        target_type.is_simple()
    }

    fn train(&mut self, class_stats: &ClassStats) -> Result<bool, LearningError> {
        self.model = None;
        if !class_stats.is_stats_computed() {
            return Ok(false);
        }
        let mut preparation = DataPreparationClass::new(class_stats);
        preparation.compute_data_preparation_from_class_stats(class_stats)?;
        let terms = preparation
            .informative_data_preparation_attributes()
            .map(|attribute| {
                PreparedTerm::new(
                    attribute.native_attribute_names().map(str::to_owned).collect(),
                    Arc::clone(attribute.prepared_data_grid_stats()),
                )
            })
            .collect();
        self.model = Some(TrainedModel::new(class_stats.learning_spec(), terms)?);
        Ok(true)
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    fn used_attribute_number(&self) -> usize {
        self.model.as_ref().map_or(0, TrainedModel::used_attribute_number)
    }

    fn evaluate(&self, database: &Database) -> Result<PredictorEvaluation, LearningError> {
        self.model
            .as_ref()
            .ok_or_else(|| untrained(NAIVE_BAYES))?
            .evaluate(database)
    }
}

/// Predictor restricted to one attribute: the named one, else the one with the best
/// level.
#[derive(Debug, Clone, Default)]
pub struct UnivariatePredictor {
    attribute_name: String,
    train_grid: Option<Arc<DataGridStats>>,
    model: Option<TrainedModel>,
}

impl UnivariatePredictor {
    /// Untrained predictor without attribute.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute to train on; empty picks the best one.
    pub fn set_attribute_name(&mut self, name: impl Into<String>) {
        self.attribute_name = name.into();
        self.train_grid = None;
        self.model = None;
    }

    /// Attribute to train on, or the one chosen by the last training.
    #[must_use]
    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    /// Prepared grid of the attribute at training time.
    #[must_use]
    pub const fn train_data_grid_stats(&self) -> Option<&Arc<DataGridStats>> {
        self.train_grid.as_ref()
    }

    /// Number of input cells of the trained grid, 1 without grid.
    #[must_use]
    pub fn train_source_cell_number(&self) -> usize {
        self.train_grid
            .as_ref()
            .map_or(1, |grid| grid.compute_source_cell_number())
    }
}

impl Predictor for UnivariatePredictor {
    fn name(&self) -> &str {
        UNIVARIATE
    }

    fn is_target_type_managed(&self, _target_type: ValueType) -> bool {
        true
    }

    fn train(&mut self, class_stats: &ClassStats) -> Result<bool, LearningError> {
        self.train_grid = None;
        self.model = None;
        if !class_stats.is_stats_computed() {
            return Ok(false);
        }
        if self.attribute_name.is_empty() {
            let best = class_stats
                .attribute_stats()
                .iter()
                .max_by(|first, second| first.level().total_cmp(&second.level()));
            match best {
                Some(stats) => self.attribute_name = stats.attribute_name().to_owned(),
                None => return Ok(false),
            }
        }
        let stats = class_stats
            .lookup_attribute_stats(&self.attribute_name)
            .ok_or_else(|| LearningError::UnknownAttribute(self.attribute_name.clone()))?;
        self.train_grid = stats.prepared_data_grid_stats().cloned();

        let mut preparation = DataPreparationClass::new(class_stats);
        preparation.compute_data_preparation_from_attribute_subset_stats(class_stats, stats)?;
        let terms = preparation
            .informative_data_preparation_attributes()
            .map(|attribute| {
                PreparedTerm::new(
                    attribute.native_attribute_names().map(str::to_owned).collect(),
                    Arc::clone(attribute.prepared_data_grid_stats()),
                )
            })
            .collect();
        self.model = Some(TrainedModel::new(class_stats.learning_spec(), terms)?);
        Ok(true)
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    fn used_attribute_number(&self) -> usize {
        self.model.as_ref().map_or(0, TrainedModel::used_attribute_number)
    }

    fn evaluate(&self, database: &Database) -> Result<PredictorEvaluation, LearningError> {
        self.model
            .as_ref()
            .ok_or_else(|| untrained(UNIVARIATE))?
            .evaluate(database)
    }

    fn as_univariate_mut(&mut self) -> Option<&mut UnivariatePredictor> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cancellation::CancellationToken,
        config::{NumericsConfig, PreparationConfig},
        dictionary::class::{Attribute, Class},
        preparation::tests::{toy_class, toy_class_stats, toy_database},
    };

    fn accuracy(evaluation: &PredictorEvaluation) -> f64 {
        evaluation.measure("Accuracy").unwrap()
    }

    #[test]
    fn naive_bayes_beats_the_baseline() {
        let stats = toy_class_stats(0);
        let database = toy_database();

        let mut baseline = BaselinePredictor::new();
        assert!(baseline.train(&stats).unwrap());
        let baseline_evaluation = baseline.evaluate(&database).unwrap();
        assert_eq!(baseline.used_attribute_number(), 0);
        assert!((baseline_evaluation.measure("AUC").unwrap() - 0.5).abs() < 1e-12);

        let mut bayes = NaiveBayesPredictor::new();
        assert!(bayes.train(&stats).unwrap());
        assert_eq!(bayes.used_attribute_number(), 2);
        let bayes_evaluation = bayes.evaluate(&database).unwrap();
        assert_eq!(bayes_evaluation.instance_number(), database.instance_number());
        assert!(accuracy(&bayes_evaluation) > accuracy(&baseline_evaluation));
        assert!(accuracy(&bayes_evaluation) > 0.9);
        assert!(bayes_evaluation.measure("AUC").unwrap() > 0.9);
        assert!(bayes_evaluation.measure("CompressionRate").unwrap() > 0.3);
    }

    #[test]
    fn untrained_predictors_refuse_to_evaluate() {
        let bayes = NaiveBayesPredictor::new();
        assert!(!bayes.is_trained());
        assert!(matches!(
            bayes.evaluate(&toy_database()),
            Err(LearningError::Evaluation(_))
        ));
    }

    #[test]
    fn univariate_picks_the_best_attribute_and_reports_its_cells() {
        let stats = toy_class_stats(0);
        let mut univariate = UnivariatePredictor::new();
        assert!(univariate.train(&stats).unwrap());
        assert_eq!(univariate.attribute_name(), "age");
        assert_eq!(univariate.used_attribute_number(), 1);
        assert!(univariate.train_source_cell_number() >= 2);

        univariate.set_attribute_name("noise");
        assert!(univariate.train(&stats).unwrap());
        assert_eq!(univariate.used_attribute_number(), 0);
        assert_eq!(univariate.train_source_cell_number(), 1);
        let evaluation = univariate.evaluate(&toy_database()).unwrap();
        assert!((evaluation.measure("AUC").unwrap() - 0.5).abs() < 1e-12);

        univariate.set_attribute_name("unknown");
        assert!(matches!(
            univariate.train(&stats),
            Err(LearningError::UnknownAttribute(_))
        ));
        assert!(univariate.as_univariate_mut().is_some());
    }

    #[test]
    fn regression_on_a_continuous_target() {
        let mut class = Class::new("Line");
        for (name, value_type) in [("x", ValueType::Continuous), ("y", ValueType::Continuous)] {
            class.insert_attribute(Attribute::new(name, value_type)).unwrap();
        }
        class.compile().unwrap();
        let records = (0..100)
            .map(|index| {
                let x = f64::from(index);
                vec![Value::Continuous(x), Value::Continuous(2.0 * x)]
            })
            .collect();
        let database = Database::from_records("line", &class, records).unwrap();
        let spec = LearningSpec::build(
            &class,
            &database,
            "y",
            PreparationConfig::default(),
            NumericsConfig::default(),
            &CancellationToken::new(),
        )
        .unwrap();
        let mut stats = ClassStats::new(spec);
        assert!(stats.compute_stats(&CancellationToken::new()).unwrap());

        let mut baseline = BaselinePredictor::new();
        baseline.train(&stats).unwrap();
        let baseline_evaluation = baseline.evaluate(&database).unwrap();
        let mut bayes = NaiveBayesPredictor::new();
        bayes.train(&stats).unwrap();
        let bayes_evaluation = bayes.evaluate(&database).unwrap();

        assert_eq!(bayes_evaluation.target_attribute_type(), ValueType::Continuous);
        let rmse = |evaluation: &PredictorEvaluation| evaluation.measure("RMSE").unwrap();
        assert!(rmse(&bayes_evaluation) < rmse(&baseline_evaluation));
        assert!(
            bayes_evaluation.measure("RankMAE").unwrap()
                < baseline_evaluation.measure("RankMAE").unwrap()
        );
    }

    #[test]
    fn unsupervised_univariate_is_a_clusterer() {
        let spec = LearningSpec::build(
            &toy_class(),
            &toy_database(),
            "",
            PreparationConfig::default(),
            NumericsConfig::default(),
            &CancellationToken::new(),
        )
        .unwrap();
        let mut stats = ClassStats::new(spec);
        assert!(stats.compute_stats(&CancellationToken::new()).unwrap());
        let mut univariate = UnivariatePredictor::new();
        univariate.set_attribute_name("age");
        assert!(univariate.train(&stats).unwrap());
        assert!(univariate.train_source_cell_number() > 1);
        assert_eq!(
            univariate.evaluate(&toy_database()).unwrap(),
            PredictorEvaluation::Clusterer { instance_number: 200 }
        );
        assert!(!BaselinePredictor::new().is_target_type_managed(ValueType::None));
    }

    #[test]
    fn spec_label_falls_back_to_the_name() {
        let spec = PredictorSpec::new(NAIVE_BAYES);
        assert_eq!(spec.label(), NAIVE_BAYES);
        let spec = spec.with_label("NB").with_max_attribute_pairs(3);
        assert_eq!(spec.label(), "NB");
        assert_eq!(spec.max_attribute_pairs(), 3);
        assert_eq!(spec.grouping_method(), GroupingMethod::Modl);
    }

    #[test]
    fn ranks_are_normalized_mid_ranks() {
        let sorted = [1.0, 2.0, 2.0, 3.0];
        assert!((normalized_rank(&sorted, 2.0) - 0.5).abs() < 1e-12);
        assert!((normalized_rank(&sorted, 0.0)).abs() < 1e-12);
        assert!((normalized_rank(&sorted, 5.0) - 1.0).abs() < 1e-12);
    }
}
