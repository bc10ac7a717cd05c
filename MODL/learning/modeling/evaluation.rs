use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dictionary::value::{format_continuous, ValueType};

/// Quality of a trained predictor measured on the selected records of a database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PredictorEvaluation {
    /// Symbol target.
    Classifier {
        /// Evaluated records.
        instance_number: usize,
        /// Rate of records whose most probable value is the actual one.
        accuracy: f64,
        /// Mean per-value recall.
        balanced_accuracy: f64,
        /// One-vs-rest area under the ROC curve, weighted by value frequency.
        auc: f64,
        /// `1 - loss / null loss`, where losses are negative log-likelihoods.
        compression_rate: f64,
    },
    /// Continuous target.
    Regressor {
        /// Evaluated records.
        instance_number: usize,
        /// Root mean squared error of the expected value.
        rmse: f64,
        /// Mean absolute error of the expected value.
        mae: f64,
        /// Mean negative log predictive density.
        nlpd: f64,
        /// Root mean squared error on normalized ranks.
        rank_rmse: f64,
        /// Mean absolute error on normalized ranks.
        rank_mae: f64,
        /// Mean negative log predictive density of the normalized ranks.
        rank_nlpd: f64,
    },
    /// No target.
    Clusterer {
        /// Evaluated records.
        instance_number: usize,
    },
}

impl PredictorEvaluation {
    /// Target type of the evaluated predictor.
    #[must_use]
    pub const fn target_attribute_type(&self) -> ValueType {
        match self {
            Self::Classifier { .. } => ValueType::Symbol,
            Self::Regressor { .. } => ValueType::Continuous,
            Self::Clusterer { .. } => ValueType::None,
        }
    }

    /// Evaluated records.
    #[must_use]
    pub const fn instance_number(&self) -> usize {
        match self {
            Self::Classifier { instance_number, .. }
            | Self::Regressor { instance_number, .. }
            | Self::Clusterer { instance_number } => *instance_number,
        }
    }

    /// `(name, value)` of each quality measure, in report order.
    #[must_use]
    pub fn measures(&self) -> Vec<(&'static str, f64)> {
        match self {
            Self::Classifier {
                accuracy,
                balanced_accuracy,
                auc,
                compression_rate,
                ..
            } => vec![
                ("Accuracy", *accuracy),
                ("BalancedAccuracy", *balanced_accuracy),
                ("AUC", *auc),
                ("CompressionRate", *compression_rate),
            ],
            Self::Regressor {
                rmse,
                mae,
                nlpd,
                rank_rmse,
                rank_mae,
                rank_nlpd,
                ..
            } => vec![
                ("RMSE", *rmse),
                ("MAE", *mae),
                ("NLPD", *nlpd),
                ("RankRMSE", *rank_rmse),
                ("RankMAE", *rank_mae),
                ("RankNLPD", *rank_nlpd),
            ],
            Self::Clusterer { .. } => Vec::new(),
        }
    }

    /// Value of a measure by name.
    #[must_use]
    pub fn measure(&self, name: &str) -> Option<f64> {
        self.measures()
            .into_iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, value)| value)
    }

    /// Text report: instance number then one line per measure.
    pub fn write_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "Instances\t{}", self.instance_number())?;
        for (name, value) in self.measures() {
            writeln!(out, "{name}\t{}", format_continuous(value))?;
        }
        Ok(())
    }
}

/// Accumulates the predicted distributions of a classifier.
#[derive(Debug, Clone)]
pub struct ClassifierEvaluationBuilder {
    priors: Vec<f64>,
    floor: f64,
    actuals: Vec<Option<usize>>,
    probabilities: Vec<Vec<f64>>,
}

impl ClassifierEvaluationBuilder {
    /// Starts an evaluation against the training `priors` of the target values.
    ///
    /// `floor` replaces the probability of an actual value never seen in training.
    #[must_use]
    pub fn new(priors: Vec<f64>, floor: f64) -> Self {
        Self {
            priors,
            floor,
            actuals: Vec::new(),
            probabilities: Vec::new(),
        }
    }

    /// Adds one record: index of its actual value among the training values, and the
    /// predicted distribution over them.
    pub fn add(&mut self, actual: Option<usize>, probabilities: Vec<f64>) {
        debug_assert_eq!(probabilities.len(), self.priors.len());
        self.actuals.push(actual);
        self.probabilities.push(probabilities);
    }

    fn predicted(probabilities: &[f64]) -> Option<usize> {
        probabilities
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (index, p)| match best {
                Some((_, best_p)) if best_p >= *p => best,
                _ => Some((index, *p)),
            })
            .map(|(index, _)| index)
    }

    fn probability_of(&self, distribution: &[f64], actual: Option<usize>) -> f64 {
        actual
            .and_then(|index| distribution.get(index).copied())
            .map_or(self.floor, |p| p.max(self.floor))
    }

    /// Computes the measures.
    #[must_use]
    pub fn build(self) -> PredictorEvaluation {
        let instance_number = self.actuals.len();
        if instance_number == 0 {
            return PredictorEvaluation::Classifier {
                instance_number,
                accuracy: 0.0,
                balanced_accuracy: 0.0,
                auc: 0.0,
                compression_rate: 0.0,
            };
        }
        let value_number = self.priors.len();
        let mut counts = vec![0_usize; value_number];
        let mut hits = vec![0_usize; value_number];
        let mut correct = 0_usize;
        let mut loss = 0.0;
        let mut null_loss = 0.0;
        for (actual, distribution) in self.actuals.iter().zip(&self.probabilities) {
            if let Some(index) = actual {
                counts[*index] += 1;
                if Self::predicted(distribution) == Some(*index) {
                    hits[*index] += 1;
                    correct += 1;
                }
            }
            loss -= self.probability_of(distribution, *actual).ln();
            null_loss -= self.probability_of(&self.priors, *actual).ln();
        }

        let present: Vec<usize> = (0..value_number).filter(|index| counts[*index] > 0).collect();
        let balanced_accuracy = if present.is_empty() {
            0.0
        } else {
            present
                .iter()
                .map(|index| hits[*index] as f64 / counts[*index] as f64)
                .sum::<f64>()
                / present.len() as f64
        };

        let mut weighted_auc = 0.0;
        let mut weight = 0.0;
        for index in present {
            let scored: Vec<(f64, bool)> = self
                .actuals
                .iter()
                .zip(&self.probabilities)
                .map(|(actual, distribution)| (distribution[index], *actual == Some(index)))
                .collect();
            if let Some(auc) = one_vs_rest_auc(scored) {
                weighted_auc += counts[index] as f64 * auc;
                weight += counts[index] as f64;
            }
        }

        PredictorEvaluation::Classifier {
            instance_number,
            accuracy: correct as f64 / instance_number as f64,
            balanced_accuracy,
            auc: if weight > 0.0 { weighted_auc / weight } else { 0.0 },
            compression_rate: if null_loss > 0.0 {
                1.0 - loss / null_loss
            } else {
                0.0
            },
        }
    }
}

/// Mann-Whitney estimate of the AUC with mid-ranks for tied scores; `None` without
/// positives or negatives.
fn one_vs_rest_auc(mut scored: Vec<(f64, bool)>) -> Option<f64> {
    let positives = scored.iter().filter(|(_, positive)| *positive).count();
    let negatives = scored.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }
    scored.sort_by(|first, second| first.0.total_cmp(&second.0));
    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < scored.len() {
        let mut end = start + 1;
        while end < scored.len() && scored[end].0 == scored[start].0 {
            end += 1;
        }
        let mid_rank = (start + end + 1) as f64 / 2.0;
        let tied_positives = scored[start..end].iter().filter(|(_, positive)| *positive).count();
        positive_rank_sum += mid_rank * tied_positives as f64;
        start = end;
    }
    let p = positives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
}

/// Prediction of a regressor for one record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionOutcome {
    /// Actual target value.
    pub actual: f64,
    /// Expected target value.
    pub predicted: f64,
    /// `ln` of the predicted density at the actual value.
    pub log_density: f64,
    /// Normalized rank of the actual value among the training values.
    pub actual_rank: f64,
    /// Expected normalized rank.
    pub predicted_rank: f64,
    /// `ln` of the predicted density at the actual rank.
    pub log_rank_density: f64,
}

/// Accumulates the outcomes of a regressor.
#[derive(Debug, Clone, Default)]
pub struct RegressorEvaluationBuilder {
    outcomes: Vec<RegressionOutcome>,
}

impl RegressorEvaluationBuilder {
    /// Empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one record.
    pub fn add(&mut self, outcome: RegressionOutcome) {
        self.outcomes.push(outcome);
    }

    /// Computes the measures.
    #[must_use]
    pub fn build(self) -> PredictorEvaluation {
        let n = self.outcomes.len();
        let mean_of = |f: &dyn Fn(&RegressionOutcome) -> f64| {
            if n == 0 {
                0.0
            } else {
                self.outcomes.iter().map(f).sum::<f64>() / n as f64
            }
        };
        PredictorEvaluation::Regressor {
            instance_number: n,
            rmse: mean_of(&|o| (o.predicted - o.actual).powi(2)).sqrt(),
            mae: mean_of(&|o| (o.predicted - o.actual).abs()),
            nlpd: mean_of(&|o| -o.log_density),
            rank_rmse: mean_of(&|o| (o.predicted_rank - o.actual_rank).powi(2)).sqrt(),
            rank_mae: mean_of(&|o| (o.predicted_rank - o.actual_rank).abs()),
            rank_nlpd: mean_of(&|o| -o.log_rank_density),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_classifier_scores_one() {
        let mut builder = ClassifierEvaluationBuilder::new(vec![0.5, 0.5], 0.01);
        for index in 0..10 {
            let actual = index % 2;
            let mut distribution = vec![0.1, 0.1];
            distribution[actual] = 0.9;
            builder.add(Some(actual), distribution);
        }
        let evaluation = builder.build();
        assert_eq!(evaluation.instance_number(), 10);
        assert_eq!(evaluation.measure("Accuracy"), Some(1.0));
        assert_eq!(evaluation.measure("BalancedAccuracy"), Some(1.0));
        assert_eq!(evaluation.measure("AUC"), Some(1.0));
        let compression = evaluation.measure("CompressionRate").unwrap();
        assert!(compression > 0.8 && compression < 1.0);
    }

    #[test]
    fn prior_classifier_has_no_compression_and_half_auc() {
        let mut builder = ClassifierEvaluationBuilder::new(vec![0.75, 0.25], 0.01);
        for actual in [0, 0, 0, 1] {
            builder.add(Some(actual), vec![0.75, 0.25]);
        }
        let evaluation = builder.build();
        assert_eq!(evaluation.measure("Accuracy"), Some(0.75));
        assert_eq!(evaluation.measure("BalancedAccuracy"), Some(0.5));
        assert!((evaluation.measure("AUC").unwrap() - 0.5).abs() < 1e-12);
        assert!(evaluation.measure("CompressionRate").unwrap().abs() < 1e-12);
    }

    #[test]
    fn unseen_values_count_as_errors() {
        let mut builder = ClassifierEvaluationBuilder::new(vec![1.0], 0.5);
        builder.add(Some(0), vec![1.0]);
        builder.add(None, vec![1.0]);
        let evaluation = builder.build();
        assert_eq!(evaluation.measure("Accuracy"), Some(0.5));
        assert_eq!(evaluation.measure("AUC"), Some(0.5));
    }

    #[test]
    fn auc_uses_mid_ranks_for_ties() {
        let auc = one_vs_rest_auc(vec![(0.5, true), (0.5, false), (0.9, true), (0.1, false)]);
        assert_eq!(auc, Some(0.875));
        assert_eq!(one_vs_rest_auc(vec![(0.5, true)]), None);
    }

    #[test]
    fn regression_errors_average_over_records() {
        let mut builder = RegressorEvaluationBuilder::new();
        for (actual, predicted) in [(1.0, 2.0), (3.0, 1.0)] {
            builder.add(RegressionOutcome {
                actual,
                predicted,
                log_density: -1.0,
                actual_rank: 0.5,
                predicted_rank: 0.25,
                log_rank_density: -0.5,
            });
        }
        let evaluation = builder.build();
        assert_eq!(evaluation.target_attribute_type(), ValueType::Continuous);
        assert!((evaluation.measure("RMSE").unwrap() - 2.5_f64.sqrt()).abs() < 1e-12);
        assert_eq!(evaluation.measure("MAE"), Some(1.5));
        assert_eq!(evaluation.measure("NLPD"), Some(1.0));
        assert_eq!(evaluation.measure("RankMAE"), Some(0.25));
        assert_eq!(evaluation.measure("RankNLPD"), Some(0.5));
    }

    #[test]
    fn report_lists_the_measures() {
        let evaluation = PredictorEvaluation::Clusterer { instance_number: 3 };
        let mut out = String::new();
        evaluation.write_report(&mut out).unwrap();
        assert_eq!(out, "Instances\t3\n");
        assert!(evaluation.measures().is_empty());
    }
}
