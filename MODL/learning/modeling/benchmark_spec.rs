use std::{fmt, path::Path};

use anyhow::Context;
use rand::{rngs::SmallRng, seq::SliceRandom, Rng, SeedableRng};

use crate::{
    cancellation::CancellationToken,
    config::{NumericsConfig, PreparationConfig},
    database::Database,
    dictionary::{class::Class, value::ValueType},
    error_manager::LearningErrorManager,
    errors::LearningError,
    stats::{descriptive::DescriptiveStats, learning_spec::LearningSpec},
};

const ERROR_CATEGORY: &str = "Benchmark";

/// Summary of a benchmark dataset, computed once its learning spec is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchmarkStats {
    /// Used explanatory attributes.
    pub attribute_number: usize,
    /// Used numerical explanatory attributes.
    pub continuous_attribute_number: usize,
    /// Used categorical explanatory attributes.
    pub symbol_attribute_number: usize,
    /// Records of the database.
    pub instance_number: usize,
    /// Distinct values of a categorical target.
    pub target_value_number: usize,
    /// Frequency rate of the most frequent target value.
    pub target_majority_accuracy: f64,
    /// Mean of a numerical target.
    pub target_mean: f64,
    /// Standard deviation of a numerical target.
    pub target_standard_deviation: f64,
}

/// Dataset of a benchmark: a dictionary, its database and the target to predict.
#[derive(Debug, Clone)]
pub struct BenchmarkSpec {
    class: Class,
    database: Database,
    target_attribute_name: String,
    learning_spec: Option<LearningSpec>,
    stats: Option<BenchmarkStats>,
}

impl BenchmarkSpec {
    /// Dataset from an in-memory database; an empty target means unsupervised.
    #[must_use]
    pub fn new(class: Class, database: Database, target_attribute_name: impl Into<String>) -> Self {
        Self {
            class,
            database,
            target_attribute_name: target_attribute_name.into(),
            learning_spec: None,
            stats: None,
        }
    }

    /// Dataset read from a tab-separated file, with the dictionary inferred from its
    /// header and values.
    pub fn from_tsv(
        path: impl AsRef<Path>,
        class_name: &str,
        target_attribute_name: &str,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let (class, database) = Database::read_tsv_inferring_class(path, class_name)
            .with_context(|| format!("failed to read benchmark database {}", path.display()))?;
        Ok(Self::new(class, database, target_attribute_name))
    }

    /// Dictionary name.
    #[must_use]
    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    /// Dictionary of the records.
    #[must_use]
    pub const fn class(&self) -> &Class {
        &self.class
    }

    /// Target attribute, empty when unsupervised.
    #[must_use]
    pub fn target_attribute_name(&self) -> &str {
        &self.target_attribute_name
    }

    /// Database name.
    #[must_use]
    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    /// Benchmark database.
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.database
    }

    /// Benchmark database, for instance selection.
    pub fn database_mut(&mut self) -> &mut Database {
        &mut self.database
    }

    /// Type of the target in the dictionary, `ValueType::None` without target; `None`
    /// when the target is missing from the dictionary.
    #[must_use]
    pub fn target_attribute_type(&self) -> Option<ValueType> {
        if self.target_attribute_name.is_empty() {
            return Some(ValueType::None);
        }
        self.class
            .lookup_attribute(&self.target_attribute_name)
            .map(|attribute| attribute.value_type)
    }

    /// `"<class> <target> (<database>)"`.
    #[must_use]
    pub fn object_label(&self) -> String {
        format!(
            "{} {} ({})",
            self.class_name(),
            self.target_attribute_name,
            self.database_name()
        )
    }

    /// Checks the dataset definition, reporting each problem to `errors`.
    pub fn check(&self, errors: &LearningErrorManager) -> bool {
        let label = self.object_label();
        let mut ok = true;
        let mut fail = |message: String| {
            errors.add_error(ERROR_CATEGORY, &label, &message);
            ok = false;
        };
        if self.class_name().is_empty() {
            fail("Missing dictionary name".into());
        }
        if self.database_name().is_empty() {
            fail("Missing database name".into());
        }
        if self.database.class_name() != self.class_name() {
            fail(format!(
                "Database dictionary {} differs from {}",
                self.database.class_name(),
                self.class_name()
            ));
        }
        match self.target_attribute_type() {
            None => fail(format!(
                "Target variable {} unknown in dictionary {}",
                self.target_attribute_name,
                self.class_name()
            )),
            Some(ValueType::Structure) => fail(format!(
                "Target variable {} should be numerical or categorical",
                self.target_attribute_name
            )),
            _ => {}
        }
        ok
    }

    /// Builds the learning spec on every record, then the benchmark stats.
    pub fn build_learning_spec(
        &mut self,
        preparation: PreparationConfig,
        numerics: NumericsConfig,
        cancel: &CancellationToken,
    ) -> Result<(), LearningError> {
        self.delete_learning_spec();
        self.database.clear_selection();
        let spec = LearningSpec::build(
            &self.class,
            &self.database,
            &self.target_attribute_name,
            preparation,
            numerics,
            cancel,
        )?;
        self.learning_spec = Some(spec);
        self.compute_benchmark_stats();
        Ok(())
    }

    /// Whether the learning spec is built.
    #[must_use]
    pub const fn is_learning_spec_valid(&self) -> bool {
        self.learning_spec.is_some()
    }

    /// Learning spec on every record.
    #[must_use]
    pub const fn learning_spec(&self) -> Option<&LearningSpec> {
        self.learning_spec.as_ref()
    }

    /// Drops the learning spec and selects every record again; the stats are kept.
    pub fn delete_learning_spec(&mut self) {
        self.learning_spec = None;
        self.database.clear_selection();
    }

    fn compute_benchmark_stats(&mut self) {
        let Some(spec) = &self.learning_spec else {
            return;
        };
        let explanatory = |value_type: ValueType| {
            self.class
                .attributes()
                .filter(|attribute| {
                    attribute.used
                        && attribute.value_type == value_type
                        && attribute.name != self.target_attribute_name
                })
                .count()
        };
        let mut stats = BenchmarkStats {
            continuous_attribute_number: explanatory(ValueType::Continuous),
            symbol_attribute_number: explanatory(ValueType::Symbol),
            instance_number: self.database.instance_number(),
            ..BenchmarkStats::default()
        };
        stats.attribute_number = stats.continuous_attribute_number + stats.symbol_attribute_number;
        match spec.target_descriptive_stats() {
            Some(DescriptiveStats::Symbol(target)) => {
                stats.target_value_number = target.value_number();
                if stats.instance_number > 0 {
                    stats.target_majority_accuracy =
                        target.mode_frequency() as f64 / stats.instance_number as f64;
                }
            }
            Some(DescriptiveStats::Continuous(target)) => {
                stats.target_mean = target.mean();
                stats.target_standard_deviation = target.standard_deviation();
            }
            None => {}
        }
        self.stats = Some(stats);
    }

    /// Stats of the dataset, once the learning spec is built.
    #[must_use]
    pub const fn benchmark_stats(&self) -> Option<&BenchmarkStats> {
        self.stats.as_ref()
    }

    /// Fold of each record.
    ///
    /// Folds are numbered round robin then shuffled with `seed`. Stratified folds of a
    /// categorical target number the records sorted by target value, ties broken by a
    /// seeded random key, so that each fold gets its share of every value.
    pub fn compute_fold_indexes(
        &self,
        seed: u64,
        fold_number: usize,
        stratified: bool,
    ) -> Result<Vec<usize>, LearningError> {
        if fold_number < 2 {
            return Err(LearningError::InvalidArgument(format!(
                "fold number must be at least 2, got {fold_number}"
            )));
        }
        let instance_number = self.database.instance_number();
        let mut rng = SmallRng::seed_from_u64(seed);
        if !stratified || self.target_attribute_type() != Some(ValueType::Symbol) {
            let mut folds: Vec<usize> = (0..instance_number).map(|index| index % fold_number).collect();
            folds.shuffle(&mut rng);
            return Ok(folds);
        }

        let target = self
            .database
            .column_index(&self.target_attribute_name)
            .ok_or_else(|| LearningError::UnknownAttribute(self.target_attribute_name.clone()))?;
        let mut keyed: Vec<(usize, &str, f64)> = self
            .database
            .records()
            .iter()
            .enumerate()
            .map(|(index, record)| (index, record[target].as_symbol(), rng.gen::<f64>()))
            .collect();
        keyed.sort_by(|first, second| first.1.cmp(second.1).then(first.2.total_cmp(&second.2)));
        let mut folds = vec![0; instance_number];
        for (rank, (index, _, _)) in keyed.into_iter().enumerate() {
            folds[index] = rank % fold_number;
        }
        Ok(folds)
    }

    /// Selects the records of `fold`, or of every other fold when `excluding`.
    pub fn compute_database_selected_instance(
        &mut self,
        fold_indexes: &[usize],
        fold: usize,
        excluding: bool,
    ) {
        self.database.select_instances(fold_indexes, fold, excluding);
    }

    /// Header of [`Self::write_line_report`] for a target type.
    pub fn write_header_line_report(out: &mut dyn fmt::Write, target_type: ValueType) -> fmt::Result {
        write!(
            out,
            "Database\tDictionary\tClass\tVariables\tCont. var.\tCat. var.\tInstances"
        )?;
        match target_type {
            ValueType::Symbol => write!(out, "\tValues\tMaj. acc."),
            ValueType::Continuous => write!(out, "\tMean\tStd. dev."),
            _ => Ok(()),
        }
    }

    /// One tab-separated line of dataset stats; zeros before the learning spec is built.
    pub fn write_line_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let stats = self.stats.clone().unwrap_or_default();
        write!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.database_name(),
            self.class_name(),
            self.target_attribute_name,
            stats.attribute_number,
            stats.continuous_attribute_number,
            stats.symbol_attribute_number,
            stats.instance_number
        )?;
        match self.target_attribute_type() {
            Some(ValueType::Symbol) => write!(
                out,
                "\t{}\t{}",
                stats.target_value_number, stats.target_majority_accuracy
            ),
            Some(ValueType::Continuous) => write!(
                out,
                "\t{}\t{}",
                stats.target_mean, stats.target_standard_deviation
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shared_logging::ErrorRecord;

    use super::*;
    use crate::preparation::tests::{toy_class, toy_database};

    fn built_spec(target: &str) -> BenchmarkSpec {
        let mut spec = BenchmarkSpec::new(toy_class(), toy_database(), target);
        spec.build_learning_spec(
            PreparationConfig::default(),
            NumericsConfig::default(),
            &CancellationToken::new(),
        )
        .unwrap();
        spec
    }

    #[test]
    fn stats_describe_the_dataset() {
        let spec = built_spec("label");
        assert!(spec.is_learning_spec_valid());
        let stats = spec.benchmark_stats().unwrap();
        assert_eq!(stats.attribute_number, 3);
        assert_eq!(stats.continuous_attribute_number, 2);
        assert_eq!(stats.symbol_attribute_number, 1);
        assert_eq!(stats.instance_number, 200);
        assert_eq!(stats.target_value_number, 2);
        assert!(stats.target_majority_accuracy >= 0.5);

        let mut line = String::new();
        spec.write_line_report(&mut line).unwrap();
        assert!(line.starts_with("toy\tToy\tlabel\t3\t2\t1\t200\t2\t"));
        let mut header = String::new();
        BenchmarkSpec::write_header_line_report(&mut header, ValueType::Symbol).unwrap();
        assert_eq!(header.split('\t').count(), line.split('\t').count());
    }

    #[test]
    fn folds_are_balanced_and_reproducible() {
        let spec = built_spec("label");
        let folds = spec.compute_fold_indexes(0, 10, false).unwrap();
        for fold in 0..10 {
            assert_eq!(folds.iter().filter(|index| **index == fold).count(), 20);
        }
        assert_eq!(folds, spec.compute_fold_indexes(0, 10, false).unwrap());
        assert_ne!(folds, spec.compute_fold_indexes(1, 10, false).unwrap());
        assert!(spec.compute_fold_indexes(0, 1, false).is_err());
    }

    #[test]
    fn stratified_folds_share_every_target_value() {
        let spec = built_spec("label");
        let folds = spec.compute_fold_indexes(3, 4, true).unwrap();
        let target = spec.database().column_index("label").unwrap();
        let positives: Vec<usize> = (0..4)
            .map(|fold| {
                spec.database()
                    .records()
                    .iter()
                    .zip(&folds)
                    .filter(|(record, index)| **index == fold && record[target].as_symbol() == "yes")
                    .count()
            })
            .collect();
        let min = positives.iter().min().unwrap();
        let max = positives.iter().max().unwrap();
        assert!(max - min <= 1);
    }

    #[test]
    fn selection_follows_the_folds() {
        let mut spec = built_spec("label");
        let folds = spec.compute_fold_indexes(0, 5, true).unwrap();
        spec.compute_database_selected_instance(&folds, 2, true);
        assert_eq!(spec.database().selected_instance_number(), 160);
        spec.compute_database_selected_instance(&folds, 2, false);
        assert_eq!(spec.database().selected_instance_number(), 40);
        spec.delete_learning_spec();
        assert_eq!(spec.database().selected_instance_number(), 200);
        assert!(!spec.is_learning_spec_valid());
        assert!(spec.benchmark_stats().is_some());
    }

    #[test]
    fn check_reports_an_unknown_target() {
        let manager = LearningErrorManager::with_display(Arc::new(|_: &ErrorRecord| {}));
        manager.begin_error_collection().unwrap();
        let spec = BenchmarkSpec::new(toy_class(), toy_database(), "missing");
        assert!(!spec.check(&manager));
        let records = manager.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].localisation, "Toy missing (toy)");
        assert_eq!(records[0].label, "Target variable missing unknown in dictionary Toy");
        assert!(BenchmarkSpec::new(toy_class(), toy_database(), "").check(&manager));
        assert_eq!(
            BenchmarkSpec::new(toy_class(), toy_database(), "").target_attribute_type(),
            Some(ValueType::None)
        );
    }

    #[test]
    fn continuous_target_reports_mean_and_deviation() {
        let spec = built_spec("age");
        let stats = spec.benchmark_stats().unwrap();
        assert!(stats.target_mean > 30.0 && stats.target_mean < 70.0);
        assert!(stats.target_standard_deviation > 0.0);
        let mut header = String::new();
        BenchmarkSpec::write_header_line_report(&mut header, ValueType::Continuous).unwrap();
        assert!(header.ends_with("\tMean\tStd. dev."));
    }
}
