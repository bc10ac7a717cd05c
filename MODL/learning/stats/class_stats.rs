use std::{
    fmt,
    fs,
    path::Path,
    time::{Duration, Instant},
};

use anyhow::Context;
use serde_json::json;
use shared_logging::LogLevel;

use super::{
    attribute_stats::{univariate_partition_of, AttributeStats},
    grouper::{GrouperCache, GrouperSpec},
    learning_spec::LearningSpec,
    preparation::DataPreparationStats,
    report::{
        compute_rank_identifiers, write_array_line_report, write_array_report,
        write_json_array_report, write_json_dictionary_report, LearningReport,
    },
    subset_stats::AttributeSubsetStats,
};
use crate::{
    cancellation::CancellationToken,
    dictionary::value::{format_continuous, ValueType},
    errors::LearningError,
    json_writer::JsonWriter,
    telemetry::LearningTelemetry,
};

/// Stats of every explanatory attribute of a learning spec, plus optional pairs.
#[derive(Debug, Clone)]
pub struct ClassStats {
    spec: LearningSpec,
    attribute_stats: Vec<AttributeStats>,
    attribute_pair_stats: Vec<AttributeSubsetStats>,
    max_attribute_pairs: usize,
    grouper_spec: GrouperSpec,
    grouper_cache: GrouperCache,
    total_compute_time: Duration,
    stats_computed: bool,
    telemetry: Option<LearningTelemetry>,
}

impl ClassStats {
    /// Creates uncomputed stats for a spec.
    #[must_use]
    pub fn new(spec: LearningSpec) -> Self {
        Self {
            grouper_spec: GrouperSpec::from_config(spec.preparation()),
            grouper_cache: GrouperCache::new(),
            spec,
            attribute_stats: Vec::new(),
            attribute_pair_stats: Vec::new(),
            max_attribute_pairs: 0,
            total_compute_time: Duration::ZERO,
            stats_computed: false,
            telemetry: None,
        }
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: LearningTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Number of attribute pairs built from the most informative attributes.
    pub fn set_max_attribute_pairs(&mut self, max_attribute_pairs: usize) {
        self.max_attribute_pairs = max_attribute_pairs;
    }

    /// Grouping parameters of the categorical attributes.
    #[must_use]
    pub const fn grouper_spec(&self) -> &GrouperSpec {
        &self.grouper_spec
    }

    /// Mutable grouping parameters; the grouper is rebuilt on the next computation.
    pub fn grouper_spec_mut(&mut self) -> &mut GrouperSpec {
        &mut self.grouper_spec
    }

    /// Computes the stats of every attribute, then the pairs.
    ///
    /// Returns `Ok(false)` when interrupted, leaving the stats uncomputed.
    pub fn compute_stats(&mut self, cancel: &CancellationToken) -> Result<bool, LearningError> {
        let start = Instant::now();
        self.clean();
        self.log(
            LogLevel::Info,
            "class_stats_started",
            json!({
                "dictionary": self.spec.class().name(),
                "database": self.spec.database_name(),
                "instances": self.spec.instance_number(),
                "target": self.spec.target_attribute_name(),
            }),
        );

        let grouper = self.grouper_cache.grouper(&self.grouper_spec).clone();
        let names = self.spec.attribute_names().to_vec();
        let attribute_number = names.len();
        let mut attribute_stats = Vec::with_capacity(attribute_number);
        for (index, name) in names.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(self.interrupted());
            }
            self.label(&format!("Analyze variable {name}"));
            self.progression(100.0 * index as f64 / attribute_number.max(1) as f64);
            let value_type = self
                .spec
                .class()
                .lookup_attribute(&name)
                .map_or(ValueType::Symbol, |attribute| attribute.value_type);
            let mut stats = AttributeStats::new(name, value_type);
            if !stats.compute_stats_with_grouper(&self.spec, &grouper, cancel)? {
                return Ok(self.interrupted());
            }
            attribute_stats.push(stats);
        }
        compute_rank_identifiers(&mut attribute_stats);
        self.attribute_stats = attribute_stats;

        if self.spec.is_supervised() && self.max_attribute_pairs > 0 {
            let mut pairs = Vec::new();
            for (first, second) in self.select_attribute_pairs() {
                if cancel.is_cancelled() {
                    return Ok(self.interrupted());
                }
                let mut pair = AttributeSubsetStats::new(vec![
                    univariate_partition_of(&self.attribute_stats[first]),
                    univariate_partition_of(&self.attribute_stats[second]),
                ]);
                if !pair.compute_stats(&self.spec, cancel)? {
                    return Ok(self.interrupted());
                }
                pairs.push(pair);
            }
            compute_rank_identifiers(&mut pairs);
            self.attribute_pair_stats = pairs;
        }

        self.total_compute_time = start.elapsed();
        self.stats_computed = true;
        self.log(
            LogLevel::Info,
            "class_stats_completed",
            json!({
                "variables": self.attribute_stats.len(),
                "informative": self.informative_attribute_number(),
                "pairs": self.attribute_pair_stats.len(),
                "seconds": self.total_compute_time.as_secs_f64(),
            }),
        );
        Ok(true)
    }

    /// Pairs among the attributes sorted by decreasing level, first pairs first.
    fn select_attribute_pairs(&self) -> Vec<(usize, usize)> {
        let mut order: Vec<usize> = (0..self.attribute_stats.len()).collect();
        order.sort_by(|a, b| {
            super::report::compare_value(&self.attribute_stats[*a], &self.attribute_stats[*b])
        });
        let mut pairs = Vec::new();
        'outer: for second in 1..order.len() {
            for first in 0..second {
                if pairs.len() >= self.max_attribute_pairs {
                    break 'outer;
                }
                pairs.push((order[first], order[second]));
            }
        }
        pairs
    }

    fn interrupted(&mut self) -> bool {
        self.clean();
        self.log(LogLevel::Warn, "class_stats_interrupted", json!({}));
        false
    }

    /// Drops every computed stats.
    pub fn clean(&mut self) {
        self.attribute_stats.clear();
        self.attribute_pair_stats.clear();
        self.total_compute_time = Duration::ZERO;
        self.stats_computed = false;
    }

    /// Whether the stats are computed.
    #[must_use]
    pub const fn is_stats_computed(&self) -> bool {
        self.stats_computed
    }

    /// Learning spec.
    #[must_use]
    pub const fn learning_spec(&self) -> &LearningSpec {
        &self.spec
    }

    /// Stats of each attribute, in spec order.
    #[must_use]
    pub fn attribute_stats(&self) -> &[AttributeStats] {
        &self.attribute_stats
    }

    /// Stats of an attribute.
    #[must_use]
    pub fn lookup_attribute_stats(&self, name: &str) -> Option<&AttributeStats> {
        self.attribute_stats
            .iter()
            .find(|stats| stats.attribute_name() == name)
    }

    /// Stats of the attribute pairs.
    #[must_use]
    pub fn attribute_pair_stats(&self) -> &[AttributeSubsetStats] {
        &self.attribute_pair_stats
    }

    /// Every preparation, attributes first, then pairs.
    #[must_use]
    pub fn all_preparation_stats(&self) -> Vec<&dyn DataPreparationStats> {
        self.attribute_stats
            .iter()
            .map(|stats| stats as &dyn DataPreparationStats)
            .chain(
                self.attribute_pair_stats
                    .iter()
                    .map(|stats| stats as &dyn DataPreparationStats),
            )
            .collect()
    }

    /// Attributes with a positive level.
    #[must_use]
    pub fn informative_attribute_number(&self) -> usize {
        self.attribute_stats
            .iter()
            .filter(|stats| stats.level() > 0.0)
            .count()
    }

    /// Wall time of the last computation.
    #[must_use]
    pub const fn total_compute_time(&self) -> Duration {
        self.total_compute_time
    }

    fn reports_of_type(&self, value_type: ValueType) -> Vec<&dyn LearningReport> {
        self.attribute_stats
            .iter()
            .filter(|stats| stats.attribute_type() == value_type)
            .map(|stats| stats as &dyn LearningReport)
            .collect()
    }

    fn pair_reports(&self) -> Vec<&dyn LearningReport> {
        self.attribute_pair_stats
            .iter()
            .map(|stats| stats as &dyn LearningReport)
            .collect()
    }

    /// Text report: summary, line reports by type, then detailed reports.
    pub fn write_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        debug_assert!(self.stats_computed);
        writeln!(out, "Descriptive statistics")?;
        writeln!(out)?;
        writeln!(out, "Problem description")?;
        writeln!(out, "Dictionary\t{}", self.spec.class().name())?;
        writeln!(out, "Database\t{}", self.spec.database_name())?;
        writeln!(out, "Instances\t{}", self.spec.instance_number())?;
        let task = match self.spec.target_attribute_type() {
            ValueType::Symbol => "Classification analysis",
            ValueType::Continuous => "Regression analysis",
            _ => "Unsupervised analysis",
        };
        writeln!(out, "Learning task\t{task}")?;
        if self.spec.is_supervised() {
            writeln!(
                out,
                "Target variable\t{}\t{}",
                self.spec.target_attribute_type(),
                self.spec.target_attribute_name()
            )?;
        }
        writeln!(out)?;
        writeln!(out, "Variables")?;
        for value_type in [ValueType::Symbol, ValueType::Continuous] {
            let count = self
                .attribute_stats
                .iter()
                .filter(|stats| stats.attribute_type() == value_type)
                .count();
            writeln!(out, "\t{value_type}\t{count}")?;
        }
        writeln!(out, "\tTotal\t{}", self.attribute_stats.len())?;
        if self.spec.is_supervised() {
            writeln!(out, "Informative variables\t{}", self.informative_attribute_number())?;
        }
        self.write_target_report(out)?;

        write_array_line_report(
            out,
            "Categorical variables statistics",
            &self.reports_of_type(ValueType::Symbol),
        )?;
        write_array_line_report(
            out,
            "Numerical variables statistics",
            &self.reports_of_type(ValueType::Continuous),
        )?;
        write_array_line_report(out, "Variables pairs statistics", &self.pair_reports())?;
        write_array_report(
            out,
            "Categorical variables detailed statistics",
            &self.reports_of_type(ValueType::Symbol),
        )?;
        write_array_report(
            out,
            "Numerical variables detailed statistics",
            &self.reports_of_type(ValueType::Continuous),
        )?;
        write_array_report(out, "Variables pairs detailed statistics", &self.pair_reports())
    }

    fn write_target_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let Some(descriptive) = self.spec.target_descriptive_stats() else {
            return Ok(());
        };
        writeln!(out)?;
        writeln!(out, "Target descriptive stats")?;
        descriptive.write_header_line_report(out)?;
        writeln!(out)?;
        descriptive.write_line_report(out)?;
        writeln!(out)?;
        if self.spec.target_attribute_type() == ValueType::Symbol {
            if let Some(target) = self.spec.target_partition() {
                writeln!(out)?;
                writeln!(out, "Target variable stats")?;
                writeln!(out, "Value\tFrequency")?;
                for (index, frequency) in target.part_frequencies().iter().enumerate() {
                    writeln!(out, "{}\t{frequency}", target.partition().part_label(index))?;
                }
            }
        }
        Ok(())
    }

    /// Writes the text report to a file.
    pub fn write_report_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let mut report = String::new();
        self.write_report(&mut report)
            .context("formatting preparation report")?;
        fs::write(path, report).with_context(|| format!("writing {}", path.display()))
    }

    /// JSON report: summary, variable statistics and detailed statistics.
    pub fn write_json_report(&self, json: &mut JsonWriter) {
        json.write_key_string("reportType", "Preparation");
        json.begin_key_object("summary");
        json.write_key_string("dictionary", self.spec.class().name());
        json.write_key_string("database", self.spec.database_name());
        json.write_key_count("instances", self.spec.instance_number());
        json.write_key_string("targetVariable", self.spec.target_attribute_name());
        if let Some(descriptive) = self.spec.target_descriptive_stats() {
            json.begin_key_object("targetDescriptiveStats");
            descriptive.write_json_fields(json);
            json.end_object();
        }
        if self.spec.target_attribute_type() == ValueType::Symbol {
            if let Some(target) = self.spec.target_partition() {
                json.begin_key_object("targetValues");
                json.begin_key_array("values");
                for index in 0..target.part_number() {
                    json.write_string(&target.partition().part_label(index));
                }
                json.end_array();
                json.begin_key_array("frequencies");
                for frequency in target.part_frequencies() {
                    json.write_count(*frequency);
                }
                json.end_array();
                json.end_object();
            }
        }
        json.write_key_count("variables", self.attribute_stats.len());
        if self.spec.is_supervised() {
            json.write_key_count("informativeVariables", self.informative_attribute_number());
            json.write_key_double("nullCost", self.spec.null_cost());
        }
        json.end_object();

        let attributes: Vec<&dyn LearningReport> = self
            .attribute_stats
            .iter()
            .map(|stats| stats as &dyn LearningReport)
            .collect();
        write_json_array_report(json, "variablesStatistics", &attributes, true);
        write_json_array_report(json, "variablesPairsStatistics", &self.pair_reports(), true);
        write_json_dictionary_report(json, "variablesDetailedStatistics", &attributes);
        write_json_dictionary_report(json, "variablesPairsDetailedStatistics", &self.pair_reports());
    }

    /// Writes the JSON report to a file.
    pub fn write_json_report_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let mut json = JsonWriter::new();
        json.begin_object();
        self.write_json_report(&mut json);
        json.end_object();
        json.write_file(path)
    }

    /// One-line summary used by the benchmark logs.
    #[must_use]
    pub fn summary_line(&self) -> String {
        format!(
            "{} variables, {} informative, null cost {}",
            self.attribute_stats.len(),
            self.informative_attribute_number(),
            format_continuous(self.spec.null_cost())
        )
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(telemetry) = self.telemetry.as_ref() {
            let _ = telemetry.log(level, message, metadata);
        }
    }

    fn label(&self, label: &str) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{NumericsConfig, PreparationConfig},
        database::Database,
        dictionary::{
            class::{Attribute, Class},
            value::Value,
        },
    };
    use rand::{rngs::SmallRng, Rng, SeedableRng};
    use tempfile::tempdir;

    fn class_stats() -> ClassStats {
        let mut class = Class::new("Toy");
        for (name, value_type) in [
            ("age", ValueType::Continuous),
            ("color", ValueType::Symbol),
            ("noise", ValueType::Continuous),
            ("label", ValueType::Symbol),
        ] {
            class.insert_attribute(Attribute::new(name, value_type)).unwrap();
        }
        class.compile().unwrap();
        let mut rng = SmallRng::seed_from_u64(7);
        let records = (0..200)
            .map(|_| {
                let age: f64 = rng.gen_range(0.0..100.0);
                let positive = age > 50.0;
                let color = if rng.gen_bool(0.8) == positive { "red" } else { "blue" };
                vec![
                    Value::Continuous(age.floor()),
                    Value::Symbol(color.into()),
                    Value::Continuous(rng.gen_range(0.0..1.0)),
                    Value::Symbol(if positive { "yes" } else { "no" }.into()),
                ]
            })
            .collect();
        let database = Database::from_records("toy", &class, records).unwrap();
        let spec = LearningSpec::build(
            &class,
            &database,
            "label",
            PreparationConfig::default(),
            NumericsConfig::default(),
            &CancellationToken::new(),
        )
        .unwrap();
        ClassStats::new(spec)
    }

    #[test]
    fn computes_ranked_attribute_stats() {
        let mut stats = class_stats();
        stats.set_max_attribute_pairs(1);
        assert!(stats.compute_stats(&CancellationToken::new()).unwrap());
        assert_eq!(stats.attribute_stats().len(), 3);
        assert_eq!(stats.lookup_attribute_stats("age").unwrap().identifier(), "R1");
        assert!(stats.lookup_attribute_stats("noise").unwrap().level() < 1e-9);
        assert_eq!(stats.attribute_pair_stats().len(), 1);
        assert_eq!(stats.all_preparation_stats().len(), 4);
        assert!(stats.informative_attribute_number() >= 1);
    }

    #[test]
    fn reports_group_variables_by_type() {
        let mut stats = class_stats();
        stats.compute_stats(&CancellationToken::new()).unwrap();
        let mut report = String::new();
        stats.write_report(&mut report).unwrap();
        assert!(report.contains("Learning task\tClassification analysis"));
        assert!(report.contains("Categorical variables statistics"));
        assert!(report.contains("Numerical variables statistics"));
        assert!(report.contains("Target variable stats"));

        let tmp = tempdir().unwrap();
        let path = tmp.path().join("preparation.json");
        stats.write_json_report_file(&path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["reportType"], "Preparation");
        assert_eq!(value["summary"]["instances"], 200);
        assert_eq!(value["variablesStatistics"].as_array().unwrap().len(), 3);
        assert!(value["variablesDetailedStatistics"]["R1"]["dataGrid"].is_object());
    }

    #[test]
    fn interruption_leaves_stats_uncomputed() {
        let mut stats = class_stats();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!stats.compute_stats(&cancel).unwrap());
        assert!(!stats.is_stats_computed());
        assert!(stats.attribute_stats().is_empty());
    }
}
