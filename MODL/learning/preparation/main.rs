//! Data preparation dictionaries: prepared grids materialized as derived attributes,
//! and the recoding dictionaries built on top of them.

/// Prepared attribute of a single preparation.
pub mod attribute;
/// Preparation of a whole class.
pub mod class;
/// Recoding dictionaries and their deployment.
pub mod recoding;
/// Prepared target attribute.
pub mod target;

pub use attribute::DataPreparationAttribute;
pub use class::DataPreparationClass;
pub use recoding::{build_recoding_class, deploy, RecodedTable, RecodingSpec, RECODING_PREFIX};
pub use target::DataPreparationTargetAttribute;

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use rand::{rngs::SmallRng, Rng, SeedableRng};
    use shared_logging::ErrorRecord;

    use super::*;
    use crate::{
        cancellation::CancellationToken,
        config::{NumericsConfig, PreparationConfig},
        database::Database,
        dictionary::{
            class::{Attribute, Class, LEVEL_META_DATA_KEY},
            value::{Value, ValueType},
        },
        error_manager::LearningErrorManager,
        errors::LearningError,
        stats::{class_stats::ClassStats, learning_spec::LearningSpec},
    };

    pub(crate) fn toy_class() -> Class {
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
        class
    }

    pub(crate) fn toy_database() -> Database {
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
        Database::from_records("toy", &toy_class(), records).unwrap()
    }

    fn computed_stats(target: &str, max_attribute_pairs: usize) -> ClassStats {
        let spec = LearningSpec::build(
            &toy_class(),
            &toy_database(),
            target,
            PreparationConfig::default(),
            NumericsConfig::default(),
            &CancellationToken::new(),
        )
        .unwrap();
        let mut stats = ClassStats::new(spec);
        stats.set_max_attribute_pairs(max_attribute_pairs);
        assert!(stats.compute_stats(&CancellationToken::new()).unwrap());
        stats
    }

    pub(crate) fn toy_class_stats(max_attribute_pairs: usize) -> ClassStats {
        computed_stats("label", max_attribute_pairs)
    }

    pub(crate) fn prepared_toy(stats: &ClassStats) -> DataPreparationClass {
        let mut preparation = DataPreparationClass::new(stats);
        preparation
            .compute_data_preparation_from_class_stats(stats)
            .unwrap();
        preparation
    }

    fn collecting_manager() -> LearningErrorManager {
        let manager = LearningErrorManager::with_display(Arc::new(|_: &ErrorRecord| {}));
        manager.begin_error_collection().unwrap();
        manager
    }

    fn evaluate(class: &Class, record: &[Value]) -> indexmap::IndexMap<String, Value> {
        let names: Vec<String> = ["age", "color", "noise", "label"]
            .iter()
            .map(|name| (*name).to_owned())
            .collect();
        class.evaluate(&names, record).unwrap()
    }

    #[test]
    fn prepares_every_attribute_with_a_grid() {
        let stats = toy_class_stats(0);
        let preparation = prepared_toy(&stats);
        assert!(preparation.is_prepared());
        let names: Vec<&str> = preparation
            .data_preparation_attributes()
            .iter()
            .map(DataPreparationAttribute::prepared_attribute_name)
            .collect();
        assert_eq!(names, ["Page", "Pcolor", "Pnoise"]);
        let noise = &preparation.data_preparation_attributes()[2];
        assert_eq!(noise.level(), 0.0);
        assert_eq!(noise.prepared_data_grid_stats().compute_source_grid_size(), 1);
        let informative: Vec<&str> = preparation
            .informative_data_preparation_attributes()
            .map(DataPreparationAttribute::compute_native_attribute_name)
            .collect();
        assert_eq!(informative, ["age", "color"]);

        let class = preparation.data_preparation_class().unwrap();
        assert!(class.is_compiled());
        assert!(!class.lookup_attribute("Page").unwrap().used);
        let level = class
            .lookup_attribute("age")
            .unwrap()
            .meta_data
            .get_double(LEVEL_META_DATA_KEY)
            .unwrap();
        assert!(level > 0.0);
        assert_eq!(
            preparation.data_preparation_domain().unwrap().name(),
            "ToyPreparation"
        );

        let target = preparation.data_preparation_target_attribute().unwrap();
        assert_eq!(target.prepared_attribute_name(), "Vlabel");
        assert_eq!(target.native_attribute_type(), ValueType::Symbol);

        let manager = collecting_manager();
        assert!(preparation.check_data_preparation(&manager));
        assert!(manager.records().is_empty());
    }

    #[test]
    fn subset_preparation_keeps_a_supervised_pair() {
        let stats = toy_class_stats(1);
        let pair = &stats.attribute_pair_stats()[0];
        let mut preparation = DataPreparationClass::new(&stats);
        preparation
            .compute_data_preparation_from_attribute_subset_stats(&stats, pair)
            .unwrap();
        let attributes = preparation.data_preparation_attributes();
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].native_attribute_number(), 2);
        assert!(attributes[0]
            .add_prepared_distance_study_attributes(&mut preparation.data_preparation_class().unwrap().clone())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn refuses_stats_not_computed() {
        let spec = LearningSpec::build(
            &toy_class(),
            &toy_database(),
            "label",
            PreparationConfig::default(),
            NumericsConfig::default(),
            &CancellationToken::new(),
        )
        .unwrap();
        let stats = ClassStats::new(spec);
        let mut preparation = DataPreparationClass::new(&stats);
        assert!(matches!(
            preparation.compute_data_preparation_from_class_stats(&stats),
            Err(LearningError::InvalidArgument(_))
        ));
        assert!(!preparation.is_prepared());
    }

    #[test]
    fn check_reports_a_missing_prepared_attribute() {
        let stats = toy_class_stats(0);
        let mut preparation = prepared_toy(&stats);
        let (class, _, _) = preparation.class_and_attributes_mut().unwrap();
        class.remove_attribute("Pcolor");

        let manager = collecting_manager();
        assert!(!preparation.check_data_preparation(&manager));
        let records = manager.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, "Data preparation");
        assert_eq!(records[0].localisation, "Toy");
        assert_eq!(
            records[0].label,
            "Prepared variable Pcolor unknown in the preparation dictionary"
        );
    }

    #[test]
    fn removed_preparation_hands_over_its_domain() {
        let stats = toy_class_stats(0);
        let mut preparation = prepared_toy(&stats);
        let domain = preparation.remove_data_preparation().unwrap();
        assert!(domain.lookup_class("Toy").is_some());
        assert!(!preparation.is_prepared());
        assert!(preparation.data_preparation_attributes().is_empty());

        let manager = collecting_manager();
        assert!(!preparation.check_data_preparation(&manager));
        assert_eq!(manager.records()[0].label, "Data not prepared");
    }

    #[test]
    fn derives_cell_and_numerical_attributes() {
        let stats = toy_class_stats(0);
        let mut preparation = prepared_toy(&stats);
        let (class, attributes, target) = preparation.class_and_attributes_mut().unwrap();
        let age = &attributes[0];
        assert_eq!(age.add_prepared_indexing_attribute(class).unwrap(), "IndexPage");
        assert_eq!(age.add_prepared_id_attribute(class).unwrap(), "IdPage");
        assert_eq!(age.add_prepared_center_reduced_attribute(class).unwrap(), "CRPage");
        assert_eq!(age.add_prepared_normalized_attribute(class).unwrap(), "N01Page");
        assert_eq!(
            age.add_prepared_rank_normalized_attribute(class).unwrap(),
            "NRPage"
        );
        let infos = age.add_prepared_source_conditional_info_attributes(class).unwrap();
        assert_eq!(infos, ["Info1Page", "Info2Page"]);
        assert!(!class.lookup_attribute("StatsPage").unwrap().used);
        assert_eq!(
            target.unwrap().add_prepared_indexing_attribute(class).unwrap(),
            "IndexVlabel"
        );
        assert!(attributes[1].add_prepared_center_reduced_attribute(class).is_err());
        assert!(class
            .lookup_attribute("IdPage")
            .unwrap()
            .meta_data
            .contains(LEVEL_META_DATA_KEY));

        class.compile().unwrap();
        let values = evaluate(
            class,
            &[
                Value::Continuous(80.0),
                Value::Symbol("red".into()),
                Value::Continuous(0.5),
                Value::Symbol("yes".into()),
            ],
        );
        let normalized = values["N01Page"].as_continuous();
        assert!((0.0..=1.0).contains(&normalized));
        let rank = values["NRPage"].as_continuous();
        assert!(rank > 0.5 && rank < 1.0);
        assert!((1.0..=2.0).contains(&values["IndexVlabel"].as_continuous()));
        assert!(values["Info1Page"].as_continuous() >= 0.0);
    }

    #[test]
    fn categorical_distance_study_follows_the_value_frequencies() {
        let stats = toy_class_stats(0);
        let mut preparation = prepared_toy(&stats);
        let (class, attributes, _) = preparation.class_and_attributes_mut().unwrap();
        let color = &attributes[1];
        let added = color.add_prepared_distance_study_attributes(class).unwrap();
        assert_eq!(added, ["D_B1Pcolor", "SD_B1Pcolor", "D_B2Pcolor", "SD_B2Pcolor"]);
        assert!(!class.lookup_attribute("B1Pcolor").unwrap().used);
        assert!(class.lookup_attribute("P_B1Pcolor").is_none());
        class.compile().unwrap();

        let grid = color.prepared_data_grid_stats();
        let total = grid.compute_grid_frequency() as f64;
        let values = evaluate(
            class,
            &[
                Value::Continuous(10.0),
                Value::Symbol("red".into()),
                Value::Continuous(0.5),
                Value::Symbol("no".into()),
            ],
        );
        for cell in 0..2 {
            let p = grid.univariate_cell_frequency_at(cell) as f64 / total;
            let b = values[format!("B{}Pcolor", cell + 1).as_str()].as_continuous();
            let distance = values[format!("D_B{}Pcolor", cell + 1).as_str()].as_continuous();
            let self_distance = values[format!("SD_B{}Pcolor", cell + 1).as_str()].as_continuous();
            assert!((distance - p / 2.0 * b).abs() < 1e-12);
            let expected = if b > 0.5 { p * p / 3.0 } else { p * (1.0 - p) / 3.0 };
            assert!((self_distance - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn unsupervised_preparation_has_no_target_and_no_conditional_info() {
        let stats = computed_stats("", 0);
        let mut preparation = DataPreparationClass::new(&stats);
        preparation
            .compute_data_preparation_from_class_stats(&stats)
            .unwrap();
        assert!(preparation.data_preparation_target_attribute().is_none());
        assert_eq!(preparation.informative_data_preparation_attributes().count(), 0);
        let (class, attributes, _) = preparation.class_and_attributes_mut().unwrap();
        let age = attributes
            .iter()
            .find(|attribute| attribute.compute_native_attribute_name() == "age")
            .unwrap();
        assert!(matches!(
            age.add_prepared_source_conditional_info_attributes(class),
            Err(LearningError::Derivation(_))
        ));
        let binaries = age.add_prepared_binarization_attributes(class).unwrap();
        assert_eq!(
            binaries.len(),
            age.prepared_data_grid_stats().compute_target_grid_size()
        );
    }

    #[test]
    fn report_lists_the_dictionary_and_every_preparation() {
        let stats = toy_class_stats(0);
        let preparation = prepared_toy(&stats);
        let mut out = String::new();
        preparation.write_report(&mut out).unwrap();
        assert!(out.starts_with("Data preparation\tToy\n"));
        assert!(out.contains("Dictionary\tToy"));
        assert!(out.contains("Target variable\tlabel\tVlabel"));
        assert!(out.contains("Variable\tcolor\tPcolor"));
    }
}
