use std::sync::Arc;

use super::{data_grid::DataGridStats, descriptive::DescriptiveContinuousStats, report::LearningReport};
use crate::{
    config::NumericsConfig,
    dictionary::value::ValueType,
    errors::LearningError,
    json_writer::JsonWriter,
    serializer::{Serializer, StreamSerializable},
};

/// Costs of the null model of a preparation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NullCosts {
    /// Construction cost.
    pub construction: f64,
    /// Preparation cost.
    pub preparation: f64,
    /// Data cost.
    pub data: f64,
}

impl NullCosts {
    /// Sum of the three costs.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.construction + self.preparation + self.data
    }
}

/// Result of a preparation: the partitioned grid, its level and its MODL costs.
///
/// Costs are never negative and snap to zero below `epsilon_cost`. The grid is dropped
/// when the level turns out uninformative.
#[derive(Debug, Clone)]
pub struct PreparationState {
    grid: Option<Arc<DataGridStats>>,
    level: f64,
    construction_cost: f64,
    preparation_cost: f64,
    data_cost: f64,
    epsilon_cost: f64,
    epsilon_level: f64,
}

impl Default for PreparationState {
    fn default() -> Self {
        Self::new(&NumericsConfig::default())
    }
}

impl PreparationState {
    /// Creates an empty state.
    #[must_use]
    pub fn new(numerics: &NumericsConfig) -> Self {
        Self {
            grid: None,
            level: 0.0,
            construction_cost: 0.0,
            preparation_cost: 0.0,
            data_cost: 0.0,
            epsilon_cost: numerics.epsilon_cost,
            epsilon_level: numerics.epsilon_level,
        }
    }

    /// Prepared grid, `None` when uninformative.
    #[must_use]
    pub const fn grid(&self) -> Option<&Arc<DataGridStats>> {
        self.grid.as_ref()
    }

    /// Replaces the prepared grid.
    pub fn set_grid(&mut self, grid: Option<DataGridStats>) {
        self.grid = grid.map(Arc::new);
    }

    /// Level in `[0, 1]`.
    #[must_use]
    pub const fn level(&self) -> f64 {
        self.level
    }

    /// Construction cost.
    #[must_use]
    pub const fn construction_cost(&self) -> f64 {
        self.construction_cost
    }

    /// Preparation cost.
    #[must_use]
    pub const fn preparation_cost(&self) -> f64 {
        self.preparation_cost
    }

    /// Data cost.
    #[must_use]
    pub const fn data_cost(&self) -> f64 {
        self.data_cost
    }

    /// Construction plus preparation cost.
    #[must_use]
    pub fn model_cost(&self) -> f64 {
        self.construction_cost + self.preparation_cost
    }

    /// Model plus data cost.
    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.model_cost() + self.data_cost
    }

    fn snap(&self, name: &str, value: f64) -> Result<f64, LearningError> {
        if value < 0.0 || value.is_nan() {
            return Err(LearningError::InvalidArgument(format!(
                "{name} cost must be non-negative, got {value}"
            )));
        }
        Ok(if value < self.epsilon_cost { 0.0 } else { value })
    }

    /// Sets the construction cost.
    pub fn set_construction_cost(&mut self, value: f64) -> Result<(), LearningError> {
        self.construction_cost = self.snap("construction", value)?;
        Ok(())
    }

    /// Sets the preparation cost.
    pub fn set_preparation_cost(&mut self, value: f64) -> Result<(), LearningError> {
        self.preparation_cost = self.snap("preparation", value)?;
        Ok(())
    }

    /// Sets the data cost.
    pub fn set_data_cost(&mut self, value: f64) -> Result<(), LearningError> {
        self.data_cost = self.snap("data", value)?;
        Ok(())
    }

    /// Computes `1 - total cost / null cost`, once.
    ///
    /// Costs that are not MODL based (zero preparation or null cost) leave the level at
    /// zero. A level below `epsilon_level` resets the costs to the null model and drops
    /// the grid.
    pub fn compute_level(&mut self, null: NullCosts) {
        debug_assert!(self.level == 0.0, "level already computed");
        let null_cost = null.total();
        if self.preparation_cost == 0.0 || null_cost == 0.0 {
            return;
        }
        let informative = self
            .grid
            .as_ref()
            .map_or(0, |grid| grid.compute_source_informative_attribute_number());
        let mut level = 1.0 - self.total_cost() / null_cost;
        if informative == 0 {
            level = 0.0;
        }
        if level < self.epsilon_level {
            level = 0.0;
            self.construction_cost = null.construction;
            self.preparation_cost = null.preparation;
            self.data_cost = null.data;
            self.grid = None;
        }
        self.level = level;
    }

    /// Level of a univariate supervised preparation.
    ///
    /// A grid without informative source keeps its single part at level zero, so that
    /// uninformative attributes are still prepared. MODL costs go through
    /// [`compute_level`](Self::compute_level); without them the level is the share of
    /// the target entropy carried by the grid.
    pub fn compute_default_evaluation(&mut self, null: NullCosts) {
        let Some(grid) = self.grid.as_ref() else {
            self.level = 0.0;
            return;
        };
        if grid.compute_informative_attribute_number() == 0 {
            self.level = 0.0;
        } else if self.preparation_cost > 0.0 || self.data_cost > 0.0 {
            self.compute_level(null);
        } else {
            let target_entropy = grid.compute_target_entropy();
            let mutual_entropy = grid.compute_mutual_entropy();
            debug_assert!(mutual_entropy - target_entropy <= self.epsilon_level);
            let level = if target_entropy <= 0.0 {
                1.0
            } else {
                mutual_entropy / target_entropy
            };
            self.level = if level.abs() < self.epsilon_level { 0.0 } else { level };
        }
    }

    /// Level of a multivariate preparation: `1 - total cost / null cost`, truncated to
    /// zero below `epsilon_level`. Costs and grid are kept either way.
    pub fn compute_compression_level(&mut self, null: NullCosts) {
        let null_cost = null.total();
        let level = if null_cost > 0.0 {
            1.0 - self.total_cost() / null_cost
        } else {
            0.0
        };
        self.level = if level < self.epsilon_level { 0.0 } else { level };
    }

    /// Resets to the empty state.
    pub fn clean(&mut self) {
        self.grid = None;
        self.level = 0.0;
        self.construction_cost = 0.0;
        self.preparation_cost = 0.0;
        self.data_cost = 0.0;
    }

    /// Writes the level and cost fields.
    pub fn write_json_cost_fields(&self, json: &mut JsonWriter, supervised: bool) {
        if supervised {
            json.write_key_double("level", self.level);
        }
        if self.preparation_cost > 0.0 {
            json.write_key_double("constructionCost", self.construction_cost);
            json.write_key_double("preparationCost", self.preparation_cost);
            json.write_key_double("dataCost", self.data_cost);
        }
    }
}

impl StreamSerializable for PreparationState {
    fn serialize(&self, stream: &mut Serializer) -> Result<(), LearningError> {
        stream.put_double(self.level)?;
        stream.put_double(self.construction_cost)?;
        stream.put_double(self.preparation_cost)?;
        stream.put_double(self.data_cost)?;
        stream.put_boolean(self.grid.is_some())?;
        if let Some(grid) = &self.grid {
            grid.serialize(stream)?;
        }
        Ok(())
    }

    fn deserialize(&mut self, stream: &mut Serializer) -> Result<(), LearningError> {
        self.level = stream.get_double()?;
        self.construction_cost = stream.get_double()?;
        self.preparation_cost = stream.get_double()?;
        self.data_cost = stream.get_double()?;
        self.grid = if stream.get_boolean()? {
            let mut grid = DataGridStats::new(Vec::new(), 0);
            grid.deserialize(stream)?;
            Some(Arc::new(grid))
        } else {
            None
        };
        Ok(())
    }
}

/// Report of a preparation: one or several native attributes partitioned against the
/// target, scored by level.
pub trait DataPreparationStats: LearningReport {
    /// Preparation result.
    fn state(&self) -> &PreparationState;

    /// Mutable preparation result.
    fn state_mut(&mut self) -> &mut PreparationState;

    /// Prepared native attributes.
    fn attribute_names(&self) -> Vec<String>;

    /// Target attribute, empty when unsupervised.
    fn target_attribute_name(&self) -> &str;

    /// Target type.
    fn target_attribute_type(&self) -> ValueType;

    /// Construction cost of the null model.
    fn null_construction_cost(&self) -> f64;

    /// Preparation cost of the null model.
    fn null_preparation_cost(&self) -> f64;

    /// Data cost of the null model.
    fn null_data_cost(&self) -> f64;

    /// The three null costs.
    fn null_costs(&self) -> NullCosts {
        NullCosts {
            construction: self.null_construction_cost(),
            preparation: self.null_preparation_cost(),
            data: self.null_data_cost(),
        }
    }

    /// Total cost of the null model.
    fn null_cost(&self) -> f64 {
        self.null_costs().total()
    }

    /// Prepared grid, `None` when uninformative.
    fn prepared_data_grid_stats(&self) -> Option<&Arc<DataGridStats>> {
        self.state().grid()
    }

    /// Level in `[0, 1]`.
    fn level(&self) -> f64 {
        self.state().level()
    }

    /// Construction cost.
    fn construction_cost(&self) -> f64 {
        self.state().construction_cost()
    }

    /// Preparation cost.
    fn preparation_cost(&self) -> f64 {
        self.state().preparation_cost()
    }

    /// Data cost.
    fn data_cost(&self) -> f64 {
        self.state().data_cost()
    }

    /// Construction plus preparation cost.
    fn model_cost(&self) -> f64 {
        self.state().model_cost()
    }

    /// Model plus data cost.
    fn total_cost(&self) -> f64 {
        self.state().total_cost()
    }

    /// Computes the level against the null model.
    fn compute_level(&mut self) {
        let null = self.null_costs();
        self.state_mut().compute_level(null);
    }

    /// Descriptive stats of a single numerical attribute.
    fn descriptive_continuous_stats(&self) -> Option<&DescriptiveContinuousStats> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::data_grid::{AttributePartition, PartitionKind};

    fn informative_grid() -> DataGridStats {
        let mut grid = DataGridStats::new(
            vec![
                AttributePartition::new("x", PartitionKind::Discretization { bounds: vec![1.5] }),
                AttributePartition::new(
                    "y",
                    PartitionKind::SymbolValues {
                        values: vec!["a".into(), "b".into()],
                    },
                ),
            ],
            1,
        );
        grid.set_cell_frequency_at(&[0, 0], 10);
        grid.set_cell_frequency_at(&[1, 1], 10);
        grid
    }

    fn null() -> NullCosts {
        NullCosts {
            construction: 1.0,
            preparation: 4.0,
            data: 15.0,
        }
    }

    #[test]
    fn costs_snap_to_zero_and_reject_negatives() {
        let mut state = PreparationState::default();
        state.set_construction_cost(5e-11).unwrap();
        assert_eq!(state.construction_cost(), 0.0);
        state.set_data_cost(2.5).unwrap();
        assert!((state.data_cost() - 2.5).abs() < f64::EPSILON);
        assert!(matches!(
            state.set_preparation_cost(-1.0),
            Err(LearningError::InvalidArgument(_))
        ));
    }

    #[test]
    fn zero_preparation_cost_leaves_level_and_grid() {
        let mut state = PreparationState::default();
        state.set_grid(Some(informative_grid()));
        state.compute_level(null());
        assert_eq!(state.level(), 0.0);
        assert!(state.grid().is_some());
    }

    #[test]
    fn informative_level_keeps_the_grid() {
        let mut state = PreparationState::default();
        state.set_grid(Some(informative_grid()));
        state.set_construction_cost(1.0).unwrap();
        state.set_preparation_cost(5.0).unwrap();
        state.set_data_cost(4.0).unwrap();
        state.compute_level(null());
        assert!((state.level() - 0.5).abs() < 1e-12);
        assert!(state.grid().is_some());
    }

    #[test]
    fn uninformative_level_falls_back_to_the_null_model() {
        let mut state = PreparationState::default();
        state.set_grid(Some(informative_grid()));
        state.set_construction_cost(1.0).unwrap();
        state.set_preparation_cost(10.0).unwrap();
        state.set_data_cost(12.0).unwrap();
        state.compute_level(null());
        assert_eq!(state.level(), 0.0);
        assert!(state.grid().is_none());
        assert!((state.total_cost() - null().total()).abs() < 1e-12);
    }

    fn single_part_grid() -> DataGridStats {
        let mut grid = DataGridStats::new(
            vec![
                AttributePartition::new("x", PartitionKind::Discretization { bounds: Vec::new() }),
                AttributePartition::new(
                    "y",
                    PartitionKind::SymbolValues {
                        values: vec!["a".into(), "b".into()],
                    },
                ),
            ],
            1,
        );
        grid.set_cell_frequency_at(&[0, 0], 10);
        grid.set_cell_frequency_at(&[0, 1], 10);
        grid
    }

    #[test]
    fn default_evaluation_keeps_an_uninformative_grid() {
        let mut state = PreparationState::default();
        state.set_grid(Some(single_part_grid()));
        state.set_construction_cost(1.0).unwrap();
        state.set_preparation_cost(4.5).unwrap();
        state.set_data_cost(15.0).unwrap();
        state.compute_default_evaluation(null());
        assert_eq!(state.level(), 0.0);
        assert_eq!(
            state.grid().map(|grid| grid.compute_source_grid_size()),
            Some(1)
        );
        assert!((state.preparation_cost() - 4.5).abs() < f64::EPSILON);

        let mut costless = PreparationState::default();
        costless.set_grid(Some(single_part_grid()));
        costless.compute_default_evaluation(null());
        assert_eq!(costless.level(), 0.0);
        assert!(costless.grid().is_some());
    }

    #[test]
    fn default_evaluation_uses_modl_costs_when_present() {
        let mut state = PreparationState::default();
        state.set_grid(Some(informative_grid()));
        state.set_construction_cost(1.0).unwrap();
        state.set_preparation_cost(5.0).unwrap();
        state.set_data_cost(4.0).unwrap();
        state.compute_default_evaluation(null());
        assert!((state.level() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn default_evaluation_without_modl_costs_uses_entropies() {
        let mut pure = PreparationState::default();
        pure.set_grid(Some(informative_grid()));
        pure.compute_default_evaluation(null());
        assert!((pure.level() - 1.0).abs() < 1e-12);

        let mut mixed_grid = informative_grid();
        mixed_grid.set_cell_frequency_at(&[0, 1], 10);
        let mut mixed = PreparationState::default();
        mixed.set_grid(Some(mixed_grid));
        mixed.compute_default_evaluation(null());
        assert!(mixed.level() > 0.0 && mixed.level() < 1.0);
        assert!(mixed.grid().is_some());
    }

    #[test]
    fn compression_level_keeps_costs_and_grid() {
        let mut state = PreparationState::default();
        state.set_grid(Some(single_part_grid()));
        state.set_construction_cost(1.0).unwrap();
        state.set_preparation_cost(10.0).unwrap();
        state.set_data_cost(12.0).unwrap();
        state.compute_compression_level(null());
        assert_eq!(state.level(), 0.0);
        assert!(state.grid().is_some());
        assert!((state.total_cost() - 23.0).abs() < 1e-12);
    }

    #[test]
    fn serialization_restores_the_grid() {
        let mut state = PreparationState::default();
        state.set_grid(Some(informative_grid()));
        state.set_preparation_cost(3.0).unwrap();
        let mut stream = Serializer::new();
        stream.open_for_write();
        state.serialize(&mut stream).unwrap();
        stream.close();

        let mut restored = PreparationState::default();
        let mut reader = Serializer::new();
        reader.open_for_read(stream.into_tokens());
        restored.deserialize(&mut reader).unwrap();
        assert!((restored.preparation_cost() - 3.0).abs() < f64::EPSILON);
        assert_eq!(restored.grid().map(|grid| grid.compute_grid_frequency()), Some(20));
    }
}
