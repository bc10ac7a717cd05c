use super::{
    learning_spec::TargetPartition,
    modl::{group, unsupervised_group, OptimizedPartition},
};
use crate::config::PreparationConfig;

/// Grouping algorithm of categorical attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupingMethod {
    /// MODL grouping against the target; most frequent values without target.
    #[default]
    Modl,
    /// Most frequent values plus a default group, whatever the target.
    MostFrequent,
}

impl GroupingMethod {
    /// Method name as printed in reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Modl => "MODL",
            Self::MostFrequent => "BasicGrouping",
        }
    }
}

/// User-editable grouping parameters.
///
/// Every change bumps a freshness counter, so that groupers built from a previous
/// version of the parameters are rebuilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrouperSpec {
    method: GroupingMethod,
    max_groups: usize,
    min_group_frequency: usize,
    freshness: u64,
}

impl Default for GrouperSpec {
    fn default() -> Self {
        Self::from_config(&PreparationConfig::default())
    }
}

impl GrouperSpec {
    /// Spec with the grouping parameters of a configuration.
    #[must_use]
    pub fn from_config(config: &PreparationConfig) -> Self {
        Self {
            method: GroupingMethod::Modl,
            max_groups: config.max_groups,
            min_group_frequency: config.min_interval_frequency,
            freshness: 0,
        }
    }

    /// Grouping method.
    #[must_use]
    pub const fn method(&self) -> GroupingMethod {
        self.method
    }

    /// Sets the grouping method.
    pub fn set_method(&mut self, method: GroupingMethod) {
        self.method = method;
        self.freshness += 1;
    }

    /// Maximum number of groups without target.
    #[must_use]
    pub const fn max_groups(&self) -> usize {
        self.max_groups
    }

    /// Sets the maximum number of groups.
    pub fn set_max_groups(&mut self, max_groups: usize) {
        self.max_groups = max_groups;
        self.freshness += 1;
    }

    /// Minimum frequency of an initial group.
    #[must_use]
    pub const fn min_group_frequency(&self) -> usize {
        self.min_group_frequency
    }

    /// Sets the minimum frequency of an initial group.
    pub fn set_min_group_frequency(&mut self, min_group_frequency: usize) {
        self.min_group_frequency = min_group_frequency;
        self.freshness += 1;
    }

    /// Number of changes since creation.
    #[must_use]
    pub const fn freshness(&self) -> u64 {
        self.freshness
    }

    /// Builds a grouper with the current parameters.
    #[must_use]
    pub fn create_grouper(&self) -> Grouper {
        Grouper {
            method: self.method,
            max_groups: self.max_groups.max(1),
            min_group_frequency: self.min_group_frequency,
        }
    }
}

/// Grouper built from a [`GrouperSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouper {
    method: GroupingMethod,
    max_groups: usize,
    min_group_frequency: usize,
}

impl Grouper {
    /// Grouper of a configuration.
    #[must_use]
    pub fn from_config(config: &PreparationConfig) -> Self {
        GrouperSpec::from_config(config).create_grouper()
    }

    /// Grouping method.
    #[must_use]
    pub const fn method(&self) -> GroupingMethod {
        self.method
    }

    /// Groups the values of a categorical attribute.
    #[must_use]
    pub fn group(
        &self,
        attribute_name: &str,
        values: &[String],
        target: Option<&TargetPartition>,
        epsilon: f64,
    ) -> OptimizedPartition {
        match (self.method, target) {
            (GroupingMethod::Modl, Some(target)) => {
                group(attribute_name, values, target, self.min_group_frequency, epsilon)
            }
            _ => unsupervised_group(attribute_name, values, self.max_groups),
        }
    }
}

/// Grouper memoized against the freshness of its spec.
#[derive(Debug, Clone, Default)]
pub struct GrouperCache {
    cached: Option<(u64, Grouper)>,
}

impl GrouperCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached grouper, rebuilt first when the parameters changed since it was built.
    pub fn grouper(&mut self, spec: &GrouperSpec) -> &Grouper {
        if !self.is_fresh(spec) {
            self.cached = None;
        }
        let (_, grouper) = self
            .cached
            .get_or_insert_with(|| (spec.freshness(), spec.create_grouper()));
        grouper
    }

    /// Whether a grouper is cached for the given freshness.
    #[must_use]
    pub fn is_fresh(&self, spec: &GrouperSpec) -> bool {
        matches!(&self.cached, Some((freshness, _)) if *freshness == spec.freshness())
    }

    /// Drops the cached grouper.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}
