//! Statistics: tuple tables, descriptive stats, learning reports, data grids and the
//! MODL preparation of attributes.

/// Stats of a single attribute.
pub mod attribute_stats;
/// Stats of every attribute of a learning spec.
pub mod class_stats;
/// Partitioned grids and their conditional probabilities.
pub mod data_grid;
/// Descriptive statistics.
pub mod descriptive;
/// Grouping parameters and their memoized grouper.
pub mod grouper;
/// Learning problem definition.
pub mod learning_spec;
/// MODL discretization and grouping.
pub mod modl;
/// Preparation costs and levels.
pub mod preparation;
/// Report ordering and writers.
pub mod report;
/// Numerical helpers.
pub mod stat;
/// Stats of attribute subsets.
pub mod subset_stats;
/// Sorted value tables.
pub mod tuple_table;

pub use attribute_stats::AttributeStats;
pub use class_stats::ClassStats;
pub use data_grid::{AttributePartition, DataGridStats, PartitionKind, SourceConditionalLogProbs};
pub use descriptive::{DescriptiveContinuousStats, DescriptiveStats, DescriptiveSymbolStats};
pub use grouper::{Grouper, GrouperCache, GrouperSpec, GroupingMethod};
pub use learning_spec::{Column, LearningSpec, TargetPartition};
pub use preparation::{DataPreparationStats, NullCosts, PreparationState};
pub use report::{compute_rank_identifiers, LearningReport};
pub use subset_stats::AttributeSubsetStats;
pub use tuple_table::{Tuple, TupleTable};
