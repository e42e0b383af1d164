//! Response-side processing.
//!
//! - Flatten: cell set to flat rows
//! - Labels: member labels per display mode, year-end time labels
//! - Pipeline: one validated query, executed and flattened
//! - Multi-metric: several queries merged into one tagged table

pub mod flatten;
pub mod labels;
pub mod multi_metric;
pub mod pipeline;

pub use flatten::{flatten, FlatRow, FlatTable, FlattenOptions, MetricTag, ValueSummary};
pub use labels::{display_mode, member_label, year_end_label};
pub use multi_metric::{
    run_multi_metric, EntryFailure, FailurePolicy, MetricEntry, MultiMetricConfig,
    MultiMetricReport, Orchestrator, RunState, SharedQuery,
};
pub use pipeline::{ensure_valid, execute_query, flatten_response, run_query};
