//! Domain models for aggregate queries.
//!
//! This module contains the typed request model. Every polymorphic wire
//! object is an externally tagged enum, so `{"dimensionLevelSelection": {...}}`
//! maps to exactly one variant:
//!
//! - [`QueryPayload`] - Wire body: `{ "query": ..., "options": ... }`
//! - [`QuerySource`] - `metric`, `formula` or `metrics` (named metric columns)
//! - [`Axis`] - Grouping dimension, one of several selection shapes
//! - [`Filter`] - `memberSet`, `selectionConcept` or `formula`
//! - [`TimeIntervals`] - Time window of the query
//! - [`MemberDisplayMode`] and the other recognized option values
//!
//! The response model lives in [`cellset`].

pub mod cellset;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use cellset::{Cell, CellSet, CellSetAxis, Measure, Position};

// =============================================================================
// References
// =============================================================================

/// A dimension reached from the metric's analytic object through `qualifyingPath`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifying_path: Option<String>,
}

impl DimensionRef {
    pub fn new(name: impl Into<String>, qualifying_path: Option<&str>) -> Self {
        Self {
            name: name.into(),
            qualifying_path: qualifying_path.map(String::from),
        }
    }
}

/// Property, selection concept and member map references share the dimension shape.
pub type PropertyRef = DimensionRef;
pub type ConceptRef = DimensionRef;

/// One member, addressed by its path from the dimension root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberPath {
    pub path: Vec<String>,
}

impl MemberPath {
    pub fn new<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
        }
    }
}

// =============================================================================
// Source
// =============================================================================

/// One named column of a `metrics` source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricColumn {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifying_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricColumns {
    pub columns: Vec<MetricColumn>,
}

/// What the query measures. Exactly one variant per query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuerySource {
    Metric(String),
    Formula(String),
    Metrics(MetricColumns),
}

impl QuerySource {
    pub fn metric(id: impl Into<String>) -> Self {
        Self::Metric(id.into())
    }

    /// Column ids in request order; a single-metric source yields one id.
    pub fn metric_ids(&self) -> Vec<String> {
        match self {
            Self::Metric(id) => vec![id.clone()],
            Self::Formula(_) => Vec::new(),
            Self::Metrics(m) => m.columns.iter().map(|c| c.id.clone()).collect(),
        }
    }
}

// =============================================================================
// Axes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelSelection {
    pub dimension: DimensionRef,
    pub level_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafMemberSelection {
    pub dimension: DimensionRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumericRanges {
    pub property: PropertyRef,
    /// Space-separated bucket bounds, e.g. `"0 25 50 100"`.
    pub ranges: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_all_member: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_independent_zero_range: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSelection {
    pub dimension: DimensionRef,
    pub members: Vec<MemberPath>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberMapSelection {
    pub member_map: DimensionRef,
    pub target_dimension_name: String,
}

/// One grouping axis of the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Axis {
    DimensionLevelSelection(LevelSelection),
    DimensionLevelWithUncategorizedValueSelection(LevelSelection),
    DimensionLeafMemberSelection(LeafMemberSelection),
    DimensionDataMemberSelection(LeafMemberSelection),
    NumericRanges(NumericRanges),
    DimensionMemberSelection(MemberSelection),
    MemberMapSelection(MemberMapSelection),
    SelectionConcept(ConceptRef),
    Formula(String),
}

impl Axis {
    /// Column header used when the response axis does not name its dimension.
    pub fn column_name(&self) -> Option<&str> {
        match self {
            Axis::DimensionLevelSelection(s)
            | Axis::DimensionLevelWithUncategorizedValueSelection(s) => Some(&s.dimension.name),
            Axis::DimensionLeafMemberSelection(s) | Axis::DimensionDataMemberSelection(s) => {
                Some(&s.dimension.name)
            }
            Axis::NumericRanges(r) => Some(&r.property.name),
            Axis::DimensionMemberSelection(s) => Some(&s.dimension.name),
            Axis::MemberMapSelection(m) => Some(&m.target_dimension_name),
            Axis::SelectionConcept(c) => Some(&c.name),
            Axis::Formula(_) => None,
        }
    }
}

// =============================================================================
// Filters
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemberValues {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<MemberPath>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<MemberPath>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSet {
    pub dimension: DimensionRef,
    pub values: MemberValues,
}

/// One filter of the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Filter {
    MemberSet(MemberSet),
    SelectionConcept(ConceptRef),
    Formula(String),
}

// =============================================================================
// Time
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodType {
    Year,
    Month,
    Week,
    Day,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Forward,
    Backward,
}

/// Anchor computed by the service instead of a fixed date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DynamicDateFrom {
    Source,
    CompletePeriod,
}

/// Time window of the query. Exactly one `from*` field is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeIntervals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_instant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_date_from: Option<DynamicDateFrom>,
    pub interval_period_type: PeriodType,
    pub interval_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_period_count: Option<u32>,
    pub direction: Direction,
}

impl TimeIntervals {
    /// Intervals anchored at a calendar date (`YYYY-MM-DD`).
    pub fn from_date(
        date: impl Into<String>,
        period: PeriodType,
        count: u32,
        direction: Direction,
    ) -> Self {
        Self {
            from_date_time: Some(date.into()),
            from_instant: None,
            dynamic_date_from: None,
            interval_period_type: period,
            interval_count: count,
            interval_period_count: None,
            direction,
        }
    }

    /// Intervals anchored at a service-computed date.
    pub fn dynamic(from: DynamicDateFrom, period: PeriodType, count: u32, direction: Direction) -> Self {
        Self {
            from_date_time: None,
            from_instant: None,
            dynamic_date_from: Some(from),
            interval_period_type: period,
            interval_count: count,
            interval_period_count: None,
            direction,
        }
    }
}

// =============================================================================
// Options
// =============================================================================

/// Which label field the flattener reads for each member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberDisplayMode {
    #[default]
    Default,
    Compact,
    Display,
    Mdx,
    CompactDisplay,
}

/// Wire `options` object: a pass-through map of recognized switches.
pub type QueryOptions = Map<String, Value>;

// =============================================================================
// Payload
// =============================================================================

/// The `query` object of the wire body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationQuery {
    pub source: QuerySource,
    pub axes: Vec<Axis>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    pub time_intervals: TimeIntervals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_values: Option<Vec<Value>>,
}

/// Complete wire body sent to the aggregate endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPayload {
    pub query: AggregationQuery,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: QueryOptions,
}

impl QueryPayload {
    /// Serialize to the wire body.
    pub fn to_value(&self) -> Value {
        // Every field is a string, number, bool, map with string keys or a
        // sequence of those, which serde_json always accepts.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_axis_external_tagging() {
        let axis: Axis = serde_json::from_value(json!({
            "dimensionLevelSelection": {
                "dimension": { "name": "Country_Cost", "qualifyingPath": "Employee" },
                "levelIds": ["Country"]
            }
        }))
        .unwrap();

        match &axis {
            Axis::DimensionLevelSelection(s) => {
                assert_eq!(s.dimension.qualifying_path.as_deref(), Some("Employee"));
                assert_eq!(s.level_ids, vec!["Country"]);
            }
            other => panic!("wrong variant: {other:?}"),
        }
        assert_eq!(axis.column_name(), Some("Country_Cost"));
    }

    #[test]
    fn test_formula_axis_has_no_column_name() {
        let axis: Axis = serde_json::from_value(json!({ "formula": "on Employee" })).unwrap();
        assert_eq!(axis.column_name(), None);
    }

    #[test]
    fn test_source_serialization() {
        assert_eq!(
            serde_json::to_value(QuerySource::metric("employeeCount")).unwrap(),
            json!({ "metric": "employeeCount" })
        );

        let source: QuerySource = serde_json::from_value(json!({
            "metrics": { "columns": [{ "id": "a" }, { "id": "b", "qualifyingPath": "Applicant" }] }
        }))
        .unwrap();
        assert_eq!(source.metric_ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_time_intervals_skip_unset_anchors() {
        let ti = TimeIntervals::from_date("2026-01-01", PeriodType::Year, 1, Direction::Backward);
        assert_eq!(
            serde_json::to_value(&ti).unwrap(),
            json!({
                "fromDateTime": "2026-01-01",
                "intervalPeriodType": "YEAR",
                "intervalCount": 1,
                "direction": "BACKWARD"
            })
        );
    }

    #[test]
    fn test_member_display_mode_names() {
        let mode: MemberDisplayMode = serde_json::from_value(json!("COMPACT_DISPLAY")).unwrap();
        assert_eq!(mode, MemberDisplayMode::CompactDisplay);
    }
}
