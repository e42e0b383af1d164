//! Programmatic constructors for axes, filters and whole payloads.
//!
//! Everything built here passes [`crate::validation::validate`] when given
//! well-formed arguments.
//!
//! ```rust,ignore
//! use aggquery::payload::{dimension_axis, member_set_filter, QueryPayloadBuilder};
//! use aggquery::models::{QuerySource, TimeIntervals, PeriodType, Direction};
//!
//! let payload = QueryPayloadBuilder::new(QuerySource::metric("employeeCount"))
//!     .axis(dimension_axis("Country_Cost", Some("Employee"), Some(vec!["Country".into()])))
//!     .filter(member_set_filter("Function", Some("Employee"), &["Engineering"], &[]))
//!     .time_intervals(TimeIntervals::from_date("2026-01-01", PeriodType::Year, 1, Direction::Backward))
//!     .build()?;
//! ```

use serde_json::Value;

use crate::error::{FieldError, QueryError, QueryResult, ValidationResult};
use crate::models::{
    AggregationQuery, Axis, ConceptRef, DimensionRef, Filter, LeafMemberSelection, LevelSelection,
    MemberMapSelection, MemberPath, MemberSelection, MemberSet, MemberValues, NumericRanges,
    QueryOptions, QueryPayload, QuerySource, TimeIntervals,
};

/// Qualifying path most people-analytics dimensions hang off.
pub const DEFAULT_QUALIFYING_PATH: &str = "Employee";

/// Levelled dimension axis. Without `level_ids` the dimension name doubles as
/// its only level, which is how flat dimensions are queried.
pub fn dimension_axis(name: &str, qualifying_path: Option<&str>, level_ids: Option<Vec<String>>) -> Axis {
    Axis::DimensionLevelSelection(LevelSelection {
        dimension: DimensionRef::new(name, qualifying_path),
        level_ids: level_ids.unwrap_or_else(|| vec![name.to_string()]),
    })
}

/// Time dimension axis, e.g. `time_axis("Time", "FISCAL_YEAR")`. Time has no
/// qualifying path.
pub fn time_axis(name: &str, level_id: &str) -> Axis {
    dimension_axis(name, None, Some(vec![level_id.to_string()]))
}

/// All leaf members of a ranged dimension.
pub fn leaf_member_axis(name: &str, qualifying_path: Option<&str>) -> Axis {
    Axis::DimensionLeafMemberSelection(LeafMemberSelection {
        dimension: DimensionRef::new(name, qualifying_path),
    })
}

/// Bucket a numeric property by space-separated bounds.
pub fn numeric_ranges_axis(property: &str, qualifying_path: Option<&str>, bounds: &[f64]) -> Axis {
    let ranges = bounds
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    Axis::NumericRanges(NumericRanges {
        property: DimensionRef::new(property, qualifying_path),
        ranges,
        include_all_member: None,
        include_independent_zero_range: None,
    })
}

/// Explicit members of a dimension, each given by its path.
pub fn member_selection_axis(name: &str, qualifying_path: Option<&str>, members: Vec<Vec<String>>) -> Axis {
    Axis::DimensionMemberSelection(MemberSelection {
        dimension: DimensionRef::new(name, qualifying_path),
        members: members.into_iter().map(MemberPath::new).collect(),
    })
}

pub fn member_map_axis(map_name: &str, qualifying_path: Option<&str>, target_dimension: &str) -> Axis {
    Axis::MemberMapSelection(MemberMapSelection {
        member_map: DimensionRef::new(map_name, qualifying_path),
        target_dimension_name: target_dimension.to_string(),
    })
}

pub fn selection_concept_axis(name: &str, qualifying_path: Option<&str>) -> Axis {
    Axis::SelectionConcept(ConceptRef::new(name, qualifying_path))
}

pub fn formula_axis(formula: &str) -> Axis {
    Axis::Formula(formula.to_string())
}

/// Member set filter. Each member is a single-element path; empty lists are
/// left out of the wire object.
pub fn member_set_filter(
    name: &str,
    qualifying_path: Option<&str>,
    included: &[&str],
    excluded: &[&str],
) -> Filter {
    let paths = |members: &[&str]| -> Vec<MemberPath> {
        members.iter().map(|m| MemberPath::new([*m])).collect()
    };
    Filter::MemberSet(MemberSet {
        dimension: DimensionRef::new(name, qualifying_path),
        values: MemberValues {
            included: paths(included),
            excluded: paths(excluded),
        },
    })
}

/// Selection concept filter, e.g. `isManager`.
pub fn selection_concept_filter(name: &str, qualifying_path: Option<&str>) -> Filter {
    Filter::SelectionConcept(ConceptRef::new(name, qualifying_path))
}

pub fn formula_filter(formula: &str) -> Filter {
    Filter::Formula(formula.to_string())
}

impl QueryPayload {
    pub fn builder(source: QuerySource) -> QueryPayloadBuilder {
        QueryPayloadBuilder::new(source)
    }
}

/// Assembles a [`QueryPayload`] step by step.
#[derive(Debug, Clone)]
pub struct QueryPayloadBuilder {
    source: QuerySource,
    axes: Vec<Axis>,
    filters: Vec<Filter>,
    time_intervals: Option<TimeIntervals>,
    parameter_values: Option<Vec<Value>>,
    options: QueryOptions,
}

impl QueryPayloadBuilder {
    pub fn new(source: QuerySource) -> Self {
        Self {
            source,
            axes: Vec::new(),
            filters: Vec::new(),
            time_intervals: None,
            parameter_values: None,
            options: QueryOptions::new(),
        }
    }

    pub fn axis(mut self, axis: Axis) -> Self {
        self.axes.push(axis);
        self
    }

    pub fn axes(mut self, axes: impl IntoIterator<Item = Axis>) -> Self {
        self.axes.extend(axes);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn time_intervals(mut self, time_intervals: TimeIntervals) -> Self {
        self.time_intervals = Some(time_intervals);
        self
    }

    pub fn parameter_values(mut self, values: Vec<Value>) -> Self {
        self.parameter_values = Some(values);
        self
    }

    /// Set one option, replacing any earlier value for the key.
    pub fn option(mut self, key: &str, value: Value) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }

    pub fn options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Finish the payload. Aggregate queries need at least one axis and a
    /// time window.
    pub fn build(self) -> QueryResult<QueryPayload> {
        let mut errors = Vec::new();
        if self.axes.is_empty() {
            errors.push(FieldError::new("query.axes", "at least one axis is required"));
        }
        if self.time_intervals.is_none() {
            errors.push(FieldError::new("query.timeIntervals", "required"));
        }

        match self.time_intervals {
            Some(time_intervals) if errors.is_empty() => Ok(QueryPayload {
                query: AggregationQuery {
                    source: self.source,
                    axes: self.axes,
                    filters: self.filters,
                    time_intervals,
                    parameter_values: self.parameter_values,
                },
                options: self.options,
            }),
            _ => Err(QueryError::Validation(ValidationResult { errors })),
        }
    }
}
