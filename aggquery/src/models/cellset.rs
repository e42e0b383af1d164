//! Cell set returned by the aggregate endpoint.
//!
//! A cell set is a sparse cube: each axis lists its member positions, and
//! each cell points at one position per axis through `coordinates`.
//! Missing combinations are simply absent from `cells`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::DimensionRef;

/// Name the service gives the implicit time axis.
pub const TIME_AXIS_NAME: &str = "DateInRange";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CellSet {
    #[serde(default)]
    pub axes: Vec<CellSetAxis>,
    #[serde(default)]
    pub measures: Vec<Measure>,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CellSetAxis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<DimensionRef>,
    #[serde(default)]
    pub positions: Vec<Position>,
}

impl CellSetAxis {
    /// Whether this axis is the implicit time-in-range axis.
    pub fn is_time_axis(&self) -> bool {
        self.dimension
            .as_ref()
            .is_some_and(|d| d.name == TIME_AXIS_NAME)
    }
}

/// One member of an axis, in the label forms the service returns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Member path from the dimension root, most specific element last.
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub display_name_path: Vec<String>,
}

impl Position {
    pub fn with_path<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

/// One requested metric column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cell {
    /// One position index per axis.
    #[serde(default)]
    pub coordinates: Vec<usize>,
    /// Single-metric value; the service sends numbers as strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// One value per measure when the query has a `metrics` source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support: Option<Value>,
}

/// Read a numeric cell field that may arrive as a number or a string.
/// Empty strings and nulls are `None`.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Support counts are whole numbers; fractional strings are rejected.
pub fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_wire_cellset() {
        let cs: CellSet = serde_json::from_value(json!({
            "cells": [{ "value": "100", "support": "12", "coordinates": [0, 1] }],
            "axes": [
                {
                    "dimension": { "name": "Country_Cost", "qualifyingPath": "Employee" },
                    "positions": [{ "path": ["North America", "US"], "displayName": "United States" }]
                },
                {
                    "dimension": { "name": "DateInRange" },
                    "positions": [{ "path": ["2025-01-01T00:00:00.000Z - [0]"] }]
                }
            ]
        }))
        .unwrap();

        assert_eq!(cs.axes.len(), 2);
        assert!(cs.measures.is_empty());
        assert!(!cs.axes[0].is_time_axis());
        assert!(cs.axes[1].is_time_axis());
        assert_eq!(cs.cells[0].coordinates, vec![0, 1]);
        assert_eq!(cs.axes[0].positions[0].display_name.as_deref(), Some("United States"));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(&json!("42.5")), Some(42.5));
        assert_eq!(parse_number(&json!(7)), Some(7.0));
        assert_eq!(parse_number(&json!("")), None);
        assert_eq!(parse_number(&Value::Null), None);
        assert_eq!(parse_number(&json!("n/a")), None);
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count(&json!("12")), Some(12));
        assert_eq!(parse_count(&json!(3)), Some(3));
        assert_eq!(parse_count(&json!("1.5")), None);
    }
}
