//! Un-pivot a [`CellSet`] into flat rows.
//!
//! Each cell becomes exactly one [`FlatRow`], in the order the cells appear
//! in the response. Combinations missing from `cells` stay missing, and
//! nothing is sorted or truncated here: zero suppression, sorting and limits
//! are applied by the service.
//!
//! # Columns
//!
//! 1. One column per non-time axis, in response axis order
//! 2. The time axis (`DateInRange`)
//! 3. `value`, or one column per measure when the source is `metrics`
//! 4. `support`, when any cell carries one
//! 5. `metric`, `metric_id` on tables merged from several queries
//!
//! # Example
//!
//! ```rust,ignore
//! use aggquery::transform::{flatten, FlattenOptions};
//!
//! let table = flatten(&cell_set, &FlattenOptions::default())?;
//! for row in &table.rows {
//!     println!("{:?} = {:?}", row.dimensions, row.values);
//! }
//! ```

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{FlattenError, FlattenResult};
use crate::models::cellset::{parse_count, parse_number};
use crate::models::{Axis, Cell, CellSet, MemberDisplayMode};
use super::labels::{display_mode, member_label, year_end_label};

/// Header of the single value column.
pub const VALUE_COLUMN: &str = "value";
pub const SUPPORT_COLUMN: &str = "support";
pub const METRIC_COLUMN: &str = "metric";
pub const METRIC_ID_COLUMN: &str = "metric_id";

// =============================================================================
// Options
// =============================================================================

/// How labels are produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenOptions {
    pub display_mode: MemberDisplayMode,
    /// Relabel time members to the 31 December of their year.
    pub year_end_dates: bool,
    /// Column names of the requested axes, used when the response does not
    /// name a dimension. Matched in order against the non-time axes.
    pub axis_names: Vec<Option<String>>,
}

impl FlattenOptions {
    /// Options matching a wire body: display mode from `options`, fallback
    /// names from `query.axes`.
    pub fn for_payload(body: &Value) -> Self {
        let axis_names = body
            .pointer("/query/axes")
            .and_then(Value::as_array)
            .map(|axes| {
                axes.iter()
                    .map(|a| {
                        serde_json::from_value::<Axis>(a.clone())
                            .ok()
                            .and_then(|axis| axis.column_name().map(String::from))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            display_mode: display_mode(body.get("options").and_then(Value::as_object)),
            year_end_dates: false,
            axis_names,
        }
    }

    pub fn with_year_end_dates(mut self, enabled: bool) -> Self {
        self.year_end_dates = enabled;
        self
    }
}

// =============================================================================
// Rows and tables
// =============================================================================

/// Provenance of a row in a merged multi-metric table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricTag {
    /// Display label of the metric entry.
    pub label: String,
    /// Metric id the entry queried.
    pub id: String,
}

/// One output record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatRow {
    /// One label per dimension column.
    pub dimensions: Vec<String>,
    /// One value per value column; `None` for empty or non-numeric cells.
    pub values: Vec<Option<f64>>,
    pub support: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<MetricTag>,
}

impl FlatRow {
    /// A copy of this row attributed to a metric entry.
    pub fn tagged(&self, tag: &MetricTag) -> Self {
        Self {
            metric: Some(tag.clone()),
            ..self.clone()
        }
    }
}

/// Aggregate of one value column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueSummary {
    pub column: String,
    /// Rows with a value.
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub sum: f64,
    pub mean: Option<f64>,
}

/// Flattened result with its column layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatTable {
    pub dimension_columns: Vec<String>,
    pub value_columns: Vec<String>,
    pub has_support: bool,
    /// Whether rows carry `metric` / `metric_id`.
    pub tagged: bool,
    pub rows: Vec<FlatRow>,
}

impl FlatTable {
    /// Column headers in output order.
    pub fn headers(&self) -> Vec<String> {
        let mut headers = self.dimension_columns.clone();
        headers.extend(self.value_columns.iter().cloned());
        if self.has_support {
            headers.push(SUPPORT_COLUMN.to_string());
        }
        if self.tagged {
            headers.push(METRIC_COLUMN.to_string());
            headers.push(METRIC_ID_COLUMN.to_string());
        }
        headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Count, min, max, sum and mean of every value column.
    pub fn value_summary(&self) -> Vec<ValueSummary> {
        self.value_columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let values: Vec<f64> = self
                    .rows
                    .iter()
                    .filter_map(|r| r.values.get(i).copied().flatten())
                    .collect();
                let sum: f64 = values.iter().sum();
                ValueSummary {
                    column: column.clone(),
                    count: values.len(),
                    min: values.iter().copied().reduce(f64::min),
                    max: values.iter().copied().reduce(f64::max),
                    sum,
                    mean: (!values.is_empty()).then(|| sum / values.len() as f64),
                }
            })
            .collect()
    }

    /// Rows as JSON records keyed by header.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = Map::new();
                for (column, label) in self.dimension_columns.iter().zip(&row.dimensions) {
                    record.insert(column.clone(), Value::String(label.clone()));
                }
                for (column, value) in self.value_columns.iter().zip(&row.values) {
                    let value = value.map(Value::from).unwrap_or(Value::Null);
                    record.insert(column.clone(), value);
                }
                if self.has_support {
                    record.insert(
                        SUPPORT_COLUMN.to_string(),
                        row.support.map(Value::from).unwrap_or(Value::Null),
                    );
                }
                if let Some(tag) = row.metric.as_ref().filter(|_| self.tagged) {
                    record.insert(METRIC_COLUMN.to_string(), Value::String(tag.label.clone()));
                    record.insert(METRIC_ID_COLUMN.to_string(), Value::String(tag.id.clone()));
                }
                record
            })
            .collect()
    }
}

// =============================================================================
// Flattening
// =============================================================================

/// Flatten a cell set, one row per cell in cell order.
///
/// An axis with no positions or an empty `cells` array gives an empty table.
/// A cell whose coordinates do not match the axes fails the whole call.
pub fn flatten(cell_set: &CellSet, options: &FlattenOptions) -> FlattenResult<FlatTable> {
    // Non-time axes first, then the time axis.
    let order: Vec<usize> = (0..cell_set.axes.len())
        .filter(|&i| !cell_set.axes[i].is_time_axis())
        .chain((0..cell_set.axes.len()).filter(|&i| cell_set.axes[i].is_time_axis()))
        .collect();

    let mut table = FlatTable {
        dimension_columns: column_names(cell_set, &order, options),
        value_columns: value_columns(cell_set),
        has_support: cell_set
            .cells
            .iter()
            .any(|c| c.support.as_ref().is_some_and(|s| !s.is_null())),
        tagged: false,
        rows: Vec::new(),
    };

    if cell_set.axes.iter().any(|a| a.positions.is_empty()) {
        return Ok(table);
    }

    let labels: Vec<Vec<String>> = cell_set
        .axes
        .iter()
        .map(|axis| {
            axis.positions
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let label = member_label(p, options.display_mode, i);
                    if options.year_end_dates && axis.is_time_axis() {
                        year_end_label(&label).unwrap_or(label)
                    } else {
                        label
                    }
                })
                .collect()
        })
        .collect();

    let measure_count = table.value_columns.len();
    table.rows.reserve(cell_set.cells.len());

    for (index, cell) in cell_set.cells.iter().enumerate() {
        check_coordinates(index, cell, cell_set)?;

        let dimensions = order
            .iter()
            .map(|&axis| labels[axis][cell.coordinates[axis]].clone())
            .collect();

        table.rows.push(FlatRow {
            dimensions,
            values: cell_values(index, cell, measure_count)?,
            support: cell.support.as_ref().and_then(parse_count),
            metric: None,
        });
    }

    Ok(table)
}

fn check_coordinates(index: usize, cell: &Cell, cell_set: &CellSet) -> FlattenResult<()> {
    if cell.coordinates.len() != cell_set.axes.len() {
        return Err(FlattenError::CoordinateCount {
            cell: index,
            expected: cell_set.axes.len(),
            found: cell.coordinates.len(),
        });
    }
    for (axis, (&position, def)) in cell.coordinates.iter().zip(&cell_set.axes).enumerate() {
        if position >= def.positions.len() {
            return Err(FlattenError::CoordinateOutOfRange {
                cell: index,
                axis,
                index: position,
                len: def.positions.len(),
            });
        }
    }
    Ok(())
}

fn cell_values(index: usize, cell: &Cell, measure_count: usize) -> FlattenResult<Vec<Option<f64>>> {
    if measure_count > 1 {
        let values = cell.values.as_deref().unwrap_or_default();
        if values.len() != measure_count {
            return Err(FlattenError::ValueCount {
                cell: index,
                expected: measure_count,
                found: values.len(),
            });
        }
        return Ok(values.iter().map(parse_number).collect());
    }

    let value = cell
        .value
        .as_ref()
        .or_else(|| cell.values.as_ref().and_then(|v| v.first()))
        .and_then(parse_number);
    Ok(vec![value])
}

/// One value column per measure for multi-column sources, else `value`.
fn value_columns(cell_set: &CellSet) -> Vec<String> {
    if cell_set.measures.len() <= 1 {
        return vec![VALUE_COLUMN.to_string()];
    }
    cell_set
        .measures
        .iter()
        .enumerate()
        .map(|(i, m)| {
            m.id.clone()
                .or_else(|| m.display_name.clone())
                .unwrap_or_else(|| format!("{}_{}", VALUE_COLUMN, i))
        })
        .collect()
}

fn column_names(cell_set: &CellSet, order: &[usize], options: &FlattenOptions) -> Vec<String> {
    let mut requested = options.axis_names.iter();
    let mut names: Vec<String> = Vec::with_capacity(order.len());

    for &i in order {
        let axis = &cell_set.axes[i];
        let fallback = if axis.is_time_axis() {
            None
        } else {
            requested.next().cloned().flatten()
        };
        let base = axis
            .dimension
            .as_ref()
            .map(|d| d.name.clone())
            .filter(|n| !n.is_empty())
            .or(fallback)
            .unwrap_or_else(|| format!("Dimension_{}", i));

        let mut name = base.clone();
        let mut n = 2;
        while names.contains(&name) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        names.push(name);
    }
    names
}
