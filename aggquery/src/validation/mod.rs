//! Structural validation of aggregate query payloads.
//!
//! [`validate`] walks a wire body (`{ "query": ..., "options": ... }`) and
//! collects every structural violation in one pass. It never contacts the
//! service, so it cannot tell whether a dimension is reachable from the
//! metric; the service reports that later as a 400.
//!
//! # Checks
//!
//! - `query.source`: exactly one of `metric`, `formula`, `metrics`
//! - `query.axes`: non-empty, each entry exactly one recognized variant with
//!   that variant's required fields and no fields owned by another variant
//! - `query.filters`: optional, each entry exactly one filter variant
//! - `query.timeIntervals`: exactly one anchor, period type, count, direction
//! - `options`: recognized keys checked against the embedded
//!   `query-options.json` schema; unknown keys pass through
//!
//! Error paths are dotted with bracketed indices, e.g.
//! `query.axes[0].dimensionLevelSelection.levelIds`.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use aggquery::validation::validate;
//!
//! let result = validate(&json!({ "query": { "source": { "metric": "employeeCount" }, "axes": [] } }));
//! assert!(!result.is_ok());
//! assert!(result.errors_at("query.axes").next().is_some());
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use serde_json::{Map, Value};

use crate::error::{FieldError, ValidationResult};
use crate::models::QueryPayload;

static OPTIONS_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/query-options.json"))
        .expect("Invalid embedded schema")
});

// =============================================================================
// Variant tables
// =============================================================================

/// Axis variants, keyed by their wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AxisKind {
    DimensionLevelSelection,
    DimensionLevelWithUncategorizedValueSelection,
    DimensionLeafMemberSelection,
    DimensionDataMemberSelection,
    NumericRanges,
    DimensionMemberSelection,
    MemberMapSelection,
    SelectionConcept,
    Formula,
}

impl AxisKind {
    const ALL: [AxisKind; 9] = [
        AxisKind::DimensionLevelSelection,
        AxisKind::DimensionLevelWithUncategorizedValueSelection,
        AxisKind::DimensionLeafMemberSelection,
        AxisKind::DimensionDataMemberSelection,
        AxisKind::NumericRanges,
        AxisKind::DimensionMemberSelection,
        AxisKind::MemberMapSelection,
        AxisKind::SelectionConcept,
        AxisKind::Formula,
    ];

    fn tag(self) -> &'static str {
        match self {
            AxisKind::DimensionLevelSelection => "dimensionLevelSelection",
            AxisKind::DimensionLevelWithUncategorizedValueSelection => {
                "dimensionLevelWithUncategorizedValueSelection"
            }
            AxisKind::DimensionLeafMemberSelection => "dimensionLeafMemberSelection",
            AxisKind::DimensionDataMemberSelection => "dimensionDataMemberSelection",
            AxisKind::NumericRanges => "numericRanges",
            AxisKind::DimensionMemberSelection => "dimensionMemberSelection",
            AxisKind::MemberMapSelection => "memberMapSelection",
            AxisKind::SelectionConcept => "selectionConcept",
            AxisKind::Formula => "formula",
        }
    }

    /// Fields the variant body may carry.
    fn fields(self) -> &'static [&'static str] {
        match self {
            AxisKind::DimensionLevelSelection
            | AxisKind::DimensionLevelWithUncategorizedValueSelection => &["dimension", "levelIds"],
            AxisKind::DimensionLeafMemberSelection | AxisKind::DimensionDataMemberSelection => {
                &["dimension"]
            }
            AxisKind::NumericRanges => &[
                "property",
                "ranges",
                "includeAllMember",
                "includeIndependentZeroRange",
            ],
            AxisKind::DimensionMemberSelection => &["dimension", "members"],
            AxisKind::MemberMapSelection => &["memberMap", "targetDimensionName"],
            AxisKind::SelectionConcept => &["name", "qualifyingPath"],
            AxisKind::Formula => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterKind {
    MemberSet,
    SelectionConcept,
    Formula,
}

impl FilterKind {
    const ALL: [FilterKind; 3] = [FilterKind::MemberSet, FilterKind::SelectionConcept, FilterKind::Formula];

    fn tag(self) -> &'static str {
        match self {
            FilterKind::MemberSet => "memberSet",
            FilterKind::SelectionConcept => "selectionConcept",
            FilterKind::Formula => "formula",
        }
    }
}

const SOURCE_VARIANTS: [&str; 3] = ["metric", "formula", "metrics"];
const TIME_ANCHORS: [&str; 3] = ["fromDateTime", "fromInstant", "dynamicDateFrom"];
const PERIOD_TYPES: [&str; 4] = ["YEAR", "MONTH", "WEEK", "DAY"];
const DIRECTIONS: [&str; 2] = ["FORWARD", "BACKWARD"];
const DYNAMIC_ANCHORS: [&str; 2] = ["SOURCE", "COMPLETE_PERIOD"];

// =============================================================================
// Entry points
// =============================================================================

/// Validate a wire body and report every violation found.
///
/// Pure: the same input always yields the same result.
pub fn validate(payload: &Value) -> ValidationResult {
    let mut checker = Checker::default();
    checker.payload(payload);
    ValidationResult { errors: checker.errors }
}

/// Validate a typed payload through its wire form.
pub fn validate_payload(payload: &QueryPayload) -> ValidationResult {
    validate(&payload.to_value())
}

/// Validate a JSON value against a JSON schema (Draft 7).
///
/// Returns every schema error message, or `Ok(())`.
pub fn validate_schema(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick check of an `options` object against the embedded schema.
pub fn is_valid_options(options: &Value) -> bool {
    jsonschema::draft7::is_valid(&OPTIONS_SCHEMA, options)
}

// =============================================================================
// Checker
// =============================================================================

#[derive(Default)]
struct Checker {
    errors: Vec<FieldError>,
}

impl Checker {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(path, message));
    }

    fn payload(&mut self, payload: &Value) {
        let Some(body) = payload.as_object() else {
            self.push("$", "payload must be a JSON object");
            return;
        };

        match body.get("query") {
            Some(Value::Object(query)) => self.query(query),
            Some(_) => self.push("query", "must be an object"),
            None => self.push("query", "missing"),
        }

        match body.get("options") {
            None | Some(Value::Null) => {}
            Some(Value::Object(options)) => self.options(options),
            Some(_) => self.push("options", "must be an object"),
        }
    }

    fn query(&mut self, query: &Map<String, Value>) {
        match query.get("source") {
            Some(Value::Object(source)) => self.source(source),
            Some(_) => self.push("query.source", "must be an object"),
            None => self.push("query.source", "missing (one of metric, formula, metrics is required)"),
        }

        match query.get("axes") {
            Some(Value::Array(axes)) if axes.is_empty() => {
                self.push("query.axes", "is empty (at least one axis is required)")
            }
            Some(Value::Array(axes)) => {
                for (i, axis) in axes.iter().enumerate() {
                    self.axis(&format!("query.axes[{}]", i), axis);
                }
            }
            Some(_) => self.push("query.axes", "must be an array"),
            None => self.push("query.axes", "missing (at least one axis is required)"),
        }

        match query.get("filters") {
            None | Some(Value::Null) => {}
            Some(Value::Array(filters)) => {
                for (i, filter) in filters.iter().enumerate() {
                    self.filter(&format!("query.filters[{}]", i), filter);
                }
            }
            Some(_) => self.push("query.filters", "must be an array"),
        }

        match query.get("timeIntervals") {
            Some(Value::Object(ti)) => self.time_intervals(ti),
            Some(_) => self.push("query.timeIntervals", "must be an object"),
            None => self.push("query.timeIntervals", "missing"),
        }

        match query.get("parameterValues") {
            None | Some(Value::Null) | Some(Value::Array(_)) => {}
            Some(_) => self.push("query.parameterValues", "must be an array"),
        }
    }

    // -------------------------------------------------------------------------
    // Source
    // -------------------------------------------------------------------------

    fn source(&mut self, source: &Map<String, Value>) {
        let present: Vec<&str> = SOURCE_VARIANTS
            .iter()
            .copied()
            .filter(|k| source.get(*k).is_some_and(|v| !v.is_null()))
            .collect();

        match present.as_slice() {
            [] => self.push("query.source", "exactly one of metric, formula, metrics is required"),
            ["metric"] => self.non_empty_str("query.source.metric", &source["metric"]),
            ["formula"] => self.non_empty_str("query.source.formula", &source["formula"]),
            ["metrics"] => self.metric_columns(&source["metrics"]),
            many => self.push(
                "query.source",
                format!("only one of metric, formula, metrics may be set, found {}", many.join(", ")),
            ),
        }
    }

    fn metric_columns(&mut self, metrics: &Value) {
        let path = "query.source.metrics.columns";
        match metrics.get("columns") {
            Some(Value::Array(columns)) if columns.is_empty() => self.push(path, "is empty"),
            Some(Value::Array(columns)) => {
                for (i, column) in columns.iter().enumerate() {
                    let column_path = format!("{}[{}]", path, i);
                    match column.get("id") {
                        Some(id) => self.non_empty_str(&format!("{}.id", column_path), id),
                        None => self.push(format!("{}.id", column_path), "missing"),
                    }
                    if let Some(qp) = column.get("qualifyingPath") {
                        self.optional_str(&format!("{}.qualifyingPath", column_path), qp);
                    }
                }
            }
            Some(_) => self.push(path, "must be an array"),
            None => self.push(path, "missing"),
        }
    }

    // -------------------------------------------------------------------------
    // Axes
    // -------------------------------------------------------------------------

    fn axis(&mut self, path: &str, axis: &Value) {
        let Some(obj) = axis.as_object() else {
            self.push(path, "must be an object");
            return;
        };

        let kinds: Vec<AxisKind> = AxisKind::ALL
            .iter()
            .copied()
            .filter(|k| obj.contains_key(k.tag()))
            .collect();

        let kind = match kinds.as_slice() {
            [kind] => *kind,
            [] => {
                let tags: Vec<&str> = AxisKind::ALL.iter().map(|k| k.tag()).collect();
                self.push(path, format!("must have one of {}", tags.join(", ")));
                return;
            }
            many => {
                let tags: Vec<&str> = many.iter().map(|k| k.tag()).collect();
                self.push(path, format!("mixes axis variants {}", tags.join(", ")));
                return;
            }
        };

        let body_path = format!("{}.{}", path, kind.tag());
        let body = &obj[kind.tag()];

        if kind == AxisKind::Formula {
            self.non_empty_str(&body_path, body);
            return;
        }

        let Some(fields) = body.as_object() else {
            self.push(&body_path, "must be an object");
            return;
        };
        self.foreign_axis_fields(&body_path, kind, fields);

        match kind {
            AxisKind::DimensionLevelSelection | AxisKind::DimensionLevelWithUncategorizedValueSelection => {
                self.reference(&format!("{}.dimension", body_path), fields.get("dimension"));
                self.level_ids(&format!("{}.levelIds", body_path), fields.get("levelIds"));
            }
            AxisKind::DimensionLeafMemberSelection | AxisKind::DimensionDataMemberSelection => {
                self.reference(&format!("{}.dimension", body_path), fields.get("dimension"));
            }
            AxisKind::NumericRanges => {
                self.reference(&format!("{}.property", body_path), fields.get("property"));
                self.ranges(&format!("{}.ranges", body_path), fields.get("ranges"));
                for flag in ["includeAllMember", "includeIndependentZeroRange"] {
                    if let Some(v) = fields.get(flag) {
                        if !v.is_boolean() {
                            self.push(format!("{}.{}", body_path, flag), "must be a boolean");
                        }
                    }
                }
            }
            AxisKind::DimensionMemberSelection => {
                self.reference(&format!("{}.dimension", body_path), fields.get("dimension"));
                self.member_paths(&format!("{}.members", body_path), fields.get("members"), true);
            }
            AxisKind::MemberMapSelection => {
                self.reference(&format!("{}.memberMap", body_path), fields.get("memberMap"));
                let target_path = format!("{}.targetDimensionName", body_path);
                match fields.get("targetDimensionName") {
                    Some(v) => self.non_empty_str(&target_path, v),
                    None => self.push(target_path, "missing"),
                }
            }
            AxisKind::SelectionConcept => self.reference(&body_path, Some(body)),
            AxisKind::Formula => {}
        }
    }

    /// Flag fields that belong to a different axis variant than `kind`.
    fn foreign_axis_fields(&mut self, path: &str, kind: AxisKind, fields: &Map<String, Value>) {
        let own = kind.fields();
        for key in fields.keys() {
            if own.contains(&key.as_str()) {
                continue;
            }
            let owner = AxisKind::ALL
                .iter()
                .find(|other| other.fields().contains(&key.as_str()));
            if let Some(owner) = owner {
                self.push(
                    format!("{}.{}", path, key),
                    format!("belongs to {}, not {}", owner.tag(), kind.tag()),
                );
            }
        }
    }

    fn level_ids(&mut self, path: &str, value: Option<&Value>) {
        match value {
            Some(Value::Array(ids)) if ids.is_empty() => {
                self.push(path, "is empty (at least one level ID required)")
            }
            Some(Value::Array(ids)) => {
                for (i, id) in ids.iter().enumerate() {
                    self.non_empty_str(&format!("{}[{}]", path, i), id);
                }
            }
            Some(_) => self.push(path, "must be an array of level IDs"),
            None => self.push(path, "missing"),
        }
    }

    fn ranges(&mut self, path: &str, value: Option<&Value>) {
        let Some(value) = value else {
            self.push(path, "missing (space-separated bounds)");
            return;
        };
        let Some(ranges) = value.as_str() else {
            self.push(path, "must be a string of space-separated bounds");
            return;
        };
        if ranges.trim().is_empty() {
            self.push(path, "is empty");
            return;
        }
        let bad: Vec<&str> = ranges
            .split_whitespace()
            .filter(|b| b.parse::<f64>().is_err())
            .collect();
        if !bad.is_empty() {
            self.push(path, format!("non-numeric bounds: {}", bad.join(", ")));
        }
    }

    // -------------------------------------------------------------------------
    // Filters
    // -------------------------------------------------------------------------

    fn filter(&mut self, path: &str, filter: &Value) {
        let Some(obj) = filter.as_object() else {
            self.push(path, "must be an object");
            return;
        };

        let kinds: Vec<FilterKind> = FilterKind::ALL
            .iter()
            .copied()
            .filter(|k| obj.contains_key(k.tag()))
            .collect();

        let kind = match kinds.as_slice() {
            [kind] => *kind,
            [] => {
                self.push(path, "must have one of memberSet, selectionConcept, formula");
                return;
            }
            many => {
                let tags: Vec<&str> = many.iter().map(|k| k.tag()).collect();
                self.push(path, format!("mixes filter variants {}", tags.join(", ")));
                return;
            }
        };

        let body_path = format!("{}.{}", path, kind.tag());
        let body = &obj[kind.tag()];

        match kind {
            FilterKind::MemberSet => self.member_set(&body_path, body),
            FilterKind::SelectionConcept => self.reference(&body_path, Some(body)),
            FilterKind::Formula => self.non_empty_str(&body_path, body),
        }
    }

    fn member_set(&mut self, path: &str, body: &Value) {
        let Some(fields) = body.as_object() else {
            self.push(path, "must be an object");
            return;
        };
        self.reference(&format!("{}.dimension", path), fields.get("dimension"));

        let values_path = format!("{}.values", path);
        let Some(values) = fields.get("values").and_then(Value::as_object) else {
            self.push(values_path, "missing (an object with included and/or excluded members)");
            return;
        };

        let mut any = false;
        for side in ["included", "excluded"] {
            if let Some(list) = values.get(side) {
                if list.as_array().is_some_and(|l| !l.is_empty()) {
                    any = true;
                }
                self.member_paths(&format!("{}.{}", values_path, side), Some(list), false);
            }
        }
        if !any {
            self.push(values_path, "needs at least one included or excluded member");
        }
    }

    // -------------------------------------------------------------------------
    // Time
    // -------------------------------------------------------------------------

    fn time_intervals(&mut self, ti: &Map<String, Value>) {
        let path = "query.timeIntervals";
        let anchors: Vec<&str> = TIME_ANCHORS
            .iter()
            .copied()
            .filter(|k| ti.get(*k).is_some_and(|v| !v.is_null()))
            .collect();

        match anchors.as_slice() {
            [] => self.push(path, "exactly one of fromDateTime, fromInstant, dynamicDateFrom is required"),
            ["fromDateTime"] => self.date_time(&format!("{}.fromDateTime", path), &ti["fromDateTime"]),
            ["fromInstant"] => self.instant(&format!("{}.fromInstant", path), &ti["fromInstant"]),
            ["dynamicDateFrom"] => self.one_of(
                &format!("{}.dynamicDateFrom", path),
                Some(&ti["dynamicDateFrom"]),
                &DYNAMIC_ANCHORS,
            ),
            many => self.push(
                path,
                format!("only one time anchor may be set, found {}", many.join(", ")),
            ),
        }

        self.one_of(
            &format!("{}.intervalPeriodType", path),
            ti.get("intervalPeriodType"),
            &PERIOD_TYPES,
        );

        let counts: Vec<&str> = ["intervalCount", "intervalPeriodCount"]
            .into_iter()
            .filter(|k| ti.contains_key(*k))
            .collect();
        if counts.is_empty() {
            self.push(format!("{}.intervalCount", path), "missing");
        }
        for key in counts {
            let positive = ti[key].as_u64().is_some_and(|n| n > 0);
            if !positive {
                self.push(format!("{}.{}", path, key), "must be a positive integer");
            }
        }

        self.one_of(&format!("{}.direction", path), ti.get("direction"), &DIRECTIONS);
    }

    fn date_time(&mut self, path: &str, value: &Value) {
        let Some(s) = value.as_str() else {
            self.push(path, "must be a date string");
            return;
        };
        let parses = NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
            || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
            || DateTime::parse_from_rfc3339(s).is_ok();
        if !parses {
            self.push(path, format!("'{}' is not a date (expected YYYY-MM-DD)", s));
        }
    }

    /// Instants are epoch milliseconds, as a number or a numeric string.
    fn instant(&mut self, path: &str, value: &Value) {
        let ok = match value {
            Value::Number(n) => n.as_i64().is_some(),
            Value::String(s) => s.trim().parse::<i64>().is_ok(),
            _ => false,
        };
        if !ok {
            self.push(path, "must be epoch milliseconds");
        }
    }

    // -------------------------------------------------------------------------
    // Options
    // -------------------------------------------------------------------------

    fn options(&mut self, options: &Map<String, Value>) {
        let Some(known) = OPTIONS_SCHEMA.get("properties").and_then(Value::as_object) else {
            return;
        };
        for (key, value) in options {
            let Some(schema) = known.get(key) else {
                continue;
            };
            if let Err(messages) = validate_schema(schema, value) {
                for message in messages {
                    self.push(format!("options.{}", key), message);
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Shared shapes
    // -------------------------------------------------------------------------

    /// `{ "name": ..., "qualifyingPath": ... }`
    fn reference(&mut self, path: &str, value: Option<&Value>) {
        let Some(value) = value else {
            self.push(path, "missing");
            return;
        };
        let Some(obj) = value.as_object() else {
            self.push(path, "must be an object with a name");
            return;
        };
        match obj.get("name") {
            Some(name) => self.non_empty_str(&format!("{}.name", path), name),
            None => self.push(format!("{}.name", path), "missing"),
        }
        if let Some(qp) = obj.get("qualifyingPath") {
            self.optional_str(&format!("{}.qualifyingPath", path), qp);
        }
    }

    /// `[{ "path": [...] }, ...]`
    fn member_paths(&mut self, path: &str, value: Option<&Value>, required: bool) {
        let members = match value {
            Some(Value::Array(members)) => members,
            Some(_) => {
                self.push(path, "must be an array of member paths");
                return;
            }
            None => {
                if required {
                    self.push(path, "missing");
                }
                return;
            }
        };
        if required && members.is_empty() {
            self.push(path, "is empty (at least one member required)");
        }
        for (i, member) in members.iter().enumerate() {
            let member_path = format!("{}[{}].path", path, i);
            match member.get("path") {
                Some(Value::Array(p)) if !p.is_empty() && p.iter().all(Value::is_string) => {}
                Some(_) => self.push(member_path, "must be a non-empty array of strings"),
                None => self.push(member_path, "missing"),
            }
        }
    }

    fn one_of(&mut self, path: &str, value: Option<&Value>, allowed: &[&str]) {
        match value.and_then(Value::as_str) {
            Some(s) if allowed.contains(&s) => {}
            Some(s) => self.push(path, format!("'{}' is not one of {}", s, allowed.join(", "))),
            None if value.is_some() => self.push(path, "must be a string"),
            None => self.push(path, format!("missing (one of {})", allowed.join(", "))),
        }
    }

    fn non_empty_str(&mut self, path: &str, value: &Value) {
        match value.as_str() {
            Some(s) if !s.trim().is_empty() => {}
            Some(_) => self.push(path, "is empty"),
            None => self.push(path, "must be a string"),
        }
    }

    fn optional_str(&mut self, path: &str, value: &Value) {
        if !value.is_null() && !value.is_string() {
            self.push(path, "must be a string");
        }
    }
}
