//! Payload documents: loading, unwrapping and option merging.
//!
//! Payload files may hold the wire body at the root or wrapped in an
//! envelope with a free-text description:
//!
//! ```json
//! {
//!   "description": "Headcount by country, last year",
//!   "payload": { "query": { ... }, "options": { ... } }
//! }
//! ```
//!
//! [`normalize`] extracts the inner body exactly as written. Nothing is
//! renamed and no defaults are injected into what goes on the wire.

pub mod builder;

use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::error::{PayloadError, PayloadResult};

pub use builder::{
    dimension_axis, formula_axis, formula_filter, leaf_member_axis, member_map_axis,
    member_selection_axis, member_set_filter, numeric_ranges_axis, selection_concept_axis,
    selection_concept_filter, time_axis, QueryPayloadBuilder, DEFAULT_QUALIFYING_PATH,
};

/// Key of the optional envelope around the wire body.
pub const ENVELOPE_KEY: &str = "payload";

/// Key of the envelope's free-text description.
pub const DESCRIPTION_KEY: &str = "description";

/// A payload document after unwrapping.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPayload {
    /// Envelope description, if the document had one.
    pub description: Option<String>,
    /// Wire body, untouched.
    pub body: Value,
}

impl LoadedPayload {
    /// `query.source.metric`, or the first `metrics` column id.
    pub fn metric_id(&self) -> Option<&str> {
        let source = self.body.get("query")?.get("source")?;
        source.get("metric").and_then(Value::as_str).or_else(|| {
            source
                .get("metrics")?
                .get("columns")?
                .get(0)?
                .get("id")?
                .as_str()
        })
    }

    /// The wire `options` object, if present.
    pub fn options(&self) -> Option<&Map<String, Value>> {
        self.body.get("options").and_then(Value::as_object)
    }
}

/// Unwrap a raw document into its wire body.
///
/// A document with a `payload` key yields that object; any other object is
/// taken as the body itself.
pub fn normalize(raw: Value) -> PayloadResult<LoadedPayload> {
    let Value::Object(mut document) = raw else {
        return Err(PayloadError::NotAnObject { what: "payload document".to_string() });
    };

    if !document.contains_key(ENVELOPE_KEY) {
        return Ok(LoadedPayload {
            description: None,
            body: Value::Object(document),
        });
    }

    let description = document
        .get(DESCRIPTION_KEY)
        .and_then(Value::as_str)
        .map(String::from);

    match document.remove(ENVELOPE_KEY) {
        Some(inner @ Value::Object(_)) => Ok(LoadedPayload { description, body: inner }),
        _ => Err(PayloadError::NotAnObject { what: "'payload'".to_string() }),
    }
}

/// Read and normalize a payload file.
pub fn load_payload_file(path: impl AsRef<Path>) -> PayloadResult<LoadedPayload> {
    let content = fs::read_to_string(path.as_ref())?;
    let raw: Value = serde_json::from_str(&content)?;
    normalize(raw)
}

/// Merge two option maps, last write wins per top-level key.
///
/// Nested objects such as `sort` or `internal` are replaced whole, not merged.
pub fn merge_options(base: &Map<String, Value>, overrides: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn body() -> Value {
        json!({
            "query": {
                "source": { "metric": "employeeCount" },
                "axes": [{ "selectionConcept": { "name": "isManager" } }],
                "timeIntervals": { "dynamicDateFrom": "SOURCE" }
            },
            "options": { "zeroVisibility": "ELIMINATE" }
        })
    }

    #[test]
    fn test_envelope_is_unwrapped_verbatim() {
        let doc = json!({ "description": "Managers", "payload": body() });
        let loaded = normalize(doc).unwrap();

        assert_eq!(loaded.description.as_deref(), Some("Managers"));
        assert_eq!(loaded.body, body());
        assert_eq!(loaded.metric_id(), Some("employeeCount"));
    }

    #[test]
    fn test_bare_body_passes_through() {
        let loaded = normalize(body()).unwrap();
        assert!(loaded.description.is_none());
        assert_eq!(loaded.body, body());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(matches!(
            normalize(json!([1, 2])),
            Err(PayloadError::NotAnObject { .. })
        ));
        assert!(matches!(
            normalize(json!({ "payload": "nope" })),
            Err(PayloadError::NotAnObject { .. })
        ));
    }

    #[test]
    fn test_metric_id_from_metrics_columns() {
        let loaded = normalize(json!({
            "query": { "source": { "metrics": { "columns": [{ "id": "first" }, { "id": "second" }] } } }
        }))
        .unwrap();
        assert_eq!(loaded.metric_id(), Some("first"));
    }

    #[test]
    fn test_load_payload_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", json!({ "payload": body() })).unwrap();

        let loaded = load_payload_file(file.path()).unwrap();
        assert_eq!(loaded.body, body());
        assert_eq!(loaded.options().unwrap()["zeroVisibility"], "ELIMINATE");
    }

    #[test]
    fn test_load_payload_file_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(load_payload_file(file.path()), Err(PayloadError::Json(_))));
    }

    #[test]
    fn test_merge_options_last_write_wins() {
        let base = json!({ "zeroVisibility": "SHOW", "calendarType": "TENANT_CALENDAR", "sort": { "sortType": "X" } });
        let over = json!({ "zeroVisibility": "ELIMINATE", "sort": { "sortDirection": "DESC" } });

        let merged = merge_options(base.as_object().unwrap(), over.as_object().unwrap());

        assert_eq!(merged["zeroVisibility"], "ELIMINATE");
        assert_eq!(merged["calendarType"], "TENANT_CALENDAR");
        assert_eq!(merged["sort"], json!({ "sortDirection": "DESC" }));
    }
}
