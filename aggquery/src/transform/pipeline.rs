//! Single-query run: validate, execute, interpret, flatten.
//!
//! # Example
//!
//! ```rust,ignore
//! use aggquery::{ApiConfig, HttpExecutor, load_payload_file};
//! use aggquery::transform::{run_query, FlattenOptions};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = HttpExecutor::new(ApiConfig::from_env()?)?;
//!     let payload = load_payload_file("payloads/headcount.json")?;
//!     let options = FlattenOptions::for_payload(&payload.body);
//!
//!     let table = run_query(&executor, &executor.headers(), &payload.body, &options).await?;
//!     println!("{} rows", table.len());
//!     Ok(())
//! }
//! ```

use serde_json::Value;

use crate::client::{check_status, interpret_response, RawResponse, RequestExecutor, RequestHeaders};
use crate::error::QueryResult;
use crate::logs::{log_error_indent, log_info, log_info_indent, log_success};
use crate::validation::validate;
use super::flatten::{flatten, FlatTable, FlattenOptions};

/// Validate `body` and fail with every violation before anything is sent.
pub fn ensure_valid(body: &Value) -> QueryResult<()> {
    let result = validate(body);
    for error in &result.errors {
        log_error_indent(error.to_string(), 1);
    }
    result.into_result()
}

/// Validate and send one query, returning the raw response after its status
/// has been checked.
pub async fn execute_query<E: RequestExecutor>(
    executor: &E,
    headers: &RequestHeaders,
    body: &Value,
) -> QueryResult<RawResponse> {
    ensure_valid(body)?;
    log_info_indent("Payload valid", 1);

    log_info_indent("📡 Sending aggregate query...", 1);
    let raw = executor.execute(body, headers).await?;
    log_info_indent(format!("Response status: {}", raw.status), 1);

    check_status(&raw)?;
    Ok(raw)
}

/// Flatten a successful JSON response.
pub fn flatten_response(raw: &RawResponse, options: &FlattenOptions) -> QueryResult<FlatTable> {
    let cell_set = interpret_response(raw)?;
    log_info_indent(
        format!(
            "Cell set: {} axes, {} measures, {} cells",
            cell_set.axes.len(),
            cell_set.measures.len(),
            cell_set.cells.len()
        ),
        1,
    );
    Ok(flatten(&cell_set, options)?)
}

/// Run one query end to end.
pub async fn run_query<E: RequestExecutor>(
    executor: &E,
    headers: &RequestHeaders,
    body: &Value,
    options: &FlattenOptions,
) -> QueryResult<FlatTable> {
    log_info("🔎 Running aggregate query...");
    let raw = execute_query(executor, headers, body).await?;
    let table = flatten_response(&raw, options)?;
    log_success(format!("{} rows", table.len()));
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::scripted::ScriptedExecutor;
    use crate::error::{QueryError, TransportError};
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "query": {
                "source": { "metric": "employeeCount" },
                "axes": [{
                    "dimensionLevelSelection": {
                        "dimension": { "name": "Country_Cost", "qualifyingPath": "Employee" },
                        "levelIds": ["Country"]
                    }
                }],
                "timeIntervals": {
                    "fromDateTime": "2026-01-01",
                    "intervalPeriodType": "YEAR",
                    "intervalCount": 1,
                    "direction": "BACKWARD"
                }
            }
        })
    }

    fn response() -> Value {
        json!({
            "axes": [{ "dimension": { "name": "Country_Cost" }, "positions": [{ "path": ["US"] }, { "path": ["CA"] }] }],
            "cells": [{ "coordinates": [0], "value": "100" }, { "coordinates": [1], "value": "40" }]
        })
    }

    #[tokio::test]
    async fn test_run_query() {
        let executor = ScriptedExecutor::new().respond_json(response());
        let body = payload();

        let table = run_query(&executor, &RequestHeaders::default(), &body, &FlattenOptions::for_payload(&body))
            .await
            .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].dimensions, vec!["US"]);
        assert_eq!(executor.requests.lock().unwrap()[0], body);
    }

    #[tokio::test]
    async fn test_invalid_payload_is_never_sent() {
        let executor = ScriptedExecutor::new().respond_json(response());
        let mut body = payload();
        body["query"]["axes"] = json!([]);

        let err = run_query(&executor, &RequestHeaders::default(), &body, &FlattenOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::Validation(_)));
        assert_eq!(executor.request_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_errors_surface_verbatim() {
        let executor = ScriptedExecutor::new().respond(400, json!({ "message": "Bad qualifying path" }).to_string());
        let err = run_query(&executor, &RequestHeaders::default(), &payload(), &FlattenOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().contains("Bad qualifying path"));
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let executor = ScriptedExecutor::new().fail(TransportError::Timeout);
        let err = run_query(&executor, &RequestHeaders::default(), &payload(), &FlattenOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Transport(TransportError::Timeout)));
        assert_eq!(executor.request_count(), 1);
    }

    #[tokio::test]
    async fn test_execute_query_returns_raw_body() {
        let executor = ScriptedExecutor::new().respond(200, "Country_Cost,value\nUS,100\n");
        let raw = execute_query(&executor, &RequestHeaders::default(), &payload()).await.unwrap();
        assert!(raw.body.starts_with("Country_Cost"));
    }
}
