//! Multi-metric runs: one query per metric entry, merged into one table.
//!
//! Every entry shares the axes, time intervals and options of
//! [`MultiMetricConfig::shared`] and brings its own metric and filters. Runs
//! move through [`RunState`]:
//!
//! ```text
//! Idle → BuildingPayloads → Executing(i) → Flattening(i) → Accumulating(i) → … → Done
//!                    │                │               │
//!                    └────────────────┴───────────────┴──→ Aborted
//! ```
//!
//! All payloads are built and validated before the first request, so a bad
//! entry stops the run with nothing sent. Entries then run one after the
//! other; rows keep their per-entry block order and are tagged with the
//! entry's label and metric id.
//!
//! What happens when an entry fails remotely is chosen by [`FailurePolicy`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

use crate::client::{RequestExecutor, RequestHeaders};
use crate::error::{OrchestratorError, OrchestratorResult, PayloadResult, QueryError};
use crate::logs::{log_error, log_info, log_info_indent, log_success, log_warning};
use crate::payload::merge_options;
use crate::validation::validate;
use super::flatten::{FlatTable, FlattenOptions, MetricTag};
use super::pipeline::{execute_query, flatten_response};

// =============================================================================
// Configuration
// =============================================================================

/// Query parts common to every entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedQuery {
    #[serde(default)]
    pub axes: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_intervals: Option<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

/// One metric to query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    /// Metric id.
    pub metric: String,
    /// Display label; defaults to the metric id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub filters: Vec<Value>,
    /// Merged over the shared options, last write wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
}

impl MetricEntry {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.metric)
    }

    fn tag(&self) -> MetricTag {
        MetricTag {
            label: self.label().to_string(),
            id: self.metric.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiMetricConfig {
    pub shared: SharedQuery,
    pub metrics: Vec<MetricEntry>,
}

impl MultiMetricConfig {
    pub fn from_file(path: impl AsRef<Path>) -> PayloadResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Wire body for one entry.
    ///
    /// Shared fields are copied as written; absent ones stay absent so the
    /// validator reports them.
    pub fn build_payload(&self, entry: &MetricEntry) -> Value {
        let mut query = Map::new();
        query.insert("source".into(), json!({ "metric": entry.metric }));
        query.insert("axes".into(), Value::Array(self.shared.axes.clone()));
        query.insert("filters".into(), Value::Array(entry.filters.clone()));
        if let Some(ti) = &self.shared.time_intervals {
            query.insert("timeIntervals".into(), ti.clone());
        }

        let options = match &entry.options {
            Some(overrides) => merge_options(&self.shared.options, overrides),
            None => self.shared.options.clone(),
        };

        json!({ "query": query, "options": options })
    }
}

// =============================================================================
// Run state
// =============================================================================

/// Where a multi-metric run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "entry", rename_all = "camelCase")]
pub enum RunState {
    Idle,
    BuildingPayloads,
    Executing(usize),
    Flattening(usize),
    Accumulating(usize),
    Done,
    Aborted,
}

/// Reaction to an entry that fails remotely or while flattening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop the run and return the failure.
    #[default]
    AbortOnFirstFailure,
    /// Skip the entry, keep going, list it in [`MultiMetricReport::failures`].
    ContinueAndReport,
}

/// An entry skipped under [`FailurePolicy::ContinueAndReport`].
#[derive(Debug)]
pub struct EntryFailure {
    pub index: usize,
    pub metric: String,
    pub label: String,
    pub error: QueryError,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct MultiMetricReport {
    /// Merged, tagged rows in entry order.
    pub table: FlatTable,
    /// Entries that were skipped; empty unless continuing on failure.
    pub failures: Vec<EntryFailure>,
    /// Entries that contributed to `table`, empty results included.
    pub succeeded: usize,
}

impl MultiMetricReport {
    /// `true` when every entry ran.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives one multi-metric run and records its state transitions.
#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    policy: FailurePolicy,
    year_end_dates: bool,
    history: Vec<RunState>,
}

impl Orchestrator {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            year_end_dates: false,
            history: vec![RunState::Idle],
        }
    }

    pub fn with_year_end_dates(mut self, enabled: bool) -> Self {
        self.year_end_dates = enabled;
        self
    }

    pub fn state(&self) -> RunState {
        self.history.last().copied().unwrap_or(RunState::Idle)
    }

    /// Every state entered so far, starting at `Idle`.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    fn enter(&mut self, state: RunState) {
        self.history.push(state);
    }

    pub async fn run<E: RequestExecutor>(
        &mut self,
        executor: &E,
        headers: &RequestHeaders,
        config: &MultiMetricConfig,
    ) -> OrchestratorResult<MultiMetricReport> {
        self.history = vec![RunState::Idle];
        self.enter(RunState::BuildingPayloads);

        if config.metrics.is_empty() {
            self.enter(RunState::Aborted);
            return Err(OrchestratorError::NoMetrics);
        }

        log_info(format!("📋 Building {} metric payloads...", config.metrics.len()));
        let mut payloads = Vec::with_capacity(config.metrics.len());
        for (index, entry) in config.metrics.iter().enumerate() {
            let payload = config.build_payload(entry);
            let result = validate(&payload);
            if !result.is_ok() {
                log_error(format!("Entry {} ({}) is invalid: {}", index, entry.metric, result));
                self.enter(RunState::Aborted);
                return Err(OrchestratorError::InvalidEntry {
                    index,
                    metric: entry.metric.clone(),
                    result,
                });
            }
            payloads.push(payload);
        }
        log_success("All payloads valid");

        let mut table = FlatTable {
            tagged: true,
            ..FlatTable::default()
        };
        let mut failures = Vec::new();
        let mut succeeded = 0;
        let total = config.metrics.len();

        for (index, (entry, payload)) in config.metrics.iter().zip(&payloads).enumerate() {
            log_info(format!(
                "Query {}/{}: {} (filters: {})",
                index + 1,
                total,
                entry.metric,
                entry.filters.len()
            ));

            match self.run_entry(index, executor, headers, payload).await {
                Ok(part) => {
                    if part.is_empty() {
                        log_info_indent(format!("No data for {}", entry.metric), 1);
                    }
                    self.enter(RunState::Accumulating(index));
                    if let Err(found) = accumulate(&mut table, part, &entry.tag()) {
                        let expected = [table.dimension_columns.clone(), table.value_columns.clone()].concat();
                        log_error(format!("Columns of {} do not match the merged table", entry.metric));
                        self.enter(RunState::Aborted);
                        return Err(OrchestratorError::LayoutMismatch {
                            index,
                            metric: entry.metric.clone(),
                            expected,
                            found,
                        });
                    }
                    succeeded += 1;
                }
                Err(error) => match self.policy {
                    FailurePolicy::AbortOnFirstFailure => {
                        log_error(format!("Error querying {}: {}", entry.metric, error));
                        self.enter(RunState::Aborted);
                        return Err(OrchestratorError::EntryFailed {
                            index,
                            metric: entry.metric.clone(),
                            label: entry.label().to_string(),
                            source: error,
                        });
                    }
                    FailurePolicy::ContinueAndReport => {
                        log_warning(format!("Skipping {}: {}", entry.metric, error));
                        failures.push(EntryFailure {
                            index,
                            metric: entry.metric.clone(),
                            label: entry.label().to_string(),
                            error,
                        });
                    }
                },
            }
        }

        self.enter(RunState::Done);
        log_success(format!(
            "Merged {} rows from {} metric(s)",
            table.len(),
            succeeded
        ));
        if !failures.is_empty() {
            log_warning(format!("{} metric(s) failed", failures.len()));
        }

        Ok(MultiMetricReport {
            table,
            failures,
            succeeded,
        })
    }

    async fn run_entry<E: RequestExecutor>(
        &mut self,
        index: usize,
        executor: &E,
        headers: &RequestHeaders,
        payload: &Value,
    ) -> Result<FlatTable, QueryError> {
        self.enter(RunState::Executing(index));
        let raw = execute_query(executor, headers, payload).await?;

        self.enter(RunState::Flattening(index));
        let options = FlattenOptions::for_payload(payload).with_year_end_dates(self.year_end_dates);
        flatten_response(&raw, &options)
    }
}

/// Append `part` to `merged`, tagging every row.
///
/// The first part with rows or dimension columns fixes the column layout;
/// parts with neither add nothing. A later part with a different layout is
/// rejected with its own columns and nothing is appended.
fn accumulate(merged: &mut FlatTable, part: FlatTable, tag: &MetricTag) -> Result<(), Vec<String>> {
    if !has_layout(&part) {
        return Ok(());
    }
    if !has_layout(merged) {
        merged.dimension_columns = part.dimension_columns.clone();
        merged.value_columns = part.value_columns.clone();
    } else if merged.dimension_columns != part.dimension_columns
        || merged.value_columns != part.value_columns
    {
        return Err([part.dimension_columns, part.value_columns].concat());
    }
    merged.has_support |= part.has_support;
    merged.rows.extend(part.rows.iter().map(|row| row.tagged(tag)));
    Ok(())
}

fn has_layout(table: &FlatTable) -> bool {
    !table.rows.is_empty() || !table.dimension_columns.is_empty()
}

/// Run with a fresh [`Orchestrator`].
pub async fn run_multi_metric<E: RequestExecutor>(
    executor: &E,
    headers: &RequestHeaders,
    config: &MultiMetricConfig,
    policy: FailurePolicy,
) -> OrchestratorResult<MultiMetricReport> {
    Orchestrator::new(policy).run(executor, headers, config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::scripted::ScriptedExecutor;

    fn config(metrics: Value) -> MultiMetricConfig {
        serde_json::from_value(json!({
            "shared": {
                "axes": [{
                    "dimensionLevelSelection": {
                        "dimension": { "name": "Function", "qualifyingPath": "Employee" },
                        "levelIds": ["Function"]
                    }
                }],
                "timeIntervals": {
                    "fromDateTime": "2026-01-01",
                    "intervalPeriodType": "YEAR",
                    "intervalCount": 1,
                    "direction": "BACKWARD"
                },
                "options": { "zeroVisibility": "ELIMINATE", "nullVisibility": "ELIMINATE" }
            },
            "metrics": metrics
        }))
        .unwrap()
    }

    fn two_metrics() -> MultiMetricConfig {
        config(json!([
            { "metric": "employeeCount", "label": "Headcount" },
            {
                "metric": "resignationRate",
                "filters": [{ "selectionConcept": { "name": "isManager", "qualifyingPath": "Employee" } }]
            }
        ]))
    }

    /// A cell set with `n` rows over the Function axis.
    fn cells(n: usize) -> Value {
        let positions: Vec<Value> = (0..n).map(|i| json!({ "path": [format!("F{}", i)] })).collect();
        let cells: Vec<Value> = (0..n)
            .map(|i| json!({ "coordinates": [i], "value": (i * 10).to_string() }))
            .collect();
        json!({
            "axes": [{ "dimension": { "name": "Function" }, "positions": positions }],
            "cells": cells
        })
    }

    #[tokio::test]
    async fn test_merge_keeps_block_order() {
        let executor = ScriptedExecutor::new().respond_json(cells(3)).respond_json(cells(5));
        let mut orchestrator = Orchestrator::new(FailurePolicy::AbortOnFirstFailure);

        let report = orchestrator
            .run(&executor, &RequestHeaders::default(), &two_metrics())
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.table.len(), 8);
        assert_eq!(
            report.table.headers(),
            vec!["Function", "value", "metric", "metric_id"]
        );

        let tags: Vec<(&str, &str)> = report
            .table
            .rows
            .iter()
            .map(|r| {
                let tag = r.metric.as_ref().unwrap();
                (tag.label.as_str(), tag.id.as_str())
            })
            .collect();
        assert!(tags[..3].iter().all(|t| *t == ("Headcount", "employeeCount")));
        assert!(tags[3..].iter().all(|t| *t == ("resignationRate", "resignationRate")));
        assert_eq!(report.table.rows[3].dimensions, vec!["F0"]);

        assert_eq!(orchestrator.state(), RunState::Done);
        assert_eq!(
            orchestrator.history(),
            &[
                RunState::Idle,
                RunState::BuildingPayloads,
                RunState::Executing(0),
                RunState::Flattening(0),
                RunState::Accumulating(0),
                RunState::Executing(1),
                RunState::Flattening(1),
                RunState::Accumulating(1),
                RunState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_payloads_share_axes_and_carry_own_filters() {
        let executor = ScriptedExecutor::new().respond_json(cells(1)).respond_json(cells(1));
        run_multi_metric(&executor, &RequestHeaders::default(), &two_metrics(), FailurePolicy::default())
            .await
            .unwrap();

        let requests = executor.requests.lock().unwrap();
        assert_eq!(requests[0]["query"]["source"]["metric"], "employeeCount");
        assert_eq!(requests[1]["query"]["source"]["metric"], "resignationRate");
        assert_eq!(requests[0]["query"]["axes"], requests[1]["query"]["axes"]);
        assert_eq!(requests[0]["query"]["filters"], json!([]));
        assert_eq!(requests[1]["query"]["filters"][0]["selectionConcept"]["name"], "isManager");
        assert_eq!(requests[1]["options"]["zeroVisibility"], "ELIMINATE");
    }

    #[tokio::test]
    async fn test_invalid_entry_aborts_before_any_request() {
        let cfg = config(json!([
            { "metric": "employeeCount" },
            { "metric": "headcount", "filters": [{ "memberSet": { "dimension": { "name": "Function" } } }] }
        ]));
        let executor = ScriptedExecutor::new().respond_json(cells(1)).respond_json(cells(1));
        let mut orchestrator = Orchestrator::new(FailurePolicy::ContinueAndReport);

        let err = orchestrator
            .run(&executor, &RequestHeaders::default(), &cfg)
            .await
            .unwrap_err();

        match err {
            OrchestratorError::InvalidEntry { index, metric, result } => {
                assert_eq!(index, 1);
                assert_eq!(metric, "headcount");
                assert!(result.errors_at("query.filters[0].memberSet").next().is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(executor.request_count(), 0);
        assert_eq!(orchestrator.state(), RunState::Aborted);
    }

    #[tokio::test]
    async fn test_abort_on_first_failure() {
        let cfg = config(json!([
            { "metric": "a" }, { "metric": "b", "label": "Bee" }, { "metric": "c" }
        ]));
        let executor = ScriptedExecutor::new()
            .respond_json(cells(2))
            .respond(401, "{\"message\": \"Invalid API key\"}")
            .respond_json(cells(2));
        let mut orchestrator = Orchestrator::new(FailurePolicy::AbortOnFirstFailure);

        let err = orchestrator
            .run(&executor, &RequestHeaders::default(), &cfg)
            .await
            .unwrap_err();

        match &err {
            OrchestratorError::EntryFailed { index, metric, label, source } => {
                assert_eq!(*index, 1);
                assert_eq!(metric, "b");
                assert_eq!(label, "Bee");
                assert!(matches!(source, QueryError::Auth { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("Invalid API key"));
        assert_eq!(executor.request_count(), 2);
        assert_eq!(orchestrator.state(), RunState::Aborted);
    }

    #[tokio::test]
    async fn test_continue_and_report() {
        let cfg = config(json!([
            { "metric": "a" }, { "metric": "b" }, { "metric": "c" }
        ]));
        let executor = ScriptedExecutor::new()
            .respond_json(cells(2))
            .respond(500, "boom")
            .respond_json(cells(3));

        let report = run_multi_metric(&executor, &RequestHeaders::default(), &cfg, FailurePolicy::ContinueAndReport)
            .await
            .unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(report.failures[0].error.status(), Some(500));
        assert_eq!(report.table.len(), 5);
        assert_eq!(report.table.rows[2].metric.as_ref().unwrap().id, "c");
    }

    #[tokio::test]
    async fn test_no_metrics() {
        let executor = ScriptedExecutor::new();
        let err = run_multi_metric(&executor, &RequestHeaders::default(), &config(json!([])), FailurePolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NoMetrics));
    }

    #[tokio::test]
    async fn test_empty_entry_result_is_not_a_failure() {
        let executor = ScriptedExecutor::new().respond_json(cells(0)).respond_json(cells(2));
        let report = run_multi_metric(&executor, &RequestHeaders::default(), &two_metrics(), FailurePolicy::default())
            .await
            .unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.table.len(), 2);
        assert_eq!(report.table.dimension_columns, vec!["Function"]);
    }

    #[tokio::test]
    async fn test_empty_first_response_does_not_fix_layout() {
        let executor = ScriptedExecutor::new().respond_json(json!({})).respond_json(cells(2));
        let report = run_multi_metric(&executor, &RequestHeaders::default(), &two_metrics(), FailurePolicy::default())
            .await
            .unwrap();

        assert_eq!(report.succeeded, 2);
        assert_eq!(
            report.table.headers(),
            vec!["Function", "value", "metric", "metric_id"]
        );
        assert_eq!(report.table.rows[0].dimensions, vec!["F0"]);

        let csv = crate::output::to_csv_string(&report.table).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Function,value,metric,metric_id");
        assert_eq!(lines[1], "F0,0,resignationRate,resignationRate");
        assert_eq!(report.table.to_records()[1]["Function"], "F1");
    }

    #[tokio::test]
    async fn test_mismatched_columns_abort() {
        let scalar = json!({ "cells": [{ "coordinates": [], "value": "7" }] });
        let executor = ScriptedExecutor::new().respond_json(cells(2)).respond_json(scalar);
        let mut orchestrator = Orchestrator::new(FailurePolicy::ContinueAndReport);

        let err = orchestrator
            .run(&executor, &RequestHeaders::default(), &two_metrics())
            .await
            .unwrap_err();

        match err {
            OrchestratorError::LayoutMismatch { index, expected, found, .. } => {
                assert_eq!(index, 1);
                assert_eq!(expected, vec!["Function", "value"]);
                assert_eq!(found, vec!["value"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(orchestrator.state(), RunState::Aborted);
    }

    #[test]
    fn test_entry_options_override_shared() {
        let cfg = config(json!([
            { "metric": "a", "options": { "zeroVisibility": "SHOW", "memberDisplayMode": "DISPLAY" } }
        ]));
        let payload = cfg.build_payload(&cfg.metrics[0]);
        assert_eq!(payload["options"]["zeroVisibility"], "SHOW");
        assert_eq!(payload["options"]["nullVisibility"], "ELIMINATE");
        assert_eq!(payload["options"]["memberDisplayMode"], "DISPLAY");
    }

    #[test]
    fn test_config_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", json!({ "shared": { "axes": [] }, "metrics": [{ "metric": "a" }] })).unwrap();

        let cfg = MultiMetricConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.metrics[0].label(), "a");
        assert!(cfg.shared.time_intervals.is_none());
    }
}
