//! # Aggquery - aggregate analytics queries, validated and flattened
//!
//! Aggquery builds aggregate queries against a remote analytics API, checks
//! them locally, sends them, and turns the returned cell set into flat rows.
//! Several metrics sharing the same axes can be merged into one table.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Payload /  │────▶│  Validator  │────▶│  Executor   │────▶│  Flattener  │────▶│ CSV / JSON  │
//! │  Builders   │     │   (local)   │     │   (HTTP)    │     │ (cell set)  │     │   writer    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘     └─────────────┘
//!                                                                   │
//!                                                        ┌──────────▼──────────┐
//!                                                        │ Multi-metric merge  │
//!                                                        │  (metric, metric_id)│
//!                                                        └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use aggquery::{load_payload_file, run_query, ApiConfig, FlattenOptions, HttpExecutor};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = HttpExecutor::new(ApiConfig::from_env()?)?;
//!     let payload = load_payload_file("headcount.json")?;
//!     let options = FlattenOptions::for_payload(&payload.body);
//!     let table = run_query(&executor, &executor.headers(), &payload.body, &options).await?;
//!     println!("{} rows", table.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Executor configuration
//! - [`models`] - Query model and cell set
//! - [`payload`] - Envelope loading, option merging, builders
//! - [`validation`] - Structural payload validation
//! - [`client`] - Request executor and response interpretation
//! - [`transform`] - Flattening, single-query pipeline, multi-metric runs
//! - [`output`] - CSV and JSON writers
//! - [`logs`] - Progress log

// Core modules
pub mod config;
pub mod error;
pub mod logs;
pub mod models;

// Request side
pub mod payload;
pub mod validation;

// Execution
pub mod client;

// Response side
pub mod output;
pub mod transform;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, FieldError, FlattenError, OrchestratorError, OutputError, PayloadError,
    QueryError, TransportError, ValidationResult,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{AcceptFormat, ApiConfig};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    AggregationQuery, Axis, CellSet, DimensionRef, Direction, DynamicDateFrom, Filter,
    MemberDisplayMode, PeriodType, QueryPayload, QuerySource, TimeIntervals,
};

// =============================================================================
// Re-exports - Payload
// =============================================================================

pub use payload::{load_payload_file, merge_options, normalize, LoadedPayload, QueryPayloadBuilder};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{validate, validate_payload};

// =============================================================================
// Re-exports - Client
// =============================================================================

pub use client::{interpret_response, HttpExecutor, RawResponse, RequestExecutor, RequestHeaders};

// =============================================================================
// Re-exports - Transform
// =============================================================================

pub use transform::{
    flatten, run_multi_metric, run_query, FailurePolicy, FlatRow, FlatTable, FlattenOptions,
    MultiMetricConfig, MultiMetricReport, Orchestrator, RunState,
};
