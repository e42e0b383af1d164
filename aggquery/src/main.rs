//! Aggquery CLI - Run aggregate queries and flatten the results
//!
//! # Main Commands
//!
//! ```bash
//! aggquery query payload.json -o out.csv     # Validate, run, flatten to CSV
//! aggquery multi config.json -o merged.csv   # Several metrics, one table
//! ```
//!
//! # Offline Commands
//!
//! ```bash
//! aggquery validate payload.json             # Structural checks only
//! aggquery flatten response.json             # Flatten a saved cell set
//! aggquery example                           # Print an example payload
//! ```
//!
//! Connection settings come from the environment (or `.env`):
//! `AGGQUERY_HOST`, `AGGQUERY_APIKEY`, and optionally `AGGQUERY_VANITY`,
//! `AGGQUERY_SESSION_TOKEN`, `AGGQUERY_TARGET_TENANT_ID`, `AGGQUERY_ACCEPT`,
//! `AGGQUERY_TIMEOUT_SECS`.

use clap::{Parser, Subcommand};
use aggquery::models::{Direction, PeriodType, QuerySource, TimeIntervals};
use aggquery::output::{to_csv_string, to_json_string, write_file};
use aggquery::payload::{dimension_axis, member_set_filter, time_axis, DEFAULT_QUALIFYING_PATH};
use aggquery::transform::{execute_query, flatten_response, MetricEntry, SharedQuery};
use aggquery::{
    flatten, interpret_response, load_payload_file, validate, AcceptFormat, ApiConfig,
    FailurePolicy, FlatTable, FlattenOptions, HttpExecutor, MultiMetricConfig, Orchestrator,
    QueryPayload, RawResponse,
};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "aggquery")]
#[command(about = "Run aggregate analytics queries and flatten the results", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a payload file without sending it
    Validate {
        /// Payload JSON file (bare body or {"description", "payload"} envelope)
        input: PathBuf,
    },

    /// Validate, execute and flatten one query
    Query {
        /// Payload JSON file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write JSON records instead of CSV
        #[arg(long)]
        json: bool,

        /// Stop after validation
        #[arg(long)]
        validate_only: bool,

        /// Save the exact request body sent
        #[arg(long)]
        save_payload: Option<PathBuf>,

        /// Relabel time members to the 31 December of their year
        #[arg(long)]
        year_end_dates: bool,
    },

    /// Run several metrics with shared axes and merge them into one table
    Multi {
        /// Multi-metric config JSON ({"shared": ..., "metrics": [...]})
        config: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write JSON records instead of CSV
        #[arg(long)]
        json: bool,

        /// Skip failing metrics instead of aborting (exit code stays non-zero)
        #[arg(long)]
        continue_on_error: bool,

        /// Relabel time members to the 31 December of their year
        #[arg(long)]
        year_end_dates: bool,
    },

    /// Flatten a saved cell set response
    Flatten {
        /// Response JSON file
        input: PathBuf,

        /// Payload the response answers, for display mode and column names
        #[arg(short, long)]
        payload: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write JSON records instead of CSV
        #[arg(long)]
        json: bool,

        /// Relabel time members to the 31 December of their year
        #[arg(long)]
        year_end_dates: bool,
    },

    /// Print an example payload (or multi-metric config)
    Example {
        /// Print a multi-metric config instead
        #[arg(long)]
        multi: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { input } => cmd_validate(&input),

        Commands::Query {
            input,
            output,
            json,
            validate_only,
            save_payload,
            year_end_dates,
        } => {
            cmd_query(
                &input,
                output.as_deref(),
                json,
                validate_only,
                save_payload.as_deref(),
                year_end_dates,
            )
            .await
        }

        Commands::Multi {
            config,
            output,
            json,
            continue_on_error,
            year_end_dates,
        } => cmd_multi(&config, output.as_deref(), json, continue_on_error, year_end_dates).await,

        Commands::Flatten {
            input,
            payload,
            output,
            json,
            year_end_dates,
        } => cmd_flatten(&input, payload.as_deref(), output.as_deref(), json, year_end_dates),

        Commands::Example { multi } => cmd_example(multi),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_validate(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating: {}", input.display());

    let payload = load_payload_file(input)?;
    if let Some(description) = &payload.description {
        eprintln!("   {}", description);
    }

    let result = validate(&payload.body);
    if result.is_ok() {
        eprintln!("✅ Payload valid");
        return Ok(());
    }

    eprintln!("\n❌ {} error(s):", result.errors.len());
    for error in &result.errors {
        eprintln!("   - {}", error);
    }
    std::process::exit(1);
}

async fn cmd_query(
    input: &Path,
    output: Option<&Path>,
    json: bool,
    validate_only: bool,
    save_payload: Option<&Path>,
    year_end_dates: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Payload: {}", input.display());
    let payload = load_payload_file(input)?;
    if let Some(description) = &payload.description {
        eprintln!("   {}", description);
    }
    if let Some(metric) = payload.metric_id() {
        eprintln!("   Metric: {}", metric);
    }

    if validate_only {
        aggquery::transform::ensure_valid(&payload.body)?;
        eprintln!("✅ Payload valid");
        return Ok(());
    }

    if let Some(path) = save_payload {
        write_file(path, &serde_json::to_string_pretty(&payload.body)?)?;
        eprintln!("💾 Request body saved to: {}", path.display());
    }

    let config = ApiConfig::from_env()?;
    eprintln!("   Endpoint: {}", config.endpoint());
    eprintln!("   API key: {}", config.masked_apikey());
    let accept = config.accept;
    let executor = HttpExecutor::new(config)?;

    let raw = execute_query(&executor, &executor.headers(), &payload.body).await?;

    if accept != AcceptFormat::Json {
        eprintln!("   Writing {} response as received", accept.mime());
        return write_output(&raw.body, output);
    }

    let options = FlattenOptions::for_payload(&payload.body).with_year_end_dates(year_end_dates);
    let table = flatten_response(&raw, &options)?;
    print_summary(&table);
    write_table(&table, output, json)
}

async fn cmd_multi(
    config_path: &Path,
    output: Option<&Path>,
    json: bool,
    continue_on_error: bool,
    year_end_dates: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📋 Config: {}", config_path.display());
    let config = MultiMetricConfig::from_file(config_path)?;

    let api = ApiConfig::from_env()?;
    if api.accept != AcceptFormat::Json {
        return Err(format!(
            "multi-metric runs need JSON responses, AGGQUERY_ACCEPT is {}",
            api.accept.mime()
        )
        .into());
    }
    let executor = HttpExecutor::new(api)?;

    let policy = if continue_on_error {
        FailurePolicy::ContinueAndReport
    } else {
        FailurePolicy::AbortOnFirstFailure
    };
    let mut orchestrator = Orchestrator::new(policy).with_year_end_dates(year_end_dates);
    let report = orchestrator.run(&executor, &executor.headers(), &config).await?;

    print_summary(&report.table);
    write_table(&report.table, output, json)?;

    if !report.is_complete() {
        eprintln!("\n⚠️  {} metric(s) failed:", report.failures.len());
        for failure in &report.failures {
            eprintln!(
                "   - [{}] {} ({}): {}",
                failure.index, failure.label, failure.metric, failure.error
            );
        }
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_flatten(
    input: &Path,
    payload: Option<&Path>,
    output: Option<&Path>,
    json: bool,
    year_end_dates: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📦 Flattening: {}", input.display());

    let options = match payload {
        Some(path) => FlattenOptions::for_payload(&load_payload_file(path)?.body),
        None => FlattenOptions::default(),
    }
    .with_year_end_dates(year_end_dates);

    let body = fs::read_to_string(input)?;
    let cell_set = interpret_response(&RawResponse::new(200, body))?;
    let table = flatten(&cell_set, &options)?;

    print_summary(&table);
    write_table(&table, output, json)
}

fn cmd_example(multi: bool) -> Result<(), Box<dyn std::error::Error>> {
    let time = TimeIntervals::from_date("2026-01-01", PeriodType::Year, 3, Direction::Backward);

    if multi {
        let config = MultiMetricConfig {
            shared: SharedQuery {
                axes: vec![serde_json::to_value(dimension_axis(
                    "Function",
                    Some(DEFAULT_QUALIFYING_PATH),
                    None,
                ))?],
                time_intervals: Some(serde_json::to_value(&time)?),
                options: json!({ "zeroVisibility": "ELIMINATE", "nullVisibility": "ELIMINATE" })
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            },
            metrics: vec![
                MetricEntry {
                    metric: "employeeCount".into(),
                    label: Some("Headcount".into()),
                    filters: Vec::new(),
                    options: None,
                },
                MetricEntry {
                    metric: "employeeCount".into(),
                    label: Some("Managers".into()),
                    filters: vec![json!({ "selectionConcept": { "name": "isManager", "qualifyingPath": "Employee" } })],
                    options: None,
                },
            ],
        };
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let payload = QueryPayload::builder(QuerySource::metric("employeeCount"))
        .axis(dimension_axis("Country_Cost", Some(DEFAULT_QUALIFYING_PATH), Some(vec!["Country".into()])))
        .axis(time_axis("Time", "FISCAL_YEAR"))
        .filter(member_set_filter("Function", Some(DEFAULT_QUALIFYING_PATH), &["Engineering"], &[]))
        .time_intervals(time)
        .option("zeroVisibility", json!("ELIMINATE"))
        .option("memberDisplayMode", json!("DEFAULT"))
        .build()?;

    let document: Value = json!({
        "description": "Engineering headcount by country and fiscal year, last three years",
        "payload": payload.to_value(),
    });
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

fn print_summary(table: &FlatTable) {
    eprintln!("\n📊 {} rows, {} columns", table.len(), table.headers().len());
    for summary in table.value_summary() {
        match (summary.min, summary.max, summary.mean) {
            (Some(min), Some(max), Some(mean)) => eprintln!(
                "   {}: {} values, min {}, max {}, sum {}, mean {:.2}",
                summary.column, summary.count, min, max, summary.sum, mean
            ),
            _ => eprintln!("   {}: no values", summary.column),
        }
    }
}

fn write_table(table: &FlatTable, path: Option<&Path>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let content = if json {
        to_json_string(table)?
    } else {
        to_csv_string(table)?
    };
    write_output(&content, path)
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            write_file(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
