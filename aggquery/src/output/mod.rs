//! Writers for flattened tables.
//!
//! Output is written once per run, after every row is known. CSV cells
//! follow the table's header order; missing values are empty cells.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::OutputResult;
use crate::transform::{FlatRow, FlatTable};

/// CSV cells of one row, in header order.
pub fn row_cells(table: &FlatTable, row: &FlatRow) -> Vec<String> {
    let mut cells = row.dimensions.clone();
    cells.extend(
        row.values
            .iter()
            .map(|v| v.map(|v| v.to_string()).unwrap_or_default()),
    );
    if table.has_support {
        cells.push(row.support.map(|s| s.to_string()).unwrap_or_default());
    }
    if table.tagged {
        let (label, id) = row
            .metric
            .as_ref()
            .map(|t| (t.label.clone(), t.id.clone()))
            .unwrap_or_default();
        cells.push(label);
        cells.push(id);
    }
    cells
}

/// Write `table` as CSV with a header row.
pub fn write_csv<W: Write>(table: &FlatTable, writer: W) -> OutputResult<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(table.headers())?;
    for row in &table.rows {
        csv.write_record(row_cells(table, row))?;
    }
    csv.flush()?;
    Ok(())
}

pub fn to_csv_string(table: &FlatTable) -> OutputResult<String> {
    let mut buffer = Vec::new();
    write_csv(table, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Rows as a pretty-printed JSON array of records.
pub fn to_json_string(table: &FlatTable) -> OutputResult<String> {
    Ok(serde_json::to_string_pretty(&table.to_records())?)
}

/// Write `content` to `path`, creating parent directories.
pub fn write_file(path: &Path, content: &str) -> OutputResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::MetricTag;

    fn table() -> FlatTable {
        FlatTable {
            dimension_columns: vec!["Function".into(), "DateInRange".into()],
            value_columns: vec!["value".into()],
            has_support: true,
            tagged: false,
            rows: vec![
                FlatRow {
                    dimensions: vec!["Engineering".into(), "2025-01-01T00:00:00.000Z - [0]".into()],
                    values: vec![Some(100.0)],
                    support: Some(12),
                    metric: None,
                },
                FlatRow {
                    dimensions: vec!["Sales, EMEA".into(), "2025-01-01T00:00:00.000Z - [0]".into()],
                    values: vec![None],
                    support: None,
                    metric: None,
                },
            ],
        }
    }

    #[test]
    fn test_csv_layout() {
        let csv = to_csv_string(&table()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Function,DateInRange,value,support");
        assert_eq!(lines[1], "Engineering,2025-01-01T00:00:00.000Z - [0],100,12");
        assert_eq!(lines[2], "\"Sales, EMEA\",2025-01-01T00:00:00.000Z - [0],,");
    }

    #[test]
    fn test_tagged_columns_last() {
        let mut t = table();
        t.tagged = true;
        let tag = MetricTag { label: "Headcount".into(), id: "employeeCount".into() };
        t.rows = t.rows.iter().map(|r| r.tagged(&tag)).collect();

        let csv = to_csv_string(&t).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Function,DateInRange,value,support,metric,metric_id");
        assert!(lines[1].ends_with(",100,12,Headcount,employeeCount"));
    }

    #[test]
    fn test_empty_table_writes_header() {
        let mut t = table();
        t.rows.clear();
        assert_eq!(to_csv_string(&t).unwrap(), "Function,DateInRange,value,support\n");
    }

    #[test]
    fn test_json_records() {
        let json = to_json_string(&table()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["Function"], "Engineering");
        assert_eq!(parsed[0]["value"], 100.0);
        assert_eq!(parsed[0]["support"], 12);
        assert!(parsed[1]["value"].is_null());
    }

    #[test]
    fn test_write_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output").join("results.csv");
        write_file(&path, "a,b\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n");
    }
}
