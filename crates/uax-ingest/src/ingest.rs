//! Ingestion engine
//!
//! Loads staged export files into a destination table. Each file holds one
//! JSON object per line. Only fields that name an insertable column of the
//! table are kept; `ts` and `submit_time` arrive as epoch milliseconds and are
//! stored as UTC calendar timestamps with whole-second precision. All rows of
//! a file go to the sink in a single insert.

use crate::error::{IngestError, Result};
use crate::schema::{TableSchema, TIMESTAMP_COLUMNS};
use crate::staging::list_files;
use crate::store::RowSink;
use chrono::DateTime;
use serde_json::{Map, Value};
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

/// Calendar timestamp format written for epoch-millisecond columns
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A record restricted to the columns of one destination table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DestinationRow {
    values: Map<String, Value>,
}

impl DestinationRow {
    pub fn from_values(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub files: usize,
    pub rows: u64,
}

/// Format epoch milliseconds as a UTC `YYYY-MM-DD HH:MM:SS` string.
///
/// Sub-second precision is discarded by flooring, so negative values round
/// towards the earlier second.
pub fn epoch_millis_to_timestamp(millis: i64) -> Option<String> {
    DateTime::from_timestamp(millis.div_euclid(1000), 0)
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
}

fn epoch_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Map one record onto `table`, dropping unknown fields
pub fn build_row(table: &TableSchema, record: &Map<String, Value>) -> Result<DestinationRow> {
    let mut values = Map::new();

    for column in table.column_names() {
        let Some(value) = record.get(column) else {
            continue;
        };

        let value = if TIMESTAMP_COLUMNS.contains(&column) && !value.is_null() {
            let formatted = epoch_millis(value)
                .and_then(epoch_millis_to_timestamp)
                .ok_or_else(|| IngestError::Timestamp {
                    column: column.to_string(),
                    value: value.to_string(),
                })?;
            Value::String(formatted)
        } else {
            value.clone()
        };

        values.insert(column.to_string(), value);
    }

    Ok(DestinationRow { values })
}

/// Read every record of a staged file. Blank lines are skipped; any other
/// line that is not a JSON object fails the whole file.
pub fn read_rows(table: &TableSchema, path: &Path) -> Result<Vec<DestinationRow>> {
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut rows = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        let record = match serde_json::from_str::<Value>(&line) {
            Ok(Value::Object(record)) => record,
            Ok(_) => return Err(IngestError::parse(path, line_no, "expected a JSON object")),
            Err(e) => return Err(IngestError::parse(path, line_no, e.to_string())),
        };

        let row = build_row(table, &record).map_err(|e| match e {
            IngestError::Timestamp { .. } => IngestError::parse(path, line_no, e.to_string()),
            other => other,
        })?;
        rows.push(row);
    }

    Ok(rows)
}

/// Load every file in `staging_dir` into `table`, one insert per file.
///
/// The first malformed line aborts the whole call. Files already inserted
/// stay inserted.
pub async fn ingest(
    table: &'static TableSchema,
    staging_dir: &Path,
    sink: &dyn RowSink,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();

    for file in list_files(staging_dir)? {
        info!(file = %file.display(), table = table.name, "Ingesting");

        let rows = read_rows(table, &file)?;
        let count = rows.len();
        let inserted = sink.insert_rows(table, rows).await?;

        info!(file = %file.display(), rows = count, "Inserted rows");
        summary.files += 1;
        summary.rows += inserted;
    }

    Ok(summary)
}
