//! Tabular export of committed entries, and the reverse mapping used when a
//! prior export is loaded for audit.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::config::schema::{normalize_value, SetupMetadata, WorkflowConfig};
use crate::error::ImportError;
use crate::types::{Entry, StepValues};

pub const COL_PLAYBACK_TIME: &str = "playback_time_seconds";
pub const COL_DERIVED_TIMESTAMP: &str = "derived_timestamp";
pub const COL_CLICK_X: &str = "click_x";
pub const COL_CLICK_Y: &str = "click_y";

/// Columns every export carries between metadata and step answers.
pub const FIXED_COLUMNS: [&str; 4] = [
    COL_PLAYBACK_TIME,
    COL_DERIVED_TIMESTAMP,
    COL_CLICK_X,
    COL_CLICK_Y,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Csv => write!(f, "csv"),
            ExportFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unknown export format: \"{other}\" (expected csv or json)")),
        }
    }
}

/// Header plus string cells; rendering to text is the store's job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExportTable {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Seconds with millisecond precision.
pub fn format_seconds(value: f64) -> String {
    format!("{value:.3}")
}

/// Surface fractions with four decimals.
pub fn format_fraction(value: f64) -> String {
    format!("{value:.4}")
}

/// Metadata columns in export order: start time first, then sorted fields.
///
/// Keys that would shadow a fixed or step column are dropped.
fn metadata_columns(config: &WorkflowConfig, setup: &SetupMetadata) -> Vec<(String, String)> {
    let reserved: HashSet<&str> = FIXED_COLUMNS
        .iter()
        .copied()
        .chain(config.step_ids())
        .collect();
    let mut out = Vec::new();
    if let Some(start) = &setup.video_start_time {
        out.push(("video_start_time".to_string(), start.clone()));
    }
    for (key, value) in &setup.fields {
        if reserved.contains(key.as_str()) {
            tracing::warn!(column = %key, "setup field shadows an export column; skipped");
            continue;
        }
        out.push((key.clone(), value.clone()));
    }
    out
}

/// One row per entry, in the order given.
pub fn build_export_table<'a>(
    config: &WorkflowConfig,
    setup: &SetupMetadata,
    entries: impl IntoIterator<Item = &'a Entry>,
) -> ExportTable {
    let metadata = metadata_columns(config, setup);
    let mut columns: Vec<String> = metadata.iter().map(|(k, _)| k.clone()).collect();
    columns.extend(FIXED_COLUMNS.iter().map(|c| c.to_string()));
    columns.extend(config.step_ids().map(str::to_string));

    let rows = entries
        .into_iter()
        .map(|entry| {
            let mut row: Vec<String> = metadata.iter().map(|(_, v)| v.clone()).collect();
            row.push(format_seconds(entry.playback_time_seconds));
            row.push(entry.derived_timestamp.clone());
            row.push(format_fraction(entry.click_x));
            row.push(format_fraction(entry.click_y));
            for id in config.step_ids() {
                row.push(entry.step_values.get(id).cloned().unwrap_or_default());
            }
            row
        })
        .collect();

    ExportTable { columns, rows }
}

/// An entry read back from a prior export, before it is given an id.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorRow {
    pub playback_time_seconds: f64,
    pub derived_timestamp: String,
    pub click_x: f64,
    pub click_y: f64,
    pub step_values: StepValues,
}

/// Map export rows back to entries. Step columns are matched by step id;
/// metadata and unknown columns are ignored; empty step cells are unanswered.
pub fn table_to_prior_rows(
    config: &WorkflowConfig,
    table: &ExportTable,
) -> Result<Vec<PriorRow>, ImportError> {
    let col = |name: &'static str| table.column(name).ok_or(ImportError::MissingColumn(name));
    let time_col = col(COL_PLAYBACK_TIME)?;
    let ts_col = col(COL_DERIVED_TIMESTAMP)?;
    let x_col = col(COL_CLICK_X)?;
    let y_col = col(COL_CLICK_Y)?;
    let step_cols: Vec<(&str, usize)> = config
        .step_ids()
        .filter_map(|id| table.column(id).map(|i| (id, i)))
        .collect();

    let mut out = Vec::with_capacity(table.rows.len());
    for (row_index, row) in table.rows.iter().enumerate() {
        // 1-based, counting the header line
        let row_no = row_index + 2;
        if row.len() != table.columns.len() {
            return Err(ImportError::RaggedRow {
                row: row_no,
                found: row.len(),
                expected: table.columns.len(),
            });
        }
        let number = |i: usize, column: &'static str| -> Result<f64, ImportError> {
            let raw = row[i].trim();
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ImportError::BadNumber {
                    row: row_no,
                    column,
                    value: raw.to_string(),
                })
        };
        let mut step_values = StepValues::new();
        for (id, i) in &step_cols {
            let value = normalize_value(&row[*i]);
            if !value.is_empty() {
                step_values.insert(id.to_string(), value);
            }
        }
        out.push(PriorRow {
            playback_time_seconds: number(time_col, COL_PLAYBACK_TIME)?,
            derived_timestamp: row[ts_col].trim().to_string(),
            click_x: number(x_col, COL_CLICK_X)?,
            click_y: number(y_col, COL_CLICK_Y)?,
            step_values,
        });
    }
    Ok(out)
}
