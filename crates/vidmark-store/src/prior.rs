//! Reading an earlier export back in for audit sessions.

use anyhow::Context;
use std::fs;
use std::path::Path;

use vidmark_core::export::table_to_prior_rows;
use vidmark_core::{ExportFormat, ExportTable, PriorRow, WorkflowConfig};

use crate::csv::parse_csv;

/// Parse export text into a table.
///
/// JSON input is an array of flat objects. Columns are the union of keys in
/// first-seen order; missing keys become empty cells and non-string scalars
/// are rendered as text.
pub fn parse_table(text: &str, format: ExportFormat) -> anyhow::Result<ExportTable> {
    match format {
        ExportFormat::Csv => Ok(parse_csv(text)?),
        ExportFormat::Json => {
            let records: Vec<serde_json::Map<String, serde_json::Value>> =
                serde_json::from_str(text).context("expected a JSON array of objects")?;
            let mut columns: Vec<String> = Vec::new();
            for record in &records {
                for key in record.keys() {
                    if !columns.contains(key) {
                        columns.push(key.clone());
                    }
                }
            }
            let mut rows = Vec::with_capacity(records.len());
            for (i, record) in records.iter().enumerate() {
                let mut row = Vec::with_capacity(columns.len());
                for column in &columns {
                    let cell = match record.get(column) {
                        None | Some(serde_json::Value::Null) => String::new(),
                        Some(serde_json::Value::String(s)) => s.clone(),
                        Some(v @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => {
                            v.to_string()
                        }
                        Some(_) => anyhow::bail!("record {}: \"{column}\" is not a scalar", i + 1),
                    };
                    row.push(cell);
                }
                rows.push(row);
            }
            Ok(ExportTable { columns, rows })
        }
    }
}

/// Parse export text into rows for `load_prior`.
pub fn parse_prior(
    config: &WorkflowConfig,
    text: &str,
    format: ExportFormat,
) -> anyhow::Result<Vec<PriorRow>> {
    let table = parse_table(text, format)?;
    Ok(table_to_prior_rows(config, &table)?)
}

/// Read a prior export from disk. `.json` files are JSON, anything else CSV.
pub fn read_prior(config: &WorkflowConfig, path: &Path) -> anyhow::Result<Vec<PriorRow>> {
    let format = format_for_path(path);
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading prior export: {}", path.display()))?;
    let rows = parse_prior(config, &text, format)
        .with_context(|| format!("parsing prior export: {}", path.display()))?;
    tracing::info!(path = %path.display(), rows = rows.len(), %format, "prior export read");
    Ok(rows)
}

pub fn format_for_path(path: &Path) -> ExportFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => ExportFormat::Json,
        _ => ExportFormat::Csv,
    }
}
