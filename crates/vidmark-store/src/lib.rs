pub mod csv;
pub mod prior;

use anyhow::Context;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use vidmark_core::{ExportFormat, ExportTable, SessionSnapshot, SessionStore};

pub use prior::{format_for_path, parse_prior, parse_table, read_prior};

/// Atomic write: write to temp file in same dir, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

/// Render an export table. JSON is an array of objects keyed by column.
pub fn render_export(table: &ExportTable, format: ExportFormat) -> anyhow::Result<String> {
    match format {
        ExportFormat::Csv => Ok(csv::render_csv(table)),
        ExportFormat::Json => {
            let rows: Vec<serde_json::Map<String, serde_json::Value>> = table
                .rows
                .iter()
                .map(|row| {
                    table
                        .columns
                        .iter()
                        .zip(row)
                        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                        .collect()
                })
                .collect();
            let mut text = serde_json::to_string_pretty(&rows)?;
            text.push('\n');
            Ok(text)
        }
    }
}

/// Write an export next to the session, atomically.
pub fn write_export(path: &Path, table: &ExportTable, format: ExportFormat) -> anyhow::Result<()> {
    let text = render_export(table, format)?;
    write_atomic(path, text.as_bytes())
        .with_context(|| format!("writing export: {}", path.display()))?;
    tracing::debug!(path = %path.display(), rows = table.rows.len(), %format, "export written");
    Ok(())
}

/// Session snapshots as pretty JSON in a single file.
#[derive(Debug, Clone)]
pub struct JsonSessionStore {
    path: PathBuf,
}

impl JsonSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for JsonSessionStore {
    fn save(&mut self, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
        let data = serde_json::to_string_pretty(snapshot)?;
        write_atomic(&self.path, data.as_bytes())
            .with_context(|| format!("saving session: {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), entries = snapshot.log.len(), "session saved");
        Ok(())
    }

    /// Returns `None` if the file doesn't exist.
    fn load(&self) -> anyhow::Result<Option<SessionSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("reading session: {}", self.path.display()))?;
        let snapshot: SessionSnapshot = serde_json::from_str(&content)
            .with_context(|| format!("parsing session: {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    fn export(&self, table: &ExportTable, format: ExportFormat) -> anyhow::Result<String> {
        render_export(table, format)
    }
}
