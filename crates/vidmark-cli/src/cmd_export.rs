use anyhow::Context;
use std::path::Path;
use vidmark_core::{ExportFormat, SessionSnapshot, SessionStore};
use vidmark_session::SessionContext;
use vidmark_store::{format_for_path, render_export, write_export, JsonSessionStore};

pub(crate) fn load_snapshot(path: &Path) -> anyhow::Result<SessionSnapshot> {
    JsonSessionStore::new(path)
        .load()?
        .with_context(|| format!("no saved session at {}", path.display()))
}

/// Execute `vidmark export <state> [--format] [--out]`
pub fn execute(state: &Path, format: Option<ExportFormat>, out: Option<&Path>) -> anyhow::Result<()> {
    let ctx = SessionContext::from_snapshot(load_snapshot(state)?)
        .with_context(|| format!("restoring session: {}", state.display()))?;
    let table = ctx.export_table();
    match out {
        Some(path) => {
            let format = format.unwrap_or_else(|| format_for_path(path));
            write_export(path, &table, format)?;
            println!("Exported {} rows to {} ({format})", table.rows.len(), path.display());
        }
        None => print!("{}", render_export(&table, format.unwrap_or(ExportFormat::Csv))?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidmark_core::config::SetupMetadata;
    use vidmark_core::{parse_config, AnnotationLog, ConfigFormat, Entry, EntryId, Origin};

    fn saved(dir: &Path) -> std::path::PathBuf {
        let config = parse_config(
            "name: vehicles\nsteps:\n  - {id: vehicle_type, prompt: Type?, choices: [car, truck]}\n",
            ConfigFormat::Yaml,
        )
        .unwrap();
        let entry = |id: u64, time: f64, origin: Origin, deleted: bool| Entry {
            id: EntryId(id),
            playback_time_seconds: time,
            click_x: 0.5,
            click_y: 0.5,
            derived_timestamp: String::new(),
            step_values: [("vehicle_type".to_string(), "car".to_string())].into(),
            origin,
            deleted,
        };
        let snapshot = SessionSnapshot {
            config,
            setup_metadata: SetupMetadata::default(),
            log: AnnotationLog::from_entries(vec![
                entry(1, 4.0, Origin::PreExisting, false),
                entry(2, 6.0, Origin::PreExisting, true),
                entry(3, 9.0, Origin::New, false),
            ])
            .unwrap(),
            new_entry_ids: vec![EntryId(3)],
            deleted_entry_ids: vec![EntryId(2)],
            playback_position_seconds: 9.5,
            playback_rate: 1.0,
            entry_counter: 3,
        };
        let path = dir.join("state.json");
        JsonSessionStore::new(&path).save(&snapshot).unwrap();
        path
    }

    #[test]
    fn export_skips_deleted_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let state = saved(tmp.path());
        let out = tmp.path().join("out.csv");
        execute(&state, None, Some(&out)).unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        let times: Vec<&str> = text
            .lines()
            .skip(1)
            .map(|l| l.split(',').next().unwrap())
            .collect();
        assert_eq!(times, vec!["4.000", "9.000"]);
    }

    #[test]
    fn missing_state_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = execute(&tmp.path().join("nope.json"), None, None).unwrap_err();
        assert!(err.to_string().contains("no saved session"));
    }
}
