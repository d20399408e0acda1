use std::path::Path;
use vidmark_core::{Origin, SessionSnapshot};

use crate::cmd_export::load_snapshot;

/// Execute `vidmark status <state>`
pub fn execute(state: &Path) -> anyhow::Result<()> {
    let snapshot = load_snapshot(state)?;
    for line in summary(&snapshot) {
        println!("{line}");
    }
    Ok(())
}

fn summary(snap: &SessionSnapshot) -> Vec<String> {
    let count = |origin: Origin| {
        snap.log
            .iter()
            .filter(|e| e.origin == origin && !e.deleted)
            .count()
    };
    let deleted = snap.log.iter().filter(|e| e.deleted).count();
    let audit = !snap.new_entry_ids.is_empty()
        || !snap.deleted_entry_ids.is_empty()
        || snap.log.iter().any(|e| e.origin == Origin::PreExisting);

    let mut lines = vec![
        format!("Session \"{}\"", snap.config.name),
        format!(
            "Entries: {} new, {} pre-existing, {} deleted",
            count(Origin::New),
            count(Origin::PreExisting),
            deleted
        ),
    ];
    if audit {
        lines.push(format!(
            "Audit: {} added, {} removed",
            snap.new_entry_ids.len(),
            snap.deleted_entry_ids.len()
        ));
    }
    lines.push(format!("Next entry id: {}", snap.safe_counter()));
    lines.push(format!(
        "Position: {:.3}s at {}x",
        snap.playback_position_seconds, snap.playback_rate
    ));
    lines
}
