use std::path::Path;
use vidmark_core::config::{Condition, StepKind};
use vidmark_core::{load_config, WorkflowConfig};

/// Execute `vidmark validate <config>`
pub fn execute(path: &Path) -> anyhow::Result<()> {
    let config = load_config(path)?;
    for line in summary(&config) {
        println!("{line}");
    }
    Ok(())
}

fn describe_condition(cond: &Condition) -> String {
    let target = match &cond.value {
        Some(v) => v.clone(),
        None => format!("[{}]", cond.values.join(", ")),
    };
    format!("if {} {} {}", cond.step, cond.operator.as_str(), target)
}

pub(crate) fn summary(config: &WorkflowConfig) -> Vec<String> {
    let mut lines = vec![format!(
        "Config \"{}\": {} steps",
        config.name,
        config.steps.len()
    )];
    for (i, step) in config.steps.iter().enumerate() {
        let kind = match step.kind {
            StepKind::Choice => {
                let values: Vec<&str> = step.choices.iter().map(|c| c.value.as_str()).collect();
                format!("choice: {}", values.join(" | "))
            }
            StepKind::Text if step.required => "text".to_string(),
            StepKind::Text => "text, optional".to_string(),
        };
        let gate = step
            .condition
            .as_ref()
            .map(|c| format!(" ({})", describe_condition(c)))
            .unwrap_or_default();
        lines.push(format!("  {}. {} [{}]{}", i + 1, step.id, kind, gate));
    }
    let recap = &config.settings.recap;
    lines.push(format!(
        "Recap: rewind {}s, pause {}s before the last entry",
        recap.rewind_seconds, recap.pause_lead_seconds
    ));
    lines
}
