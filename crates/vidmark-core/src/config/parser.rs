use crate::config::schema::{Operator, SessionSettings, StepKind, WorkflowConfig};
use crate::error::ConfigError;
use crate::timestamp::parse_start_time;
use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::path::Path;

/// Source format of a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// `.json` is JSON; everything else is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

/// Load and validate a questionnaire config from disk.
pub fn load_config(path: &Path) -> Result<WorkflowConfig> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config = parse_config(&content, ConfigFormat::from_path(path))
        .with_context(|| format!("loading config {}", path.display()))?;
    Ok(config)
}

/// Parse and validate a config from text.
pub fn parse_config(text: &str, format: ConfigFormat) -> Result<WorkflowConfig, ConfigError> {
    // Step 1: Parse into a raw value tree for short-form normalization
    let mut raw: Value = match format {
        ConfigFormat::Yaml => {
            serde_yaml::from_str(text).map_err(|e| ConfigError::Syntax(e.to_string()))?
        }
        ConfigFormat::Json => {
            let json: serde_json::Value =
                serde_json::from_str(text).map_err(|e| ConfigError::Syntax(e.to_string()))?;
            serde_yaml::to_value(json).map_err(|e| ConfigError::Syntax(e.to_string()))?
        }
    };

    // Step 2: Normalize short-form choices and setup scalars
    normalize_choices(&mut raw);
    normalize_setup(&mut raw);

    // Step 3: Deserialize into the typed config
    let config: WorkflowConfig =
        serde_yaml::from_value(raw).map_err(|e| ConfigError::Schema(e.to_string()))?;

    // Step 4: Validate constraints
    validate_config(&config)?;

    Ok(config)
}

/// `choices: [car, truck]` → `[{value: car, label: car}, ...]`; a mapping
/// without a label borrows its value.
fn normalize_choices(raw: &mut Value) {
    let steps = match raw.get_mut("steps") {
        Some(Value::Sequence(seq)) => seq,
        _ => return,
    };

    for step in steps.iter_mut() {
        let choices = match step.get_mut("choices") {
            Some(Value::Sequence(seq)) => seq,
            _ => continue,
        };
        for choice in choices.iter_mut() {
            if let Some(text) = scalar_text(choice) {
                let mut out = Mapping::new();
                out.insert("value".into(), Value::String(text.clone()));
                out.insert("label".into(), Value::String(text));
                *choice = Value::Mapping(out);
            } else if let Value::Mapping(map) = choice {
                let label_key = Value::String("label".into());
                if !map.contains_key(&label_key) {
                    if let Some(text) = map.get("value").and_then(scalar_text) {
                        map.insert(label_key, Value::String(text));
                    }
                }
            }
        }
    }
}

/// Setup fields are free-form text; coerce numeric and boolean scalars.
fn normalize_setup(raw: &mut Value) {
    if let Some(Value::Mapping(setup)) = raw.get_mut("setup") {
        for (_, value) in setup.iter_mut() {
            if let Some(text) = scalar_text(value) {
                *value = Value::String(text);
            }
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Validate config constraints that can't be expressed in serde.
///
/// Also run on resume, since a saved session embeds its config.
pub fn validate_config(config: &WorkflowConfig) -> Result<(), ConfigError> {
    // Rule 1: name must be kebab-case
    if !is_kebab_case(&config.name) {
        return Err(ConfigError::NameNotKebab(config.name.clone()));
    }

    // Rule 2: at least one step
    if config.steps.is_empty() {
        return Err(ConfigError::NoSteps);
    }

    // Rule 3: step ids well-formed and unique
    let mut seen_ids = HashSet::new();
    for step in &config.steps {
        if step.id.is_empty() || step.id.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidStepId(step.id.clone()));
        }
        if !seen_ids.insert(step.id.as_str()) {
            return Err(ConfigError::DuplicateStep(step.id.clone()));
        }
    }

    // Rule 4: choice steps carry distinct choices
    for step in &config.steps {
        if step.kind == StepKind::Choice {
            if step.choices.is_empty() {
                return Err(ConfigError::NoChoices(step.id.clone()));
            }
            let mut values = HashSet::new();
            for choice in &step.choices {
                if !values.insert(choice.value.as_str()) {
                    return Err(ConfigError::DuplicateChoice {
                        step: step.id.clone(),
                        value: choice.value.clone(),
                    });
                }
            }
        }
    }

    // Rule 5: conditions reference strictly earlier steps
    for (index, step) in config.steps.iter().enumerate() {
        let Some(cond) = &step.condition else {
            continue;
        };
        let target = match config.step_index(&cond.step) {
            Some(t) => t,
            None => {
                return Err(ConfigError::UnknownConditionRef {
                    step: step.id.clone(),
                    target: cond.step.clone(),
                })
            }
        };
        if target >= index {
            return Err(ConfigError::ForwardConditionRef {
                step: step.id.clone(),
                target: cond.step.clone(),
            });
        }
        match cond.operator {
            Operator::Eq | Operator::Ne if cond.value.is_none() => {
                return Err(ConfigError::ConditionOperand {
                    step: step.id.clone(),
                    operator: cond.operator.as_str(),
                    needs: "a `value`",
                });
            }
            Operator::In | Operator::NotIn if cond.values.is_empty() => {
                return Err(ConfigError::ConditionOperand {
                    step: step.id.clone(),
                    operator: cond.operator.as_str(),
                    needs: "a non-empty `values` list",
                });
            }
            _ => {}
        }
        warn_unreachable_values(config, index, target);
    }

    // Rule 6: start-of-day time parses
    if let Some(start) = &config.setup.video_start_time {
        if parse_start_time(start).is_none() {
            return Err(ConfigError::InvalidStartTime(start.clone()));
        }
    }

    // Rule 7: timing settings are usable
    validate_settings(&config.settings)?;

    Ok(())
}

/// A condition value outside the referenced step's choices can never match.
fn warn_unreachable_values(config: &WorkflowConfig, index: usize, target: usize) {
    let step = &config.steps[index];
    let referenced = &config.steps[target];
    let Some(cond) = &step.condition else {
        return;
    };
    if referenced.kind != StepKind::Choice {
        return;
    }
    for value in cond.value.iter().chain(cond.values.iter()) {
        if !referenced.has_choice(value) {
            tracing::warn!(
                step = %step.id,
                target = %referenced.id,
                value = %value,
                "condition value is not one of the referenced step's choices"
            );
        }
    }
}

fn validate_settings(settings: &SessionSettings) -> Result<(), ConfigError> {
    if settings.history_depth == 0 {
        return Err(ConfigError::InvalidSetting {
            name: "history_depth",
            value: 0.0,
        });
    }
    let positive = [
        ("recap.rewind_seconds", settings.recap.rewind_seconds),
        ("indicator.finalize_seconds", settings.indicator.finalize_seconds),
        (
            "indicator.preview_lead_seconds",
            settings.indicator.preview_lead_seconds,
        ),
        ("indicator.flash_seconds", settings.indicator.flash_seconds),
        ("indicator.decay_seconds", settings.indicator.decay_seconds),
    ];
    for (name, value) in positive {
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigError::InvalidSetting { name, value });
        }
    }
    let lead = settings.recap.pause_lead_seconds;
    if !lead.is_finite() || lead < 0.0 {
        return Err(ConfigError::InvalidSetting {
            name: "recap.pause_lead_seconds",
            value: lead,
        });
    }
    let fade = settings.indicator.fade_fraction;
    if !(0.0..=1.0).contains(&fade) {
        return Err(ConfigError::InvalidSetting {
            name: "indicator.fade_fraction",
            value: fade,
        });
    }
    Ok(())
}

fn is_kebab_case(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    // Must start with lowercase letter or digit
    let first = s.as_bytes()[0];
    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return false;
    }
    s.bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}
