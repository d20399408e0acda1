use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// A questionnaire: the ordered steps answered for every click.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowConfig {
    /// Kebab-case config name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Defaults for the setup form filled in before a session starts.
    #[serde(default)]
    pub setup: SetupMetadata,
    #[serde(default)]
    pub settings: SessionSettings,
    pub steps: Vec<Step>,
}

impl WorkflowConfig {
    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.id.as_str())
    }
}

/// One question in the workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// Unique within the config; also the export column name.
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
    /// Shown only when this holds against earlier answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Text steps only: reject blank answers.
    #[serde(default = "default_required")]
    pub required: bool,
}

impl Step {
    pub fn has_choice(&self, value: &str) -> bool {
        self.choices.iter().any(|c| c.value == value)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    #[default]
    Choice,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Choice {
    #[serde(deserialize_with = "scalar_string")]
    pub value: String,
    pub label: String,
}

/// Gate on the answer given to an earlier step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    /// Referenced step id; must come strictly earlier in `steps`.
    pub step: String,
    #[serde(default)]
    pub operator: Operator,
    #[serde(
        default,
        deserialize_with = "optional_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<String>,
    #[serde(
        default,
        deserialize_with = "scalar_strings",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[default]
    Eq,
    Ne,
    In,
    NotIn,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::In => "in",
            Operator::NotIn => "not_in",
        }
    }
}

/// Session-level metadata: the video's wall-clock start plus free-form fields
/// that become leading export columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SetupMetadata {
    /// Time of day at playback position 1.0s, `HH:MM:SS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_start_time: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl SetupMetadata {
    /// Overlay `other` on top of these defaults.
    pub fn merged(&self, other: &SetupMetadata) -> SetupMetadata {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        SetupMetadata {
            video_start_time: other
                .video_start_time
                .clone()
                .or_else(|| self.video_start_time.clone()),
            fields,
        }
    }
}

// ── Settings ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSettings {
    /// Undo snapshots kept before the oldest is evicted.
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
    #[serde(default)]
    pub recap: RecapSettings,
    #[serde(default)]
    pub indicator: IndicatorSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            history_depth: default_history_depth(),
            recap: RecapSettings::default(),
            indicator: IndicatorSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecapSettings {
    #[serde(default = "default_rewind_seconds")]
    pub rewind_seconds: f64,
    /// Slack before the window end at which playback pauses.
    #[serde(default = "default_pause_lead_seconds")]
    pub pause_lead_seconds: f64,
}

impl Default for RecapSettings {
    fn default() -> Self {
        Self {
            rewind_seconds: default_rewind_seconds(),
            pause_lead_seconds: default_pause_lead_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndicatorSettings {
    /// Wall-clock lifetime of a freshly committed dot.
    #[serde(default = "default_finalize_seconds")]
    pub finalize_seconds: f64,
    /// Trailing share of `finalize_seconds` spent fading out.
    #[serde(default = "default_fade_fraction")]
    pub fade_fraction: f64,
    #[serde(default = "default_preview_lead_seconds")]
    pub preview_lead_seconds: f64,
    #[serde(default = "default_flash_seconds")]
    pub flash_seconds: f64,
    #[serde(default = "default_decay_seconds")]
    pub decay_seconds: f64,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            finalize_seconds: default_finalize_seconds(),
            fade_fraction: default_fade_fraction(),
            preview_lead_seconds: default_preview_lead_seconds(),
            flash_seconds: default_flash_seconds(),
            decay_seconds: default_decay_seconds(),
        }
    }
}

fn default_required() -> bool {
    true
}
fn default_history_depth() -> usize {
    50
}
fn default_rewind_seconds() -> f64 {
    10.0
}
fn default_pause_lead_seconds() -> f64 {
    0.25
}
fn default_finalize_seconds() -> f64 {
    3.0
}
fn default_fade_fraction() -> f64 {
    0.3
}
fn default_preview_lead_seconds() -> f64 {
    2.0
}
fn default_flash_seconds() -> f64 {
    1.0
}
fn default_decay_seconds() -> f64 {
    2.0
}

// ── Scalar normalization ──

/// Any YAML/JSON scalar, compared as a trimmed string.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    fn into_normalized(self) -> String {
        match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Str(s) => normalize_value(&s),
        }
    }
}

/// Canonical form used for every answer and condition comparison.
pub fn normalize_value(raw: &str) -> String {
    raw.trim().to_string()
}

fn scalar_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Scalar::deserialize(d).map(Scalar::into_normalized)
}

fn optional_scalar_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(d)?.map(Scalar::into_normalized))
}

fn scalar_strings<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(Vec::<Scalar>::deserialize(d)?
        .into_iter()
        .map(Scalar::into_normalized)
        .collect())
}
