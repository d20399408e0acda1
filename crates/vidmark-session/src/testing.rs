//! Shared fixtures for unit tests.

use vidmark_core::config::SetupMetadata;
use vidmark_core::{parse_config, ConfigFormat, Entry, EntryId, Origin, StepValues, WorkflowConfig};

use crate::context::SessionContext;

/// `vehicle_type` (car | truck), then `license_plate` only for trucks.
pub(crate) fn vehicle_config() -> WorkflowConfig {
    parse_config(
        r#"
name: vehicles
settings:
  recap: { rewind_seconds: 10 }
steps:
  - id: vehicle_type
    prompt: "Vehicle type?"
    choices: [car, truck]
  - id: license_plate
    prompt: "Plate"
    kind: text
    condition: { step: vehicle_type, value: truck }
"#,
        ConfigFormat::Yaml,
    )
    .unwrap()
}

/// Five steps with every operator and an optional trailing text step.
pub(crate) fn branching_config() -> WorkflowConfig {
    parse_config(
        r#"
name: branching
steps:
  - id: kind
    prompt: "Kind?"
    choices: [car, truck, bus]
  - id: axles
    prompt: "Axles?"
    choices: [2, 3, 4]
    condition: { step: kind, operator: in, values: [truck, bus] }
  - id: trailer
    prompt: "Trailer?"
    choices: [yes, no]
    condition: { step: axles, operator: ne, value: 2 }
  - id: colour
    prompt: "Colour?"
    choices: [red, other]
    condition: { step: kind, operator: not_in, values: [bus] }
  - id: note
    prompt: "Note"
    kind: text
    required: false
"#,
        ConfigFormat::Yaml,
    )
    .unwrap()
}

pub(crate) fn context(config: WorkflowConfig) -> SessionContext {
    SessionContext::new(config, SetupMetadata::default()).unwrap()
}

pub(crate) fn entry(id: u64, time: f64, vehicle: &str) -> Entry {
    let mut step_values = StepValues::new();
    step_values.insert("vehicle_type".into(), vehicle.into());
    Entry {
        id: EntryId(id),
        playback_time_seconds: time,
        click_x: 0.5,
        click_y: 0.5,
        derived_timestamp: String::new(),
        step_values,
        origin: Origin::New,
        deleted: false,
    }
}
