pub mod parser;
pub mod schema;

pub use parser::{load_config, parse_config, validate_config, ConfigFormat};
pub use schema::{
    Choice, Condition, IndicatorSettings, Operator, RecapSettings, SessionSettings, SetupMetadata,
    Step, StepKind, WorkflowConfig,
};
