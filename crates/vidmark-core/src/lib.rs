pub mod config;
pub mod error;
pub mod export;
pub mod snapshot;
pub mod timestamp;
pub mod types;
pub mod workflow;

pub use config::{load_config, parse_config, validate_config, ConfigFormat, WorkflowConfig};
pub use error::{ConfigError, ImportError, LogError, SnapshotError};
pub use export::{ExportFormat, ExportTable, PriorRow};
pub use snapshot::{SessionSnapshot, SessionStore};
pub use types::*;
pub use workflow::ConfigWorkflow;
