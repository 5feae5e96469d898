pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, prepare_runtime, validate_config};
pub use schema::{AnalysisSettings, Config, LogFormat};
