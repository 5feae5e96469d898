pub mod analysis;
pub mod config;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod service;

pub use analysis::{AnalysisRunner, Artifact, RunnerSettings};
pub use config::{load_config, AnalysisSettings, Config, LogFormat};
pub use error::{
    AnalysisError, ConfigError, ExternalProcessError, GypsumError, LoggingError, Result,
    StoreError, SubmitError,
};
pub use jobs::{AnalysisJob, AnalysisMetrics, JobStatus, JobStore};
pub use logging::init_logging;
pub use service::AnalysisService;
