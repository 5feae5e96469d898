use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GypsumError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Submission rejected: {0}")]
    Submit(#[from] SubmitError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Invalid value '{value}' for environment variable {name}")]
    InvalidEnv { name: String, value: String },

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Analysis executable not found at '{0}'")]
    ExecutableNotFound(PathBuf),

    #[error("Failed to create scratch directory '{path}': {source}")]
    CreateScratchDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Analysis not found: {0}")]
    NotFound(String),

    #[error("Analysis already exists: {0}")]
    AlreadyExists(String),

    #[error("Analysis {0} is already finished and can no longer change")]
    AlreadyTerminal(String),

    #[error("Invalid update for analysis {id}: {reason}")]
    InvalidTransition { id: String, reason: String },
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Artifact of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("Unsupported file type '{0}'. Please upload JPG, PNG, or TIFF images")]
    UnsupportedFormat(String),

    #[error("Service is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fatal failures of a single analysis run. Each one is recorded as the job's error.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Failed to save uploaded file '{path}': {source}")]
    ArtifactPersistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create analysis macro '{path}': {source}")]
    ScriptWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Analysis execution failed: {0}")]
    Process(#[from] ExternalProcessError),
}

#[derive(Error, Debug)]
pub enum ExternalProcessError {
    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed waiting for analysis process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("{}", describe_exit(.code, .output))]
    Exit { code: Option<i32>, output: String },

    #[error("Analysis timed out after {}s: {output}", .after.as_secs_f64())]
    TimedOut { after: Duration, output: String },

    #[error("Analysis cancelled by shutdown: {output}")]
    Cancelled { output: String },
}

impl ExternalProcessError {
    /// Output captured from the process before it failed, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Exit { output, .. }
            | Self::TimedOut { output, .. }
            | Self::Cancelled { output } => Some(output),
            Self::Spawn { .. } | Self::Wait(_) => None,
        }
    }
}

fn describe_exit(code: &Option<i32>, output: &str) -> String {
    let status = match code {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    };
    if output.trim().is_empty() {
        format!("Process failed with {}", status)
    } else {
        format!("Process failed with {}: {}", status, output.trim())
    }
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("A global logger is already installed: {0}")]
    AlreadyInstalled(String),
}

pub type Result<T> = std::result::Result<T, GypsumError>;
