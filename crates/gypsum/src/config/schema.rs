use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub analysis: AnalysisSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            analysis: AnalysisSettings::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Settings for launching the analysis executable and accepting uploads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(default = "default_executable_path")]
    pub executable_path: PathBuf,
    /// Passed before the macro path on every invocation.
    #[serde(default = "default_executable_args")]
    pub executable_args: Vec<String>,
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on the declared artifact size, in bytes.
    #[serde(default = "default_max_artifact_size")]
    pub max_artifact_size: u64,
    /// Accepted filename extensions, lowercase and without the dot.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_executable_path() -> PathBuf {
    PathBuf::from("/opt/fiji/Fiji.app/ImageJ-linux64")
}

fn default_executable_args() -> Vec<String> {
    vec!["--headless".to_string(), "--console".to_string()]
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("gypsum-analysis")
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_artifact_size() -> u64 {
    50 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "tif", "tiff"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            executable_path: default_executable_path(),
            executable_args: default_executable_args(),
            scratch_dir: default_scratch_dir(),
            timeout_secs: default_timeout_secs(),
            max_artifact_size: default_max_artifact_size(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl AnalysisSettings {
    /// Whether `extension` (with or without a leading dot) is accepted.
    pub fn allows_extension(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.');
        !extension.is_empty()
            && self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(extension))
    }
}

pub(crate) type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

impl Config {
    /// Overrides values from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(&|name: &str| std::env::var(name).ok())
    }

    pub(crate) fn apply_overrides_from(&mut self, lookup: EnvLookup<'_>) -> Result<(), ConfigError> {
        if let Some(path) = lookup("FIJI_PATH") {
            self.analysis.executable_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("TEMP_DIR") {
            self.analysis.scratch_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("ANALYSIS_TIMEOUT") {
            self.analysis.timeout_secs = parse_env("ANALYSIS_TIMEOUT", &secs)?;
        }
        if let Some(size) = lookup("MAX_FILE_SIZE") {
            self.analysis.max_artifact_size = parse_env("MAX_FILE_SIZE", &size)?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.log_format = parse_env("LOG_FORMAT", &format)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
    })
}
