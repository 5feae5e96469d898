use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

/// Loads a YAML config file, applies environment overrides and validates it.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    // An empty document deserializes to unit, not to a defaulted struct.
    let mut config: Config = if content.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(content)?
    };

    config.apply_env_overrides()?;
    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let analysis = &config.analysis;

    if analysis.timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "timeout_secs must be greater than zero".to_string(),
        });
    }

    if analysis.max_artifact_size == 0 {
        return Err(ConfigError::Validation {
            message: "max_artifact_size must be greater than zero".to_string(),
        });
    }

    if analysis.executable_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation {
            message: "executable_path must not be empty".to_string(),
        });
    }

    if analysis.scratch_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation {
            message: "scratch_dir must not be empty".to_string(),
        });
    }

    if analysis.allowed_extensions.is_empty() {
        return Err(ConfigError::Validation {
            message: "allowed_extensions must list at least one extension".to_string(),
        });
    }

    if config.log_level.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "log_level must not be empty".to_string(),
        });
    }

    Ok(())
}

/// Creates the scratch directory and checks that the executable exists.
pub fn prepare_runtime(config: &Config) -> Result<(), ConfigError> {
    let analysis = &config.analysis;

    std::fs::create_dir_all(&analysis.scratch_dir).map_err(|e| {
        ConfigError::CreateScratchDir {
            path: analysis.scratch_dir.clone(),
            source: e,
        }
    })?;

    if !analysis.executable_path.is_file() {
        return Err(ConfigError::ExecutableNotFound(
            analysis.executable_path.clone(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use serial_test::serial;
    use std::path::PathBuf;

    const ENV_VARS: [&str; 6] = [
        "FIJI_PATH",
        "TEMP_DIR",
        "ANALYSIS_TIMEOUT",
        "MAX_FILE_SIZE",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_load_valid_config() {
        clear_env();
        let yaml = r#"
log_level: debug
log_format: json
analysis:
  executable_path: /usr/local/fiji/ImageJ-linux64
  scratch_dir: /var/tmp/gypsum
  timeout_secs: 60
  allowed_extensions: [png]
"#;

        let config = load_config_from_str(yaml).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.analysis.executable_path,
            PathBuf::from("/usr/local/fiji/ImageJ-linux64")
        );
        assert_eq!(config.analysis.scratch_dir, PathBuf::from("/var/tmp/gypsum"));
        assert_eq!(config.analysis.timeout_secs, 60);
        assert_eq!(config.analysis.allowed_extensions, vec!["png"]);
        // Unspecified values keep their defaults.
        assert_eq!(config.analysis.max_artifact_size, 50 * 1024 * 1024);
        assert_eq!(config.analysis.executable_args, vec!["--headless", "--console"]);
    }

    #[test]
    #[serial]
    fn test_empty_config_uses_defaults() {
        clear_env();
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.analysis.timeout_secs, 300);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file_values() {
        clear_env();
        std::env::set_var("ANALYSIS_TIMEOUT", "12");
        std::env::set_var("FIJI_PATH", "/opt/other/fiji");

        let config = load_config_from_str("analysis:\n  timeout_secs: 60\n").unwrap();
        clear_env();

        assert_eq!(config.analysis.timeout_secs, 12);
        assert_eq!(config.analysis.executable_path, PathBuf::from("/opt/other/fiji"));
    }

    #[test]
    #[serial]
    fn test_invalid_env_is_rejected() {
        clear_env();
        std::env::set_var("MAX_FILE_SIZE", "-5");

        let result = load_config_from_str("");
        clear_env();

        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
    }

    #[test]
    #[serial]
    fn test_zero_timeout_is_rejected() {
        clear_env();
        let result = load_config_from_str("analysis:\n  timeout_secs: 0\n");
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    #[serial]
    fn test_invalid_yaml() {
        clear_env();
        let result = load_config_from_str("analysis: [not, a, map");
        assert!(matches!(result, Err(ConfigError::ParseYaml(_))));
    }

    #[test]
    #[serial]
    fn test_load_config_from_file() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gypsum.yaml");
        std::fs::write(&path, "analysis:\n  timeout_secs: 30\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.analysis.timeout_secs, 30);
    }

    #[test]
    fn test_missing_file() {
        let result = load_config("/nonexistent/gypsum.yaml");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_prepare_runtime_creates_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let executable = dir.path().join("ImageJ-linux64");
        std::fs::write(&executable, "").unwrap();

        let mut config = Config::default();
        config.analysis.executable_path = executable;
        config.analysis.scratch_dir = dir.path().join("scratch").join("nested");

        prepare_runtime(&config).unwrap();
        assert!(config.analysis.scratch_dir.is_dir());
    }

    #[test]
    fn test_prepare_runtime_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.analysis.executable_path = dir.path().join("missing");
        config.analysis.scratch_dir = dir.path().join("scratch");

        let result = prepare_runtime(&config);
        assert!(matches!(result, Err(ConfigError::ExecutableNotFound(_))));
    }
}
