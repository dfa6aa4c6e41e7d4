//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles YAML file discovery,
//! environment detection, environment-section merging and secret expansion.

use super::error::{ConfigResult, ConfigurationError};
use super::AnalyzerConfig;
use crate::constants::env as env_vars;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CONFIG_FILE_NAMES: [&str; 2] = ["archview-config.yaml", "archview-config.yml"];
const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];

/// Loaded configuration plus the context it was resolved from.
///
/// Owned by whoever builds the pipeline; there is no process-wide instance.
#[derive(Debug)]
pub struct ConfigManager {
    config: AnalyzerConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<ConfigManager> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<ConfigManager> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<ConfigManager> {
        Self::load_with_lookup(config_dir, environment, |name| env::var(name).ok())
    }

    /// Load with an explicit environment-variable lookup
    pub fn load_with_lookup<F>(
        config_dir: Option<PathBuf>,
        environment: &str,
        lookup: F,
    ) -> ConfigResult<ConfigManager>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let mut config = Self::load_and_merge_config(&config_directory, environment)?;
        Self::expand_environment_variables(&mut config, &lookup);
        Self::apply_env_overrides(&mut config, &lookup);

        config.validate()?;

        let sanitized_config = Self::sanitize_config_for_logging(&config);
        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&sanitized_config)
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = environment,
            ttl_seconds = config.cache.ttl_seconds,
            max_entries = config.cache.max_entries,
            model_id = %config.gateway.model_id,
            "Configuration loaded"
        );

        Ok(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        })
    }

    /// Wrap an already-built configuration (tests, embedding callers)
    pub fn from_config(config: AnalyzerConfig) -> ConfigResult<ConfigManager> {
        config.validate()?;
        let environment = if config.environment.is_empty() {
            Self::detect_environment()
        } else {
            config.environment.clone()
        };
        Ok(ConfigManager {
            config,
            environment,
            config_directory: PathBuf::from("config"),
        })
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Get the environment name
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Sanitized configuration for debugging/logging with secrets masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// Detect current environment from environment variables
    pub fn detect_environment() -> String {
        env::var(env_vars::ENVIRONMENT)
            .or_else(|_| env::var(env_vars::APP_ENVIRONMENT))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        if let Ok(dir) = env::var(env_vars::CONFIG_DIR) {
            return PathBuf::from(dir);
        }

        if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
            let dir = PathBuf::from(manifest_dir).join("config");
            if dir.exists() {
                return dir;
            }
        }

        PathBuf::from("config")
    }

    /// Find the configuration file
    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            searched_paths.push(config_path.clone());

            if config_path.exists() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    /// Read a configuration file with a size limit
    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                format!(
                    "Configuration file too large ({} bytes > {} bytes limit)",
                    metadata.len(),
                    MAX_CONFIG_FILE_SIZE
                ),
            ));
        }

        if !metadata.is_file() {
            return Err(ConfigurationError::invalid_value(
                "file_type",
                "directory or special file",
                "Configuration path must point to a regular file",
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }

    /// Load and merge configuration with environment-specific overrides
    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<AnalyzerConfig> {
        let config_file = Self::find_config_file(config_directory)?;
        let yaml_content = Self::read_config_file_safely(&config_file)?;

        let mut yaml_data: YamlValue = serde_yaml::from_str(&yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(config_file.display().to_string(), e))?;

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!(
                "Applying environment-specific overrides for: {}",
                environment
            );
            Self::merge_yaml_values(&mut yaml_data, env_overrides);
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String(section.to_string()));
            }
        }

        let mut config: AnalyzerConfig = serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                config_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })?;

        config.environment = environment.to_string();

        Ok(config)
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
    }

    /// Expand `${VAR}` placeholders in secret-bearing fields
    fn expand_environment_variables<F>(config: &mut AnalyzerConfig, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = &mut config.gateway.api_key;
        if api_key.starts_with("${") && api_key.ends_with('}') {
            let var_name = api_key[2..api_key.len() - 1].to_string();
            match lookup(&var_name) {
                Some(value) => {
                    debug!("Expanding environment variable {} in gateway.api_key", var_name);
                    *api_key = value;
                }
                None => {
                    warn!(
                        "Environment variable {} not found, gateway.api_key left empty",
                        var_name
                    );
                    api_key.clear();
                }
            }
        }
    }

    fn apply_env_overrides<F>(config: &mut AnalyzerConfig, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = lookup(env_vars::API_KEY).filter(|k| !k.is_empty()) {
            debug!("Using {} for gateway.api_key", env_vars::API_KEY);
            config.gateway.api_key = api_key;
        }
    }

    /// Sanitize configuration for safe logging by masking sensitive fields
    fn sanitize_config_for_logging(config: &AnalyzerConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = ["password", "secret", "key", "token", "credential"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    // max_tokens is a limit, not a credential
                    let is_sensitive = key_lower != "max_tokens"
                        && sensitive_patterns
                            .iter()
                            .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive {
                        let replacement = match &*val {
                            serde_json::Value::String(s) if s.is_empty() => {
                                serde_json::Value::String("[EMPTY]".to_string())
                            }
                            serde_json::Value::String(s) => {
                                let chars: Vec<char> = s.chars().collect();
                                let masked = if chars.len() > 4 {
                                    let head: String = chars[..2].iter().collect();
                                    let tail: String = chars[chars.len() - 2..].iter().collect();
                                    format!("{head}***{tail}")
                                } else {
                                    "***".to_string()
                                };
                                serde_json::Value::String(format!("[MASKED: {masked}]"))
                            }
                            _ => serde_json::Value::String("[MASKED]".to_string()),
                        };
                        *val = replacement;
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config_yaml() -> &'static str {
        r#"
cache:
  ttl_seconds: 86400
  max_entries: 1000

gateway:
  region: cn-beijing
  api_key: ${ARCHVIEW_TEST_SECRET}
  model_id: doubao-vision-pro
  timeout_seconds: 60

image:
  max_size_mb: 5
  max_width: 4096
  max_height: 4096

test:
  cache:
    ttl_seconds: 5
    max_entries: 10
  gateway:
    timeout_seconds: 2

production:
  gateway:
    region: cn-shanghai
"#
    }

    fn setup_test_config_dir() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().to_path_buf();
        fs::write(
            config_dir.join("archview-config.yaml"),
            create_test_config_yaml(),
        )
        .unwrap();
        (temp_dir, config_dir)
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_config_file_discovery() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        let config_file = ConfigManager::find_config_file(&config_dir).unwrap();
        assert!(config_file.exists());
        assert_eq!(config_file.file_name().unwrap(), "archview-config.yaml");
    }

    #[test]
    fn test_config_file_not_found() {
        let temp_dir = TempDir::new().unwrap();

        let result = ConfigManager::find_config_file(temp_dir.path());
        if let Err(ConfigurationError::ConfigFileNotFound { searched_paths }) = result {
            assert_eq!(searched_paths.len(), 2);
        } else {
            panic!("Expected ConfigFileNotFound error");
        }
    }

    #[test]
    fn test_environment_specific_overrides() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        let manager =
            ConfigManager::load_with_lookup(Some(config_dir.clone()), "test", no_env).unwrap();
        let config = manager.config();
        assert_eq!(manager.environment(), "test");
        assert_eq!(config.environment, "test");
        assert_eq!(config.cache.ttl_seconds, 5);
        assert_eq!(config.cache.max_entries, 10);
        assert_eq!(config.gateway.timeout_seconds, 2);
        // untouched by the override section
        assert_eq!(config.gateway.region, "cn-beijing");

        let manager =
            ConfigManager::load_with_lookup(Some(config_dir.clone()), "production", no_env)
                .unwrap();
        assert_eq!(manager.config().gateway.region, "cn-shanghai");
        assert_eq!(manager.config().cache.ttl_seconds, 86400);

        let manager =
            ConfigManager::load_with_lookup(Some(config_dir), "development", no_env).unwrap();
        assert_eq!(manager.config().cache.max_entries, 1000);
    }

    #[test]
    fn test_api_key_expansion_and_override() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        let manager = ConfigManager::load_with_lookup(Some(config_dir.clone()), "test", |name| {
            (name == "ARCHVIEW_TEST_SECRET").then(|| "expanded-secret".to_string())
        })
        .unwrap();
        assert_eq!(manager.config().gateway.api_key, "expanded-secret");

        let manager = ConfigManager::load_with_lookup(Some(config_dir.clone()), "test", |name| {
            match name {
                "ARCHVIEW_TEST_SECRET" => Some("expanded-secret".to_string()),
                "ARCHVIEW_API_KEY" => Some("override-secret".to_string()),
                _ => None,
            }
        })
        .unwrap();
        assert_eq!(manager.config().gateway.api_key, "override-secret");

        let manager = ConfigManager::load_with_lookup(Some(config_dir), "test", no_env).unwrap();
        assert!(manager.config().gateway.api_key.is_empty());
    }

    #[test]
    fn test_invalid_yaml_reported() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("archview-config.yaml"),
            "cache: [unterminated",
        )
        .unwrap();

        let result =
            ConfigManager::load_with_lookup(Some(temp_dir.path().to_path_buf()), "test", no_env);
        assert!(matches!(result, Err(ConfigurationError::InvalidYaml { .. })));
    }

    #[test]
    fn test_validation_runs_after_merge() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("archview-config.yaml"),
            "gateway:\n  model_id: m\ntest:\n  cache:\n    max_entries: 0\n",
        )
        .unwrap();

        let result =
            ConfigManager::load_with_lookup(Some(temp_dir.path().to_path_buf()), "test", no_env);
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[test]
    fn test_config_sanitization() {
        let mut config = AnalyzerConfig::for_test();
        config.gateway.api_key = "sk-1234567890abcdef".to_string();
        let manager = ConfigManager::from_config(config).unwrap();

        let sanitized = manager.debug_config();
        let api_key = sanitized["gateway"]["api_key"].as_str().unwrap();
        assert_eq!(api_key, "[MASKED: sk***ef]");
        assert!(!api_key.contains("1234567890"));

        // non-secret fields survive
        assert_eq!(sanitized["gateway"]["max_tokens"], 4096);
        assert_eq!(sanitized["cache"]["max_entries"], 16);
    }
}
