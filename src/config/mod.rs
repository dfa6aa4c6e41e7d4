//! # Analyzer Configuration
//!
//! Typed configuration for the cache, the analysis provider and upload limits.
//!
//! ## Architecture
//!
//! - **Single file**: everything lives in `archview-config.yaml`
//! - **Environment awareness**: `development` / `test` / `production` sections
//!   are deep-merged over the base values by [`ConfigManager`]
//! - **Explicit validation**: [`AnalyzerConfig::validate`] runs on every load
//!
//! ## Usage
//!
//! ```rust,no_run
//! use archview_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let ttl = manager.config().cache.ttl();
//! let max_entries = manager.config().cache.max_entries;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring archview-config.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Result cache bounds
    pub cache: CacheConfig,

    /// Analysis provider connection settings
    pub gateway: GatewayConfig,

    /// Upload limits applied before the cache is consulted
    pub image: ImageConfig,

    /// Environment this configuration was resolved for
    #[serde(skip_deserializing)]
    pub environment: String,
}

/// Bounds for the single-flight result cache
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime measured from insertion
    pub ttl_seconds: u64,
    /// Maximum number of completed entries held at once
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: defaults::CACHE_TTL_SECONDS,
            max_entries: defaults::CACHE_MAX_ENTRIES,
        }
    }
}

impl CacheConfig {
    /// Get TTL as Duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Volcengine Ark chat-completions settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub region: String,
    /// Overrides the region-derived endpoint when set
    pub base_url: Option<String>,
    pub api_key: String,
    pub model_id: String,
    pub timeout_seconds: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            region: defaults::GATEWAY_REGION.to_string(),
            base_url: None,
            api_key: String::new(),
            model_id: String::new(),
            timeout_seconds: defaults::GATEWAY_TIMEOUT_SECONDS,
            temperature: defaults::GATEWAY_TEMPERATURE,
            max_tokens: defaults::GATEWAY_MAX_TOKENS,
        }
    }
}

impl GatewayConfig {
    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Endpoint root, either explicit or derived from the region
    pub fn resolved_base_url(&self) -> String {
        match &self.base_url {
            Some(url) if !url.trim().is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!("https://ark.{}.volces.com/api/v3", self.region),
        }
    }
}

/// Upload limits
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Maximum upload size in megabytes
    pub max_size_mb: u64,
    /// Maximum width in pixels, checked when the header can be read
    pub max_width: u32,
    /// Maximum height in pixels, checked when the header can be read
    pub max_height: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_size_mb: defaults::IMAGE_MAX_SIZE_MB,
            max_width: defaults::IMAGE_MAX_WIDTH,
            max_height: defaults::IMAGE_MAX_HEIGHT,
        }
    }
}

impl ImageConfig {
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb * 1024 * 1024
    }
}

impl AnalyzerConfig {
    /// Validate the configuration; called by the loader after merging
    pub fn validate(&self) -> ConfigResult<()> {
        if self.cache.ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.ttl_seconds",
                "0",
                "TTL must be greater than zero",
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.max_entries",
                "0",
                "Cache capacity must be greater than zero",
            ));
        }
        if self.gateway.timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "gateway.timeout_seconds",
                "0",
                "Provider timeout must be greater than zero",
            ));
        }
        if self.gateway.model_id.trim().is_empty() {
            return Err(ConfigurationError::validation_error(
                "gateway.model_id must be set",
            ));
        }
        if self.image.max_size_mb == 0 {
            return Err(ConfigurationError::invalid_value(
                "image.max_size_mb",
                "0",
                "Upload size limit must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Configuration suitable for unit tests: small cache, short timeout
    pub fn for_test() -> Self {
        Self {
            cache: CacheConfig {
                ttl_seconds: 60,
                max_entries: 16,
            },
            gateway: GatewayConfig {
                model_id: "test-model".to_string(),
                api_key: "test-key".to_string(),
                timeout_seconds: 5,
                ..GatewayConfig::default()
            },
            image: ImageConfig::default(),
            environment: "test".to_string(),
        }
    }
}
