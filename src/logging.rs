//! # Structured Logging Module
//!
//! Environment-aware structured logging for the analysis pipeline. Console
//! output is human-readable by default and switches to JSON lines when
//! `ARCHVIEW_LOG_FORMAT=json`.

use crate::config::ConfigManager;
use crate::constants::env;
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    init_structured_logging_with_level(None);
}

/// Initialize structured logging with an explicit default level.
///
/// `RUST_LOG` still wins when set; without either, the level follows the
/// detected environment. Only the first call in a process has any effect.
pub fn init_structured_logging_with_level(level: Option<&str>) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = ConfigManager::detect_environment();
        let default_level = level.unwrap_or_else(|| get_log_level(&environment));
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level));
        let json_output = use_json_format(std::env::var(env::LOG_FORMAT).ok().as_deref());

        let console_layer = if json_output {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // A host application may already own the global subscriber
        if tracing_subscriber::registry()
            .with(console_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            default_level = %default_level,
            json_output = json_output,
            "STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Map a repeated `-v` count to a default filter level
pub fn verbosity_level(count: u8) -> &'static str {
    match count {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn use_json_format(value: Option<&str>) -> bool {
    value.is_some_and(|format| format.trim().eq_ignore_ascii_case("json"))
}

/// Log structured data for cache operations
pub fn log_cache_operation(
    operation: &str,
    cache_key: Option<&str>,
    status: &str,
    entries: Option<usize>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        cache_key = cache_key,
        status = %status,
        entries = entries,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "CACHE_OPERATION"
    );
}

/// Log structured data for analysis provider calls
pub fn log_gateway_operation(
    operation: &str,
    gateway: &str,
    status: &str,
    duration_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        gateway = %gateway,
        status = %status,
        duration_ms = duration_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "GATEWAY_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
