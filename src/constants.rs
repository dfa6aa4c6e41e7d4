//! # System Constants
//!
//! Fixed prompt text, configuration defaults and environment variable names.

use std::time::Duration;

/// Base instruction sent with every analysis request.
///
/// Mandates node identification, relationship description and boundary
/// definition, plain-text output only, and a 300-500 character target.
pub const BASE_PROMPT: &str = "You are a software architecture analysis expert. \
Carefully analyze the architecture diagram provided by the user and focus on the following core tasks:\n\n\
1. Node identification: accurately identify every functional module, component or service node in the diagram\n\
2. Relationship description: clearly describe the data flow, call relationships or dependencies between nodes\n\
3. Boundary definition: state the responsibility boundary and interaction interface of each node or group\n\n\
Output requirements:\n\
- Use concise, precise, descriptive language\n\
- Avoid subjective evaluation or recommendations\n\
- Describe only what the diagram actually shows\n\
- Use terminology consistently and without ambiguity\n\
- Do not use any Markdown formatting (no heading markers, bold text or list bullets); output plain text only\n\
- Keep the total description between 300 and 500 characters";

/// Separator placed between the base template and caller-supplied instructions
pub const USER_PROMPT_PREFIX: &str = "\n\nAdditional user requirements: ";

/// Image format tag used when an upload carries no usable file extension
pub const DEFAULT_IMAGE_FORMAT: &str = "png";

pub mod defaults {
    use super::Duration;

    pub const CACHE_TTL_SECONDS: u64 = 24 * 60 * 60;
    pub const CACHE_MAX_ENTRIES: usize = 1000;

    pub const GATEWAY_REGION: &str = "cn-beijing";
    pub const GATEWAY_TIMEOUT_SECONDS: u64 = 60;
    pub const GATEWAY_TEMPERATURE: f32 = 0.2;
    pub const GATEWAY_MAX_TOKENS: u32 = 4096;

    pub const IMAGE_MAX_SIZE_MB: u64 = 5;
    pub const IMAGE_MAX_WIDTH: u32 = 4096;
    pub const IMAGE_MAX_HEIGHT: u32 = 4096;

    pub const CACHE_TTL: Duration = Duration::from_secs(CACHE_TTL_SECONDS);
}

/// Environment variable names read at startup
pub mod env {
    pub const ENVIRONMENT: &str = "ARCHVIEW_ENV";
    pub const APP_ENVIRONMENT: &str = "APP_ENV";
    pub const API_KEY: &str = "ARCHVIEW_API_KEY";
    pub const CONFIG_DIR: &str = "ARCHVIEW_CONFIG_DIR";
    pub const LOG_FORMAT: &str = "ARCHVIEW_LOG_FORMAT";
}

/// Image formats accepted by the provider's data-URI framing
pub const ACCEPTED_IMAGE_FORMATS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];
