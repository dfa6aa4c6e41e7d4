//! # Analysis Gateway
//!
//! Boundary to the external vision-analysis capability. The pipeline only
//! calls a gateway on a cache miss, and never retries a failed call.

pub mod ark;
pub mod payload;

use crate::error::AnalyzerResult;
use async_trait::async_trait;
use std::sync::Arc;

pub use ark::ArkGateway;

/// One multimodal analysis call
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub image_bytes: Arc<[u8]>,
    /// Format tag for the data URI (`png`, `jpeg`, ...)
    pub image_format: String,
    /// Base instructions plus any caller-supplied additions
    pub prompt: String,
}

#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    /// Perform the external call and return the provider's text verbatim
    async fn analyze(&self, request: AnalysisRequest) -> AnalyzerResult<String>;

    /// Short identifier used in logs
    fn name(&self) -> &'static str;
}
