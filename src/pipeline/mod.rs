//! # Request Pipeline
//!
//! Entry point for analysis requests: hash the image, build the cache key,
//! and let the single-flight cache decide whether the provider is called.
//!
//! ```text
//! handle(bytes, prompt)
//!   └─> ContentHasher::hash ─> CacheKeyBuilder::build_key
//!         └─> SingleFlightCache::get_or_compute
//!               └─> (miss) AnalysisGateway::analyze, bounded by the gateway timeout
//! ```

pub mod prompt;

use crate::cache::{CacheKey, CacheKeyBuilder, ContentHasher, SingleFlightCache};
use crate::config::AnalyzerConfig;
use crate::constants::DEFAULT_IMAGE_FORMAT;
use crate::error::{AnalyzerError, AnalyzerResult, ErrorKind};
use crate::gateway::{AnalysisGateway, AnalysisRequest};
use crate::logging::{log_cache_operation, log_error, log_gateway_operation};
use crate::validation::{ImageUpload, UploadValidator};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

pub use prompt::combine_prompts;

/// Orchestrates hashing, caching and the provider call for one deployment.
pub struct RequestPipeline {
    cache: SingleFlightCache<Arc<str>>,
    gateway: Arc<dyn AnalysisGateway>,
    validator: UploadValidator,
    gateway_timeout: Duration,
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("cache", &self.cache)
            .field("gateway", &self.gateway.name())
            .field("gateway_timeout", &self.gateway_timeout)
            .finish()
    }
}

impl RequestPipeline {
    pub fn new(
        cache: SingleFlightCache<Arc<str>>,
        gateway: Arc<dyn AnalysisGateway>,
        validator: UploadValidator,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            gateway,
            validator,
            gateway_timeout,
        }
    }

    /// Wire a pipeline from validated configuration
    pub fn from_config(
        config: &AnalyzerConfig,
        gateway: Arc<dyn AnalysisGateway>,
    ) -> AnalyzerResult<Self> {
        config.validate()?;

        info!(
            gateway = gateway.name(),
            ttl_seconds = config.cache.ttl_seconds,
            max_entries = config.cache.max_entries,
            timeout_seconds = config.gateway.timeout_seconds,
            "Creating request pipeline"
        );

        Ok(Self::new(
            SingleFlightCache::from_config(&config.cache),
            gateway,
            UploadValidator::new(&config.image),
            config.gateway.timeout(),
        ))
    }

    pub fn cache(&self) -> &SingleFlightCache<Arc<str>> {
        &self.cache
    }

    /// Analyze raw image bytes, sending them to the provider as `png`
    pub async fn handle(
        &self,
        image_bytes: &[u8],
        raw_prompt: Option<&str>,
    ) -> AnalyzerResult<Arc<str>> {
        let (key, span, compute) = self.prepare(image_bytes, raw_prompt, DEFAULT_IMAGE_FORMAT)?;
        let result = self
            .cache
            .get_or_compute(key, compute)
            .instrument(span.clone())
            .await;
        span.in_scope(|| log_outcome(&result));
        result
    }

    /// Validate an upload, then analyze it with the format tag from its filename
    pub async fn handle_upload(
        &self,
        upload: ImageUpload,
        raw_prompt: Option<&str>,
    ) -> AnalyzerResult<Arc<str>> {
        let image_format = self.validator.validate(&upload).inspect_err(|e| {
            debug!(filename = ?upload.filename, error = %e, "Upload rejected");
        })?;

        let (key, span, compute) = self.prepare(&upload.bytes, raw_prompt, &image_format)?;
        let result = self
            .cache
            .get_or_compute(key, compute)
            .instrument(span.clone())
            .await;
        span.in_scope(|| log_outcome(&result));
        result
    }

    /// Like [`handle`](Self::handle), but stops waiting when `token` fires.
    ///
    /// A started provider call still finishes and is cached for later callers.
    pub async fn handle_with_cancellation(
        &self,
        image_bytes: &[u8],
        raw_prompt: Option<&str>,
        token: &CancellationToken,
    ) -> AnalyzerResult<Arc<str>> {
        let (key, span, compute) = self.prepare(image_bytes, raw_prompt, DEFAULT_IMAGE_FORMAT)?;
        let result = self
            .cache
            .get_or_compute_with_cancellation(key, compute, token)
            .instrument(span.clone())
            .await;
        span.in_scope(|| log_outcome(&result));
        result
    }

    /// Wait for in-flight provider calls before the process exits
    pub async fn shutdown(&self) -> usize {
        let drained = self.cache.drain().await;
        let stats = self.cache.stats();
        log_cache_operation(
            "drain",
            None,
            "completed",
            Some(self.cache.len()),
            Some(&format!("{drained} in-flight computations awaited")),
        );
        info!(
            drained = drained,
            entries = self.cache.len(),
            hits = stats.hits,
            misses = stats.misses,
            joins = stats.joins,
            "Request pipeline shut down"
        );
        drained
    }

    fn prepare(
        &self,
        image_bytes: &[u8],
        raw_prompt: Option<&str>,
        image_format: &str,
    ) -> AnalyzerResult<(
        CacheKey,
        Span,
        impl FnOnce() -> BoxedAnalysis + Send + 'static,
    )> {
        if image_bytes.is_empty() {
            return Err(AnalyzerError::validation("Image content must not be empty"));
        }

        let digest = ContentHasher::hash(image_bytes);
        let key = CacheKeyBuilder::build_key(&digest, raw_prompt);

        let request = AnalysisRequest {
            image_bytes: Arc::from(image_bytes),
            image_format: image_format.to_string(),
            prompt: combine_prompts(key.prompt()),
        };
        let span = info_span!(
            "analysis_request",
            request_id = %Uuid::new_v4(),
            key = %key,
            image_format = %image_format
        );

        let gateway = Arc::clone(&self.gateway);
        let timeout = self.gateway_timeout;
        let compute_span = span.clone();
        let compute = move || -> BoxedAnalysis {
            Box::pin(call_gateway(gateway, request, timeout).instrument(compute_span))
        };

        Ok((key, span, compute))
    }
}

type BoxedAnalysis = std::pin::Pin<Box<dyn Future<Output = AnalyzerResult<Arc<str>>> + Send>>;

async fn call_gateway(
    gateway: Arc<dyn AnalysisGateway>,
    request: AnalysisRequest,
    timeout: Duration,
) -> AnalyzerResult<Arc<str>> {
    let started = Instant::now();
    let name = gateway.name();

    let outcome = match tokio::time::timeout(timeout, gateway.analyze(request)).await {
        Ok(result) => result,
        Err(_) => Err(AnalyzerError::timeout(format!("{name}.analyze"), timeout)),
    };
    let duration_ms = Some(started.elapsed().as_millis() as u64);

    match outcome {
        Ok(text) => {
            log_gateway_operation("analyze", name, "completed", duration_ms, None);
            Ok(Arc::from(text))
        }
        Err(e) => {
            let message = e.to_string();
            log_gateway_operation("analyze", name, "failed", duration_ms, Some(&message));
            log_error("gateway", "analyze", &message, None);
            Err(e)
        }
    }
}

fn log_outcome(result: &AnalyzerResult<Arc<str>>) {
    match result {
        Ok(text) => debug!(response_chars = text.chars().count(), "Request completed"),
        Err(e) if e.kind() == ErrorKind::Cancelled => debug!(error = %e, "Request cancelled"),
        Err(e) => warn!(error = %e, kind = ?e.kind(), "Request failed"),
    }
}
