#![allow(clippy::doc_markdown)] // Allow technical terms like SHA-256, TTL in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # ArchView Core
//!
//! Content-addressed, single-flight result cache in front of a costly
//! vision-analysis provider that describes architecture diagrams.
//!
//! ## Overview
//!
//! Every provider call is slow and billed per request. Identical uploads with
//! identical instructions should reach the provider once, no matter how many
//! callers ask concurrently or how often they ask within the cache lifetime.
//!
//! ## Architecture
//!
//! Requests flow leaf-first through:
//!
//! - [`cache::ContentHasher`] - SHA-256 digest of the raw image bytes
//! - [`cache::CacheKeyBuilder`] - digest plus normalized prompt
//! - [`cache::SingleFlightCache`] - bounded TTL store with at most one computation per key
//! - [`gateway::AnalysisGateway`] - the provider call, made only on a miss
//! - [`pipeline::RequestPipeline`] - wires the above together
//!
//! ## Module Organization
//!
//! - [`config`] - YAML configuration with environment overrides
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging initialization and helpers
//! - [`validation`] - Upload size and format checks
//! - [`constants`] - Prompt template and defaults
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use archview_core::config::ConfigManager;
//! use archview_core::gateway::ArkGateway;
//! use archview_core::pipeline::RequestPipeline;
//! use std::sync::Arc;
//!
//! # async fn example(image: Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let gateway = Arc::new(ArkGateway::new(&manager.config().gateway)?);
//! let pipeline = RequestPipeline::from_config(manager.config(), gateway)?;
//!
//! let description = pipeline.handle(&image, Some("Focus on the database layer")).await?;
//! println!("{description}");
//!
//! pipeline.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod pipeline;
pub mod validation;

pub use cache::{CacheKey, CacheKeyBuilder, CacheStatsSnapshot, ContentDigest, ContentHasher, SingleFlightCache};
pub use config::{AnalyzerConfig, ConfigManager};
pub use error::{AnalyzerError, AnalyzerResult, ErrorKind};
pub use gateway::{AnalysisGateway, AnalysisRequest, ArkGateway};
pub use pipeline::RequestPipeline;
pub use validation::{ImageUpload, UploadValidator};
