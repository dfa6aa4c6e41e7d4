//! # Analysis Result Cache
//!
//! Content-addressed caching of provider results.
//!
//! ## Architecture
//!
//! ```text
//! image bytes ──> ContentHasher ──> ContentDigest ─┐
//!                                                  ├─> CacheKeyBuilder ──> CacheKey
//! raw prompt  ──> normalize_prompt ────────────────┘
//!
//! CacheKey ──> SingleFlightCache::get_or_compute ──> hit | join | lead
//! ```
//!
//! The cache is an explicitly constructed value owned by the pipeline; nothing
//! here registers itself globally.

pub mod clock;
pub mod hasher;
pub mod key;
pub mod single_flight;
pub mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use hasher::{ContentDigest, ContentHasher};
pub use key::{normalize_prompt, CacheKey, CacheKeyBuilder};
pub use single_flight::{CacheEntry, SingleFlightCache};
pub use stats::{CacheStats, CacheStatsSnapshot};
