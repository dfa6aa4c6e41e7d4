#![allow(dead_code)]

pub mod mock_gateway;

pub use mock_gateway::*;

use archview_core::cache::{Clock, SingleFlightCache};
use archview_core::config::ImageConfig;
use archview_core::gateway::AnalysisGateway;
use archview_core::pipeline::RequestPipeline;
use archview_core::validation::UploadValidator;
use std::sync::Arc;
use std::time::Duration;

/// Pipeline around `gateway` with an explicit cache and provider timeout
pub fn pipeline_with(
    gateway: Arc<dyn AnalysisGateway>,
    cache: SingleFlightCache<Arc<str>>,
    gateway_timeout: Duration,
) -> RequestPipeline {
    RequestPipeline::new(
        cache,
        gateway,
        UploadValidator::new(&ImageConfig::default()),
        gateway_timeout,
    )
}

/// Pipeline with the default test bounds: 60s TTL, 16 entries, 5s provider timeout
pub fn test_pipeline(gateway: Arc<dyn AnalysisGateway>) -> RequestPipeline {
    pipeline_with(
        gateway,
        SingleFlightCache::new(Duration::from_secs(60), 16),
        Duration::from_secs(5),
    )
}

/// Pipeline whose cache reads time from `clock`
pub fn clocked_pipeline(
    gateway: Arc<dyn AnalysisGateway>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    max_entries: usize,
) -> RequestPipeline {
    pipeline_with(
        gateway,
        SingleFlightCache::with_clock(ttl, max_entries, clock),
        Duration::from_secs(5),
    )
}

/// Poll until `condition` holds or a second has passed
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
