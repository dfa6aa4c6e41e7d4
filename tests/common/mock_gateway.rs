use archview_core::error::{AnalyzerError, AnalyzerResult};
use archview_core::gateway::{AnalysisGateway, AnalysisRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// In-memory stand-in for the analysis provider.
///
/// Each call returns `"description #{n}"` where `n` is the 1-based call
/// number, so a recomputation is always distinguishable from a cached value.
#[derive(Debug, Default)]
pub struct MockGateway {
    calls: AtomicUsize,
    failures_remaining: AtomicUsize,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the next `count` calls with a computation error
    pub fn failing(self, count: usize) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    /// Block every call until [`release`](Self::release) is called
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let blocked calls proceed
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1024);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<AnalysisRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl AnalysisGateway for MockGateway {
    async fn analyze(&self, request: AnalysisRequest) -> AnalyzerResult<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().push(request);

        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|_| AnalyzerError::computation("gate closed"))?;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(AnalyzerError::computation(format!(
                "provider unavailable (call #{call})"
            )));
        }

        Ok(format!("description #{call}"))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
