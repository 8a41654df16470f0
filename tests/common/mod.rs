//! Shared doubles for integration testing.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tagflow::request::BatchSegment;
use tagflow::transport::Transport;

/// Transport double that records every delivered request.
#[derive(Default)]
pub struct CaptureTransport {
    requests: Mutex<Vec<DeliveredRequest>>,
}

#[derive(Debug, Clone)]
pub struct DeliveredRequest {
    pub url: String,
    pub triggers: Vec<Option<String>>,
    pub in_batch: bool,
}

impl CaptureTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn requests(&self) -> Vec<DeliveredRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for CaptureTransport {
    async fn send_batch(&self, url: &str, segments: &[BatchSegment], in_batch: bool) {
        self.requests.lock().unwrap().push(DeliveredRequest {
            url: url.to_string(),
            triggers: segments.iter().map(|s| s.trigger.clone()).collect(),
            in_batch,
        });
    }
}
