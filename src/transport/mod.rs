//! Outbound delivery boundary.
//!
//! # Responsibilities
//! - Accept a fully composed URL plus the resolved segments behind it
//! - Deliver best-effort and never block or back-pressure the caller
//!
//! # Design Decisions
//! - Delivery failures are swallowed with a warning: analytics is
//!   best-effort and a dropped ping is an acceptable outcome
//! - No retry or backoff lives here; hosts wanting different delivery
//!   (beacon, iframe ping) implement the trait themselves

use async_trait::async_trait;

use crate::observability::metrics;
use crate::request::segment::BatchSegment;

/// Sink for finished measurement requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a composed request. `in_batch` is true when the URL carries
    /// multiple batched segments.
    async fn send_batch(&self, url: &str, segments: &[BatchSegment], in_batch: bool);

    /// Deliver a single segment (iframe-ping style).
    async fn send_single(&self, url: &str, segment: &BatchSegment) {
        self.send_batch(url, std::slice::from_ref(segment), false)
            .await;
    }

    /// Hint that a request to `origin` is imminent. Default: no-op.
    async fn preconnect(&self, _origin: &str) {}
}

/// Image-pixel style transport: fire a GET and ignore the response body.
pub struct PixelTransport {
    client: reqwest::Client,
}

impl PixelTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for PixelTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for PixelTransport {
    async fn send_batch(&self, url: &str, segments: &[BatchSegment], in_batch: bool) {
        match self.client.get(url).send().await {
            Ok(response) => {
                tracing::debug!(
                    url,
                    status = %response.status(),
                    segments = segments.len(),
                    in_batch,
                    "analytics request delivered"
                );
                metrics::record_request_sent("pixel");
            }
            Err(err) => {
                // Best-effort delivery: log and move on, never retry.
                tracing::warn!(url, error = %err, "analytics request dropped");
                metrics::record_request_dropped("pixel");
            }
        }
    }
}
