//! Metrics collection.
//!
//! # Metrics
//! - `analytics_requests_total` (counter): delivered requests by transport
//! - `analytics_requests_dropped_total` (counter): failed deliveries
//! - `analytics_segments_queued_total` (counter): segments accepted for batching
//! - `analytics_batches_flushed_total` (counter): non-empty flushes
//! - `analytics_linker_tokens_total` (counter): tokens appended to URLs
//! - `analytics_sessions_total` (counter): sessions created vs restored

use metrics::counter;

pub fn record_request_sent(transport: &'static str) {
    counter!("analytics_requests_total", "transport" => transport).increment(1);
}

pub fn record_request_dropped(transport: &'static str) {
    counter!("analytics_requests_dropped_total", "transport" => transport).increment(1);
}

pub fn record_segment_queued() {
    counter!("analytics_segments_queued_total").increment(1);
}

pub fn record_batch_flushed(segments: usize) {
    counter!("analytics_batches_flushed_total").increment(1);
    counter!("analytics_batch_segments_total").increment(segments as u64);
}

pub fn record_linker_token_appended(config: &str) {
    counter!("analytics_linker_tokens_total", "config" => config.to_string()).increment(1);
}

pub fn record_session_event(kind: &'static str) {
    counter!("analytics_sessions_total", "kind" => kind).increment(1);
}
