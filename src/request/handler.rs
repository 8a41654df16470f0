//! Per-template request handler: queueing, pacing, flushing.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value as JsonValue;

use crate::config::schema::{RequestTemplate, TriggerEvent};
use crate::config::validation::{validate_batch_intervals, validate_report_window};
use crate::error::ConfigError;
use crate::expansion::{Expander, ExpansionContext};
use crate::observability::metrics;
use crate::request::segment::{expand_params_owned, merge_params, BatchSegment};
use crate::request::serializer::{compose_request_url, Serializer, EXTRA_URL_PARAMS_PLACEHOLDER};
use crate::scheduler::{Clock, Scheduler, TimerId};
use crate::transport::Transport;

type SegmentFuture = BoxFuture<'static, BatchSegment>;
type StringFuture = BoxFuture<'static, String>;

/// One instance per declared request template. Owns the batching queue and
/// both pacing timers; produces finished requests through the serializer
/// and hands them to the transport.
pub struct RequestHandler {
    inner: Arc<HandlerInner>,
}

struct HandlerInner {
    expander: Arc<Expander>,
    serializer: Arc<dyn Serializer>,
    transport: Arc<dyn Transport>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    template: RequestTemplate,
    /// Validated pacing intervals in millis, `None` when unbatched.
    batch_intervals: Option<Vec<u64>>,
    state: Mutex<HandlerState>,
}

/// Mutable handler state. The mutex is never held across an await, so each
/// timer callback's mutations are atomic with respect to other callbacks.
struct HandlerState {
    queue: Vec<SegmentFuture>,
    base_url_cache: Option<StringFuture>,
    origin_cache: Option<StringFuture>,
    interval_pointer: usize,
    report_open: bool,
    last_trigger: Option<String>,
    interval_timer: Option<TimerId>,
    report_timer: Option<TimerId>,
    disposed: bool,
}

impl RequestHandler {
    /// Build a handler for `template`, validating pacing config (fatal on
    /// failure) and starting the interval and report-window timers.
    pub fn new(
        template: RequestTemplate,
        expander: Arc<Expander>,
        serializer: Arc<dyn Serializer>,
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let batch_intervals = template
            .batch_interval
            .as_ref()
            .map(validate_batch_intervals)
            .transpose()?;
        let report_window_millis = template
            .report_window
            .map(validate_report_window)
            .transpose()?;

        let inner = Arc::new(HandlerInner {
            expander,
            serializer,
            transport,
            scheduler,
            clock,
            template,
            batch_intervals,
            state: Mutex::new(HandlerState {
                queue: Vec::new(),
                base_url_cache: None,
                origin_cache: None,
                interval_pointer: 0,
                report_open: true,
                last_trigger: None,
                interval_timer: None,
                report_timer: None,
                disposed: false,
            }),
        });

        HandlerInner::schedule_next_interval(&inner);
        if let Some(window) = report_window_millis {
            HandlerInner::schedule_report_window(&inner, window);
        }
        Ok(Self { inner })
    }

    /// Accept one trigger event.
    ///
    /// No-op when the report window has closed and the trigger is not
    /// important. Otherwise builds a deferred segment (merging trigger
    /// params over config params, trigger wins) and either queues it for
    /// the next interval tick or flushes immediately when unbatched or
    /// important.
    pub async fn send(
        &self,
        config_params: &JsonValue,
        trigger: &TriggerEvent,
        ctx: &ExpansionContext,
    ) {
        let immediate = {
            let mut state = self.inner.state.lock().expect("handler mutex poisoned");
            if state.disposed {
                tracing::warn!(trigger = %trigger.name, "send on disposed handler ignored");
                return;
            }
            if !state.report_open && !trigger.important {
                tracing::debug!(trigger = %trigger.name, "report window closed, trigger dropped");
                return;
            }
            state.last_trigger = Some(trigger.name.clone());

            // First send of a flush cycle computes the base URL (and origin)
            // once, freezing the extra-params slot so it is resolved
            // per-segment at serialization.
            if state.base_url_cache.is_none() {
                let expander = self.inner.expander.clone();
                let base_url = self.inner.template.base_url.clone();
                let base_ctx = ctx.clone().with_encode(true).freeze("extraUrlParams");
                state.base_url_cache = Some(Box::pin(async move {
                    expander.expand(&base_url, &base_ctx).await
                }));

                if let Some(origin) = self.inner.template.origin.clone() {
                    let expander = self.inner.expander.clone();
                    let origin_ctx = ctx.clone().with_encode(false);
                    state.origin_cache = Some(Box::pin(async move {
                        expander.expand(&origin, &origin_ctx).await
                    }));
                }
            }

            let params = merge_params(config_params, &trigger.extra_url_params);
            let expander = self.inner.expander.clone();
            let segment_ctx = ctx.clone().with_encode(false);
            let trigger_name = trigger.name.clone();
            let timestamp_millis = self.inner.clock.now_millis();
            state.queue.push(Box::pin(async move {
                BatchSegment {
                    trigger: Some(trigger_name),
                    timestamp_millis,
                    extra_url_params: expand_params_owned(expander, params, segment_ctx).await,
                }
            }));
            metrics::record_segment_queued();

            self.inner.batch_intervals.is_none() || trigger.important
        };

        if immediate {
            HandlerInner::fire(&self.inner).await;
        }
    }

    /// Trigger name of the most recently accepted send, if any.
    pub fn last_trigger(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .expect("handler mutex poisoned")
            .last_trigger
            .clone()
    }

    /// Whether the report window is still open.
    pub fn report_open(&self) -> bool {
        self.inner
            .state
            .lock()
            .expect("handler mutex poisoned")
            .report_open
    }

    /// Cancel both timers, drop the queue, and reject further sends.
    pub fn dispose(&self) {
        let (interval_timer, report_timer) = {
            let mut state = self.inner.state.lock().expect("handler mutex poisoned");
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.queue.clear();
            state.base_url_cache = None;
            state.origin_cache = None;
            (state.interval_timer.take(), state.report_timer.take())
        };
        if let Some(id) = interval_timer {
            self.inner.scheduler.cancel(id);
        }
        if let Some(id) = report_timer {
            self.inner.scheduler.cancel(id);
        }
    }
}

impl HandlerInner {
    /// Flush the current cycle: snapshot and clear the per-cycle caches
    /// atomically so a send arriving mid-flush starts a fresh cycle, then
    /// resolve everything and hand the batch over.
    async fn fire(inner: &Arc<HandlerInner>) {
        let (queued, base_url_cache, origin_cache) = {
            let mut state = inner.state.lock().expect("handler mutex poisoned");
            if state.disposed {
                return;
            }
            (
                std::mem::take(&mut state.queue),
                state.base_url_cache.take(),
                state.origin_cache.take(),
            )
        };

        // No send happened this cycle: idle tick.
        let Some(base_url_future) = base_url_cache else {
            return;
        };

        let base_url = base_url_future.await;
        let origin = match origin_cache {
            Some(f) => Some(f.await),
            None => None,
        };
        let segments = futures::future::join_all(queued).await;
        if segments.is_empty() {
            tracing::debug!("dropping batch with no resolved segments");
            return;
        }

        // A disposal may have raced the awaits above; discard late results.
        if inner.state.lock().expect("handler mutex poisoned").disposed {
            return;
        }

        // Preconnect hint: origin preferred over base URL.
        let hint = origin.as_deref().unwrap_or(&base_url);
        inner.transport.preconnect(hint).await;

        let composed = compose_request_url(&base_url, origin.as_deref());
        let request_url = inner.serializer.generate(&composed, &segments);
        debug_assert!(!request_url.contains(EXTRA_URL_PARAMS_PLACEHOLDER));

        let in_batch = inner.batch_intervals.is_some();
        inner
            .transport
            .send_batch(&request_url, &segments, in_batch)
            .await;
        metrics::record_batch_flushed(segments.len());
    }

    /// Arm the next interval tick. The pointer walks the configured list
    /// once and then repeats the last value indefinitely.
    fn schedule_next_interval(inner: &Arc<HandlerInner>) {
        let Some(intervals) = &inner.batch_intervals else {
            return;
        };
        let delay = {
            let mut state = inner.state.lock().expect("handler mutex poisoned");
            if state.disposed || !state.report_open {
                return;
            }
            let index = state.interval_pointer.min(intervals.len() - 1);
            state.interval_pointer = (state.interval_pointer + 1).min(intervals.len() - 1);
            intervals[index]
        };

        let weak = Arc::downgrade(inner);
        let id = inner.scheduler.schedule_once(
            Duration::from_millis(delay),
            Box::new(move || Box::pin(Self::on_interval_tick(weak))),
        );
        inner.state.lock().expect("handler mutex poisoned").interval_timer = Some(id);
    }

    async fn on_interval_tick(weak: Weak<HandlerInner>) {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        Self::fire(&inner).await;
        Self::schedule_next_interval(&inner);
    }

    /// Arm the report-window cutoff.
    fn schedule_report_window(inner: &Arc<HandlerInner>, window_millis: u64) {
        let weak = Arc::downgrade(inner);
        let id = inner.scheduler.schedule_once(
            Duration::from_millis(window_millis),
            Box::new(move || Box::pin(Self::on_report_window_expired(weak))),
        );
        inner.state.lock().expect("handler mutex poisoned").report_timer = Some(id);
    }

    /// Report window expiry: flush whatever is pending once, close the
    /// report, and cancel the interval timer. Only important triggers
    /// dispatch afterward, immediately, with no timer rescheduled.
    async fn on_report_window_expired(weak: Weak<HandlerInner>) {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let interval_timer = {
            let mut state = inner.state.lock().expect("handler mutex poisoned");
            if state.disposed {
                return;
            }
            state.report_open = false;
            state.interval_timer.take()
        };
        if let Some(id) = interval_timer {
            inner.scheduler.cancel(id);
        }
        tracing::debug!("report window expired, closing report");
        Self::fire(&inner).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BatchInterval;
    use crate::expansion::MacroRegistryBuilder;
    use crate::scheduler::{ManualClock, ManualScheduler};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;

    /// Transport double that records every delivered batch.
    #[derive(Default)]
    struct CaptureTransport {
        batches: Mutex<Vec<(String, Vec<Option<String>>, bool)>>,
        timestamps: Mutex<Vec<u64>>,
    }

    impl CaptureTransport {
        fn batches(&self) -> Vec<(String, Vec<Option<String>>, bool)> {
            self.batches.lock().unwrap().clone()
        }

        fn timestamps(&self) -> Vec<u64> {
            self.timestamps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for CaptureTransport {
        async fn send_batch(&self, url: &str, segments: &[BatchSegment], in_batch: bool) {
            self.batches.lock().unwrap().push((
                url.to_string(),
                segments.iter().map(|s| s.trigger.clone()).collect(),
                in_batch,
            ));
            self.timestamps
                .lock()
                .unwrap()
                .extend(segments.iter().map(|s| s.timestamp_millis));
        }
    }

    struct Fixture {
        handler: RequestHandler,
        transport: Arc<CaptureTransport>,
        scheduler: Arc<ManualScheduler>,
        clock: Arc<ManualClock>,
    }

    fn fixture(template: RequestTemplate) -> Fixture {
        let clock = Arc::new(ManualClock::new(0));
        let scheduler = Arc::new(ManualScheduler::new(clock.clone()));
        let transport = Arc::new(CaptureTransport::default());
        let expander = Arc::new(Expander::new(Arc::new(
            MacroRegistryBuilder::new().build(),
        )));
        let handler = RequestHandler::new(
            template,
            expander,
            Arc::new(crate::request::serializer::QueryStringSerializer),
            transport.clone(),
            scheduler.clone(),
            clock.clone(),
        )
        .unwrap();
        Fixture {
            handler,
            transport,
            scheduler,
            clock,
        }
    }

    fn template(batch_interval: Option<BatchInterval>, report_window: Option<f64>) -> RequestTemplate {
        RequestTemplate {
            base_url: "https://stats.example.com/r?${extraUrlParams}".to_string(),
            origin: None,
            batch_interval,
            report_window,
        }
    }

    fn trigger(name: &str, important: bool) -> TriggerEvent {
        TriggerEvent {
            name: name.to_string(),
            important,
            extra_url_params: JsonValue::Null,
        }
    }

    fn ctx() -> ExpansionContext {
        ExpansionContext::new(HashMap::new())
    }

    #[tokio::test]
    async fn test_unbatched_send_dispatches_immediately() {
        let f = fixture(template(None, None));
        f.handler
            .send(&json!({"a": "1"}), &trigger("click", false), &ctx())
            .await;
        let batches = f.transport.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0, "https://stats.example.com/r?a=1");
        assert!(!batches[0].2);
    }

    #[tokio::test]
    async fn test_invalid_batch_interval_is_fatal_at_construction() {
        let clock = Arc::new(ManualClock::new(0));
        let scheduler = Arc::new(ManualScheduler::new(clock.clone()));
        let expander = Arc::new(Expander::new(Arc::new(
            MacroRegistryBuilder::new().build(),
        )));
        let result = RequestHandler::new(
            template(Some(BatchInterval::Single(0.05)), None),
            expander,
            Arc::new(crate::request::serializer::QueryStringSerializer),
            Arc::new(CaptureTransport::default()),
            scheduler,
            clock,
        );
        assert!(matches!(result, Err(ConfigError::BatchIntervalTooSmall(_))));
    }

    #[tokio::test]
    async fn test_batch_interval_list_paces_and_repeats_last() {
        // Pacing property: sends at t=0 and t=999 flush together at t=1000;
        // a send at t=1000 flushes at t=3000 (pointer exhausted, repeats 2s).
        let f = fixture(template(Some(BatchInterval::Multiple(vec![1.0, 2.0])), None));

        f.handler.send(&json!({"n": "s1"}), &trigger("t1", false), &ctx()).await;
        f.scheduler.advance_to(999).await;
        f.handler.send(&json!({"n": "s2"}), &trigger("t2", false), &ctx()).await;
        assert!(f.transport.batches().is_empty());

        f.scheduler.advance_to(1000).await;
        let batches = f.transport.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0].1,
            vec![Some("t1".to_string()), Some("t2".to_string())]
        );
        assert_eq!(batches[0].0, "https://stats.example.com/r?n=s1&n=s2");
        assert!(batches[0].2);

        f.handler.send(&json!({"n": "s3"}), &trigger("t3", false), &ctx()).await;
        f.scheduler.advance_to(2999).await;
        assert_eq!(f.transport.batches().len(), 1);
        f.scheduler.advance_to(3000).await;
        let batches = f.transport.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].1, vec![Some("t3".to_string())]);
    }

    #[tokio::test]
    async fn test_idle_ticks_send_nothing() {
        let f = fixture(template(Some(BatchInterval::Single(1.0)), None));
        f.scheduler.advance_to(10_000).await;
        assert!(f.transport.batches().is_empty());
    }

    #[tokio::test]
    async fn test_important_trigger_bypasses_batching() {
        let f = fixture(template(Some(BatchInterval::Single(1.0)), None));
        f.handler
            .send(&json!({"n": "now"}), &trigger("crit", true), &ctx())
            .await;
        assert_eq!(f.transport.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_report_window_flushes_once_then_closes() {
        let f = fixture(template(
            Some(BatchInterval::Single(0.5)),
            Some(1.0),
        ));

        // Queued before the cutoff, but after the last interval tick fires
        // at t=1000 the report window flush must still deliver it.
        f.scheduler.advance_to(900).await;
        f.handler.send(&json!({"n": "late"}), &trigger("t", false), &ctx()).await;
        f.scheduler.advance_to(1000).await;
        assert_eq!(f.transport.batches().len(), 1);
        assert!(!f.handler.report_open());

        // After the window: non-important sends are dropped and no flush is
        // ever scheduled again.
        f.handler.send(&json!({"n": "x"}), &trigger("t", false), &ctx()).await;
        f.scheduler.advance_to(10_000).await;
        assert_eq!(f.transport.batches().len(), 1);
        assert_eq!(f.scheduler.pending_count(), 0);

        // Important sends still dispatch, immediately.
        f.handler.send(&json!({"n": "vip"}), &trigger("t", true), &ctx()).await;
        assert_eq!(f.transport.batches().len(), 2);
        assert_eq!(f.scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_dispose_cancels_timers_and_rejects_sends() {
        let f = fixture(template(Some(BatchInterval::Single(1.0)), Some(5.0)));
        f.handler.send(&json!({"n": "1"}), &trigger("t", false), &ctx()).await;
        f.handler.dispose();
        assert_eq!(f.scheduler.pending_count(), 0);

        f.handler.send(&json!({"n": "2"}), &trigger("t", false), &ctx()).await;
        f.scheduler.advance_to(10_000).await;
        assert!(f.transport.batches().is_empty());
    }

    #[tokio::test]
    async fn test_flush_starts_fresh_cycle() {
        let f = fixture(template(Some(BatchInterval::Single(1.0)), None));
        f.handler.send(&json!({"n": "a"}), &trigger("t", false), &ctx()).await;
        f.scheduler.advance_to(1000).await;
        f.handler.send(&json!({"n": "b"}), &trigger("t", false), &ctx()).await;
        f.scheduler.advance_to(2000).await;

        let batches = f.transport.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].0, "https://stats.example.com/r?n=a");
        assert_eq!(batches[1].0, "https://stats.example.com/r?n=b");
    }

    #[tokio::test]
    async fn test_origin_composes_request_url() {
        let clock = Arc::new(ManualClock::new(0));
        let scheduler = Arc::new(ManualScheduler::new(clock.clone()));
        let transport = Arc::new(CaptureTransport::default());
        let expander = Arc::new(Expander::new(Arc::new(
            MacroRegistryBuilder::new().build(),
        )));
        let handler = RequestHandler::new(
            RequestTemplate {
                base_url: "/collect?${extraUrlParams}".to_string(),
                origin: Some("https://stats.example.com/some/path".to_string()),
                batch_interval: None,
                report_window: None,
            },
            expander,
            Arc::new(crate::request::serializer::QueryStringSerializer),
            transport.clone(),
            scheduler,
            clock,
        )
        .unwrap();

        handler.send(&json!({"a": "1"}), &trigger("t", false), &ctx()).await;
        let batches = transport.batches();
        assert_eq!(batches[0].0, "https://stats.example.com/collect?a=1");
    }

    #[tokio::test]
    async fn test_segment_timestamps_are_send_time_not_flush_time() {
        let f = fixture(template(Some(BatchInterval::Single(1.0)), None));

        f.clock.set(250);
        f.handler.send(&json!({"n": "a"}), &trigger("t", false), &ctx()).await;
        f.scheduler.advance_to(1000).await;

        let stamps = f.transport.timestamps();
        assert_eq!(stamps, vec![250]);
        assert_eq!(f.handler.last_trigger(), Some("t".to_string()));
    }
}
