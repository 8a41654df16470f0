//! Session cache, storage reconciliation, and engagement tracking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::Rng;

use crate::error::StorageError;
use crate::observability::metrics;
use crate::scheduler::Clock;
use crate::session::record::{storage_key, SessionRecord};
use crate::storage::Storage;

/// The three independently tracked engagement signals. A session is
/// engaged while all three hold simultaneously.
#[derive(Debug, Clone, Copy)]
struct EngagementSignals {
    page_open: bool,
    focused: bool,
    visible: bool,
}

impl EngagementSignals {
    fn engaged(&self) -> bool {
        self.page_open && self.focused && self.visible
    }
}

impl Default for EngagementSignals {
    fn default() -> Self {
        Self {
            page_open: true,
            focused: true,
            visible: true,
        }
    }
}

/// Owns per-vendor session records backed by a durable store.
pub struct SessionManager {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    cache: Mutex<HashMap<String, SessionRecord>>,
    signals: Mutex<EngagementSignals>,
}

impl SessionManager {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            cache: Mutex::new(HashMap::new()),
            signals: Mutex::new(EngagementSignals::default()),
        }
    }

    /// Fetch-or-create the session for `vendor_type`, refreshing its access
    /// timestamp and engagement.
    ///
    /// A live cached record is returned directly. Otherwise the durable
    /// store is consulted: a non-expired stored record is adopted, an
    /// expired or absent one is replaced by a fresh session continuing the
    /// count. The cache is re-checked after the storage round-trip so a
    /// record created by a concurrent caller is never clobbered.
    pub async fn get(&self, vendor_type: &str) -> Option<SessionRecord> {
        if vendor_type.is_empty() {
            tracing::error!("session lookup requires a vendor type");
            return None;
        }
        let now = self.clock.now_millis();

        // Fast path: live in-memory record.
        if let Some(record) = self.touch_cached(vendor_type, now) {
            self.persist(vendor_type, &record).await;
            return Some(record);
        }

        let stored = self.read_stored(vendor_type).await;

        let record = {
            let mut cache = self.cache.lock().expect("session cache poisoned");
            // Re-check: a concurrent get may have populated the cache while
            // the storage read was pending; yield to it.
            if let Some(existing) = cache.get(vendor_type) {
                if !existing.is_expired(now) {
                    return Some(existing.clone());
                }
            }
            let record = match stored {
                Some(stored) if !stored.is_expired(now) => {
                    // Preserve a persisted engaged=true to avoid flapping
                    // from momentary visibility loss during reconciliation,
                    // and reset the live signals to match.
                    let engaged = if stored.engaged {
                        *self.signals.lock().expect("signals poisoned") =
                            EngagementSignals::default();
                        true
                    } else {
                        self.engaged()
                    };
                    metrics::record_session_event("restored");
                    SessionRecord {
                        access_timestamp: now,
                        engaged,
                        ..stored
                    }
                }
                previous => {
                    let count = previous.map(|p| p.count).unwrap_or(0) + 1;
                    metrics::record_session_event("created");
                    SessionRecord {
                        session_id: rand::thread_rng().gen(),
                        creation_timestamp: now,
                        access_timestamp: now,
                        event_timestamp: None,
                        count,
                        engaged: self.engaged(),
                    }
                }
            };
            cache.insert(vendor_type.to_string(), record.clone());
            record
        };

        self.persist(vendor_type, &record).await;
        Some(record)
    }

    /// Like [`get`](Self::get), but also stamps the moment this vendor
    /// observed a business event.
    pub async fn update_event(&self, vendor_type: &str) -> Option<SessionRecord> {
        self.get(vendor_type).await?;
        let now = self.clock.now_millis();
        let record = {
            let mut cache = self.cache.lock().expect("session cache poisoned");
            let record = cache.get_mut(vendor_type)?;
            record.event_timestamp = Some(now);
            record.clone()
        };
        self.persist(vendor_type, &record).await;
        Some(record)
    }

    /// Page open/closed signal (pageshow/pagehide).
    pub async fn set_page_open(&self, open: bool) {
        self.signals.lock().expect("signals poisoned").page_open = open;
        self.refresh_engagement().await;
    }

    /// Document-level focus signal.
    pub async fn set_focused(&self, focused: bool) {
        self.signals.lock().expect("signals poisoned").focused = focused;
        self.refresh_engagement().await;
    }

    /// Doc visibility signal.
    pub async fn set_visible(&self, visible: bool) {
        self.signals.lock().expect("signals poisoned").visible = visible;
        self.refresh_engagement().await;
    }

    fn engaged(&self) -> bool {
        self.signals.lock().expect("signals poisoned").engaged()
    }

    /// Touch a live cached record: refresh access, recompute engagement.
    fn touch_cached(&self, vendor_type: &str, now: u64) -> Option<SessionRecord> {
        let mut cache = self.cache.lock().expect("session cache poisoned");
        let record = cache.get_mut(vendor_type)?;
        if record.is_expired(now) {
            return None;
        }
        record.access_timestamp = now;
        record.engaged = self.signals.lock().expect("signals poisoned").engaged();
        Some(record.clone())
    }

    /// Recompute and persist engagement for every cached session.
    async fn refresh_engagement(&self) {
        let engaged = self.engaged();
        let snapshot: Vec<(String, SessionRecord)> = {
            let mut cache = self.cache.lock().expect("session cache poisoned");
            cache
                .iter_mut()
                .map(|(vendor, record)| {
                    record.engaged = engaged;
                    (vendor.clone(), record.clone())
                })
                .collect()
        };
        for (vendor, record) in snapshot {
            self.persist(&vendor, &record).await;
        }
    }

    async fn read_stored(&self, vendor_type: &str) -> Option<SessionRecord> {
        let key = storage_key(vendor_type);
        match self.storage.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(record) => Some(record),
                Err(err) => {
                    let corrupt = StorageError::Corrupt {
                        key: key.clone(),
                        reason: err.to_string(),
                    };
                    tracing::warn!(error = %corrupt, "corrupt stored session discarded");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(key, error = %err, "session storage read failed");
                None
            }
        }
    }

    async fn persist(&self, vendor_type: &str, record: &SessionRecord) {
        let key = storage_key(vendor_type);
        let serialized = match serde_json::to_string(record) {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!(key, error = %err, "session serialization failed");
                return;
            }
        };
        if let Err(err) = self.storage.set(&key, &serialized).await {
            tracing::warn!(key, error = %err, "session storage write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualClock;
    use crate::session::record::SESSION_MAX_AGE_MILLIS;
    use crate::storage::MemoryStorage;

    fn manager() -> (SessionManager, Arc<ManualClock>, Arc<MemoryStorage>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let storage = Arc::new(MemoryStorage::new());
        (
            SessionManager::new(storage.clone(), clock.clone()),
            clock,
            storage,
        )
    }

    #[tokio::test]
    async fn test_empty_vendor_type_is_rejected() {
        let (m, _, _) = manager();
        assert_eq!(m.get("").await, None);
    }

    #[tokio::test]
    async fn test_new_session_starts_at_count_one() {
        let (m, _, _) = manager();
        let record = m.get("vendor").await.unwrap();
        assert_eq!(record.count, 1);
        assert_eq!(record.creation_timestamp, 1_000);
        assert_eq!(record.access_timestamp, 1_000);
        assert!(record.engaged);
        assert_eq!(record.event_timestamp, None);
    }

    #[tokio::test]
    async fn test_access_within_window_preserves_creation() {
        let (m, clock, _) = manager();
        let first = m.get("vendor").await.unwrap();
        clock.set(1_000 + 60_000);
        let second = m.get("vendor").await.unwrap();
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.creation_timestamp, first.creation_timestamp);
        assert_eq!(second.count, first.count);
        assert_eq!(second.access_timestamp, 61_000);
    }

    #[tokio::test]
    async fn test_expiry_rolls_a_new_session_with_incremented_count() {
        let (m, clock, _) = manager();
        let first = m.get("vendor").await.unwrap();
        clock.set(1_000 + SESSION_MAX_AGE_MILLIS + 1);
        let second = m.get("vendor").await.unwrap();
        assert_ne!(second.session_id, first.session_id);
        assert_ne!(second.creation_timestamp, first.creation_timestamp);
        assert_eq!(second.count, first.count + 1);
    }

    #[tokio::test]
    async fn test_sessions_are_keyed_by_vendor() {
        let (m, _, _) = manager();
        let a = m.get("vendor-a").await.unwrap();
        let b = m.get("vendor-b").await.unwrap();
        assert_eq!(a.count, 1);
        assert_eq!(b.count, 1);
    }

    #[tokio::test]
    async fn test_durable_copy_survives_page_reload() {
        let clock = Arc::new(ManualClock::new(1_000));
        let storage = Arc::new(MemoryStorage::new());
        let first = {
            let m = SessionManager::new(storage.clone(), clock.clone());
            m.get("vendor").await.unwrap()
        };

        // New manager, same store: a fresh page life adopts the record.
        clock.set(2_000);
        let m = SessionManager::new(storage.clone(), clock.clone());
        let second = m.get("vendor").await.unwrap();
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.creation_timestamp, first.creation_timestamp);
        assert_eq!(second.count, first.count);
        assert_eq!(second.access_timestamp, 2_000);
    }

    #[tokio::test]
    async fn test_adopted_engaged_true_is_preserved_and_resets_signals() {
        let clock = Arc::new(ManualClock::new(1_000));
        let storage = Arc::new(MemoryStorage::new());
        {
            let m = SessionManager::new(storage.clone(), clock.clone());
            let record = m.get("vendor").await.unwrap();
            assert!(record.engaged);
        }

        // New page life that starts hidden: the persisted engaged=true wins
        // over the momentary visibility loss, and signals reset to engaged.
        let m = SessionManager::new(storage.clone(), clock.clone());
        m.set_visible(false).await;
        let record = m.get("vendor").await.unwrap();
        assert!(record.engaged);
        assert!(m.engaged());
    }

    #[tokio::test]
    async fn test_engagement_is_and_of_three_signals() {
        let (m, _, _) = manager();
        let record = m.get("vendor").await.unwrap();
        assert!(record.engaged);

        m.set_focused(false).await;
        let record = m.get("vendor").await.unwrap();
        assert!(!record.engaged);

        m.set_focused(true).await;
        let record = m.get("vendor").await.unwrap();
        assert!(record.engaged);
    }

    #[tokio::test]
    async fn test_signal_change_persists_every_cached_session() {
        let (m, _, storage) = manager();
        m.get("a").await.unwrap();
        m.get("b").await.unwrap();
        m.set_visible(false).await;

        for vendor in ["a", "b"] {
            let raw = storage.get(&storage_key(vendor)).await.unwrap().unwrap();
            let stored: SessionRecord = serde_json::from_str(&raw).unwrap();
            assert!(!stored.engaged);
        }
    }

    #[tokio::test]
    async fn test_update_event_stamps_event_timestamp() {
        let (m, clock, storage) = manager();
        m.get("vendor").await.unwrap();
        clock.set(5_000);
        let record = m.update_event("vendor").await.unwrap();
        assert_eq!(record.event_timestamp, Some(5_000));

        let raw = storage.get(&storage_key("vendor")).await.unwrap().unwrap();
        let stored: SessionRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.event_timestamp, Some(5_000));
    }

    #[tokio::test]
    async fn test_corrupt_stored_record_rolls_fresh_session() {
        let clock = Arc::new(ManualClock::new(1_000));
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set(&storage_key("vendor"), "not json")
            .await
            .unwrap();
        let m = SessionManager::new(storage, clock);
        let record = m.get("vendor").await.unwrap();
        assert_eq!(record.count, 1);
    }
}
