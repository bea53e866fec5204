//! In-process remote store.
//!
//! Behaves like the hosted database as far as subscribers can tell: the
//! current snapshot is delivered on subscribe and after every change, and
//! writes assign ids and server timestamps. Reachability switches simulate
//! outages so the fallback write path can be exercised without a network.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::{
    Collection, FeedError, NewAlert, NewReport, RawRecord, RemoteFeed, SnapshotCallback,
    Subscription,
};

#[derive(Default)]
struct CollectionState {
    records: BTreeMap<String, Value>,
    subscribers: Vec<(u64, SnapshotCallback)>,
}

impl CollectionState {
    fn snapshot(&self) -> Vec<RawRecord> {
        self.records
            .iter()
            .map(|(id, fields)| RawRecord::new(id.clone(), fields.clone()))
            .collect()
    }

    fn callbacks(&self) -> Vec<SnapshotCallback> {
        self.subscribers
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }
}

struct Inner {
    reports: CollectionState,
    alerts: CollectionState,
    next_key: u64,
    next_subscriber: u64,
    reachable: bool,
    alert_writes_fail: bool,
}

impl Inner {
    const fn collection(&mut self, collection: Collection) -> &mut CollectionState {
        match collection {
            Collection::Reports => &mut self.reports,
            Collection::Alerts => &mut self.alerts,
        }
    }
}

/// An in-memory [`RemoteFeed`].
///
/// Cloning shares the same store.
#[derive(Clone)]
pub struct MemoryFeed {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryFeed {
    /// Creates an empty, reachable store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                reports: CollectionState::default(),
                alerts: CollectionState::default(),
                next_key: 0,
                next_subscriber: 0,
                reachable: true,
                alert_writes_fail: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the store reachable or not. While unreachable, writes and new
    /// subscriptions fail; existing subscribers simply stop hearing about
    /// changes.
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Makes alert writes fail while report writes keep working.
    pub fn set_alert_writes_fail(&self, fail: bool) {
        self.lock().alert_writes_fail = fail;
    }

    /// Stores a record under `id` as another client would, then notifies
    /// subscribers.
    pub fn put(&self, collection: Collection, id: impl Into<String>, fields: Value) {
        self.lock().collection(collection).records.insert(id.into(), fields);
        self.publish(collection);
    }

    /// Removes a record, then notifies subscribers.
    pub fn remove(&self, collection: Collection, id: &str) {
        self.lock().collection(collection).records.remove(id);
        self.publish(collection);
    }

    /// Removes every record of a collection, then notifies subscribers.
    pub fn clear(&self, collection: Collection) {
        self.lock().collection(collection).records.clear();
        self.publish(collection);
    }

    /// Current records of a collection.
    #[must_use]
    pub fn records(&self, collection: Collection) -> Vec<RawRecord> {
        self.lock().collection(collection).snapshot()
    }

    /// Number of live subscriptions on a collection.
    #[must_use]
    pub fn subscriber_count(&self, collection: Collection) -> usize {
        self.lock().collection(collection).subscribers.len()
    }

    /// Delivers the current snapshot to every subscriber. Callbacks run
    /// outside the store lock.
    pub fn publish(&self, collection: Collection) {
        let (snapshot, callbacks) = {
            let mut inner = self.lock();
            if !inner.reachable {
                return;
            }
            let state = inner.collection(collection);
            (state.snapshot(), state.callbacks())
        };
        for callback in callbacks {
            callback(snapshot.clone());
        }
    }

    fn subscribe(
        &self,
        collection: Collection,
        on_snapshot: SnapshotCallback,
    ) -> Result<Subscription, FeedError> {
        let (key, snapshot) = {
            let mut inner = self.lock();
            if !inner.reachable {
                return Err(FeedError::Subscription {
                    collection,
                    message: "store unreachable".to_string(),
                });
            }
            let key = inner.next_subscriber;
            inner.next_subscriber += 1;
            let state = inner.collection(collection);
            state.subscribers.push((key, Arc::clone(&on_snapshot)));
            (key, state.snapshot())
        };

        on_snapshot(snapshot);

        let inner = Arc::clone(&self.inner);
        Ok(Subscription::new(move || {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner
                .collection(collection)
                .subscribers
                .retain(|(k, _)| *k != key);
        }))
    }

    fn insert(&self, collection: Collection, mut fields: Value) -> Result<String, FeedError> {
        let id = {
            let mut inner = self.lock();
            let rejected = !inner.reachable
                || (collection == Collection::Alerts && inner.alert_writes_fail);
            if rejected {
                return Err(FeedError::Write {
                    collection,
                    message: "store unreachable".to_string(),
                });
            }

            let id = format!("-M{:08}", inner.next_key);
            inner.next_key += 1;

            let now = Value::from(Utc::now().timestamp_millis());
            if let Some(object) = fields.as_object_mut() {
                object.insert("createdAt".to_string(), now.clone());
                match collection {
                    Collection::Reports => {
                        object.insert("updatedAt".to_string(), now);
                    }
                    Collection::Alerts => {
                        object.insert("active".to_string(), Value::Bool(true));
                    }
                }
            }
            inner.collection(collection).records.insert(id.clone(), fields);
            id
        };

        log::debug!("Stored {collection} record {id}");
        self.publish(collection);
        Ok(id)
    }
}

impl Default for MemoryFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemoryFeed")
            .field("reports", &inner.reports.records.len())
            .field("alerts", &inner.alerts.records.len())
            .field("reachable", &inner.reachable)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteFeed for MemoryFeed {
    async fn subscribe_reports(
        &self,
        on_snapshot: SnapshotCallback,
    ) -> Result<Subscription, FeedError> {
        self.subscribe(Collection::Reports, on_snapshot)
    }

    async fn subscribe_alerts(
        &self,
        on_snapshot: SnapshotCallback,
    ) -> Result<Subscription, FeedError> {
        self.subscribe(Collection::Alerts, on_snapshot)
    }

    async fn create_report(&self, report: &NewReport) -> Result<String, FeedError> {
        self.insert(Collection::Reports, serde_json::to_value(report)?)
    }

    async fn create_alert(&self, alert: &NewAlert) -> Result<String, FeedError> {
        self.insert(Collection::Alerts, serde_json::to_value(alert)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    fn recorder() -> (SnapshotCallback, Arc<Mutex<Vec<Vec<RawRecord>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: SnapshotCallback = Arc::new(move |records: Vec<RawRecord>| {
            sink.lock().unwrap().push(records);
        });
        (callback, seen)
    }

    fn alert() -> NewAlert {
        NewAlert {
            title: "New report".to_string(),
            message: "Water rising".to_string(),
            alert_type: None,
            location: None,
            report_id: Some("r1".to_string()),
        }
    }

    #[tokio::test]
    async fn subscribe_delivers_current_snapshot() {
        let feed = MemoryFeed::new();
        feed.put(Collection::Reports, "r1", json!({ "type": "medical" }));

        let (callback, seen) = recorder();
        let _sub = feed.subscribe_reports(callback).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][0].id, "r1");
    }

    #[tokio::test]
    async fn writes_publish_full_snapshots() {
        let feed = MemoryFeed::new();
        let (callback, seen) = recorder();
        let _sub = feed.subscribe_alerts(callback).await.unwrap();

        let first = feed.create_alert(&alert()).await.unwrap();
        let second = feed.create_alert(&alert()).await.unwrap();
        assert_ne!(first, second);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2].len(), 2);
        assert_eq!(seen[2][0].fields["active"], json!(true));
        assert!(seen[2][0].fields["createdAt"].is_i64());
    }

    #[tokio::test]
    async fn unreachable_store_rejects() {
        let feed = MemoryFeed::new();
        feed.set_reachable(false);

        let (callback, _) = recorder();
        assert!(matches!(
            feed.subscribe_reports(callback).await,
            Err(FeedError::Subscription { .. })
        ));
        assert!(matches!(
            feed.create_alert(&alert()).await,
            Err(FeedError::Write { .. })
        ));
    }

    #[tokio::test]
    async fn alert_writes_can_fail_alone() {
        let feed = MemoryFeed::new();
        feed.set_alert_writes_fail(true);
        assert!(feed.create_alert(&alert()).await.is_err());
        assert!(feed.records(Collection::Alerts).is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let feed = MemoryFeed::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = feed
            .subscribe_reports(Arc::new(move |_: Vec<RawRecord>| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .await
            .unwrap();
        assert_eq!(feed.subscriber_count(Collection::Reports), 1);

        sub.unsubscribe();
        feed.clear(Collection::Reports);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(feed.subscriber_count(Collection::Reports), 0);
    }
}
