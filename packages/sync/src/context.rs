//! Application session wiring.
//!
//! An [`AppContext`] owns one store and everything that feeds it. It is
//! created once per session with [`AppContext::init`] and torn down with
//! [`AppContext::dispose`].

use std::sync::Arc;
use std::time::Duration;

use relief_map_device::geolocation::{
    DEFAULT_POSITION_TIMEOUT, FixedGeolocator, Geolocator, UnavailableGeolocator,
};
use relief_map_device::notifications::{LogNotifier, Notifier, Permission};
use relief_map_feed::memory::MemoryFeed;
use relief_map_feed::rtdb::RtdbFeed;
use relief_map_feed::{FeedError, RemoteFeed};
use relief_map_report_models::User;
use relief_map_store::{AppAction, AppState, Store};

use crate::config::AppConfig;
use crate::controller::SyncController;

/// A running client session.
#[derive(Debug)]
pub struct AppContext {
    store: Arc<Store>,
    controller: SyncController,
}

impl AppContext {
    /// Builds the session described by `config` and connects it.
    ///
    /// A configured database URL selects the realtime-database feed;
    /// otherwise an empty in-memory store is used.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] if the feed client cannot be built or the
    /// initial subscriptions fail.
    pub async fn init(config: &AppConfig) -> Result<Self, FeedError> {
        let feed: Arc<dyn RemoteFeed> = match config.rtdb() {
            Some(rtdb) => {
                log::info!("Using realtime database at {}", rtdb.database_url);
                Arc::new(RtdbFeed::new(rtdb)?)
            }
            None => {
                log::info!("No database URL configured; using an in-memory store");
                Arc::new(MemoryFeed::new())
            }
        };
        Self::with_feed(config, feed).await
    }

    /// Builds and connects a session over an existing feed.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] if the initial subscriptions fail.
    pub async fn with_feed(config: &AppConfig, feed: Arc<dyn RemoteFeed>) -> Result<Self, FeedError> {
        let store = Arc::new(Store::new());
        store.dispatch(AppAction::SetUser(Some(User::guest())));

        let permission = if config.notifications {
            Permission::Granted
        } else {
            Permission::Denied
        };
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier::new(permission));
        let controller =
            SyncController::new(Arc::clone(&store), feed).with_notifier(notifier);

        let geolocator: Box<dyn Geolocator> = match config.location {
            Some(position) => Box::new(FixedGeolocator::new(position)),
            None => Box::new(UnavailableGeolocator),
        };
        controller
            .locate(geolocator.as_ref(), DEFAULT_POSITION_TIMEOUT)
            .await;

        controller.connect().await?;
        Ok(Self { store, controller })
    }

    /// The session store.
    #[must_use]
    pub const fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// The session's sync controller.
    #[must_use]
    pub const fn controller(&self) -> &SyncController {
        &self.controller
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        self.store.state()
    }

    /// Waits until `predicate` holds for the current state, or `timeout`
    /// elapses. Returns whether the predicate held.
    pub async fn wait_for(
        &self,
        predicate: impl Fn(&AppState) -> bool + Send,
        timeout: Duration,
    ) -> bool {
        wait_for(&self.store, predicate, timeout).await
    }

    /// Disconnects the feed and disposes the store. The last state stays
    /// readable.
    pub fn dispose(&self) {
        self.controller.disconnect();
        self.store.dispose();
        log::debug!("Session disposed");
    }
}

/// Waits until `predicate` holds for the state of `store`, or `timeout`
/// elapses. Returns whether the predicate held.
pub async fn wait_for(
    store: &Store,
    predicate: impl Fn(&AppState) -> bool + Send,
    timeout: Duration,
) -> bool {
    let changed = Arc::new(tokio::sync::Notify::new());
    let listener = {
        let changed = Arc::clone(&changed);
        store.subscribe(move |_| changed.notify_one())
    };

    let deadline = tokio::time::Instant::now() + timeout;
    let held = loop {
        if predicate(&store.state()) {
            break true;
        }
        if tokio::time::timeout_at(deadline, changed.notified())
            .await
            .is_err()
        {
            break predicate(&store.state());
        }
    };

    store.unsubscribe(listener);
    held
}

#[cfg(test)]
mod tests {
    use relief_map_feed::Collection;
    use relief_map_report_models::LatLng;
    use serde_json::json;

    use super::*;
    use crate::controller::SessionState;

    #[tokio::test]
    async fn init_without_url_uses_memory_store() {
        let context = AppContext::init(&AppConfig::default()).await.unwrap();
        let state = context.state();
        assert!(state.reports.is_empty());
        assert!(!state.is_loading);
        assert!(state.user.as_ref().is_some_and(User::is_guest));
        assert_eq!(state.user_location, None);
        assert_eq!(context.controller().state(), SessionState::Subscribed);
    }

    #[tokio::test]
    async fn init_records_configured_location() {
        let config = AppConfig {
            location: Some(LatLng::new(1.0, 2.0)),
            ..AppConfig::default()
        };
        let context = AppContext::init(&config).await.unwrap();
        assert_eq!(context.state().user_location, Some(LatLng::new(1.0, 2.0)));
        assert_eq!(context.state().map_center, Some(LatLng::new(1.0, 2.0)));
    }

    #[tokio::test]
    async fn dispose_freezes_state() {
        let feed = MemoryFeed::new();
        let context = AppContext::with_feed(&AppConfig::default(), Arc::new(feed.clone()))
            .await
            .unwrap();
        context.dispose();

        feed.put(
            Collection::Reports,
            "r1",
            json!({ "type": "medical", "location": { "lat": 1.0, "lng": 2.0 } }),
        );
        assert!(context.state().reports.is_empty());
        assert!(context.store().is_disposed());
    }

    #[tokio::test]
    async fn wait_for_sees_later_dispatch() {
        let feed = MemoryFeed::new();
        let context = AppContext::with_feed(&AppConfig::default(), Arc::new(feed.clone()))
            .await
            .unwrap();

        let writer = tokio::spawn(async move {
            tokio::task::yield_now().await;
            feed.put(
                Collection::Reports,
                "r1",
                json!({ "type": "medical", "location": { "lat": 1.0, "lng": 2.0 } }),
            );
        });

        let held = context
            .wait_for(|state| state.reports.len() == 1, Duration::from_secs(5))
            .await;
        writer.await.unwrap();
        assert!(held);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_times_out() {
        let context = AppContext::init(&AppConfig::default()).await.unwrap();
        let held = context
            .wait_for(|state| !state.reports.is_empty(), Duration::from_secs(1))
            .await;
        assert!(!held);
    }
}
