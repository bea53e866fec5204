//! Subscription lifecycle and the write path.
//!
//! The controller is the only component that talks to both the remote feed
//! and the store. Snapshots are mapped and dispatched as they arrive;
//! submissions fall back to local entities when the remote store cannot be
//! reached.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use relief_map_device::geolocation::{Geolocator, position_with_timeout};
use relief_map_device::notifications::{self, Notification, Notifier};
use relief_map_feed::mapping::{map_alerts, map_reports};
use relief_map_feed::{FeedError, NewReport, RawRecord, RemoteFeed, SnapshotCallback, Subscription};
use relief_map_report_models::{Alert, AlertType, LatLng, Report};
use relief_map_store::alerts::unread_after_snapshot;
use relief_map_store::{AppAction, Store};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::submit::{
    DEFAULT_LOCATION, PendingWrite, ReportDraft, RetryReport, SubmitError, SubmitOutcome,
    companion_alert, local_alert, local_report,
};

/// Connection state of a [`SyncController`].
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SessionState {
    /// No subscriptions.
    #[default]
    Disconnected,
    /// Subscriptions are being established.
    Connecting,
    /// Both collections are live.
    Subscribed,
}

/// Gate every snapshot passes through. Snapshots are applied while holding
/// this lock, and disconnecting closes the gate under the same lock.
struct Gate {
    state: SessionState,
    generation: u64,
    subscriptions: Vec<Subscription>,
    /// Every alert id observed in any snapshot, across reconnects.
    seen_alerts: HashSet<String>,
    /// Whether the current session has applied its first alerts snapshot.
    alerts_primed: bool,
}

impl Gate {
    fn accepts(&self, generation: u64) -> bool {
        self.generation == generation && self.state != SessionState::Disconnected
    }
}

struct Shared {
    store: Arc<Store>,
    notifier: Mutex<Option<Arc<dyn Notifier>>>,
    gate: Mutex<Gate>,
    /// Mirror of `Gate::state`. Never held while dispatching, so store
    /// listeners can read it while a snapshot holds the gate.
    session: Mutex<SessionState>,
}

impl Shared {
    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> SessionState {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to `state`. Callers hold the gate.
    fn set_state(&self, gate: &mut Gate, state: SessionState) {
        gate.state = state;
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn apply_reports(&self, generation: u64, records: &[RawRecord]) {
        let gate = self.gate();
        if !gate.accepts(generation) {
            log::debug!("Dropping late reports snapshot ({} records)", records.len());
            return;
        }

        let reports = map_reports(records, Utc::now());
        log::debug!("Reports snapshot: {} of {} records", reports.len(), records.len());
        self.store.dispatch_all(vec![
            AppAction::SetReports(reports),
            AppAction::SetLoading(false),
        ]);
        drop(gate);
    }

    fn apply_alerts(&self, generation: u64, records: &[RawRecord]) {
        let mut gate = self.gate();
        if !gate.accepts(generation) {
            log::debug!("Dropping late alerts snapshot ({} records)", records.len());
            return;
        }

        let alerts = map_alerts(records, Utc::now());
        let fresh: Vec<Alert> = alerts
            .iter()
            .filter(|alert| !gate.seen_alerts.contains(&alert.id))
            .cloned()
            .collect();
        log::debug!("Alerts snapshot: {} alerts, {} new", alerts.len(), fresh.len());

        let seen = &gate.seen_alerts;
        self.store.dispatch_with(|state| {
            let unread = unread_after_snapshot(&state.unread_alerts, seen, &alerts);
            vec![
                AppAction::SetAlerts(alerts),
                AppAction::SetUnreadAlerts(unread.into_iter().collect()),
            ]
        });

        gate.seen_alerts
            .extend(fresh.iter().map(|alert| alert.id.clone()));
        let primed = std::mem::replace(&mut gate.alerts_primed, true);
        drop(gate);

        if primed {
            self.announce(fresh);
        }
    }

    /// Shows an OS notification for each newly arrived alert.
    fn announce(&self, alerts: Vec<Alert>) {
        let notifier = self
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(notifier) = notifier else {
            return;
        };
        let alerts: Vec<Alert> = alerts.into_iter().filter(|alert| alert.active).collect();
        if alerts.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::debug!("No async runtime; skipping {} notifications", alerts.len());
            return;
        };
        runtime.spawn(async move {
            for alert in &alerts {
                notifications::notify(notifier.as_ref(), &alert_notification(alert)).await;
            }
        });
    }
}

fn alert_notification(alert: &Alert) -> Notification {
    match alert.alert_type {
        AlertType::Danger | AlertType::Warning => {
            let location = alert.position().map(|p| p.short_address());
            Notification::emergency(alert.title.clone(), &alert.message, location.as_deref())
        }
        AlertType::Info | AlertType::Success => {
            Notification::new(alert.title.clone(), alert.message.clone())
        }
    }
}

/// Keeps a [`Store`] in sync with a [`RemoteFeed`].
pub struct SyncController {
    feed: Arc<dyn RemoteFeed>,
    shared: Arc<Shared>,
    pending: Mutex<Vec<PendingWrite>>,
}

impl SyncController {
    /// Creates a disconnected controller.
    #[must_use]
    pub fn new(store: Arc<Store>, feed: Arc<dyn RemoteFeed>) -> Self {
        Self {
            feed,
            shared: Arc::new(Shared {
                store,
                notifier: Mutex::new(None),
                gate: Mutex::new(Gate {
                    state: SessionState::Disconnected,
                    generation: 0,
                    subscriptions: Vec::new(),
                    seen_alerts: HashSet::new(),
                    alerts_primed: false,
                }),
                session: Mutex::new(SessionState::Disconnected),
            }),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Shows OS notifications for alerts that arrive after the initial
    /// snapshot.
    #[must_use]
    pub fn with_notifier(self, notifier: Arc<dyn Notifier>) -> Self {
        self.set_notifier(Some(notifier));
        self
    }

    /// Replaces the notifier, or stops notifying with `None`. Takes effect
    /// from the next alerts snapshot, connected or not.
    pub fn set_notifier(&self, notifier: Option<Arc<dyn Notifier>>) {
        *self
            .shared
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = notifier;
    }

    /// The store this controller feeds.
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.shared.store
    }

    /// Current connection state. Safe to call from a store listener.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.session()
    }

    fn pending(&self) -> MutexGuard<'_, Vec<PendingWrite>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot_callback(
        &self,
        generation: u64,
        apply: fn(&Shared, u64, &[RawRecord]),
    ) -> SnapshotCallback {
        let shared = Arc::clone(&self.shared);
        Arc::new(move |records: Vec<RawRecord>| {
            apply(&shared, generation, &records);
        })
    }

    /// Subscribes to both collections. Snapshots are applied to the store
    /// from then on. Calling this while connected does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Subscription`] if either subscription fails. The
    /// controller is then disconnected and existing collections are left as
    /// they were.
    pub async fn connect(&self) -> Result<(), FeedError> {
        let generation = {
            let mut gate = self.shared.gate();
            if gate.state != SessionState::Disconnected {
                log::debug!("Already {}", gate.state);
                return Ok(());
            }
            gate.generation += 1;
            self.shared.set_state(&mut gate, SessionState::Connecting);
            gate.alerts_primed = false;
            gate.generation
        };
        log::info!("Connecting to remote feed");
        self.shared.store.dispatch(AppAction::SetLoading(true));

        let reports = self
            .feed
            .subscribe_reports(self.snapshot_callback(generation, Shared::apply_reports))
            .await;
        let reports = match reports {
            Ok(subscription) => subscription,
            Err(e) => {
                self.abort_connect(generation, &e);
                return Err(e);
            }
        };

        let alerts = self
            .feed
            .subscribe_alerts(self.snapshot_callback(generation, Shared::apply_alerts))
            .await;
        let alerts = match alerts {
            Ok(subscription) => subscription,
            Err(e) => {
                reports.unsubscribe();
                self.abort_connect(generation, &e);
                return Err(e);
            }
        };

        let mut gate = self.shared.gate();
        if !gate.accepts(generation) {
            drop(gate);
            log::debug!("Disconnected while connecting; dropping subscriptions");
            reports.unsubscribe();
            alerts.unsubscribe();
            return Ok(());
        }
        self.shared.set_state(&mut gate, SessionState::Subscribed);
        gate.subscriptions.extend([reports, alerts]);
        drop(gate);

        log::info!("Subscribed to reports and alerts");
        Ok(())
    }

    fn abort_connect(&self, generation: u64, error: &FeedError) {
        let mut gate = self.shared.gate();
        if gate.generation == generation {
            self.shared.set_state(&mut gate, SessionState::Disconnected);
        }
        drop(gate);
        log::warn!("Failed to connect to remote feed: {error}");
        self.shared.store.dispatch(AppAction::SetLoading(false));
    }

    /// Cancels both subscriptions. Once this returns, no snapshot reaches
    /// the store, even one already in flight.
    ///
    /// Must not be called from a store listener, which may run while a
    /// snapshot holds the gate. [`Self::state`] has no such restriction.
    pub fn disconnect(&self) {
        let subscriptions = {
            let mut gate = self.shared.gate();
            if gate.state == SessionState::Disconnected {
                return;
            }
            self.shared.set_state(&mut gate, SessionState::Disconnected);
            std::mem::take(&mut gate.subscriptions)
        };
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        log::info!("Disconnected from remote feed");
    }

    /// Writes a new report and its companion alert.
    ///
    /// Remote failures are absorbed: if the report cannot be written, a
    /// local report and alert are added to the store and the write is
    /// queued for [`Self::retry_pending`]; if only the alert fails, a local
    /// alert is added. Local entities disappear with the next authoritative
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Invalid`] if the draft fails validation, in
    /// which case nothing is dispatched.
    pub async fn submit_report(&self, draft: &ReportDraft) -> Result<SubmitOutcome, SubmitError> {
        draft.validate()?;

        let store = &self.shared.store;
        let position = draft
            .location
            .or(store.state().user_location)
            .unwrap_or(DEFAULT_LOCATION);
        let payload = draft.to_new_report(position);

        store.dispatch(AppAction::SetSubmitting(true));
        let outcome = self.write(payload).await;
        store.dispatch_all(vec![
            AppAction::ToggleReportModal(Some(false)),
            AppAction::SetSubmitting(false),
        ]);

        log::info!("Submitted report: {outcome:?}");
        Ok(outcome)
    }

    async fn write(&self, payload: NewReport) -> SubmitOutcome {
        match self.feed.create_report(&payload).await {
            Ok(report_id) => match self.feed.create_alert(&companion_alert(&payload, &report_id)).await {
                Ok(_) => SubmitOutcome::Synced { report_id },
                Err(e) => {
                    log::warn!("Failed to write alert for report {report_id}, keeping it locally: {e}");
                    let alert = local_alert(companion_alert(&payload, &report_id), Utc::now());
                    let alert_id = alert.id.clone();
                    self.add_local(None, alert);
                    SubmitOutcome::AlertFallback {
                        report_id,
                        alert_id,
                    }
                }
            },
            Err(e) => {
                log::warn!("Failed to write report, falling back to local state: {e}");
                let now = Utc::now();
                let report = local_report(&payload, now);
                let alert = local_alert(companion_alert(&payload, &report.id), now);
                let report_id = report.id.clone();
                let alert_id = alert.id.clone();
                self.pending()
                    .push(PendingWrite::new(payload, report_id.clone(), &e));
                self.add_local(Some(report), alert);
                SubmitOutcome::LocalOnly {
                    report_id,
                    alert_id,
                }
            }
        }
    }

    /// Adds fallback entities and marks the alert unread in one update.
    fn add_local(&self, report: Option<Report>, alert: Alert) {
        self.shared.store.dispatch_with(move |state| {
            let mut unread: Vec<String> = state.unread_alerts.iter().cloned().collect();
            unread.push(alert.id.clone());
            let mut actions: Vec<AppAction> = report.into_iter().map(AppAction::AddReport).collect();
            actions.push(AppAction::AddAlert(alert));
            actions.push(AppAction::SetUnreadAlerts(unread));
            actions
        });
    }

    /// Writes that failed and are waiting for [`Self::retry_pending`].
    #[must_use]
    pub fn pending_writes(&self) -> Vec<PendingWrite> {
        self.pending().clone()
    }

    /// Re-attempts every queued write, oldest first. Writes that succeed
    /// leave the queue; their records arrive with the next snapshot, which
    /// also replaces the local stand-ins.
    pub async fn retry_pending(&self) -> RetryReport {
        let queued = std::mem::take(&mut *self.pending());
        if queued.is_empty() {
            return RetryReport::default();
        }
        log::info!("Retrying {} pending writes", queued.len());

        let mut synced = 0;
        let mut failed = Vec::new();
        for mut write in queued {
            match self.feed.create_report(&write.report).await {
                Ok(report_id) => {
                    synced += 1;
                    log::info!("Pending report {} stored as {report_id}", write.local_report_id);
                    if let Err(e) = self
                        .feed
                        .create_alert(&companion_alert(&write.report, &report_id))
                        .await
                    {
                        log::warn!("Failed to write alert for report {report_id}: {e}");
                    }
                }
                Err(e) => {
                    write.attempts += 1;
                    write.last_error = e.to_string();
                    log::debug!(
                        "Pending report {} still failing after {} attempts: {e}",
                        write.local_report_id,
                        write.attempts
                    );
                    failed.push(write);
                }
            }
        }

        let mut pending = self.pending();
        let remaining = failed.len() + pending.len();
        // Writes queued while retrying go after the ones retried here.
        failed.append(&mut pending);
        *pending = failed;

        RetryReport { synced, remaining }
    }

    /// Asks the device for its position once and records it. The map is
    /// centered on it if nothing else has centered the map yet. Failures
    /// leave the app in no-location mode.
    pub async fn locate(&self, geolocator: &dyn Geolocator, timeout: Duration) -> Option<LatLng> {
        match position_with_timeout(geolocator, timeout).await {
            Ok(position) => {
                log::info!("Device position: {}", position.short_address());
                self.shared.store.dispatch_with(|state| {
                    let mut actions = vec![AppAction::SetUserLocation(Some(position))];
                    if state.map_center.is_none() {
                        actions.push(AppAction::SetMapCenter(Some(position)));
                    }
                    actions
                });
                Some(position)
            }
            Err(e) => {
                log::info!("Continuing without location: {e}");
                None
            }
        }
    }
}

impl std::fmt::Debug for SyncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncController")
            .field("state", &self.state())
            .field("pending", &self.pending().len())
            .finish_non_exhaustive()
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.disconnect();
    }
}
