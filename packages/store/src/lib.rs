#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reducer-driven application state store for the relief map client.
//!
//! All client state lives in a single [`AppState`] value owned by a
//! [`Store`]. State only changes by dispatching an [`AppAction`], which the
//! pure [`reduce`] function turns into the next state. The store performs
//! no I/O; the sync controller and the UI both talk to it only through
//! `dispatch`.
//!
//! Derived views (visible reports, per-category counts, unread badges) live
//! in [`filters`] and [`alerts`].

pub mod alerts;
pub mod filters;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use relief_map_report_models::{Alert, FilterSet, LatLng, Report, Route, User};

/// The whole client state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    /// Reports, most recent first as delivered by the feed.
    pub reports: Vec<Report>,
    /// Alerts, as delivered by the feed plus any local fallback alerts.
    pub alerts: Vec<Alert>,
    /// Active category filters.
    pub active_filters: FilterSet,
    /// Report opened in the details panel.
    pub selected_report: Option<Report>,
    /// Signed-in user, or the guest sentinel.
    pub user: Option<User>,
    /// Ids of alerts the user has not acknowledged yet.
    pub unread_alerts: BTreeSet<String>,
    /// Last known device position.
    pub user_location: Option<LatLng>,
    /// Where the map should be centered.
    pub map_center: Option<LatLng>,
    /// Current screen.
    pub route: Route,
    /// Waiting for the first reports snapshot.
    pub is_loading: bool,
    /// A report submission is in flight.
    pub is_submitting: bool,
    /// The report form is open.
    pub show_report_modal: bool,
    /// The alerts panel is open.
    pub show_alerts_modal: bool,
}

/// Every way the client state can change.
#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    /// Replace the report list wholesale. Nothing is merged.
    SetReports(Vec<Report>),
    /// Append one report. Only used for local fallback entities.
    AddReport(Report),
    /// Replace the report with the same id. No-op if the id is unknown.
    UpdateReport(Report),
    /// Replace the alert list wholesale.
    ///
    /// This does **not** touch `unread_alerts`. Whoever dispatches it is
    /// responsible for adding newly seen alert ids to the unread set in
    /// the same logical update, otherwise the new-alert badge under-counts.
    /// The sync controller does this with [`Store::dispatch_with`].
    SetAlerts(Vec<Alert>),
    /// Append one alert. Only used for local fallback entities.
    AddAlert(Alert),
    /// Replace the active filter selection.
    SetFilters(FilterSet),
    /// Open or close the report details panel.
    SetSelectedReport(Option<Report>),
    /// Sign in, sign out, or switch to guest.
    SetUser(Option<User>),
    /// Record the device position.
    SetUserLocation(Option<LatLng>),
    /// Move the map.
    SetMapCenter(Option<LatLng>),
    /// Switch screens.
    SetRoute(Route),
    /// Set the loading flag.
    SetLoading(bool),
    /// Set the submitting flag.
    SetSubmitting(bool),
    /// Set the report form visibility, or flip it when `None`.
    ToggleReportModal(Option<bool>),
    /// Set the alerts panel visibility, or flip it when `None`.
    ToggleAlertsModal(Option<bool>),
    /// Acknowledge an alert. Idempotent.
    MarkAlertRead(String),
    /// Replace the unread set wholesale.
    SetUnreadAlerts(Vec<String>),
}

/// Computes the state that follows `state` after `action`.
///
/// Never fails and never mutates its input. Actions naming ids that do not
/// exist are silent no-ops.
#[must_use]
pub fn reduce(state: &AppState, action: AppAction) -> AppState {
    let mut next = state.clone();
    match action {
        AppAction::SetReports(reports) => next.reports = reports,
        AppAction::AddReport(report) => next.reports.push(report),
        AppAction::UpdateReport(report) => {
            if let Some(existing) = next.reports.iter_mut().find(|r| r.id == report.id) {
                *existing = report;
            }
        }
        AppAction::SetAlerts(alerts) => next.alerts = alerts,
        AppAction::AddAlert(alert) => next.alerts.push(alert),
        AppAction::SetFilters(filters) => next.active_filters = filters,
        AppAction::SetSelectedReport(report) => next.selected_report = report,
        AppAction::SetUser(user) => next.user = user,
        AppAction::SetUserLocation(location) => next.user_location = location,
        AppAction::SetMapCenter(center) => next.map_center = center,
        AppAction::SetRoute(route) => next.route = route,
        AppAction::SetLoading(loading) => next.is_loading = loading,
        AppAction::SetSubmitting(submitting) => next.is_submitting = submitting,
        AppAction::ToggleReportModal(show) => {
            next.show_report_modal = show.unwrap_or(!state.show_report_modal);
        }
        AppAction::ToggleAlertsModal(show) => {
            next.show_alerts_modal = show.unwrap_or(!state.show_alerts_modal);
        }
        AppAction::MarkAlertRead(id) => {
            next.unread_alerts.remove(&id);
        }
        AppAction::SetUnreadAlerts(ids) => next.unread_alerts = ids.into_iter().collect(),
    }
    next
}

/// Applies `actions` in order.
#[must_use]
pub fn reduce_all(state: &AppState, actions: impl IntoIterator<Item = AppAction>) -> AppState {
    actions
        .into_iter()
        .fold(state.clone(), |acc, action| reduce(&acc, action))
}

/// Handle returned by [`Store::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&Arc<AppState>) + Send + Sync>;

struct Inner {
    state: Arc<AppState>,
    version: u64,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    disposed: bool,
    /// A dispatch is currently running listeners.
    notifying: bool,
}

/// Owner of the one [`AppState`].
///
/// Create one per application session and share it as `Arc<Store>`. Every
/// dispatch is applied under a single lock, so each completes before the
/// next is applied and no reader ever observes a half-applied update.
/// Snapshots handed out by [`Store::state`] are immutable; a later dispatch
/// produces a new snapshot rather than changing an old one.
///
/// Listeners run after the lock is released, so a listener may dispatch.
/// Only one thread delivers at a time: a dispatch landing while another is
/// notifying leaves its state to that delivery. Listeners therefore see
/// states in version order and always end on the current one, though
/// under contention they may skip intermediate versions.
pub struct Store {
    inner: Mutex<Inner>,
}

impl Store {
    /// Creates a store holding the default state.
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(AppState::default())
    }

    /// Creates a store holding `state`.
    #[must_use]
    pub fn with_state(state: AppState) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: Arc::new(state),
                version: 0,
                listeners: Vec::new(),
                next_listener: 0,
                disposed: false,
                notifying: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The reducer cannot panic, so a poisoned lock still guards a
        // consistent state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current state snapshot.
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.lock().state)
    }

    /// Number of state versions produced so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    /// Applies one action.
    pub fn dispatch(&self, action: AppAction) {
        self.dispatch_with(|_| vec![action]);
    }

    /// Applies several actions as one logical update: one lock
    /// acquisition, one new version, at most one listener notification.
    pub fn dispatch_all(&self, actions: Vec<AppAction>) {
        self.dispatch_with(|_| actions);
    }

    /// Computes actions from the current state and applies them, all under
    /// the store lock. Use this when the actions depend on the state they
    /// are applied to (unread diffs, set unions), so no other dispatch can
    /// land in between.
    pub fn dispatch_with(&self, build: impl FnOnce(&AppState) -> Vec<AppAction>) {
        {
            let mut inner = self.lock();
            if inner.disposed {
                log::debug!("Ignoring dispatch on disposed store");
                return;
            }
            let actions = build(&inner.state);
            if actions.is_empty() {
                return;
            }
            log::trace!("Dispatching {actions:?}");
            inner.state = Arc::new(reduce_all(&inner.state, actions));
            inner.version += 1;
            if inner.notifying {
                log::trace!("Delivery in progress; version {} queued", inner.version);
                return;
            }
            inner.notifying = true;
        }

        let _delivery = Delivery(self);
        let mut delivered = None;
        loop {
            let (version, state, listeners) = {
                let mut inner = self.lock();
                if delivered == Some(inner.version) || inner.disposed {
                    inner.notifying = false;
                    break;
                }
                let listeners: Vec<Listener> = inner
                    .listeners
                    .iter()
                    .map(|(_, listener)| Arc::clone(listener))
                    .collect();
                (inner.version, Arc::clone(&inner.state), listeners)
            };
            for listener in listeners {
                listener(&state);
            }
            delivered = Some(version);
        }
    }

    /// Registers a listener called with every new state snapshot.
    pub fn subscribe(&self, listener: impl Fn(&Arc<AppState>) + Send + Sync + 'static) -> ListenerId {
        let mut inner = self.lock();
        let id = ListenerId(inner.next_listener);
        inner.next_listener += 1;
        inner.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.lock().listeners.retain(|(listener_id, _)| *listener_id != id);
    }

    /// Tears the store down: listeners are dropped and further dispatches
    /// are ignored. The last state stays readable.
    pub fn dispose(&self) {
        let mut inner = self.lock();
        inner.disposed = true;
        inner.listeners.clear();
    }

    /// Returns `true` once [`Store::dispose`] has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }
}

/// Releases the delivery flag if a listener panics, so later dispatches
/// still notify.
struct Delivery<'a>(&'a Store);

impl Drop for Delivery<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock().notifying = false;
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Store")
            .field("version", &inner.version)
            .field("listeners", &inner.listeners.len())
            .field("disposed", &inner.disposed)
            .finish_non_exhaustive()
    }
}
