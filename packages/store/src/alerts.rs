//! Alert views and unread tracking helpers.
//!
//! The unread set is kept by whoever dispatches [`AppAction::SetAlerts`];
//! [`unread_after_snapshot`] computes the set that should accompany a new
//! alert list.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use relief_map_report_models::{Alert, Route};

use crate::{AppAction, AppState};

/// Returns `true` if the alert has not been acknowledged.
#[must_use]
pub fn is_unread(state: &AppState, alert_id: &str) -> bool {
    state.unread_alerts.contains(alert_id)
}

/// Number of alerts in the current list that are still unread. Ids in the
/// unread set without a matching alert are not counted.
#[must_use]
pub fn unread_count(state: &AppState) -> usize {
    state
        .alerts
        .iter()
        .filter(|alert| state.unread_alerts.contains(&alert.id))
        .count()
}

/// Alerts flagged active.
#[must_use]
pub fn active_alerts(state: &AppState) -> Vec<&Alert> {
    state.alerts.iter().filter(|alert| alert.active).collect()
}

/// Alerts flagged active that have not expired at `now`.
#[must_use]
pub fn current_alerts(state: &AppState, now: DateTime<Utc>) -> Vec<&Alert> {
    state
        .alerts
        .iter()
        .filter(|alert| alert.active && !alert.is_expired(now))
        .collect()
}

/// Badge text for the header bell: `None` when nothing is unread, `"9+"`
/// past nine.
#[must_use]
pub fn unread_badge(state: &AppState) -> Option<String> {
    match unread_count(state) {
        0 => None,
        n if n > 9 => Some("9+".to_string()),
        n => Some(n.to_string()),
    }
}

/// Unread set to store alongside a new alert snapshot.
///
/// `seen` holds every alert id observed before this snapshot. Ids in
/// `alerts` that were never seen become unread; existing unread ids are kept
/// only while their alert is still in the list. Acknowledged alerts stay
/// read because they are already in `seen`.
#[must_use]
pub fn unread_after_snapshot(
    unread: &BTreeSet<String>,
    seen: &HashSet<String>,
    alerts: &[Alert],
) -> BTreeSet<String> {
    alerts
        .iter()
        .filter(|alert| unread.contains(&alert.id) || !seen.contains(&alert.id))
        .map(|alert| alert.id.clone())
        .collect()
}

/// Actions for opening an alert from the alert list: acknowledge it and,
/// if it has a position, show it on the map.
#[must_use]
pub fn open_alert_actions(alert: &Alert) -> Vec<AppAction> {
    let mut actions = vec![AppAction::MarkAlertRead(alert.id.clone())];
    if let Some(position) = alert.position() {
        actions.push(AppAction::SetMapCenter(Some(position)));
        actions.push(AppAction::SetRoute(Route::Home));
    }
    actions
}

/// Actions for dismissing an alert banner. There is no per-id delete; the
/// list is replaced without the alert. The next authoritative snapshot
/// brings it back if it is still live remotely.
#[must_use]
pub fn dismiss_alert_actions(state: &AppState, alert_id: &str) -> Vec<AppAction> {
    let remaining = state
        .alerts
        .iter()
        .filter(|alert| alert.id != alert_id)
        .cloned()
        .collect();
    vec![AppAction::SetAlerts(remaining)]
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use relief_map_report_models::LatLng;

    use super::*;
    use crate::test_support::alert;
    use crate::{reduce, reduce_all};

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn unread_count_ignores_stale_ids() {
        let state = AppState {
            alerts: vec![alert("a1"), alert("a2")],
            unread_alerts: ids(&["a1", "gone"]),
            ..AppState::default()
        };
        assert_eq!(unread_count(&state), 1);
        assert!(is_unread(&state, "a1"));
        assert!(!is_unread(&state, "a2"));
    }

    #[test]
    fn badge_caps_at_nine() {
        let alerts: Vec<Alert> = (0..12).map(|i| alert(&format!("a{i}"))).collect();
        let unread = alerts.iter().map(|a| a.id.clone()).collect();
        let state = AppState {
            alerts,
            unread_alerts: unread,
            ..AppState::default()
        };
        assert_eq!(unread_badge(&state).as_deref(), Some("9+"));
        assert_eq!(unread_badge(&AppState::default()), None);
    }

    #[test]
    fn first_snapshot_marks_everything_unread() {
        let unread = unread_after_snapshot(
            &BTreeSet::new(),
            &HashSet::new(),
            &[alert("a1"), alert("a2")],
        );
        assert_eq!(unread, ids(&["a1", "a2"]));
    }

    #[test]
    fn read_alerts_stay_read() {
        let seen: HashSet<String> = ["a1".to_string(), "a2".to_string()].into();
        let unread = unread_after_snapshot(
            &ids(&["a2"]),
            &seen,
            &[alert("a1"), alert("a2"), alert("a3")],
        );
        assert_eq!(unread, ids(&["a2", "a3"]));
    }

    #[test]
    fn removed_alerts_are_pruned() {
        let seen: HashSet<String> = ["a1".to_string()].into();
        let unread = unread_after_snapshot(&ids(&["a1"]), &seen, &[]);
        assert!(unread.is_empty());
    }

    #[test]
    fn opening_alert_marks_read_and_centers() {
        let mut flood = alert("a1");
        flood.location = Some(LatLng::new(5.0, 6.0));
        let state = AppState {
            alerts: vec![flood.clone()],
            unread_alerts: ids(&["a1"]),
            route: Route::Alerts,
            ..AppState::default()
        };

        let next = reduce_all(&state, open_alert_actions(&flood));
        assert!(next.unread_alerts.is_empty());
        assert_eq!(next.map_center, Some(LatLng::new(5.0, 6.0)));
        assert_eq!(next.route, Route::Home);
    }

    #[test]
    fn opening_alert_without_position_only_marks_read() {
        assert_eq!(open_alert_actions(&alert("a1")).len(), 1);
    }

    #[test]
    fn dismiss_replaces_list() {
        let state = AppState {
            alerts: vec![alert("a1"), alert("a2")],
            ..AppState::default()
        };
        let mut next = state.clone();
        for action in dismiss_alert_actions(&state, "a1") {
            next = reduce(&next, action);
        }
        assert_eq!(next.alerts.len(), 1);
        assert_eq!(next.alerts[0].id, "a2");
    }

    #[test]
    fn expired_and_inactive_alerts_filtered() {
        let now = Utc::now();
        let mut expired = alert("old");
        expired.expires_at = Some(now - Duration::hours(1));
        let mut inactive = alert("off");
        inactive.active = false;
        let state = AppState {
            alerts: vec![alert("live"), expired, inactive],
            ..AppState::default()
        };

        assert_eq!(active_alerts(&state).len(), 2);
        let current = current_alerts(&state, now);
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id, "live");
    }
}
