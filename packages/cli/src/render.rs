//! Plain-text rendering of client state.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use relief_map_report_models::{Alert, Report};
use relief_map_store::AppState;
use relief_map_store::alerts::{is_unread, unread_badge};
use relief_map_store::filters::{category_counts, is_filter_active, visible_reports};
use relief_map_sync::SubmitOutcome;

const TITLE_WIDTH: usize = 40;

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let cut: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

fn short_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

/// One-line status summary.
pub fn summary(state: &AppState) -> String {
    let mut line = format!(
        "{} reports ({} shown), {} alerts",
        state.reports.len(),
        visible_reports(state).len(),
        state.alerts.len()
    );
    if let Some(badge) = unread_badge(state) {
        let _ = write!(line, " [{badge} unread]");
    }
    if state.is_loading {
        line.push_str(", loading");
    }
    line
}

/// Filter bar: every category with its global count, active ones marked.
pub fn filter_bar(state: &AppState) -> String {
    category_counts(&state.reports)
        .into_iter()
        .map(|(filter, count)| {
            let marker = if is_filter_active(&state.active_filters, filter) {
                "*"
            } else {
                " "
            };
            format!("{marker}{} ({count})", filter.label())
        })
        .collect::<Vec<_>>()
        .join("  ")
}

/// Table row for a report.
pub fn report_row(report: &Report) -> String {
    let sync = if report.is_local() { " (pending sync)" } else { "" };
    format!(
        "{:<22} {:<12} {:<9} {:<17} {}{sync}",
        truncate(&report.id, 22),
        report.report_type.as_ref(),
        report.priority.as_ref(),
        short_time(report.created_at),
        truncate(&report.title, TITLE_WIDTH),
    )
}

/// Table row for an alert.
pub fn alert_row(state: &AppState, alert: &Alert) -> String {
    let marker = if is_unread(state, &alert.id) { "●" } else { " " };
    let location = alert
        .position()
        .map(|p| format!(" @ {}", p.short_address()))
        .unwrap_or_default();
    format!(
        "{marker} {:<8} {:<17} {}: {}{location}",
        alert.alert_type.as_ref(),
        short_time(alert.created_at),
        truncate(&alert.title, TITLE_WIDTH),
        alert.message,
    )
}

/// Outcome of a submission, as shown to the reporter.
pub fn outcome(outcome: &SubmitOutcome) -> String {
    match outcome {
        SubmitOutcome::Synced { report_id } => format!("Report submitted ({report_id})"),
        SubmitOutcome::AlertFallback { report_id, .. } => {
            format!("Report submitted ({report_id}); its alert is only shown locally")
        }
        SubmitOutcome::LocalOnly { report_id, .. } => {
            format!("Offline: report saved locally as {report_id}, pending sync")
        }
    }
}

#[cfg(test)]
mod tests {
    use relief_map_report_models::{
        AlertType, FilterSet, FilterType, Priority, ReportLocation, ReportStatus, ReportType,
    };

    use super::*;

    fn report(id: &str, report_type: ReportType) -> Report {
        let at = DateTime::from_timestamp(1_756_728_000, 0).unwrap();
        Report {
            id: id.to_string(),
            report_type,
            title: "Stuck on roof".to_string(),
            description: "Water rising fast".to_string(),
            location: ReportLocation {
                lat: 1.0,
                lng: 2.0,
                address: None,
            },
            created_at: at,
            updated_at: at,
            status: ReportStatus::Active,
            priority: Priority::High,
            reported_by: None,
            contact: None,
            resource_type: None,
            capacity: None,
            verified: false,
        }
    }

    #[test]
    fn summary_counts_visible_and_unread() {
        let state = AppState {
            reports: vec![
                report("r1", ReportType::Medical),
                report("r2", ReportType::HelpNeeded),
            ],
            active_filters: FilterSet::new([FilterType::Medical]),
            ..AppState::default()
        };
        assert_eq!(summary(&state), "2 reports (1 shown), 0 alerts");
    }

    #[test]
    fn filter_bar_marks_active() {
        let state = AppState {
            reports: vec![report("r1", ReportType::Medical)],
            active_filters: FilterSet::new([FilterType::Medical]),
            ..AppState::default()
        };
        let bar = filter_bar(&state);
        assert!(bar.contains(&format!("*{} (1)", FilterType::Medical.label())));
        assert!(bar.contains(&format!(" {} (1)", FilterType::All.label())));
    }

    #[test]
    fn local_reports_are_flagged() {
        assert!(report_row(&report("local-report-1", ReportType::Medical)).ends_with("(pending sync)"));
        assert!(!report_row(&report("-Nabc", ReportType::Medical)).contains("pending"));
    }

    #[test]
    fn unread_alerts_are_marked() {
        let alert = Alert {
            id: "a1".to_string(),
            title: "Flood".to_string(),
            message: "Evacuate".to_string(),
            alert_type: AlertType::Danger,
            area: None,
            location: None,
            report_id: None,
            created_at: DateTime::from_timestamp(0, 0).unwrap(),
            expires_at: None,
            active: true,
        };
        let mut state = AppState {
            alerts: vec![alert.clone()],
            ..AppState::default()
        };
        state.unread_alerts.insert("a1".to_string());
        assert!(alert_row(&state, &alert).starts_with('●'));
        assert!(summary(&state).ends_with("[1 unread]"));
    }

    #[test]
    fn long_titles_are_truncated() {
        assert_eq!(truncate("abcdefghij", 6), "abc...");
        assert_eq!(truncate("abc", 6), "abc");
    }
}
