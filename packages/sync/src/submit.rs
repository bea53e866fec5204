//! Report submission: draft validation, remote payloads and the local
//! fallback entities used when the remote store cannot be reached.

use chrono::{DateTime, Utc};
use relief_map_feed::{FeedError, NewAlert, NewReport};
use relief_map_report_models::{
    Alert, AlertType, LOCAL_ID_PREFIX, LatLng, Priority, Report, ReportLocation, ReportStatus,
    ReportType,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a report is placed when neither the draft nor the device knows a
/// position.
pub const DEFAULT_LOCATION: LatLng = LatLng::new(40.7128, -74.0060);

const MIN_TITLE_LEN: usize = 3;
const MIN_DESCRIPTION_LEN: usize = 10;
const FALLBACK_ALERT_TITLE: &str = "New report";

/// A report as typed into the submission form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDraft {
    /// Report category.
    #[serde(rename = "type")]
    pub report_type: ReportType,
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// City typed by the reporter.
    #[serde(default)]
    pub city: Option<String>,
    /// Explicit position; the device position is used when absent.
    #[serde(default)]
    pub location: Option<LatLng>,
    /// Urgency.
    #[serde(default)]
    pub priority: Priority,
    /// Contact details.
    #[serde(default)]
    pub contact: Option<String>,
    /// Kind of resource offered. Required for [`ReportType::Resources`].
    #[serde(default)]
    pub resource_type: Option<String>,
    /// Capacity of a shelter or resource point.
    #[serde(default)]
    pub capacity: Option<u32>,
}

impl ReportDraft {
    /// A draft with only the required fields set.
    #[must_use]
    pub fn new(
        report_type: ReportType,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            report_type,
            title: title.into(),
            description: description.into(),
            city: None,
            location: None,
            priority: Priority::default(),
            contact: None,
            resource_type: None,
            capacity: None,
        }
    }

    /// Checks the draft the way the submission form does.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::TitleRequired);
        }
        if title.chars().count() < MIN_TITLE_LEN {
            return Err(ValidationError::TitleTooShort {
                min: MIN_TITLE_LEN,
            });
        }

        let description = self.description.trim();
        if description.is_empty() {
            return Err(ValidationError::DescriptionRequired);
        }
        if description.chars().count() < MIN_DESCRIPTION_LEN {
            return Err(ValidationError::DescriptionTooShort {
                min: MIN_DESCRIPTION_LEN,
            });
        }

        if self.report_type == ReportType::Resources
            && non_blank(self.resource_type.as_deref()).is_none()
        {
            return Err(ValidationError::ResourceTypeRequired);
        }

        Ok(())
    }

    /// The payload written to the remote store, placed at `position`.
    #[must_use]
    pub fn to_new_report(&self, position: LatLng) -> NewReport {
        NewReport {
            report_type: self.report_type,
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            city: non_blank(self.city.as_deref()),
            location: ReportLocation {
                lat: position.lat,
                lng: position.lng,
                address: Some(position.short_address()),
            },
            status: ReportStatus::Active,
            priority: self.priority,
            contact: non_blank(self.contact.as_deref()),
            resource_type: non_blank(self.resource_type.as_deref()),
            capacity: self.capacity,
            verified: false,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Why a draft was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Empty title.
    #[error("Title is required")]
    TitleRequired,

    /// Title under the minimum length.
    #[error("Title must be at least {min} characters")]
    TitleTooShort {
        /// Minimum length.
        min: usize,
    },

    /// Empty description.
    #[error("Description is required")]
    DescriptionRequired,

    /// Description under the minimum length.
    #[error("Description must be at least {min} characters")]
    DescriptionTooShort {
        /// Minimum length.
        min: usize,
    },

    /// Resource reports must say what is offered.
    #[error("Resource type is required")]
    ResourceTypeRequired,
}

/// Errors from [`crate::SyncController::submit_report`]. Remote failures
/// are not errors: they produce local fallback entities instead.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The draft failed validation; nothing was written or dispatched.
    #[error("Invalid report: {0}")]
    Invalid(#[from] ValidationError),
}

/// How far a submission got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Report and companion alert were both stored remotely.
    Synced {
        /// Remote report id.
        report_id: String,
    },
    /// The report was stored remotely but its alert was only added locally.
    AlertFallback {
        /// Remote report id.
        report_id: String,
        /// Id of the local alert.
        alert_id: String,
    },
    /// Nothing reached the remote store. Both entities exist only locally
    /// until the next snapshot, and the write is queued for retry.
    LocalOnly {
        /// Id of the local report.
        report_id: String,
        /// Id of the local alert.
        alert_id: String,
    },
}

impl SubmitOutcome {
    /// Id of the submitted report, remote or local.
    #[must_use]
    pub fn report_id(&self) -> &str {
        match self {
            Self::Synced { report_id }
            | Self::AlertFallback { report_id, .. }
            | Self::LocalOnly { report_id, .. } => report_id,
        }
    }

    /// Returns `true` if something still has to reach the remote store.
    #[must_use]
    pub const fn is_pending_sync(&self) -> bool {
        !matches!(self, Self::Synced { .. })
    }
}

/// Result of [`crate::SyncController::retry_pending`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryReport {
    /// Writes that reached the remote store.
    pub synced: usize,
    /// Writes still queued.
    pub remaining: usize,
}

/// A queued write that has not reached the remote store yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    /// Payload to write.
    pub report: NewReport,
    /// Id of the local report shown in its place.
    pub local_report_id: String,
    /// Last error.
    pub last_error: String,
    /// Attempts so far.
    pub attempts: u32,
}

impl PendingWrite {
    pub(crate) fn new(report: NewReport, local_report_id: String, error: &FeedError) -> Self {
        Self {
            report,
            local_report_id,
            last_error: error.to_string(),
            attempts: 1,
        }
    }
}

/// Generates a local id such as `local-report-6f1c…`.
#[must_use]
pub fn local_id(kind: &str) -> String {
    format!("{LOCAL_ID_PREFIX}{kind}-{}", uuid::Uuid::new_v4())
}

/// Alert written alongside a report so it shows in the alerts list.
#[must_use]
pub fn companion_alert(report: &NewReport, report_id: &str) -> NewAlert {
    let title = if report.title.is_empty() {
        FALLBACK_ALERT_TITLE.to_string()
    } else {
        report.title.clone()
    };
    NewAlert {
        title,
        message: report.description.clone(),
        alert_type: None,
        location: Some(report.location.position()),
        report_id: Some(report_id.to_string()),
    }
}

/// Local stand-in for a report that could not be written.
#[must_use]
pub fn local_report(report: &NewReport, now: DateTime<Utc>) -> Report {
    Report {
        id: local_id("report"),
        report_type: report.report_type,
        title: report.title.clone(),
        description: report.description.clone(),
        location: report.location.clone(),
        created_at: now,
        updated_at: now,
        status: ReportStatus::Active,
        priority: report.priority,
        reported_by: None,
        contact: report.contact.clone(),
        resource_type: report.resource_type.clone(),
        capacity: report.capacity,
        verified: false,
    }
}

/// Local stand-in for an alert that could not be written.
#[must_use]
pub fn local_alert(alert: NewAlert, now: DateTime<Utc>) -> Alert {
    Alert {
        id: local_id("alert"),
        title: alert.title,
        message: alert.message,
        alert_type: alert.alert_type.unwrap_or(AlertType::Info),
        area: None,
        location: alert.location,
        report_id: alert.report_id,
        created_at: now,
        expires_at: None,
        active: true,
    }
}
