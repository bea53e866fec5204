#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Remote report/alert feed adapters and raw record mapping.
//!
//! The remote store holds two collections, `reports` and `alerts`. Each
//! adapter implements [`RemoteFeed`]: subscribers receive the **whole**
//! collection on every change, and writes append a record and return its
//! id. Records arrive as loosely typed [`RawRecord`]s; [`mapping`] turns
//! them into strict domain types before anything reaches the store.

pub mod mapping;
pub mod memory;
pub mod retry;
pub mod rtdb;

use std::sync::Arc;

use async_trait::async_trait;
use relief_map_report_models::{
    AlertType, LatLng, Priority, ReportLocation, ReportStatus, ReportType,
};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Errors that can occur talking to the remote feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with an error status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response summary.
        message: String,
    },

    /// The response did not have the expected shape.
    #[error("Unexpected response: {message}")]
    Decode {
        /// What was wrong.
        message: String,
    },

    /// A write was rejected or the store was unreachable.
    #[error("Write to '{collection}' failed: {message}")]
    Write {
        /// Collection written to.
        collection: Collection,
        /// Underlying cause.
        message: String,
    },

    /// Subscribing to a collection failed.
    #[error("Subscription to '{collection}' failed: {message}")]
    Subscription {
        /// Collection subscribed to.
        collection: Collection,
        /// Underlying cause.
        message: String,
    },
}

/// The two remote collections.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Collection {
    /// Situational reports
    Reports,
    /// Broadcast alerts
    Alerts,
}

/// One record of a remote collection: its key and whatever fields the
/// writer stored.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Record key.
    pub id: String,
    /// Record body, normally a JSON object.
    pub fields: serde_json::Value,
}

impl RawRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(id: impl Into<String>, fields: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// Receives full-collection snapshots.
pub type SnapshotCallback = Arc<dyn Fn(Vec<RawRecord>) + Send + Sync>;

/// Handle to an active subscription. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wraps the function that tears the subscription down.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to tear down.
    #[must_use]
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Stops snapshot delivery.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Payload written when a report is submitted. Timestamps are assigned by
/// the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    /// Report category.
    #[serde(rename = "type")]
    pub report_type: ReportType,
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// City typed by the reporter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Where the report applies.
    pub location: ReportLocation,
    /// Initial status.
    pub status: ReportStatus,
    /// Urgency.
    pub priority: Priority,
    /// Contact details.
    pub contact: Option<String>,
    /// Kind of resource offered.
    pub resource_type: Option<String>,
    /// Capacity of a shelter or resource point.
    pub capacity: Option<u32>,
    /// Always `false` on submission.
    pub verified: bool,
}

/// Payload written for an alert, usually the companion of a new report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    /// Short title.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Severity; the store defaults missing values to `info`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<AlertType>,
    /// Point the alert refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LatLng>,
    /// Report this alert was generated for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
}

/// A remote, real-time store of reports and alerts.
///
/// Snapshots are authoritative and total: each one replaces the previous.
#[async_trait]
pub trait RemoteFeed: Send + Sync {
    /// Subscribes to the `reports` collection. Implementations deliver the
    /// current snapshot as soon as it is available and again after every
    /// change.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Subscription`] if the subscription cannot be
    /// established.
    async fn subscribe_reports(
        &self,
        on_snapshot: SnapshotCallback,
    ) -> Result<Subscription, FeedError>;

    /// Subscribes to the `alerts` collection.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Subscription`] if the subscription cannot be
    /// established.
    async fn subscribe_alerts(&self, on_snapshot: SnapshotCallback)
    -> Result<Subscription, FeedError>;

    /// Appends a report and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Write`] if the store is unreachable or rejects
    /// the write.
    async fn create_report(&self, report: &NewReport) -> Result<String, FeedError>;

    /// Appends an alert and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Write`] if the store is unreachable or rejects
    /// the write.
    async fn create_alert(&self, alert: &NewAlert) -> Result<String, FeedError>;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn subscription_cancels_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let counter = Arc::clone(&calls);
        {
            let _sub = Subscription::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn new_report_wire_shape() {
        let report = NewReport {
            report_type: ReportType::HelpNeeded,
            title: "Stuck on roof".to_string(),
            description: "Water rising fast".to_string(),
            city: None,
            location: ReportLocation {
                lat: 1.0,
                lng: 2.0,
                address: Some("1.0000, 2.0000".to_string()),
            },
            status: ReportStatus::Active,
            priority: Priority::High,
            contact: None,
            resource_type: None,
            capacity: None,
            verified: false,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["type"], "help-needed");
        assert_eq!(value["priority"], "high");
        assert_eq!(value["resourceType"], serde_json::Value::Null);
        assert_eq!(value["location"]["address"], "1.0000, 2.0000");
    }

    #[test]
    fn collection_paths() {
        assert_eq!(Collection::Reports.as_ref(), "reports");
        assert_eq!(Collection::Alerts.to_string(), "alerts");
    }
}
