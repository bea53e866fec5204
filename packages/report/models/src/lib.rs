#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Report, alert, user, and filter types for the relief map.
//!
//! These are the strict domain entities the store holds. Raw records from
//! the remote feed are parsed into these types at the adapter boundary, so
//! nothing loosely typed ever reaches application state.
//!
//! Wire names use kebab-case (`help-needed`, `safe-zone`) to match the
//! records written by the web client into the shared database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Prefix carried by the ids of locally synthesized (fallback) entities.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Sentinel user id for unauthenticated sessions.
pub const GUEST_USER_ID: &str = "guest";

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl LatLng {
    /// Creates a coordinate pair.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Formats the coordinate as `"lat, lng"` with four decimals, which is
    /// what submitted reports use as their display address.
    #[must_use]
    pub fn short_address(&self) -> String {
        format!("{:.4}, {:.4}", self.lat, self.lng)
    }
}

/// Where a report was filed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportLocation {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Optional human-readable address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl ReportLocation {
    /// Returns the bare coordinate of this location.
    #[must_use]
    pub const fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

impl From<LatLng> for ReportLocation {
    fn from(value: LatLng) -> Self {
        Self {
            lat: value.lat,
            lng: value.lng,
            address: None,
        }
    }
}

/// Category of a situational report.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ReportType {
    /// Emergency assistance required
    HelpNeeded,
    /// Medical help or facility
    Medical,
    /// Safe shelter or area
    SafeZone,
    /// Food, water, supplies
    Resources,
    /// Volunteer help required
    Volunteer,
}

impl ReportType {
    /// Short label used in filter chips.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::HelpNeeded => "Help",
            Self::Medical => "Medical",
            Self::SafeZone => "Safe",
            Self::Resources => "Resources",
            Self::Volunteer => "Volunteers",
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::HelpNeeded,
            Self::Medical,
            Self::SafeZone,
            Self::Resources,
            Self::Volunteer,
        ]
    }
}

/// Lifecycle status of a report.
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
pub enum ReportStatus {
    /// Still relevant
    #[default]
    Active,
    /// Need has been met
    Resolved,
    /// Confirmed by a trusted party
    Verified,
}

/// Urgency of a report, ordered from least to most urgent.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Priority {
    /// Can wait
    Low,
    /// Default urgency
    #[default]
    Medium,
    /// Needs attention soon
    High,
    /// Life-threatening
    Critical,
}

/// A single situational report shown on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Unique id, assigned by the remote store or generated locally on
    /// fallback (see [`LOCAL_ID_PREFIX`]).
    pub id: String,
    /// Report category.
    #[serde(rename = "type")]
    pub report_type: ReportType,
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Where the report was filed.
    pub location: ReportLocation,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// When the report was last changed.
    pub updated_at: DateTime<Utc>,
    /// Lifecycle status.
    pub status: ReportStatus,
    /// Urgency.
    pub priority: Priority,
    /// Who filed the report, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_by: Option<String>,
    /// Contact details left by the reporter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    /// Kind of resource offered (resources reports).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Capacity of a shelter or resource point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    /// Whether the report has been verified.
    pub verified: bool,
}

impl Report {
    /// Returns `true` if this report was synthesized locally after a failed
    /// remote write and has not been acknowledged by the remote store.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }
}

/// Severity of an alert.
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
pub enum AlertType {
    /// Be careful
    Warning,
    /// Take action now
    Danger,
    /// For information
    #[default]
    Info,
    /// Good news (shelter opened, route cleared)
    Success,
}

/// Circular area an alert applies to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertArea {
    /// Center of the area.
    pub center: LatLng,
    /// Radius in meters.
    pub radius: f64,
}

/// A broadcastable notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Unique id.
    pub id: String,
    /// Short title.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Severity.
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    /// Area the alert covers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<AlertArea>,
    /// Point the alert refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LatLng>,
    /// Report that produced this alert, for companion alerts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    /// When the alert was issued.
    pub created_at: DateTime<Utc>,
    /// When the alert stops being relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether the alert is still in effect.
    pub active: bool,
}

impl Alert {
    /// Returns `true` if this alert was synthesized locally.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }

    /// Returns `true` if the alert has an expiry at or before `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }

    /// The point to center the map on: the explicit location, else the
    /// center of the alert area.
    #[must_use]
    pub fn position(&self) -> Option<LatLng> {
        self.location.or_else(|| self.area.map(|area| area.center))
    }
}

/// Role of a signed-in user.
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
pub enum UserRole {
    /// Regular user
    #[default]
    User,
    /// Registered volunteer
    Volunteer,
    /// Administrator
    Admin,
}

/// The person using the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User id; [`GUEST_USER_ID`] for guest sessions.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Role.
    pub role: UserRole,
    /// Last known location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LatLng>,
    /// Whether the account is verified.
    pub verified: bool,
}

impl User {
    /// Creates the guest user.
    #[must_use]
    pub fn guest() -> Self {
        Self {
            id: GUEST_USER_ID.to_string(),
            name: "Guest".to_string(),
            email: None,
            role: UserRole::User,
            location: None,
            verified: false,
        }
    }

    /// Returns `true` if this is the guest sentinel. The check is on the id
    /// alone; there is no separate flag.
    #[must_use]
    pub fn is_guest(&self) -> bool {
        self.id == GUEST_USER_ID
    }
}

/// Returns `true` when nobody is signed in or the user is the guest
/// sentinel.
#[must_use]
pub fn is_guest_session(user: Option<&User>) -> bool {
    user.is_none_or(User::is_guest)
}

/// A report category filter, or `All`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FilterType {
    /// Every category
    All,
    /// [`ReportType::HelpNeeded`]
    HelpNeeded,
    /// [`ReportType::Medical`]
    Medical,
    /// [`ReportType::SafeZone`]
    SafeZone,
    /// [`ReportType::Resources`]
    Resources,
    /// [`ReportType::Volunteer`]
    Volunteer,
}

impl FilterType {
    /// The report category this filter selects, `None` for [`Self::All`].
    #[must_use]
    pub const fn report_type(self) -> Option<ReportType> {
        match self {
            Self::All => None,
            Self::HelpNeeded => Some(ReportType::HelpNeeded),
            Self::Medical => Some(ReportType::Medical),
            Self::SafeZone => Some(ReportType::SafeZone),
            Self::Resources => Some(ReportType::Resources),
            Self::Volunteer => Some(ReportType::Volunteer),
        }
    }

    /// Short label used in filter chips.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self.report_type() {
            Some(report_type) => report_type.label(),
            None => "All",
        }
    }

    /// Returns all variants of this enum, `All` first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::All,
            Self::HelpNeeded,
            Self::Medical,
            Self::SafeZone,
            Self::Resources,
            Self::Volunteer,
        ]
    }
}

impl From<ReportType> for FilterType {
    fn from(value: ReportType) -> Self {
        match value {
            ReportType::HelpNeeded => Self::HelpNeeded,
            ReportType::Medical => Self::Medical,
            ReportType::SafeZone => Self::SafeZone,
            ReportType::Resources => Self::Resources,
            ReportType::Volunteer => Self::Volunteer,
        }
    }
}

/// The active filter selection.
///
/// Never empty, and `All` never appears alongside another filter. Every
/// constructor normalizes its input, so any value of this type satisfies
/// both rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<FilterType>", into = "Vec<FilterType>")]
pub struct FilterSet(Vec<FilterType>);

impl FilterSet {
    /// The `{All}` selection.
    #[must_use]
    pub fn all() -> Self {
        Self(vec![FilterType::All])
    }

    /// Builds a selection from arbitrary filters.
    ///
    /// An empty input, or any input containing `All`, yields `{All}`.
    /// Duplicates are dropped, keeping the first occurrence.
    pub fn new(filters: impl IntoIterator<Item = FilterType>) -> Self {
        let mut selected: Vec<FilterType> = Vec::new();
        for filter in filters {
            if filter == FilterType::All {
                return Self::all();
            }
            if !selected.contains(&filter) {
                selected.push(filter);
            }
        }
        if selected.is_empty() {
            return Self::all();
        }
        Self(selected)
    }

    /// Returns `true` if `filter` is selected.
    #[must_use]
    pub fn contains(&self, filter: FilterType) -> bool {
        self.0.contains(&filter)
    }

    /// Returns `true` for the `{All}` selection.
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.contains(FilterType::All)
    }

    /// The selected filters in selection order.
    #[must_use]
    pub fn as_slice(&self) -> &[FilterType] {
        &self.0
    }

    /// Iterates the selected filters.
    pub fn iter(&self) -> impl Iterator<Item = FilterType> + '_ {
        self.0.iter().copied()
    }

    /// Number of selected filters (always at least one).
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; present for API symmetry with collections.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

impl Default for FilterSet {
    fn default() -> Self {
        Self::all()
    }
}

impl From<Vec<FilterType>> for FilterSet {
    fn from(value: Vec<FilterType>) -> Self {
        Self::new(value)
    }
}

impl From<FilterSet> for Vec<FilterType> {
    fn from(value: FilterSet) -> Self {
        value.0
    }
}

impl FromIterator<FilterType> for FilterSet {
    fn from_iter<T: IntoIterator<Item = FilterType>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// The three fixed screens of the client.
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
pub enum Route {
    /// Map view
    #[default]
    Home,
    /// Alert list
    Alerts,
    /// Profile and settings
    Profile,
}
