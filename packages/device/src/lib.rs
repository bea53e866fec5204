#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geolocation and notification adapters for the relief map client.
//!
//! Both are thin wrappers over platform capabilities. Failures here never
//! block the app: a missing position means no-location mode, a denied
//! permission means no OS notifications.

pub mod geolocation;
pub mod notifications;

use thiserror::Error;

/// Errors from device capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The position could not be determined.
    #[error("Position unavailable: {reason}")]
    PositionUnavailable {
        /// Why (denied, timed out, no fix).
        reason: String,
    },

    /// The user refused notification permission.
    #[error("Notification permission denied")]
    PermissionDenied,
}
