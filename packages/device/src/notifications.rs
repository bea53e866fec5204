//! OS-level notifications.
//!
//! Delivery is fire-and-forget: there is no confirmation that a
//! notification was seen.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::DeviceError;

/// Tag shared by emergency notifications so the OS collapses repeats.
pub const EMERGENCY_TAG: &str = "emergency";

/// State of the notification permission.
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
pub enum Permission {
    /// Notifications may be shown
    Granted,
    /// The user refused
    Denied,
    /// Not asked yet
    #[default]
    Default,
}

/// A notification to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Headline.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Collapse key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Keep the notification on screen until the user dismisses it.
    pub require_interaction: bool,
}

impl Notification {
    /// A plain notification that dismisses itself.
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            tag: None,
            require_interaction: false,
        }
    }

    /// An emergency notification: sticky, tagged, with the location
    /// appended to the body when known.
    #[must_use]
    pub fn emergency(title: impl Into<String>, message: &str, location: Option<&str>) -> Self {
        let body = match location {
            Some(location) => format!("{message} - Location: {location}"),
            None => message.to_string(),
        };
        Self {
            title: title.into(),
            body,
            tag: Some(EMERGENCY_TAG.to_string()),
            require_interaction: true,
        }
    }
}

/// Displays notifications on the platform.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Asks the user for permission (or returns the remembered answer).
    async fn request_permission(&self) -> Permission;

    /// Displays a notification.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::PermissionDenied`] if permission has not been
    /// granted.
    fn show(&self, notification: &Notification) -> Result<(), DeviceError>;
}

/// Shows `notification`, asking for permission first if needed. Failures
/// are logged and otherwise ignored.
pub async fn notify(notifier: &dyn Notifier, notification: &Notification) {
    if notifier.request_permission().await != Permission::Granted {
        log::debug!("Notification permission not granted; skipping '{}'", notification.title);
        return;
    }
    if let Err(e) = notifier.show(notification) {
        log::debug!("Failed to show notification '{}': {e}", notification.title);
    }
}

/// Writes notifications to the log. Used where no desktop notification
/// service exists (terminals, servers, CI).
#[derive(Debug)]
pub struct LogNotifier {
    configured: Permission,
    permission: Mutex<Permission>,
}

impl LogNotifier {
    /// Creates a notifier that answers permission requests with
    /// `permission`.
    #[must_use]
    pub const fn new(permission: Permission) -> Self {
        Self {
            configured: permission,
            permission: Mutex::new(Permission::Default),
        }
    }

    fn current(&self) -> Permission {
        *self
            .permission
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn request_permission(&self) -> Permission {
        let mut permission = self
            .permission
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *permission == Permission::Default {
            *permission = self.configured;
            log::debug!("Notification permission: {permission}");
        }
        *permission
    }

    fn show(&self, notification: &Notification) -> Result<(), DeviceError> {
        if self.current() != Permission::Granted {
            return Err(DeviceError::PermissionDenied);
        }
        if notification.require_interaction {
            log::warn!("[notification] {}: {}", notification.title, notification.body);
        } else {
            log::info!("[notification] {}: {}", notification.title, notification.body);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emergency_body_includes_location() {
        let n = Notification::emergency("Flood", "Evacuate now", Some("40.7128, -74.0060"));
        assert_eq!(n.body, "Evacuate now - Location: 40.7128, -74.0060");
        assert_eq!(n.tag.as_deref(), Some(EMERGENCY_TAG));
        assert!(n.require_interaction);

        let n = Notification::emergency("Flood", "Evacuate now", None);
        assert_eq!(n.body, "Evacuate now");
    }

    #[tokio::test]
    async fn show_requires_permission() {
        let notifier = LogNotifier::new(Permission::Granted);
        let n = Notification::new("Hello", "World");
        assert_eq!(notifier.show(&n), Err(DeviceError::PermissionDenied));

        assert_eq!(notifier.request_permission().await, Permission::Granted);
        assert_eq!(notifier.show(&n), Ok(()));
    }

    #[tokio::test]
    async fn denied_permission_degrades_silently() {
        let notifier = LogNotifier::new(Permission::Denied);
        notify(&notifier, &Notification::new("Hello", "World")).await;
        assert_eq!(notifier.request_permission().await, Permission::Denied);
    }

    #[test]
    fn permission_wire_names() {
        assert_eq!(Permission::Granted.to_string(), "granted");
        assert_eq!("default".parse::<Permission>().unwrap(), Permission::Default);
    }
}
