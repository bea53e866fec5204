//! One-shot device position queries.

use std::time::Duration;

use async_trait::async_trait;
use relief_map_report_models::LatLng;

use crate::DeviceError;

/// How long a position query may take before it counts as unavailable.
pub const DEFAULT_POSITION_TIMEOUT: Duration = Duration::from_secs(10);

/// A source of the device's current position.
#[async_trait]
pub trait Geolocator: Send + Sync {
    /// Queries the current position once.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::PositionUnavailable`] if permission is
    /// denied, no fix can be obtained, or the query times out.
    async fn current_position(&self) -> Result<LatLng, DeviceError>;
}

/// Reports a configured position, for desktops and fixed installations.
#[derive(Debug, Clone, Copy)]
pub struct FixedGeolocator {
    position: LatLng,
}

impl FixedGeolocator {
    /// Creates a geolocator that always answers `position`.
    #[must_use]
    pub const fn new(position: LatLng) -> Self {
        Self { position }
    }
}

#[async_trait]
impl Geolocator for FixedGeolocator {
    async fn current_position(&self) -> Result<LatLng, DeviceError> {
        Ok(self.position)
    }
}

/// A device without positioning.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableGeolocator;

#[async_trait]
impl Geolocator for UnavailableGeolocator {
    async fn current_position(&self) -> Result<LatLng, DeviceError> {
        Err(DeviceError::PositionUnavailable {
            reason: "no location provider configured".to_string(),
        })
    }
}

/// Queries `geolocator`, giving up after `timeout`.
///
/// # Errors
///
/// Returns [`DeviceError::PositionUnavailable`] if the query fails or does
/// not answer in time.
pub async fn position_with_timeout(
    geolocator: &dyn Geolocator,
    timeout: Duration,
) -> Result<LatLng, DeviceError> {
    tokio::time::timeout(timeout, geolocator.current_position())
        .await
        .map_err(|_| DeviceError::PositionUnavailable {
            reason: format!("timed out after {timeout:?}"),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverAnswers;

    #[async_trait]
    impl Geolocator for NeverAnswers {
        async fn current_position(&self) -> Result<LatLng, DeviceError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn fixed_position() {
        let here = LatLng::new(40.7128, -74.006);
        let position = position_with_timeout(&FixedGeolocator::new(here), DEFAULT_POSITION_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(position, here);
    }

    #[tokio::test]
    async fn unavailable_position() {
        let err = UnavailableGeolocator.current_position().await.unwrap_err();
        assert!(matches!(err, DeviceError::PositionUnavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_query_times_out() {
        let err = position_with_timeout(&NeverAnswers, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::PositionUnavailable { .. }));
    }
}
