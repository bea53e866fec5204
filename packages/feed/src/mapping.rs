//! Raw remote records → strict domain types.
//!
//! Whatever the web client or other writers stored is parsed here. Missing
//! optional fields get defaults (`status = active`, `priority = medium`,
//! `verified = false`, `active = true` unless explicitly `false`, timestamps
//! = now). Snapshots are ordered on the stored timestamps, so undated
//! records sort last. Records that cannot be placed on the map (unknown
//! report type, no coordinates) are rejected and skipped.

use std::cmp::Reverse;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use relief_map_report_models::{
    Alert, AlertArea, AlertType, LatLng, Priority, Report, ReportLocation, ReportStatus,
    ReportType,
};
use serde_json::Value;
use thiserror::Error;

use crate::RawRecord;

/// Why a raw record was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// The record body is not a JSON object.
    #[error("record '{id}' is not an object")]
    NotAnObject {
        /// Record key.
        id: String,
    },

    /// A required field is missing or malformed.
    #[error("record '{id}' has no valid '{field}'")]
    MissingField {
        /// Record key.
        id: String,
        /// Field name.
        field: &'static str,
    },

    /// The report type is not one we know.
    #[error("record '{id}' has unknown report type '{value}'")]
    UnknownType {
        /// Record key.
        id: String,
        /// The stored value.
        value: String,
    },
}

/// Parses a timestamp stored as epoch milliseconds (what server timestamps
/// resolve to), a numeric string, or an RFC 3339 string.
#[must_use]
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(whole_millis))
            .and_then(DateTime::from_timestamp_millis),
        Value::String(s) => s.parse::<i64>().map_or_else(
            |_| {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            },
            DateTime::from_timestamp_millis,
        ),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn whole_millis(value: f64) -> Option<i64> {
    value.is_finite().then(|| value.trunc() as i64)
}

fn string_field(fields: &Value, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lat_lng(value: &Value) -> Option<LatLng> {
    let lat = number(value.get("lat")?)?;
    let lng = number(value.get("lng")?)?;
    (lat.is_finite() && lng.is_finite()).then_some(LatLng::new(lat, lng))
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
        Some(Value::Null) | None => false,
    }
}

fn parse_enum<T: FromStr + Default>(fields: &Value, name: &str) -> T {
    string_field(fields, name)
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn capacity(fields: &Value) -> Option<u32> {
    let value = number(fields.get("capacity")?)?;
    (value.is_finite() && value >= 0.0 && value <= f64::from(u32::MAX))
        .then(|| value.round() as u32)
}

/// Maps one report record.
///
/// # Errors
///
/// Returns [`MappingError`] if the record is not an object, has an unknown
/// or missing `type`, or has no usable `location`.
pub fn map_report(record: &RawRecord, now: DateTime<Utc>) -> Result<Report, MappingError> {
    let fields = &record.fields;
    if !fields.is_object() {
        return Err(MappingError::NotAnObject {
            id: record.id.clone(),
        });
    }

    let type_value = string_field(fields, "type").ok_or_else(|| MappingError::MissingField {
        id: record.id.clone(),
        field: "type",
    })?;
    let report_type =
        ReportType::from_str(&type_value).map_err(|_| MappingError::UnknownType {
            id: record.id.clone(),
            value: type_value.clone(),
        })?;

    let location_value = fields.get("location");
    let position = location_value
        .and_then(lat_lng)
        .ok_or_else(|| MappingError::MissingField {
            id: record.id.clone(),
            field: "location",
        })?;
    let address = location_value.and_then(|loc| string_field(loc, "address"));

    let created_at = fields
        .get("createdAt")
        .and_then(parse_timestamp)
        .unwrap_or(now);
    let updated_at = fields
        .get("updatedAt")
        .and_then(parse_timestamp)
        .unwrap_or(now);

    Ok(Report {
        id: record.id.clone(),
        report_type,
        title: string_field(fields, "title").unwrap_or_default(),
        description: string_field(fields, "description").unwrap_or_default(),
        location: ReportLocation {
            lat: position.lat,
            lng: position.lng,
            address,
        },
        created_at,
        updated_at,
        status: parse_enum::<ReportStatus>(fields, "status"),
        priority: parse_enum::<Priority>(fields, "priority"),
        reported_by: string_field(fields, "reportedBy"),
        contact: string_field(fields, "contact"),
        resource_type: string_field(fields, "resourceType"),
        capacity: capacity(fields),
        verified: truthy(fields.get("verified")),
    })
}

/// Maps one alert record.
///
/// # Errors
///
/// Returns [`MappingError::NotAnObject`] if the record body is not an
/// object. Every alert field has a default.
pub fn map_alert(record: &RawRecord, now: DateTime<Utc>) -> Result<Alert, MappingError> {
    let fields = &record.fields;
    if !fields.is_object() {
        return Err(MappingError::NotAnObject {
            id: record.id.clone(),
        });
    }

    let area = fields.get("area").and_then(|area| {
        Some(AlertArea {
            center: lat_lng(area.get("center")?)?,
            radius: area.get("radius").and_then(number).unwrap_or(0.0),
        })
    });
    let location = fields
        .get("location")
        .and_then(lat_lng)
        .or_else(|| area.map(|a| a.center));

    let message = string_field(fields, "message")
        .or_else(|| string_field(fields, "description"))
        .unwrap_or_default();

    Ok(Alert {
        id: record.id.clone(),
        title: string_field(fields, "title").unwrap_or_default(),
        message,
        alert_type: parse_enum::<AlertType>(fields, "type"),
        area,
        location,
        report_id: string_field(fields, "reportId"),
        created_at: fields
            .get("createdAt")
            .and_then(parse_timestamp)
            .unwrap_or(now),
        expires_at: fields.get("expiresAt").and_then(parse_timestamp),
        active: !matches!(fields.get("active"), Some(Value::Bool(false))),
    })
}

/// Orders raw records by their stored `createdAt`, newest first. Records
/// without a usable timestamp sort last, before any default is filled in.
fn newest_first(records: &[RawRecord]) -> Vec<&RawRecord> {
    let mut ordered: Vec<&RawRecord> = records.iter().collect();
    ordered.sort_by_cached_key(|record| {
        Reverse(record.fields.get("createdAt").and_then(parse_timestamp))
    });
    ordered
}

/// Maps a reports snapshot, skipping rejected records, newest first.
#[must_use]
pub fn map_reports(records: &[RawRecord], now: DateTime<Utc>) -> Vec<Report> {
    newest_first(records)
        .into_iter()
        .filter_map(|record| {
            map_report(record, now)
                .inspect_err(|e| log::warn!("Skipping report: {e}"))
                .ok()
        })
        .collect()
}

/// Maps an alerts snapshot, skipping rejected records, newest first.
#[must_use]
pub fn map_alerts(records: &[RawRecord], now: DateTime<Utc>) -> Vec<Alert> {
    newest_first(records)
        .into_iter()
        .filter_map(|record| {
            map_alert(record, now)
                .inspect_err(|e| log::warn!("Skipping alert: {e}"))
                .ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;
    use serde_json::json;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn minimal_report_gets_defaults() {
        let record = RawRecord::new(
            "-Nabc",
            json!({
                "type": "medical",
                "title": "First aid tent",
                "location": { "lat": 40.7, "lng": -74.0 }
            }),
        );
        let report = map_report(&record, now()).unwrap();
        assert_eq!(report.id, "-Nabc");
        assert_eq!(report.report_type, ReportType::Medical);
        assert_eq!(report.status, ReportStatus::Active);
        assert_eq!(report.priority, Priority::Medium);
        assert!(!report.verified);
        assert_eq!(report.created_at, now());
        assert_eq!(report.updated_at, now());
        assert_eq!(report.description, "");
        assert_eq!(report.location.address, None);
    }

    #[test]
    fn full_report() {
        let record = RawRecord::new(
            "r1",
            json!({
                "type": "resources",
                "title": "Water",
                "description": "Bottled water available",
                "location": { "lat": 1.5, "lng": 2.5, "address": "1.5000, 2.5000" },
                "createdAt": 1_756_728_000_000_i64,
                "updatedAt": "2025-09-01T13:00:00Z",
                "status": "verified",
                "priority": "critical",
                "contact": "555-0100",
                "resourceType": "water",
                "capacity": 200,
                "verified": true
            }),
        );
        let report = map_report(&record, now()).unwrap();
        assert_eq!(
            report.created_at,
            DateTime::from_timestamp_millis(1_756_728_000_000).unwrap()
        );
        assert_eq!(
            report.updated_at,
            Utc.with_ymd_and_hms(2025, 9, 1, 13, 0, 0).unwrap()
        );
        assert_eq!(report.status, ReportStatus::Verified);
        assert_eq!(report.priority, Priority::Critical);
        assert_eq!(report.contact.as_deref(), Some("555-0100"));
        assert_eq!(report.resource_type.as_deref(), Some("water"));
        assert_eq!(report.capacity, Some(200));
        assert!(report.verified);
        assert_eq!(report.location.address.as_deref(), Some("1.5000, 2.5000"));
    }

    #[test]
    fn null_optionals_are_absent() {
        let record = RawRecord::new(
            "r1",
            json!({
                "type": "volunteer",
                "location": { "lat": 1, "lng": 2 },
                "contact": null,
                "capacity": null,
                "status": "bogus"
            }),
        );
        let report = map_report(&record, now()).unwrap();
        assert_eq!(report.contact, None);
        assert_eq!(report.capacity, None);
        assert_eq!(report.status, ReportStatus::Active);
    }

    #[test]
    fn rejects_unplaceable_reports() {
        let unknown = RawRecord::new(
            "r1",
            json!({ "type": "flood", "location": { "lat": 1, "lng": 2 } }),
        );
        assert!(matches!(
            map_report(&unknown, now()),
            Err(MappingError::UnknownType { .. })
        ));

        let no_location = RawRecord::new("r2", json!({ "type": "medical" }));
        assert!(matches!(
            map_report(&no_location, now()),
            Err(MappingError::MissingField {
                field: "location",
                ..
            })
        ));

        let scalar = RawRecord::new("r3", json!(42));
        assert!(matches!(
            map_report(&scalar, now()),
            Err(MappingError::NotAnObject { .. })
        ));
    }

    #[test]
    fn snapshot_skips_bad_records_and_sorts_newest_first() {
        let records = vec![
            RawRecord::new(
                "old",
                json!({ "type": "medical", "location": { "lat": 0, "lng": 0 }, "createdAt": 1000 }),
            ),
            RawRecord::new("bad", json!({ "type": "medical" })),
            RawRecord::new(
                "new",
                json!({ "type": "medical", "location": { "lat": 0, "lng": 0 }, "createdAt": 5000 }),
            ),
        ];
        let reports = map_reports(&records, now());
        let ids: Vec<&str> = reports.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["new", "old"]);
    }

    #[test]
    fn undated_records_sort_last() {
        let records = vec![
            RawRecord::new(
                "undated",
                json!({ "type": "medical", "location": { "lat": 0, "lng": 0 } }),
            ),
            RawRecord::new(
                "dated",
                json!({ "type": "medical", "location": { "lat": 0, "lng": 0 }, "createdAt": 1000 }),
            ),
        ];
        let reports = map_reports(&records, now());
        let ids: Vec<&str> = reports.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["dated", "undated"]);
        assert_eq!(reports[1].created_at, now());

        let alerts = map_alerts(
            &[
                RawRecord::new("undated", json!({ "title": "No time" })),
                RawRecord::new("garbled", json!({ "title": "Bad time", "createdAt": "soon" })),
                RawRecord::new("dated", json!({ "title": "Flood", "createdAt": 1000 })),
            ],
            now(),
        );
        let ids: Vec<&str> = alerts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["dated", "undated", "garbled"]);
    }

    #[test]
    fn alert_defaults() {
        let record = RawRecord::new("a1", json!({ "title": "Heads up" }));
        let alert = map_alert(&record, now()).unwrap();
        assert_eq!(alert.alert_type, AlertType::Info);
        assert_eq!(alert.message, "");
        assert!(alert.active);
        assert_eq!(alert.created_at, now());
        assert_eq!(alert.expires_at, None);
        assert_eq!(alert.location, None);
    }

    #[test]
    fn alert_message_falls_back_to_description() {
        let record = RawRecord::new("a1", json!({ "description": "From description" }));
        assert_eq!(map_alert(&record, now()).unwrap().message, "From description");
    }

    #[test]
    fn alert_active_only_false_when_explicit() {
        let off = RawRecord::new("a1", json!({ "active": false }));
        assert!(!map_alert(&off, now()).unwrap().active);
        let weird = RawRecord::new("a2", json!({ "active": 0 }));
        assert!(map_alert(&weird, now()).unwrap().active);
    }

    #[test]
    fn alert_location_from_area_center() {
        let record = RawRecord::new(
            "a1",
            json!({
                "type": "danger",
                "area": { "center": { "lat": 40.7128, "lng": -74.006 }, "radius": 5000 },
                "reportId": "r9",
                "expiresAt": "2025-09-02T00:00:00Z"
            }),
        );
        let alert = map_alert(&record, now()).unwrap();
        assert_eq!(alert.alert_type, AlertType::Danger);
        assert_eq!(alert.location, Some(LatLng::new(40.7128, -74.006)));
        assert_eq!(alert.area.map(|a| a.radius), Some(5000.0));
        assert_eq!(alert.report_id.as_deref(), Some("r9"));
        assert!(alert.expires_at.is_some());
    }

    #[test]
    fn timestamp_formats() {
        assert_eq!(
            parse_timestamp(&json!("1000")),
            DateTime::from_timestamp_millis(1000)
        );
        assert_eq!(parse_timestamp(&json!("not a date")), None);
        assert_eq!(parse_timestamp(&json!({ ".sv": "timestamp" })), None);
    }
}
