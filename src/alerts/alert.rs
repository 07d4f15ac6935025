use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::telemetry::TelemetrySnapshot;

pub const ALERT_SUBJECT: &str = "GPS Tracker Movement Alert";
const UNKNOWN_DEVICE: &str = "Unknown";

/// Human-readable alert built from the snapshot that tripped the detector.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementAlert {
    pub device_id: String,
    pub triggered_at: DateTime<Utc>,
    pub map_link: Option<String>,
}

impl MovementAlert {
    pub fn from_snapshot(snapshot: &TelemetrySnapshot) -> Self {
        Self {
            device_id: snapshot
                .device_id()
                .unwrap_or_else(|| UNKNOWN_DEVICE.to_string()),
            triggered_at: snapshot.received_at(),
            map_link: snapshot
                .coordinates()
                .map(|(lat, lon)| map_link(lat, lon)),
        }
    }

    pub fn subject(&self) -> &'static str {
        ALERT_SUBJECT
    }

    pub fn formatted_time(&self) -> String {
        self.triggered_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    }

    pub fn html_body(&self) -> String {
        let location = match &self.map_link {
            Some(link) => format!(
                r#"<a href="{}">View on Google Maps</a>"#,
                html_escape::encode_double_quoted_attribute(link)
            ),
            None => "Location data not available".to_string(),
        };

        format!(
            "<h2>Movement Alert from GPS Tracker</h2>\n\
             <p>Your GPS tracker has detected continuous movement.</p>\n\
             <p><strong>Device ID:</strong> {}</p>\n\
             <p><strong>Timestamp:</strong> {}</p>\n\
             <p><strong>Location:</strong> {}</p>\n",
            html_escape::encode_text(&self.device_id),
            self.formatted_time(),
            location
        )
    }

    /// Single-line form for log output.
    pub fn summary(&self) -> String {
        format!(
            "continuous movement on device {} at {} ({})",
            self.device_id,
            self.formatted_time(),
            self.map_link.as_deref().unwrap_or("no location")
        )
    }
}

pub fn map_link(lat: f64, lon: f64) -> String {
    format!("https://maps.google.com/?q={lat},{lon}")
}
