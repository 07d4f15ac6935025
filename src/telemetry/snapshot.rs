use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

pub const MOVING_KEY: &str = "isMoving";
pub const DEVICE_ID_KEY: &str = "deviceId";
pub const LATITUDE_KEY: &str = "lat";
pub const LONGITUDE_KEY: &str = "lon";

pub const NO_DATA_RAW: &str = "No data received yet";

/// Named scalar fields exactly as the device sent them.
pub type Fields = Map<String, Value>;

/// One inbound report, already decoded from its wire format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryReport {
    fields: Fields,
}

impl TelemetryReport {
    pub fn new(fields: Fields) -> Self {
        Self { fields }
    }

    pub fn from_json(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body).context("report is not valid JSON")?;
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(anyhow!(
                "report must be a JSON object, got {}",
                json_kind(&other)
            )),
        }
    }

    /// Form bodies carry everything as strings; they are kept that way.
    pub fn from_form(body: &[u8]) -> Result<Self> {
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_bytes(body).context("report is not a valid form body")?;
        let fields = pairs
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Latest known device state. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    #[serde(rename = "timestamp")]
    received_at: DateTime<Utc>,
    #[serde(rename = "values")]
    fields: Fields,
    #[serde(rename = "raw")]
    raw_payload: String,
}

impl TelemetrySnapshot {
    pub fn from_report(report: TelemetryReport, received_at: DateTime<Utc>) -> Self {
        let raw_payload = Value::Object(report.fields.clone()).to_string();
        Self {
            received_at,
            fields: report.fields,
            raw_payload,
        }
    }

    /// Placeholder served before any report has arrived.
    pub fn empty(at: DateTime<Utc>) -> Self {
        Self {
            received_at: at,
            fields: Fields::new(),
            raw_payload: NO_DATA_RAW.to_string(),
        }
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn raw_payload(&self) -> &str {
        &self.raw_payload
    }

    /// `None` when the report carried no movement flag at all. Any present value
    /// other than `true` (or the string "true" from form bodies) reads as not moving.
    pub fn movement_flag(&self) -> Option<bool> {
        self.fields.get(MOVING_KEY).map(|value| match value {
            Value::Bool(moving) => *moving,
            Value::String(text) => text.trim().eq_ignore_ascii_case("true"),
            _ => false,
        })
    }

    pub fn device_id(&self) -> Option<String> {
        match self.fields.get(DEVICE_ID_KEY)? {
            Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    /// Latitude/longitude pair, if both are present and numeric.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let lat = scalar_f64(self.fields.get(LATITUDE_KEY)?)?;
        let lon = scalar_f64(self.fields.get(LONGITUDE_KEY)?)?;
        Some((lat, lon))
    }
}

fn scalar_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}
