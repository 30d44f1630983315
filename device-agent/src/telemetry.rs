use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Temperature,
    Pressure,
    Movement,
}

impl SensorKind {
    pub fn unit(self) -> Option<&'static str> {
        match self {
            SensorKind::Temperature => Some("°C"),
            SensorKind::Pressure => Some("hPa"),
            SensorKind::Movement => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReadingValue {
    Single(f64),
    Batch(Vec<(Timestamp, f64)>),
    Flag(u8),
}

/// One message on the telemetry topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    pub sensor: SensorKind,
    pub value: ReadingValue,
    pub unit: Option<String>,
    pub is_batch: bool,
    pub message_id: String,
}

impl Telemetry {
    pub fn single(sensor: SensorKind, value: f64, message_id: String) -> Self {
        Self {
            sensor,
            value: ReadingValue::Single(value),
            unit: sensor.unit().map(str::to_string),
            is_batch: false,
            message_id,
        }
    }

    pub fn movement(value: u8, message_id: String) -> Self {
        Self {
            sensor: SensorKind::Movement,
            value: ReadingValue::Flag(value),
            unit: None,
            is_batch: false,
            message_id,
        }
    }

    pub fn batch(
        sensor: SensorKind,
        readings: Vec<(Timestamp, f64)>,
        message_id: String,
    ) -> Self {
        Self {
            sensor,
            value: ReadingValue::Batch(readings),
            unit: sensor.unit().map(str::to_string),
            is_batch: true,
            message_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub severity: String,
    pub message: String,
}

impl Alarm {
    pub fn motion() -> Self {
        Self {
            severity: "warning".to_string(),
            message: "Motion detected by PIR sensor".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
    pub mac_address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageTrigger {
    MovementDetection,
    PhotoCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub trigger: ImageTrigger,
    pub timestamp: Timestamp,
}

/// A captured frame as sent on the MQTT fallback topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageArtifact {
    pub image_id: String,
    pub message_id: String,
    pub image_data: String,
    pub metadata: ImageMetadata,
}

/// HTTP upload body. Same as the artifact minus the message id.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUpload<'a> {
    pub image_id: &'a str,
    pub image_data: &'a str,
    pub metadata: &'a ImageMetadata,
}

impl ImageArtifact {
    pub fn upload_body(&self) -> ImageUpload<'_> {
        ImageUpload {
            image_id: &self.image_id,
            image_data: &self.image_data,
            metadata: &self.metadata,
        }
    }
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Local wall-clock time without offset, always written with microseconds,
/// e.g. `2024-05-01T12:00:00.123456`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp(pub NaiveDateTime);

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0.format(TIMESTAMP_FORMAT))
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        NaiveDateTime::deserialize(deserializer).map(Timestamp)
    }
}

pub fn local_timestamp() -> Timestamp {
    Timestamp(Local::now().naive_local())
}

/// `<prefix>-<hex>` with `len` hex digits taken from a fresh v4 uuid.
pub fn short_id(prefix: &str, len: usize) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &hex[..len.min(hex.len())])
}
