use serde_json::{Map, Value};
use tracing::warn;

/// A backend command, decoded once from the raw payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ack(Ack),
    Photo,
    Temp,
    Arm,
    Disarm,
    /// `None` keeps the current interval
    SetMeasurementInterval(Option<f64>),
    SetSendInterval(Option<f64>),
    Led(LedState),
    /// Legacy send-interval change, in seconds
    Interval(f64),
    Threshold {
        sensor: Option<Value>,
        value: Option<Value>,
    },
    /// A JSON object no rule matched, kept verbatim
    Unrecognized(Map<String, Value>),
    Text(TextCommand),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub message_id: Option<Value>,
    pub status: Option<Value>,
    pub record_count: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedState {
    On,
    Off,
    Blink,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextCommand {
    Status,
    Reset,
    Arm,
    Disarm,
    Unknown(String),
}

impl Command {
    /// JSON objects go through structured dispatch; anything else, including
    /// JSON scalars, is read as a plain-text command.
    pub fn parse(payload: &str) -> Self {
        match serde_json::from_str::<Value>(payload) {
            Ok(Value::Object(map)) => Self::from_object(map),
            _ => Command::Text(TextCommand::parse(payload)),
        }
    }

    fn from_object(map: Map<String, Value>) -> Self {
        if map.get("type").and_then(Value::as_str) == Some("ack") {
            return Command::Ack(Ack {
                message_id: map.get("messageId").cloned(),
                status: map.get("status").cloned(),
                record_count: map.get("recordCount").cloned(),
            });
        }

        match map.get("command").and_then(Value::as_str) {
            Some("photo") => return Command::Photo,
            Some("temp") => return Command::Temp,
            Some("arm") => return Command::Arm,
            Some("disarm") => return Command::Disarm,
            Some("set_measurement_interval") => {
                return Command::SetMeasurementInterval(minutes_field(&map))
            }
            Some("set_send_interval") => return Command::SetSendInterval(minutes_field(&map)),
            _ => {}
        }

        if let Some(led) = map.get("led") {
            return Command::Led(LedState::from_value(led));
        }

        if let Some(interval) = map.get("interval") {
            match interval.as_f64() {
                Some(seconds) => return Command::Interval(seconds),
                None => warn!("Ignoring non-numeric interval: {}", interval),
            }
        }

        if let Some(threshold) = map.get("threshold") {
            return Command::Threshold {
                sensor: threshold.get("sensor").cloned(),
                value: threshold.get("value").cloned(),
            };
        }

        Command::Unrecognized(map)
    }
}

// Accepts numbers and numeric strings.
fn minutes_field(map: &Map<String, Value>) -> Option<f64> {
    let value = map.get("minutes")?;
    let minutes = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    if minutes.is_none() {
        warn!("Ignoring invalid minutes value: {}", value);
    }
    minutes
}

impl LedState {
    fn from_value(value: &Value) -> Self {
        match value.as_str() {
            Some("on") => LedState::On,
            Some("off") => LedState::Off,
            Some("blink") => LedState::Blink,
            Some(other) => LedState::Other(other.to_string()),
            None => LedState::Other(value.to_string()),
        }
    }
}

impl TextCommand {
    /// Case-insensitive. `DISARM` is matched before `ARM` since every
    /// `DISARM...` string also contains `ARM`.
    pub fn parse(payload: &str) -> Self {
        let text = payload.to_uppercase();

        if text == "STATUS" {
            TextCommand::Status
        } else if text == "RESET" {
            TextCommand::Reset
        } else if text.contains("DISARM") {
            TextCommand::Disarm
        } else if text.contains("ARM") {
            TextCommand::Arm
        } else {
            TextCommand::Unknown(payload.to_string())
        }
    }
}
