use crate::errors::{Error, Result};
use clap::{ArgAction, Args, Parser};
use std::time::Duration;

const PLACEHOLDER_USER_UUID: &str = "your-user-uuid-here";

/// Simulated ESP32 endpoint: registers over MQTT, emits telemetry and
/// answers backend commands.
#[derive(Debug, Clone, Parser)]
#[command(name = "device-agent", version)]
pub struct Config {
    #[command(flatten)]
    pub device: DeviceArgs,

    #[command(flatten)]
    pub mqtt: MqttArgs,

    #[command(flatten)]
    pub backend: BackendArgs,

    #[command(flatten)]
    pub telemetry: TelemetryArgs,

    #[command(flatten)]
    pub sensors: SensorRanges,

    /// Seconds to wait for connection and registration before the first cycle
    #[arg(long, env = "STARTUP_DELAY_SECS", default_value_t = 3)]
    pub startup_delay_secs: u64,

    /// Publish without the pauses a real radio would introduce
    #[arg(long, env = "NO_PACING")]
    pub no_pacing: bool,
}

#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    #[arg(long, env = "DEVICE_NAME", default_value = "ESP32-Simulator-01")]
    pub device_name: String,

    #[arg(long, env = "DEVICE_MAC_ADDRESS", default_value = "AA:BB:CC:DD:EE:FF")]
    pub mac_address: String,

    /// Owning user; must already exist in the backend
    #[arg(
        long,
        env = "USER_UUID",
        default_value = "889a51ee-fb28-4bbf-b08b-5d60442061d7"
    )]
    pub user_uuid: String,
}

#[derive(Debug, Clone, Args)]
pub struct MqttArgs {
    #[arg(long, env = "MQTT_BROKER", default_value = "localhost")]
    pub mqtt_broker: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,

    /// Defaults to the user uuid
    #[arg(long, env = "MQTT_USERNAME")]
    pub mqtt_username: Option<String>,

    #[arg(long, env = "MQTT_PASSWORD", default_value = "pass")]
    pub mqtt_password: String,

    #[arg(long, env = "MQTT_KEEP_ALIVE", default_value_t = 60)]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, Args)]
pub struct BackendArgs {
    #[arg(long, env = "BACKEND_URL", default_value = "http://localhost:3001")]
    pub backend_url: String,

    #[arg(long, env = "UPLOAD_TIMEOUT_SECS", default_value_t = 10)]
    pub upload_timeout_secs: u64,
}

#[derive(Debug, Clone, Args)]
pub struct TelemetryArgs {
    /// Minutes between measurements
    #[arg(long, env = "MEASUREMENT_INTERVAL", default_value_t = 5.0)]
    pub measurement_interval: f64,

    /// Minutes between batch transmissions
    #[arg(long, env = "SEND_INTERVAL", default_value_t = 15.0)]
    pub send_interval: f64,

    #[arg(long, env = "BATCH_SIZE", default_value_t = 5)]
    pub batch_size: usize,

    #[arg(
        long,
        env = "SEND_SINGULAR_READINGS",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub singular_readings: bool,

    #[arg(long, env = "SINGULAR_READING_COUNT", default_value_t = 2)]
    pub singular_count: usize,
}

#[derive(Debug, Clone, Args)]
pub struct SensorRanges {
    #[arg(long, env = "TEMP_MIN", default_value_t = 18.0)]
    pub temp_min: f64,

    #[arg(long, env = "TEMP_MAX", default_value_t = 30.0)]
    pub temp_max: f64,

    #[arg(long, env = "PRESSURE_MIN", default_value_t = 990.0)]
    pub pressure_min: f64,

    #[arg(long, env = "PRESSURE_MAX", default_value_t = 1020.0)]
    pub pressure_max: f64,

    #[arg(long, env = "MOVEMENT_PROBABILITY", default_value_t = 0.15)]
    pub movement_probability: f64,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.device.user_uuid.is_empty() || self.device.user_uuid == PLACEHOLDER_USER_UUID {
            return Err(Error::Config(
                "USER_UUID is not set; look it up with uuid-lookup".to_string(),
            ));
        }
        if self.device.mac_address.is_empty() {
            return Err(Error::Config("MAC address cannot be empty".to_string()));
        }
        minutes(self.telemetry.measurement_interval)?;
        minutes(self.telemetry.send_interval)?;
        if self.telemetry.batch_size == 0 {
            return Err(Error::Config("batch size must be at least 1".to_string()));
        }
        self.sensors.validate()
    }

    pub fn mqtt_username(&self) -> &str {
        self.mqtt
            .mqtt_username
            .as_deref()
            .unwrap_or(&self.device.user_uuid)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.upload_timeout_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}

impl SensorRanges {
    fn validate(&self) -> Result<()> {
        if !(self.temp_min <= self.temp_max) {
            return Err(Error::Config(format!(
                "temperature range [{}, {}] is empty",
                self.temp_min, self.temp_max
            )));
        }
        if !(self.pressure_min <= self.pressure_max) {
            return Err(Error::Config(format!(
                "pressure range [{}, {}] is empty",
                self.pressure_min, self.pressure_max
            )));
        }
        if !(0.0..=1.0).contains(&self.movement_probability) {
            return Err(Error::Config(format!(
                "movement probability {} outside [0, 1]",
                self.movement_probability
            )));
        }
        Ok(())
    }
}

/// Converts a minute count into a `Duration`, rejecting negative and
/// non-finite values.
pub fn minutes(value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value * 60.0)
        .map_err(|_| Error::Config(format!("invalid interval: {} minutes", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Config {
        Config::parse_from(["device-agent"])
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = defaults();

        assert!(config.validate().is_ok());
        assert_eq!(config.device.mac_address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(config.mqtt.mqtt_port, 1883);
        assert_eq!(config.telemetry.batch_size, 5);
        assert!(config.telemetry.singular_readings);
        assert_eq!(config.upload_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_username_falls_back_to_user_uuid() {
        let config = defaults();
        assert_eq!(config.mqtt_username(), config.device.user_uuid);

        let config = Config::parse_from(["device-agent", "--mqtt-username", "device"]);
        assert_eq!(config.mqtt_username(), "device");
    }

    #[test]
    fn test_singular_readings_can_be_disabled() {
        let config = Config::parse_from(["device-agent", "--singular-readings", "false"]);
        assert!(!config.telemetry.singular_readings);
    }

    #[test]
    fn test_placeholder_user_rejected() {
        let config = Config::parse_from(["device-agent", "--user-uuid", "your-user-uuid-here"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_ranges_rejected() {
        let config = Config::parse_from(["device-agent", "--temp-min", "40", "--temp-max", "20"]);
        assert!(config.validate().is_err());

        let config = Config::parse_from(["device-agent", "--movement-probability", "1.5"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_minutes_conversion() {
        assert_eq!(minutes(1.5).unwrap(), Duration::from_secs(90));
        assert_eq!(minutes(0.0).unwrap(), Duration::ZERO);
        assert!(minutes(-1.0).is_err());
        assert!(minutes(f64::NAN).is_err());
    }
}
