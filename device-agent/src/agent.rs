use crate::commands::{Command, LedState, TextCommand};
use crate::config::{self, Config, SensorRanges, TelemetryArgs};
use crate::errors::Result;
use crate::mqtt::{Inbound, Transport};
use crate::scheduler::{Clock, Schedule};
use crate::sensors;
use crate::telemetry::{
    local_timestamp, short_id, Alarm, ImageArtifact, ImageMetadata, ImageTrigger, Registration,
    SensorKind, Telemetry, Timestamp,
};
use crate::topics::{DeviceIdentity, Topics};
use crate::upload::{ImageUploader, UploadOutcome};
use chrono::Local;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const TICK: Duration = Duration::from_secs(1);

/// Runtime-adjustable device settings. Only command handling writes them.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub armed: bool,
    pub measurement_interval: Duration,
    pub send_interval: Duration,
}

/// Pauses between publishes, mimicking a slow radio link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub after_singular: Duration,
    pub between_readings: Duration,
    pub between_sections: Duration,
}

impl Pacing {
    pub fn realistic() -> Self {
        Self {
            after_singular: Duration::from_millis(200),
            between_readings: Duration::from_millis(100),
            between_sections: Duration::from_millis(500),
        }
    }

    pub fn none() -> Self {
        Self {
            after_singular: Duration::ZERO,
            between_readings: Duration::ZERO,
            between_sections: Duration::ZERO,
        }
    }
}

pub struct Agent<T, U> {
    identity: DeviceIdentity,
    topics: Topics,
    upload_url: String,
    telemetry: TelemetryArgs,
    sensors: SensorRanges,
    pacing: Pacing,
    state: DeviceState,
    schedule: Schedule,
    rng: StdRng,
    transport: T,
    uploader: U,
}

impl<T: Transport, U: ImageUploader> Agent<T, U> {
    pub fn new(config: &Config, transport: T, uploader: U) -> Result<Self> {
        let identity = DeviceIdentity::from(&config.device);
        let topics = identity.topics();
        let upload_url = topics.upload_url(&config.backend.backend_url);
        let pacing = if config.no_pacing {
            Pacing::none()
        } else {
            Pacing::realistic()
        };

        Ok(Self {
            identity,
            topics,
            upload_url,
            telemetry: config.telemetry.clone(),
            sensors: config.sensors.clone(),
            pacing,
            state: DeviceState {
                armed: false,
                measurement_interval: config::minutes(config.telemetry.measurement_interval)?,
                send_interval: config::minutes(config.telemetry.send_interval)?,
            },
            schedule: Schedule::new(),
            rng: StdRng::from_entropy(),
            transport,
            uploader,
        })
    }

    #[cfg(test)]
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    #[cfg(test)]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Subscribes to the inbound topics and announces the device. Runs on
    /// the first connect and again after every reconnect.
    pub async fn on_connect(&self) {
        for topic in [&self.topics.commands, &self.topics.register_response] {
            match self.transport.subscribe(topic).await {
                Ok(()) => info!("Subscribed to {}", topic),
                Err(e) => error!("Failed to subscribe to {}: {}", topic, e),
            }
        }

        self.register().await;
    }

    pub async fn register(&self) {
        info!(
            "Registering as {} ({})",
            self.identity.name, self.identity.mac_address
        );

        let registration = Registration {
            name: self.identity.name.clone(),
            mac_address: self.identity.mac_address.clone(),
        };
        if self.emit(&self.topics.register, &registration).await {
            info!("Registration message sent to {}", self.topics.register);
        }
    }

    pub async fn run<C: Clock>(
        &mut self,
        rx: &mut mpsc::Receiver<Inbound>,
        clock: &C,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut ticker = interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Shutdown also cancels a cycle or upload that is still in flight.
        let ticking = async {
            loop {
                ticker.tick().await;
                self.tick(rx, clock.now()).await;
            }
        };

        tokio::select! {
            biased;
            _ = shutdown => info!("Stopping simulator"),
            _ = ticking => {}
        }
    }

    /// Drains pending inbound messages, then evaluates both timers.
    pub async fn tick(&mut self, rx: &mut mpsc::Receiver<Inbound>, now: Instant) {
        while let Ok(inbound) = rx.try_recv() {
            self.handle_inbound(inbound).await;
        }

        let due = self.schedule.poll(
            now,
            self.state.measurement_interval,
            self.state.send_interval,
        );

        // Readings are generated at send time; nothing is buffered here.
        if due.measure {
            info!("Taking readings at {}", Local::now().format("%H:%M:%S"));
        }
        if due.send {
            self.send_telemetry_batch().await;
        }
    }

    pub async fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::RegistrationResponse(payload) => log_registration_response(&payload),
            Inbound::Command(payload) => self.handle_command(&payload).await,
            Inbound::Reconnected => self.on_connect().await,
        }
    }

    pub async fn send_telemetry_batch(&mut self) {
        let batch_size = self.telemetry.batch_size;
        let singular_count = if self.telemetry.singular_readings {
            self.telemetry.singular_count
        } else {
            0
        };
        let message_id = short_id("msg", 8);

        info!("Generating batch of {} readings", batch_size);

        for i in 0..singular_count {
            let value = sensors::temperature(&mut self.rng, &self.sensors);
            let reading = Telemetry::single(
                SensorKind::Temperature,
                value,
                format!("{}-temp-single-{}", message_id, i),
            );
            self.emit(&self.topics.telemetry, &reading).await;
            debug!("Singular temperature: {}°C", value);
            pause(self.pacing.after_singular).await;
        }

        let readings = self.sample_batch(sensors::temperature).await;
        let batch = Telemetry::batch(
            SensorKind::Temperature,
            readings,
            format!("{}-temp-batch", message_id),
        );
        if self.emit(&self.topics.telemetry, &batch).await {
            info!("Sent temperature batch: {} readings", batch_size);
        }
        pause(self.pacing.between_sections).await;

        for i in 0..singular_count {
            let value = sensors::pressure(&mut self.rng, &self.sensors);
            let reading = Telemetry::single(
                SensorKind::Pressure,
                value,
                format!("{}-pres-single-{}", message_id, i),
            );
            self.emit(&self.topics.telemetry, &reading).await;
            debug!("Singular pressure: {} hPa", value);
            pause(self.pacing.after_singular).await;
        }

        let readings = self.sample_batch(sensors::pressure).await;
        let batch = Telemetry::batch(
            SensorKind::Pressure,
            readings,
            format!("{}-pres-batch", message_id),
        );
        if self.emit(&self.topics.telemetry, &batch).await {
            info!("Sent pressure batch: {} readings", batch_size);
        }
        pause(self.pacing.between_sections).await;

        let mut movement_detected = false;
        for i in 0..batch_size {
            let movement = sensors::movement(&mut self.rng, &self.sensors);
            let reading = Telemetry::movement(movement, format!("{}-mov-{}", message_id, i));
            self.emit(&self.topics.telemetry, &reading).await;

            if movement == 1 {
                movement_detected = true;
                info!("Movement detected");
                if self.emit(&self.topics.alarms, &Alarm::motion()).await {
                    info!("Sent movement alarm");
                }
            }
            pause(self.pacing.between_readings).await;
        }
        info!("Sent movement readings: {} readings", batch_size);

        if self.state.armed && movement_detected {
            self.send_image(ImageTrigger::MovementDetection).await;
        }
    }

    async fn sample_batch<F>(&mut self, sample: F) -> Vec<(Timestamp, f64)>
    where
        F: Fn(&mut StdRng, &SensorRanges) -> f64,
    {
        let mut readings = Vec::with_capacity(self.telemetry.batch_size);

        for _ in 0..self.telemetry.batch_size {
            let value = sample(&mut self.rng, &self.sensors);
            readings.push((local_timestamp(), value));
            pause(self.pacing.between_readings).await;
        }

        readings
    }

    /// Uploads a fresh frame over HTTP. A connection failure falls back to
    /// the image topic; timeouts and bad responses are only logged.
    pub async fn send_image(&mut self, trigger: ImageTrigger) -> UploadOutcome {
        info!("Capturing and sending image");

        let artifact = ImageArtifact {
            image_id: short_id("img", 12),
            message_id: short_id("msg", 8),
            image_data: sensors::dummy_image(),
            metadata: ImageMetadata {
                format: sensors::IMAGE_FORMAT.to_string(),
                width: sensors::IMAGE_WIDTH,
                height: sensors::IMAGE_HEIGHT,
                trigger,
                timestamp: local_timestamp(),
            },
        };

        let outcome = self
            .uploader
            .upload(&self.upload_url, &artifact.upload_body())
            .await;

        match &outcome {
            UploadOutcome::Accepted { status } => {
                info!(
                    "Sent image {} via HTTP ({} bytes), backend status: {}",
                    artifact.image_id,
                    artifact.image_data.len(),
                    status
                );
            }
            UploadOutcome::Rejected { status, body } => {
                warn!("Failed to send image: HTTP {}: {}", status, body);
            }
            UploadOutcome::ConnectionFailed(e) => {
                warn!(
                    "Cannot connect to backend at {}: {}; falling back to MQTT",
                    self.upload_url, e
                );
                match self.publish_json(&self.topics.images, &artifact).await {
                    Ok(()) => info!("Sent image {} via MQTT fallback", artifact.image_id),
                    Err(e) => error!("MQTT fallback also failed: {}", e),
                }
            }
            UploadOutcome::TimedOut => {
                warn!("Image upload timed out, giving up on {}", artifact.image_id);
            }
            UploadOutcome::Failed(e) => {
                error!("Error sending image: {}", e);
            }
        }

        outcome
    }

    pub async fn handle_command(&mut self, payload: &str) {
        info!("Received command: {}", payload);

        match Command::parse(payload) {
            Command::Ack(ack) => {
                info!(
                    "Backend acknowledged message {}, status: {}, records: {}",
                    json_text(&ack.message_id),
                    json_text(&ack.status),
                    ack.record_count
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "N/A".to_string())
                );
            }
            Command::Photo => {
                info!("PHOTO - taking photo");
                self.send_image(ImageTrigger::PhotoCommand).await;
            }
            Command::Temp => {
                let value = sensors::temperature(&mut self.rng, &self.sensors);
                let reading =
                    Telemetry::single(SensorKind::Temperature, value, short_id("m-cmd", 6));
                if self.emit(&self.topics.telemetry, &reading).await {
                    info!("TEMP - sent temperature {}°C", value);
                }
            }
            Command::Arm => self.set_armed(true),
            Command::Disarm => self.set_armed(false),
            Command::SetMeasurementInterval(minutes) => {
                if let Some(interval) = interval_from_minutes(minutes) {
                    self.state.measurement_interval = interval;
                }
                info!(
                    "Measurement interval is {} minutes",
                    as_minutes(self.state.measurement_interval)
                );
            }
            Command::SetSendInterval(minutes) => {
                if let Some(interval) = interval_from_minutes(minutes) {
                    self.state.send_interval = interval;
                }
                info!(
                    "Send interval is {} minutes",
                    as_minutes(self.state.send_interval)
                );
            }
            Command::Led(state) => match state {
                LedState::On => info!("LED turned ON"),
                LedState::Off => info!("LED turned OFF"),
                LedState::Blink => info!("LED is BLINKING"),
                LedState::Other(other) => info!("LED control -> {}", other),
            },
            Command::Interval(seconds) => match Duration::try_from_secs_f64(seconds) {
                Ok(interval) => {
                    self.state.send_interval = interval;
                    info!(
                        "Telemetry interval set to {} seconds ({} minutes)",
                        seconds,
                        as_minutes(interval)
                    );
                }
                Err(_) => warn!("Ignoring invalid interval: {} seconds", seconds),
            },
            Command::Threshold { sensor, value } => {
                info!(
                    "Set threshold -> sensor: {}, value: {}",
                    json_text(&sensor),
                    json_text(&value)
                );
            }
            Command::Unrecognized(map) => {
                let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                warn!("Unrecognized JSON command with keys {:?}", keys);
            }
            Command::Text(TextCommand::Status) => self.log_status(),
            Command::Text(TextCommand::Reset) => {
                info!("RESET request, device would reset now (simulation)");
            }
            Command::Text(TextCommand::Arm) => self.set_armed(true),
            Command::Text(TextCommand::Disarm) => self.set_armed(false),
            Command::Text(TextCommand::Unknown(text)) => {
                warn!("Unknown command: {}", text);
            }
        }
    }

    fn set_armed(&mut self, armed: bool) {
        self.state.armed = armed;
        if armed {
            info!("Device is now ARMED, will send images on motion detection");
        } else {
            info!("Device is now DISARMED, will not send images on motion detection");
        }
    }

    fn log_status(&self) {
        info!(
            device = %self.identity.name,
            mac = %self.identity.mac_address,
            armed = self.state.armed,
            measurement_interval_min = as_minutes(self.state.measurement_interval),
            send_interval_min = as_minutes(self.state.send_interval),
            "STATUS"
        );
    }

    async fn publish_json<M: Serialize + Sync>(&self, topic: &str, message: &M) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        self.transport.publish(topic, payload).await
    }

    /// Publishes and logs failures. Returns whether the publish went through.
    async fn emit<M: Serialize + Sync>(&self, topic: &str, message: &M) -> bool {
        match self.publish_json(topic, message).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to publish to {}: {}", topic, e);
                false
            }
        }
    }
}

fn log_registration_response(payload: &str) {
    #[derive(serde::Deserialize)]
    struct RegistrationResponse {
        status: Option<String>,
        name: Option<String>,
    }

    match serde_json::from_str::<RegistrationResponse>(payload) {
        Ok(response) => info!(
            "Registration {}: {}",
            response.status.as_deref().unwrap_or("unknown"),
            response.name.as_deref().unwrap_or("-")
        ),
        Err(_) => info!("Registration response (non-JSON): {}", payload),
    }
}

fn interval_from_minutes(minutes: Option<f64>) -> Option<Duration> {
    let minutes = minutes?;
    match config::minutes(minutes) {
        Ok(interval) => Some(interval),
        Err(e) => {
            warn!("{}", e);
            None
        }
    }
}

fn as_minutes(interval: Duration) -> f64 {
    interval.as_secs_f64() / 60.0
}

fn json_text(value: &Option<serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "None".to_string(),
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
