mod agent;
mod commands;
mod config;
mod errors;
mod mqtt;
mod scheduler;
mod sensors;
mod telemetry;
mod topics;
mod upload;

use agent::Agent;
use clap::Parser;
use config::Config;
use scheduler::SystemClock;
use tokio::sync::mpsc;
use topics::DeviceIdentity;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use upload::HttpUploader;

const INBOUND_CAPACITY: usize = 64;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = config.validate() {
        error!("{}", e);
        std::process::exit(1);
    }

    let identity = DeviceIdentity::from(&config.device);
    info!("Starting ESP32 device simulator");
    info!(
        "Device: {} ({}), user: {}",
        identity.name, identity.mac_address, identity.user_uuid
    );
    info!(
        "Broker: {}:{}, backend: {}",
        config.mqtt.mqtt_broker, config.mqtt.mqtt_port, config.backend.backend_url
    );
    info!(
        "Measurement every {} min, send every {} min, batch size {}",
        config.telemetry.measurement_interval,
        config.telemetry.send_interval,
        config.telemetry.batch_size
    );

    let uploader = match HttpUploader::new(config.upload_timeout()) {
        Ok(uploader) => uploader,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let (client, mut eventloop) = mqtt::new(mqtt::build_options(&config, &identity));

    if let Err(e) = mqtt::await_connack(&mut eventloop).await {
        error!(
            "Failed to connect to MQTT broker at {}:{}: {}",
            config.mqtt.mqtt_broker, config.mqtt.mqtt_port, e
        );
        std::process::exit(1);
    }
    info!(
        "Connected to MQTT broker at {}:{}",
        config.mqtt.mqtt_broker, config.mqtt.mqtt_port
    );

    let mut agent = match Agent::new(&config, client.clone(), uploader) {
        Ok(agent) => agent,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    agent.on_connect().await;

    let (tx, mut rx) = mpsc::channel(INBOUND_CAPACITY);
    let listener = tokio::spawn(mqtt::run_listener(eventloop, identity.topics(), tx));

    info!("Waiting for connection and registration");
    tokio::time::sleep(config.startup_delay()).await;

    info!("Starting telemetry loop, press Ctrl+C to stop");
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };
    agent.run(&mut rx, &SystemClock, shutdown).await;

    if let Err(e) = client.disconnect().await {
        warn!("Disconnect failed: {}", e);
    }
    // Give the event loop a moment to flush the DISCONNECT packet.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    listener.abort();

    info!("Disconnected from broker");
}
