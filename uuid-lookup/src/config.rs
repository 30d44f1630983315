use clap::Parser;
use std::time::Duration;

/// Lists users and their UUIDs from the backend database, for filling in
/// the device agent's USER_UUID.
#[derive(Debug, Clone, Parser)]
#[command(name = "uuid-lookup", version)]
pub struct Config {
    /// Container tool to invoke
    #[arg(long, env = "DOCKER_BIN", default_value = "docker")]
    pub docker: String,

    #[arg(long, env = "POSTGRES_CONTAINER", default_value = "postgres")]
    pub container: String,

    #[arg(long, env = "POSTGRES_USER", default_value = "mqtt_user")]
    pub db_user: String,

    #[arg(long, env = "POSTGRES_DB", default_value = "mqtt_db")]
    pub db_name: String,

    /// Per-command timeout
    #[arg(long, env = "LOOKUP_TIMEOUT_SECS", default_value_t = 5)]
    pub timeout_secs: u64,
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
