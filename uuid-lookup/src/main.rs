mod config;
mod docker;
mod errors;

use clap::Parser;
use config::Config;
use errors::Error;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

const RULE: &str = "======================================================================";

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    // Diagnostics go to stderr; stdout carries the table.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    println!("ESP Simulator - User UUID Finder\n");

    if let Err(e) = docker::ensure_container_running(&config).await {
        match e {
            Error::ContainerNotRunning(_) => {
                error!("{}", e);
                eprintln!("Start it with: docker-compose up -d {}", config.container);
            }
            e => error!("Cannot check Docker status: {}", e),
        }
        return ExitCode::FAILURE;
    }

    match docker::query_users(&config).await {
        Ok(table) => {
            println!("{}", RULE);
            println!("Users in Database");
            println!("{}", RULE);
            println!("{}", table);
            println!("{}", RULE);
            println!("\nCopy the UUID of your user and pass it to the device agent:");
            println!("  device-agent --user-uuid <uuid>   (or USER_UUID=<uuid>)");
            println!("{}", RULE);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error querying database: {}", e);
            eprintln!("Alternative: check backend logs when you login:");
            eprintln!("  docker logs backend | grep -i login");
            ExitCode::FAILURE
        }
    }
}
