use crate::config::Config;
use crate::errors::{Error, Result};
use std::io::ErrorKind;
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

pub const USERS_QUERY: &str =
    "SELECT uuid, username, created_at FROM users ORDER BY created_at DESC;";

pub fn ps_args(container: &str) -> Vec<String> {
    vec![
        "ps".to_string(),
        "--filter".to_string(),
        format!("name={}", container),
        "--format".to_string(),
        "{{.Names}}".to_string(),
    ]
}

/// `docker exec` without a TTY since output is captured.
pub fn query_args(config: &Config) -> Vec<String> {
    vec![
        "exec".to_string(),
        config.container.clone(),
        "psql".to_string(),
        "-U".to_string(),
        config.db_user.clone(),
        "-d".to_string(),
        config.db_name.clone(),
        "-c".to_string(),
        USERS_QUERY.to_string(),
    ]
}

/// `docker ps --filter name=` matches substrings, and so does this.
pub fn container_listed(ps_stdout: &str, container: &str) -> bool {
    ps_stdout.lines().any(|line| line.trim().contains(container))
}

pub async fn ensure_container_running(config: &Config) -> Result<()> {
    let output = run(config, ps_args(&config.container)).await?;

    if !output.status.success() {
        return Err(Error::QueryFailed(stderr(&output)));
    }
    if !container_listed(&String::from_utf8_lossy(&output.stdout), &config.container) {
        return Err(Error::ContainerNotRunning(config.container.clone()));
    }
    Ok(())
}

/// Runs the users query and returns psql's table verbatim.
pub async fn query_users(config: &Config) -> Result<String> {
    let output = run(config, query_args(config)).await?;

    if !output.status.success() {
        return Err(Error::QueryFailed(stderr(&output)));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

async fn run(config: &Config, args: Vec<String>) -> Result<Output> {
    debug!("Running {} {}", config.docker, args.join(" "));

    let child = Command::new(&config.docker)
        .args(&args)
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(config.timeout(), child).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
            Err(Error::ToolNotFound(config.docker.clone()))
        }
        Ok(Err(e)) => Err(Error::Io(e)),
        Err(_) => {
            let subcommand = args.first().map(String::as_str).unwrap_or_default();
            Err(Error::Timeout {
                command: format!("{} {}", config.docker, subcommand),
                secs: config.timeout_secs,
            })
        }
    }
}

fn stderr(output: &Output) -> String {
    let text = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if text.is_empty() {
        format!("exited with {}", output.status)
    } else {
        text
    }
}
