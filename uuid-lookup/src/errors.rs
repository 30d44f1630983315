use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("`{0}` command not found. Is Docker installed and running?")]
    ToolNotFound(String),

    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("Container `{0}` is not running")]
    ContainerNotRunning(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
