use thiserror::Error;

#[derive(Debug, Error)]
pub enum TnsError {
    /// The addressed entity is not present in its table
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Registry data that violates an invariant upstream, e.g. a negative weight
    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("System error: {0}")]
    System(String),
}

pub type Result<T> = std::result::Result<T, TnsError>;

impl TnsError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        TnsError::NotFound(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        TnsError::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        TnsError::Protocol(msg.into())
    }

    pub fn system(msg: impl Into<String>) -> Self {
        TnsError::System(msg.into())
    }
}

impl From<tokio_util::codec::LinesCodecError> for TnsError {
    fn from(e: tokio_util::codec::LinesCodecError) -> Self {
        match e {
            tokio_util::codec::LinesCodecError::Io(io) => TnsError::Io(io),
            other => TnsError::Protocol(other.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for TnsError {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        TnsError::Timeout(e.to_string())
    }
}
