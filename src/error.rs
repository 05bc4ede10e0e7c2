use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /* mapped errors */
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    LogInit(#[from] log::SetLoggerError),

    /* bridge errors */
    #[error("Service error: {0}")]
    Service(String),

    /// Setup cannot complete right now; the whole sync must be retried.
    #[error("Runtime not ready: {0}")]
    NotReady(String),

    /// The runtime acknowledged a command with an explicit failure.
    #[error("Command rejected for {0}: {1}")]
    CommandRejected(String, String),

    #[error("Unsupported command for entity {0}")]
    UnsupportedCommand(String),
}

impl ApiError {
    pub fn service_error(msg: impl AsRef<str>) -> Self {
        Self::Service(msg.as_ref().to_string())
    }

    pub fn not_ready(msg: impl AsRef<str>) -> Self {
        Self::NotReady(msg.as_ref().to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
