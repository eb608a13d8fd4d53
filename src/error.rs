//! Error types for the momentum engine

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the momentum engine
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Stream errors
    #[error("Stream connection failed: {0}")]
    StreamConnection(String),

    #[error("Stream disconnected")]
    StreamDisconnected,

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    // RPC errors (risk and dev-exit probes)
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    // Model errors
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_)
                | Error::RpcTimeout(_)
                | Error::StreamConnection(_)
                | Error::StreamDisconnected
        )
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
