use thiserror::Error;

/// Operator-visible errors. Only the most recent one is kept.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoverError {
    #[error("not connected to the server")]
    NotConnected,
    #[error("invalid message")]
    InvalidMessage,
    #[error("server connection error: {0}")]
    Transport(String),
    #[error("rover error: {message}")]
    Device { id: Option<u32>, message: String },
}
