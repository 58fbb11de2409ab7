//! Error types for car control operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CarError>;

#[derive(Error, Debug)]
pub enum CarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Hardware error: {0}")]
    Hardware(String),

    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Envelope decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Tokio task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
