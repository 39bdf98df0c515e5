use helio_config::ConfigError;
use helio_hal::{HalError, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("DDC queue is closed")]
    QueueClosed,

    #[error("Unknown display: {0}")]
    UnknownDisplay(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Hardware error: {0}")]
    Hal(#[from] HalError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
