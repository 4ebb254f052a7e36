//! Error types for the broadcast gateway

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("No subscribers connected")]
    NoSubscribers,

    #[error("Gateway closed")]
    Closed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Delivery failed: {message}")]
    Delivery { message: String },
}
