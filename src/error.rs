//! Error types for the mining companion

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the mining companion
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    // Node errors
    #[error("Node unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Not found on node: {0}")]
    NotFound(String),

    #[error("Node API error (HTTP {status}): {detail}")]
    Api { status: u16, detail: String },

    #[error("Miner addresses are not set up on the node")]
    MinerAddressesUnset,

    #[error("Node is not synced with any peer")]
    NotSynced,

    // Transfer errors
    #[error("Another transfer evaluation is still running")]
    GuardBusy,

    #[error("Transaction {tx_id} not confirmed after {waited_secs}s")]
    ConfirmationTimeout { tx_id: String, waited_secs: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Expected, non-fatal node states that the caller waits out
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::NotSynced | Error::MinerAddressesUnset)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Deserialization(e.to_string())
        } else {
            Error::RemoteUnavailable(e.to_string())
        }
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
