//! Error types for the Quantum Experience client.

use thiserror::Error;

/// Result type for client operations.
pub type QxResult<T> = Result<T, QxError>;

/// Errors that can occur when talking to the Quantum Experience API.
#[derive(Debug, Error)]
pub enum QxError {
    /// Login returned no usable session token, or no credentials are set.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Retry budget exhausted without a successful response.
    #[error("Failed to get proper response from backend after {attempts} attempts: {last_failure}")]
    Transport {
        /// Attempts made before giving up.
        attempts: u32,
        /// Reason the final attempt failed.
        last_failure: String,
    },

    /// Response body is not JSON, or not a JSON object/array.
    #[error("Device server returned unexpected http response: {0}")]
    Protocol(String),

    /// Caller-supplied value failed local validation.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Backend name did not resolve to a service identifier.
    #[error("Could not find backend \"{0}\" available")]
    UnknownBackend(String),

    /// Circuit registers exceed what the device supports.
    #[error("Device register size must be <= {max_qubits}")]
    RegisterSize {
        /// Largest register the device accepts.
        max_qubits: u32,
    },

    /// Well-formed JSON that lacks what the operation needs.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The request never produced an HTTP response.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QxError {
    /// Whether the retry loop may absorb this error and try again.
    ///
    /// Only failures where no response arrived at all qualify; anything the
    /// server actually said is classified by the response validator instead.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}
