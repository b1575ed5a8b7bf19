//! Error types for batch delivery.

use thiserror::Error;

/// Errors raised while building or sending a delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Delivery cannot proceed with the supplied configuration.
    #[error("invalid delivery configuration")]
    Config {
        /// Configuration field at fault.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// An empty batch was handed to the client.
    #[error("refusing to deliver an empty batch")]
    EmptyBatch,
    /// The HTTP client could not be constructed.
    #[error("failed to build http client")]
    Client {
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The request failed before a response arrived.
    #[error("delivery request failed")]
    Http {
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The downstream service answered with a non-success status.
    #[error("delivery rejected by downstream service")]
    Status {
        /// HTTP status code returned.
        status: u16,
    },
    /// Every attempt failed; the batch is not resubmitted.
    #[error("delivery attempts exhausted")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Failure reported by the final attempt.
        #[source]
        last: Box<DeliveryError>,
    },
    /// The request body could not be serialised.
    #[error("failed to serialise delivery body")]
    Serialize {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// The serialised body was not valid UTF-8.
    #[error("delivery body is not valid utf-8")]
    Encoding {
        /// Underlying conversion error.
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// Convenience alias for delivery results.
pub type DeliveryResult<T> = Result<T, DeliveryError>;
