//! Error types for rust-lwm2m

use thiserror::Error;

use crate::coap_types::CoapCode;
use crate::transport::TransportFailure;

/// Main error type for LWM2M operations
#[derive(Debug, Error)]
pub enum Lwm2mError {
    /// Path string is not a valid `/object/instance/resource` address
    #[error("Malformed path: {0}")]
    MalformedPath(String),

    /// Payload does not decode as a value of the shape implied by the path
    #[error("Invalid value at {path}: {message}")]
    InvalidValue { message: String, path: String },

    /// Content format unknown or not usable for the requested operation
    #[error("Unsupported content format: {0}")]
    UnsupportedContentFormat(u16),

    /// A client answered with content that could not be decoded
    #[error("Client [{client}] returned invalid content for {path}: {source}")]
    InvalidContent {
        client: String,
        path: String,
        #[source]
        source: Box<Lwm2mError>,
    },

    /// Raw response code not valid for the issued request kind
    #[error("Client [{client}] returned unexpected response code [{code}] for {target}")]
    UnexpectedResponseCode {
        client: String,
        target: String,
        code: CoapCode,
    },

    /// Failure reported by the transport layer
    #[error("Transport failure: {0}")]
    Transport(TransportFailure),

    /// Link-format document could not be parsed
    #[error("Invalid link-format: {0}")]
    InvalidLinkFormat(String),

    /// Object model document is inconsistent
    #[error("Invalid object model: {0}")]
    InvalidModel(String),

    /// Node does not exist in the resource tree
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CBOR decoding error
    #[error("CBOR decode error: {0}")]
    CborDecode(String),

    /// CBOR encoding error
    #[error("CBOR encode error: {0}")]
    CborEncode(String),
}

impl Lwm2mError {
    /// Create an invalid value error for the given path
    pub fn invalid_value(message: impl Into<String>, path: impl ToString) -> Self {
        Self::InvalidValue {
            message: message.into(),
            path: path.to_string(),
        }
    }
}

/// Result type alias for LWM2M operations
pub type Result<T> = std::result::Result<T, Lwm2mError>;
