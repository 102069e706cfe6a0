//! Error types for objrpc.
//!
//! Every error is local to one request/response pair. The server renders
//! them as a status code plus a text body (see [`RpcError::status_code`]).

use thiserror::Error;

/// Main error type for the protocol core.
#[derive(Debug, Error)]
pub enum RpcError {
    // Envelope errors
    #[error("Expected an envelope object, got '{found}' instead.")]
    NotAnEnvelope { found: &'static str },

    #[error("Could not decode protocol version info.")]
    MissingVersionInfo,

    #[error("Unsupported protocol version '{version}'.")]
    UnsupportedVersion { version: String },

    // Marshal / unmarshal errors
    #[error("Unknown type annotation '{tag}'")]
    UnknownTypeTag { tag: String },

    #[error("Tagged value of type '{tag}' is missing field '{field}'")]
    MissingField { tag: String, field: &'static str },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Unsupported type {type_name}")]
    UnsupportedType { type_name: String },

    #[error("Invalid tensor data: {message}")]
    InvalidTensor { message: String },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Endpoint errors
    #[error("Endpoint '{endpoint}' not found.")]
    NotFound { endpoint: String },

    #[error("'{endpoint}' is not callable")]
    NotCallable { endpoint: String },

    #[error("Error calling '{endpoint}':\n{trace}")]
    CallFailed { endpoint: String, trace: String },

    #[error("Invalid JSON body: {message}")]
    InvalidBody { message: String },

    #[error("Expected application/json, got '{content_type}'")]
    UnsupportedMediaType { content_type: String },
}

/// Result type alias for objrpc operations.
pub type Result<T> = std::result::Result<T, RpcError>;

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RpcError {
    pub(crate) fn decode(message: impl Into<String>) -> Self {
        RpcError::Decode {
            message: message.into(),
        }
    }

    pub(crate) fn tensor(message: impl Into<String>) -> Self {
        RpcError::InvalidTensor {
            message: message.into(),
        }
    }

    /// Convert to the HTTP status the server answers with.
    ///
    /// - 404: unknown attribute, unknown or expired reference
    /// - 415: POST body with a non-JSON media type
    /// - 400: everything else (decode failures, not callable, call raised)
    pub fn status_code(&self) -> u16 {
        match self {
            RpcError::NotFound { .. } => 404,
            RpcError::UnsupportedMediaType { .. } => 415,
            _ => 400,
        }
    }

    /// Check whether this error came from the envelope/marshal layer.
    pub fn is_codec_error(&self) -> bool {
        matches!(
            self,
            RpcError::NotAnEnvelope { .. }
                | RpcError::MissingVersionInfo
                | RpcError::UnsupportedVersion { .. }
                | RpcError::UnknownTypeTag { .. }
                | RpcError::MissingField { .. }
                | RpcError::Decode { .. }
                | RpcError::UnsupportedType { .. }
                | RpcError::InvalidTensor { .. }
                | RpcError::Json { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RpcError::NotFound {
            endpoint: "missing".into(),
        };
        assert_eq!(err.to_string(), "Endpoint 'missing' not found.");

        let err = RpcError::UnsupportedVersion {
            version: "0.0".into(),
        };
        assert_eq!(err.to_string(), "Unsupported protocol version '0.0'.");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            RpcError::NotFound {
                endpoint: "/id/ff".into()
            }
            .status_code(),
            404
        );
        assert_eq!(
            RpcError::NotCallable {
                endpoint: "a".into()
            }
            .status_code(),
            400
        );
        assert_eq!(
            RpcError::UnsupportedMediaType {
                content_type: "text/plain".into()
            }
            .status_code(),
            415
        );
        assert_eq!(RpcError::MissingVersionInfo.status_code(), 400);
    }

    #[test]
    fn test_codec_classification() {
        assert!(RpcError::UnknownTypeTag { tag: "bogus".into() }.is_codec_error());
        assert!(!RpcError::NotCallable {
            endpoint: "a".into()
        }
        .is_codec_error());
    }
}
