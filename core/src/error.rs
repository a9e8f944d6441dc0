//! Errors raised while preparing or executing an outbound request.
//!
//! # Design
//! Callers of `Request::make` never see these directly; each variant is folded
//! into a `Response` envelope whose status comes from `ClientError::status`.
//! Transport and read failures map to a fixed 502 because no trustworthy
//! remote status exists at that point.

use std::string::FromUtf8Error;

use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The request body could not be serialized to JSON.
    #[error("failed to serialize request body: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The endpoint or a header could not form a valid HTTP request.
    #[error("invalid request: {0}")]
    Build(#[from] http::Error),

    /// The round trip failed before a response was received.
    #[error("request failed: {0}")]
    Transport(#[source] ureq::Error),

    /// A response arrived but its body could not be read.
    #[error("failed to read response body: {0}")]
    ReadBody(#[source] ureq::Error),

    /// The response body is not valid UTF-8 text.
    #[error("response body is not valid UTF-8: {0}")]
    Decode(#[from] FromUtf8Error),
}

impl ClientError {
    /// Status code of the envelope produced for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ClientError::Serialize(_) => StatusCode::BAD_REQUEST,
            ClientError::Build(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ClientError::Transport(_) | ClientError::ReadBody(_) | ClientError::Decode(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_failures_are_bad_requests() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(ClientError::from(err).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn decode_failures_are_bad_gateway() {
        let err = String::from_utf8(vec![0xff, 0xfe]).unwrap_err();
        let err = ClientError::from(err);
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(err.to_string().starts_with("response body is not valid UTF-8"));
    }
}
