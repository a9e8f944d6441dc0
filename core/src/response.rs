//! The uniform response envelope.
//!
//! # Design
//! Every outcome, success or failure, is carried as
//! `{"data": ..., "error": {"message", "details"}, "status": ...}`. A status of
//! `0` means "not set yet"; `normalize` resolves it before the envelope leaves
//! the process. The underlying error value is kept for in-process inspection
//! but never serialized.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use serde::{Deserialize, Serialize};

type SharedError = Arc<dyn StdError + Send + Sync>;

/// Error part of the envelope.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(skip)]
    pub source: Option<SharedError>,
    pub message: String,
    pub details: String,
}

impl ErrorBody {
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        let source: SharedError = Arc::from(source.into());
        Self {
            details: source.to_string(),
            source: Some(source),
            message: String::new(),
        }
    }

    /// Refresh `details` from the attached error, if any.
    fn fill_details(&mut self) {
        if let Some(source) = &self.source {
            self.details = source.to_string();
        }
    }
}

impl fmt::Debug for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorBody")
            .field("message", &self.message)
            .field("details", &self.details)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ErrorBody {
    fn eq(&self, other: &Self) -> bool {
        self.message == other.message && self.details == other.details
    }
}

/// Envelope returned by `Request::make` and written by `send_error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response<T = serde_json::Value> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default)]
    pub status: u16,
}

impl<T> Default for Response<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            status: 0,
        }
    }
}

impl<T> Response<T> {
    /// A successful envelope; the status resolves to 200 on normalization.
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn with_status(data: T, status: StatusCode) -> Self {
        Self {
            data: Some(data),
            error: None,
            status: status.as_u16(),
        }
    }

    /// A normalized error envelope carrying `err` as its details.
    pub fn from_error(err: impl Into<Box<dyn StdError + Send + Sync>>, status: StatusCode) -> Self {
        let mut response = Self {
            data: None,
            error: Some(ErrorBody::new(err)),
            status: status.as_u16(),
        };
        response.normalize();
        response
    }

    /// Resolve defaults: an error without a status becomes 500 and its message
    /// is the standard text of the final status; an unset status becomes 200.
    /// A status outside the HTTP range becomes 500.
    ///
    /// Applying it more than once has no further effect.
    pub fn normalize(&mut self) {
        if self.status == 0 {
            self.status = if self.error.is_some() {
                StatusCode::INTERNAL_SERVER_ERROR.as_u16()
            } else {
                StatusCode::OK.as_u16()
            };
        } else if StatusCode::from_u16(self.status).is_err() {
            self.status = StatusCode::INTERNAL_SERVER_ERROR.as_u16();
        }

        if let Some(error) = &mut self.error {
            error.fill_details();
            error.message = status_text(self.status).to_owned();
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The envelope status as a `StatusCode`; unset or out-of-range values
    /// read as 500.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Standard reason phrase for `status`, or an empty string when unknown.
pub fn status_text(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("")
}

#[cfg(feature = "axum")]
mod axum_impl {
    use std::error::Error as StdError;

    use axum::response::IntoResponse;
    use axum::Json;
    use http::StatusCode;
    use serde::Serialize;

    use super::Response;

    impl<T: Serialize> IntoResponse for Response<T> {
        fn into_response(mut self) -> axum::response::Response {
            self.normalize();
            (self.status_code(), Json(self)).into_response()
        }
    }

    /// Write `err` to the client as a JSON error envelope with `status`.
    pub fn send_error(
        err: impl Into<Box<dyn StdError + Send + Sync>>,
        status: StatusCode,
    ) -> axum::response::Response {
        Response::<()>::from_error(err, status).into_response()
    }
}

#[cfg(feature = "axum")]
pub use axum_impl::send_error;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unset_status_defaults_to_ok() {
        let mut res = Response::ok("payload");
        res.normalize();
        assert_eq!(res.status, 200);
        assert!(!res.is_error());
    }

    #[test]
    fn error_without_status_defaults_to_500() {
        let mut res: Response = Response {
            error: Some(ErrorBody::new("boom")),
            ..Response::default()
        };
        res.normalize();
        assert_eq!(res.status, 500);
        let error = res.error.as_ref().unwrap();
        assert_eq!(error.message, "Internal Server Error");
        assert_eq!(error.details, "boom");
    }

    #[test]
    fn message_follows_final_status() {
        let mut res: Response = Response {
            error: Some(ErrorBody {
                message: "stale".into(),
                ..ErrorBody::new("missing")
            }),
            status: 404,
            data: None,
        };
        res.normalize();
        assert_eq!(res.error.unwrap().message, "Not Found");
    }

    #[test]
    fn normalize_is_idempotent() {
        let cases: Vec<Response> = vec![
            Response::default(),
            Response::ok(json!({"a": 1})),
            Response {
                error: Some(ErrorBody::new("x")),
                ..Response::default()
            },
            Response {
                error: Some(ErrorBody::new("y")),
                status: 418,
                data: None,
            },
        ];

        for case in cases {
            let mut once = case.clone();
            once.normalize();
            let mut twice = once.clone();
            twice.normalize();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn out_of_range_status_becomes_500() {
        let mut res = Response::with_status("x", StatusCode::OK);
        res.status = 1000;
        res.normalize();
        assert_eq!(res.status, 500);
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let mut res: Response = Response {
            error: Some(ErrorBody::new("odd")),
            status: 42,
            data: None,
        };
        res.normalize();
        assert_eq!(res.status, 500);
        assert_eq!(res.error.unwrap().message, "Internal Server Error");
    }

    #[test]
    fn details_without_source_are_kept() {
        let mut res: Response = Response {
            error: Some(ErrorBody {
                source: None,
                message: String::new(),
                details: "kept".into(),
            }),
            status: 400,
            data: None,
        };
        res.normalize();
        let error = res.error.unwrap();
        assert_eq!(error.details, "kept");
        assert_eq!(error.message, "Bad Request");
    }

    #[test]
    fn error_envelope_serializes_without_data() {
        let res = Response::<()>::from_error("no such user", StatusCode::NOT_FOUND);
        let value = serde_json::to_value(&res).unwrap();
        assert_eq!(
            value,
            json!({
                "error": {"message": "Not Found", "details": "no such user"},
                "status": 404
            })
        );
    }

    #[test]
    fn success_envelope_serializes_without_error() {
        let mut res = Response::ok("hello".to_string());
        res.normalize();
        let value = serde_json::to_value(&res).unwrap();
        assert_eq!(value, json!({"data": "hello", "status": 200}));
    }

    #[test]
    fn unknown_status_has_empty_text() {
        assert_eq!(status_text(599), "");
        assert_eq!(status_text(0), "");
        assert_eq!(status_text(502), "Bad Gateway");
    }

    #[test]
    fn envelope_round_trips_from_json() {
        let res: Response = serde_json::from_str(
            r#"{"error":{"message":"Bad Gateway","details":"refused"},"status":502}"#,
        )
        .unwrap();
        assert_eq!(res.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(res.error.unwrap().details, "refused");
        assert!(res.data.is_none());
    }
}
