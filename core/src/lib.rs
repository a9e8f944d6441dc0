//! Outbound JSON request client and the uniform response envelope.
//!
//! # Overview
//! A `Request` describes one outbound call (method, endpoint, ordered headers,
//! optional JSON body). `Request::make` serializes the body, performs the call
//! synchronously and always hands back a `Response` envelope: failures are
//! folded into the envelope's `error` and `status` instead of surfacing as `Err`.
//!
//! # Design
//! - Preparation and execution are split. `Request::prepare` produces a plain
//!   `HttpRequest`; a `Transport` executes it. The default transport is a
//!   `ureq` agent, tests plug in their own.
//! - `Method` is a required enum, so a request without a method cannot exist.
//! - The envelope type doubles as the server-side JSON error shape; with the
//!   `axum` feature it implements `IntoResponse` and provides `send_error`.

pub mod client;
pub mod error;
pub mod http;
pub mod response;

pub use client::{Request, Transport, UreqTransport};
pub use error::ClientError;
pub use http::{Header, HttpRequest, HttpResponse, Method};
pub use response::{status_text, ErrorBody, Response};

#[cfg(feature = "axum")]
pub use response::send_error;
