//! Outbound request description and execution.
//!
//! # Design
//! `Request` is consumed by `make`, which runs three steps: `prepare` builds
//! an `HttpRequest` (JSON body, normalized headers), a `Transport` executes it,
//! and the outcome is folded into a `Response` envelope. There is no retry, no
//! timeout and no cancellation: one call, one attempt, blocking the caller for
//! the full round trip.

use http::{HeaderName, HeaderValue, Uri};
use serde::Serialize;

use crate::error::ClientError;
use crate::http::{Header, HttpRequest, HttpResponse, Method};
use crate::response::Response;

const CONTENT_TYPE: &str = "Content-Type";
const APPLICATION_JSON: &str = "application/json";

/// Executes prepared requests.
pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ClientError>;
}

/// Default transport: a `ureq` agent with default connection settings.
///
/// Non-2xx responses are returned as data, not errors, and response bodies
/// are read in full regardless of size.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ClientError> {
        let mut builder = match request.method {
            Method::Get => self.agent.get(&request.url).force_send_body(),
            Method::Post => self.agent.post(&request.url),
        };
        for header in &request.headers {
            builder = builder.header(header.name.as_str(), header.value.as_str());
        }

        let mut response = builder
            .send(request.body.as_slice())
            .map_err(ClientError::Transport)?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()
            .map_err(ClientError::ReadBody)?;

        Ok(HttpResponse { status, body })
    }
}

/// One outbound JSON call.
#[derive(Debug, Clone)]
pub struct Request<B = serde_json::Value> {
    pub endpoint: String,
    pub method: Method,
    pub headers: Vec<Header>,
    pub body: Option<B>,
}

impl Request {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Post, endpoint)
    }
}

impl<B: Serialize> Request<B> {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    /// Replace the body; it is serialized to JSON when the request is made.
    pub fn json<T: Serialize>(self, body: T) -> Request<T> {
        Request {
            endpoint: self.endpoint,
            method: self.method,
            headers: self.headers,
            body: Some(body),
        }
    }

    /// Serialize the body and lay out the final header list.
    ///
    /// Caller headers keep their order; any caller `Content-Type` is replaced
    /// by a trailing `Content-Type: application/json`.
    pub fn prepare(&self) -> Result<HttpRequest, ClientError> {
        let body = match &self.body {
            Some(body) => serde_json::to_vec(body)?,
            None => Vec::new(),
        };

        self.endpoint.parse::<Uri>().map_err(http::Error::from)?;

        let mut headers = Vec::with_capacity(self.headers.len() + 1);
        for header in &self.headers {
            HeaderName::from_bytes(header.name.as_bytes()).map_err(http::Error::from)?;
            HeaderValue::from_str(&header.value).map_err(http::Error::from)?;
            if !header.name.eq_ignore_ascii_case(CONTENT_TYPE) {
                headers.push(header.clone());
            }
        }
        headers.push(Header::new(CONTENT_TYPE, APPLICATION_JSON));

        Ok(HttpRequest {
            method: self.method,
            url: self.endpoint.clone(),
            headers,
            body,
        })
    }

    /// Perform the call with the default transport; the body is returned as text.
    pub fn make(self) -> Response<String> {
        self.make_with(&UreqTransport::new())
    }

    /// Perform the call with the default transport; the body is returned as bytes.
    pub fn make_raw(self) -> Response<Vec<u8>> {
        self.make_raw_with(&UreqTransport::new())
    }

    pub fn make_with<T: Transport + ?Sized>(self, transport: &T) -> Response<String> {
        match self.round_trip(transport) {
            Ok(response) => match String::from_utf8(response.body) {
                Ok(text) => success(text, response.status),
                Err(err) => failure(&self, ClientError::from(err)),
            },
            Err(err) => failure(&self, err),
        }
    }

    pub fn make_raw_with<T: Transport + ?Sized>(self, transport: &T) -> Response<Vec<u8>> {
        match self.round_trip(transport) {
            Ok(response) => success(response.body, response.status),
            Err(err) => failure(&self, err),
        }
    }

    fn round_trip<T: Transport + ?Sized>(&self, transport: &T) -> Result<HttpResponse, ClientError> {
        let prepared = self.prepare()?;
        let response = transport.execute(&prepared)?;
        tracing::debug!(
            method = %self.method,
            url = %self.endpoint,
            status = response.status,
            "outbound request completed"
        );
        Ok(response)
    }
}

fn success<D>(data: D, status: u16) -> Response<D> {
    Response {
        data: Some(data),
        error: None,
        status,
    }
}

fn failure<B, D>(request: &Request<B>, err: ClientError) -> Response<D> {
    tracing::warn!(
        method = %request.method,
        url = %request.endpoint,
        error = %err,
        "outbound request failed"
    );
    let status = err.status();
    Response::from_error(err, status)
}
