//! Request logging middleware.
//!
//! # Design
//! `AccessLog` is an explicit handle, not a global: the server owns one and
//! hands clones to its middleware, so two servers in one process can log to
//! two different files. Writes go through a mutex, one whole line at a time.
//!
//! Line format:
//! `<ip> <DD.MM.YYYY HH:MM:SS> '<METHOD> <uri>' <status> : <bytes in> >> <bytes out>`
//!
//! Bodies of known length are logged as soon as the handler returns. Streamed
//! bodies are counted frame by frame and logged once they end or are dropped,
//! so an aborted download records what was actually produced.

use std::fs::OpenOptions;
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use axum::{
    body::{Body, HttpBody},
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use bytes::Bytes;
use chrono::{Local, NaiveDateTime};
use http_body::{Frame, SizeHint};
use scaffold_core::send_error;

use crate::error::ServerError;

const TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";
const DUMP_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

type Sink = Box<dyn Write + Send>;

/// Shared, line-serialized log sink.
#[derive(Clone)]
pub struct AccessLog {
    sink: Arc<Mutex<Sink>>,
}

impl AccessLog {
    /// Append to `path`, creating the file if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| ServerError::LogFile {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_writer(file))
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Write `line` followed by a newline. Failures are reported, not raised.
    pub fn write_line(&self, line: &str) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = write_terminated(&mut **sink, line) {
            tracing::warn!(error = %err, "failed to write access log line");
        }
    }
}

fn write_terminated(sink: &mut dyn Write, line: &str) -> std::io::Result<()> {
    sink.write_all(line.as_bytes())?;
    sink.write_all(b"\n")?;
    sink.flush()
}

impl std::fmt::Debug for AccessLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessLog").finish_non_exhaustive()
    }
}

/// One access log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEntry {
    pub remote: String,
    pub time: NaiveDateTime,
    pub method: String,
    pub uri: String,
    pub status: u16,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl AccessEntry {
    pub fn to_line(&self) -> String {
        format!(
            "{} {} '{} {}' {} : {} >> {}",
            self.remote,
            self.time.format(TIME_FORMAT),
            self.method,
            self.uri,
            self.status,
            self.bytes_in,
            self.bytes_out,
        )
    }
}

/// Emit one access log line per request.
pub async fn log_requests(State(log): State<AccessLog>, req: Request, next: Next) -> Response {
    let remote = remote_ip(&req);
    let method = req.method().to_string();
    let uri = req
        .uri()
        .path_and_query()
        .map_or_else(|| req.uri().path().to_string(), |pq| pq.as_str().to_string());
    let bytes_in = content_length(req.headers()).unwrap_or(0);

    let response = next.run(req).await;

    let mut entry = AccessEntry {
        remote,
        time: Local::now().naive_local(),
        method,
        uri,
        status: response.status().as_u16(),
        bytes_in,
        bytes_out: 0,
    };

    if let Some(len) = response.body().size_hint().exact() {
        entry.bytes_out = len;
        log.write_line(&entry.to_line());
        return response;
    }

    let (parts, body) = response.into_parts();
    let body = CountingBody {
        inner: body,
        pending: Some(PendingLine { log, entry }),
    };
    Response::from_parts(parts, Body::new(body))
}

/// A log line waiting for the response body to finish.
struct PendingLine {
    log: AccessLog,
    entry: AccessEntry,
}

impl Drop for PendingLine {
    fn drop(&mut self) {
        self.log.write_line(&self.entry.to_line());
    }
}

/// Response body that adds up the data frames it yields.
struct CountingBody {
    inner: Body,
    pending: Option<PendingLine>,
}

impl http_body::Body for CountingBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let (Some(data), Some(pending)) = (frame.data_ref(), this.pending.as_mut()) {
                    pending.entry.bytes_out += data.len() as u64;
                }
            }
            // End of stream or a body error: the count is final.
            Poll::Ready(_) => drop(this.pending.take()),
            Poll::Pending => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Write the full request body to the log before handing the request on.
///
/// Payloads land in the log verbatim, secrets included.
pub async fn dump_bodies(State(log): State<AccessLog>, req: Request, next: Next) -> Response {
    let (parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "failed to buffer request body");
            return send_error(err, StatusCode::BAD_REQUEST);
        }
    };

    log.write_line(&format!(
        "{} \n{}",
        Local::now().format(DUMP_TIME_FORMAT),
        String::from_utf8_lossy(&bytes)
    ));

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Client address: proxy headers first, then the peer address.
fn remote_ip(req: &Request) -> String {
    let headers = req.headers();
    if let Some(ip) = header_str(headers, "x-real-ip") {
        return ip.to_string();
    }
    if let Some(first) = header_str(headers, "x-forwarded-for")
        .and_then(|list| list.split(',').map(str::trim).find(|ip| !ip.is_empty()))
    {
        return first.to_string();
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "-".to_string(), |ConnectInfo(addr)| addr.ip().to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    header_str(headers, header::CONTENT_LENGTH.as_str())?.parse().ok()
}
