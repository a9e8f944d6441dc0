//! Cleartext HTTP/2 alongside HTTP/1.1 on one port.
//!
//! Each accepted connection is served by hyper's auto builder, which detects
//! the HTTP/2 connection preface and otherwise speaks HTTP/1.1. HTTP/2 clients
//! must use prior knowledge; the `Upgrade: h2c` dance is not offered.
//!
//! A connection with no bytes read or written for `IDLE_TIMEOUT` is shut down
//! gracefully: HTTP/2 peers get a GOAWAY, HTTP/1.1 keep-alive ends after the
//! current response. On shutdown the listener closes first, then every open
//! connection is drained the same way before `serve` returns.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::{extract::ConnectInfo, Router};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo, TokioTimer},
    server::conn::auto,
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tower::ServiceExt;

use crate::error::ServerError;

pub const MAX_CONCURRENT_STREAMS: u32 = 250;
pub const MAX_FRAME_SIZE: u32 = 1 << 20;
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after an accept failure that is not about a single connection,
/// e.g. running out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

fn builder() -> auto::Builder<TokioExecutor> {
    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http2()
        .timer(TokioTimer::new())
        .max_concurrent_streams(MAX_CONCURRENT_STREAMS)
        .max_frame_size(MAX_FRAME_SIZE);
    builder
}

/// Accept connections until `shutdown` resolves, then drain open ones.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send,
) -> Result<(), ServerError> {
    serve_with_idle(listener, app, shutdown, IDLE_TIMEOUT).await
}

async fn serve_with_idle(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send,
    idle: Duration,
) -> Result<(), ServerError> {
    let builder = Arc::new(builder());
    let (stop, stopped) = watch::channel(false);
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        let (stream, remote) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(connection) => connection,
                Err(err) => {
                    accept_backoff(&err).await;
                    continue;
                }
            },
            Some(_) = connections.join_next() => continue,
            () = &mut shutdown => break,
        };

        connections.spawn(serve_connection(
            Arc::clone(&builder),
            app.clone(),
            stream,
            remote,
            stopped.clone(),
            idle,
        ));
    }

    drop(listener);
    tracing::info!(open = connections.len(), "h2c listener closed, draining connections");
    let _ = stop.send(true);
    while connections.join_next().await.is_some() {}
    Ok(())
}

async fn serve_connection(
    builder: Arc<auto::Builder<TokioExecutor>>,
    router: Router,
    stream: TcpStream,
    remote: SocketAddr,
    mut stopped: watch::Receiver<bool>,
    idle: Duration,
) {
    let activity = Arc::new(Activity::new());
    let io = TokioIo::new(Tracked {
        inner: stream,
        activity: Arc::clone(&activity),
    });
    let service = hyper::service::service_fn(move |mut req: hyper::Request<Incoming>| {
        req.extensions_mut().insert(ConnectInfo::<SocketAddr>(remote));
        router.clone().oneshot(req)
    });

    let conn = builder.serve_connection_with_upgrades(io, service);
    tokio::pin!(conn);

    let mut closing = false;
    loop {
        let deadline = activity.deadline(idle);
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(err) = result {
                    tracing::debug!(%remote, error = %err, "connection closed with error");
                }
                return;
            }
            () = tokio::time::sleep_until(deadline), if !closing => {
                if activity.deadline(idle) <= tokio::time::Instant::now() {
                    tracing::debug!(%remote, "closing idle connection");
                    conn.as_mut().graceful_shutdown();
                    closing = true;
                }
            }
            _ = stopped.changed(), if !closing => {
                conn.as_mut().graceful_shutdown();
                closing = true;
            }
        }
    }
}

/// Log an accept failure and, unless it only concerns the one connection,
/// wait before accepting again.
async fn accept_backoff(err: &io::Error) {
    if is_connection_error(err) {
        tracing::debug!(error = %err, "connection dropped before accept");
        return;
    }
    tracing::error!(error = %err, "failed to accept connection");
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

fn is_connection_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

/// Time of the last byte moved on a connection.
struct Activity {
    started: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_ms.store(elapsed, Ordering::Relaxed);
    }

    fn deadline(&self, idle: Duration) -> tokio::time::Instant {
        let last = self.started + Duration::from_millis(self.last_ms.load(Ordering::Relaxed));
        tokio::time::Instant::from_std(last + idle)
    }
}

/// Socket wrapper that records activity on every successful read or write.
struct Tracked {
    inner: TcpStream,
    activity: Arc<Activity>,
}

impl AsyncRead for Tracked {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let polled = Pin::new(&mut self.inner).poll_read(cx, buf);
        if matches!(polled, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            self.activity.touch();
        }
        polled
    }
}

impl AsyncWrite for Tracked {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let polled = Pin::new(&mut self.inner).poll_write(cx, buf);
        if matches!(polled, Poll::Ready(Ok(n)) if n > 0) {
            self.activity.touch();
        }
        polled
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let polled = Pin::new(&mut self.inner).poll_write_vectored(cx, bufs);
        if matches!(polled, Poll::Ready(Ok(n)) if n > 0) {
            self.activity.touch();
        }
        polled
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
