//! HTTP(S) server bootstrap around an axum `Router`.
//!
//! # Overview
//! `init_server` hands out a `Server` holding an empty router and default
//! options. Callers register routes, adjust `config`, then call `start` (async)
//! or `run` (blocking). Serving ends only on shutdown or on a fatal error.
//!
//! # Design
//! - Transport is chosen from the options: plain HTTP/1.1 through
//!   `axum::serve`, cleartext HTTP/2 through hyper's auto builder (`h2c`), or
//!   ACME-backed TLS through `axum-server` (`tls`).
//! - Access logging is an injected `AccessLog` handle rather than process-wide
//!   logger state; `config.log_file` is opened only if no log was injected.
//! - A requested shutdown is a clean exit (`Ok(())`), never an error.

pub mod access_log;
pub mod config;
pub mod error;
pub mod h2c;
pub mod telemetry;
pub mod tls;

use std::future::{self, Future};
use std::net::SocketAddr;

use axum::{middleware, Router};
use tokio::net::TcpListener;

pub use access_log::AccessLog;
pub use config::{ServerConfig, TlsConfig};
pub use error::ServerError;
pub use scaffold_core::{send_error, Response};

/// A configured, not yet running server.
#[derive(Debug)]
pub struct Server {
    router: Router,
    pub config: ServerConfig,
    access_log: Option<AccessLog>,
}

/// A server with an empty router and default options: HTTP/2 on,
/// logging to `server.log`, debug off, no TLS.
pub fn init_server() -> Server {
    Server::new(Router::new())
}

impl Server {
    pub fn new(router: Router) -> Self {
        Self::with_config(router, ServerConfig::default())
    }

    pub fn with_config(router: Router, config: ServerConfig) -> Self {
        Self {
            router,
            config,
            access_log: None,
        }
    }

    pub fn from_config(config: ServerConfig) -> Self {
        Self::with_config(Router::new(), config)
    }

    /// Edit the owned router, e.g. `server.routes(|r| r.route("/", get(index)))`.
    pub fn routes(&mut self, f: impl FnOnce(Router) -> Router) -> &mut Self {
        let router = std::mem::take(&mut self.router);
        self.router = f(router);
        self
    }

    /// Log requests to `log` instead of opening `config.log_file`.
    pub fn with_access_log(mut self, log: AccessLog) -> Self {
        self.access_log = Some(log);
        self
    }

    /// The router with logging middleware applied.
    ///
    /// The body dump layer sits inside the access log layer, so the access
    /// line still reflects the final response.
    pub fn into_app(self) -> Result<Router, ServerError> {
        let access_log = match (self.access_log, &self.config.log_file) {
            (Some(log), _) => Some(log),
            (None, Some(path)) => Some(AccessLog::open(path)?),
            (None, None) => None,
        };

        let mut router = self.router;
        if let Some(log) = access_log {
            if self.config.debug {
                router = router.layer(middleware::from_fn_with_state(
                    log.clone(),
                    access_log::dump_bodies,
                ));
            }
            router = router.layer(middleware::from_fn_with_state(log, access_log::log_requests));
        }
        Ok(router)
    }

    /// Bind the configured address and serve until the process ends.
    pub async fn start(self) -> Result<(), ServerError> {
        self.start_with_shutdown(future::pending()).await
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn start_with_shutdown(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        self.config.validate()?;
        let addr = if self.config.tls.is_some() {
            self.config.tls_addr
        } else {
            self.config.addr
        };
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        self.config.validate()?;
        let http2 = self.config.http2;
        let tls = self.config.tls.clone();
        let local = listener.local_addr()?;
        let app = self.into_app()?;

        if let Some(tls) = tls {
            tracing::info!(addr = %local, "listening (tls)");
            return tls::serve(listener.into_std()?, app, &tls, shutdown).await;
        }

        if http2 {
            tracing::info!(addr = %local, "listening (http/1.1 + h2c)");
            return h2c::serve(listener, app, shutdown).await;
        }

        tracing::info!(addr = %local, "listening (http/1.1)");
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;
        Ok(())
    }

    /// Serve on a dedicated runtime until Ctrl-C.
    ///
    /// Blocks the calling thread. Any startup or serving error is logged and
    /// terminates the process with exit status 1.
    pub fn run(self) {
        if let Err(err) = self.block_on_start() {
            tracing::error!(error = %err, "server terminated");
            std::process::exit(1);
        }
    }

    fn block_on_start(self) -> Result<(), ServerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(ServerError::Runtime)?;
        runtime.block_on(self.start_with_shutdown(ctrl_c()))
    }
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(err) => {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            future::pending::<()>().await;
        }
    }
}
