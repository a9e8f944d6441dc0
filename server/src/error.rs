//! Startup and serving failures.
//!
//! Everything here is fatal for the server: `Server::run` logs the error and
//! exits the process. Per-request failures never reach this type; they are
//! answered by the router.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// An environment value could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    Config { key: &'static str, value: String },

    #[error("failed to read config file {}: {source}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// TLS was requested without any host name to certify.
    #[error("automatic TLS needs at least one domain")]
    NoDomains,

    #[error("failed to open log file {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("server stopped: {0}")]
    Serve(#[from] io::Error),
}
