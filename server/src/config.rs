//! Server options and their environment overrides.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ServerError;

pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_TLS_ADDR: &str = "0.0.0.0:443";
pub const DEFAULT_LOG_FILE: &str = "server.log";

/// Options read by `Server::start`.
///
/// Missing fields in a config file take their default values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address for plain HTTP and cleartext HTTP/2.
    pub addr: SocketAddr,
    /// Listen address when automatic TLS is enabled.
    pub tls_addr: SocketAddr,
    /// Serve HTTP/2 over cleartext alongside HTTP/1.1.
    pub http2: bool,
    /// Access log destination; `None` disables request logging.
    pub log_file: Option<PathBuf>,
    /// Also log every request body. Only effective when logging is enabled.
    pub debug: bool,
    pub tls: Option<TlsConfig>,
}

/// Automatic certificate management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Where issued certificates and the account key are cached.
    pub cache_dir: PathBuf,
    /// Host names to request certificates for.
    pub domains: Vec<String>,
    /// Contact addresses registered with the certificate authority.
    #[serde(default)]
    pub contact: Vec<String>,
    /// Use the authority's staging directory instead of production.
    #[serde(default)]
    pub staging: bool,
}

impl TlsConfig {
    pub fn new(cache_dir: impl Into<PathBuf>, domains: Vec<String>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            domains,
            contact: Vec::new(),
            staging: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: parse_default(DEFAULT_ADDR),
            tls_addr: parse_default(DEFAULT_TLS_ADDR),
            http2: true,
            log_file: Some(PathBuf::from(DEFAULT_LOG_FILE)),
            debug: false,
            tls: None,
        }
    }
}

fn parse_default(addr: &str) -> SocketAddr {
    addr.parse().unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080)))
}

impl ServerConfig {
    /// Defaults overridden by `PORT` and `SCAFFOLD_*` environment variables.
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like `from_env`, reading values through `lookup`.
    ///
    /// `SCAFFOLD_CONFIG` names a JSON file used as the base instead of the
    /// defaults; the other variables still override it.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let mut config = match lookup("SCAFFOLD_CONFIG").filter(|path| !path.is_empty()) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(addr) = lookup("SCAFFOLD_ADDR") {
            config.addr = parse("SCAFFOLD_ADDR", &addr)?;
        }
        if let Some(port) = lookup("PORT") {
            config.addr.set_port(parse("PORT", &port)?);
        }
        if let Some(addr) = lookup("SCAFFOLD_TLS_ADDR") {
            config.tls_addr = parse("SCAFFOLD_TLS_ADDR", &addr)?;
        }
        if let Some(http2) = lookup("SCAFFOLD_HTTP2") {
            config.http2 = parse_flag("SCAFFOLD_HTTP2", &http2)?;
        }
        if let Some(path) = lookup("SCAFFOLD_LOG_FILE") {
            config.log_file = (!path.is_empty()).then(|| PathBuf::from(path));
        }
        if let Some(debug) = lookup("SCAFFOLD_DEBUG") {
            config.debug = parse_flag("SCAFFOLD_DEBUG", &debug)?;
        }

        if let Some(dir) = lookup("SCAFFOLD_TLS_CACHE_DIR").filter(|dir| !dir.is_empty()) {
            let mut tls = TlsConfig::new(dir, split_list(lookup("SCAFFOLD_TLS_DOMAINS")));
            tls.contact = split_list(lookup("SCAFFOLD_TLS_CONTACT"));
            if let Some(staging) = lookup("SCAFFOLD_TLS_STAGING") {
                tls.staging = parse_flag("SCAFFOLD_TLS_STAGING", &staging)?;
            }
            config.tls = Some(tls);
        }

        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file. Not validated; `start` does that.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ServerError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        match &self.tls {
            Some(tls) if tls.domains.is_empty() => Err(ServerError::NoDomains),
            _ => Ok(()),
        }
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ServerError> {
    value.trim().parse().map_err(|_| ServerError::Config {
        key,
        value: value.to_string(),
    })
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ServerError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ServerError::Config {
            key,
            value: value.to_string(),
        }),
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}
