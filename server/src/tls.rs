//! HTTPS with certificates issued on demand by an ACME authority.
//!
//! Certificates are ordered for the configured domains, cached under
//! `cache_dir`, renewed in the background and served through the
//! `acme-tls/1` challenge on the same listener. The authority's terms of
//! service are accepted without prompting.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum_server::Handle;
use rustls_acme::{caches::DirCache, AcmeConfig};
use tokio_stream::StreamExt;

use crate::config::TlsConfig;
use crate::error::ServerError;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub async fn serve(
    listener: std::net::TcpListener,
    app: Router,
    tls: &TlsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let mut state = AcmeConfig::new(tls.domains.clone())
        .contact(tls.contact.iter().map(|email| format!("mailto:{email}")))
        .cache(DirCache::new(tls.cache_dir.clone()))
        .directory_lets_encrypt(!tls.staging)
        .state();
    let acceptor = state.axum_acceptor(state.default_rustls_config());

    tokio::spawn(async move {
        while let Some(event) = state.next().await {
            match event {
                Ok(ok) => tracing::info!(event = ?ok, "acme event"),
                Err(err) => tracing::error!(error = ?err, "acme error"),
            }
        }
    });

    let handle = Handle::new();
    let closer = handle.clone();
    tokio::spawn(async move {
        shutdown.await;
        closer.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    tracing::info!(
        domains = ?tls.domains,
        cache = %tls.cache_dir.display(),
        "serving with automatic TLS"
    );

    axum_server::from_tcp(listener)
        .acceptor(acceptor)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}
