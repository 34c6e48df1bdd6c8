//! The acceptor: TCP bind, optional TLS, one task per connection.

use crate::router;
use std::sync::Arc;
use tapswitch_core::{Config, Error, Result, TlsConfig};
use tapswitch_hub::Hub;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// The WebSocket acceptor for `/wstap` (and the optional static root).
pub struct WsTapServer {
    config: Arc<Config>,
    hub: Arc<Hub>,
}

impl WsTapServer {
    pub fn new(config: Arc<Config>, hub: Arc<Hub>) -> Self {
        Self { config, hub }
    }

    /// Serve until the listener fails. The returned error shuts the whole
    /// process down; per-connection errors only close that connection.
    pub async fn run(self) -> Result<()> {
        let addr = normalize_listen_addr(&self.config.listen_address);
        let listener = TcpListener::bind(addr.as_str()).await?;
        let tls = match &self.config.tls {
            Some(tls) => Some(build_tls_acceptor(tls)?),
            None => None,
        };

        info!(address = %addr, tls = tls.is_some(), "listening on /wstap");

        loop {
            let (stream, remote) = listener.accept().await?;
            debug!(%remote, "incoming connection");

            let hub = Arc::clone(&self.hub);
            let config = Arc::clone(&self.config);
            let tls = tls.clone();
            tokio::spawn(async move {
                let remote = remote.to_string();
                let result = match tls {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(stream) => router::route(hub, config, stream, remote.clone()).await,
                        Err(e) => Err(Error::Tls(e.to_string())),
                    },
                    None => router::route(hub, config, stream, remote.clone()).await,
                };
                if let Err(e) = result {
                    warn!(%remote, error = %e, "connection ended with error");
                }
            });
        }
    }
}

/// Go-style `:port` listen addresses bind every interface.
fn normalize_listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

fn build_tls_acceptor(tls: &TlsConfig) -> Result<tokio_native_tls::TlsAcceptor> {
    let cert = std::fs::read(&tls.cert_file)
        .map_err(|e| Error::Tls(format!("reading {}: {}", tls.cert_file.display(), e)))?;
    let key = std::fs::read(&tls.key_file)
        .map_err(|e| Error::Tls(format!("reading {}: {}", tls.key_file.display(), e)))?;
    let identity = native_tls::Identity::from_pkcs8(&cert, &key)
        .map_err(|e| Error::Tls(format!("loading identity: {}", e)))?;
    let acceptor = native_tls::TlsAcceptor::builder(identity)
        .build()
        .map_err(|e| Error::Tls(e.to_string()))?;
    Ok(tokio_native_tls::TlsAcceptor::from(acceptor))
}
