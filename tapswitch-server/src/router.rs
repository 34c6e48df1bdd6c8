//! Per-connection request routing.
//!
//! The request head is read once to pick the destination: `/wstap` upgrades
//! into the peer loop, everything else falls through to the static responder.

use crate::peer_loop;
use crate::rewind::Rewind;
use crate::statics;
use std::sync::Arc;
use tapswitch_core::{Config, Error, Result};
use tapswitch_hub::Hub;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::debug;

/// Endpoint that upgrades into the switching fabric.
const WSTAP_PATH: &str = "/wstap";

/// Longest request head we are willing to buffer.
const MAX_HEAD_LEN: usize = 8192;

pub async fn route<S>(
    hub: Arc<Hub>,
    config: Arc<Config>,
    mut stream: S,
    remote: String,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let head = read_request_head(&mut stream).await?;
    let (method, path) = parse_request_line(&head)
        .ok_or_else(|| Error::transport("malformed HTTP request line"))?;
    debug!(%remote, method, path, "routing request");

    if path == WSTAP_PATH {
        let rewound = Rewind::new(head, stream);
        let ws = tokio_tungstenite::accept_async(rewound)
            .await
            .map_err(|e| Error::transport(format!("websocket handshake: {}", e)))?;
        peer_loop::run(hub, config, ws, remote).await;
        return Ok(());
    }

    statics::respond(stream, &method, &path, config.static_directory.as_deref())
        .await
        .map_err(Error::from)
}

/// Read bytes until the end of the HTTP request head. Everything read is
/// returned so the handshake can be replayed.
async fn read_request_head<S>(stream: &mut S) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(512);
    let mut chunk = [0u8; 512];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::transport("connection closed before request head"));
        }
        head.extend_from_slice(&chunk[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") {
            return Ok(head);
        }
        if head.len() > MAX_HEAD_LEN {
            return Err(Error::transport("request head too large"));
        }
    }
}

/// Extract method and path (query stripped) from the request line.
fn parse_request_line(head: &[u8]) -> Option<(String, String)> {
    let line_end = head.windows(2).position(|w| w == b"\r\n")?;
    let line = std::str::from_utf8(&head[..line_end]).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    let path = target.split('?').next().unwrap_or(target);
    Some((method.to_string(), path.to_string()))
}
