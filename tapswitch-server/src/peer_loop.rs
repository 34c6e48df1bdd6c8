//! The per-peer reader loop.
//!
//! Consumes binary WebSocket messages, dispatches control frames, validates
//! source MACs, and hands data frames to the hub for switching. Peer-local
//! protocol violations never escape this loop; only transport and uplink
//! errors end it.

use bytes::Bytes;
use futures_util::{future, SinkExt, StreamExt};
use std::sync::Arc;
use tapswitch_core::frame::{self, FrameView};
use tapswitch_core::Config;
use tapswitch_hub::{control, Hub, Peer};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, warn};

/// Whether the reader keeps going after a frame.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Continue,
    Shutdown,
}

/// Drive one peer until its socket closes or a fatal error occurs.
pub async fn run<S>(hub: Arc<Hub>, config: Arc<Config>, ws: WebSocketStream<S>, remote: String)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, mut stream) = ws.split();
    let sink = sink.with(|frame: Bytes| future::ready(Ok::<Message, WsError>(Message::binary(frame))));
    let peer = hub.add(remote, sink);

    loop {
        match stream.next().await {
            None => {
                // EOF is the normal way for a websocket peer to leave.
                debug!(peer = %peer, "peer closed connection");
                hub.remove(&peer);
                return;
            }
            Some(Err(e)) => {
                warn!(peer = %peer, error = %e, "dropping peer after read error");
                hub.remove(&peer);
                return;
            }
            Some(Ok(Message::Binary(data))) => {
                if process_frame(&hub, &config, &peer, data).await == Step::Shutdown {
                    return;
                }
            }
            Some(Ok(Message::Close(_))) => {
                debug!(peer = %peer, "peer sent close");
                hub.remove(&peer);
                return;
            }
            Some(Ok(_)) => {
                // Ping/pong are handled by the protocol layer; text frames
                // have no meaning here.
                debug!(peer = %peer, "ignoring non-binary message");
            }
        }
    }
}

async fn process_frame(hub: &Arc<Hub>, config: &Arc<Config>, peer: &Arc<Peer>, data: Vec<u8>) -> Step {
    if peer.is_quarantined() {
        debug!(peer = %peer, "discarding frame from quarantined peer");
        return Step::Continue;
    }

    if data.len() < frame::MIN_SWITCHABLE_LEN {
        warn!(peer = %peer, bytes = data.len(), "skipping too short frame");
        return Step::Continue;
    }

    if frame::is_control(&data) {
        if let Err(e) = control::apply(peer, config.auth_key.as_deref(), &data[6..]) {
            warn!(peer = %peer, frame = %FrameView(&data), "{}", e);
            if e.quarantines() {
                peer.quarantine();
            }
        }
        return Step::Continue;
    }

    if !peer.is_authorized() {
        warn!(peer = %peer, frame = %FrameView(&data), "discarding unauthorized frame");
        if data.len() < 60 {
            warn!(peer = %peer, "discarded: {}", String::from_utf8_lossy(&data));
        }
        return Step::Continue;
    }

    let Some(src) = frame::source(&data) else {
        return Step::Continue;
    };
    if let Err(violation) = hub.can_source_mac(peer, src) {
        warn!(peer = %peer, frame = %FrameView(&data), "{}", violation);
        peer.quarantine();
        return Step::Continue;
    }

    let data = Bytes::from(data);
    match hub.switch(Some(peer), data.clone()).await {
        Ok(true) => Step::Continue,
        Ok(false) => {
            debug!(peer = %peer, frame = %FrameView(&data), "frame could not be switched");
            Step::Continue
        }
        Err(e) => {
            error!(peer = %peer, error = %e, "dropping peer after uplink switch error");
            hub.remove(peer);
            Step::Shutdown
        }
    }
}
