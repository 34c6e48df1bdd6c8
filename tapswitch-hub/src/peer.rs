//! A connected WebSocket participant and its sender task.

use crate::allowance::Allowance;
use bytes::Bytes;
use futures_util::{Sink, SinkExt};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tapswitch_core::frame::FrameView;
use tapswitch_core::MacAddr;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

/// One connected peer.
///
/// The hub owns the registry entry; the reader and sender tasks each hold an
/// `Arc`. The send queue decouples switching from socket progress: producers
/// enqueue without blocking and overflow drops the newest frame.
pub struct Peer {
    id: Uuid,
    remote_addr: String,
    authorized: AtomicBool,
    quarantined: AtomicBool,
    mac: Mutex<Option<MacAddr>>,
    upload: Mutex<Allowance>,
    queue: mpsc::Sender<Bytes>,
    shutdown: Notify,
}

impl Peer {
    pub(crate) fn new(
        remote_addr: String,
        pre_authorized: bool,
        upload: Allowance,
        queue: mpsc::Sender<Bytes>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            remote_addr,
            authorized: AtomicBool::new(pre_authorized),
            quarantined: AtomicBool::new(false),
            mac: Mutex::new(None),
            upload: Mutex::new(upload),
            queue,
            shutdown: Notify::new(),
        }
    }

    /// Stable identity of this peer within the hub.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Textual endpoint of the socket.
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Whether the peer may source data frames.
    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::Relaxed)
    }

    pub(crate) fn authorize(&self) {
        self.authorized.store(true, Ordering::Relaxed);
    }

    /// Whether all inbound frames from this peer are silently dropped.
    pub fn is_quarantined(&self) -> bool {
        self.quarantined.load(Ordering::Relaxed)
    }

    /// Quarantine the peer: its reader keeps draining the socket (to avoid
    /// reconnect storms) but discards every frame.
    pub fn quarantine(&self) {
        self.quarantined.store(true, Ordering::Relaxed);
    }

    /// The source MAC this peer is bound to, if one has been learned.
    pub fn learned_mac(&self) -> Option<MacAddr> {
        *self.mac.lock()
    }

    /// Bind the peer to a MAC. Called by the hub while it holds the registry
    /// lock, together with the matching MAC-index insert.
    pub(crate) fn bind_mac(&self, mac: MacAddr) {
        *self.mac.lock() = Some(mac);
    }

    /// Consult the upload bucket for a frame headed to the TAP device.
    pub fn upload_throttle(&self, frame_len: usize) -> bool {
        self.upload.lock().consult(frame_len)
    }

    /// Queue a frame for delivery to this peer. Never blocks: when the queue
    /// is full the frame is dropped and a warning logged.
    pub fn enqueue(&self, frame: Bytes) {
        match self.queue.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(frame)) => {
                warn!(
                    peer = %self,
                    frame = %FrameView(&frame),
                    "send queue full, dropping frame"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(peer = %self, "send queue closed, dropping frame");
            }
        }
    }

    /// Frames currently waiting in the send queue.
    pub fn pending(&self) -> usize {
        self.queue.max_capacity() - self.queue.capacity()
    }

    /// One-shot signal that stops the sender task, discarding queued frames.
    pub(crate) fn terminate(&self) {
        self.shutdown.notify_one();
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mac = self.learned_mac();
        write!(
            f,
            "{{remote={} mac={} authorized={} pending={}}}",
            self.remote_addr,
            mac.map(|m| m.to_string()).unwrap_or_else(|| "none".into()),
            self.is_authorized(),
            self.pending(),
        )
    }
}

/// Drain the peer's send queue into the WebSocket sink, subject to the
/// download bucket. Runs until the terminator fires, the queue closes, or a
/// write fails; pending frames are discarded on termination.
pub(crate) async fn run_sender<Tx>(
    peer: Arc<Peer>,
    mut queue: mpsc::Receiver<Bytes>,
    mut sink: Tx,
    mut download: Allowance,
) -> Result<(), Tx::Error>
where
    Tx: Sink<Bytes> + Unpin,
{
    loop {
        tokio::select! {
            _ = peer.shutdown.notified() => {
                debug!(peer = %peer, pending = queue.len(), "terminated frame delivery");
                let _ = sink.close().await;
                return Ok(());
            }
            frame = queue.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.close().await;
                    return Ok(());
                };
                if download.consult(frame.len()) {
                    warn!(
                        peer = %peer,
                        frame = %FrameView(&frame),
                        "discarding because of download rate limiting"
                    );
                    continue;
                }
                sink.send(frame).await?;
            }
        }
    }
}
