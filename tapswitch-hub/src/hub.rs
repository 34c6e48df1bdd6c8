//! The switching hub: peer registry, MAC index, and frame fan-out.

use crate::allowance::Allowance;
use crate::peer::{self, Peer};
use bytes::Bytes;
use futures_util::Sink;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tapswitch_core::frame::{self, FrameView};
use tapswitch_core::{Config, FloodPolicy, MacAddr, Result, Uplink};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A source-MAC policy violation. Every variant quarantines the offender.
#[derive(Error, Debug)]
pub enum MacViolation {
    /// Broadcast, multicast, or the zero sentinel offered as a source
    #[error("source MAC {0} is reserved and will not be learned")]
    ReservedSource(MacAddr),

    /// Source MAC outside the configured allowlist prefix
    #[error("source MAC {0} will not be accepted")]
    PrefixRejected(MacAddr),

    /// Source MAC already bound to another peer
    #[error("tried to send traffic with MAC {mac} owned by peer {owner}")]
    Spoofed { mac: MacAddr, owner: String },
}

/// The two registry maps. Kept jointly consistent: a peer has a learned MAC
/// iff `by_mac` holds that MAC, and every `by_mac` value is in `peers`.
#[derive(Default)]
struct Registry {
    peers: HashMap<Uuid, Arc<Peer>>,
    by_mac: HashMap<MacAddr, Arc<Peer>>,
}

/// Registry of connected peers and the switching fabric between them and the
/// uplink device.
pub struct Hub {
    config: Arc<Config>,
    uplink: Arc<dyn Uplink>,
    registry: Mutex<Registry>,
}

impl Hub {
    /// Create an empty hub.
    pub fn new(config: Arc<Config>, uplink: Arc<dyn Uplink>) -> Self {
        Self {
            config,
            uplink,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Register a new peer and spawn its sender task.
    ///
    /// The peer starts authorized iff no auth key is configured. No MAC is
    /// bound yet; that happens on its first valid data frame.
    pub fn add<Tx>(self: &Arc<Self>, remote_addr: String, sink: Tx) -> Arc<Peer>
    where
        Tx: Sink<Bytes> + Unpin + Send + 'static,
        Tx::Error: std::fmt::Display,
    {
        let (queue_tx, queue_rx) = mpsc::channel(self.config.send_queue_depth);
        let peer = Arc::new(Peer::new(
            remote_addr,
            self.config.auth_key.is_none(),
            Allowance::new(self.config.upload_rate, self.config.throttle_policy),
            queue_tx,
        ));

        self.registry.lock().peers.insert(peer.id(), peer.clone());
        debug!(peer = %peer, "peer joined");

        let hub = Arc::clone(self);
        let sender_peer = Arc::clone(&peer);
        let download = Allowance::new(self.config.download_rate, self.config.throttle_policy);
        tokio::spawn(async move {
            if let Err(e) = peer::run_sender(Arc::clone(&sender_peer), queue_rx, sink, download).await
            {
                error!(peer = %sender_peer, error = %e, "dropping peer after send error");
                hub.remove(&sender_peer);
            }
        });

        peer
    }

    /// Remove a peer: signal its sender, drop it from both maps, and let the
    /// closing socket unblock its reader. Idempotent.
    pub fn remove(&self, peer: &Arc<Peer>) {
        let removed = {
            let mut registry = self.registry.lock();
            match registry.peers.remove(&peer.id()) {
                Some(_) => {
                    if let Some(mac) = peer.learned_mac() {
                        registry.by_mac.remove(&mac);
                    }
                    true
                }
                None => false,
            }
        };

        if removed {
            peer.terminate();
            debug!(peer = %peer, "peer removed");
        }
    }

    /// Remove every peer and reset both maps. Used on shutdown.
    pub fn clear(&self) {
        let mut registry = self.registry.lock();
        for peer in registry.peers.values() {
            peer.terminate();
            debug!(peer = %peer, "peer removed");
        }
        registry.peers.clear();
        registry.by_mac.clear();
    }

    /// Number of connected peers.
    pub fn peer_count(&self) -> usize {
        self.registry.lock().peers.len()
    }

    /// The peer currently bound to `mac`, if any.
    pub fn peer_by_mac(&self, mac: MacAddr) -> Option<Arc<Peer>> {
        self.registry.lock().by_mac.get(&mac).cloned()
    }

    /// Decide whether `peer` may source frames from `src`, learning the
    /// binding on first contact. Called for every non-control data frame
    /// before switching; the caller quarantines the peer on any violation.
    pub fn can_source_mac(&self, peer: &Arc<Peer>, src: MacAddr) -> std::result::Result<(), MacViolation> {
        let mut registry = self.registry.lock();

        if let Some(owner) = registry.by_mac.get(&src) {
            if Arc::ptr_eq(owner, peer) {
                return Ok(());
            }
            return Err(MacViolation::Spoofed {
                mac: src,
                owner: owner.to_string(),
            });
        }

        // First data frame from this source: validate, then bind.
        if src.is_reserved_source() {
            return Err(MacViolation::ReservedSource(src));
        }
        if let Some(prefix) = &self.config.mac_prefix {
            if !src.to_string().starts_with(prefix.as_str()) {
                return Err(MacViolation::PrefixRejected(src));
            }
        }

        peer.bind_mac(src);
        registry.by_mac.insert(src, Arc::clone(peer));
        info!(peer = %peer, mac = %src, "peer now associated with MAC");
        Ok(())
    }

    /// Switch one frame from `source` (`None` when it came from the uplink)
    /// to its destinations. Returns whether the frame was handled; errors
    /// bubble up only from uplink writes and are fatal for the source peer.
    ///
    /// Destinations are resolved and peer queues filled under the registry
    /// lock, which preserves per-destination ordering; the uplink write
    /// happens after the lock is released.
    pub async fn switch(&self, source: Option<&Arc<Peer>>, frame: Bytes) -> Result<bool> {
        let Some(dst) = frame::destination(&frame) else {
            return Ok(false);
        };

        let flood = match self.config.flood_policy {
            FloodPolicy::Compat => dst.is_broadcast() && dst.is_ipv4_multicast(),
            FloodPolicy::Standard => dst.is_broadcast() || dst.is_multicast(),
        };

        let (to_uplink, handled) = {
            let registry = self.registry.lock();
            if flood {
                for peer in registry.by_mac.values() {
                    peer.enqueue(frame.clone());
                }
                (source.is_some(), true)
            } else if let Some(peer) = registry.by_mac.get(&dst) {
                peer.enqueue(frame.clone());
                (false, true)
            } else {
                // Unknown destination: uplink if a peer sent it, otherwise
                // the caller logs and moves on.
                (source.is_some(), source.is_some())
            }
        };

        if to_uplink {
            if let Some(peer) = source {
                if peer.upload_throttle(frame.len()) {
                    warn!(
                        peer = %peer,
                        frame = %FrameView(&frame),
                        "discarding because of upload rate limiting"
                    );
                } else {
                    self.uplink.transmit(&frame).await?;
                }
            }
        }

        Ok(handled)
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::channel::mpsc as fmpsc;
    use futures_util::StreamExt;
    use tapswitch_core::Error;

    /// Uplink mock that records transmitted frames.
    struct MockUplink {
        frames: Mutex<Vec<Vec<u8>>>,
        fail: std::sync::atomic::AtomicBool,
    }

    impl MockUplink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(Vec::new()),
                fail: std::sync::atomic::AtomicBool::new(false),
            })
        }

        fn transmitted(&self) -> Vec<Vec<u8>> {
            self.frames.lock().clone()
        }
    }

    #[async_trait]
    impl Uplink for MockUplink {
        fn name(&self) -> &str {
            "mock0"
        }

        async fn transmit(&self, frame: &[u8]) -> Result<()> {
            if self.fail.load(std::sync::atomic::Ordering::Relaxed) {
                return Err(Error::tap("injected failure"));
            }
            self.frames.lock().push(frame.to_vec());
            Ok(())
        }
    }

    fn make_hub(config: Config) -> (Arc<Hub>, Arc<MockUplink>) {
        let uplink = MockUplink::new();
        let hub = Arc::new(Hub::new(Arc::new(config), uplink.clone()));
        (hub, uplink)
    }

    fn add_peer(hub: &Arc<Hub>) -> (Arc<Peer>, fmpsc::UnboundedReceiver<Bytes>) {
        let (sink, out) = fmpsc::unbounded::<Bytes>();
        let peer = hub.add("127.0.0.1:5000".to_string(), sink);
        (peer, out)
    }

    const MAC_A: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x01]);
    const MAC_B: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x02]);

    fn data_frame(dst: MacAddr, src: MacAddr) -> Bytes {
        let mut frame = Vec::with_capacity(64);
        frame.extend_from_slice(dst.as_bytes());
        frame.extend_from_slice(src.as_bytes());
        frame.extend_from_slice(&[0x08, 0x00]);
        frame.extend_from_slice(&[0u8; 50]);
        Bytes::from(frame)
    }

    #[tokio::test]
    async fn test_learns_mac_on_first_frame() {
        let (hub, _uplink) = make_hub(Config::default());
        let (peer, _out) = add_peer(&hub);

        hub.can_source_mac(&peer, MAC_A).unwrap();
        assert_eq!(peer.learned_mac(), Some(MAC_A));
        assert!(Arc::ptr_eq(&hub.peer_by_mac(MAC_A).unwrap(), &peer));

        // Same MAC from the same peer stays fine.
        hub.can_source_mac(&peer, MAC_A).unwrap();
    }

    #[tokio::test]
    async fn test_reserved_sources_rejected() {
        let (hub, _uplink) = make_hub(Config::default());
        let (peer, _out) = add_peer(&hub);

        for mac in [
            MacAddr::BROADCAST,
            MacAddr::ZERO,
            MacAddr([0x01, 0x00, 0x5e, 0, 0, 1]),
            MacAddr([0x33, 0x33, 0, 0, 0, 1]),
        ] {
            assert!(matches!(
                hub.can_source_mac(&peer, mac),
                Err(MacViolation::ReservedSource(_))
            ));
            assert!(hub.peer_by_mac(mac).is_none());
        }
        assert_eq!(peer.learned_mac(), None);
    }

    #[tokio::test]
    async fn test_mac_prefix_allowlist() {
        let config = Config {
            mac_prefix: Some("02:00".to_string()),
            ..Config::default()
        };
        let (hub, _uplink) = make_hub(config);
        let (peer, _out) = add_peer(&hub);

        assert!(matches!(
            hub.can_source_mac(&peer, MacAddr([0x06, 0, 0, 0, 0, 1])),
            Err(MacViolation::PrefixRejected(_))
        ));
        hub.can_source_mac(&peer, MAC_A).unwrap();
    }

    #[tokio::test]
    async fn test_spoofing_detected() {
        let (hub, _uplink) = make_hub(Config::default());
        let (peer_a, _out_a) = add_peer(&hub);
        let (peer_b, _out_b) = add_peer(&hub);

        hub.can_source_mac(&peer_a, MAC_A).unwrap();
        assert!(matches!(
            hub.can_source_mac(&peer_b, MAC_A),
            Err(MacViolation::Spoofed { .. })
        ));

        // A's binding is unaffected.
        assert!(Arc::ptr_eq(&hub.peer_by_mac(MAC_A).unwrap(), &peer_a));
        assert_eq!(peer_b.learned_mac(), None);
    }

    #[tokio::test]
    async fn test_unicast_to_learned_peer() {
        let (hub, uplink) = make_hub(Config::default());
        let (peer_a, _out_a) = add_peer(&hub);
        let (peer_b, mut out_b) = add_peer(&hub);

        hub.can_source_mac(&peer_a, MAC_A).unwrap();
        hub.can_source_mac(&peer_b, MAC_B).unwrap();

        let frame = data_frame(MAC_B, MAC_A);
        assert!(hub.switch(Some(&peer_a), frame.clone()).await.unwrap());

        // Delivered to B exactly once, never to the uplink.
        assert_eq!(out_b.next().await.unwrap(), frame);
        assert!(uplink.transmitted().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_destination_goes_to_uplink() {
        let (hub, uplink) = make_hub(Config::default());
        let (peer_a, _out_a) = add_peer(&hub);
        hub.can_source_mac(&peer_a, MAC_A).unwrap();

        let frame = data_frame(MAC_B, MAC_A);
        assert!(hub.switch(Some(&peer_a), frame.clone()).await.unwrap());
        assert_eq!(uplink.transmitted(), vec![frame.to_vec()]);
    }

    #[tokio::test]
    async fn test_uplink_frame_with_unknown_destination_unhandled() {
        let (hub, uplink) = make_hub(Config::default());
        let frame = data_frame(MAC_B, MAC_A);
        assert!(!hub.switch(None, frame).await.unwrap());
        assert!(uplink.transmitted().is_empty());
    }

    #[tokio::test]
    async fn test_compat_flood_sends_broadcast_to_uplink_only() {
        // Under the compat policy a plain broadcast is not classified as a
        // flood, so it takes the unknown-destination path to the device.
        let (hub, uplink) = make_hub(Config::default());
        let (peer_a, _out_a) = add_peer(&hub);
        let (_peer_b, mut out_b) = add_peer(&hub);
        hub.can_source_mac(&peer_a, MAC_A).unwrap();

        let frame = data_frame(MacAddr::BROADCAST, MAC_A);
        assert!(hub.switch(Some(&peer_a), frame.clone()).await.unwrap());
        assert_eq!(uplink.transmitted(), vec![frame.to_vec()]);
        assert!(out_b.try_next().is_err()); // nothing enqueued
    }

    #[tokio::test]
    async fn test_standard_flood_reaches_all_learned_peers_and_uplink() {
        let config = Config {
            flood_policy: FloodPolicy::Standard,
            ..Config::default()
        };
        let (hub, uplink) = make_hub(config);
        let (peer_a, mut out_a) = add_peer(&hub);
        let (peer_b, mut out_b) = add_peer(&hub);
        hub.can_source_mac(&peer_a, MAC_A).unwrap();
        hub.can_source_mac(&peer_b, MAC_B).unwrap();

        let frame = data_frame(MacAddr::BROADCAST, MAC_A);
        assert!(hub.switch(Some(&peer_a), frame.clone()).await.unwrap());

        // Every peer in the MAC index receives the flood, the source
        // included, and the frame also goes out the device.
        assert_eq!(out_a.next().await.unwrap(), frame);
        assert_eq!(out_b.next().await.unwrap(), frame);
        assert_eq!(uplink.transmitted(), vec![frame.to_vec()]);
    }

    #[tokio::test]
    async fn test_standard_flood_from_uplink_not_echoed_back() {
        let config = Config {
            flood_policy: FloodPolicy::Standard,
            ..Config::default()
        };
        let (hub, uplink) = make_hub(config);
        let (peer_a, mut out_a) = add_peer(&hub);
        hub.can_source_mac(&peer_a, MAC_A).unwrap();

        let frame = data_frame(MacAddr::BROADCAST, MAC_B);
        assert!(hub.switch(None, frame.clone()).await.unwrap());
        assert_eq!(out_a.next().await.unwrap(), frame);
        assert!(uplink.transmitted().is_empty());
    }

    #[tokio::test]
    async fn test_uplink_error_propagates() {
        let (hub, uplink) = make_hub(Config::default());
        let (peer_a, _out_a) = add_peer(&hub);
        hub.can_source_mac(&peer_a, MAC_A).unwrap();
        uplink.fail.store(true, std::sync::atomic::Ordering::Relaxed);

        let frame = data_frame(MAC_B, MAC_A);
        assert!(hub.switch(Some(&peer_a), frame).await.is_err());
    }

    #[tokio::test]
    async fn test_upload_throttle_drops_instead_of_transmitting() {
        let config = Config {
            upload_rate: 1000,
            ..Config::default()
        };
        let (hub, uplink) = make_hub(config);
        let (peer_a, _out_a) = add_peer(&hub);
        hub.can_source_mac(&peer_a, MAC_A).unwrap();

        // Legacy bucket signals throttle while credit remains.
        let frame = data_frame(MAC_B, MAC_A);
        assert!(hub.switch(Some(&peer_a), frame).await.unwrap());
        assert!(uplink.transmitted().is_empty());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent_and_unbinds_mac() {
        let (hub, _uplink) = make_hub(Config::default());
        let (peer, _out) = add_peer(&hub);
        hub.can_source_mac(&peer, MAC_A).unwrap();
        assert_eq!(hub.peer_count(), 1);

        hub.remove(&peer);
        assert_eq!(hub.peer_count(), 0);
        assert!(hub.peer_by_mac(MAC_A).is_none());

        hub.remove(&peer);
        assert_eq!(hub.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_terminates_sender() {
        let (hub, _uplink) = make_hub(Config::default());
        let (peer, mut out) = add_peer(&hub);
        hub.remove(&peer);

        // The sender closes its sink once the terminator fires.
        assert!(out.next().await.is_none());
    }

    #[tokio::test]
    async fn test_clear_empties_registry() {
        let (hub, _uplink) = make_hub(Config::default());
        let (peer_a, mut out_a) = add_peer(&hub);
        let (_peer_b, _out_b) = add_peer(&hub);
        hub.can_source_mac(&peer_a, MAC_A).unwrap();

        hub.clear();
        assert_eq!(hub.peer_count(), 0);
        assert!(hub.peer_by_mac(MAC_A).is_none());
        assert!(out_a.next().await.is_none());
    }

    #[tokio::test]
    async fn test_pre_authorization_follows_auth_key() {
        let (hub, _uplink) = make_hub(Config::default());
        let (peer, _out) = add_peer(&hub);
        assert!(peer.is_authorized());

        let config = Config {
            auth_key: Some("s3cret".to_string()),
            ..Config::default()
        };
        let (hub, _uplink) = make_hub(config);
        let (peer, _out) = add_peer(&hub);
        assert!(!peer.is_authorized());
    }
}
