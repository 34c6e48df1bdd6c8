//! Typed configuration consumed by the hub, server, and TAP collaborators.
//!
//! Option parsing lives in the CLI crate; everything here is already
//! validated and is threaded immutably through construction so the switching
//! hot paths never consult process-wide state.

use std::path::PathBuf;

/// How the switching fabric classifies frames for flooding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FloodPolicy {
    /// Flood only when the destination is broadcast and IPv4 multicast at
    /// once. Vacuously false for standard traffic, so broadcast frames take
    /// the unknown-destination path toward the TAP device. Kept as the
    /// default for wire compatibility with existing deployments.
    #[default]
    Compat,
    /// Flood when the destination is broadcast or any multicast address.
    Standard,
}

/// How per-peer token buckets account candidate frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThrottlePolicy {
    /// Signal throttle while any credit remains, accounting the frame;
    /// pass frames unaccounted once credit is exhausted. Kept as the default
    /// for behavioral compatibility.
    #[default]
    Legacy,
    /// Conventional token bucket: admit iff credit covers the frame size.
    Strict,
}

/// TLS material for the acceptor.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// PEM certificate chain
    pub cert_file: PathBuf,
    /// PEM private key
    pub key_file: PathBuf,
}

/// Immutable switch configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the acceptor binds; `:port` binds all interfaces
    pub listen_address: String,
    /// TLS material; `None` disables TLS
    pub tls: Option<TlsConfig>,
    /// Shared secret for in-band authorization; `None` pre-authorizes peers
    pub auth_key: Option<String>,
    /// Textual prefix source MACs must carry to be learned
    pub mac_prefix: Option<String>,
    /// Per-peer upload rate in bytes/second; 0 disables throttling
    pub upload_rate: u64,
    /// Per-peer download rate in bytes/second; 0 disables throttling
    pub download_rate: u64,
    /// TAP interface name; empty lets the kernel choose
    pub tap_name: String,
    /// IPv4 address/netmask assigned to the TAP interface
    pub tap_ipv4: String,
    /// Static files served at `/`; `None` disables the file server
    pub static_directory: Option<PathBuf>,
    /// Flood classification policy
    pub flood_policy: FloodPolicy,
    /// Token bucket accounting policy
    pub throttle_policy: ThrottlePolicy,
    /// Capacity of each peer's send queue
    pub send_queue_depth: usize,
}

/// Default capacity of a peer's send queue.
pub const DEFAULT_SEND_QUEUE_DEPTH: usize = 100;

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: ":8000".to_string(),
            tls: None,
            auth_key: None,
            mac_prefix: None,
            upload_rate: 0,
            download_rate: 0,
            tap_name: String::new(),
            tap_ipv4: "10.3.0.1/16".to_string(),
            static_directory: None,
            flood_policy: FloodPolicy::default(),
            throttle_policy: ThrottlePolicy::default(),
            send_queue_depth: DEFAULT_SEND_QUEUE_DEPTH,
        }
    }
}

/// Parse a bandwidth specification into bytes per second.
///
/// Accepted units: `kbps` (kilobytes/s), `mbps` (megabytes/s), `kbit`
/// (kilobits/s), `mbit` (megabits/s), `bps` or a bare number (bytes/s).
/// An empty string means unlimited and parses to 0.
pub fn parse_bandwidth(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(0);
    }

    let (number, multiplier) = if let Some(prefix) = s.strip_suffix("kbps") {
        (prefix, 1_000)
    } else if let Some(prefix) = s.strip_suffix("mbps") {
        (prefix, 1_000_000)
    } else if let Some(prefix) = s.strip_suffix("kbit") {
        (prefix, 125)
    } else if let Some(prefix) = s.strip_suffix("mbit") {
        (prefix, 125_000)
    } else if let Some(prefix) = s.strip_suffix("bps") {
        (prefix, 1)
    } else {
        (s, 1)
    };

    let n: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("cannot parse {:?} as a bandwidth", s))?;
    Ok(n * multiplier)
}
