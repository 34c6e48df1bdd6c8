//! tapswitch switching hub
//!
//! The data structures and concurrency discipline at the center of the
//! bridge: the peer registry and MAC index, source-MAC acceptance with
//! anti-spoofing, frame switching with flood fan-out, per-peer token-bucket
//! throttling, and the in-band control protocol.

pub mod allowance;
pub mod control;
pub mod hub;
pub mod peer;

pub use allowance::Allowance;
pub use control::{ControlError, ControlPdu};
pub use hub::{Hub, MacViolation};
pub use peer::Peer;
