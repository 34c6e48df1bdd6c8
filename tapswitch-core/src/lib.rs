//! tapswitch core library
//!
//! This crate provides the fundamental types, error handling, and
//! configuration surface shared by the tapswitch layer-2 bridge crates.

pub mod config;
pub mod error;
pub mod frame;
pub mod mac;
pub mod uplink;

// Re-export commonly used types
pub use config::{parse_bandwidth, Config, FloodPolicy, ThrottlePolicy, TlsConfig};
pub use error::{Error, Result};
pub use mac::MacAddr;
pub use uplink::Uplink;
