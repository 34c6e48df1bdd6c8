//! TAP device collaborator for tapswitch
//!
//! Creates the kernel TAP interface, exposes it as the hub's uplink, and
//! runs the singleton task that pumps frames from the device into the
//! switching fabric.

pub mod device;
pub mod reader;
pub mod setup;

pub use device::TapDevice;
