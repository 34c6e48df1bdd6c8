//! The uplink seam between the switching fabric and the kernel device.

use crate::Result;
use async_trait::async_trait;

/// A frame sink toward the host network stack.
///
/// The hub switches frames with unknown or flooded destinations out through
/// an `Uplink` without naming the device behind it; production wires the TAP
/// interface here, tests substitute a recording mock.
#[async_trait]
pub trait Uplink: Send + Sync {
    /// Device name, for diagnostics
    fn name(&self) -> &str;

    /// Write one Ethernet frame to the device.
    ///
    /// Errors are fatal for the peer that originated the frame.
    async fn transmit(&self, frame: &[u8]) -> Result<()>;
}
