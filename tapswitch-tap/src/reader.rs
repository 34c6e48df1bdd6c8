//! The TAP-to-hub frame pump.

use crate::device::TapDevice;
use bytes::Bytes;
use std::sync::Arc;
use tapswitch_core::frame::{FrameView, MIN_SWITCHABLE_LEN, TAP_READ_LEN};
use tapswitch_core::Result;
use tapswitch_hub::Hub;
use tracing::{debug, warn};

/// Read frames from the TAP device and switch them through the hub until a
/// read fails. The returned error is fatal to the whole process.
pub async fn run(tap: Arc<TapDevice>, hub: Arc<Hub>) -> Result<()> {
    let mut buf = [0u8; TAP_READ_LEN];
    loop {
        let n = tap.recv(&mut buf).await?;
        if n < MIN_SWITCHABLE_LEN {
            warn!(
                bytes = n,
                "discarding invalid frame read from TAP interface"
            );
            continue;
        }

        let frame = Bytes::copy_from_slice(&buf[..n]);
        let handled = hub.switch(None, frame.clone()).await?;
        if !handled {
            debug!(frame = %FrameView(&frame), "could not switch frame from TAP interface");
        }
    }
}
