//! TAP interface bring-up via ip(8).

use std::process::Command;
use tracing::{error, info};

/// Bring the interface up and assign its IPv4 address/netmask.
///
/// Failures here are logged but not fatal: the operator may have configured
/// the interface out of band.
pub fn configure_ipv4(device: &str, ipv4: &str) {
    if let Err(e) = Command::new("ip")
        .args(["link", "set", device, "up"])
        .status()
        .and_then(expect_success)
    {
        error!(device, error = %e, "bringing TAP interface up");
        return;
    }

    if let Err(e) = Command::new("ip")
        .args(["addr", "add", ipv4, "brd", "+", "dev", device])
        .status()
        .and_then(expect_success)
    {
        error!(device, error = %e, "configuring TAP interface IPv4");
        return;
    }

    info!(device, ipv4, "TAP interface is up");
}

fn expect_success(status: std::process::ExitStatus) -> std::io::Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!("ip exited with {}", status)))
    }
}
