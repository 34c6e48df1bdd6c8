//! Async wrapper around the kernel TAP interface.

use async_trait::async_trait;
use std::io;
use std::os::unix::io::AsRawFd;
use tapswitch_core::{Error, Result, Uplink};
use tokio::io::unix::AsyncFd;
use tracing::debug;
use tun_tap::{Iface, Mode};

/// A TAP interface registered with the tokio reactor.
///
/// The device is multi-writer at the OS level; `send` takes `&self` and each
/// call writes exactly one frame.
pub struct TapDevice {
    inner: AsyncFd<Iface>,
}

impl TapDevice {
    /// Create a TAP interface. An empty name lets the kernel pick one.
    ///
    /// It is common for this to fail for lack of privilege; the caller turns
    /// that into a startup error with its own exit code.
    pub fn create(name: &str) -> Result<Self> {
        let iface = Iface::without_packet_info(name, Mode::Tap)
            .map_err(|e| Error::tap(format!("creating TAP interface: {}", e)))?;

        set_nonblocking(iface.as_raw_fd())
            .map_err(|e| Error::tap(format!("configuring TAP interface: {}", e)))?;

        let inner = AsyncFd::new(iface)
            .map_err(|e| Error::tap(format!("registering TAP interface: {}", e)))?;

        debug!(device = inner.get_ref().name(), "TAP interface created");
        Ok(Self { inner })
    }

    /// Kernel name of the interface.
    pub fn name(&self) -> &str {
        self.inner.get_ref().name()
    }

    /// Read one frame into `buf`, waiting for the device to become readable.
    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.inner.readable().await?;
            match guard.try_io(|inner| inner.get_ref().recv(buf)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    /// Write one frame, waiting for the device to become writable.
    pub async fn send(&self, frame: &[u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.inner.writable().await?;
            match guard.try_io(|inner| inner.get_ref().send(frame)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}

#[async_trait]
impl Uplink for TapDevice {
    fn name(&self) -> &str {
        TapDevice::name(self)
    }

    async fn transmit(&self, frame: &[u8]) -> Result<()> {
        self.send(frame).await?;
        Ok(())
    }
}

fn set_nonblocking(fd: libc::c_int) -> io::Result<()> {
    let mut nonblocking: libc::c_int = 1;
    let result = unsafe { libc::ioctl(fd, libc::FIONBIO, &mut nonblocking) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
