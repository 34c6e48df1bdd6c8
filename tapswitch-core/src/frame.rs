//! Ethernet frame accessors
//!
//! Frames travel through the switch as opaque byte sequences; this module
//! provides the field accessors and classification helpers the switching
//! fabric needs, plus a diagnostic formatter used by the log statements.

use crate::MacAddr;
use std::fmt;

/// Ethernet header size (dst + src + ethertype)
pub const HEADER_LEN: usize = 14;

/// Shortest frame the switch will look at: both MAC fields must be present.
pub const MIN_SWITCHABLE_LEN: usize = 12;

/// Read buffer for the TAP device: MTU 1500 plus link-layer overhead.
pub const TAP_READ_LEN: usize = 1518;

/// EtherType for IPv4
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// Destination MAC of a frame, `None` if the frame is shorter than 6 bytes
pub fn destination(frame: &[u8]) -> Option<MacAddr> {
    MacAddr::from_slice(frame.get(..6)?)
}

/// Source MAC of a frame, `None` if the frame is shorter than 12 bytes
pub fn source(frame: &[u8]) -> Option<MacAddr> {
    MacAddr::from_slice(frame.get(6..12)?)
}

/// EtherType of a frame, `None` if the frame has no complete header
pub fn ethertype(frame: &[u8]) -> Option<u16> {
    let bytes = frame.get(12..14)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// True when the leading MAC field is all zeros, marking a control frame.
/// The remaining bytes (`frame[6..]`) are the control payload.
pub fn is_control(frame: &[u8]) -> bool {
    frame.len() >= 6 && frame[..6] == [0u8; 6]
}

/// Diagnostic view of a raw frame.
///
/// Formats as `{N bytes [src] -> [dst]}`; when the frame carries an IPv4
/// payload the inner addresses and TTL are decoded as well.
pub struct FrameView<'a>(pub &'a [u8]);

impl fmt::Display for FrameView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = self.0;
        let (Some(dst), Some(src)) = (destination(frame), source(frame)) else {
            return write!(f, "{{{} bytes}}", frame.len());
        };

        if ethertype(frame) == Some(ETHERTYPE_IPV4) && frame.len() >= HEADER_LEN + 20 {
            let ip = &frame[HEADER_LEN..];
            return write!(
                f,
                "{{{} bytes [{}]({}.{}.{}.{}) -> [{}]({}.{}.{}.{}) TTL={}}}",
                frame.len(),
                src,
                ip[12],
                ip[13],
                ip[14],
                ip[15],
                dst,
                ip[16],
                ip[17],
                ip[18],
                ip[19],
                ip[8],
            );
        }
        write!(f, "{{{} bytes [{}] -> [{}]}}", frame.len(), src, dst)
    }
}
