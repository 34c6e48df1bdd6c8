//! In-band control protocol
//!
//! Frames whose leading MAC field is all zeros carry a control PDU instead of
//! Ethernet data. The payload is parsed once into a tagged variant; new PDUs
//! are added by extending [`ControlPdu`].

use crate::peer::Peer;
use thiserror::Error;
use tracing::info;

/// Minimum control payload length. Together with the 5-byte `AUTH ` prefix
/// this forces authorization keys of at least 3 bytes.
pub const MIN_PAYLOAD_LEN: usize = 8;

const AUTH_PREFIX: &[u8] = b"AUTH ";

/// A parsed control PDU.
#[derive(Debug, PartialEq, Eq)]
pub enum ControlPdu<'a> {
    /// Shared-secret authorization request
    Auth { key: &'a [u8] },
}

/// Why a control frame was not honored. These are diagnostics: the frame is
/// skipped either way and the connection stays open.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ControlError {
    #[error("too short control payload ({0} bytes)")]
    TooShort(usize),

    #[error("unknown control frame: {0:?}")]
    Unknown(String),

    #[error("ignoring AUTH frame (authorization disabled on server side)")]
    AuthDisabled,

    #[error("peer already authorized, ignoring AUTH")]
    AlreadyAuthorized,

    #[error("AUTH key not accepted")]
    AuthRejected,
}

impl ControlError {
    /// Whether the peer must be quarantined in response.
    pub fn quarantines(&self) -> bool {
        matches!(self, ControlError::AuthRejected)
    }
}

/// Parse a control payload into a PDU.
pub fn parse(payload: &[u8]) -> Result<ControlPdu<'_>, ControlError> {
    if payload.len() < MIN_PAYLOAD_LEN {
        return Err(ControlError::TooShort(payload.len()));
    }
    if let Some(key) = payload.strip_prefix(AUTH_PREFIX) {
        return Ok(ControlPdu::Auth { key });
    }
    Err(ControlError::Unknown(
        String::from_utf8_lossy(&payload[..AUTH_PREFIX.len()]).into_owned(),
    ))
}

/// Parse and apply a control payload to a peer.
///
/// The frame is consumed here regardless of the outcome; the caller moves on
/// to the next frame, quarantining the peer first when the returned error
/// says so. A failed authorization does not close the connection.
pub fn apply(peer: &Peer, auth_key: Option<&str>, payload: &[u8]) -> Result<(), ControlError> {
    match parse(payload)? {
        ControlPdu::Auth { key } => {
            let Some(configured) = auth_key else {
                return Err(ControlError::AuthDisabled);
            };
            if peer.is_authorized() {
                return Err(ControlError::AlreadyAuthorized);
            }
            if key == configured.as_bytes() {
                peer.authorize();
                info!(peer = %peer, "AUTH key accepted");
                Ok(())
            } else {
                Err(ControlError::AuthRejected)
            }
        }
    }
}
