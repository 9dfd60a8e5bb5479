//! Link error taxonomy

use std::time::Duration;
use thiserror::Error;

/// Errors raised on a peer link
///
/// Connect and stream failures never escape a background task; they are
/// turned into a state transition plus a listener notification. Only
/// `Connection::try_write` hands them to callers.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("No Bluetooth adapter available")]
    NoAdapter,

    #[error("Connection to {peer} timed out after {timeout:?}")]
    ConnectTimeout { peer: String, timeout: Duration },

    #[error("Connection to {peer} failed: {reason}")]
    ConnectFailed { peer: String, reason: String },

    #[error("Not connected")]
    NotConnected,

    #[error("Stream fault: {0}")]
    StreamFault(#[from] std::io::Error),
}
