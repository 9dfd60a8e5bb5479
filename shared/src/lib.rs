//! spplink Shared Types
//!
//! This crate provides the control message types, frame codec and link
//! constants shared between the `spplink` daemon and the `linkctl` tool.

pub mod codec;
pub mod state_machine;

pub use state_machine::{ConnectionState, LinkEvent, LinkStateMachine, TransitionResult};

/// Link parameters shared by every transport
pub mod link {
    /// Serial Port Profile service class UUID
    pub const SPP_UUID: &str = "00001101-0000-1000-8000-00805F9B34FB";

    /// SPP service class UUID as a 128-bit value
    pub const SPP_UUID_U128: u128 = 0x0000_1101_0000_1000_8000_0080_5F9B_34FB;

    /// Bound on a single connect attempt in milliseconds
    pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

    /// Liveness loop wake-up interval in milliseconds
    pub const LIVENESS_INTERVAL_MS: u64 = 1_500;

    /// Size of the read loop buffer
    pub const READ_BUFFER_SIZE: usize = 1024;

    /// Default address of the control socket
    pub const DEFAULT_CONTROL_ADDR: &str = "127.0.0.1:7070";
}

/// Request to disconnect and forget every peer with a display name
#[derive(Clone, PartialEq, prost::Message)]
pub struct ForgetPeer {
    #[prost(string, tag = "1")]
    pub display_name: String,
}

/// Control message sent to a running link manager
#[derive(Clone, PartialEq, prost::Message)]
pub struct ControlMessage {
    #[prost(message, optional, tag = "1")]
    pub forget_peer: Option<ForgetPeer>,
}

impl ControlMessage {
    /// Create a "disconnect and forget" request for a display name
    pub fn forget_peer(display_name: impl Into<String>) -> Self {
        Self {
            forget_peer: Some(ForgetPeer {
                display_name: display_name.into(),
            }),
        }
    }

    /// Display name targeted by this message, if it carries a forget request
    pub fn display_name(&self) -> Option<&str> {
        self.forget_peer.as_ref().map(|f| f.display_name.as_str())
    }
}
