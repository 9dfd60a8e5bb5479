//! spplink
//!
//! Manages Bluetooth Serial Port Profile links to one or more peers: a
//! per-peer connection state machine with a read or liveness loop, and a
//! registry that owns the association from peer to connection.

pub mod config;
pub mod connection;
pub mod error;
pub mod peer;
pub mod registry;
pub mod transport;

pub use connection::{
    ActiveTask, Connection, ConnectionConfig, ConnectionEvent, ConnectionListener,
    EventForwarder, LinkMode, Payload,
};
pub use error::LinkError;
pub use peer::PeerIdentity;
pub use registry::ConnectionRegistry;
pub use spplink_shared::ConnectionState;
