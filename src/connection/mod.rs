//! Point-to-point links to individual peers
//!
//! This module handles:
//! - The per-peer connection state machine with a bounded connect attempt
//! - One background task per link: a read loop or a liveness loop
//! - A serialized write path
//! - Ordered delivery of link events to a listener

mod link;
mod listener;
mod payload;

pub use link::{ActiveTask, Connection, ConnectionConfig, LinkMode};
pub use listener::{ConnectionEvent, ConnectionListener, EventForwarder};
pub use payload::Payload;
