//! Registry of live connections keyed by peer
//!
//! This module handles:
//! - Adding, removing and looking up connections by peer identity
//! - Routing writes and status queries to the matching connection
//! - Applying external "forget peer" control messages

mod control;
mod manager;

pub use control::{handle_control_client, serve_control};
pub use manager::ConnectionRegistry;
