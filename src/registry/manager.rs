//! Connection registry for tracking links to every peer

use crate::connection::{Connection, Payload};
use crate::peer::PeerIdentity;
use spplink_shared::{ConnectionState, ControlMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Maps peers to their connections
///
/// Holds only the association; transports and background tasks belong to
/// the connections themselves.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<PeerIdentity, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace the connection for `peer`, returning the replaced one
    pub async fn add(&self, peer: PeerIdentity, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        debug!("[REGISTRY] Adding {}", peer);
        self.connections.write().await.insert(peer, connection)
    }

    /// Remove the entry for `peer`; absent peers are ignored
    pub async fn remove(&self, peer: &PeerIdentity) -> Option<Arc<Connection>> {
        self.connections.write().await.remove(peer)
    }

    /// Remove every entry whose display name equals `name`
    ///
    /// Names are not unique, so this may remove several peers.
    pub async fn remove_by_display_name(&self, name: &str) -> Vec<Arc<Connection>> {
        let mut connections = self.connections.write().await;
        let matching: Vec<PeerIdentity> = connections
            .keys()
            .filter(|peer| peer.name() == name)
            .cloned()
            .collect();

        if matching.len() > 1 {
            warn!("[REGISTRY] {} peers share the name '{}'", matching.len(), name);
        }

        matching
            .iter()
            .filter_map(|peer| connections.remove(peer))
            .collect()
    }

    /// Peers with an entry, whatever their connection state
    pub async fn list(&self) -> Vec<PeerIdentity> {
        self.connections.read().await.keys().cloned().collect()
    }

    pub async fn get(&self, peer: &PeerIdentity) -> Option<Arc<Connection>> {
        self.connections.read().await.get(peer).cloned()
    }

    pub async fn is_connected(&self, peer: &PeerIdentity) -> Option<bool> {
        let connection = self.get(peer).await?;
        Some(connection.is_connected().await)
    }

    pub async fn state_of(&self, peer: &PeerIdentity) -> Option<ConnectionState> {
        let connection = self.get(peer).await?;
        Some(connection.state().await)
    }

    /// Write to a peer's connection; false if the peer has no entry
    pub async fn write_to(&self, peer: &PeerIdentity, payload: impl Into<Payload>) -> bool {
        match self.get(peer).await {
            Some(connection) => {
                connection.write(payload).await;
                true
            }
            None => false,
        }
    }

    /// Apply an external control message, returning how many peers were forgotten
    pub async fn handle_control(&self, message: &ControlMessage) -> usize {
        match message.display_name() {
            Some(name) => self.forget(name).await,
            None => {
                debug!("[REGISTRY] Ignoring empty control message");
                0
            }
        }
    }

    /// Disconnect and remove every peer named `name`
    pub async fn forget(&self, name: &str) -> usize {
        let removed = self.remove_by_display_name(name).await;
        for connection in &removed {
            connection.disconnect().await;
        }
        info!("[REGISTRY] Forgot {} peer(s) named '{}'", removed.len(), name);
        removed.len()
    }

    /// Disconnect every registered connection, keeping the entries
    pub async fn disconnect_all(&self) {
        let connections: Vec<Arc<Connection>> =
            self.connections.read().await.values().cloned().collect();
        for connection in connections {
            connection.disconnect().await;
        }
    }

    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
