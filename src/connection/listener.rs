//! Listener contract between a link and its owner

use crate::peer::PeerIdentity;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::debug;

/// Callbacks invoked by a [`Connection`](super::Connection)
///
/// Calls for one connection are delivered in order from a single notifier
/// task. A listener shared by several connections may be called from
/// several notifier tasks at once.
pub trait ConnectionListener: Send + Sync {
    fn on_connection_started(&self, peer: &PeerIdentity);
    fn on_connect(&self, peer: &PeerIdentity);
    fn on_connection_error(&self, peer: &PeerIdentity);
    fn on_read(&self, data: &str, peer: &PeerIdentity);
    fn on_disconnect(&self, peer: &PeerIdentity);
    fn on_no_bluetooth(&self);
}

/// Events emitted by a connection, one per listener callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    ConnectionStarted(PeerIdentity),
    Connected(PeerIdentity),
    ConnectionError(PeerIdentity),
    Read { data: String, peer: PeerIdentity },
    Disconnected(PeerIdentity),
    NoBluetooth,
}

impl ConnectionEvent {
    /// Invoke the matching listener callback
    pub fn deliver(&self, listener: &dyn ConnectionListener) {
        match self {
            ConnectionEvent::ConnectionStarted(peer) => listener.on_connection_started(peer),
            ConnectionEvent::Connected(peer) => listener.on_connect(peer),
            ConnectionEvent::ConnectionError(peer) => listener.on_connection_error(peer),
            ConnectionEvent::Read { data, peer } => listener.on_read(data, peer),
            ConnectionEvent::Disconnected(peer) => listener.on_disconnect(peer),
            ConnectionEvent::NoBluetooth => listener.on_no_bluetooth(),
        }
    }
}

/// Ordered delivery of events to a weakly held listener
pub(crate) struct Notifier {
    tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl Notifier {
    /// Spawn the delivery task; it ends when the notifier or the listener is dropped
    pub(crate) fn spawn(listener: Weak<dyn ConnectionListener>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ConnectionEvent>();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match listener.upgrade() {
                    Some(listener) => event.deliver(listener.as_ref()),
                    None => {
                        debug!("[CONN] Listener gone, dropping {:?}", event);
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    pub(crate) fn notify(&self, event: ConnectionEvent) {
        let _ = self.tx.send(event);
    }
}

/// Listener that forwards every callback into a channel
#[derive(Debug, Clone)]
pub struct EventForwarder {
    tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl EventForwarder {
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn forward(&self, event: ConnectionEvent) {
        let _ = self.tx.send(event);
    }
}

impl ConnectionListener for EventForwarder {
    fn on_connection_started(&self, peer: &PeerIdentity) {
        self.forward(ConnectionEvent::ConnectionStarted(peer.clone()));
    }

    fn on_connect(&self, peer: &PeerIdentity) {
        self.forward(ConnectionEvent::Connected(peer.clone()));
    }

    fn on_connection_error(&self, peer: &PeerIdentity) {
        self.forward(ConnectionEvent::ConnectionError(peer.clone()));
    }

    fn on_read(&self, data: &str, peer: &PeerIdentity) {
        self.forward(ConnectionEvent::Read {
            data: data.to_string(),
            peer: peer.clone(),
        });
    }

    fn on_disconnect(&self, peer: &PeerIdentity) {
        self.forward(ConnectionEvent::Disconnected(peer.clone()));
    }

    fn on_no_bluetooth(&self) {
        self.forward(ConnectionEvent::NoBluetooth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluer::Address;

    fn peer() -> PeerIdentity {
        PeerIdentity::new(Address::new([0, 0, 0, 0, 0, 1]), "Device")
    }

    #[tokio::test]
    async fn test_notifier_preserves_order() {
        let (forwarder, mut rx) = EventForwarder::channel();
        let weak = Arc::downgrade(&forwarder);
        let weak: Weak<dyn ConnectionListener> = weak;
        let notifier = Notifier::spawn(weak);

        notifier.notify(ConnectionEvent::ConnectionStarted(peer()));
        notifier.notify(ConnectionEvent::Connected(peer()));
        notifier.notify(ConnectionEvent::Read {
            data: "abc".into(),
            peer: peer(),
        });
        notifier.notify(ConnectionEvent::Disconnected(peer()));

        assert_eq!(rx.recv().await, Some(ConnectionEvent::ConnectionStarted(peer())));
        assert_eq!(rx.recv().await, Some(ConnectionEvent::Connected(peer())));
        assert_eq!(
            rx.recv().await,
            Some(ConnectionEvent::Read {
                data: "abc".into(),
                peer: peer()
            })
        );
        assert_eq!(rx.recv().await, Some(ConnectionEvent::Disconnected(peer())));
    }

    #[tokio::test]
    async fn test_dropped_listener_is_not_kept_alive() {
        let (forwarder, mut rx) = EventForwarder::channel();
        let weak = Arc::downgrade(&forwarder);
        let weak: Weak<dyn ConnectionListener> = weak;
        let notifier = Notifier::spawn(weak);
        drop(forwarder);

        notifier.notify(ConnectionEvent::NoBluetooth);
        // The forwarder owned the only sender, so the channel closes
        assert_eq!(rx.recv().await, None);
    }
}
