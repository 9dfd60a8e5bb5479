//! Control socket accepting framed "forget peer" requests

use super::manager::ConnectionRegistry;
use anyhow::Result;
use futures::{Stream, StreamExt};
use spplink_shared::codec::{CodecError, RequestDecoder};
use std::fmt::Display;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Pause after a failed accept, e.g. while out of file descriptors
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accept control clients on `listener` for as long as the process runs
pub async fn serve_control(registry: Arc<ConnectionRegistry>, listener: TcpListener) -> Result<()> {
    info!("[CTRL] Listening on {}", listener.local_addr()?);

    let incoming = futures::stream::unfold(listener, |listener| async move {
        let accepted = listener.accept().await;
        Some((accepted, listener))
    });
    serve_connections(registry, incoming).await;
    Ok(())
}

/// Spawn a handler per accepted client until `incoming` ends
///
/// Accept errors are logged and skipped.
pub async fn serve_connections<I, S, A>(registry: Arc<ConnectionRegistry>, incoming: I)
where
    I: Stream<Item = io::Result<(S, A)>>,
    S: AsyncRead + Unpin + Send + 'static,
    A: Display + Send + 'static,
{
    futures::pin_mut!(incoming);

    while let Some(accepted) = incoming.next().await {
        let (socket, addr) = match accepted {
            Ok(client) => client,
            Err(e) => {
                warn!("[CTRL] Accept failed: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };
        debug!("[CTRL] Client connected from {}", addr);

        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_control_client(&registry, socket).await {
                warn!("[CTRL] Client {} dropped: {}", addr, e);
            }
        });
    }
}

/// Apply every forget request read from `reader` until it closes
///
/// Returns the number of requests applied. Messages naming no peer are
/// skipped; a malformed or truncated frame ends the client.
pub async fn handle_control_client<R>(registry: &ConnectionRegistry, mut reader: R) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = RequestDecoder::new();
    let mut read_buf = vec![0u8; 1024];
    let mut applied = 0;

    loop {
        loop {
            match decoder.next_request() {
                Ok(Some(request)) => {
                    registry.forget(&request.display_name).await;
                    applied += 1;
                }
                Ok(None) => break,
                Err(CodecError::EmptyRequest) => {
                    warn!("[CTRL] Ignoring control message without a peer name");
                }
                Err(e) => return Err(e.into()),
            }
        }

        match reader.read(&mut read_buf).await? {
            0 => {
                decoder.finish()?;
                return Ok(applied);
            }
            n => decoder.push(&read_buf[..n]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, ConnectionConfig, EventForwarder};
    use crate::peer::PeerIdentity;
    use crate::transport::memory::{Behavior, MemoryConnector};
    use bluer::Address;
    use spplink_shared::{codec, ControlMessage};
    use tokio::io::AsyncWriteExt;

    async fn registry_with(names: &[&str]) -> (ConnectionRegistry, Arc<EventForwarder>) {
        let (listener, _rx) = EventForwarder::channel();
        let registry = ConnectionRegistry::new();
        for (i, name) in names.iter().enumerate() {
            let peer = PeerIdentity::new(Address::new([0, 0, 0, 0, 0, i as u8]), *name);
            let conn = Connection::open(
                peer.clone(),
                &listener,
                MemoryConnector::new(Behavior::Hang),
                ConnectionConfig::default(),
            )
            .await;
            registry.add(peer, conn).await;
        }
        (registry, listener)
    }

    #[tokio::test]
    async fn test_frames_are_applied_in_order() {
        let (registry, _listener) = registry_with(&["left", "right", "keep"]).await;
        let (mut client, server) = tokio::io::duplex(256);

        let mut wire = Vec::new();
        wire.extend_from_slice(&codec::encode(&ControlMessage::forget_peer("left")).unwrap());
        wire.extend_from_slice(&codec::encode(&ControlMessage::forget_peer("right")).unwrap());
        client.write_all(&wire).await.unwrap();
        drop(client);

        let applied = handle_control_client(&registry, server).await.unwrap();
        assert_eq!(applied, 2);

        let remaining = registry.list().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name(), "keep");
    }

    #[tokio::test]
    async fn test_truncated_frame_is_an_error() {
        let (registry, _listener) = registry_with(&["left"]).await;
        let (mut client, server) = tokio::io::duplex(256);

        let frame = codec::encode(&ControlMessage::forget_peer("left")).unwrap();
        client.write_all(&frame[..frame.len() - 1]).await.unwrap();
        drop(client);

        assert!(handle_control_client(&registry, server).await.is_err());
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_serve_control_over_tcp() {
        let (registry, _listener) = registry_with(&["HC-05"]).await;
        let registry = Arc::new(registry);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_control(registry.clone(), listener));

        let mut socket = tokio::net::TcpStream::connect(addr).await.unwrap();
        let frame = codec::encode(&ControlMessage::forget_peer("HC-05")).unwrap();
        socket.write_all(&frame).await.unwrap();
        drop(socket);

        for _ in 0..100 {
            if registry.count().await == 0 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("control message was not applied");
    }

    #[tokio::test]
    async fn test_message_without_name_is_skipped() {
        let (registry, _listener) = registry_with(&["left"]).await;
        let (mut client, server) = tokio::io::duplex(256);

        // Empty ControlMessage framed by hand; the encoder refuses to produce it
        client.write_all(&[0, 0, 0, 0]).await.unwrap();
        client
            .write_all(&codec::encode(&ControlMessage::forget_peer("left")).unwrap())
            .await
            .unwrap();
        drop(client);

        let applied = handle_control_client(&registry, server).await.unwrap();
        assert_eq!(applied, 1);
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_accept_error_does_not_stop_server() {
        let (registry, _listener) = registry_with(&["HC-05"]).await;
        let registry = Arc::new(registry);
        let (mut client, server) = tokio::io::duplex(256);
        client
            .write_all(&codec::encode(&ControlMessage::forget_peer("HC-05")).unwrap())
            .await
            .unwrap();
        drop(client);

        let incoming = futures::stream::iter(vec![
            Err(io::Error::new(io::ErrorKind::Other, "too many open files")),
            Ok((server, "duplex")),
        ]);
        serve_connections(registry.clone(), incoming).await;

        for _ in 0..100 {
            if registry.count().await == 0 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("client after the failed accept was not served");
    }
}
