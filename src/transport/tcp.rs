//! TCP transport used to simulate Bluetooth links during development

use crate::peer::PeerIdentity;
use crate::transport::traits::{
    poll_read_tracked, poll_write_tracked, BoxedStream, LinkProbe, OpenFlag, TransportConnector,
    TransportStream,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bluer::Address;
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::debug;

/// TCP stream wrapper implementing TransportStream
pub struct TcpTransportStream {
    inner: TcpStream,
    open: OpenFlag,
}

impl TcpTransportStream {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            inner: stream,
            open: OpenFlag::new(),
        }
    }
}

impl AsyncRead for TcpTransportStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        poll_read_tracked(&mut this.inner, &this.open, cx, buf)
    }
}

impl AsyncWrite for TcpTransportStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        poll_write_tracked(&mut this.inner, &this.open, cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.open.clear();
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[async_trait]
impl TransportStream for TcpTransportStream {
    async fn shutdown(&mut self) -> Result<()> {
        tokio::io::AsyncWriteExt::shutdown(self).await?;
        Ok(())
    }

    fn probe(&self) -> Arc<dyn LinkProbe> {
        Arc::new(self.open.clone())
    }
}

/// TCP connector that maps peer addresses to socket addresses
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    routes: HashMap<Address, String>,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route connections for `peer` to a socket address
    pub fn with_route(mut self, peer: Address, socket_addr: impl Into<String>) -> Self {
        self.routes.insert(peer, socket_addr.into());
        self
    }

    pub fn route(&self, peer: &Address) -> Option<&str> {
        self.routes.get(peer).map(String::as_str)
    }
}

#[async_trait]
impl TransportConnector for TcpConnector {
    async fn adapter_available(&self) -> bool {
        true
    }

    async fn connect(&self, peer: &PeerIdentity) -> Result<BoxedStream> {
        let addr = self
            .route(&peer.address())
            .ok_or_else(|| anyhow!("No simulated route for {}", peer))?;

        debug!("[TCP] Connecting to {} at {}", peer, addr);
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(TcpTransportStream::new(stream)))
    }

    fn name(&self) -> &'static str {
        "TcpSimulation"
    }
}
