//! Transport trait abstraction for pluggable link backends

use crate::peer::PeerIdentity;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Reports whether the transport under a stream still considers itself connected
#[async_trait]
pub trait LinkProbe: Send + Sync {
    async fn is_connected(&self) -> bool;
}

/// A transport stream that can read and write bytes
#[async_trait]
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Close the transport gracefully
    async fn shutdown(&mut self) -> Result<()>;

    /// Shareable status probe, usable after the stream has been split
    fn probe(&self) -> Arc<dyn LinkProbe>;
}

pub type BoxedStream = Box<dyn TransportStream>;

/// Factory for creating transport connections
#[async_trait]
pub trait TransportConnector: Send + Sync + 'static {
    /// Whether a local adapter exists at all
    async fn adapter_available(&self) -> bool;

    /// Attempt to connect to a peer, returning a stream on success
    async fn connect(&self, peer: &PeerIdentity) -> Result<BoxedStream>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}

/// Open/closed flag shared between a stream and its probe
///
/// Streams clear it when they observe end-of-stream, an I/O error or a local
/// shutdown.
#[derive(Debug, Clone)]
pub struct OpenFlag(Arc<AtomicBool>);

impl OpenFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for OpenFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkProbe for OpenFlag {
    async fn is_connected(&self) -> bool {
        self.is_open()
    }
}

/// Poll a read and clear `flag` on end-of-stream or error
pub(crate) fn poll_read_tracked<R: AsyncRead + Unpin>(
    inner: &mut R,
    flag: &OpenFlag,
    cx: &mut Context<'_>,
    buf: &mut ReadBuf<'_>,
) -> Poll<io::Result<()>> {
    let had_room = buf.remaining() > 0;
    let before = buf.filled().len();
    let poll = Pin::new(inner).poll_read(cx, buf);
    match &poll {
        Poll::Ready(Ok(())) if had_room && buf.filled().len() == before => flag.clear(),
        Poll::Ready(Err(_)) => flag.clear(),
        _ => {}
    }
    poll
}

/// Poll a write and clear `flag` on error
pub(crate) fn poll_write_tracked<W: AsyncWrite + Unpin>(
    inner: &mut W,
    flag: &OpenFlag,
    cx: &mut Context<'_>,
    buf: &[u8],
) -> Poll<io::Result<usize>> {
    let poll = Pin::new(inner).poll_write(cx, buf);
    if let Poll::Ready(Err(_)) = &poll {
        flag.clear();
    }
    poll
}
