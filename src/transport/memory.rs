//! In-memory transport backed by `tokio::io::duplex`, for tests

use crate::peer::PeerIdentity;
use crate::transport::traits::{
    poll_read_tracked, poll_write_tracked, BoxedStream, LinkProbe, OpenFlag, TransportConnector,
    TransportStream,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;

/// How a single connect attempt behaves
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Succeed immediately
    Accept,
    /// Fail immediately
    Fail,
    /// Never complete
    Hang,
    /// Succeed after a delay
    Delay(Duration),
}

/// Remote end of an in-memory link
pub struct MemoryRemote {
    pub stream: DuplexStream,
    link: OpenFlag,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryRemote {
    /// Make the local probe report the link as down without closing the stream
    pub fn drop_link(&self) {
        self.link.clear();
    }

    /// Make every later local write fail with a broken pipe
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }
}

pub struct MemoryStream {
    inner: DuplexStream,
    open: OpenFlag,
    fail_writes: Arc<AtomicBool>,
}

impl AsyncRead for MemoryStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        poll_read_tracked(&mut this.inner, &this.open, cx, buf)
    }
}

impl AsyncWrite for MemoryStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        if this.fail_writes.load(Ordering::SeqCst) {
            this.open.clear();
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
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
impl TransportStream for MemoryStream {
    async fn shutdown(&mut self) -> Result<()> {
        tokio::io::AsyncWriteExt::shutdown(self).await?;
        Ok(())
    }

    fn probe(&self) -> Arc<dyn LinkProbe> {
        Arc::new(self.open.clone())
    }
}

/// Scripted connector handing out duplex streams
pub struct MemoryConnector {
    adapter: bool,
    script: Mutex<VecDeque<Behavior>>,
    fallback: Behavior,
    attempts: AtomicUsize,
    remotes_tx: mpsc::UnboundedSender<MemoryRemote>,
    remotes_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MemoryRemote>>,
}

impl MemoryConnector {
    pub fn new(fallback: Behavior) -> Arc<Self> {
        Self::build(true, Vec::new(), fallback)
    }

    /// Run `script` in order, then `fallback` for every later attempt
    pub fn scripted(script: Vec<Behavior>, fallback: Behavior) -> Arc<Self> {
        Self::build(true, script, fallback)
    }

    pub fn without_adapter() -> Arc<Self> {
        Self::build(false, Vec::new(), Behavior::Fail)
    }

    fn build(adapter: bool, script: Vec<Behavior>, fallback: Behavior) -> Arc<Self> {
        let (remotes_tx, remotes_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            adapter,
            script: Mutex::new(script.into()),
            fallback,
            attempts: AtomicUsize::new(0),
            remotes_tx,
            remotes_rx: tokio::sync::Mutex::new(remotes_rx),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait for the remote end of the next established stream
    pub async fn next_remote(&self) -> MemoryRemote {
        self.remotes_rx
            .lock()
            .await
            .recv()
            .await
            .expect("connector dropped")
    }

    fn open_stream(&self) -> BoxedStream {
        let (local, remote) = tokio::io::duplex(4096);
        let open = OpenFlag::new();
        let fail_writes = Arc::new(AtomicBool::new(false));
        let _ = self.remotes_tx.send(MemoryRemote {
            stream: remote,
            link: open.clone(),
            fail_writes: fail_writes.clone(),
        });
        Box::new(MemoryStream {
            inner: local,
            open,
            fail_writes,
        })
    }
}

#[async_trait]
impl TransportConnector for MemoryConnector {
    async fn adapter_available(&self) -> bool {
        self.adapter
    }

    async fn connect(&self, peer: &PeerIdentity) -> Result<BoxedStream> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);

        match behavior {
            Behavior::Accept => Ok(self.open_stream()),
            Behavior::Fail => Err(anyhow!("{} refused the connection", peer)),
            Behavior::Hang => std::future::pending().await,
            Behavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.open_stream())
            }
        }
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}
