//! RFCOMM transport implementation for Bluetooth SPP links

use crate::peer::PeerIdentity;
use crate::transport::traits::{
    poll_read_tracked, poll_write_tracked, BoxedStream, LinkProbe, OpenFlag, TransportConnector,
    TransportStream,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bluer::rfcomm::{Profile, ReqError, Role, SocketAddr as RfcommAddr, Stream as RfcommStream};
use bluer::{Adapter, Address, Device, Uuid};
use futures::StreamExt;
use spplink_shared::link::SPP_UUID_U128;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, info};

/// Serial Port Profile service UUID
pub const SPP_SERVICE_UUID: Uuid = Uuid::from_u128(SPP_UUID_U128);

/// RFCOMM stream wrapper implementing TransportStream
pub struct RfcommTransportStream {
    inner: RfcommStream,
    device: Device,
    open: OpenFlag,
}

impl RfcommTransportStream {
    /// Create a new RFCOMM transport stream
    pub fn new(stream: RfcommStream, device: Device) -> Self {
        Self {
            inner: stream,
            device,
            open: OpenFlag::new(),
        }
    }

    /// Get the peer Bluetooth address
    pub fn peer_address(&self) -> Address {
        self.device.address()
    }
}

impl AsyncRead for RfcommTransportStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        poll_read_tracked(&mut this.inner, &this.open, cx, buf)
    }
}

impl AsyncWrite for RfcommTransportStream {
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
impl TransportStream for RfcommTransportStream {
    async fn shutdown(&mut self) -> Result<()> {
        tokio::io::AsyncWriteExt::shutdown(self).await?;
        Ok(())
    }

    fn probe(&self) -> Arc<dyn LinkProbe> {
        Arc::new(RfcommProbe {
            open: self.open.clone(),
            device: self.device.clone(),
        })
    }
}

/// Link is up while the stream is open and BlueZ reports the device connected
struct RfcommProbe {
    open: OpenFlag,
    device: Device,
}

#[async_trait]
impl LinkProbe for RfcommProbe {
    async fn is_connected(&self) -> bool {
        self.open.is_open() && self.device.is_connected().await.unwrap_or(false)
    }
}

/// Configuration for RFCOMM connector
#[derive(Debug, Clone)]
pub struct RfcommConfig {
    /// Service UUID resolved through SDP
    pub service_uuid: Uuid,
    /// Fixed RFCOMM channel; skips the SDP lookup when set
    pub channel: Option<u8>,
    /// Require an authenticated (paired) link
    pub require_authentication: bool,
}

impl Default for RfcommConfig {
    fn default() -> Self {
        Self {
            service_uuid: SPP_SERVICE_UUID,
            channel: None,
            require_authentication: false,
        }
    }
}

/// RFCOMM connector for SPP peers, backed by BlueZ
pub struct RfcommConnector {
    config: RfcommConfig,
}

impl RfcommConnector {
    /// Create a new RFCOMM connector
    pub fn new(config: RfcommConfig) -> Self {
        Self { config }
    }

    /// Create connector that always uses a fixed channel
    pub fn with_channel(channel: u8) -> Self {
        Self::new(RfcommConfig {
            channel: Some(channel),
            ..Default::default()
        })
    }

    /// Get the default Bluetooth adapter, powering it on
    async fn adapter(session: &bluer::Session) -> Result<Adapter> {
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        Ok(adapter)
    }

    /// Resolve the service through SDP by connecting a client profile
    async fn connect_profile(
        &self,
        session: &bluer::Session,
        device: &Device,
    ) -> Result<RfcommStream> {
        let uuid = self.config.service_uuid;
        let profile = Profile {
            uuid,
            role: Some(Role::Client),
            require_authentication: Some(self.config.require_authentication),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        let mut handle = session.register_profile(profile).await?;

        let mut connect = Box::pin(device.connect_profile(&uuid));
        let mut connect_done = false;

        loop {
            tokio::select! {
                res = &mut connect, if !connect_done => {
                    connect_done = true;
                    res.map_err(|e| anyhow!("Profile connect failed: {}", e))?;
                }
                req = handle.next() => {
                    let req = req.ok_or_else(|| anyhow!("Profile handle closed"))?;
                    if req.device() == device.address() {
                        return Ok(req.accept()?);
                    }
                    debug!("[BT] Rejecting profile request from {}", req.device());
                    req.reject(ReqError::Rejected);
                }
            }
        }
    }
}

impl Default for RfcommConnector {
    fn default() -> Self {
        Self::new(RfcommConfig::default())
    }
}

#[async_trait]
impl TransportConnector for RfcommConnector {
    async fn adapter_available(&self) -> bool {
        match bluer::Session::new().await {
            Ok(session) => session.default_adapter().await.is_ok(),
            Err(e) => {
                debug!("[BT] No BlueZ session: {}", e);
                false
            }
        }
    }

    async fn connect(&self, peer: &PeerIdentity) -> Result<BoxedStream> {
        let session = bluer::Session::new().await?;
        let adapter = Self::adapter(&session).await?;
        let device = adapter.device(peer.address())?;

        let stream = match self.config.channel {
            Some(channel) => {
                info!("[BT] Connecting to {} channel {}", peer, channel);
                RfcommStream::connect(RfcommAddr::new(peer.address(), channel))
                    .await
                    .map_err(|e| anyhow!("RFCOMM connect failed: {}", e))?
            }
            None => {
                info!("[BT] Connecting to {} service {}", peer, self.config.service_uuid);
                self.connect_profile(&session, &device).await?
            }
        };

        info!("[BT] Connected to {}", peer);
        Ok(Box::new(RfcommTransportStream::new(stream, device)))
    }

    fn name(&self) -> &'static str {
        "Bluetooth"
    }
}
