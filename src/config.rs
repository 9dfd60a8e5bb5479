//! Daemon configuration

use crate::connection::{ConnectionConfig, LinkMode};
use crate::peer::PeerIdentity;
use crate::transport::{RfcommConfig, RfcommConnector, TcpConnector, TransportConnector};
use anyhow::{bail, Result};
use clap::Parser;
use spplink_shared::link;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Transport backing every link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Real RFCOMM Bluetooth (requires BlueZ)
    #[default]
    Rfcomm,
    /// TCP simulation (for development)
    TcpSimulation,
}

/// A peer to connect to at startup
#[derive(Debug, Clone)]
pub struct PeerSpec {
    pub peer: PeerIdentity,
    /// Socket address used in TCP simulation mode
    pub sim_addr: Option<String>,
}

/// Parses `ADDR[=Name][@host:port]`
impl FromStr for PeerSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (peer, sim_addr) = match s.rsplit_once('@') {
            Some((peer, addr)) => (peer, Some(addr.to_string())),
            None => (s, None),
        };
        Ok(Self {
            peer: peer.parse()?,
            sim_addr,
        })
    }
}

/// Command-line arguments of the link daemon
#[derive(Parser, Debug)]
#[command(name = "spplink", about = "Bluetooth Serial Port Profile link manager")]
pub struct Cli {
    /// Peers as AA:BB:CC:DD:EE:FF[=Name][@host:port]
    #[arg(required = true)]
    pub peers: Vec<PeerSpec>,

    /// Run the liveness check instead of the read loop
    #[arg(long)]
    pub liveness: bool,

    /// Simulate links over TCP using each peer's @host:port
    #[arg(long)]
    pub tcp: bool,

    /// Fixed RFCOMM channel instead of an SDP lookup
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=30))]
    pub channel: Option<u8>,

    /// Control socket address
    #[arg(long, default_value = link::DEFAULT_CONTROL_ADDR)]
    pub control: String,

    /// Connect timeout in milliseconds
    #[arg(long, default_value_t = link::CONNECT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Liveness check interval in milliseconds
    #[arg(long, default_value_t = link::LIVENESS_INTERVAL_MS)]
    pub liveness_interval_ms: u64,
}

/// Configuration for the link daemon
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub peers: Vec<PeerSpec>,
    pub transport: TransportKind,
    /// Fixed RFCOMM channel instead of an SDP lookup
    pub rfcomm_channel: Option<u8>,
    /// Address of the control socket
    pub control_addr: String,
    pub connection: ConnectionConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            transport: TransportKind::Rfcomm,
            rfcomm_channel: None,
            control_addr: link::DEFAULT_CONTROL_ADDR.into(),
            connection: ConnectionConfig::default(),
        }
    }
}

impl TryFrom<Cli> for LinkConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self> {
        let transport = if cli.tcp {
            TransportKind::TcpSimulation
        } else {
            TransportKind::Rfcomm
        };

        if transport == TransportKind::TcpSimulation {
            if let Some(spec) = cli.peers.iter().find(|p| p.sim_addr.is_none()) {
                bail!("{} has no @host:port for TCP simulation", spec.peer);
            }
        }

        let mode = if cli.liveness {
            LinkMode::Liveness
        } else {
            LinkMode::Stream
        };

        Ok(Self {
            peers: cli.peers,
            transport,
            rfcomm_channel: cli.channel,
            control_addr: cli.control,
            connection: ConnectionConfig {
                mode,
                connect_timeout: Duration::from_millis(cli.timeout_ms),
                liveness_interval: Duration::from_millis(cli.liveness_interval_ms),
                ..Default::default()
            },
        })
    }
}

impl LinkConfig {
    /// Create the connector shared by every link
    pub fn connector(&self) -> Arc<dyn TransportConnector> {
        match self.transport {
            TransportKind::Rfcomm => Arc::new(RfcommConnector::new(RfcommConfig {
                channel: self.rfcomm_channel,
                ..Default::default()
            })),
            TransportKind::TcpSimulation => {
                let connector = self.peers.iter().fold(TcpConnector::new(), |c, spec| {
                    match &spec.sim_addr {
                        Some(addr) => c.with_route(spec.peer.address(), addr.clone()),
                        None => c,
                    }
                });
                Arc::new(connector)
            }
        }
    }
}
