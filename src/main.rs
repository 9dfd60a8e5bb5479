use clap::Parser;
use spplink::config::{Cli, LinkConfig};
use spplink::{Connection, ConnectionEvent, ConnectionRegistry, EventForwarder};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = LinkConfig::try_from(Cli::parse())?;

    let connector = config.connector();
    info!("spplink starting");
    info!("  Transport: {}", connector.name());
    info!("  Mode: {:?}", config.connection.mode);
    info!("  Control: {}", config.control_addr);

    let (listener, mut events) = EventForwarder::channel();
    let registry = Arc::new(ConnectionRegistry::new());

    for spec in &config.peers {
        let connection = Connection::open(
            spec.peer.clone(),
            &listener,
            connector.clone(),
            config.connection.clone(),
        )
        .await;
        registry.add(spec.peer.clone(), connection).await;
    }

    // Spawn control socket
    let control = TcpListener::bind(&config.control_addr).await?;
    let registry_clone = registry.clone();
    tokio::spawn(async move {
        if let Err(e) = spplink::registry::serve_control(registry_clone, control).await {
            error!("[CTRL] Control socket failed: {}", e);
        }
    });

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    // Main event loop
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => handle_event(event),
                None => {
                    error!("Listener channel closed");
                    break;
                }
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => handle_input(&registry, line).await,
                Ok(None) => {
                    debug!("stdin closed");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    registry.disconnect_all().await;
    Ok(())
}

fn handle_event(event: ConnectionEvent) {
    match event {
        ConnectionEvent::ConnectionStarted(peer) => info!("Connecting to {}", peer),
        ConnectionEvent::Connected(peer) => info!("Connected to {}", peer),
        ConnectionEvent::ConnectionError(peer) => warn!("Connection to {} failed", peer),
        ConnectionEvent::Read { data, peer } => info!("[{}] {}", peer.name(), data.trim_end()),
        ConnectionEvent::Disconnected(peer) => warn!("Disconnected from {}", peer),
        ConnectionEvent::NoBluetooth => error!("No Bluetooth adapter available"),
    }
}

/// `/reconnect` retries every idle peer; anything else is sent to all peers
async fn handle_input(registry: &ConnectionRegistry, line: String) {
    if line.trim() == "/reconnect" {
        for peer in registry.list().await {
            if let Some(connection) = registry.get(&peer).await {
                if connection.reconnect().await {
                    info!("Reconnecting to {}", peer);
                }
            }
        }
        return;
    }

    for peer in registry.list().await {
        if registry.is_connected(&peer).await == Some(true) {
            registry.write_to(&peer, format!("{}\n", line)).await;
        } else {
            debug!("Skipping {}, not connected", peer);
        }
    }
}
