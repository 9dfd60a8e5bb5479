//! Per-peer link with its own state machine, background loop and write path

use super::listener::{ConnectionEvent, ConnectionListener, Notifier};
use super::payload::Payload;
use crate::error::LinkError;
use crate::peer::PeerIdentity;
use crate::transport::{BoxedStream, LinkProbe, TransportConnector, TransportStream};
use spplink_shared::{link, ConnectionState, LinkEvent, LinkStateMachine, TransitionResult};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, info, warn};

/// Background task started once a link is established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    /// Read loop delivering received data to the listener
    #[default]
    Stream,
    /// Periodic liveness check; inbound data is discarded
    Liveness,
}

/// Background task currently running for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveTask {
    None,
    Reading,
    CheckingLiveness,
}

/// Configuration for a connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub mode: LinkMode,
    /// Bound on a single connect attempt
    pub connect_timeout: Duration,
    /// Wake-up interval of the liveness loop
    pub liveness_interval: Duration,
    pub read_buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            mode: LinkMode::Stream,
            connect_timeout: Duration::from_millis(link::CONNECT_TIMEOUT_MS),
            liveness_interval: Duration::from_millis(link::LIVENESS_INTERVAL_MS),
            read_buffer_size: link::READ_BUFFER_SIZE,
        }
    }
}

impl ConnectionConfig {
    pub fn with_mode(mode: LinkMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }
}

/// Established stream handle
///
/// The read half belongs to the read loop; the write half sits behind a mutex
/// so concurrent writers never interleave.
struct Link {
    /// Generation of the attempt that produced this link
    id: u64,
    writer: Mutex<WriteHalf<BoxedStream>>,
    probe: Arc<dyn LinkProbe>,
    closed: watch::Sender<bool>,
}

impl Link {
    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Mark closed, wake the background loop and shut the writer down if it is idle
    async fn close(&self) {
        self.closed.send_replace(true);
        match self.writer.try_lock() {
            Ok(mut writer) => {
                if let Err(e) = writer.shutdown().await {
                    debug!("[CONN] Ignoring shutdown error: {}", e);
                }
            }
            Err(_) => debug!("[CONN] Writer busy, stream closes when released"),
        }
    }
}

/// Resolves once the link is closed or its handle is gone
async fn link_closed(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}

struct Core {
    fsm: LinkStateMachine,
    /// Present iff the state is Connected
    link: Option<Arc<Link>>,
    task: ActiveTask,
    task_handle: Option<JoinHandle<()>>,
    /// Bumped on every entry into Connecting
    generation: u64,
}

/// A point-to-point serial link to one peer
pub struct Connection {
    peer: PeerIdentity,
    config: ConnectionConfig,
    connector: Arc<dyn TransportConnector>,
    notifier: Notifier,
    core: RwLock<Core>,
}

impl Connection {
    /// Create a connection and start connecting to `peer`
    ///
    /// When no local adapter exists the connection settles in `NoAdapter`
    /// and `on_no_bluetooth` fires instead.
    pub async fn open<L>(
        peer: PeerIdentity,
        listener: &Arc<L>,
        connector: Arc<dyn TransportConnector>,
        config: ConnectionConfig,
    ) -> Arc<Self>
    where
        L: ConnectionListener + 'static,
    {
        let weak = Arc::downgrade(listener);
        let weak: Weak<dyn ConnectionListener> = weak;
        Self::open_with_listener(peer, weak, connector, config).await
    }

    /// Like [`Connection::open`], for a listener already held as a trait object
    pub async fn open_with_listener(
        peer: PeerIdentity,
        listener: Weak<dyn ConnectionListener>,
        connector: Arc<dyn TransportConnector>,
        config: ConnectionConfig,
    ) -> Arc<Self> {
        let adapter = connector.adapter_available().await;
        let conn = Arc::new(Connection {
            peer,
            config,
            connector,
            notifier: Notifier::spawn(listener),
            core: RwLock::new(Core {
                fsm: LinkStateMachine::new(),
                link: None,
                task: ActiveTask::None,
                task_handle: None,
                generation: 0,
            }),
        });

        if adapter {
            conn.begin_connect().await;
        } else {
            conn.core
                .write()
                .await
                .fsm
                .process_event(LinkEvent::AdapterMissing);
            warn!("[CONN] {} for {}", LinkError::NoAdapter, conn.peer);
            conn.notifier.notify(ConnectionEvent::NoBluetooth);
        }

        conn
    }

    pub fn peer(&self) -> &PeerIdentity {
        &self.peer
    }

    pub fn mode(&self) -> LinkMode {
        self.config.mode
    }

    pub async fn state(&self) -> ConnectionState {
        self.core.read().await.fsm.state()
    }

    pub async fn active_task(&self) -> ActiveTask {
        self.core.read().await.task
    }

    /// Whether a stream handle is held and the transport reports it connected
    pub async fn is_connected(&self) -> bool {
        let link = self.core.read().await.link.clone();
        match link {
            Some(link) if !link.is_closed() => link.probe.is_connected().await,
            _ => false,
        }
    }

    /// Start a new attempt from Disconnected; returns false in any other state
    pub async fn reconnect(self: &Arc<Self>) -> bool {
        self.begin_connect().await
    }

    async fn begin_connect(self: &Arc<Self>) -> bool {
        let generation = {
            let mut core = self.core.write().await;
            if let TransitionResult::Invalid { from, .. } =
                core.fsm.process_event(LinkEvent::ConnectStarted)
            {
                debug!("[CONN] Not connecting {} from state {}", self.peer, from);
                return false;
            }
            core.generation += 1;
            core.generation
        };

        info!("[CONN] Connecting to {} via {}", self.peer, self.connector.name());
        self.notifier
            .notify(ConnectionEvent::ConnectionStarted(self.peer.clone()));

        let conn = Arc::clone(self);
        let connector = self.connector.clone();
        let peer = self.peer.clone();
        let connect_timeout = self.config.connect_timeout;

        tokio::spawn(async move {
            // On expiry the connect future is dropped, cancelling the attempt
            let result = match timeout(connect_timeout, connector.connect(&peer)).await {
                Ok(Ok(stream)) => Ok(stream),
                Ok(Err(e)) => Err(LinkError::ConnectFailed {
                    peer: peer.to_string(),
                    reason: format!("{:#}", e),
                }),
                Err(_) => Err(LinkError::ConnectTimeout {
                    peer: peer.to_string(),
                    timeout: connect_timeout,
                }),
            };

            conn.finish_connect(generation, result).await;
        });

        true
    }

    async fn finish_connect(self: &Arc<Self>, generation: u64, result: Result<BoxedStream, LinkError>) {
        let mut core = self.core.write().await;

        if core.generation != generation || core.fsm.state() != ConnectionState::Connecting {
            drop(core);
            if let Ok(mut stream) = result {
                debug!("[CONN] Discarding stale link to {}", self.peer);
                let _ = TransportStream::shutdown(&mut *stream).await;
            }
            return;
        }

        match result {
            Ok(stream) => {
                let probe = stream.probe();
                let (reader, writer) = tokio::io::split(stream);
                let (closed, closed_rx) = watch::channel(false);
                let link = Arc::new(Link {
                    id: generation,
                    writer: Mutex::new(writer),
                    probe,
                    closed,
                });

                core.fsm.process_event(LinkEvent::Established);
                core.link = Some(link.clone());
                info!("[CONN] Connected to {}", self.peer);
                self.notifier
                    .notify(ConnectionEvent::Connected(self.peer.clone()));

                self.start_task(&mut core, link, reader, closed_rx);
            }
            Err(e) => {
                core.fsm.process_event(LinkEvent::ConnectFailed);
                warn!("[CONN] {}", e);
                self.notifier
                    .notify(ConnectionEvent::ConnectionError(self.peer.clone()));
            }
        }
    }

    /// Start the single background task for a fresh link, superseding any other
    fn start_task(
        self: &Arc<Self>,
        core: &mut Core,
        link: Arc<Link>,
        reader: ReadHalf<BoxedStream>,
        closed_rx: watch::Receiver<bool>,
    ) {
        if let Some(previous) = core.task_handle.take() {
            previous.abort();
        }

        // The loop keeps the connection alive until the link is torn down
        let me = Arc::clone(self);
        let (task, handle) = match self.config.mode {
            LinkMode::Stream => (
                ActiveTask::Reading,
                tokio::spawn(read_loop(
                    me,
                    link.id,
                    reader,
                    closed_rx,
                    self.config.read_buffer_size,
                )),
            ),
            LinkMode::Liveness => (
                ActiveTask::CheckingLiveness,
                tokio::spawn(liveness_loop(
                    me,
                    link.id,
                    reader,
                    closed_rx,
                    self.config.liveness_interval,
                )),
            ),
        };

        core.task = task;
        core.task_handle = Some(handle);
    }

    /// Connected -> Disconnected for the link `link_id`; no-op for any other link
    async fn teardown(&self, link_id: u64, reason: &str) {
        let link = {
            let mut core = self.core.write().await;
            match core.link.as_ref() {
                Some(link) if link.id == link_id => {}
                _ => return,
            }

            let link = core.link.take();
            core.fsm.process_event(LinkEvent::LinkLost);
            core.task = ActiveTask::None;
            // Detach rather than abort; the caller is that task
            core.task_handle = None;
            self.notifier
                .notify(ConnectionEvent::Disconnected(self.peer.clone()));
            link
        };

        info!("[CONN] Disconnected from {}: {}", self.peer, reason);
        if let Some(link) = link {
            link.close().await;
        }
    }

    fn deliver_read(&self, data: String) {
        debug!("[CONN] {} bytes from {}", data.len(), self.peer);
        self.notifier.notify(ConnectionEvent::Read {
            data,
            peer: self.peer.clone(),
        });
    }

    /// Close the stream handle if present
    ///
    /// The active background loop observes the closed handle and performs
    /// the transition to Disconnected, firing `on_disconnect` once.
    pub async fn disconnect(&self) {
        let link = self.core.read().await.link.clone();
        if let Some(link) = link {
            info!("[CONN] Closing link to {}", self.peer);
            link.close().await;
        }
    }

    /// Write a payload if connected; silently dropped otherwise
    pub async fn write(&self, payload: impl Into<Payload>) {
        if let Err(e) = self.try_write(payload).await {
            debug!("[CONN] Dropped write to {}: {}", self.peer, e);
        }
    }

    /// Write a payload, reporting why it was not sent
    ///
    /// A stream fault closes the link; the background loop then moves the
    /// connection to Disconnected. A write still pending when the link is
    /// closed returns `NotConnected`.
    pub async fn try_write(&self, payload: impl Into<Payload>) -> Result<(), LinkError> {
        let link = self
            .core
            .read()
            .await
            .link
            .clone()
            .ok_or(LinkError::NotConnected)?;
        let mut closed_rx = link.closed.subscribe();
        if link.is_closed() {
            return Err(LinkError::NotConnected);
        }

        let payload: Payload = payload.into();
        let write = async {
            let mut writer = link.writer.lock().await;
            for chunk in payload.into_chunks() {
                writer.write_all(&chunk).await?;
            }
            writer.flush().await
        };

        // A close abandons a write stuck on a full transport buffer
        let result = tokio::select! {
            res = write => res,
            _ = link_closed(&mut closed_rx) => {
                debug!("[CONN] Write to {} abandoned, link closed", self.peer);
                link.close().await;
                return Err(LinkError::NotConnected);
            }
        };

        if let Err(e) = result {
            warn!("[CONN] Write to {} failed: {}", self.peer, e);
            link.close().await;
            return Err(LinkError::StreamFault(e));
        }
        Ok(())
    }
}

async fn read_loop(
    conn: Arc<Connection>,
    link_id: u64,
    mut reader: ReadHalf<BoxedStream>,
    mut closed_rx: watch::Receiver<bool>,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size];

    let reason = loop {
        tokio::select! {
            _ = link_closed(&mut closed_rx) => break "link closed locally".to_string(),
            res = reader.read(&mut buf) => match res {
                // End of stream; a live stream never yields an empty read into a non-empty buffer
                Ok(0) => break "stream closed by peer".to_string(),
                Ok(n) => conn.deliver_read(String::from_utf8_lossy(&buf[..n]).into_owned()),
                Err(e) => break format!("read error: {}", e),
            },
        }
    };

    drop(reader);
    conn.teardown(link_id, &reason).await;
}

async fn liveness_loop(
    conn: Arc<Connection>,
    link_id: u64,
    mut reader: ReadHalf<BoxedStream>,
    mut closed_rx: watch::Receiver<bool>,
    period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    // Inbound data is discarded; the read only surfaces a hang-up
    let mut scratch = [0u8; 64];

    let reason = loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !conn.is_connected().await {
                    break "transport reports not connected".to_string();
                }
            }
            _ = link_closed(&mut closed_rx) => break "link closed locally".to_string(),
            res = reader.read(&mut scratch) => match res {
                Ok(0) => break "stream closed by peer".to_string(),
                Ok(_) => {}
                Err(e) => break format!("read error: {}", e),
            },
        }
    };

    drop(reader);
    conn.teardown(link_id, &reason).await;
}
