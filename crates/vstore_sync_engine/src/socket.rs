//! Socket transports on tokio.
//!
//! [`TcpTransport`] speaks over a stream socket, [`UnixTransport`] over a
//! local-domain socket. Both split the connected stream into a reader task
//! that forwards received bytes to the sink and a writer task fed by a
//! channel, so [`Transport::send`] never blocks the caller.

use crate::config::Endpoint;
use crate::error::{SyncError, SyncResult};
use crate::transport::{EventSink, Transport, TransportEvents};
use bytes::Bytes;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const READ_BUFFER_SIZE: usize = 8 * 1024;

struct Connection {
    writer: mpsc::UnboundedSender<Bytes>,
    tasks: [JoinHandle<()>; 2],
}

#[derive(Default)]
struct SocketState {
    connection: Option<Connection>,
    connecting: bool,
    generation: u64,
}

/// State shared between a socket transport and its I/O tasks.
#[derive(Default)]
struct SocketCore {
    sink: EventSink,
    state: Mutex<SocketState>,
}

impl SocketCore {
    /// Marks a connect attempt as started; returns its generation, or `None`
    /// if the transport is already connected or connecting.
    fn begin_connect(&self) -> Option<u64> {
        let mut state = self.state.lock();
        if state.connection.is_some() || state.connecting {
            return None;
        }
        state.connecting = true;
        Some(state.generation)
    }

    fn attach<S>(self: &Arc<Self>, stream: S, generation: u64)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut read_half, mut write_half) = tokio::io::split(stream);
        {
            // Held across the spawns so the reader cannot report a loss
            // before the connection is recorded.
            let mut state = self.state.lock();
            if state.generation != generation {
                debug!("transport closed while connecting");
                return;
            }

            let (writer, mut frames) = mpsc::unbounded_channel::<Bytes>();
            let write_task = tokio::spawn(async move {
                while let Some(frame) = frames.recv().await {
                    if let Err(e) = write_half.write_all(&frame).await {
                        warn!(error = %e, "socket write failed");
                        break;
                    }
                }
            });

            let core = Arc::clone(self);
            let read_task = tokio::spawn(async move {
                let mut buf = vec![0u8; READ_BUFFER_SIZE];
                loop {
                    match read_half.read(&mut buf).await {
                        Ok(0) => break,
                        Ok(n) => {
                            if let Some(sink) = core.sink.get() {
                                sink.on_received(&buf[..n]);
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "socket read failed");
                            break;
                        }
                    }
                }
                core.lost(generation);
            });

            state.connecting = false;
            state.connection = Some(Connection {
                writer,
                tasks: [write_task, read_task],
            });
        }
        info!("transport connected");
        if let Some(sink) = self.sink.get() {
            sink.on_connected();
        }
    }

    fn failed(&self, generation: u64) {
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.connecting = false;
        }
        if let Some(sink) = self.sink.get() {
            sink.on_disconnected();
        }
    }

    fn lost(&self, generation: u64) {
        {
            let mut state = self.state.lock();
            if state.generation != generation || state.connection.take().is_none() {
                return;
            }
        }
        info!("transport disconnected");
        if let Some(sink) = self.sink.get() {
            sink.on_disconnected();
        }
    }

    fn close(&self) {
        let connection = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.connecting = false;
            state.connection.take()
        };
        if let Some(connection) = connection {
            for task in &connection.tasks {
                task.abort();
            }
            debug!("transport closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connection.is_some()
    }

    fn send(&self, frame: Bytes) -> SyncResult<()> {
        let state = self.state.lock();
        let connection = state.connection.as_ref().ok_or(SyncError::NotConnected)?;
        connection
            .writer
            .send(frame)
            .map_err(|_| SyncError::NotConnected)
    }
}

/// Transport over a TCP stream socket.
pub struct TcpTransport {
    addr: SocketAddr,
    handle: Handle,
    core: Arc<SocketCore>,
}

impl TcpTransport {
    /// Creates a transport that connects to `addr` using `handle`.
    pub fn new(addr: SocketAddr, handle: Handle) -> Self {
        Self {
            addr,
            handle,
            core: Arc::new(SocketCore::default()),
        }
    }
}

impl Transport for TcpTransport {
    fn set_event_sink(&self, sink: Weak<dyn TransportEvents>) {
        self.core.sink.set(sink);
    }

    fn connect(&self) -> SyncResult<()> {
        let Some(generation) = self.core.begin_connect() else {
            return Ok(());
        };
        let core = Arc::clone(&self.core);
        let addr = self.addr;
        self.handle.spawn(async move {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    core.attach(stream, generation);
                }
                Err(e) => {
                    warn!(%addr, error = %e, "connect failed");
                    core.failed(generation);
                }
            }
        });
        Ok(())
    }

    fn close(&self) -> SyncResult<()> {
        self.core.close();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    fn send(&self, frame: Bytes) -> SyncResult<()> {
        self.core.send(frame)
    }
}

/// Transport over a local-domain socket.
#[cfg(unix)]
pub struct UnixTransport {
    path: std::path::PathBuf,
    handle: Handle,
    core: Arc<SocketCore>,
}

#[cfg(unix)]
impl UnixTransport {
    /// Creates a transport that connects to the socket at `path`.
    pub fn new(path: impl Into<std::path::PathBuf>, handle: Handle) -> Self {
        Self {
            path: path.into(),
            handle,
            core: Arc::new(SocketCore::default()),
        }
    }
}

#[cfg(unix)]
impl Transport for UnixTransport {
    fn set_event_sink(&self, sink: Weak<dyn TransportEvents>) {
        self.core.sink.set(sink);
    }

    fn connect(&self) -> SyncResult<()> {
        let Some(generation) = self.core.begin_connect() else {
            return Ok(());
        };
        let core = Arc::clone(&self.core);
        let path = self.path.clone();
        self.handle.spawn(async move {
            match tokio::net::UnixStream::connect(&path).await {
                Ok(stream) => core.attach(stream, generation),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "connect failed");
                    core.failed(generation);
                }
            }
        });
        Ok(())
    }

    fn close(&self) -> SyncResult<()> {
        self.core.close();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    fn send(&self, frame: Bytes) -> SyncResult<()> {
        self.core.send(frame)
    }
}

/// Creates the socket transport selected by `endpoint`.
pub fn transport_for(endpoint: &Endpoint, handle: Handle) -> SyncResult<Arc<dyn Transport>> {
    match endpoint {
        Endpoint::Tcp(addr) => Ok(Arc::new(TcpTransport::new(*addr, handle))),
        #[cfg(unix)]
        Endpoint::Unix(path) => Ok(Arc::new(UnixTransport::new(path.clone(), handle))),
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(SyncError::transport_fatal(
            "local-domain sockets are not supported on this platform",
        )),
    }
}
