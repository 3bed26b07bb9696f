//! Listening socket, runtime and accept loop.
//!
//! [`Daemon::start`] binds synchronously, so a port that is already taken is reported to the
//! caller right away, and then serves connections on its own multi-thread tokio runtime.
//! [`Daemon::stop`] (or dropping the daemon) stops accepting, lets the connections finish the
//! request they are in and shuts the runtime down, which only returns once every worker thread,
//! and so every handler callback, has returned.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::connection::{DEFAULT_READ_BUFFER_CAPACITY, HttpConnection};
use crate::handler::ConnectionHandler;
use crate::protocol::EngineError;

/// How long [`Daemon::stop`] waits for busy connections before dropping them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub address: IpAddr,
    /// `0` lets the operating system pick a free port, see [`Daemon::local_addr`].
    pub port: u16,
    pub worker_threads: usize,
    pub read_buffer_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8080,
            worker_threads: 2,
            read_buffer_capacity: DEFAULT_READ_BUFFER_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

/// A running engine.
pub struct Daemon {
    runtime: Option<Runtime>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    local_addr: SocketAddr,
}

impl Daemon {
    pub fn start<H: ConnectionHandler>(config: &EngineConfig, handler: Arc<H>) -> Result<Self, EngineError> {
        let addr = config.socket_addr();
        let std_listener = std::net::TcpListener::bind(addr).map_err(|e| EngineError::bind(addr, e))?;
        std_listener.set_nonblocking(true)?;
        let local_addr = std_listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("httpmock-worker")
            .enable_all()
            .build()
            .map_err(EngineError::runtime)?;

        let listener = {
            let _guard = runtime.enter();
            TcpListener::from_std(std_listener)?
        };

        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        tracker.spawn_on(
            accept_loop(listener, handler, shutdown.clone(), tracker.clone(), config.read_buffer_capacity),
            runtime.handle(),
        );

        info!(%local_addr, "start listening");
        Ok(Self { runtime: Some(runtime), shutdown, tracker, local_addr })
    }

    /// The address actually bound, with the real port when `0` was configured.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop(mut self) {
        self.shutdown_now();
    }

    fn shutdown_now(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };

        self.shutdown.cancel();
        self.tracker.close();

        if tokio::runtime::Handle::try_current().is_ok() {
            // blocking is not allowed here, connections are dropped at their next await point
            warn!(local_addr = %self.local_addr, "engine stopped from async context, not waiting for workers");
            runtime.shutdown_background();
            return;
        }

        // the timeout registers with the runtime timer, it must be created inside the runtime
        let drained = runtime.block_on(async { tokio::time::timeout(SHUTDOWN_GRACE, self.tracker.wait()).await });
        if drained.is_err() {
            warn!(local_addr = %self.local_addr, "connections still busy after shutdown grace period");
        }
        drop(runtime);
        info!(local_addr = %self.local_addr, "engine stopped");
    }
}

impl fmt::Debug for Daemon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Daemon")
            .field("local_addr", &self.local_addr)
            .field("running", &self.runtime.is_some())
            .field("connections", &self.tracker.len())
            .finish()
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}

async fn accept_loop<H: ConnectionHandler>(
    listener: TcpListener,
    handler: Arc<H>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    read_buffer_capacity: usize,
) {
    loop {
        let (tcp_stream, remote_addr) = select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("stop accepting connections");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            },
        };

        let handler = Arc::clone(&handler);
        let shutdown = shutdown.clone();

        tracker.spawn(async move {
            let (reader, writer) = tcp_stream.into_split();
            let connection =
                HttpConnection::with_read_buffer_capacity(reader, writer, read_buffer_capacity).with_shutdown(shutdown);
            match connection.process(handler).await {
                Ok(_) => {
                    info!(%remote_addr, "finished process, connection shutdown");
                }
                Err(e) => {
                    error!(%remote_addr, cause = %e, "service has error, connection shutdown");
                }
            }
        });
    }
}
