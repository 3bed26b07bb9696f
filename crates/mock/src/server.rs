//! The server a test talks to.
//!
//! ```no_run
//! use std::time::Duration;
//! use httpmock_server::HttpMockServer;
//!
//! let mut server = HttpMockServer::builder().port(0).build();
//! server.set_response_callback(|record| {
//!     record.response_headers.insert("Content-Type".to_string(), "text/plain".to_string());
//!     record.response_body = "hello".to_string();
//! });
//! server.start().expect("server should start");
//!
//! // ... let the code under test send a request to server.base_url() ...
//!
//! assert!(server.wait_for_request_completed(1, Some(Duration::from_secs(1))));
//! let request = server.last_request().expect("one request was completed");
//! assert_eq!(request.url, "/");
//! ```

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use httpmock_engine::daemon::{Daemon, EngineConfig};
use tracing::{debug, info};

use crate::error::MockServerError;
use crate::lifecycle::RequestLifecycle;
use crate::record::RequestRecord;

const CALLBACK_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct HttpMockServerBuilder {
    config: EngineConfig,
}

impl HttpMockServerBuilder {
    fn new() -> Self {
        Self { config: EngineConfig::default() }
    }

    pub fn address(mut self, address: IpAddr) -> Self {
        self.config.address = address;
        self
    }

    /// `0` picks a free port when the server starts, see [`HttpMockServer::port`].
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn worker_threads(mut self, worker_threads: usize) -> Self {
        self.config.worker_threads = worker_threads;
        self
    }

    pub fn read_buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.read_buffer_capacity = capacity;
        self
    }

    pub fn build(self) -> HttpMockServer {
        HttpMockServer { config: self.config, lifecycle: Arc::new(RequestLifecycle::new()), daemon: None }
    }
}

/// An HTTP server on a local port that records every request and answers with whatever the
/// response callback decides.
#[derive(Debug)]
pub struct HttpMockServer {
    config: EngineConfig,
    lifecycle: Arc<RequestLifecycle>,
    daemon: Option<Daemon>,
}

impl HttpMockServer {
    /// A stopped server for `port` with the default engine settings.
    pub fn new(port: u16) -> Self {
        Self::builder().port(port).build()
    }

    pub fn builder() -> HttpMockServerBuilder {
        HttpMockServerBuilder::new()
    }

    /// Binds the port and starts serving; does nothing when already running.
    pub fn start(&mut self) -> Result<(), MockServerError> {
        if self.daemon.is_some() {
            return Ok(());
        }

        let daemon = Daemon::start(&self.config, Arc::clone(&self.lifecycle))
            .map_err(|e| MockServerError::startup(self.config.port, e))?;
        info!(local_addr = %daemon.local_addr(), "mock server started");
        self.daemon = Some(daemon);
        Ok(())
    }

    /// Stops serving. Returns once every request callback in progress has returned.
    pub fn stop(&mut self) {
        if let Some(daemon) = self.daemon.take() {
            let local_addr = daemon.local_addr();
            daemon.stop();
            info!(%local_addr, "mock server stopped");
        }
    }

    /// Whether [`start`](Self::start) succeeded and no [`stop`](Self::stop) followed.
    pub fn is_running(&self) -> bool {
        self.daemon.is_some()
    }

    /// The bound port while running, the configured one otherwise.
    pub fn port(&self) -> u16 {
        self.daemon.as_ref().map_or(self.config.port, |daemon| daemon.local_addr().port())
    }

    /// The bound address, `None` while stopped.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.daemon.as_ref().map(Daemon::local_addr)
    }

    /// `http://address:port`, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://{}", SocketAddr::new(self.config.address, self.port()))
    }

    /// Installs the function deciding every following response.
    ///
    /// It runs on an engine worker thread once per request, after the request was read
    /// completely, and fills in `response_status`, `response_headers` and `response_body`.
    pub fn set_response_callback<F>(&self, callback: F)
    where
        F: Fn(&mut RequestRecord) + Send + Sync + 'static,
    {
        self.lifecycle.set_responder(callback);
    }

    /// Blocks until `count` more requests were completed, counting completions that happened
    /// before the call. `None` waits forever, `Some(Duration::ZERO)` only checks what is already
    /// counted. On timeout `false` is returned and nothing is consumed.
    pub fn wait_for_request_completed(&self, count: u32, timeout: Option<Duration>) -> bool {
        self.lifecycle.notifier().wait(count, timeout)
    }

    /// The most recently completed request.
    pub fn last_request(&self) -> Option<Arc<RequestRecord>> {
        self.lifecycle.last_completed()
    }
}

impl Drop for HttpMockServer {
    fn drop(&mut self) {
        self.stop();
        while self.lifecycle.running_callbacks() > 0 {
            info!("waiting for running callback in other thread");
            thread::sleep(CALLBACK_POLL_INTERVAL);
        }
        debug!("mock server dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn builder_sets_engine_config() {
        let server = HttpMockServer::builder()
            .address(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .port(57567)
            .worker_threads(1)
            .read_buffer_capacity(1024)
            .build();

        assert_eq!(server.config.port, 57567);
        assert_eq!(server.config.worker_threads, 1);
        assert_eq!(server.config.read_buffer_capacity, 1024);
        assert_eq!(server.port(), 57567);
        assert_eq!(server.base_url(), "http://127.0.0.1:57567");
        assert!(!server.is_running());
        assert!(server.local_addr().is_none());
    }

    #[test]
    fn start_stop_and_restart() {
        let mut server = HttpMockServer::new(0);
        server.start().unwrap();
        assert!(server.is_running());
        assert_ne!(server.port(), 0);

        server.start().unwrap();
        assert!(server.is_running());

        server.stop();
        assert!(!server.is_running());
        assert_eq!(server.port(), 0);

        server.start().unwrap();
        assert!(server.is_running());
    }

    #[test]
    fn taken_port_is_a_startup_error() {
        let mut first = HttpMockServer::new(0);
        first.start().unwrap();

        let mut second = HttpMockServer::new(first.port());
        let err = second.start().unwrap_err();

        assert!(matches!(err, MockServerError::Startup { port, .. } if port == first.port()));
        assert!(!second.is_running());
    }

    #[test]
    fn nothing_completed_before_any_request() {
        let server = HttpMockServer::new(0);
        assert!(server.last_request().is_none());
        assert!(!server.wait_for_request_completed(1, Some(Duration::from_millis(1))));
    }
}
