//! Helpers for test suites sharing one mock server.

use tracing::{debug, warn};

use crate::error::MockServerError;
use crate::server::HttpMockServer;

/// Starts a server on the first port of `start_port..start_port + try_count` that can be bound.
pub fn first_running_mock_server(start_port: u16, try_count: u16) -> Result<HttpMockServer, MockServerError> {
    for offset in 0..try_count {
        let Some(port) = start_port.checked_add(offset) else {
            break;
        };

        let mut server = HttpMockServer::new(port);
        match server.start() {
            Ok(()) => return Ok(server),
            Err(e) => debug!(port, cause = %e, "port not usable, trying the next one"),
        }
    }

    warn!(start_port, try_count, "no mock server came up");
    Err(MockServerError::no_available_port(start_port, try_count))
}

/// Owns a mock server for the duration of a test suite.
#[derive(Debug)]
pub struct MockServerEnvironment {
    server: HttpMockServer,
}

impl MockServerEnvironment {
    pub fn new(port: u16) -> Self {
        Self::from_server(HttpMockServer::new(port))
    }

    pub fn from_server(server: HttpMockServer) -> Self {
        Self { server }
    }

    /// An environment around a server already running on the first free port of the range.
    pub fn first_available(start_port: u16, try_count: u16) -> Result<Self, MockServerError> {
        first_running_mock_server(start_port, try_count).map(Self::from_server)
    }

    pub fn mock(&self) -> &HttpMockServer {
        &self.server
    }

    pub fn mock_mut(&mut self) -> &mut HttpMockServer {
        &mut self.server
    }

    pub fn set_up(&mut self) -> Result<(), MockServerError> {
        if !self.server.is_running() {
            self.server.start()?;
        }
        Ok(())
    }

    pub fn tear_down(&mut self) {
        self.server.stop();
    }
}
