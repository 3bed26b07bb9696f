use httpmock_engine::protocol::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MockServerError {
    #[error("mock server failed to start on port {port}: {source}")]
    Startup {
        port: u16,
        #[source]
        source: EngineError,
    },

    #[error("no mock server came up on {try_count} ports starting at {start_port}")]
    NoAvailablePort { start_port: u16, try_count: u16 },
}

impl MockServerError {
    pub fn startup(port: u16, source: EngineError) -> Self {
        Self::Startup { port, source }
    }

    pub fn no_available_port(start_port: u16, try_count: u16) -> Self {
        Self::NoAvailablePort { start_port, try_count }
    }
}
