//! The callback interface between the engine and the code serving requests.
//!
//! For every request the engine calls [`ConnectionHandler::on_connection`]:
//!
//! 1. once with `None` right after the header was decoded
//! 2. once per decoded body chunk with `Some(chunk)`
//! 3. a final time with `None`, which must queue a response on the [`Connection`]
//!
//! and afterwards [`ConnectionHandler::on_completed`] exactly once, whether the response went
//! out, the handler aborted, the client disappeared or the engine shut down. Calls for one
//! request are sequential; calls for different connections may run in parallel on different
//! worker threads.
//!
//! Per-request state is tied to the request through the [`ConnectionToken`] slot of the
//! connection, which the handler fills on the first call and gets back in `on_completed`.

use crate::connection::Connection;

/// Tells the engine whether to keep going with the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    /// Stop reading, send nothing more and close the connection.
    Abort,
}

/// How a request ended, handed to [`ConnectionHandler::on_completed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCode {
    /// The response was written.
    CompletedOk,
    /// The request could not be decoded, the handler aborted, or the response could not be sent.
    WithError,
    /// The client closed the connection before the request was complete.
    ClientAbort,
    /// The engine is shutting down.
    DaemonShutdown,
}

/// Opaque value a handler stores in the connection to find its per-request state again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionToken(u64);

impl ConnectionToken {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

pub trait ConnectionHandler: Send + Sync + 'static {
    fn on_connection(&self, conn: &mut Connection, upload: Option<&[u8]>) -> Action;

    fn on_completed(&self, token: &mut Option<ConnectionToken>, termination: TerminationCode);
}
