use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use http::StatusCode;
use http::header::EXPECT;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::connection::Connection;
use crate::handler::{Action, ConnectionHandler, ConnectionToken, TerminationCode};
use crate::protocol::{
    HttpError, Message, ParseError, PayloadItem, PayloadSize, QueuedResponse, RequestHeader, Response, SendError,
};

/// Default capacity of the read buffer.
pub const DEFAULT_READ_BUFFER_CAPACITY: usize = 8 * 1024;

/// Serves the requests of one client connection, one after the other.
///
/// Each request is decoded, handed to the [`ConnectionHandler`] header first and then chunk by
/// chunk, and answered with the response the handler queued on its final call. The connection
/// stays open for the next request unless the client asked to close it, the handler aborted,
/// or something went wrong.
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    shutdown: CancellationToken,
}

impl<R, W> fmt::Debug for HttpConnection<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection")
            .field("buffered", &self.framed_read.read_buffer().len())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// What happened to a request, for deciding whether to read the next one.
enum Outcome {
    KeepAlive,
    Close,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_read_buffer_capacity(reader, writer, DEFAULT_READ_BUFFER_CAPACITY)
    }

    pub fn with_read_buffer_capacity(reader: R, writer: W, capacity: usize) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), capacity),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stops reading once `shutdown` is cancelled; a request in progress is completed with
    /// [`TerminationCode::DaemonShutdown`].
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub async fn process<H: ConnectionHandler>(mut self, handler: Arc<H>) -> Result<(), HttpError> {
        loop {
            match self.next_message().await {
                Some(Ok(Message::Header((header, payload_size)))) => {
                    match self.do_process(header, payload_size, handler.as_ref()).await? {
                        Outcome::KeepAlive => continue,
                        Outcome::Close => return Ok(()),
                    }
                }

                Some(Ok(Message::Payload(_))) => {
                    error!("receive payload while expecting a request header");
                    complete(handler.as_ref(), &mut None, TerminationCode::WithError);
                    self.send_error(StatusCode::BAD_REQUEST).await?;
                    return Err(ParseError::invalid_body("need header while receive body").into());
                }

                Some(Err(e)) => {
                    warn!(cause = %e, "can't decode request");
                    complete(handler.as_ref(), &mut None, TerminationCode::WithError);
                    self.send_error(StatusCode::BAD_REQUEST).await?;
                    return Err(e.into());
                }

                None if self.shutdown.is_cancelled() => {
                    info!("shutting down, close idle connection");
                    return Ok(());
                }

                None => {
                    info!("cant read more request, break this connection down");
                    return Ok(());
                }
            }
        }
    }

    async fn do_process<H: ConnectionHandler>(
        &mut self,
        header: RequestHeader,
        payload_size: PayloadSize,
        handler: &H,
    ) -> Result<Outcome, HttpError> {
        debug!(method = %header.method(), path = header.path(), "receive request");
        let expect_continue = !payload_size.is_empty() && expects_continue(&header);
        let mut conn = Connection::new(header);

        if invoke(handler, &mut conn, None)? == Action::Abort {
            return Ok(abort(handler, &mut conn));
        }

        if expect_continue {
            let writer = self.framed_write.get_mut();
            writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(SendError::io)?;
            writer.flush().await.map_err(SendError::io)?;
            info!("receive expect request header, sent continue response");
        }

        loop {
            match self.next_message().await {
                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                    if bytes.is_empty() {
                        continue;
                    }
                    if invoke(handler, &mut conn, Some(&bytes[..]))? == Action::Abort {
                        return Ok(abort(handler, &mut conn));
                    }
                }

                Some(Ok(Message::Payload(PayloadItem::Eof))) => break,

                Some(Ok(Message::Header(_))) => {
                    complete(handler, conn.token_slot(), TerminationCode::WithError);
                    return Err(ParseError::invalid_body("receive header while reading body").into());
                }

                Some(Err(e)) => {
                    warn!(cause = %e, "can't decode request body");
                    complete(handler, conn.token_slot(), TerminationCode::WithError);
                    self.send_error(StatusCode::BAD_REQUEST).await?;
                    return Err(e.into());
                }

                None => {
                    let termination = if self.shutdown.is_cancelled() {
                        TerminationCode::DaemonShutdown
                    } else {
                        TerminationCode::ClientAbort
                    };
                    info!(?termination, "connection ended while reading request body");
                    complete(handler, conn.token_slot(), termination);
                    return Ok(Outcome::Close);
                }
            }
        }

        if invoke(handler, &mut conn, None)? == Action::Abort {
            return Ok(abort(handler, &mut conn));
        }

        let Some(response) = conn.take_response() else {
            error!("handler returned from its final call without queueing a response");
            return Ok(abort(handler, &mut conn));
        };

        let keep_alive = response.keep_alive;
        if let Err(e) = self.framed_write.send(response).await {
            error!(cause = %e, "can't send response");
            complete(handler, conn.token_slot(), TerminationCode::WithError);
            return Err(e.into());
        }

        complete(handler, conn.token_slot(), TerminationCode::CompletedOk);
        Ok(if keep_alive { Outcome::KeepAlive } else { Outcome::Close })
    }

    /// Reads the next message unless the connection is being shut down.
    async fn next_message(&mut self) -> Option<Result<Message<(RequestHeader, PayloadSize)>, ParseError>> {
        select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            message = self.framed_read.next() => message,
        }
    }

    async fn send_error(&mut self, status: StatusCode) -> Result<(), HttpError> {
        let response = QueuedResponse { status, response: Response::empty(), keep_alive: false };
        self.framed_write.send(response).await?;
        Ok(())
    }
}

fn expects_continue(header: &RequestHeader) -> bool {
    header.headers().get(EXPECT).is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"))
}

/// Calls the handler, turning a panic into [`HttpError::HandlerPanicked`] after completing the
/// request.
fn invoke<H: ConnectionHandler>(
    handler: &H,
    conn: &mut Connection,
    upload: Option<&[u8]>,
) -> Result<Action, HttpError> {
    match catch_unwind(AssertUnwindSafe(|| handler.on_connection(conn, upload))) {
        Ok(action) => Ok(action),
        Err(_) => {
            error!(url = conn.url(), "connection handler panicked");
            complete(handler, conn.token_slot(), TerminationCode::WithError);
            Err(HttpError::HandlerPanicked)
        }
    }
}

fn abort<H: ConnectionHandler>(handler: &H, conn: &mut Connection) -> Outcome {
    info!(url = conn.url(), "request aborted, closing connection");
    complete(handler, conn.token_slot(), TerminationCode::WithError);
    Outcome::Close
}

fn complete<H: ConnectionHandler>(handler: &H, token: &mut Option<ConnectionToken>, termination: TerminationCode) {
    if catch_unwind(AssertUnwindSafe(|| handler.on_completed(token, termination))).is_err() {
        error!(?termination, "completion handler panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, duplex};

    /// Echoes the body back and records every callback.
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
        body: Mutex<Vec<u8>>,
    }

    impl Recorder {
        fn log(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl ConnectionHandler for Recorder {
        fn on_connection(&self, conn: &mut Connection, upload: Option<&[u8]>) -> Action {
            match (conn.token(), upload) {
                (None, _) => {
                    self.log(format!("start {} {}", conn.method(), conn.url()));
                    conn.set_token(ConnectionToken::new(1));
                }
                (Some(_), Some(chunk)) => {
                    self.log(format!("chunk {}", chunk.len()));
                    self.body.lock().unwrap().extend_from_slice(chunk);
                }
                (Some(_), None) => {
                    self.log("final".to_string());
                    if conn.url() == "/abort" {
                        return Action::Abort;
                    }
                    if conn.url() == "/panic" {
                        panic!("handler failure");
                    }
                    let body = std::mem::take(&mut *self.body.lock().unwrap());
                    conn.queue_response(200, Response::new(body)).unwrap();
                }
            }
            Action::Continue
        }

        fn on_completed(&self, token: &mut Option<ConnectionToken>, termination: TerminationCode) {
            self.log(format!("completed {:?} {:?}", token.take().map(|t| t.get()), termination));
        }
    }

    async fn exchange(request: &[u8]) -> (String, Vec<String>, Result<(), HttpError>) {
        let handler = Arc::new(Recorder::default());
        let (client, server) = duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let (mut client_read, mut client_write) = tokio::io::split(client);

        client_write.write_all(request).await.unwrap();
        client_write.shutdown().await.unwrap();

        let result = HttpConnection::new(server_read, server_write).process(Arc::clone(&handler)).await;

        let mut response = Vec::new();
        client_read.read_to_end(&mut response).await.unwrap();
        let events = handler.events.lock().unwrap().clone();
        (String::from_utf8_lossy(&response).into_owned(), events, result)
    }

    #[tokio::test]
    async fn get_goes_through_all_callbacks() {
        let (response, events, result) = exchange(b"GET /index HTTP/1.1\r\nConnection: close\r\n\r\n").await;

        assert!(result.is_ok());
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("content-length: 0\r\n"));
        assert_eq!(events, vec!["start GET /index", "final", "completed Some(1) CompletedOk"]);
    }

    #[tokio::test]
    async fn body_chunks_reach_the_handler() {
        let request = b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let (response, events, result) = exchange(request).await;

        assert!(result.is_ok());
        assert!(response.ends_with("\r\n\r\nhello"));
        assert_eq!(events, vec!["start POST /echo", "chunk 5", "final", "completed Some(1) CompletedOk"]);
    }

    #[tokio::test]
    async fn keep_alive_serves_pipelined_requests() {
        let request = b"GET /first HTTP/1.1\r\n\r\nGET /second HTTP/1.1\r\n\r\n";
        let (response, events, result) = exchange(request).await;

        assert!(result.is_ok());
        assert_eq!(response.matches("HTTP/1.1 200 OK").count(), 2);
        assert_eq!(events.iter().filter(|e| e.starts_with("completed")).count(), 2);
        assert_eq!(events[3], "start GET /second");
    }

    #[tokio::test]
    async fn expect_continue_is_answered() {
        let request =
            b"POST /echo HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok";
        let (response, _, result) = exchange(request).await;

        assert!(result.is_ok());
        assert!(response.starts_with("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn malformed_request_gets_400() {
        let (response, events, result) = exchange(b"\x01 nonsense\r\n\r\n").await;

        assert!(result.is_err());
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert_eq!(events, vec!["completed None WithError"]);
    }

    #[tokio::test]
    async fn abort_closes_without_response() {
        let (response, events, result) = exchange(b"GET /abort HTTP/1.1\r\n\r\nGET /next HTTP/1.1\r\n\r\n").await;

        assert!(result.is_ok());
        assert!(response.is_empty());
        assert_eq!(events.last().unwrap(), "completed Some(1) WithError");
        assert!(!events.iter().any(|e| e.contains("/next")));
    }

    #[tokio::test]
    async fn panic_still_completes() {
        let (response, events, result) = exchange(b"GET /panic HTTP/1.1\r\n\r\n").await;

        assert!(matches!(result, Err(HttpError::HandlerPanicked)));
        assert!(response.is_empty());
        assert_eq!(events.last().unwrap(), "completed Some(1) WithError");
    }

    #[tokio::test]
    async fn truncated_body_is_client_abort() {
        let (_, events, result) = exchange(b"POST /echo HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").await;

        assert!(result.is_ok());
        assert_eq!(events.last().unwrap(), "completed Some(1) ClientAbort");
    }
}
