use http::StatusCode;

use crate::handler::ConnectionToken;
use crate::post::PostProcessor;
use crate::protocol::{QueuedResponse, RequestHeader, Response, SendError};

/// What a [`ConnectionHandler`](crate::handler::ConnectionHandler) sees of the request being
/// served: the decoded header, the handler's token slot and the response it queued.
#[derive(Debug)]
pub struct Connection {
    header: RequestHeader,
    token: Option<ConnectionToken>,
    response: Option<QueuedResponse>,
}

impl Connection {
    pub fn new(header: RequestHeader) -> Self {
        Self { header, token: None, response: None }
    }

    /// The request target path, without the query string.
    pub fn url(&self) -> &str {
        self.header.path()
    }

    /// The verb exactly as received, `"GET"`, `"POST"`, ...
    pub fn method(&self) -> &str {
        self.header.method().as_str()
    }

    pub fn version(&self) -> String {
        self.header.version_str()
    }

    /// Header fields in wire order and letter case.
    pub fn headers(&self) -> &[(String, String)] {
        self.header.wire_headers()
    }

    pub fn query_arguments(&self) -> Vec<(String, String)> {
        self.header.query_pairs()
    }

    pub fn token(&self) -> Option<ConnectionToken> {
        self.token
    }

    pub fn set_token(&mut self, token: ConnectionToken) {
        self.token = Some(token);
    }

    pub fn token_slot(&mut self) -> &mut Option<ConnectionToken> {
        &mut self.token
    }

    /// A form parser for the request body, when its content type is one
    /// [`PostProcessor`] understands.
    pub fn create_post_processor(&self) -> Option<PostProcessor> {
        PostProcessor::for_request(&self.header)
    }

    /// Queues the response to send once the handler returns from its final call.
    pub fn queue_response(&mut self, status: u16, response: Response) -> Result<(), SendError> {
        let status = StatusCode::from_u16(status).map_err(|_| SendError::InvalidStatus(status))?;
        if self.response.is_some() {
            return Err(SendError::AlreadyQueued);
        }

        self.response = Some(QueuedResponse { status, response, keep_alive: self.header.keep_alive() });
        Ok(())
    }

    pub fn queued_response(&self) -> Option<&QueuedResponse> {
        self.response.as_ref()
    }

    pub(crate) fn take_response(&mut self) -> Option<QueuedResponse> {
        self.response.take()
    }
}
