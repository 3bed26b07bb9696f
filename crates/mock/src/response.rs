//! Turns a finished request record into the response queued on the connection.

use httpmock_engine::connection::Connection;
use httpmock_engine::handler::Action;
use httpmock_engine::protocol::Response;
use tracing::{debug, error};

use crate::record::RequestRecord;

/// Decides the response for a captured request by filling in the record's `response_*` fields.
pub type ResponseCallback = Box<dyn Fn(&mut RequestRecord) + Send + Sync>;

/// Captures query arguments and headers, lets `responder` fill in the response and queues it.
///
/// Without a responder the record's defaults go out, an empty `200`. A header the engine
/// refuses, or an invalid status, aborts the request.
pub(crate) fn generate(
    conn: &mut Connection,
    record: &mut RequestRecord,
    responder: Option<&ResponseCallback>,
) -> Action {
    record.query_arguments.extend(conn.query_arguments());
    record.headers.extend(conn.headers().iter().cloned());

    if let Some(responder) = responder {
        responder(&mut *record);
    }

    let mut response = Response::new(record.response_body.clone());
    for (name, value) in &record.response_headers {
        if let Err(e) = response.add_header(name, value) {
            error!(cause = %e, url = %record.url, "response header rejected, aborting request");
            return Action::Abort;
        }
    }

    debug!(id = record.id, status = record.response_status, "queue response");
    queue(conn, record.response_status, response)
}

/// Answers a request the server can't make sense of with an empty `500`.
pub(crate) fn internal_error(conn: &mut Connection) -> Action {
    if conn.queued_response().is_some() {
        return Action::Continue;
    }
    queue(conn, 500, Response::empty())
}

fn queue(conn: &mut Connection, status: u16, response: Response) -> Action {
    match conn.queue_response(status, response) {
        Ok(()) => Action::Continue,
        Err(e) => {
            error!(cause = %e, url = conn.url(), "can't queue response");
            Action::Abort
        }
    }
}
