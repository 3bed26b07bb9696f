//! Reassembles one [`RequestRecord`] out of the engine's callbacks.
//!
//! The engine calls [`RequestLifecycle`] several times per request. The first call creates
//! the record, registers it under a fresh [`ConnectionToken`] and stores that token in the
//! connection. Body chunks of a POST go to the raw body, or through the form parser and the
//! [classifier](crate::classifier). The call without a chunk is terminal and produces the
//! response. The completion call moves the record into the "last completed" slot and wakes
//! whoever waits on the [`CompletionNotifier`].
//!
//! The registry lock only covers map and slot updates. The response callback runs with only
//! the request's own mutex held, which nobody else contends for since calls for one token
//! arrive one after the other.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwapOption;
use httpmock_engine::connection::Connection;
use httpmock_engine::handler::{Action, ConnectionHandler, ConnectionToken, TerminationCode};
use httpmock_engine::post::PostProcessor;
use tracing::{debug, trace, warn};

use crate::classifier::{classify, merge_field};
use crate::notifier::CompletionNotifier;
use crate::record::RequestRecord;
use crate::response::{self, ResponseCallback};

#[derive(Default)]
struct Registry {
    in_flight: HashMap<ConnectionToken, Arc<Mutex<InFlight>>>,
    last_completed: Option<Arc<RequestRecord>>,
}

struct InFlight {
    record: RequestRecord,
    post_processor: Option<PostProcessor>,
}

#[derive(Debug, Clone, Copy)]
enum Verb {
    Get,
    Post,
    Other,
}

#[derive(Default)]
pub struct RequestLifecycle {
    registry: Mutex<Registry>,
    responder: ArcSwapOption<ResponseCallback>,
    notifier: CompletionNotifier,
    next_id: AtomicU64,
    running_callbacks: AtomicUsize,
}

impl RequestLifecycle {
    /// A lifecycle with no request in flight and no responder installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the function deciding responses; requests already past their terminal call keep
    /// the one they saw.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&mut RequestRecord) + Send + Sync + 'static,
    {
        let responder: ResponseCallback = Box::new(responder);
        self.responder.store(Some(Arc::new(responder)));
    }

    /// Counts every completed request.
    pub fn notifier(&self) -> &CompletionNotifier {
        &self.notifier
    }

    pub fn last_completed(&self) -> Option<Arc<RequestRecord>> {
        self.lock_registry().last_completed.clone()
    }

    /// Requests registered but not completed yet.
    pub fn in_flight(&self) -> usize {
        self.lock_registry().in_flight.len()
    }

    /// Engine callbacks currently executing, on any thread.
    pub fn running_callbacks(&self) -> usize {
        self.running_callbacks.load(Ordering::SeqCst)
    }

    fn begin(&self, conn: &mut Connection) -> Action {
        let request_method = conn.method().to_string();
        let post_processor = if request_method == "POST" { conn.create_post_processor() } else { None };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;

        let record = RequestRecord {
            id,
            url: conn.url().to_string(),
            version: conn.version(),
            method: classify(&request_method, post_processor.is_some()),
            request_method,
            ..Default::default()
        };
        debug!(id, url = %record.url, method = ?record.method, "request started");

        let token = ConnectionToken::new(id);
        let entry = Arc::new(Mutex::new(InFlight { record, post_processor }));
        self.lock_registry().in_flight.insert(token, entry);
        conn.set_token(token);
        Action::Continue
    }

    fn lookup(&self, token: ConnectionToken) -> Option<Arc<Mutex<InFlight>>> {
        self.lock_registry().in_flight.get(&token).cloned()
    }

    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        lock(&self.registry)
    }
}

impl InFlight {
    fn receive(&mut self, chunk: &[u8]) {
        let Self { record, post_processor } = self;
        match post_processor {
            None => record.body.extend_from_slice(chunk),
            Some(processor) => {
                if let Err(e) = processor.process(chunk, |field| merge_field(record, field)) {
                    warn!(cause = %e, id = record.id, "can't parse form body");
                }
            }
        }
    }

    fn finish_body(&mut self) {
        let Self { record, post_processor } = self;
        if let Some(processor) = post_processor {
            if let Err(e) = processor.finish(|field| merge_field(record, field)) {
                warn!(cause = %e, id = record.id, "can't parse form body");
            }
        }
    }
}

impl ConnectionHandler for RequestLifecycle {
    fn on_connection(&self, conn: &mut Connection, upload: Option<&[u8]>) -> Action {
        let _running = CallbackGuard::enter(&self.running_callbacks);

        let Some(token) = conn.token() else {
            return self.begin(conn);
        };

        let Some(entry) = self.lookup(token) else {
            warn!(token = token.get(), "no request registered for token");
            return response::internal_error(conn);
        };
        let mut in_flight = lock(&entry);

        let verb = match conn.method() {
            "GET" => Verb::Get,
            "POST" => Verb::Post,
            _ => Verb::Other,
        };

        match (verb, upload.filter(|chunk| !chunk.is_empty())) {
            (Verb::Get, Some(chunk)) => {
                trace!(len = chunk.len(), "ignore GET body");
                Action::Continue
            }
            (Verb::Get, None) => {
                let responder = self.responder.load_full();
                response::generate(conn, &mut in_flight.record, responder.as_deref())
            }
            (Verb::Post, Some(chunk)) => {
                in_flight.receive(chunk);
                Action::Continue
            }
            (Verb::Post, None) => {
                in_flight.finish_body();
                let responder = self.responder.load_full();
                response::generate(conn, &mut in_flight.record, responder.as_deref())
            }
            (Verb::Other, _) => response::internal_error(conn),
        }
    }

    fn on_completed(&self, token: &mut Option<ConnectionToken>, termination: TerminationCode) {
        let _running = CallbackGuard::enter(&self.running_callbacks);

        let Some(token) = token.take() else {
            return;
        };

        {
            let mut registry = self.lock_registry();
            let Some(entry) = registry.in_flight.remove(&token) else {
                warn!(token = token.get(), ?termination, "completed request was not registered");
                return;
            };
            let mut in_flight = lock(&entry);
            in_flight.post_processor = None;
            let record = mem::take(&mut in_flight.record);
            debug!(id = record.id, ?termination, "request completed");
            registry.last_completed = Some(Arc::new(record));
        }

        self.notifier.notify_one();
    }
}

impl fmt::Debug for RequestLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLifecycle")
            .field("in_flight", &self.in_flight())
            .field("has_responder", &self.responder.load().is_some())
            .field("notifier", &self.notifier)
            .field("running_callbacks", &self.running_callbacks())
            .finish_non_exhaustive()
    }
}

/// Counts a callback as running for as long as it lives.
struct CallbackGuard<'a>(&'a AtomicUsize);

impl<'a> CallbackGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for CallbackGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A panicking response callback poisons the request mutex; the data is still consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
