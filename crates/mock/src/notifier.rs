//! Counting wait/notify between the engine workers and the test thread.
//!
//! Every finished request adds one to a counter; a waiter blocks until the counter reaches the
//! number it asked for and then consumes exactly that many. Completions that happen while
//! nobody waits are kept, so a test can send a request synchronously and only then wait for it.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

#[derive(Debug, Default)]
pub struct CompletionNotifier {
    completed: Mutex<u64>,
    signal: Condvar,
}

impl CompletionNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until `count` completions are available and consumes them.
    ///
    /// `None` waits without limit. `Some(Duration::ZERO)` does not wait at all, it only checks
    /// the completions already counted, so a zero millisecond "forever" timeout has to become
    /// `None`. Returns `false` when `timeout` elapsed first, in which case nothing is consumed.
    pub fn wait(&self, count: u32, timeout: Option<Duration>) -> bool {
        if count == 0 {
            return true;
        }
        let needed = u64::from(count);

        let guard = self.lock();
        let mut guard = match timeout {
            None => {
                self.signal.wait_while(guard, |completed| *completed < needed).unwrap_or_else(PoisonError::into_inner)
            }
            Some(timeout) => {
                let (guard, _) = self
                    .signal
                    .wait_timeout_while(guard, timeout, |completed| *completed < needed)
                    .unwrap_or_else(PoisonError::into_inner);
                guard
            }
        };

        if *guard < needed {
            debug!(completed = *guard, needed, "timed out waiting for completed requests");
            return false;
        }

        *guard -= needed;
        true
    }

    pub fn notify_one(&self) {
        let mut guard = self.lock();
        *guard += 1;
        drop(guard);
        self.signal.notify_all();
    }

    /// Completions not consumed by a wait yet.
    pub fn pending(&self) -> u64 {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.completed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
