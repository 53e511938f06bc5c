//! Request/response correlation.
//!
//! Replies and push notifications share one stream. A caller that expects a
//! reply registers the literal prefix the reply will start with; the read
//! loop offers every incoming message to [`ResponseCorrelator::try_resolve`]
//! and only publishes it as a push if no pending request claims it.
//!
//! Matching is `message.starts_with(prefix)`; the earliest registered live
//! entry wins. Two live entries where one prefix is a prefix of the other
//! could both claim the same reply, so registration refuses them.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{ExcsError, ExcsResult};

type Completion = oneshot::Sender<ExcsResult<String>>;

/// One outstanding correlated request.
#[derive(Debug)]
struct PendingRequest {
    id: u64,
    expected_prefix: String,
    completion: Completion,
    created_at: Instant,
}

#[derive(Debug, Default)]
struct Table {
    next_id: u64,
    /// Kept in registration order so the first match is the oldest.
    pending: Vec<PendingRequest>,
}

/// Mutex-guarded table of pending requests.
#[derive(Debug, Default)]
pub struct ResponseCorrelator {
    table: Mutex<Table>,
}

/// Handle returned by [`ResponseCorrelator::register`].
///
/// Await it with [`PendingResponse::wait`]; pass it to
/// [`ResponseCorrelator::cancel`] to withdraw the registration.
#[derive(Debug)]
pub struct PendingResponse {
    id: u64,
    prefix: String,
    receiver: oneshot::Receiver<ExcsResult<String>>,
}

impl PendingResponse {
    /// The prefix this handle is waiting for.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Wait for the reply.
    ///
    /// On timeout the registration is left in place; the caller is expected
    /// to cancel it (see [`ResponseCorrelator::cancel`]).
    pub async fn wait(&mut self, limit: Duration) -> ExcsResult<String> {
        match tokio::time::timeout(limit, &mut self.receiver).await {
            Ok(Ok(result)) => result,
            // Sender dropped without completing: the table was torn down.
            Ok(Err(_)) => Err(ExcsError::ConnectionClosed),
            Err(_) => Err(ExcsError::Timeout {
                prefix: self.prefix.clone(),
                after: limit,
            }),
        }
    }
}

impl ResponseCorrelator {
    /// Create an empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the next message starting with `prefix`.
    ///
    /// # Errors
    ///
    /// - `ExcsError::Argument` for an empty prefix, which would match everything
    /// - `ExcsError::PrefixCollision` if a live entry could claim the same reply
    pub fn register(&self, prefix: &str) -> ExcsResult<PendingResponse> {
        if prefix.is_empty() {
            return Err(ExcsError::argument("response prefix must not be empty"));
        }

        let mut table = self.table.lock();

        // Entries whose waiter went away can no longer collide.
        table.pending.retain(|p| !p.completion.is_closed());

        if let Some(existing) = table
            .pending
            .iter()
            .find(|p| prefixes_overlap(&p.expected_prefix, prefix))
        {
            warn!(
                "Refusing correlated request '{}': pending '{}' could claim its reply",
                prefix, existing.expected_prefix
            );
            return Err(ExcsError::PrefixCollision {
                requested: prefix.to_string(),
                pending: existing.expected_prefix.clone(),
            });
        }

        let id = table.next_id;
        table.next_id += 1;

        let (tx, rx) = oneshot::channel();
        table.pending.push(PendingRequest {
            id,
            expected_prefix: prefix.to_string(),
            completion: tx,
            created_at: Instant::now(),
        });

        debug!("Registered response prefix '{}' (#{})", prefix, id);
        Ok(PendingResponse {
            id,
            prefix: prefix.to_string(),
            receiver: rx,
        })
    }

    /// Offer an incoming message to the pending requests.
    ///
    /// Returns `true` if a pending request took it; `false` means the
    /// message is an unsolicited push.
    pub fn try_resolve(&self, message: &str) -> bool {
        let mut table = self.table.lock();

        while let Some(index) = table
            .pending
            .iter()
            .position(|p| message.starts_with(&p.expected_prefix))
        {
            let entry = table.pending.remove(index);
            let waited = entry.created_at.elapsed();
            if entry.completion.send(Ok(message.to_string())).is_ok() {
                debug!(
                    "Resolved prefix '{}' (#{}) after {:?}",
                    entry.expected_prefix, entry.id, waited
                );
                return true;
            }
            // The waiter is gone; keep looking for a live match.
            debug!("Dropped stale entry for prefix '{}'", entry.expected_prefix);
        }

        false
    }

    /// Withdraw a registration without resolving it.
    ///
    /// Only the entry created for `handle` is removed, so cancelling an old
    /// handle never disturbs a newer request with the same prefix.
    pub fn cancel(&self, handle: &PendingResponse) -> bool {
        let mut table = self.table.lock();
        let before = table.pending.len();
        table.pending.retain(|p| p.id != handle.id);
        let removed = table.pending.len() != before;
        if removed {
            debug!("Cancelled prefix '{}' (#{})", handle.prefix, handle.id);
        }
        removed
    }

    /// Fail every pending request with `error` and empty the table.
    pub fn fail_all(&self, error: ExcsError) -> usize {
        let drained: Vec<PendingRequest> = self.table.lock().pending.drain(..).collect();
        let count = drained.len();
        for entry in drained {
            let _ = entry.completion.send(Err(error.clone()));
        }
        if count > 0 {
            debug!("Failed {} pending request(s): {}", count, error);
        }
        count
    }

    /// Number of live registrations.
    pub fn pending_count(&self) -> usize {
        self.table.lock().pending.len()
    }
}

fn prefixes_overlap(a: &str, b: &str) -> bool {
    a.starts_with(b) || b.starts_with(a)
}
