//! Pending-Request Registry (C2): tracks in-flight requests by id until resolved, rejected, or
//! timed out.
//!
//! A `Uuid`-keyed table driven by a polled `earliest_deadline`/`sweep_timeouts` pair, matching the
//! single-task `tokio::select!` loop that owns it.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use crate::err::GatewayError;

/// A single in-flight request: the sender half the transport task fulfills and the deadline it
/// must fulfill it by.
struct Entry {
    waiter: oneshot::Sender<Result<Value, GatewayError>>,
    deadline: Instant,
}

/// Id-keyed table of in-flight requests.
///
/// Not `Send`-shared: owned by the single task that drives the socket event loop, per the
/// single-task-per-connection concurrency model. No internal locking.
#[derive(Default)]
pub struct PendingRegistry {
    entries: HashMap<Uuid, Entry>,
}

impl PendingRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `id` with a timeout of `timeout`, measured from now.
    ///
    /// Callers must register before sending the request on the wire: a response that
    /// arrives before `add` runs must never be possible to observe as unrecognized.
    pub fn add(&mut self, id: Uuid, waiter: oneshot::Sender<Result<Value, GatewayError>>, timeout: Duration) {
        tracing::trace!(%id, ?timeout, "pending: add");
        self.entries.insert(
            id,
            Entry {
                waiter,
                deadline: Instant::now() + timeout,
            },
        );
    }

    /// Whether `id` currently has a registered waiter.
    #[must_use]
    pub fn has(&self, id: Uuid) -> bool {
        self.entries.contains_key(&id)
    }

    /// Removes `id` without dispatching to its waiter, dropping the `oneshot::Sender` and thereby
    /// failing the caller's `await` with a canceled-channel error. Used by `clear()`.
    pub fn remove(&mut self, id: Uuid) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Resolves `id` with a successful value. No-op if `id` is not pending (already resolved,
    /// rejected, or timed out).
    pub fn resolve(&mut self, id: Uuid, value: Value) {
        if let Some(entry) = self.entries.remove(&id) {
            tracing::trace!(%id, "pending: resolve");
            let _ = entry.waiter.send(Ok(value));
        }
    }

    /// Rejects `id` with `error`. No-op if `id` is not pending.
    pub fn reject(&mut self, id: Uuid, error: GatewayError) {
        if let Some(entry) = self.entries.remove(&id) {
            tracing::trace!(%id, code = error.code(), "pending: reject");
            let _ = entry.waiter.send(Err(error));
        }
    }

    /// Rejects every currently pending entry with a connection-closed error, draining the table.
    /// Called on disconnect.
    pub fn reject_all(&mut self, reason: &str) {
        let count = self.entries.len();
        if count > 0 {
            tracing::debug!(count, reason, "pending: rejectAll");
        }
        for (id, entry) in self.entries.drain() {
            tracing::trace!(%id, "pending: rejectAll entry");
            let _ = entry.waiter.send(Err(GatewayError::connection(reason)));
        }
    }

    /// Drops every pending waiter's sender without sending a value, canceling their `oneshot`
    /// receivers silently. Used when the registry itself is being torn down rather than the
    /// connection being lost.
    pub fn clear(&mut self) {
        let count = self.entries.len();
        if count > 0 {
            tracing::debug!(count, "pending: clear");
        }
        self.entries.clear();
    }

    /// The nearest deadline among all pending entries, if any — used by the transport event loop
    /// to size its next timeout-sleep branch (mirrors `TransportTask::earliest_deadline`).
    #[must_use]
    pub fn earliest_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|entry| entry.deadline).min()
    }

    /// Rejects every entry whose deadline has elapsed as of `now`, each with a timeout error
    /// (mirrors `TransportTask::sweep_timeouts`). Returns the number of entries reaped.
    pub fn sweep_timeouts(&mut self, now: Instant) -> usize {
        let expired: Vec<Uuid> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.reject(*id, GatewayError::timeout("request timed out"));
        }
        expired.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
