//! Pending-operation table of the ad-hoc client.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::FoundEndpoint;

/// What an outstanding request is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingMode {
    Find,
    Resolve,
}

/// A response correlated to an outstanding request.
#[derive(Debug, Clone)]
pub(crate) enum Correlated {
    ProbeMatch(FoundEndpoint),
    ResolveMatch(FoundEndpoint),
    Proxy(FoundEndpoint),
}

impl Correlated {
    fn accepted_by(&self, mode: PendingMode) -> bool {
        matches!(
            (self, mode),
            (Correlated::ProbeMatch(_), PendingMode::Find)
                | (Correlated::ResolveMatch(_), PendingMode::Resolve)
                | (Correlated::Proxy(_), _)
        )
    }
}

#[derive(Debug)]
struct PendingEntry {
    mode: PendingMode,
    sink: mpsc::UnboundedSender<Correlated>,
}

/// Outstanding requests keyed by their outbound MessageID.
#[derive(Debug, Default)]
pub(crate) struct PendingOperations {
    entries: Mutex<HashMap<String, PendingEntry>>,
}

impl PendingOperations {
    /// Register a request. The record lives as long as the returned guard.
    pub(crate) fn register(
        self: &Arc<Self>,
        message_id: String,
        mode: PendingMode,
    ) -> (PendingGuard, mpsc::UnboundedReceiver<Correlated>) {
        let (sink, rx) = mpsc::unbounded_channel();
        self.entries
            .lock()
            .insert(message_id.clone(), PendingEntry { mode, sink });
        (
            PendingGuard {
                table: self.clone(),
                message_id,
            },
            rx,
        )
    }

    /// Deliver a response to the request it relates to.
    ///
    /// Returns `false` when no matching request is pending.
    pub(crate) fn dispatch(&self, relates_to: &str, response: Correlated) -> bool {
        let entries = self.entries.lock();
        match entries.get(relates_to) {
            Some(entry) if response.accepted_by(entry.mode) => entry.sink.send(response).is_ok(),
            Some(entry) => {
                tracing::debug!(relates_to, mode = ?entry.mode, "response kind does not fit request");
                false
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Removes its pending record when dropped.
#[derive(Debug)]
pub(crate) struct PendingGuard {
    table: Arc<PendingOperations>,
    message_id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.entries.lock().remove(&self.message_id);
    }
}
