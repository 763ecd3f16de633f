//! Generic operation engine.
//!
//! Every inbound request runs through the same state machine:
//!
//! ```text
//! Created -> ContentValidated -> Dispatched -> ResponseSent | Suppressed | Faulted -> Completed
//! ```
//!
//! An `OperationKind` supplies the three variable steps: validate (extract
//! the payload), dispatch (ask the service implementation), respond (send or
//! build the response).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::wire::Envelope;
use crate::{Error, Result};

/// Lifecycle state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// Not started.
    Created,
    /// The payload is present and extracted.
    ContentValidated,
    /// The service implementation was called.
    Dispatched,
    /// A response was sent or built.
    ResponseSent,
    /// There was nothing to send.
    Suppressed,
    /// The service or the transport failed.
    Faulted,
    /// Finished.
    Completed,
}

/// How an operation finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The message carried no payload and was not dispatched.
    Dropped,
    /// The operation was cancelled; any service result was discarded.
    Cancelled,
    /// The service had nothing to send.
    Suppressed,
    /// A response was sent over the duplex channel.
    ResponseSent,
    /// A response was built for a request-reply channel.
    Replied(Envelope),
    /// An announcement was handed to the service; no response is due.
    Handled,
}

/// Shared cancellation flag of one operation.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The per-message-kind steps of an operation.
#[async_trait]
pub(crate) trait OperationKind: Send + Sync {
    type Content: Send + Sync;
    type Outcome: Send;

    /// Operation name used in traces.
    const NAME: &'static str;

    /// Take the payload out of the message; `None` drops the operation.
    fn validate(&mut self) -> Option<Self::Content>;

    /// Hand the payload to the service implementation.
    async fn dispatch(&self, content: &Self::Content) -> Result<Self::Outcome>;

    /// Send or build the response.
    async fn respond(&self, content: Self::Content, outcome: Self::Outcome) -> Result<Completion>;
}

pub(crate) struct Operation<K: OperationKind> {
    kind: K,
    message_id: String,
    state: OperationState,
    cancel: CancellationFlag,
}

impl<K: OperationKind> Operation<K> {
    pub(crate) fn new(kind: K, message_id: impl Into<String>, cancel: CancellationFlag) -> Self {
        Self {
            kind,
            message_id: message_id.into(),
            state: OperationState::Created,
            cancel,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> OperationState {
        self.state
    }

    fn transition(&mut self, next: OperationState) {
        tracing::trace!(
            operation = K::NAME,
            message_id = %self.message_id,
            from = ?self.state,
            to = ?next,
            "state transition"
        );
        self.state = next;
    }

    fn fault(&mut self, error: Error) -> Result<Completion> {
        tracing::debug!(operation = K::NAME, message_id = %self.message_id, "operation faulted: {error}");
        self.transition(OperationState::Faulted);
        self.transition(OperationState::Completed);
        Err(error)
    }

    fn finish(&mut self, completion: Completion) -> Result<Completion> {
        self.transition(OperationState::Completed);
        Ok(completion)
    }

    pub(crate) async fn run(&mut self) -> Result<Completion> {
        let Some(content) = self.kind.validate() else {
            tracing::debug!(operation = K::NAME, message_id = %self.message_id, "no payload, dropping");
            return self.finish(Completion::Dropped);
        };
        self.transition(OperationState::ContentValidated);

        if self.cancel.is_cancelled() {
            tracing::debug!(operation = K::NAME, "cancelled before dispatch");
            return self.finish(Completion::Cancelled);
        }

        self.transition(OperationState::Dispatched);
        let outcome = match self.kind.dispatch(&content).await {
            Ok(outcome) => outcome,
            Err(e) => return self.fault(e),
        };

        if self.cancel.is_cancelled() {
            tracing::debug!(operation = K::NAME, "cancelled during dispatch, discarding result");
            return self.finish(Completion::Cancelled);
        }

        let completion = match self.kind.respond(content, outcome).await {
            Ok(completion) => completion,
            Err(e) => return self.fault(e),
        };
        match completion {
            Completion::Suppressed => self.transition(OperationState::Suppressed),
            Completion::ResponseSent | Completion::Replied(_) => {
                self.transition(OperationState::ResponseSent)
            }
            _ => {}
        }
        self.finish(completion)
    }
}

/// A spawned operation.
#[derive(Debug)]
pub struct OperationHandle {
    cancel: CancellationFlag,
    task: JoinHandle<Result<Completion>>,
}

impl OperationHandle {
    pub(crate) fn new(cancel: CancellationFlag, task: JoinHandle<Result<Completion>>) -> Self {
        Self { cancel, task }
    }

    /// Cancel the operation. A service call already in progress runs to
    /// completion but its result is discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the operation to finish.
    pub async fn join(self) -> Result<Completion> {
        self.task.await.map_err(|_| Error::Cancelled)?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    struct Counting {
        payload: Option<u32>,
        dispatched: Arc<AtomicUsize>,
        cancel_during: Option<CancellationFlag>,
        fail_respond: bool,
    }

    impl Counting {
        fn new(payload: Option<u32>) -> Self {
            Self {
                payload,
                dispatched: Arc::default(),
                cancel_during: None,
                fail_respond: false,
            }
        }
    }

    #[async_trait]
    impl OperationKind for Counting {
        type Content = u32;
        type Outcome = u32;
        const NAME: &'static str = "counting";

        fn validate(&mut self) -> Option<u32> {
            self.payload.take()
        }

        async fn dispatch(&self, content: &u32) -> Result<u32> {
            self.dispatched.fetch_add(1, Ordering::SeqCst);
            if let Some(flag) = &self.cancel_during {
                flag.cancel();
            }
            Ok(content * 2)
        }

        async fn respond(&self, _content: u32, outcome: u32) -> Result<Completion> {
            if self.fail_respond {
                return Err(Error::transport("link down"));
            }
            Ok(if outcome == 0 {
                Completion::Suppressed
            } else {
                Completion::ResponseSent
            })
        }
    }

    #[tokio::test]
    async fn missing_payload_completes_without_dispatch() {
        let kind = Counting::new(None);
        let dispatched = kind.dispatched.clone();
        let mut op = Operation::new(kind, "urn:m", CancellationFlag::default());
        assert_eq!(op.run().await.unwrap(), Completion::Dropped);
        assert_eq!(op.state(), OperationState::Completed);
        assert_eq!(dispatched.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_outcome_is_suppressed() {
        let mut op = Operation::new(Counting::new(Some(0)), "urn:m", CancellationFlag::default());
        assert_eq!(op.run().await.unwrap(), Completion::Suppressed);

        let mut op = Operation::new(Counting::new(Some(1)), "urn:m", CancellationFlag::default());
        assert_eq!(op.run().await.unwrap(), Completion::ResponseSent);
    }

    #[tokio::test]
    async fn cancellation_before_dispatch_skips_the_service() {
        let kind = Counting::new(Some(1));
        let dispatched = kind.dispatched.clone();
        let cancel = CancellationFlag::default();
        cancel.cancel();
        let mut op = Operation::new(kind, "urn:m", cancel);
        assert_eq!(op.run().await.unwrap(), Completion::Cancelled);
        assert_eq!(dispatched.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_during_dispatch_discards_the_result() {
        let cancel = CancellationFlag::default();
        let mut kind = Counting::new(Some(1));
        kind.cancel_during = Some(cancel.clone());
        let dispatched = kind.dispatched.clone();
        let mut op = Operation::new(kind, "urn:m", cancel);
        assert_eq!(op.run().await.unwrap(), Completion::Cancelled);
        assert_eq!(dispatched.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn respond_failures_propagate() {
        let mut kind = Counting::new(Some(1));
        kind.fail_respond = true;
        let mut op = Operation::new(kind, "urn:m", CancellationFlag::default());
        assert!(matches!(op.run().await, Err(Error::Transport(_))));
        assert_eq!(op.state(), OperationState::Completed);
    }
}
