//! Confirmation gating: risky actions pause the run until an external
//! shell answers yes or no.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Broker between the orchestrator (which waits) and the embedding shell
/// (which answers). Each gate is keyed by a unique id; exactly one answer
/// resolves it and later answers for the same id are ignored.
#[derive(Default)]
pub struct ConfirmationBroker {
    pending: Mutex<HashMap<String, oneshot::Sender<bool>>>,
}

impl ConfirmationBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new gate. The returned receiver resolves with the answer, or
    /// errors if the gate is discarded.
    pub fn register(&self) -> (String, oneshot::Receiver<bool>) {
        let id = format!("confirm_{}", Uuid::new_v4().simple());
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), tx);
        (id, rx)
    }

    /// Answer a gate. Returns false when the id is unknown or already
    /// answered.
    pub fn resolve(&self, id: &str, approved: bool) -> bool {
        match self.pending.lock().remove(id) {
            Some(tx) => tx.send(approved).is_ok(),
            None => false,
        }
    }

    /// Drop a gate without answering, releasing the waiting side with a
    /// channel error.
    pub fn discard(&self, id: &str) {
        self.pending.lock().remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn answer_resolves_the_waiting_side() {
        let broker = ConfirmationBroker::new();
        let (id, rx) = broker.register();
        assert!(broker.resolve(&id, true));
        assert_eq!(rx.await, Ok(true));
    }

    #[tokio::test]
    async fn unknown_and_repeated_ids_are_ignored() {
        let broker = ConfirmationBroker::new();
        let (id, rx) = broker.register();
        assert!(!broker.resolve("confirm_nope", true));
        assert!(broker.resolve(&id, false));
        assert!(!broker.resolve(&id, true));
        assert_eq!(rx.await, Ok(false));
    }

    #[tokio::test]
    async fn discard_errors_the_receiver() {
        let broker = ConfirmationBroker::new();
        let (id, rx) = broker.register();
        broker.discard(&id);
        assert!(rx.await.is_err());
    }
}
