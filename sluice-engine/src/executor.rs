//! Transfer executor
//!
//! Performs exactly one network transfer for one entry and reports
//! byte-level progress. The executor works from an owned snapshot of the
//! entry (id, URL, payload handle) - it never holds a reference into the
//! queue, so the engine can keep mutating entries while bytes move.

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::entry::Payload;
use crate::transport::{ProgressSample, TransferFailure, Transport};

/// Event stream from one executor invocation
///
/// All `Progress` events for an invocation are delivered before its
/// `Finished` event.
#[derive(Debug)]
pub(crate) enum ExecutorEvent {
    Progress(ProgressSample),
    Finished(Result<(), TransferFailure>),
}

/// Execute one transfer
///
/// Sends the payload via the transport, forwarding progress samples as
/// they arrive, then reports the terminal outcome. Exactly one network
/// request is made per invocation; the caller guarantees an entry is
/// dispatched at most once.
pub(crate) async fn execute_entry(
    transport: Arc<dyn Transport>,
    id: Uuid,
    url: String,
    payload: Payload,
    event_tx: mpsc::UnboundedSender<ExecutorEvent>,
) {
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();

    // Forward transport samples while the request is in flight. The
    // forwarder drains until the transport drops its sender, and awaiting
    // it below guarantees every Progress event precedes Finished.
    let forward_tx = event_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(sample) = progress_rx.recv().await {
            if forward_tx.send(ExecutorEvent::Progress(sample)).is_err() {
                break;
            }
        }
    });

    let outcome = transport.send(&url, &payload, progress_tx).await;

    let _ = forwarder.await;
    tracing::debug!(%id, url, ok = outcome.is_ok(), "transfer finished");
    let _ = event_tx.send(ExecutorEvent::Finished(outcome));
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Transport that emits two samples and then succeeds or fails
    struct ScriptedTransport {
        outcome: Result<(), TransferFailure>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            _url: &str,
            payload: &Payload,
            progress: mpsc::UnboundedSender<ProgressSample>,
        ) -> Result<(), TransferFailure> {
            let total = payload.size();
            for loaded in [total / 2, total] {
                let _ = progress.send(ProgressSample {
                    loaded_bytes: loaded,
                    total_bytes: total,
                    size_known: true,
                });
            }
            self.outcome.clone()
        }
    }

    async fn run_executor(outcome: Result<(), TransferFailure>) -> Vec<ExecutorEvent> {
        let transport = Arc::new(ScriptedTransport { outcome });
        let (tx, mut rx) = mpsc::unbounded_channel();
        execute_entry(
            transport,
            Uuid::new_v4(),
            "http://sink/a.txt".to_string(),
            Payload::from(vec![0u8; 100]),
            tx,
        )
        .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_progress_precedes_terminal_outcome() {
        let events = run_executor(Ok(())).await;
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[0],
            ExecutorEvent::Progress(ProgressSample {
                loaded_bytes: 50,
                ..
            })
        ));
        assert!(matches!(
            events[1],
            ExecutorEvent::Progress(ProgressSample {
                loaded_bytes: 100,
                ..
            })
        ));
        assert!(matches!(events[2], ExecutorEvent::Finished(Ok(()))));
    }

    #[tokio::test]
    async fn test_failure_outcome_is_reported() {
        let events = run_executor(Err(TransferFailure::ServerRejected {
            status: 500,
            body: "boom".to_string(),
        }))
        .await;

        match events.last() {
            Some(ExecutorEvent::Finished(Err(failure))) => {
                assert_eq!(failure.to_string(), "500: boom");
            }
            other => panic!("expected failed outcome, got {other:?}"),
        }
    }
}
