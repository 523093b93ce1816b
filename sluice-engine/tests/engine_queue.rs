//! End-to-end engine tests over a scripted transport
//!
//! These drive a real `Engine` instance (queue, scheduler, executor,
//! progress plumbing) against an in-memory transport, so the whole
//! advancement policy is exercised without a network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use sluice_engine::{
    Engine, EngineConfig, EngineEvent, Entry, EntryState, FailurePolicy, Payload, ProgressSample,
    TransferFailure, Transport,
};

/// Transport that records every request and fails scripted paths
struct ScriptedTransport {
    /// Failure by URL suffix; anything else succeeds with HTTP 200
    failures: HashMap<String, TransferFailure>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn new() -> Self {
        Self {
            failures: HashMap::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn failing(path: &str, failure: TransferFailure) -> Self {
        let mut transport = Self::new();
        transport.failures.insert(path.to_string(), failure);
        transport
    }

    fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        url: &str,
        payload: &Payload,
        progress: mpsc::UnboundedSender<ProgressSample>,
    ) -> Result<(), TransferFailure> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(url.to_string());

        let total = payload.size();
        for loaded in [total / 2, total] {
            let _ = progress.send(ProgressSample {
                loaded_bytes: loaded,
                total_bytes: total,
                size_known: true,
            });
        }

        match self
            .failures
            .iter()
            .find(|(suffix, _)| url.ends_with(suffix.as_str()))
        {
            Some((_, failure)) => Err(failure.clone()),
            None => Ok(()),
        }
    }
}

fn entry(name: &str) -> Entry {
    Entry::new(name.to_string(), Payload::from(vec![0u8; 100]))
}

fn engine_over(transport: Arc<ScriptedTransport>, policy: FailurePolicy) -> Engine {
    let config = EngineConfig {
        endpoint: "http://localhost:8080/sink/test".to_string(),
        failure_policy: policy,
    };
    Engine::new(config, transport)
}

fn paths(engine: &Engine) -> Vec<String> {
    engine
        .queue()
        .entries()
        .map(|e| e.relative_path.clone())
        .collect()
}

#[tokio::test]
async fn test_all_success_rotates_through_queue() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut engine = engine_over(Arc::clone(&transport), FailurePolicy::Halt);

    engine.enqueue(vec![entry("a.txt"), entry("b.txt"), entry("c.txt")]);
    engine.run_until_settled().await;

    assert_eq!(transport.request_count(), 3);
    // Each success rotated to the tail, so final order equals start order
    assert_eq!(paths(&engine), ["a.txt", "b.txt", "c.txt"]);
    for entry in engine.queue().entries() {
        assert_eq!(entry.state, EntryState::Transferred);
        assert_eq!(entry.loaded_bytes, entry.total_bytes);
        assert!(entry.finished_at_ms.is_some());
    }
}

#[tokio::test]
async fn test_failure_halts_queue_at_failed_entry() {
    let transport = Arc::new(ScriptedTransport::failing(
        "/c.txt",
        TransferFailure::ServerRejected {
            status: 500,
            body: "internal error".to_string(),
        },
    ));
    let mut engine = engine_over(Arc::clone(&transport), FailurePolicy::Halt);

    engine.enqueue(vec![entry("a.txt"), entry("b.txt"), entry("c.txt")]);
    engine.run_until_settled().await;

    // First two transferred, at positions 1-2 in their original order
    assert_eq!(paths(&engine), ["c.txt", "a.txt", "b.txt"]);
    let states: Vec<_> = engine.queue().entries().map(|e| e.state).collect();
    assert_eq!(
        states,
        [
            EntryState::Failed,
            EntryState::Transferred,
            EntryState::Transferred
        ]
    );

    let failed = engine.queue().entries().next().unwrap();
    let message = failed.failure_message.clone().expect("failure message");
    assert!(message.contains("500"), "message was {message:?}");

    // Scheduling again dispatches nothing while the failed entry blocks
    let before = transport.request_count();
    engine.run_until_settled().await;
    assert_eq!(transport.request_count(), before);
}

#[tokio::test]
async fn test_reset_resumes_halted_queue() {
    let transport = Arc::new(ScriptedTransport::failing(
        "/a.txt",
        TransferFailure::Transport,
    ));
    let mut engine = engine_over(Arc::clone(&transport), FailurePolicy::Halt);

    engine.enqueue(vec![entry("a.txt"), entry("b.txt")]);
    engine.run_until_settled().await;

    let failed_id = engine.queue().entries().next().unwrap().id;
    assert_eq!(
        engine.queue().get(failed_id).unwrap().failure_message,
        Some("Communication error".to_string())
    );

    // Reset re-queues in place; the retry fails again (transport still
    // scripted to fail) and the queue halts again
    assert!(engine.reset(failed_id));
    engine.run_until_settled().await;
    assert_eq!(transport.request_count(), 2);
    assert_eq!(
        engine.queue().get(failed_id).unwrap().state,
        EntryState::Failed
    );
}

#[tokio::test]
async fn test_remove_failed_head_resumes_queue() {
    let transport = Arc::new(ScriptedTransport::failing(
        "/a.txt",
        TransferFailure::ServerRejected {
            status: 403,
            body: "forbidden".to_string(),
        },
    ));
    let mut engine = engine_over(Arc::clone(&transport), FailurePolicy::Halt);

    engine.enqueue(vec![entry("a.txt"), entry("b.txt")]);
    engine.run_until_settled().await;

    let failed_id = engine.queue().entries().next().unwrap().id;
    let removed = engine.remove(failed_id).expect("remove failed entry");
    assert_eq!(removed.relative_path, "a.txt");

    engine.run_until_settled().await;
    assert_eq!(paths(&engine), ["b.txt"]);
    assert_eq!(
        engine.queue().entries().next().unwrap().state,
        EntryState::Transferred
    );
}

#[tokio::test]
async fn test_skip_policy_advances_past_failures() {
    let transport = Arc::new(ScriptedTransport::failing(
        "/b.txt",
        TransferFailure::ServerRejected {
            status: 500,
            body: "boom".to_string(),
        },
    ));
    let mut engine = engine_over(Arc::clone(&transport), FailurePolicy::SkipAndContinue);

    engine.enqueue(vec![entry("a.txt"), entry("b.txt"), entry("c.txt")]);
    engine.run_until_settled().await;

    // All three were attempted; the failed entry rotated to the tail
    assert_eq!(transport.request_count(), 3);
    assert_eq!(paths(&engine), ["a.txt", "c.txt", "b.txt"]);
    let failed = engine.queue().entries().last().unwrap();
    assert_eq!(failed.state, EntryState::Failed);
}

#[tokio::test]
async fn test_enqueue_after_settling_resumes() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut engine = engine_over(Arc::clone(&transport), FailurePolicy::Halt);

    engine.enqueue(vec![entry("a.txt")]);
    engine.run_until_settled().await;
    assert_eq!(transport.request_count(), 1);

    engine.enqueue(vec![entry("b.txt")]);
    engine.run_until_settled().await;
    assert_eq!(transport.request_count(), 2);
    assert!(
        engine
            .queue()
            .entries()
            .all(|e| e.state == EntryState::Transferred)
    );
}

#[tokio::test]
async fn test_exactly_one_request_per_entry() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut engine = engine_over(Arc::clone(&transport), FailurePolicy::Halt);

    engine.enqueue(vec![entry("a.txt"), entry("b.txt")]);
    engine.run_until_settled().await;
    // Settled queue re-runs must not re-send terminal entries
    engine.run_until_settled().await;

    assert_eq!(transport.request_count(), 2);
    let requests = transport.requests.lock().expect("requests lock").clone();
    assert_eq!(
        requests,
        [
            "http://localhost:8080/sink/test/a.txt",
            "http://localhost:8080/sink/test/b.txt"
        ]
    );
}

#[tokio::test]
async fn test_observer_sees_lifecycle_events() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut engine = engine_over(transport, FailurePolicy::Halt);
    let mut events = engine.subscribe();

    engine.enqueue(vec![entry("a.txt")]);
    engine.run_until_settled().await;
    drop(engine);

    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        seen.push(event);
    }

    assert!(matches!(
        &seen[0],
        EngineEvent::Started { relative_path, .. } if relative_path == "a.txt"
    ));
    let progress: Vec<_> = seen
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Progress { loaded_bytes, .. } => Some(*loaded_bytes),
            _ => None,
        })
        .collect();
    assert_eq!(progress, [50, 100]);
    assert!(matches!(seen.last(), Some(EngineEvent::Succeeded { .. })));

    // Progress percent reached 100 on the final sample
    let last_percent = seen
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Progress {
                progress_percent, ..
            } => Some(*progress_percent),
            _ => None,
        })
        .next_back()
        .unwrap();
    assert!((last_percent - 100.0).abs() < 0.01);
}

#[tokio::test]
async fn test_drain_yields_final_entries() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut engine = engine_over(transport, FailurePolicy::Halt);

    engine.enqueue(vec![entry("a.txt"), entry("b.txt")]);
    engine.run_until_settled().await;

    let entries = engine.drain();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.state == EntryState::Transferred));
}
