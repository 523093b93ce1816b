//! Transfer engine
//!
//! An explicit engine instance owns the queue, the transport handle, and
//! every scheduling decision. There are no globals: independent engines
//! (and their queues) coexist freely, which is also how the tests drive
//! them.
//!
//! One logical control flow owns all queue mutation. The executor runs the
//! network request on its own task, but its events are applied here,
//! sequentially, so no two writers ever race on an entry.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entry::{Entry, EntrySnapshot};
use crate::executor::{ExecutorEvent, execute_entry};
use crate::queue::{FailurePolicy, TransferQueue};
use crate::rate::RateEstimator;
use crate::transport::{Transport, upload_url};

// =============================================================================
// Configuration and Events
// =============================================================================

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed upload endpoint; entries POST to `<endpoint>/<relative path>`
    pub endpoint: String,
    /// What happens to the queue after a failed transfer
    pub failure_policy: FailurePolicy,
}

impl EngineConfig {
    /// Config with the default halt-on-failure policy
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Progress events for whatever observes the engine (UI, CLI)
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// An entry was dispatched to the transport
    Started { id: Uuid, relative_path: String },
    /// Byte-level progress for the in-flight entry
    Progress {
        id: Uuid,
        loaded_bytes: u64,
        total_bytes: u64,
        progress_percent: f32,
        rate_bytes_per_sec: f64,
    },
    /// The in-flight entry completed and rotated to the tail
    Succeeded { id: Uuid },
    /// The in-flight entry failed
    Failed { id: Uuid, message: String },
}

// =============================================================================
// Engine
// =============================================================================

/// Drives the transfer queue against a transport, one entry at a time
pub struct Engine {
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    queue: TransferQueue,
    observer: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl Engine {
    /// Create an engine over the given transport
    pub fn new(config: EngineConfig, transport: Arc<dyn Transport>) -> Self {
        let queue = TransferQueue::new(config.failure_policy);
        Self {
            config,
            transport,
            queue,
            observer: None,
        }
    }

    /// Subscribe to engine events
    ///
    /// Replaces any previous subscription. Events are best-effort: a
    /// dropped receiver never blocks or fails the engine.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<EngineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observer = Some(tx);
        rx
    }

    /// Append entries to the queue
    ///
    /// Only appends; dispatch happens in `run_until_settled`, guarded by
    /// the head-state check, so enqueueing more work mid-run never starts
    /// a second concurrent transfer.
    pub fn enqueue(&mut self, entries: Vec<Entry>) {
        debug!(count = entries.len(), "enqueueing entries");
        self.queue.enqueue(entries);
    }

    /// Run transfers until nothing is dispatchable
    ///
    /// Returns when the queue is empty, every entry is terminal, or a
    /// failed entry blocks the head under the halt policy. Calling this
    /// again after `reset`/`remove`/`enqueue` resumes the queue.
    pub async fn run_until_settled(&mut self) {
        while let Some(id) = self.queue.dispatchable_head() {
            self.transfer_one(id).await;
        }
    }

    /// Re-queue a failed entry in place
    pub fn reset(&mut self, id: Uuid) -> bool {
        self.queue.reset(id)
    }

    /// Remove a terminal entry from the queue
    pub fn remove(&mut self, id: Uuid) -> Option<Entry> {
        self.queue.remove(id)
    }

    /// The underlying queue, read-only
    pub fn queue(&self) -> &TransferQueue {
        &self.queue
    }

    /// Serializable views of all entries, in queue order
    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        self.queue.snapshot()
    }

    /// Dispose of the engine, yielding the entries in final order
    pub fn drain(self) -> Vec<Entry> {
        self.queue.into_entries()
    }

    /// Dispatch one entry and apply its events to completion
    async fn transfer_one(&mut self, id: Uuid) {
        // Snapshot what the executor needs; it never aliases the queue.
        let Some((url, payload, relative_path)) = self.queue.get(id).map(|entry| {
            (
                upload_url(&self.config.endpoint, &entry.relative_path),
                entry.payload.clone(),
                entry.relative_path.clone(),
            )
        }) else {
            return;
        };

        let now = now_ms();
        if !self.queue.mark_started(id, now) {
            // Dispatch refused: another entry in flight or state changed
            // under us. The head-state guard makes this unreachable from
            // run_until_settled.
            warn!(%id, "dispatch refused");
            return;
        }
        debug!(%id, path = %relative_path, "transfer started");
        self.emit(EngineEvent::Started { id, relative_path });

        let mut rate = RateEstimator::new(now);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let executor = tokio::spawn(execute_entry(
            Arc::clone(&self.transport),
            id,
            url,
            payload,
            event_tx,
        ));

        // Single writer: every mutation flows through this loop.
        while let Some(event) = event_rx.recv().await {
            match event {
                ExecutorEvent::Progress(sample) => {
                    let interval_rate = rate.sample(now_ms(), sample.loaded_bytes);
                    self.queue.record_progress(
                        id,
                        sample.loaded_bytes,
                        sample.total_bytes,
                        sample.size_known,
                        interval_rate,
                    );
                    if let Some(entry) = self.queue.get(id) {
                        self.emit(EngineEvent::Progress {
                            id,
                            loaded_bytes: entry.loaded_bytes,
                            total_bytes: entry.total_bytes,
                            progress_percent: entry.progress_percent,
                            rate_bytes_per_sec: entry.rate_bytes_per_sec,
                        });
                    }
                }
                ExecutorEvent::Finished(Ok(())) => {
                    self.queue.mark_succeeded(id, now_ms());
                    self.emit(EngineEvent::Succeeded { id });
                }
                ExecutorEvent::Finished(Err(failure)) => {
                    let message = failure.to_string();
                    warn!(%id, %message, "transfer failed");
                    self.queue.mark_failed(id, now_ms(), message.clone());
                    self.emit(EngineEvent::Failed { id, message });
                }
            }
        }

        let _ = executor.await;
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(observer) = &self.observer {
            let _ = observer.send(event);
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
