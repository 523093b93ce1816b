//! Entry types for the transfer queue
//!
//! An `Entry` is the unit of work: one leaf file from the selection plus
//! everything the engine tracks about its transfer.

use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Entry State
// =============================================================================

/// Current state of an entry
///
/// `Transferred` and `Failed` are terminal; an entry never leaves a
/// terminal state on its own (see `TransferQueue::reset` for the external
/// intervention path).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// Waiting in the queue
    Queued,
    /// Actively being sent over the network
    Transferring,
    /// Successfully sent
    Transferred,
    /// Transfer failed; the failure message is on the entry
    Failed,
}

impl EntryState {
    /// Returns true if the state is terminal (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryState::Transferred | EntryState::Failed)
    }

    /// Returns true if the entry is in flight
    pub fn is_active(&self) -> bool {
        matches!(self, EntryState::Transferring)
    }
}

// =============================================================================
// Payload
// =============================================================================

/// Opaque handle to an entry's bytes
///
/// Immutable once created; the size is known at creation time. File-backed
/// payloads are read lazily by the transport, in-memory payloads exist for
/// small selections and tests.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Bytes live on disk and are streamed at send time
    File { path: PathBuf, size: u64 },
    /// Bytes live in memory
    Bytes(Bytes),
}

impl Payload {
    /// Create a file-backed payload, reading the size from disk
    pub async fn from_file(path: PathBuf) -> std::io::Result<Self> {
        let metadata = tokio::fs::metadata(&path).await?;
        Ok(Payload::File {
            path,
            size: metadata.len(),
        })
    }

    /// Size of the payload in bytes
    pub fn size(&self) -> u64 {
        match self {
            Payload::File { size, .. } => *size,
            Payload::Bytes(data) => data.len() as u64,
        }
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Payload::Bytes(data)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(data))
    }
}

// =============================================================================
// Entry
// =============================================================================

/// One file queued for transfer
///
/// Created by the flattener (or directly from a flat file selection) in
/// `Queued` state. All mutation goes through the methods below, which are
/// only called by the queue applying transition events - entries are never
/// written from more than one place at a time.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Stable identifier, used for external correlation (UI keys, events)
    pub id: Uuid,

    /// Handle to the file's bytes; immutable once created
    pub payload: Payload,

    /// Selection-relative path: the file name alone, or `dir/sub/name`
    /// for directory drops
    pub relative_path: String,

    /// Current state
    pub state: EntryState,

    /// Size of the payload, known at creation
    pub total_bytes: u64,

    /// Bytes acknowledged sent so far
    pub loaded_bytes: u64,

    /// `loaded/total * 100` when the size is known; otherwise holds the
    /// last known value
    pub progress_percent: f32,

    /// Instantaneous rate estimate, 0 until the first progress sample
    pub rate_bytes_per_sec: f64,

    /// Millisecond timestamp when the transfer started
    pub started_at_ms: Option<i64>,

    /// Millisecond timestamp when the entry reached a terminal state
    pub finished_at_ms: Option<i64>,

    /// Set only when `state == Failed`
    pub failure_message: Option<String>,
}

impl Entry {
    /// Create a new queued entry
    pub fn new(relative_path: String, payload: Payload) -> Self {
        let total_bytes = payload.size();
        Self {
            id: Uuid::new_v4(),
            payload,
            relative_path,
            state: EntryState::Queued,
            total_bytes,
            loaded_bytes: 0,
            progress_percent: 0.0,
            rate_bytes_per_sec: 0.0,
            started_at_ms: None,
            finished_at_ms: None,
            failure_message: None,
        }
    }

    /// Mark the entry as transferring
    ///
    /// Returns false if the entry was not queued.
    pub fn start(&mut self, now_ms: i64) -> bool {
        if self.state != EntryState::Queued {
            return false;
        }
        self.state = EntryState::Transferring;
        self.started_at_ms = Some(now_ms);
        true
    }

    /// Apply one progress sample from the transport
    ///
    /// `rate` is the estimator's output for this sample, or None when the
    /// sample produced no usable interval (the previous rate is retained).
    pub fn record_progress(
        &mut self,
        loaded_bytes: u64,
        total_bytes: u64,
        size_known: bool,
        rate: Option<f64>,
    ) -> bool {
        if self.state != EntryState::Transferring {
            return false;
        }
        self.loaded_bytes = loaded_bytes;
        if size_known && total_bytes > 0 {
            self.progress_percent = (loaded_bytes as f64 / total_bytes as f64 * 100.0) as f32;
        }
        if let Some(rate) = rate {
            self.rate_bytes_per_sec = rate;
        }
        true
    }

    /// Mark the entry as transferred
    ///
    /// Returns false unless the entry was transferring.
    pub fn complete(&mut self, now_ms: i64) -> bool {
        if self.state != EntryState::Transferring {
            return false;
        }
        self.state = EntryState::Transferred;
        self.finished_at_ms = Some(now_ms);
        true
    }

    /// Mark the entry as failed with a message
    ///
    /// Returns false unless the entry was transferring.
    pub fn fail(&mut self, now_ms: i64, message: String) -> bool {
        if self.state != EntryState::Transferring {
            return false;
        }
        self.state = EntryState::Failed;
        self.finished_at_ms = Some(now_ms);
        self.failure_message = Some(message);
        true
    }

    /// Re-queue a failed entry in place for another attempt
    ///
    /// Clears failure fields, counters, and timestamps. Returns false
    /// unless the entry had failed.
    pub fn requeue(&mut self) -> bool {
        if self.state != EntryState::Failed {
            return false;
        }
        self.state = EntryState::Queued;
        self.loaded_bytes = 0;
        self.progress_percent = 0.0;
        self.rate_bytes_per_sec = 0.0;
        self.started_at_ms = None;
        self.finished_at_ms = None;
        self.failure_message = None;
        true
    }

    /// Serializable view of the entry, without the payload handle
    pub fn snapshot(&self) -> EntrySnapshot {
        EntrySnapshot {
            id: self.id,
            relative_path: self.relative_path.clone(),
            state: self.state,
            total_bytes: self.total_bytes,
            loaded_bytes: self.loaded_bytes,
            progress_percent: self.progress_percent,
            rate_bytes_per_sec: self.rate_bytes_per_sec,
            started_at_ms: self.started_at_ms,
            finished_at_ms: self.finished_at_ms,
            failure_message: self.failure_message.clone(),
        }
    }
}

/// Serializable view of an entry for observers (UI, CLI, logs)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub id: Uuid,
    pub relative_path: String,
    pub state: EntryState,
    pub total_bytes: u64,
    pub loaded_bytes: u64,
    pub progress_percent: f32,
    pub rate_bytes_per_sec: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================
