//! Sluice Transfer Queue Engine
//!
//! Turns an arbitrary selection of files and directories into an ordered
//! queue of upload entries and sends them to a fixed endpoint one at a
//! time, tracking per-entry state, progress, and throughput.
//!
//! Key types:
//! - `Entry` - one file queued for transfer, with its state and metrics
//! - `TransferQueue` - ordered entries plus the advancement policy
//! - `Engine` - drives the queue against a `Transport`
//! - `SelectionNode` / `flatten_selection` - selection traversal
//! - `RateEstimator` - instantaneous throughput from progress samples

mod engine;
mod entry;
mod executor;
mod flatten;
mod queue;
mod rate;
mod source;
mod transport;

pub use engine::{Engine, EngineConfig, EngineEvent};
pub use entry::{Entry, EntrySnapshot, EntryState, Payload};
pub use flatten::flatten_selection;
pub use queue::{FailurePolicy, TransferQueue};
pub use rate::RateEstimator;
pub use source::{FsNode, NodeKind, SelectionNode};
pub use transport::{HttpTransport, ProgressSample, TransferFailure, Transport, upload_url};
