//! Directory flattener
//!
//! Expands a mixed selection of files and directories into an ordered
//! sequence of queued entries, one per leaf, each carrying its
//! selection-relative path. Traversal is depth-first with siblings in
//! source order, driven by an explicit work list rather than call-stack
//! recursion.

use std::io;

use tracing::warn;

use crate::entry::Entry;
use crate::source::{NodeKind, SelectionNode};

/// Flatten a selection into queued entries
///
/// Each leaf becomes one entry whose `relative_path` is the `/`-joined
/// names of its ancestor containers plus its own name. Resolutions are
/// awaited one at a time, so entries land in deterministic depth-first
/// order even though individual resolutions suspend.
///
/// Container listings are drained until they report no further children;
/// a single listing call may be one page of a larger directory. Nodes that
/// are neither leaf nor container are logged and skipped without
/// disturbing their siblings. I/O errors from the underlying source abort
/// the traversal.
pub async fn flatten_selection(
    selection: Vec<Box<dyn SelectionNode>>,
) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();

    // LIFO work list; pushing children in reverse keeps source order.
    let mut work: Vec<(String, Box<dyn SelectionNode>)> = selection
        .into_iter()
        .rev()
        .map(|node| (String::new(), node))
        .collect();

    while let Some((prefix, mut node)) = work.pop() {
        let name = node.name();
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        };

        match node.kind() {
            NodeKind::Leaf => {
                let payload = node.resolve_leaf().await?;
                entries.push(Entry::new(path, payload));
            }
            NodeKind::Container => {
                let mut children = Vec::new();
                loop {
                    let batch = node.next_children().await?;
                    if batch.is_empty() {
                        break;
                    }
                    children.extend(batch);
                }
                for child in children.into_iter().rev() {
                    work.push((path.clone(), child));
                }
            }
            NodeKind::Other => {
                warn!(path = %path, "selection node is neither file nor directory, skipping");
            }
        }
    }

    Ok(entries)
}

// =============================================================================
// Tests
// =============================================================================
