//! Selection sources
//!
//! A selection is whatever the user picked or dropped: a mixed list of
//! files and directories from some external source that may not answer
//! immediately. `SelectionNode` is the capability interface the flattener
//! consumes; `FsNode` is the filesystem-backed implementation used by the
//! CLI and the tests.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::entry::Payload;

/// Children returned per `next_children` call by `FsNode`
///
/// Directory listings are paginated; callers must keep calling until an
/// empty batch comes back.
const CHILD_BATCH: usize = 64;

/// What a selection node is capable of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Has bytes to resolve
    Leaf,
    /// Has children to list
    Container,
    /// Neither file nor directory (socket, device, broken link); logged
    /// and skipped by the flattener
    Other,
}

/// One node of a selection
///
/// Resolving a leaf's payload and listing a container's children are both
/// suspending operations: they depend on an external source that may not
/// be immediately available.
#[async_trait]
pub trait SelectionNode: Send {
    /// The node's own name, without any ancestor path
    fn name(&self) -> &str;

    /// Leaf, container, or neither
    fn kind(&self) -> NodeKind;

    /// Resolve the payload of a leaf node
    async fn resolve_leaf(&mut self) -> io::Result<Payload>;

    /// Next batch of children of a container node, in source order
    ///
    /// A single call may be one page of a larger directory; an empty
    /// batch signals exhaustion. Treating one call as exhaustive silently
    /// drops entries in large directories.
    async fn next_children(&mut self) -> io::Result<Vec<Box<dyn SelectionNode>>>;
}

// =============================================================================
// Filesystem Source
// =============================================================================

/// Selection node backed by a local filesystem path
pub struct FsNode {
    path: PathBuf,
    name: String,
    kind: NodeKind,
    size: u64,
    reader: Option<fs::ReadDir>,
    exhausted: bool,
}

impl FsNode {
    /// Create a node for a path, classifying it by its metadata
    pub async fn new(path: PathBuf) -> io::Result<Self> {
        let metadata = fs::metadata(&path).await?;
        let kind = if metadata.is_file() {
            NodeKind::Leaf
        } else if metadata.is_dir() {
            NodeKind::Container
        } else {
            NodeKind::Other
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            path,
            name,
            kind,
            size: metadata.len(),
            reader: None,
            exhausted: false,
        })
    }
}

#[async_trait]
impl SelectionNode for FsNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    async fn resolve_leaf(&mut self) -> io::Result<Payload> {
        Ok(Payload::File {
            path: self.path.clone(),
            size: self.size,
        })
    }

    async fn next_children(&mut self) -> io::Result<Vec<Box<dyn SelectionNode>>> {
        if self.kind != NodeKind::Container || self.exhausted {
            return Ok(Vec::new());
        }

        if self.reader.is_none() {
            self.reader = Some(fs::read_dir(&self.path).await?);
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(Vec::new());
        };

        let mut batch: Vec<Box<dyn SelectionNode>> = Vec::new();
        while batch.len() < CHILD_BATCH {
            match reader.next_entry().await? {
                Some(dirent) => {
                    batch.push(Box::new(FsNode::new(dirent.path()).await?));
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        Ok(batch)
    }
}

// =============================================================================
// Tests
// =============================================================================
