//! Path tree node types

use super::hasher::path_key;
use super::path::join;
use crate::types::{PathKey, ROOT_PATH};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

pub type Children = HashMap<String, Arc<PathNode>>;

/// Cached file payload.
///
/// The DHT value is authoritative; `bytes` is refreshed on every access
/// unless `dirty` marks a buffered write that has not been flushed yet.
#[derive(Debug, Default)]
pub struct FileBuffer {
    pub bytes: Vec<u8>,
    pub dirty: bool,
    pub loaded: bool,
}

impl FileBuffer {
    /// Overwrite `data` at `offset`, zero-filling any gap
    pub fn splice(&mut self, offset: usize, data: &[u8]) {
        let end = offset + data.len();
        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }
        self.bytes[offset..end].copy_from_slice(data);
    }

    pub fn truncate(&mut self, size: usize) {
        self.bytes.resize(size, 0);
    }

    pub fn slice(&self, offset: usize, size: usize) -> Vec<u8> {
        if offset >= self.bytes.len() {
            return Vec::new();
        }
        let end = offset.saturating_add(size).min(self.bytes.len());
        self.bytes[offset..end].to_vec()
    }
}

/// Node variant; each carries its own lock
#[derive(Debug)]
pub enum NodeKind {
    Directory(Mutex<Children>),
    File(Mutex<FileBuffer>),
    /// Target path literal, as given at creation
    Symlink(String),
}

/// Variant tag without the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Directory,
    File,
    Symlink,
}

/// A directory, file, or symlink in the in-memory mirror.
///
/// Nodes are owned top-down by their parent's child map; `parent` is a weak
/// back-reference used to rebuild the full path.
#[derive(Debug)]
pub struct PathNode {
    name: RwLock<String>,
    parent: RwLock<Weak<PathNode>>,
    kind: NodeKind,
}

impl PathNode {
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            name: RwLock::new(String::new()),
            parent: RwLock::new(Weak::new()),
            kind: NodeKind::Directory(Mutex::new(HashMap::new())),
        })
    }

    pub(crate) fn new(name: &str, parent: &Arc<PathNode>, node_type: NodeType, target: &str) -> Arc<Self> {
        let kind = match node_type {
            NodeType::Directory => NodeKind::Directory(Mutex::new(HashMap::new())),
            NodeType::File => NodeKind::File(Mutex::new(FileBuffer::default())),
            NodeType::Symlink => NodeKind::Symlink(target.to_string()),
        };
        Arc::new(Self {
            name: RwLock::new(name.to_string()),
            parent: RwLock::new(Arc::downgrade(parent)),
            kind,
        })
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn parent(&self) -> Option<Arc<PathNode>> {
        self.parent.read().upgrade()
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn node_type(&self) -> NodeType {
        match self.kind {
            NodeKind::Directory(_) => NodeType::Directory,
            NodeKind::File(_) => NodeType::File,
            NodeKind::Symlink(_) => NodeType::Symlink,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    /// Number of ancestors; the root is at depth zero
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent();
        while let Some(node) = current {
            depth += 1;
            current = node.parent();
        }
        depth
    }

    /// Slash-joined names from root to this node
    pub fn full_path(&self) -> String {
        let mut names = vec![self.name()];
        let mut current = self.parent();
        while let Some(node) = current {
            if node.is_root() {
                break;
            }
            names.push(node.name());
            current = node.parent();
        }
        if self.is_root() {
            return ROOT_PATH.to_string();
        }
        names
            .iter()
            .rev()
            .fold(ROOT_PATH.to_string(), |path, name| join(&path, name))
    }

    /// DHT location key for the current full path
    pub fn key(&self) -> PathKey {
        path_key(&self.full_path())
    }

    pub fn children(&self) -> Option<&Mutex<Children>> {
        match &self.kind {
            NodeKind::Directory(children) => Some(children),
            _ => None,
        }
    }

    pub fn buffer(&self) -> Option<&Mutex<FileBuffer>> {
        match &self.kind {
            NodeKind::File(buffer) => Some(buffer),
            _ => None,
        }
    }

    pub fn child(&self, name: &str) -> Option<Arc<PathNode>> {
        self.children()?.lock().get(name).cloned()
    }

    /// Whether `self` is `other` or one of its ancestors
    pub fn is_ancestor_of(self: &Arc<Self>, other: &Arc<PathNode>) -> bool {
        let mut current = Some(other.clone());
        while let Some(node) = current {
            if Arc::ptr_eq(self, &node) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    pub(crate) fn set_location(&self, name: &str, parent: &Arc<PathNode>) {
        *self.name.write() = name.to_string();
        *self.parent.write() = Arc::downgrade(parent);
    }
}
