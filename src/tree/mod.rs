//! Path Tree
//!
//! In-memory mirror of the hierarchy. Every live node is backed by a Path
//! Index entry and a Data Store entry under the key of its full path;
//! structural changes write through the persistence strategy before the
//! in-memory tree is updated.

pub mod hasher;
pub mod node;
pub mod path;

use crate::error::FsError;
use crate::persistence::{IndexEntry, Persistence};
use hasher::path_key;
use node::{Children, FileBuffer, NodeKind};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use node::{NodeType, PathNode};

/// Symlink hops followed before a path is considered dangling
const MAX_SYMLINK_HOPS: usize = 8;

/// Attributes reported to the filesystem binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    pub node_type: NodeType,
    pub size: u64,
}

pub struct PathTree {
    root: Arc<PathNode>,
    store: Arc<dyn Persistence>,
}

impl PathTree {
    pub fn new(store: Arc<dyn Persistence>) -> Self {
        Self {
            root: PathNode::root(),
            store,
        }
    }

    pub fn root(&self) -> Arc<PathNode> {
        self.root.clone()
    }

    pub fn store(&self) -> &Arc<dyn Persistence> {
        &self.store
    }

    /// Resolve a slash-delimited path; the empty path and `/` are the root
    pub fn find(&self, path: &str) -> Option<Arc<PathNode>> {
        let normalized = path::normalize(path).ok()?;
        let mut current = self.root.clone();
        for name in path::components(&normalized) {
            current = current.child(name)?;
        }
        Some(current)
    }

    /// Like [`find`](Self::find), failing with `NotFound`
    pub fn require(&self, path: &str) -> Result<Arc<PathNode>, FsError> {
        self.find(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    pub fn mkdir(&self, parent: &Arc<PathNode>, name: &str) -> Result<Arc<PathNode>, FsError> {
        self.create(parent, name, NodeType::Directory, "")
    }

    pub fn mkfile(&self, parent: &Arc<PathNode>, name: &str) -> Result<Arc<PathNode>, FsError> {
        self.create(parent, name, NodeType::File, "")
    }

    /// Create a symlink whose data is `target` and whose index entry
    /// redirects to the resolved target path
    pub fn symlink(
        &self,
        parent: &Arc<PathNode>,
        name: &str,
        target: &str,
    ) -> Result<Arc<PathNode>, FsError> {
        self.create(parent, name, NodeType::Symlink, target)
    }

    /// Create a node of any type under `parent`
    pub fn create(
        &self,
        parent: &Arc<PathNode>,
        name: &str,
        node_type: NodeType,
        target: &str,
    ) -> Result<Arc<PathNode>, FsError> {
        validate_name(name)?;
        let parent_path = parent.full_path();
        let children = parent
            .children()
            .ok_or_else(|| FsError::NotADirectory(parent_path.clone()))?;
        let mut children = children.lock();
        let full = path::join(&parent_path, name);
        if children.contains_key(name) {
            return Err(FsError::AlreadyExists(full));
        }

        let key = path_key(&full);
        let (data, entry) = match node_type {
            NodeType::Symlink => {
                let resolved = path::resolve_target(&parent_path, target);
                if resolved == full {
                    return Err(FsError::InvalidPath(format!("{} links to itself", full)));
                }
                (target.as_bytes().to_vec(), IndexEntry::redirect(&full, &resolved))
            }
            _ => (Vec::new(), IndexEntry::new(&full)),
        };
        self.store.put(&key, &data)?;
        self.store.put_entry(&key, &entry)?;

        let node = PathNode::new(name, parent, node_type, target);
        if let Some(buffer) = node.buffer() {
            buffer.lock().loaded = true;
        }
        children.insert(name.to_string(), node.clone());
        debug!(path = %full, node_type = ?node_type, "Created node");
        Ok(node)
    }

    /// Remove a node from the DHT and the tree. Directories must be empty.
    pub fn delete(&self, node: &Arc<PathNode>) -> Result<(), FsError> {
        let full = node.full_path();
        let parent = node
            .parent()
            .ok_or_else(|| FsError::InvalidPath(full.clone()))?;
        let children = parent
            .children()
            .ok_or_else(|| FsError::NotADirectory(parent.full_path()))?;
        let mut children = children.lock();
        if let Some(own) = node.children() {
            if !own.lock().is_empty() {
                return Err(FsError::NotEmpty(full));
            }
        }

        // The key depends on the parent chain, which is still intact here.
        let key = path_key(&full);
        self.store.remove_entry(&key)?;
        self.store.remove(&key)?;

        let name = node.name();
        if children.get(&name).map_or(false, |c| Arc::ptr_eq(c, node)) {
            children.remove(&name);
        }
        debug!(path = %full, "Deleted node");
        Ok(())
    }

    /// Move `node` to `new_parent/new_name`, re-keying its whole subtree.
    ///
    /// An existing destination file is replaced; an existing destination
    /// directory is an error. If re-keying fails part way, the in-memory
    /// location is rolled back but the DHT may retain entries under the old
    /// or new keys.
    pub fn rename(
        &self,
        node: &Arc<PathNode>,
        new_parent: &Arc<PathNode>,
        new_name: &str,
    ) -> Result<(), FsError> {
        validate_name(new_name)?;
        let old_path = node.full_path();
        let old_parent = node
            .parent()
            .ok_or_else(|| FsError::InvalidPath(old_path.clone()))?;
        if node.is_ancestor_of(new_parent) {
            return Err(FsError::InvalidPath(format!(
                "cannot move {} beneath itself",
                old_path
            )));
        }
        let old_children = old_parent
            .children()
            .ok_or_else(|| FsError::NotADirectory(old_parent.full_path()))?;
        let new_children = new_parent
            .children()
            .ok_or_else(|| FsError::NotADirectory(new_parent.full_path()))?;
        let old_name = node.name();

        if Arc::ptr_eq(&old_parent, new_parent) {
            let mut children = old_children.lock();
            if old_name == new_name {
                return Ok(());
            }
            self.clear_destination(&mut children, new_parent, new_name)?;
            self.rekey(node, &old_parent, &old_name, new_parent, new_name)?;
            children.remove(&old_name);
            children.insert(new_name.to_string(), node.clone());
        } else {
            // Ancestors lock before descendants, as in delete.
            let old_first = lock_rank(&old_parent) < lock_rank(new_parent);
            let (mut source, mut dest) = if old_first {
                let source = old_children.lock();
                (source, new_children.lock())
            } else {
                let dest = new_children.lock();
                (old_children.lock(), dest)
            };
            self.clear_destination(&mut dest, new_parent, new_name)?;
            self.rekey(node, &old_parent, &old_name, new_parent, new_name)?;
            source.remove(&old_name);
            dest.insert(new_name.to_string(), node.clone());
        }
        info!(from = %old_path, to = %node.full_path(), "Renamed node");
        Ok(())
    }

    /// Drop an existing destination file so a rename can replace it
    fn clear_destination(
        &self,
        children: &mut Children,
        parent: &Arc<PathNode>,
        name: &str,
    ) -> Result<(), FsError> {
        let existing = match children.get(name) {
            Some(existing) => existing.clone(),
            None => return Ok(()),
        };
        let full = path::join(&parent.full_path(), name);
        if existing.node_type() == NodeType::Directory {
            return Err(FsError::AlreadyExists(full));
        }
        let key = path_key(&full);
        self.store.remove_entry(&key)?;
        self.store.remove(&key)?;
        children.remove(name);
        Ok(())
    }

    /// Move the DHT entries of `node` and its descendants to their new keys
    fn rekey(
        &self,
        node: &Arc<PathNode>,
        old_parent: &Arc<PathNode>,
        old_name: &str,
        new_parent: &Arc<PathNode>,
        new_name: &str,
    ) -> Result<(), FsError> {
        let mut subtree = Vec::new();
        collect_subtree(node, &mut subtree);

        let mut snapshots = Vec::with_capacity(subtree.len());
        for member in &subtree {
            let key = member.key();
            let data = self.store.get(&key)?.unwrap_or_default();
            let entry = self.store.get_entry(&key)?;
            snapshots.push((member.clone(), key, data, entry));
        }
        for (_, key, _, _) in &snapshots {
            self.store.remove_entry(key)?;
            self.store.remove(key)?;
        }

        node.set_location(new_name, new_parent);
        for (member, _, data, entry) in &snapshots {
            let new_path = member.full_path();
            let new_key = path_key(&new_path);
            let new_entry = match entry {
                Some(entry) if entry.is_symlink() => IndexEntry::redirect(&new_path, &entry.resolved),
                _ => IndexEntry::new(&new_path),
            };
            let written = self
                .store
                .put(&new_key, data)
                .and_then(|_| self.store.put_entry(&new_key, &new_entry));
            if let Err(e) = written {
                node.set_location(old_name, old_parent);
                warn!(
                    path = %new_path,
                    error = %e,
                    "Rename failed part way; old entries may be left behind"
                );
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Child names of a directory
    pub fn read_dir(&self, dir: &Arc<PathNode>) -> Result<Vec<String>, FsError> {
        let children = dir
            .children()
            .ok_or_else(|| FsError::NotADirectory(dir.full_path()))?;
        let mut names: Vec<String> = children.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Target literal of a symlink
    pub fn read_link(&self, node: &Arc<PathNode>) -> Result<String, FsError> {
        match node.kind() {
            NodeKind::Symlink(target) => Ok(target.clone()),
            _ => Err(FsError::InvalidPath(format!(
                "{} is not a symlink",
                node.full_path()
            ))),
        }
    }

    /// Follow symlinks to the file they redirect to
    pub fn resolve_file(&self, node: &Arc<PathNode>) -> Result<Arc<PathNode>, FsError> {
        let mut current = node.clone();
        for _ in 0..MAX_SYMLINK_HOPS {
            match current.node_type() {
                NodeType::File => return Ok(current),
                NodeType::Directory => return Err(FsError::IsADirectory(current.full_path())),
                NodeType::Symlink => {
                    let entry = self
                        .store
                        .get_entry(&current.key())?
                        .ok_or_else(|| FsError::NotFound(current.full_path()))?;
                    current = self
                        .find(&entry.resolved)
                        .ok_or_else(|| FsError::NotFound(entry.resolved.clone()))?;
                }
            }
        }
        Err(FsError::NotFound(format!(
            "{} (too many symlink hops)",
            node.full_path()
        )))
    }

    /// Refresh a file buffer from the Data Store unless it holds unflushed bytes
    fn refresh(
        &self,
        node: &PathNode,
        buffer: &mut FileBuffer,
        missing_ok: bool,
    ) -> Result<(), FsError> {
        if buffer.dirty {
            return Ok(());
        }
        match self.store.get(&node.key())? {
            Some(bytes) => buffer.bytes = bytes,
            None if missing_ok => buffer.bytes.clear(),
            None => return Err(FsError::NotFound(node.full_path())),
        }
        buffer.loaded = true;
        Ok(())
    }

    pub fn read(&self, node: &Arc<PathNode>, offset: usize, size: usize) -> Result<Vec<u8>, FsError> {
        let file = self.resolve_file(node)?;
        let buffer = file_buffer(&file)?;
        let mut buffer = buffer.lock();
        self.refresh(&file, &mut buffer, false)?;
        Ok(buffer.slice(offset, size))
    }

    /// Apply a write and push the whole payload through the Data Store
    pub fn write(&self, node: &Arc<PathNode>, offset: usize, data: &[u8]) -> Result<usize, FsError> {
        self.mutate_through(node, |buffer| buffer.splice(offset, data))?;
        Ok(data.len())
    }

    pub fn truncate(&self, node: &Arc<PathNode>, size: usize) -> Result<(), FsError> {
        self.mutate_through(node, |buffer| buffer.truncate(size))
    }

    fn mutate_through<F>(&self, node: &Arc<PathNode>, mutate: F) -> Result<(), FsError>
    where
        F: FnOnce(&mut FileBuffer),
    {
        let file = self.resolve_file(node)?;
        let buffer = file_buffer(&file)?;
        let mut buffer = buffer.lock();
        self.refresh(&file, &mut buffer, true)?;
        mutate(&mut buffer);
        if let Err(e) = self.store.put(&file.key(), &buffer.bytes) {
            buffer.loaded = false;
            return Err(e.into());
        }
        Ok(())
    }

    /// Apply a write to the local buffer only, marking it dirty.
    ///
    /// `hand_off` receives the file path and the full payload while the
    /// buffer lock is still held, so successive payloads reach it in the
    /// order the writes were applied.
    pub fn buffer_write<H>(
        &self,
        node: &Arc<PathNode>,
        offset: usize,
        data: &[u8],
        hand_off: H,
    ) -> Result<(), FsError>
    where
        H: FnOnce(&str, &[u8]),
    {
        self.mutate_buffered(node, |buffer| buffer.splice(offset, data), hand_off)
    }

    pub fn buffer_truncate<H>(&self, node: &Arc<PathNode>, size: usize, hand_off: H) -> Result<(), FsError>
    where
        H: FnOnce(&str, &[u8]),
    {
        self.mutate_buffered(node, |buffer| buffer.truncate(size), hand_off)
    }

    fn mutate_buffered<F, H>(&self, node: &Arc<PathNode>, mutate: F, hand_off: H) -> Result<(), FsError>
    where
        F: FnOnce(&mut FileBuffer),
        H: FnOnce(&str, &[u8]),
    {
        let file = self.resolve_file(node)?;
        let buffer = file_buffer(&file)?;
        let mut buffer = buffer.lock();
        self.refresh(&file, &mut buffer, true)?;
        mutate(&mut buffer);
        buffer.dirty = true;
        hand_off(&file.full_path(), &buffer.bytes);
        Ok(())
    }

    /// Durably write flushed bytes for `path`.
    ///
    /// The buffer stays dirty if it changed again after `bytes` was taken.
    pub fn commit(&self, path: &str, bytes: &[u8]) -> Result<(), FsError> {
        let node = self.require(path)?;
        let buffer = file_buffer(&node)?;
        let mut buffer = buffer.lock();
        self.store.put(&node.key(), bytes)?;
        if buffer.bytes == bytes {
            buffer.dirty = false;
        }
        Ok(())
    }

    pub fn attr(&self, node: &Arc<PathNode>) -> Result<NodeAttr, FsError> {
        let size = match node.kind() {
            NodeKind::Directory(_) => 0,
            NodeKind::Symlink(target) => target.len() as u64,
            NodeKind::File(buffer) => {
                let mut buffer = buffer.lock();
                if !buffer.loaded {
                    self.refresh(node, &mut buffer, true)?;
                }
                buffer.bytes.len() as u64
            }
        };
        Ok(NodeAttr {
            node_type: node.node_type(),
            size,
        })
    }

    /// Every local path except the root
    pub fn all_paths(&self) -> BTreeSet<String> {
        let mut paths = BTreeSet::new();
        let mut nodes = Vec::new();
        collect_subtree(&self.root, &mut nodes);
        for node in nodes.iter().filter(|n| !n.is_root()) {
            paths.insert(node.full_path());
        }
        paths
    }

    /// Add a node to the local tree without touching the DHT.
    ///
    /// Missing intermediate directories are created locally. Used when the
    /// node already exists remotely.
    pub fn insert_local(
        &self,
        full_path: &str,
        node_type: NodeType,
        target: &str,
    ) -> Result<Arc<PathNode>, FsError> {
        let normalized = path::normalize(full_path)?;
        let names = path::components(&normalized);
        let (last, ancestors) = names
            .split_last()
            .ok_or_else(|| FsError::InvalidPath(full_path.to_string()))?;

        let mut current = self.root.clone();
        for name in ancestors {
            let children = current
                .children()
                .ok_or_else(|| FsError::NotADirectory(current.full_path()))?;
            let next = children
                .lock()
                .entry(name.to_string())
                .or_insert_with(|| PathNode::new(name, &current, NodeType::Directory, ""))
                .clone();
            current = next;
        }

        let children = current
            .children()
            .ok_or_else(|| FsError::NotADirectory(current.full_path()))?;
        let mut children = children.lock();
        if children.contains_key(*last) {
            return Err(FsError::AlreadyExists(normalized));
        }
        let node = PathNode::new(last, &current, node_type, target);
        children.insert(last.to_string(), node.clone());
        Ok(node)
    }

    /// Remove a node and its subtree from the local tree only
    pub fn detach_local(&self, full_path: &str) -> bool {
        let node = match self.find(full_path) {
            Some(node) if !node.is_root() => node,
            _ => return false,
        };
        let parent = match node.parent() {
            Some(parent) => parent,
            None => return false,
        };
        let children = match parent.children() {
            Some(children) => children,
            None => return false,
        };
        let mut children = children.lock();
        let name = node.name();
        if children.get(&name).map_or(false, |c| Arc::ptr_eq(c, &node)) {
            children.remove(&name);
            true
        } else {
            false
        }
    }
}

fn file_buffer(node: &Arc<PathNode>) -> Result<&parking_lot::Mutex<FileBuffer>, FsError> {
    node.buffer()
        .ok_or_else(|| FsError::IsADirectory(node.full_path()))
}

/// Child-map lock order: shallower first, address breaks ties
fn lock_rank(node: &Arc<PathNode>) -> (usize, usize) {
    (node.depth(), Arc::as_ptr(node) as usize)
}

fn validate_name(name: &str) -> Result<(), FsError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(FsError::InvalidPath(name.to_string()));
    }
    Ok(())
}

/// Depth-first: `node` first, then every descendant
fn collect_subtree(node: &Arc<PathNode>, out: &mut Vec<Arc<PathNode>>) {
    out.push(node.clone());
    if let Some(children) = node.children() {
        let children: Vec<Arc<PathNode>> = children.lock().values().cloned().collect();
        for child in &children {
            collect_subtree(child, out);
        }
    }
}
