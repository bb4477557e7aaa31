use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{DirEntry, FileInfo, FsGateway, GatewayResult};
use crate::error::GatewayError;
use crate::path::CanonicalPath;

/// Gateway operation, used for the call log and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    ListChildren,
    IsDirectory,
    FileInfo,
    CreateFolder,
    CreateFile,
    DeleteItem,
    RenameItem,
    MoveFile,
    CopyFile,
    MoveFolder,
    CopyFolder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MemNode {
    is_dir: bool,
    size: u64,
    modified_at: u64,
}

#[derive(Default)]
struct MemState {
    nodes: BTreeMap<CanonicalPath, MemNode>,
    failures: HashSet<(GatewayOp, CanonicalPath)>,
    calls: Vec<(GatewayOp, CanonicalPath)>,
    clock: u64,
}

impl MemState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn record(&mut self, op: GatewayOp, path: &CanonicalPath) -> GatewayResult<()> {
        self.calls.push((op, path.clone()));
        if self.failures.contains(&(op, path.clone())) {
            return Err(GatewayError::Injected(path.clone()));
        }
        Ok(())
    }

    fn node(&self, path: &CanonicalPath) -> GatewayResult<MemNode> {
        self.nodes
            .get(path)
            .copied()
            .ok_or_else(|| GatewayError::NotFound(path.clone()))
    }

    fn folder(&self, path: &CanonicalPath) -> GatewayResult<()> {
        if self.node(path)?.is_dir {
            Ok(())
        } else {
            Err(GatewayError::NotADirectory(path.clone()))
        }
    }

    fn subtree(&self, root: &CanonicalPath) -> Vec<(CanonicalPath, MemNode)> {
        self.nodes
            .iter()
            .filter(|(p, _)| p.is_same_or_descendant_of(root))
            .map(|(p, n)| (p.clone(), *n))
            .collect()
    }

    fn remove_subtree(&mut self, root: &CanonicalPath) {
        self.nodes.retain(|p, _| !p.is_same_or_descendant_of(root));
    }

    fn insert_new(&mut self, path: CanonicalPath, is_dir: bool) -> GatewayResult<CanonicalPath> {
        if self.nodes.contains_key(&path) {
            return Err(GatewayError::AlreadyExists(path));
        }
        let modified_at = self.tick();
        self.nodes.insert(
            path.clone(),
            MemNode {
                is_dir,
                size: 0,
                modified_at,
            },
        );
        Ok(path)
    }

    /// Copy (and optionally remove) `src` into `dest_folder`; the shared body of
    /// the four transfer operations.
    fn transfer(
        &mut self,
        op: GatewayOp,
        src: &CanonicalPath,
        dest_folder: &CanonicalPath,
        want_dir: bool,
        remove_source: bool,
    ) -> GatewayResult<CanonicalPath> {
        self.record(op, src)?;
        let node = self.node(src)?;
        if node.is_dir != want_dir {
            return Err(if want_dir {
                GatewayError::NotADirectory(src.clone())
            } else {
                GatewayError::InvalidPath(src.to_string())
            });
        }
        self.folder(dest_folder)?;
        let target = dest_folder.join(src.basename());
        if target.is_same_or_descendant_of(src) {
            return Err(GatewayError::InvalidPath(target.to_string()));
        }

        let moved = self.subtree(src);
        if remove_source {
            self.remove_subtree(src);
        }
        let stamp = self.tick();
        let prefix_len = src.as_str().len();
        for (path, mut node) in moved {
            let rebased = CanonicalPath::new(format!("{}{}", target.as_str(), &path.as_str()[prefix_len..]));
            node.modified_at = stamp;
            self.nodes.insert(rebased, node);
        }
        Ok(target)
    }
}

/// In-memory filesystem with per-operation failure injection and a call log.
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<MemState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of paths; a trailing `/` marks a folder. Missing
    /// ancestors are created as folders.
    pub fn with_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let gateway = Self::new();
        for raw in entries {
            let raw = raw.as_ref();
            if raw.ends_with('/') || raw.ends_with('\\') {
                gateway.add_folder(raw);
            } else {
                gateway.add_file(raw, raw.len() as u64);
            }
        }
        gateway
    }

    fn state(&self) -> MutexGuard<'_, MemState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_ancestors(state: &mut MemState, path: &CanonicalPath) {
        let mut current = path.parent();
        while let Some(p) = current {
            state.nodes.entry(p.clone()).or_insert(MemNode {
                is_dir: true,
                size: 0,
                modified_at: 0,
            });
            current = p.parent();
        }
    }

    pub fn add_folder(&self, path: impl AsRef<str>) {
        let path = CanonicalPath::new(path);
        let mut state = self.state();
        Self::ensure_ancestors(&mut state, &path);
        let stamp = state.tick();
        state.nodes.insert(
            path,
            MemNode {
                is_dir: true,
                size: 0,
                modified_at: stamp,
            },
        );
    }

    pub fn add_file(&self, path: impl AsRef<str>, size: u64) {
        let path = CanonicalPath::new(path);
        let mut state = self.state();
        Self::ensure_ancestors(&mut state, &path);
        let stamp = state.tick();
        state.nodes.insert(
            path,
            MemNode {
                is_dir: false,
                size,
                modified_at: stamp,
            },
        );
    }

    /// Make every future `op` whose primary path is `path` fail.
    pub fn fail(&self, op: GatewayOp, path: impl AsRef<str>) {
        self.state().failures.insert((op, CanonicalPath::new(path)));
    }

    pub fn heal(&self, op: GatewayOp, path: impl AsRef<str>) {
        self.state().failures.remove(&(op, CanonicalPath::new(path)));
    }

    pub fn exists(&self, path: impl AsRef<str>) -> bool {
        self.state().nodes.contains_key(&CanonicalPath::new(path))
    }

    pub fn calls(&self) -> Vec<(GatewayOp, CanonicalPath)> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, op: GatewayOp) -> usize {
        self.state().calls.iter().filter(|(o, _)| *o == op).count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

impl FsGateway for MemoryGateway {
    async fn list_children(&self, path: &CanonicalPath) -> GatewayResult<Vec<DirEntry>> {
        let mut state = self.state();
        state.record(GatewayOp::ListChildren, path)?;
        state.folder(path)?;
        let mut items: Vec<DirEntry> = state
            .nodes
            .iter()
            .filter(|(p, _)| p.parent().as_ref() == Some(path))
            .map(|(p, n)| DirEntry {
                name: p.basename().to_string(),
                path: p.clone(),
                is_dir: n.is_dir,
                size: (!n.is_dir).then_some(n.size),
                created_at: Some(n.modified_at),
                modified_at: Some(n.modified_at),
            })
            .collect();
        items.sort_by(|a, b| {
            b.is_dir
                .cmp(&a.is_dir)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        Ok(items)
    }

    async fn is_directory(&self, path: &CanonicalPath) -> GatewayResult<bool> {
        let mut state = self.state();
        state.record(GatewayOp::IsDirectory, path)?;
        Ok(state.node(path)?.is_dir)
    }

    async fn file_info(&self, path: &CanonicalPath) -> GatewayResult<FileInfo> {
        let mut state = self.state();
        state.record(GatewayOp::FileInfo, path)?;
        let node = state.node(path)?;
        let size = if node.is_dir {
            state
                .subtree(path)
                .iter()
                .filter(|(_, n)| !n.is_dir)
                .map(|(_, n)| n.size)
                .sum()
        } else {
            node.size
        };
        Ok(FileInfo {
            name: path.basename().to_string(),
            path: path.clone(),
            is_dir: node.is_dir,
            size,
            created_at: Some(node.modified_at),
            modified_at: Some(node.modified_at),
        })
    }

    async fn create_folder(&self, parent: &CanonicalPath, name: &str) -> GatewayResult<CanonicalPath> {
        let mut state = self.state();
        state.record(GatewayOp::CreateFolder, parent)?;
        state.folder(parent)?;
        state.insert_new(parent.join(name), true)
    }

    async fn create_file(&self, parent: &CanonicalPath, name: &str) -> GatewayResult<CanonicalPath> {
        let mut state = self.state();
        state.record(GatewayOp::CreateFile, parent)?;
        state.folder(parent)?;
        state.insert_new(parent.join(name), false)
    }

    async fn delete_item(&self, path: &CanonicalPath) -> GatewayResult<()> {
        let mut state = self.state();
        state.record(GatewayOp::DeleteItem, path)?;
        state.node(path)?;
        state.remove_subtree(path);
        Ok(())
    }

    async fn rename_item(&self, path: &CanonicalPath, new_name: &str) -> GatewayResult<CanonicalPath> {
        let mut state = self.state();
        state.record(GatewayOp::RenameItem, path)?;
        if new_name.is_empty() || new_name.contains(['/', '\\']) {
            return Err(GatewayError::InvalidPath(new_name.to_string()));
        }
        state.node(path)?;
        let parent = path
            .parent()
            .ok_or_else(|| GatewayError::InvalidPath(path.to_string()))?;
        let target = parent.join(new_name);
        if state.nodes.contains_key(&target) {
            return Err(GatewayError::AlreadyExists(target));
        }
        let moved = state.subtree(path);
        state.remove_subtree(path);
        let prefix_len = path.as_str().len();
        for (p, n) in moved {
            let rebased = CanonicalPath::new(format!("{}{}", target.as_str(), &p.as_str()[prefix_len..]));
            state.nodes.insert(rebased, n);
        }
        Ok(target)
    }

    async fn move_file(&self, src: &CanonicalPath, dest_folder: &CanonicalPath) -> GatewayResult<CanonicalPath> {
        self.state().transfer(GatewayOp::MoveFile, src, dest_folder, false, true)
    }

    async fn copy_file(&self, src: &CanonicalPath, dest_folder: &CanonicalPath) -> GatewayResult<CanonicalPath> {
        self.state().transfer(GatewayOp::CopyFile, src, dest_folder, false, false)
    }

    async fn move_folder(&self, src: &CanonicalPath, dest_folder: &CanonicalPath) -> GatewayResult<CanonicalPath> {
        self.state().transfer(GatewayOp::MoveFolder, src, dest_folder, true, true)
    }

    async fn copy_folder(&self, src: &CanonicalPath, dest_folder: &CanonicalPath) -> GatewayResult<CanonicalPath> {
        self.state().transfer(GatewayOp::CopyFolder, src, dest_folder, true, false)
    }
}
