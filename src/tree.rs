use indextree::{Arena, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::DirectoryCache;
use crate::error::GatewayError;
use crate::expand_state::ExpansionState;
use crate::gateway::{DirEntry, FsGateway, GatewayResult};
use crate::path::CanonicalPath;

/// Row ordering inside a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Folders first, then case-insensitive name.
    #[default]
    Name,
    /// Newest modification first; folders and files interleaved.
    Modified,
    /// Newest creation first, falling back to modification time.
    Created,
}

impl SortOrder {
    pub fn sort(&self, items: &mut [DirEntry]) {
        match self {
            SortOrder::Name => items.sort_by(|a, b| {
                b.is_dir
                    .cmp(&a.is_dir)
                    .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            }),
            SortOrder::Modified => {
                items.sort_by(|a, b| b.modified_at.unwrap_or(0).cmp(&a.modified_at.unwrap_or(0)))
            }
            SortOrder::Created => items.sort_by(|a, b| {
                let a_t = a.created_at.or(a.modified_at).unwrap_or(0);
                let b_t = b.created_at.or(b.modified_at).unwrap_or(0);
                b_t.cmp(&a_t)
            }),
        }
    }
}

/// What a rendered row shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowKind {
    /// The panel root; never rendered as a row.
    Root,
    Entry(DirEntry),
    Loading,
    Empty,
    Error(String),
}

/// A row of the flattened, currently rendered tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleRow {
    pub depth: usize,
    pub kind: RowKind,
    pub expanded: bool,
}

impl VisibleRow {
    /// Entry path when this row carries an anchor.
    pub fn anchor_path(&self) -> Option<&CanonicalPath> {
        match &self.kind {
            RowKind::Entry(entry) => Some(&entry.path),
            _ => None,
        }
    }
}

/// Tree Presenter: one panel's accordion of folder listings.
///
/// Every rendered entry row owns an anchor, addressable by its path. Rows live
/// in an arena; collapsing a folder drops its whole subtree, and with it the
/// anchors inside.
pub struct PanelTree {
    root_path: CanonicalPath,
    arena: Arena<RowKind>,
    root: NodeId,
    path_to_node: HashMap<CanonicalPath, NodeId>,
    expansion: ExpansionState,
    sort: SortOrder,
}

impl PanelTree {
    pub fn new(root_path: CanonicalPath, sort: SortOrder) -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(RowKind::Root);
        let mut path_to_node = HashMap::new();
        path_to_node.insert(root_path.clone(), root);
        Self {
            root_path,
            arena,
            root,
            path_to_node,
            expansion: ExpansionState::default(),
            sort,
        }
    }

    pub fn root_path(&self) -> &CanonicalPath {
        &self.root_path
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort
    }

    /// True while a row for `path` is rendered (its anchor is live).
    pub fn contains(&self, path: &CanonicalPath) -> bool {
        path != &self.root_path && self.path_to_node.contains_key(path)
    }

    pub fn is_expanded(&self, path: &CanonicalPath) -> bool {
        self.expansion.is_expanded(path)
    }

    pub fn entry(&self, path: &CanonicalPath) -> Option<&DirEntry> {
        let node = self.path_to_node.get(path)?;
        match self.arena.get(*node)?.get() {
            RowKind::Entry(entry) => Some(entry),
            _ => None,
        }
    }

    fn is_folder_row(&self, path: &CanonicalPath) -> bool {
        path == &self.root_path || self.entry(path).map(|e| e.is_dir).unwrap_or(false)
    }

    /// Remove every row below `node`, returning the anchor paths that died.
    fn clear_children(&mut self, node: NodeId) -> Vec<CanonicalPath> {
        let children: Vec<NodeId> = node.children(&self.arena).collect();
        let mut removed = Vec::new();
        for child in children {
            for descendant in child.descendants(&self.arena) {
                if let Some(RowKind::Entry(entry)) = self.arena.get(descendant).map(|n| n.get()) {
                    removed.push(entry.path.clone());
                }
            }
            child.remove_subtree(&mut self.arena);
        }
        for path in &removed {
            self.path_to_node.remove(path);
        }
        removed
    }

    /// Mark `folder` expanded and show a loading row until its listing lands.
    /// Returns false when the folder has no rendered row.
    pub fn begin_expand(&mut self, folder: &CanonicalPath) -> bool {
        let Some(&node) = self.path_to_node.get(folder) else {
            return false;
        };
        if !self.is_folder_row(folder) {
            return false;
        }
        self.expansion.expand(folder);
        if node.children(&self.arena).next().is_none() {
            let loading = self.arena.new_node(RowKind::Loading);
            node.append(loading, &mut self.arena);
        }
        true
    }

    /// Replace the rendered children of `folder` with a listing result.
    ///
    /// Listings for folders that were collapsed (or whose row vanished) while
    /// the fetch was in flight are dropped. Returns the anchor paths removed by
    /// the replacement.
    pub fn apply_listing(
        &mut self,
        folder: &CanonicalPath,
        listing: Result<Arc<Vec<DirEntry>>, &GatewayError>,
    ) -> Vec<CanonicalPath> {
        let Some(&node) = self.path_to_node.get(folder) else {
            tracing::debug!(%folder, "listing arrived for a row that is gone");
            return Vec::new();
        };
        if folder != &self.root_path && !self.expansion.is_expanded(folder) {
            tracing::debug!(%folder, "listing arrived for a collapsed folder");
            return Vec::new();
        }

        let removed = self.clear_children(node);
        match listing {
            Ok(children) if children.is_empty() => {
                let empty = self.arena.new_node(RowKind::Empty);
                node.append(empty, &mut self.arena);
            }
            Ok(children) => {
                let mut sorted: Vec<DirEntry> = children.iter().cloned().collect();
                self.sort.sort(&mut sorted);
                for entry in sorted {
                    let path = entry.path.clone();
                    let child = self.arena.new_node(RowKind::Entry(entry));
                    node.append(child, &mut self.arena);
                    self.path_to_node.insert(path, child);
                }
            }
            Err(err) => {
                tracing::warn!(%folder, %err, "folder listing failed");
                let row = self.arena.new_node(RowKind::Error(format!("Failed to load folder: {err}")));
                node.append(row, &mut self.arena);
            }
        }
        // Expansion of vanished folders is forgotten; survivors are re-fetched by refresh.
        let gone: Vec<CanonicalPath> = self
            .expansion
            .expanded_below(folder)
            .into_iter()
            .filter(|p| !self.path_to_node.contains_key(p))
            .collect();
        for path in gone {
            self.expansion.forget(&path);
        }
        removed
    }

    /// Fetch `folder` through the cache and render it inline.
    pub async fn expand<G: FsGateway>(
        &mut self,
        folder: &CanonicalPath,
        cache: &DirectoryCache,
        gateway: &G,
    ) -> bool {
        if !self.begin_expand(folder) {
            return false;
        }
        let listing = cache.list(gateway, folder).await;
        self.apply_listing(folder, listing.as_ref().map(Arc::clone));
        true
    }

    /// Drop the nested list under `folder`. Returns the anchor paths destroyed.
    pub fn collapse(&mut self, folder: &CanonicalPath) -> Vec<CanonicalPath> {
        if folder == &self.root_path {
            return Vec::new();
        }
        self.expansion.collapse_recursive(folder);
        match self.path_to_node.get(folder) {
            Some(&node) => self.clear_children(node),
            None => Vec::new(),
        }
    }

    /// Folders to fetch to rebuild `folder` in place: the folder itself, then
    /// its expanded descendants, parents first. `None` when `folder` is not an
    /// expanded (or root) row.
    pub fn refresh_plan(&self, folder: &CanonicalPath) -> Option<Vec<CanonicalPath>> {
        if !self.path_to_node.contains_key(folder) {
            return None;
        }
        if folder != &self.root_path && !self.expansion.is_expanded(folder) {
            return None;
        }
        let mut plan = vec![folder.clone()];
        plan.extend(self.expansion.expanded_below(folder));
        Some(plan)
    }

    /// Apply listings fetched for a [`PanelTree::refresh_plan`], re-expanding
    /// descendants whose rows survived. Returns the anchor paths that are gone.
    pub fn apply_refresh(&mut self, listings: &[(CanonicalPath, GatewayResult<Arc<Vec<DirEntry>>>)]) -> Vec<CanonicalPath> {
        let mut removed = Vec::new();
        let mut iter = listings.iter();
        if let Some((folder, listing)) = iter.next() {
            removed.extend(self.apply_listing(folder, listing.as_ref().map(Arc::clone)));
        }
        for (path, listing) in iter {
            if !self.is_folder_row(path) {
                self.expansion.forget(path);
                continue;
            }
            self.expansion.expand(path);
            removed.extend(self.apply_listing(path, listing.as_ref().map(Arc::clone)));
        }
        // Paths that came back after the rebuild still have a live anchor.
        removed.retain(|p| !self.contains(p));
        removed
    }

    /// Re-fetch an already rendered folder (or the root) and rebuild it in
    /// place, preserving expansion of descendants that still exist.
    pub async fn refresh<G: FsGateway>(
        &mut self,
        folder: &CanonicalPath,
        cache: &DirectoryCache,
        gateway: &G,
    ) -> Vec<CanonicalPath> {
        let Some(plan) = self.refresh_plan(folder) else {
            return Vec::new();
        };
        let listings = fetch_listings(&plan, cache, gateway).await;
        self.apply_refresh(&listings)
    }

    /// Reorder every rendered sibling list.
    pub fn set_sort(&mut self, sort: SortOrder) {
        self.sort = sort;
        let parents: Vec<NodeId> = self.root.descendants(&self.arena).collect();
        for parent in parents {
            let children: Vec<NodeId> = parent.children(&self.arena).collect();
            let mut entries: Vec<(NodeId, DirEntry)> = children
                .iter()
                .filter_map(|&c| match self.arena.get(c).map(|n| n.get()) {
                    Some(RowKind::Entry(e)) => Some((c, e.clone())),
                    _ => None,
                })
                .collect();
            if entries.len() < 2 {
                continue;
            }
            let mut sorted: Vec<DirEntry> = entries.iter().map(|(_, e)| e.clone()).collect();
            sort.sort(&mut sorted);
            for entry in sorted {
                if let Some(idx) = entries.iter().position(|(_, e)| e.path == entry.path) {
                    let (node, _) = entries.remove(idx);
                    node.detach(&mut self.arena);
                    parent.append(node, &mut self.arena);
                }
            }
        }
    }

    /// Pre-order list of rendered rows, root excluded.
    pub fn visible_rows(&self) -> Vec<VisibleRow> {
        let mut rows = Vec::new();
        self.collect_rows(self.root, 0, &mut rows);
        rows
    }

    fn collect_rows(&self, node: NodeId, depth: usize, rows: &mut Vec<VisibleRow>) {
        for child in node.children(&self.arena) {
            let Some(kind) = self.arena.get(child).map(|n| n.get().clone()) else {
                continue;
            };
            let expanded = match &kind {
                RowKind::Entry(entry) => entry.is_dir && self.expansion.is_expanded(&entry.path),
                _ => false,
            };
            rows.push(VisibleRow {
                depth,
                kind,
                expanded,
            });
            self.collect_rows(child, depth + 1, rows);
        }
    }
}

/// Fetch several folders through the cache, one after another.
pub async fn fetch_listings<G: FsGateway>(
    folders: &[CanonicalPath],
    cache: &DirectoryCache,
    gateway: &G,
) -> Vec<(CanonicalPath, GatewayResult<Arc<Vec<DirEntry>>>)> {
    let mut out = Vec::with_capacity(folders.len());
    for folder in folders {
        out.push((folder.clone(), cache.list(gateway, folder).await));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::GatewayOp;
    use crate::gateway::MemoryGateway;

    fn p(s: &str) -> CanonicalPath {
        CanonicalPath::new(s)
    }

    async fn loaded(gw: &MemoryGateway, root: &str) -> (PanelTree, DirectoryCache) {
        let cache = DirectoryCache::new();
        let mut tree = PanelTree::new(p(root), SortOrder::Name);
        tree.refresh(&p(root), &cache, gw).await;
        (tree, cache)
    }

    fn labels(tree: &PanelTree) -> Vec<String> {
        tree.visible_rows()
            .iter()
            .map(|r| match &r.kind {
                RowKind::Entry(e) => format!("{}{}", "  ".repeat(r.depth), e.name),
                RowKind::Empty => format!("{}(empty)", "  ".repeat(r.depth)),
                RowKind::Error(_) => format!("{}(error)", "  ".repeat(r.depth)),
                RowKind::Loading => format!("{}(loading)", "  ".repeat(r.depth)),
                RowKind::Root => String::from("root"),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_expand_renders_inline_accordion() {
        let gw = MemoryGateway::with_entries(["/src/a.txt", "/src/sub/inner.txt", "/src/sub/deeper/"]);
        let (mut tree, cache) = loaded(&gw, "/src").await;
        assert_eq!(labels(&tree), vec!["sub", "a.txt"]);

        assert!(tree.expand(&p("/src/sub"), &cache, &gw).await);
        assert_eq!(labels(&tree), vec!["sub", "  deeper", "  inner.txt", "a.txt"]);
        assert!(tree.contains(&p("/src/sub/inner.txt")));
        assert!(tree.contains(&p("/src/sub")));
    }

    #[tokio::test]
    async fn test_collapse_destroys_descendant_anchors() {
        let gw = MemoryGateway::with_entries(["/src/sub/deeper/x.txt"]);
        let (mut tree, cache) = loaded(&gw, "/src").await;
        tree.expand(&p("/src/sub"), &cache, &gw).await;
        tree.expand(&p("/src/sub/deeper"), &cache, &gw).await;

        let removed = tree.collapse(&p("/src/sub"));
        assert!(removed.contains(&p("/src/sub/deeper")));
        assert!(removed.contains(&p("/src/sub/deeper/x.txt")));
        assert!(!tree.contains(&p("/src/sub/deeper/x.txt")));
        assert!(tree.contains(&p("/src/sub")));
        assert!(!tree.is_expanded(&p("/src/sub/deeper")));
    }

    #[tokio::test]
    async fn test_failed_fetch_renders_error_row() {
        let gw = MemoryGateway::with_entries(["/src/sub/x.txt"]);
        let (mut tree, cache) = loaded(&gw, "/src").await;
        gw.fail(GatewayOp::ListChildren, "/src/sub");

        assert!(tree.expand(&p("/src/sub"), &cache, &gw).await);
        assert_eq!(labels(&tree), vec!["sub", "  (error)"]);
    }

    #[tokio::test]
    async fn test_empty_folder_row() {
        let gw = MemoryGateway::with_entries(["/src/void/"]);
        let (mut tree, cache) = loaded(&gw, "/src").await;
        tree.expand(&p("/src/void"), &cache, &gw).await;
        assert_eq!(labels(&tree), vec!["void", "  (empty)"]);
    }

    #[tokio::test]
    async fn test_listing_for_collapsed_folder_is_dropped() {
        let gw = MemoryGateway::with_entries(["/src/sub/x.txt"]);
        let (mut tree, cache) = loaded(&gw, "/src").await;
        assert!(tree.begin_expand(&p("/src/sub")));
        assert_eq!(labels(&tree), vec!["sub", "  (loading)"]);
        tree.collapse(&p("/src/sub"));

        let listing = cache.list(&gw, &p("/src/sub")).await;
        tree.apply_listing(&p("/src/sub"), listing.as_ref().map(Arc::clone));
        assert_eq!(labels(&tree), vec!["sub"]);
    }

    #[tokio::test]
    async fn test_refresh_preserves_surviving_expansion() {
        let gw = MemoryGateway::with_entries(["/src/keep/k.txt", "/src/drop/d.txt"]);
        let (mut tree, cache) = loaded(&gw, "/src").await;
        tree.expand(&p("/src/keep"), &cache, &gw).await;
        tree.expand(&p("/src/drop"), &cache, &gw).await;

        gw.delete_item(&p("/src/drop")).await.unwrap();
        gw.add_file("/src/keep/new.txt", 1);
        cache.invalidate(&p("/src"));
        cache.invalidate(&p("/src/keep"));

        let removed = tree.refresh(&p("/src"), &cache, &gw).await;
        assert_eq!(labels(&tree), vec!["keep", "  k.txt", "  new.txt"]);
        assert!(removed.contains(&p("/src/drop")));
        assert!(!removed.contains(&p("/src/keep/k.txt")));
        assert!(!tree.is_expanded(&p("/src/drop")));
    }

    #[tokio::test]
    async fn test_set_sort_reorders_rows() {
        let gw = MemoryGateway::new();
        gw.add_file("/src/old.txt", 1);
        gw.add_folder("/src/folder");
        gw.add_file("/src/new.txt", 1);
        let (mut tree, _cache) = loaded(&gw, "/src").await;
        assert_eq!(labels(&tree), vec!["folder", "new.txt", "old.txt"]);

        tree.set_sort(SortOrder::Modified);
        assert_eq!(labels(&tree), vec!["new.txt", "folder", "old.txt"]);
    }

    #[tokio::test]
    async fn test_files_cannot_expand() {
        let gw = MemoryGateway::with_entries(["/src/a.txt"]);
        let (mut tree, cache) = loaded(&gw, "/src").await;
        assert!(!tree.expand(&p("/src/a.txt"), &cache, &gw).await);
        assert!(!tree.expand(&p("/src/missing"), &cache, &gw).await);
    }
}
