//! The canvas session: panels, connections and the reconciliation that
//! follows every filesystem mutation.
//!
//! Operations that need the gateway come in two shapes. The `async fn`s run
//! start to finish and are what tests and headless callers use. The GUI
//! cannot block its frame, so it calls the synchronous halves instead
//! (`begin_*` or a `*_plan` before a background fetch, `apply_*`/`finish_*` after)
//! and the workspace is only ever mutated on the UI thread.

use glam::Vec2;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::cache::DirectoryCache;
use crate::canvas::InfiniteCanvas;
use crate::config::Settings;
use crate::gateway::{is_directory_or_false, DirEntry, FileInfo, FsGateway, GatewayResult, TransferMode};
use crate::geometry::{recompute_all_geometry, Scene};
use crate::graph::{AnchorRef, ConnectionGraph, DropToken, Edge, EdgeId, SummaryKey};
use crate::notice::NoticeQueue;
use crate::panel::{PanelId, PanelRole, PanelSet};
use crate::path::CanonicalPath;
use crate::transfer::{TransferExecutor, TransferHistory, TransferReport};
use crate::tree::{fetch_listings, SortOrder};

pub type Listing = GatewayResult<Arc<Vec<DirEntry>>>;

/// Folders to re-fetch for one panel, parents first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPlan {
    pub panel: PanelId,
    pub folders: Vec<CanonicalPath>,
}

impl RefreshPlan {
    pub async fn fetch<G: FsGateway>(&self, cache: &DirectoryCache, gateway: &G) -> Vec<(CanonicalPath, Listing)> {
        fetch_listings(&self.folders, cache, gateway).await
    }
}

/// A create/delete/rename issued from a panel row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOp {
    CreateFolder { parent: CanonicalPath, name: String },
    CreateFile { parent: CanonicalPath, name: String },
    Delete { path: CanonicalPath },
    Rename { path: CanonicalPath, new_name: String },
}

impl ItemOp {
    /// The gateway call. Returns the created or renamed path, if any.
    pub async fn run<G: FsGateway>(&self, gateway: &G) -> GatewayResult<Option<CanonicalPath>> {
        match self {
            ItemOp::CreateFolder { parent, name } => gateway.create_folder(parent, name).await.map(Some),
            ItemOp::CreateFile { parent, name } => gateway.create_file(parent, name).await.map(Some),
            ItemOp::Delete { path } => gateway.delete_item(path).await.map(|_| None),
            ItemOp::Rename { path, new_name } => gateway.rename_item(path, new_name).await.map(Some),
        }
    }

    /// Folder whose listing the operation changes.
    pub fn parent(&self) -> Option<CanonicalPath> {
        match self {
            ItemOp::CreateFolder { parent, .. } | ItemOp::CreateFile { parent, .. } => Some(parent.clone()),
            ItemOp::Delete { path } | ItemOp::Rename { path, .. } => path.parent(),
        }
    }

    fn describe(&self, result: Option<&CanonicalPath>) -> String {
        match (self, result) {
            (ItemOp::CreateFolder { name, .. }, _) => format!("Created folder {name}"),
            (ItemOp::CreateFile { name, .. }, _) => format!("Created file {name}"),
            (ItemOp::Delete { path }, _) => format!("Deleted {}", path.basename()),
            (ItemOp::Rename { path, .. }, Some(new_path)) => {
                format!("Renamed {} to {}", path.basename(), new_path.basename())
            }
            (ItemOp::Rename { path, new_name }, None) => format!("Renamed {} to {new_name}", path.basename()),
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            ItemOp::CreateFolder { .. } => "create folder",
            ItemOp::CreateFile { .. } => "create file",
            ItemOp::Delete { .. } => "delete",
            ItemOp::Rename { .. } => "rename",
        }
    }
}

pub struct Workspace<G: FsGateway> {
    gateway: Arc<G>,
    cache: DirectoryCache,
    pub panels: PanelSet,
    pub graph: ConnectionGraph,
    pub history: TransferHistory,
    pub canvas: InfiniteCanvas,
    pub notices: NoticeQueue,
    show_all: bool,
    panel_size: Vec2,
}

impl<G: FsGateway> Workspace<G> {
    pub fn new(gateway: Arc<G>, settings: &Settings) -> Self {
        Self {
            gateway,
            cache: DirectoryCache::new(),
            panels: PanelSet::new(),
            graph: ConnectionGraph::new(),
            history: TransferHistory::default(),
            canvas: InfiniteCanvas::new(1280.0, 800.0),
            notices: NoticeQueue::new(),
            show_all: settings.show_all_connections,
            panel_size: Vec2::new(settings.panel_width, settings.panel_height),
        }
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn cache(&self) -> &DirectoryCache {
        &self.cache
    }

    pub fn show_all(&self) -> bool {
        self.show_all
    }

    pub fn scene(&self) -> Scene {
        recompute_all_geometry(&self.graph, &self.panels, &self.canvas, &self.history, self.show_all)
    }

    // --- panels ---

    /// World position for the next panel: right of the rightmost one.
    pub fn next_panel_position(&self) -> Vec2 {
        let right = self
            .panels
            .iter()
            .map(|p| p.position.x + p.size.x)
            .fold(f32::NEG_INFINITY, f32::max);
        if right.is_finite() {
            Vec2::new(right + 40.0, 40.0)
        } else {
            Vec2::new(40.0, 40.0)
        }
    }

    /// Add an unloaded panel and return the plan that fills it.
    pub fn add_panel(&mut self, root: CanonicalPath, role: PanelRole, position: Option<Vec2>) -> (PanelId, RefreshPlan) {
        let position = position.unwrap_or_else(|| self.next_panel_position());
        let id = self.panels.add(root.clone(), role, position, self.panel_size);
        tracing::info!(panel = %id, %root, role = role.title(), "panel opened");
        let plan = RefreshPlan {
            panel: id,
            folders: vec![root],
        };
        (id, plan)
    }

    pub async fn open_panel(&mut self, root: CanonicalPath, role: PanelRole, position: Option<Vec2>) -> PanelId {
        let (id, plan) = self.add_panel(root, role, position);
        self.run_refresh(vec![plan]).await;
        id
    }

    /// Close a panel, deleting every edge with an endpoint in it.
    pub fn close_panel(&mut self, id: PanelId) -> bool {
        if self.panels.remove(id).is_none() {
            return false;
        }
        let removed = self.graph.remove_panel(id);
        tracing::info!(panel = %id, edges = removed.len(), "panel closed");
        true
    }

    /// Collapse or restore a panel body. Collapsing cancels a gesture that
    /// started inside it.
    pub fn toggle_panel_collapsed(&mut self, id: PanelId) -> bool {
        let Some(panel) = self.panels.get_mut(id) else {
            return false;
        };
        panel.collapsed = !panel.collapsed;
        let collapsed = panel.collapsed;
        if collapsed && self.graph.pending().is_some_and(|p| p.from.panel == id) {
            self.graph.cancel_pending();
        }
        collapsed
    }

    pub fn move_panel(&mut self, id: PanelId, delta: Vec2) {
        if let Some(panel) = self.panels.get_mut(id) {
            panel.move_by(delta);
        }
    }

    pub fn resize_panel(&mut self, id: PanelId, size: Vec2) {
        if let Some(panel) = self.panels.get_mut(id) {
            panel.resize_to(size);
        }
    }

    /// Scroll a panel's tree. Any scroll cancels the pending gesture.
    pub fn scroll_panel(&mut self, id: PanelId, delta: f32) -> bool {
        let Some(panel) = self.panels.get_mut(id) else {
            return false;
        };
        let moved = panel.scroll_by(delta);
        if moved && self.graph.cancel_pending() {
            tracing::debug!(panel = %id, "scroll cancelled the pending gesture");
        }
        moved
    }

    pub fn set_sort(&mut self, id: PanelId, sort: SortOrder) {
        if let Some(panel) = self.panels.get_mut(id) {
            panel.set_sort(sort);
        }
    }

    pub fn focus_panel(&mut self, id: PanelId) {
        self.panels.bring_to_front(id);
    }

    pub fn resize_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.canvas.update_viewport(x, y, width, height);
    }

    // --- tree ---

    /// Show the loading row for `folder`. False when it cannot expand.
    pub fn begin_expand(&mut self, id: PanelId, folder: &CanonicalPath) -> bool {
        self.panels
            .get_mut(id)
            .is_some_and(|panel| panel.begin_expand(folder))
    }

    pub fn apply_listing(&mut self, id: PanelId, folder: &CanonicalPath, listing: Listing) {
        if let Some(panel) = self.panels.get_mut(id) {
            panel.apply_listing(folder, listing.as_ref().map(Arc::clone));
        }
        self.drop_dead_pending();
    }

    pub async fn expand(&mut self, id: PanelId, folder: &CanonicalPath) -> bool {
        if !self.begin_expand(id, folder) {
            return false;
        }
        let listing = self.cache.list(self.gateway.as_ref(), folder).await;
        self.apply_listing(id, folder, listing);
        true
    }

    /// Collapse `folder`. Edges into it are hidden, not deleted; a gesture
    /// whose source disappears is cancelled.
    pub fn collapse(&mut self, id: PanelId, folder: &CanonicalPath) -> Vec<CanonicalPath> {
        let Some(panel) = self.panels.get_mut(id) else {
            return Vec::new();
        };
        let removed = panel.collapse(folder);
        self.graph.cancel_pending_under(id, folder);
        removed
    }

    pub fn is_expanded(&self, id: PanelId, folder: &CanonicalPath) -> bool {
        self.panels
            .get(id)
            .is_some_and(|panel| panel.tree().is_expanded(folder))
    }

    /// Re-fetch plans for every panel whose root is, or contains, one of `paths`.
    pub fn refresh_plans<'a>(&self, paths: impl IntoIterator<Item = &'a CanonicalPath>) -> Vec<RefreshPlan> {
        let mut ids = BTreeSet::new();
        for path in paths {
            ids.extend(self.panels.showing(path));
        }
        ids.into_iter()
            .filter_map(|id| {
                let panel = self.panels.get(id)?;
                let folders = panel.refresh_plan(panel.root_path())?;
                Some(RefreshPlan { panel: id, folders })
            })
            .collect()
    }

    pub fn apply_refresh(&mut self, id: PanelId, listings: &[(CanonicalPath, Listing)]) {
        if let Some(panel) = self.panels.get_mut(id) {
            panel.apply_refresh(listings);
        }
        self.drop_dead_pending();
    }

    pub async fn run_refresh(&mut self, plans: Vec<RefreshPlan>) {
        for plan in plans {
            let listings = plan.fetch(&self.cache, self.gateway.as_ref()).await;
            self.apply_refresh(plan.panel, &listings);
        }
    }

    /// A gesture whose source row was re-rendered away cannot complete.
    fn drop_dead_pending(&mut self) {
        let dead = self.graph.pending().is_some_and(|pending| {
            self.panels
                .get(pending.from.panel)
                .map_or(true, |panel| !panel.has_anchor(&pending.from.path))
        });
        if dead {
            tracing::debug!("pending gesture source is gone");
            self.graph.cancel_pending();
        }
    }

    // --- connections ---

    pub fn begin_edge(&mut self, from: AnchorRef, pointer: Vec2) -> bool {
        let live = self
            .panels
            .get(from.panel)
            .is_some_and(|panel| panel.has_anchor(&from.path));
        if live {
            self.graph.begin_edge(from, pointer);
        }
        live
    }

    pub fn update_pointer(&mut self, pointer: Vec2) -> bool {
        self.graph.update_pending_geometry(pointer)
    }

    pub fn cancel_pending(&mut self) -> bool {
        self.graph.cancel_pending()
    }

    pub fn resolve_drop(&mut self, candidate: Option<AnchorRef>) -> Option<DropToken> {
        self.graph.resolve_drop(candidate)
    }

    /// Commit a checked drop; a rejection becomes an error notice. A drop
    /// into a panel closed during the check commits nothing.
    pub fn finish_drop(&mut self, token: DropToken, candidate_is_dir: bool) -> Option<EdgeId> {
        if !self.panels.contains(token.candidate.panel) {
            tracing::debug!(panel = %token.candidate.panel, "drop target panel is gone");
            return None;
        }
        match self.graph.finish_drop(token, candidate_is_dir) {
            Ok(id) => id,
            Err(err) => {
                self.notices.error(err.to_string());
                None
            }
        }
    }

    pub async fn complete_edge(&mut self, candidate: Option<AnchorRef>) -> Option<EdgeId> {
        let token = self.resolve_drop(candidate)?;
        let is_dir = is_directory_or_false(self.gateway.as_ref(), &token.candidate.path).await;
        self.finish_drop(token, is_dir)
    }

    pub fn delete_edge(&mut self, id: EdgeId) -> bool {
        self.graph.delete_edge(id).is_some()
    }

    pub fn delete_summary(&mut self, key: SummaryKey) -> usize {
        self.graph.delete_summary(key).len()
    }

    pub fn clear_connections(&mut self) {
        self.graph.clear();
    }

    /// Clear connections, close every panel, forget transfer history and
    /// cached listings.
    pub fn clear_all(&mut self) {
        self.graph.clear();
        self.panels.clear();
        self.history.clear();
        self.cache.clear();
        tracing::info!("workspace cleared");
    }

    /// Unexpanded folders between each panel root and the edge endpoints in
    /// it, parents first, so the endpoints get rendered rows.
    pub fn reveal_plan(&self) -> Vec<(PanelId, CanonicalPath)> {
        let mut plan: BTreeSet<(PanelId, usize, CanonicalPath)> = BTreeSet::new();
        for edge in self.graph.edges() {
            for anchor in [&edge.from, &edge.to] {
                let Some(panel) = self.panels.get(anchor.panel) else {
                    continue;
                };
                let root = panel.root_path();
                for folder in anchor.path.ancestors_up_to(root) {
                    if &folder != root && !panel.tree().is_expanded(&folder) {
                        let depth = folder.as_str().matches('/').count();
                        plan.insert((anchor.panel, depth, folder));
                    }
                }
            }
        }
        plan.into_iter().map(|(id, _, folder)| (id, folder)).collect()
    }

    /// Expand folders of a [`Workspace::reveal_plan`] with pre-fetched listings.
    pub fn apply_reveal(&mut self, listings: Vec<(PanelId, CanonicalPath, Listing)>) {
        for (id, folder, listing) in listings {
            if self.begin_expand(id, &folder) {
                self.apply_listing(id, &folder, listing);
            }
        }
    }

    pub fn set_show_all(&mut self, show_all: bool) -> Vec<(PanelId, CanonicalPath)> {
        self.show_all = show_all;
        tracing::debug!(show_all, "show all connections toggled");
        if show_all {
            self.reveal_plan()
        } else {
            Vec::new()
        }
    }

    /// Flip show-all; turning it on expands the folders that hide endpoints.
    pub async fn toggle_show_all(&mut self) {
        let plan = self.set_show_all(!self.show_all);
        for (id, folder) in plan {
            self.expand(id, &folder).await;
        }
    }

    // --- transfers ---

    /// Drain every edge for a batch. The graph is empty afterwards whatever
    /// the batch outcome.
    pub fn take_batch(&mut self) -> Vec<Edge> {
        self.graph.drain()
    }

    /// Record a finished batch and return the panel refreshes it needs.
    pub fn finish_batch(&mut self, report: &TransferReport) -> Vec<RefreshPlan> {
        if report.attempted() == 0 {
            self.notices.info(report.message());
            return Vec::new();
        }
        self.history.extend(report.transferred.iter().cloned());
        if report.failed == 0 {
            self.notices.success(report.message());
        } else {
            self.notices.error(report.message());
        }
        self.refresh_plans(report.touched.iter())
    }

    pub async fn execute(&mut self, mode: TransferMode) -> TransferReport {
        let edges = self.take_batch();
        let report = TransferExecutor::execute(&edges, mode, self.gateway.as_ref(), &self.cache).await;
        let plans = self.finish_batch(&report);
        self.run_refresh(plans).await;
        report
    }

    // --- item properties ---

    /// A failed lookup becomes an error notice.
    pub fn finish_file_info(&mut self, path: &CanonicalPath, result: GatewayResult<FileInfo>) -> Option<FileInfo> {
        match result {
            Ok(info) => Some(info),
            Err(err) => {
                self.notices.error(format!("Cannot read properties of {}: {err}", path.basename()));
                None
            }
        }
    }

    pub async fn file_info(&mut self, path: &CanonicalPath) -> Option<FileInfo> {
        let result = self.gateway.file_info(path).await;
        self.finish_file_info(path, result)
    }

    // --- item mutations ---

    /// Reconcile after an [`ItemOp`]: invalidate, notify, plan refreshes.
    /// A failure only notifies.
    pub fn finish_item_op(&mut self, op: &ItemOp, result: &GatewayResult<Option<CanonicalPath>>) -> Vec<RefreshPlan> {
        match result {
            Ok(new_path) => {
                let touched: Vec<CanonicalPath> = op.parent().into_iter().collect();
                for path in &touched {
                    self.cache.invalidate(path);
                }
                if let ItemOp::Delete { path } | ItemOp::Rename { path, .. } = op {
                    self.cache.invalidate(path);
                }
                if let Some(new_path) = new_path {
                    self.cache.invalidate(new_path);
                }
                self.notices.success(op.describe(new_path.as_ref()));
                self.refresh_plans(touched.iter())
            }
            Err(err) => {
                tracing::warn!(op = op.verb(), %err, "item operation failed");
                self.notices.error(format!("Failed to {}: {err}", op.verb()));
                Vec::new()
            }
        }
    }

    pub async fn item_op(&mut self, op: ItemOp) -> GatewayResult<Option<CanonicalPath>> {
        let result = op.run(self.gateway.as_ref()).await;
        let plans = self.finish_item_op(&op, &result);
        self.run_refresh(plans).await;
        result
    }

    pub async fn create_folder(&mut self, parent: &CanonicalPath, name: &str) -> GatewayResult<Option<CanonicalPath>> {
        self.item_op(ItemOp::CreateFolder {
            parent: parent.clone(),
            name: name.to_string(),
        })
        .await
    }

    pub async fn create_file(&mut self, parent: &CanonicalPath, name: &str) -> GatewayResult<Option<CanonicalPath>> {
        self.item_op(ItemOp::CreateFile {
            parent: parent.clone(),
            name: name.to_string(),
        })
        .await
    }

    pub async fn delete_item(&mut self, path: &CanonicalPath) -> GatewayResult<Option<CanonicalPath>> {
        self.item_op(ItemOp::Delete { path: path.clone() }).await
    }

    pub async fn rename_item(&mut self, path: &CanonicalPath, new_name: &str) -> GatewayResult<Option<CanonicalPath>> {
        self.item_op(ItemOp::Rename {
            path: path.clone(),
            new_name: new_name.to_string(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::GatewayOp;
    use crate::gateway::MemoryGateway;
    use crate::notice::NoticeLevel;

    fn p(s: &str) -> CanonicalPath {
        CanonicalPath::new(s)
    }

    async fn workspace(entries: &[&str]) -> (Workspace<MemoryGateway>, PanelId, PanelId) {
        let gw = Arc::new(MemoryGateway::with_entries(entries.iter().copied()));
        let mut ws = Workspace::new(gw, &Settings::default());
        let s = ws.open_panel(p("/src"), PanelRole::Source, None).await;
        let d = ws.open_panel(p("/dst"), PanelRole::Destination, None).await;
        (ws, s, d)
    }

    async fn connect(ws: &mut Workspace<MemoryGateway>, from: AnchorRef, to: AnchorRef) -> Option<EdgeId> {
        assert!(ws.begin_edge(from, Vec2::ZERO));
        ws.complete_edge(Some(to)).await
    }

    #[tokio::test]
    async fn test_collapse_under_pending_gesture_cancels_it() {
        let (mut ws, s, _) = workspace(&["/src/sub/x.txt", "/dst/"]).await;
        assert!(ws.expand(s, &p("/src/sub")).await);
        assert!(ws.begin_edge(AnchorRef::new(s, "/src/sub/x.txt"), Vec2::ZERO));

        ws.collapse(s, &p("/src/sub"));
        assert!(ws.graph.pending().is_none());
        assert!(ws.scene().pending.is_none());
        assert_eq!(ws.complete_edge(Some(AnchorRef::new(s, "/src/sub"))).await, None);
    }

    #[tokio::test]
    async fn test_execute_always_drains_and_refreshes() {
        let (mut ws, s, d) = workspace(&["/src/a.txt", "/src/b.txt", "/dst/"]).await;
        connect(&mut ws, AnchorRef::new(s, "/src/a.txt"), AnchorRef::new(d, "/dst")).await.unwrap();
        connect(&mut ws, AnchorRef::new(s, "/src/b.txt"), AnchorRef::new(d, "/dst")).await.unwrap();
        assert_eq!(ws.graph.summary_count(SummaryKey::new(s, d).unwrap()), 2);
        ws.gateway().fail(GatewayOp::MoveFile, "/src/b.txt");

        let report = ws.execute(TransferMode::Move).await;
        assert_eq!((report.success, report.failed), (1, 1));
        assert!(ws.graph.is_empty());
        assert_eq!(ws.graph.summaries().count(), 0);

        let dst = ws.panels.get(d).unwrap();
        assert!(dst.has_anchor(&p("/dst/a.txt")));
        let src = ws.panels.get(s).unwrap();
        assert!(!src.has_anchor(&p("/src/a.txt")));
        assert!(src.has_anchor(&p("/src/b.txt")));

        assert!(ws.history.is_transferred(&p("/dst/a.txt")));
        let notice = ws.notices.latest().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, "Moved 1 item(s), 1 failed");
    }

    #[tokio::test]
    async fn test_execute_with_no_edges_only_notifies() {
        let (mut ws, _, _) = workspace(&["/src/a.txt", "/dst/"]).await;
        ws.gateway().clear_calls();
        let report = ws.execute(TransferMode::Copy).await;
        assert_eq!(report.attempted(), 0);
        assert!(ws.gateway().calls().is_empty());
        assert_eq!(ws.notices.latest().unwrap().message, "nothing to transfer");
    }

    #[tokio::test]
    async fn test_execute_with_no_edges_keeps_gesture() {
        let (mut ws, s, _) = workspace(&["/src/a.txt", "/dst/"]).await;
        assert!(ws.begin_edge(AnchorRef::new(s, "/src/a.txt"), Vec2::ZERO));
        ws.execute(TransferMode::Copy).await;
        assert!(ws.graph.pending().is_some());
    }

    #[tokio::test]
    async fn test_closing_target_panel_during_check_commits_nothing() {
        let (mut ws, s, d) = workspace(&["/src/a.txt", "/dst/"]).await;
        assert!(ws.begin_edge(AnchorRef::new(s, "/src/a.txt"), Vec2::ZERO));
        let token = ws.resolve_drop(Some(AnchorRef::new(d, "/dst"))).unwrap();

        assert!(ws.close_panel(d));
        assert_eq!(ws.finish_drop(token, true), None);
        assert!(ws.graph.is_empty());
        assert_eq!(ws.graph.summaries().count(), 0);

        let report = ws.execute(TransferMode::Move).await;
        assert_eq!(report.attempted(), 0);
        assert!(!ws.gateway().exists("/dst/a.txt"));
        assert!(ws.gateway().exists("/src/a.txt"));
    }

    #[tokio::test]
    async fn test_file_info_and_failure_notice() {
        let (mut ws, _, _) = workspace(&["/src/a.txt", "/src/sub/b.txt", "/dst/"]).await;
        let info = ws.file_info(&p("/src")).await.unwrap();
        assert!(info.is_dir);
        assert_eq!(info.size, ("/src/a.txt".len() + "/src/sub/b.txt".len()) as u64);

        assert!(ws.file_info(&p("/src/missing")).await.is_none());
        let notice = ws.notices.latest().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.starts_with("Cannot read properties of missing"));
    }

    #[tokio::test]
    async fn test_rejected_drop_posts_notice() {
        let (mut ws, s, d) = workspace(&["/src/a.txt", "/dst/file.txt"]).await;
        let result = connect(&mut ws, AnchorRef::new(s, "/src/a.txt"), AnchorRef::new(d, "/dst/file.txt")).await;
        assert_eq!(result, None);
        assert!(ws.graph.is_empty());
        assert_eq!(ws.notices.latest().unwrap().message, "destination must be a folder");
    }

    #[tokio::test]
    async fn test_close_panel_cascades_to_edges() {
        let (mut ws, s, d) = workspace(&["/src/a.txt", "/src/inner/", "/dst/"]).await;
        connect(&mut ws, AnchorRef::new(s, "/src/a.txt"), AnchorRef::new(d, "/dst")).await.unwrap();
        let local = connect(&mut ws, AnchorRef::new(s, "/src/a.txt"), AnchorRef::new(s, "/src/inner"))
            .await
            .unwrap();

        assert!(ws.close_panel(d));
        assert!(!ws.close_panel(d));
        assert_eq!(ws.graph.edges().map(|e| e.id).collect::<Vec<_>>(), vec![local]);
        assert_eq!(ws.graph.summaries().count(), 0);
    }

    #[tokio::test]
    async fn test_scroll_cancels_pending() {
        let mut entries: Vec<String> = (0..40).map(|i| format!("/src/f{i:02}.txt")).collect();
        entries.push(String::from("/dst/"));
        let refs: Vec<&str> = entries.iter().map(String::as_str).collect();
        let (mut ws, s, _) = workspace(&refs).await;

        assert!(ws.begin_edge(AnchorRef::new(s, "/src/f00.txt"), Vec2::ZERO));
        assert!(ws.scroll_panel(s, 50.0));
        assert!(ws.graph.pending().is_none());
    }

    #[tokio::test]
    async fn test_show_all_reveals_hidden_endpoints() {
        let (mut ws, s, d) = workspace(&["/src/sub/deep/x.txt", "/dst/"]).await;
        ws.expand(s, &p("/src/sub")).await;
        ws.expand(s, &p("/src/sub/deep")).await;
        let id = connect(&mut ws, AnchorRef::new(s, "/src/sub/deep/x.txt"), AnchorRef::new(d, "/dst"))
            .await
            .unwrap();

        ws.collapse(s, &p("/src/sub"));
        assert!(!ws.panels.get(s).unwrap().has_anchor(&p("/src/sub/deep/x.txt")));
        assert_eq!(ws.reveal_plan(), vec![(s, p("/src/sub")), (s, p("/src/sub/deep"))]);

        ws.toggle_show_all().await;
        assert!(ws.show_all());
        assert!(ws.panels.get(s).unwrap().has_anchor(&p("/src/sub/deep/x.txt")));
        assert!(ws.reveal_plan().is_empty());
        let edge = ws.scene().edge(id).cloned().unwrap();
        assert!(edge.visible && !edge.dashed);
    }

    #[tokio::test]
    async fn test_item_ops_refresh_panels() {
        let (mut ws, s, _) = workspace(&["/src/a.txt", "/dst/"]).await;

        let created = ws.create_folder(&p("/src"), "made").await.unwrap();
        assert_eq!(created, Some(p("/src/made")));
        assert!(ws.panels.get(s).unwrap().has_anchor(&p("/src/made")));

        let renamed = ws.rename_item(&p("/src/a.txt"), "b.txt").await.unwrap();
        assert_eq!(renamed, Some(p("/src/b.txt")));
        let panel = ws.panels.get(s).unwrap();
        assert!(panel.has_anchor(&p("/src/b.txt")));
        assert!(!panel.has_anchor(&p("/src/a.txt")));

        ws.delete_item(&p("/src/made")).await.unwrap();
        assert!(!ws.panels.get(s).unwrap().has_anchor(&p("/src/made")));
        assert_eq!(ws.notices.latest().unwrap().message, "Deleted made");
    }

    #[tokio::test]
    async fn test_failed_item_op_keeps_cache() {
        let (mut ws, _, _) = workspace(&["/src/a.txt", "/dst/"]).await;
        ws.gateway().fail(GatewayOp::CreateFile, "/src");
        assert!(ws.create_file(&p("/src"), "new.txt").await.is_err());
        assert!(ws.cache().contains(&p("/src")));
        assert_eq!(ws.notices.latest().unwrap().level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_delete_item_keeps_edges() {
        let (mut ws, s, d) = workspace(&["/src/a.txt", "/dst/"]).await;
        let id = connect(&mut ws, AnchorRef::new(s, "/src/a.txt"), AnchorRef::new(d, "/dst")).await.unwrap();
        ws.delete_item(&p("/src/a.txt")).await.unwrap();
        assert!(ws.graph.edge(id).is_some());
        assert!(!ws.scene().edge(id).unwrap().visible);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let (mut ws, s, d) = workspace(&["/src/a.txt", "/dst/"]).await;
        connect(&mut ws, AnchorRef::new(s, "/src/a.txt"), AnchorRef::new(d, "/dst")).await.unwrap();
        ws.history.mark(p("/dst/a.txt"));
        assert!(!ws.cache().is_empty());
        ws.clear_all();
        assert!(ws.panels.is_empty());
        assert!(ws.graph.is_empty());
        assert!(ws.history.is_empty());
        assert!(ws.cache().is_empty());
    }

    #[tokio::test]
    async fn test_panel_collapse_cancels_own_gesture() {
        let (mut ws, s, d) = workspace(&["/src/a.txt", "/dst/"]).await;
        assert!(ws.begin_edge(AnchorRef::new(s, "/src/a.txt"), Vec2::ZERO));
        assert!(ws.toggle_panel_collapsed(d));
        assert!(ws.graph.pending().is_some());
        assert!(ws.toggle_panel_collapsed(s));
        assert!(ws.graph.pending().is_none());
        assert!(!ws.toggle_panel_collapsed(s));
    }
}
