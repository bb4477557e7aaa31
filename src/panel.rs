use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::canvas::Rect;
use crate::error::GatewayError;
use crate::gateway::{DirEntry, GatewayResult};
use crate::path::CanonicalPath;
use crate::tree::{PanelTree, RowKind, SortOrder, VisibleRow};

/// Height of the draggable header bar (title, collapse and close buttons).
pub const HEADER_HEIGHT: f32 = 36.0;

/// Inset between the panel frame and the scrolling tree viewport.
pub const BODY_PADDING: f32 = 8.0;

pub const ROW_HEIGHT: f32 = 22.0;

/// Horizontal indent per nesting level.
pub const INDENT: f32 = 16.0;

/// Side of the square connector drawn at the right end of each row.
pub const ANCHOR_SIZE: f32 = 10.0;

const ANCHOR_RIGHT_MARGIN: f32 = 6.0;
const HEADER_BUTTON_SIZE: f32 = 22.0;

pub const MIN_PANEL_WIDTH: f32 = 180.0;
pub const MIN_PANEL_HEIGHT: f32 = HEADER_HEIGHT + 2.0 * BODY_PADDING + ROW_HEIGHT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PanelId(pub u32);

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panel-{}", self.0)
    }
}

/// Advisory only; edges may run in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelRole {
    #[default]
    Source,
    Destination,
}

impl PanelRole {
    pub fn title(&self) -> &'static str {
        match self {
            PanelRole::Source => "Source",
            PanelRole::Destination => "Destination",
        }
    }
}

/// What lies under a point on a panel.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelHit {
    CloseButton,
    CollapseButton,
    Header,
    Anchor(CanonicalPath),
    Row(CanonicalPath),
    Body,
    ResizeHandle,
}

/// A movable, resizable, collapsible viewport onto one folder.
///
/// Geometry is in world units; the canvas maps it to the screen.
pub struct Panel {
    pub id: PanelId,
    pub role: PanelRole,
    pub position: Vec2,
    pub size: Vec2,
    pub collapsed: bool,
    scroll: f32,
    tree: PanelTree,
    rows: Vec<VisibleRow>,
    row_index: HashMap<CanonicalPath, usize>,
}

impl Panel {
    pub fn new(id: PanelId, root: CanonicalPath, role: PanelRole, position: Vec2, size: Vec2) -> Self {
        let mut panel = Self {
            id,
            role,
            position,
            size: size.max(Vec2::new(MIN_PANEL_WIDTH, MIN_PANEL_HEIGHT)),
            collapsed: false,
            scroll: 0.0,
            tree: PanelTree::new(root, SortOrder::default()),
            rows: Vec::new(),
            row_index: HashMap::new(),
        };
        panel.relayout();
        panel
    }

    pub fn root_path(&self) -> &CanonicalPath {
        self.tree.root_path()
    }

    pub fn tree(&self) -> &PanelTree {
        &self.tree
    }

    pub fn rows(&self) -> &[VisibleRow] {
        &self.rows
    }

    pub fn scroll(&self) -> f32 {
        self.scroll
    }

    pub fn sort_order(&self) -> SortOrder {
        self.tree.sort_order()
    }

    /// Rebuild the anchor lookup table and re-clamp scrolling.
    fn relayout(&mut self) {
        self.rows = self.tree.visible_rows();
        self.row_index = self
            .rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| row.anchor_path().map(|p| (p.clone(), i)))
            .collect();
        self.scroll = self.scroll.clamp(0.0, self.max_scroll());
    }

    // --- tree operations (each keeps the layout current) ---

    pub fn begin_expand(&mut self, folder: &CanonicalPath) -> bool {
        let started = self.tree.begin_expand(folder);
        self.relayout();
        started
    }

    pub fn apply_listing(
        &mut self,
        folder: &CanonicalPath,
        listing: Result<Arc<Vec<DirEntry>>, &GatewayError>,
    ) -> Vec<CanonicalPath> {
        let removed = self.tree.apply_listing(folder, listing);
        self.relayout();
        removed
    }

    pub fn collapse(&mut self, folder: &CanonicalPath) -> Vec<CanonicalPath> {
        let removed = self.tree.collapse(folder);
        self.relayout();
        removed
    }

    pub fn refresh_plan(&self, folder: &CanonicalPath) -> Option<Vec<CanonicalPath>> {
        self.tree.refresh_plan(folder)
    }

    pub fn apply_refresh(&mut self, listings: &[(CanonicalPath, GatewayResult<Arc<Vec<DirEntry>>>)]) -> Vec<CanonicalPath> {
        let removed = self.tree.apply_refresh(listings);
        self.relayout();
        removed
    }

    pub fn set_sort(&mut self, sort: SortOrder) {
        self.tree.set_sort(sort);
        self.relayout();
    }

    // --- geometry ---

    pub fn frame_rect(&self) -> Rect {
        let height = if self.collapsed { HEADER_HEIGHT } else { self.size.y };
        Rect::new(self.position.x, self.position.y, self.size.x, height)
    }

    pub fn header_rect(&self) -> Rect {
        Rect::new(self.position.x, self.position.y, self.size.x, HEADER_HEIGHT)
    }

    pub fn header_midpoint(&self) -> Vec2 {
        self.header_rect().center()
    }

    pub fn close_button_rect(&self) -> Rect {
        let header = self.header_rect();
        Rect::new(
            header.x + header.width - HEADER_BUTTON_SIZE - 7.0,
            header.y + (HEADER_HEIGHT - HEADER_BUTTON_SIZE) * 0.5,
            HEADER_BUTTON_SIZE,
            HEADER_BUTTON_SIZE,
        )
    }

    pub fn collapse_button_rect(&self) -> Rect {
        self.close_button_rect()
            .translate(Vec2::new(-(HEADER_BUTTON_SIZE + 4.0), 0.0))
    }

    pub fn resize_handle_rect(&self) -> Rect {
        let frame = self.frame_rect();
        Rect::new(frame.x + frame.width - 12.0, frame.y + frame.height - 12.0, 12.0, 12.0)
    }

    /// Clipping region of the scrolling tree; `None` while collapsed.
    pub fn viewport_rect(&self) -> Option<Rect> {
        if self.collapsed {
            return None;
        }
        Some(Rect::new(
            self.position.x + BODY_PADDING,
            self.position.y + HEADER_HEIGHT + BODY_PADDING,
            (self.size.x - 2.0 * BODY_PADDING).max(0.0),
            (self.size.y - HEADER_HEIGHT - 2.0 * BODY_PADDING).max(0.0),
        ))
    }

    fn unclipped_viewport(&self) -> Rect {
        Rect::new(
            self.position.x + BODY_PADDING,
            self.position.y + HEADER_HEIGHT + BODY_PADDING,
            (self.size.x - 2.0 * BODY_PADDING).max(0.0),
            (self.size.y - HEADER_HEIGHT - 2.0 * BODY_PADDING).max(0.0),
        )
    }

    pub fn content_height(&self) -> f32 {
        self.rows.len() as f32 * ROW_HEIGHT
    }

    pub fn max_scroll(&self) -> f32 {
        (self.content_height() - self.unclipped_viewport().height).max(0.0)
    }

    /// Scroll the tree; returns true if the offset changed.
    pub fn scroll_by(&mut self, delta: f32) -> bool {
        let before = self.scroll;
        self.scroll = (self.scroll + delta).clamp(0.0, self.max_scroll());
        (self.scroll - before).abs() > f32::EPSILON
    }

    pub fn move_by(&mut self, delta: Vec2) {
        self.position += delta;
    }

    pub fn resize_to(&mut self, size: Vec2) {
        self.size = size.max(Vec2::new(MIN_PANEL_WIDTH, MIN_PANEL_HEIGHT));
        self.scroll = self.scroll.clamp(0.0, self.max_scroll());
    }

    pub fn row_rect(&self, index: usize) -> Rect {
        let viewport = self.unclipped_viewport();
        Rect::new(
            viewport.x,
            viewport.y + index as f32 * ROW_HEIGHT - self.scroll,
            viewport.width,
            ROW_HEIGHT,
        )
    }

    fn anchor_rect_for_row(&self, index: usize) -> Rect {
        let row = self.row_rect(index);
        Rect::new(
            row.x + row.width - ANCHOR_SIZE - ANCHOR_RIGHT_MARGIN,
            row.y + (ROW_HEIGHT - ANCHOR_SIZE) * 0.5,
            ANCHOR_SIZE,
            ANCHOR_SIZE,
        )
    }

    /// Connector of the panel root, drawn in the header.
    pub fn root_anchor_rect(&self) -> Rect {
        let collapse = self.collapse_button_rect();
        Rect::new(
            collapse.x - ANCHOR_SIZE - 8.0,
            self.position.y + (HEADER_HEIGHT - ANCHOR_SIZE) * 0.5,
            ANCHOR_SIZE,
            ANCHOR_SIZE,
        )
    }

    /// True while `path` has a live anchor: the root, or a rendered row.
    pub fn has_anchor(&self, path: &CanonicalPath) -> bool {
        path == self.root_path() || self.row_index.contains_key(path)
    }

    pub fn anchor_entry(&self, path: &CanonicalPath) -> Option<&DirEntry> {
        let index = *self.row_index.get(path)?;
        match &self.rows.get(index)?.kind {
            RowKind::Entry(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn anchor_rect(&self, path: &CanonicalPath) -> Option<Rect> {
        if path == self.root_path() {
            return Some(self.root_anchor_rect());
        }
        self.row_index.get(path).map(|&i| self.anchor_rect_for_row(i))
    }

    /// Anchor centre when it is drawn unclipped. Row anchors must be live,
    /// the panel expanded and the connector entirely inside the tree viewport;
    /// the root anchor sits in the header and is always shown.
    pub fn visible_anchor_center(&self, path: &CanonicalPath) -> Option<Vec2> {
        if path == self.root_path() {
            return Some(self.root_anchor_rect().center());
        }
        let viewport = self.viewport_rect()?;
        let anchor = self.anchor_rect(path)?;
        viewport.contains_rect(&anchor).then(|| anchor.center())
    }

    /// Indices of rows intersecting the viewport.
    pub fn visible_row_range(&self) -> std::ops::Range<usize> {
        let Some(viewport) = self.viewport_rect() else {
            return 0..0;
        };
        if self.rows.is_empty() {
            return 0..0;
        }
        let first = (self.scroll / ROW_HEIGHT).floor().max(0.0) as usize;
        let last = ((self.scroll + viewport.height) / ROW_HEIGHT).ceil() as usize;
        first.min(self.rows.len())..last.min(self.rows.len())
    }

    pub fn hit_test(&self, point: Vec2) -> Option<PanelHit> {
        if !self.frame_rect().contains(point) {
            return None;
        }
        if self.close_button_rect().contains(point) {
            return Some(PanelHit::CloseButton);
        }
        if self.collapse_button_rect().contains(point) {
            return Some(PanelHit::CollapseButton);
        }
        if self.root_anchor_rect().expand(2.0).contains(point) {
            return Some(PanelHit::Anchor(self.root_path().clone()));
        }
        if self.header_rect().contains(point) {
            return Some(PanelHit::Header);
        }
        if self.resize_handle_rect().contains(point) {
            return Some(PanelHit::ResizeHandle);
        }
        let Some(viewport) = self.viewport_rect() else {
            return Some(PanelHit::Body);
        };
        if !viewport.contains(point) {
            return Some(PanelHit::Body);
        }
        for index in self.visible_row_range() {
            let Some(path) = self.rows[index].anchor_path() else {
                continue;
            };
            if self.anchor_rect_for_row(index).expand(2.0).contains(point) {
                return Some(PanelHit::Anchor(path.clone()));
            }
            if self.row_rect(index).contains(point) {
                return Some(PanelHit::Row(path.clone()));
            }
        }
        Some(PanelHit::Body)
    }
}

/// Every open panel, with paint/hit order (last is topmost).
#[derive(Default)]
pub struct PanelSet {
    panels: BTreeMap<PanelId, Panel>,
    z_order: Vec<PanelId>,
    next_id: u32,
}

impl PanelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, root: CanonicalPath, role: PanelRole, position: Vec2, size: Vec2) -> PanelId {
        let id = PanelId(self.next_id);
        self.next_id += 1;
        self.panels.insert(id, Panel::new(id, root, role, position, size));
        self.z_order.push(id);
        id
    }

    pub fn remove(&mut self, id: PanelId) -> Option<Panel> {
        self.z_order.retain(|z| *z != id);
        self.panels.remove(&id)
    }

    pub fn clear(&mut self) {
        self.panels.clear();
        self.z_order.clear();
    }

    pub fn get(&self, id: PanelId) -> Option<&Panel> {
        self.panels.get(&id)
    }

    pub fn get_mut(&mut self, id: PanelId) -> Option<&mut Panel> {
        self.panels.get_mut(&id)
    }

    pub fn contains(&self, id: PanelId) -> bool {
        self.panels.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    /// Panels bottom to top.
    pub fn iter(&self) -> impl Iterator<Item = &Panel> {
        self.z_order.iter().filter_map(|id| self.panels.get(id))
    }

    pub fn bring_to_front(&mut self, id: PanelId) {
        if self.panels.contains_key(&id) {
            self.z_order.retain(|z| *z != id);
            self.z_order.push(id);
        }
    }

    /// Topmost panel under `point` and what was hit.
    pub fn hit_test(&self, point: Vec2) -> Option<(PanelId, PanelHit)> {
        self.z_order
            .iter()
            .rev()
            .filter_map(|id| self.panels.get(id))
            .find_map(|panel| panel.hit_test(point).map(|hit| (panel.id, hit)))
    }

    /// Panels whose root equals or is an ancestor of `path`.
    pub fn showing(&self, path: &CanonicalPath) -> Vec<PanelId> {
        self.iter()
            .filter(|panel| path.is_same_or_descendant_of(panel.root_path()))
            .map(|panel| panel.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DirectoryCache;
    use crate::gateway::MemoryGateway;
    use crate::tree::fetch_listings;

    fn p(s: &str) -> CanonicalPath {
        CanonicalPath::new(s)
    }

    async fn loaded_panel(gw: &MemoryGateway, root: &str, size: Vec2) -> Panel {
        let mut panel = Panel::new(PanelId(0), p(root), PanelRole::Source, Vec2::new(100.0, 50.0), size);
        let cache = DirectoryCache::new();
        let plan = panel.refresh_plan(&p(root)).unwrap();
        let listings = fetch_listings(&plan, &cache, gw).await;
        panel.apply_refresh(&listings);
        panel
    }

    fn many_files(n: usize) -> MemoryGateway {
        let gw = MemoryGateway::new();
        for i in 0..n {
            gw.add_file(format!("/src/f{i:02}.txt"), 1);
        }
        gw
    }

    #[tokio::test]
    async fn test_anchor_visibility_follows_scroll() {
        let gw = many_files(30);
        let mut panel = loaded_panel(&gw, "/src", Vec2::new(300.0, 200.0)).await;

        assert!(panel.visible_anchor_center(&p("/src/f00.txt")).is_some());
        assert!(panel.visible_anchor_center(&p("/src/f29.txt")).is_none());
        assert!(panel.has_anchor(&p("/src/f29.txt")));

        assert!(panel.scroll_by(10_000.0));
        assert_eq!(panel.scroll(), panel.max_scroll());
        assert!(panel.visible_anchor_center(&p("/src/f00.txt")).is_none());
        assert!(panel.visible_anchor_center(&p("/src/f29.txt")).is_some());
        assert!(!panel.scroll_by(1.0));
    }

    #[tokio::test]
    async fn test_collapsed_panel_hides_all_anchors() {
        let gw = many_files(2);
        let mut panel = loaded_panel(&gw, "/src", Vec2::new(300.0, 200.0)).await;
        panel.collapsed = true;
        assert!(panel.visible_anchor_center(&p("/src/f00.txt")).is_none());
        assert_eq!(panel.frame_rect().height, HEADER_HEIGHT);
        assert!(panel.visible_row_range().is_empty());
    }

    #[tokio::test]
    async fn test_hit_test_regions() {
        let gw = many_files(3);
        let panel = loaded_panel(&gw, "/src", Vec2::new(300.0, 200.0)).await;

        assert_eq!(panel.hit_test(panel.header_midpoint()), Some(PanelHit::Header));
        assert_eq!(
            panel.hit_test(panel.close_button_rect().center()),
            Some(PanelHit::CloseButton)
        );
        let anchor = panel.anchor_rect(&p("/src/f01.txt")).unwrap().center();
        assert_eq!(panel.hit_test(anchor), Some(PanelHit::Anchor(p("/src/f01.txt"))));
        let row = panel.row_rect(2);
        assert_eq!(
            panel.hit_test(Vec2::new(row.x + 4.0, row.center().y)),
            Some(PanelHit::Row(p("/src/f02.txt")))
        );
        assert_eq!(panel.hit_test(Vec2::new(-10.0, -10.0)), None);
    }

    #[tokio::test]
    async fn test_root_anchor_lives_in_header() {
        let gw = many_files(1);
        let mut panel = loaded_panel(&gw, "/src", Vec2::new(300.0, 200.0)).await;
        let root = p("/src");
        assert!(panel.has_anchor(&root));
        let center = panel.root_anchor_rect().center();
        assert_eq!(panel.hit_test(center), Some(PanelHit::Anchor(root.clone())));

        panel.collapsed = true;
        assert_eq!(panel.visible_anchor_center(&root), Some(center));
    }

    #[tokio::test]
    async fn test_shrinking_panel_reclamps_scroll() {
        let gw = many_files(30);
        let mut panel = loaded_panel(&gw, "/src", Vec2::new(300.0, 200.0)).await;
        panel.scroll_by(10_000.0);
        panel.resize_to(Vec2::new(300.0, 2000.0));
        assert_eq!(panel.scroll(), 0.0);
        panel.resize_to(Vec2::new(10.0, 10.0));
        assert_eq!(panel.size, Vec2::new(MIN_PANEL_WIDTH, MIN_PANEL_HEIGHT));
    }

    #[test]
    fn test_panel_set_z_order_and_showing() {
        let mut set = PanelSet::new();
        let a = set.add(p("/src"), PanelRole::Source, Vec2::ZERO, Vec2::new(300.0, 300.0));
        let b = set.add(p("/src/sub"), PanelRole::Destination, Vec2::ZERO, Vec2::new(300.0, 300.0));
        let c = set.add(p("/dst"), PanelRole::Destination, Vec2::new(1000.0, 0.0), Vec2::new(300.0, 300.0));

        assert_eq!(set.hit_test(Vec2::new(50.0, 10.0)).map(|(id, _)| id), Some(b));
        set.bring_to_front(a);
        assert_eq!(set.hit_test(Vec2::new(50.0, 10.0)).map(|(id, _)| id), Some(a));

        let mut showing = set.showing(&p("/src/sub/x.txt"));
        showing.sort();
        assert_eq!(showing, vec![a, b]);
        assert_eq!(set.showing(&p("/dst")), vec![c]);

        assert!(set.remove(b).is_some());
        assert!(!set.contains(b));
        assert_eq!(set.iter().map(|panel| panel.id).collect::<Vec<_>>(), vec![c, a]);
    }

    #[test]
    fn test_panel_id_display() {
        assert_eq!(PanelId(3).to_string(), "panel-3");
    }
}
