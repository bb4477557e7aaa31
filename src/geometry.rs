use glam::Vec2;
use std::collections::BTreeMap;

use crate::canvas::InfiniteCanvas;
use crate::graph::{AnchorRef, ConnectionGraph, EdgeId, SummaryKey};
use crate::panel::{Panel, PanelHit, PanelSet};
use crate::path::CanonicalPath;
use crate::transfer::TransferHistory;

/// Screen-space line of one edge.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeGeometry {
    pub id: EdgeId,
    pub from: AnchorRef,
    pub to: AnchorRef,
    pub start: Vec2,
    pub end: Vec2,
    /// Where the delete control sits.
    pub control: Vec2,
    /// At least one end was drawn to a panel header instead of its anchor.
    pub dashed: bool,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryGeometry {
    pub key: SummaryKey,
    pub start: Vec2,
    pub end: Vec2,
    pub label: Vec2,
    pub count: usize,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingGeometry {
    pub start: Vec2,
    pub end: Vec2,
}

/// A visible anchor that is an endpoint of one or more edges.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorMarker {
    pub anchor: AnchorRef,
    pub center: Vec2,
    pub edges: Vec<EdgeId>,
}

/// Everything the painter needs for connections, in screen coordinates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scene {
    pub edges: Vec<EdgeGeometry>,
    pub summaries: Vec<SummaryGeometry>,
    pub pending: Option<PendingGeometry>,
    /// Folder row under the pointer while a gesture is active.
    pub drop_target: Option<AnchorRef>,
    pub markers: Vec<AnchorMarker>,
    /// Rendered rows that are, or sit under, a recently transferred path.
    pub transferred: Vec<AnchorRef>,
}

impl Scene {
    pub fn visible_edges(&self) -> impl Iterator<Item = &EdgeGeometry> {
        self.edges.iter().filter(|e| e.visible)
    }

    pub fn visible_summaries(&self) -> impl Iterator<Item = &SummaryGeometry> {
        self.summaries.iter().filter(|s| s.visible)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&EdgeGeometry> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Delete control of a visible edge within `radius` of `point`.
    pub fn edge_control_at(&self, point: Vec2, radius: f32) -> Option<EdgeId> {
        self.visible_edges()
            .find(|e| e.control.distance(point) <= radius)
            .map(|e| e.id)
    }

    /// Delete control of a visible summary within `radius` of `point`.
    pub fn summary_control_at(&self, point: Vec2, radius: f32) -> Option<SummaryKey> {
        self.visible_summaries()
            .find(|s| s.label.distance(point) <= radius)
            .map(|s| s.key)
    }
}

/// Where an anchor is drawn: exactly, or at its panel header when clipped.
enum Endpoint {
    Precise(Vec2),
    Fallback(Vec2),
    Missing,
}

fn resolve(panels: &PanelSet, canvas: &InfiniteCanvas, anchor: &AnchorRef) -> Endpoint {
    let Some(panel) = panels.get(anchor.panel) else {
        return Endpoint::Missing;
    };
    match panel.visible_anchor_center(&anchor.path) {
        Some(center) => Endpoint::Precise(canvas.world_to_screen(center)),
        None => Endpoint::Fallback(header_point(panel, canvas)),
    }
}

fn header_point(panel: &Panel, canvas: &InfiniteCanvas) -> Vec2 {
    canvas.world_to_screen(panel.header_midpoint())
}

/// Geometry of every edge, summary and the pending line.
///
/// Pure: reads state only, so two calls with no change in between return
/// equal scenes.
pub fn recompute_all_geometry(
    graph: &ConnectionGraph,
    panels: &PanelSet,
    canvas: &InfiniteCanvas,
    history: &TransferHistory,
    show_all: bool,
) -> Scene {
    let mut scene = Scene::default();
    let mut markers: BTreeMap<AnchorRef, (Vec2, Vec<EdgeId>)> = BTreeMap::new();

    for edge in graph.edges() {
        let from = resolve(panels, canvas, &edge.from);
        let to = resolve(panels, canvas, &edge.to);

        for (anchor, end) in [(&edge.from, &from), (&edge.to, &to)] {
            if let Endpoint::Precise(center) = end {
                markers
                    .entry(anchor.clone())
                    .or_insert_with(|| (*center, Vec::new()))
                    .1
                    .push(edge.id);
            }
        }

        let (start, end, dashed, visible) = match (from, to) {
            (Endpoint::Precise(s), Endpoint::Precise(e)) => (s, e, false, true),
            (Endpoint::Missing, _) | (_, Endpoint::Missing) => (Vec2::ZERO, Vec2::ZERO, false, false),
            (Endpoint::Precise(s) | Endpoint::Fallback(s), Endpoint::Precise(e) | Endpoint::Fallback(e)) => {
                (s, e, true, show_all)
            }
        };
        scene.edges.push(EdgeGeometry {
            id: edge.id,
            from: edge.from.clone(),
            to: edge.to.clone(),
            start,
            end,
            control: (start + end) * 0.5,
            dashed,
            visible,
        });
    }

    for (key, count) in graph.summaries() {
        let (a, b) = key.panels();
        let (Some(pa), Some(pb)) = (panels.get(a), panels.get(b)) else {
            continue;
        };
        let start = header_point(pa, canvas);
        let end = header_point(pb, canvas);
        scene.summaries.push(SummaryGeometry {
            key,
            start,
            end,
            label: (start + end) * 0.5,
            count,
            visible: canvas.rect_in_viewport(pa.frame_rect()) || canvas.rect_in_viewport(pb.frame_rect()),
        });
    }

    if let Some(pending) = graph.pending() {
        let start = match resolve(panels, canvas, &pending.from) {
            Endpoint::Precise(p) | Endpoint::Fallback(p) => p,
            Endpoint::Missing => pending.pointer,
        };
        scene.pending = Some(PendingGeometry {
            start,
            end: pending.pointer,
        });
        scene.drop_target = drop_target(panels, canvas, pending.pointer)
            .filter(|target| target != &pending.from);
    }

    scene.markers = markers
        .into_iter()
        .map(|(anchor, (center, edges))| AnchorMarker { anchor, center, edges })
        .collect();

    if !history.is_empty() {
        for panel in panels.iter() {
            for index in panel.visible_row_range() {
                if let Some(path) = panel.rows()[index].anchor_path() {
                    if history.is_transferred(path) {
                        scene.transferred.push(AnchorRef::new(panel.id, path.clone()));
                    }
                }
            }
        }
    }

    tracing::trace!(
        edges = scene.edges.len(),
        summaries = scene.summaries.len(),
        "geometry recomputed"
    );
    scene
}

/// What a drop at a screen point lands on: an entry row or anchor, or the
/// panel root when released over a header or empty body.
pub fn drop_candidate(panels: &PanelSet, canvas: &InfiniteCanvas, pointer: Vec2) -> Option<AnchorRef> {
    let (id, hit) = panels.hit_test(canvas.screen_to_world(pointer))?;
    let path: CanonicalPath = match hit {
        PanelHit::Anchor(path) | PanelHit::Row(path) => path,
        PanelHit::Header | PanelHit::Body => panels.get(id)?.root_path().clone(),
        _ => return None,
    };
    Some(AnchorRef::new(id, path))
}

/// Like [`drop_candidate`], restricted to folders, for highlighting.
pub fn drop_target(panels: &PanelSet, canvas: &InfiniteCanvas, pointer: Vec2) -> Option<AnchorRef> {
    let candidate = drop_candidate(panels, canvas, pointer)?;
    let panel = panels.get(candidate.panel)?;
    let is_folder = &candidate.path == panel.root_path()
        || panel.anchor_entry(&candidate.path).is_some_and(|entry| entry.is_dir);
    is_folder.then_some(candidate)
}

/// Anchor (connector dot) under a screen point, file or folder.
pub fn anchor_at(panels: &PanelSet, canvas: &InfiniteCanvas, pointer: Vec2) -> Option<AnchorRef> {
    match panels.hit_test(canvas.screen_to_world(pointer))? {
        (panel, PanelHit::Anchor(path)) => Some(AnchorRef::new(panel, path)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DirectoryCache;
    use crate::gateway::MemoryGateway;
    use crate::panel::{PanelId, PanelRole};
    use crate::tree::fetch_listings;

    fn p(s: &str) -> CanonicalPath {
        CanonicalPath::new(s)
    }

    struct Fixture {
        gw: MemoryGateway,
        cache: DirectoryCache,
        panels: PanelSet,
        graph: ConnectionGraph,
        canvas: InfiniteCanvas,
        history: TransferHistory,
        s: PanelId,
        d: PanelId,
    }

    impl Fixture {
        async fn new() -> Self {
            let gw = MemoryGateway::new();
            for i in 0..30 {
                gw.add_file(format!("/src/f{i:02}.txt"), 1);
            }
            gw.add_folder("/src/sub");
            gw.add_folder("/dst/in");
            let mut panels = PanelSet::new();
            let s = panels.add(p("/src"), PanelRole::Source, Vec2::new(0.0, 0.0), Vec2::new(300.0, 300.0));
            let d = panels.add(p("/dst"), PanelRole::Destination, Vec2::new(500.0, 0.0), Vec2::new(300.0, 300.0));
            let mut fixture = Self {
                gw,
                cache: DirectoryCache::new(),
                panels,
                graph: ConnectionGraph::new(),
                canvas: InfiniteCanvas::new(1200.0, 800.0),
                history: TransferHistory::default(),
                s,
                d,
            };
            fixture.load(s).await;
            fixture.load(d).await;
            fixture
        }

        async fn load(&mut self, id: PanelId) {
            let panel = self.panels.get_mut(id).unwrap();
            let plan = panel.refresh_plan(&panel.root_path().clone()).unwrap();
            let listings = fetch_listings(&plan, &self.cache, &self.gw).await;
            panel.apply_refresh(&listings);
        }

        fn connect(&mut self, from: AnchorRef, to: AnchorRef) -> EdgeId {
            self.graph.begin_edge(from, Vec2::ZERO);
            let token = self.graph.resolve_drop(Some(to)).unwrap();
            self.graph.finish_drop(token, true).unwrap().unwrap()
        }

        fn scene(&self, show_all: bool) -> Scene {
            recompute_all_geometry(&self.graph, &self.panels, &self.canvas, &self.history, show_all)
        }
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let mut fx = Fixture::new().await;
        fx.connect(AnchorRef::new(fx.s, "/src/f00.txt"), AnchorRef::new(fx.d, "/dst/in"));
        fx.connect(AnchorRef::new(fx.s, "/src/f29.txt"), AnchorRef::new(fx.d, "/dst/in"));
        fx.graph.begin_edge(AnchorRef::new(fx.s, "/src/f01.txt"), Vec2::new(600.0, 60.0));
        fx.history.mark(p("/src/f02.txt"));

        assert_eq!(fx.scene(false), fx.scene(false));
        assert_eq!(fx.scene(true), fx.scene(true));
    }

    #[tokio::test]
    async fn test_edge_hidden_when_endpoint_scrolled_away() {
        let mut fx = Fixture::new().await;
        let near = fx.connect(AnchorRef::new(fx.s, "/src/f00.txt"), AnchorRef::new(fx.d, "/dst/in"));
        let far = fx.connect(AnchorRef::new(fx.s, "/src/f29.txt"), AnchorRef::new(fx.d, "/dst/in"));

        let scene = fx.scene(false);
        assert!(scene.edge(near).unwrap().visible);
        assert!(!scene.edge(near).unwrap().dashed);
        assert!(!scene.edge(far).unwrap().visible);

        fx.panels.get_mut(fx.s).unwrap().scroll_by(10_000.0);
        let scene = fx.scene(false);
        assert!(!scene.edge(near).unwrap().visible);
        assert!(scene.edge(far).unwrap().visible);
    }

    #[tokio::test]
    async fn test_show_all_falls_back_to_header_dashed() {
        let mut fx = Fixture::new().await;
        let far = fx.connect(AnchorRef::new(fx.s, "/src/f29.txt"), AnchorRef::new(fx.d, "/dst/in"));

        let scene = fx.scene(true);
        let edge = scene.edge(far).unwrap();
        assert!(edge.visible);
        assert!(edge.dashed);
        let header = fx.canvas.world_to_screen(fx.panels.get(fx.s).unwrap().header_midpoint());
        assert_eq!(edge.start, header);
    }

    #[tokio::test]
    async fn test_collapsed_panel_hides_its_edges() {
        let mut fx = Fixture::new().await;
        let id = fx.connect(AnchorRef::new(fx.s, "/src/f00.txt"), AnchorRef::new(fx.d, "/dst/in"));
        fx.panels.get_mut(fx.d).unwrap().collapsed = true;
        assert!(!fx.scene(false).edge(id).unwrap().visible);
        assert!(fx.scene(true).edge(id).unwrap().dashed);
    }

    #[tokio::test]
    async fn test_summary_between_headers_and_culled_off_screen() {
        let mut fx = Fixture::new().await;
        fx.connect(AnchorRef::new(fx.s, "/src/f00.txt"), AnchorRef::new(fx.d, "/dst/in"));
        fx.connect(AnchorRef::new(fx.s, "/src/f01.txt"), AnchorRef::new(fx.d, "/dst/in"));

        let scene = fx.scene(false);
        let summary = &scene.summaries[0];
        assert_eq!(summary.count, 2);
        assert!(summary.visible);
        assert_eq!(summary.start, fx.canvas.world_to_screen(fx.panels.get(fx.s).unwrap().header_midpoint()));

        fx.panels.get_mut(fx.s).unwrap().move_by(Vec2::new(5000.0, 0.0));
        assert!(fx.scene(false).summaries[0].visible);
        fx.panels.get_mut(fx.d).unwrap().move_by(Vec2::new(5000.0, 0.0));
        assert!(!fx.scene(false).summaries[0].visible);
    }

    #[tokio::test]
    async fn test_pending_line_follows_panel_and_pointer() {
        let mut fx = Fixture::new().await;
        fx.graph.begin_edge(AnchorRef::new(fx.s, "/src/f00.txt"), Vec2::ZERO);
        let in_row = fx.panels.get(fx.d).unwrap().anchor_rect(&p("/dst/in")).unwrap().center();
        let pointer = fx.canvas.world_to_screen(in_row);
        fx.graph.update_pending_geometry(pointer);

        let scene = fx.scene(false);
        let pending = scene.pending.clone().unwrap();
        assert_eq!(pending.end, pointer);
        assert_eq!(scene.drop_target, Some(AnchorRef::new(fx.d, "/dst/in")));

        fx.panels.get_mut(fx.s).unwrap().move_by(Vec2::new(0.0, 40.0));
        let moved = fx.scene(false).pending.unwrap();
        assert_eq!(moved.start, pending.start + Vec2::new(0.0, 40.0));
    }

    #[tokio::test]
    async fn test_markers_and_transferred_rows() {
        let mut fx = Fixture::new().await;
        let first = fx.connect(AnchorRef::new(fx.s, "/src/f00.txt"), AnchorRef::new(fx.d, "/dst/in"));
        let second = fx.connect(AnchorRef::new(fx.s, "/src/f01.txt"), AnchorRef::new(fx.d, "/dst/in"));
        fx.history.mark(p("/dst/in"));

        let scene = fx.scene(false);
        let dest = scene
            .markers
            .iter()
            .find(|m| m.anchor == AnchorRef::new(fx.d, "/dst/in"))
            .unwrap();
        assert_eq!(dest.edges, vec![first, second]);
        assert_eq!(scene.transferred, vec![AnchorRef::new(fx.d, "/dst/in")]);

        let control = scene.edge(first).unwrap().control;
        assert_eq!(scene.edge_control_at(control, 4.0), Some(first));
    }
}
