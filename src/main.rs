use eframe::egui;
use glam::Vec2;
use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Runtime;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use filecanvas::canvas::Rect;
use filecanvas::config::{self, Settings};
use filecanvas::gateway::{is_directory_or_false, FileInfo, FsGateway, GatewayResult, LocalGateway, TransferMode};
use filecanvas::geometry::{self, Scene};
use filecanvas::graph::{AnchorRef, DropToken};
use filecanvas::notice::{NoticeLevel, NOTICE_TTL};
use filecanvas::panel::{Panel, PanelHit, PanelId, PanelRole, INDENT};
use filecanvas::path::CanonicalPath;
use filecanvas::transfer::{TransferExecutor, TransferReport};
use filecanvas::tree::{RowKind, SortOrder};
use filecanvas::workspace::{ItemOp, Listing, RefreshPlan, Workspace};

const CONTROL_RADIUS: f32 = 8.0;

const ACCENT: egui::Color32 = egui::Color32::from_rgb(59, 130, 246);
const AMBER: egui::Color32 = egui::Color32::from_rgb(245, 158, 11);
const CORAL: egui::Color32 = egui::Color32::from_rgb(239, 68, 68);
const TEAL: egui::Color32 = egui::Color32::from_rgb(20, 184, 166);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let loaded = config::load_settings();
    let settings = match &loaded {
        Ok(settings) => settings.clone(),
        Err(_) => Settings::default(),
    };
    init_tracing(&settings.log_level);
    if let Err(err) = loaded {
        tracing::warn!(%err, "falling back to default settings");
    }
    tracing::info!("starting filecanvas");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("filecanvas-io")
        .build()?;
    let gateway = Arc::new(LocalGateway::new(settings.show_hidden));

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_title("FileCanvas"),
        ..Default::default()
    };

    eframe::run_native(
        "FileCanvas",
        options,
        Box::new(move |cc| {
            configure_custom_style(&cc.egui_ctx);
            Box::new(FileCanvasApp::new(cc.egui_ctx.clone(), runtime, gateway, settings))
        }),
    )?;
    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_filter(filter))
        .try_init();
}

fn configure_custom_style(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();

    let mut visuals = egui::Visuals::dark();
    visuals.panel_fill = egui::Color32::from_rgba_unmultiplied(30, 41, 59, 240);
    visuals.window_fill = egui::Color32::from_rgba_unmultiplied(30, 41, 59, 230);
    visuals.window_stroke = egui::Stroke::new(1.0, egui::Color32::from_rgba_unmultiplied(255, 255, 255, 26));
    visuals.widgets.noninteractive.bg_stroke =
        egui::Stroke::new(1.0, egui::Color32::from_rgba_unmultiplied(255, 255, 255, 13));

    visuals.window_rounding = egui::Rounding::same(12.0);
    visuals.widgets.noninteractive.rounding = egui::Rounding::same(8.0);
    visuals.widgets.inactive.rounding = egui::Rounding::same(8.0);
    visuals.widgets.hovered.rounding = egui::Rounding::same(8.0);
    visuals.widgets.active.rounding = egui::Rounding::same(8.0);
    visuals.window_shadow = egui::epaint::Shadow::NONE;

    style.visuals = visuals;
    style.spacing.item_spacing = egui::vec2(10.0, 6.0);
    style.spacing.button_padding = egui::vec2(12.0, 6.0);

    ctx.set_style(style);
}

/// Results of background gateway work, applied on the UI thread.
enum Event {
    Refreshed {
        panel: PanelId,
        listings: Vec<(CanonicalPath, Listing)>,
    },
    Listed {
        panel: PanelId,
        folder: CanonicalPath,
        listing: Listing,
    },
    DropChecked {
        token: DropToken,
        is_dir: bool,
    },
    BatchDone(TransferReport),
    ItemDone {
        op: ItemOp,
        result: GatewayResult<Option<CanonicalPath>>,
    },
    Revealed(Vec<(PanelId, CanonicalPath, Listing)>),
    Info {
        path: CanonicalPath,
        result: GatewayResult<FileInfo>,
    },
}

enum Drag {
    Panel(PanelId),
    Resize(PanelId),
    Canvas,
    Edge,
}

struct FileCanvasApp {
    workspace: Workspace<LocalGateway>,
    runtime: Runtime,
    ctx: egui::Context,
    tx: Sender<Event>,
    rx: Receiver<Event>,
    path_input: String,
    name_input: String,
    mode: TransferMode,
    show_all: bool,
    is_transferring: bool,
    drag: Option<Drag>,
    selected: Option<AnchorRef>,
    notice_born: HashMap<u64, Instant>,
    properties: Option<FileInfo>,
}

impl FileCanvasApp {
    fn new(ctx: egui::Context, runtime: Runtime, gateway: Arc<LocalGateway>, settings: Settings) -> Self {
        let (tx, rx) = mpsc::channel();
        let mut app = Self {
            workspace: Workspace::new(gateway, &settings),
            runtime,
            ctx,
            tx,
            rx,
            path_input: String::new(),
            name_input: String::new(),
            mode: settings.default_mode,
            show_all: settings.show_all_connections,
            is_transferring: false,
            drag: None,
            selected: None,
            notice_born: HashMap::new(),
            properties: None,
        };
        for seed in &settings.initial_panels {
            let position = (seed.x != 0.0 || seed.y != 0.0).then(|| Vec2::new(seed.x, seed.y));
            app.open_panel(CanonicalPath::from_native(Path::new(&seed.path)), seed.role, position);
        }
        app
    }

    /// Run gateway work on the runtime and post its result back.
    fn spawn<F>(&self, work: F)
    where
        F: std::future::Future<Output = Event> + Send + 'static,
    {
        let tx = self.tx.clone();
        let ctx = self.ctx.clone();
        self.runtime.spawn(async move {
            let event = work.await;
            if tx.send(event).is_ok() {
                ctx.request_repaint();
            }
        });
    }

    fn spawn_refresh(&self, plans: Vec<RefreshPlan>) {
        for plan in plans {
            let gateway = self.workspace.gateway().clone();
            let cache = self.workspace.cache().clone();
            self.spawn(async move {
                let listings = plan.fetch(&cache, gateway.as_ref()).await;
                Event::Refreshed {
                    panel: plan.panel,
                    listings,
                }
            });
        }
    }

    fn open_panel(&mut self, root: CanonicalPath, role: PanelRole, position: Option<Vec2>) {
        let (_, plan) = self.workspace.add_panel(root, role, position);
        self.spawn_refresh(vec![plan]);
    }

    fn request_expand(&mut self, panel: PanelId, folder: CanonicalPath) {
        if !self.workspace.begin_expand(panel, &folder) {
            return;
        }
        let gateway = self.workspace.gateway().clone();
        let cache = self.workspace.cache().clone();
        self.spawn(async move {
            let listing = cache.list(gateway.as_ref(), &folder).await;
            Event::Listed { panel, folder, listing }
        });
    }

    fn request_drop(&mut self, candidate: Option<AnchorRef>) {
        let Some(token) = self.workspace.resolve_drop(candidate) else {
            return;
        };
        let gateway = self.workspace.gateway().clone();
        self.spawn(async move {
            let is_dir = is_directory_or_false(gateway.as_ref(), &token.candidate.path).await;
            Event::DropChecked { token, is_dir }
        });
    }

    fn request_transfer(&mut self, mode: TransferMode) {
        if self.is_transferring {
            return;
        }
        let edges = self.workspace.take_batch();
        self.is_transferring = true;
        let gateway = self.workspace.gateway().clone();
        let cache = self.workspace.cache().clone();
        self.spawn(async move {
            let report = TransferExecutor::execute(&edges, mode, gateway.as_ref(), &cache).await;
            Event::BatchDone(report)
        });
    }

    fn request_item_op(&mut self, op: ItemOp) {
        let gateway = self.workspace.gateway().clone();
        self.spawn(async move {
            let result = op.run(gateway.as_ref()).await;
            Event::ItemDone { op, result }
        });
    }

    fn request_file_info(&self, path: CanonicalPath) {
        let gateway = self.workspace.gateway().clone();
        self.spawn(async move {
            let result = gateway.file_info(&path).await;
            Event::Info { path, result }
        });
    }

    fn request_show_all(&mut self, show_all: bool) {
        let plan = self.workspace.set_show_all(show_all);
        if plan.is_empty() {
            return;
        }
        let gateway = self.workspace.gateway().clone();
        let cache = self.workspace.cache().clone();
        self.spawn(async move {
            let mut listings = Vec::with_capacity(plan.len());
            for (panel, folder) in plan {
                let listing = cache.list(gateway.as_ref(), &folder).await;
                listings.push((panel, folder, listing));
            }
            Event::Revealed(listings)
        });
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Refreshed { panel, listings } => self.workspace.apply_refresh(panel, &listings),
            Event::Listed { panel, folder, listing } => self.workspace.apply_listing(panel, &folder, listing),
            Event::DropChecked { token, is_dir } => {
                self.workspace.finish_drop(token, is_dir);
            }
            Event::BatchDone(report) => {
                self.is_transferring = false;
                let plans = self.workspace.finish_batch(&report);
                self.spawn_refresh(plans);
            }
            Event::ItemDone { op, result } => {
                let plans = self.workspace.finish_item_op(&op, &result);
                if matches!(op, ItemOp::Delete { .. } | ItemOp::Rename { .. }) && result.is_ok() {
                    self.selected = None;
                }
                self.spawn_refresh(plans);
            }
            Event::Revealed(listings) => self.workspace.apply_reveal(listings),
            Event::Info { path, result } => {
                self.properties = self.workspace.finish_file_info(&path, result);
            }
        }
    }

    /// Folder the create buttons act on: the selected folder, the selected
    /// file's parent, or nothing.
    fn selected_folder(&self) -> Option<CanonicalPath> {
        let selected = self.selected.as_ref()?;
        let panel = self.workspace.panels.get(selected.panel)?;
        if &selected.path == panel.root_path() {
            return Some(selected.path.clone());
        }
        match panel.anchor_entry(&selected.path) {
            Some(entry) if entry.is_dir => Some(selected.path.clone()),
            Some(_) => selected.path.parent(),
            None => None,
        }
    }

    fn expire_notices(&mut self) {
        let now = Instant::now();
        for notice in self.workspace.notices.iter() {
            self.notice_born.entry(notice.id).or_insert(now);
        }
        let expired: Vec<u64> = self
            .notice_born
            .iter()
            .filter(|(_, born)| now.duration_since(**born) >= NOTICE_TTL)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            self.workspace.notices.dismiss(id);
            self.notice_born.remove(&id);
        }
        if !self.workspace.notices.is_empty() {
            self.ctx.request_repaint_after(std::time::Duration::from_millis(250));
        }
    }

    fn top_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("FileCanvas");
            ui.separator();

            ui.label("Folder:");
            ui.text_edit_singleline(&mut self.path_input);
            let root = (!self.path_input.trim().is_empty())
                .then(|| CanonicalPath::from_native(Path::new(self.path_input.trim())));
            if ui.button("+ Source").clicked() {
                if let Some(root) = root.clone() {
                    self.open_panel(root, PanelRole::Source, None);
                }
            }
            if ui.button("+ Destination").clicked() {
                if let Some(root) = root {
                    self.open_panel(root, PanelRole::Destination, None);
                }
            }

            ui.separator();
            ui.selectable_value(&mut self.mode, TransferMode::Copy, "Copy");
            ui.selectable_value(&mut self.mode, TransferMode::Move, "Move");
            let label = format!("Execute ({})", self.workspace.graph.len());
            if ui
                .add_enabled(!self.is_transferring, egui::Button::new(label))
                .clicked()
            {
                self.request_transfer(self.mode);
            }
            if self.is_transferring {
                ui.spinner();
            }

            ui.separator();
            if ui.checkbox(&mut self.show_all, "Show all connections").changed() {
                self.request_show_all(self.show_all);
            }
            if ui.button("Clear connections").clicked() {
                self.workspace.clear_connections();
            }
            if ui.button("Clear all").clicked() {
                self.workspace.clear_all();
                self.selected = None;
            }
        });

        ui.horizontal(|ui| {
            match &self.selected {
                Some(selected) => ui.label(format!("Selected: {}", selected.path)),
                None => ui.label("Select a row to create, rename or delete items"),
            };
            ui.separator();
            ui.label("Name:");
            ui.text_edit_singleline(&mut self.name_input);
            let name = self.name_input.trim().to_string();
            let folder = self.selected_folder();
            let has_name = !name.is_empty();

            if ui
                .add_enabled(folder.is_some() && has_name, egui::Button::new("New folder"))
                .clicked()
            {
                if let Some(parent) = folder.clone() {
                    self.request_item_op(ItemOp::CreateFolder { parent, name: name.clone() });
                }
            }
            if ui
                .add_enabled(folder.is_some() && has_name, egui::Button::new("New file"))
                .clicked()
            {
                if let Some(parent) = folder {
                    self.request_item_op(ItemOp::CreateFile { parent, name: name.clone() });
                }
            }

            let item = self
                .selected
                .as_ref()
                .filter(|s| {
                    self.workspace
                        .panels
                        .get(s.panel)
                        .is_some_and(|p| p.root_path() != &s.path)
                })
                .map(|s| s.path.clone());
            if ui
                .add_enabled(item.is_some() && has_name, egui::Button::new("Rename"))
                .clicked()
            {
                if let Some(path) = item.clone() {
                    self.request_item_op(ItemOp::Rename { path, new_name: name });
                }
            }
            if ui.add_enabled(item.is_some(), egui::Button::new("Delete")).clicked() {
                if let Some(path) = item {
                    self.request_item_op(ItemOp::Delete { path });
                }
            }
            let target = self.selected.as_ref().map(|s| s.path.clone());
            if ui.add_enabled(target.is_some(), egui::Button::new("Properties")).clicked() {
                if let Some(path) = target {
                    self.request_file_info(path);
                }
            }

            let sorted = self
                .selected
                .as_ref()
                .and_then(|s| self.workspace.panels.get(s.panel))
                .map(|p| (p.id, p.sort_order()));
            if let Some((id, current)) = sorted {
                ui.separator();
                let mut sort = current;
                egui::ComboBox::from_id_source("panel_sort")
                    .selected_text(format!("Sort: {sort:?}"))
                    .show_ui(ui, |ui| {
                        ui.selectable_value(&mut sort, SortOrder::Name, "Name");
                        ui.selectable_value(&mut sort, SortOrder::Modified, "Modified");
                        ui.selectable_value(&mut sort, SortOrder::Created, "Created");
                    });
                if sort != current {
                    self.workspace.set_sort(id, sort);
                }
            }
        });
    }

    fn handle_pointer(&mut self, ctx: &egui::Context, response: &egui::Response, scene: &Scene) {
        let pointer = ctx.input(|i| i.pointer.hover_pos()).map(to_vec2);

        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.workspace.cancel_pending();
        }

        if response.drag_started() {
            let origin = ctx
                .input(|i| i.pointer.press_origin())
                .map(to_vec2)
                .or(pointer)
                .unwrap_or(Vec2::ZERO);
            let world = self.workspace.canvas.screen_to_world(origin);
            self.drag = match self.workspace.panels.hit_test(world) {
                Some((id, PanelHit::Anchor(path))) => {
                    self.workspace.focus_panel(id);
                    self.workspace
                        .begin_edge(AnchorRef::new(id, path), origin)
                        .then_some(Drag::Edge)
                }
                Some((id, PanelHit::Header)) => {
                    self.workspace.focus_panel(id);
                    Some(Drag::Panel(id))
                }
                Some((id, PanelHit::ResizeHandle)) => {
                    self.workspace.focus_panel(id);
                    Some(Drag::Resize(id))
                }
                Some((id, _)) => {
                    self.workspace.focus_panel(id);
                    None
                }
                None => Some(Drag::Canvas),
            };
        }

        if response.dragged() {
            let delta = response.drag_delta();
            let delta = Vec2::new(delta.x, delta.y);
            let zoom = self.workspace.canvas.zoom_level;
            match &self.drag {
                Some(Drag::Panel(id)) => self.workspace.move_panel(*id, delta / zoom),
                Some(Drag::Resize(id)) => {
                    if let Some(size) = self.workspace.panels.get(*id).map(|p| p.size) {
                        self.workspace.resize_panel(*id, size + delta / zoom);
                    }
                }
                Some(Drag::Canvas) => self.workspace.canvas.pan(delta),
                Some(Drag::Edge) => {
                    if let Some(pointer) = pointer {
                        self.workspace.update_pointer(pointer);
                    }
                }
                None => {}
            }
        }

        if response.drag_released() {
            if let Some(Drag::Edge) = self.drag {
                let candidate = pointer.and_then(|pointer| {
                    geometry::drop_candidate(&self.workspace.panels, &self.workspace.canvas, pointer)
                });
                self.request_drop(candidate);
            }
            self.drag = None;
        }

        if response.clicked() {
            if let Some(point) = response.interact_pointer_pos().map(to_vec2) {
                self.handle_click(point, scene);
            }
        }

        if response.hovered() {
            let (scroll, zoom_delta) = ctx.input(|i| (i.smooth_scroll_delta, i.zoom_delta()));
            if let Some(pointer) = pointer {
                if zoom_delta != 1.0 {
                    self.workspace.canvas.zoom(zoom_delta - 1.0, pointer);
                } else if scroll != egui::Vec2::ZERO {
                    let world = self.workspace.canvas.screen_to_world(pointer);
                    match self.workspace.panels.hit_test(world) {
                        Some((id, _)) => {
                            let zoom = self.workspace.canvas.zoom_level;
                            self.workspace.scroll_panel(id, -scroll.y / zoom);
                        }
                        None => {
                            self.workspace.canvas.pan(Vec2::new(scroll.x, scroll.y));
                            self.workspace.cancel_pending();
                        }
                    }
                }
            }
        }
    }

    fn handle_click(&mut self, point: Vec2, scene: &Scene) {
        if let Some(id) = scene.edge_control_at(point, CONTROL_RADIUS) {
            self.workspace.delete_edge(id);
            return;
        }
        if let Some(key) = scene.summary_control_at(point, CONTROL_RADIUS * 1.5) {
            self.workspace.delete_summary(key);
            return;
        }
        let world = self.workspace.canvas.screen_to_world(point);
        match self.workspace.panels.hit_test(world) {
            Some((id, PanelHit::CloseButton)) => {
                if self.selected.as_ref().is_some_and(|s| s.panel == id) {
                    self.selected = None;
                }
                self.workspace.close_panel(id);
            }
            Some((id, PanelHit::CollapseButton)) => {
                self.workspace.toggle_panel_collapsed(id);
            }
            Some((id, PanelHit::Row(path))) => {
                self.workspace.focus_panel(id);
                let is_dir = self
                    .workspace
                    .panels
                    .get(id)
                    .and_then(|p| p.anchor_entry(&path))
                    .is_some_and(|e| e.is_dir);
                self.selected = Some(AnchorRef::new(id, path.clone()));
                if is_dir {
                    if self.workspace.is_expanded(id, &path) {
                        self.workspace.collapse(id, &path);
                    } else {
                        self.request_expand(id, path);
                    }
                }
            }
            Some((id, PanelHit::Anchor(path))) => {
                self.workspace.focus_panel(id);
                self.selected = Some(AnchorRef::new(id, path));
            }
            Some((id, _)) => self.workspace.focus_panel(id),
            None => {}
        }
    }

    fn paint(&self, ui: &egui::Ui, painter: &egui::Painter, scene: &Scene) {
        let zoom = self.workspace.canvas.zoom_level;
        for panel in self.workspace.panels.iter() {
            self.paint_panel(painter, panel, scene, zoom);
        }

        for summary in scene.visible_summaries() {
            let stroke = egui::Stroke::new(6.0, egui::Color32::from_rgba_unmultiplied(139, 92, 246, 70));
            painter.line_segment([to_pos(summary.start), to_pos(summary.end)], stroke);
            let label = to_pos(summary.label);
            painter.circle_filled(label, CONTROL_RADIUS * 1.5, egui::Color32::from_rgb(139, 92, 246));
            painter.text(
                label,
                egui::Align2::CENTER_CENTER,
                summary.count.to_string(),
                egui::FontId::proportional(12.0),
                egui::Color32::WHITE,
            );
        }

        for edge in scene.visible_edges() {
            let points = bezier_points(edge.start, edge.end);
            let stroke = egui::Stroke::new(2.0, ACCENT);
            if edge.dashed {
                painter.extend(egui::Shape::dashed_line(&points, stroke, 6.0, 4.0));
            } else {
                painter.add(egui::Shape::line(points, stroke));
            }
            paint_arrow_head(painter, edge.start, edge.end, ACCENT);
            let control = to_pos(edge.control);
            painter.circle_filled(control, CONTROL_RADIUS, egui::Color32::from_rgb(30, 41, 59));
            painter.circle_stroke(control, CONTROL_RADIUS, egui::Stroke::new(1.5, CORAL));
            painter.text(
                control,
                egui::Align2::CENTER_CENTER,
                "×",
                egui::FontId::proportional(12.0),
                CORAL,
            );
        }

        if let Some(pending) = &scene.pending {
            let stroke = egui::Stroke::new(2.0, TEAL);
            painter.add(egui::Shape::line(bezier_points(pending.start, pending.end), stroke));
            painter.circle_filled(to_pos(pending.end), 4.0, TEAL);
        }

        if let Some(pointer) = ui.ctx().input(|i| i.pointer.hover_pos()) {
            let point = to_vec2(pointer);
            if let Some(id) = scene.edge_control_at(point, CONTROL_RADIUS) {
                if let Some(edge) = scene.edge(id) {
                    let text = format!("{id}: {} → {}", edge.from.path, edge.to.path);
                    egui::show_tooltip_at_pointer(ui.ctx(), egui::Id::new("edge_tip"), |ui| {
                        ui.label(text);
                    });
                }
            } else if let Some(key) = scene.summary_control_at(point, CONTROL_RADIUS * 1.5) {
                let (a, b) = key.panels();
                let count = self.workspace.graph.summary_count(key);
                egui::show_tooltip_at_pointer(ui.ctx(), egui::Id::new("summary_tip"), |ui| {
                    ui.label(format!("{a} ↔ {b}: {count} connection(s), click to delete all"));
                });
            }
        }
    }

    fn paint_panel(&self, painter: &egui::Painter, panel: &Panel, scene: &Scene, zoom: f32) {
        let canvas = &self.workspace.canvas;
        let frame = to_rect(canvas.rect_to_screen(panel.frame_rect()));
        let role_color = match panel.role {
            PanelRole::Source => ACCENT,
            PanelRole::Destination => AMBER,
        };

        painter.rect(
            frame.translate(egui::vec2(0.0, 2.0)),
            10.0,
            egui::Color32::from_rgba_unmultiplied(0, 0, 0, 40),
            egui::Stroke::NONE,
        );
        painter.rect(
            frame,
            10.0,
            egui::Color32::from_rgb(30, 41, 59),
            egui::Stroke::new(1.0, egui::Color32::from_rgba_unmultiplied(255, 255, 255, 30)),
        );

        let header = to_rect(canvas.rect_to_screen(panel.header_rect()));
        painter.rect_filled(header, 10.0, role_color.gamma_multiply(0.35));
        let title = format!("{} · {}", panel.role.title(), panel.root_path());
        painter.with_clip_rect(header.shrink(4.0)).text(
            header.left_center() + egui::vec2(10.0 * zoom, 0.0),
            egui::Align2::LEFT_CENTER,
            title,
            egui::FontId::proportional(13.0 * zoom),
            egui::Color32::WHITE,
        );
        let collapse = to_rect(canvas.rect_to_screen(panel.collapse_button_rect()));
        painter.text(
            collapse.center(),
            egui::Align2::CENTER_CENTER,
            if panel.collapsed { "▸" } else { "▾" },
            egui::FontId::proportional(14.0 * zoom),
            egui::Color32::WHITE,
        );
        let close = to_rect(canvas.rect_to_screen(panel.close_button_rect()));
        painter.text(
            close.center(),
            egui::Align2::CENTER_CENTER,
            "✕",
            egui::FontId::proportional(13.0 * zoom),
            egui::Color32::WHITE,
        );
        let root_anchor = to_rect(canvas.rect_to_screen(panel.root_anchor_rect()));
        let root_ref = AnchorRef::new(panel.id, panel.root_path().clone());
        paint_anchor(painter, root_anchor, scene.drop_target.as_ref() == Some(&root_ref));

        let Some(viewport) = panel.viewport_rect() else {
            return;
        };
        let clip = to_rect(canvas.rect_to_screen(viewport));
        let body = painter.with_clip_rect(clip.intersect(painter.clip_rect()));
        let font = egui::FontId::proportional(13.0 * zoom);

        for index in panel.visible_row_range() {
            let row = &panel.rows()[index];
            let rect = to_rect(canvas.rect_to_screen(panel.row_rect(index)));
            let text_x = rect.left() + (row.depth as f32 * INDENT + 4.0) * zoom;
            let (label, color) = match &row.kind {
                RowKind::Entry(entry) => {
                    let icon = match (entry.is_dir, row.expanded) {
                        (true, true) => "▾ 📂",
                        (true, false) => "▸ 📁",
                        (false, _) => "  📄",
                    };
                    (format!("{icon} {}", entry.name), egui::Color32::WHITE)
                }
                RowKind::Loading => (String::from("Loading..."), egui::Color32::GRAY),
                RowKind::Empty => (String::from("(empty)"), egui::Color32::GRAY),
                RowKind::Error(message) => (message.clone(), CORAL),
                RowKind::Root => continue,
            };

            if let Some(path) = row.anchor_path() {
                let anchor = AnchorRef::new(panel.id, path.clone());
                if self.selected.as_ref() == Some(&anchor) {
                    body.rect_filled(rect, 4.0, egui::Color32::from_rgba_unmultiplied(255, 255, 255, 20));
                }
                if scene.transferred.contains(&anchor) {
                    body.rect_filled(rect, 4.0, TEAL.gamma_multiply(0.25));
                }
                let is_target = scene.drop_target.as_ref() == Some(&anchor);
                if is_target {
                    body.rect_stroke(rect, 4.0, egui::Stroke::new(1.5, TEAL));
                }
                if let Some(anchor_rect) = panel.anchor_rect(path) {
                    paint_anchor(&body, to_rect(canvas.rect_to_screen(anchor_rect)), is_target);
                }
                if let Some(marker) = scene.markers.iter().find(|m| m.anchor == anchor) {
                    let ids: Vec<String> = marker.edges.iter().map(|id| id.to_string()).collect();
                    body.text(
                        to_pos(marker.center) - egui::vec2(10.0 * zoom, 0.0),
                        egui::Align2::RIGHT_CENTER,
                        ids.join(" "),
                        egui::FontId::proportional(11.0 * zoom),
                        ACCENT,
                    );
                }
            }

            body.text(egui::pos2(text_x, rect.center().y), egui::Align2::LEFT_CENTER, label, font.clone(), color);
        }

        let handle = to_rect(canvas.rect_to_screen(panel.resize_handle_rect()));
        painter.line_segment(
            [handle.left_bottom(), handle.right_top()],
            egui::Stroke::new(1.0, egui::Color32::from_rgba_unmultiplied(255, 255, 255, 60)),
        );
    }

    fn properties_window(&mut self, ctx: &egui::Context) {
        let Some(info) = &self.properties else {
            return;
        };
        let mut open = true;
        egui::Window::new("Properties")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                egui::Grid::new("properties_grid").num_columns(2).show(ui, |ui| {
                    ui.label("Name");
                    ui.label(info.name.as_str());
                    ui.end_row();
                    ui.label("Path");
                    ui.label(info.path.as_str());
                    ui.end_row();
                    ui.label("Kind");
                    ui.label(if info.is_dir { "Folder" } else { "File" });
                    ui.end_row();
                    ui.label("Size");
                    ui.label(format_size(info.size));
                    ui.end_row();
                    ui.label("Modified");
                    ui.label(format_millis(info.modified_at));
                    ui.end_row();
                    ui.label("Created");
                    ui.label(format_millis(info.created_at));
                    ui.end_row();
                });
            });
        if !open {
            self.properties = None;
        }
    }

    fn notices_overlay(&mut self, ctx: &egui::Context) {
        let mut dismissed = Vec::new();
        egui::Area::new(egui::Id::new("notices"))
            .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-16.0, -16.0))
            .show(ctx, |ui| {
                for notice in self.workspace.notices.iter() {
                    let color = match notice.level {
                        NoticeLevel::Info => ACCENT,
                        NoticeLevel::Success => TEAL,
                        NoticeLevel::Error => CORAL,
                    };
                    egui::Frame::popup(ui.style()).stroke(egui::Stroke::new(1.0, color)).show(ui, |ui| {
                        ui.horizontal(|ui| {
                            ui.colored_label(color, notice.message.as_str());
                            if ui.small_button("✕").clicked() {
                                dismissed.push(notice.id);
                            }
                        });
                    });
                }
            });
        for id in dismissed {
            self.workspace.notices.dismiss(id);
            self.notice_born.remove(&id);
        }
    }
}

impl eframe::App for FileCanvasApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        while let Ok(event) = self.rx.try_recv() {
            self.handle_event(event);
        }
        self.expire_notices();

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            self.top_bar(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let rect = ui.available_rect_before_wrap();
            let viewport = self.workspace.canvas.viewport_rect;
            let current = Rect::new(rect.min.x, rect.min.y, rect.width(), rect.height());
            if viewport != current {
                self.workspace.resize_viewport(current.x, current.y, current.width, current.height);
            }

            let response = ui.allocate_rect(rect, egui::Sense::click_and_drag());
            let before = self.workspace.scene();
            self.handle_pointer(ctx, &response, &before);

            let scene = self.workspace.scene();
            let painter = ui.painter_at(rect);
            painter.rect_filled(rect, 0.0, egui::Color32::from_rgb(15, 23, 42));
            self.paint(ui, &painter, &scene);

            if self.drag.is_some() || scene.pending.is_some() {
                ctx.request_repaint();
            }
        });

        self.properties_window(ctx);
        self.notices_overlay(ctx);
    }
}

fn to_vec2(p: egui::Pos2) -> Vec2 {
    Vec2::new(p.x, p.y)
}

fn to_pos(v: Vec2) -> egui::Pos2 {
    egui::pos2(v.x, v.y)
}

fn to_rect(r: Rect) -> egui::Rect {
    egui::Rect::from_min_size(egui::pos2(r.x, r.y), egui::vec2(r.width, r.height))
}

/// Horizontal-tangent cubic between two points, flattened for painting.
fn bezier_points(start: Vec2, end: Vec2) -> Vec<egui::Pos2> {
    let bend = ((end.x - start.x).abs() * 0.5).max(40.0);
    let direction = if end.x >= start.x { 1.0 } else { -1.0 };
    let c1 = start + Vec2::new(bend * direction, 0.0);
    let c2 = end - Vec2::new(bend * direction, 0.0);
    const STEPS: usize = 24;
    (0..=STEPS)
        .map(|i| {
            let t = i as f32 / STEPS as f32;
            let u = 1.0 - t;
            let p = start * (u * u * u) + c1 * (3.0 * u * u * t) + c2 * (3.0 * u * t * t) + end * (t * t * t);
            to_pos(p)
        })
        .collect()
}

fn paint_arrow_head(painter: &egui::Painter, start: Vec2, end: Vec2, color: egui::Color32) {
    let direction = if end.x >= start.x { 1.0 } else { -1.0 };
    let tip = to_pos(end);
    let back = egui::vec2(-8.0 * direction, 0.0);
    painter.add(egui::Shape::convex_polygon(
        vec![tip, tip + back + egui::vec2(0.0, -4.0), tip + back + egui::vec2(0.0, 4.0)],
        color,
        egui::Stroke::NONE,
    ));
}

fn paint_anchor(painter: &egui::Painter, rect: egui::Rect, highlighted: bool) {
    let radius = rect.width() * 0.5;
    let fill = if highlighted { TEAL } else { egui::Color32::from_rgb(100, 116, 139) };
    painter.circle_filled(rect.center(), radius, fill);
    painter.circle_stroke(rect.center(), radius, egui::Stroke::new(1.0, egui::Color32::WHITE));
}

fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} B", size)
    }
}

/// Age of a Unix-millisecond timestamp, relative to now.
fn format_millis(millis: Option<u64>) -> String {
    let Some(millis) = millis else {
        return String::from("unknown");
    };
    let stamp = std::time::UNIX_EPOCH + std::time::Duration::from_millis(millis);
    match std::time::SystemTime::now().duration_since(stamp) {
        Ok(age) if age.as_secs() < 60 => String::from("just now"),
        Ok(age) if age.as_secs() < 3600 => format!("{} min ago", age.as_secs() / 60),
        Ok(age) if age.as_secs() < 86_400 => format!("{} h ago", age.as_secs() / 3600),
        Ok(age) => format!("{} days ago", age.as_secs() / 86_400),
        Err(_) => String::from("in the future"),
    }
}
