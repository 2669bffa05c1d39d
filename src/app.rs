// app.rs — editor state and the egui panels around the viewer
//
// The viewer is immediate-mode: every frame reads the pointer from egui,
// moves the camera, snapshots a resolver from the settled camera, feeds the
// drag controller, then paints markers from the same snapshot.

use std::collections::HashMap;
use std::path::PathBuf;

use egui::{Align2, Color32, FontId, Pos2, Rect, Sense, Stroke};
use hotspot_mapper::config::{AppConfig, ViewerMode};
use hotspot_mapper::drag::{DragController, DragEvent, MarkerState};
use hotspot_mapper::export;
use hotspot_mapper::geometry::{self, CoordinateSpace, Position};
use hotspot_mapper::i18n::{self, tr, tr_with};
use hotspot_mapper::loader::LoadResult;
use hotspot_mapper::panorama::OrbitCamera;
use hotspot_mapper::projection::{FlatResolver, SphereResolver, SurfaceResolver};
use hotspot_mapper::resource::{HandleLedger, ImageHandle};
use hotspot_mapper::store::{FileId, Hotspot, HotspotFile, HotspotId, HotspotStore};
use hotspot_mapper::viewport::{FlatView, ScreenRect};

use crate::renderer::ScenePass;

const MARKER_RADIUS: f32 = 8.0;
/// Wheel delta egui reports for one notch.
const POINTS_PER_NOTCH: f32 = 50.0;
const COPIED_SECONDS: f64 = 2.0;

const SELECTED: Color32 = Color32::from_rgb(59, 130, 246);
const HOVERED: Color32 = Color32::from_rgb(209, 213, 219);
const IDLE: Color32 = Color32::from_rgb(239, 68, 68);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Files,
    Hotspots,
    Sql,
    Csv,
}

/// Requests the UI hands back to the window loop.
#[derive(Debug, Default)]
pub struct UiActions {
    pub open_dialog: bool,
    pub toggle_fullscreen: bool,
    pub exit: bool,
    pub lang_changed: bool,
    /// File whose image the user wants to swap for another.
    pub replace_file: Option<FileId>,
}

/// Pointer resolver for whichever viewer is active.
enum Surface {
    Sphere(SphereResolver),
    Flat(FlatResolver),
}

impl SurfaceResolver for Surface {
    fn resolve(&self, pointer: (f64, f64)) -> Option<Position> {
        match self {
            Self::Sphere(r) => r.resolve(pointer),
            Self::Flat(r) => r.resolve(pointer),
        }
    }
}

impl Surface {
    fn marker_screen(&self, file: &HotspotFile, hotspot: &Hotspot) -> Option<Pos2> {
        let (x, y) = match self {
            Self::Sphere(r) => r.to_screen(hotspot.position, file.space, file.equirect)?,
            Self::Flat(r) => r.to_screen(hotspot.position)?,
        };
        Some(Pos2::new(x as f32, y as f32))
    }
}

struct Marker {
    id: HotspotId,
    title: String,
    at: Pos2,
}

enum ListAction {
    Select(HotspotId),
    StartRename(HotspotId, String),
    CommitRename,
    CancelRename,
    Delete(HotspotId),
}

pub struct EditorApp {
    pub config: AppConfig,
    pub mode: ViewerMode,
    pub store: HotspotStore,
    pub ledger: HandleLedger,
    pub drag: DragController,
    pub camera: OrbitCamera,
    pub flat_view: FlatView,
    flat_fitted: Option<(FileId, (f64, f64))>,
    flat_textures: HashMap<FileId, egui::TextureHandle>,
    pub max_texture_side: u32,

    pub tab: Tab,
    pub group_id: String,
    sql_cache: Option<(u64, String, String)>,
    revision: u64,
    copied_at: Option<f64>,
    editing: Option<(HotspotId, String)>,
    focus_edit: bool,

    hovered: Option<HotspotId>,
    pointer_inside: bool,
    camera_drag: bool,
    pointer_position: Option<Position>,

    replace_request: Option<FileId>,
    pending_replacements: HashMap<PathBuf, FileId>,

    pub loading: usize,
    pub last_error: Option<String>,
    pub show_fps: bool,
    pub is_fullscreen: bool,
    pub current_lang: String,
}

impl EditorApp {
    pub fn new(config: AppConfig) -> Self {
        let mode = config.mode;
        let mut camera = OrbitCamera::new();
        camera.sensitivity_scale = config.sensitivity;
        Self {
            current_lang: config.lang.clone(),
            config,
            mode,
            store: HotspotStore::new(),
            ledger: HandleLedger::new(),
            drag: DragController::new(mode.leave_policy()),
            camera,
            flat_view: FlatView::identity(),
            flat_fitted: None,
            flat_textures: HashMap::new(),
            max_texture_side: 8192,
            tab: Tab::Files,
            group_id: String::new(),
            sql_cache: None,
            revision: 0,
            copied_at: None,
            editing: None,
            focus_edit: false,
            hovered: None,
            pointer_inside: false,
            camera_drag: false,
            pointer_position: None,
            replace_request: None,
            pending_replacements: HashMap::new(),
            loading: 0,
            last_error: None,
            show_fps: false,
            is_fullscreen: false,
        }
    }

    pub fn title(&self) -> String {
        match self.mode {
            ViewerMode::Panorama => tr("app.title"),
            ViewerMode::Flat => tr("app.title.flat"),
        }
    }

    // ---- state transitions -------------------------------------------------

    /// Take a finished background load. Failures leave the store untouched
    /// and surface in the status bar.
    pub fn on_image_loaded(&mut self, result: LoadResult) {
        self.loading = self.loading.saturating_sub(1);
        match result {
            Ok(loaded) => {
                let target = self
                    .pending_replacements
                    .remove(&loaded.path)
                    .filter(|id| self.store.file(*id).is_some());
                let handle = self.ledger.acquire(&loaded.file_name, loaded.pixels);
                match target {
                    Some(id) => self.replace_image(id, loaded.file_name, handle),
                    None => {
                        self.store
                            .add_file(loaded.file_name, handle, self.mode.space(), self.config.equirect());
                        self.on_file_switched();
                    }
                }
                self.last_error = None;
            }
            Err(e) => {
                log::error!("{e}");
                self.pending_replacements.remove(e.path());
                self.last_error = Some(e.to_string());
            }
        }
        self.touch();
    }

    /// Route the next load of `path` into file `id` instead of adding a file.
    pub fn queue_replacement(&mut self, path: PathBuf, id: FileId) {
        self.pending_replacements.insert(path, id);
    }

    fn replace_image(&mut self, id: FileId, file_name: String, handle: ImageHandle) {
        log::info!("replacing image of file {id} with {file_name}");
        self.store.replace_image(id, file_name, handle);
        self.flat_textures.remove(&id);
        if self.store.active_file_id() == Some(id) {
            self.on_file_switched();
        }
    }

    pub fn select_file(&mut self, id: FileId) {
        if self.store.active_file_id() != Some(id) {
            self.store.select_file(id);
            self.on_file_switched();
        }
    }

    pub fn delete_file(&mut self, id: FileId) {
        let was_active = self.store.active_file_id() == Some(id);
        self.store.remove_file(id);
        self.flat_textures.remove(&id);
        if was_active {
            self.on_file_switched();
        }
        self.touch();
    }

    pub fn add_hotspot(&mut self) -> Option<Hotspot> {
        let file = self.store.active_file_id()?;
        let hotspot = self.store.add_hotspot(file);
        self.touch();
        hotspot
    }

    pub fn delete_hotspot(&mut self, id: HotspotId) {
        self.drag.forget(id);
        if self.hovered == Some(id) {
            self.hovered = None;
        }
        if self.editing.as_ref().is_some_and(|(e, _)| *e == id) {
            self.editing = None;
        }
        self.store.remove_hotspot(id);
        self.touch();
    }

    pub fn rename_hotspot(&mut self, id: HotspotId, title: &str) {
        self.store.rename(id, title);
        self.touch();
    }

    pub fn move_hotspot(&mut self, id: HotspotId, position: Position) {
        self.store.move_hotspot(id, position);
        self.touch();
    }

    fn apply(&mut self, event: Option<DragEvent>) {
        let Some(event) = event else { return };
        if let Some(position) = event.position() {
            self.move_hotspot(event.id(), position);
        }
        if let DragEvent::Ended { id, .. } = event {
            log::debug!("drag on {id} ended");
        }
    }

    fn on_file_switched(&mut self) {
        self.drag.clear();
        self.hovered = None;
        self.editing = None;
        self.camera_drag = false;
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// SQL for the current store and group id. Row ids are generated once
    /// per store revision so the text stays stable between frames.
    pub fn sql(&mut self) -> &str {
        let stale = !matches!(&self.sql_cache, Some((rev, group, _)) if *rev == self.revision && *group == self.group_id);
        if stale {
            let sql = export::generate_sql(self.store.files(), &self.group_id);
            self.sql_cache = Some((self.revision, self.group_id.clone(), sql));
        }
        self.sql_cache.as_ref().map(|(_, _, s)| s.as_str()).unwrap_or_default()
    }

    /// Switch the UI language and report whether it changed.
    pub fn set_language(&mut self, code: &str) -> bool {
        if self.current_lang == code {
            return false;
        }
        self.current_lang = code.to_string();
        i18n::init(code);
        true
    }

    // ---- UI ---------------------------------------------------------------

    pub fn draw_ui(&mut self, ctx: &egui::Context, fps: f32) -> (UiActions, Option<ScenePass>) {
        let mut actions = UiActions::default();

        self.menu_bar(ctx, &mut actions);
        self.status_bar(ctx, fps);

        egui::SidePanel::right("side_panel")
            .resizable(true)
            .default_width(360.0)
            .show(ctx, |ui| self.side_panel(ui));

        let mut scene = None;
        let frame = match self.mode {
            ViewerMode::Panorama => egui::Frame::none(),
            ViewerMode::Flat => egui::Frame::none().fill(Color32::from_gray(24)),
        };
        egui::CentralPanel::default().frame(frame).show(ctx, |ui| {
            scene = self.viewer(ui);
        });

        actions.replace_file = self.replace_request.take();
        (actions, scene)
    }

    fn menu_bar(&mut self, ctx: &egui::Context, actions: &mut UiActions) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button(tr("menu.file"), |ui| {
                    if ui.button(tr("menu.open_image")).clicked() {
                        actions.open_dialog = true;
                        ui.close_menu();
                    }
                    if ui.button(tr("menu.exit")).clicked() {
                        actions.exit = true;
                        ui.close_menu();
                    }
                });

                ui.menu_button(tr("menu.view"), |ui| {
                    if ui.button(tr("view.reset")).clicked() {
                        match self.mode {
                            ViewerMode::Panorama => self.camera.reset(),
                            ViewerMode::Flat => self.flat_fitted = None,
                        }
                        ui.close_menu();
                    }

                    let label = if self.is_fullscreen {
                        tr("view.fullscreen.exit")
                    } else {
                        tr("view.fullscreen.enter")
                    };
                    if ui.button(label).clicked() {
                        actions.toggle_fullscreen = true;
                        ui.close_menu();
                    }

                    if self.mode == ViewerMode::Panorama {
                        ui.separator();
                        ui.menu_button(tr("view.input_sensitivity"), |ui| {
                            ui.add(
                                egui::Slider::new(&mut self.camera.sensitivity_scale, 0.1..=5.0)
                                    .text(tr("view.multiplier")),
                            );
                            if ui.button(tr("view.reset_1_0")).clicked() {
                                self.camera.sensitivity_scale = 1.0;
                            }
                        });
                    }

                    ui.separator();
                    if ui.checkbox(&mut self.show_fps, tr("view.show_fps")).clicked() {
                        ui.close_menu();
                    }
                });

                ui.menu_button(tr("menu.language"), |ui| {
                    for (code, name) in i18n::LANGUAGES {
                        if ui.radio(self.current_lang == code, name).clicked() {
                            actions.lang_changed |= self.set_language(code);
                            ui.close_menu();
                        }
                    }
                });
            });
        });
    }

    fn status_bar(&self, ctx: &egui::Context, fps: f32) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if self.loading > 0 {
                    ui.label(egui::RichText::new(tr("status.loading_image")).color(Color32::YELLOW));
                    ui.label("|");
                }
                if let Some(err) = &self.last_error {
                    ui.label(egui::RichText::new(tr("status.load_error")).color(Color32::LIGHT_RED))
                        .on_hover_text(err.as_str());
                    ui.label("|");
                }

                let mode = match self.mode {
                    ViewerMode::Panorama => tr("status.mode.panorama"),
                    ViewerMode::Flat => tr("status.mode.flat"),
                };
                ui.label(format!("{} {mode}", tr("status.mode_prefix")));
                ui.label("|");

                match self.mode {
                    ViewerMode::Panorama => {
                        ui.label(format!("FOV: {:.1}°", self.camera.fov));
                        ui.label("|");
                        ui.label(format!("Yaw: {:.1}°", self.camera.yaw));
                        ui.label("|");
                        ui.label(format!("Pitch: {:.1}°", self.camera.pitch));
                    }
                    ViewerMode::Flat => {
                        ui.label(format!("{}: {:.0}%", tr("status.scale"), self.flat_view.scale * 100.0));
                    }
                }

                if let Some(p) = self.pointer_position {
                    ui.label("|");
                    let text = match self.mode.space() {
                        CoordinateSpace::Sphere => format!("({:.2}, {:.2}, {:.2})", p.x, p.y, p.z),
                        CoordinateSpace::Pixel => format!("({:.0}, {:.0})", p.x, p.y),
                    };
                    ui.label(format!("{} {text}", tr("status.pointer")));
                }

                if let Some(h) = self.drag.dragging().and_then(|id| self.store.active_file()?.hotspot(id)) {
                    ui.label("|");
                    ui.label(
                        egui::RichText::new(tr_with("status.dragging", &[("title", h.title.clone())]))
                            .color(SELECTED),
                    );
                }

                if self.show_fps {
                    ui.label("|");
                    ui.label(egui::RichText::new(format!("FPS: {fps:.1}")).color(Color32::GREEN));
                }
            });
        });
    }

    fn side_panel(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.selectable_value(&mut self.tab, Tab::Files, tr("tab.files"));
            ui.selectable_value(&mut self.tab, Tab::Hotspots, tr("tab.hotspots"));
            ui.selectable_value(&mut self.tab, Tab::Sql, tr("tab.sql"));
            ui.selectable_value(&mut self.tab, Tab::Csv, tr("tab.csv"));
        });
        ui.separator();

        egui::ScrollArea::vertical().auto_shrink([false, false]).show(ui, |ui| match self.tab {
            Tab::Files => self.files_tab(ui),
            Tab::Hotspots => self.hotspots_tab(ui),
            Tab::Sql => self.sql_tab(ui),
            Tab::Csv => self.csv_tab(ui),
        });
    }

    fn files_tab(&mut self, ui: &mut egui::Ui) {
        if self.store.files().is_empty() {
            ui.label(tr("files.empty"));
            return;
        }

        let active = self.store.active_file_id();
        let rows: Vec<(FileId, String, usize)> = self
            .store
            .files()
            .iter()
            .map(|f| (f.id, f.file_name.clone(), f.hotspots.len()))
            .collect();

        let mut select = None;
        let mut delete = None;
        for (id, name, count) in rows {
            ui.horizontal(|ui| {
                let count = if count == 1 {
                    tr("files.hotspot_count_one")
                } else {
                    tr_with("files.hotspot_count", &[("count", count.to_string())])
                };
                if ui.selectable_label(active == Some(id), format!("{name}  ({count})")).clicked() {
                    select = Some(id);
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.small_button("✖").on_hover_text(tr("files.delete")).clicked() {
                        delete = Some(id);
                    }
                    if ui.small_button("⟳").on_hover_text(tr("files.replace")).clicked() {
                        self.replace_request = Some(id);
                    }
                });
            });
        }

        if let Some(id) = select {
            self.select_file(id);
        }
        if let Some(id) = delete {
            self.delete_file(id);
        }
    }

    fn hotspots_tab(&mut self, ui: &mut egui::Ui) {
        let Some(file) = self.store.active_file() else {
            ui.label(tr("hotspots.no_file"));
            return;
        };
        let space = file.space;
        let equirect = file.equirect;
        let file_id = file.id;
        let size_override = file.size_override;
        let natural = file.image().natural_size();
        let hotspots = file.hotspots.clone();

        let add_label = match space {
            CoordinateSpace::Sphere => tr("hotspots.add"),
            CoordinateSpace::Pixel => tr("hotspots.add_marker"),
        };
        if ui.button(add_label).clicked() {
            self.add_hotspot();
        }
        ui.separator();

        if hotspots.is_empty() {
            ui.label(tr("hotspots.empty"));
        }

        let selected = self.store.selected_id();
        let mut action = None;
        for h in &hotspots {
            ui.horizontal(|ui| {
                match &mut self.editing {
                    Some((id, buffer)) if *id == h.id => {
                        let resp = ui.text_edit_singleline(buffer);
                        if self.focus_edit {
                            resp.request_focus();
                            self.focus_edit = false;
                        }
                        if ui.input(|i| i.key_pressed(egui::Key::Escape)) {
                            action = Some(ListAction::CancelRename);
                        } else if resp.lost_focus() {
                            action = Some(ListAction::CommitRename);
                        }
                    }
                    _ => {
                        let resp = ui
                            .selectable_label(selected == Some(h.id), h.title.as_str())
                            .on_hover_ui(|ui| hotspot_tooltip(ui, h, space, equirect));
                        if resp.double_clicked() {
                            action = Some(ListAction::StartRename(h.id, h.title.clone()));
                        } else if resp.clicked() {
                            action = Some(ListAction::Select(h.id));
                        }
                    }
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.small_button("✖").on_hover_text(tr("hotspots.delete")).clicked() {
                        action = Some(ListAction::Delete(h.id));
                    }
                });
            });
        }
        if !hotspots.is_empty() {
            ui.label(egui::RichText::new(tr("hotspots.rename_hint")).weak().small());
        }

        match action {
            Some(ListAction::Select(id)) => {
                self.store.select(Some(id));
            }
            Some(ListAction::StartRename(id, title)) => {
                self.editing = Some((id, title));
                self.focus_edit = true;
            }
            Some(ListAction::CommitRename) => {
                if let Some((id, title)) = self.editing.take() {
                    self.rename_hotspot(id, &title);
                }
            }
            Some(ListAction::CancelRename) => self.editing = None,
            Some(ListAction::Delete(id)) => self.delete_hotspot(id),
            None => {}
        }

        if let Some(h) = self.store.selected().cloned() {
            ui.separator();
            ui.strong(tr("position.title"));
            let mut p = h.position;
            let (range, speed) = match space {
                CoordinateSpace::Sphere => (-100.0..=100.0, 0.01),
                CoordinateSpace::Pixel => (0.0..=10000.0, 1.0),
            };
            let mut changed = false;
            ui.horizontal(|ui| {
                ui.label("X");
                changed |= ui.add(egui::DragValue::new(&mut p.x).speed(speed).clamp_range(range.clone())).changed();
                ui.label("Y");
                changed |= ui.add(egui::DragValue::new(&mut p.y).speed(speed).clamp_range(range.clone())).changed();
                if space == CoordinateSpace::Sphere {
                    ui.label("Z");
                    changed |= ui.add(egui::DragValue::new(&mut p.z).speed(speed).clamp_range(range.clone())).changed();
                }
            });
            if changed {
                self.move_hotspot(h.id, p);
            }
        }

        if space == CoordinateSpace::Pixel {
            ui.separator();
            ui.strong(tr("size.title"));
            let mut w = size_override.0.unwrap_or(0);
            let mut hgt = size_override.1.unwrap_or(0);
            let auto = tr("size.auto");
            let mut changed = false;
            ui.horizontal(|ui| {
                ui.label(tr("size.width"));
                changed |= ui
                    .add(egui::DragValue::new(&mut w).clamp_range(0..=20000).custom_formatter(|v, _| {
                        if v == 0.0 {
                            format!("{auto} ({})", natural.0)
                        } else {
                            format!("{v:.0}")
                        }
                    }))
                    .changed();
                ui.label(tr("size.height"));
                changed |= ui
                    .add(egui::DragValue::new(&mut hgt).clamp_range(0..=20000).custom_formatter(|v, _| {
                        if v == 0.0 {
                            format!("{auto} ({})", natural.1)
                        } else {
                            format!("{v:.0}")
                        }
                    }))
                    .changed();
            });
            if changed {
                self.store.set_size_override(file_id, Some(w), Some(hgt));
            }
        }
    }

    fn sql_tab(&mut self, ui: &mut egui::Ui) {
        ui.label(tr("sql.group_id"));
        ui.add(egui::TextEdit::singleline(&mut self.group_id).hint_text(tr("sql.group_placeholder")));
        ui.add_space(6.0);

        ui.horizontal(|ui| {
            ui.label(tr("sql.files"));
            ui.strong(self.store.files().len().to_string());
            ui.label(tr("sql.total"));
            ui.strong(self.store.total_hotspots().to_string());
        });
        ui.separator();

        let has_group = !self.group_id.trim().is_empty();
        let has_hotspots = self.store.total_hotspots() > 0;
        let now = ui.input(|i| i.time);
        let copied = self.copied_at.is_some_and(|t| now - t < COPIED_SECONDS);

        ui.horizontal(|ui| {
            ui.strong(tr("sql.generated"));
            if has_group && has_hotspots {
                let label = if copied { tr("sql.copied") } else { tr("sql.copy") };
                if ui.button(label).clicked() {
                    let sql = self.sql().to_string();
                    ui.ctx().output_mut(|o| o.copied_text = sql);
                    self.copied_at = Some(now);
                }
            }
        });

        let mut text = if !has_group {
            tr("sql.need_group")
        } else if !has_hotspots {
            tr("sql.need_hotspots")
        } else {
            self.sql().to_string()
        };
        ui.add(
            egui::TextEdit::multiline(&mut text)
                .code_editor()
                .desired_rows(16)
                .desired_width(f32::INFINITY)
                .interactive(has_group && has_hotspots),
        );
    }

    fn csv_tab(&mut self, ui: &mut egui::Ui) {
        let Some(file) = self.store.active_file() else {
            ui.label(tr("hotspots.no_file"));
            return;
        };
        let rows = export::table_rows(file);
        if rows.is_empty() {
            ui.label(tr("csv.empty"));
            return;
        }

        if ui.button(tr("csv.copy")).clicked() {
            let csv = export::to_csv(&rows);
            ui.ctx().output_mut(|o| o.copied_text = csv);
        }
        ui.add_space(4.0);

        egui::Grid::new("csv_table").striped(true).show(ui, |ui| {
            for key in [
                "csv.title",
                "csv.sphere_x",
                "csv.sphere_y",
                "csv.sphere_z",
                "csv.pixel_x",
                "csv.pixel_y",
                "csv.pixel_z",
            ] {
                ui.strong(tr(key));
            }
            ui.end_row();

            for row in &rows {
                ui.label(row.title.as_str());
                ui.monospace(format!("{:.2}", row.raw.x));
                ui.monospace(format!("{:.2}", row.raw.y));
                ui.monospace(format!("{:.2}", row.raw.z));
                ui.monospace(format!("{:.0}", row.pixel.px));
                ui.monospace(format!("{:.0}", row.pixel.py));
                ui.monospace(format!("{:.0}", row.pixel.pz));
                ui.end_row();
            }
        });
    }

    // ---- viewer -----------------------------------------------------------

    fn viewer(&mut self, ui: &mut egui::Ui) -> Option<ScenePass> {
        let rect = ui.max_rect();
        let _response = ui.allocate_rect(rect, Sense::click_and_drag());
        let viewport = screen_rect(rect);

        let (pointer, pressed, released, down, delta, scroll) = ui.input(|i| {
            (
                i.pointer.hover_pos(),
                i.pointer.primary_pressed(),
                i.pointer.primary_released(),
                i.pointer.primary_down(),
                i.pointer.delta(),
                i.scroll_delta.y,
            )
        });
        let pointer_xy = pointer.map(|p| (f64::from(p.x), f64::from(p.y)));
        let inside = pointer_xy.is_some_and(|(x, y)| viewport.contains(x, y)) && ui.rect_contains_pointer(rect);
        let left = self.pointer_inside && !inside;
        self.pointer_inside = inside;

        let Some(file) = self.store.active_file() else {
            self.end_gestures(left, released);
            self.pointer_position = None;
            let text = if self.loading > 0 { tr("status.loading_image") } else { tr("viewer.empty") };
            ui.painter().text(rect.center(), Align2::CENTER_CENTER, text, FontId::proportional(18.0), Color32::GRAY);
            return None;
        };
        let file_id = file.id;
        let logical = file.logical_size();

        if self.mode == ViewerMode::Flat && self.flat_fitted != Some((file_id, logical)) {
            self.flat_view = FlatView::fit(viewport, logical);
            self.flat_fitted = Some((file_id, logical));
        }

        // camera moves first so this frame's snapshot sees them
        if self.drag.camera_controls_enabled() {
            if self.camera_drag && down && delta != egui::Vec2::ZERO {
                match self.mode {
                    ViewerMode::Panorama => self.camera.orbit_by_pixels(
                        f64::from(delta.x),
                        f64::from(delta.y),
                        viewport.width,
                        viewport.height,
                    ),
                    ViewerMode::Flat => self.flat_view.pan_by(f64::from(delta.x), f64::from(delta.y)),
                }
            }
            if inside && scroll != 0.0 {
                let notches = f64::from(scroll / POINTS_PER_NOTCH);
                match self.mode {
                    ViewerMode::Panorama => self.camera.zoom_by(notches),
                    ViewerMode::Flat => {
                        if let Some(p) = pointer {
                            self.flat_view
                                .zoom_by(viewport, (f64::from(p.x), f64::from(p.y)), notches);
                        }
                    }
                }
            }
        }

        let camera = self.camera.snapshot(viewport.aspect());
        let surface = match self.mode {
            ViewerMode::Panorama => Surface::Sphere(SphereResolver {
                camera,
                viewport,
                radius: self.config.sphere_radius,
            }),
            ViewerMode::Flat => Surface::Flat(FlatResolver::new(self.flat_view, viewport, logical, logical)),
        };

        // this frame's motion lands before a release or leave ends the drag
        if self.drag.is_dragging() {
            if let Some(p) = pointer.map(|p| rect.clamp(p)) {
                let p = (f64::from(p.x), f64::from(p.y));
                let event = if delta != egui::Vec2::ZERO {
                    self.drag.pointer_move(p, &surface)
                } else {
                    self.drag.frame_tick(|| surface.resolve(p))
                };
                self.apply(event);
            }
        }
        self.end_gestures(left, released);

        let Some(file) = self.store.active_file() else { return None };
        let markers: Vec<Marker> = file
            .hotspots
            .iter()
            .filter_map(|h| {
                Some(Marker {
                    id: h.id,
                    title: h.title.clone(),
                    at: surface.marker_screen(file, h)?,
                })
            })
            .collect();

        let hit = pointer.filter(|_| inside).and_then(|p| {
            markers
                .iter()
                .filter(|m| m.at.distance(p) <= MARKER_RADIUS + 2.0)
                .min_by(|a, b| a.at.distance(p).total_cmp(&b.at.distance(p)))
                .map(|m| m.id)
        });
        if hit != self.hovered {
            if let Some(old) = self.hovered {
                let event = self.drag.pointer_leave(old);
                self.apply(event);
            }
            if let Some(new) = hit {
                self.drag.pointer_enter(new);
            }
            self.hovered = hit;
        }

        if pressed && inside {
            match self.hovered {
                Some(id) if self.store.selected_id() == Some(id) => {
                    let event = self.drag.pointer_down(id, Some(id));
                    self.apply(event);
                }
                Some(id) => {
                    self.store.select(Some(id));
                }
                None => self.camera_drag = self.drag.camera_controls_enabled(),
            }
        }

        self.pointer_position = pointer_xy.filter(|_| inside).and_then(|p| surface.resolve(p));

        let painter = ui.painter_at(rect);
        if self.mode == ViewerMode::Flat {
            if let Surface::Flat(r) = &surface {
                if let Some(texture) = self.flat_texture(ui.ctx(), file_id) {
                    let ir = r.image_rect;
                    let image_rect = Rect::from_min_size(
                        Pos2::new(ir.left as f32, ir.top as f32),
                        egui::vec2(ir.width as f32, ir.height as f32),
                    );
                    let uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
                    painter.image(texture.id(), image_rect, uv, Color32::WHITE);
                }
            }
        }

        let selected = self.store.selected_id();
        for m in &markers {
            let state = self.drag.state(m.id);
            let is_selected = selected == Some(m.id);
            let fill = match (is_selected, state) {
                (true, _) | (_, MarkerState::Dragging) => SELECTED,
                (false, MarkerState::Hovered) => HOVERED,
                (false, MarkerState::Idle) => IDLE,
            };
            let ring = if state == MarkerState::Dragging { 3.0 } else { 2.0 };
            painter.circle(m.at, MARKER_RADIUS, fill, Stroke::new(ring, Color32::WHITE));

            let show_label = self.mode == ViewerMode::Flat || state != MarkerState::Idle || is_selected;
            if show_label {
                let at = m.at + egui::vec2(0.0, -(MARKER_RADIUS + 4.0));
                painter.text(at, Align2::CENTER_BOTTOM, &m.title, FontId::proportional(13.0), Color32::WHITE);
            }
        }

        match (self.drag.is_dragging(), self.hovered) {
            (true, _) => ui.ctx().set_cursor_icon(egui::CursorIcon::Grabbing),
            (false, Some(id)) if selected == Some(id) => ui.ctx().set_cursor_icon(egui::CursorIcon::Grab),
            (false, Some(_)) => ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand),
            _ => {}
        }

        let ppp = ui.ctx().pixels_per_point();
        (self.mode == ViewerMode::Panorama).then(|| ScenePass {
            camera,
            viewport_px: [rect.left() * ppp, rect.top() * ppp, rect.width() * ppp, rect.height() * ppp],
        })
    }

    fn end_gestures(&mut self, left: bool, released: bool) {
        if left {
            let event = self.drag.surface_leave();
            self.apply(event);
            self.hovered = None;
            self.camera_drag = false;
        }
        if released {
            let event = self.drag.pointer_up();
            self.apply(event);
            self.camera_drag = false;
        }
    }

    /// Lazily upload the active flat image to an egui texture, scaled into
    /// the GPU limit. Drawing stretches it back over the logical size.
    fn flat_texture(&mut self, ctx: &egui::Context, id: FileId) -> Option<&egui::TextureHandle> {
        if !self.flat_textures.contains_key(&id) {
            let file = self.store.file(id)?;
            let pixels = file.image().pixels()?;
            let (w, h) = pixels.dimensions();
            let max = self.max_texture_side;
            let scaled;
            let img = if w > max || h > max {
                let s = max as f32 / w.max(h) as f32;
                let (nw, nh) = (((w as f32 * s) as u32).max(1), ((h as f32 * s) as u32).max(1));
                scaled = image::imageops::resize(pixels.as_ref(), nw, nh, image::imageops::FilterType::Triangle);
                &scaled
            } else {
                pixels.as_ref()
            };
            let size = [img.width() as usize, img.height() as usize];
            let color = egui::ColorImage::from_rgba_unmultiplied(size, img.as_raw());
            let handle = ctx.load_texture(file.image().url(), color, egui::TextureOptions::LINEAR);
            self.flat_textures.insert(id, handle);
        }
        self.flat_textures.get(&id)
    }

    /// Active panorama image the renderer should show, keyed by its handle
    /// url so a replaced image is uploaded again.
    pub fn panorama_file(&self) -> Option<(String, std::sync::Arc<image::RgbaImage>)> {
        if self.mode != ViewerMode::Panorama {
            return None;
        }
        let image = self.store.active_file()?.image();
        Some((image.url().to_string(), image.pixels()?))
    }
}

fn screen_rect(rect: Rect) -> ScreenRect {
    ScreenRect::new(
        f64::from(rect.left()),
        f64::from(rect.top()),
        f64::from(rect.width()),
        f64::from(rect.height()),
    )
}

fn hotspot_tooltip(ui: &mut egui::Ui, h: &Hotspot, space: CoordinateSpace, equirect: geometry::EquirectDims) {
    let p = h.position;
    let px = geometry::to_pixel(p, space, equirect);
    egui::Grid::new("hotspot_tooltip").show(ui, |ui| {
        if space == CoordinateSpace::Sphere {
            ui.label(tr("hotspots.sphere"));
            ui.monospace(format!("({:.2}, {:.2}, {:.2})", p.x, p.y, p.z));
            ui.end_row();
        }
        ui.label(tr("hotspots.pixel"));
        ui.monospace(format!("({:.0}, {:.0}, {:.0})", px.px, px.py, px.pz));
        ui.end_row();
    });
}
