#![allow(clippy::collapsible_if)]
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use eframe::egui::{self, Color32, Pos2, Rect, Sense, Stroke, Vec2};

use crate::analysis::result::{AnalysisResult, NodeGroup};
use crate::graph_utils::interaction::GraphView;
use crate::model_client::GeminiClient;
use crate::persistence::export::{self, ExportKind};
use crate::persistence::settings::AppSettings;
use crate::session::attachments;
use crate::session::progress::{loading_progress, loading_step};
use crate::session::{AnalysisStatus, Orchestrator, SessionSnapshot};

const CANVAS_BG: Color32 = Color32::from_rgb(15, 23, 42);
const LINK_COLOR: Color32 = Color32::from_rgb(71, 85, 105);
const ARROW_COLOR: Color32 = Color32::from_rgb(100, 116, 139);
const LABEL_COLOR: Color32 = Color32::from_rgb(226, 232, 240);
const FALLBACK_COLOR: Color32 = Color32::from_rgb(148, 163, 184);

pub fn group_color(group: &NodeGroup) -> Color32 {
    match group {
        NodeGroup::Dataset => Color32::from_rgb(59, 130, 246),
        NodeGroup::Preprocessing => Color32::from_rgb(245, 158, 11),
        NodeGroup::Model => Color32::from_rgb(239, 68, 68),
        NodeGroup::Training => Color32::from_rgb(139, 92, 246),
        NodeGroup::Evaluation => Color32::from_rgb(16, 185, 129),
        NodeGroup::Other(_) => FALLBACK_COLOR,
    }
}

fn confidence_color(score: u8) -> Color32 {
    match score {
        80..=100 => Color32::from_rgb(16, 185, 129),
        50..=79 => Color32::from_rgb(245, 158, 11),
        _ => Color32::from_rgb(239, 68, 68),
    }
}

fn confidence_verdict(score: u8) -> &'static str {
    match score {
        90..=100 => "High Precision",
        70..=89 => "Reasonable Match",
        _ => "Uncertain",
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ResultTab {
    Graph,
    Summary,
    Variants,
    Reasoning,
    Code,
}

impl ResultTab {
    const ALL: [ResultTab; 5] = [ResultTab::Graph, ResultTab::Summary, ResultTab::Variants, ResultTab::Reasoning, ResultTab::Code];

    fn title(self) -> &'static str {
        match self {
            ResultTab::Graph => "Graph",
            ResultTab::Summary => "Summary",
            ResultTab::Variants => "Variants",
            ResultTab::Reasoning => "Reasoning",
            ResultTab::Code => "Code",
        }
    }
}

pub struct ResearchApp {
    // Declared before the runtime so its task is aborted first on drop
    orchestrator: Orchestrator,
    settings: AppSettings,
    queued: Vec<PathBuf>,
    path_input: String,
    tab: ResultTab,
    // Live only while a result is shown
    graph_view: Option<GraphView>,
    graph_source: Option<Arc<AnalysisResult>>,
    export_status: Option<String>,
    show_prefs_window: bool,
    prefs_status: Option<String>,
    runtime: tokio::runtime::Runtime,
}

impl ResearchApp {
    pub fn new(settings: AppSettings, queued: Vec<PathBuf>) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("analysis")
            .enable_all()
            .build()?;
        let orchestrator = Self::build_orchestrator(&settings, &runtime)?;
        Ok(Self {
            orchestrator,
            settings,
            queued,
            path_input: String::new(),
            tab: ResultTab::Graph,
            graph_view: None,
            graph_source: None,
            export_status: None,
            show_prefs_window: false,
            prefs_status: None,
            runtime,
        })
    }

    fn build_orchestrator(settings: &AppSettings, runtime: &tokio::runtime::Runtime) -> anyhow::Result<Orchestrator> {
        let client = GeminiClient::from_settings(settings)?;
        Ok(Orchestrator::new(Arc::new(client), runtime.handle().clone()).with_temperature(settings.temperature))
    }

    fn queue_path(&mut self, path: PathBuf) {
        if !self.queued.contains(&path) {
            self.queued.push(path);
        }
    }

    fn start_analysis(&mut self) {
        match self.orchestrator.submit(self.queued.clone()) {
            Ok(id) => {
                log::debug!("submitted request {}", id);
                self.queued.clear();
                self.tab = ResultTab::Graph;
                self.export_status = None;
            }
            Err(e) => log::warn!("analysis not started: {}", e),
        }
    }

    fn reset(&mut self) {
        self.orchestrator.reset();
        self.drop_graph_view();
        self.export_status = None;
    }

    fn drop_graph_view(&mut self) {
        if let Some(mut view) = self.graph_view.take() {
            view.teardown();
        }
        self.graph_source = None;
    }

    fn run_export(&mut self, result: &AnalysisResult, kind: ExportKind) {
        let dir = self.settings.export_dir();
        self.export_status = Some(match export::export_to_dir(result, &dir, kind) {
            Ok(path) => format!("Exported to {}", path.display()),
            Err(e) => {
                log::error!("export failed: {:#}", e);
                format!("Export failed: {}", e)
            }
        });
    }

    fn show_idle(&mut self, ui: &mut egui::Ui, snapshot: &SessionSnapshot) {
        let dropped: Vec<PathBuf> = ui.ctx().input(|i| i.raw.dropped_files.iter().filter_map(|f| f.path.clone()).collect());
        for path in dropped {
            self.queue_path(path);
        }

        ui.vertical_centered(|ui| {
            ui.add_space(24.0);
            ui.heading("Reproduce a paper's method");
            ui.label("Drop one or more papers onto this window, or enter a path below.");
        });
        ui.add_space(12.0);
        ui.horizontal(|ui| {
            ui.label("Path:");
            let resp = ui.text_edit_singleline(&mut self.path_input);
            let submitted = resp.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if (ui.button("Add").clicked() || submitted) && !self.path_input.trim().is_empty() {
                let path = PathBuf::from(self.path_input.trim());
                self.path_input.clear();
                self.queue_path(path);
            }
        });

        ui.add_space(8.0);
        let mut remove: Option<usize> = None;
        for (i, path) in self.queued.iter().enumerate() {
            ui.horizontal(|ui| {
                if ui.small_button("x").clicked() { remove = Some(i); }
                ui.label(path.display().to_string());
            });
        }
        if let Some(i) = remove { self.queued.remove(i); }

        if let Some(err) = &snapshot.error {
            ui.add_space(6.0);
            ui.colored_label(Color32::from_rgb(239, 68, 68), err.as_str());
        }

        ui.add_space(12.0);
        let label = if self.queued.len() > 1 { format!("Analyze {} Papers", self.queued.len()) } else { "Analyze".to_string() };
        // Empty submissions go through so the session reports them
        if ui.add(egui::Button::new(label).min_size(Vec2::new(160.0, 32.0))).clicked() {
            self.start_analysis();
        }
    }

    fn show_analyzing(&mut self, ui: &mut egui::Ui, snapshot: &SessionSnapshot) {
        let elapsed = snapshot.elapsed.unwrap_or_default();
        ui.vertical_centered(|ui| {
            ui.add_space(48.0);
            ui.heading("Analyzing");
            ui.add_space(8.0);
            ui.label(loading_step(elapsed));
            ui.add_space(8.0);
            ui.add(egui::ProgressBar::new(loading_progress(elapsed) / 100.0).desired_width(360.0).show_percentage());
            if let Some(desc) = attachments::describe(&snapshot.files) {
                ui.add_space(4.0);
                ui.small(desc);
            }
            ui.add_space(12.0);
            if ui.button("Cancel").clicked() {
                self.reset();
            }
        });
        ui.ctx().request_repaint_after(Duration::from_millis(50));
    }

    fn show_error(&mut self, ui: &mut egui::Ui, snapshot: &SessionSnapshot) {
        ui.vertical_centered(|ui| {
            ui.add_space(48.0);
            ui.heading("Analysis failed");
            ui.add_space(8.0);
            let msg = snapshot.error.as_deref().unwrap_or("Unknown error");
            ui.colored_label(Color32::from_rgb(239, 68, 68), msg);
            ui.add_space(12.0);
            if ui.button("Try Another Paper").clicked() {
                self.reset();
            }
        });
    }

    fn show_complete(&mut self, ui: &mut egui::Ui, snapshot: &SessionSnapshot, result: &Arc<AnalysisResult>) {
        ui.horizontal(|ui| {
            if let Some(desc) = attachments::describe(&snapshot.files) {
                ui.strong(desc);
            }
            ui.separator();
            let score = result.summary.overall_confidence;
            ui.label("Confidence:");
            ui.add(
                egui::ProgressBar::new(score as f32 / 100.0)
                    .desired_width(140.0)
                    .fill(confidence_color(score))
                    .text(format!("{}%", score)),
            );
            ui.small(confidence_verdict(score));
            let missing = result.summary.missing_details.len();
            if missing > 0 {
                ui.colored_label(Color32::from_rgb(245, 158, 11), format!("{} missing detail(s)", missing));
            }
        });
        ui.horizontal(|ui| {
            if ui.button("Export JSON").clicked() { self.run_export(result, ExportKind::ResultJson); }
            if ui.button("Export Code").clicked() { self.run_export(result, ExportKind::Code); }
            if ui.button("Export Graph CSV").clicked() { self.run_export(result, ExportKind::GraphCsv); }
            if let Some(msg) = &self.export_status { ui.small(msg.clone()); }
        });
        if !snapshot.warnings.is_empty() {
            egui::CollapsingHeader::new(format!("{} validation warning(s)", snapshot.warnings.len()))
                .id_salt("validation_warnings")
                .show(ui, |ui| {
                    for w in &snapshot.warnings {
                        ui.small(format!("{}: {}", w.path, w.message));
                    }
                });
        }
        ui.separator();
        ui.horizontal(|ui| {
            for tab in ResultTab::ALL {
                ui.selectable_value(&mut self.tab, tab, tab.title());
            }
        });
        ui.separator();

        match self.tab {
            ResultTab::Graph => self.show_graph(ui, result),
            ResultTab::Summary => egui::ScrollArea::vertical().auto_shrink([false, false]).show(ui, |ui| show_summary(ui, result)).inner,
            ResultTab::Variants => egui::ScrollArea::vertical().auto_shrink([false, false]).show(ui, |ui| show_variants(ui, result)).inner,
            ResultTab::Reasoning => egui::ScrollArea::vertical().auto_shrink([false, false]).show(ui, |ui| show_reasoning(ui, result)).inner,
            ResultTab::Code => show_code(ui, result),
        }
    }

    fn show_graph(&mut self, ui: &mut egui::Ui, result: &Arc<AnalysisResult>) {
        let now = Instant::now();
        let cfg = self.settings.graph_view;

        let mut replay = false;
        ui.horizontal(|ui| {
            for group in NodeGroup::KNOWN.iter() {
                let (swatch, _) = ui.allocate_exact_size(Vec2::splat(12.0), Sense::hover());
                ui.painter().circle_filled(swatch.center(), 5.0, group_color(group));
                ui.label(group.display_name());
            }
            ui.separator();
            if ui.button("Replay").clicked() { replay = true; }
        });

        let width = ui.available_width().max(1.0);
        let (rect, resp) = ui.allocate_exact_size(Vec2::new(width, cfg.canvas_height), Sense::click_and_drag());
        // Layout space is canvas-local so moving the panel does not relayout
        let local = Rect::from_min_size(Pos2::ZERO, rect.size());
        let offset = rect.min.to_vec2();

        let stale = match &self.graph_source {
            Some(src) => !Arc::ptr_eq(src, result) || self.graph_view.is_none(),
            None => true,
        };
        if stale {
            let graph = Arc::new(result.graph.clone());
            match self.graph_view.as_mut() {
                Some(view) => view.set_graph(graph, now),
                None => self.graph_view = Some(GraphView::new(graph, local, self.settings.layout, cfg, now)),
            }
            self.graph_source = Some(Arc::clone(result));
        }
        let Some(view) = self.graph_view.as_mut() else { return };
        if replay { view.replay(now); }
        view.on_resize(local, now);

        if resp.drag_started() {
            if let Some(p) = resp.interact_pointer_pos() {
                if let Some(idx) = view.node_at(p - offset) { view.drag_start(idx); }
            }
        }
        if resp.dragged() && view.dragging().is_some() {
            if let Some(p) = resp.interact_pointer_pos() { view.drag_to(p - offset); }
        }
        if resp.drag_stopped() { view.drag_end(); }
        if let Some(p) = resp.hover_pos() {
            if view.dragging().is_some() {
                ui.ctx().set_cursor_icon(egui::CursorIcon::Grabbing);
            } else if view.node_at(p - offset).is_some() {
                ui.ctx().set_cursor_icon(egui::CursorIcon::Grab);
            }
        }

        let animating = view.frame(now);

        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 8.0, CANVAS_BG);
        let Some(layout) = view.layout() else { return };
        let radius = cfg.node_radius;

        for link in layout.links() {
            let opacity = view.link_opacity(link.index, now);
            if opacity <= 0.0 { continue; }
            let a = layout.nodes()[link.source].pos + offset;
            let b = layout.nodes()[link.target].pos + offset;
            draw_arrow(&painter, a, b, radius, LINK_COLOR.gamma_multiply(0.6 * opacity), ARROW_COLOR.gamma_multiply(opacity));
        }

        let graph = view.graph();
        for (i, node) in layout.nodes().iter().enumerate() {
            let opacity = view.node_opacity(i, now);
            if opacity <= 0.0 { continue; }
            let pos = node.pos + offset;
            let (fill, label) = match graph.nodes.get(i) {
                Some(n) => (group_color(&n.group), n.label.as_str()),
                None => (FALLBACK_COLOR, node.id.as_str()),
            };
            painter.circle_filled(pos, radius, fill.gamma_multiply(opacity));
            painter.circle_stroke(pos, radius, Stroke::new(1.5, Color32::WHITE.gamma_multiply(opacity)));
            let text_pos = pos + Vec2::new(radius + 4.0, 0.0);
            // shadow for readability
            painter.text(
                text_pos + Vec2::new(0.0, 2.0),
                egui::Align2::LEFT_CENTER,
                label,
                egui::FontId::proportional(12.0),
                Color32::from_black_alpha((128.0 * opacity) as u8),
            );
            painter.text(text_pos, egui::Align2::LEFT_CENTER, label, egui::FontId::proportional(12.0), LABEL_COLOR.gamma_multiply(opacity));
        }

        if animating {
            ui.ctx().request_repaint_after(Duration::from_millis(16));
        }
    }
}

// Line from the rim of `a` to just short of the rim of `b`, with a filled head
fn draw_arrow(painter: &egui::Painter, a: Pos2, b: Pos2, radius: f32, line: Color32, head: Color32) {
    let delta = b - a;
    let len = delta.length();
    if len <= 2.0 * radius { return; }
    let dir = delta / len;
    let perp = Vec2::new(-dir.y, dir.x);
    let tip = b - dir * (radius + 2.0);
    let back = tip - dir * 8.0;
    painter.line_segment([a + dir * radius, back], Stroke::new(2.0, line));
    painter.add(egui::Shape::convex_polygon(vec![tip, back + perp * 4.0, back - perp * 4.0], head, Stroke::NONE));
}

fn bullet_section(ui: &mut egui::Ui, title: &str, items: &[String]) {
    ui.strong(title);
    if items.is_empty() {
        ui.weak("None reported");
    }
    for item in items {
        ui.label(format!("• {}", item));
    }
    ui.add_space(8.0);
}

fn show_summary(ui: &mut egui::Ui, result: &AnalysisResult) {
    let s = &result.summary;
    bullet_section(ui, "Datasets", &s.datasets);
    bullet_section(ui, "Preprocessing", &s.preprocessing);
    bullet_section(ui, "Model Architecture", &s.model_architecture);
    bullet_section(ui, "Training Procedure", &s.training_procedure);

    ui.strong("Hyperparameters");
    if s.hyperparameters.is_empty() {
        ui.weak("None reported");
    } else {
        egui::Grid::new("hyperparameters").striped(true).num_columns(2).show(ui, |ui| {
            for (name, value) in &s.hyperparameters {
                ui.monospace(name);
                ui.label(value.to_string());
                ui.end_row();
            }
        });
    }
    ui.add_space(8.0);

    bullet_section(ui, "Evaluation", &s.evaluation);
    if !s.missing_details.is_empty() {
        ui.colored_label(Color32::from_rgb(245, 158, 11), "Missing Details");
        for item in &s.missing_details {
            ui.label(format!("• {}", item));
        }
    }
}

fn show_variants(ui: &mut egui::Ui, result: &AnalysisResult) {
    if result.variants.is_empty() {
        ui.weak("No variants proposed");
    }
    for (i, v) in result.variants.iter().enumerate() {
        ui.group(|ui| {
            ui.horizontal(|ui| {
                ui.strong(&v.name);
                ui.small(v.kind.as_str());
            });
            ui.label(&v.description);
            ui.add_space(4.0);
            ui.label(egui::RichText::new(format!("Rationale: {}", v.rationale)).italics());
            ui.horizontal(|ui| {
                ui.small(format!("Accuracy: {}", v.expected_accuracy_impact));
                ui.separator();
                ui.small(format!("Compute: {}", v.expected_compute_impact));
            });
            if let Some(snippet) = &v.code_snippet {
                egui::CollapsingHeader::new("Code snippet").id_salt(("variant_code", i)).show(ui, |ui| {
                    ui.add(egui::TextEdit::multiline(&mut snippet.as_str()).code_editor().desired_width(f32::INFINITY));
                });
            }
        });
        ui.add_space(6.0);
    }
}

fn show_reasoning(ui: &mut egui::Ui, result: &AnalysisResult) {
    for item in &result.reasoning {
        ui.group(|ui| {
            ui.horizontal(|ui| {
                ui.strong(&item.topic);
                if item.is_assumption {
                    ui.colored_label(Color32::from_rgb(245, 158, 11), "Assumption");
                }
            });
            ui.add(
                egui::ProgressBar::new(item.confidence_score as f32 / 100.0)
                    .desired_width(120.0)
                    .fill(confidence_color(item.confidence_score))
                    .text(format!("{}%", item.confidence_score)),
            );
            ui.label(&item.explanation);
        });
        ui.add_space(6.0);
    }
}

fn show_code(ui: &mut egui::Ui, result: &AnalysisResult) {
    ui.horizontal(|ui| {
        ui.label("reproduction.py");
        if ui.button("Copy").clicked() {
            ui.ctx().copy_text(result.code.clone());
        }
    });
    egui::ScrollArea::both().auto_shrink([false, false]).show(ui, |ui| {
        ui.add(egui::TextEdit::multiline(&mut result.code.as_str()).code_editor().desired_width(f32::INFINITY));
    });
}

impl eframe::App for ResearchApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.orchestrator.poll();
        let snapshot = self.orchestrator.snapshot();
        // Leaving the result screen halts the simulation
        if snapshot.status != AnalysisStatus::Complete && self.graph_view.is_some() {
            self.drop_graph_view();
        }

        if self.show_prefs_window {
            let mut open = true;
            egui::Window::new("Preferences")
                .open(&mut open)
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.horizontal(|ui| {
                        ui.label("Model:");
                        ui.text_edit_singleline(&mut self.settings.model_name);
                    });
                    ui.horizontal(|ui| {
                        ui.label("API key:");
                        let mut key = self.settings.api_key.clone().unwrap_or_default();
                        if ui.add(egui::TextEdit::singleline(&mut key).password(true)).changed() {
                            self.settings.api_key = if key.trim().is_empty() { None } else { Some(key) };
                        }
                    });
                    ui.horizontal(|ui| {
                        ui.label("Export dir:");
                        ui.monospace(self.settings.export_dir().display().to_string());
                    });
                    ui.add_space(6.0);
                    ui.horizontal(|ui| {
                        if ui.button("Save").clicked() {
                            let saved = self.settings.save();
                            let rebuilt = if self.orchestrator.status() == AnalysisStatus::Idle {
                                Self::build_orchestrator(&self.settings, &self.runtime).map(|o| self.orchestrator = o)
                            } else {
                                Ok(())
                            };
                            self.prefs_status = Some(match saved.and(rebuilt) {
                                Ok(()) => format!("Saved to {}", AppSettings::settings_dir().display()),
                                Err(e) => format!("Save failed: {}", e),
                            });
                        }
                    });
                    if let Some(msg) = &self.prefs_status { ui.separator(); ui.small(msg.clone()); }
                });
            if !open { self.show_prefs_window = false; }
        }

        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Research-Buddy");
                ui.separator();
                ui.small(snapshot.status.to_string());
                if ui.button("Preferences").clicked() {
                    self.show_prefs_window = true;
                    self.prefs_status = None;
                }
                if snapshot.status == AnalysisStatus::Complete && ui.button("New Analysis").clicked() {
                    self.reset();
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| match snapshot.status {
            AnalysisStatus::Idle => self.show_idle(ui, &snapshot),
            AnalysisStatus::Analyzing => self.show_analyzing(ui, &snapshot),
            AnalysisStatus::Error => self.show_error(ui, &snapshot),
            AnalysisStatus::Complete => match snapshot.result.clone() {
                Some(result) => self.show_complete(ui, &snapshot, &result),
                None => self.show_error(ui, &snapshot),
            },
        });
    }
}
