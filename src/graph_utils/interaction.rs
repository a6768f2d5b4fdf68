//! Owns one layout run per graph view and routes user input into it:
//! drag-to-pin, debounced resize relayout, replay and teardown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use eframe::egui::{Pos2, Rect};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::layout::{EntranceSchedule, ForceLayout, LayoutParams};
use crate::analysis::result::MethodGraph;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphViewConfig {
    pub canvas_height: f32,
    pub resize_quiet_ms: u64,
    pub max_ticks_per_frame: usize,
    pub node_radius: f32,
}

impl Default for GraphViewConfig {
    fn default() -> Self {
        Self { canvas_height: 500.0, resize_quiet_ms: 150, max_ticks_per_frame: 4, node_radius: 18.0 }
    }
}

/// Coalesces bursts of viewport changes; only the last one survives the
/// quiet period.
#[derive(Debug)]
pub struct ResizeDebouncer {
    quiet: Duration,
    pending: Option<(Rect, Instant)>,
}

impl ResizeDebouncer {
    pub fn new(quiet: Duration) -> Self { Self { quiet, pending: None } }

    pub fn push(&mut self, rect: Rect, now: Instant) {
        self.pending = Some((rect, now));
    }

    pub fn is_pending(&self) -> bool { self.pending.is_some() }

    pub fn pending_rect(&self) -> Option<Rect> { self.pending.map(|(rect, _)| rect) }

    pub fn poll(&mut self, now: Instant) -> Option<Rect> {
        match self.pending {
            Some((rect, at)) if now.saturating_duration_since(at) >= self.quiet => {
                self.pending = None;
                Some(rect)
            }
            _ => None,
        }
    }
}

pub struct GraphView {
    graph: Arc<MethodGraph>,
    params: LayoutParams,
    config: GraphViewConfig,
    viewport: Rect,
    // None once torn down
    layout: Option<ForceLayout>,
    generation: u64,
    replay_token: u64,
    started_at: Instant,
    entrance: EntranceSchedule,
    resize: ResizeDebouncer,
    dragging: Option<usize>,
    seeds: StdRng,
}

impl GraphView {
    pub fn new(graph: Arc<MethodGraph>, viewport: Rect, params: LayoutParams, config: GraphViewConfig, now: Instant) -> Self {
        Self::with_seeds(graph, viewport, params, config, now, StdRng::from_entropy())
    }

    pub fn with_seeds(
        graph: Arc<MethodGraph>,
        viewport: Rect,
        params: LayoutParams,
        config: GraphViewConfig,
        now: Instant,
        seeds: StdRng,
    ) -> Self {
        let mut view = Self {
            graph,
            params,
            config,
            viewport,
            layout: None,
            generation: 0,
            replay_token: 0,
            started_at: now,
            entrance: EntranceSchedule::default(),
            resize: ResizeDebouncer::new(Duration::from_millis(config.resize_quiet_ms)),
            dragging: None,
            seeds,
        };
        view.rebuild(now);
        view
    }

    pub fn graph(&self) -> &Arc<MethodGraph> { &self.graph }
    pub fn layout(&self) -> Option<&ForceLayout> { self.layout.as_ref() }
    pub fn viewport(&self) -> Rect { self.viewport }
    pub fn config(&self) -> &GraphViewConfig { &self.config }
    pub fn generation(&self) -> u64 { self.generation }
    pub fn replay_token(&self) -> u64 { self.replay_token }
    pub fn dragging(&self) -> Option<usize> { self.dragging }
    pub fn is_torn_down(&self) -> bool { self.layout.is_none() }

    // Discard all simulation state and start a hot run with fresh placement
    fn rebuild(&mut self, now: Instant) {
        if let Some(old) = self.layout.as_mut() { old.stop(); }
        let rng = StdRng::seed_from_u64(self.seeds.r#gen());
        self.layout = Some(ForceLayout::with_rng(&self.graph, self.viewport, self.params, rng));
        self.dragging = None;
        self.started_at = now;
        self.generation += 1;
        log::debug!(
            "layout rebuilt (generation {}, {} nodes, viewport {:?})",
            self.generation,
            self.graph.nodes.len(),
            self.viewport.size()
        );
    }

    pub fn replay(&mut self, now: Instant) {
        if self.is_torn_down() { return; }
        self.replay_token += 1;
        self.rebuild(now);
    }

    /// Swap in a different graph. The same graph (by identity) keeps its run.
    pub fn set_graph(&mut self, graph: Arc<MethodGraph>, now: Instant) {
        if Arc::ptr_eq(&self.graph, &graph) { return; }
        self.graph = graph;
        if !self.is_torn_down() { self.rebuild(now); }
    }

    /// Called with the current canvas rect, typically every frame. Only a
    /// rect that differs from both the live viewport and the pending one
    /// restarts the quiet period.
    pub fn on_resize(&mut self, rect: Rect, now: Instant) {
        match self.resize.pending_rect() {
            Some(pending) if pending == rect => return,
            None if rect == self.viewport => return,
            _ => {}
        }
        self.resize.push(rect, now);
    }

    /// Per-frame driver. Returns true while anything still animates.
    pub fn frame(&mut self, now: Instant) -> bool {
        if self.is_torn_down() { return false; }
        if let Some(rect) = self.resize.poll(now) {
            if rect != self.viewport {
                self.viewport = rect;
                self.rebuild(now);
            }
        }
        let max_ticks = self.config.max_ticks_per_frame;
        let running = self.layout.as_mut().map(|l| l.advance(max_ticks)).unwrap_or(false);
        let revealing = !self.entrance.finished(
            self.graph.nodes.len(),
            self.graph.links.len(),
            now.saturating_duration_since(self.started_at),
        );
        running || revealing || self.resize.is_pending()
    }

    pub fn node_at(&self, p: Pos2) -> Option<usize> {
        self.layout.as_ref().and_then(|l| l.node_at(p, self.config.node_radius))
    }

    pub fn drag_start(&mut self, idx: usize) {
        let Some(layout) = self.layout.as_mut() else { return };
        let Some(pos) = layout.nodes().get(idx).map(|n| n.pos) else { return };
        let hot = layout.params().drag_alpha_target;
        layout.set_alpha_target(hot);
        layout.reheat(hot);
        layout.pin(idx, pos);
        self.dragging = Some(idx);
    }

    pub fn drag_to(&mut self, pos: Pos2) {
        let (Some(idx), Some(layout)) = (self.dragging, self.layout.as_mut()) else { return };
        layout.pin(idx, pos);
    }

    /// Release the held node; it goes back under simulation control.
    pub fn drag_end(&mut self) {
        let Some(idx) = self.dragging.take() else { return };
        if let Some(layout) = self.layout.as_mut() {
            layout.set_alpha_target(0.0);
            layout.unpin(idx);
        }
    }

    pub fn node_opacity(&self, index: usize, now: Instant) -> f32 {
        self.entrance.node_opacity(index, now.saturating_duration_since(self.started_at))
    }

    pub fn link_opacity(&self, index: usize, now: Instant) -> f32 {
        self.entrance.link_opacity(index, now.saturating_duration_since(self.started_at))
    }

    pub fn teardown(&mut self) {
        if let Some(mut layout) = self.layout.take() {
            layout.stop();
            log::debug!("graph view torn down after {} ticks", layout.ticks());
        }
        self.dragging = None;
    }
}

impl Drop for GraphView {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::result::{GraphLink, GraphNode, NodeGroup};
    use eframe::egui::Vec2;

    fn pipeline() -> Arc<MethodGraph> {
        let ids = ["ds", "prep", "net", "opt", "eval"];
        let groups = [
            NodeGroup::Dataset,
            NodeGroup::Preprocessing,
            NodeGroup::Model,
            NodeGroup::Training,
            NodeGroup::Evaluation,
        ];
        Arc::new(MethodGraph {
            nodes: ids
                .iter()
                .zip(groups)
                .map(|(id, group)| GraphNode { id: id.to_string(), group, label: id.to_uppercase() })
                .collect(),
            links: ids
                .windows(2)
                .map(|w| GraphLink { source: w[0].into(), target: w[1].into(), weight: 1.0 })
                .collect(),
        })
    }

    fn rect(w: f32, h: f32) -> Rect { Rect::from_min_size(Pos2::ZERO, Vec2::new(w, h)) }

    fn view(now: Instant) -> GraphView {
        GraphView::with_seeds(
            pipeline(),
            rect(800.0, 500.0),
            LayoutParams::default(),
            GraphViewConfig::default(),
            now,
            StdRng::seed_from_u64(42),
        )
    }

    fn positions(v: &GraphView) -> Vec<Pos2> {
        v.layout().unwrap().nodes().iter().map(|n| n.pos).collect()
    }

    #[test]
    fn release_clears_pin_and_node_moves_again() {
        let t0 = Instant::now();
        let mut v = view(t0);
        v.layout.as_mut().unwrap().run_to_rest(10_000);
        v.drag_start(2);
        let far = Pos2::new(20.0, 20.0);
        v.drag_to(far);
        v.frame(t0);
        assert_eq!(v.layout().unwrap().nodes()[2].pos, far);
        assert!(v.layout().unwrap().is_running());

        v.drag_end();
        assert_eq!(v.layout().unwrap().nodes()[2].pinned, None);
        for _ in 0..10 { v.frame(t0); }
        assert_ne!(v.layout().unwrap().nodes()[2].pos, far);
    }

    #[test]
    fn replays_start_from_independent_random_placements() {
        let t0 = Instant::now();
        let mut v = view(t0);
        v.frame(t0);
        v.replay(t0);
        let first = positions(&v);
        assert_eq!(v.layout().unwrap().ticks(), 0);
        v.replay(t0);
        let second = positions(&v);
        assert_eq!(v.replay_token(), 2);
        assert_ne!(first, second);
    }

    #[test]
    fn resize_burst_relayouts_once_after_quiet_period() {
        let t0 = Instant::now();
        let mut v = view(t0);
        let start_gen = v.generation();
        for i in 0..5u64 {
            let now = t0 + Duration::from_millis(i * 40);
            v.on_resize(rect(600.0 + i as f32 * 10.0, 500.0), now);
            v.frame(now);
        }
        assert_eq!(v.generation(), start_gen);
        let later = t0 + Duration::from_millis(160 + 150);
        v.frame(later);
        assert_eq!(v.generation(), start_gen + 1);
        assert_eq!(v.viewport(), rect(640.0, 500.0));
        assert_eq!(v.layout().unwrap().center(), rect(640.0, 500.0).center());
    }

    #[test]
    fn steady_new_size_reported_every_frame_relayouts_once() {
        let t0 = Instant::now();
        let mut v = view(t0);
        let g = v.generation();
        let resized = rect(1000.0, 500.0);
        let mut animating = true;
        for i in 0..150u64 {
            let now = t0 + Duration::from_millis(i * 16);
            v.on_resize(resized, now);
            animating = v.frame(now);
        }
        assert_eq!(v.generation(), g + 1);
        assert_eq!(v.viewport(), resized);
        // 2.4s in: the relayout has settled, so the canvas stops repainting
        assert!(!v.resize.is_pending());
        assert!(!animating);
    }

    #[test]
    fn unchanged_size_does_not_relayout() {
        let t0 = Instant::now();
        let mut v = view(t0);
        let g = v.generation();
        v.on_resize(rect(800.0, 500.0), t0);
        v.frame(t0 + Duration::from_secs(1));
        assert_eq!(v.generation(), g);
    }

    #[test]
    fn same_graph_keeps_its_run_new_graph_restarts() {
        let t0 = Instant::now();
        let mut v = view(t0);
        let g = v.generation();
        let same = v.graph().clone();
        v.set_graph(same, t0);
        assert_eq!(v.generation(), g);
        v.set_graph(pipeline(), t0);
        assert_eq!(v.generation(), g + 1);
    }

    #[test]
    fn teardown_halts_the_loop() {
        let t0 = Instant::now();
        let mut v = view(t0);
        assert!(v.frame(t0));
        v.teardown();
        assert!(v.is_torn_down());
        assert!(!v.frame(t0 + Duration::from_millis(16)));
        v.replay(t0);
        assert!(v.is_torn_down());
    }
}
