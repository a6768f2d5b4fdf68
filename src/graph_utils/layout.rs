//! Force-directed layout for the method graph.
//!
//! Velocities are integrated once per tick and then damped. Every force is
//! scaled by `alpha`, the simulation's remaining energy budget, which cools
//! exponentially toward `alpha_target` (zero at rest, raised while a node is
//! held). The engine is idle once alpha drops under `alpha_min`.

use std::collections::HashMap;
use std::time::Duration;

use eframe::egui::{Pos2, Rect, Vec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::analysis::result::{MethodGraph, NodeId};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutParams {
    pub link_distance: f32,
    // Negative values repel
    pub charge_strength: f32,
    pub center_strength: f32,
    pub velocity_decay: f32,
    pub alpha_min: f32,
    pub alpha_decay: f32,
    pub drag_alpha_target: f32,
    pub distance_min: f32,
}

impl Default for LayoutParams {
    fn default() -> Self {
        let alpha_min = 0.001_f32;
        Self {
            link_distance: 120.0,
            charge_strength: -500.0,
            center_strength: 0.08,
            velocity_decay: 0.4,
            alpha_min,
            // ~300 ticks from a full reheat down to alpha_min
            alpha_decay: 1.0 - alpha_min.powf(1.0 / 300.0),
            drag_alpha_target: 0.3,
            distance_min: 1.0,
        }
    }
}

/// A graph node plus the simulation state that lives only as long as one
/// layout run.
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutNode {
    pub id: NodeId,
    pub pos: Pos2,
    pub vel: Vec2,
    // Written only by drag handling; the tick loop reads it and snaps to it
    pub pinned: Option<Pos2>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutLink {
    // Position in the graph's link list; skipped links leave gaps
    pub index: usize,
    pub source: usize,
    pub target: usize,
    pub weight: f32,
    strength: f32,
    bias: f32,
}

pub struct ForceLayout {
    nodes: Vec<LayoutNode>,
    links: Vec<LayoutLink>,
    index: HashMap<NodeId, usize>,
    center: Pos2,
    params: LayoutParams,
    alpha: f32,
    alpha_target: f32,
    ticks: u64,
    stopped: bool,
    rng: StdRng,
}

impl ForceLayout {
    pub fn new(graph: &MethodGraph, viewport: Rect, params: LayoutParams) -> Self {
        Self::with_rng(graph, viewport, params, StdRng::from_entropy())
    }

    /// Build a hot simulation with a fresh random placement around the
    /// viewport center. Links whose endpoints are unknown are skipped.
    pub fn with_rng(graph: &MethodGraph, viewport: Rect, params: LayoutParams, mut rng: StdRng) -> Self {
        let center = viewport.center();
        let n = graph.nodes.len();
        let spread = (10.0 * (n as f32 + 1.0).sqrt()).max(30.0);

        let mut index = HashMap::with_capacity(n);
        let mut nodes = Vec::with_capacity(n);
        for (i, node) in graph.nodes.iter().enumerate() {
            index.insert(node.id.clone(), i);
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            let radius = spread * rng.r#gen::<f32>().sqrt();
            let pos = center + Vec2::angled(angle) * radius;
            nodes.push(LayoutNode { id: node.id.clone(), pos, vel: Vec2::ZERO, pinned: None });
        }

        // Degree-based strength and bias, as in d3's link force
        let mut degree = vec![0usize; n];
        let mut resolved: Vec<(usize, usize, usize, f32)> = Vec::with_capacity(graph.links.len());
        for (link_idx, link) in graph.links.iter().enumerate() {
            let (Some(&s), Some(&t)) = (index.get(&link.source), index.get(&link.target)) else { continue };
            if s == t { continue; }
            degree[s] += 1;
            degree[t] += 1;
            resolved.push((link_idx, s, t, link.weight as f32));
        }
        let links = resolved
            .into_iter()
            .map(|(index, source, target, weight)| {
                let (ds, dt) = (degree[source] as f32, degree[target] as f32);
                LayoutLink { index, source, target, weight, strength: 1.0 / ds.min(dt), bias: ds / (ds + dt) }
            })
            .collect();

        Self {
            nodes,
            links,
            index,
            center,
            params,
            alpha: 1.0,
            alpha_target: 0.0,
            ticks: 0,
            stopped: false,
            rng,
        }
    }

    pub fn nodes(&self) -> &[LayoutNode] { &self.nodes }
    pub fn links(&self) -> &[LayoutLink] { &self.links }
    pub fn params(&self) -> &LayoutParams { &self.params }
    pub fn center(&self) -> Pos2 { self.center }
    pub fn alpha(&self) -> f32 { self.alpha }
    pub fn ticks(&self) -> u64 { self.ticks }
    pub fn index_of(&self, id: &str) -> Option<usize> { self.index.get(id).copied() }
    pub fn position(&self, id: &str) -> Option<Pos2> { self.index_of(id).map(|i| self.nodes[i].pos) }

    pub fn is_running(&self) -> bool {
        !self.stopped && self.alpha >= self.params.alpha_min
    }

    pub fn is_stopped(&self) -> bool { self.stopped }

    pub fn kinetic_energy(&self) -> f32 {
        self.nodes.iter().map(|n| 0.5 * n.vel.length_sq()).sum()
    }

    pub fn set_alpha_target(&mut self, target: f32) {
        self.alpha_target = target.clamp(0.0, 1.0);
    }

    /// Raise the energy budget so the layout starts moving again.
    pub fn reheat(&mut self, alpha: f32) {
        if self.stopped { return; }
        self.alpha = self.alpha.max(alpha.clamp(0.0, 1.0));
    }

    /// Permanently halt stepping. Used on teardown.
    pub fn stop(&mut self) {
        self.stopped = true;
        for n in &mut self.nodes { n.vel = Vec2::ZERO; }
    }

    pub fn pin(&mut self, idx: usize, pos: Pos2) {
        if let Some(n) = self.nodes.get_mut(idx) { n.pinned = Some(pos); }
    }

    pub fn unpin(&mut self, idx: usize) {
        if let Some(n) = self.nodes.get_mut(idx) { n.pinned = None; }
    }

    // Nearest node within `radius` of `p`
    pub fn node_at(&self, p: Pos2, radius: f32) -> Option<usize> {
        let r2 = radius * radius;
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (i, n.pos.distance_sq(p)))
            .filter(|(_, d2)| *d2 <= r2)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Run at most `max_ticks` ticks; returns whether the simulation is still
    /// active. Keeps per-frame work bounded.
    pub fn advance(&mut self, max_ticks: usize) -> bool {
        for _ in 0..max_ticks {
            if !self.is_running() { break; }
            self.tick();
        }
        self.is_running()
    }

    /// Tick until idle or until `max_ticks` have run. Returns ticks executed.
    pub fn run_to_rest(&mut self, max_ticks: usize) -> usize {
        let mut done = 0;
        while done < max_ticks && self.is_running() {
            self.tick();
            done += 1;
        }
        done
    }

    pub fn tick(&mut self) {
        if self.stopped { return; }
        self.alpha += (self.alpha_target - self.alpha) * self.params.alpha_decay;
        let alpha = self.alpha;

        self.apply_links(alpha);
        self.apply_charge(alpha);
        self.apply_centering();
        self.apply_positioning(alpha);

        let keep = 1.0 - self.params.velocity_decay;
        for n in &mut self.nodes {
            match n.pinned {
                Some(p) => {
                    n.pos = p;
                    n.vel = Vec2::ZERO;
                }
                None => {
                    n.vel *= keep;
                    n.pos += n.vel;
                }
            }
        }
        self.ticks += 1;
    }

    fn jiggle(&mut self) -> f32 {
        (self.rng.r#gen::<f32>() - 0.5) * 1e-6
    }

    // Springs toward `link_distance`, using positions one step ahead
    fn apply_links(&mut self, alpha: f32) {
        let distance = self.params.link_distance;
        for li in 0..self.links.len() {
            let LayoutLink { source, target, strength, bias, .. } = self.links[li];
            let (s, t) = (&self.nodes[source], &self.nodes[target]);
            let mut d = (t.pos + t.vel) - (s.pos + s.vel);
            if d.x == 0.0 { d.x = self.jiggle(); }
            if d.y == 0.0 { d.y = self.jiggle(); }
            let len = d.length();
            let k = (len - distance) / len * alpha * strength;
            let d = d * k;
            self.nodes[target].vel -= d * bias;
            self.nodes[source].vel += d * (1.0 - bias);
        }
    }

    // Pairwise charge; graphs here are small so no quadtree approximation
    fn apply_charge(&mut self, alpha: f32) {
        let strength = self.params.charge_strength;
        let dmin2 = self.params.distance_min * self.params.distance_min;
        let n = self.nodes.len();
        for i in 0..n {
            let mut dv = Vec2::ZERO;
            for j in 0..n {
                if i == j { continue; }
                let mut d = self.nodes[j].pos - self.nodes[i].pos;
                let mut l = d.length_sq();
                if d.x == 0.0 {
                    d.x = self.jiggle();
                    l += d.x * d.x;
                }
                if d.y == 0.0 {
                    d.y = self.jiggle();
                    l += d.y * d.y;
                }
                if l < dmin2 { l = (dmin2 * l).sqrt(); }
                dv += d * (strength * alpha / l);
            }
            self.nodes[i].vel += dv;
        }
    }

    // Translate so the mean position sits on the viewport center
    fn apply_centering(&mut self) {
        if self.nodes.is_empty() { return; }
        let n = self.nodes.len() as f32;
        let sum = self.nodes.iter().fold(Vec2::ZERO, |acc, node| acc + node.pos.to_vec2());
        let shift = sum / n - self.center.to_vec2();
        for node in &mut self.nodes {
            if node.pinned.is_none() { node.pos -= shift; }
        }
    }

    // Weak independent pull on x and y toward the center
    fn apply_positioning(&mut self, alpha: f32) {
        let k = self.params.center_strength * alpha;
        let c = self.center;
        for node in &mut self.nodes {
            node.vel.x += (c.x - node.pos.x) * k;
            node.vel.y += (c.y - node.pos.y) * k;
        }
    }
}

/// Staggered fade-in of nodes and links by array index. Cosmetic only.
#[derive(Clone, Copy, Debug)]
pub struct EntranceSchedule {
    pub node_delay: Duration,
    pub node_fade: Duration,
    pub link_delay: Duration,
    pub link_fade: Duration,
}

impl Default for EntranceSchedule {
    fn default() -> Self {
        Self {
            node_delay: Duration::from_millis(150),
            node_fade: Duration::from_millis(800),
            link_delay: Duration::from_millis(100),
            link_fade: Duration::from_millis(1000),
        }
    }
}

impl EntranceSchedule {
    pub fn node_opacity(&self, index: usize, elapsed: Duration) -> f32 {
        fade(self.node_delay * index as u32, self.node_fade, elapsed)
    }

    pub fn link_opacity(&self, index: usize, elapsed: Duration) -> f32 {
        fade(self.link_delay * index as u32, self.link_fade, elapsed)
    }

    pub fn finished(&self, node_count: usize, link_count: usize, elapsed: Duration) -> bool {
        let last_node = self.node_delay * node_count.saturating_sub(1) as u32 + self.node_fade;
        let last_link = self.link_delay * link_count.saturating_sub(1) as u32 + self.link_fade;
        elapsed >= last_node.max(last_link)
    }
}

fn fade(delay: Duration, duration: Duration, elapsed: Duration) -> f32 {
    if elapsed <= delay { return 0.0; }
    let t = ((elapsed - delay).as_secs_f32() / duration.as_secs_f32().max(f32::EPSILON)).min(1.0);
    // cubic in-out
    if t < 0.5 { 4.0 * t * t * t } else { 1.0 - (-2.0 * t + 2.0).powi(3) / 2.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::result::{GraphLink, GraphNode, NodeGroup};

    fn viewport() -> Rect {
        Rect::from_min_size(Pos2::ZERO, Vec2::new(800.0, 500.0))
    }

    fn graph(n: usize, links: &[(usize, usize)]) -> MethodGraph {
        MethodGraph {
            nodes: (0..n)
                .map(|i| GraphNode { id: format!("n{}", i), group: NodeGroup::Model, label: format!("Node {}", i) })
                .collect(),
            links: links
                .iter()
                .map(|(s, t)| GraphLink { source: format!("n{}", s), target: format!("n{}", t), weight: 1.0 })
                .collect(),
        }
    }

    fn seeded(g: &MethodGraph, seed: u64) -> ForceLayout {
        ForceLayout::with_rng(g, viewport(), LayoutParams::default(), StdRng::seed_from_u64(seed))
    }

    #[test]
    fn cools_to_rest_within_a_few_hundred_ticks() {
        let g = graph(10, &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 6), (6, 7), (7, 8), (8, 9)]);
        let mut layout = seeded(&g, 7);
        let ticks = layout.run_to_rest(10_000);
        assert!(!layout.is_running());
        assert!(layout.alpha() < layout.params().alpha_min);
        assert!(ticks <= 320, "took {} ticks", ticks);
        assert!(layout.kinetic_energy() < 1.0, "still moving: {}", layout.kinetic_energy());
    }

    #[test]
    fn settled_nodes_never_share_a_coordinate() {
        let g = graph(10, &[(0, 1), (0, 2), (1, 3), (2, 3), (3, 4)]);
        let mut layout = seeded(&g, 11);
        layout.run_to_rest(10_000);
        let nodes = layout.nodes();
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                assert!(nodes[i].pos.distance(nodes[j].pos) > 1.0, "nodes {} and {} overlap", i, j);
            }
        }
    }

    #[test]
    fn single_link_settles_near_target_distance() {
        let g = graph(2, &[(0, 1)]);
        let mut layout = seeded(&g, 3);
        layout.run_to_rest(10_000);
        let d = layout.nodes()[0].pos.distance(layout.nodes()[1].pos);
        assert!((d - 120.0).abs() < 20.0, "distance {}", d);
    }

    #[test]
    fn chain_links_stay_within_tolerance() {
        let g = graph(5, &[(0, 1), (1, 2), (2, 3), (3, 4)]);
        let mut layout = seeded(&g, 5);
        layout.run_to_rest(10_000);
        for link in layout.links() {
            let d = layout.nodes()[link.source].pos.distance(layout.nodes()[link.target].pos);
            assert!((60.0..=180.0).contains(&d), "link distance {}", d);
        }
    }

    #[test]
    fn mean_position_tracks_viewport_center() {
        let g = graph(4, &[(0, 1), (2, 3)]);
        let mut layout = seeded(&g, 9);
        layout.run_to_rest(10_000);
        let n = layout.nodes().len() as f32;
        let mean = layout.nodes().iter().fold(Vec2::ZERO, |a, node| a + node.pos.to_vec2()) / n;
        assert!(mean.to_pos2().distance(viewport().center()) < 1.0);
    }

    #[test]
    fn advance_is_bounded_per_call() {
        let g = graph(3, &[(0, 1)]);
        let mut layout = seeded(&g, 1);
        layout.advance(4);
        assert_eq!(layout.ticks(), 4);
    }

    #[test]
    fn stop_halts_stepping() {
        let g = graph(3, &[(0, 1), (1, 2)]);
        let mut layout = seeded(&g, 1);
        layout.advance(2);
        layout.stop();
        assert!(layout.is_stopped());
        let before: Vec<Pos2> = layout.nodes().iter().map(|n| n.pos).collect();
        assert!(!layout.advance(10));
        let after: Vec<Pos2> = layout.nodes().iter().map(|n| n.pos).collect();
        assert_eq!(before, after);
        layout.reheat(1.0);
        assert!(!layout.is_running());
    }

    #[test]
    fn pinned_node_holds_its_position() {
        let g = graph(3, &[(0, 1), (1, 2)]);
        let mut layout = seeded(&g, 2);
        let target = Pos2::new(50.0, 60.0);
        layout.pin(1, target);
        layout.advance(30);
        assert_eq!(layout.nodes()[1].pos, target);
    }

    #[test]
    fn dangling_and_self_links_are_ignored() {
        let mut g = graph(2, &[(0, 1), (1, 1)]);
        g.links.push(GraphLink { source: "n0".into(), target: "ghost".into(), weight: 1.0 });
        let layout = seeded(&g, 4);
        assert_eq!(layout.links().len(), 1);
    }

    #[test]
    fn kept_links_remember_their_graph_index() {
        let g = graph(3, &[(1, 1), (0, 1), (2, 2), (1, 2)]);
        let layout = seeded(&g, 4);
        let indices: Vec<usize> = layout.links().iter().map(|l| l.index).collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn entrance_is_staggered_by_index() {
        let s = EntranceSchedule::default();
        assert_eq!(s.node_opacity(0, Duration::ZERO), 0.0);
        assert_eq!(s.node_opacity(2, Duration::from_millis(300)), 0.0);
        assert!(s.node_opacity(0, Duration::from_millis(400)) > 0.0);
        assert_eq!(s.node_opacity(2, Duration::from_millis(1100)), 1.0);
        assert_eq!(s.link_opacity(1, Duration::from_millis(1100)), 1.0);
        assert!(s.finished(3, 2, Duration::from_millis(1100)));
        assert!(!s.finished(3, 2, Duration::from_millis(1000)));
    }
}
