//! Layered graph layout
//!
//! Nodes are assigned to ranks by longest path after breaking cycles, ordered
//! within each rank by barycenter sweeps, then placed on a fixed grid of rank
//! and node spacing. Edges are straight segments clipped to node outlines.

use crate::dot::{DotGraph, RankDir};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct LayoutOptions {
    pub node_height: f64,
    pub line_height: f64,
    pub char_width: f64,
    pub padding: f64,
    pub min_width: f64,
    pub node_sep: f64,
    pub rank_sep: f64,
    pub margin: f64,
    pub sweeps: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            node_height: 36.0,
            line_height: 16.0,
            char_width: 7.2,
            padding: 12.0,
            min_width: 48.0,
            node_sep: 24.0,
            rank_sep: 48.0,
            margin: 16.0,
            sweeps: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Ellipse,
    Box,
}

impl Shape {
    fn from_attr(value: Option<&str>) -> Self {
        match value {
            Some("box" | "rect" | "rectangle" | "square" | "record") => Shape::Box,
            _ => Shape::Ellipse,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeBox {
    pub id: String,
    pub lines: Vec<String>,
    pub shape: Shape,
    pub fill: Option<String>,
    /// Center
    pub center: Point,
    pub width: f64,
    pub height: f64,
    pub rank: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// `points` holds the two endpoints
    Straight,
    /// `points` holds a cubic curve: start, two controls, end
    Loop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgePath {
    pub from: usize,
    pub to: usize,
    pub kind: EdgeKind,
    pub points: Vec<Point>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub directed: bool,
    pub nodes: Vec<NodeBox>,
    pub edges: Vec<EdgePath>,
    pub width: f64,
    pub height: f64,
}

impl Layout {
    pub fn rank_count(&self) -> usize {
        self.nodes.iter().map(|n| n.rank + 1).max().unwrap_or(0)
    }
}

/// Lay out a parsed graph
pub fn layout(graph: &DotGraph, options: &LayoutOptions) -> Layout {
    let n = graph.nodes.len();
    let index_of = |id: &str| graph.nodes.iter().position(|node| node.id == id);

    let links: Vec<(usize, usize)> = graph
        .edges
        .iter()
        .filter_map(|e| Some((index_of(&e.from)?, index_of(&e.to)?)))
        .collect();

    let acyclic = break_cycles(n, &links);
    let ranks = assign_ranks(n, &acyclic);
    let layers = order_layers(n, &ranks, &acyclic, options.sweeps);

    let rankdir = graph.rankdir();
    let mut nodes: Vec<NodeBox> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let lines: Vec<String> = node.label().lines().map(str::to_string).collect();
            let lines = if lines.is_empty() { vec![String::new()] } else { lines };
            let longest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
            let width = (longest as f64 * options.char_width + 2.0 * options.padding)
                .max(options.min_width);
            let height = options
                .node_height
                .max(lines.len() as f64 * options.line_height + options.padding);
            NodeBox {
                id: node.id.clone(),
                lines,
                shape: Shape::from_attr(node.attr("shape")),
                fill: node.attr("fillcolor").map(str::to_string),
                center: Point { x: 0.0, y: 0.0 },
                width,
                height,
                rank: ranks[i],
            }
        })
        .collect();

    let (width, height) = place(&mut nodes, &layers, rankdir, options);

    let edges = graph
        .edges
        .iter()
        .filter_map(|e| {
            let (from, to) = (index_of(&e.from)?, index_of(&e.to)?);
            let label = e.attr("label").map(crate::dot::label_text);
            Some(route(&nodes, from, to, label))
        })
        .collect();

    Layout {
        directed: graph.directed,
        nodes,
        edges,
        width,
        height,
    }
}

/// Reverse DFS back edges; self loops are dropped from ranking
fn break_cycles(n: usize, links: &[(usize, usize)]) -> Vec<(usize, usize)> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    let mut out_edges = vec![Vec::new(); n];
    for (i, &(from, to)) in links.iter().enumerate() {
        if from != to {
            out_edges[from].push(i);
        }
    }

    let mut reversed = vec![false; links.len()];
    let mut mark = vec![Mark::New; n];
    for start in 0..n {
        if mark[start] != Mark::New {
            continue;
        }
        mark[start] = Mark::Active;
        let mut stack = vec![(start, 0usize)];
        while let Some(top) = stack.last_mut() {
            let node = top.0;
            match out_edges[node].get(top.1) {
                Some(&edge) => {
                    top.1 += 1;
                    let target = links[edge].1;
                    match mark[target] {
                        Mark::New => {
                            mark[target] = Mark::Active;
                            stack.push((target, 0));
                        }
                        Mark::Active => reversed[edge] = true,
                        Mark::Done => {}
                    }
                }
                None => {
                    mark[node] = Mark::Done;
                    stack.pop();
                }
            }
        }
    }

    links
        .iter()
        .zip(reversed)
        .filter(|((from, to), _)| from != to)
        .map(|(&(from, to), rev)| if rev { (to, from) } else { (from, to) })
        .collect()
}

/// Longest-path layering over an acyclic edge list
fn assign_ranks(n: usize, edges: &[(usize, usize)]) -> Vec<usize> {
    let mut indegree = vec![0usize; n];
    let mut succs = vec![Vec::new(); n];
    for &(from, to) in edges {
        indegree[to] += 1;
        succs[from].push(to);
    }

    let mut rank = vec![0usize; n];
    let mut queue: VecDeque<usize> = (0..n).filter(|&v| indegree[v] == 0).collect();
    while let Some(v) = queue.pop_front() {
        for &w in &succs[v] {
            rank[w] = rank[w].max(rank[v] + 1);
            indegree[w] -= 1;
            if indegree[w] == 0 {
                queue.push_back(w);
            }
        }
    }
    rank
}

/// Group nodes by rank and reduce crossings with barycenter sweeps
fn order_layers(
    n: usize,
    ranks: &[usize],
    edges: &[(usize, usize)],
    sweeps: usize,
) -> Vec<Vec<usize>> {
    let depth = ranks.iter().map(|r| r + 1).max().unwrap_or(0);
    let mut layers = vec![Vec::new(); depth];
    for v in 0..n {
        layers[ranks[v]].push(v);
    }

    let mut preds = vec![Vec::new(); n];
    let mut succs = vec![Vec::new(); n];
    for &(from, to) in edges {
        succs[from].push(to);
        preds[to].push(from);
    }

    let mut position = vec![0.0f64; n];
    let reindex = |layers: &[Vec<usize>], position: &mut [f64]| {
        for layer in layers {
            for (i, &v) in layer.iter().enumerate() {
                position[v] = i as f64;
            }
        }
    };
    reindex(&layers, &mut position);

    for sweep in 0..sweeps {
        let downward = sweep % 2 == 0;
        let order: Vec<usize> = if downward {
            (1..depth).collect()
        } else {
            (0..depth.saturating_sub(1)).rev().collect()
        };
        for r in order {
            let neighbors = if downward { &preds } else { &succs };
            let mut keyed: Vec<(f64, usize)> = layers[r]
                .iter()
                .map(|&v| {
                    let adjacent = &neighbors[v];
                    let key = if adjacent.is_empty() {
                        position[v]
                    } else {
                        adjacent.iter().map(|&u| position[u]).sum::<f64>() / adjacent.len() as f64
                    };
                    (key, v)
                })
                .collect();
            keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
            layers[r] = keyed.into_iter().map(|(_, v)| v).collect();
            for (i, &v) in layers[r].iter().enumerate() {
                position[v] = i as f64;
            }
        }
    }
    layers
}

/// Assign centers and return the drawing size
fn place(
    nodes: &mut [NodeBox],
    layers: &[Vec<usize>],
    rankdir: RankDir,
    options: &LayoutOptions,
) -> (f64, f64) {
    let horizontal = rankdir.is_horizontal();
    // Extent of a node along the rank axis and across it
    let along = |node: &NodeBox| if horizontal { node.width } else { node.height };
    let across = |node: &NodeBox| if horizontal { node.height } else { node.width };

    let thickness: Vec<f64> = layers
        .iter()
        .map(|layer| layer.iter().map(|&v| along(&nodes[v])).fold(0.0, f64::max))
        .collect();
    let spans: Vec<f64> = layers
        .iter()
        .map(|layer| {
            let sum: f64 = layer.iter().map(|&v| across(&nodes[v])).sum();
            sum + options.node_sep * layer.len().saturating_sub(1) as f64
        })
        .collect();
    let cross_extent = spans.iter().copied().fold(0.0, f64::max);
    let rank_extent = thickness.iter().sum::<f64>()
        + options.rank_sep * thickness.len().saturating_sub(1) as f64;

    let mut offset = options.margin;
    for (r, layer) in layers.iter().enumerate() {
        let mid = offset + thickness[r] / 2.0;
        let mut cursor = options.margin + (cross_extent - spans[r]) / 2.0;
        for &v in layer {
            let size = across(&nodes[v]);
            let along_pos = match rankdir {
                RankDir::BottomTop | RankDir::RightLeft => {
                    2.0 * options.margin + rank_extent - mid
                }
                _ => mid,
            };
            let cross_pos = cursor + size / 2.0;
            nodes[v].center = if horizontal {
                Point { x: along_pos, y: cross_pos }
            } else {
                Point { x: cross_pos, y: along_pos }
            };
            cursor += size + options.node_sep;
        }
        offset += thickness[r] + options.rank_sep;
    }

    let (w, h) = if horizontal {
        (rank_extent, cross_extent)
    } else {
        (cross_extent, rank_extent)
    };
    (w + 2.0 * options.margin, h + 2.0 * options.margin)
}

/// Where a ray from the node center toward `(dx, dy)` leaves the outline
fn boundary(node: &NodeBox, dx: f64, dy: f64) -> Point {
    let (hw, hh) = (node.width / 2.0, node.height / 2.0);
    let t = match node.shape {
        Shape::Ellipse => 1.0 / ((dx / hw).powi(2) + (dy / hh).powi(2)).sqrt(),
        Shape::Box => {
            let tx = if dx == 0.0 { f64::INFINITY } else { hw / dx.abs() };
            let ty = if dy == 0.0 { f64::INFINITY } else { hh / dy.abs() };
            tx.min(ty)
        }
    };
    Point {
        x: node.center.x + dx * t,
        y: node.center.y + dy * t,
    }
}

fn route(nodes: &[NodeBox], from: usize, to: usize, label: Option<String>) -> EdgePath {
    let (a, b) = (&nodes[from], &nodes[to]);

    if from == to {
        let right = a.center.x + a.width / 2.0;
        let (top, bottom) = (a.center.y - a.height / 4.0, a.center.y + a.height / 4.0);
        let reach = a.height * 0.9;
        return EdgePath {
            from,
            to,
            kind: EdgeKind::Loop,
            points: vec![
                Point { x: right - 2.0, y: top },
                Point { x: right + reach, y: top - reach / 2.0 },
                Point { x: right + reach, y: bottom + reach / 2.0 },
                Point { x: right - 2.0, y: bottom },
            ],
            label,
        };
    }

    let (dx, dy) = (b.center.x - a.center.x, b.center.y - a.center.y);
    let points = if dx == 0.0 && dy == 0.0 {
        vec![a.center, b.center]
    } else {
        vec![boundary(a, dx, dy), boundary(b, -dx, -dy)]
    };
    EdgePath {
        from,
        to,
        kind: EdgeKind::Straight,
        points,
        label,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dot::parse;

    fn laid_out(source: &str) -> Layout {
        layout(&parse(source).unwrap(), &LayoutOptions::default())
    }

    fn rank_of(layout: &Layout, id: &str) -> usize {
        layout.nodes.iter().find(|n| n.id == id).unwrap().rank
    }

    #[test]
    fn test_chain_gets_one_rank_per_node() {
        let layout = laid_out("digraph { a -> b -> c; }");
        assert_eq!(rank_of(&layout, "a"), 0);
        assert_eq!(rank_of(&layout, "b"), 1);
        assert_eq!(rank_of(&layout, "c"), 2);
        assert_eq!(layout.rank_count(), 3);
        let ys: Vec<f64> = layout.nodes.iter().map(|n| n.center.y).collect();
        assert!(ys[0] < ys[1] && ys[1] < ys[2]);
    }

    #[test]
    fn test_longest_path_wins() {
        let layout = laid_out("digraph { a -> b -> c; a -> c; }");
        assert_eq!(rank_of(&layout, "c"), 2);
    }

    #[test]
    fn test_cycle_is_broken() {
        let layout = laid_out("digraph { a -> b -> c -> a; }");
        let mut ranks: Vec<usize> = layout.nodes.iter().map(|n| n.rank).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![0, 1, 2]);
        assert_eq!(layout.edges.len(), 3);
    }

    #[test]
    fn test_left_right_swaps_axes() {
        let layout = laid_out("digraph { rankdir=LR; a -> b; }");
        let (a, b) = (&layout.nodes[0], &layout.nodes[1]);
        assert!(a.center.x < b.center.x);
        assert_eq!(a.center.y, b.center.y);
    }

    #[test]
    fn test_nodes_fit_inside_drawing() {
        let layout = laid_out("digraph { root -> x; root -> y; root -> z; x -> w; }");
        for node in &layout.nodes {
            assert!(node.center.x - node.width / 2.0 >= 0.0);
            assert!(node.center.x + node.width / 2.0 <= layout.width);
            assert!(node.center.y + node.height / 2.0 <= layout.height);
        }
    }

    #[test]
    fn test_siblings_do_not_overlap() {
        let layout = laid_out("digraph { r -> a; r -> b; r -> c; }");
        let mut row: Vec<&NodeBox> = layout.nodes.iter().filter(|n| n.rank == 1).collect();
        row.sort_by(|p, q| p.center.x.total_cmp(&q.center.x));
        for pair in row.windows(2) {
            let gap = (pair[1].center.x - pair[1].width / 2.0) - (pair[0].center.x + pair[0].width / 2.0);
            assert!(gap >= LayoutOptions::default().node_sep - 1e-9);
        }
    }

    #[test]
    fn test_barycenter_untangles_crossing() {
        // x is declared before y, so the declaration order crosses
        let layout = laid_out("digraph { a; b; x; y; a -> y; b -> x; }");
        let x_of = |id: &str| layout.nodes.iter().find(|n| n.id == id).unwrap().center.x;
        assert_eq!(x_of("a") < x_of("b"), x_of("y") < x_of("x"));
    }

    #[test]
    fn test_edges_end_on_outlines() {
        let layout = laid_out("digraph { a -> b; }");
        let edge = &layout.edges[0];
        assert_eq!(edge.kind, EdgeKind::Straight);
        let (a, b) = (&layout.nodes[0], &layout.nodes[1]);
        assert!((edge.points[0].y - (a.center.y + a.height / 2.0)).abs() < 1e-6);
        assert!((edge.points[1].y - (b.center.y - b.height / 2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_self_loop() {
        let layout = laid_out("digraph { a -> a; }");
        assert_eq!(layout.edges[0].kind, EdgeKind::Loop);
        assert_eq!(layout.edges[0].points.len(), 4);
        assert_eq!(layout.nodes[0].rank, 0);
    }

    #[test]
    fn test_multiline_labels_grow_nodes() {
        let layout = laid_out(r#"digraph { a [label="one\ntwo\nthree"]; b; }"#);
        assert_eq!(layout.nodes[0].lines.len(), 3);
        assert!(layout.nodes[0].height > layout.nodes[1].height);
    }
}
