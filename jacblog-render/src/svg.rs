//! SVG output for laid-out graphs

use crate::layout::{EdgeKind, Layout, Point, Shape};
use crate::viewport::Transform;
use askama::Template;

const DEFAULT_FILL: &str = "#ffffff";

/// Compact decimal: at most two fraction digits, no trailing zeros
pub(crate) fn num(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    // Avoid "-0"
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    let text = format!("{:.2}", rounded);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn point(p: Point) -> String {
    format!("{},{}", num(p.x), num(p.y))
}

struct TextLine {
    x: String,
    y: String,
    text: String,
}

struct NodeView {
    id: String,
    ellipse: bool,
    cx: String,
    cy: String,
    rx: String,
    ry: String,
    x: String,
    y: String,
    width: String,
    height: String,
    fill: String,
    lines: Vec<TextLine>,
}

struct EdgeView {
    d: String,
    label: Option<TextLine>,
}

#[derive(Template)]
#[template(path = "graph.svg")]
struct GraphSvg {
    view_box: String,
    transform: String,
    directed: bool,
    nodes: Vec<NodeView>,
    edges: Vec<EdgeView>,
}

/// Render a layout as a standalone SVG document
///
/// The document fills its container and keeps the drawing's aspect ratio.
/// `transform` is applied to the group holding the drawing, so pan and zoom
/// only change one attribute.
pub fn render_svg(layout: &Layout, transform: &Transform) -> Result<String, askama::Error> {
    let line_height = 16.0;

    let nodes = layout
        .nodes
        .iter()
        .map(|node| {
            let first_baseline =
                node.center.y - (node.lines.len() as f64 - 1.0) * line_height / 2.0 + 4.0;
            NodeView {
                id: node.id.clone(),
                ellipse: node.shape == Shape::Ellipse,
                cx: num(node.center.x),
                cy: num(node.center.y),
                rx: num(node.width / 2.0),
                ry: num(node.height / 2.0),
                x: num(node.center.x - node.width / 2.0),
                y: num(node.center.y - node.height / 2.0),
                width: num(node.width),
                height: num(node.height),
                fill: node.fill.clone().unwrap_or_else(|| DEFAULT_FILL.to_string()),
                lines: node
                    .lines
                    .iter()
                    .enumerate()
                    .map(|(i, text)| TextLine {
                        x: num(node.center.x),
                        y: num(first_baseline + i as f64 * line_height),
                        text: text.clone(),
                    })
                    .collect(),
            }
        })
        .collect();

    let edges = layout
        .edges
        .iter()
        .map(|edge| {
            let d = match (edge.kind, edge.points.as_slice()) {
                (EdgeKind::Loop, [start, c1, c2, end]) => format!(
                    "M{} C{} {} {}",
                    point(*start),
                    point(*c1),
                    point(*c2),
                    point(*end)
                ),
                (_, [start, .., end]) => format!("M{} L{}", point(*start), point(*end)),
                _ => String::new(),
            };
            let label = edge.label.as_ref().and_then(|text| {
                let (a, b) = (edge.points.first()?, edge.points.last()?);
                let x = match edge.kind {
                    EdgeKind::Loop => edge.points.iter().map(|p| p.x).fold(f64::MIN, f64::max),
                    EdgeKind::Straight => (a.x + b.x) / 2.0,
                };
                let (x, y) = (x + 4.0, (a.y + b.y) / 2.0);
                Some(TextLine {
                    x: num(x),
                    y: num(y),
                    text: text.clone(),
                })
            });
            EdgeView { d, label }
        })
        .collect();

    GraphSvg {
        view_box: format!("0 0 {} {}", num(layout.width), num(layout.height)),
        transform: transform.to_svg(),
        directed: layout.directed,
        nodes,
        edges,
    }
    .render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dot::parse;
    use crate::layout::{layout, LayoutOptions};

    fn svg_of(source: &str) -> String {
        let laid = layout(&parse(source).unwrap(), &LayoutOptions::default());
        render_svg(&laid, &Transform::IDENTITY).unwrap()
    }

    #[test]
    fn test_num() {
        assert_eq!(num(12.0), "12");
        assert_eq!(num(1.5), "1.5");
        assert_eq!(num(2.346), "2.35");
        assert_eq!(num(100.0), "100");
        assert_eq!(num(-0.001), "0");
    }

    #[test]
    fn test_document_fits_container() {
        let svg = svg_of("digraph { a -> b; }");
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(r#"preserveAspectRatio="xMidYMid meet""#));
        assert!(svg.contains(r#"width="100%""#));
        assert!(svg.contains(r#"transform="translate(0 0) scale(1)""#));
    }

    #[test]
    fn test_nodes_and_edges_drawn() {
        let svg = svg_of(r#"digraph { a [shape=box]; a -> b [label="next"]; }"#);
        assert_eq!(svg.matches("<rect").count(), 1);
        assert_eq!(svg.matches("<ellipse").count(), 1);
        assert_eq!(svg.matches("class=\"edge\"").count(), 1);
        assert!(svg.contains("marker-end"));
        assert!(svg.contains(">next</text>"));
    }

    #[test]
    fn test_undirected_has_no_arrows() {
        let svg = svg_of("graph { a -- b; }");
        assert!(!svg.contains("marker-end"));
    }

    #[test]
    fn test_labels_are_escaped() {
        let svg = svg_of(r#"digraph { a [label="Person(name='<Al & Bo>')"]; }"#);
        assert!(svg.contains("&#60;Al &#38; Bo&#62;"));
        assert!(!svg.contains("<Al"));
        let decoded = crate::entities::decode_entities(&svg);
        assert!(decoded.contains("Person(name='<Al & Bo>')"));
    }
}
