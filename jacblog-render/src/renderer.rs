//! Result renderer: page events in, panel state out

use crate::dot::{self, DotError};
use crate::entities::decode_entities;
use crate::layout::{layout, Layout, LayoutOptions};
use crate::scrollback::Scrollback;
use crate::svg::render_svg;
use crate::viewport::Viewport;
use jacblog_types::PageEvent;
use thiserror::Error;
use tracing::{debug, warn};

/// Rows shown by the output panel unless configured otherwise
pub const DEFAULT_ROWS: usize = 24;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid graph description: {0}")]
    Parse(#[from] DotError),

    #[error("failed to render diagram: {0}")]
    Template(#[from] askama::Error),
}

/// What the diagram pane currently shows
#[derive(Debug)]
pub enum GraphPane {
    Empty,
    Diagram {
        layout: Layout,
        viewport: Viewport,
        svg: String,
    },
    /// Rendering failed; the decoded payload is shown as text
    Raw { text: String, error: RenderError },
}

impl GraphPane {
    pub fn svg(&self) -> Option<&str> {
        match self {
            GraphPane::Diagram { svg, .. } => Some(svg),
            _ => None,
        }
    }
}

/// Parse, lay out and draw a decoded payload
pub fn render_graph(
    decoded: &str,
    options: &LayoutOptions,
) -> Result<(Layout, String), RenderError> {
    let graph = dot::parse(decoded)?;
    let laid = layout(&graph, options);
    let svg = render_svg(&laid, &Viewport::new().transform())?;
    Ok((laid, svg))
}

#[derive(Debug)]
pub struct ResultRenderer {
    scrollback: Scrollback,
    graph: GraphPane,
    options: LayoutOptions,
}

impl Default for ResultRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_ROWS)
    }
}

impl ResultRenderer {
    pub fn new(rows: usize) -> Self {
        Self {
            scrollback: Scrollback::new(rows),
            graph: GraphPane::Empty,
            options: LayoutOptions::default(),
        }
    }

    pub fn with_layout_options(mut self, options: LayoutOptions) -> Self {
        self.options = options;
        self
    }

    pub fn handle(&mut self, event: &PageEvent) {
        match event {
            PageEvent::Output { output, stream } => self.scrollback.append(output, *stream),
            PageEvent::GraphReady { dot } => self.show_graph(dot),
        }
    }

    /// Replace the diagram with a freshly received payload
    pub fn show_graph(&mut self, payload: &str) {
        let decoded = decode_entities(payload);
        self.graph = match render_graph(&decoded, &self.options) {
            Ok((layout, svg)) => {
                debug!(
                    nodes = layout.nodes.len(),
                    edges = layout.edges.len(),
                    "rendered graph"
                );
                GraphPane::Diagram {
                    layout,
                    viewport: Viewport::new(),
                    svg,
                }
            }
            Err(error) => {
                warn!("showing raw graph payload: {}", error);
                GraphPane::Raw {
                    text: decoded.into_owned(),
                    error,
                }
            }
        };
    }

    /// Apply a pan/zoom change and redraw. Does nothing without a diagram.
    pub fn update_viewport(
        &mut self,
        change: impl FnOnce(&mut Viewport),
    ) -> Result<(), RenderError> {
        if let GraphPane::Diagram {
            layout,
            viewport,
            svg,
        } = &mut self.graph
        {
            let before = viewport.transform();
            change(viewport);
            if viewport.transform() != before {
                *svg = render_svg(layout, &viewport.transform())?;
            }
        }
        Ok(())
    }

    pub fn scrollback(&self) -> &Scrollback {
        &self.scrollback
    }

    pub fn scrollback_mut(&mut self) -> &mut Scrollback {
        &mut self.scrollback
    }

    pub fn graph(&self) -> &GraphPane {
        &self.graph
    }

    /// Clear both panes before a new execution
    pub fn clear(&mut self) {
        self.scrollback.clear();
        self.graph = GraphPane::Empty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jacblog_types::Stream;

    const PAYLOAD: &str = "digraph {\n  0 [label=\"Root()\"];\n  1 [label=\"Person(name=&#x27;Alice&#x27;)\"];\n  0 -> 1;\n}\n";

    #[test]
    fn test_output_events_fill_scrollback() {
        let mut renderer = ResultRenderer::default();
        renderer.handle(&PageEvent::Output {
            output: "Hello, World!\n".into(),
            stream: Stream::Stdout,
        });
        assert_eq!(renderer.scrollback().text(), "Hello, World!\n");
        assert!(matches!(renderer.graph(), GraphPane::Empty));
    }

    #[test]
    fn test_graph_event_renders_diagram() {
        let mut renderer = ResultRenderer::default();
        renderer.handle(&PageEvent::GraphReady { dot: PAYLOAD.into() });
        match renderer.graph() {
            GraphPane::Diagram { layout, svg, .. } => {
                assert_eq!(layout.nodes[1].lines, vec!["Person(name='Alice')"]);
                assert!(svg.contains("Person(name="));
                assert!(!svg.contains("&amp;#x27;"));
            }
            other => panic!("expected a diagram, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_payload_falls_back_to_text() {
        let mut renderer = ResultRenderer::default();
        renderer.show_graph("digraph { a -> &lt;oops");
        match renderer.graph() {
            GraphPane::Raw { text, error } => {
                assert_eq!(text, "digraph { a -> <oops");
                assert!(matches!(error, RenderError::Parse(_)));
            }
            other => panic!("expected raw text, got {:?}", other),
        }
    }

    #[test]
    fn test_zoom_redraws_transform() {
        let mut renderer = ResultRenderer::default();
        renderer.show_graph(PAYLOAD);
        renderer
            .update_viewport(|view| view.zoom_at(2.0, 0.0, 0.0))
            .unwrap();
        assert!(renderer.graph().svg().unwrap().contains("scale(2)"));

        renderer.update_viewport(Viewport::reset).unwrap();
        assert!(renderer.graph().svg().unwrap().contains("scale(1)"));
    }

    #[test]
    fn test_clear() {
        let mut renderer = ResultRenderer::default();
        renderer.show_graph(PAYLOAD);
        renderer.handle(&PageEvent::Output {
            output: "x".into(),
            stream: Stream::Stderr,
        });
        renderer.clear();
        assert!(renderer.scrollback().is_empty());
        assert!(renderer.graph().svg().is_none());
    }
}
