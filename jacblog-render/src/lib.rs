//! # jacblog-render
//!
//! Result rendering for snippet executions.
//!
//! - **Scrollback**: the output panel, fed by streamed text
//! - **Entities**: decoding of the escaped graph payload
//! - **Dot / layout / svg**: graph description to a layered SVG diagram
//! - **Viewport**: pan and zoom over the diagram
//! - **Renderer**: ties the above to page events, with a raw-text fallback

pub mod dot;
pub mod entities;
pub mod layout;
pub mod renderer;
pub mod scrollback;
pub mod svg;
pub mod viewport;

pub use dot::{DotError, DotGraph};
pub use entities::decode_entities;
pub use layout::{layout, Layout, LayoutOptions};
pub use renderer::{render_graph, GraphPane, RenderError, ResultRenderer};
pub use scrollback::Scrollback;
pub use svg::render_svg;
pub use viewport::{Transform, Viewport};
