//! # jacblog-core
//!
//! Core library for the jacblog snippet runner.
//!
//! This crate covers everything that happens before a snippet reaches the
//! runtime: site configuration, finding runnable blocks in markdown pages,
//! the per-snippet editors, highlighted page rendering, and packing the
//! runtime's support archive.

pub mod config;
pub mod editor;
pub mod highlight;
pub mod pack;
pub mod snippets;

pub use config::{Config, ConfigError, DEFAULT_CONFIG_FILE};
pub use editor::{EditorError, EditorSurface, SnippetEditor};
pub use highlight::render_page;
pub use pack::{pack_support_archive, PackError, PackSummary};
pub use snippets::{extract_snippets, select, Snippet, SnippetError};
