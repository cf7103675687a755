//! Render a page with its snippet source highlighted.

use anyhow::{Context, Result};
use jacblog_core::render_page;
use std::fs;
use std::path::Path;
use tracing::info;

pub fn highlight_page(page: &Path, output: Option<&Path>) -> Result<()> {
    let markdown =
        fs::read_to_string(page).with_context(|| format!("Failed to read page {:?}", page))?;
    let html = render_page(&markdown);

    match output {
        Some(path) => {
            fs::write(path, &html).with_context(|| format!("Failed to write {:?}", path))?;
            info!("Wrote {} bytes to {:?}", html.len(), path);
        }
        None => print!("{}", html),
    }
    Ok(())
}
