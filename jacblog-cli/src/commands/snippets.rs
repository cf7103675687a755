//! List the runnable snippets on a page.

use anyhow::{Context, Result};
use jacblog_core::extract_snippets;
use std::fs;
use std::path::Path;

pub fn list_snippets(page: &Path, json: bool) -> Result<()> {
    let markdown =
        fs::read_to_string(page).with_context(|| format!("Failed to read page {:?}", page))?;
    let snippets = extract_snippets(&markdown).with_context(|| format!("In page {:?}", page))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snippets)?);
        return Ok(());
    }

    if snippets.is_empty() {
        println!("No runnable snippets in {}", page.display());
        return Ok(());
    }

    for snippet in &snippets {
        let actions: Vec<&str> = snippet
            .actions
            .iter()
            .map(|a| a.command().as_str())
            .collect();
        let lines = snippet.code.lines().count();
        println!(
            "[{}] line {}: {} ({} lines) actions: {}",
            snippet.index,
            snippet.line,
            snippet.language,
            lines,
            actions.join(", ")
        );
    }
    Ok(())
}
