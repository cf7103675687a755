//! Pre-build hook: pack the runtime support archive.

use anyhow::{Context, Result};
use jacblog_core::{pack_support_archive, Config};
use std::path::{Path, PathBuf};

pub fn pack_archive(
    config_path: &Path,
    source: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let Some(source) = source.or_else(|| config.pack_source()) else {
        tracing::warn!("No support library configured (pack.source); skipping archive");
        return Ok(());
    };
    let output = output.unwrap_or_else(|| config.pack_output());

    tracing::info!("Packing {:?} into {:?}", source, output);
    match pack_support_archive(&source, &output, &config.pack.folder_name)
        .context("Failed to pack support archive")?
    {
        Some(summary) => println!(
            "Packed {} files into {}",
            summary.files,
            summary.archive.display()
        ),
        None => println!("Support library not found; no archive written"),
    }
    Ok(())
}
