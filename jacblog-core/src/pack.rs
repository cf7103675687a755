//! Support archive packing.
//!
//! Runs before a site build: zips the support-library directory into the
//! archive the snippet runtime mounts at startup.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

#[derive(Error, Debug)]
pub enum PackError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to walk {0:?}: {1}")]
    Walk(PathBuf, #[source] walkdir::Error),

    #[error("Failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> PackError + '_ {
    move |source| PackError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSummary {
    pub archive: PathBuf,
    pub files: usize,
}

/// Archive every file under `source` as `<folder_name>/<relative path>`
///
/// An existing archive at `output` is removed first. A missing `source` is
/// not an error: a warning is logged and `Ok(None)` returned, leaving the
/// runtime to start without a support library.
pub fn pack_support_archive(
    source: &Path,
    output: &Path,
    folder_name: &str,
) -> Result<Option<PackSummary>, PackError> {
    if output.exists() {
        info!("Removing existing archive: {:?}", output);
        fs::remove_file(output).map_err(io_at(output))?;
    }

    if !source.is_dir() {
        warn!(
            "Support library not found at {:?}; runnable snippets will start without it",
            source
        );
        return Ok(None);
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_at(parent))?;
    }

    let file = File::create(output).map_err(io_at(output))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut files = 0;
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|e| PackError::Walk(source.to_path_buf(), e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let mut name = String::from(folder_name);
        for component in relative.components() {
            name.push('/');
            name.push_str(&component.as_os_str().to_string_lossy());
        }

        writer.start_file(name, options)?;
        let mut input = File::open(entry.path()).map_err(io_at(entry.path()))?;
        io::copy(&mut input, &mut writer).map_err(io_at(entry.path()))?;
        files += 1;
    }
    writer.finish()?;

    info!("Archive saved to {:?} ({} files)", output, files);
    Ok(Some(PackSummary {
        archive: output.to_path_buf(),
        files,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn names(archive: &Path) -> Vec<String> {
        let mut zip = zip::ZipArchive::new(File::open(archive).unwrap()).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_packs_under_folder_name() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("lib");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::write(source.join("a.jac"), "def one() -> int { return 1; }").unwrap();
        fs::write(source.join("sub/b.jac"), "glob b = 2;").unwrap();
        let output = dir.path().join("site/playground/jaclang.zip");

        let summary = pack_support_archive(&source, &output, "jaclang")
            .unwrap()
            .unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(names(&output), vec!["jaclang/a.jac", "jaclang/sub/b.jac"]);

        let mut zip = zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let mut entry = zip.by_name("jaclang/sub/b.jac").unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Deflated);
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "glob b = 2;");
    }

    #[test]
    fn test_existing_archive_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("lib");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("new.jac"), "").unwrap();
        let output = dir.path().join("out.zip");
        fs::write(&output, "stale bytes").unwrap();

        pack_support_archive(&source, &output, "jaclang").unwrap();
        assert_eq!(names(&output), vec!["jaclang/new.jac"]);
    }

    #[test]
    fn test_missing_source_only_warns() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.zip");
        fs::write(&output, "stale bytes").unwrap();

        let result = pack_support_archive(&dir.path().join("absent"), &output, "jaclang").unwrap();
        assert!(result.is_none());
        assert!(!output.exists());
    }
}
