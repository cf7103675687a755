//! In-memory virtual filesystem for the sandboxed runtime
//!
//! Holds the scratch source file and the unpacked support archive. Paths are
//! absolute, `/`-separated, and never touch the host filesystem.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use thiserror::Error;

/// Default mount point for the support archive
pub const LIB_PREFIX: &str = "/lib";

#[derive(Error, Debug)]
pub enum VfsError {
    #[error("No such file: {0}")]
    NotFound(String),

    #[error("File is not valid UTF-8: {0}")]
    NotUtf8(String),

    #[error("Invalid support archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Failed to read archive entry: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsafe archive entry name: {0}")]
    UnsafeEntry(String),
}

#[derive(Debug, Default, Clone)]
pub struct Vfs {
    files: BTreeMap<String, Vec<u8>>,
}

impl Vfs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, path: &str, contents: impl Into<Vec<u8>>) {
        self.files.insert(normalize(path), contents.into());
    }

    pub fn read(&self, path: &str) -> Result<&[u8], VfsError> {
        let path = normalize(path);
        self.files
            .get(&path)
            .map(Vec::as_slice)
            .ok_or(VfsError::NotFound(path))
    }

    pub fn read_to_string(&self, path: &str) -> Result<String, VfsError> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| VfsError::NotUtf8(normalize(path)))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.files.contains_key(&normalize(path))
    }

    /// Paths under a directory prefix, in sorted order
    pub fn list(&self, prefix: &str) -> Vec<&str> {
        let prefix = normalize(prefix);
        let dir = if prefix.ends_with('/') {
            prefix
        } else {
            format!("{}/", prefix)
        };
        self.files
            .keys()
            .filter(|p| p.starts_with(&dir))
            .map(String::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Unpack a zip archive under `prefix`, returning the number of files
    pub fn mount_archive(&mut self, bytes: &[u8], prefix: &str) -> Result<usize, VfsError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        let prefix = normalize(prefix);
        let mut mounted = 0;

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            if name.split('/').any(|part| part == "..") || name.starts_with('/') {
                return Err(VfsError::UnsafeEntry(name));
            }

            let mut contents = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut contents)?;
            self.write(&format!("{}/{}", prefix.trim_end_matches('/'), name), contents);
            mounted += 1;
        }

        tracing::debug!(files = mounted, prefix = %prefix, "mounted support archive");
        Ok(mounted)
    }
}

fn normalize(path: &str) -> String {
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}
