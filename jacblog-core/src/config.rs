//! Configuration parsing and management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "jacblog.yml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Main configuration struct matching the jacblog.yml schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub pack: PackConfig,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Byte capacity of the input hand-off region
    #[serde(default = "default_input_capacity")]
    pub input_capacity: usize,

    /// Give up on an input request after this many seconds
    #[serde(default)]
    pub input_timeout_secs: Option<u64>,

    /// Zip archive mounted under /lib before the first execution
    #[serde(default)]
    pub support_archive: Option<PathBuf>,
}

fn default_input_capacity() -> usize {
    4096
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            input_capacity: default_input_capacity(),
            input_timeout_secs: None,
            support_archive: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the dev server binds; `0.0.0.0` exposes it to the network
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_site_dir")]
    pub site_dir: PathBuf,
}

fn default_host() -> String {
    String::from("127.0.0.1")
}

fn default_port() -> u16 {
    8000
}

fn default_site_dir() -> PathBuf {
    PathBuf::from("site")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            site_dir: default_site_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackConfig {
    /// Support-library directory to archive
    #[serde(default)]
    pub source: Option<PathBuf>,

    #[serde(default = "default_pack_output")]
    pub output: PathBuf,

    /// Top-level folder the archive entries are stored under
    #[serde(default = "default_folder_name")]
    pub folder_name: String,
}

fn default_pack_output() -> PathBuf {
    PathBuf::from("site/playground/jaclang.zip")
}

fn default_folder_name() -> String {
    String::from("jaclang")
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            source: None,
            output: default_pack_output(),
            folder_name: default_folder_name(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = if contents.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&contents)?
        };
        config.validate()?;

        // Store config file path for relative path resolution
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Like [`Config::from_file`], but a missing file yields the defaults
    /// (with paths still resolved next to where the file would be)
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Self::from_file(path);
        }
        debug!("No config file at {:?}, using defaults", path);
        Ok(Config {
            config_path: Some(path.to_path_buf()),
            ..Config::default()
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "server.host",
                reason: "must not be empty".into(),
            });
        }
        if self.runtime.input_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "runtime.input_capacity",
                reason: "must be at least 1 byte".into(),
            });
        }
        if self.pack.folder_name.trim().is_empty() || self.pack.folder_name.contains(['/', '\\']) {
            return Err(ConfigError::Invalid {
                field: "pack.folder_name",
                reason: format!("{:?} is not a single folder name", self.pack.folder_name),
            });
        }
        Ok(())
    }

    pub fn input_timeout(&self) -> Option<Duration> {
        self.runtime.input_timeout_secs.map(Duration::from_secs)
    }

    /// Get the support archive, resolved relative to config file
    pub fn support_archive(&self) -> Option<PathBuf> {
        self.runtime
            .support_archive
            .as_ref()
            .map(|p| self.resolve_path(p))
    }

    /// Get the built site directory, resolved relative to config file
    pub fn site_dir(&self) -> PathBuf {
        self.resolve_path(&self.server.site_dir)
    }

    pub fn pack_source(&self) -> Option<PathBuf> {
        self.pack.source.as_ref().map(|p| self.resolve_path(p))
    }

    pub fn pack_output(&self) -> PathBuf {
        self.resolve_path(&self.pack.output)
    }

    /// Resolve an arbitrary path relative to the config file location
    pub fn resolve_relative(&self, path: &Path) -> PathBuf {
        self.resolve_path(path)
    }

    /// Resolve a path relative to the config file location
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.config_path.as_deref().and_then(Path::parent) {
            Some(parent) => parent.join(path),
            None => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.runtime.input_capacity, 4096);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.pack.folder_name, "jaclang");
        assert_eq!(config.input_timeout(), None);
        assert_eq!(config.site_dir(), PathBuf::from("site"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jacblog.yml");
        std::fs::write(
            &path,
            "runtime:\n  input_timeout_secs: 30\n  support_archive: dist/jaclang.zip\nserver:\n  host: 0.0.0.0\n  port: 9001\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.runtime.input_capacity, 4096);
        assert_eq!(config.input_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(
            config.support_archive(),
            Some(dir.path().join("dist/jaclang.zip"))
        );
        assert_eq!(config.site_dir(), dir.path().join("site"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.yml")).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(
            config.pack_output(),
            dir.path().join("site/playground/jaclang.zip")
        );
    }

    #[test]
    fn test_empty_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jacblog.yml");
        std::fs::write(&path, "\n").unwrap();
        assert_eq!(Config::from_file(&path).unwrap().server.port, 8000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jacblog.yml");

        std::fs::write(&path, "runtime:\n  input_capacity: 0\n").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::Invalid { field: "runtime.input_capacity", .. })
        ));

        std::fs::write(&path, "server:\n  host: ' '\n").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::Invalid { field: "server.host", .. })
        ));

        std::fs::write(&path, "pack:\n  folder_name: a/b\n").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::Invalid { .. })
        ));

        std::fs::write(&path, "server: [not, a, map]\n").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_absolute_paths_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jacblog.yml");
        std::fs::write(&path, "pack:\n  source: /opt/jaclang\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.pack_source(), Some(PathBuf::from("/opt/jaclang")));
    }
}
