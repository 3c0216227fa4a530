//! Server configuration loaded from a TOML file.
//!
//! A missing file is created with the defaults so a fresh install can be
//! started once and then edited.

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use nemu_core::DecodeOptions;
use nemu_core::NemuError;
use nemu_core::Result;
use serde::Deserialize;
use serde::Serialize;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Complete server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener, target directory and token.
    pub server: ServerSection,

    /// Decoder policy for accepted uploads.
    pub upload: DecodeOptions,

    /// Log file and level.
    pub log: LogSection,
}

/// `[server]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address to bind.
    pub host: String,

    /// Port to bind; 0 picks a free one.
    pub port: u16,

    /// Directory uploads are written to and static files served from.
    pub dir: PathBuf,

    /// Lowercase hex SHA-512 digest of the shared secret.
    pub token: String,

    /// Request handler threads.
    pub workers: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8168,
            dir: PathBuf::from("public"),
            token: String::new(),
            workers: 4,
        }
    }
}

impl ServerSection {
    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `[log]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log file, appended to across restarts.
    pub file_path: PathBuf,

    /// Size in MiB above which the file is rotated at start-up.
    pub max_size_mb: u64,

    /// Rotated files kept as `<file>.1` .. `<file>.N`.
    pub max_backups: u32,

    /// Default filter directive, e.g. `info` or `nemu_core=debug,info`.
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            file_path: PathBuf::from("nemu.log"),
            max_size_mb: 5,
            max_backups: 3,
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Reads `path`, or writes the defaults there if it does not exist.
    ///
    /// # Errors
    ///
    /// `Config` for malformed TOML or invalid values, `Io` if the file
    /// cannot be read or the default file cannot be written.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text)
                .map_err(|e| NemuError::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let config = Self::default();
                config.write(path)?;
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parses and validates a TOML document. Missing keys take defaults.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| NemuError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as TOML, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| NemuError::Config(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.server.workers == 0 {
            return Err(NemuError::Config("server.workers must be at least 1".into()));
        }
        if self.server.dir.as_os_str().is_empty() {
            return Err(NemuError::Config("server.dir must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.bind_addr(), "127.0.0.1:8168");
        assert_eq!(config.server.dir, PathBuf::from("public"));
        assert_eq!(config.server.workers, 4);
        assert!(!config.upload.wipe_target);
        assert!(!config.upload.confine_symlinks);
        assert_eq!(config.log.max_size_mb, 5);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 9000
            token = "abc"

            [upload]
            wipe_target = true
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.token, "abc");
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.upload.wipe_target);
        assert!(!config.upload.confine_symlinks);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = Config::from_toml("[server\nport = ").unwrap_err();
        assert!(matches!(err, NemuError::Config(_)));

        let err = Config::from_toml("[server]\nport = \"eighty\"").unwrap_err();
        assert!(matches!(err, NemuError::Config(_)));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = Config::from_toml("[server]\nworkers = 0").unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let temp = TempDir::new().expect("failed to create temp dir");
        let path = temp.path().join("config/config.toml");

        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.is_file());

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_load_reports_path_on_error() {
        let temp = TempDir::new().expect("failed to create temp dir");
        let path = temp.path().join("broken.toml");
        fs::write(&path, "not = [valid").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }
}
