//! # Configuration
//!
//! Dotted-path lookups over a directory of TOML files.
//!
//! The first segment of a path names the file (`db.handler` reads
//! `<dir>/db.toml`), the remaining segments walk nested tables. Parsed
//! files are cached for the lifetime of the [`Config`].

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Configuration reader
#[derive(Debug)]
pub struct Config {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<Value>>>,
}

impl Config {
    /// Read configuration files from `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Configuration directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Look up a dotted path
    ///
    /// # Errors
    ///
    /// - `Error::InvalidConfigFile` for an empty path or a missing file
    /// - `Error::ConfigParse` when the file is not valid TOML
    /// - `Error::InvalidConfig` when a key along the path does not exist
    pub fn get(&self, path: &str) -> Result<Value> {
        let mut segments = path.split('.');
        let file = segments.next().filter(|f| !f.is_empty()).ok_or_else(|| Error::InvalidConfigFile {
            file: path.to_string(),
        })?;

        let root = self.file(file)?;
        let mut current = root.as_ref();
        for key in segments {
            current = current.get(key).ok_or_else(|| Error::InvalidConfig {
                path: path.to_string(),
            })?;
        }
        Ok(current.clone())
    }

    /// Look up a dotted path and deserialize it
    ///
    /// # Errors
    ///
    /// Same as [`Config::get`], plus `Error::Json` on a type mismatch.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Ok(serde_json::from_value(self.get(path)?)?)
    }

    /// Whether a dotted path resolves
    #[must_use]
    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    fn file(&self, name: &str) -> Result<Arc<Value>> {
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(Arc::clone(cached));
        }

        let path = self.dir.join(format!("{name}.toml"));
        if !path.is_file() {
            return Err(Error::InvalidConfigFile {
                file: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(&path)?;
        let value: Value = toml::from_str(&content).map_err(|source| Error::ConfigParse {
            file: path.display().to_string(),
            source,
        })?;
        debug!(file = %path.display(), "Loaded config file");

        let value = Arc::new(value);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::clone(&value));
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::fs;

    fn config_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("app.toml"),
            "name = \"pitlane\"\n\n[server]\nport = 8000\nhost = \"127.0.0.1\"\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_nested_lookup() {
        let dir = config_dir();
        let config = Config::new(dir.path());

        assert_eq!(config.get("app.name").unwrap(), json!("pitlane"));
        assert_eq!(config.get("app.server.port").unwrap(), json!(8000));
        assert!(config.get("app").unwrap().is_object());
    }

    #[test]
    fn test_empty_path() {
        let dir = config_dir();
        let config = Config::new(dir.path());
        assert!(matches!(config.get(""), Err(Error::InvalidConfigFile { .. })));
    }

    #[test]
    fn test_missing_file() {
        let dir = config_dir();
        let config = Config::new(dir.path());
        let err = config.get("db.handler").unwrap_err();
        assert!(matches!(err, Error::InvalidConfigFile { ref file } if file.ends_with("db.toml")));
    }

    #[test]
    fn test_missing_key() {
        let dir = config_dir();
        let config = Config::new(dir.path());
        let err = config.get("app.server.tls").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { ref path } if path == "app.server.tls"));
    }

    #[test]
    fn test_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.toml"), "name = ").unwrap();
        let config = Config::new(dir.path());
        assert!(matches!(config.get("broken.name"), Err(Error::ConfigParse { .. })));
    }

    #[test]
    fn test_get_as() {
        #[derive(Deserialize)]
        struct Server {
            port: u16,
            host: String,
        }

        let dir = config_dir();
        let config = Config::new(dir.path());
        let server: Server = config.get_as("app.server").unwrap();
        assert_eq!(server.port, 8000);
        assert_eq!(server.host, "127.0.0.1");
    }

    #[test]
    fn test_files_are_cached() {
        let dir = config_dir();
        let config = Config::new(dir.path());
        assert!(config.has("app.name"));

        fs::remove_file(dir.path().join("app.toml")).unwrap();
        assert!(config.has("app.name"));
    }
}
