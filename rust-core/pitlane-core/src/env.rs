//! # Environment
//!
//! Process environment access and `.env` file loading.

use crate::error::{Error, Result};
use std::fmt::Display;
use std::path::Path;
use tracing::debug;

/// Process environment helpers
pub struct Env;

impl Env {
    /// Read a variable
    #[must_use]
    pub fn get(var: &str) -> Option<String> {
        std::env::var(var).ok()
    }

    /// Set a variable
    pub fn set(var: &str, value: impl Display) {
        std::env::set_var(var, value.to_string());
    }

    /// Remove a variable
    pub fn unset(var: &str) {
        std::env::remove_var(var);
    }

    /// Apply a raw `NAME=value` assignment
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidEnvironmentVariable` when there is no `=` or
    /// the name is empty.
    pub fn set_raw(pair: &str) -> Result<()> {
        match pair.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Self::set(name.trim(), value);
                Ok(())
            }
            _ => Err(Error::InvalidEnvironmentVariable {
                pair: pair.to_string(),
            }),
        }
    }

    /// Load a `.env` file into the process environment
    ///
    /// When a name appears more than once the first assignment wins.
    /// Returns the number of assignments read.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read and
    /// `Error::InvalidEnvironmentVariable` for a malformed line.
    pub fn load_file(path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let pairs = dotenvy::from_path_iter(path)
            .map_err(env_error)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(env_error)?;

        for (name, value) in pairs.iter().rev() {
            Self::set(name, value);
        }

        debug!(file = %path.display(), count = pairs.len(), "Loaded environment file");
        Ok(pairs.len())
    }
}

fn env_error(error: dotenvy::Error) -> Error {
    match error {
        dotenvy::Error::Io(e) => Error::Io(e),
        dotenvy::Error::LineParse(line, _) => Error::InvalidEnvironmentVariable { pair: line },
        other => Error::InvalidEnvironmentVariable {
            pair: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_set_get_unset() {
        Env::set("PITLANE_TEST_SET", 42);
        assert_eq!(Env::get("PITLANE_TEST_SET").as_deref(), Some("42"));

        Env::unset("PITLANE_TEST_SET");
        assert_eq!(Env::get("PITLANE_TEST_SET"), None);
    }

    #[test]
    fn test_set_raw() {
        Env::set_raw("PITLANE_TEST_RAW=a=b").unwrap();
        assert_eq!(Env::get("PITLANE_TEST_RAW").as_deref(), Some("a=b"));
    }

    #[test]
    fn test_set_raw_without_equals() {
        let err = Env::set_raw("PITLANE_TEST_BROKEN").unwrap_err();
        assert!(matches!(err, Error::InvalidEnvironmentVariable { ref pair } if pair == "PITLANE_TEST_BROKEN"));
        assert!(Env::set_raw("=value").is_err());
    }

    #[test]
    fn test_load_file_first_assignment_wins() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(".env");
        fs::write(
            &file,
            "# comment\nPITLANE_TEST_HOST=first\n\nPITLANE_TEST_USER=root\nPITLANE_TEST_HOST=second\n",
        )
        .unwrap();

        assert_eq!(Env::load_file(&file).unwrap(), 3);
        assert_eq!(Env::get("PITLANE_TEST_HOST").as_deref(), Some("first"));
        assert_eq!(Env::get("PITLANE_TEST_USER").as_deref(), Some("root"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Env::load_file(dir.path().join("missing.env")),
            Err(Error::Io(_))
        ));
    }
}
