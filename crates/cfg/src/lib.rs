//! Reusable TOML-loading primitives shared by `keystoned` and `keystonectl`.

use std::fmt;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// A config field that can be live-reloaded: holds the effective value
/// alongside the raw form it was parsed from, so a reload can detect "no
/// change" without re-deriving derived state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reloadable<T> {
    current: T,
}

impl<T> Reloadable<T> {
    pub fn new(value: T) -> Self {
        Self { current: value }
    }

    pub fn value(&self) -> &T {
        &self.current
    }

    pub fn set(&mut self, value: T) {
        self.current = value;
    }
}

impl<T> From<T> for Reloadable<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Default> Default for Reloadable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// A filesystem path supplied in configuration, relative to the config
/// file's own directory unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigPath(Utf8PathBuf);

impl ConfigPath {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn resolve(&self, base_dir: &Utf8PathBuf) -> Utf8PathBuf {
        if self.0.is_absolute() {
            self.0.clone()
        } else {
            base_dir.join(&self.0)
        }
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::ops::Deref for ConfigPath {
    type Target = Utf8PathBuf;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Parse a TOML document of type `T`, wrapping errors with the file path
/// for a readable startup failure message.
pub fn load_toml<T: serde::de::DeserializeOwned>(
    path: &Utf8PathBuf,
) -> Result<T, ConfigLoadError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigLoadError::Io(path.clone(), e.to_string()))?;
    toml::from_str(&text).map_err(|e| ConfigLoadError::Parse(path.clone(), e.to_string()))
}

#[derive(Debug, Clone)]
pub enum ConfigLoadError {
    Io(Utf8PathBuf, String),
    Parse(Utf8PathBuf, String),
}

impl fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(path, msg) => write!(f, "reading {path}: {msg}"),
            Self::Parse(path, msg) => write!(f, "parsing {path}: {msg}"),
        }
    }
}

impl std::error::Error for ConfigLoadError {}
