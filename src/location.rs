use crate::{Error, Result, Storage};

use serde::{Deserialize, Serialize};

use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the graph artifact beneath an output root.
pub const GRAPH_DIR: &str = "~g";

/// A `/`-separated path naming a persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        let mut path = path.into();
        while path.len() > 1 && path.ends_with('/') {
            path.pop();
        }
        Location(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn join(&self, child: &str) -> Location {
        let child = child.trim_start_matches('/');
        if self.0.ends_with('/') {
            Location::new(format!("{}{}", self.0, child))
        } else {
            Location::new(format!("{}/{}", self.0, child))
        }
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Location {
    fn from(path: &str) -> Self {
        Location::new(path)
    }
}

impl From<String> for Location {
    fn from(path: String) -> Self {
        Location::new(path)
    }
}

impl From<&Path> for Location {
    fn from(path: &Path) -> Self {
        Location::new(path.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for Location {
    fn from(path: PathBuf) -> Self {
        Location::from(path.as_path())
    }
}

impl AsRef<str> for Location {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn graph_location(root: &Location) -> Location {
    root.join(GRAPH_DIR)
}

pub fn memory_location(root: &Location, key: &str) -> Location {
    root.join(key)
}

/// Resolves where a graph should be read from: the graph beneath `root` if
/// one was written there, otherwise `root` itself.
pub fn search_location(root: &Location, storage: &dyn Storage) -> Result<Location> {
    let graph = graph_location(root);
    if storage.exists(&graph) {
        Ok(graph)
    } else if storage.exists(root) {
        Ok(root.clone())
    } else {
        Err(Error::NotFound {
            location: root.to_string(),
        })
    }
}
