//! Task identifiers and named evaluation subsets.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{Result, SelfPatchError};

/// Opaque identifier of one unit of benchmark work (e.g. `django__django-10973`).
///
/// The task entry handed to the driver and the keys of an evaluation report
/// share this type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        TaskId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        TaskId(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        TaskId(s)
    }
}

/// Resolves subset names (`small`, `medium`, `big`, ...) to `<dir>/<name>.json`.
///
/// Each file holds a JSON array of task identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetCatalog {
    dir: PathBuf,
}

/// True when `name` can be joined onto a directory without leaving it.
pub fn is_path_component(name: &str) -> bool {
    !(name.is_empty() || name.contains('/') || name.contains('\\') || name.contains(".."))
}

impl SubsetCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `name`.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        if !is_path_component(name) {
            return Err(SelfPatchError::InvalidConfig(format!(
                "invalid subset name: {name:?}"
            )));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }

    /// Load every task id listed for `name`, in file order.
    pub fn load(&self, name: &str) -> Result<Vec<TaskId>> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(SelfPatchError::SubsetNotFound(format!(
                "{name} (looked for {})",
                path.display()
            )));
        }

        let raw = std::fs::read(&path)?;
        let ids: Vec<TaskId> = serde_json::from_slice(&raw)?;
        if ids.is_empty() {
            return Err(SelfPatchError::InvalidConfig(format!(
                "subset {name} is empty"
            )));
        }

        let mut seen = HashSet::new();
        for id in &ids {
            if !seen.insert(id) {
                return Err(SelfPatchError::InvalidConfig(format!(
                    "subset {name} lists {id} more than once"
                )));
            }
        }

        Ok(ids)
    }

    /// First `num_instances` ids of `name`. Deterministic for a fixed file.
    pub fn select(&self, name: &str, num_instances: usize) -> Result<Vec<TaskId>> {
        if num_instances == 0 {
            return Err(SelfPatchError::InvalidConfig(
                "num_instances must be at least 1".to_string(),
            ));
        }
        let mut ids = self.load(name)?;
        ids.truncate(num_instances);
        Ok(ids)
    }
}
