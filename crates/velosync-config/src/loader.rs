//! YAML task-file loading

use crate::SyncTask;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use velosync_types::{Error, Result};

/// A YAML task file holding one or more sync tasks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFile {
    /// The tasks, run sequentially in declaration order
    #[serde(default)]
    pub tasks: Vec<SyncTask>,
}

impl TaskFile {
    /// Load a task file from `path`.
    ///
    /// The tasks are returned as written; validation happens per task when
    /// the run starts, after CLI overrides have been merged.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read task file '{}': {e}", path.display()))
        })?;
        let file: Self = serde_yaml::from_str(&text).map_err(|e| {
            Error::config(format!("invalid task file '{}': {e}", path.display()))
        })?;
        if file.tasks.is_empty() {
            return Err(Error::config(format!(
                "task file '{}' contains no tasks",
                path.display()
            )));
        }
        debug!("loaded {} task(s) from {}", file.tasks.len(), path.display());
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_tasks_with_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "tasks:\n  - source: /data/in\n    target: /data/out\n    delete: true\n    filters:\n      - \"ex:*.tmp\"\n"
        )
        .unwrap();

        let loaded = TaskFile::load(file.path()).unwrap();
        assert_eq!(loaded.tasks.len(), 1);
        let task = &loaded.tasks[0];
        assert!(task.delete);
        assert!(!task.delete_excluded);
        assert_eq!(task.filters, vec!["ex:*.tmp".to_string()]);
    }

    #[test]
    fn rejects_unknown_fields() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "tasks:\n  - source: /a\n    target: /b\n    no_such_option: true\n"
        )
        .unwrap();
        assert!(TaskFile::load(file.path()).is_err());
    }

    #[test]
    fn rejects_empty_task_list() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "tasks: []\n").unwrap();
        assert!(TaskFile::load(file.path()).is_err());
    }
}
