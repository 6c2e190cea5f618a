//! Forced recursive directory removal.

use super::{TaskError, TaskOutput};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Delete `dir` and everything below it.
///
/// A directory that does not exist counts as already clean. Read-only entries
/// are made writable and the removal is retried once.
pub fn clean_dir(dir: &Path) -> Result<TaskOutput, TaskError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            debug!(path = %dir.display(), "Removed");
            Ok(TaskOutput::new())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %dir.display(), "Nothing to clean");
            Ok(TaskOutput::new())
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            clear_readonly(dir);
            fs::remove_dir_all(dir).map_err(|source| TaskError::Clean { path: dir.to_path_buf(), source })?;
            debug!(path = %dir.display(), "Removed after clearing read-only flags");
            Ok(TaskOutput::new())
        }
        Err(source) => Err(TaskError::Clean { path: dir.to_path_buf(), source }),
    }
}

/// Best-effort: make every entry under `path` writable.
fn clear_readonly(path: &Path) {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return;
    };

    if metadata.file_type().is_symlink() {
        return;
    }

    let mut permissions = metadata.permissions();
    if permissions.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
        let _ = fs::set_permissions(path, permissions);
    }

    if metadata.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                clear_readonly(&entry.path());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clean_missing_dir_is_ok() {
        let temp = TempDir::new().unwrap();
        assert!(clean_dir(&temp.path().join("dist")).is_ok());
    }

    #[test]
    fn test_clean_nested_dir() {
        let temp = TempDir::new().unwrap();
        let dist = temp.path().join("dist");
        fs::create_dir_all(dist.join("img/a")).unwrap();
        fs::write(dist.join("index.html"), "<p>").unwrap();
        fs::write(dist.join("img/a/logo.svg"), "<svg/>").unwrap();

        clean_dir(&dist).unwrap();
        assert!(!dist.exists());
        assert!(temp.path().exists());
    }

    #[test]
    fn test_clean_readonly_file() {
        let temp = TempDir::new().unwrap();
        let cache = temp.path().join("css");
        fs::create_dir_all(&cache).unwrap();
        let file = cache.join("main.css");
        fs::write(&file, "body{}").unwrap();

        let mut permissions = fs::metadata(&file).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&file, permissions).unwrap();

        clean_dir(&cache).unwrap();
        assert!(!cache.exists());
    }

    #[test]
    fn test_clean_file_in_place_of_dir_fails() {
        let temp = TempDir::new().unwrap();
        let not_a_dir = temp.path().join("dist");
        fs::write(&not_a_dir, "oops").unwrap();

        let err = clean_dir(&not_a_dir).unwrap_err();
        assert!(matches!(err, TaskError::Clean { .. }));
    }
}
