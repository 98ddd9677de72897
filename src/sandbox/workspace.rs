use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::ExecuteError;

/// Root directory under which per-execution directories are allocated.
///
/// The root is shared by all executions; every execution gets its own
/// freshly named subdirectory, so no cross-request locking is needed.
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Creates the workspace, ensuring the sandbox root exists.
    ///
    /// When no root is configured, a per-user cache directory is used.
    pub fn new(root_dir: Option<&str>) -> Result<Self, ExecuteError> {
        let root = match root_dir {
            Some(dir) => PathBuf::from(dir),
            None => default_root().map_err(|source| ExecuteError::Workspace { source })?,
        };

        fs::create_dir_all(&root).map_err(|source| ExecuteError::Workspace { source })?;
        log::info!("sandbox root initialized at {}", root.display());

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocates a fresh, uniquely named execution directory.
    pub fn allocate(&self) -> Result<ExecutionDir, ExecuteError> {
        let id = Uuid::new_v4();
        let path = self.root.join(id.to_string());

        fs::create_dir(&path).map_err(|source| ExecuteError::Workspace { source })?;
        log::debug!("execution {id}: created directory {}", path.display());

        Ok(ExecutionDir { id, path })
    }
}

fn default_root() -> io::Result<PathBuf> {
    use directories::ProjectDirs;

    let proj_dirs = ProjectDirs::from("", "", "coderunner").ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "unable to find user directory")
    })?;

    Ok(proj_dirs.cache_dir().join("executions"))
}

/// A single execution's disposable directory.
///
/// The directory is removed recursively when the value is dropped, so
/// cleanup runs exactly once on every exit path. Removal failure is logged
/// and swallowed; housekeeping must never mask the execution's own outcome.
pub struct ExecutionDir {
    id: Uuid,
    path: PathBuf,
}

impl ExecutionDir {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the snippet verbatim to the given file name inside the
    /// directory and returns the absolute source path. No normalization is
    /// applied to the snippet bytes.
    pub fn write_source(&self, file_name: &str, code: &str) -> Result<PathBuf, ExecuteError> {
        let source_path = self.path.join(file_name);

        fs::write(&source_path, code).map_err(|source| ExecuteError::WriteSource { source })?;
        log::debug!(
            "execution {}: wrote {} ({} bytes)",
            self.id,
            source_path.display(),
            code.len()
        );

        Ok(source_path)
    }
}

impl Drop for ExecutionDir {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => log::debug!("execution {}: removed directory", self.id),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::error!(
                "execution {}: failed to remove directory {}: {e}",
                self.id,
                self.path.display()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_workspace() -> (Workspace, tempfile::TempDir) {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(Some(root.path().to_str().unwrap())).unwrap();
        (workspace, root)
    }

    #[test]
    fn allocate_creates_unique_directories() {
        let (workspace, _root) = test_workspace();

        let a = workspace.allocate().unwrap();
        let b = workspace.allocate().unwrap();

        assert!(a.path().is_dir());
        assert!(b.path().is_dir());
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn drop_removes_the_directory() {
        let (workspace, _root) = test_workspace();

        let dir = workspace.allocate().unwrap();
        let path = dir.path().to_path_buf();
        assert!(path.is_dir());

        drop(dir);
        assert!(!path.exists());
    }

    #[test]
    fn write_source_is_verbatim() {
        let (workspace, _root) = test_workspace();
        let dir = workspace.allocate().unwrap();

        // No trailing newline is added and CRLF is preserved.
        let code = "line one\r\nline two";
        let path = dir.write_source("snippet.py", code).unwrap();

        assert_eq!(fs::read_to_string(path).unwrap(), code);
    }

    #[test]
    fn drop_tolerates_already_removed_directory() {
        let (workspace, _root) = test_workspace();

        let dir = workspace.allocate().unwrap();
        fs::remove_dir_all(dir.path()).unwrap();
        drop(dir); // must not panic
    }
}
