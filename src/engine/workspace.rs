//! Per-call scratch directories
//!
//! A `Workspace` is created under the configured root with a random,
//! collision-free name and is removed when dropped, whatever path the call
//! took to get there.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use super::codec::{INPUT_FILE, OUTPUT_FILE};

const WORKSPACE_PREFIX: &str = "exec-";

/// Owner of one call's scratch directory
pub struct Workspace {
    dir: Option<TempDir>,
    handle: WorkspaceDir,
}

impl Workspace {
    /// Allocate a fresh directory under `root`, creating `root` if needed
    pub fn create(root: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(root)?;

        let path = dir.path().to_path_buf();
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("Created workspace {}", path.display());

        Ok(Self {
            dir: Some(dir),
            handle: WorkspaceDir { path, id },
        })
    }

    /// Cheap view of the directory that can move into a task
    pub fn dir(&self) -> WorkspaceDir {
        self.handle.clone()
    }

    pub fn path(&self) -> &Path {
        &self.handle.path
    }

    pub fn id(&self) -> &str {
        &self.handle.id
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!("Removed workspace {}", path.display()),
                Err(e) => warn!("Failed to remove workspace {}: {}", path.display(), e),
            }
        }
    }
}

/// Paths inside a workspace; does not own the directory
#[derive(Debug, Clone)]
pub struct WorkspaceDir {
    path: PathBuf,
    id: String,
}

impl WorkspaceDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unique directory name, also used to name containers
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    pub fn input_path(&self) -> PathBuf {
        self.file(INPUT_FILE)
    }

    pub fn output_path(&self) -> PathBuf {
        self.file(OUTPUT_FILE)
    }

    /// Let the non-root container user write its output file
    #[cfg(unix)]
    pub async fn open_to_container_user(&self) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o777)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).unwrap();
        let path = ws.path().to_path_buf();
        std::fs::write(ws.dir().input_path(), b"{}").unwrap();
        assert!(path.is_dir());
        assert!(ws.id().starts_with(WORKSPACE_PREFIX));

        drop(ws);
        assert!(!path.exists());
    }

    #[test]
    fn test_workspaces_are_unique() {
        let root = tempfile::tempdir().unwrap();
        let a = Workspace::create(root.path()).unwrap();
        let b = Workspace::create(root.path()).unwrap();
        assert_ne!(a.path(), b.path());
        assert_eq!(a.path().parent(), Some(root.path()));
    }

    #[test]
    fn test_creates_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a/b");
        let ws = Workspace::create(&nested).unwrap();
        assert!(ws.path().starts_with(&nested));
    }

    #[test]
    fn test_root_that_is_a_file_fails() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();
        assert!(Workspace::create(&file).is_err());
    }

    #[tokio::test]
    async fn test_open_to_container_user() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).unwrap();
        ws.dir().open_to_container_user().await.unwrap();
        let mode = std::fs::metadata(ws.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o777);
    }
}
