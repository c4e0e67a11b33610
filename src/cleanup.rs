use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

/// Tracks scratch paths of a single operation and removes them when dropped,
/// unless the operation marked them as kept.
pub struct CleanupContext<'a, R: Runtime + ?Sized> {
    runtime: &'a R,
    paths: Vec<PathBuf>,
}

impl<'a, R: Runtime + ?Sized> CleanupContext<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self {
            runtime,
            paths: Vec::new(),
        }
    }

    /// Add a path to be cleaned up
    pub fn add(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    /// Remove a path from the cleanup list (e.g., when it was moved into place)
    pub fn remove(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    /// Clean up all registered paths now
    pub fn cleanup(&mut self) {
        for path in self.paths.drain(..) {
            if !self.runtime.exists(&path) {
                continue;
            }
            debug!("Cleaning up: {:?}", path);
            let result = if self.runtime.is_dir(&path) {
                self.runtime.remove_dir_all(&path)
            } else {
                self.runtime.remove_file(&path)
            };
            if let Err(e) = result {
                warn!("Failed to clean up {:?}: {}", path, e);
            }
        }
    }

    #[cfg(test)]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl<R: Runtime + ?Sized> Drop for CleanupContext<'_, R> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use mockall::predicate::eq;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_cleanup_context_add_remove() {
        let runtime = MockRuntime::new();
        let mut ctx = CleanupContext::new(&runtime);
        let path = PathBuf::from("/tmp/test");

        ctx.add(path.clone());
        assert_eq!(ctx.paths().len(), 1);

        ctx.remove(&path);
        assert_eq!(ctx.paths().len(), 0);
        // Nothing registered, so drop touches no runtime method
    }

    #[test]
    fn test_cleanup_on_drop_removes_files_and_dirs() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.tar.gz");
        let sub_dir = dir.path().join("staging");
        fs::write(&file_path, "test").unwrap();
        fs::create_dir(&sub_dir).unwrap();
        fs::write(sub_dir.join("file.txt"), "test").unwrap();

        {
            let mut ctx = CleanupContext::new(&RealRuntime);
            ctx.add(file_path.clone());
            ctx.add(sub_dir.clone());
        }

        assert!(!file_path.exists());
        assert!(!sub_dir.exists());
    }

    #[test]
    fn test_removed_path_survives_drop() {
        let dir = tempdir().unwrap();
        let kept = dir.path().join("kept");
        fs::create_dir(&kept).unwrap();

        {
            let mut ctx = CleanupContext::new(&RealRuntime);
            ctx.add(kept.clone());
            ctx.remove(&kept);
        }

        assert!(kept.exists());
    }

    #[test]
    fn test_cleanup_skips_missing_paths() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/tmp/missing")))
            .returning(|_| false);

        let mut ctx = CleanupContext::new(&runtime);
        ctx.add(PathBuf::from("/tmp/missing"));
        ctx.cleanup();
        assert!(ctx.paths().is_empty());
    }

    #[test]
    fn test_cleanup_failure_is_not_fatal() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| true);
        runtime.expect_is_dir().returning(|_| true);
        runtime
            .expect_remove_dir_all()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("permission denied")));

        let mut ctx = CleanupContext::new(&runtime);
        ctx.add(PathBuf::from("/srv/.app.staging-1-2"));
        ctx.cleanup();
        assert!(ctx.paths().is_empty());
    }
}
