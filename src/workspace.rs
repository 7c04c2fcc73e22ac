//! Workspace output
//!
//! A compiled kernel `top` lands in `<root>/top.cpp` next to its deployment
//! configuration `<root>/top.json`. Both files are staged as temporary
//! siblings before either is renamed into place, so a failed write leaves
//! neither file behind.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{CompileError, CompileResult};

/// Directory receiving generated kernels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

/// Paths of one written kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenProject {
    pub source: PathBuf,
    pub config: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Project directory reported for kernel `top`
    pub fn project_path(&self, top: &str) -> PathBuf {
        self.root.join(top)
    }

    pub fn source_path(&self, top: &str) -> PathBuf {
        self.root.join(format!("{}.cpp", top))
    }

    pub fn config_path(&self, top: &str) -> PathBuf {
        self.root.join(format!("{}.json", top))
    }

    /// Write the generated source and its deployment configuration
    pub fn write_project(&self, top: &str, hls_c: &str, config_json: &str) -> CompileResult<WrittenProject> {
        fs::create_dir_all(&self.root).map_err(|e| CompileError::io(&self.root, e))?;

        let source = self.source_path(top);
        let config = self.config_path(top);
        let staged_source = stage(&source, hls_c)?;
        let staged_config = stage(&config, config_json).map_err(|e| {
            let _ = fs::remove_file(&staged_source);
            e
        })?;

        commit(&staged_source, &source).map_err(|e| {
            let _ = fs::remove_file(&staged_config);
            e
        })?;
        commit(&staged_config, &config).map_err(|e| {
            let _ = fs::remove_file(&source);
            e
        })?;

        info!(source = %source.display(), config = %config.display(), "wrote kernel project");
        Ok(WrittenProject { source, config })
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    PathBuf::from(staging)
}

/// Write `contents` next to `path`, returning the staged file
fn stage(path: &Path, contents: &str) -> CompileResult<PathBuf> {
    let staging = staging_path(path);
    fs::write(&staging, contents).map_err(|e| CompileError::io(&staging, e))?;
    Ok(staging)
}

fn commit(staging: &Path, path: &Path) -> CompileResult<()> {
    fs::rename(staging, path).map_err(|e| {
        let _ = fs::remove_file(staging);
        CompileError::io(path, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mktemp::Temp;

    #[test]
    fn test_write_project_creates_root() {
        let temp = Temp::new_dir().unwrap();
        let workspace = Workspace::new(temp.as_path().join("nested").join("ws"));

        let written = workspace.write_project("vadd", "void vadd() {}\n", "{}").unwrap();
        assert_eq!(fs::read_to_string(&written.source).unwrap(), "void vadd() {}\n");
        assert_eq!(fs::read_to_string(&written.config).unwrap(), "{}");
        assert_eq!(written.source, workspace.root().join("vadd.cpp"));
        assert_eq!(workspace.project_path("vadd"), workspace.root().join("vadd"));

        let leftovers: Vec<_> = fs::read_dir(workspace.root())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.path().extension().map_or(false, |ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_rewrite_replaces_contents() {
        let temp = Temp::new_dir().unwrap();
        let workspace = Workspace::new(temp.as_path());
        workspace.write_project("k", "first", "{}").unwrap();
        workspace.write_project("k", "second", "{}").unwrap();
        assert_eq!(fs::read_to_string(workspace.source_path("k")).unwrap(), "second");
    }

    #[test]
    fn test_failed_config_write_leaves_no_source() {
        let temp = Temp::new_dir().unwrap();
        let workspace = Workspace::new(temp.as_path());
        // A directory in the way of the staged config makes its write fail
        fs::create_dir_all(staging_path(&workspace.config_path("k"))).unwrap();

        let err = workspace.write_project("k", "void k() {}\n", "{}").unwrap_err();
        assert!(matches!(err, CompileError::Io { .. }));
        assert!(!workspace.source_path("k").exists());
        assert!(!staging_path(&workspace.source_path("k")).exists());
        assert!(!workspace.config_path("k").exists());
    }
}
