use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Filesystem operations the document locator and mutator rely on.
pub trait DocumentStorage: Send + Sync + 'static {
    fn is_dir(&self, path: &Path) -> bool;

    fn is_file(&self, path: &Path) -> bool;

    /// Names of the regular files directly inside `dir`, sorted.
    fn list_files(&self, dir: &Path) -> Result<Vec<String>>;

    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    fn create_dir_all(&self, dir: &Path) -> Result<()>;

    fn remove_dir_all(&self, dir: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDocumentStorage;

impl LocalDocumentStorage {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentStorage for LocalDocumentStorage {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<String>> {
        let entries = fs::read_dir(dir)
            .with_context(|| format!("failed to list directory {}", dir.display()))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry
                .with_context(|| format!("failed to read entry in {}", dir.display()))?;
            let file_type = entry
                .file_type()
                .with_context(|| format!("failed to stat {}", entry.path().display()))?;
            if !file_type.is_file() {
                continue;
            }
            // names that are not valid UTF-8 can never pass the filename checks
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
    }

    fn create_dir_all(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))
    }

    fn remove_dir_all(&self, dir: &Path) -> Result<()> {
        fs::remove_dir_all(dir)
            .with_context(|| format!("failed to remove directory {}", dir.display()))
    }
}

/// Resolves `path` against the current working directory when it is relative.
pub fn absolute_dir(path: impl Into<PathBuf>) -> Result<PathBuf> {
    let path = path.into();
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    Ok(cwd.join(path))
}
