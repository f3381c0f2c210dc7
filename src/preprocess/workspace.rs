//! The application's private temp directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::error::{ChatloadError, Result};

/// Directory that slimmed files are created in and deleted from.
///
/// [`TempWorkspace::remove`] only deletes files that resolve to a location
/// strictly inside the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempWorkspace {
    root: PathBuf,
}

impl TempWorkspace {
    /// Creates (if needed) and canonicalizes `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns a fresh path `<root>/<stem>-<random><suffix>`.
    pub fn allocate(&self, stem: &str, suffix: &str) -> PathBuf {
        let tag: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        self.root.join(format!("{}-{tag}{suffix}", sanitize(stem)))
    }

    /// Whether `path` resolves to a file inside the workspace.
    pub fn contains(&self, path: &Path) -> bool {
        resolve(path).is_ok_and(|p| p != self.root && p.starts_with(&self.root))
    }

    /// Deletes `path`, refusing anything outside the workspace.
    ///
    /// A path that no longer exists is not an error.
    pub fn remove(&self, path: &Path) -> Result<()> {
        let resolved = match resolve(path) {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if resolved == self.root || !resolved.starts_with(&self.root) {
            return Err(ChatloadError::UnsafeTempPath {
                path: path.to_path_buf(),
                root: self.root.clone(),
            });
        }
        match fs::remove_file(&resolved) {
            Ok(()) => {
                tracing::debug!(path = %resolved.display(), "removed temp file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Canonicalizes the parent and re-attaches the file name, so the target
/// itself may be a dangling entry but `..` and symlinked dirs are resolved.
fn resolve(path: &Path) -> io::Result<PathBuf> {
    if let Ok(p) = path.canonicalize() {
        return Ok(p);
    }
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no file name"))?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    Ok(parent.canonicalize()?.join(name))
}

fn sanitize(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(64)
        .collect();
    if cleaned.is_empty() { "export".to_string() } else { cleaned }
}
