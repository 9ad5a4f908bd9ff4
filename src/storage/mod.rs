//! Storage Layer
//!
//! Application directories and the disk abstraction OCR artifacts are
//! written to.

use anyhow::Result;
use std::path::{Component, Path, PathBuf};

use crate::error::OcrError;

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "archiveycloud", "ArchiveyOcr")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

    let data_dir = proj_dirs.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;

    Ok(data_dir)
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "archiveycloud", "ArchiveyOcr")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// A named storage disk addressed by relative paths
pub trait Disk: Send + Sync {
    /// Write `contents` to `path`, replacing any existing file
    fn put(&self, path: &str, contents: &[u8]) -> Result<(), OcrError>;

    /// Check whether `path` exists on the disk
    fn exists(&self, path: &str) -> bool;
}

/// Disk backed by a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalDisk {
    root: PathBuf,
}

impl LocalDisk {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, OcrError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(OcrError::Validation(format!(
                "Storage path must stay inside the disk: {}",
                path
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl Disk for LocalDisk {
    fn put(&self, path: &str, contents: &[u8]) -> Result<(), OcrError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full, contents)?;
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.exists()).unwrap_or(false)
    }
}

/// Relative locations of the artifacts written for one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub processed_image: String,
    pub text: String,
    pub confidence: String,
}

impl ArtifactPaths {
    /// Derive artifact paths under `prefix` from the source file name
    pub fn for_source(prefix: &str, source: &Path) -> Self {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "document".to_string());

        let prefix = prefix.trim_matches('/');
        let join = |name: String| {
            if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            }
        };

        Self {
            processed_image: join(format!("{}_processed.png", stem)),
            text: join(format!("{}.txt", stem)),
            confidence: join(format!("{}_confidence.json", stem)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_local_disk_put_creates_parents() {
        let dir = tempdir().unwrap();
        let disk = LocalDisk::new(dir.path());

        disk.put("ocr/nested/file.txt", b"hola").unwrap();

        assert!(disk.exists("ocr/nested/file.txt"));
        let written = std::fs::read(dir.path().join("ocr/nested/file.txt")).unwrap();
        assert_eq!(written, b"hola");
    }

    #[test]
    fn test_local_disk_rejects_escaping_paths() {
        let dir = tempdir().unwrap();
        let disk = LocalDisk::new(dir.path());

        assert!(disk.put("../outside.txt", b"x").is_err());
        assert!(disk.put("/etc/passwd", b"x").is_err());
        assert!(!disk.exists("../outside.txt"));
    }

    #[test]
    fn test_local_disk_missing_file() {
        let dir = tempdir().unwrap();
        let disk = LocalDisk::new(dir.path());
        assert!(!disk.exists("nothing.txt"));
    }

    #[test]
    fn test_artifact_paths_from_filename() {
        let paths = ArtifactPaths::for_source("ocr/", Path::new("/scans/expediente-12.tiff"));
        assert_eq!(paths.processed_image, "ocr/expediente-12_processed.png");
        assert_eq!(paths.text, "ocr/expediente-12.txt");
        assert_eq!(paths.confidence, "ocr/expediente-12_confidence.json");
    }

    #[test]
    fn test_artifact_paths_empty_prefix() {
        let paths = ArtifactPaths::for_source("", Path::new("scan.png"));
        assert_eq!(paths.text, "scan.txt");
    }
}
