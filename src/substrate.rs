//! Metadata substrate seam.
//!
//! The substrate is the local store parsed metadata is materialized into.
//! Sessions drive it through a narrow protocol: create empty (in-memory
//! by default, a real write-enabled file under debug-copy), build from a
//! manifest, then either persist-and-close (debug-copy) or abort. The
//! storage format itself is out of scope; the built-in stores exist so
//! the lifecycle is exercisable end to end.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::manifest::ManifestDocument;

/// Substrate failure. `VariableTooLarge` is the one condition a session
/// tolerates: the build stops early but the session stays usable.
#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error("variable exceeds the substrate size limit: {0}")]
    VariableTooLarge(String),

    #[error("substrate build failed: {0}")]
    Build(String),

    #[error("substrate IO failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How an empty substrate is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubstrateMode {
    /// Default: diskless store, nothing touches the filesystem.
    InMemory,
    /// Debug-copy: a real, write-enabled file that survives close.
    FileBacked,
}

/// One local metadata store, owned exclusively by a session.
pub trait SubstrateStore {
    /// Materializes parsed metadata into the store.
    fn build(&mut self, manifest: &ManifestDocument) -> Result<(), SubstrateError>;

    /// Persists and closes; only meaningful for file-backed stores.
    fn persist(&mut self) -> Result<(), SubstrateError>;

    /// Discards without finalizing.
    fn abort(&mut self) -> Result<(), SubstrateError>;

    /// Backing file path, for file-backed stores.
    fn path(&self) -> Option<&Path>;

    /// True when a real file exists behind this store.
    fn file_backed(&self) -> bool;
}

/// Creates empty substrates. A seam so tests can substitute tracking or
/// failing stores.
pub trait SubstrateFactory {
    fn create(
        &self,
        name: &str,
        mode: SubstrateMode,
        no_fill: bool,
    ) -> Result<Box<dyn SubstrateStore>, SubstrateError>;
}

/// Default factory backing debug-copy substrates with files under
/// `temp_dir`.
#[derive(Clone, Debug)]
pub struct DefaultSubstrateFactory {
    temp_dir: PathBuf,
}

impl DefaultSubstrateFactory {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
        }
    }
}

impl SubstrateFactory for DefaultSubstrateFactory {
    fn create(
        &self,
        name: &str,
        mode: SubstrateMode,
        no_fill: bool,
    ) -> Result<Box<dyn SubstrateStore>, SubstrateError> {
        match mode {
            SubstrateMode::InMemory => Ok(Box::new(MemorySubstrate::new(no_fill))),
            SubstrateMode::FileBacked => {
                let path = self.temp_dir.join(name);
                // Probe writability up front; failing at close would lose
                // the session's data silently.
                std::fs::write(&path, b"").map_err(|source| SubstrateError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(Box::new(FileSubstrate::new(path, no_fill)))
            }
        }
    }
}

/// Diskless store: keeps the manifest text in memory only.
#[derive(Debug, Default)]
pub struct MemorySubstrate {
    contents: Option<String>,
    no_fill: bool,
}

impl MemorySubstrate {
    pub fn new(no_fill: bool) -> Self {
        Self {
            contents: None,
            no_fill,
        }
    }

    /// Materialized contents, for inspection.
    pub fn contents(&self) -> Option<&str> {
        self.contents.as_deref()
    }

    /// No-autofill policy requested at creation.
    pub fn no_fill(&self) -> bool {
        self.no_fill
    }
}

impl SubstrateStore for MemorySubstrate {
    fn build(&mut self, manifest: &ManifestDocument) -> Result<(), SubstrateError> {
        self.contents = Some(manifest.text().to_string());
        Ok(())
    }

    fn persist(&mut self) -> Result<(), SubstrateError> {
        // Nothing on disk to persist to; treated as abort.
        self.abort()
    }

    fn abort(&mut self) -> Result<(), SubstrateError> {
        self.contents = None;
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        None
    }

    fn file_backed(&self) -> bool {
        false
    }
}

/// File-backed store used under debug-copy mode.
#[derive(Debug)]
pub struct FileSubstrate {
    path: PathBuf,
    contents: Option<String>,
    #[allow(dead_code)]
    no_fill: bool,
}

impl FileSubstrate {
    pub fn new(path: PathBuf, no_fill: bool) -> Self {
        Self {
            path,
            contents: None,
            no_fill,
        }
    }
}

impl SubstrateStore for FileSubstrate {
    fn build(&mut self, manifest: &ManifestDocument) -> Result<(), SubstrateError> {
        self.contents = Some(manifest.text().to_string());
        Ok(())
    }

    fn persist(&mut self) -> Result<(), SubstrateError> {
        let contents = self.contents.take().unwrap_or_default();
        std::fs::write(&self.path, contents).map_err(|source| SubstrateError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn abort(&mut self) -> Result<(), SubstrateError> {
        self.contents = None;
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn file_backed(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestDocument;

    fn doc() -> ManifestDocument {
        ManifestDocument::new("<Dataset/>".to_string(), 10)
    }

    #[test]
    fn memory_substrate_builds_and_aborts() {
        let mut store = MemorySubstrate::new(true);
        store.build(&doc()).unwrap();
        assert_eq!(store.contents(), Some("<Dataset/>"));
        store.abort().unwrap();
        assert!(store.contents().is_none());
        assert!(!store.file_backed());
    }

    #[test]
    fn file_substrate_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let factory = DefaultSubstrateFactory::new(dir.path());
        let mut store = factory
            .create("sub_test", SubstrateMode::FileBacked, true)
            .unwrap();

        store.build(&doc()).unwrap();
        store.persist().unwrap();

        let path = dir.path().join("sub_test");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<Dataset/>");
    }

    #[test]
    fn file_backed_creation_fails_on_unwritable_dir() {
        let factory = DefaultSubstrateFactory::new("/definitely/not/a/real/dir");
        assert!(factory
            .create("sub_test", SubstrateMode::FileBacked, false)
            .is_err());
    }
}
