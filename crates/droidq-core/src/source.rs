//! Sources of UI hierarchy dumps.
//!
//! [`DumpSource`] abstracts over where dump text comes from, so queries can
//! run against a live device or a saved file alike. The provided
//! [`DumpSource::hierarchy`] parses the dump; implementors only supply
//! [`DumpSource::dump`]. Queries then run against the returned snapshot,
//! which owns the tree that matched elements borrow from.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::adb::{AdbDevice, AdbError};
use crate::hierarchy::{Hierarchy, HierarchyError};

/// Errors from obtaining or parsing a dump.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The device could not produce a dump.
    #[error(transparent)]
    Adb(#[from] AdbError),

    /// A dump file could not be read.
    #[error("Failed to read dump {path}: {source}")]
    Read {
        /// The file that failed to read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The dump text could not be parsed.
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
}

/// Something that can produce `uiautomator` dump text.
#[async_trait]
pub trait DumpSource: Send + Sync {
    /// Returns the raw dump text.
    async fn dump(&self) -> Result<String, SourceError>;

    /// Fetches and parses a fresh snapshot.
    async fn hierarchy(&self) -> Result<Hierarchy, SourceError> {
        let text = self.dump().await?;
        Ok(Hierarchy::parse(&text)?)
    }
}

#[async_trait]
impl DumpSource for AdbDevice {
    async fn dump(&self) -> Result<String, SourceError> {
        Ok(self.dump_xml().await?)
    }
}

/// A dump previously saved to disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Creates a source that reads `path` on every dump.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DumpSource for FileSource {
    async fn dump(&self) -> Result<String, SourceError> {
        debug!(path = %self.path.display(), "Reading dump file");
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Read {
                path: self.path.clone(),
                source,
            })
    }
}

/// A fixed, in-memory dump.
#[derive(Debug, Clone)]
pub struct StaticSource(pub String);

#[async_trait]
impl DumpSource for StaticSource {
    async fn dump(&self) -> Result<String, SourceError> {
        Ok(self.0.clone())
    }
}
