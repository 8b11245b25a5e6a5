//! Re-openable upload sources
//!
//! A failover upload may read the same file several times, once per account
//! attempt. `FileSource` therefore never holds an open handle: in-memory
//! sources clone cheaply (`Bytes`), path sources are reopened per attempt.

use std::path::{Path, PathBuf};

use bytes::Bytes;

/// File to upload, readable any number of times.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// Contents held in memory
    Memory { filename: String, data: Bytes },
    /// File on local disk, reopened for every attempt
    Disk { filename: String, path: PathBuf },
}

impl FileSource {
    pub fn from_bytes(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        FileSource::Memory {
            filename: filename.into(),
            data: data.into(),
        }
    }

    /// Disk source named after the path's final component.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file.bin".to_string());
        FileSource::Disk { filename, path }
    }

    /// Disk source uploaded under an explicit filename.
    pub fn from_path_named(path: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        FileSource::Disk {
            filename: filename.into(),
            path: path.into(),
        }
    }

    /// Filename reported to the storage service.
    pub fn filename(&self) -> &str {
        match self {
            FileSource::Memory { filename, .. } | FileSource::Disk { filename, .. } => filename,
        }
    }

    /// Local path for disk sources.
    pub fn path(&self) -> Option<&Path> {
        match self {
            FileSource::Memory { .. } => None,
            FileSource::Disk { path, .. } => Some(path),
        }
    }

    /// Size in bytes. Disk sources stat the file on every call.
    pub async fn len(&self) -> std::io::Result<u64> {
        match self {
            FileSource::Memory { data, .. } => Ok(data.len() as u64),
            FileSource::Disk { path, .. } => Ok(tokio::fs::metadata(path).await?.len()),
        }
    }
}
