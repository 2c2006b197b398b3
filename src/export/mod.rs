//! Document export and import
//!
//! Exports produce an [`ExportArtifact`] that is handed to a
//! [`DownloadSink`]; natively the sink writes it into the export directory.

pub mod raster;
pub mod snapshot;

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::document::DocumentError;
use crate::shapes::ShapeError;

/// File name of the raster export
pub const PNG_FILE_NAME: &str = "infinite-canvas-export.png";

/// File name of the snapshot export
pub const SNAPSHOT_FILE_NAME: &str = "infinite-canvas-backup.json";

/// Errors raised by the export pipeline
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no SVG was produced for the current page")]
    NoSvg,
    #[error("failed to build SVG: {0}")]
    Svg(#[from] ShapeError),
    #[error("SVG root has no width/height")]
    MissingDimensions,
    #[error("rendering context unavailable for {width}x{height}")]
    SurfaceUnavailable { width: u32, height: u32 },
    #[error("failed to parse SVG: {0}")]
    Parse(#[from] usvg::Error),
    #[error("failed to encode PNG: {0}")]
    Encode(String),
    #[error("conversion timed out")]
    Timeout,
    #[error("conversion task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A file ready to be handed to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// Platform download mechanism
pub trait DownloadSink: Send + Sync {
    /// Deliver an artifact, returning where it ended up
    fn deliver(&self, artifact: &ExportArtifact) -> Result<PathBuf, ExportError>;
}

/// Writes artifacts into a directory, replacing files of the same name
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&self, artifact: &ExportArtifact) -> Result<PathBuf, ExportError> {
        let path = self.dir.join(&artifact.file_name);
        let write_err = |source| ExportError::Write {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(write_err)?;
        fs::write(&path, &artifact.bytes).map_err(write_err)?;

        tracing::info!("Saved {} ({} bytes)", path.display(), artifact.bytes.len());
        Ok(path)
    }
}
