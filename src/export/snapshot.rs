//! JSON backup of the whole document

use super::{ExportArtifact, ExportError, SNAPSHOT_FILE_NAME};
use crate::core::document::{Document, DocumentError, Snapshot};

/// Serialize a snapshot as pretty-printed JSON
pub fn export_snapshot(snapshot: &Snapshot) -> Result<ExportArtifact, ExportError> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    Ok(ExportArtifact {
        file_name: SNAPSHOT_FILE_NAME.to_string(),
        mime: "application/json",
        bytes,
    })
}

/// Parse a backup file, checking its structure and every shape's props
pub fn import_snapshot(data: &[u8]) -> Result<Snapshot, DocumentError> {
    let snapshot = Document::from_json(data)?;
    snapshot.validate_shapes()?;
    Ok(snapshot)
}
