//! Content arriving from outside the canvas (file pickers, drops)

use eframe::egui::{self, Pos2};
use thiserror::Error;

use super::CanvasEditor;
use crate::core::document::ShapeId;
use crate::shapes::image::{self, ImageData};
use crate::shapes::ShapeError;

/// Errors raised while turning external content into shapes
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is not a supported image")]
    NotAnImage(String),
    #[error("could not read the dimensions of {0}")]
    UnreadableImage(String),
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// A file handed to the canvas, already read into memory
#[derive(Debug, Clone)]
pub struct ExternalFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Content to place on the canvas
#[derive(Debug, Clone)]
pub enum ExternalContent {
    /// Files dropped or picked, centered on `point` (page coordinates)
    Files { files: Vec<ExternalFile>, point: Pos2 },
}

impl CanvasEditor {
    /// Turn external content into shapes. Files that are not images are
    /// skipped with a warning.
    pub fn put_external_content(&mut self, content: ExternalContent) -> Vec<ShapeId> {
        match content {
            ExternalContent::Files { files, point } => files
                .into_iter()
                .filter_map(|file| {
                    let name = file.name.clone();
                    match self.put_image_file(file, point) {
                        Ok(id) => Some(id),
                        Err(e) => {
                            tracing::warn!("Skipping {}: {}", name, e);
                            None
                        }
                    }
                })
                .collect(),
        }
    }

    fn put_image_file(&mut self, file: ExternalFile, point: Pos2) -> Result<ShapeId, IngestError> {
        let data = ImageData::sniff(file.bytes).ok_or_else(|| IngestError::NotAnImage(file.name.clone()))?;
        let props = image::image_props(&data).ok_or_else(|| IngestError::UnreadableImage(file.name.clone()))?;
        let size = egui::vec2(
            props["w"].as_f64().unwrap_or_default() as f32,
            props["h"].as_f64().unwrap_or_default() as f32,
        );

        let id = self.create_shape_with_props(image::TYPE, point - size / 2.0, props)?;
        tracing::info!("Placed image {} as {}", file.name, id);
        Ok(id)
    }
}
