//! Canvas document model
//!
//! The document is the sole source of truth for shape content. It is owned
//! by the canvas engine, persisted as JSON under the namespace's document
//! key and exported verbatim as the backup snapshot.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::storage::StorageError;
use crate::shapes::{self, ShapeError};

/// Current document schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Id of the page every new document starts with
pub const DEFAULT_PAGE_ID: &str = "page:page";

/// Shape properties, validated against the registry schema of the shape type
pub type Props = serde_json::Map<String, serde_json::Value>;

/// A point-in-time copy of the whole document
pub type Snapshot = Document;

/// Errors raised while reading a document
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported document schema version {0}")]
    UnsupportedVersion(u32),
    #[error("document has no pages")]
    NoPages,
    #[error("current page `{0}` does not exist")]
    MissingCurrentPage(String),
    #[error("duplicate shape id `{0}`")]
    DuplicateShape(String),
    #[error("shape `{shape}` belongs to unknown page `{page}`")]
    OrphanShape { shape: String, page: String },
    #[error("shape `{id}` is invalid: {source}")]
    InvalidShape {
        id: String,
        #[source]
        source: ShapeError,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Opaque shape identifier assigned by the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(String);

impl ShapeId {
    pub fn new() -> Self {
        Self(format!("shape:{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ShapeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ShapeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for ShapeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Page identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A canvas page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub name: String,
}

/// A typed, positioned entity on a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: ShapeId,
    #[serde(rename = "type")]
    pub shape_type: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub rotation: f32,
    pub parent_id: PageId,
    pub props: Props,
}

impl Shape {
    /// Read a numeric prop
    pub fn number_prop(&self, name: &str) -> Option<f32> {
        self.props.get(name)?.as_f64().map(|n| n as f32)
    }

    /// Read a string prop
    pub fn str_prop(&self, name: &str) -> Option<&str> {
        self.props.get(name)?.as_str()
    }

    /// Width and height when the shape has `w`/`h` props
    pub fn size(&self) -> Option<(f32, f32)> {
        Some((self.number_prop("w")?, self.number_prop("h")?))
    }
}

/// Camera over the current page: page point at the viewport's top-left
/// corner plus zoom
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 1.0,
        }
    }
}

/// Document bookkeeping
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Creation time in Unix seconds
    pub created_at: u64,
    /// Last modification time in Unix seconds
    pub updated_at: u64,
}

/// The full canvas state for one persistence key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub schema_version: u32,
    pub pages: Vec<Page>,
    pub current_page_id: PageId,
    /// Shapes in paint order, back to front
    pub shapes: Vec<Shape>,
    #[serde(default)]
    pub camera: Camera,
    #[serde(default)]
    pub meta: DocumentMeta,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document with a single page
    pub fn new() -> Self {
        let now = unix_now();
        Self {
            schema_version: SCHEMA_VERSION,
            pages: vec![Page {
                id: PageId::from(DEFAULT_PAGE_ID),
                name: "Page 1".to_string(),
            }],
            current_page_id: PageId::from(DEFAULT_PAGE_ID),
            shapes: Vec::new(),
            camera: Camera::default(),
            meta: DocumentMeta {
                created_at: now,
                updated_at: now,
            },
        }
    }

    /// Parse and structurally check a serialized document
    pub fn from_json(data: &[u8]) -> Result<Self, DocumentError> {
        let doc: Self = serde_json::from_slice(data)?;
        doc.check()?;
        Ok(doc)
    }

    /// Serialize as pretty-printed JSON
    pub fn to_json_pretty(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Check the invariants serde cannot express
    pub fn check(&self) -> Result<(), DocumentError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(DocumentError::UnsupportedVersion(self.schema_version));
        }
        if self.pages.is_empty() {
            return Err(DocumentError::NoPages);
        }

        let page_ids: HashSet<&PageId> = self.pages.iter().map(|p| &p.id).collect();
        if !page_ids.contains(&self.current_page_id) {
            return Err(DocumentError::MissingCurrentPage(
                self.current_page_id.as_str().to_string(),
            ));
        }

        let mut shape_ids = HashSet::new();
        for shape in &self.shapes {
            if !shape_ids.insert(&shape.id) {
                return Err(DocumentError::DuplicateShape(shape.id.to_string()));
            }
            if !page_ids.contains(&shape.parent_id) {
                return Err(DocumentError::OrphanShape {
                    shape: shape.id.to_string(),
                    page: shape.parent_id.as_str().to_string(),
                });
            }
        }

        Ok(())
    }

    /// Check every shape's props against the registry schema of its type
    pub fn validate_shapes(&self) -> Result<(), DocumentError> {
        for shape in &self.shapes {
            shapes::util_for(&shape.shape_type)
                .and_then(|util| util.validate(&shape.props))
                .map_err(|source| DocumentError::InvalidShape {
                    id: shape.id.to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    pub fn shape(&self, id: &ShapeId) -> Option<&Shape> {
        self.shapes.iter().find(|s| &s.id == id)
    }

    pub fn shape_mut(&mut self, id: &ShapeId) -> Option<&mut Shape> {
        self.shapes.iter_mut().find(|s| &s.id == id)
    }

    /// Shapes on the current page, back to front
    pub fn current_page_shapes(&self) -> impl Iterator<Item = &Shape> {
        self.shapes
            .iter()
            .filter(|s| s.parent_id == self.current_page_id)
    }

    /// Ids of every shape on the current page
    pub fn current_page_shape_ids(&self) -> Vec<ShapeId> {
        self.current_page_shapes().map(|s| s.id.clone()).collect()
    }

    /// Record a modification
    pub fn touch(&mut self) {
        self.meta.updated_at = unix_now();
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(id: &str, page: &str) -> Shape {
        let mut props = Props::new();
        props.insert("w".into(), 300.0.into());
        props.insert("h".into(), 200.0.into());
        props.insert("text".into(), "# Hi".into());
        Shape {
            id: ShapeId::from(id),
            shape_type: "markdown-card".to_string(),
            x: 10.0,
            y: 20.0,
            rotation: 0.0,
            parent_id: PageId::from(page),
            props,
        }
    }

    #[test]
    fn test_json_round_trip() {
        let mut doc = Document::new();
        doc.shapes.push(card("shape:a", DEFAULT_PAGE_ID));

        let json = doc.to_json_pretty().unwrap();
        let parsed = Document::from_json(&json).unwrap();

        assert_eq!(parsed, doc);
        assert_eq!(parsed.shape(&ShapeId::from("shape:a")).unwrap().size(), Some((300.0, 200.0)));
    }

    #[test]
    fn test_valid_json_with_wrong_shape_is_rejected() {
        assert!(matches!(
            Document::from_json(br#"{"hello":"world"}"#),
            Err(DocumentError::Parse(_))
        ));
    }

    #[test]
    fn test_structural_checks() {
        let mut doc = Document::new();
        doc.schema_version = 99;
        assert!(matches!(doc.check(), Err(DocumentError::UnsupportedVersion(99))));

        let mut doc = Document::new();
        doc.shapes.push(card("shape:a", DEFAULT_PAGE_ID));
        doc.shapes.push(card("shape:a", DEFAULT_PAGE_ID));
        assert!(matches!(doc.check(), Err(DocumentError::DuplicateShape(_))));

        let mut doc = Document::new();
        doc.shapes.push(card("shape:a", "page:missing"));
        assert!(matches!(doc.check(), Err(DocumentError::OrphanShape { .. })));

        let mut doc = Document::new();
        doc.current_page_id = PageId::from("page:other");
        assert!(matches!(doc.check(), Err(DocumentError::MissingCurrentPage(_))));
    }

    #[test]
    fn test_validate_shapes_uses_registry() {
        let mut doc = Document::new();
        doc.shapes.push(card("shape:a", DEFAULT_PAGE_ID));
        doc.validate_shapes().unwrap();

        doc.shapes[0].props.remove("text");
        assert!(matches!(
            doc.validate_shapes(),
            Err(DocumentError::InvalidShape { .. })
        ));

        let mut doc = Document::new();
        let mut unknown = card("shape:b", DEFAULT_PAGE_ID);
        unknown.shape_type = "geo".to_string();
        doc.shapes.push(unknown);
        assert!(matches!(
            doc.validate_shapes(),
            Err(DocumentError::InvalidShape {
                source: ShapeError::UnknownType(_),
                ..
            })
        ));
    }

    #[test]
    fn test_current_page_shape_ids() {
        let mut doc = Document::new();
        doc.pages.push(Page {
            id: PageId::from("page:two"),
            name: "Page 2".to_string(),
        });
        doc.shapes.push(card("shape:a", DEFAULT_PAGE_ID));
        doc.shapes.push(card("shape:b", "page:two"));
        doc.shapes.push(card("shape:c", DEFAULT_PAGE_ID));

        assert_eq!(
            doc.current_page_shape_ids(),
            vec![ShapeId::from("shape:a"), ShapeId::from("shape:c")]
        );
    }

    #[test]
    fn test_new_shape_ids_are_unique() {
        let a = ShapeId::new();
        let b = ShapeId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("shape:"));
    }
}
