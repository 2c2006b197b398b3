//! Canvas engine
//!
//! Owns the live [`Document`] for one persistence key and every mutation of
//! it. Shape behaviour is looked up in the static registry by type tag; the
//! engine itself only knows about positions, selection, the edited shape,
//! the camera and when to write the document back to storage.

mod external;
mod svg;

pub use external::{ExternalContent, ExternalFile, IngestError};
pub use svg::{SvgExport, SvgOptions};

use std::sync::Arc;
use std::time::{Duration, Instant};

use eframe::egui::{self, emath::TSTransform, Pos2, Rect, Vec2};

use crate::core::document::{Camera, Document, DocumentError, Props, Shape, ShapeId, Snapshot};
use crate::core::storage::{KeyValueStore, Namespace, StorageError};
use crate::shapes::{self, ShapeError, ShapeUpdate};

pub const MIN_ZOOM: f32 = 0.1;
pub const MAX_ZOOM: f32 = 8.0;

/// Where and how often the document is written back
struct Persistence {
    store: Arc<dyn KeyValueStore>,
    key: String,
    debounce: Duration,
    dirty_since: Option<Instant>,
}

/// The canvas engine
pub struct CanvasEditor {
    document: Document,
    editing: Option<ShapeId>,
    selected: Option<ShapeId>,
    /// Screen rect the canvas is drawn into
    viewport: Rect,
    persistence: Option<Persistence>,
}

impl Default for CanvasEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasEditor {
    /// Engine over an empty, unpersisted document
    pub fn new() -> Self {
        Self::with_document(Document::new())
    }

    fn with_document(document: Document) -> Self {
        Self {
            document,
            editing: None,
            selected: None,
            viewport: Rect::from_min_size(Pos2::ZERO, egui::vec2(1280.0, 800.0)),
            persistence: None,
        }
    }

    /// Load the document stored under `namespace`, or start empty when
    /// nothing is stored yet
    pub fn hydrate(
        store: Arc<dyn KeyValueStore>,
        namespace: &Namespace,
        debounce: Duration,
    ) -> Result<Self, DocumentError> {
        let key = namespace.document_key();
        let document = match store.get(&key)? {
            Some(data) if !data.is_empty() => {
                let document = Document::from_json(&data)?;
                document.validate_shapes()?;
                tracing::info!(
                    "Hydrated document `{}` with {} shapes",
                    key,
                    document.shapes.len()
                );
                document
            }
            _ => {
                tracing::info!("No stored document under `{}`, starting empty", key);
                Document::new()
            }
        };

        let mut editor = Self::with_document(document);
        editor.persistence = Some(Persistence {
            store,
            key,
            debounce,
            dirty_since: None,
        });
        Ok(editor)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Point-in-time copy of the whole document
    pub fn get_snapshot(&self) -> Snapshot {
        self.document.clone()
    }

    /// Replace the live document, leaving it untouched when the snapshot is
    /// not a valid document
    pub fn load_snapshot(&mut self, snapshot: Snapshot) -> Result<(), DocumentError> {
        snapshot.check()?;
        snapshot.validate_shapes()?;

        tracing::info!("Loaded snapshot with {} shapes", snapshot.shapes.len());
        self.document = snapshot;
        self.editing = None;
        self.selected = None;
        self.mark_dirty();
        Ok(())
    }

    // Shapes

    pub fn shape(&self, id: &ShapeId) -> Option<&Shape> {
        self.document.shape(id)
    }

    /// Ids of the shapes on the current page, back to front
    pub fn current_page_shape_ids(&self) -> Vec<ShapeId> {
        self.document.current_page_shape_ids()
    }

    /// Create a shape with its type's default props at `position`
    pub fn create_shape(&mut self, shape_type: &str, position: Pos2) -> Result<ShapeId, ShapeError> {
        let util = shapes::util_for(shape_type)?;
        self.create_shape_with_props(shape_type, position, (util.default_props)())
    }

    /// Create a shape with explicit props at `position`
    pub fn create_shape_with_props(
        &mut self,
        shape_type: &str,
        position: Pos2,
        props: Props,
    ) -> Result<ShapeId, ShapeError> {
        let util = shapes::util_for(shape_type)?;
        util.validate(&props)?;

        let id = ShapeId::new();
        self.document.shapes.push(Shape {
            id: id.clone(),
            shape_type: util.type_tag.to_string(),
            x: position.x,
            y: position.y,
            rotation: 0.0,
            parent_id: self.document.current_page_id.clone(),
            props,
        });
        self.touch();
        tracing::debug!("Created {} shape {}", shape_type, id);
        Ok(id)
    }

    /// Merge a partial props update into a shape
    pub fn update_shape(&mut self, id: &ShapeId, patch: &Props) -> Result<(), ShapeError> {
        let shape = self
            .document
            .shape_mut(id)
            .ok_or_else(|| ShapeError::NotFound(id.clone()))?;
        let util = shapes::util_for(&shape.shape_type)?;
        util.apply_patch(&mut shape.props, patch)?;
        self.touch();
        Ok(())
    }

    /// Apply the updates requested by a render, in order
    pub fn apply_updates(&mut self, updates: Vec<ShapeUpdate>) -> Result<(), ShapeError> {
        for update in updates {
            self.update_shape(&update.id, &update.props)?;
        }
        Ok(())
    }

    /// Move a shape by `delta` page units
    pub fn translate_shape(&mut self, id: &ShapeId, delta: Vec2) {
        if delta == Vec2::ZERO {
            return;
        }
        if let Some(shape) = self.document.shape_mut(id) {
            shape.x += delta.x;
            shape.y += delta.y;
            self.touch();
        }
    }

    /// Remove shapes, returning how many existed
    pub fn delete_shapes(&mut self, ids: &[ShapeId]) -> usize {
        let before = self.document.shapes.len();
        self.document.shapes.retain(|s| !ids.contains(&s.id));
        let removed = before - self.document.shapes.len();

        if self.editing.as_ref().is_some_and(|id| ids.contains(id)) {
            self.editing = None;
        }
        if self.selected.as_ref().is_some_and(|id| ids.contains(id)) {
            self.selected = None;
        }
        if removed > 0 {
            self.touch();
            tracing::debug!("Deleted {} shapes", removed);
        }
        removed
    }

    // Selection and editing

    pub fn selected_shape_id(&self) -> Option<&ShapeId> {
        self.selected.as_ref()
    }

    pub fn select(&mut self, id: Option<ShapeId>) {
        if id != self.editing {
            self.editing = None;
        }
        self.selected = id;
    }

    /// The shape currently in edit mode
    pub fn editing_shape_id(&self) -> Option<&ShapeId> {
        self.editing.as_ref()
    }

    /// Enter or leave edit mode; only editable shape types can be edited
    pub fn set_editing(&mut self, id: Option<ShapeId>) -> bool {
        match id {
            Some(id) => {
                let editable = self
                    .shape(&id)
                    .and_then(|shape| shapes::lookup(&shape.shape_type))
                    .is_some_and(|util| util.editable);
                if editable {
                    self.selected = Some(id.clone());
                    self.editing = Some(id);
                }
                editable
            }
            None => {
                self.editing = None;
                true
            }
        }
    }

    // Camera

    pub fn camera(&self) -> Camera {
        self.document.camera
    }

    /// Record the screen rect the canvas occupies this frame
    pub fn set_viewport(&mut self, viewport: Rect) {
        self.viewport = viewport;
    }

    pub fn page_to_screen(&self, point: Pos2) -> Pos2 {
        let cam = self.document.camera;
        self.viewport.min + (point - egui::pos2(cam.x, cam.y)) * cam.z
    }

    pub fn screen_to_page(&self, point: Pos2) -> Pos2 {
        let cam = self.document.camera;
        egui::pos2(cam.x, cam.y) + (point - self.viewport.min) / cam.z
    }

    /// Transform from page coordinates to screen coordinates
    pub fn page_transform(&self) -> TSTransform {
        let cam = self.document.camera;
        TSTransform::new(
            self.viewport.min.to_vec2() - egui::vec2(cam.x, cam.y) * cam.z,
            cam.z,
        )
    }

    /// The visible part of the page
    pub fn viewport_page_bounds(&self) -> Rect {
        Rect::from_min_max(
            self.screen_to_page(self.viewport.min),
            self.screen_to_page(self.viewport.max),
        )
    }

    /// Pan by a screen-space delta
    pub fn pan_by(&mut self, screen_delta: Vec2) {
        if screen_delta == Vec2::ZERO {
            return;
        }
        let cam = &mut self.document.camera;
        cam.x -= screen_delta.x / cam.z;
        cam.y -= screen_delta.y / cam.z;
        self.mark_dirty();
    }

    /// Zoom by `factor`, keeping the page point under `anchor` in place
    pub fn zoom_at(&mut self, anchor: Pos2, factor: f32) {
        let zoom = (self.document.camera.z * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        if zoom == self.document.camera.z {
            return;
        }
        let page_anchor = self.screen_to_page(anchor);
        let offset = (anchor - self.viewport.min) / zoom;
        let cam = &mut self.document.camera;
        cam.x = page_anchor.x - offset.x;
        cam.y = page_anchor.y - offset.y;
        cam.z = zoom;
        self.mark_dirty();
    }

    // Persistence

    fn touch(&mut self) {
        self.document.touch();
        self.mark_dirty();
    }

    fn mark_dirty(&mut self) {
        if let Some(persistence) = &mut self.persistence {
            persistence.dirty_since = Some(Instant::now());
        }
    }

    /// Whether there are unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.persistence
            .as_ref()
            .is_some_and(|p| p.dirty_since.is_some())
    }

    /// Time left until a pending save is due
    pub fn next_save_in(&self, now: Instant) -> Option<Duration> {
        let persistence = self.persistence.as_ref()?;
        let since = persistence.dirty_since?;
        Some((since + persistence.debounce).saturating_duration_since(now))
    }

    /// Save when the last change is older than the debounce interval
    pub fn flush_if_due(&mut self, now: Instant) -> Result<bool, StorageError> {
        match self.next_save_in(now) {
            Some(left) if left.is_zero() => self.flush(),
            _ => Ok(false),
        }
    }

    /// Save pending changes now
    pub fn flush(&mut self) -> Result<bool, StorageError> {
        let Some(persistence) = &mut self.persistence else {
            return Ok(false);
        };
        if persistence.dirty_since.is_none() {
            return Ok(false);
        }

        let data = match self.document.to_json_pretty() {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("Failed to serialize document: {}", e);
                return Ok(false);
            }
        };
        persistence.store.set(&persistence.key, &data)?;
        persistence.dirty_since = None;
        tracing::debug!("Saved document `{}` ({} bytes)", persistence.key, data.len());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::storage::MemoryStore;
    use crate::shapes::markdown_card::{self, create_markdown_card};

    fn persisted(store: &Arc<MemoryStore>) -> CanvasEditor {
        let store: Arc<dyn KeyValueStore> = store.clone();
        CanvasEditor::hydrate(store, &Namespace::new("test-key"), Duration::from_millis(500)).unwrap()
    }

    #[test]
    fn test_new_card_at_viewport_center() {
        let mut editor = CanvasEditor::new();
        editor.set_viewport(Rect::from_min_size(egui::pos2(0.0, 40.0), egui::vec2(1000.0, 600.0)));
        editor.pan_by(egui::vec2(-200.0, 100.0));

        let center = editor.viewport_page_bounds().center();
        let id = create_markdown_card(&mut editor).unwrap();
        let shape = editor.shape(&id).unwrap();

        assert_eq!(shape.shape_type, markdown_card::TYPE);
        assert_eq!((shape.x, shape.y), (center.x - 150.0, center.y - 100.0));
        assert_eq!(shape.size(), Some((300.0, 200.0)));
        assert_eq!(shape.str_prop("text"), Some(markdown_card::DEFAULT_TEXT));
    }

    #[test]
    fn test_repeated_creation_stacks() {
        let mut editor = CanvasEditor::new();
        let a = create_markdown_card(&mut editor).unwrap();
        let b = create_markdown_card(&mut editor).unwrap();

        assert_ne!(a, b);
        let (sa, sb) = (editor.shape(&a).unwrap(), editor.shape(&b).unwrap());
        assert_eq!((sa.x, sa.y), (sb.x, sb.y));
        assert_eq!(editor.current_page_shape_ids(), vec![a, b]);
    }

    #[test]
    fn test_update_shape_merges_and_validates() {
        let mut editor = CanvasEditor::new();
        let id = editor.create_shape(markdown_card::TYPE, Pos2::ZERO).unwrap();

        let patch = json!({"text": "# Changed"}).as_object().cloned().unwrap();
        editor.update_shape(&id, &patch).unwrap();
        assert_eq!(editor.shape(&id).unwrap().str_prop("text"), Some("# Changed"));
        assert_eq!(editor.shape(&id).unwrap().size(), Some((300.0, 200.0)));

        let bad = json!({"w": "wide"}).as_object().cloned().unwrap();
        assert!(editor.update_shape(&id, &bad).is_err());
        assert!(matches!(
            editor.update_shape(&ShapeId::from("shape:none"), &patch),
            Err(ShapeError::NotFound(_))
        ));
    }

    #[test]
    fn test_unknown_shape_type_is_rejected() {
        let mut editor = CanvasEditor::new();
        assert!(matches!(
            editor.create_shape("geo", Pos2::ZERO),
            Err(ShapeError::UnknownType(_))
        ));
    }

    #[test]
    fn test_editing_and_deletion() {
        let mut editor = CanvasEditor::new();
        let id = create_markdown_card(&mut editor).unwrap();

        assert!(editor.set_editing(Some(id.clone())));
        assert_eq!(editor.editing_shape_id(), Some(&id));
        assert_eq!(editor.selected_shape_id(), Some(&id));

        assert_eq!(editor.delete_shapes(&[id.clone()]), 1);
        assert!(editor.editing_shape_id().is_none());
        assert!(editor.selected_shape_id().is_none());
        assert_eq!(editor.delete_shapes(&[id]), 0);
    }

    #[test]
    fn test_camera_round_trip_and_zoom_anchor() {
        let mut editor = CanvasEditor::new();
        editor.set_viewport(Rect::from_min_size(egui::pos2(10.0, 20.0), egui::vec2(800.0, 600.0)));
        editor.pan_by(egui::vec2(50.0, -30.0));

        let anchor = egui::pos2(300.0, 200.0);
        let before = editor.screen_to_page(anchor);
        editor.zoom_at(anchor, 2.0);
        let after = editor.screen_to_page(anchor);

        assert_eq!(editor.camera().z, 2.0);
        assert!((before - after).length() < 1e-3);

        let page = egui::pos2(123.0, -45.0);
        let back = editor.screen_to_page(editor.page_to_screen(page));
        assert!((back - page).length() < 1e-3);
        assert!((editor.page_transform() * page - editor.page_to_screen(page)).length() < 1e-3);

        editor.zoom_at(anchor, 1000.0);
        assert_eq!(editor.camera().z, MAX_ZOOM);
    }

    #[test]
    fn test_debounced_save_and_rehydrate() {
        let store = Arc::new(MemoryStore::new());
        let mut editor = persisted(&store);
        let id = create_markdown_card(&mut editor).unwrap();

        let now = Instant::now();
        assert!(editor.is_dirty());
        assert!(!editor.flush_if_due(now).unwrap());
        assert!(store.get("TLDRAW_DOCUMENT_v1test-key").unwrap().is_none());

        assert!(editor.flush_if_due(now + Duration::from_millis(600)).unwrap());
        assert!(!editor.is_dirty());
        assert!(store.get("TLDRAW_DOCUMENT_v1test-key").unwrap().is_some());

        let rehydrated = persisted(&store);
        assert_eq!(rehydrated.current_page_shape_ids(), vec![id.clone()]);
        assert_eq!(rehydrated.shape(&id), editor.shape(&id));
    }

    #[test]
    fn test_hydrate_rejects_invalid_stored_shapes() {
        let store = Arc::new(MemoryStore::new());
        let mut doc = Document::new();
        let mut editor = CanvasEditor::new();
        let id = create_markdown_card(&mut editor).unwrap();
        let mut shape = editor.shape(&id).unwrap().clone();
        shape.props.remove("w");
        doc.shapes.push(shape);
        store
            .set("TLDRAW_DOCUMENT_v1test-key", &doc.to_json_pretty().unwrap())
            .unwrap();

        let store: Arc<dyn KeyValueStore> = store;
        assert!(matches!(
            CanvasEditor::hydrate(store, &Namespace::new("test-key"), Duration::ZERO),
            Err(DocumentError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_load_snapshot_keeps_document_on_error() {
        let mut editor = CanvasEditor::new();
        let id = create_markdown_card(&mut editor).unwrap();
        let snapshot = editor.get_snapshot();

        let mut bad = snapshot.clone();
        bad.schema_version = 7;
        assert!(editor.load_snapshot(bad).is_err());
        assert_eq!(editor.current_page_shape_ids(), vec![id.clone()]);

        let mut other = CanvasEditor::new();
        other.load_snapshot(snapshot).unwrap();
        assert_eq!(other.current_page_shape_ids(), vec![id]);
    }
}
