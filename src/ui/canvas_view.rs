//! Interactive canvas
//!
//! Draws the current page of a [`CanvasEditor`] and turns pointer and
//! keyboard input into engine operations. Each shape is drawn in its own
//! layer carrying the camera transform, so shapes render in page
//! coordinates and egui takes care of zoom and hit testing.

use eframe::egui::{self, Color32, Key, Rect, Sense, Stroke, StrokeKind, Ui};

use super::fault_boundary::RenderError;
use crate::canvas::CanvasEditor;
use crate::core::config::UiConfig;
use crate::core::document::ShapeId;
use crate::shapes::{self, Indicator, RenderContext, RenderOutput};

/// Page units between grid dots
const GRID_SPACING: f32 = 32.0;

/// Colors and options of the canvas
#[derive(Debug, Clone, Copy)]
pub struct CanvasStyle {
    pub background: Color32,
    pub accent: Color32,
    pub show_grid: bool,
}

impl From<&UiConfig> for CanvasStyle {
    fn from(config: &UiConfig) -> Self {
        Self {
            background: config.background_color(),
            accent: config.accent_color(),
            show_grid: config.show_grid,
        }
    }
}

/// Canvas panel
pub struct CanvasView;

impl CanvasView {
    /// Draw the canvas into all available space
    pub fn show(ui: &mut Ui, editor: &mut CanvasEditor, style: &CanvasStyle) -> Result<(), RenderError> {
        let (rect, background) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        editor.set_viewport(rect);

        ui.painter().rect_filled(rect, 0.0, style.background);
        if style.show_grid {
            Self::paint_grid(ui, editor, rect);
        }

        Self::handle_keys(ui, editor);

        for id in editor.current_page_shape_ids() {
            Self::show_shape(ui, editor, &id, rect, style)?;
        }

        if background.clicked() {
            editor.select(None);
        }
        if background.dragged() {
            editor.pan_by(background.drag_delta());
        }
        Self::handle_scroll(ui, editor, rect);

        Ok(())
    }

    fn paint_grid(ui: &Ui, editor: &CanvasEditor, rect: Rect) {
        let zoom = editor.camera().z;
        let mut spacing = GRID_SPACING;
        while spacing * zoom < 12.0 {
            spacing *= 2.0;
        }

        let bounds = editor.viewport_page_bounds();
        let color = Color32::from_gray(40);
        let radius = (1.0 * zoom).clamp(0.5, 1.5);
        let painter = ui.painter_at(rect);

        let mut x = (bounds.min.x / spacing).floor() * spacing;
        while x <= bounds.max.x {
            let mut y = (bounds.min.y / spacing).floor() * spacing;
            while y <= bounds.max.y {
                painter.circle_filled(editor.page_to_screen(egui::pos2(x, y)), radius, color);
                y += spacing;
            }
            x += spacing;
        }
    }

    fn handle_keys(ui: &Ui, editor: &mut CanvasEditor) {
        let (escape, delete) = ui.input(|i| {
            (
                i.key_pressed(Key::Escape),
                i.key_pressed(Key::Delete) || i.key_pressed(Key::Backspace),
            )
        });

        if escape && editor.editing_shape_id().is_some() {
            editor.set_editing(None);
            return;
        }

        if delete && editor.editing_shape_id().is_none() && !ui.ctx().wants_keyboard_input() {
            if let Some(id) = editor.selected_shape_id().cloned() {
                editor.delete_shapes(&[id]);
            }
        }
    }

    fn handle_scroll(ui: &Ui, editor: &mut CanvasEditor, rect: Rect) {
        let (pointer, scroll, zoom) =
            ui.input(|i| (i.pointer.hover_pos(), i.smooth_scroll_delta, i.zoom_delta()));
        let Some(pointer) = pointer.filter(|p| rect.contains(*p)) else {
            return;
        };

        if zoom != 1.0 {
            editor.zoom_at(pointer, zoom);
        } else if scroll != egui::Vec2::ZERO {
            editor.pan_by(scroll);
        }
    }

    fn show_shape(
        ui: &mut Ui,
        editor: &mut CanvasEditor,
        id: &ShapeId,
        viewport: Rect,
        style: &CanvasStyle,
    ) -> Result<(), RenderError> {
        let Some(shape) = editor.shape(id).cloned() else {
            return Ok(());
        };
        let util = shapes::util_for(&shape.shape_type)?;
        let transform = editor.page_transform();
        let zoom = editor.camera().z;
        let is_editing = editor.editing_shape_id() == Some(id);
        let is_selected = editor.selected_shape_id() == Some(id);

        let origin = egui::pos2(shape.x, shape.y);
        let indicator = (util.indicator)(&shape);
        let Indicator::RoundedRect { width, height, radius } = indicator;
        let shape_rect = Rect::from_min_size(origin, egui::vec2(width, height));

        let area_id = ui.id().with(("shape", id.as_str()));
        let area = egui::Area::new(area_id)
            .fixed_pos(origin)
            .order(ui.layer_id().order)
            .constrain(false)
            .show(ui.ctx(), |ui| {
                ui.set_clip_rect(transform.inverse() * viewport);

                let body = ui.allocate_rect(shape_rect, Sense::click_and_drag());
                let context = RenderContext { is_editing };
                let output = ui
                    .scope_builder(
                        egui::UiBuilder::new().max_rect(shape_rect).id_salt("content"),
                        |ui| (util.render)(ui, &shape, &context),
                    )
                    .inner;

                if is_selected || body.hovered() {
                    let alpha = if is_selected { 1.0 } else { 0.5 };
                    ui.painter().rect_stroke(
                        shape_rect.expand(2.0 / zoom),
                        radius,
                        Stroke::new(1.5 / zoom, style.accent.gamma_multiply(alpha)),
                        StrokeKind::Outside,
                    );
                }

                (body, output)
            });

        // Sublayers must share the order of their parent layer
        let layer = area.response.layer_id;
        ui.ctx().set_transform_layer(layer, transform);
        ui.ctx().set_sublayer(ui.layer_id(), layer);

        let (body, output) = area.inner;
        let RenderOutput {
            updates,
            captures_pointer,
        } = output?;
        editor.apply_updates(updates)?;

        if body.double_clicked() && util.editable {
            editor.set_editing(Some(id.clone()));
        } else if !is_editing && (body.clicked() || body.drag_started()) {
            editor.select(Some(id.clone()));
        }

        if body.dragged() && !is_editing && !captures_pointer {
            let delta = ui.input(|i| i.pointer.delta()) / zoom;
            editor.translate_shape(id, delta);
        }

        Ok(())
    }
}
