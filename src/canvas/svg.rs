//! Vector export of a set of shapes

use eframe::egui::{self, Color32, Rect};

use super::CanvasEditor;
use crate::core::document::{Shape, ShapeId};
use crate::shapes::{self, ShapeError};

/// Options for [`CanvasEditor::get_svg`]
#[derive(Debug, Clone, Copy)]
pub struct SvgOptions {
    pub scale: f32,
    /// Page units added around the shapes' bounds
    pub padding: f32,
    /// Fill behind the shapes, transparent when `None`
    pub background: Option<Color32>,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            padding: 32.0,
            background: Some(Color32::from_rgb(5, 5, 5)),
        }
    }
}

/// A standalone SVG document with its declared pixel size
#[derive(Debug, Clone, PartialEq)]
pub struct SvgExport {
    pub svg: String,
    pub width: u32,
    pub height: u32,
}

/// Axis-aligned page bounds of a shape, including rotation
fn shape_bounds(shape: &Shape) -> Rect {
    let (w, h) = shape.size().unwrap_or((0.0, 0.0));
    let origin = egui::pos2(shape.x, shape.y);
    if shape.rotation == 0.0 {
        return Rect::from_min_size(origin, egui::vec2(w, h));
    }
    let rot = egui::emath::Rot2::from_angle(shape.rotation);
    let corners = [
        egui::vec2(0.0, 0.0),
        egui::vec2(w, 0.0),
        egui::vec2(0.0, h),
        egui::vec2(w, h),
    ];
    Rect::from_points(&corners.map(|c| origin + rot * c))
}

fn hex(color: Color32) -> String {
    format!("#{:02x}{:02x}{:02x}", color.r(), color.g(), color.b())
}

impl CanvasEditor {
    /// Render the given shapes to a standalone SVG document. Ids that do not
    /// exist are ignored; `Ok(None)` means nothing was left to draw.
    pub fn get_svg(&self, ids: &[ShapeId], options: &SvgOptions) -> Result<Option<SvgExport>, ShapeError> {
        let shapes: Vec<&Shape> = self
            .document()
            .shapes
            .iter()
            .filter(|shape| ids.contains(&shape.id))
            .collect();
        if shapes.is_empty() {
            return Ok(None);
        }

        let bounds = shapes
            .iter()
            .map(|shape| shape_bounds(shape))
            .reduce(|a, b| a.union(b))
            .unwrap_or(Rect::NOTHING)
            .expand(options.padding);

        let width = (bounds.width() * options.scale).ceil().max(1.0) as u32;
        let height = (bounds.height() * options.scale).ceil().max(1.0) as u32;

        let mut svg = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" \
             width=\"{width}\" height=\"{height}\" viewBox=\"{} {} {} {}\">",
            bounds.min.x,
            bounds.min.y,
            bounds.width(),
            bounds.height()
        );
        if let Some(background) = options.background {
            svg.push_str(&format!(
                "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\"/>",
                bounds.min.x,
                bounds.min.y,
                bounds.width(),
                bounds.height(),
                hex(background)
            ));
        }
        for shape in shapes {
            let util = shapes::util_for(&shape.shape_type)?;
            svg.push_str(&(util.to_svg)(shape)?);
        }
        svg.push_str("</svg>");

        Ok(Some(SvgExport { svg, width, height }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::markdown_card;

    #[test]
    fn test_no_shapes_no_svg() {
        let editor = CanvasEditor::new();
        assert_eq!(editor.get_svg(&[], &SvgOptions::default()).unwrap(), None);
        assert_eq!(
            editor
                .get_svg(&[ShapeId::from("shape:gone")], &SvgOptions::default())
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_bounds_include_padding() {
        let mut editor = CanvasEditor::new();
        let a = editor.create_shape(markdown_card::TYPE, egui::pos2(0.0, 0.0)).unwrap();
        let b = editor.create_shape(markdown_card::TYPE, egui::pos2(100.0, 50.0)).unwrap();

        let export = editor
            .get_svg(&[a, b], &SvgOptions::default())
            .unwrap()
            .unwrap();

        // 400 x 250 of shapes plus 32 on every side
        assert_eq!((export.width, export.height), (464, 314));
        assert!(export.svg.contains("width=\"464\" height=\"314\""));
        assert!(export.svg.contains("fill=\"#050505\""));
        assert_eq!(export.svg.matches("<clipPath").count(), 2);
    }

    #[test]
    fn test_scale_and_transparent_background() {
        let mut editor = CanvasEditor::new();
        let id = editor.create_shape(markdown_card::TYPE, egui::pos2(0.0, 0.0)).unwrap();
        let options = SvgOptions {
            scale: 2.0,
            padding: 0.0,
            background: None,
        };

        let export = editor.get_svg(&[id], &options).unwrap().unwrap();
        assert_eq!((export.width, export.height), (600, 400));
        assert!(!export.svg.contains("#050505"));
    }
}
