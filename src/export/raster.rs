//! PNG export of the current page

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex_lite::Regex;
use tiny_skia::{Pixmap, Transform};

use super::{ExportArtifact, ExportError, PNG_FILE_NAME};
use crate::canvas::{CanvasEditor, SvgExport, SvgOptions};

static SVG_ROOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<svg\b[^>]*>").expect("svg root pattern is valid"));

static WIDTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\swidth="([0-9]+(?:\.[0-9]+)?)(?:px)?""#).expect("width pattern is valid")
});

static HEIGHT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\sheight="([0-9]+(?:\.[0-9]+)?)(?:px)?""#).expect("height pattern is valid")
});

static FONTS: LazyLock<Arc<usvg::fontdb::Database>> = LazyLock::new(|| {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    tracing::debug!("Loaded {} font faces for export", db.len());
    Arc::new(db)
});

/// Width and height declared on the SVG root element
pub fn declared_dimensions(svg: &str) -> Option<(u32, u32)> {
    let root = SVG_ROOT.find(svg)?.as_str();
    let read = |re: &Regex| -> Option<u32> {
        let value: f32 = re.captures(root)?[1].parse().ok()?;
        (value >= 1.0).then(|| value.round() as u32)
    };
    Some((read(&WIDTH)?, read(&HEIGHT)?))
}

/// Draw an SVG document into a PNG of its declared size
pub fn rasterize(svg: &str) -> Result<Vec<u8>, ExportError> {
    let (width, height) = declared_dimensions(svg).ok_or(ExportError::MissingDimensions)?;
    let mut pixmap =
        Pixmap::new(width, height).ok_or(ExportError::SurfaceUnavailable { width, height })?;

    let options = usvg::Options {
        fontdb: FONTS.clone(),
        ..Default::default()
    };
    let tree = usvg::Tree::from_data(svg.as_bytes(), &options)?;

    let size = tree.size();
    let transform = Transform::from_scale(
        width as f32 / size.width(),
        height as f32 / size.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|e| ExportError::Encode(e.to_string()))
}

/// SVG of every shape on the current page; `None` when the page is empty
pub fn current_page_svg(
    editor: &CanvasEditor,
    options: &SvgOptions,
) -> Result<Option<SvgExport>, ExportError> {
    let ids = editor.current_page_shape_ids();
    if ids.is_empty() {
        return Ok(None);
    }
    editor
        .get_svg(&ids, options)?
        .map(Some)
        .ok_or(ExportError::NoSvg)
}

/// Convert on the blocking pool, bounded by `timeout`
pub async fn svg_to_png(svg: SvgExport, timeout: Duration) -> Result<ExportArtifact, ExportError> {
    let task = tokio::task::spawn_blocking(move || rasterize(&svg.svg));
    let bytes = tokio::time::timeout(timeout, task)
        .await
        .map_err(|_| ExportError::Timeout)???;

    Ok(ExportArtifact {
        file_name: PNG_FILE_NAME.to_string(),
        mime: "image/png",
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use eframe::egui;

    use super::*;
    use crate::shapes::markdown_card;

    fn ihdr_size(png: &[u8]) -> (u32, u32) {
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!(&png[12..16], b"IHDR");
        let w = u32::from_be_bytes([png[16], png[17], png[18], png[19]]);
        let h = u32::from_be_bytes([png[20], png[21], png[22], png[23]]);
        (w, h)
    }

    #[test]
    fn test_declared_dimensions() {
        assert_eq!(
            declared_dimensions(r#"<svg xmlns="http://www.w3.org/2000/svg" width="364" height="264">"#),
            Some((364, 264))
        );
        assert_eq!(
            declared_dimensions(r#"<?xml version="1.0"?><svg width="10px" height="20.4"><rect width="999" height="999"/></svg>"#),
            Some((10, 20))
        );
        assert_eq!(declared_dimensions(r#"<svg viewBox="0 0 10 10"><rect width="5" height="5"/></svg>"#), None);
        assert_eq!(declared_dimensions("not svg"), None);
    }

    #[test]
    fn test_rasterize_without_dimensions_fails() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"/>"#;
        assert!(matches!(rasterize(svg), Err(ExportError::MissingDimensions)));
    }

    #[test]
    fn test_rasterize_matches_declared_size() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="30" viewBox="0 0 80 60"><rect width="80" height="60" fill="#ff0000"/></svg>"##;
        let png = rasterize(svg).unwrap();
        assert_eq!(ihdr_size(&png), (40, 30));
    }

    #[test]
    fn test_empty_page_has_no_svg() {
        let editor = CanvasEditor::new();
        assert!(current_page_svg(&editor, &SvgOptions::default()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_export_png_of_current_page() {
        let mut editor = CanvasEditor::new();
        editor
            .create_shape(markdown_card::TYPE, egui::pos2(0.0, 0.0))
            .unwrap();

        let svg = current_page_svg(&editor, &SvgOptions::default()).unwrap().unwrap();
        let artifact = svg_to_png(svg, Duration::from_secs(10)).await.unwrap();

        assert_eq!(artifact.file_name, "infinite-canvas-export.png");
        assert_eq!(artifact.mime, "image/png");
        // 300 x 200 card plus 32 of padding on every side
        assert_eq!(ihdr_size(&artifact.bytes), (364, 264));
    }
}
