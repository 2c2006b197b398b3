//! Image shape
//!
//! Bitmaps placed on the canvas from image files. The pixels live inline
//! in the `src` prop as a base64 data URL so the document stays
//! self-contained.

use std::io::Cursor;
use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use eframe::egui::{self, Rect};
use regex_lite::Regex;
use serde_json::json;

use super::{svg_id, xml_escape, Indicator, PropDef, PropType, RenderContext, RenderOutput, ShapeError, ShapeUtil};
use crate::core::document::{Props, Shape};

/// Type tag of the image shape
pub const TYPE: &str = "image";

/// Largest side length of a newly placed image, in page units
pub const MAX_PLACED_SIZE: f32 = 800.0;

static DATA_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data:([A-Za-z0-9.+-]+/[A-Za-z0-9.+-]+);base64,([A-Za-z0-9+/=]*)$")
        .expect("data URL pattern is valid")
});

const PROPS: &[PropDef] = &[
    PropDef {
        name: "w",
        ty: PropType::PositiveNumber,
    },
    PropDef {
        name: "h",
        ty: PropType::PositiveNumber,
    },
    PropDef {
        name: "src",
        ty: PropType::Text,
    },
];

/// Registry record of the image shape
pub const IMAGE: ShapeUtil = ShapeUtil {
    type_tag: TYPE,
    props: PROPS,
    editable: false,
    default_props,
    render,
    indicator,
    to_svg,
};

/// Decoded image bytes with their media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageData {
    /// Sniff the format of raw file contents; `None` when it is not an image
    pub fn sniff(bytes: Vec<u8>) -> Option<Self> {
        let format = image::guess_format(&bytes).ok()?;
        Some(Self {
            mime: format.to_mime_type().to_string(),
            bytes,
        })
    }

    /// Parse a `data:<mime>;base64,<payload>` URL
    pub fn from_data_url(url: &str) -> Option<Self> {
        let caps = DATA_URL.captures(url)?;
        let bytes = STANDARD.decode(&caps[2]).ok()?;
        Some(Self {
            mime: caps[1].to_string(),
            bytes,
        })
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    /// Pixel dimensions read from the image header
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        image::ImageReader::new(Cursor::new(&self.bytes))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()
    }
}

/// Scale `(w, h)` down to fit within `max` on both sides, keeping the
/// aspect ratio; smaller sizes are left alone
pub fn fit_within(w: f32, h: f32, max: f32) -> (f32, f32) {
    let scale = (max / w).min(max / h).min(1.0);
    (w * scale, h * scale)
}

/// Props for an image shape showing `data`
pub fn image_props(data: &ImageData) -> Option<Props> {
    let (pw, ph) = data.dimensions()?;
    if pw == 0 || ph == 0 {
        return None;
    }
    let (w, h) = fit_within(pw as f32, ph as f32, MAX_PLACED_SIZE);
    let mut props = Props::new();
    props.insert("w".into(), json!(w));
    props.insert("h".into(), json!(h));
    props.insert("src".into(), json!(data.to_data_url()));
    Some(props)
}

fn default_props() -> Props {
    let mut props = Props::new();
    props.insert("w".into(), json!(100.0));
    props.insert("h".into(), json!(100.0));
    props.insert("src".into(), json!(""));
    props
}

fn size_and_src(shape: &Shape) -> Result<(f32, f32, &str), ShapeError> {
    IMAGE.validate(&shape.props)?;
    let invalid = |prop, expected| ShapeError::InvalidProp {
        shape_type: TYPE,
        prop,
        expected,
    };
    let (w, h) = shape.size().ok_or_else(|| invalid("w", "a positive number"))?;
    let src = shape.str_prop("src").ok_or_else(|| invalid("src", "a string"))?;
    Ok((w, h, src))
}

/// Loader cache key; a changed `src` gets a fresh entry
fn bytes_uri(shape: &Shape, src: &str) -> String {
    format!("bytes://{}-{:016x}.img", svg_id(&shape.id), egui::util::hash(src))
}

fn render(ui: &mut egui::Ui, shape: &Shape, _ctx: &RenderContext) -> Result<RenderOutput, ShapeError> {
    let (w, h, src) = size_and_src(shape)?;
    let rect = Rect::from_min_size(ui.max_rect().min, egui::vec2(w, h));

    if src.is_empty() {
        ui.painter()
            .rect_filled(rect, 4.0, egui::Color32::from_rgb(40, 40, 40));
        return Ok(RenderOutput::default());
    }

    let uri = bytes_uri(shape, src);
    if ui.ctx().try_load_bytes(&uri).is_err() {
        let data = ImageData::from_data_url(src).ok_or(ShapeError::InvalidProp {
            shape_type: TYPE,
            prop: "src",
            expected: "a base64 data URL",
        })?;
        ui.ctx().include_bytes(uri.clone(), data.bytes);
    }

    egui::Image::from_uri(uri)
        .fit_to_exact_size(rect.size())
        .paint_at(ui, rect);

    Ok(RenderOutput::default())
}

fn indicator(shape: &Shape) -> Indicator {
    let (width, height) = shape.size().unwrap_or((100.0, 100.0));
    Indicator::RoundedRect {
        width,
        height,
        radius: 0.0,
    }
}

fn to_svg(shape: &Shape) -> Result<String, ShapeError> {
    let (w, h, src) = size_and_src(shape)?;
    Ok(format!(
        "<g transform=\"translate({} {}) rotate({})\"><image width=\"{w}\" height=\"{h}\" preserveAspectRatio=\"none\" href=\"{}\"/></g>",
        shape.x,
        shape.y,
        shape.rotation.to_degrees(),
        xml_escape(src),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_sniff_rejects_non_images() {
        assert!(ImageData::sniff(b"just some text".to_vec()).is_none());
        let data = ImageData::sniff(png(2, 2)).unwrap();
        assert_eq!(data.mime, "image/png");
    }

    #[test]
    fn test_data_url_round_trip() {
        let data = ImageData::sniff(png(3, 5)).unwrap();
        let url = data.to_data_url();
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(ImageData::from_data_url(&url), Some(data));
        assert!(ImageData::from_data_url("https://example.com/a.png").is_none());
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(400.0, 300.0, 800.0), (400.0, 300.0));
        assert_eq!(fit_within(1600.0, 800.0, 800.0), (800.0, 400.0));
        assert_eq!(fit_within(1000.0, 2000.0, 800.0), (400.0, 800.0));
    }

    #[test]
    fn test_image_props_use_pixel_size() {
        let data = ImageData::sniff(png(16, 8)).unwrap();
        let props = image_props(&data).unwrap();
        assert_eq!(props["w"], 16.0);
        assert_eq!(props["h"], 8.0);
        IMAGE.validate(&props).unwrap();
    }

    #[test]
    fn test_to_svg_embeds_source() {
        let data = ImageData::sniff(png(4, 4)).unwrap();
        let shape = Shape {
            id: "shape:img".into(),
            shape_type: TYPE.to_string(),
            x: 5.0,
            y: 6.0,
            rotation: 0.0,
            parent_id: "page:page".into(),
            props: image_props(&data).unwrap(),
        };
        let svg = to_svg(&shape).unwrap();
        assert!(svg.contains("translate(5 6)"));
        assert!(svg.contains("href=\"data:image/png;base64,"));
    }

    #[test]
    fn test_bytes_uri_follows_source_content() {
        let red = ImageData::sniff(png(4, 4)).unwrap().to_data_url();
        let mut blue = red.clone();
        blue.pop();
        blue.push('A');
        assert_eq!(red.len(), blue.len());

        let shape = Shape {
            id: "shape:img".into(),
            shape_type: TYPE.to_string(),
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            parent_id: "page:page".into(),
            props: Default::default(),
        };
        assert_eq!(bytes_uri(&shape, &red), bytes_uri(&shape, &red));
        assert_ne!(bytes_uri(&shape, &red), bytes_uri(&shape, &blue));
    }
}
