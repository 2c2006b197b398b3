//! Markdown card shape
//!
//! A rectangular card holding Markdown text. Double-clicking enters edit
//! mode with a plain monospace editor; otherwise the text is shown as
//! formatted blocks.

use eframe::egui::{self, Color32, CornerRadius, Rect, Sense, Stroke, StrokeKind};
use serde_json::json;

use super::{
    svg_id, xml_escape, Indicator, PropDef, PropType, RenderContext, RenderOutput, ShapeError,
    ShapeUpdate, ShapeUtil,
};
use crate::canvas::CanvasEditor;
use crate::core::document::{Props, Shape, ShapeId};
use crate::ui::block_renderer::{heading_size, render_blocks};
use crate::ui::markdown_blocks::parse_blocks;

/// Type tag of the Markdown card
pub const TYPE: &str = "markdown-card";

pub const DEFAULT_WIDTH: f32 = 300.0;
pub const DEFAULT_HEIGHT: f32 = 200.0;
pub const DEFAULT_TEXT: &str = "# New Note\nDouble click to edit";

const CORNER_RADIUS: f32 = 8.0;
const PADDING: f32 = 16.0;

const BACKGROUND: Color32 = Color32::from_rgb(0x1e, 0x1e, 0x1e);
const BORDER: Color32 = Color32::from_rgb(0x33, 0x33, 0x33);
const TEXT: Color32 = Color32::from_rgb(0xe5, 0xe5, 0xe5);

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
        name: "text",
        ty: PropType::Text,
    },
];

/// Registry record of the Markdown card
pub const MARKDOWN_CARD: ShapeUtil = ShapeUtil {
    type_tag: TYPE,
    props: PROPS,
    editable: true,
    default_props,
    render,
    indicator,
    to_svg,
};

/// Typed view of a card's props
#[derive(Debug, Clone, PartialEq)]
pub struct MarkdownCardProps {
    pub w: f32,
    pub h: f32,
    pub text: String,
}

impl MarkdownCardProps {
    pub fn from_shape(shape: &Shape) -> Result<Self, ShapeError> {
        MARKDOWN_CARD.validate(&shape.props)?;
        let missing = |prop| ShapeError::MissingProp {
            shape_type: TYPE,
            prop,
        };
        Ok(Self {
            w: shape.number_prop("w").ok_or_else(|| missing("w"))?,
            h: shape.number_prop("h").ok_or_else(|| missing("h"))?,
            text: shape.str_prop("text").ok_or_else(|| missing("text"))?.to_string(),
        })
    }
}

fn default_props() -> Props {
    let mut props = Props::new();
    props.insert("w".into(), json!(DEFAULT_WIDTH));
    props.insert("h".into(), json!(DEFAULT_HEIGHT));
    props.insert("text".into(), json!(DEFAULT_TEXT));
    props
}

/// Partial update replacing a card's text
pub fn text_update(id: &ShapeId, text: &str) -> ShapeUpdate {
    let mut props = Props::new();
    props.insert("text".into(), json!(text));
    ShapeUpdate {
        id: id.clone(),
        props,
    }
}

fn render(ui: &mut egui::Ui, shape: &Shape, ctx: &RenderContext) -> Result<RenderOutput, ShapeError> {
    let props = MarkdownCardProps::from_shape(shape)?;
    let rect = Rect::from_min_size(ui.max_rect().min, egui::vec2(props.w, props.h));
    let mut output = RenderOutput::default();

    ui.painter().rect(
        rect,
        CornerRadius::same(CORNER_RADIUS as u8),
        BACKGROUND,
        Stroke::new(1.0, BORDER),
        StrokeKind::Inside,
    );

    let content_rect = rect.shrink(PADDING);
    if ctx.is_editing {
        // Presses on the card's padding must not start a canvas drag
        ui.interact(rect, ui.id().with("edit-capture"), Sense::click_and_drag());
        output.captures_pointer = true;

        let mut text = props.text.clone();
        let response = ui
            .scope_builder(egui::UiBuilder::new().max_rect(content_rect), |ui| {
                ui.add_sized(
                    content_rect.size(),
                    egui::TextEdit::multiline(&mut text)
                        .code_editor()
                        .frame(false)
                        .text_color(TEXT)
                        .id_salt(("card-editor", shape.id.as_str())),
                )
            })
            .inner;

        if !response.has_focus() {
            response.request_focus();
        }
        if response.changed() && text != props.text {
            output.updates.push(text_update(&shape.id, &text));
        }
    } else {
        let blocks = parse_blocks(&props.text);
        ui.scope_builder(egui::UiBuilder::new().max_rect(content_rect), |ui| {
            ui.visuals_mut().override_text_color = Some(TEXT);
            egui::ScrollArea::vertical()
                .id_salt(("card-view", shape.id.as_str()))
                .auto_shrink([false, false])
                .max_height(content_rect.height())
                .show(ui, |ui| render_blocks(ui, &blocks));
        });
    }

    Ok(output)
}

fn indicator(shape: &Shape) -> Indicator {
    let (width, height) = shape.size().unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));
    Indicator::RoundedRect {
        width,
        height,
        radius: CORNER_RADIUS,
    }
}

/// Greedy word wrap by estimated glyph width
fn wrap_line(line: &str, font_size: f32, max_width: f32) -> Vec<String> {
    let max_chars = ((max_width / (font_size * 0.55)).floor() as usize).max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in line.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

fn to_svg(shape: &Shape) -> Result<String, ShapeError> {
    let props = MarkdownCardProps::from_shape(shape)?;
    let clip_id = format!("clip-{}", svg_id(&shape.id));
    let mut svg = format!(
        "<g transform=\"translate({} {}) rotate({})\">",
        shape.x,
        shape.y,
        shape.rotation.to_degrees()
    );
    svg.push_str(&format!(
        "<clipPath id=\"{clip_id}\"><rect width=\"{w}\" height=\"{h}\" rx=\"{r}\" ry=\"{r}\"/></clipPath>",
        w = props.w,
        h = props.h,
        r = CORNER_RADIUS,
    ));
    svg.push_str(&format!(
        "<rect width=\"{}\" height=\"{}\" rx=\"{r}\" ry=\"{r}\" fill=\"#1e1e1e\" stroke=\"#333333\" stroke-width=\"1\"/>",
        props.w,
        props.h,
        r = CORNER_RADIUS,
    ));
    svg.push_str(&format!(
        "<g clip-path=\"url(#{clip_id})\" font-family=\"sans-serif\" fill=\"#e5e5e5\">"
    ));

    let mut y = PADDING;
    for block in parse_blocks(&props.text) {
        for (level, line) in block.plain_lines() {
            let size = heading_size(level);
            let weight = if level > 0 { "bold" } else { "normal" };
            for wrapped in wrap_line(&line, size, props.w - 2.0 * PADDING) {
                y += size;
                svg.push_str(&format!(
                    "<text x=\"{PADDING}\" y=\"{y}\" font-size=\"{size}\" font-weight=\"{weight}\">{}</text>",
                    xml_escape(&wrapped)
                ));
                y += size * 0.4;
            }
        }
        y += 6.0;
        if y > props.h {
            break;
        }
    }

    svg.push_str("</g></g>");
    Ok(svg)
}

/// Create a card centered in the current viewport
pub fn create_markdown_card(editor: &mut CanvasEditor) -> Result<ShapeId, ShapeError> {
    let center = editor.viewport_page_bounds().center();
    let position = egui::pos2(center.x - DEFAULT_WIDTH / 2.0, center.y - DEFAULT_HEIGHT / 2.0);
    let id = editor.create_shape(TYPE, position)?;
    tracing::debug!("Created markdown card {}", id);
    Ok(id)
}
