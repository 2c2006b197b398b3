//! Block rendering for card view mode
//!
//! Draws the blocks produced by [`super::markdown_blocks`] with egui widgets
//! so Markdown shows as structured formatting instead of raw text.

use eframe::egui::{self, Color32, FontId, RichText, Ui};

use super::markdown_blocks::{InlineSpan, ListItem, ParsedBlock, TableAlignment, TableCell};

const TEXT_COLOR: Color32 = Color32::from_rgb(229, 229, 229);
const MUTED_COLOR: Color32 = Color32::from_rgb(150, 150, 150);
const CODE_BG: Color32 = Color32::from_rgb(45, 45, 45);

/// Render a list of blocks
pub fn render_blocks(ui: &mut Ui, blocks: &[ParsedBlock]) {
    for (idx, block) in blocks.iter().enumerate() {
        ui.push_id(idx, |ui| render_block(ui, block));
    }
}

/// Render a parsed block to the UI
pub fn render_block(ui: &mut Ui, block: &ParsedBlock) {
    match block {
        ParsedBlock::Heading { level, spans } => render_heading(ui, *level, spans),
        ParsedBlock::Paragraph { spans } => render_paragraph(ui, spans),
        ParsedBlock::CodeBlock { lang, code } => render_code_block(ui, lang.as_deref(), code),
        ParsedBlock::List {
            items,
            ordered,
            start,
        } => render_list(ui, items, *ordered, *start),
        ParsedBlock::BlockQuote { content } => render_blockquote(ui, content),
        ParsedBlock::HorizontalRule => render_horizontal_rule(ui),
        ParsedBlock::Table { headers, rows } => render_table(ui, headers, rows),
        ParsedBlock::Image { alt, url } => render_image(ui, alt, url),
    }
}

/// Font size of a heading level
pub fn heading_size(level: u8) -> f32 {
    match level {
        1 => 24.0,
        2 => 20.0,
        3 => 17.0,
        4 => 15.0,
        _ => 14.0,
    }
}

/// Render a heading
pub fn render_heading(ui: &mut Ui, level: u8, spans: &[InlineSpan]) {
    let size = heading_size(level);

    ui.horizontal_wrapped(|ui| {
        for span in spans {
            let text = styled_text(span, size).strong();
            ui.label(text);
        }
    });

    ui.add_space(match level {
        1 => 8.0,
        2 => 6.0,
        _ => 4.0,
    });
}

/// Apply a span's style to its text
fn styled_text(span: &InlineSpan, size: f32) -> RichText {
    let mut text = RichText::new(&span.text).color(TEXT_COLOR);

    if span.style.code {
        text = text.font(FontId::monospace(size - 1.0)).background_color(CODE_BG);
    } else {
        text = text.font(FontId::proportional(size));
    }
    if span.style.strong {
        text = text.strong();
    }
    if span.style.emphasis {
        text = text.italics();
    }
    if span.style.strikethrough {
        text = text.strikethrough();
    }
    text
}

/// Render inline spans into the current (wrapping) layout
fn render_spans(ui: &mut Ui, spans: &[InlineSpan]) {
    for span in spans {
        if let Some(url) = &span.image {
            let label = if span.text.is_empty() { url } else { &span.text };
            ui.label(RichText::new(format!("[{}]", label)).italics().color(MUTED_COLOR));
            continue;
        }

        let text = styled_text(span, 14.0);
        match &span.link {
            Some(url) => {
                ui.hyperlink_to(text.color(Color32::from_rgb(139, 180, 233)), url)
                    .on_hover_text(url.as_str());
            }
            None => {
                ui.label(text);
            }
        }
    }
}

/// Render a paragraph with inline formatting
pub fn render_paragraph(ui: &mut Ui, spans: &[InlineSpan]) {
    ui.horizontal_wrapped(|ui| {
        ui.spacing_mut().item_spacing.x = 0.0;
        render_spans(ui, spans);
    });
    ui.add_space(6.0);
}

/// Render a code block
pub fn render_code_block(ui: &mut Ui, lang: Option<&str>, code: &str) {
    egui::Frame::new()
        .fill(Color32::from_rgb(40, 40, 40))
        .stroke(egui::Stroke::new(1.0, Color32::from_rgb(60, 60, 60)))
        .inner_margin(egui::Margin::same(8))
        .outer_margin(egui::Margin::symmetric(0, 4))
        .corner_radius(4.0)
        .show(ui, |ui| {
            if let Some(lang) = lang {
                ui.label(
                    RichText::new(lang)
                        .font(FontId::monospace(11.0))
                        .color(Color32::from_rgb(128, 128, 128)),
                );
                ui.add_space(2.0);
            }

            ui.label(
                RichText::new(code)
                    .font(FontId::monospace(13.0))
                    .color(Color32::from_rgb(200, 200, 200)),
            );
        });

    ui.add_space(6.0);
}

/// Render a list (ordered or unordered)
pub fn render_list(ui: &mut Ui, items: &[ListItem], ordered: bool, start: Option<u64>) {
    let start_num = start.unwrap_or(1);

    for (idx, item) in items.iter().enumerate() {
        ui.horizontal_wrapped(|ui| {
            ui.add_space(8.0);

            let marker = match item.checkbox {
                Some(true) => "\u{2611}".to_string(),
                Some(false) => "\u{2610}".to_string(),
                None if ordered => format!("{}.", start_num + idx as u64),
                None => "\u{2022}".to_string(),
            };
            ui.label(RichText::new(marker).color(MUTED_COLOR));
            ui.add_space(4.0);

            ui.spacing_mut().item_spacing.x = 0.0;
            render_spans(ui, &item.spans);
        });

        if !item.children.is_empty() {
            ui.horizontal(|ui| {
                ui.add_space(16.0);
                ui.vertical(|ui| {
                    ui.push_id(idx, |ui| render_blocks(ui, &item.children));
                });
            });
        }
    }

    ui.add_space(6.0);
}

/// Render a blockquote
pub fn render_blockquote(ui: &mut Ui, content: &[ParsedBlock]) {
    let response = egui::Frame::new()
        .fill(Color32::from_rgb(35, 35, 40))
        .inner_margin(egui::Margin {
            left: 12,
            right: 8,
            top: 6,
            bottom: 6,
        })
        .show(ui, |ui| render_blocks(ui, content))
        .response;

    // Left border
    let rect = response.rect;
    ui.painter().rect_filled(
        egui::Rect::from_min_size(rect.min, egui::vec2(3.0, rect.height())),
        0.0,
        Color32::from_rgb(100, 100, 120),
    );

    ui.add_space(6.0);
}

/// Render a horizontal rule
pub fn render_horizontal_rule(ui: &mut Ui) {
    ui.add_space(4.0);
    ui.separator();
    ui.add_space(4.0);
}

/// Render a table
pub fn render_table(ui: &mut Ui, headers: &[TableCell], rows: &[Vec<TableCell>]) {
    use egui_extras::{Column, TableBuilder};

    let num_cols = headers.len().max(1);

    let show_cell = |ui: &mut Ui, cell: &TableCell| {
        let layout = match cell.alignment {
            TableAlignment::Left => egui::Layout::left_to_right(egui::Align::Center),
            TableAlignment::Center => egui::Layout::centered_and_justified(egui::Direction::LeftToRight),
            TableAlignment::Right => egui::Layout::right_to_left(egui::Align::Center),
        };
        ui.with_layout(layout, |ui| render_spans(ui, &cell.spans));
    };

    TableBuilder::new(ui)
        .striped(true)
        .vscroll(false)
        .columns(Column::auto().at_least(40.0), num_cols)
        .header(20.0, |mut header| {
            for h in headers {
                header.col(|ui| {
                    ui.style_mut().override_text_style = Some(egui::TextStyle::Button);
                    show_cell(ui, h);
                });
            }
        })
        .body(|mut body| {
            for row in rows {
                body.row(18.0, |mut row_ui| {
                    for c in row {
                        row_ui.col(|ui| show_cell(ui, c));
                    }
                });
            }
        });

    ui.add_space(6.0);
}

/// Render an image reference as a placeholder
pub fn render_image(ui: &mut Ui, alt: &str, url: &str) {
    // Only the reference is shown; card images are not fetched
    let shown_url = if url.starts_with("data:") { "embedded image" } else { url };

    egui::Frame::new()
        .fill(Color32::from_rgb(45, 45, 50))
        .stroke(egui::Stroke::new(1.0, Color32::from_rgb(70, 70, 70)))
        .inner_margin(egui::Margin::same(6))
        .corner_radius(4.0)
        .show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.label(RichText::new("\u{1F5BC}").font(FontId::proportional(18.0)));
                ui.vertical(|ui| {
                    if !alt.is_empty() {
                        ui.label(RichText::new(alt).italics());
                    }
                    ui.label(
                        RichText::new(shown_url)
                            .font(FontId::monospace(11.0))
                            .color(Color32::from_rgb(128, 128, 128)),
                    );
                });
            });
        });

    ui.add_space(6.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::markdown_blocks::parse_blocks;

    #[test]
    fn test_render_all_block_kinds_headless() {
        let content = "# Title\n\nSome *em* and **strong** with [a link](https://example.com)\n\n\
                       - [x] task\n- item\n  1. nested\n\n> quote\n\n---\n\n\
                       ```\ncode\n```\n\n| a | b |\n|---|--:|\n| 1 | 2 |\n\n![alt](img.png)\n";
        let blocks = parse_blocks(content);

        let ctx = egui::Context::default();
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            egui::CentralPanel::default().show(ctx, |ui| {
                render_blocks(ui, &blocks);
            });
        });
    }

    #[test]
    fn test_heading_sizes_shrink_with_level() {
        assert!(heading_size(1) > heading_size(2));
        assert!(heading_size(2) > heading_size(3));
        assert_eq!(heading_size(6), 14.0);
    }
}
