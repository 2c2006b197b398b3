//! Markdown block parsing for card view mode
//!
//! Parses card text with pulldown-cmark into a small tree of blocks and
//! styled inline spans. The same tree feeds the egui renderer and the SVG
//! export, so both agree on what a card shows.

use pulldown_cmark::{Alignment, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

/// Inline styling flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanStyle {
    pub strong: bool,
    pub emphasis: bool,
    pub strikethrough: bool,
    pub code: bool,
}

/// A run of text sharing one style
#[derive(Debug, Clone, PartialEq)]
pub struct InlineSpan {
    pub text: String,
    pub style: SpanStyle,
    /// Link target, when the run is inside a link
    pub link: Option<String>,
    /// Image source, when the run is an image's alt text
    pub image: Option<String>,
}

/// Concatenate the text of a run of spans
pub fn spans_text(spans: &[InlineSpan]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}

/// A list item with potential checkbox state
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub spans: Vec<InlineSpan>,
    /// Checkbox state: Some(true) = checked, Some(false) = unchecked, None = no checkbox
    pub checkbox: Option<bool>,
    /// Nested blocks (sublists, code)
    pub children: Vec<ParsedBlock>,
}

/// Table column alignment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableAlignment {
    #[default]
    Left,
    Center,
    Right,
}

impl From<Alignment> for TableAlignment {
    fn from(alignment: Alignment) -> Self {
        match alignment {
            Alignment::Center => TableAlignment::Center,
            Alignment::Right => TableAlignment::Right,
            Alignment::None | Alignment::Left => TableAlignment::Left,
        }
    }
}

/// A table cell
#[derive(Debug, Clone, PartialEq)]
pub struct TableCell {
    pub spans: Vec<InlineSpan>,
    pub alignment: TableAlignment,
}

/// A parsed markdown block
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBlock {
    /// Heading with level (1-6)
    Heading { level: u8, spans: Vec<InlineSpan> },

    /// Regular paragraph
    Paragraph { spans: Vec<InlineSpan> },

    /// Fenced or indented code block
    CodeBlock { lang: Option<String>, code: String },

    /// Unordered or ordered list
    List {
        items: Vec<ListItem>,
        ordered: bool,
        start: Option<u64>,
    },

    /// Block quote
    BlockQuote { content: Vec<ParsedBlock> },

    /// Horizontal rule
    HorizontalRule,

    /// Table
    Table {
        headers: Vec<TableCell>,
        rows: Vec<Vec<TableCell>>,
    },

    /// Paragraph consisting of a single image
    Image {
        alt: String,
        url: String,
    },
}

impl ParsedBlock {
    /// Plain-text lines of the block with the heading level (0 for body
    /// text) each line should be drawn at
    pub fn plain_lines(&self) -> Vec<(u8, String)> {
        match self {
            ParsedBlock::Heading { level, spans } => vec![(*level, spans_text(spans))],
            ParsedBlock::Paragraph { spans } => spans_text(spans)
                .lines()
                .map(|line| (0, line.to_string()))
                .collect(),
            ParsedBlock::CodeBlock { code, .. } => {
                code.lines().map(|line| (0, line.to_string())).collect()
            }
            ParsedBlock::List {
                items,
                ordered,
                start,
            } => {
                let first = start.unwrap_or(1);
                let mut lines = Vec::new();
                for (idx, item) in items.iter().enumerate() {
                    let marker = match item.checkbox {
                        Some(true) => "[x]".to_string(),
                        Some(false) => "[ ]".to_string(),
                        None if *ordered => format!("{}.", first + idx as u64),
                        None => "\u{2022}".to_string(),
                    };
                    lines.push((0, format!("{} {}", marker, spans_text(&item.spans))));
                    for child in &item.children {
                        lines.extend(
                            child
                                .plain_lines()
                                .into_iter()
                                .map(|(level, line)| (level, format!("    {}", line))),
                        );
                    }
                }
                lines
            }
            ParsedBlock::BlockQuote { content } => content
                .iter()
                .flat_map(|block| block.plain_lines())
                .map(|(level, line)| (level, format!("\u{2502} {}", line)))
                .collect(),
            ParsedBlock::HorizontalRule => vec![(0, String::new())],
            ParsedBlock::Table { headers, rows } => {
                let row_text = |cells: &[TableCell]| {
                    cells
                        .iter()
                        .map(|c| spans_text(&c.spans))
                        .collect::<Vec<_>>()
                        .join(" | ")
                };
                std::iter::once((0, row_text(headers)))
                    .chain(rows.iter().map(|row| (0, row_text(row))))
                    .collect()
            }
            ParsedBlock::Image { alt, url, .. } => {
                let label = if alt.is_empty() { url } else { alt };
                vec![(0, format!("[image: {}]", label))]
            }
        }
    }
}

fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

/// Parse markdown content into blocks
pub fn parse_blocks(content: &str) -> Vec<ParsedBlock> {
    let mut parser = BlockParser {
        events: Parser::new_ext(content, parser_options()),
    };
    parser.blocks_until(None)
}

/// Collects inline events into styled spans
#[derive(Default)]
struct InlineBuilder {
    spans: Vec<InlineSpan>,
    strong: u32,
    emphasis: u32,
    strikethrough: u32,
    link: Option<String>,
    /// Source of the image whose alt text is being collected
    image: Option<String>,
    image_alt: String,
}

impl InlineBuilder {
    /// Feed one event; events that are not inline content are ignored
    fn push(&mut self, event: &Event<'_>) {
        match event {
            Event::Text(text) => {
                if self.image.is_some() {
                    self.image_alt.push_str(text);
                } else {
                    self.text(text, false);
                }
            }
            Event::Code(code) => self.text(code, true),
            Event::Html(html) | Event::InlineHtml(html) => self.text(html, false),
            Event::SoftBreak => self.text(" ", false),
            Event::HardBreak => self.text("\n", false),
            Event::Start(Tag::Strong) => self.strong += 1,
            Event::End(TagEnd::Strong) => self.strong = self.strong.saturating_sub(1),
            Event::Start(Tag::Emphasis) => self.emphasis += 1,
            Event::End(TagEnd::Emphasis) => self.emphasis = self.emphasis.saturating_sub(1),
            Event::Start(Tag::Strikethrough) => self.strikethrough += 1,
            Event::End(TagEnd::Strikethrough) => {
                self.strikethrough = self.strikethrough.saturating_sub(1)
            }
            Event::Start(Tag::Link { dest_url, .. }) => self.link = Some(dest_url.to_string()),
            Event::End(TagEnd::Link) => self.link = None,
            Event::Start(Tag::Image { dest_url, .. }) => {
                self.image = Some(dest_url.to_string());
                self.image_alt.clear();
            }
            Event::End(TagEnd::Image) => {
                if let Some(url) = self.image.take() {
                    let span = InlineSpan {
                        text: std::mem::take(&mut self.image_alt),
                        style: self.style(false),
                        link: self.link.clone(),
                        image: Some(url),
                    };
                    self.spans.push(span);
                }
            }
            _ => {}
        }
    }

    fn style(&self, code: bool) -> SpanStyle {
        SpanStyle {
            strong: self.strong > 0,
            emphasis: self.emphasis > 0,
            strikethrough: self.strikethrough > 0,
            code,
        }
    }

    fn text(&mut self, text: &str, code: bool) {
        let style = self.style(code);

        // Merge with the previous run when nothing about the style changed
        if let Some(last) = self.spans.last_mut() {
            if last.style == style && last.link == self.link && last.image.is_none() && !code {
                last.text.push_str(text);
                return;
            }
        }

        self.spans.push(InlineSpan {
            text: text.to_string(),
            style,
            link: self.link.clone(),
            image: None,
        });
    }

    fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    fn finish(self) -> Vec<InlineSpan> {
        self.spans
    }
}

struct BlockParser<'a> {
    events: Parser<'a>,
}

impl BlockParser<'_> {
    /// Parse blocks until `end` is reached (or the input ends)
    fn blocks_until(&mut self, end: Option<TagEnd>) -> Vec<ParsedBlock> {
        let mut blocks = Vec::new();

        while let Some(event) = self.events.next() {
            match event {
                Event::End(tag) if Some(tag) == end => break,
                Event::Start(Tag::Heading { level, .. }) => {
                    let spans = self.inlines(TagEnd::Heading(level));
                    blocks.push(ParsedBlock::Heading {
                        level: level as u8,
                        spans,
                    });
                }
                Event::Start(Tag::Paragraph) => {
                    let spans = self.inlines(TagEnd::Paragraph);
                    blocks.push(paragraph_or_image(spans));
                }
                Event::Start(Tag::CodeBlock(kind)) => blocks.push(self.code_block(kind)),
                Event::Start(Tag::List(start)) => blocks.push(self.list(start)),
                Event::Start(Tag::BlockQuote(kind)) => {
                    let content = self.blocks_until(Some(TagEnd::BlockQuote(kind)));
                    blocks.push(ParsedBlock::BlockQuote { content });
                }
                Event::Start(Tag::Table(alignments)) => blocks.push(self.table(&alignments)),
                Event::Start(Tag::HtmlBlock) => {
                    let spans = self.inlines(TagEnd::HtmlBlock);
                    if !spans.is_empty() {
                        blocks.push(ParsedBlock::Paragraph { spans });
                    }
                }
                Event::Rule => blocks.push(ParsedBlock::HorizontalRule),
                _ => {}
            }
        }

        blocks
    }

    /// Collect inline content until `end`
    fn inlines(&mut self, end: TagEnd) -> Vec<InlineSpan> {
        let mut builder = InlineBuilder::default();
        while let Some(event) = self.events.next() {
            if event == Event::End(end) {
                break;
            }
            builder.push(&event);
        }
        builder.finish()
    }

    fn code_block(&mut self, kind: CodeBlockKind<'_>) -> ParsedBlock {
        let lang = match kind {
            CodeBlockKind::Fenced(lang) if !lang.is_empty() => Some(lang.to_string()),
            _ => None,
        };

        let mut code = String::new();
        while let Some(event) = self.events.next() {
            match event {
                Event::Text(text) => code.push_str(&text),
                Event::End(TagEnd::CodeBlock) => break,
                _ => {}
            }
        }
        if code.ends_with('\n') {
            code.pop();
        }

        ParsedBlock::CodeBlock { lang, code }
    }

    fn list(&mut self, start: Option<u64>) -> ParsedBlock {
        let mut items = Vec::new();
        while let Some(event) = self.events.next() {
            match event {
                Event::Start(Tag::Item) => items.push(self.item()),
                Event::End(TagEnd::List(_)) => break,
                _ => {}
            }
        }

        ParsedBlock::List {
            items,
            ordered: start.is_some(),
            start,
        }
    }

    fn item(&mut self) -> ListItem {
        let mut inline = InlineBuilder::default();
        let mut checkbox = None;
        let mut children = Vec::new();

        while let Some(event) = self.events.next() {
            match event {
                Event::End(TagEnd::Item) => break,
                Event::TaskListMarker(checked) => checkbox = Some(checked),
                // Loose lists wrap item text in paragraphs
                Event::Start(Tag::Paragraph) => {
                    if !inline.is_empty() {
                        inline.text(" ", false);
                    }
                }
                Event::End(TagEnd::Paragraph) => {}
                Event::Start(Tag::List(start)) => children.push(self.list(start)),
                Event::Start(Tag::CodeBlock(kind)) => children.push(self.code_block(kind)),
                Event::Start(Tag::BlockQuote(kind)) => {
                    let content = self.blocks_until(Some(TagEnd::BlockQuote(kind)));
                    children.push(ParsedBlock::BlockQuote { content });
                }
                other => {
                    inline.push(&other);
                }
            }
        }

        ListItem {
            spans: inline.finish(),
            checkbox,
            children,
        }
    }

    fn table(&mut self, alignments: &[Alignment]) -> ParsedBlock {
        let mut headers = Vec::new();
        let mut rows = Vec::new();
        let mut row: Vec<TableCell> = Vec::new();

        while let Some(event) = self.events.next() {
            match event {
                Event::Start(Tag::TableHead) | Event::Start(Tag::TableRow) => row.clear(),
                Event::Start(Tag::TableCell) => {
                    let alignment = alignments
                        .get(row.len())
                        .copied()
                        .map(TableAlignment::from)
                        .unwrap_or_default();
                    let spans = self.inlines(TagEnd::TableCell);
                    row.push(TableCell { spans, alignment });
                }
                Event::End(TagEnd::TableHead) => headers = std::mem::take(&mut row),
                Event::End(TagEnd::TableRow) => rows.push(std::mem::take(&mut row)),
                Event::End(TagEnd::Table) => break,
                _ => {}
            }
        }

        ParsedBlock::Table { headers, rows }
    }
}

fn paragraph_or_image(mut spans: Vec<InlineSpan>) -> ParsedBlock {
    if spans.len() == 1 && spans[0].image.is_some() {
        let span = spans.remove(0);
        return ParsedBlock::Image {
            alt: span.text,
            url: span.image.unwrap_or_default(),
        };
    }
    ParsedBlock::Paragraph { spans }
}
