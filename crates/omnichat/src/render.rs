//! Projects transcript messages into styled terminal lines.
//!
//! User messages are shown literally. Model messages are parsed as Markdown
//! on every call, so a message that is still streaming (with unterminated
//! fences, half-written tables and so on) renders as well as it can.

use omnichat_core::{Message, Role};
use owo_colors::{OwoColorize, Style};
use pulldown_cmark::{
    CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd,
};
use unicode_width::UnicodeWidthStr;

const RULE_WIDTH: usize = 40;
const QUOTE_BAR: &str = "│ ";
const STREAMING_MARKER: &str = "●";

/// Foreground colors used by the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    /// Model headers and headings.
    Cyan,
    /// User headers.
    Green,
    /// Code.
    Yellow,
    /// List and task markers.
    Magenta,
    /// Links.
    Blue,
}

/// How a span should look. The default is unstyled text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpanStyle {
    /// Bold weight.
    pub bold: bool,
    /// Italic slant.
    pub italic: bool,
    /// Struck through.
    pub strikethrough: bool,
    /// Underlined.
    pub underline: bool,
    /// Faint.
    pub dimmed: bool,
    /// Foreground color.
    pub color: Option<Color>,
}

impl SpanStyle {
    const CODE: Self = Self::colored(Color::Yellow);
    const MARKER: Self = Self::colored(Color::Magenta);
    const FAINT: Self = Self {
        dimmed: true,
        ..Self::PLAIN
    };
    const PLAIN: Self = Self {
        bold: false,
        italic: false,
        strikethrough: false,
        underline: false,
        dimmed: false,
        color: None,
    };

    const fn colored(color: Color) -> Self {
        Self {
            color: Some(color),
            ..Self::PLAIN
        }
    }

    fn to_owo(self) -> Style {
        let mut style = Style::new();
        if self.bold {
            style = style.bold();
        }
        if self.italic {
            style = style.italic();
        }
        if self.strikethrough {
            style = style.strikethrough();
        }
        if self.underline {
            style = style.underline();
        }
        if self.dimmed {
            style = style.dimmed();
        }
        match self.color {
            Some(Color::Cyan) => style.cyan(),
            Some(Color::Green) => style.green(),
            Some(Color::Yellow) => style.yellow(),
            Some(Color::Magenta) => style.magenta(),
            Some(Color::Blue) => style.blue(),
            None => style,
        }
    }
}

/// A run of text sharing one style.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyledSpan {
    /// The text, without any escape sequences.
    pub text: String,
    /// How the text looks.
    pub style: SpanStyle,
}

impl StyledSpan {
    fn new(text: impl Into<String>, style: SpanStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

/// One terminal line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StyledLine {
    /// The spans of this line, left to right.
    pub spans: Vec<StyledSpan>,
}

impl StyledLine {
    /// Returns the text of this line without styling.
    pub fn plain_text(&self) -> String {
        self.spans.iter().map(|span| span.text.as_str()).collect()
    }

    /// Returns the number of terminal columns this line occupies.
    pub fn width(&self) -> usize {
        self.spans.iter().map(|span| span.text.width()).sum()
    }

    /// Returns this line with ANSI styling, or as plain text if `color` is
    /// off.
    pub fn paint(&self, color: bool) -> String {
        if !color {
            return self.plain_text();
        }
        let mut painted = String::new();
        for span in &self.spans {
            if span.style == SpanStyle::default() {
                painted.push_str(&span.text);
            } else {
                painted.push_str(&span.text.style(span.style.to_owo()).to_string());
            }
        }
        painted
    }
}

/// Renders messages with or without color.
#[derive(Clone, Copy, Debug)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    /// Creates a renderer.
    #[inline]
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Returns whether output is styled.
    #[inline]
    pub fn color(&self) -> bool {
        self.color
    }

    /// Returns the header and the body of a message.
    pub fn lines(&self, msg: &Message) -> Vec<StyledLine> {
        let mut lines = vec![header(msg)];
        lines.extend(body(msg));
        lines
    }

    /// Returns the painted lines of a message, one string per line.
    pub fn paint(&self, msg: &Message) -> Vec<String> {
        self.lines(msg)
            .iter()
            .map(|line| line.paint(self.color))
            .collect()
    }
}

/// Returns the header line of a message: who wrote it, when, and whether it
/// is still arriving.
pub fn header(msg: &Message) -> StyledLine {
    let (label, color) = match msg.role() {
        Role::User => ("You", Color::Green),
        Role::Model => ("OmniChat", Color::Cyan),
    };
    let mut spans = vec![
        StyledSpan::new(
            label,
            SpanStyle {
                bold: true,
                ..SpanStyle::colored(color)
            },
        ),
        StyledSpan::new(
            format!(" · {}", msg.created_at().format("%H:%M")),
            SpanStyle::FAINT,
        ),
    ];
    if msg.is_streaming() {
        spans.push(StyledSpan::new(
            format!(" {STREAMING_MARKER}"),
            SpanStyle::colored(color),
        ));
    }
    StyledLine { spans }
}

/// Returns the body lines of a message.
pub fn body(msg: &Message) -> Vec<StyledLine> {
    match msg.role() {
        Role::User => render_literal(msg.text()),
        Role::Model => render_markdown(msg.text()),
    }
}

/// Renders text as is, one line per `\n`-separated segment.
pub fn render_literal(text: &str) -> Vec<StyledLine> {
    text.split('\n')
        .map(|segment| StyledLine {
            spans: vec![StyledSpan::new(segment, SpanStyle::default())],
        })
        .collect()
}

/// Renders Markdown text.
pub fn render_markdown(text: &str) -> Vec<StyledLine> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    let mut writer = MarkdownWriter::default();
    for event in Parser::new_ext(text, options) {
        writer.handle(event);
    }
    writer.finish()
}

struct ListState {
    next_number: Option<u64>,
    // Width of the current item marker, used to indent continuation lines.
    indent: usize,
}

struct CodeBlock {
    language: String,
    text: String,
}

#[derive(Default)]
struct Table {
    rows: Vec<Vec<String>>,
    has_header: bool,
}

impl Table {
    fn push_text(&mut self, text: &str) {
        if let Some(cell) = self.rows.last_mut().and_then(|row| row.last_mut()) {
            cell.push_str(text);
        }
    }

    fn into_lines(self) -> Vec<StyledLine> {
        let columns = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut widths = vec![0; columns];
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.width());
            }
        }

        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        for (idx, row) in self.rows.iter().enumerate() {
            let is_header = self.has_header && idx == 0;
            let style = SpanStyle {
                bold: is_header,
                ..SpanStyle::default()
            };
            let mut spans = Vec::new();
            for (col, width) in widths.iter().enumerate() {
                if col > 0 {
                    spans.push(StyledSpan::new(" │ ", SpanStyle::FAINT));
                }
                let cell = row.get(col).map(String::as_str).unwrap_or("");
                let padding = " ".repeat(width - cell.width());
                spans.push(StyledSpan::new(format!("{cell}{padding}"), style));
            }
            lines.push(StyledLine { spans });

            if is_header {
                let separator = widths
                    .iter()
                    .map(|width| "─".repeat(*width))
                    .collect::<Vec<_>>()
                    .join("─┼─");
                lines.push(StyledLine {
                    spans: vec![StyledSpan::new(separator, SpanStyle::FAINT)],
                });
            }
        }
        lines
    }
}

#[derive(Default)]
struct MarkdownWriter {
    lines: Vec<StyledLine>,
    current: Vec<StyledSpan>,
    style_stack: Vec<SpanStyle>,
    list_stack: Vec<ListState>,
    pending_marker: Option<String>,
    quote_depth: usize,
    link_targets: Vec<String>,
    code_block: Option<CodeBlock>,
    table: Option<Table>,
}

impl MarkdownWriter {
    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag_end) => self.end(tag_end),
            Event::Text(text) => {
                if let Some(code_block) = &mut self.code_block {
                    code_block.text.push_str(&text);
                } else {
                    self.push_text(&text, self.current_style());
                }
            }
            Event::Code(code) => self.push_text(&code, SpanStyle::CODE),
            Event::InlineMath(math) | Event::DisplayMath(math) => {
                self.push_text(&math, SpanStyle::CODE)
            }
            // Raw HTML is shown, not interpreted.
            Event::Html(html) | Event::InlineHtml(html) => {
                for (idx, line) in html.lines().enumerate() {
                    if idx > 0 {
                        self.flush_line();
                    }
                    self.push_text(line, SpanStyle::FAINT);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some(table) = &mut self.table {
                    table.push_text(" ");
                } else {
                    self.flush_line();
                }
            }
            Event::Rule => {
                self.flush_line();
                self.push_text(&"─".repeat(RULE_WIDTH), SpanStyle::FAINT);
                self.flush_line();
                self.push_blank_line();
            }
            Event::TaskListMarker(checked) => {
                let marker = if checked { "[x] " } else { "[ ] " };
                self.push_text(marker, SpanStyle::MARKER);
            }
            Event::FootnoteReference(label) => {
                self.push_text(&format!("[^{label}]"), SpanStyle::FAINT);
            }
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush_line();
                let style = SpanStyle {
                    bold: true,
                    underline: level == HeadingLevel::H1,
                    ..SpanStyle::colored(Color::Cyan)
                };
                self.style_stack.push(style);
            }
            Tag::BlockQuote(_) => {
                self.flush_line();
                self.quote_depth += 1;
                self.style_stack.push(SpanStyle {
                    italic: true,
                    ..self.current_style()
                });
            }
            Tag::CodeBlock(kind) => {
                self.flush_line();
                let language = match kind {
                    CodeBlockKind::Indented => String::new(),
                    CodeBlockKind::Fenced(info) => info
                        .split_ascii_whitespace()
                        .next()
                        .unwrap_or("")
                        .to_owned(),
                };
                self.code_block = Some(CodeBlock {
                    language,
                    text: String::new(),
                });
            }
            Tag::List(start) => {
                self.flush_line();
                self.list_stack.push(ListState {
                    next_number: start,
                    indent: 0,
                });
            }
            Tag::Item => {
                self.flush_line();
                let parent_indent = self.list_indent();
                let Some(list) = self.list_stack.last_mut() else {
                    return;
                };
                let marker = match &mut list.next_number {
                    Some(n) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    None => "• ".to_owned(),
                };
                list.indent = marker.width();
                self.pending_marker =
                    Some(format!("{}{marker}", " ".repeat(parent_indent)));
            }
            Tag::Emphasis => self.push_style(|style| style.italic = true),
            Tag::Strong => self.push_style(|style| style.bold = true),
            Tag::Strikethrough => {
                self.push_style(|style| style.strikethrough = true)
            }
            Tag::Link { dest_url, .. } | Tag::Image { dest_url, .. } => {
                self.link_targets.push(dest_url.into_string());
                self.push_style(|style| {
                    style.underline = true;
                    style.color = Some(Color::Blue);
                });
            }
            Tag::Table(_) => {
                self.flush_line();
                self.table = Some(Table::default());
            }
            Tag::TableHead => {
                if let Some(table) = &mut self.table {
                    table.has_header = true;
                    table.rows.push(Vec::new());
                }
            }
            Tag::TableRow => {
                if let Some(table) = &mut self.table {
                    table.rows.push(Vec::new());
                }
            }
            Tag::TableCell => {
                if let Some(row) =
                    self.table.as_mut().and_then(|table| table.rows.last_mut())
                {
                    row.push(String::new());
                }
            }
            _ => {}
        }
    }

    fn end(&mut self, tag_end: TagEnd) {
        match tag_end {
            TagEnd::Paragraph => {
                self.flush_line();
                if self.list_stack.is_empty() {
                    self.push_blank_line();
                }
            }
            TagEnd::Heading(_) => {
                self.flush_line();
                self.style_stack.pop();
                self.push_blank_line();
            }
            TagEnd::BlockQuote(_) => {
                self.flush_line();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.style_stack.pop();
            }
            TagEnd::CodeBlock => self.finish_code_block(),
            TagEnd::List(_) => {
                self.flush_line();
                self.list_stack.pop();
                if self.list_stack.is_empty() {
                    self.push_blank_line();
                }
            }
            TagEnd::Item => {
                self.flush_line();
                self.pending_marker = None;
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                self.style_stack.pop();
            }
            TagEnd::Link | TagEnd::Image => {
                self.style_stack.pop();
                if let Some(target) = self.link_targets.pop() {
                    if !target.is_empty() {
                        self.push_text(&format!(" ({target})"), SpanStyle::FAINT);
                    }
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table.take() {
                    for line in table.into_lines() {
                        self.push_line(line.spans);
                    }
                    self.push_blank_line();
                }
            }
            _ => {}
        }
    }

    fn finish_code_block(&mut self) {
        let Some(code_block) = self.code_block.take() else {
            return;
        };
        if !code_block.language.is_empty() {
            self.push_text(&code_block.language, SpanStyle::FAINT);
            self.flush_line();
        }
        for line in code_block.text.lines() {
            self.push_text(&format!("  {line}"), SpanStyle::CODE);
            self.flush_line();
        }
        if self.list_stack.is_empty() {
            self.push_blank_line();
        }
    }

    #[inline]
    fn current_style(&self) -> SpanStyle {
        self.style_stack.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, f: impl FnOnce(&mut SpanStyle)) {
        let mut style = self.current_style();
        f(&mut style);
        self.style_stack.push(style);
    }

    fn list_indent(&self) -> usize {
        let outer = self.list_stack.len().saturating_sub(1);
        self.list_stack[..outer].iter().map(|list| list.indent).sum()
    }

    fn push_text(&mut self, text: &str, style: SpanStyle) {
        if let Some(table) = &mut self.table {
            table.push_text(text);
            return;
        }
        if text.is_empty() {
            return;
        }
        if self.current.is_empty() {
            self.push_prefix();
        }
        self.current.push(StyledSpan::new(text, style));
    }

    fn push_prefix(&mut self) {
        if self.quote_depth > 0 {
            self.current.push(StyledSpan::new(
                QUOTE_BAR.repeat(self.quote_depth),
                SpanStyle::FAINT,
            ));
        }
        if let Some(marker) = self.pending_marker.take() {
            self.current.push(StyledSpan::new(marker, SpanStyle::MARKER));
        } else if !self.list_stack.is_empty() {
            let indent: usize =
                self.list_stack.iter().map(|list| list.indent).sum();
            self.current
                .push(StyledSpan::new(" ".repeat(indent), SpanStyle::default()));
        }
    }

    fn flush_line(&mut self) {
        if !self.current.is_empty() {
            let spans = std::mem::take(&mut self.current);
            self.lines.push(StyledLine { spans });
        }
    }

    fn push_line(&mut self, mut spans: Vec<StyledSpan>) {
        self.flush_line();
        if self.quote_depth > 0 {
            spans.insert(
                0,
                StyledSpan::new(QUOTE_BAR.repeat(self.quote_depth), SpanStyle::FAINT),
            );
        }
        self.lines.push(StyledLine { spans });
    }

    fn push_blank_line(&mut self) {
        if self.lines.last().is_some_and(|line| !line.spans.is_empty()) {
            self.lines.push(StyledLine::default());
        }
    }

    fn finish(mut self) -> Vec<StyledLine> {
        // Blocks still open at the end of a partial message.
        self.finish_code_block();
        if let Some(table) = self.table.take() {
            for line in table.into_lines() {
                self.push_line(line.spans);
            }
        }
        self.flush_line();
        while self.lines.last().is_some_and(|line| line.spans.is_empty()) {
            self.lines.pop();
        }
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use omnichat_core::transcript::TranscriptStore;

    use super::*;

    fn plain(lines: &[StyledLine]) -> Vec<String> {
        lines.iter().map(StyledLine::plain_text).collect()
    }

    fn span<'a>(line: &'a StyledLine, text: &str) -> &'a StyledSpan {
        line.spans.iter().find(|span| span.text == text).unwrap()
    }

    #[test]
    fn test_literal_round_trip() {
        for text in ["Hello", "two\nlines", "trailing\n", "", "**not bold**"] {
            let lines = render_literal(text);
            assert_eq!(plain(&lines).join("\n"), text);
        }
        let lines = render_literal("# not a heading");
        assert_eq!(lines[0].spans[0].style, SpanStyle::default());
    }

    #[test]
    fn test_user_message_is_literal() {
        let mut store = TranscriptStore::new();
        let id = store.append(Role::User, "*a*\n\n- b");
        let msg = store.get(id).unwrap();

        let lines = body(msg);
        assert_eq!(plain(&lines), ["*a*", "", "- b"]);
        assert_eq!(plain(&lines).join("\n"), msg.text());
    }

    #[test]
    fn test_paragraphs_and_emphasis() {
        let lines = render_markdown("Some *soft* and **strong** ~~gone~~.\n\nNext");
        assert_eq!(plain(&lines), ["Some soft and strong gone.", "", "Next"]);

        let line = &lines[0];
        assert!(span(line, "soft").style.italic);
        assert!(span(line, "strong").style.bold);
        assert!(span(line, "gone").style.strikethrough);
        assert_eq!(span(line, "Some ").style, SpanStyle::default());
    }

    #[test]
    fn test_headings() {
        let lines = render_markdown("# Title\n## Section\ntext");
        assert_eq!(plain(&lines), ["Title", "", "Section", "", "text"]);
        assert!(lines[0].spans[0].style.underline);
        assert!(lines[2].spans[0].style.bold);
        assert!(!lines[2].spans[0].style.underline);
    }

    #[test]
    fn test_code() {
        let lines =
            render_markdown("Use `cargo`:\n\n```rust\nfn main() {}\n    ok\n```\n");
        assert_eq!(
            plain(&lines),
            ["Use cargo:", "", "rust", "  fn main() {}", "      ok"]
        );
        assert_eq!(span(&lines[0], "cargo").style, SpanStyle::CODE);
        assert_eq!(span(&lines[3], "  fn main() {}").style, SpanStyle::CODE);
    }

    #[test]
    fn test_unterminated_code_block() {
        let lines = render_markdown("```py\nprint(1)\nprint(");
        assert_eq!(plain(&lines), ["py", "  print(1)", "  print("]);
    }

    #[test]
    fn test_lists() {
        let lines = render_markdown("- one\n- two\n  - nested\n\n3. three\n4. four");
        assert_eq!(
            plain(&lines),
            ["• one", "• two", "  • nested", "", "3. three", "4. four"]
        );
        assert_eq!(lines[0].spans[0].style, SpanStyle::MARKER);
    }

    #[test]
    fn test_list_continuation() {
        let lines = render_markdown("1. first\n   more");
        assert_eq!(plain(&lines), ["1. first", "   more"]);
    }

    #[test]
    fn test_quote_and_rule() {
        let lines = render_markdown("> wise\n> words\n\n---\n\nafter");
        assert_eq!(
            plain(&lines),
            [
                "│ wise".to_owned(),
                "│ words".to_owned(),
                String::new(),
                "─".repeat(RULE_WIDTH),
                String::new(),
                "after".to_owned(),
            ]
        );
        assert!(span(&lines[0], "wise").style.italic);
        assert_eq!(span(&lines[0], QUOTE_BAR).style, SpanStyle::FAINT);
    }

    #[test]
    fn test_links() {
        let lines = render_markdown("See [docs](https://example.com).");
        assert_eq!(plain(&lines), ["See docs (https://example.com)."]);
        assert_eq!(span(&lines[0], "docs").style.color, Some(Color::Blue));
    }

    #[test]
    fn test_tables() {
        let lines = render_markdown("| a | long |\n|---|---|\n| xyz | 1 |\n");
        assert_eq!(
            plain(&lines),
            ["a   │ long", "────┼─────", "xyz │ 1   "]
        );
        assert!(span(&lines[0], "a  ").style.bold);
        assert!(!span(&lines[2], "xyz").style.bold);
    }

    #[test]
    fn test_partial_markdown_never_panics() {
        let text = "# Ti**tle\n\n| a | b\n|--\n- [x] done\n> ```\n[link](";
        for end in (0..=text.len()).filter(|idx| text.is_char_boundary(*idx)) {
            render_markdown(&text[..end]);
        }
    }

    #[test]
    fn test_header() {
        let mut store = TranscriptStore::new();
        let user = store.append(Role::User, "hi");
        let model = store.begin_streaming(Role::Model).unwrap();

        let msg = store.get(user).unwrap();
        let time = msg.created_at().format("%H:%M").to_string();
        assert_eq!(header(msg).plain_text(), format!("You · {time}"));

        let msg = store.get(model).unwrap();
        let time = msg.created_at().format("%H:%M").to_string();
        assert_eq!(header(msg).plain_text(), format!("OmniChat · {time} ●"));
        // Nothing has arrived yet.
        assert!(body(msg).is_empty());
    }

    #[test]
    fn test_paint() {
        let line = StyledLine {
            spans: vec![
                StyledSpan::new("plain ", SpanStyle::default()),
                StyledSpan::new("code", SpanStyle::CODE),
            ],
        };
        assert_eq!(line.paint(false), "plain code");
        let painted = line.paint(true);
        assert!(painted.starts_with("plain "));
        assert!(painted.contains("\u{1b}["));
        assert!(painted.contains("code"));
        assert_eq!(line.width(), 10);
    }
}
