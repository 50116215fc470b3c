use crate::color::{Ansi, ColorHistory, ColorResolver, ColorSet, TRANSPARENT};
use crate::terminal::{fill, rune_width, strip_ansi, Anchor, Formats, Shell, OSC51, OSC7};

struct TextStyle {
    anchor_start: &'static str,
    anchor_end: &'static str,
    start: &'static str,
    end: &'static str,
}

const KNOWN_STYLES: &[TextStyle] = &[
    TextStyle { anchor_start: "<b>", anchor_end: "</b>", start: "\x1b[1m", end: "\x1b[22m" },
    TextStyle { anchor_start: "<u>", anchor_end: "</u>", start: "\x1b[4m", end: "\x1b[24m" },
    TextStyle { anchor_start: "<o>", anchor_end: "</o>", start: "\x1b[53m", end: "\x1b[55m" },
    TextStyle { anchor_start: "<i>", anchor_end: "</i>", start: "\x1b[3m", end: "\x1b[23m" },
    TextStyle { anchor_start: "<s>", anchor_end: "</s>", start: "\x1b[9m", end: "\x1b[29m" },
    TextStyle { anchor_start: "<d>", anchor_end: "</d>", start: "\x1b[2m", end: "\x1b[22m" },
    TextStyle { anchor_start: "<f>", anchor_end: "</f>", start: "\x1b[5m", end: "\x1b[25m" },
    TextStyle { anchor_start: "<r>", anchor_end: "</r>", start: "\x1b[7m", end: "\x1b[27m" },
];

const RESET: &str = "\x1b[0m";
const RESET_ANCHOR: &str = "</>";
const BACKGROUND_END: &str = "\x1b[49m";
const TRANSPARENT_END: &str = "\x1b[27m";

const HYPERLINK_START: &str = "<LINK>";
const HYPERLINK_END: &str = "</LINK>";
const HYPERLINK_TEXT: &str = "<TEXT>";
const HYPERLINK_TEXT_END: &str = "</TEXT>";
const EMPTY_ANCHOR: &str = "<>";

fn colorise(code: &Ansi) -> String {
    format!("\x1b[{}m", code)
}

fn transparent_start(code: &Ansi) -> String {
    format!("\x1b[0m\x1b[{};49m\x1b[7m", code)
}

/// Turns marked up segment text into shell-safe ANSI output.
///
/// One writer belongs to one prompt render and is only driven from the
/// dispatcher; the accumulated output is collected with [`Writer::string`].
pub struct Writer {
    resolver: ColorResolver,
    formats: Formats,
    shell: Shell,

    /// Color of the terminal itself, used to punch transparent foregrounds.
    pub terminal_background: Option<String>,
    pub plain: bool,
    /// The shell expands the text itself, so plain text is not escaped.
    pub interactive: bool,

    current_colors: Option<ColorSet>,
    parent_colors: Vec<Option<ColorSet>>,

    background_color: Ansi,
    foreground_color: Ansi,
    history: ColorHistory,

    builder: String,
    length: usize,

    is_transparent: bool,
    is_invisible: bool,
    is_hyperlink: bool,
    wrote_escape: bool,
}

impl Writer {
    pub fn new(shell: Shell, resolver: ColorResolver) -> Self {
        Self {
            resolver,
            formats: Formats::for_shell(shell),
            shell,
            terminal_background: None,
            plain: false,
            interactive: false,
            current_colors: None,
            parent_colors: Vec::new(),
            background_color: Ansi::empty(),
            foreground_color: Ansi::empty(),
            history: ColorHistory::default(),
            builder: String::new(),
            length: 0,
            is_transparent: false,
            is_invisible: false,
            is_hyperlink: false,
            wrote_escape: false,
        }
    }

    pub fn shell(&self) -> Shell {
        self.shell
    }

    pub fn formats(&self) -> &Formats {
        &self.formats
    }

    pub fn resolver(&self) -> &ColorResolver {
        &self.resolver
    }

    /// The pair `background` / `foreground` keywords resolve against.
    pub fn set_colors(&mut self, background: &str, foreground: &str) {
        self.current_colors = Some(ColorSet::new(background, foreground));
    }

    pub fn current_colors(&self) -> Option<&ColorSet> {
        self.current_colors.as_ref()
    }

    /// Push the previously rendered segment's pair; the newest parent comes first.
    pub fn set_parent_colors(&mut self, background: &str, foreground: &str) {
        self.parent_colors
            .insert(0, Some(ColorSet::new(background, foreground)));
    }

    pub fn reset_colors(&mut self) {
        self.current_colors = None;
        self.parent_colors.clear();
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.builder.is_empty()
    }

    /// Take the accumulated output and its display width, resetting the writer.
    pub fn string(&mut self) -> (String, usize) {
        let text = std::mem::take(&mut self.builder);
        let length = std::mem::take(&mut self.length);

        self.is_transparent = false;
        self.is_invisible = false;
        self.is_hyperlink = false;
        self.history.clear();

        (text, length)
    }

    /// Write `text` using the `background` / `foreground` color expressions.
    /// Empty expressions fall back to the current segment's pair.
    pub fn write(&mut self, background: &str, foreground: &str, text: &str) {
        if text.is_empty() {
            return;
        }

        self.wrote_escape = false;

        let (bg, fg) = self.as_ansi_colors(background, foreground);
        self.background_color = bg;
        self.foreground_color = if fg.is_empty() {
            self.resolver.colors().to_ansi("white", false)
        } else {
            fg
        };

        let mut pos = 0;

        if let Some(anchor) = Anchor::parse(text) {
            if let Some(style) = KNOWN_STYLES.iter().find(|s| s.anchor_start == anchor.text) {
                self.write_escaped(style.start);
                pos = anchor.len();
            } else if self.is_color_override(&anchor) {
                let (bg, fg) = self.as_ansi_colors(
                    anchor.background.unwrap_or_default(),
                    anchor.foreground.unwrap_or_default(),
                );
                self.history.push(bg, fg);
                pos = anchor.len();
            }
        }

        self.write_segment_colors();

        let mut hyperlink_text_position = None;

        while pos < text.len() {
            let rest = &text[pos..];
            let Some(c) = rest.chars().next() else {
                break;
            };

            if c != '<' {
                self.write_char(c);
                pos += c.len_utf8();
                continue;
            }

            let Some(anchor) = Anchor::parse(rest) else {
                self.write_char(c);
                pos += 1;
                continue;
            };

            let end = pos + anchor.len();

            match anchor.text {
                HYPERLINK_START => {
                    self.is_hyperlink = true;
                    if self.hyperlinks_enabled() {
                        self.builder.push_str(self.formats.hyperlink_start);
                    }
                }
                HYPERLINK_TEXT => {
                    self.is_hyperlink = false;
                    hyperlink_text_position = Some(end);
                    if self.hyperlinks_enabled() {
                        self.builder.push_str(self.formats.hyperlink_center);
                    }
                }
                HYPERLINK_TEXT_END => {
                    if hyperlink_text_position == Some(pos) {
                        self.builder.push_str("link");
                        self.length += 4;
                    }
                }
                HYPERLINK_END => {
                    if self.hyperlinks_enabled() {
                        self.builder.push_str(self.formats.hyperlink_end);
                    }
                }
                EMPTY_ANCHOR => {}
                _ => {
                    if !self.write_anchor_override(&anchor, background, end == text.len()) {
                        self.write_char(c);
                        pos += 1;
                        continue;
                    }
                }
            }

            pos = end;
        }

        if self.wrote_escape {
            self.write_escaped(RESET);
        }

        // Unclosed overrides end with the text.
        self.history.clear();
    }

    fn hyperlinks_enabled(&self) -> bool {
        !self.plain && self.formats.supports_hyperlinks()
    }

    /// An anchor is a color override when at least one of its explicit colors resolves.
    fn is_color_override(&self, anchor: &Anchor<'_>) -> bool {
        if anchor.text == RESET_ANCHOR || anchor.text == EMPTY_ANCHOR {
            return false;
        }

        let current = self.current_colors.as_ref();
        let given = [(anchor.foreground, false), (anchor.background, true)];

        given.iter().any(|(expression, is_background)| match expression {
            Some(expression) => !self
                .resolver
                .resolve(expression, current, &self.parent_colors, *is_background)
                .is_empty(),
            None => false,
        })
    }

    fn write_escaped(&mut self, code: &str) {
        if self.plain {
            return;
        }

        self.wrote_escape = true;
        self.builder.push_str(&fill(self.formats.escape, &[&code]));
    }

    fn write_char(&mut self, c: char) {
        if self.is_hyperlink {
            if self.hyperlinks_enabled() {
                self.builder.push(c);
            }
            return;
        }

        let width = rune_width(c);
        self.length += width;

        // Invisible text keeps its columns so aligned content does not shift.
        if self.is_invisible {
            self.builder.extend(std::iter::repeat(' ').take(width));
            return;
        }

        if !self.interactive && !self.plain {
            if let Some(escaped) = self.formats.escape_char(c) {
                self.builder.push_str(escaped);
                return;
            }
        }

        self.builder.push(c);
    }

    fn terminal_background_ansi(&self) -> Option<Ansi> {
        let background = self.terminal_background.as_deref()?;
        let ansi = self.resolver.colors().to_ansi(background, false);
        (!ansi.is_clear()).then_some(ansi)
    }

    fn write_segment_colors(&mut self) {
        let mut bg = self.background_color.clone();
        let mut fg = self.foreground_color.clone();

        if !self.history.background().is_empty() {
            bg = self.history.background();
        }
        if !self.history.foreground().is_empty() {
            fg = self.history.foreground();
        }

        self.is_invisible = fg.is_transparent() && bg.is_transparent();
        if self.is_invisible {
            return;
        }

        if fg.is_transparent() {
            if let Some(terminal) = self.terminal_background_ansi() {
                self.write_escaped(&colorise(&terminal));
                self.write_escaped(&colorise(&bg.to_background()));
            } else if !bg.is_empty() {
                self.is_transparent = true;
                self.write_escaped(&transparent_start(&bg));
            }
        } else {
            if !bg.is_clear() {
                self.write_escaped(&colorise(&bg));
            }
            if !fg.is_clear() {
                self.write_escaped(&colorise(&fg));
            }
        }

        self.history.push(bg, fg);
    }

    /// Handle a reset, style or color anchor. Returns `false` when the anchor
    /// is not markup and has to be written as text.
    fn write_anchor_override(&mut self, anchor: &Anchor<'_>, background: &str, at_end: bool) -> bool {
        if anchor.text == RESET_ANCHOR {
            self.end_color_override(at_end);
            return true;
        }

        for style in KNOWN_STYLES {
            if style.anchor_end == anchor.text {
                self.write_escaped(style.end);
                return true;
            }
            if style.anchor_start == anchor.text {
                self.write_escaped(style.start);
                return true;
            }
        }

        if anchor.is_empty() {
            return true;
        }

        if !self.is_color_override(anchor) {
            return false;
        }

        let foreground = anchor.foreground.unwrap_or_default();
        let mut background_expression = anchor.background.unwrap_or_default();
        if foreground == TRANSPARENT && background_expression.is_empty() {
            background_expression = background;
        }

        let (mut bg, mut fg) = self.as_ansi_colors(background_expression, foreground);

        self.is_invisible = fg.is_transparent() && bg.is_transparent();
        if self.is_invisible {
            return true;
        }

        if fg.is_empty() {
            fg = self.foreground_color.clone();
        }
        if bg.is_empty() {
            bg = self.background_color.clone();
        }

        let previous_bg = self.visible_background();
        let previous_fg = self.visible_foreground();

        self.history.push(bg, fg);

        let top_bg = self.history.background();
        let top_fg = self.history.foreground();

        if top_fg.is_transparent() {
            if let Some(terminal) = self.terminal_background_ansi() {
                self.write_escaped(&colorise(&terminal));
                self.write_escaped(&colorise(&top_bg.to_background()));
                return true;
            }

            if !top_bg.is_transparent() {
                self.is_transparent = true;
                self.write_escaped(&transparent_start(&top_bg));
                return true;
            }
        }

        if top_bg != previous_bg {
            if top_bg.is_clear() {
                self.write_escaped(BACKGROUND_END);
            } else {
                self.write_escaped(&colorise(&top_bg));
            }
        }

        if top_fg != previous_fg && !top_fg.is_clear() {
            self.write_escaped(&colorise(&top_fg));
        }

        true
    }

    fn visible_background(&self) -> Ansi {
        if self.history.is_empty() {
            self.background_color.clone()
        } else {
            self.history.background()
        }
    }

    fn visible_foreground(&self) -> Ansi {
        if self.history.is_empty() {
            self.foreground_color.clone()
        } else {
            self.history.foreground()
        }
    }

    fn end_color_override(&mut self, at_end: bool) {
        self.is_invisible =
            self.background_color.is_transparent() && self.foreground_color.is_transparent();

        // The trailing reset covers an override that closes the text.
        if at_end {
            self.history.pop();
            return;
        }

        if self.history.len() > 1 {
            let bg = self.history.background();
            let fg = self.history.foreground();

            self.history.pop();

            let previous_bg = self.history.background();
            let previous_fg = self.history.foreground();
            let was_transparent = std::mem::take(&mut self.is_transparent);

            if was_transparent {
                self.write_escaped(TRANSPARENT_END);
            }

            if previous_bg != bg || was_transparent {
                if previous_bg.is_clear() {
                    self.write_escaped(BACKGROUND_END);
                } else {
                    self.write_escaped(&colorise(&previous_bg));
                }
            }

            if (previous_fg != fg || was_transparent) && !previous_fg.is_clear() {
                self.write_escaped(&colorise(&previous_fg));
            }

            return;
        }

        let top_bg = self.history.background();
        let top_fg = self.history.foreground();
        self.history.pop();

        if top_bg == self.background_color && top_fg == self.foreground_color {
            return;
        }

        if self.is_transparent {
            self.write_escaped(TRANSPARENT_END);
        }

        if self.background_color.is_clear() {
            self.write_escaped(BACKGROUND_END);
        }

        if top_bg != self.background_color && !self.background_color.is_clear() {
            let code = colorise(&self.background_color);
            self.write_escaped(&code);
        }

        if (top_fg != self.foreground_color || self.is_transparent) && !self.foreground_color.is_clear() {
            let code = colorise(&self.foreground_color);
            self.write_escaped(&code);
        }

        self.is_transparent = false;
    }

    fn as_ansi_colors(&self, background: &str, foreground: &str) -> (Ansi, Ansi) {
        self.resolver.resolve_pair(
            background,
            foreground,
            self.current_colors.as_ref(),
            &self.parent_colors,
        )
    }

    pub fn change_line(&self, lines: i32) -> String {
        if self.plain {
            return String::new();
        }

        let position = if lines < 0 { "F" } else { "B" };
        fill(self.formats.linechange, &[&lines.abs(), &position])
    }

    /// Report the working directory to the terminal (`osc99`, `osc7` or `osc51`).
    pub fn pwd(&self, kind: &str, user: &str, host: &str, path: &str) -> String {
        if self.plain || !self.shell.supports_escapes() {
            return String::new();
        }

        match kind {
            OSC7 => fill(self.formats.osc7, &[&host, &path]),
            OSC51 => fill(self.formats.osc51, &[&user, &host, &path]),
            _ => fill(self.formats.osc99, &[&path]),
        }
    }

    pub fn clear_after(&self) -> String {
        if self.plain {
            return String::new();
        }

        format!("{}{}", self.formats.clear_line, self.formats.clear_below)
    }

    pub fn format_title(&self, title: &str) -> String {
        if !self.shell.supports_escapes() {
            return String::new();
        }

        let title = strip_ansi(title);

        match self.shell {
            Shell::Bash | Shell::Zsh => {
                let mut escaped = String::with_capacity(title.len());
                for c in title.chars() {
                    match self.formats.escape_char(c) {
                        Some(sequence) => escaped.push_str(sequence),
                        None => escaped.push(c),
                    }
                }
                fill(self.formats.title, &[&escaped])
            }
            _ => fill(self.formats.title, &[&title]),
        }
    }

    pub fn escape_text(&self, text: &str) -> String {
        fill(self.formats.escape, &[&text])
    }

    pub fn save_cursor_position(&self) -> &'static str {
        self.formats.save_cursor_position
    }

    pub fn restore_cursor_position(&self) -> &'static str {
        self.formats.restore_cursor_position
    }

    pub fn prompt_start(&self) -> String {
        self.escape_text("\x1b]133;A\x07")
    }

    pub fn command_start(&self) -> String {
        self.escape_text("\x1b]133;B\x07")
    }

    pub fn command_finished(&self, code: i32, ignore: bool) -> String {
        if ignore {
            return self.escape_text("\x1b]133;D\x07");
        }

        self.escape_text(&format!("\x1b]133;D;{}\x07", code))
    }

    /// Carriage return plus line feed for terminals that drop literal newlines.
    pub fn line_break(&self) -> String {
        let cr = fill(self.formats.left, &[&1000]);
        let lf = fill(self.formats.linechange, &[&1, &"B"]);
        format!("{}{}", cr, lf)
    }
}
