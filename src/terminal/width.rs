use regex::Regex;
use std::sync::LazyLock;
use unicode_width::UnicodeWidthChar;

use crate::terminal::ANCHOR_REGEX;

const ANSI_PATTERN: &str = "[\u{1b}\u{9b}][\\[\\]()#;?]*(?:(?:(?:[a-zA-Z\\d]*(?:;[a-zA-Z\\d]*)*)?\u{07})|(?:(?:\\d{1,4}(?:;\\d{0,4})*)?[\\dA-PRZcf-ntqry=><~]))";

static ANSI_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ANSI_PATTERN).expect("valid regex"));

// Operating system commands (titles, hyperlinks, cwd reporting) carry free text.
static OSC_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\u{1b}\\][^\u{7}\u{1b}]*(?:\u{7}|\u{1b}\\\\)").expect("valid regex"));

fn is_private_use(c: char) -> bool {
    matches!(
        u32::from(c),
        0xE000..=0xF8FF | 0xF_0000..=0xF_FFFD | 0x10_0000..=0x10_FFFD
    )
}

/// Display width of a single character. Icon fonts live in the private use
/// areas and render two columns wide.
pub fn rune_width(c: char) -> usize {
    if is_private_use(c) {
        return 2;
    }

    c.width().unwrap_or(0)
}

pub fn str_width(text: &str) -> usize {
    text.chars().map(rune_width).sum()
}

/// Remove ANSI escape sequences (SGR, OSC 8 hyperlinks, titles).
pub fn strip_ansi(text: &str) -> String {
    if !text.contains('\u{1b}') && !text.contains('\u{9b}') {
        return text.to_string();
    }

    let without_osc = OSC_REGEX.replace_all(text, "");
    ANSI_REGEX.replace_all(&without_osc, "").into_owned()
}

/// Cut markup down to at most `columns` visible columns while keeping every
/// anchor intact, so the result still renders with the original colors.
pub fn truncate_markup(text: &str, columns: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut width = 0;
    let mut pos = 0;
    let mut full = false;

    while pos < text.len() {
        let rest = &text[pos..];

        if rest.starts_with('<') {
            if let Some(anchor) = ANCHOR_REGEX.find(rest) {
                out.push_str(anchor.as_str());
                pos += anchor.end();
                continue;
            }
        }

        let Some(c) = rest.chars().next() else {
            break;
        };

        pos += c.len_utf8();

        // Past the budget only anchors are copied.
        let w = rune_width(c);
        if full || width + w > columns {
            full = true;
            continue;
        }

        width += w;
        out.push(c);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rune_width() {
        assert_eq!(rune_width('a'), 1);
        assert_eq!(rune_width('\u{e0b0}'), 2);
        assert_eq!(rune_width('\u{f0001}'), 2);
        assert_eq!(rune_width('漢'), 2);
        assert_eq!(rune_width('\u{7}'), 0);
        assert_eq!(str_width("ab\u{e725}"), 4);
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[48;2;1;2;3m\x1b[37mhello\x1b[0m"), "hello");
        assert_eq!(strip_ansi("\x1b]8;;https://x.dev\x1b\\label\x1b]8;;\x1b\\"), "label");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn test_truncate_markup_keeps_anchors() {
        assert_eq!(truncate_markup("<red>abc</>", 2), "<red>ab</>");
        assert_eq!(truncate_markup("a\u{e0b0}b", 2), "a");
        assert_eq!(truncate_markup("abc", 0), "");
        assert_eq!(truncate_markup("<red>a<b>bc</b></>d", 1), "<red>a<b></b></>");
    }
}
