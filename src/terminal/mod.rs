pub mod formats;
pub mod width;
pub mod writer;

pub use formats::*;
pub use width::*;
pub use writer::*;

use regex::Regex;
use std::sync::LazyLock;

/// Inline markup: `<fg>`, `<,bg>`, `<fg,bg>`, `</>`, `<b>`, `<LINK>`, ...
pub static ANCHOR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<ANCHOR><(?P<FG>[^,<>]+)?,?(?P<BG>[^<>]+)?>)").expect("valid regex")
});

pub const OSC99: &str = "osc99";
pub const OSC7: &str = "osc7";
pub const OSC51: &str = "osc51";

/// One inline anchor found at the start of a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor<'t> {
    pub text: &'t str,
    pub foreground: Option<&'t str>,
    pub background: Option<&'t str>,
}

impl<'t> Anchor<'t> {
    pub fn parse(text: &'t str) -> Option<Self> {
        let captures = ANCHOR_REGEX.captures(text)?;
        let anchor = captures.name("ANCHOR")?;

        Some(Self {
            text: anchor.as_str(),
            foreground: captures.name("FG").map(|m| m.as_str()),
            background: captures.name("BG").map(|m| m.as_str()),
        })
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.foreground.is_none() && self.background.is_none()
    }
}

/// Quote a string for a POSIX shell assignment.
pub fn quote_posix(text: &str) -> String {
    if text.is_empty() {
        return "''".to_string();
    }

    format!("'{}'", text.replace('\'', r"'\''"))
}
