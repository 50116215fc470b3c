pub mod ansi;
pub mod cycle;
pub mod palette;
pub mod resolver;

pub use ansi::*;
pub use cycle::*;
pub use palette::*;
pub use resolver::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Keyword: no color at all, the terminal shows through.
pub const TRANSPARENT: &str = "transparent";
/// Keyword: the configured accent color.
pub const ACCENT: &str = "accent";
/// Keyword: the background of the previously rendered segment.
pub const PARENT_BACKGROUND: &str = "parentBackground";
/// Keyword: the foreground of the previously rendered segment.
pub const PARENT_FOREGROUND: &str = "parentForeground";
/// Keyword: the current segment's background.
pub const BACKGROUND: &str = "background";
/// Keyword: the current segment's foreground.
pub const FOREGROUND: &str = "foreground";

/// A pair of symbolic color expressions as written in the configuration,
/// e.g. `{"background": "p:blue", "foreground": "parentBackground"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorSet {
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub foreground: String,
}

impl ColorSet {
    pub fn new(background: impl Into<String>, foreground: impl Into<String>) -> Self {
        Self {
            background: background.into(),
            foreground: foreground.into(),
        }
    }
}

/// A color ready to be printed inside an SGR sequence, e.g. `38;2;255;255;255`,
/// `48;5;202` or `31`. The literal `transparent` and the empty string are kept as
/// sentinel values so the writer can decide what (not) to emit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ansi(String);

impl Ansi {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn transparent() -> Self {
        Self(TRANSPARENT.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_transparent(&self) -> bool {
        self.0 == TRANSPARENT
    }

    /// Transparent or unset.
    pub fn is_clear(&self) -> bool {
        self.is_empty() || self.is_transparent()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reinterpret a foreground code as the matching background code.
    pub fn to_background(&self) -> Ansi {
        if let Some(rest) = self.0.strip_prefix("38;") {
            return Ansi(format!("48;{}", rest));
        }

        match self.0.parse::<u8>() {
            Ok(code @ 30..=39) | Ok(code @ 90..=97) => Ansi((code + 10).to_string()),
            _ => self.clone(),
        }
    }
}

impl fmt::Display for Ansi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolved (background, foreground) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnsiSet {
    pub background: Ansi,
    pub foreground: Ansi,
}

/// Stack of active color overrides while writing one piece of text.
/// The top of the stack is the visible pair.
#[derive(Debug, Clone, Default)]
pub struct ColorHistory {
    stack: Vec<AnsiSet>,
}

impl ColorHistory {
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Push a pair unless it equals the current top.
    pub fn push(&mut self, background: Ansi, foreground: Ansi) {
        if let Some(last) = self.stack.last() {
            if last.background == background && last.foreground == foreground {
                return;
            }
        }

        self.stack.push(AnsiSet {
            background,
            foreground,
        });
    }

    pub fn pop(&mut self) {
        self.stack.pop();
    }

    pub fn background(&self) -> Ansi {
        self.stack
            .last()
            .map(|set| set.background.clone())
            .unwrap_or_default()
    }

    pub fn foreground(&self) -> Ansi {
        self.stack
            .last()
            .map(|set| set.foreground.clone())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }
}
