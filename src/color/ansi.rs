use crate::color::{Ansi, Palette, ACCENT};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Converts a concrete color expression (name, 256 index, hex) into an SGR fragment.
///
/// Implementations are decorators around [`DefaultColors`]: a palette lookup and a
/// shared lookup cache can be layered on top.
pub trait AnsiColors: Send + Sync {
    fn to_ansi(&self, color: &str, is_background: bool) -> Ansi;
}

/// Foreground [0] and background [1] codes for the named ANSI colors.
const NAMED_COLORS: &[(&str, [&str; 2])] = &[
    ("black", ["30", "40"]),
    ("red", ["31", "41"]),
    ("green", ["32", "42"]),
    ("yellow", ["33", "43"]),
    ("blue", ["34", "44"]),
    ("magenta", ["35", "45"]),
    ("cyan", ["36", "46"]),
    ("white", ["37", "47"]),
    ("default", ["39", "49"]),
    ("darkGray", ["90", "100"]),
    ("lightRed", ["91", "101"]),
    ("lightGreen", ["92", "102"]),
    ("lightYellow", ["93", "103"]),
    ("lightBlue", ["94", "104"]),
    ("lightMagenta", ["95", "105"]),
    ("lightCyan", ["96", "106"]),
    ("lightWhite", ["97", "107"]),
];

pub fn is_ansi_color_name(color: &str) -> bool {
    NAMED_COLORS.iter().any(|(name, _)| *name == color)
}

fn named_color(color: &str, is_background: bool) -> Option<Ansi> {
    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == color)
        .map(|(_, codes)| Ansi::new(codes[usize::from(is_background)]))
}

/// The base color table.
#[derive(Debug, Clone)]
pub struct DefaultColors {
    pub true_color: bool,
    accent: Option<(Ansi, Ansi)>,
}

impl Default for DefaultColors {
    fn default() -> Self {
        Self {
            true_color: true,
            accent: None,
        }
    }
}

impl DefaultColors {
    pub fn new(true_color: bool) -> Self {
        Self {
            true_color,
            accent: None,
        }
    }

    /// Bind the `accent` keyword to a concrete color.
    pub fn with_accent(mut self, color: &str) -> Self {
        let background = self.to_ansi(color, true);
        let foreground = self.to_ansi(color, false);
        if !background.is_empty() {
            self.accent = Some((background, foreground));
        }
        self
    }
}

impl AnsiColors for DefaultColors {
    fn to_ansi(&self, color: &str, is_background: bool) -> Ansi {
        if color.is_empty() {
            return Ansi::empty();
        }

        if color == crate::color::TRANSPARENT {
            return Ansi::transparent();
        }

        if color == ACCENT {
            return match &self.accent {
                Some((bg, _)) if is_background => bg.clone(),
                Some((_, fg)) => fg.clone(),
                None => Ansi::empty(),
            };
        }

        if let Some(ansi) = named_color(color, is_background) {
            return ansi;
        }

        let prefix = if is_background { "48" } else { "38" };

        if let Some(hex) = color.strip_prefix('#') {
            let Some((r, g, b)) = parse_hex(hex) else {
                return Ansi::empty();
            };

            if self.true_color {
                return Ansi::new(format!("{};2;{};{};{}", prefix, r, g, b));
            }

            return Ansi::new(format!("{};5;{}", prefix, rgb_to_8bit((r, g, b))));
        }

        match color.parse::<u8>() {
            Ok(index) => Ansi::new(format!("{};5;{}", prefix, index)),
            Err(_) => Ansi::empty(),
        }
    }
}

fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return None,
    };

    let r = u8::from_str_radix(expanded.get(0..2)?, 16).ok()?;
    let g = u8::from_str_radix(expanded.get(2..4)?, 16).ok()?;
    let b = u8::from_str_radix(expanded.get(4..6)?, 16).ok()?;
    Some((r, g, b))
}

/// Closest xterm-256 color: greyscale ramp for neutral colors, 6x6x6 cube otherwise.
pub fn rgb_to_8bit((r, g, b): (u8, u8, u8)) -> u8 {
    if r == g && g == b {
        if r < 8 {
            16
        } else if r > 248 {
            231
        } else {
            ((r - 8) / 10) + 232
        }
    } else {
        let scale = |c: u8| (u16::from(c) * 5 / 255) as u8;
        16 + 36 * scale(r) + 6 * scale(g) + scale(b)
    }
}

/// Resolves `p:` palette references before handing the color to the inner table.
pub struct PaletteColors {
    inner: Box<dyn AnsiColors>,
    palette: Palette,
}

impl PaletteColors {
    pub fn new(inner: Box<dyn AnsiColors>, palette: Palette) -> Self {
        Self { inner, palette }
    }
}

impl AnsiColors for PaletteColors {
    fn to_ansi(&self, color: &str, is_background: bool) -> Ansi {
        match self.palette.resolve(color) {
            Ok(resolved) => self.inner.to_ansi(&resolved, is_background),
            Err(err) => {
                debug!(color, error = %err, "unresolved palette color");
                Ansi::empty()
            }
        }
    }
}

/// Memoizes conversions. The map is shared by every clone, so one instance
/// serves all segment tasks and writers of a process.
#[derive(Clone)]
pub struct CachedColors {
    inner: Arc<dyn AnsiColors>,
    cache: Arc<DashMap<(String, bool), Ansi>>,
}

impl CachedColors {
    pub fn new(inner: Arc<dyn AnsiColors>) -> Self {
        Self {
            inner,
            cache: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl AnsiColors for CachedColors {
    fn to_ansi(&self, color: &str, is_background: bool) -> Ansi {
        let key = (color.to_string(), is_background);
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }

        let ansi = self.inner.to_ansi(color, is_background);
        self.cache.insert(key, ansi.clone());
        ansi
    }
}

/// Build the color table for a configuration: defaults, then palette, then cache.
pub fn make_colors(
    palette: Option<Palette>,
    cache_enabled: bool,
    accent: Option<&str>,
    true_color: bool,
) -> Arc<dyn AnsiColors> {
    let mut defaults = DefaultColors::new(true_color);
    if let Some(accent) = accent {
        defaults = defaults.with_accent(accent);
    }

    let colors: Box<dyn AnsiColors> = match palette {
        Some(palette) if !palette.is_empty() => {
            Box::new(PaletteColors::new(Box::new(defaults), palette))
        }
        _ => Box::new(defaults),
    };

    if cache_enabled {
        return Arc::new(CachedColors::new(Arc::from(colors)));
    }

    Arc::from(colors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_colors() {
        let colors = DefaultColors::default();
        assert_eq!(colors.to_ansi("red", false), Ansi::new("31"));
        assert_eq!(colors.to_ansi("red", true), Ansi::new("41"));
        assert_eq!(colors.to_ansi("lightWhite", true), Ansi::new("107"));
        assert!(is_ansi_color_name("darkGray"));
        assert!(!is_ansi_color_name("pink"));
    }

    #[test]
    fn test_hex_truecolor_and_fallback() {
        let colors = DefaultColors::new(true);
        assert_eq!(colors.to_ansi("#FF5733", true), Ansi::new("48;2;255;87;51"));
        assert_eq!(colors.to_ansi("#fff", false), Ansi::new("38;2;255;255;255"));

        let colors = DefaultColors::new(false);
        assert_eq!(colors.to_ansi("#ffffff", false), Ansi::new("38;5;231"));
        assert_eq!(colors.to_ansi("#ff0000", true), Ansi::new("48;5;196"));
    }

    #[test]
    fn test_256_index_and_garbage() {
        let colors = DefaultColors::default();
        assert_eq!(colors.to_ansi("202", false), Ansi::new("38;5;202"));
        assert!(colors.to_ansi("256", false).is_empty());
        assert!(colors.to_ansi("#12", false).is_empty());
        assert!(colors.to_ansi("pink", false).is_empty());
        assert!(colors.to_ansi("transparent", false).is_transparent());
    }

    #[test]
    fn test_accent() {
        let colors = DefaultColors::default();
        assert!(colors.to_ansi("accent", false).is_empty());

        let colors = DefaultColors::default().with_accent("blue");
        assert_eq!(colors.to_ansi("accent", true), Ansi::new("44"));
        assert_eq!(colors.to_ansi("accent", false), Ansi::new("34"));
    }

    #[test]
    fn test_palette_decorator_and_cache() {
        let mut palette = Palette::new();
        palette.insert("main", "#000000");
        palette.insert("loop", "p:loop");

        let colors = make_colors(Some(palette), true, None, true);
        assert_eq!(colors.to_ansi("p:main", true), Ansi::new("48;2;0;0;0"));
        assert!(colors.to_ansi("p:loop", true).is_empty());
        assert!(colors.to_ansi("p:nope", true).is_empty());
        assert_eq!(colors.to_ansi("green", false), Ansi::new("32"));
    }

    #[test]
    fn test_cached_colors_shared_between_clones() {
        let cached = CachedColors::new(Arc::new(DefaultColors::default()));
        let clone = cached.clone();
        cached.to_ansi("red", true);
        clone.to_ansi("red", true);
        clone.to_ansi("red", false);
        assert_eq!(cached.len(), 2);
    }
}
