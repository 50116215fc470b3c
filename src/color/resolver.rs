use crate::color::{
    Ansi, AnsiColors, ColorSet, BACKGROUND, FOREGROUND, PARENT_BACKGROUND, PARENT_FOREGROUND,
    TRANSPARENT,
};
use std::sync::Arc;

fn is_keyword(color: &str) -> bool {
    matches!(
        color,
        TRANSPARENT | PARENT_BACKGROUND | PARENT_FOREGROUND | BACKGROUND | FOREGROUND
    )
}

/// Expand `background`, `foreground`, `parentBackground` and `parentForeground`
/// against the current segment pair and the ancestor stack (closest first).
///
/// Expansion repeats until the value is no longer a keyword. Revisiting a keyword
/// means the configuration is cyclic and yields `transparent`.
pub fn expand_keyword(
    color: &str,
    current: Option<&ColorSet>,
    parents: &[Option<ColorSet>],
) -> String {
    let mut keyword = color.to_string();
    let mut seen: Vec<String> = Vec::new();

    while is_keyword(&keyword) {
        if seen.contains(&keyword) {
            return TRANSPARENT.to_string();
        }
        seen.push(keyword.clone());

        let resolved = resolve_keyword(&keyword, current, parents);
        if resolved == keyword {
            break;
        }
        keyword = resolved;
    }

    keyword
}

fn resolve_keyword(keyword: &str, current: Option<&ColorSet>, parents: &[Option<ColorSet>]) -> String {
    match (keyword, current) {
        (BACKGROUND, Some(set)) => set.background.clone(),
        (FOREGROUND, Some(set)) => set.foreground.clone(),
        (PARENT_BACKGROUND | PARENT_FOREGROUND, _) if !parents.is_empty() => {
            resolve_parent(keyword, parents)
        }
        _ => TRANSPARENT.to_string(),
    }
}

/// Walk the ancestors outward. Each `parent*` step moves one level up, and an
/// ancestor's own `background` / `foreground` resolve against that ancestor.
/// A missing ancestor or an empty value ends as `transparent`.
fn resolve_parent(keyword: &str, parents: &[Option<ColorSet>]) -> String {
    let mut keyword = keyword.to_string();

    for parent in parents {
        let Some(parent) = parent else {
            return TRANSPARENT.to_string();
        };

        keyword = match keyword.as_str() {
            PARENT_BACKGROUND => resolve_own(&parent.background, parent),
            PARENT_FOREGROUND => resolve_own(&parent.foreground, parent),
            _ => break,
        };
    }

    if keyword.is_empty() || keyword == PARENT_BACKGROUND || keyword == PARENT_FOREGROUND {
        return TRANSPARENT.to_string();
    }

    keyword
}

fn resolve_own(color: &str, set: &ColorSet) -> String {
    let mut color = color;

    // At most one hop each way; a pair pointing at itself twice is cyclic.
    for _ in 0..2 {
        color = match color {
            BACKGROUND => set.background.as_str(),
            FOREGROUND => set.foreground.as_str(),
            _ => return color.to_string(),
        };
    }

    match color {
        BACKGROUND | FOREGROUND => TRANSPARENT.to_string(),
        _ => color.to_string(),
    }
}

/// Turns symbolic color expressions into SGR fragments for one render context.
#[derive(Clone)]
pub struct ColorResolver {
    colors: Arc<dyn AnsiColors>,
}

impl ColorResolver {
    pub fn new(colors: Arc<dyn AnsiColors>) -> Self {
        Self { colors }
    }

    pub fn colors(&self) -> &Arc<dyn AnsiColors> {
        &self.colors
    }

    /// Resolve a single expression. Unknown values come back empty.
    pub fn resolve(
        &self,
        expression: &str,
        current: Option<&ColorSet>,
        parents: &[Option<ColorSet>],
        is_background: bool,
    ) -> Ansi {
        let expanded = expand_keyword(expression, current, parents);
        self.colors.to_ansi(&expanded, is_background)
    }

    /// Resolve a (background, foreground) pair. Empty expressions default to the
    /// current segment's colors. A transparent foreground renders the background
    /// as a foreground color so it can be reverse-video'd onto the terminal.
    pub fn resolve_pair(
        &self,
        background: &str,
        foreground: &str,
        current: Option<&ColorSet>,
        parents: &[Option<ColorSet>],
    ) -> (Ansi, Ansi) {
        let background = if background.is_empty() { BACKGROUND } else { background };
        let foreground = if foreground.is_empty() { FOREGROUND } else { foreground };

        let background = expand_keyword(background, current, parents);
        let foreground = expand_keyword(foreground, current, parents);

        let inverted = foreground == TRANSPARENT && !background.is_empty();

        (
            self.colors.to_ansi(&background, !inverted),
            self.colors.to_ansi(&foreground, false),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::DefaultColors;

    fn set(bg: &str, fg: &str) -> ColorSet {
        ColorSet::new(bg, fg)
    }

    #[test]
    fn test_current_keywords() {
        let current = set("red", "white");
        assert_eq!(expand_keyword("background", Some(&current), &[]), "red");
        assert_eq!(expand_keyword("foreground", Some(&current), &[]), "white");
        assert_eq!(expand_keyword("background", None, &[]), "transparent");
        assert_eq!(expand_keyword("#abcdef", None, &[]), "#abcdef");
    }

    #[test]
    fn test_parent_keywords() {
        let current = set("red", "parentBackground");
        let parents = vec![Some(set("blue", "yellow"))];
        assert_eq!(expand_keyword("foreground", Some(&current), &parents), "blue");
        assert_eq!(expand_keyword("parentForeground", Some(&current), &parents), "yellow");
        assert_eq!(expand_keyword("parentForeground", Some(&current), &[]), "transparent");
        assert_eq!(expand_keyword("parentBackground", Some(&current), &[None]), "transparent");
    }

    #[test]
    fn test_parent_chain_walks_outward() {
        let parents = vec![Some(set("parentBackground", "x")), Some(set("green", "y"))];
        assert_eq!(expand_keyword("parentBackground", None, &parents), "green");

        let parents = vec![Some(set("parentBackground", "x")), None];
        assert_eq!(expand_keyword("parentBackground", None, &parents), "transparent");
    }

    #[test]
    fn test_parent_keywords_resolve_against_that_parent() {
        let current = set("red", "white");
        let parents = vec![Some(set("foreground", "blue"))];
        assert_eq!(expand_keyword("parentBackground", Some(&current), &parents), "blue");

        let parents = vec![Some(set("green", "background"))];
        assert_eq!(expand_keyword("parentForeground", Some(&current), &parents), "green");

        let parents = vec![Some(set("foreground", "background"))];
        assert_eq!(expand_keyword("parentBackground", Some(&current), &parents), "transparent");

        let parents = vec![Some(set("parentForeground", "x")), Some(set("cyan", "foreground"))];
        assert_eq!(expand_keyword("parentBackground", Some(&current), &parents), "transparent");

        let parents = vec![Some(set("parentForeground", "x")), Some(set("cyan", "background"))];
        assert_eq!(expand_keyword("parentBackground", None, &parents), "cyan");
    }

    #[test]
    fn test_cyclic_keywords_terminate() {
        let current = set("foreground", "background");
        assert_eq!(expand_keyword("background", Some(&current), &[]), "transparent");
    }

    #[test]
    fn test_resolve_pair_inverts_transparent_foreground() {
        let resolver = ColorResolver::new(Arc::new(DefaultColors::default()));
        let current = set("#FF5733", "transparent");
        let (bg, fg) = resolver.resolve_pair("", "", Some(&current), &[]);
        assert_eq!(bg, Ansi::new("38;2;255;87;51"));
        assert!(fg.is_transparent());

        let current = set("white", "black");
        let (bg, fg) = resolver.resolve_pair("", "", Some(&current), &[]);
        assert_eq!(bg, Ansi::new("47"));
        assert_eq!(fg, Ansi::new("30"));
    }

    #[test]
    fn test_resolve_transparent_pair() {
        let resolver = ColorResolver::new(Arc::new(DefaultColors::default()));
        let (bg, fg) = resolver.resolve_pair("transparent", "transparent", None, &[]);
        assert!(bg.is_transparent());
        assert!(fg.is_transparent());
    }
}
