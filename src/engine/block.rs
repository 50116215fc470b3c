use crate::color::{
    ColorCycle, BACKGROUND, FOREGROUND, PARENT_BACKGROUND, PARENT_FOREGROUND, TRANSPARENT,
};
use crate::config::{BlockConfig, SegmentStyle};
use crate::segments::Segment;
use crate::terminal::{Anchor, Writer};

/// The parts of a segment the separators care about, after cycle colors and
/// block diamonds were applied.
#[derive(Debug, Clone)]
struct Painted {
    style: SegmentStyle,
    visible: bool,
    background: String,
    foreground: String,
    leading_diamond: String,
    trailing_diamond: String,
    powerline_symbol: String,
    leading_powerline_symbol: String,
    invert_powerline: bool,
}

impl Painted {
    fn new(segment: &Segment) -> Self {
        Self {
            style: segment.style(),
            visible: segment.is_visible(),
            background: segment.background.clone(),
            foreground: segment.foreground.clone(),
            leading_diamond: segment.config.leading_diamond.clone(),
            trailing_diamond: segment.config.trailing_diamond.clone(),
            powerline_symbol: segment.config.powerline_symbol.clone(),
            leading_powerline_symbol: segment.config.leading_powerline_symbol.clone(),
            invert_powerline: segment.config.invert_powerline,
        }
    }

    fn is_diamond(&self) -> bool {
        self.style == SegmentStyle::Diamond
    }

    fn is_powerline(&self) -> bool {
        matches!(self.style, SegmentStyle::Powerline | SegmentStyle::Accordion)
    }

    fn has_empty_diamond_at_end(&self) -> bool {
        self.is_diamond() && self.trailing_diamond.is_empty()
    }
}

/// Writes the segments of one block, in order, with their separators.
///
/// Must be driven from a single task; it owns the writer for the duration of
/// the block.
pub struct BlockComposer<'a> {
    writer: &'a mut Writer,
    cycle: &'a mut ColorCycle,
    leading_diamond: &'a str,
    trailing_diamond: &'a str,
    active: Option<Painted>,
    previous: Option<Painted>,
}

impl<'a> BlockComposer<'a> {
    pub fn new(writer: &'a mut Writer, cycle: &'a mut ColorCycle, block: &'a BlockConfig) -> Self {
        Self {
            writer,
            cycle,
            leading_diamond: &block.leading_diamond,
            trailing_diamond: &block.trailing_diamond,
            active: None,
            previous: None,
        }
    }

    /// Write a rendered segment. Hidden segments are skipped, except
    /// accordions which keep their separators.
    pub fn write_segment(&mut self, segment: &Segment) {
        if !segment.is_visible() && segment.style() != SegmentStyle::Accordion {
            return;
        }

        let mut painted = Painted::new(segment);

        if let Some(colors) = self.cycle.next_colors() {
            painted.background = colors.background;
            painted.foreground = colors.foreground;
        }

        if self.active.is_none() && !self.leading_diamond.is_empty() {
            painted.leading_diamond = self.leading_diamond.to_string();
        }

        self.writer.interactive = segment.config.interactive;
        self.writer
            .set_colors(&painted.background, &painted.foreground);
        self.active = Some(painted);

        self.write_separator(false);
        self.render_active(&segment.text);

        self.previous = self.active.clone();
        if let Some(previous) = &self.previous {
            self.writer
                .set_parent_colors(&previous.background, &previous.foreground);
        }
    }

    /// Close the block and take its output and display width.
    pub fn finish(mut self) -> (String, usize) {
        if let Some(active) = self.active.as_mut() {
            if !self.trailing_diamond.is_empty() {
                active.trailing_diamond = self.trailing_diamond.to_string();
            }
        }

        self.write_separator(true);
        self.writer.interactive = false;
        self.writer.string()
    }

    fn render_active(&mut self, text: &str) {
        let Some(active) = &self.active else {
            return;
        };

        match active.style {
            SegmentStyle::Plain | SegmentStyle::Powerline => {
                self.writer.write(BACKGROUND, FOREGROUND, text);
            }
            SegmentStyle::Diamond => {
                let background = match &self.previous {
                    Some(previous) if previous.has_empty_diamond_at_end() => {
                        previous.background.as_str()
                    }
                    _ => TRANSPARENT,
                };

                self.writer
                    .write(background, BACKGROUND, &active.leading_diamond);
                self.writer.write(BACKGROUND, FOREGROUND, text);
            }
            SegmentStyle::Accordion => {
                if active.visible {
                    self.writer.write(BACKGROUND, FOREGROUND, text);
                }
            }
        }
    }

    fn write_separator(&mut self, is_final: bool) {
        let Some(active) = &self.active else {
            return;
        };

        if is_final && active.is_diamond() {
            self.writer
                .write(TRANSPARENT, BACKGROUND, &active.trailing_diamond);
            return;
        }

        let previous_is_diamond = self.previous.as_ref().is_some_and(Painted::is_diamond);
        if previous_is_diamond {
            self.adjust_trailing_diamond_color_overrides();
        }

        let Some(active) = &self.active else {
            return;
        };

        if let Some(previous) = self.previous.as_ref().filter(|_| previous_is_diamond) {
            if active.is_diamond() && active.leading_diamond.is_empty() {
                self.writer
                    .write(BACKGROUND, PARENT_BACKGROUND, &previous.trailing_diamond);
                return;
            }

            if !previous.trailing_diamond.is_empty() {
                self.writer
                    .write(TRANSPARENT, PARENT_BACKGROUND, &previous.trailing_diamond);
            }
        }

        let is_powerline = active.is_powerline();
        let previous_is_powerline = self.previous.as_ref().is_some_and(Painted::is_powerline);

        if is_powerline && !active.leading_powerline_symbol.is_empty() && !previous_is_powerline {
            self.writer
                .write(TRANSPARENT, BACKGROUND, &active.leading_powerline_symbol);
            return;
        }

        let symbol = if is_powerline {
            active.powerline_symbol.as_str()
        } else {
            match &self.previous {
                Some(previous) if previous.is_powerline() => previous.powerline_symbol.as_str(),
                _ => "",
            }
        };

        if symbol.is_empty() {
            return;
        }

        let mut background = if is_final || !is_powerline {
            TRANSPARENT
        } else {
            BACKGROUND
        };

        if active.is_diamond() && active.leading_diamond.is_empty() {
            background = BACKGROUND;
        }

        let powerline_color = self.powerline_color().to_string();

        if active.invert_powerline {
            self.writer.write(&powerline_color, background, symbol);
        } else {
            self.writer.write(background, &powerline_color, symbol);
        }
    }

    /// Color the separator takes over from the segment before it.
    fn powerline_color(&self) -> &str {
        let (Some(active), Some(previous)) = (&self.active, &self.previous) else {
            return TRANSPARENT;
        };

        if previous.has_empty_diamond_at_end()
            || (active.is_diamond() && active.leading_diamond.is_empty())
        {
            return &previous.background;
        }

        if !previous.is_powerline() {
            return TRANSPARENT;
        }

        &previous.background
    }

    /// The previous segment's trailing diamond is written while the active
    /// segment's colors are current, so its `background`/`foreground`
    /// keywords have to point at the parent instead.
    fn adjust_trailing_diamond_color_overrides(&mut self) {
        let Some(previous) = self.previous.as_mut() else {
            return;
        };

        let diamond = &previous.trailing_diamond;
        if diamond.is_empty() || (!diamond.contains(BACKGROUND) && !diamond.contains(FOREGROUND)) {
            return;
        }

        let Some(anchor) = Anchor::parse(diamond) else {
            return;
        };

        let mut adjusted = anchor.text.to_string();
        for color in [anchor.background, anchor.foreground].into_iter().flatten() {
            let replacement = match color {
                BACKGROUND => PARENT_BACKGROUND,
                FOREGROUND => PARENT_FOREGROUND,
                _ => continue,
            };
            adjusted = adjusted.replacen(color, replacement, 1);
        }

        let replaced = diamond.replacen(anchor.text, &adjusted, 1);
        previous.trailing_diamond = replaced;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{ColorResolver, ColorSet, DefaultColors};
    use crate::segments::{Execution, Outcome};
    use crate::template::SegmentData;
    use crate::terminal::{strip_ansi, Shell};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Map};
    use std::sync::Arc;
    use std::time::Duration;

    fn writer() -> Writer {
        Writer::new(
            Shell::Generic,
            ColorResolver::new(Arc::new(DefaultColors::default())),
        )
    }

    fn rendered(config: serde_json::Value, enabled: bool) -> Segment {
        let mut segment = Segment::new(serde_json::from_value(config).unwrap());
        segment.apply(Outcome::Executed(Execution {
            enabled,
            record: json!({}),
            template: String::new(),
            cache_key: None,
            duration: Duration::ZERO,
        }));
        segment.render(&Map::new(), &SegmentData::new(), "...");
        segment
    }

    fn compose(block: &BlockConfig, segments: &[Segment]) -> (String, usize) {
        let mut writer = writer();
        let mut cycle = ColorCycle::default();
        let mut composer = BlockComposer::new(&mut writer, &mut cycle, block);
        for segment in segments {
            composer.write_segment(segment);
        }
        composer.finish()
    }

    #[test]
    fn test_disabled_segment_contributes_nothing() {
        let block = BlockConfig::default();
        let segments = [
            rendered(json!({ "type": "text", "template": "nope", "foreground": "red" }), false),
            rendered(json!({ "type": "text", "template": "ok", "foreground": "green" }), true),
        ];

        let (text, length) = compose(&block, &segments);
        assert_eq!(text, "\x1b[32mok\x1b[0m");
        assert_eq!(length, 2);
    }

    #[test]
    fn test_powerline_separators() {
        let block = BlockConfig::default();
        let segments = [
            rendered(json!({
                "type": "text", "template": "a", "style": "powerline",
                "powerline_symbol": ">", "background": "blue", "foreground": "white"
            }), true),
            rendered(json!({
                "type": "text", "template": "b", "style": "powerline",
                "powerline_symbol": ">", "background": "red", "foreground": "white"
            }), true),
        ];

        let (text, length) = compose(&block, &segments);
        assert_eq!(strip_ansi(&text), ">a>b>");
        assert_eq!(length, 5);
        // Separator between the two: red background, blue arrow.
        assert!(text.contains("\x1b[41m\x1b[34m>"));
    }

    #[test]
    fn test_diamond_open_and_close() {
        let block = BlockConfig::default();
        let segments = [rendered(json!({
            "type": "text", "template": "x", "style": "diamond",
            "leading_diamond": "(", "trailing_diamond": ")",
            "background": "blue", "foreground": "white"
        }), true)];

        let (text, length) = compose(&block, &segments);
        assert_eq!(strip_ansi(&text), "(x)");
        assert_eq!(length, 3);
        assert!(text.starts_with("\x1b[34m("));
    }

    #[test]
    fn test_block_diamonds_apply_to_first_and_last() {
        let block = BlockConfig {
            leading_diamond: "[".to_string(),
            trailing_diamond: "]".to_string(),
            ..Default::default()
        };
        let diamond = |template: &str| {
            rendered(json!({
                "type": "text", "template": template, "style": "diamond",
                "background": "blue", "foreground": "white"
            }), true)
        };

        let (text, _) = compose(&block, &[diamond("a"), diamond("b")]);
        assert_eq!(strip_ansi(&text), "[ab]");
    }

    #[test]
    fn test_accordion_keeps_separator_when_disabled() {
        let block = BlockConfig::default();
        let accordion = |template: &str, enabled: bool| {
            rendered(json!({
                "type": "text", "template": template, "style": "accordion",
                "powerline_symbol": ">", "background": "blue", "foreground": "white"
            }), enabled)
        };

        let (text, length) = compose(&block, &[accordion("a", true), accordion("b", false)]);
        assert_eq!(strip_ansi(&text), ">a>>");
        assert_eq!(length, 4);
    }

    #[test]
    fn test_color_cycle_overrides_segment_colors() {
        let block = BlockConfig::default();
        let segments = [
            rendered(json!({ "type": "text", "template": "a", "foreground": "red" }), true),
            rendered(json!({ "type": "text", "template": "b", "foreground": "red" }), true),
        ];

        let mut writer = writer();
        let mut cycle = ColorCycle::new(vec![ColorSet::new("", "green"), ColorSet::new("", "blue")]);
        let mut composer = BlockComposer::new(&mut writer, &mut cycle, &block);
        for segment in &segments {
            composer.write_segment(segment);
        }
        let (text, _) = composer.finish();

        assert_eq!(text, "\x1b[32ma\x1b[0m\x1b[34mb\x1b[0m");
    }

    #[test]
    fn test_trailing_diamond_keywords_point_at_parent() {
        let block = BlockConfig::default();
        let segments = [
            rendered(json!({
                "type": "text", "template": "a", "style": "diamond",
                "trailing_diamond": "<background,foreground>)</>",
                "background": "blue", "foreground": "white"
            }), true),
            rendered(json!({
                "type": "text", "template": "b", "style": "plain",
                "background": "red", "foreground": "black"
            }), true),
        ];

        let (text, _) = compose(&block, &segments);
        assert_eq!(strip_ansi(&text), "a)b");
        // `)` keeps the first segment's colors: blue on white.
        assert!(text.contains("\x1b[34m\x1b[47m)") || text.contains("\x1b[47m\x1b[34m)"));
    }

    #[test]
    fn test_empty_block() {
        let (text, length) = compose(&BlockConfig::default(), &[]);
        assert!(text.is_empty());
        assert_eq!(length, 0);
    }
}
