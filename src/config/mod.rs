pub mod defaults;
pub mod loader;

pub use defaults::*;
pub use loader::*;

use crate::color::{make_colors, AnsiColors, ColorCycle, ColorSet, Palette};
use crate::template::TemplatesLogic;
use crate::themes::get_theme;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("segment {segment}: invalid cache duration {value:?}: {source}")]
    InvalidCacheDuration {
        segment: String,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("unknown theme {0:?}")]
    UnknownTheme(String),

    #[error("block {block}, segment {index}: missing segment type")]
    MissingSegmentType { block: usize, index: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Built-in palette to start from, see [`crate::themes`].
    pub theme: Option<String>,
    pub palette: HashMap<String, String>,
    pub accent_color: Option<String>,
    pub terminal_background: Option<String>,
    pub cycle: Vec<ColorSet>,
    pub final_space: bool,
    pub console_title_template: String,
    /// Template selecting the working directory report: `osc99`, `osc7` or `osc51`.
    pub pwd: String,
    pub shell_integration: bool,
    pub pending_text: String,
    /// Milliseconds a non-streaming run waits on timed out segments before
    /// exiting, so their late results still reach the cache.
    pub background_wait: u64,
    pub color_cache: bool,
    pub blocks: Vec<BlockConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    #[default]
    Prompt,
    Newline,
    Rprompt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    #[default]
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overflow {
    Break,
    Hide,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub alignment: Alignment,
    pub overflow: Option<Overflow>,
    pub filler: String,
    pub newline: bool,
    pub vertical_offset: i32,
    pub leading_diamond: String,
    pub trailing_diamond: String,
    pub segments: Vec<SegmentConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStyle {
    #[default]
    Plain,
    Powerline,
    Diamond,
    Accordion,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    #[default]
    Folder,
    Session,
    Device,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub strategy: CacheStrategy,
    /// Human readable TTL, e.g. `30s`, `5m`, `1h`.
    pub duration: String,
}

impl CacheConfig {
    pub fn ttl(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.duration)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    #[serde(rename = "type")]
    pub segment_type: String,
    pub alias: Option<String>,
    pub style: SegmentStyle,
    pub template: Option<String>,
    pub templates: Vec<String>,
    pub templates_logic: TemplatesLogic,
    pub foreground: String,
    pub background: String,
    pub foreground_templates: Vec<String>,
    pub background_templates: Vec<String>,
    pub leading_diamond: String,
    pub trailing_diamond: String,
    pub powerline_symbol: String,
    pub leading_powerline_symbol: String,
    pub invert_powerline: bool,
    pub interactive: bool,
    /// Milliseconds; 0 waits for the provider however long it takes.
    pub timeout: u64,
    pub cache: Option<CacheConfig>,
    pub needs: Vec<String>,
    pub properties: Map<String, Value>,
    pub min_width: usize,
    pub max_width: usize,
    pub force: bool,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(theme) = &self.theme {
            if get_theme(theme).is_none() {
                return Err(ConfigError::UnknownTheme(theme.clone()));
            }
        }

        for (block_index, block) in self.blocks.iter().enumerate() {
            for (index, segment) in block.segments.iter().enumerate() {
                if segment.segment_type.trim().is_empty() {
                    return Err(ConfigError::MissingSegmentType {
                        block: block_index,
                        index,
                    });
                }

                if let Some(cache) = &segment.cache {
                    cache.ttl().map_err(|source| ConfigError::InvalidCacheDuration {
                        segment: segment.segment_type.clone(),
                        value: cache.duration.clone(),
                        source,
                    })?;
                }
            }
        }

        Ok(())
    }

    /// Theme palette with the configured entries layered on top.
    pub fn resolved_palette(&self) -> Option<Palette> {
        let configured: Palette = self
            .palette
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let palette = match self.theme.as_deref().and_then(get_theme) {
            Some(theme) => theme.merge(&configured),
            None => configured,
        };

        (!palette.is_empty()).then_some(palette)
    }

    pub fn make_colors(&self, true_color: bool) -> Arc<dyn AnsiColors> {
        make_colors(
            self.resolved_palette(),
            self.color_cache,
            self.accent_color.as_deref(),
            true_color,
        )
    }

    /// A fresh cursor over the configured color cycle.
    pub fn color_cycle(&self) -> ColorCycle {
        ColorCycle::new(self.cycle.clone())
    }

    pub fn segment_count(&self) -> usize {
        self.blocks.iter().map(|block| block.segments.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = serde_json::from_value(json!({
            "blocks": [{
                "type": "prompt",
                "alignment": "right",
                "overflow": "hide",
                "segments": [{
                    "type": "git",
                    "style": "diamond",
                    "leading_diamond": "\u{e0b6}",
                    "cache": { "strategy": "session", "duration": "5m" },
                    "timeout": 50,
                    "properties": { "fetch_status": true }
                }]
            }]
        }))
        .unwrap();

        assert_eq!(config.pending_text, "...");
        assert!(config.color_cache);

        let block = &config.blocks[0];
        assert_eq!(block.alignment, Alignment::Right);
        assert_eq!(block.overflow, Some(Overflow::Hide));

        let segment = &block.segments[0];
        assert_eq!(segment.style, SegmentStyle::Diamond);
        assert_eq!(segment.timeout, 50);
        let cache = segment.cache.as_ref().unwrap();
        assert_eq!(cache.strategy, CacheStrategy::Session);
        assert_eq!(cache.ttl().unwrap(), Duration::from_secs(300));
        assert_eq!(segment.properties["fetch_status"], json!(true));
    }

    #[test]
    fn test_validate() {
        assert!(Config::default().validate().is_ok());

        let mut config = Config::default();
        config.theme = Some("solarized-ish".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::UnknownTheme(_))));

        let mut config = Config::default();
        config.blocks[0].segments[0].cache = Some(CacheConfig {
            strategy: CacheStrategy::Folder,
            duration: "soon".to_string(),
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCacheDuration { .. })
        ));

        let mut config = Config::default();
        config.blocks[0].segments[0].segment_type.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSegmentType { block: 0, index: 0 })
        ));
    }

    #[test]
    fn test_palette_layers_over_theme() {
        let mut config = Config::default();
        config.theme = Some("dark".to_string());
        config.palette.insert("git".to_string(), "#ff0000".to_string());

        let palette = config.resolved_palette().unwrap();
        assert_eq!(palette.resolve("p:git").unwrap(), "#ff0000");
        assert_eq!(palette.resolve("p:path").unwrap(), "#2d3748");
    }
}
