use crate::config::*;
use serde_json::json;

const POWERLINE_SYMBOL: &str = "\u{e0b0}";

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: Some("dark".to_string()),
            palette: HashMap::new(),
            accent_color: None,
            terminal_background: None,
            cycle: Vec::new(),
            final_space: true,
            console_title_template: String::new(),
            pwd: String::new(),
            shell_integration: false,
            pending_text: "...".to_string(),
            background_wait: 250,
            color_cache: true,
            blocks: default_blocks(),
        }
    }
}

fn default_blocks() -> Vec<BlockConfig> {
    vec![
        BlockConfig {
            block_type: BlockType::Prompt,
            alignment: Alignment::Left,
            segments: vec![
                SegmentConfig {
                    segment_type: "path".to_string(),
                    style: SegmentStyle::Powerline,
                    powerline_symbol: POWERLINE_SYMBOL.to_string(),
                    background: "p:path".to_string(),
                    foreground: "p:path-fg".to_string(),
                    template: Some(" {{ .Path }} ".to_string()),
                    properties: properties(json!({ "style": "home" })),
                    ..Default::default()
                },
                SegmentConfig {
                    segment_type: "git".to_string(),
                    style: SegmentStyle::Powerline,
                    powerline_symbol: POWERLINE_SYMBOL.to_string(),
                    background: "p:git".to_string(),
                    foreground: "p:git-fg".to_string(),
                    template: Some(" \u{e0a0} {{ .Branch }}{{ if .Dirty }} *{{ end }} ".to_string()),
                    timeout: 200,
                    cache: Some(CacheConfig {
                        strategy: CacheStrategy::Folder,
                        duration: "5s".to_string(),
                    }),
                    ..Default::default()
                },
                SegmentConfig {
                    segment_type: "status".to_string(),
                    style: SegmentStyle::Powerline,
                    powerline_symbol: POWERLINE_SYMBOL.to_string(),
                    background: "p:error".to_string(),
                    foreground: "p:error-fg".to_string(),
                    template: Some(" \u{2718} {{ .Code }} ".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        },
        BlockConfig {
            block_type: BlockType::Rprompt,
            segments: vec![SegmentConfig {
                segment_type: "time".to_string(),
                style: SegmentStyle::Plain,
                foreground: "p:time".to_string(),
                template: Some("{{ .Time }}".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        },
    ]
}

fn properties(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.segment_count(), 4);
        assert_eq!(config.blocks[1].block_type, BlockType::Rprompt);
    }

    #[test]
    fn test_default_config_round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.segment_count(), config.segment_count());
        assert_eq!(parsed.blocks[0].segments[1].timeout, 200);
    }
}
