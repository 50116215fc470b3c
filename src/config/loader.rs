use crate::config::Config;
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

pub const CONFIG_ENV: &str = "SHELL_POWERLINE_CONFIG";
pub const THEME_ENV: &str = "SHELL_POWERLINE_THEME";

/// Load configuration with priority: CLI path > env path > config files > defaults.
///
/// A file that exists but cannot be parsed is an error; the caller turns it
/// into a non-zero exit.
pub async fn load_config(config_path: Option<PathBuf>) -> Result<(Config, Option<PathBuf>)> {
    let explicit = config_path.or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));

    let (mut config, source) = match explicit {
        Some(path) => (load_config_file(&path).await?, Some(path)),
        None => load_config_from_default_locations().await?,
    };

    apply_env_overrides(&mut config);
    config.validate()?;

    Ok((config, source))
}

async fn load_config_from_default_locations() -> Result<(Config, Option<PathBuf>)> {
    for path in get_config_search_paths() {
        if path.exists() {
            let config = load_config_file(&path).await?;
            return Ok((config, Some(path)));
        }
    }

    debug!("no configuration file found, using the built-in default");
    Ok((Config::default(), None))
}

fn get_config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(".shell-powerline.json")];

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config").join("shell-powerline").join("config.json"));
    }

    paths
}

pub async fn load_config_file(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    debug!(path = %path.display(), blocks = config.blocks.len(), "loaded configuration");
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(theme) = env::var(THEME_ENV) {
        if !theme.is_empty() {
            config.theme = Some(theme);
        }
    }
}
