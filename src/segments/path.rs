use crate::segments::{option_str, Environment, Provider};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PathStyle {
    Full,
    #[default]
    Home,
    Folder,
}

impl PathStyle {
    fn parse(value: &str) -> Self {
        match value {
            "full" => Self::Full,
            "folder" => Self::Folder,
            _ => Self::Home,
        }
    }
}

#[derive(Debug, Default)]
pub struct PathProvider {
    pwd: PathBuf,
    home: Option<PathBuf>,
    style: PathStyle,
    max_depth: Option<usize>,
    path: String,
}

impl PathProvider {
    fn folder(&self) -> String {
        self.pwd
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.pwd.to_string_lossy().into_owned())
    }

    fn home_relative(&self) -> String {
        let full = self.pwd.to_string_lossy().into_owned();

        let Some(home) = &self.home else {
            return full;
        };

        match self.pwd.strip_prefix(home) {
            Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
            Ok(rest) => format!("~{}{}", MAIN_SEPARATOR, rest.display()),
            Err(_) => full,
        }
    }

    fn shorten(&self, path: String) -> String {
        let Some(depth) = self.max_depth.filter(|depth| *depth > 0) else {
            return path;
        };

        let parts: Vec<&str> = path.split(MAIN_SEPARATOR).filter(|p| !p.is_empty()).collect();
        if parts.len() <= depth {
            return path;
        }

        let kept = parts[parts.len() - depth..].join(&MAIN_SEPARATOR.to_string());
        format!("\u{2026}{}{}", MAIN_SEPARATOR, kept)
    }
}

#[async_trait]
impl Provider for PathProvider {
    fn init(&mut self, options: &Map<String, Value>, env: &Environment) {
        self.pwd = env.pwd.clone();
        self.home = env.home.clone();
        self.style = PathStyle::parse(option_str(options, "style", "home"));
        self.max_depth = options
            .get("max_depth")
            .and_then(Value::as_u64)
            .map(|depth| depth as usize);
    }

    async fn enabled(&mut self) -> bool {
        let path = match self.style {
            PathStyle::Full => self.pwd.to_string_lossy().into_owned(),
            PathStyle::Home => self.home_relative(),
            PathStyle::Folder => self.folder(),
        };

        self.path = self.shorten(path);
        !self.path.is_empty()
    }

    fn template(&self) -> &str {
        " {{ .Path }} "
    }

    fn record(&self) -> Value {
        json!({
            "Path": self.path,
            "Folder": self.folder(),
            "Location": self.pwd.to_string_lossy(),
        })
    }

    fn cache_key(&self) -> Option<String> {
        Some(display_key(&self.pwd))
    }
}

fn display_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
