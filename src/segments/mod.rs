pub mod command;
pub mod git;
pub mod path;
pub mod segment;
pub mod status;
pub mod text;
pub mod time;

pub use command::*;
pub use git::*;
pub use path::*;
pub use segment::*;
pub use status::*;
pub use text::*;
pub use time::*;

use crate::terminal::Shell;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

/// Invocation flags shared by every segment of a render.
#[derive(Debug, Clone, Default)]
pub struct Flags {
    pub plain: bool,
    pub streaming: bool,
    /// Skip cache reads; fresh results are still written.
    pub force: bool,
    pub debug: bool,
    pub eval: bool,
    pub cleared: bool,
    pub prompt_count: u32,
    pub terminal_width: Option<usize>,
    pub exit_code: i32,
    pub no_exit_code: bool,
    pub config_path: Option<PathBuf>,
}

/// Read-only facts about the shell session the prompt is rendered for.
#[derive(Debug, Clone)]
pub struct Environment {
    pub pwd: PathBuf,
    pub home: Option<PathBuf>,
    pub shell: Shell,
    pub flags: Flags,
    pub session_id: String,
    pub user: String,
    pub host: String,
}

impl Environment {
    pub fn new(pwd: PathBuf, shell: Shell, flags: Flags) -> Self {
        Self {
            pwd,
            home: dirs::home_dir(),
            shell,
            flags,
            session_id: default_session_id(),
            user: current_user(),
            host: current_host(),
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn pwd_str(&self) -> String {
        self.pwd.to_string_lossy().into_owned()
    }

    /// Fields every template can reference next to the segment's own record.
    pub fn template_globals(&self) -> Map<String, Value> {
        let mut globals = Map::new();
        globals.insert("Shell".to_string(), json!(self.shell.as_str()));
        globals.insert("PWD".to_string(), json!(self.pwd_str()));
        globals.insert("UserName".to_string(), json!(self.user));
        globals.insert("HostName".to_string(), json!(self.host));
        globals.insert("Code".to_string(), json!(self.flags.exit_code));
        globals.insert("PromptCount".to_string(), json!(self.flags.prompt_count));
        globals
    }
}

fn current_user() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_default()
}

#[cfg(unix)]
fn current_host() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_default()
}

#[cfg(not(unix))]
fn current_host() -> String {
    env::var("COMPUTERNAME").unwrap_or_default()
}

fn default_session_id() -> String {
    if let Ok(id) = env::var("SHELL_POWERLINE_SESSION_ID") {
        return id;
    }

    #[cfg(unix)]
    {
        std::os::unix::process::parent_id().to_string()
    }

    #[cfg(not(unix))]
    {
        "default".to_string()
    }
}

/// Data source behind one segment: gathers facts and exposes them as a record
/// for templating.
#[async_trait]
pub trait Provider: Send + Sync {
    fn init(&mut self, options: &Map<String, Value>, env: &Environment);

    /// Gather data; `false` hides the segment.
    async fn enabled(&mut self) -> bool;

    /// Template used when the segment configures none.
    fn template(&self) -> &str;

    fn record(&self) -> Value;

    /// Scope for the `folder` cache strategy when it differs from the working
    /// directory. Called right after `init`.
    fn cache_key(&self) -> Option<String> {
        None
    }
}

pub type ProviderFactory = Arc<dyn Fn() -> Box<dyn Provider> + Send + Sync>;

/// Segment type tag to provider constructor.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("text", || Box::new(TextProvider::default()));
        registry.register("path", || Box::new(PathProvider::default()));
        registry.register("git", || Box::new(GitProvider::default()));
        registry.register("command", || Box::new(CommandProvider::default()));
        registry.register("time", || Box::new(TimeProvider::default()));
        registry.register("status", || Box::new(StatusProvider::default()));
        registry
    }

    pub fn register<F>(&mut self, tag: &str, factory: F)
    where
        F: Fn() -> Box<dyn Provider> + Send + Sync + 'static,
    {
        self.factories.insert(tag.to_string(), Arc::new(factory));
    }

    pub fn create(&self, tag: &str) -> Option<Box<dyn Provider>> {
        self.factories.get(tag).map(|factory| factory())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

/// Read a string option, falling back to `default`.
pub fn option_str<'a>(options: &'a Map<String, Value>, key: &str, default: &'a str) -> &'a str {
    options.get(key).and_then(Value::as_str).unwrap_or(default)
}

pub fn option_bool(options: &Map<String, Value>, key: &str, default: bool) -> bool {
    options.get(key).and_then(Value::as_bool).unwrap_or(default)
}
