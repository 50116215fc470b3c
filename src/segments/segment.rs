use crate::config::{CacheStrategy, SegmentConfig, SegmentStyle};
use crate::segments::Environment;
use crate::template::{first_match, render, resolve_list, Context, SegmentData};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

static NEEDS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.Segments\.(?P<NAME>[a-zA-Z0-9]+)").expect("valid regex"));

/// What a segment stores in the cache: its record and the provider template
/// needed to render it again without running the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedSegment {
    pub record: Value,
    pub template: String,
}

/// Result of running a provider to completion.
#[derive(Debug, Clone)]
pub struct Execution {
    pub enabled: bool,
    pub record: Value,
    pub template: String,
    pub cache_key: Option<String>,
    pub duration: Duration,
}

impl Execution {
    pub fn disabled(duration: Duration) -> Self {
        Self {
            enabled: false,
            record: Value::Null,
            template: String::new(),
            cache_key: None,
            duration,
        }
    }

    pub fn cached(&self) -> CachedSegment {
        CachedSegment {
            record: self.record.clone(),
            template: self.template.clone(),
        }
    }
}

/// How a segment task reported back to the dispatcher.
#[derive(Debug, Clone)]
pub enum Outcome {
    Executed(Execution),
    /// Seeded from the cache. `refreshing` means the provider still runs in
    /// the background and the segment stays pending until it reports.
    Restored {
        cached: CachedSegment,
        cache_key: String,
        refreshing: bool,
    },
    /// Timed out; the provider keeps running in the background.
    Pending { elapsed: Duration },
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub strategy: CacheStrategy,
    pub ttl: Duration,
}

/// One configured segment and its render state for the current prompt.
#[derive(Debug, Clone)]
pub struct Segment {
    pub config: SegmentConfig,
    name: String,
    needs: Vec<String>,
    cache_policy: Option<CachePolicy>,

    pub enabled: bool,
    pub pending: bool,
    pub restored: bool,
    pub text: String,
    pub record: Value,
    /// Provider default template.
    pub template: String,
    pub cache_key: Option<String>,
    pub duration: Duration,

    /// Color expressions after `*_templates` evaluation.
    pub background: String,
    pub foreground: String,

    unsaved: bool,
}

impl Segment {
    pub fn new(config: SegmentConfig) -> Self {
        let name = match config.alias.as_deref() {
            Some(alias) if !alias.is_empty() => alias.to_string(),
            _ => title_case(&config.segment_type),
        };

        let needs = infer_needs(&name, &config);
        let cache_policy = config.cache.as_ref().and_then(|cache| match cache.ttl() {
            Ok(ttl) => Some(CachePolicy {
                strategy: cache.strategy,
                ttl,
            }),
            Err(err) => {
                debug!(segment = %name, error = %err, "ignoring cache policy");
                None
            }
        });

        Self {
            background: config.background.clone(),
            foreground: config.foreground.clone(),
            config,
            name,
            needs,
            cache_policy,
            enabled: false,
            pending: false,
            restored: false,
            text: String::new(),
            record: Value::Null,
            template: String::new(),
            cache_key: None,
            duration: Duration::ZERO,
            unsaved: false,
        }
    }

    /// Alias, or the title-cased type (`git` becomes `Git`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Other segments referenced through `.Segments.<Name>`, plus declared needs.
    pub fn needs(&self) -> &[String] {
        &self.needs
    }

    pub fn cache_policy(&self) -> Option<CachePolicy> {
        self.cache_policy
    }

    pub fn style(&self) -> SegmentStyle {
        self.config.style
    }

    pub fn is_powerline(&self) -> bool {
        matches!(self.style(), SegmentStyle::Powerline | SegmentStyle::Accordion)
    }

    /// Enabled, or waiting on a background completion.
    pub fn is_visible(&self) -> bool {
        self.enabled || self.pending
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.config.timeout > 0).then(|| Duration::from_millis(self.config.timeout))
    }

    /// Cache key for this segment under `strategy`. `folder` defaults to the
    /// working directory unless the provider narrows it.
    pub fn scope_key(
        name: &str,
        strategy: CacheStrategy,
        folder: Option<String>,
        env: &Environment,
    ) -> String {
        match strategy {
            CacheStrategy::Folder => format!(
                "segment_cache_{}_{}",
                name,
                folder.unwrap_or_else(|| env.pwd_str())
            ),
            CacheStrategy::Session => format!("segment_cache_{}_{}", name, env.session_id),
            CacheStrategy::Device => format!("segment_cache_{}", name),
        }
    }

    /// Take over a task outcome. Only the dispatcher and the streaming loop
    /// call this, so the render state has a single writer.
    pub fn apply(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Executed(execution) => {
                self.enabled = execution.enabled;
                self.record = execution.record;
                self.template = execution.template;
                self.cache_key = execution.cache_key;
                self.duration = execution.duration;
                self.pending = false;
                self.restored = false;
                self.unsaved = true;
            }
            Outcome::Restored {
                cached,
                cache_key,
                refreshing,
            } => {
                self.enabled = true;
                self.record = cached.record;
                self.template = cached.template;
                self.cache_key = Some(cache_key);
                self.restored = true;
                self.pending = refreshing;
                self.unsaved = false;
            }
            Outcome::Pending { elapsed } => {
                self.enabled = false;
                self.pending = true;
                self.restored = false;
                self.duration = elapsed;
                self.unsaved = false;
            }
            Outcome::Disabled => self.disable(),
        }
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        self.pending = false;
        self.restored = false;
        self.unsaved = false;
        self.text.clear();
    }

    /// Render text and colors. Returns whether the segment has something to show.
    pub fn render(
        &mut self,
        globals: &Map<String, Value>,
        data: &SegmentData,
        pending_text: &str,
    ) -> bool {
        if self.pending && !self.restored {
            self.text = pending_text.to_string();
            let ctx = Context::new(&self.record, globals).with_segments(data);
            (self.background, self.foreground) = self.resolve_colors(&ctx);
            return true;
        }

        if !self.enabled && !self.config.force {
            self.text.clear();
            return false;
        }

        let text = {
            let ctx = Context::new(&self.record, globals).with_segments(data);
            self.render_text(&ctx)
        };

        self.enabled = self.config.force || text.chars().any(|c| c != ' ');

        if !self.enabled {
            data.remove(&self.name);
            self.text.clear();
            return false;
        }

        self.text = text;

        // `.Text` becomes visible to segments rendered after this one.
        data.insert(&self.name, self.record_object());
        data.set_text(&self.name, &self.text);

        let ctx = Context::new(&self.record, globals).with_segments(data);
        (self.background, self.foreground) = self.resolve_colors(&ctx);

        true
    }

    fn record_object(&self) -> Value {
        match &self.record {
            Value::Object(_) => self.record.clone(),
            _ => Value::Object(Map::new()),
        }
    }

    fn render_text(&self, ctx: &Context<'_>) -> String {
        if !self.config.templates.is_empty() {
            let text = resolve_list(&self.config.templates, ctx, self.config.templates_logic);
            if !text.is_empty() {
                return text;
            }
        }

        let source = match self.config.template.as_deref() {
            Some(template) if !template.is_empty() => template,
            _ => self.template.as_str(),
        };

        match render(source, ctx) {
            Ok(text) => text,
            Err(err) => {
                debug!(segment = %self.name, error = %err, "template failed");
                err.to_string()
            }
        }
    }

    /// First matching `*_templates` entry, else the static color.
    fn resolve_colors(&self, ctx: &Context<'_>) -> (String, String) {
        let background = if self.config.background_templates.is_empty() {
            self.config.background.clone()
        } else {
            first_match(&self.config.background_templates, ctx, &self.config.background)
        };

        let foreground = if self.config.foreground_templates.is_empty() {
            self.config.foreground.clone()
        } else {
            first_match(&self.config.foreground_templates, ctx, &self.config.foreground)
        };

        (background, foreground)
    }

    /// The cache write owed after a fresh, non-pending render.
    pub fn take_unsaved(&mut self) -> Option<(String, CachedSegment, Duration)> {
        if !std::mem::take(&mut self.unsaved) {
            return None;
        }

        if !self.enabled || self.pending || self.restored {
            return None;
        }

        let policy = self.cache_policy?;
        let key = self.cache_key.clone()?;

        Some((
            key,
            CachedSegment {
                record: self.record.clone(),
                template: self.template.clone(),
            },
            policy.ttl,
        ))
    }
}

/// `min_width` / `max_width` against the terminal width. Both zero never hides.
pub fn should_hide_for_width(width: Option<usize>, min_width: usize, max_width: usize) -> bool {
    if min_width == 0 && max_width == 0 {
        return false;
    }

    let Some(width) = width.filter(|width| *width > 0) else {
        return false;
    };

    if min_width > 0 && width < min_width {
        return true;
    }

    max_width > 0 && width > max_width
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut start_of_word = true;

    for c in text.chars() {
        if start_of_word {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        start_of_word = !c.is_alphanumeric();
    }

    out
}

fn infer_needs(name: &str, config: &SegmentConfig) -> Vec<String> {
    let mut needs: Vec<String> = Vec::new();

    let sources = config
        .template
        .iter()
        .chain(&config.templates)
        .chain(&config.foreground_templates)
        .chain(&config.background_templates);

    let inferred = sources.flat_map(|source| {
        NEEDS_REGEX
            .captures_iter(source)
            .filter_map(|captures| captures.name("NAME"))
            .map(|m| m.as_str().to_string())
            .collect::<Vec<_>>()
    });

    for need in config.needs.iter().cloned().chain(inferred) {
        if need != name && !needs.contains(&need) {
            needs.push(need);
        }
    }

    needs
}
