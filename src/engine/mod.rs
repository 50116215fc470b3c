pub mod block;
pub mod debug;
pub mod scheduler;
pub mod streaming;

pub use block::*;
pub use scheduler::*;

use crate::color::{ColorCycle, ColorResolver};
use crate::config::{Alignment, BlockConfig, BlockType, Config, Overflow};
use crate::segments::{Environment, Outcome, ProviderRegistry, Segment};
use crate::template::{self, Context, SegmentData};
use crate::terminal::{quote_posix, truncate_markup, Shell, Writer};
use crate::utils::CacheStore;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Columns kept free between left content and a right-aligned block.
const BREATHING_ROOM: i64 = 5;
const RPROMPT_BREATHING_ROOM: i64 = 30;

/// Assembles blocks into the final prompt for one shell.
///
/// Segments are executed once per [`Engine::primary`]; later renders reuse
/// their results, which is what streaming builds on.
pub struct Engine {
    config: Arc<Config>,
    env: Arc<Environment>,
    scheduler: Scheduler,
    writer: Writer,
    cycle: ColorCycle,
    globals: Map<String, Value>,
    blocks: Vec<Vec<Segment>>,
    executed: HashSet<String>,

    prompt: String,
    current_line_length: usize,
    rprompt: String,
    rprompt_length: usize,
}

impl Engine {
    pub fn new(
        config: Config,
        env: Environment,
        registry: ProviderRegistry,
        cache: CacheStore,
    ) -> Self {
        let env = Arc::new(env);

        let mut writer = Writer::new(
            env.shell,
            ColorResolver::new(config.make_colors(true_color_supported())),
        );
        writer.plain = env.flags.plain;
        writer.terminal_background = config.terminal_background.clone();

        let scheduler = Scheduler::new(
            Arc::new(registry),
            Arc::clone(&env),
            cache,
            SegmentData::new(),
        );

        Self {
            cycle: config.color_cycle(),
            blocks: vec![Vec::new(); config.blocks.len()],
            globals: env.template_globals(),
            config: Arc::new(config),
            env,
            scheduler,
            writer,
            executed: HashSet::new(),
            prompt: String::new(),
            current_line_length: 0,
            rprompt: String::new(),
            rprompt_length: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn cache(&self) -> &CacheStore {
        self.scheduler.cache()
    }

    /// Segments of every block as of the last render, in configuration order.
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.blocks.iter().flatten()
    }

    /// Execute every segment and render the full prompt.
    pub async fn primary(&mut self) -> String {
        self.executed.clear();
        self.scheduler.data().clear();
        self.blocks = vec![Vec::new(); self.config.blocks.len()];

        self.primary_internal(false).await
    }

    /// Render the prompt again from the results the last [`Engine::primary`]
    /// produced, including any updates applied since.
    pub async fn rerender(&mut self) -> String {
        self.primary_internal(true).await
    }

    /// Give segments that timed out up to `background_wait` to finish so the
    /// next prompt restores them from the cache. Returns how many were left.
    pub async fn wait_background(&self) -> usize {
        let limit = Duration::from_millis(self.config.background_wait);
        self.scheduler.drain(limit).await
    }

    /// Segments still waiting on background work.
    pub fn pending_count(&self) -> usize {
        self.segments().filter(|segment| segment.pending).count()
    }

    /// Take over a background completion. The segment leaves the pending
    /// state here, on the task that renders.
    pub fn apply_update(&mut self, update: PendingUpdate) {
        let Some(segment) = self
            .blocks
            .get_mut(update.block)
            .and_then(|segments| segments.get_mut(update.index))
        else {
            warn!(block = update.block, index = update.index, "update for an unknown segment");
            return;
        };

        match update.execution {
            Some(execution) => segment.apply(Outcome::Executed(execution)),
            None => segment.apply(Outcome::Disabled),
        }

        debug!(segment = %segment.name(), enabled = segment.enabled, "pending segment completed");

        let data = self.scheduler.data();
        if segment.enabled {
            data.insert(segment.name(), segment.record.clone());
        } else {
            data.remove(segment.name());
        }
    }

    async fn primary_internal(&mut self, from_cache: bool) -> String {
        self.prompt.clear();
        self.current_line_length = 0;
        self.rprompt.clear();
        self.rprompt_length = 0;

        let needs_rprompt = self.needs_primary_right_prompt();
        self.write_primary_prompt(needs_rprompt, from_cache).await;

        if self.env.shell == Shell::Zsh && self.env.flags.eval {
            let prompt = std::mem::take(&mut self.prompt);
            return format!(
                "PS1={}\nRPROMPT={}",
                quote_posix(&prompt),
                quote_posix(&self.rprompt)
            );
        }

        if needs_rprompt {
            self.write_primary_right_prompt();
        }

        std::mem::take(&mut self.prompt)
    }

    fn needs_primary_right_prompt(&self) -> bool {
        self.env.flags.debug || matches!(self.env.shell, Shell::Pwsh | Shell::Generic | Shell::Zsh)
    }

    async fn write_primary_prompt(&mut self, needs_rprompt: bool, from_cache: bool) {
        let env = Arc::clone(&self.env);

        if self.config.shell_integration {
            let finished = self
                .writer
                .command_finished(env.flags.exit_code, env.flags.no_exit_code);
            let start = self.writer.prompt_start();
            self.write(&finished);
            self.write(&start);
        }

        self.cycle = self.config.color_cycle();
        self.writer.reset_colors();

        let config = Arc::clone(&self.config);
        let mut did_render = false;

        for (index, block) in config.blocks.iter().enumerate() {
            let cancel_newline = if index == 0 {
                env.flags.cleared || env.flags.prompt_count == 1
            } else {
                !did_render
            };

            if block.block_type == BlockType::Rprompt && !needs_rprompt {
                continue;
            }

            let (text, length) = match block.block_type {
                BlockType::Newline => (String::new(), 0),
                _ if from_cache => self.compose_block(index, block),
                _ => self.execute_block(index, block).await,
            };

            if self.write_block(block, cancel_newline, &text, length) {
                did_render = true;
            }
        }

        if !config.console_title_template.is_empty() && !env.flags.plain {
            let title = self.render_global(&config.console_title_template);
            let title = self.writer.format_title(&title);
            self.write(&title);
        }

        if config.final_space {
            self.write(" ");
            self.current_line_length += 1;
        }

        if config.shell_integration {
            let start = self.writer.command_start();
            self.write(&start);
        }

        self.pwd();
    }

    /// Execute a block's segments and compose them as they become ready.
    async fn execute_block(&mut self, index: usize, block: &BlockConfig) -> (String, usize) {
        let mut segments: Vec<Segment> = block.segments.iter().cloned().map(Segment::new).collect();

        let mut composer = BlockComposer::new(&mut self.writer, &mut self.cycle, block);
        self.scheduler
            .run(
                index,
                &mut segments,
                &mut self.executed,
                &self.globals,
                &self.config.pending_text,
                |_, segment| composer.write_segment(segment),
            )
            .await;
        let output = composer.finish();

        self.blocks[index] = segments;
        output
    }

    /// Compose a block from segments that already executed.
    fn compose_block(&mut self, index: usize, block: &BlockConfig) -> (String, usize) {
        let mut segments = std::mem::take(&mut self.blocks[index]);

        let mut composer = BlockComposer::new(&mut self.writer, &mut self.cycle, block);
        for segment in segments.iter_mut() {
            self.scheduler
                .render(segment, &self.globals, &self.config.pending_text);
            composer.write_segment(segment);
        }
        let output = composer.finish();

        self.blocks[index] = segments;
        output
    }

    /// Place a composed block on the prompt. Returns whether it produced
    /// anything.
    fn write_block(&mut self, block: &BlockConfig, cancel_newline: bool, text: &str, length: usize) -> bool {
        if block.block_type == BlockType::Newline {
            if !cancel_newline {
                self.write_newline();
            }
            return false;
        }

        if block.newline && !cancel_newline {
            self.write_newline();
        }

        if length == 0 {
            return false;
        }

        match block.block_type {
            BlockType::Prompt => {
                if block.vertical_offset != 0 {
                    let change = self.writer.change_line(block.vertical_offset);
                    self.write(&change);
                }

                match block.alignment {
                    Alignment::Left => {
                        self.current_line_length += length;
                        self.write(text);
                    }
                    Alignment::Right => self.write_right_block(block, text, length),
                }
            }
            BlockType::Rprompt => {
                self.rprompt = text.to_string();
                self.rprompt_length = length;
            }
            BlockType::Newline => {}
        }

        true
    }

    fn write_right_block(&mut self, block: &BlockConfig, text: &str, length: usize) {
        let (mut space, fits) = self.can_write_right_block(length, false);

        if !fits {
            match block.overflow {
                Some(Overflow::Break) => {
                    self.write_newline();
                    space = self.can_write_right_block(length, false).0;
                }
                Some(Overflow::Hide) => {
                    if let Some(padding) = self.should_fill(&block.filler, space + length as i64) {
                        self.write(&padding);
                    }
                    self.current_line_length = 0;
                    return;
                }
                None => {}
            }
        }

        match self.should_fill(&block.filler, space) {
            Some(padding) => self.write(&padding),
            None if space > 0 => self.write(&" ".repeat(space as usize)),
            None => {}
        }

        self.write(text);
        self.current_line_length = 0;
    }

    /// Columns left between the current line and a right block of `length`,
    /// and whether the block fits.
    fn can_write_right_block(&self, length: usize, rprompt: bool) -> (i64, bool) {
        if rprompt && self.rprompt.is_empty() {
            return (0, false);
        }

        let width = match self.env.flags.terminal_width {
            Some(width) if width > 0 => width as i64,
            _ => return (0, false),
        };

        let current = self.current_line_length as i64;
        let mut available = width - current;

        // The line already wrapped; only the last row counts.
        if available < 0 {
            available = width - current % width;
        }

        available -= length as i64;

        let breathing_room = if rprompt {
            RPROMPT_BREATHING_ROOM
        } else {
            BREATHING_ROOM
        };

        (available, available >= breathing_room)
    }

    /// Tile `filler` across `padding` columns, truncating the last copy.
    fn should_fill(&mut self, filler: &str, padding: i64) -> Option<String> {
        if filler.is_empty() || padding <= 0 {
            return None;
        }

        self.writer.write("", "", filler);
        let (tile, length) = self.writer.string();
        if length == 0 {
            return None;
        }

        let padding = padding as usize;
        let mut fill = tile.repeat(padding / length);

        let remainder = padding % length;
        if remainder > 0 {
            self.writer.write("", "", &truncate_markup(filler, remainder));
            let (partial, partial_length) = self.writer.string();
            fill.push_str(&partial);
            fill.push_str(&" ".repeat(remainder.saturating_sub(partial_length)));
        }

        Some(fill)
    }

    fn write_primary_right_prompt(&mut self) {
        let (space, fits) = self.can_write_right_block(self.rprompt_length, true);
        if !fits {
            return;
        }

        let save = self.writer.save_cursor_position();
        let restore = self.writer.restore_cursor_position();
        let rprompt = std::mem::take(&mut self.rprompt);

        self.write(save);
        self.write(&" ".repeat(space.max(0) as usize));
        self.write(&rprompt);
        self.write(restore);

        self.rprompt = rprompt;
    }

    fn write_newline(&mut self) {
        self.current_line_length = 0;

        let newline = if self.env.shell == Shell::Tcsh { " \n" } else { "\n" };
        self.write(newline);
    }

    fn pwd(&mut self) {
        if matches!(self.env.shell, Shell::Elvish | Shell::Xonsh) || self.config.pwd.is_empty() {
            return;
        }

        let kind = self.render_global(&self.config.pwd.clone());
        if kind.is_empty() {
            return;
        }

        let pwd = self
            .writer
            .pwd(&kind, &self.env.user, &self.env.host, &self.env.pwd_str());
        self.write(&pwd);
    }

    fn render_global(&self, source: &str) -> String {
        let record = Value::Null;
        let ctx = Context::new(&record, &self.globals).with_segments(self.scheduler.data());
        match template::render(source, &ctx) {
            Ok(text) => text,
            Err(err) => {
                debug!(error = %err, "failed to render template");
                String::new()
            }
        }
    }

    fn write(&mut self, text: &str) {
        self.prompt.push_str(text);
    }
}

fn true_color_supported() -> bool {
    env::var("TERM_PROGRAM").map_or(true, |program| program != "Apple_Terminal")
}
