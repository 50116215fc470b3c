use anyhow::{Context, Result};
use pico_args::Arguments;
use shell_powerline::*;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug)]
struct Args {
    shell: Shell,
    config: Option<PathBuf>,
    plain: bool,
    streaming: bool,
    force: bool,
    eval: bool,
    debug: bool,
    terminal_width: Option<usize>,
    pwd: Option<PathBuf>,
    session_id: Option<String>,
    status: Option<i32>,
    prompt_count: u32,
    cleared: bool,
    help: bool,
}

impl Args {
    fn from_env() -> Result<Self> {
        let mut args = Arguments::from_env();

        // `print` is the only command and may be omitted.
        let _ = args.subcommand()?;

        let parsed = Self {
            shell: args
                .opt_value_from_str("--shell")?
                .unwrap_or_else(shell_from_env),
            config: args.opt_value_from_str("--config")?,
            plain: args.contains("--plain"),
            streaming: args.contains("--streaming"),
            force: args.contains("--force"),
            eval: args.contains("--eval"),
            debug: args.contains("--debug"),
            terminal_width: args
                .opt_value_from_str("--terminal-width")?
                .or_else(|| env::var("COLUMNS").ok().and_then(|value| value.parse().ok())),
            pwd: args.opt_value_from_str("--pwd")?,
            session_id: args.opt_value_from_str("--session-id")?,
            status: args.opt_value_from_str("--status")?,
            prompt_count: args.opt_value_from_str("--prompt-count")?.unwrap_or(0),
            cleared: args.contains("--cleared"),
            help: args.contains(["-h", "--help"]),
        };

        let unused = args.finish();
        if !unused.is_empty() {
            anyhow::bail!("unexpected arguments: {:?}", unused);
        }

        Ok(parsed)
    }
}

fn shell_from_env() -> Shell {
    env::var("SHELL")
        .ok()
        .as_deref()
        .and_then(|shell| Path::new(shell).file_name())
        .and_then(|name| name.to_str())
        .and_then(|name| name.parse().ok())
        .unwrap_or(Shell::Generic)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::from_env()?;

    if args.help {
        print_help();
        return Ok(());
    }

    init_logging(args.debug || utils::debug_enabled());
    let started = Instant::now();

    let (config, config_path) = load_config(args.config.clone()).await?;

    let pwd = match args.pwd.clone() {
        Some(pwd) => pwd,
        None => env::current_dir().context("Failed to read the working directory")?,
    };

    let flags = Flags {
        plain: args.plain,
        streaming: args.streaming,
        force: args.force,
        debug: args.debug,
        eval: args.eval,
        cleared: args.cleared,
        prompt_count: args.prompt_count,
        terminal_width: args.terminal_width,
        exit_code: args.status.unwrap_or(0),
        no_exit_code: args.status.is_none(),
        config_path,
    };

    let mut environment = Environment::new(pwd, args.shell, flags);
    if let Some(session_id) = args.session_id {
        environment = environment.with_session_id(session_id);
    }

    let cache = CacheStore::default_path()
        .map(CacheStore::open)
        .unwrap_or_else(CacheStore::in_memory);

    let mut engine = Engine::new(config, environment, ProviderRegistry::builtin(), cache.clone());

    if args.debug {
        let report = engine.print_debug(started).await;
        println!("{}", report);
        engine.wait_background().await;
    } else if args.streaming {
        let mut prompts = engine.stream_primary();
        while let Some(prompt) = prompts.recv().await {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(prompt.as_bytes())?;
            stdout.write_all(b"\0")?;
            stdout.flush()?;
        }
    } else {
        let prompt = engine.primary().await;
        print!("{}", prompt);
        std::io::stdout().flush()?;
        engine.wait_background().await;
    }

    if let Err(err) = cache.persist().await {
        warn!(error = %err, "failed to persist the segment cache");
    }

    debug!(elapsed = ?started.elapsed(), "prompt rendered");
    Ok(())
}

fn print_help() {
    println!("shell-powerline - Fast, concurrent shell prompt renderer");
    println!();
    println!("USAGE:");
    println!("    shell-powerline [print] [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --shell <NAME>           bash, zsh, tcsh, fish, pwsh, powershell, cmd, nu, elvish, xonsh [default: $SHELL]");
    println!("    --config <FILE>          Custom config file path");
    println!("    --plain                  Write plain text without escape sequences");
    println!("    --streaming              Emit NUL-terminated prompts as slow segments finish");
    println!("    --force                  Ignore cached segment results");
    println!("    --eval                   Print shell assignments (zsh: PS1 and RPROMPT)");
    println!("    --debug                  Print a report of the render");
    println!("    --terminal-width <N>     Terminal width in columns [default: $COLUMNS]");
    println!("    --pwd <DIR>              Working directory to render for");
    println!("    --session-id <ID>        Scope for session cached segments");
    println!("    --status <CODE>          Exit code of the previous command");
    println!("    --prompt-count <N>       Number of prompts shown in this session");
    println!("    --cleared                The screen was just cleared");
    println!("    --help                   Show this help message");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("    SHELL_POWERLINE_CONFIG      Override config path");
    println!("    SHELL_POWERLINE_THEME       Override theme");
    println!("    SHELL_POWERLINE_SESSION_ID  Default session id");
    println!("    SHELL_POWERLINE_LOG         Log filter (tracing EnvFilter syntax)");
    println!("    SHELL_POWERLINE_DEBUG       Enable debug logging");
}
