//! git-commitx - CLI entry point.

use std::io::{IsTerminal, Write};

use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::{Confirm, Password};
use git2::Repository;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use git_commitx::commit::{Synthesizer, collect_staged, commit_staged};
use git_commitx::config::{self, ConfigOverrides, LlmConfig, Locale};
use git_commitx::error::CommitError;
use git_commitx::llm::{Endpoint, HttpTransport, LiveEvent, ServiceRegistry, UpdateKind, WatchSink};

/// Longest status line drawn while the message streams in.
const STATUS_WIDTH: usize = 72;

/// Write a commit message for the staged changes using an LLM.
#[derive(Parser, Debug)]
#[command(name = "git-commitx")]
#[command(about = "Write a commit message for the staged changes using an LLM")]
#[command(version)]
struct Cli {
    /// API URL of the backend
    #[arg(long)]
    url: Option<String>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// Prompt template (${files} and ${diff} are substituted)
    #[arg(long)]
    prompt: Option<String>,

    /// System instruction
    #[arg(long)]
    system: Option<String>,

    /// Sampling temperature (0-2)
    #[arg(long)]
    temperature: Option<f64>,

    /// Nucleus sampling threshold (0-1]
    #[arg(long)]
    top_p: Option<f64>,

    /// Wire protocol for unknown hosts: ollama, openai or anthropic
    #[arg(long)]
    protocol: Option<String>,

    /// API key (overrides git config and GIT_COMMITX_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Maximum tokens to generate
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Commit without asking for confirmation
    #[arg(short = 'y', long)]
    yes: bool,

    /// Print the message without committing
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            url: self.url.clone(),
            model: self.model.clone(),
            prompt: self.prompt.clone(),
            system: self.system.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            protocol: self.protocol.clone(),
            api_key: self.api_key.clone(),
            max_tokens: self.max_tokens,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Step 1: Find the repository and its staged changes
    let repo = Repository::discover(".")
        .context("Not a git repository. Run git-commitx from within a git repository.")?;

    let changes = match collect_staged(&repo) {
        Ok(changes) => changes,
        Err(CommitError::NoChanges) => {
            println!("No staged changes. Stage files with `git add` first.");
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to collect staged changes"),
    };
    println!("Found {} staged files", changes.changed_files.len());

    // Step 2: Load configuration
    let git_config = repo.config().context("Failed to open git config")?;
    let mut llm = LlmConfig::load(&git_config, &cli.overrides(), Locale::from_env())
        .context("Invalid configuration")?;
    ensure_api_key(&mut llm)?;

    // Step 3: Generate, showing progress on stderr
    let transport = HttpTransport::new().context("Failed to set up HTTP client")?;
    let synthesizer = Synthesizer::new(transport);

    let (sink, rx) = WatchSink::channel();
    let render = tokio::spawn(render_live(rx, std::io::stderr().is_terminal()));

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    println!("Generating commit message with {}...", llm.model);
    let synthesis = synthesizer.synthesize(&changes, &llm, &sink, &cancel).await;
    drop(sink);
    if let Err(e) = render.await {
        debug!("Live output task ended abnormally: {}", e);
    }
    ctrl_c.abort();

    if cancel.is_cancelled() {
        println!("Cancelled. Nothing was committed.");
        return Ok(());
    }

    // Step 4: Show the message and commit
    println!("\n{}\n", synthesis.message);

    if cli.dry_run {
        println!("Dry run complete. No commit created.");
        return Ok(());
    }

    if !cli.yes {
        let confirmed = Confirm::new()
            .with_prompt("Commit with this message?")
            .default(true)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            println!("Commit cancelled.");
            return Ok(());
        }
    }

    let oid = commit_staged(&repo, &synthesis.message).context("Failed to create commit")?;
    let short = oid.to_string();
    println!("✓ Committed {}", &short[..short.len().min(7)]);

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "git_commitx=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Ask for and store an API key if the selected backend needs one.
fn ensure_api_key(llm: &mut LlmConfig) -> Result<()> {
    if llm.api_key().is_some() {
        return Ok(());
    }

    // Resolution errors are reported by the synthesis attempt itself.
    let Ok(endpoint) = Endpoint::parse(&llm.api_url) else {
        return Ok(());
    };
    let Ok(descriptor) = ServiceRegistry::global().resolve(endpoint.hostname(), llm.protocol())
    else {
        return Ok(());
    };
    if !descriptor.requires_api_key() {
        return Ok(());
    }

    if !std::io::stdin().is_terminal() {
        warn!(
            "No API key configured for {}. Set {} or git config --global {}",
            endpoint.hostname(),
            config::API_KEY_ENV_VAR,
            config::config_key("api-key")
        );
        return Ok(());
    }

    let key = Password::new()
        .with_prompt(format!("API key for {}", endpoint.hostname()))
        .interact()
        .context("Failed to read API key")?;
    let key = key.trim().to_string();
    if key.is_empty() {
        return Ok(());
    }

    let mut global = config::open_global_config().context("Failed to open global git config")?;
    config::save_api_key(&mut global, &key).context("Failed to save API key")?;
    println!("Saved API key to global git config.");
    llm.api_key = Some(key);
    Ok(())
}

/// Draw live updates as a single transient status line.
///
/// Updates coalesce to the newest one; a failure is printed once. A
/// cancelled session prints nothing here since nothing will be committed.
async fn render_live(mut rx: watch::Receiver<LiveEvent>, interactive: bool) {
    let mut stderr = std::io::stderr();
    let mut reported = false;
    let mut drawn = false;

    loop {
        let closed = rx.changed().await.is_err();
        let event = rx.borrow_and_update().clone();

        match event {
            LiveEvent::Idle => {}
            LiveEvent::Update(update) if interactive => {
                let label = match update.kind {
                    UpdateKind::Reasoning => "thinking",
                    UpdateKind::Answer => "writing",
                };
                let text = status_text(&update.text);
                let line = match update.kind {
                    UpdateKind::Reasoning => format!("\x1b[2m{}: {}\x1b[0m", label, text),
                    UpdateKind::Answer => format!("{}: {}", label, text),
                };
                let _ = write!(stderr, "\r\x1b[2K{}", line);
                let _ = stderr.flush();
                drawn = true;
            }
            LiveEvent::Update(_) => {}
            LiveEvent::Failed(message) => {
                if !reported {
                    if drawn {
                        let _ = write!(stderr, "\r\x1b[2K");
                        drawn = false;
                    }
                    let _ = writeln!(stderr, "Warning: {}", message);
                    let _ = writeln!(stderr, "Using a locally generated message instead.");
                    reported = true;
                }
            }
            LiveEvent::Cancelled => {
                if drawn {
                    let _ = write!(stderr, "\r\x1b[2K");
                    let _ = stderr.flush();
                    drawn = false;
                }
                reported = true;
            }
        }

        if closed {
            if drawn {
                let _ = write!(stderr, "\r\x1b[2K");
                let _ = stderr.flush();
            }
            break;
        }
    }
}

/// Last line of `text`, cut to fit the status line.
fn status_text(text: &str) -> String {
    let line = text.trim().lines().last().unwrap_or_default().trim();
    let count = line.chars().count();
    if count <= STATUS_WIDTH {
        line.to_string()
    } else {
        let tail: String = line.chars().skip(count - STATUS_WIDTH + 1).collect();
        format!("…{}", tail)
    }
}
