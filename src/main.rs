use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use note_autopost::article::ArticleDraft;
use note_autopost::browser::ChromeBrowser;
use note_autopost::capture::{self, CaptureOptions};
use note_autopost::core::Config;
use note_autopost::flow::{self, FlowState, SiteSelectors};
use note_autopost::session::{SessionStore, DEFAULT_STORAGE_PATH};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

/// Publish Markdown articles to note.com through its web editor
#[derive(Parser)]
#[command(name = "note-autopost")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Site base URL
    #[arg(long, env = "NOTE_BASE_URL", global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a draft or publish an article from a Markdown file
    Publish(PublishArgs),

    /// Sign in interactively and save the session
    Login(LoginArgs),
}

#[derive(Args)]
struct PublishArgs {
    /// Markdown file with front matter
    #[arg(short, long = "in")]
    input: PathBuf,

    /// Saved session from `login`
    #[arg(long, default_value = DEFAULT_STORAGE_PATH)]
    storage: PathBuf,

    /// Publish instead of saving a draft; overrides `status` in the front matter
    #[arg(long, value_name = "true|false")]
    is_public: Option<bool>,

    /// Delay between keystrokes in the body editor, in milliseconds
    #[arg(long, env = "NOTE_EDITOR_DELAY_MS")]
    delay_ms: Option<String>,

    /// Show the browser window
    #[arg(long)]
    headful: bool,

    /// Where debug-*.png/html/json are written
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// JSON file overriding the element selectors
    #[arg(long)]
    selectors: Option<PathBuf>,

    /// Skip the after-navigation checkpoint dump
    #[arg(long)]
    no_checkpoints: bool,
}

#[derive(Args)]
struct LoginArgs {
    /// Where the session is written
    #[arg(long, default_value = DEFAULT_STORAGE_PATH)]
    storage: PathBuf,

    #[arg(long)]
    login_url: Option<String>,

    /// Editor page visited after sign-in so its origin's cookies are captured
    #[arg(long)]
    editor_url: Option<String>,

    /// Seconds to wait for sign-in before asking for Enter
    #[arg(long, default_value_t = 300)]
    wait_secs: u64,
}

fn load_config(cli: &Cli, delay_ms: Option<String>) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_overrides(cli.base_url.clone(), delay_ms)?;
    config.base_url().context("invalid base URL")?;
    Ok(config)
}

async fn publish(cli: &Cli, args: &PublishArgs) -> anyhow::Result<()> {
    let mut config = load_config(cli, args.delay_ms.clone())?;
    if args.headful {
        config.browser.headless = false;
    }
    if let Some(dir) = &args.out_dir {
        config.diagnostics.output_dir = dir.clone();
    }
    if args.no_checkpoints {
        config.diagnostics.checkpoints = false;
    }

    let selectors = match &args.selectors {
        Some(path) => SiteSelectors::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => SiteSelectors::default(),
    };
    let bundle = SessionStore::load(&args.storage).context("run `note-autopost login` first")?;
    let draft = ArticleDraft::load(&args.input, args.is_public)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let mut browser = ChromeBrowser::new();
    let outcome = flow::publish(&mut browser, &config, &selectors, &bundle, &draft).await?;

    for step in &outcome.steps {
        info!(
            "  {}: {} (strategy {:?}, {}ms)",
            step.target,
            if step.succeeded { "ok" } else { "skipped" },
            step.strategy_index,
            step.elapsed.as_millis()
        );
    }
    if outcome.assumed_autosave {
        warn!("Draft was not saved explicitly; check it exists in the editor");
    }
    match outcome.final_state {
        FlowState::Published => info!("Published: {}", draft.title),
        _ => info!("Saved draft: {}", draft.title),
    }
    Ok(())
}

async fn login(cli: &Cli, args: &LoginArgs) -> anyhow::Result<()> {
    let config = load_config(cli, None)?;
    let mut options = CaptureOptions::for_site(&config)?;
    options.storage_path = args.storage.clone();
    options.login_wait = Duration::from_secs(args.wait_secs);
    if let Some(url) = &args.login_url {
        options.login_url = url.clone();
    }
    if let Some(url) = &args.editor_url {
        options.editor_url = url.clone();
    }

    let mut browser = ChromeBrowser::new();
    capture::login(&mut browser, &config, &options).await?;
    info!("Session saved to {}", options.storage_path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let result = match &cli.command {
        Commands::Publish(args) => publish(&cli, args).await,
        Commands::Login(args) => login(&cli, args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
