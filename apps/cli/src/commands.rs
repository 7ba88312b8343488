//! CLI command definitions, routing, and tracing setup.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use docqa_core::Assistant;
use docqa_domains::DomainAllowList;
use docqa_shared::{
    AppConfig, LoopOutcome, SessionId, TerminationReason, init_config, load_config,
    validate_api_keys,
};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// docqa — answers grounded in a curated set of documentation sites.
#[derive(Parser)]
#[command(
    name = "docqa",
    version,
    about = "Ask questions answered only from an allow-list of documentation sites.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Allow-list CSV (overrides `[domains] source` and DOCQA_SITES_FILE).
    #[arg(long, global = true)]
    pub sites: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ask a single question.
    Ask {
        /// The question.
        #[arg(required = true, trailing_var_arg = true)]
        question: Vec<String>,

        /// Session id for this request. Memory lives only in the running
        /// process, so a one-shot `ask` always starts with an empty history.
        #[arg(short, long)]
        session: Option<String>,

        /// Clear the session's memory before asking.
        #[arg(long)]
        reset: bool,

        /// Print the full outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Interactive conversation (`/reset` clears memory, `/exit` quits).
    Chat {
        /// Session id to use (a new one is generated if omitted).
        #[arg(short, long)]
        session: Option<String>,
    },

    /// List the documentation sites in the allow-list.
    Domains,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr; answers go to stdout.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "docqa=warn",
        1 => "docqa=info",
        2 => "docqa=debug",
        _ => "docqa=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let sites = cli.sites.as_deref();
    match cli.command {
        Command::Ask {
            question,
            session,
            reset,
            json,
        } => cmd_ask(sites, &question.join(" "), session, reset, json).await,
        Command::Chat { session } => cmd_chat(sites, session).await,
        Command::Domains => cmd_domains(sites),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(sites),
        },
    }
}

/// Config file, then `DOCQA_*` environment, then `--sites`.
fn resolve_config(sites: Option<&Path>) -> Result<AppConfig> {
    let mut config = load_config()?;
    config.apply_env_overrides();
    if let Some(path) = sites {
        config.domains.source = path.display().to_string();
    }
    config.validate()?;
    Ok(config)
}

fn load_allow_list(config: &AppConfig) -> Arc<DomainAllowList> {
    Arc::new(DomainAllowList::load(Path::new(&config.domains.source)))
}

fn build_assistant(sites: Option<&Path>) -> Result<Assistant> {
    let config = resolve_config(sites)?;
    validate_api_keys(&config)?;

    let allow_list = load_allow_list(&config);
    info!(
        instance = %config.agent.instance_name,
        sites = allow_list.len(),
        model = %config.openrouter.model,
        "assistant ready"
    );
    Ok(Assistant::from_config(&config, allow_list)?)
}

fn session_id(session: Option<String>) -> SessionId {
    session.map(SessionId::new).unwrap_or_else(SessionId::generate)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ask(
    sites: Option<&Path>,
    question: &str,
    session: Option<String>,
    reset: bool,
    json: bool,
) -> Result<()> {
    let assistant = build_assistant(sites)?;
    let id = session_id(session);

    let spinner = Spinner::start("Researching...");
    let outcome = assistant.ask_with_reset(&id, question, reset).await;
    spinner.finish();
    let outcome = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

async fn cmd_chat(sites: Option<&Path>, session: Option<String>) -> Result<()> {
    let assistant = build_assistant(sites)?;
    let sweeper = assistant.spawn_sweeper();
    let id = session_id(session);

    if assistant.allow_list().is_empty() {
        eprintln!("warning: no documentation sites are configured; answers cannot cite sources.");
    }
    println!("docqa chat (session {id}). Type /reset to clear memory, /exit to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/exit" | "/quit" => break,
            "/reset" => {
                assistant.reset(&id);
                println!("Memory cleared.");
            }
            question => {
                let spinner = Spinner::start("Researching...");
                let outcome = assistant.ask(&id, question).await;
                spinner.finish();
                match outcome {
                    Ok(outcome) => print_outcome(&outcome),
                    Err(e) => eprintln!("error: {e}"),
                }
            }
        }
    }

    sweeper.abort();
    Ok(())
}

fn cmd_domains(sites: Option<&Path>) -> Result<()> {
    let config = resolve_config(sites)?;
    let allow_list = load_allow_list(&config);

    if allow_list.is_empty() {
        eprintln!(
            "warning: no documentation sites loaded from {}",
            config.domains.source
        );
        return Ok(());
    }

    println!();
    for entry in allow_list.entries() {
        println!("  {:<16} {:<32} {}", entry.key, entry.hostname, entry.description);
    }
    println!();
    println!("  {} site(s) from {}", allow_list.len(), config.domains.source);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(sites: Option<&Path>) -> Result<()> {
    let config = resolve_config(sites)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_outcome(outcome: &LoopOutcome) {
    println!();
    println!("{}", outcome.answer.trim());

    if !outcome.used_sources.is_empty() {
        println!();
        println!("  Sources:");
        for url in &outcome.used_sources {
            println!("    - {url}");
        }
    }

    if !outcome.caveats.is_empty() {
        println!();
        println!("  Notes:");
        for caveat in &outcome.caveats {
            println!("    - {caveat}");
        }
    }

    println!();
    if outcome.termination_reason != TerminationReason::Answered {
        println!(
            "  ({}, {} step(s))",
            outcome.termination_reason, outcome.iterations
        );
    }
}

/// Spinner shown on stderr while a question is in flight.
struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    fn start(message: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    fn finish(self) {
        self.bar.finish_and_clear();
    }
}
