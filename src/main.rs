//! # claimcheck CLI
//!
//! Verifies natural-language claims through a four-stage model pipeline
//! backed by vector and web evidence.
//!
//! ## Usage
//!
//! ```bash
//! claimcheck --config ./config/claimcheck.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `claimcheck check "<statement>"` | Verify one statement |
//! | `claimcheck batch <file>` | Verify one statement per line, JSON array on stdout |
//! | `claimcheck providers` | Report which credentials are configured |
//! | `claimcheck serve` | Start the HTTP API |
//!
//! Logs go to stderr; `RUST_LOG` overrides the level chosen by `--verbose`.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use claimcheck::config::{self, env_credential, Config};
use claimcheck::server;
use claimcheck::service::{BatchMode, CheckOutcome, FactChecker};

/// claimcheck: staged, evidence-backed claim verification.
#[derive(Parser)]
#[command(name = "claimcheck", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/claimcheck.toml`. See
    /// `config/claimcheck.example.toml` for every setting.
    #[arg(long, global = true, default_value = "./config/claimcheck.toml")]
    config: PathBuf,

    /// Log at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a single statement.
    Check {
        statement: String,

        /// Always run the pipeline, ignoring any cached result.
        #[arg(long)]
        no_cache: bool,

        /// Print the full record as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Verify every non-blank line of a file.
    Batch {
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = ModeArg::Parallel)]
        mode: ModeArg,

        /// Parallel mode: verifications in flight (defaults to `[batch].max_concurrent`).
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Rate-limited mode: dispatches per second (defaults to `[batch].rate_per_second`).
        #[arg(long)]
        rate: Option<f64>,
    },

    /// Show which model, search, and vector providers are configured.
    ///
    /// Works without a config file.
    Providers,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Parallel,
    RateLimited,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "claimcheck=debug" } else { "claimcheck=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Providers => {
            let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
            print_providers(&cfg);
        }
        Commands::Check {
            statement,
            no_cache,
            json,
        } => {
            if statement.trim().is_empty() {
                bail!("statement must not be empty");
            }
            let cfg = config::load_config(&cli.config)?;
            let checker = FactChecker::from_config(&cfg)?;
            let outcome = checker.check(&statement, !no_cache).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }
        }
        Commands::Batch {
            file,
            mode,
            max_concurrent,
            rate,
        } => {
            let cfg = config::load_config(&cli.config)?;
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read statements file: {}", file.display()))?;
            let statements: Vec<String> = content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();

            let mode = match mode {
                ModeArg::Parallel => BatchMode::Parallel {
                    max_concurrent: max_concurrent.unwrap_or(cfg.batch.max_concurrent),
                },
                ModeArg::RateLimited => BatchMode::RateLimited {
                    rate_per_second: rate.unwrap_or(cfg.batch.rate_per_second),
                },
            };

            let checker = FactChecker::from_config(&cfg)?;
            let results = checker.check_batch(&statements, mode).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Serve => {
            let cfg = config::load_config(&cli.config)?;
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn print_outcome(outcome: &CheckOutcome) {
    let record = &outcome.record;
    println!("Statement: {}", record.statement());
    println!("Domain:    {}", record.domain);
    println!("Verdict:   {}", record.verdict);
    println!(
        "Evidence:  {} web ({}), {} indexed{}",
        record.search_results.len(),
        record.search_source,
        record.retrieved_docs.len(),
        if outcome.cached { "  [cached]" } else { "" }
    );
    println!();
    println!("{}", record.analysis);
}

fn print_providers(cfg: &Config) {
    let status = |var: &str| {
        if env_credential(var).is_some() {
            "OK"
        } else {
            "MISSING"
        }
    };

    println!("{:<12} {:<20} STATUS", "PROVIDER", "CREDENTIAL");
    println!(
        "{:<12} {:<20} {}",
        "gemini",
        cfg.models.api_key_env,
        status(&cfg.models.api_key_env)
    );
    println!(
        "{:<12} {:<20} {}",
        "tavily",
        cfg.search.tavily_api_key_env,
        status(&cfg.search.tavily_api_key_env)
    );
    println!(
        "{:<12} {:<20} {}",
        "brave",
        cfg.search.brave_api_key_env,
        status(&cfg.search.brave_api_key_env)
    );
    println!("{:<12} {:<20} OK", "duckduckgo", "-");
    println!(
        "{:<12} {:<20} {}",
        "vector",
        "-",
        if cfg.vector.is_enabled() {
            cfg.vector.provider.as_str()
        } else {
            "DISABLED"
        }
    );

    if env_credential(&cfg.models.api_key_env).is_none() {
        eprintln!(
            "Warning: {} is not set; check, batch, and serve will refuse to start.",
            cfg.models.api_key_env
        );
    }
}
