//! CLI entry point for the alertminer tool.

use anyhow::{Context, Result};
use clap::Parser;
use alertminer_core::{Config, Database, RetryPolicy, Store};
use tracing::{debug, info};

mod cli;
mod commands;

use cli::{Args, Command};
use commands::CorpusSource;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let mut config = Config::from_env().context("Invalid configuration")?;
    if let Some(path) = &args.database {
        config.database_path.clone_from(path);
    }
    if let Some(delay_ms) = args.crossref_delay_ms {
        config.set_crossref_delay_ms(delay_ms)?;
    }
    let policy = RetryPolicy::with_max_attempts(u32::from(args.max_attempts));

    let db = Database::new(&config.database_path).await.with_context(|| {
        format!(
            "Cannot open database '{}'",
            config.database_path.display()
        )
    })?;
    let store = Store::new(db.clone());
    info!(database = %config.database_path.display(), "Alertminer starting");

    let result = match &args.command {
        Command::Import(import) => commands::run_import_command(&store, import)
            .await
            .map(|_| ()),
        Command::Extract => commands::run_extract_command(&config, &store, &policy)
            .await
            .map(|_| ()),
        Command::ResolveDoi => commands::run_resolve_doi_command(&config, &store)
            .await
            .map(|_| ()),
        Command::Score(corpus) => match CorpusSource::resolve(corpus, &config) {
            Ok(source) => commands::run_score_command(&config, &store, &source)
                .await
                .map(|_| ()),
            Err(error) => Err(error),
        },
        Command::Run(corpus) => match CorpusSource::resolve(corpus, &config) {
            Ok(source) => commands::run_all_command(&config, &store, &policy, &source).await,
            Err(error) => Err(error),
        },
    };

    db.close().await;
    result
}
