//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use alertminer_core::DEFAULT_MAX_ATTEMPTS;

/// Mine scholarly alert emails into DOI-resolved, similarity-scored results.
///
/// Alertminer extracts bibliographic records from stored alert emails,
/// resolves them to DOIs through Crossref and scores the unresolved ones
/// against a reference publication corpus.
#[derive(Parser, Debug)]
#[command(name = "alertminer")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// SQLite database file (overrides ALERTMINER_DATABASE)
    #[arg(short = 'd', long, global = true, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Delay before each Crossref request in milliseconds (0 to disable, max 60000)
    #[arg(long, global = true, value_name = "MS", value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub crossref_delay_ms: Option<u64>,

    /// Maximum extraction attempts per email for transient failures (1-10)
    #[arg(short = 'r', long, global = true, default_value_t = DEFAULT_MAX_ATTEMPTS as u8, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_attempts: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store raw alert email bodies from HTML files
    Import(ImportArgs),

    /// Extract search results from unprocessed emails
    Extract,

    /// Look up DOIs for extracted search results via Crossref
    ResolveDoi,

    /// Score search results without a DOI against the reference corpus
    Score(CorpusArgs),

    /// Run extraction, DOI resolution and scoring in order
    Run(CorpusArgs),
}

/// Arguments for `import`.
#[derive(ClapArgs, Debug)]
pub struct ImportArgs {
    /// HTML files, one email body each
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Mark the imported emails as spam so extraction skips them
    #[arg(long)]
    pub spam: bool,
}

/// Reference corpus source for scoring.
#[derive(ClapArgs, Debug)]
pub struct CorpusArgs {
    /// Local JSON corpus file (overrides PUBLICATION_FEED_URL)
    #[arg(long, value_name = "FILE")]
    pub corpus: Option<PathBuf>,
}
