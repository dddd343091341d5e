//! Pipeline command handlers: extract, resolve-doi, score and run.
//!
//! Never log API keys; clients redact them in their `Debug` output.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use alertminer_core::semantic::{fetch_corpus, load_corpus_file};
use alertminer_core::{
    Config, CrossrefClient, LlmExtractor, OpenAiEmbedder, PassStats, Pipeline, RetryPolicy,
    SemanticScorer, Store,
};
use tracing::info;

use crate::cli::CorpusArgs;

/// Where the reference corpus for scoring comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusSource {
    File(PathBuf),
    Feed(String),
}

impl CorpusSource {
    /// Picks the corpus file from the command line, else the configured feed.
    pub fn resolve(args: &CorpusArgs, config: &Config) -> Result<Self> {
        if let Some(path) = &args.corpus {
            return Ok(Self::File(path.clone()));
        }
        match &config.publication_feed_url {
            Some(url) => Ok(Self::Feed(url.clone())),
            None => bail!(
                "No reference corpus for scoring\n  Set PUBLICATION_FEED_URL or pass --corpus <FILE>."
            ),
        }
    }
}

pub async fn run_extract_command(
    config: &Config,
    store: &Store,
    policy: &RetryPolicy,
) -> Result<PassStats> {
    let api_key = config.require_extraction_api_key()?.clone();
    let extractor = LlmExtractor::new(
        api_key,
        &config.extraction.base_url,
        config.extraction.model.clone(),
        config.http,
    )?;

    let stats = Pipeline::new(store)
        .extraction_pass(&extractor, &config.extraction.query, policy)
        .await?;
    println!("Extraction: {stats}");
    Ok(stats)
}

pub async fn run_resolve_doi_command(config: &Config, store: &Store) -> Result<PassStats> {
    let registry = CrossrefClient::from_settings(&config.crossref, config.http)?;
    info!(
        delay_ms = config.crossref.delay.as_millis(),
        polite_pool = config.crossref.mailto.is_some(),
        "Crossref client ready"
    );

    let stats = Pipeline::new(store).doi_pass(&registry).await?;
    println!("DOI resolution: {stats}");
    Ok(stats)
}

pub async fn run_score_command(
    config: &Config,
    store: &Store,
    source: &CorpusSource,
) -> Result<PassStats> {
    let api_key = config.require_embedding_api_key()?.clone();

    let corpus = match source {
        CorpusSource::File(path) => load_corpus_file(path)
            .await
            .with_context(|| format!("Cannot load corpus file '{}'", path.display()))?,
        CorpusSource::Feed(url) => fetch_corpus(url, config.http)
            .await
            .context("Cannot fetch reference corpus from PUBLICATION_FEED_URL")?,
    };

    let embedder = OpenAiEmbedder::new(
        api_key,
        &config.embedding.base_url,
        config.embedding.model.clone(),
        config.http,
    )?;
    let scorer = SemanticScorer::build(embedder, &corpus).await?;

    let stats = Pipeline::new(store).scoring_pass(&scorer).await?;
    println!("Scoring: {stats}");
    Ok(stats)
}

/// Runs the three passes in order, stopping at the first pass error.
pub async fn run_all_command(
    config: &Config,
    store: &Store,
    policy: &RetryPolicy,
    source: &CorpusSource,
) -> Result<()> {
    config.require_extraction_api_key()?;
    config.require_embedding_api_key()?;

    run_extract_command(config, store, policy).await?;
    run_resolve_doi_command(config, store).await?;
    run_score_command(config, store, source).await?;
    Ok(())
}
