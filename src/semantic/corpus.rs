//! Reference title corpus loading.
//!
//! The corpus is JSON: an array of title strings, or of objects with a
//! `title` and an optional `id`. An object wrapping that array under `items`
//! is accepted too. It comes from the publication feed URL or a local file.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::SemanticError;
use crate::http_client::{HttpTimeouts, build_http_client};
use crate::user_agent;

/// One title of the reference corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTitle {
    pub id: Option<String>,
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CorpusDocument {
    List(Vec<CorpusEntry>),
    Wrapped { items: Vec<CorpusEntry> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CorpusEntry {
    Title(String),
    Record {
        title: Option<String>,
        #[serde(default)]
        id: Option<Value>,
    },
}

/// Parses a corpus document, dropping entries without a title.
///
/// # Errors
///
/// Returns [`SemanticError::Corpus`] when the JSON has an unexpected shape or
/// contains no titles.
pub fn parse_corpus(json: &str) -> Result<Vec<ReferenceTitle>, SemanticError> {
    let document: CorpusDocument = serde_json::from_str(json)
        .map_err(|e| SemanticError::corpus(format!("unexpected corpus format: {e}")))?;

    let entries = match document {
        CorpusDocument::List(entries) | CorpusDocument::Wrapped { items: entries } => entries,
    };
    let total = entries.len();

    let titles: Vec<ReferenceTitle> = entries
        .into_iter()
        .filter_map(|entry| {
            let (id, title) = match entry {
                CorpusEntry::Title(title) => (None, title),
                CorpusEntry::Record { title, id } => (id.map(render_id), title?),
            };
            let title = title.trim().to_string();
            (!title.is_empty()).then_some(ReferenceTitle { id, title })
        })
        .collect();

    if titles.len() < total {
        warn!(dropped = total - titles.len(), "corpus entries without title dropped");
    }
    if titles.is_empty() {
        return Err(SemanticError::corpus("corpus contains no titles"));
    }
    Ok(titles)
}

fn render_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Reads the corpus from a local JSON file.
///
/// # Errors
///
/// Returns [`SemanticError::Corpus`] if the file cannot be read or parsed.
#[instrument(skip(path), fields(path = %path.display()))]
pub async fn load_corpus_file(path: &Path) -> Result<Vec<ReferenceTitle>, SemanticError> {
    let json = tokio::fs::read_to_string(path).await.map_err(|e| {
        SemanticError::corpus(format!("cannot read {}: {e}", path.display()))
    })?;
    let titles = parse_corpus(&json)?;
    info!(titles = titles.len(), "loaded reference corpus from file");
    Ok(titles)
}

/// Fetches the corpus from the publication feed.
///
/// # Errors
///
/// Returns [`SemanticError`] if the feed is unreachable, answers with a
/// non-success status or returns an unusable document.
#[instrument(skip(timeouts))]
pub async fn fetch_corpus(
    feed_url: &str,
    timeouts: HttpTimeouts,
) -> Result<Vec<ReferenceTitle>, SemanticError> {
    let client = build_http_client("publication-feed", user_agent::default_user_agent(), timeouts)?;

    debug!("fetching reference corpus");
    let response = client
        .get(feed_url)
        .send()
        .await
        .map_err(|e| SemanticError::corpus(format!("cannot reach publication feed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SemanticError::corpus(format!(
            "publication feed returned HTTP {}",
            status.as_u16()
        )));
    }

    let json = response
        .text()
        .await
        .map_err(|e| SemanticError::corpus(format!("cannot read publication feed: {e}")))?;
    let titles = parse_corpus(&json)?;
    info!(titles = titles.len(), "fetched reference corpus");
    Ok(titles)
}
