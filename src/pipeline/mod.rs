//! Pipeline passes over the record store.
//!
//! Three independent passes, each selecting only the records it has not
//! handled yet, so every pass can be re-run safely:
//!
//! - [`Pipeline::extraction_pass`] turns unprocessed, non-spam emails into
//!   search results.
//! - [`Pipeline::doi_pass`] runs each unresolved link through the DOI state
//!   machine once.
//! - [`Pipeline::scoring_pass`] scores search results that have no DOI.
//!
//! Records are processed one at a time. A record that is malformed or fails
//! its stage is logged and counted; only selection failures, database errors
//! and a scorer that cannot score anything stop a pass.

mod error;
mod stats;

pub use error::PipelineError;
pub use stats::PassStats;

use tokio::sync::OnceCell;
use tracing::{error, info, instrument, warn};

use crate::doi::{BibliographicRegistry, DoiResolver, DoiState};
use crate::extract::{
    StructuredExtractor, extract_with_retry, generate_schema, to_new_search_results,
};
use crate::html::{html_to_text, normalize_html};
use crate::retry::RetryPolicy;
use crate::semantic::{SemanticError, TitleScorer};
use crate::store::{RecordStore, StoreError};

/// Email log message written when extraction completes.
pub const EMAIL_PARSED_MESSAGE: &str = "Body successfully parsed.";

/// Counts a recoverable store error as a skip; anything else stops the pass.
fn skip_or_abort(
    stats: &mut PassStats,
    id: i64,
    err: StoreError,
) -> Result<(), PipelineError> {
    if err.is_recoverable() {
        warn!(id, error = %err, "skipping record");
        stats.record_skip();
        Ok(())
    } else {
        Err(err.into())
    }
}

/// Runs pipeline passes against a record store.
#[derive(Clone, Copy)]
pub struct Pipeline<'a> {
    store: &'a dyn RecordStore,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self { store }
    }

    /// Extracts search results from every unprocessed, non-spam email.
    ///
    /// The schema for `query` is generated once, on the first email with a
    /// body, so a run over malformed emails makes no service calls. Each email
    /// is normalized, rendered as text and sent to the extractor with retry.
    /// Its search results are then inserted and the email marked processed in
    /// one transaction, even when no results were found.
    ///
    /// An email stays unprocessed, with the reason stored in `last_error`,
    /// when its body is missing, when retries are exhausted, or when records
    /// came back but none of them had a title.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Schema`] if no schema can be generated and
    /// [`PipelineError::Store`] on a database failure.
    #[instrument(skip(self, extractor, policy))]
    pub async fn extraction_pass(
        &self,
        extractor: &dyn StructuredExtractor,
        query: &str,
        policy: &RetryPolicy,
    ) -> Result<PassStats, PipelineError> {
        let ids = self.store.unprocessed_email_ids().await?;
        let mut stats = PassStats::new(ids.len());
        if ids.is_empty() {
            info!("no unprocessed emails");
            return Ok(stats);
        }

        let schema_cell = OnceCell::new();

        for id in ids {
            let email = match self.store.get_email(id).await {
                Ok(email) => email,
                Err(err) => {
                    if matches!(err, StoreError::MalformedRecord { .. }) {
                        self.note_extraction_error(id, &err.to_string()).await?;
                    }
                    skip_or_abort(&mut stats, id, err)?;
                    continue;
                }
            };

            let schema = schema_cell
                .get_or_try_init(|| generate_schema(extractor, query, policy))
                .await
                .map_err(PipelineError::Schema)?;

            let text = html_to_text(&normalize_html(&email.body_html));
            let records = match extract_with_retry(extractor, schema, &text, policy).await {
                Ok(records) => records,
                Err(extraction_error) => {
                    error!(email_id = id, error = %extraction_error, "extraction failed");
                    stats.record_failure();
                    self.note_extraction_error(id, &extraction_error.to_string())
                        .await?;
                    continue;
                }
            };

            let results = to_new_search_results(id, &records);
            if results.is_empty() && !records.is_empty() {
                let message =
                    format!("none of the {} extracted records has a title", records.len());
                error!(email_id = id, records = records.len(), "extracted records unusable");
                stats.record_failure();
                self.note_extraction_error(id, &message).await?;
                continue;
            }

            match self
                .store
                .complete_extraction(id, &results, EMAIL_PARSED_MESSAGE)
                .await
            {
                Ok(result_ids) => {
                    info!(email_id = id, results = result_ids.len(), "email processed");
                    stats.record_success();
                }
                Err(err) => skip_or_abort(&mut stats, id, err)?,
            }
        }

        info!(%stats, "extraction pass complete");
        Ok(stats)
    }

    /// Stores an extraction error on the email; a vanished email is ignored.
    async fn note_extraction_error(&self, id: i64, message: &str) -> Result<(), PipelineError> {
        match self.store.record_extraction_failure(id, message).await {
            Err(err) if !err.is_recoverable() => Err(err.into()),
            _ => Ok(()),
        }
    }

    /// Runs every unresolved link through the DOI state machine.
    ///
    /// A fresh resolver starts at [`DoiState::LinkSearched`] for each search
    /// result. The link is then marked processed and written back whether or
    /// not a DOI was found, so each link is looked up once.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] on a database failure.
    #[instrument(skip(self, registry))]
    pub async fn doi_pass(
        &self,
        registry: &dyn BibliographicRegistry,
    ) -> Result<PassStats, PipelineError> {
        let ids = self.store.pending_doi_ids().await?;
        let mut stats = PassStats::new(ids.len());
        let mut resolved = 0usize;

        for id in ids {
            let result = match self.store.get_search_result(id).await {
                Ok(result) => result,
                Err(err) => {
                    skip_or_abort(&mut stats, id, err)?;
                    continue;
                }
            };

            let mut resolver = DoiResolver::starting_at(registry, DoiState::LinkSearched);
            let mut link = resolver.resolve(result.link, &result.title).await;
            link.is_processed = true;
            link.refresh_doi_success();

            match self.store.update_link(id, &link).await {
                Ok(()) => {
                    if link.is_doi_success {
                        resolved += 1;
                    }
                    stats.record_success();
                }
                Err(err) => skip_or_abort(&mut stats, id, err)?,
            }
        }

        info!(%stats, resolved, "DOI pass complete");
        Ok(stats)
    }

    /// Scores every search result that has no DOI and no score yet.
    ///
    /// A failed score leaves the result unscored for the next run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Scorer`] when the scorer's index is empty and
    /// [`PipelineError::Store`] on a database failure.
    #[instrument(skip(self, scorer))]
    pub async fn scoring_pass(&self, scorer: &dyn TitleScorer) -> Result<PassStats, PipelineError> {
        let ids = self.store.unscored_ids().await?;
        let mut stats = PassStats::new(ids.len());

        for id in ids {
            let result = match self.store.get_search_result(id).await {
                Ok(result) => result,
                Err(err) => {
                    skip_or_abort(&mut stats, id, err)?;
                    continue;
                }
            };

            let score = match scorer.score(&result.title).await {
                Ok(score) => score,
                Err(SemanticError::EmptyIndex) => return Err(SemanticError::EmptyIndex.into()),
                Err(err) => {
                    warn!(id, error = %err, "scoring failed");
                    stats.record_failure();
                    continue;
                }
            };

            match self.store.update_score(id, score).await {
                Ok(()) => stats.record_success(),
                Err(err) => skip_or_abort(&mut stats, id, err)?,
            }
        }

        info!(%stats, "scoring pass complete");
        Ok(stats)
    }
}

impl std::fmt::Debug for Pipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}
