//! Record store for alert emails and extracted search results.
//!
//! This module provides `SQLite`-backed persistence for the two collections the
//! pipeline works on:
//! - `emails` - raw alert bodies written by the mail ingestion process
//! - `search_results` - one row per extracted bibliographic record, with its
//!   link, DOI resolution outcome and similarity score
//!
//! Each pipeline pass selects the identifiers of records it has not handled
//! yet, reads each record by identifier and writes its outcome back. Reads
//! convert rows into typed records and report missing fields as
//! [`StoreError::MalformedRecord`] so a pass can skip the record.
//!
//! # Example
//!
//! ```ignore
//! use alertminer_core::{Database, Store};
//!
//! let db = Database::new_in_memory().await?;
//! let store = Store::new(db);
//!
//! let email_id = store.insert_email("<html>...</html>", false).await?;
//! for id in store.unprocessed_email_ids().await? {
//!     let email = store.get_email(id).await?;
//!     // ... extract ...
//! }
//! ```

mod error;
mod record;
mod repository;

pub use error::{StoreDbErrorKind, StoreError};
pub use record::{EmailRecord, Link, NewSearchResult, SearchResult};
pub use repository::RecordStore;

use record::{EmailRow, SearchResultRow};
use sqlx::Row;
use tracing::instrument;

use crate::db::Database;

/// Log message stored on every freshly extracted search result.
pub const SEARCH_RESULT_PARSED_MESSAGE: &str = "Search result parsed successfully.";

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

fn check_affected(collection: &'static str, id: i64, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(StoreError::NotFound { collection, id })
    } else {
        Ok(())
    }
}

/// `SQLite` record store.
#[derive(Debug, Clone)]
pub struct Store {
    db: Database,
}

impl Store {
    /// Creates a store over the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts a raw email body, returning its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    #[instrument(skip(self, body_html), fields(body_len = body_html.len()))]
    pub async fn insert_email(&self, body_html: &str, is_spam: bool) -> Result<i64> {
        let row = sqlx::query(
            r"INSERT INTO emails (body_html, is_spam)
              VALUES (?, ?)
              RETURNING id",
        )
        .bind(body_html)
        .bind(is_spam)
        .fetch_one(self.db.pool())
        .await?;

        Ok(row.get("id"))
    }

    /// Returns identifiers of emails that are neither processed nor spam.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn unprocessed_email_ids(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r"SELECT id FROM emails
              WHERE is_processed = 0 AND is_spam = 0
              ORDER BY id ASC",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(ids)
    }

    /// Reads one email by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no email has this id,
    /// [`StoreError::MalformedRecord`] when its body is missing.
    #[instrument(skip(self))]
    pub async fn get_email(&self, id: i64) -> Result<EmailRecord> {
        let row = sqlx::query_as::<_, EmailRow>(r"SELECT * FROM emails WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or(StoreError::NotFound {
                collection: "emails",
                id,
            })?;

        EmailRecord::try_from(row)
    }

    /// Persists an email's extracted search results and marks it processed.
    ///
    /// Runs in one transaction so a crash never leaves results behind for an
    /// email that will be selected again. Returns the new search result ids.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the email does not exist,
    /// [`StoreError::Database`] if any statement fails.
    #[instrument(skip(self, results, log_message), fields(results = results.len()))]
    pub async fn complete_extraction(
        &self,
        email_id: i64,
        results: &[NewSearchResult],
        log_message: &str,
    ) -> Result<Vec<i64>> {
        let mut tx = self.db.pool().begin().await?;
        let mut ids = Vec::with_capacity(results.len());

        for result in results {
            let row = sqlx::query(
                r"INSERT INTO search_results (
                    email_id, title, author, publisher, year, text,
                    media_type, log_message, link_url
                  )
                  VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                  RETURNING id",
            )
            .bind(email_id)
            .bind(&result.title)
            .bind(result.author.as_deref())
            .bind(result.publisher.as_deref())
            .bind(result.year.as_deref())
            .bind(result.text.as_deref())
            .bind(result.media_type.as_deref())
            .bind(SEARCH_RESULT_PARSED_MESSAGE)
            .bind(result.url.as_deref())
            .fetch_one(&mut *tx)
            .await?;
            ids.push(row.get("id"));
        }

        let updated = sqlx::query(
            r"UPDATE emails
              SET is_processed = 1,
                  log_message = ?,
                  last_error = NULL,
                  updated_at = datetime('now')
              WHERE id = ?",
        )
        .bind(log_message)
        .bind(email_id)
        .execute(&mut *tx)
        .await?;
        check_affected("emails", email_id, updated.rows_affected())?;

        tx.commit().await?;
        Ok(ids)
    }

    /// Records why extraction failed, leaving the email unprocessed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the email does not exist,
    /// [`StoreError::Database`] if the update fails.
    #[instrument(skip(self, error))]
    pub async fn record_extraction_failure(&self, email_id: i64, error: &str) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE emails
              SET last_error = ?, updated_at = datetime('now')
              WHERE id = ?",
        )
        .bind(error)
        .bind(email_id)
        .execute(self.db.pool())
        .await?;

        check_affected("emails", email_id, result.rows_affected())
    }

    /// Reads one search result by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no result has this id,
    /// [`StoreError::MalformedRecord`] when its title is missing.
    #[instrument(skip(self))]
    pub async fn get_search_result(&self, id: i64) -> Result<SearchResult> {
        let row =
            sqlx::query_as::<_, SearchResultRow>(r"SELECT * FROM search_results WHERE id = ?")
                .bind(id)
                .fetch_optional(self.db.pool())
                .await?
                .ok_or(StoreError::NotFound {
                    collection: "search_results",
                    id,
                })?;

        SearchResult::try_from(row)
    }

    /// Lists the search results extracted from one email.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails, or
    /// [`StoreError::MalformedRecord`] for the first malformed row.
    #[instrument(skip(self))]
    pub async fn search_results_for_email(&self, email_id: i64) -> Result<Vec<SearchResult>> {
        let rows = sqlx::query_as::<_, SearchResultRow>(
            r"SELECT * FROM search_results WHERE email_id = ? ORDER BY id ASC",
        )
        .bind(email_id)
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter().map(SearchResult::try_from).collect()
    }

    /// Returns identifiers of search results whose link has not been through
    /// DOI resolution.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn pending_doi_ids(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r"SELECT id FROM search_results
              WHERE link_is_doi_success = 0 AND link_is_processed = 0
              ORDER BY id ASC",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(ids)
    }

    /// Writes a search result's link back.
    ///
    /// `is_doi_success` is stored only when the link carries a non-empty DOI.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the result does not exist,
    /// [`StoreError::Database`] if the update fails.
    #[instrument(skip(self, link), fields(doi = ?link.doi))]
    pub async fn update_link(&self, id: i64, link: &Link) -> Result<()> {
        let is_doi_success = link.is_doi_success && link.has_doi();
        let result = sqlx::query(
            r"UPDATE search_results
              SET link_url = ?,
                  link_redirect_url = ?,
                  link_response_code = ?,
                  link_response_type = ?,
                  link_is_accepted_type = ?,
                  link_doi = ?,
                  link_log_message = ?,
                  link_is_doi_success = ?,
                  link_is_processed = ?,
                  updated_at = datetime('now')
              WHERE id = ?",
        )
        .bind(link.url.as_deref())
        .bind(link.redirect_url.as_deref())
        .bind(link.response_code)
        .bind(link.response_type.as_deref())
        .bind(link.is_accepted_type)
        .bind(link.doi.as_deref())
        .bind(link.log_message.as_deref())
        .bind(is_doi_success)
        .bind(link.is_processed)
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected("search_results", id, result.rows_affected())
    }

    /// Returns identifiers of search results without a DOI that have not been
    /// scored yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn unscored_ids(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r"SELECT id FROM search_results
              WHERE link_is_doi_success = 0 AND score IS NULL
              ORDER BY id ASC",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(ids)
    }

    /// Stores a search result's similarity score.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the result does not exist,
    /// [`StoreError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn update_score(&self, id: i64, score: f64) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE search_results
              SET score = ?, updated_at = datetime('now')
              WHERE id = ?",
        )
        .bind(score)
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected("search_results", id, result.rows_affected())
    }
}
