//! Repository seam for record persistence.
//!
//! The pipeline passes depend on this trait rather than on [`Store`] so the
//! orchestration can be driven against any document store.

use async_trait::async_trait;

use super::{EmailRecord, Link, NewSearchResult, Result, SearchResult, Store};

/// Data-access contract used by the pipeline passes.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Identifiers of emails with `is_processed = false` and `is_spam = false`.
    async fn unprocessed_email_ids(&self) -> Result<Vec<i64>>;

    /// Reads one email by identifier.
    async fn get_email(&self, id: i64) -> Result<EmailRecord>;

    /// Inserts an email's search results and marks the email processed.
    async fn complete_extraction(
        &self,
        email_id: i64,
        results: &[NewSearchResult],
        log_message: &str,
    ) -> Result<Vec<i64>>;

    /// Records an exhausted extraction on the email.
    async fn record_extraction_failure(&self, email_id: i64, error: &str) -> Result<()>;

    /// Identifiers of search results with an unresolved, unprocessed link.
    async fn pending_doi_ids(&self) -> Result<Vec<i64>>;

    /// Reads one search result by identifier.
    async fn get_search_result(&self, id: i64) -> Result<SearchResult>;

    /// Writes a search result's link back.
    async fn update_link(&self, id: i64, link: &Link) -> Result<()>;

    /// Identifiers of search results without a DOI and without a score.
    async fn unscored_ids(&self) -> Result<Vec<i64>>;

    /// Stores a search result's similarity score.
    async fn update_score(&self, id: i64, score: f64) -> Result<()>;
}

#[async_trait]
impl RecordStore for Store {
    async fn unprocessed_email_ids(&self) -> Result<Vec<i64>> {
        Store::unprocessed_email_ids(self).await
    }

    async fn get_email(&self, id: i64) -> Result<EmailRecord> {
        Store::get_email(self, id).await
    }

    async fn complete_extraction(
        &self,
        email_id: i64,
        results: &[NewSearchResult],
        log_message: &str,
    ) -> Result<Vec<i64>> {
        Store::complete_extraction(self, email_id, results, log_message).await
    }

    async fn record_extraction_failure(&self, email_id: i64, error: &str) -> Result<()> {
        Store::record_extraction_failure(self, email_id, error).await
    }

    async fn pending_doi_ids(&self) -> Result<Vec<i64>> {
        Store::pending_doi_ids(self).await
    }

    async fn get_search_result(&self, id: i64) -> Result<SearchResult> {
        Store::get_search_result(self, id).await
    }

    async fn update_link(&self, id: i64, link: &Link) -> Result<()> {
        Store::update_link(self, id, link).await
    }

    async fn unscored_ids(&self) -> Result<Vec<i64>> {
        Store::unscored_ids(self).await
    }

    async fn update_score(&self, id: i64, score: f64) -> Result<()> {
        Store::update_score(self, id, score).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Database;

    async fn pending_emails(repo: &impl RecordStore) -> Result<usize> {
        Ok(repo.unprocessed_email_ids().await?.len())
    }

    #[tokio::test]
    async fn test_record_store_trait_delegates_extraction_lifecycle() {
        let store = Store::new(Database::new_in_memory().await.unwrap());
        let email_id = store.insert_email("<p>alert</p>", false).await.unwrap();
        assert_eq!(pending_emails(&store).await.unwrap(), 1);

        let result = NewSearchResult {
            title: "Seed phenotyping".to_string(),
            ..NewSearchResult::default()
        };
        let ids = RecordStore::complete_extraction(&store, email_id, &[result], "ok")
            .await
            .unwrap();

        assert_eq!(pending_emails(&store).await.unwrap(), 0);
        assert_eq!(RecordStore::pending_doi_ids(&store).await.unwrap(), ids);
        assert_eq!(RecordStore::unscored_ids(&store).await.unwrap(), ids);
    }
}
