//! Record types for the `emails` and `search_results` collections.

use sqlx::FromRow;

use super::StoreError;

/// A raw alert email awaiting (or past) extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRecord {
    /// Unique identifier.
    pub id: i64,
    /// Raw HTML body as delivered by the mail ingestion process.
    pub body_html: String,
    /// Set once extraction has persisted this email's search results.
    pub is_processed: bool,
    /// Spam emails are never selected for extraction.
    pub is_spam: bool,
    /// Outcome message of the last successful extraction.
    pub log_message: Option<String>,
    /// Error of the last failed extraction, cleared on success.
    pub last_error: Option<String>,
    /// When the record was created.
    pub created_at: String,
    /// When the record was last updated.
    pub updated_at: String,
}

#[derive(Debug, FromRow)]
pub(crate) struct EmailRow {
    id: i64,
    body_html: Option<String>,
    is_processed: bool,
    is_spam: bool,
    log_message: Option<String>,
    last_error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<EmailRow> for EmailRecord {
    type Error = StoreError;

    fn try_from(row: EmailRow) -> Result<Self, Self::Error> {
        let body_html = row
            .body_html
            .filter(|body| !body.trim().is_empty())
            .ok_or_else(|| StoreError::malformed("emails", row.id, "body_html"))?;

        Ok(Self {
            id: row.id,
            body_html,
            is_processed: row.is_processed,
            is_spam: row.is_spam,
            log_message: row.log_message,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// The link of a search result and everything learned while resolving it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Link {
    /// Original URL as extracted from the alert.
    pub url: Option<String>,
    /// URL after following redirects, when known.
    pub redirect_url: Option<String>,
    /// HTTP status returned by the link, when fetched.
    pub response_code: Option<i64>,
    /// Content type returned by the link, when fetched.
    pub response_type: Option<String>,
    /// Whether the content type is one the pipeline accepts.
    pub is_accepted_type: bool,
    /// Resolved DOI.
    pub doi: Option<String>,
    /// Outcome of the last resolution step.
    pub log_message: Option<String>,
    /// True only when `doi` is non-empty.
    pub is_doi_success: bool,
    /// Set once the DOI pass has run for this link.
    pub is_processed: bool,
}

impl Link {
    /// Creates an unresolved link for the given URL.
    #[must_use]
    pub fn new(url: Option<String>) -> Self {
        Self {
            url,
            ..Self::default()
        }
    }

    /// Returns true when a non-empty DOI is set.
    #[must_use]
    pub fn has_doi(&self) -> bool {
        self.doi.as_deref().is_some_and(|doi| !doi.trim().is_empty())
    }

    /// Recomputes `is_doi_success` from the current DOI.
    pub fn refresh_doi_success(&mut self) {
        self.is_doi_success = self.has_doi();
    }
}

/// A persisted bibliographic record extracted from an alert email.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: i64,
    pub email_id: i64,
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<String>,
    /// Snippet text shown under the title in the alert.
    pub text: Option<String>,
    pub link: Link,
    pub media_type: Option<String>,
    pub log_message: Option<String>,
    pub is_processed: bool,
    /// Cosine distance to the nearest reference title; `None` until scored.
    pub score: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, FromRow)]
pub(crate) struct SearchResultRow {
    id: i64,
    email_id: i64,
    title: Option<String>,
    author: Option<String>,
    publisher: Option<String>,
    year: Option<String>,
    text: Option<String>,
    media_type: Option<String>,
    log_message: Option<String>,
    is_processed: bool,
    score: Option<f64>,
    link_url: Option<String>,
    link_redirect_url: Option<String>,
    link_response_code: Option<i64>,
    link_response_type: Option<String>,
    link_is_accepted_type: bool,
    link_doi: Option<String>,
    link_log_message: Option<String>,
    link_is_doi_success: bool,
    link_is_processed: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SearchResultRow> for SearchResult {
    type Error = StoreError;

    fn try_from(row: SearchResultRow) -> Result<Self, Self::Error> {
        let title = row
            .title
            .filter(|title| !title.trim().is_empty())
            .ok_or_else(|| StoreError::malformed("search_results", row.id, "title"))?;

        Ok(Self {
            id: row.id,
            email_id: row.email_id,
            title,
            author: row.author,
            publisher: row.publisher,
            year: row.year,
            text: row.text,
            link: Link {
                url: row.link_url,
                redirect_url: row.link_redirect_url,
                response_code: row.link_response_code,
                response_type: row.link_response_type,
                is_accepted_type: row.link_is_accepted_type,
                doi: row.link_doi,
                log_message: row.link_log_message,
                is_doi_success: row.link_is_doi_success,
                is_processed: row.link_is_processed,
            },
            media_type: row.media_type,
            log_message: row.log_message,
            is_processed: row.is_processed,
            score: row.score,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Insert shape for one extracted record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewSearchResult {
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<String>,
    pub text: Option<String>,
    pub url: Option<String>,
    pub media_type: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn email_row(body: Option<&str>) -> EmailRow {
        EmailRow {
            id: 3,
            body_html: body.map(str::to_string),
            is_processed: false,
            is_spam: false,
            log_message: None,
            last_error: None,
            created_at: "2026-01-01 00:00:00".to_string(),
            updated_at: "2026-01-01 00:00:00".to_string(),
        }
    }

    #[test]
    fn test_email_row_with_body_converts() {
        let record = EmailRecord::try_from(email_row(Some("<p>alert</p>"))).unwrap();
        assert_eq!(record.id, 3);
        assert_eq!(record.body_html, "<p>alert</p>");
    }

    #[test]
    fn test_email_row_without_body_is_malformed() {
        let err = EmailRecord::try_from(email_row(None)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::MalformedRecord {
                collection: "emails",
                id: 3,
                field: "body_html"
            }
        ));
    }

    #[test]
    fn test_email_row_with_blank_body_is_malformed() {
        assert!(EmailRecord::try_from(email_row(Some("  \n"))).is_err());
    }

    #[test]
    fn test_link_has_doi_requires_non_empty_value() {
        let mut link = Link::new(Some("https://example.com".to_string()));
        assert!(!link.has_doi());

        link.doi = Some(String::new());
        link.refresh_doi_success();
        assert!(!link.is_doi_success);

        link.doi = Some("10.1038/s41598-025-88482-7".to_string());
        link.refresh_doi_success();
        assert!(link.is_doi_success);

        link.doi = None;
        link.refresh_doi_success();
        assert!(!link.is_doi_success);
    }
}
