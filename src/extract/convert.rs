//! Conversion of extracted records into storable search results.

use tracing::warn;

use super::ExtractedRecord;
use super::schema::TITLE_FIELD;
use crate::store::NewSearchResult;

const URL_FIELD: &str = "original_url";
const AUTHORS_FIELD: &str = "authors";
const YEAR_FIELD: &str = "year_of_publication";
const JOURNAL_FIELD: &str = "journal_name";
const SNIPPET_FIELD: &str = "snippet";

/// Maps one extracted record onto the search result shape.
///
/// Returns `None` when the record has no usable title.
#[must_use]
pub fn to_new_search_result(record: &ExtractedRecord) -> Option<NewSearchResult> {
    let title = record.text(TITLE_FIELD)?;

    Some(NewSearchResult {
        title,
        author: record.text(AUTHORS_FIELD),
        publisher: record.text(JOURNAL_FIELD),
        year: record.text(YEAR_FIELD),
        text: record.text(SNIPPET_FIELD),
        url: record.text(URL_FIELD),
        media_type: None,
    })
}

/// Converts every record, skipping (and logging) the ones without a title.
#[must_use]
pub fn to_new_search_results(email_id: i64, records: &[ExtractedRecord]) -> Vec<NewSearchResult> {
    records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| {
            let converted = to_new_search_result(record);
            if converted.is_none() {
                warn!(email_id, index, "extracted record has no title, skipping");
            }
            converted
        })
        .collect()
}
