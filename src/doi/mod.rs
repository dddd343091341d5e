//! DOI resolution state machine.
//!
//! Each search result's link goes through a fixed sequence of lookup
//! strategies, modelled as [`DoiState`]:
//!
//! ```text
//! Initial ──> LinkSearched ──> CrossrefSearched (terminal)
//! ```
//!
//! - `Initial` performs no lookup.
//! - `LinkSearched` samples the bibliographic registry by title and accepts
//!   the first candidate's DOI when its first title equals the local title
//!   exactly (case and whitespace sensitive).
//! - `CrossrefSearched` is terminal.
//!
//! [`DoiResolver`] drives the machine for one link. The transition out of the
//! current state is committed by a drop guard, so it happens on every exit
//! path of a step: success, lookup failure, panic or cancellation.

mod crossref;
mod error;
mod throttle;

pub use crossref::CrossrefClient;
pub use error::RegistryError;
pub use throttle::{DEFAULT_THROTTLE_DELAY, Throttle};

use std::fmt;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument};

use crate::store::Link;

/// Number of candidates sampled per title lookup.
pub const TITLE_SAMPLE_SIZE: u32 = 2;

/// Link log message when the registry title matched.
pub const DOI_FOUND_MESSAGE: &str = "DOI found via Crossref title search.";
/// Link log message when the registry's first candidate has a different title.
pub const TITLE_MISMATCH_MESSAGE: &str = "Crossref title did not match; DOI not set.";
/// Link log message when the registry returned no candidates.
pub const NO_CANDIDATES_MESSAGE: &str = "Crossref returned no candidates; DOI not set.";

/// A work returned by a bibliographic registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryWork {
    pub doi: Option<String>,
    /// Titles in registry order; the first is the primary title.
    pub titles: Vec<String>,
}

impl RegistryWork {
    /// Returns the primary title.
    #[must_use]
    pub fn first_title(&self) -> Option<&str> {
        self.titles.first().map(String::as_str)
    }
}

/// Bibliographic registry searchable by title.
#[async_trait]
pub trait BibliographicRegistry: Send + Sync {
    /// Samples up to `size` works matching `title`, best candidate first.
    async fn sample_by_title(
        &self,
        title: &str,
        size: u32,
    ) -> Result<Vec<RegistryWork>, RegistryError>;
}

/// Position of a link in the DOI lookup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoiState {
    /// No strategy tried yet.
    Initial,
    /// Ready for the registry title search.
    LinkSearched,
    /// Every strategy tried.
    CrossrefSearched,
}

impl DoiState {
    /// Returns true for the terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::CrossrefSearched)
    }

    /// The state a step from `self` always transitions to.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Initial => Self::LinkSearched,
            Self::LinkSearched | Self::CrossrefSearched => Self::CrossrefSearched,
        }
    }

    /// Runs this state's strategy on `link` and returns the updated link with
    /// the next state.
    ///
    /// Registry failures are logged and leave the DOI unset; they never stop
    /// the transition.
    #[instrument(skip(link, registry), fields(state = %self))]
    pub async fn advance(
        self,
        mut link: Link,
        title: &str,
        registry: &dyn BibliographicRegistry,
    ) -> (Link, DoiState) {
        match self {
            Self::Initial => {
                debug!("no lookup in initial state");
            }
            Self::LinkSearched => search_registry_by_title(&mut link, title, registry).await,
            Self::CrossrefSearched => {
                debug!("terminal state, no further strategies");
            }
        }
        (link, self.next())
    }
}

impl fmt::Display for DoiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Initial => "initial",
            Self::LinkSearched => "link searched",
            Self::CrossrefSearched => "crossref searched",
        };
        f.write_str(label)
    }
}

async fn search_registry_by_title(
    link: &mut Link,
    title: &str,
    registry: &dyn BibliographicRegistry,
) {
    match registry.sample_by_title(title, TITLE_SAMPLE_SIZE).await {
        Ok(works) => match works.first() {
            Some(candidate) if candidate.first_title() == Some(title) => {
                link.doi.clone_from(&candidate.doi);
                link.log_message = Some(DOI_FOUND_MESSAGE.to_string());
                info!(doi = ?link.doi, "DOI found in registry");
            }
            Some(candidate) => {
                link.doi = None;
                link.log_message = Some(TITLE_MISMATCH_MESSAGE.to_string());
                debug!(registry_title = ?candidate.first_title(), "registry title differs");
            }
            None => {
                link.doi = None;
                link.log_message = Some(NO_CANDIDATES_MESSAGE.to_string());
                debug!("registry returned no candidates");
            }
        },
        Err(e) => {
            error!(error = %e, "registry title search failed");
            link.log_message = Some(format!("Crossref title search failed: {e}"));
        }
    }
    link.refresh_doi_success();
}

/// Commits a state transition when dropped.
struct TransitionGuard<'a> {
    state: &'a mut DoiState,
    next: DoiState,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        *self.state = self.next;
    }
}

/// Drives one link through the DOI lookup states.
pub struct DoiResolver<'a> {
    registry: &'a dyn BibliographicRegistry,
    state: DoiState,
}

impl<'a> DoiResolver<'a> {
    /// Creates a resolver in the [`DoiState::Initial`] state.
    #[must_use]
    pub fn new(registry: &'a dyn BibliographicRegistry) -> Self {
        Self::starting_at(registry, DoiState::Initial)
    }

    /// Creates a resolver in the given state.
    #[must_use]
    pub fn starting_at(registry: &'a dyn BibliographicRegistry, state: DoiState) -> Self {
        Self { registry, state }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> DoiState {
        self.state
    }

    /// Runs the current state's strategy once.
    ///
    /// The resolver is in the next state afterwards even if the strategy
    /// panics or the future is dropped mid-lookup.
    pub async fn search(&mut self, link: Link, title: &str) -> Link {
        let current = self.state;
        let _transition = TransitionGuard {
            state: &mut self.state,
            next: current.next(),
        };
        let (link, _) = current.advance(link, title, self.registry).await;
        link
    }

    /// Runs strategies until the terminal state.
    pub async fn resolve(&mut self, mut link: Link, title: &str) -> Link {
        while !self.state.is_terminal() {
            link = self.search(link, title).await;
        }
        link
    }
}

impl fmt::Debug for DoiResolver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoiResolver")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    const SEED_TITLE: &str =
        "Evaluation of 3D seed structure and cellular traits in-situ using X-ray microscopy";
    const SEED_DOI: &str = "10.1038/s41598-025-88482-7";

    enum Reply {
        Works(Vec<RegistryWork>),
        InvalidQuery,
        Connection,
        Hang,
        Panic,
    }

    struct FakeRegistry {
        reply: Reply,
        calls: AtomicU32,
        last_query: Mutex<Option<(String, u32)>>,
    }

    impl FakeRegistry {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                calls: AtomicU32::new(0),
                last_query: Mutex::new(None),
            }
        }

        fn returning(works: &[(&str, &str)]) -> Self {
            Self::new(Reply::Works(
                works
                    .iter()
                    .map(|(doi, title)| RegistryWork {
                        doi: Some((*doi).to_string()),
                        titles: vec![(*title).to_string()],
                    })
                    .collect(),
            ))
        }
    }

    #[async_trait]
    impl BibliographicRegistry for FakeRegistry {
        async fn sample_by_title(
            &self,
            title: &str,
            size: u32,
        ) -> Result<Vec<RegistryWork>, RegistryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_query.lock().unwrap() = Some((title.to_string(), size));
            match &self.reply {
                Reply::Works(works) => Ok(works.clone()),
                Reply::InvalidQuery => Err(RegistryError::invalid_query("bad request")),
                Reply::Connection => Err(RegistryError::connection("connection refused")),
                Reply::Hang => {
                    std::future::pending::<()>().await;
                    Ok(vec![])
                }
                Reply::Panic => panic!("registry exploded"),
            }
        }
    }

    fn link() -> Link {
        Link::new(Some("https://www.nature.com/articles/s41598-025-88482-7".to_string()))
    }

    #[test]
    fn test_state_transitions() {
        assert_eq!(DoiState::Initial.next(), DoiState::LinkSearched);
        assert_eq!(DoiState::LinkSearched.next(), DoiState::CrossrefSearched);
        assert_eq!(DoiState::CrossrefSearched.next(), DoiState::CrossrefSearched);
        assert!(DoiState::CrossrefSearched.is_terminal());
        assert!(!DoiState::LinkSearched.is_terminal());
        assert_eq!(DoiState::LinkSearched.to_string(), "link searched");
    }

    #[tokio::test]
    async fn test_initial_state_does_not_query_registry() {
        let registry = FakeRegistry::returning(&[(SEED_DOI, SEED_TITLE)]);
        let (link, next) = DoiState::Initial
            .advance(link(), SEED_TITLE, &registry)
            .await;
        assert_eq!(next, DoiState::LinkSearched);
        assert!(link.doi.is_none());
        assert_eq!(registry.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exact_title_match_sets_doi() {
        let registry = FakeRegistry::returning(&[(SEED_DOI, SEED_TITLE), ("10.1/x", "Other")]);
        let (link, next) = DoiState::LinkSearched
            .advance(link(), SEED_TITLE, &registry)
            .await;

        assert_eq!(next, DoiState::CrossrefSearched);
        assert_eq!(link.doi.as_deref(), Some(SEED_DOI));
        assert!(link.is_doi_success);
        assert_eq!(link.log_message.as_deref(), Some(DOI_FOUND_MESSAGE));
        assert_eq!(
            *registry.last_query.lock().unwrap(),
            Some((SEED_TITLE.to_string(), TITLE_SAMPLE_SIZE))
        );
    }

    #[tokio::test]
    async fn test_case_difference_is_a_mismatch() {
        let registry = FakeRegistry::returning(&[(SEED_DOI, SEED_TITLE.to_uppercase().as_str())]);
        let (link, next) = DoiState::LinkSearched
            .advance(link(), SEED_TITLE, &registry)
            .await;

        assert_eq!(next, DoiState::CrossrefSearched);
        assert!(link.doi.is_none());
        assert!(!link.is_doi_success);
        assert_eq!(link.log_message.as_deref(), Some(TITLE_MISMATCH_MESSAGE));
    }

    #[tokio::test]
    async fn test_only_first_candidate_is_considered() {
        let registry = FakeRegistry::returning(&[("10.1/x", "Other"), (SEED_DOI, SEED_TITLE)]);
        let (link, _) = DoiState::LinkSearched
            .advance(link(), SEED_TITLE, &registry)
            .await;
        assert!(link.doi.is_none());
    }

    #[tokio::test]
    async fn test_no_candidates_leaves_doi_unset() {
        let registry = FakeRegistry::new(Reply::Works(vec![]));
        let (link, next) = DoiState::LinkSearched
            .advance(link(), SEED_TITLE, &registry)
            .await;
        assert_eq!(next, DoiState::CrossrefSearched);
        assert!(link.doi.is_none());
        assert_eq!(link.log_message.as_deref(), Some(NO_CANDIDATES_MESSAGE));
    }

    #[tokio::test]
    async fn test_empty_doi_is_not_success() {
        let registry = FakeRegistry::returning(&[("", SEED_TITLE)]);
        let (link, _) = DoiState::LinkSearched
            .advance(link(), SEED_TITLE, &registry)
            .await;
        assert!(!link.is_doi_success);
    }

    #[tokio::test]
    async fn test_registry_errors_still_transition() {
        for reply in [Reply::InvalidQuery, Reply::Connection] {
            let registry = FakeRegistry::new(reply);
            let mut resolver = DoiResolver::starting_at(&registry, DoiState::LinkSearched);

            let link = resolver.search(link(), SEED_TITLE).await;

            assert_eq!(resolver.state(), DoiState::CrossrefSearched);
            assert!(link.doi.is_none());
            assert!(!link.is_doi_success);
            assert!(
                link.log_message
                    .as_deref()
                    .unwrap()
                    .starts_with("Crossref title search failed")
            );
        }
    }

    #[tokio::test]
    async fn test_resolve_runs_until_terminal() {
        let registry = FakeRegistry::returning(&[(SEED_DOI, SEED_TITLE)]);
        let mut resolver = DoiResolver::new(&registry);
        assert_eq!(resolver.state(), DoiState::Initial);

        let link = resolver.resolve(link(), SEED_TITLE).await;

        assert_eq!(resolver.state(), DoiState::CrossrefSearched);
        assert_eq!(link.doi.as_deref(), Some(SEED_DOI));
        assert_eq!(registry.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolve_from_terminal_is_a_no_op() {
        let registry = FakeRegistry::returning(&[(SEED_DOI, SEED_TITLE)]);
        let mut resolver = DoiResolver::starting_at(&registry, DoiState::CrossrefSearched);
        let link = resolver.resolve(link(), SEED_TITLE).await;
        assert!(link.doi.is_none());
        assert_eq!(registry.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_search_still_transitions() {
        tokio::time::pause();
        let registry = FakeRegistry::new(Reply::Hang);
        let mut resolver = DoiResolver::starting_at(&registry, DoiState::LinkSearched);

        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            resolver.search(link(), SEED_TITLE),
        )
        .await;

        assert!(outcome.is_err(), "lookup should have been cancelled");
        assert_eq!(resolver.state(), DoiState::CrossrefSearched);
    }

    #[test]
    fn test_panicking_search_still_transitions() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let registry = FakeRegistry::new(Reply::Panic);
        let mut resolver = DoiResolver::starting_at(&registry, DoiState::LinkSearched);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            runtime.block_on(resolver.search(link(), SEED_TITLE))
        }));

        assert!(outcome.is_err());
        assert_eq!(resolver.state(), DoiState::CrossrefSearched);
    }
}
